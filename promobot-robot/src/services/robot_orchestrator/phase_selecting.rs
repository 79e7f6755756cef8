//! SELECTING: products to promote and groups to post to

use super::{RobotError, RobotOrchestrator};
use crate::config::RobotConfig;
use crate::db::{groups, products};
use crate::models::{Group, Product};

/// Delivery work for one run
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Best estimated commission first
    pub products: Vec<Product>,
    pub groups: Vec<Group>,
}

impl Selection {
    pub fn pair_count(&self) -> usize {
        self.products.len() * self.groups.len()
    }
}

impl RobotOrchestrator {
    pub(super) async fn phase_selecting(&self, config: &RobotConfig) -> Result<Selection, RobotError> {
        let products =
            products::select_for_delivery(&self.db, &config.quality_allow_list, config.max_products_per_run).await?;
        let groups = groups::eligible_groups(&self.db, self.clock.now_local()).await?;

        let selection = Selection { products, groups };
        tracing::info!(
            products = selection.products.len(),
            groups = selection.groups.len(),
            pairs = selection.pair_count(),
            "Phase: SELECTING done"
        );
        Ok(selection)
    }

    /// Run the selection queries without starting a run
    pub async fn preview_selection(&self) -> Result<Selection, RobotError> {
        let config = self.config();
        self.phase_selecting(&config).await
    }
}
