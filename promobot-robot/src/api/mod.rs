//! HTTP API handlers
//!
//! One module per resource, each exposing a `*_routes()` builder merged by
//! [`crate::build_router`].

pub mod deliveries;
pub mod groups;
pub mod health;
pub mod products;
pub mod robot;
pub mod templates;
pub mod whatsapp;

pub use deliveries::delivery_routes;
pub use groups::group_routes;
pub use health::health_routes;
pub use products::product_routes;
pub use robot::robot_routes;
pub use templates::template_routes;
pub use whatsapp::whatsapp_routes;

use promobot_common::pagination::SortOrder;
use serde::Deserialize;

/// `page`, `limit` and `sort` query parameters shared by list endpoints
///
/// Resource filters are extracted separately from the same query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
}

impl ListParams {
    /// Resolve `sort` against a resource's whitelist
    pub fn sort_order(&self, allowed: &[(&str, &'static str)], default: SortOrder) -> SortOrder {
        SortOrder::parse(self.sort.as_deref(), allowed, default)
    }
}
