//! FETCHING: sources → quality gate → upsert

use tokio_util::sync::CancellationToken;

use super::{RobotError, RobotOrchestrator, RunContext};
use crate::config::RobotConfig;
use crate::db::products::{self, UpsertOutcome};

impl RobotOrchestrator {
    /// Fetch the category × platform cross product, enrich and persist
    ///
    /// Nothing in this phase ends the run: failed combinations and failed
    /// upserts land in the run's error list.
    pub(super) async fn phase_fetching(
        &self,
        ctx: &mut RunContext,
        config: &RobotConfig,
        cancel: &CancellationToken,
    ) -> Result<(), RobotError> {
        tracing::info!(run_id = %ctx.run_id, "Phase: FETCHING");

        let batch = self
            .fetcher
            .fetch_batch(&config.categories, &config.platforms, config.products_per_fetch, cancel)
            .await;

        let scraped = batch.listings.len();
        let failed = batch.failures.len();
        self.update_counts(|c| {
            c.scraped += scraped;
            c.errors += failed;
        });
        for failure in &batch.failures {
            ctx.errors
                .push(format!("fetch {}/{}: {}", failure.platform, failure.category, failure.error));
        }

        let enriched = self.enricher.enrich_all(&batch.listings);
        tracing::info!(
            run_id = %ctx.run_id,
            scraped,
            accepted = enriched.accepted,
            rejected = enriched.rejected_total(),
            "Listings enriched"
        );

        if enriched.drafts.is_empty() {
            return Ok(());
        }

        let report = products::bulk_upsert(&self.db, enriched.drafts, Some(self.clock.now_utc())).await;
        tracing::info!(
            run_id = %ctx.run_id,
            created = report.created,
            updated = report.updated,
            errored = report.errored,
            "Products upserted"
        );

        self.update_counts(|c| c.errors += report.errored);
        for item in report.items.iter().filter(|i| i.outcome == UpsertOutcome::Errored) {
            ctx.errors.push(format!(
                "upsert {}/{}: {}",
                item.platform,
                item.platform_id,
                item.error.as_deref().unwrap_or("unknown error")
            ));
        }

        Ok(())
    }
}
