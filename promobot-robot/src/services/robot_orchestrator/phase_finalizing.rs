//! FINALIZING: day rollover of group counters

use super::{lock, RobotError, RobotOrchestrator};
use crate::db::groups;

impl RobotOrchestrator {
    /// Reset daily counters when the local date moved since the last finalize
    ///
    /// Only rows belonging to another day are touched, so sends made after
    /// midnight in this very run keep counting.
    pub(super) async fn phase_finalizing(&self) -> Result<(), RobotError> {
        let today = self.clock.now_local().date();
        let rolled_over = lock(&self.last_finalize).map_or(true, |last| last != today);

        if rolled_over {
            let reset = groups::refresh_daily_counters(&self.db, today).await?;
            tracing::info!(%today, groups_reset = reset, "Daily counters rolled over");
            *lock(&self.last_finalize) = Some(today);
        }
        Ok(())
    }
}
