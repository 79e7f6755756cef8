//! DELIVERING: product × group pairs, one at a time
//!
//! Pairs are processed sequentially so the inter-send delay and the gateway
//! quota hold. Every pair re-reads its group, because counters change while
//! the run is in progress.

use tokio_util::sync::CancellationToken;

use super::{RobotError, RobotOrchestrator, RunContext, Selection};
use crate::config::RobotConfig;
use crate::db::{deliveries, groups, templates};
use crate::models::{Delivery, Group, Product};
use crate::services::delivery::{dispatch_with_retry, OutboundMessage};
use crate::services::template_renderer::{product_context, render, TemplateError};

/// What happened to one (product, group) pair
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    /// Gateway accepted the message
    Sent { attempts: u32 },
    /// Every attempt failed; the delivery record is `failed`
    Failed { attempts: u32, error: String },
    /// Group no longer eligible; nothing recorded
    Skipped(String),
}

impl RobotOrchestrator {
    pub(super) async fn phase_delivering(
        &self,
        ctx: &mut RunContext,
        config: &RobotConfig,
        selection: Selection,
        cancel: &CancellationToken,
    ) -> Result<(), RobotError> {
        tracing::info!(run_id = %ctx.run_id, pairs = selection.pair_count(), "Phase: DELIVERING");

        let mut previous_send = false;

        for product in &selection.products {
            for group in &selection.groups {
                if cancel.is_cancelled() {
                    tracing::info!(run_id = %ctx.run_id, "Delivery interrupted by stop request");
                    return Ok(());
                }

                if previous_send {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::info!(run_id = %ctx.run_id, "Delivery interrupted during send delay");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(config.send_delay()) => {}
                    }
                }

                match self.deliver_pair(product, group, config).await {
                    Ok(PairOutcome::Sent { attempts }) => {
                        previous_send = true;
                        self.update_counts(|c| {
                            c.sent += 1;
                            c.succeeded += 1;
                        });
                        tracing::info!(
                            run_id = %ctx.run_id,
                            product_id = %product.id,
                            group_id = %group.id,
                            attempts,
                            "Delivered"
                        );
                    }
                    Ok(PairOutcome::Failed { attempts, error }) => {
                        previous_send = true;
                        self.update_counts(|c| {
                            c.sent += 1;
                            c.errors += 1;
                        });
                        ctx.errors.push(format!(
                            "send {} → {} failed after {} attempts: {}",
                            product.id, group.whatsapp_id, attempts, error
                        ));
                    }
                    Ok(PairOutcome::Skipped(reason)) => {
                        tracing::debug!(
                            run_id = %ctx.run_id,
                            group_id = %group.id,
                            reason = %reason,
                            "Group skipped"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            run_id = %ctx.run_id,
                            product_id = %product.id,
                            group_id = %group.id,
                            error = %e,
                            "Delivery pair failed"
                        );
                        self.update_counts(|c| c.errors += 1);
                        ctx.errors
                            .push(format!("pair {} → {}: {}", product.id, group.whatsapp_id, e));
                    }
                }
            }
        }

        Ok(())
    }

    /// Re-check, render, record, dispatch and account for one pair
    pub async fn deliver_pair(
        &self,
        product: &Product,
        group: &Group,
        config: &RobotConfig,
    ) -> Result<PairOutcome, RobotError> {
        let now = self.clock.now_local();

        let Some(group) = groups::load_group(&self.db, group.id).await? else {
            return Ok(PairOutcome::Skipped("group removed".to_string()));
        };
        if let Some(reason) = group.ineligibility_reason(now) {
            return Ok(PairOutcome::Skipped(reason.to_string()));
        }

        let template = templates::resolve_template(&self.db, group.template_id, product.category)
            .await?
            .ok_or(TemplateError::NoTemplate(product.category))?;
        let content = render(&template, &product_context(product))?;

        let delivery = Delivery::pending(product.id, group.id, Some(template.id), content);
        deliveries::insert_delivery(&self.db, &delivery).await?;

        let message = OutboundMessage {
            chat_id: group.whatsapp_id.clone(),
            text: delivery.content.clone(),
            media_url: product.image_url.clone(),
        };
        let outcome = dispatch_with_retry(self.transport.as_ref(), &message, config.retry_policy()).await;
        let finished_at = self.clock.now_utc();

        match outcome.result {
            Ok(_receipt) => {
                deliveries::mark_sent(&self.db, delivery.id, outcome.attempts, finished_at).await?;
                groups::record_sent(&self.db, group.id, finished_at, now.date()).await?;
                templates::record_usage(&self.db, template.id, finished_at).await?;
                Ok(PairOutcome::Sent {
                    attempts: outcome.attempts,
                })
            }
            Err(e) => {
                let error = e.to_string();
                deliveries::mark_failed(&self.db, delivery.id, outcome.attempts, error.clone(), finished_at).await?;
                Ok(PairOutcome::Failed {
                    attempts: outcome.attempts,
                    error,
                })
            }
        }
    }
}
