//! Delivery log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DeliveryStatus;

/// One message sent (or attempted) for a product to a group
///
/// Append-only: after insertion only status transitions and engagement
/// increments change a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: Uuid,
    pub product_id: Uuid,
    pub group_id: Uuid,
    pub template_id: Option<Uuid>,
    pub content: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub clicks: i64,
    pub reactions: i64,
    pub replies: i64,
}

impl Delivery {
    /// New pending record
    pub fn pending(product_id: Uuid, group_id: Uuid, template_id: Option<Uuid>, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            group_id,
            template_id,
            content,
            status: DeliveryStatus::Pending,
            error: None,
            attempts: 0,
            created_at: Utc::now(),
            sent_at: None,
            failed_at: None,
            delivered_at: None,
            read_at: None,
            clicks: 0,
            reactions: 0,
            replies: 0,
        }
    }
}

/// Engagement increments (POST /api/deliveries/:id/engagement)
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngagementDelta {
    pub clicks: i64,
    pub reactions: i64,
    pub replies: i64,
}

impl EngagementDelta {
    pub fn validate(&self) -> Result<(), String> {
        if self.clicks < 0 || self.reactions < 0 || self.replies < 0 {
            return Err("engagement increments must be non-negative".to_string());
        }
        if self.clicks == 0 && self.reactions == 0 && self.replies == 0 {
            return Err("engagement increment is empty".to_string());
        }
        Ok(())
    }
}
