//! Data models for promobot-robot
//!
//! - Products, groups, templates, deliveries (persistent)
//! - Candidate listings (ephemeral, fetcher output)
//! - Robot run state

pub mod delivery;
pub mod enums;
pub mod group;
pub mod listing;
pub mod product;
pub mod run;
pub mod template;

pub use delivery::{Delivery, EngagementDelta};
pub use enums::{Category, CommissionQuality, DeliveryStatus, Platform, UnknownVariant, VariableType};
pub use group::{AllowedHours, Group, GroupInput, GroupPatch};
pub use listing::CandidateListing;
pub use product::{round_cents, DerivedPricing, Product, ProductDraft, ProductPatch};
pub use run::{RobotPhase, RobotStatus, RunCounts, RunResult};
pub use template::{Template, TemplateInput, TemplatePatch, TemplateVariable};

/// Patch field where `null` means "clear" and absence means "keep"
pub(crate) mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
