//! Message target ("group")
//!
//! A WhatsApp group the robot may post to, with its sending window and daily
//! quota.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Category;

/// Allowed sending window `[start, end)` in local hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedHours {
    pub start: u32,
    pub end: u32,
}

impl AllowedHours {
    pub fn validate(&self) -> Result<(), String> {
        if self.start > 23 || self.end > 24 {
            return Err(format!(
                "allowedHours must be within 0..24, got {}..{}",
                self.start, self.end
            ));
        }
        if self.end <= self.start {
            return Err(format!(
                "allowedHours end ({}) must be greater than start ({})",
                self.end, self.start
            ));
        }
        Ok(())
    }

    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start && hour < self.end
    }
}

impl Default for AllowedHours {
    fn default() -> Self {
        Self { start: 8, end: 22 }
    }
}

/// Persistent message target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub whatsapp_id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Category,
    pub is_active: bool,
    pub sending_enabled: bool,
    pub max_messages_per_day: i64,
    pub allowed_hours: AllowedHours,
    pub template_id: Option<Uuid>,
    pub total_sent: i64,
    pub sent_today: i64,
    pub last_sent: Option<DateTime<Utc>>,
    /// Local date `sent_today` belongs to
    pub counters_date: Option<NaiveDate>,
    pub total_clicks: i64,
    pub total_reactions: i64,
    pub total_replies: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn new(input: GroupInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            whatsapp_id: input.whatsapp_id,
            name: input.name,
            description: input.description,
            category: input.category,
            is_active: input.is_active.unwrap_or(true),
            sending_enabled: input.sending_enabled.unwrap_or(true),
            max_messages_per_day: input.max_messages_per_day.unwrap_or(10),
            allowed_hours: input.allowed_hours.unwrap_or_default(),
            template_id: input.template_id,
            total_sent: 0,
            sent_today: 0,
            last_sent: None,
            counters_date: None,
            total_clicks: 0,
            total_reactions: 0,
            total_replies: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sent count for `today`, treating a stale counter as zero
    pub fn sent_on(&self, today: NaiveDate) -> i64 {
        match self.counters_date {
            Some(date) if date == today => self.sent_today,
            _ => 0,
        }
    }

    /// Eligibility at local wall-clock time `now`
    ///
    /// active ∧ sending enabled ∧ hour in window ∧ under the daily quota.
    pub fn is_eligible_at(&self, now: NaiveDateTime) -> bool {
        self.is_active
            && self.sending_enabled
            && self.allowed_hours.contains(now.hour())
            && self.sent_on(now.date()) < self.max_messages_per_day
    }

    /// Why the group is not eligible, if it is not
    pub fn ineligibility_reason(&self, now: NaiveDateTime) -> Option<&'static str> {
        if !self.is_active {
            Some("inactive")
        } else if !self.sending_enabled {
            Some("sending disabled")
        } else if !self.allowed_hours.contains(now.hour()) {
            Some("outside allowed hours")
        } else if self.sent_on(now.date()) >= self.max_messages_per_day {
            Some("daily limit reached")
        } else {
            None
        }
    }

    pub fn apply_patch(&mut self, patch: GroupPatch) -> Result<(), String> {
        if let Some(hours) = patch.allowed_hours {
            hours.validate()?;
            self.allowed_hours = hours;
        }
        if let Some(max) = patch.max_messages_per_day {
            if max < 0 {
                return Err("maxMessagesPerDay must be non-negative".to_string());
            }
            self.max_messages_per_day = max;
        }
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(active) = patch.is_active {
            self.is_active = active;
        }
        if let Some(enabled) = patch.sending_enabled {
            self.sending_enabled = enabled;
        }
        if let Some(template_id) = patch.template_id {
            self.template_id = template_id;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// POST /api/groups body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInput {
    pub whatsapp_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_category")]
    pub category: Category,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub sending_enabled: Option<bool>,
    #[serde(default)]
    pub max_messages_per_day: Option<i64>,
    #[serde(default)]
    pub allowed_hours: Option<AllowedHours>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
}

fn default_category() -> Category {
    Category::General
}

impl GroupInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.whatsapp_id.trim().is_empty() {
            return Err("whatsappId is required".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        if let Some(hours) = &self.allowed_hours {
            hours.validate()?;
        }
        if matches!(self.max_messages_per_day, Some(max) if max < 0) {
            return Err("maxMessagesPerDay must be non-negative".to_string());
        }
        Ok(())
    }
}

/// PUT /api/groups/:id body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub is_active: Option<bool>,
    pub sending_enabled: Option<bool>,
    pub max_messages_per_day: Option<i64>,
    pub allowed_hours: Option<AllowedHours>,
    /// `null` clears the assigned template
    #[serde(default, with = "crate::models::double_option")]
    pub template_id: Option<Option<Uuid>>,
}

#[cfg(test)]
pub(crate) fn sample_group(whatsapp_id: &str) -> Group {
    Group::new(GroupInput {
        whatsapp_id: whatsapp_id.to_string(),
        name: format!("Ofertas {}", whatsapp_id),
        description: None,
        category: Category::Electronics,
        is_active: None,
        sending_enabled: None,
        max_messages_per_day: Some(5),
        allowed_hours: Some(AllowedHours { start: 8, end: 22 }),
        template_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 10)
            .unwrap()
            .and_hms_opt(hour, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_outside_hours_excluded() {
        let group = sample_group("g1");
        assert!(group.is_eligible_at(at(8)));
        assert!(group.is_eligible_at(at(21)));
        assert!(!group.is_eligible_at(at(22)));
        assert!(!group.is_eligible_at(at(23)));
        assert_eq!(group.ineligibility_reason(at(23)), Some("outside allowed hours"));
    }

    #[test]
    fn test_quota_reached_excluded() {
        let mut group = sample_group("g1");
        group.sent_today = 5;
        group.counters_date = Some(at(10).date());
        assert!(!group.is_eligible_at(at(10)));
        assert_eq!(group.ineligibility_reason(at(10)), Some("daily limit reached"));
    }

    #[test]
    fn test_stale_counter_does_not_block() {
        let mut group = sample_group("g1");
        group.sent_today = 5;
        group.counters_date = NaiveDate::from_ymd_opt(2026, 3, 9);
        assert!(group.is_eligible_at(at(10)));
    }

    #[test]
    fn test_disabled_excluded() {
        let mut group = sample_group("g1");
        group.sending_enabled = false;
        assert!(!group.is_eligible_at(at(10)));
        group.sending_enabled = true;
        group.is_active = false;
        assert!(!group.is_eligible_at(at(10)));
    }

    #[test]
    fn test_hours_validation() {
        assert!(AllowedHours { start: 8, end: 22 }.validate().is_ok());
        assert!(AllowedHours { start: 0, end: 24 }.validate().is_ok());
        assert!(AllowedHours { start: 22, end: 8 }.validate().is_err());
        assert!(AllowedHours { start: 10, end: 10 }.validate().is_err());
        assert!(AllowedHours { start: 10, end: 25 }.validate().is_err());
    }

    #[test]
    fn test_patch_clears_template() {
        let mut group = sample_group("g1");
        group.template_id = Some(Uuid::new_v4());
        let patch: GroupPatch = serde_json::from_str(r#"{"templateId": null}"#).unwrap();
        group.apply_patch(patch).unwrap();
        assert!(group.template_id.is_none());

        let patch: GroupPatch = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        assert!(patch.template_id.is_none());
    }
}
