//! Domain types — the perishable item and its notification lifecycle.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Item lifecycle status.
///
/// `Active → Expired` happens automatically when the deadline passes;
/// `Active → Removed` and `Expired → Removed` happen only via manual
/// acknowledgment. Nothing ever leaves `Removed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Active,
    Expired,
    Removed,
}

impl ItemStatus {
    /// Stored text form (matches the `items.status` column).
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::Expired => "expired",
            ItemStatus::Removed => "removed",
        }
    }

    /// Parse the stored text form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ItemStatus::Active),
            "expired" => Some(ItemStatus::Expired),
            "removed" => Some(ItemStatus::Removed),
            _ => None,
        }
    }
}

/// A tracked perishable entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Unique id, assigned at creation, immutable.
    pub id: String,
    /// Human label. Not unique; the same dish name recurs across batches.
    pub name: String,
    /// Owning chat id. An item without one is never notifiable.
    pub recipient: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// Expiration instant. Set once at creation, never edited.
    pub expires_at: DateTime<Utc>,
    pub status: ItemStatus,
    /// Daily-digest flag — monotone, false→true exactly once.
    pub notified_daily: bool,
    /// One-hour-warning flag — monotone, false→true exactly once.
    pub notified_one_hour: bool,
    /// Last expired-reminder send time, gating repeat reminders.
    pub last_reminder_at: Option<DateTime<Utc>>,
    /// Stamped when the user writes the item off.
    pub removed_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Create a new active item. The name must be non-empty.
    pub fn new(
        name: &str,
        recipient: i64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            recipient: Some(recipient),
            created_at: now,
            expires_at,
            status: ItemStatus::Active,
            notified_daily: false,
            notified_one_hour: false,
            last_reminder_at: None,
            removed_at: None,
        })
    }

    /// Whether the item is past its deadline at `now`.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether any notification may still be sent for this item.
    pub fn is_notifiable(&self) -> bool {
        self.status != ItemStatus::Removed && self.recipient.is_some()
    }
}

/// Per-recipient daily-digest time preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestPreference {
    pub recipient: i64,
    /// Wall-clock digest time in the scheduler's reference timezone.
    pub digest_time: NaiveTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_round_trip() {
        for status in [ItemStatus::Active, ItemStatus::Expired, ItemStatus::Removed] {
            assert_eq!(ItemStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ItemStatus::parse("bogus"), None);
    }

    #[test]
    fn test_new_item_defaults() {
        let now = Utc::now();
        let item = Item::new("Soup", 42, now + Duration::hours(24), now).unwrap();
        assert_eq!(item.status, ItemStatus::Active);
        assert!(!item.notified_daily);
        assert!(!item.notified_one_hour);
        assert!(item.last_reminder_at.is_none());
        assert_eq!(item.recipient, Some(42));
        assert!(item.is_notifiable());
    }

    #[test]
    fn test_empty_name_rejected() {
        let now = Utc::now();
        assert!(Item::new("", 1, now, now).is_none());
        assert!(Item::new("   ", 1, now, now).is_none());
    }

    #[test]
    fn test_removed_not_notifiable() {
        let now = Utc::now();
        let mut item = Item::new("Stew", 7, now + Duration::hours(1), now).unwrap();
        item.status = ItemStatus::Removed;
        assert!(!item.is_notifiable());
    }

    #[test]
    fn test_past_deadline_boundary() {
        let now = Utc::now();
        let item = Item::new("Kasha", 1, now, now).unwrap();
        // expires_at == now counts as past deadline
        assert!(item.is_past_deadline(now));
        assert!(!item.is_past_deadline(now - Duration::seconds(1)));
    }
}
