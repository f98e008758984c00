//! Trait seams between the core and its collaborators.
//!
//! The scheduler depends only on these contracts; `larder-store` and
//! `larder-telegram` provide the production implementations, and tests swap
//! in fakes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};

use crate::error::Result;
use crate::types::Item;

/// Time source. The scheduler reads it exactly once per tick so every
/// evaluation in a tick shares one consistent `now`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Durable item table, queryable by status/time filters with batch updates.
///
/// Candidate queries must already exclude `removed` rows and rows whose
/// stored timestamps cannot be parsed (those are logged by the
/// implementation as malformed and never silently defaulted).
pub trait ItemStore: Send + Sync {
    fn insert_item(&self, item: &Item) -> Result<()>;

    fn get_item(&self, id: &str) -> Result<Option<Item>>;

    /// Active items for one recipient, soonest expiry first.
    fn active_items(&self, recipient: i64) -> Result<Vec<Item>>;

    /// Removed and expired items for one recipient, newest first.
    fn written_off_items(&self, recipient: i64, limit: usize) -> Result<Vec<Item>>;

    /// Active, not yet daily-notified, expiring within `[start, end)`.
    fn daily_digest_candidates(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Item>>;

    /// Active, not yet one-hour-notified, expiring within `[from, to]`.
    fn one_hour_candidates(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Item>>;

    /// Active or expired items with `expires_at <= now`. The repeat-reminder
    /// interval gate is applied by the caller, not the query.
    fn expiry_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Item>>;

    /// Flag commits — called only after a successful dispatch. Flags are
    /// monotone: these set true / advance timestamps, never the reverse.
    fn mark_notified_daily(&self, ids: &[String]) -> Result<()>;
    fn mark_notified_one_hour(&self, ids: &[String]) -> Result<()>;

    /// Transition `active → expired` and stamp the first reminder time.
    fn mark_expired(&self, ids: &[String], reminded_at: DateTime<Utc>) -> Result<()>;

    /// Advance `last_reminder_at` for already-expired items.
    fn touch_reminder(&self, ids: &[String], at: DateTime<Utc>) -> Result<()>;

    /// Transition to `removed` for the given recipient's item. Returns true
    /// if a row actually transitioned; acknowledging an already-removed item
    /// is a no-op success returning false.
    fn mark_removed(&self, id: &str, recipient: i64, at: DateTime<Utc>) -> Result<bool>;
}

/// Per-recipient daily-digest time preferences.
pub trait PreferenceStore: Send + Sync {
    /// Stored preference, or None when the recipient has no record
    /// (the default digest time then applies).
    fn digest_preference(&self, recipient: i64) -> Result<Option<NaiveTime>>;

    fn set_digest_preference(&self, recipient: i64, time: NaiveTime) -> Result<()>;
}

/// Outbound message delivery. Success/failure is all the scheduler needs;
/// a failure leaves notification flags uncommitted so the next tick retries.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: i64, text: &str) -> Result<()>;
}
