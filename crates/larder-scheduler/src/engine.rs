//! Tick engine — drives the notification state machine across the item
//! population, batches per recipient, and commits flags only after a
//! confirmed dispatch.
//!
//! A tick never raises a fatal error: the three notification branches have
//! isolated failure domains, a store failure aborts only its own branch, and
//! a dispatch failure affects only that recipient (flags stay uncommitted,
//! so the next tick retries — at-least-once delivery).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

use larder_core::config::SchedulerConfig;
use larder_core::error::{LarderError, Result};
use larder_core::traits::{Clock, ItemStore, Notifier, PreferenceStore};
use larder_core::types::{Item, ItemStatus};

use crate::policy::{self, Decision};
use crate::render;

/// Engine settings resolved once at startup. A bad offset or digest time is
/// a fatal config error; nothing here changes between ticks.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Reference timezone as a fixed UTC offset.
    pub offset: FixedOffset,
    pub digest_tolerance_min: u32,
    /// Digest time for recipients with no stored preference.
    pub default_digest_time: NaiveTime,
    /// Minimum gap between repeat reminders for expired items.
    pub reminder_interval: Duration,
}

impl EngineSettings {
    pub fn from_config(cfg: &SchedulerConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(cfg.utc_offset_hours * 3600).ok_or_else(|| {
            LarderError::Config(format!(
                "invalid utc_offset_hours: {}",
                cfg.utc_offset_hours
            ))
        })?;
        let default_digest_time = NaiveTime::parse_from_str(&cfg.default_digest_time, "%H:%M")
            .map_err(|e| {
                LarderError::Config(format!(
                    "invalid default_digest_time '{}': {e}",
                    cfg.default_digest_time
                ))
            })?;
        Ok(Self {
            offset,
            digest_tolerance_min: cfg.digest_tolerance_min,
            default_digest_time,
            reminder_interval: Duration::minutes(i64::from(cfg.reminder_interval_min)),
        })
    }
}

/// Sent/errored counters for one notification kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    pub sent: u32,
    pub errors: u32,
}

/// Structured summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub daily: KindStats,
    pub one_hour: KindStats,
    pub expired: KindStats,
}

impl TickOutcome {
    pub fn total_sent(&self) -> u32 {
        self.daily.sent + self.one_hour.sent + self.expired.sent
    }

    pub fn total_errors(&self) -> u32 {
        self.daily.errors + self.one_hour.errors + self.expired.errors
    }
}

/// The expiration scheduler engine. Stateless between ticks; all cross-tick
/// state lives in the item store.
pub struct ExpiryEngine {
    store: Arc<dyn ItemStore>,
    prefs: Arc<dyn PreferenceStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl ExpiryEngine {
    pub fn new(
        store: Arc<dyn ItemStore>,
        prefs: Arc<dyn PreferenceStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            prefs,
            notifier,
            clock,
            settings,
        }
    }

    /// Run one tick. Reads the clock exactly once so every evaluation in the
    /// tick shares one consistent `now`.
    pub async fn run_tick(&self) -> TickOutcome {
        let now = self.clock.now();

        TickOutcome {
            daily: self
                .run_daily_digest(now)
                .await
                .unwrap_or_else(|e| branch_aborted("daily digest", e)),
            one_hour: self
                .run_one_hour(now)
                .await
                .unwrap_or_else(|e| branch_aborted("one-hour", e)),
            expired: self
                .run_expiry(now)
                .await
                .unwrap_or_else(|e| branch_aborted("expiry", e)),
        }
    }

    /// Daily digest branch. Each recipient's digest time is resolved
    /// independently, defaulting on absence — there is no global fallback
    /// branch, so one recipient's configuration never affects another's
    /// coverage.
    async fn run_daily_digest(&self, now: DateTime<Utc>) -> Result<KindStats> {
        let (day_start, day_end) = policy::local_day_window(now, self.settings.offset);
        let candidates = self.store.daily_digest_candidates(day_start, day_end)?;
        let permitted: Vec<Item> = candidates
            .into_iter()
            .filter(|i| policy::evaluate_daily_digest(i, day_start) == Decision::Permit)
            .collect();

        let local_now = now.with_timezone(&self.settings.offset).time();
        let mut stats = KindStats::default();

        for (recipient, items) in group_by_recipient(permitted) {
            let digest_time = match self.prefs.digest_preference(recipient) {
                Ok(stored) => stored.unwrap_or(self.settings.default_digest_time),
                Err(e) => {
                    tracing::warn!("Digest preference lookup failed for {recipient}: {e}");
                    stats.errors += 1;
                    continue;
                }
            };
            if !policy::digest_due(digest_time, local_now, self.settings.digest_tolerance_min) {
                continue;
            }

            let text = render::daily_digest(&items, self.settings.offset);
            match self.notifier.send(recipient, &text).await {
                Ok(()) => {
                    if let Err(e) = self.store.mark_notified_daily(&ids(&items)) {
                        tracing::error!("Daily flag commit failed for {recipient}: {e}");
                        stats.errors += 1;
                    } else {
                        tracing::info!(
                            "Daily digest sent to {recipient} ({} items)",
                            items.len()
                        );
                        stats.sent += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("Daily digest dispatch to {recipient} failed: {e}");
                    stats.errors += 1;
                }
            }
        }
        Ok(stats)
    }

    /// One-hour warning branch.
    async fn run_one_hour(&self, now: DateTime<Utc>) -> Result<KindStats> {
        let from = now + Duration::minutes(policy::ONE_HOUR_WINDOW_MIN);
        let to = now + Duration::minutes(policy::ONE_HOUR_WINDOW_MAX);
        let candidates = self.store.one_hour_candidates(from, to)?;
        let permitted: Vec<Item> = candidates
            .into_iter()
            .filter(|i| policy::evaluate_one_hour(i, now) == Decision::Permit)
            .collect();

        let mut stats = KindStats::default();
        for (recipient, items) in group_by_recipient(permitted) {
            let text = render::one_hour_warning(&items);
            match self.notifier.send(recipient, &text).await {
                Ok(()) => {
                    if let Err(e) = self.store.mark_notified_one_hour(&ids(&items)) {
                        tracing::error!("One-hour flag commit failed for {recipient}: {e}");
                        stats.errors += 1;
                    } else {
                        tracing::info!(
                            "One-hour warning sent to {recipient} ({} items)",
                            items.len()
                        );
                        stats.sent += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("One-hour dispatch to {recipient} failed: {e}");
                    stats.errors += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Expiry branch: first notices for newly overdue items plus rate-gated
    /// repeat reminders for items already expired but not written off.
    async fn run_expiry(&self, now: DateTime<Utc>) -> Result<KindStats> {
        let candidates = self.store.expiry_candidates(now)?;
        let permitted: Vec<Item> = candidates
            .into_iter()
            .filter(|i| {
                policy::evaluate_expiry(i, now, self.settings.reminder_interval)
                    == Decision::Permit
            })
            .collect();

        let mut stats = KindStats::default();
        for (recipient, items) in group_by_recipient(permitted) {
            let text = render::expired_alert(&items);
            match self.notifier.send(recipient, &text).await {
                Ok(()) => {
                    let newly: Vec<String> = items
                        .iter()
                        .filter(|i| i.status == ItemStatus::Active)
                        .map(|i| i.id.clone())
                        .collect();
                    let repeats: Vec<String> = items
                        .iter()
                        .filter(|i| i.status == ItemStatus::Expired)
                        .map(|i| i.id.clone())
                        .collect();

                    let commit = self
                        .store
                        .mark_expired(&newly, now)
                        .and_then(|_| self.store.touch_reminder(&repeats, now));
                    match commit {
                        Ok(()) => {
                            tracing::info!(
                                "Expiry alert sent to {recipient} ({} new, {} repeat)",
                                newly.len(),
                                repeats.len()
                            );
                            stats.sent += 1;
                        }
                        Err(e) => {
                            tracing::error!("Expiry commit failed for {recipient}: {e}");
                            stats.errors += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Expiry dispatch to {recipient} failed: {e}");
                    stats.errors += 1;
                }
            }
        }
        Ok(stats)
    }
}

fn branch_aborted(kind: &str, e: LarderError) -> KindStats {
    tracing::error!("{kind} branch aborted this tick: {e}");
    KindStats { sent: 0, errors: 1 }
}

fn ids(items: &[Item]) -> Vec<String> {
    items.iter().map(|i| i.id.clone()).collect()
}

/// Group candidates by recipient in deterministic order. Items without a
/// recipient cannot be dispatched; they are logged and skipped, never a
/// tick failure.
fn group_by_recipient(items: Vec<Item>) -> BTreeMap<i64, Vec<Item>> {
    let mut groups: BTreeMap<i64, Vec<Item>> = BTreeMap::new();
    for item in items {
        match item.recipient {
            Some(recipient) => groups.entry(recipient).or_default().push(item),
            None => tracing::warn!(
                "Item {} ('{}') has no recipient; excluded from dispatch",
                item.id,
                item.name
            ),
        }
    }
    groups
}

/// Run the engine on a fixed interval as a background task. Ticks are
/// strictly sequential: a tick that overruns the interval delays the next
/// one instead of running concurrently with it.
pub async fn spawn_scheduler(engine: Arc<ExpiryEngine>, tick_secs: u64) {
    tracing::info!("Expiry scheduler started (tick every {tick_secs}s)");

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let outcome = engine.run_tick().await;
        if outcome.total_sent() > 0 || outcome.total_errors() > 0 {
            tracing::info!(
                "Tick summary: daily {}/{}, one-hour {}/{}, expired {}/{} (sent/errors)",
                outcome.daily.sent,
                outcome.daily.errors,
                outcome.one_hour.sent,
                outcome.one_hour.errors,
                outcome.expired.sent,
                outcome.expired.errors,
            );
        }
    }
}
