//! Per-item notification state machine.
//!
//! Pure decisions over `(item, instant)` — no I/O, no clock reads. The
//! engine queries candidates, asks these functions whether a send is
//! currently permitted, and commits the resulting flag/status mutation only
//! after dispatch succeeds. Skip is a normal outcome, never an error.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Timelike, Utc};

use larder_core::types::{Item, ItemStatus};

/// Lower edge of the one-hour warning window, minutes before expiry.
pub const ONE_HOUR_WINDOW_MIN: i64 = 55;
/// Upper edge of the one-hour warning window, minutes before expiry.
/// A tolerance band rather than an exact instant: tick granularity can be
/// coarser than a minute, and a tight window would miss or double-fire
/// across tick boundaries.
pub const ONE_HOUR_WINDOW_MAX: i64 = 65;

/// Outcome of a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Permit,
    Skip,
}

/// Daily digest: permitted once per item, on the item's expiry day.
///
/// `today_start` is local midnight (reference timezone) expressed in UTC;
/// the window is half-open `[today_start, today_start + 24h)`.
pub fn evaluate_daily_digest(item: &Item, today_start: DateTime<Utc>) -> Decision {
    let today_end = today_start + Duration::hours(24);
    if item.status == ItemStatus::Active
        && !item.notified_daily
        && item.expires_at >= today_start
        && item.expires_at < today_end
    {
        Decision::Permit
    } else {
        Decision::Skip
    }
}

/// One-hour warning: permitted once, when expiry falls in
/// `[now + 55min, now + 65min]`.
pub fn evaluate_one_hour(item: &Item, now: DateTime<Utc>) -> Decision {
    let from = now + Duration::minutes(ONE_HOUR_WINDOW_MIN);
    let to = now + Duration::minutes(ONE_HOUR_WINDOW_MAX);
    if item.status == ItemStatus::Active
        && !item.notified_one_hour
        && item.expires_at >= from
        && item.expires_at <= to
    {
        Decision::Permit
    } else {
        Decision::Skip
    }
}

/// Expiry alert: permitted when the deadline has passed and the item is not
/// removed. An already-expired item is re-permitted (repeat reminder) only
/// once `reminder_interval` has elapsed since the last reminder, bounding
/// notification volume for long-unacknowledged items.
pub fn evaluate_expiry(item: &Item, now: DateTime<Utc>, reminder_interval: Duration) -> Decision {
    if item.status == ItemStatus::Removed || item.expires_at > now {
        return Decision::Skip;
    }
    match item.status {
        ItemStatus::Active => Decision::Permit,
        ItemStatus::Expired => match item.last_reminder_at {
            None => Decision::Permit,
            Some(last) => {
                if now - last >= reminder_interval {
                    Decision::Permit
                } else {
                    Decision::Skip
                }
            }
        },
        ItemStatus::Removed => Decision::Skip,
    }
}

/// Whether a recipient's digest is due at this tick: the local wall-clock
/// time is within `[digest_time, digest_time + tolerance)`. Forward-only,
/// so a digest never fires before the configured time; wraps across
/// midnight.
pub fn digest_due(digest_time: NaiveTime, local_now: NaiveTime, tolerance_min: u32) -> bool {
    let now_min = i64::from(local_now.hour() * 60 + local_now.minute());
    let pref_min = i64::from(digest_time.hour() * 60 + digest_time.minute());
    (now_min - pref_min).rem_euclid(24 * 60) < i64::from(tolerance_min)
}

/// The local day containing `now` in the reference timezone, as a UTC
/// half-open window `[start, start + 24h)`.
pub fn local_day_window(now: DateTime<Utc>, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local = now.with_timezone(&offset);
    let since_midnight = Duration::seconds(i64::from(local.time().num_seconds_from_midnight()))
        + Duration::nanoseconds(i64::from(local.time().nanosecond()));
    let start = now - since_midnight;
    (start, start + Duration::hours(24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn item(expires_in: Duration) -> Item {
        Item::new("Soup", 1, t0() + expires_in, t0()).unwrap()
    }

    #[test]
    fn test_one_hour_window_edges() {
        let now = t0();
        assert_eq!(evaluate_one_hour(&item(Duration::minutes(55)), now), Decision::Permit);
        assert_eq!(evaluate_one_hour(&item(Duration::minutes(60)), now), Decision::Permit);
        assert_eq!(evaluate_one_hour(&item(Duration::minutes(65)), now), Decision::Permit);
        assert_eq!(evaluate_one_hour(&item(Duration::minutes(54)), now), Decision::Skip);
        assert_eq!(evaluate_one_hour(&item(Duration::minutes(66)), now), Decision::Skip);
    }

    #[test]
    fn test_one_hour_out_of_order_ticks() {
        // Item expiring at T; a tick at T-61min is before the window opens
        let expires_at = t0() + Duration::minutes(120);
        let soup = Item::new("Soup", 1, expires_at, t0()).unwrap();

        let early_tick = expires_at - Duration::minutes(61);
        assert_eq!(evaluate_one_hour(&soup, early_tick), Decision::Skip);

        let on_time_tick = expires_at - Duration::minutes(60);
        assert_eq!(evaluate_one_hour(&soup, on_time_tick), Decision::Permit);
    }

    #[test]
    fn test_one_hour_flag_blocks_resend() {
        let mut soup = item(Duration::minutes(60));
        assert_eq!(evaluate_one_hour(&soup, t0()), Decision::Permit);
        soup.notified_one_hour = true;
        assert_eq!(evaluate_one_hour(&soup, t0()), Decision::Skip);
    }

    #[test]
    fn test_daily_digest_window_half_open() {
        let (start, _) = local_day_window(t0(), FixedOffset::east_opt(0).unwrap());
        let at_start = Item::new("A", 1, start, t0()).unwrap();
        let at_end = Item::new("B", 1, start + Duration::hours(24), t0()).unwrap();
        let inside = Item::new("C", 1, start + Duration::hours(23), t0()).unwrap();

        assert_eq!(evaluate_daily_digest(&at_start, start), Decision::Permit);
        assert_eq!(evaluate_daily_digest(&inside, start), Decision::Permit);
        assert_eq!(evaluate_daily_digest(&at_end, start), Decision::Skip);
    }

    #[test]
    fn test_daily_digest_flag_and_status_gate() {
        let (start, _) = local_day_window(t0(), FixedOffset::east_opt(0).unwrap());
        let mut soup = Item::new("Soup", 1, start + Duration::hours(20), t0()).unwrap();
        assert_eq!(evaluate_daily_digest(&soup, start), Decision::Permit);

        soup.notified_daily = true;
        assert_eq!(evaluate_daily_digest(&soup, start), Decision::Skip);

        soup.notified_daily = false;
        soup.status = ItemStatus::Expired;
        assert_eq!(evaluate_daily_digest(&soup, start), Decision::Skip);
    }

    #[test]
    fn test_expiry_permits_active_past_deadline() {
        let soup = item(Duration::seconds(-1));
        assert_eq!(
            evaluate_expiry(&soup, t0(), Duration::hours(1)),
            Decision::Permit
        );
    }

    #[test]
    fn test_expiry_skips_future_and_removed() {
        let fresh = item(Duration::hours(2));
        assert_eq!(evaluate_expiry(&fresh, t0(), Duration::hours(1)), Decision::Skip);

        let mut gone = item(Duration::seconds(-10));
        gone.status = ItemStatus::Removed;
        assert_eq!(evaluate_expiry(&gone, t0(), Duration::hours(1)), Decision::Skip);
    }

    #[test]
    fn test_expiry_repeat_reminder_gate() {
        let mut soup = item(Duration::hours(-2));
        soup.status = ItemStatus::Expired;
        soup.last_reminder_at = Some(t0() - Duration::minutes(30));

        // Within the interval: skip
        assert_eq!(evaluate_expiry(&soup, t0(), Duration::hours(1)), Decision::Skip);

        // Interval elapsed: permit again
        let later = t0() + Duration::minutes(31);
        assert_eq!(evaluate_expiry(&soup, later, Duration::hours(1)), Decision::Permit);
    }

    #[test]
    fn test_digest_due_forward_window() {
        let pref = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();

        assert!(digest_due(pref, at(10, 0), 15));
        assert!(digest_due(pref, at(10, 14), 15));
        assert!(!digest_due(pref, at(10, 15), 15));
        // Never before the configured time
        assert!(!digest_due(pref, at(9, 59), 15));
    }

    #[test]
    fn test_digest_due_wraps_midnight() {
        let pref = NaiveTime::from_hms_opt(23, 55, 0).unwrap();
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();

        assert!(digest_due(pref, at(23, 59), 15));
        assert!(digest_due(pref, at(0, 5), 15));
        assert!(!digest_due(pref, at(0, 10), 15));
    }

    #[test]
    fn test_local_day_window_with_offset() {
        // 12:00 UTC at UTC+3 is 15:00 local; local midnight is 21:00 UTC
        // the previous day.
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let (start, end) = local_day_window(t0(), offset);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 9, 21, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 10, 21, 0, 0).unwrap());
    }
}
