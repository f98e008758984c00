//! SQLite-backed item and preference store.
//!
//! Timestamps are stored as fixed-width RFC 3339 text in UTC so the
//! time-window filters can compare them lexicographically in SQL.

use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

use larder_core::error::{LarderError, Result};
use larder_core::traits::{ItemStore, PreferenceStore};
use larder_core::types::{Item, ItemStatus};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| LarderError::Store(format!("DB open: {e}")))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LarderError::Store(format!("DB open: {e}")))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                recipient INTEGER,                     -- owning chat id, may be NULL on legacy rows
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active', -- 'active', 'expired', 'removed'
                notified_daily INTEGER NOT NULL DEFAULT 0,
                notified_one_hour INTEGER NOT NULL DEFAULT 0,
                last_reminder_at TEXT,
                removed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_items_status_expires
                ON items (status, expires_at);
            CREATE INDEX IF NOT EXISTS idx_items_recipient
                ON items (recipient);

            CREATE TABLE IF NOT EXISTS digest_preferences (
                recipient INTEGER PRIMARY KEY,
                digest_time TEXT NOT NULL              -- 'HH:MM' in the reference timezone
            );
         ",
        )
        .map_err(|e| LarderError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LarderError::Store(format!("Connection lock poisoned: {e}")))
    }

    /// Run a SELECT over the item columns, skipping malformed rows with a
    /// warning. A malformed row (unparseable timestamp or unknown status)
    /// must never be silently treated as active or expired.
    fn query_items(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Item>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| LarderError::Store(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map(params, read_raw_row)
            .map_err(|e| LarderError::Store(format!("Query: {e}")))?;

        let mut items = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| LarderError::Store(format!("Row: {e}")))?;
            match raw.into_item() {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!("Excluding malformed item row: {e}"),
            }
        }
        Ok(items)
    }

    /// Batch UPDATE over an id set; `set_clause` may reference ?1.
    fn update_by_ids(
        &self,
        set_clause: &str,
        guard_clause: &str,
        first_param: Option<String>,
        ids: &[String],
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let offset = if first_param.is_some() { 2 } else { 1 };
        let placeholders: Vec<String> =
            (0..ids.len()).map(|i| format!("?{}", i + offset)).collect();
        let sql = format!(
            "UPDATE items SET {set_clause} WHERE id IN ({}) {guard_clause}",
            placeholders.join(", ")
        );

        let mut params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(ids.len() + 1);
        if let Some(p) = &first_param {
            params.push(p);
        }
        for id in ids {
            params.push(id);
        }

        let conn = self.lock()?;
        conn.execute(&sql, params.as_slice())
            .map_err(|e| LarderError::Store(format!("Batch update: {e}")))
    }
}

const ITEM_COLUMNS: &str = "id, name, recipient, created_at, expires_at, status, \
                            notified_daily, notified_one_hour, last_reminder_at, removed_at";

impl ItemStore for SqliteStore {
    fn insert_item(&self, item: &Item) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO items
             (id, name, recipient, created_at, expires_at, status,
              notified_daily, notified_one_hour, last_reminder_at, removed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                item.id,
                item.name,
                item.recipient,
                ts(item.created_at),
                ts(item.expires_at),
                item.status.as_str(),
                item.notified_daily as i32,
                item.notified_one_hour as i32,
                item.last_reminder_at.map(ts),
                item.removed_at.map(ts),
            ],
        )
        .map_err(|e| LarderError::Store(format!("Insert item: {e}")))?;
        Ok(())
    }

    fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let mut items = self.query_items(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
            rusqlite::params![id],
        )?;
        Ok(items.pop())
    }

    fn active_items(&self, recipient: i64) -> Result<Vec<Item>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 WHERE recipient = ?1 AND status = 'active'
                 ORDER BY expires_at"
            ),
            rusqlite::params![recipient],
        )
    }

    fn written_off_items(&self, recipient: i64, limit: usize) -> Result<Vec<Item>> {
        let limit = limit as i64;
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 WHERE recipient = ?1 AND status IN ('removed', 'expired')
                 ORDER BY created_at DESC LIMIT ?2"
            ),
            rusqlite::params![recipient, limit],
        )
    }

    fn daily_digest_candidates(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Item>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 WHERE status = 'active' AND notified_daily = 0
                   AND expires_at >= ?1 AND expires_at < ?2
                 ORDER BY expires_at"
            ),
            rusqlite::params![ts(start), ts(end)],
        )
    }

    fn one_hour_candidates(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Item>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 WHERE status = 'active' AND notified_one_hour = 0
                   AND expires_at >= ?1 AND expires_at <= ?2
                 ORDER BY expires_at"
            ),
            rusqlite::params![ts(from), ts(to)],
        )
    }

    fn expiry_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Item>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 WHERE status IN ('active', 'expired') AND expires_at <= ?1
                 ORDER BY expires_at"
            ),
            rusqlite::params![ts(now)],
        )
    }

    fn mark_notified_daily(&self, ids: &[String]) -> Result<()> {
        self.update_by_ids("notified_daily = 1", "AND notified_daily = 0", None, ids)?;
        Ok(())
    }

    fn mark_notified_one_hour(&self, ids: &[String]) -> Result<()> {
        self.update_by_ids("notified_one_hour = 1", "AND notified_one_hour = 0", None, ids)?;
        Ok(())
    }

    fn mark_expired(&self, ids: &[String], reminded_at: DateTime<Utc>) -> Result<()> {
        self.update_by_ids(
            "status = 'expired', last_reminder_at = ?1",
            "AND status = 'active'",
            Some(ts(reminded_at)),
            ids,
        )?;
        Ok(())
    }

    fn touch_reminder(&self, ids: &[String], at: DateTime<Utc>) -> Result<()> {
        self.update_by_ids(
            "last_reminder_at = ?1",
            "AND status = 'expired'",
            Some(ts(at)),
            ids,
        )?;
        Ok(())
    }

    fn mark_removed(&self, id: &str, recipient: i64, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE items SET status = 'removed', removed_at = ?1
                 WHERE id = ?2 AND recipient = ?3 AND status != 'removed'",
                rusqlite::params![ts(at), id, recipient],
            )
            .map_err(|e| LarderError::Store(format!("Mark removed: {e}")))?;
        Ok(changed > 0)
    }
}

impl PreferenceStore for SqliteStore {
    fn digest_preference(&self, recipient: i64) -> Result<Option<NaiveTime>> {
        let conn = self.lock()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT digest_time FROM digest_preferences WHERE recipient = ?1",
                [recipient],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(LarderError::Store(format!("Preference query: {e}"))),
            })?;

        match stored {
            None => Ok(None),
            Some(s) => {
                match NaiveTime::parse_from_str(&s, "%H:%M") {
                    Ok(t) => Ok(Some(t)),
                    Err(_) => {
                        // A corrupt preference falls back to the default time
                        // rather than silencing the recipient's digest.
                        tracing::warn!("Invalid digest_time '{s}' for recipient {recipient}");
                        Ok(None)
                    }
                }
            }
        }
    }

    fn set_digest_preference(&self, recipient: i64, time: NaiveTime) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO digest_preferences (recipient, digest_time) VALUES (?1, ?2)",
            rusqlite::params![recipient, time.format("%H:%M").to_string()],
        )
        .map_err(|e| LarderError::Store(format!("Set preference: {e}")))?;
        Ok(())
    }
}

/// Fixed-width RFC 3339 in UTC (no sub-second part), lexicographically
/// comparable in SQL.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc))
}

/// Raw row as stored — converted (and validated) outside the rusqlite
/// callback so malformed rows surface as `MalformedItem`, not query errors.
struct RawItemRow {
    id: String,
    name: String,
    recipient: Option<i64>,
    created_at: String,
    expires_at: String,
    status: String,
    notified_daily: bool,
    notified_one_hour: bool,
    last_reminder_at: Option<String>,
    removed_at: Option<String>,
}

fn read_raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawItemRow> {
    Ok(RawItemRow {
        id: row.get(0)?,
        name: row.get(1)?,
        recipient: row.get(2)?,
        created_at: row.get(3)?,
        expires_at: row.get(4)?,
        status: row.get(5)?,
        notified_daily: row.get::<_, i32>(6)? != 0,
        notified_one_hour: row.get::<_, i32>(7)? != 0,
        last_reminder_at: row.get(8)?,
        removed_at: row.get(9)?,
    })
}

impl RawItemRow {
    fn into_item(self) -> Result<Item> {
        let malformed = |reason: String| LarderError::MalformedItem {
            id: self.id.clone(),
            reason,
        };

        let expires_at = parse_ts(&self.expires_at)
            .map_err(|e| malformed(format!("invalid expires_at '{}': {e}", self.expires_at)))?;
        let created_at = parse_ts(&self.created_at)
            .map_err(|e| malformed(format!("invalid created_at '{}': {e}", self.created_at)))?;
        let status = ItemStatus::parse(&self.status)
            .ok_or_else(|| malformed(format!("unknown status '{}'", self.status)))?;
        let last_reminder_at = match &self.last_reminder_at {
            None => None,
            Some(s) => Some(
                parse_ts(s).map_err(|e| malformed(format!("invalid last_reminder_at: {e}")))?,
            ),
        };
        let removed_at = match &self.removed_at {
            None => None,
            Some(s) => {
                Some(parse_ts(s).map_err(|e| malformed(format!("invalid removed_at: {e}")))?)
            }
        };

        Ok(Item {
            id: self.id,
            name: self.name,
            recipient: self.recipient,
            created_at,
            expires_at,
            status,
            notified_daily: self.notified_daily,
            notified_one_hour: self.notified_one_hour,
            last_reminder_at,
            removed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn add(store: &SqliteStore, name: &str, recipient: i64, expires_in: Duration) -> Item {
        let item = Item::new(name, recipient, t0() + expires_in, t0()).unwrap();
        store.insert_item(&item).unwrap();
        item
    }

    #[test]
    fn test_insert_and_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = add(&store, "Soup", 1, Duration::hours(24));

        let loaded = store.get_item(&item.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Soup");
        assert_eq!(loaded.recipient, Some(1));
        assert_eq!(loaded.status, ItemStatus::Active);
        assert_eq!(loaded.expires_at, item.expires_at);
        assert!(!loaded.notified_daily);
    }

    #[test]
    fn test_one_hour_candidates_window() {
        let store = SqliteStore::open_in_memory().unwrap();
        let inside = add(&store, "Borscht", 1, Duration::minutes(60));
        add(&store, "Too soon", 1, Duration::minutes(50));
        add(&store, "Too late", 1, Duration::minutes(70));

        let found = store
            .one_hour_candidates(t0() + Duration::minutes(55), t0() + Duration::minutes(65))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, inside.id);
    }

    #[test]
    fn test_one_hour_candidates_skip_already_notified() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = add(&store, "Borscht", 1, Duration::minutes(60));
        store.mark_notified_one_hour(&[item.id.clone()]).unwrap();

        let found = store
            .one_hour_candidates(t0() + Duration::minutes(55), t0() + Duration::minutes(65))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_daily_candidates_half_open_window() {
        let store = SqliteStore::open_in_memory().unwrap();
        let day_start = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        let day_end = day_start + Duration::hours(24);

        let at_start = Item::new("At start", 1, day_start, t0()).unwrap();
        let at_end = Item::new("At end", 1, day_end, t0()).unwrap();
        store.insert_item(&at_start).unwrap();
        store.insert_item(&at_end).unwrap();

        let found = store.daily_digest_candidates(day_start, day_end).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, at_start.id);
    }

    #[test]
    fn test_expiry_candidates_and_transition() {
        let store = SqliteStore::open_in_memory().unwrap();
        let overdue = add(&store, "Old soup", 1, Duration::seconds(-1));
        add(&store, "Fresh", 1, Duration::hours(5));

        let now = t0();
        let found = store.expiry_candidates(now).unwrap();
        assert_eq!(found.len(), 1);

        store.mark_expired(&[overdue.id.clone()], now).unwrap();
        let loaded = store.get_item(&overdue.id).unwrap().unwrap();
        assert_eq!(loaded.status, ItemStatus::Expired);
        assert_eq!(loaded.last_reminder_at, Some(now));

        // Still a candidate as an expired repeat; gate is applied by the caller
        assert_eq!(store.expiry_candidates(now).unwrap().len(), 1);
    }

    #[test]
    fn test_removed_excluded_from_all_candidate_queries() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = add(&store, "Soup", 1, Duration::seconds(-1));
        assert!(store.mark_removed(&item.id, 1, t0()).unwrap());

        assert!(store.expiry_candidates(t0()).unwrap().is_empty());
        assert!(
            store
                .daily_digest_candidates(t0() - Duration::hours(12), t0() + Duration::hours(12))
                .unwrap()
                .is_empty()
        );
        assert!(
            store
                .one_hour_candidates(t0() - Duration::hours(2), t0() + Duration::hours(2))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_mark_removed_is_idempotent_and_recipient_scoped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = add(&store, "Soup", 1, Duration::hours(1));

        // Wrong recipient: no-op
        assert!(!store.mark_removed(&item.id, 99, t0()).unwrap());
        assert_eq!(
            store.get_item(&item.id).unwrap().unwrap().status,
            ItemStatus::Active
        );

        assert!(store.mark_removed(&item.id, 1, t0()).unwrap());
        // Second call observes 'removed' and is a no-op success
        assert!(!store.mark_removed(&item.id, 1, t0()).unwrap());
        let loaded = store.get_item(&item.id).unwrap().unwrap();
        assert_eq!(loaded.status, ItemStatus::Removed);
        assert_eq!(loaded.removed_at, Some(t0()));
    }

    #[test]
    fn test_malformed_row_excluded_not_defaulted() {
        let store = SqliteStore::open_in_memory().unwrap();
        add(&store, "Good", 1, Duration::seconds(-10));
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO items (id, name, recipient, created_at, expires_at, status)
                 VALUES ('bad-row', 'Mystery', 1, ?1, 'not-a-timestamp', 'active')",
                [ts(t0())],
            )
            .unwrap();
        }

        // The malformed row is excluded, the good row still comes back
        let found = store.expiry_candidates(t0()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Good");
    }

    #[test]
    fn test_written_off_listing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let removed = add(&store, "Removed one", 1, Duration::hours(1));
        let expired = add(&store, "Expired one", 1, Duration::seconds(-5));
        add(&store, "Active one", 1, Duration::hours(3));
        store.mark_removed(&removed.id, 1, t0()).unwrap();
        store.mark_expired(&[expired.id.clone()], t0()).unwrap();

        let listed = store.written_off_items(1, 50).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|i| i.status != ItemStatus::Active));
    }

    #[test]
    fn test_digest_preference_default_on_absence() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.digest_preference(1).unwrap().is_none());

        let nine_thirty = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        store.set_digest_preference(1, nine_thirty).unwrap();
        assert_eq!(store.digest_preference(1).unwrap(), Some(nine_thirty));

        // Other recipients are unaffected
        assert!(store.digest_preference(2).unwrap().is_none());
    }

    #[test]
    fn test_flag_updates_are_monotone() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = add(&store, "Soup", 1, Duration::minutes(60));

        store.mark_notified_daily(&[item.id.clone()]).unwrap();
        store.mark_notified_daily(&[item.id.clone()]).unwrap();
        let loaded = store.get_item(&item.id).unwrap().unwrap();
        assert!(loaded.notified_daily);
        assert!(!loaded.notified_one_hour);
    }
}
