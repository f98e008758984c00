//! Notification message bodies — one combined message per recipient per
//! notification kind, never one message per item.

use chrono::{DateTime, FixedOffset, Utc};

use larder_core::types::Item;

/// "HH:MM" in the reference timezone.
pub fn format_local_time(t: DateTime<Utc>, offset: FixedOffset) -> String {
    t.with_timezone(&offset).format("%H:%M").to_string()
}

/// Daily digest: everything expiring today for one recipient.
pub fn daily_digest(items: &[Item], offset: FixedOffset) -> String {
    let mut lines = vec!["⚠ Expiring today:".to_string()];
    for item in items {
        lines.push(format!(
            "• {} — until {}",
            item.name,
            format_local_time(item.expires_at, offset)
        ));
    }
    lines.join("\n")
}

/// One-hour warning for one recipient.
pub fn one_hour_warning(items: &[Item]) -> String {
    let mut lines = vec!["⏳ Expiring in 1 hour:".to_string()];
    for item in items {
        lines.push(format!("• {}", item.name));
    }
    lines.join("\n")
}

/// Expired alert for one recipient. Repeats until the item is written off.
pub fn expired_alert(items: &[Item]) -> String {
    items
        .iter()
        .map(|item| format!("❌ Expired: {}. Write-off required.", item.name))
        .collect::<Vec<_>>()
        .join("\n")
}
