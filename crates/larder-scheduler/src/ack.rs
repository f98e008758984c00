//! Manual acknowledgment — the user writes an item off.
//!
//! Invoked out-of-band by the chat-command layer. Transitions the item to
//! `Removed` immediately (no waiting for the next tick) and hands back the
//! recipient's refreshed active list for re-rendering.

use std::sync::Arc;

use larder_core::error::Result;
use larder_core::traits::{Clock, ItemStore};
use larder_core::types::Item;

pub struct AckHandler {
    store: Arc<dyn ItemStore>,
    clock: Arc<dyn Clock>,
}

impl AckHandler {
    pub fn new(store: Arc<dyn ItemStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Write the item off for this recipient and return their remaining
    /// active items. Idempotent: a second acknowledgment (or one for an id
    /// the recipient doesn't own) is a no-op success.
    pub fn acknowledge(&self, recipient: i64, item_id: &str) -> Result<Vec<Item>> {
        let now = self.clock.now();
        let changed = self.store.mark_removed(item_id, recipient, now)?;
        if changed {
            tracing::info!("Item {item_id} written off by {recipient}");
        } else {
            tracing::debug!("Acknowledge no-op for item {item_id} (recipient {recipient})");
        }
        self.store.active_items(recipient)
    }
}
