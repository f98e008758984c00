//! # Larder Core
//!
//! Shared foundation for the Larder perishable-inventory tracker:
//! domain types, configuration, the error taxonomy, and the trait seams
//! (`ItemStore`, `PreferenceStore`, `Notifier`, `Clock`) that the store,
//! scheduler, and channel crates plug into.

pub mod clock;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{ManualClock, SystemClock};
pub use config::LarderConfig;
pub use error::{LarderError, Result};
pub use traits::{Clock, ItemStore, Notifier, PreferenceStore};
pub use types::{DigestPreference, Item, ItemStatus};
