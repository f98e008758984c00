//! # Larder Store
//!
//! SQLite persistence for items and digest preferences — the production
//! implementation of the `ItemStore` and `PreferenceStore` contracts.
//! Survives restarts; the scheduler keeps no cross-tick state outside it.

pub mod sqlite;

pub use sqlite::SqliteStore;
