//! # Larder Scheduler
//!
//! The expiration notification core: a per-item state machine deciding which
//! notification kinds are currently permitted, and a tick engine that queries
//! candidates, batches them per recipient, dispatches, and commits flags only
//! after a confirmed send.
//!
//! ## Architecture
//! ```text
//! tick (tokio interval or --once)
//!   ├── read clock once
//!   ├── daily digest branch   — per-recipient digest time, today's window
//!   ├── one-hour branch       — expires in [now+55m, now+65m]
//!   └── expiry branch         — expires_at <= now, repeat gated at 1h
//!        each: query → policy → group by recipient → send → commit flags
//! ```
//!
//! The engine is stateless between ticks; everything that matters lives in
//! the item store, which makes a failed or skipped tick safe to retry.

pub mod ack;
pub mod engine;
pub mod policy;
pub mod render;

pub use ack::AckHandler;
pub use engine::{EngineSettings, ExpiryEngine, KindStats, TickOutcome, spawn_scheduler};
pub use policy::Decision;
