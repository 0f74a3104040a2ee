//! # VetDesk Queue Engine
//!
//! This crate provides the queue and room scheduling engine for the VetDesk
//! front desk stack. It owns the waiting-entry lifecycle, the priority and
//! lapse policy for scheduled appointments, the concurrency-safe "call
//! next" claim, and the background jobs that keep the queue and the room
//! registry honest.
//!
//! ## Features
//!
//! - **Entry lifecycle**: `WAITING → CALLED → IN_PROGRESS → COMPLETED`
//!   with `CANCELLED` reachable from any non-terminal status
//! - **Priority ordering**: emergency before high before normal, FIFO
//!   within a tier
//! - **Appointment lapse policy**: a scheduled appointment more than the
//!   grace window late re-enters the queue as an ordinary walk-in
//! - **Atomic claims**: concurrent "call next" requests can never claim
//!   the same entry, and two staff members can never win the same room
//! - **Background jobs**: an escalation sweep for overdue appointments and
//!   an occupancy reaper for abandoned room check-ins
//! - **Database integration**: persistent storage over SQLite with sqlx
//!
//! ## Architecture
//!
//! - [`scheduler`]: central coordination of every entry and room mutation
//! - [`policy`]: pure priority/lapse classification
//! - [`entry`]: queue entry model and status state machine
//! - [`staff`]: staff and room model
//! - [`database`]: sqlx store with conditional-update claim semantics
//! - [`jobs`]: escalation job and occupancy reaper
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vetdesk_queue_engine::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // In-memory database; point database_path at a file in production
//!     let mut config = QueueEngineConfig::default();
//!     config.database.database_path = String::new();
//!
//!     let scheduler = QueueScheduler::connect(config).await?;
//!     scheduler.spawn_jobs();
//!
//!     // Front desk adds a walk-in
//!     let entry = scheduler
//!         .add_entry(NewQueueEntry::walk_in("Rex", "Ana Souza", "consultation"))
//!         .await?;
//!     println!("waiting: {}", entry.id);
//!
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod error;

// Domain model
pub mod entry;
pub mod policy;
pub mod staff;

// Scheduling engine
pub mod jobs;
pub mod scheduler;

// Database integration
pub mod database;

// Re-exports for convenience
pub use config::QueueEngineConfig;
pub use error::{QueueEngineError, Result};
pub use scheduler::QueueScheduler;

/// Initialize a tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Prelude module for convenient imports
pub mod prelude {
    // Core types
    pub use crate::{QueueEngineConfig, QueueEngineError, QueueScheduler, Result};

    // Configuration types
    pub use crate::config::{DatabaseConfig, GeneralConfig, JobsConfig, PolicyConfig};

    // Domain types
    pub use crate::entry::{
        ActiveFilter, EntryStatus, EntryUpdate, HistoryFilter, NewQueueEntry, QueueEntry,
        QueueStats,
    };
    pub use crate::policy::{classify, Classification, Priority};
    pub use crate::staff::{RequesterRole, Room, StaffMember};

    // Scheduling engine
    pub use crate::database::Database;
    pub use crate::jobs::{EscalationJob, OccupancyReaper};

    // Common external types
    pub use chrono::{DateTime, Utc};
}
