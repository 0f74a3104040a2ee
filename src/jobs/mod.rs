//! Background jobs.
//!
//! Both jobs are plain structs whose `run_once` does one sweep against the
//! store, with a thin interval loop around it. A failed sweep is logged and
//! the loop keeps ticking; nothing here retries an individual entry.

pub mod escalation;
pub mod reaper;

pub use escalation::EscalationJob;
pub use reaper::OccupancyReaper;
