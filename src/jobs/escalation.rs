//! Escalation job.
//!
//! Periodically re-applies the scheduling policy to entries that are still
//! waiting with a scheduled appointment, so an appointment lapses into a
//! walk-in even when nobody edits the entry. The sweep is idempotent: once
//! an entry is converted it no longer matches the scan, and a conversion
//! that races with a call loses to the call's status guard.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::config::QueueEngineConfig;
use crate::database::Database;
use crate::error::Result;
use crate::policy::classify;

/// Periodic sweep promoting overdue scheduled entries to walk-ins
pub struct EscalationJob {
    database: Database,
    tolerance: Duration,
    interval: StdDuration,
}

impl EscalationJob {
    pub fn new(database: Database, config: &QueueEngineConfig) -> Self {
        Self {
            database,
            tolerance: Duration::minutes(config.policy.tolerance_minutes),
            interval: StdDuration::from_secs(config.jobs.escalation_interval_secs),
        }
    }

    /// Run one sweep; returns how many entries were converted.
    ///
    /// A single entry's failure is logged and the sweep continues with the
    /// rest.
    pub async fn run_once(&self) -> Result<usize> {
        let now = Utc::now();
        let entries = self.database.list_waiting_scheduled().await?;
        debug!("⏰ Escalation sweep over {} scheduled entries", entries.len());

        let mut converted = 0;
        for entry in entries {
            let class = classify(
                entry.priority,
                entry.has_appointment,
                entry.scheduled_at,
                now,
                self.tolerance,
            );
            if class.has_appointment {
                continue;
            }

            match self.database.apply_classification(&entry.id, &class).await {
                Ok(true) => {
                    info!(
                        entry_id = %entry.id,
                        patient = %entry.patient_name,
                        priority = %class.priority,
                        "📋 Scheduled appointment lapsed in queue; converted to walk-in"
                    );
                    converted += 1;
                }
                Ok(false) => {
                    // The entry was called or cancelled under us; nothing to do
                    debug!("Entry {} left WAITING before conversion", entry.id);
                }
                Err(e) => {
                    error!(
                        entry_id = %entry.id,
                        error = %e,
                        "❌ Escalation failed for entry; continuing sweep"
                    );
                }
            }
        }

        Ok(converted)
    }

    /// Run the sweep on the configured interval, forever
    pub async fn run(self) {
        info!(
            "⏰ Escalation job started (every {}s)",
            self.interval.as_secs()
        );
        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!("❌ Escalation sweep failed: {}", e);
            }
        }
    }
}
