//! Occupancy reaper.
//!
//! Rooms are a shared resource; a staff member who disconnects without
//! checking out would otherwise hold their room forever. The reaper clears
//! any occupancy whose last observed activity (falling back to the check-in
//! time) is older than the configured threshold.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::QueueEngineConfig;
use crate::database::Database;
use crate::error::Result;

/// Periodic sweep reclaiming rooms from inactive occupants
pub struct OccupancyReaper {
    database: Database,
    inactivity_threshold: Duration,
    interval: StdDuration,
}

impl OccupancyReaper {
    pub fn new(database: Database, config: &QueueEngineConfig) -> Self {
        Self {
            database,
            inactivity_threshold: Duration::minutes(config.jobs.inactivity_threshold_minutes),
            interval: StdDuration::from_secs(config.jobs.reaper_interval_secs),
        }
    }

    /// Run one sweep; returns how many occupancies were cleared
    pub async fn run_once(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.inactivity_threshold;
        let stale = self.database.find_stale_occupants(cutoff).await?;
        debug!("🧹 Reaper sweep found {} stale occupants", stale.len());

        let mut cleared = 0;
        for staff in stale {
            match self.database.clear_occupancy(&staff.id).await {
                Ok(true) => {
                    warn!(
                        staff_id = %staff.id,
                        room_id = %staff.current_room_id.as_deref().unwrap_or("?"),
                        "🧹 Reclaimed room from inactive occupant"
                    );
                    cleared += 1;
                }
                Ok(false) => {
                    // They checked out (or were reaped) between scan and clear
                    debug!("Staff member {} no longer occupies a room", staff.id);
                }
                Err(e) => {
                    error!(
                        staff_id = %staff.id,
                        error = %e,
                        "❌ Failed to reclaim room; continuing sweep"
                    );
                }
            }
        }

        Ok(cleared)
    }

    /// Run the sweep on the configured interval, forever
    pub async fn run(self) {
        info!(
            "🧹 Occupancy reaper started (every {}s)",
            self.interval.as_secs()
        );
        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!("❌ Occupancy reaper sweep failed: {}", e);
            }
        }
    }
}
