use serde::{Deserialize, Serialize};

/// Queue engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEngineConfig {
    /// General engine settings
    pub general: GeneralConfig,

    /// Scheduling policy configuration
    pub policy: PolicyConfig,

    /// Background job configuration
    pub jobs: JobsConfig,

    /// Database configuration
    pub database: DatabaseConfig,
}

/// General engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Clinic name used in log output
    pub clinic_name: String,

    /// Maximum number of entries allowed in the waiting pool
    pub max_waiting_entries: usize,
}

/// Scheduling policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Grace window during which a late scheduled appointment is still
    /// honored as scheduled (minutes)
    pub tolerance_minutes: i64,
}

/// Background job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Escalation sweep interval (seconds)
    pub escalation_interval_secs: u64,

    /// Occupancy reaper sweep interval (seconds)
    pub reaper_interval_secs: u64,

    /// Inactivity threshold after which a room check-in is reclaimed (minutes)
    pub inactivity_threshold_minutes: i64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path (empty for in-memory)
    pub database_path: String,

    /// Maximum database connections
    pub max_connections: u32,

    /// How long a writer waits on a locked database (seconds)
    pub busy_timeout_secs: u64,
}

impl QueueEngineConfig {
    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), String> {
        if self.general.clinic_name.trim().is_empty() {
            return Err("clinic_name cannot be empty".to_string());
        }

        if self.general.max_waiting_entries == 0 {
            return Err("max_waiting_entries must be greater than 0".to_string());
        }

        if self.policy.tolerance_minutes < 0 {
            return Err("tolerance_minutes cannot be negative".to_string());
        }

        if self.jobs.escalation_interval_secs == 0 {
            return Err("escalation_interval_secs must be greater than 0".to_string());
        }

        if self.jobs.reaper_interval_secs == 0 {
            return Err("reaper_interval_secs must be greater than 0".to_string());
        }

        if self.jobs.inactivity_threshold_minutes <= 0 {
            return Err("inactivity_threshold_minutes must be greater than 0".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for QueueEngineConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            policy: PolicyConfig::default(),
            jobs: JobsConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            clinic_name: "vetdesk".to_string(),
            max_waiting_entries: 500,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tolerance_minutes: 15,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            escalation_interval_secs: 60,
            reaper_interval_secs: 60,
            inactivity_threshold_minutes: 60,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: "vetdesk_queue.db".to_string(),
            max_connections: 10,
            busy_timeout_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = QueueEngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_escalation_interval() {
        let mut config = QueueEngineConfig::default();
        config.jobs.escalation_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_blank_clinic_name() {
        let mut config = QueueEngineConfig::default();
        config.general.clinic_name = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
