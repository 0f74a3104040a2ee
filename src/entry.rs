//! Queue entry model and lifecycle.
//!
//! An entry is one unit of service demand at the front desk. It is created
//! in `WAITING`, mutated only through scheduler transitions, and never
//! physically deleted: `CANCELLED` is a terminal status, not a delete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::Priority;

/// Queue entry status state machine.
///
/// `WAITING → CALLED → IN_PROGRESS → COMPLETED`, with `CANCELLED` reachable
/// from any non-terminal status and `WAITING → IN_PROGRESS` permitted
/// directly when service starts without an explicit call step. No transition
/// leaves a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Waiting,
    Called,
    InProgress,
    Completed,
    Cancelled,
}

impl EntryStatus {
    /// Status string as persisted in the entry store
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Waiting => "WAITING",
            EntryStatus::Called => "CALLED",
            EntryStatus::InProgress => "IN_PROGRESS",
            EntryStatus::Completed => "COMPLETED",
            EntryStatus::Cancelled => "CANCELLED",
        }
    }

    /// Parse a persisted status string
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "WAITING" => Some(EntryStatus::Waiting),
            "CALLED" => Some(EntryStatus::Called),
            "IN_PROGRESS" => Some(EntryStatus::InProgress),
            "COMPLETED" => Some(EntryStatus::Completed),
            "CANCELLED" => Some(EntryStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether this status admits no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Cancelled)
    }

    /// Whether this status counts toward the active queue view
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Whether service may start from this status
    pub fn can_start(self) -> bool {
        matches!(self, EntryStatus::Waiting | EntryStatus::Called)
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of queued service demand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Opaque entry id
    pub id: String,

    /// Patient (animal) name
    pub patient_name: String,

    /// Requesting tutor's name
    pub tutor_name: String,

    /// Requested service type (open set)
    pub service_type: String,

    /// Optional reference to a structured patient record
    pub patient_ref: Option<String>,

    /// Whether the entry still counts as a scheduled appointment
    pub has_appointment: bool,

    /// Appointment slot, present only while `has_appointment` holds
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Effective priority after classification
    pub priority: Priority,

    /// Current lifecycle status
    pub status: EntryStatus,

    /// Staff member assigned to serve this entry
    pub assigned_vet_id: Option<String>,

    /// Room the entry was called into
    pub room_id: Option<String>,

    /// Insertion time, immutable
    pub created_at: DateTime<Utc>,

    /// Stamped when the entry is first called (or started directly)
    pub called_at: Option<DateTime<Utc>>,

    /// Stamped when service completes
    pub completed_at: Option<DateTime<Utc>>,
}

/// Request payload for adding an entry to the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueueEntry {
    pub patient_name: String,
    pub tutor_name: String,
    pub service_type: String,
    pub patient_ref: Option<String>,
    pub priority: Priority,
    pub has_appointment: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewQueueEntry {
    /// Plain walk-in request with the given descriptive fields
    pub fn walk_in(patient_name: &str, tutor_name: &str, service_type: &str) -> Self {
        Self {
            patient_name: patient_name.to_string(),
            tutor_name: tutor_name.to_string(),
            service_type: service_type.to_string(),
            patient_ref: None,
            priority: Priority::Normal,
            has_appointment: false,
            scheduled_at: None,
        }
    }

    /// Scheduled appointment request for the given slot
    pub fn appointment(
        patient_name: &str,
        tutor_name: &str,
        service_type: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            patient_name: patient_name.to_string(),
            tutor_name: tutor_name.to_string(),
            service_type: service_type.to_string(),
            patient_ref: None,
            priority: Priority::Normal,
            has_appointment: true,
            scheduled_at: Some(scheduled_at),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_patient_ref(mut self, patient_ref: &str) -> Self {
        self.patient_ref = Some(patient_ref.to_string());
        self
    }
}

/// Fields a front-desk edit may change on a WAITING entry.
///
/// `None` leaves the stored value untouched. Scheduling fields are
/// re-classified after the merge, so an edit cannot bypass the lapse rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub patient_name: Option<String>,
    pub tutor_name: Option<String>,
    pub service_type: Option<String>,
    pub patient_ref: Option<String>,
    pub priority: Option<Priority>,
    pub has_appointment: Option<bool>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Filter for the active queue view
#[derive(Debug, Clone, Default)]
pub struct ActiveFilter {
    /// Restrict to entries assigned to one staff member
    pub assigned_vet_id: Option<String>,

    /// Restrict to the unassigned pool
    pub unassigned_only: bool,
}

/// Filter for the service history view
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Restrict to one terminal status
    pub status: Option<EntryStatus>,

    /// Restrict to entries served by one staff member
    pub assigned_vet_id: Option<String>,

    /// Entries created at or after this instant
    pub from: Option<DateTime<Utc>>,

    /// Entries created at or before this instant
    pub to: Option<DateTime<Utc>>,

    /// Cap on returned rows, newest first
    pub limit: Option<u32>,
}

/// Waiting pool snapshot used for logging and dashboards
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub waiting_total: u64,
    pub emergency_waiting: u64,
    pub high_waiting: u64,
    pub normal_waiting: u64,
    /// Age of the oldest waiting entry, if any
    pub longest_wait_secs: Option<i64>,
}
