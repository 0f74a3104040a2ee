//! Priority and scheduling policy.
//!
//! The policy is a pure function over an entry's requested priority and
//! scheduling fields plus the current time. It is applied when an entry is
//! created or edited, and re-applied by the escalation job for entries
//! already sitting in the queue, so scheduled appointments lapse even when
//! nobody touches them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Service priority ordinal.
///
/// Lower ordinal means more urgent: `Emergency (1)` is served before
/// `High (2)`, which is served before `Normal (3)`. The derived `Ord`
/// follows declaration order, so `min()` picks the most urgent tier; the
/// selection queries order by the ordinal ascending for the same reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Emergency = 1,
    High = 2,
    Normal = 3,
}

impl Priority {
    /// Numeric ordinal as persisted in the entry store
    pub fn ordinal(self) -> i64 {
        self as i64
    }

    /// Parse a persisted ordinal back into the enum
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            1 => Some(Self::Emergency),
            2 => Some(Self::High),
            3 => Some(Self::Normal),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Emergency => write!(f, "EMERGENCY"),
            Priority::High => write!(f, "HIGH"),
            Priority::Normal => write!(f, "NORMAL"),
        }
    }
}

/// Outcome of classifying an entry's priority and scheduling fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Effective priority after the lapse rule
    pub priority: Priority,

    /// Whether the entry still counts as a scheduled appointment
    pub has_appointment: bool,

    /// Appointment time, kept only while the entry counts as scheduled
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Classify an entry's effective priority and scheduled/walk-in status.
///
/// A scheduled appointment later than `tolerance` past its slot has lapsed:
/// it re-enters the queue as an ordinary walk-in, demoted to `Normal` unless
/// it was an `Emergency`. Appointments in the future, on time, or late
/// within the grace window keep their scheduled classification unchanged.
///
/// A `scheduled_at` in the past is never rejected here; the lapse rule is
/// the only consequence of arriving late.
pub fn classify(
    base_priority: Priority,
    has_appointment: bool,
    scheduled_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> Classification {
    let Some(slot) = scheduled_at.filter(|_| has_appointment) else {
        return Classification {
            priority: base_priority,
            has_appointment: false,
            scheduled_at: None,
        };
    };

    let late_by = now.signed_duration_since(slot);
    if late_by >= tolerance {
        // Lapsed beyond grace: back to the walk-in pool
        let priority = if base_priority == Priority::Emergency {
            Priority::Emergency
        } else {
            Priority::Normal
        };
        return Classification {
            priority,
            has_appointment: false,
            scheduled_at: None,
        };
    }

    Classification {
        priority: base_priority,
        has_appointment: true,
        scheduled_at: Some(slot),
    }
}
