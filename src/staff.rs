//! Staff and room model.
//!
//! Rooms are physical or virtual service points; staff members check in to
//! a room to receive called entries. The occupancy invariant — at most one
//! staff member holds a given room — is enforced transactionally by the
//! store, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of the caller as supplied by the API layer.
///
/// The engine does not authenticate anybody; it only applies the role gates
/// of the scheduler operations. `Admin` passes every gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequesterRole {
    Receptionist,
    Veterinarian,
    Admin,
}

impl RequesterRole {
    /// Whether this is the front-desk-only role of the role gates
    pub fn is_front_desk(self) -> bool {
        matches!(self, RequesterRole::Receptionist)
    }

    /// Role string as persisted in the staff table
    pub fn as_str(self) -> &'static str {
        match self {
            RequesterRole::Receptionist => "RECEPTIONIST",
            RequesterRole::Veterinarian => "VETERINARIAN",
            RequesterRole::Admin => "ADMIN",
        }
    }

    /// Parse a persisted role string
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RECEPTIONIST" => Some(RequesterRole::Receptionist),
            "VETERINARIAN" => Some(RequesterRole::Veterinarian),
            "ADMIN" => Some(RequesterRole::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequesterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical or virtual service point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,

    /// Soft-deactivation flag; an inactive room blocks new check-ins but is
    /// never hard-deleted while referenced
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

/// Staff member record, limited to the fields the scheduler needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: String,
    pub display_name: String,
    pub role: RequesterRole,

    /// Room this staff member currently occupies, if any
    pub current_room_id: Option<String>,

    /// When the current room was claimed
    pub room_checked_in_at: Option<DateTime<Utc>>,

    /// Last observed activity, used by the occupancy reaper
    pub last_activity_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl StaffMember {
    /// The instant the reaper compares against the inactivity threshold
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_activity_at.or(self.room_checked_in_at)
    }
}
