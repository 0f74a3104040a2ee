//! Staff and room store operations.
//!
//! Room occupancy lives on the staff row (`current_room_id`); a room's
//! occupant is looked up, never stored on the room itself. Check-in claims
//! the room with one guarded UPDATE so two staff members can never both win
//! the same room.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

use super::Database;
use crate::error::Result;
use crate::staff::{RequesterRole, Room, StaffMember};

#[derive(FromRow)]
struct StaffRow {
    id: String,
    display_name: String,
    role: String,
    current_room_id: Option<String>,
    room_checked_in_at: Option<DateTime<Utc>>,
    last_activity_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<StaffRow> for StaffMember {
    type Error = sqlx::Error;

    fn try_from(row: StaffRow) -> std::result::Result<Self, sqlx::Error> {
        let role = RequesterRole::parse(&row.role).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "role".to_string(),
            source: format!("unexpected role '{}'", row.role).into(),
        })?;

        Ok(StaffMember {
            id: row.id,
            display_name: row.display_name,
            role,
            current_room_id: row.current_room_id,
            room_checked_in_at: row.room_checked_in_at,
            last_activity_at: row.last_activity_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct RoomRow {
    id: String,
    name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Room {
            id: row.id,
            name: row.name,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

const STAFF_COLUMNS: &str = "id, display_name, role, current_room_id, \
     room_checked_in_at, last_activity_at, created_at";

impl Database {
    /// Register a staff member, updating name and role on conflict
    pub async fn upsert_staff(
        &self,
        staff_id: &str,
        display_name: &str,
        role: RequesterRole,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO staff (id, display_name, role, created_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(id) DO UPDATE SET display_name = ?2, role = ?3",
        )
        .bind(staff_id)
        .bind(display_name)
        .bind(role.as_str())
        .bind(now)
        .execute(self.pool())
        .await?;

        debug!("👤 Registered staff member {}", staff_id);
        Ok(())
    }

    /// Fetch one staff member by id
    pub async fn get_staff(&self, staff_id: &str) -> Result<Option<StaffMember>> {
        let row: Option<StaffRow> =
            sqlx::query_as(&format!("SELECT {STAFF_COLUMNS} FROM staff WHERE id = ?1"))
                .bind(staff_id)
                .fetch_optional(self.pool())
                .await?;

        row.map(StaffMember::try_from).transpose().map_err(Into::into)
    }

    /// All registered staff members
    pub async fn list_staff(&self) -> Result<Vec<StaffMember>> {
        let rows: Vec<StaffRow> =
            sqlx::query_as(&format!("SELECT {STAFF_COLUMNS} FROM staff ORDER BY display_name"))
                .fetch_all(self.pool())
                .await?;

        rows.into_iter()
            .map(|row| StaffMember::try_from(row).map_err(Into::into))
            .collect()
    }

    /// Record an activity heartbeat for the occupancy reaper
    pub async fn record_activity(&self, staff_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE staff SET last_activity_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(staff_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically claim a room for a staff member.
    ///
    /// The "no other occupant holds this room" check and the occupancy
    /// write are one statement, so concurrent check-ins to the same room
    /// cannot both succeed. Re-checking in to a room already held by the
    /// same staff member refreshes the check-in. Returns whether the claim
    /// won; `false` means a different occupant holds the room.
    pub async fn claim_room(
        &self,
        staff_id: &str,
        room_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE staff \
             SET current_room_id = ?1, room_checked_in_at = ?2, last_activity_at = ?2 \
             WHERE id = ?3 \
               AND NOT EXISTS (SELECT 1 FROM staff other \
                               WHERE other.current_room_id = ?1 AND other.id <> ?3)",
        )
        .bind(room_id)
        .bind(now)
        .bind(staff_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Release whatever room a staff member currently holds
    pub async fn release_room(&self, staff_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE staff \
             SET current_room_id = NULL, room_checked_in_at = NULL, last_activity_at = ?1 \
             WHERE id = ?2 AND current_room_id IS NOT NULL",
        )
        .bind(now)
        .bind(staff_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clear a stale occupancy found by the reaper, without touching the
    /// activity timestamp
    pub async fn clear_occupancy(&self, staff_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE staff \
             SET current_room_id = NULL, room_checked_in_at = NULL \
             WHERE id = ?1 AND current_room_id IS NOT NULL",
        )
        .bind(staff_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Occupants whose last observed activity predates the cutoff.
    ///
    /// Falls back to the check-in time when no activity was ever recorded.
    pub async fn find_stale_occupants(&self, cutoff: DateTime<Utc>) -> Result<Vec<StaffMember>> {
        let rows: Vec<StaffRow> = sqlx::query_as(&format!(
            "SELECT {STAFF_COLUMNS} FROM staff \
             WHERE current_room_id IS NOT NULL \
               AND COALESCE(last_activity_at, room_checked_in_at) < ?1"
        ))
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| StaffMember::try_from(row).map_err(Into::into))
            .collect()
    }

    /// Current occupant of a room, if any
    pub async fn room_occupant(&self, room_id: &str) -> Result<Option<StaffMember>> {
        let row: Option<StaffRow> = sqlx::query_as(&format!(
            "SELECT {STAFF_COLUMNS} FROM staff WHERE current_room_id = ?1"
        ))
        .bind(room_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(StaffMember::try_from).transpose().map_err(Into::into)
    }

    /// Create a room
    pub async fn create_room(&self, name: &str, now: DateTime<Utc>) -> Result<Room> {
        let room = Room {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            is_active: true,
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO rooms (id, name, is_active, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&room.id)
        .bind(&room.name)
        .bind(room.is_active)
        .bind(room.created_at)
        .execute(self.pool())
        .await?;

        debug!("🚪 Created room {} ({})", room.name, room.id);
        Ok(room)
    }

    /// Fetch one room by id
    pub async fn get_room(&self, room_id: &str) -> Result<Option<Room>> {
        let row: Option<RoomRow> = sqlx::query_as(
            "SELECT id, name, is_active, created_at FROM rooms WHERE id = ?1",
        )
        .bind(room_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Room::from))
    }

    /// All rooms, optionally restricted to active ones
    pub async fn list_rooms(&self, active_only: bool) -> Result<Vec<Room>> {
        let sql = if active_only {
            "SELECT id, name, is_active, created_at FROM rooms WHERE is_active = 1 ORDER BY name"
        } else {
            "SELECT id, name, is_active, created_at FROM rooms ORDER BY name"
        };

        let rows: Vec<RoomRow> = sqlx::query_as(sql).fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(Room::from).collect())
    }

    /// Soft-activate or soft-deactivate a room.
    ///
    /// Deactivation blocks new check-ins; it does not evict a current
    /// occupant.
    pub async fn set_room_active(&self, room_id: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE rooms SET is_active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(room_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
