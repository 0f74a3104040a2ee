//! Database schema definitions for the queue engine.
//!
//! All tables are created idempotently. Status and priority columns carry
//! CHECK constraints so a bad write fails loudly instead of corrupting the
//! state machine.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;

/// Create the queue entries table
pub async fn create_queue_entries_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating queue_entries table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_entries (
            id TEXT PRIMARY KEY,
            patient_name TEXT NOT NULL,
            tutor_name TEXT NOT NULL,
            service_type TEXT NOT NULL,
            patient_ref TEXT,
            has_appointment INTEGER NOT NULL DEFAULT 0,
            scheduled_at TEXT,
            priority INTEGER NOT NULL DEFAULT 3,
            status TEXT NOT NULL DEFAULT 'WAITING',
            assigned_vet_id TEXT,
            room_id TEXT,
            created_at TEXT NOT NULL,
            called_at TEXT,
            completed_at TEXT,
            CHECK (priority IN (1, 2, 3)),
            CHECK (status IN ('WAITING', 'CALLED', 'IN_PROGRESS', 'COMPLETED', 'CANCELLED')),
            FOREIGN KEY (assigned_vet_id) REFERENCES staff(id),
            FOREIGN KEY (room_id) REFERENCES rooms(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the rooms table
pub async fn create_rooms_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating rooms table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rooms (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the staff table
pub async fn create_staff_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating staff table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staff (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'VETERINARIAN',
            current_room_id TEXT,
            room_checked_in_at TEXT,
            last_activity_at TEXT,
            created_at TEXT NOT NULL,
            CHECK (role IN ('RECEPTIONIST', 'VETERINARIAN', 'ADMIN')),
            FOREIGN KEY (current_room_id) REFERENCES rooms(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create indexes for query performance
pub async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating database indexes");

    // Serves candidate selection: status filter, then priority/FIFO ordering
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_queue_entries_pick
         ON queue_entries(status, priority, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_queue_entries_vet
         ON queue_entries(assigned_vet_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_queue_entries_scheduled
         ON queue_entries(has_appointment, status)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_staff_room
         ON staff(current_room_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
