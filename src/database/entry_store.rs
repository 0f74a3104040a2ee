//! Queue entry store operations.
//!
//! Every transition that can race with another caller is written as a
//! single conditional `UPDATE` guarded on the current status, and the
//! `rows_affected` count decides whether this caller won. That keeps the
//! claim semantics correct across any number of engine processes sharing
//! one database file.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::debug;

use super::Database;
use crate::entry::{ActiveFilter, EntryStatus, HistoryFilter, QueueEntry, QueueStats};
use crate::error::Result;
use crate::policy::{Classification, Priority};

/// Raw row shape; converted into [`QueueEntry`] after decoding
#[derive(FromRow)]
struct EntryRow {
    id: String,
    patient_name: String,
    tutor_name: String,
    service_type: String,
    patient_ref: Option<String>,
    has_appointment: bool,
    scheduled_at: Option<DateTime<Utc>>,
    priority: i64,
    status: String,
    assigned_vet_id: Option<String>,
    room_id: Option<String>,
    created_at: DateTime<Utc>,
    called_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<EntryRow> for QueueEntry {
    type Error = sqlx::Error;

    fn try_from(row: EntryRow) -> std::result::Result<Self, sqlx::Error> {
        let priority = Priority::from_ordinal(row.priority).ok_or_else(|| {
            sqlx::Error::ColumnDecode {
                index: "priority".to_string(),
                source: format!("unexpected priority ordinal {}", row.priority).into(),
            }
        })?;
        let status =
            EntryStatus::parse(&row.status).ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: format!("unexpected status '{}'", row.status).into(),
            })?;

        Ok(QueueEntry {
            id: row.id,
            patient_name: row.patient_name,
            tutor_name: row.tutor_name,
            service_type: row.service_type,
            patient_ref: row.patient_ref,
            has_appointment: row.has_appointment,
            scheduled_at: row.scheduled_at,
            priority,
            status,
            assigned_vet_id: row.assigned_vet_id,
            room_id: row.room_id,
            created_at: row.created_at,
            called_at: row.called_at,
            completed_at: row.completed_at,
        })
    }
}

const ENTRY_COLUMNS: &str = "id, patient_name, tutor_name, service_type, patient_ref, \
     has_appointment, scheduled_at, priority, status, assigned_vet_id, room_id, \
     created_at, called_at, completed_at";

impl Database {
    /// Insert a freshly classified entry in WAITING status
    pub async fn insert_entry(&self, entry: &QueueEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO queue_entries \
             (id, patient_name, tutor_name, service_type, patient_ref, has_appointment, \
              scheduled_at, priority, status, assigned_vet_id, room_id, created_at, \
              called_at, completed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(&entry.id)
        .bind(&entry.patient_name)
        .bind(&entry.tutor_name)
        .bind(&entry.service_type)
        .bind(&entry.patient_ref)
        .bind(entry.has_appointment)
        .bind(entry.scheduled_at)
        .bind(entry.priority.ordinal())
        .bind(entry.status.as_str())
        .bind(&entry.assigned_vet_id)
        .bind(&entry.room_id)
        .bind(entry.created_at)
        .bind(entry.called_at)
        .bind(entry.completed_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Fetch one entry by id
    pub async fn get_entry(&self, entry_id: &str) -> Result<Option<QueueEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM queue_entries WHERE id = ?1"
        ))
        .bind(entry_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(QueueEntry::try_from).transpose().map_err(Into::into)
    }

    /// Atomically claim the best WAITING entry for a call.
    ///
    /// Selection follows the service ordering: ascending priority ordinal,
    /// then first-in-first-out within a tier. The claim itself is a
    /// conditional UPDATE on `status = 'WAITING'`; losing the race for one
    /// candidate moves on to the next until the pool is exhausted.
    pub async fn claim_next_waiting(
        &self,
        vet_id: &str,
        room_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueEntry>> {
        loop {
            let candidate: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM queue_entries WHERE status = 'WAITING' \
                 ORDER BY priority ASC, created_at ASC LIMIT 1",
            )
            .fetch_optional(self.pool())
            .await?;

            let Some((entry_id,)) = candidate else {
                return Ok(None);
            };

            if self.claim_waiting_entry(&entry_id, vet_id, room_id, now).await? {
                return self.get_entry(&entry_id).await;
            }

            // Another caller claimed this candidate first; try the next one
            debug!("🔒 Lost claim race for entry {}, retrying", entry_id);
        }
    }

    /// Claim one named WAITING entry for a call.
    ///
    /// Returns whether the claim won; `false` means the entry was missing or
    /// no longer WAITING when the UPDATE ran.
    pub async fn claim_waiting_entry(
        &self,
        entry_id: &str,
        vet_id: &str,
        room_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_entries \
             SET status = 'CALLED', called_at = ?1, assigned_vet_id = ?2, room_id = ?3 \
             WHERE id = ?4 AND status = 'WAITING'",
        )
        .bind(now)
        .bind(vet_id)
        .bind(room_id)
        .bind(entry_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition an entry into IN_PROGRESS.
    ///
    /// Permitted from WAITING or CALLED; a direct start from WAITING also
    /// stamps `called_at`.
    pub async fn begin_service(&self, entry_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_entries \
             SET status = 'IN_PROGRESS', called_at = COALESCE(called_at, ?1) \
             WHERE id = ?2 AND status IN ('WAITING', 'CALLED')",
        )
        .bind(now)
        .bind(entry_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition an entry into COMPLETED, stamping `completed_at`
    pub async fn finish_service(&self, entry_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_entries \
             SET status = 'COMPLETED', completed_at = ?1 \
             WHERE id = ?2 AND status NOT IN ('COMPLETED', 'CANCELLED')",
        )
        .bind(now)
        .bind(entry_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition an entry into CANCELLED
    pub async fn cancel_entry_row(&self, entry_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_entries \
             SET status = 'CANCELLED' \
             WHERE id = ?1 AND status NOT IN ('COMPLETED', 'CANCELLED')",
        )
        .bind(entry_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Self-assign an unassigned WAITING entry to a staff member
    pub async fn assign_vet(&self, entry_id: &str, vet_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_entries \
             SET assigned_vet_id = ?1 \
             WHERE id = ?2 AND status = 'WAITING' AND assigned_vet_id IS NULL",
        )
        .bind(vet_id)
        .bind(entry_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Persist an edited WAITING entry.
    ///
    /// Guarded on WAITING so an edit cannot land on an entry that was
    /// called, started, or finalized in the meantime.
    pub async fn apply_entry_update(&self, entry: &QueueEntry) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_entries \
             SET patient_name = ?1, tutor_name = ?2, service_type = ?3, patient_ref = ?4, \
                 priority = ?5, has_appointment = ?6, scheduled_at = ?7 \
             WHERE id = ?8 AND status = 'WAITING'",
        )
        .bind(&entry.patient_name)
        .bind(&entry.tutor_name)
        .bind(&entry.service_type)
        .bind(&entry.patient_ref)
        .bind(entry.priority.ordinal())
        .bind(entry.has_appointment)
        .bind(entry.scheduled_at)
        .bind(&entry.id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Persist a re-classification produced by the escalation sweep.
    ///
    /// Guarded on WAITING; a concurrent call or cancellation wins and the
    /// sweep simply skips the entry.
    pub async fn apply_classification(
        &self,
        entry_id: &str,
        class: &Classification,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_entries \
             SET priority = ?1, has_appointment = ?2, scheduled_at = ?3 \
             WHERE id = ?4 AND status = 'WAITING'",
        )
        .bind(class.priority.ordinal())
        .bind(class.has_appointment)
        .bind(class.scheduled_at)
        .bind(entry_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Active entries (WAITING, CALLED, IN_PROGRESS) in service order
    pub async fn list_active(&self, filter: &ActiveFilter) -> Result<Vec<QueueEntry>> {
        let mut sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM queue_entries \
             WHERE status IN ('WAITING', 'CALLED', 'IN_PROGRESS')"
        );
        if filter.assigned_vet_id.is_some() {
            sql.push_str(" AND assigned_vet_id = ?1");
        } else if filter.unassigned_only {
            sql.push_str(" AND assigned_vet_id IS NULL");
        }
        sql.push_str(" ORDER BY priority ASC, created_at ASC");

        let mut query = sqlx::query_as::<_, EntryRow>(&sql);
        if let Some(vet_id) = &filter.assigned_vet_id {
            query = query.bind(vet_id);
        }

        let rows = query.fetch_all(self.pool()).await?;
        rows.into_iter()
            .map(|row| QueueEntry::try_from(row).map_err(Into::into))
            .collect()
    }

    /// Finalized entries (COMPLETED, CANCELLED), newest first
    pub async fn list_history(&self, filter: &HistoryFilter) -> Result<Vec<QueueEntry>> {
        let mut sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM queue_entries \
             WHERE status IN ('COMPLETED', 'CANCELLED')"
        );
        let mut binds: Vec<BindValue> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(&format!(" AND status = ?{}", binds.len() + 1));
            binds.push(BindValue::Text(status.as_str().to_string()));
        }
        if let Some(vet_id) = &filter.assigned_vet_id {
            sql.push_str(&format!(" AND assigned_vet_id = ?{}", binds.len() + 1));
            binds.push(BindValue::Text(vet_id.clone()));
        }
        if let Some(from) = filter.from {
            sql.push_str(&format!(" AND created_at >= ?{}", binds.len() + 1));
            binds.push(BindValue::Instant(from));
        }
        if let Some(to) = filter.to {
            sql.push_str(&format!(" AND created_at <= ?{}", binds.len() + 1));
            binds.push(BindValue::Instant(to));
        }

        sql.push_str(" ORDER BY COALESCE(completed_at, created_at) DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query_as::<_, EntryRow>(&sql);
        for bind in binds {
            query = match bind {
                BindValue::Text(value) => query.bind(value),
                BindValue::Instant(value) => query.bind(value),
            };
        }

        let rows = query.fetch_all(self.pool()).await?;
        rows.into_iter()
            .map(|row| QueueEntry::try_from(row).map_err(Into::into))
            .collect()
    }

    /// WAITING entries that still carry a scheduled appointment
    pub async fn list_waiting_scheduled(&self) -> Result<Vec<QueueEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM queue_entries \
             WHERE status = 'WAITING' AND has_appointment = 1 \
             ORDER BY scheduled_at ASC"
        ))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| QueueEntry::try_from(row).map_err(Into::into))
            .collect()
    }

    /// Current number of WAITING entries
    pub async fn waiting_depth(&self) -> Result<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM queue_entries WHERE status = 'WAITING'")
                .fetch_one(self.pool())
                .await?;

        Ok(count as u64)
    }

    /// Waiting pool snapshot
    pub async fn queue_stats(&self, now: DateTime<Utc>) -> Result<QueueStats> {
        let tiers: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT priority, COUNT(*) FROM queue_entries \
             WHERE status = 'WAITING' GROUP BY priority",
        )
        .fetch_all(self.pool())
        .await?;

        let mut stats = QueueStats {
            waiting_total: 0,
            emergency_waiting: 0,
            high_waiting: 0,
            normal_waiting: 0,
            longest_wait_secs: None,
        };
        for (ordinal, count) in tiers {
            let count = count as u64;
            stats.waiting_total += count;
            match Priority::from_ordinal(ordinal) {
                Some(Priority::Emergency) => stats.emergency_waiting = count,
                Some(Priority::High) => stats.high_waiting = count,
                Some(Priority::Normal) => stats.normal_waiting = count,
                None => {}
            }
        }

        let oldest: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT created_at FROM queue_entries WHERE status = 'WAITING' \
             ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?;
        stats.longest_wait_secs =
            oldest.map(|(created_at,)| now.signed_duration_since(created_at).num_seconds());

        Ok(stats)
    }
}

/// Owned bind parameter for dynamically assembled history queries
enum BindValue {
    Text(String),
    Instant(DateTime<Utc>),
}
