//! Queue scheduler.
//!
//! The central coordination layer: every mutation of a queue entry and
//! every room check-in goes through here, whether it originates from a
//! request handler or from a background job, so all paths share one set of
//! invariants. The scheduler validates, applies the scheduling policy, and
//! delegates the racy parts to the store's conditional updates.

use chrono::{Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::QueueEngineConfig;
use crate::database::Database;
use crate::entry::{ActiveFilter, EntryStatus, EntryUpdate, HistoryFilter, NewQueueEntry, QueueEntry, QueueStats};
use crate::error::{QueueEngineError, Result};
use crate::jobs::{EscalationJob, OccupancyReaper};
use crate::policy::classify;
use crate::staff::{RequesterRole, Room, StaffMember};

/// Resolved destination of a call: who serves, and where
struct CallTarget {
    vet_id: String,
    room_id: String,
}

/// Queue and room scheduling engine
#[derive(Clone)]
pub struct QueueScheduler {
    config: QueueEngineConfig,
    database: Database,
}

impl QueueScheduler {
    /// Create a scheduler over an already-opened database
    pub fn new(config: QueueEngineConfig, database: Database) -> Result<Self> {
        config.validate().map_err(QueueEngineError::config)?;
        Ok(Self { config, database })
    }

    /// Open the configured database and create a scheduler over it
    pub async fn connect(config: QueueEngineConfig) -> Result<Self> {
        config.validate().map_err(QueueEngineError::config)?;
        let database = Database::connect(&config.database).await?;
        Ok(Self { config, database })
    }

    /// Engine configuration
    pub fn config(&self) -> &QueueEngineConfig {
        &self.config
    }

    /// Database handle
    pub fn database(&self) -> &Database {
        &self.database
    }

    fn tolerance(&self) -> Duration {
        Duration::minutes(self.config.policy.tolerance_minutes)
    }

    /// Spawn the escalation job and the occupancy reaper as tokio tasks
    pub fn spawn_jobs(&self) -> (JoinHandle<()>, JoinHandle<()>) {
        let escalation = EscalationJob::new(self.database.clone(), &self.config);
        let reaper = OccupancyReaper::new(self.database.clone(), &self.config);
        (tokio::spawn(escalation.run()), tokio::spawn(reaper.run()))
    }

    // === Queue entry operations ===

    /// Add a new entry to the waiting pool.
    ///
    /// Descriptive fields must be non-blank; the scheduling policy runs
    /// before insertion, so an appointment that already lapsed enters the
    /// queue as a walk-in.
    pub async fn add_entry(&self, request: NewQueueEntry) -> Result<QueueEntry> {
        require_non_blank("patient_name", &request.patient_name)?;
        require_non_blank("tutor_name", &request.tutor_name)?;
        require_non_blank("service_type", &request.service_type)?;

        let depth = self.database.waiting_depth().await?;
        if depth >= self.config.general.max_waiting_entries as u64 {
            return Err(QueueEngineError::validation("waiting queue is at capacity"));
        }

        let now = Utc::now();
        let class = classify(
            request.priority,
            request.has_appointment,
            request.scheduled_at,
            now,
            self.tolerance(),
        );

        let entry = QueueEntry {
            id: Uuid::new_v4().to_string(),
            patient_name: request.patient_name.trim().to_string(),
            tutor_name: request.tutor_name.trim().to_string(),
            service_type: request.service_type.trim().to_string(),
            patient_ref: request.patient_ref,
            has_appointment: class.has_appointment,
            scheduled_at: class.scheduled_at,
            priority: class.priority,
            status: EntryStatus::Waiting,
            assigned_vet_id: None,
            room_id: None,
            created_at: now,
            called_at: None,
            completed_at: None,
        };

        self.database.insert_entry(&entry).await?;

        if request.has_appointment && !class.has_appointment {
            info!(
                entry_id = %entry.id,
                patient = %entry.patient_name,
                priority = %entry.priority,
                "📋 Scheduled appointment lapsed before check-in; queued as walk-in"
            );
        }
        info!(
            "📥 Added entry {} for {} ({}, priority {})",
            entry.id, entry.patient_name, entry.service_type, entry.priority
        );

        Ok(entry)
    }

    /// Call the next waiting entry into a room.
    ///
    /// With `room_id` omitted, the acting staff member's current room is
    /// used; with `vet_id` omitted, the entry is dispatched to whoever
    /// occupies the target room. Returns `Ok(None)` when nothing is
    /// waiting.
    pub async fn call_next(
        &self,
        vet_id: Option<&str>,
        room_id: Option<&str>,
    ) -> Result<Option<QueueEntry>> {
        let target = self.resolve_call_target(vet_id, room_id).await?;
        let now = Utc::now();

        match self
            .database
            .claim_next_waiting(&target.vet_id, &target.room_id, now)
            .await?
        {
            Some(entry) => {
                info!(
                    "📞 Called entry {} ({}) into room {} for {}",
                    entry.id, entry.patient_name, target.room_id, target.vet_id
                );
                Ok(Some(entry))
            }
            None => {
                debug!("📭 Nothing waiting to call");
                Ok(None)
            }
        }
    }

    /// Call one named waiting entry into a room
    pub async fn call_specific(
        &self,
        entry_id: &str,
        vet_id: Option<&str>,
        room_id: Option<&str>,
    ) -> Result<QueueEntry> {
        let target = self.resolve_call_target(vet_id, room_id).await?;
        let now = Utc::now();

        if self
            .database
            .claim_waiting_entry(entry_id, &target.vet_id, &target.room_id, now)
            .await?
        {
            let entry = self.require_entry(entry_id).await?;
            info!(
                "📞 Called entry {} ({}) into room {} for {}",
                entry.id, entry.patient_name, target.room_id, target.vet_id
            );
            return Ok(entry);
        }

        match self.database.get_entry(entry_id).await? {
            None => Err(QueueEngineError::not_found(format!("entry {entry_id}"))),
            Some(entry) => Err(QueueEngineError::invalid_transition(format!(
                "cannot call entry {} in status {}",
                entry_id, entry.status
            ))),
        }
    }

    /// Start service for an entry.
    ///
    /// Permitted from CALLED, or directly from WAITING (which also stamps
    /// `called_at`). A front-desk requester may not start service.
    pub async fn start_service(
        &self,
        entry_id: &str,
        requester_role: RequesterRole,
    ) -> Result<QueueEntry> {
        if requester_role.is_front_desk() {
            return Err(QueueEngineError::forbidden(
                "a front-desk requester may not start service",
            ));
        }

        let now = Utc::now();
        if self.database.begin_service(entry_id, now).await? {
            let entry = self.require_entry(entry_id).await?;
            info!("🩺 Started service for entry {} ({})", entry.id, entry.patient_name);
            return Ok(entry);
        }

        match self.database.get_entry(entry_id).await? {
            None => Err(QueueEngineError::not_found(format!("entry {entry_id}"))),
            Some(entry) => Err(QueueEngineError::invalid_transition(format!(
                "cannot start entry {} in status {}",
                entry_id, entry.status
            ))),
        }
    }

    /// Complete service for an entry, stamping `completed_at`.
    ///
    /// A front-desk requester may not complete an entry that has no
    /// assigned staff member.
    pub async fn complete_service(
        &self,
        entry_id: &str,
        requester_role: RequesterRole,
    ) -> Result<QueueEntry> {
        let entry = self.require_entry(entry_id).await?;

        if requester_role.is_front_desk() && entry.assigned_vet_id.is_none() {
            return Err(QueueEngineError::forbidden(
                "a front-desk requester may not complete an unassigned entry",
            ));
        }

        let now = Utc::now();
        if self.database.finish_service(entry_id, now).await? {
            let entry = self.require_entry(entry_id).await?;
            info!("✅ Completed entry {} ({})", entry.id, entry.patient_name);
            return Ok(entry);
        }

        Err(QueueEngineError::invalid_transition(format!(
            "entry {entry_id} is already finalized"
        )))
    }

    /// Cancel an entry from any non-terminal status
    pub async fn cancel_entry(&self, entry_id: &str) -> Result<QueueEntry> {
        if self.database.cancel_entry_row(entry_id).await? {
            let entry = self.require_entry(entry_id).await?;
            info!("🚫 Cancelled entry {} ({})", entry.id, entry.patient_name);
            return Ok(entry);
        }

        match self.database.get_entry(entry_id).await? {
            None => Err(QueueEngineError::not_found(format!("entry {entry_id}"))),
            Some(entry) if entry.status == EntryStatus::Completed => {
                Err(QueueEngineError::invalid_transition(
                    "cannot cancel a completed entry",
                ))
            }
            Some(_) => Err(QueueEngineError::invalid_transition(format!(
                "entry {entry_id} is already cancelled"
            ))),
        }
    }

    /// Self-assign an unassigned waiting entry without calling it
    pub async fn claim_entry(&self, entry_id: &str, vet_id: &str) -> Result<QueueEntry> {
        self.require_staff(vet_id).await?;

        if self.database.assign_vet(entry_id, vet_id).await? {
            let entry = self.require_entry(entry_id).await?;
            info!("🔖 Entry {} claimed by {}", entry.id, vet_id);
            return Ok(entry);
        }

        match self.database.get_entry(entry_id).await? {
            None => Err(QueueEngineError::not_found(format!("entry {entry_id}"))),
            Some(entry) if entry.status != EntryStatus::Waiting => {
                Err(QueueEngineError::invalid_transition(format!(
                    "cannot claim entry {} in status {}",
                    entry_id, entry.status
                )))
            }
            Some(entry) => Err(QueueEngineError::invalid_transition(format!(
                "entry {} is already assigned to {}",
                entry_id,
                entry.assigned_vet_id.as_deref().unwrap_or("another staff member")
            ))),
        }
    }

    /// Edit a waiting entry from the front desk.
    ///
    /// The policy re-runs against the merged scheduling fields, so an edit
    /// cannot silently bypass the lapse rule.
    pub async fn update_entry(
        &self,
        entry_id: &str,
        update: EntryUpdate,
        requester_role: RequesterRole,
    ) -> Result<QueueEntry> {
        if !requester_role.is_front_desk() && requester_role != RequesterRole::Admin {
            return Err(QueueEngineError::forbidden(
                "only a front-desk requester may edit a queue entry",
            ));
        }

        let entry = self.require_entry(entry_id).await?;
        if entry.status != EntryStatus::Waiting {
            return Err(QueueEngineError::invalid_transition(format!(
                "cannot edit entry {} in status {}",
                entry_id, entry.status
            )));
        }

        let mut merged = entry;
        if let Some(patient_name) = update.patient_name {
            require_non_blank("patient_name", &patient_name)?;
            merged.patient_name = patient_name.trim().to_string();
        }
        if let Some(tutor_name) = update.tutor_name {
            require_non_blank("tutor_name", &tutor_name)?;
            merged.tutor_name = tutor_name.trim().to_string();
        }
        if let Some(service_type) = update.service_type {
            require_non_blank("service_type", &service_type)?;
            merged.service_type = service_type.trim().to_string();
        }
        if let Some(patient_ref) = update.patient_ref {
            merged.patient_ref = Some(patient_ref);
        }

        let base_priority = update.priority.unwrap_or(merged.priority);
        let has_appointment = update.has_appointment.unwrap_or(merged.has_appointment);
        let scheduled_at = update.scheduled_at.or(merged.scheduled_at);

        let now = Utc::now();
        let class = classify(
            base_priority,
            has_appointment,
            scheduled_at,
            now,
            self.tolerance(),
        );
        merged.priority = class.priority;
        merged.has_appointment = class.has_appointment;
        merged.scheduled_at = class.scheduled_at;

        if !self.database.apply_entry_update(&merged).await? {
            // Raced with a call or cancellation between fetch and write
            return Err(QueueEngineError::invalid_transition(format!(
                "entry {entry_id} is no longer waiting"
            )));
        }

        if has_appointment && !class.has_appointment {
            info!(
                entry_id = %merged.id,
                patient = %merged.patient_name,
                priority = %merged.priority,
                "📋 Scheduled appointment lapsed during edit; kept as walk-in"
            );
        }

        self.require_entry(entry_id).await
    }

    /// Active entries in service order, optionally filtered to one staff
    /// member or to the unassigned pool
    pub async fn list_active(&self, filter: &ActiveFilter) -> Result<Vec<QueueEntry>> {
        self.database.list_active(filter).await
    }

    /// One entry by id
    pub async fn get_entry(&self, entry_id: &str) -> Result<QueueEntry> {
        self.require_entry(entry_id).await
    }

    /// Finalized entries, newest first
    pub async fn get_history(&self, filter: &HistoryFilter) -> Result<Vec<QueueEntry>> {
        self.database.list_history(filter).await
    }

    /// Waiting pool snapshot
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.database.queue_stats(Utc::now()).await
    }

    // === Staff and room management ===

    /// Register (or re-register) a staff member
    pub async fn register_staff(
        &self,
        staff_id: &str,
        display_name: &str,
        role: RequesterRole,
    ) -> Result<StaffMember> {
        require_non_blank("staff_id", staff_id)?;
        require_non_blank("display_name", display_name)?;

        self.database
            .upsert_staff(staff_id, display_name, role, Utc::now())
            .await?;
        self.require_staff(staff_id).await
    }

    /// One staff member by id
    pub async fn get_staff(&self, staff_id: &str) -> Result<StaffMember> {
        self.require_staff(staff_id).await
    }

    /// All registered staff members
    pub async fn list_staff(&self) -> Result<Vec<StaffMember>> {
        self.database.list_staff().await
    }

    /// Record an activity heartbeat; keeps the reaper off this occupant
    pub async fn record_activity(&self, staff_id: &str) -> Result<()> {
        if !self.database.record_activity(staff_id, Utc::now()).await? {
            return Err(QueueEngineError::not_found(format!("staff member {staff_id}")));
        }
        Ok(())
    }

    /// Check a staff member in to a room.
    ///
    /// The occupancy check and the claim are one atomic store operation;
    /// two staff members can never both win the same room.
    pub async fn check_in_room(&self, staff_id: &str, room_id: &str) -> Result<StaffMember> {
        self.require_staff(staff_id).await?;
        let room = self.require_room(room_id).await?;
        if !room.is_active {
            return Err(QueueEngineError::validation(format!(
                "room {} is not active",
                room.name
            )));
        }

        if self.database.claim_room(staff_id, room_id, Utc::now()).await? {
            info!("🔑 Staff member {} checked in to room {}", staff_id, room.name);
            return self.require_staff(staff_id).await;
        }

        let occupant = self.database.room_occupant(room_id).await?;
        Err(QueueEngineError::room_occupied(format!(
            "room {} is occupied by {}",
            room.name,
            occupant
                .map(|o| o.display_name)
                .unwrap_or_else(|| "another staff member".to_string())
        )))
    }

    /// Check a staff member out of their current room; a no-op when they
    /// hold none
    pub async fn check_out_room(&self, staff_id: &str) -> Result<()> {
        self.require_staff(staff_id).await?;

        if self.database.release_room(staff_id, Utc::now()).await? {
            info!("🔓 Staff member {} checked out of their room", staff_id);
        } else {
            debug!("Staff member {} had no room to check out of", staff_id);
        }
        Ok(())
    }

    /// Create a room
    pub async fn create_room(&self, name: &str) -> Result<Room> {
        require_non_blank("name", name)?;
        self.database.create_room(name.trim(), Utc::now()).await
    }

    /// All rooms, optionally active only
    pub async fn list_rooms(&self, active_only: bool) -> Result<Vec<Room>> {
        self.database.list_rooms(active_only).await
    }

    /// Soft-activate or soft-deactivate a room
    pub async fn set_room_active(&self, room_id: &str, active: bool) -> Result<()> {
        if !self.database.set_room_active(room_id, active).await? {
            return Err(QueueEngineError::not_found(format!("room {room_id}")));
        }
        Ok(())
    }

    // === Internal helpers ===

    async fn resolve_call_target(
        &self,
        vet_id: Option<&str>,
        room_id: Option<&str>,
    ) -> Result<CallTarget> {
        match (vet_id, room_id) {
            (Some(vet), Some(room)) => {
                self.require_staff(vet).await?;
                let room = self.require_room(room).await?;
                if let Some(occupant) = self.database.room_occupant(&room.id).await? {
                    if occupant.id != vet {
                        return Err(QueueEngineError::room_occupied(format!(
                            "room {} is occupied by {}",
                            room.name, occupant.display_name
                        )));
                    }
                }
                Ok(CallTarget {
                    vet_id: vet.to_string(),
                    room_id: room.id,
                })
            }
            (Some(vet), None) => {
                let staff = self.require_staff(vet).await?;
                let room_id = staff.current_room_id.ok_or_else(|| {
                    QueueEngineError::not_checked_in(format!(
                        "staff member {vet} has no current room"
                    ))
                })?;
                Ok(CallTarget {
                    vet_id: vet.to_string(),
                    room_id,
                })
            }
            (None, Some(room)) => {
                let room = self.require_room(room).await?;
                let occupant = self.database.room_occupant(&room.id).await?.ok_or_else(|| {
                    QueueEngineError::room_empty(format!(
                        "room {} has nobody checked in",
                        room.name
                    ))
                })?;
                Ok(CallTarget {
                    vet_id: occupant.id,
                    room_id: room.id,
                })
            }
            (None, None) => Err(QueueEngineError::not_checked_in(
                "neither a staff member nor a room was supplied",
            )),
        }
    }

    async fn require_entry(&self, entry_id: &str) -> Result<QueueEntry> {
        self.database
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| QueueEngineError::not_found(format!("entry {entry_id}")))
    }

    async fn require_staff(&self, staff_id: &str) -> Result<StaffMember> {
        self.database
            .get_staff(staff_id)
            .await?
            .ok_or_else(|| QueueEngineError::not_found(format!("staff member {staff_id}")))
    }

    async fn require_room(&self, room_id: &str) -> Result<Room> {
        self.database
            .get_room(room_id)
            .await?
            .ok_or_else(|| QueueEngineError::not_found(format!("room {room_id}")))
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(QueueEngineError::validation(format!(
            "{field} must not be blank"
        )));
    }
    Ok(())
}
