//! Scheduler operation tests.
//!
//! These cover the entry state machine guards, the ordering contract, the
//! lapse policy at creation/edit time, and the room validation rules, all
//! against in-memory databases.

use anyhow::Result;
use chrono::{Duration, Utc};
use vetdesk_queue_engine::prelude::*;

async fn create_test_scheduler() -> Result<QueueScheduler> {
    let mut config = QueueEngineConfig::default();
    config.database.database_path = String::new(); // in-memory
    Ok(QueueScheduler::connect(config).await?)
}

async fn checked_in_vet(scheduler: &QueueScheduler, vet_id: &str, room_name: &str) -> Result<Room> {
    scheduler
        .register_staff(vet_id, vet_id, RequesterRole::Veterinarian)
        .await?;
    let room = scheduler.create_room(room_name).await?;
    scheduler.check_in_room(vet_id, &room.id).await?;
    Ok(room)
}

#[tokio::test]
async fn add_inserts_waiting_walk_in() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    let entry = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana Souza", "consultation"))
        .await
        .expect("add should succeed");

    assert_eq!(entry.status, EntryStatus::Waiting);
    assert_eq!(entry.priority, Priority::Normal);
    assert!(!entry.has_appointment);
    assert!(entry.assigned_vet_id.is_none());
    assert!(entry.called_at.is_none());
    assert!(entry.completed_at.is_none());
}

#[tokio::test]
async fn add_rejects_blank_fields() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    let err = scheduler
        .add_entry(NewQueueEntry::walk_in("   ", "Ana Souza", "consultation"))
        .await
        .expect_err("blank patient name must be rejected");
    assert!(matches!(err, QueueEngineError::Validation(_)));

    let err = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "", "consultation"))
        .await
        .expect_err("blank tutor name must be rejected");
    assert!(matches!(err, QueueEngineError::Validation(_)));

    // Nothing was inserted
    let active = scheduler.list_active(&ActiveFilter::default()).await.unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn lapsed_appointment_is_inserted_as_walk_in() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    let slot = Utc::now() - Duration::minutes(20);
    let entry = scheduler
        .add_entry(NewQueueEntry::appointment("Mia", "Carlos Lima", "vaccine", slot))
        .await
        .expect("add should succeed");

    assert!(!entry.has_appointment);
    assert_eq!(entry.scheduled_at, None);
    assert_eq!(entry.priority, Priority::Normal);
    assert_eq!(entry.status, EntryStatus::Waiting);
}

#[tokio::test]
async fn appointment_within_grace_is_preserved() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    let slot = Utc::now() - Duration::minutes(10);
    let entry = scheduler
        .add_entry(NewQueueEntry::appointment("Mia", "Carlos Lima", "vaccine", slot))
        .await
        .expect("add should succeed");

    assert!(entry.has_appointment);
    assert_eq!(entry.scheduled_at, Some(slot));
}

#[tokio::test]
async fn call_next_follows_priority_then_fifo() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");
    let _room = checked_in_vet(&scheduler, "vet-1", "Room 1").await.unwrap();

    let normal_first = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let normal_second = scheduler
        .add_entry(NewQueueEntry::walk_in("Bolt", "Bia", "consultation"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let emergency = scheduler
        .add_entry(
            NewQueueEntry::walk_in("Luna", "Caio", "trauma").with_priority(Priority::Emergency),
        )
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let high = scheduler
        .add_entry(NewQueueEntry::walk_in("Thor", "Duda", "pain").with_priority(Priority::High))
        .await
        .unwrap();

    let order: Vec<String> = [
        scheduler.call_next(Some("vet-1"), None).await.unwrap(),
        scheduler.call_next(Some("vet-1"), None).await.unwrap(),
        scheduler.call_next(Some("vet-1"), None).await.unwrap(),
        scheduler.call_next(Some("vet-1"), None).await.unwrap(),
    ]
    .into_iter()
    .map(|e| e.expect("queue should not be empty yet").id)
    .collect();

    assert_eq!(
        order,
        vec![emergency.id, high.id, normal_first.id, normal_second.id]
    );

    // Queue drained: call_next returns None, not an error
    let none = scheduler.call_next(Some("vet-1"), None).await.unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn call_stamps_assignment_and_called_at() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");
    let room = checked_in_vet(&scheduler, "vet-1", "Room 1").await.unwrap();

    scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();

    let called = scheduler
        .call_next(Some("vet-1"), None)
        .await
        .unwrap()
        .expect("entry should be claimed");

    assert_eq!(called.status, EntryStatus::Called);
    assert_eq!(called.assigned_vet_id.as_deref(), Some("vet-1"));
    assert_eq!(called.room_id.as_deref(), Some(room.id.as_str()));
    assert!(called.called_at.is_some());
}

#[tokio::test]
async fn call_next_requires_a_resolvable_room() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");
    scheduler
        .register_staff("vet-1", "Dr. Reyes", RequesterRole::Veterinarian)
        .await
        .unwrap();

    // Vet not checked in anywhere
    let err = scheduler
        .call_next(Some("vet-1"), None)
        .await
        .expect_err("vet without a room cannot call");
    assert!(matches!(err, QueueEngineError::NotCheckedIn(_)));

    // Neither vet nor room
    let err = scheduler
        .call_next(None, None)
        .await
        .expect_err("nothing to resolve");
    assert!(matches!(err, QueueEngineError::NotCheckedIn(_)));
}

#[tokio::test]
async fn dispatch_into_empty_room_is_rejected() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");
    let room = scheduler.create_room("Room 1").await.unwrap();

    scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();

    // A receptionist may not dispatch into a room nobody occupies
    let err = scheduler
        .call_next(None, Some(&room.id))
        .await
        .expect_err("empty room must be rejected");
    assert!(matches!(err, QueueEngineError::RoomHasNoActiveOccupant(_)));
}

#[tokio::test]
async fn dispatch_goes_to_room_occupant() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");
    let room = checked_in_vet(&scheduler, "vet-1", "Room 1").await.unwrap();

    scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();

    // Receptionist dispatch: no vet supplied, entry goes to the occupant
    let called = scheduler
        .call_next(None, Some(&room.id))
        .await
        .unwrap()
        .expect("entry should be claimed");
    assert_eq!(called.assigned_vet_id.as_deref(), Some("vet-1"));
}

#[tokio::test]
async fn room_occupied_by_other_is_rejected_until_checkout() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");
    let room = checked_in_vet(&scheduler, "vet-a", "Room 1").await.unwrap();
    scheduler
        .register_staff("vet-b", "Dr. Braga", RequesterRole::Veterinarian)
        .await
        .unwrap();

    scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();

    let err = scheduler
        .call_next(Some("vet-b"), Some(&room.id))
        .await
        .expect_err("occupied room must be rejected");
    assert!(matches!(err, QueueEngineError::RoomOccupiedByOther(_)));

    // After the occupant checks out, the same call succeeds
    scheduler.check_out_room("vet-a").await.unwrap();
    let called = scheduler
        .call_next(Some("vet-b"), Some(&room.id))
        .await
        .unwrap()
        .expect("entry should be claimed after checkout");
    assert_eq!(called.assigned_vet_id.as_deref(), Some("vet-b"));
}

#[tokio::test]
async fn call_specific_targets_one_entry() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");
    let _room = checked_in_vet(&scheduler, "vet-1", "Room 1").await.unwrap();

    let _first = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = scheduler
        .add_entry(NewQueueEntry::walk_in("Bolt", "Bia", "consultation"))
        .await
        .unwrap();

    let called = scheduler
        .call_specific(&second.id, Some("vet-1"), None)
        .await
        .expect("specific call should succeed");
    assert_eq!(called.id, second.id);
    assert_eq!(called.status, EntryStatus::Called);

    // A second call on the same entry violates the WAITING guard
    let err = scheduler
        .call_specific(&second.id, Some("vet-1"), None)
        .await
        .expect_err("entry is no longer WAITING");
    assert!(matches!(err, QueueEngineError::InvalidTransition(_)));

    let err = scheduler
        .call_specific("no-such-entry", Some("vet-1"), None)
        .await
        .expect_err("unknown entry");
    assert!(matches!(err, QueueEngineError::NotFound(_)));
}

#[tokio::test]
async fn start_from_waiting_stamps_called_at() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    let entry = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();

    let started = scheduler
        .start_service(&entry.id, RequesterRole::Veterinarian)
        .await
        .expect("direct start from WAITING is permitted");
    assert_eq!(started.status, EntryStatus::InProgress);
    assert!(started.called_at.is_some());
}

#[tokio::test]
async fn front_desk_cannot_start_service() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    let entry = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();

    let err = scheduler
        .start_service(&entry.id, RequesterRole::Receptionist)
        .await
        .expect_err("front desk may not start service");
    assert!(matches!(err, QueueEngineError::Forbidden(_)));
}

#[tokio::test]
async fn front_desk_cannot_complete_unassigned_entry() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    let entry = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();

    let err = scheduler
        .complete_service(&entry.id, RequesterRole::Receptionist)
        .await
        .expect_err("unassigned entry may not be completed from the front desk");
    assert!(matches!(err, QueueEngineError::Forbidden(_)));
}

#[tokio::test]
async fn terminal_states_are_immutable() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    let entry = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();

    scheduler
        .start_service(&entry.id, RequesterRole::Veterinarian)
        .await
        .unwrap();
    let completed = scheduler
        .complete_service(&entry.id, RequesterRole::Veterinarian)
        .await
        .unwrap();
    assert_eq!(completed.status, EntryStatus::Completed);
    assert!(completed.completed_at.is_some());

    // Completing twice violates the guard
    let err = scheduler
        .complete_service(&entry.id, RequesterRole::Veterinarian)
        .await
        .expect_err("double complete must fail");
    assert!(matches!(err, QueueEngineError::InvalidTransition(_)));

    // Cancelling a completed entry violates the guard
    let err = scheduler
        .cancel_entry(&entry.id)
        .await
        .expect_err("cancel after complete must fail");
    assert!(matches!(err, QueueEngineError::InvalidTransition(_)));

    // Starting a completed entry violates the guard
    let err = scheduler
        .start_service(&entry.id, RequesterRole::Veterinarian)
        .await
        .expect_err("start after complete must fail");
    assert!(matches!(err, QueueEngineError::InvalidTransition(_)));
}

#[tokio::test]
async fn cancel_is_allowed_from_any_active_status() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");
    let _room = checked_in_vet(&scheduler, "vet-1", "Room 1").await.unwrap();

    // WAITING
    let waiting = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();
    let cancelled = scheduler.cancel_entry(&waiting.id).await.unwrap();
    assert_eq!(cancelled.status, EntryStatus::Cancelled);

    // CALLED
    let entry = scheduler
        .add_entry(NewQueueEntry::walk_in("Bolt", "Bia", "consultation"))
        .await
        .unwrap();
    scheduler.call_next(Some("vet-1"), None).await.unwrap();
    let cancelled = scheduler.cancel_entry(&entry.id).await.unwrap();
    assert_eq!(cancelled.status, EntryStatus::Cancelled);

    // A second cancel is a transition out of a terminal state
    let err = scheduler
        .cancel_entry(&entry.id)
        .await
        .expect_err("double cancel must fail");
    assert!(matches!(err, QueueEngineError::InvalidTransition(_)));
}

#[tokio::test]
async fn claim_assigns_without_calling() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");
    scheduler
        .register_staff("vet-1", "Dr. Reyes", RequesterRole::Veterinarian)
        .await
        .unwrap();
    scheduler
        .register_staff("vet-2", "Dr. Braga", RequesterRole::Veterinarian)
        .await
        .unwrap();

    let entry = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();

    let claimed = scheduler.claim_entry(&entry.id, "vet-1").await.unwrap();
    assert_eq!(claimed.status, EntryStatus::Waiting);
    assert_eq!(claimed.assigned_vet_id.as_deref(), Some("vet-1"));
    assert!(claimed.called_at.is_none());

    // Already assigned: a second claim fails
    let err = scheduler
        .claim_entry(&entry.id, "vet-2")
        .await
        .expect_err("entry is already assigned");
    assert!(matches!(err, QueueEngineError::InvalidTransition(_)));
}

#[tokio::test]
async fn update_is_front_desk_only_and_waiting_only() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    let entry = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();

    let err = scheduler
        .update_entry(
            &entry.id,
            EntryUpdate {
                patient_name: Some("Rexo".to_string()),
                ..EntryUpdate::default()
            },
            RequesterRole::Veterinarian,
        )
        .await
        .expect_err("vets do not edit queue entries");
    assert!(matches!(err, QueueEngineError::Forbidden(_)));

    let updated = scheduler
        .update_entry(
            &entry.id,
            EntryUpdate {
                patient_name: Some("Rexo".to_string()),
                priority: Some(Priority::High),
                ..EntryUpdate::default()
            },
            RequesterRole::Receptionist,
        )
        .await
        .expect("front desk edit should succeed");
    assert_eq!(updated.patient_name, "Rexo");
    assert_eq!(updated.priority, Priority::High);

    // Once started, the entry can no longer be edited
    scheduler
        .start_service(&entry.id, RequesterRole::Veterinarian)
        .await
        .unwrap();
    let err = scheduler
        .update_entry(
            &entry.id,
            EntryUpdate {
                patient_name: Some("Rex".to_string()),
                ..EntryUpdate::default()
            },
            RequesterRole::Receptionist,
        )
        .await
        .expect_err("only waiting entries can be edited");
    assert!(matches!(err, QueueEngineError::InvalidTransition(_)));
}

#[tokio::test]
async fn update_cannot_bypass_the_lapse_rule() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    let slot = Utc::now() + Duration::hours(1);
    let entry = scheduler
        .add_entry(NewQueueEntry::appointment("Mia", "Carlos", "vaccine", slot))
        .await
        .unwrap();
    assert!(entry.has_appointment);

    // Moving the slot 20 minutes into the past converts to a walk-in
    let updated = scheduler
        .update_entry(
            &entry.id,
            EntryUpdate {
                scheduled_at: Some(Utc::now() - Duration::minutes(20)),
                ..EntryUpdate::default()
            },
            RequesterRole::Receptionist,
        )
        .await
        .expect("edit should succeed");
    assert!(!updated.has_appointment);
    assert_eq!(updated.scheduled_at, None);
    assert_eq!(updated.priority, Priority::Normal);
}

#[tokio::test]
async fn list_active_filters_by_assignment() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");
    scheduler
        .register_staff("vet-1", "Dr. Reyes", RequesterRole::Veterinarian)
        .await
        .unwrap();

    let mine = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let pool = scheduler
        .add_entry(NewQueueEntry::walk_in("Bolt", "Bia", "consultation"))
        .await
        .unwrap();
    scheduler.claim_entry(&mine.id, "vet-1").await.unwrap();

    let assigned = scheduler
        .list_active(&ActiveFilter {
            assigned_vet_id: Some("vet-1".to_string()),
            unassigned_only: false,
        })
        .await
        .unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].id, mine.id);

    let unassigned = scheduler
        .list_active(&ActiveFilter {
            assigned_vet_id: None,
            unassigned_only: true,
        })
        .await
        .unwrap();
    assert_eq!(unassigned.len(), 1);
    assert_eq!(unassigned[0].id, pool.id);

    let all = scheduler.list_active(&ActiveFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn history_returns_finalized_entries() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    let done = scheduler
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();
    scheduler
        .start_service(&done.id, RequesterRole::Veterinarian)
        .await
        .unwrap();
    scheduler
        .complete_service(&done.id, RequesterRole::Veterinarian)
        .await
        .unwrap();

    let gone = scheduler
        .add_entry(NewQueueEntry::walk_in("Bolt", "Bia", "consultation"))
        .await
        .unwrap();
    scheduler.cancel_entry(&gone.id).await.unwrap();

    let still_waiting = scheduler
        .add_entry(NewQueueEntry::walk_in("Luna", "Caio", "consultation"))
        .await
        .unwrap();

    let history = scheduler.get_history(&HistoryFilter::default()).await.unwrap();
    let ids: Vec<&str> = history.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(history.len(), 2);
    assert!(ids.contains(&done.id.as_str()));
    assert!(ids.contains(&gone.id.as_str()));
    assert!(!ids.contains(&still_waiting.id.as_str()));

    let completed_only = scheduler
        .get_history(&HistoryFilter {
            status: Some(EntryStatus::Completed),
            ..HistoryFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(completed_only.len(), 1);
    assert_eq!(completed_only[0].id, done.id);
}

#[tokio::test]
async fn check_in_requires_an_active_room() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");
    scheduler
        .register_staff("vet-1", "Dr. Reyes", RequesterRole::Veterinarian)
        .await
        .unwrap();
    let room = scheduler.create_room("Room 1").await.unwrap();

    scheduler.set_room_active(&room.id, false).await.unwrap();
    let err = scheduler
        .check_in_room("vet-1", &room.id)
        .await
        .expect_err("inactive room blocks check-in");
    assert!(matches!(err, QueueEngineError::Validation(_)));

    scheduler.set_room_active(&room.id, true).await.unwrap();
    let staff = scheduler.check_in_room("vet-1", &room.id).await.unwrap();
    assert_eq!(staff.current_room_id.as_deref(), Some(room.id.as_str()));
    assert!(staff.room_checked_in_at.is_some());

    let err = scheduler
        .check_in_room("vet-1", "no-such-room")
        .await
        .expect_err("unknown room");
    assert!(matches!(err, QueueEngineError::NotFound(_)));
}

#[tokio::test]
async fn unknown_ids_surface_not_found() {
    let scheduler = create_test_scheduler().await.expect("scheduler creation failed");

    assert!(matches!(
        scheduler.get_entry("missing").await,
        Err(QueueEngineError::NotFound(_))
    ));
    assert!(matches!(
        scheduler.cancel_entry("missing").await,
        Err(QueueEngineError::NotFound(_))
    ));
    assert!(matches!(
        scheduler.get_staff("missing").await,
        Err(QueueEngineError::NotFound(_))
    ));
    assert!(matches!(
        scheduler.record_activity("missing").await,
        Err(QueueEngineError::NotFound(_))
    ));
}
