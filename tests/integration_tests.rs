//! Integration tests for the queue engine
//!
//! These tests verify that the scheduler, policy, store, and jobs work
//! together correctly over a shared in-memory database.

use anyhow::Result;
use serial_test::serial;
use vetdesk_queue_engine::prelude::*;

async fn create_test_engine() -> Result<QueueScheduler> {
    vetdesk_queue_engine::init_tracing();

    let mut config = QueueEngineConfig::default();
    config.database.database_path = String::new(); // in-memory

    Ok(QueueScheduler::connect(config).await?)
}

#[tokio::test]
#[serial]
async fn test_engine_creation() {
    let engine = create_test_engine().await.expect("engine creation failed");

    // Verify initial state
    let stats = engine.queue_stats().await.expect("stats should be accessible");
    assert_eq!(stats.waiting_total, 0);
    assert_eq!(stats.longest_wait_secs, None);

    // Verify configuration is accessible
    let config = engine.config();
    assert!(config.general.max_waiting_entries > 0);
    assert_eq!(config.policy.tolerance_minutes, 15);
    assert!(engine.database().health_check().await);
}

#[tokio::test]
#[serial]
async fn test_staff_and_room_registration() {
    let engine = create_test_engine().await.expect("engine creation failed");

    let staff = engine
        .register_staff("vet-001", "Dr. Reyes", RequesterRole::Veterinarian)
        .await
        .expect("staff registration failed");
    assert_eq!(staff.id, "vet-001");
    assert_eq!(staff.display_name, "Dr. Reyes");
    assert_eq!(staff.current_room_id, None);

    // Re-registration updates the record in place
    let staff = engine
        .register_staff("vet-001", "Dr. R. Reyes", RequesterRole::Veterinarian)
        .await
        .expect("re-registration failed");
    assert_eq!(staff.display_name, "Dr. R. Reyes");
    assert_eq!(engine.list_staff().await.unwrap().len(), 1);

    let room = engine.create_room("Consultation 1").await.expect("room creation failed");
    assert!(room.is_active);
    assert_eq!(engine.list_rooms(true).await.unwrap().len(), 1);

    // Soft deactivation keeps the room listed, just not as active
    engine.set_room_active(&room.id, false).await.unwrap();
    assert_eq!(engine.list_rooms(true).await.unwrap().len(), 0);
    assert_eq!(engine.list_rooms(false).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_full_service_flow() {
    let engine = create_test_engine().await.expect("engine creation failed");

    // Front desk setup: a vet checked into a room
    engine
        .register_staff("vet-001", "Dr. Reyes", RequesterRole::Veterinarian)
        .await
        .unwrap();
    let room = engine.create_room("Consultation 1").await.unwrap();
    engine.check_in_room("vet-001", &room.id).await.unwrap();

    // A tutor walks in
    let entry = engine
        .add_entry(
            NewQueueEntry::walk_in("Rex", "Ana Souza", "consultation")
                .with_patient_ref("patient-records/rex-42"),
        )
        .await
        .unwrap();
    assert_eq!(entry.status, EntryStatus::Waiting);

    let stats = engine.queue_stats().await.unwrap();
    assert_eq!(stats.waiting_total, 1);
    assert_eq!(stats.normal_waiting, 1);

    // The vet pulls the next entry
    let called = engine
        .call_next(Some("vet-001"), None)
        .await
        .unwrap()
        .expect("entry should be claimed");
    assert_eq!(called.id, entry.id);
    assert_eq!(called.status, EntryStatus::Called);
    assert_eq!(called.room_id.as_deref(), Some(room.id.as_str()));

    // Service runs to completion
    let started = engine
        .start_service(&entry.id, RequesterRole::Veterinarian)
        .await
        .unwrap();
    assert_eq!(started.status, EntryStatus::InProgress);

    let completed = engine
        .complete_service(&entry.id, RequesterRole::Veterinarian)
        .await
        .unwrap();
    assert_eq!(completed.status, EntryStatus::Completed);
    assert!(completed.completed_at.is_some());

    // The queue is empty again and history has the entry
    assert_eq!(engine.queue_stats().await.unwrap().waiting_total, 0);
    let history = engine.get_history(&HistoryFilter::default()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, entry.id);
    assert_eq!(history[0].patient_ref.as_deref(), Some("patient-records/rex-42"));
}

#[tokio::test]
#[serial]
async fn test_appointment_flow_with_escalation() {
    let engine = create_test_engine().await.expect("engine creation failed");

    // An appointment still in the future stays scheduled
    let slot = Utc::now() + chrono::Duration::minutes(30);
    let entry = engine
        .add_entry(NewQueueEntry::appointment("Mia", "Carlos Lima", "vaccine", slot))
        .await
        .unwrap();
    assert!(entry.has_appointment);

    // The escalation sweep leaves it untouched while the slot holds
    let job = EscalationJob::new(engine.database().clone(), engine.config());
    assert_eq!(job.run_once().await.unwrap(), 0);

    let unchanged = engine.get_entry(&entry.id).await.unwrap();
    assert!(unchanged.has_appointment);
    assert_eq!(unchanged.scheduled_at, Some(slot));
}

#[tokio::test]
#[serial]
async fn test_spawned_jobs_keep_running() {
    let engine = create_test_engine().await.expect("engine creation failed");

    let (escalation, reaper) = engine.spawn_jobs();

    // Give both loops a moment to start ticking, then confirm the engine
    // still serves requests with the jobs alive.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    engine
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana Souza", "consultation"))
        .await
        .expect("engine should serve requests while jobs run");

    assert!(!escalation.is_finished());
    assert!(!reaper.is_finished());
    escalation.abort();
    reaper.abort();
}

#[tokio::test]
#[serial]
async fn test_queue_capacity_limit() {
    let engine = {
        let mut config = QueueEngineConfig::default();
        config.database.database_path = String::new();
        config.general.max_waiting_entries = 2;
        QueueScheduler::connect(config).await.expect("engine creation failed")
    };

    engine
        .add_entry(NewQueueEntry::walk_in("Rex", "Ana", "consultation"))
        .await
        .unwrap();
    engine
        .add_entry(NewQueueEntry::walk_in("Bolt", "Bia", "consultation"))
        .await
        .unwrap();

    let err = engine
        .add_entry(NewQueueEntry::walk_in("Luna", "Caio", "consultation"))
        .await
        .expect_err("waiting pool is at capacity");
    assert!(matches!(err, QueueEngineError::Validation(_)));
}
