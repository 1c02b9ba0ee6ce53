//! End-to-end reconciliation over HTTP.
//!
//! Runs `ScheduleEngine<HttpScheduleClient>` against a real oncall-stub
//! server on a random port. The stub rewrites timezones, timestamps,
//! `effectiveSince` and enum values the way the production service does,
//! so these tests check convergence through the whole stack:
//! wire format, error classification, retry and drift normalization.

use std::time::Duration;

use oncall_client::{
    ApiConfig, AssignmentStrategy, Classify, ErrorClass, Event, EventSpec, HttpScheduleClient,
    Member, RetryPolicy, Rotation, Schedule, StrategyType,
};
use oncall_engine::{plan, Action, EngineConfig, ReconcileError, ScheduleEngine};
use oncall_stub::AppState;

/// Start the stub on a random port and wait until it answers.
async fn start_stub() -> (u16, AppState) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind to random port");
    let port = listener.local_addr().unwrap().port();
    let state = AppState::new();
    let app = oncall_stub::router(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.ok();
    });

    let client = reqwest::Client::new();
    for _ in 0..50 {
        if client
            .get(format!("http://127.0.0.1:{port}/health"))
            .send()
            .await
            .is_ok()
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    (port, state)
}

async fn engine() -> (ScheduleEngine<HttpScheduleClient>, AppState) {
    let (port, stub) = start_stub().await;
    let client = HttpScheduleClient::new(ApiConfig::local(port, "e2e-token").unwrap()).unwrap();
    let config = EngineConfig {
        retry: RetryPolicy {
            budget: Duration::from_secs(5),
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        ..EngineConfig::default()
    };
    (ScheduleEngine::new(client, config), stub)
}

fn event(name: &str, strategy: StrategyType, members: Vec<Member>) -> Event {
    Event {
        id: None,
        spec: EventSpec {
            name: name.into(),
            start_time: "2026-02-02T09:00:00+05:30".into(),
            end_time: "2026-02-02T18:00:00+05:30".into(),
            // In the past: the stub advances it to the time of the write.
            effective_since: "2026-01-01T00:00:00+05:30".into(),
            effective_until: Some("2027-01-01T00:00:00+05:30".into()),
            recurrence: vec!["FREQ=WEEKLY;BYDAY=MO,WE,FR".into()],
            assignment_strategy: Some(AssignmentStrategy {
                strategy_type: strategy,
                members,
            }),
        },
    }
}

fn desired() -> Schedule {
    Schedule {
        id: None,
        name: "checkout-oncall".into(),
        time_zone: "Asia/Kolkata".into(),
        description: None,
        rotations: vec![
            Rotation {
                id: None,
                events: vec![
                    event(
                        "primary",
                        StrategyType::RotateMembers,
                        vec![Member::user("u-1"), Member::user("u-2")],
                    ),
                    event("backup", StrategyType::AssignToAll, vec![Member::user("u-3")]),
                ],
            },
            Rotation {
                id: None,
                events: vec![event(
                    "escalation",
                    StrategyType::RotateMembers,
                    vec![Member::empty()],
                )],
            },
        ],
    }
}

#[tokio::test]
async fn refresh_and_update_after_create_issue_no_mutation() {
    let (engine, stub) = engine().await;
    let created = engine.create(desired()).await.unwrap();
    let id = created.id.clone().unwrap();
    assert_eq!(stub.mutation_count(), 1 + 2 + 3);

    let refreshed = engine.read(&id, Some(&created)).await.unwrap().unwrap();
    assert_eq!(refreshed, created, "server rewrites leaked into state");
    assert!(plan(&desired(), Some(&refreshed), &engine.config().drift).is_empty());

    let updated = engine.update(desired(), &refreshed).await.unwrap();
    assert_eq!(updated, created);
    assert_eq!(stub.mutation_count(), 1 + 2 + 3);
}

#[tokio::test]
async fn import_without_prior_shows_server_values() {
    let (engine, _stub) = engine().await;
    let created = engine.create(desired()).await.unwrap();

    let imported = engine.import(created.id.as_ref().unwrap()).await.unwrap();
    assert_eq!(imported.time_zone, "Asia/Calcutta");
    let primary = &imported.rotations[0].events[0].spec;
    assert_eq!(primary.start_time, "2026-02-02T03:30:00Z");
    assert_eq!(
        primary.assignment_strategy.as_ref().unwrap().strategy_type,
        StrategyType::RotateMembers
    );

    // Without a prior value the advanced effective_since reads as a real
    // difference, so every event is planned for update and nothing else.
    let p = plan(&desired(), Some(&imported), &engine.config().drift);
    assert_eq!(p.count(Action::Update), 3, "{p}");
    assert!(p.changes.iter().all(|c| c.path.contains("event")), "{p}");
}

#[tokio::test]
async fn positional_changes_reach_the_server() {
    let (engine, stub) = engine().await;
    let created = engine.create(desired()).await.unwrap();
    let id = created.id.clone().unwrap();

    let mut next = desired();
    next.rotations[0].events.truncate(1);
    next.rotations[1].events[0].spec.name = "escalation-l2".into();
    next.rotations.push(Rotation {
        id: None,
        events: vec![event(
            "shadow",
            StrategyType::AssignToAll,
            vec![Member::user("u-9")],
        )],
    });
    let before = stub.mutation_count();
    let updated = engine.update(next.clone(), &created).await.unwrap();

    // delete backup, update escalation, create rotation + event
    assert_eq!(stub.mutation_count() - before, 4);
    assert_eq!(stub.event_count(), 3);

    let refreshed = engine.read(&id, Some(&updated)).await.unwrap().unwrap();
    assert_eq!(refreshed, updated);
    assert!(plan(&next, Some(&refreshed), &engine.config().drift).is_empty());
}

#[tokio::test]
async fn injected_transient_faults_are_retried() {
    let (engine, stub) = engine().await;
    stub.inject_faults("create_event", &[503, 429]);
    stub.inject_faults("create_rotation", &[502]);

    let created = engine.create(desired()).await.unwrap();
    assert!(created.id.is_some());
    assert_eq!(stub.event_count(), 3);
}

#[tokio::test]
async fn permanent_fault_rolls_back_create() {
    let (engine, stub) = engine().await;
    stub.inject_faults("create_event", &[400]);

    let err = engine.create(desired()).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Permanent);
    assert_eq!(err.path(), "rotation[0].event[0]");
    assert!(stub.schedules().is_empty(), "partial schedule left behind");
    assert!(stub.rotations().is_empty());
}

#[tokio::test]
async fn rejected_event_reports_position() {
    let (engine, stub) = engine().await;
    let created = engine.create(desired()).await.unwrap();

    stub.inject_faults("update_event", &[422]);
    let mut next = desired();
    next.rotations[1].events[0].spec.name = "escalation-l2".into();
    let err = engine.update(next, &created).await.unwrap_err();

    assert_eq!(err.path(), "rotation[1].event[0]");
    assert!(matches!(err.root(), ReconcileError::Remote { .. }));
    assert_eq!(err.class(), ErrorClass::Permanent);
    // No compensation on update: the schedule stays.
    assert_eq!(stub.schedules().len(), 1);
}

#[tokio::test]
async fn malformed_timestamp_never_reaches_the_server() {
    let (engine, stub) = engine().await;
    let mut bad = desired();
    bad.rotations[1].events[0].spec.start_time = "next tuesday".into();

    let err = engine.create(bad).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Invalid(_)), "{err}");
    assert!(err.to_string().contains("rotation[1].event[0]"), "{err}");
    assert_eq!(stub.mutation_count(), 0);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (engine, stub) = engine().await;
    let created = engine.create(desired()).await.unwrap();
    let id = created.id.unwrap();

    engine.delete(&id).await.unwrap();
    engine.delete(&id).await.unwrap();
    assert!(stub.schedules().is_empty());
    assert!(engine.read(&id, None).await.unwrap().is_none());
}
