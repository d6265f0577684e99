//! Contention stress tests for the conflict-safe write path
//!
//! These hammer the optimistic read-modify-write primitive with many
//! uncoordinated writers and check that the invariants hold at full load.

use engine::countdown;
use engine::{RaceError, RaceService};
use serde_json::{json, Value};
use shared::COUNTDOWN_DURATION_MS;
use std::thread;
use std::time::{Duration, Instant};
use store::{Clock, Store, StoreError, TxDecision, MAX_TX_RETRIES};

/// Stresses one lane with many concurrent writers; every accepted step must
/// land in the final position.
#[test]
fn stress_many_writers_single_lane() {
    let service = started_service(1_000_000, &["a"]);
    let writers = 8u32;
    let steps_per_writer = 50u32;

    let start = Instant::now();
    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let service = service.clone();
            thread::spawn(move || {
                let step_value = (w % 6) + 1;
                let mut accepted = 0u32;
                for _ in 0..steps_per_writer {
                    match service.submit_step("race1", "a", step_value) {
                        Ok(_) => accepted += step_value,
                        Err(RaceError::ContendedWrite(_)) => {}
                        Err(err) => panic!("unexpected error under load: {}", err),
                    }
                }
                accepted
            })
        })
        .collect();

    let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    let duration = start.elapsed();

    let position = service.participants("race1").unwrap()[0].position;
    println!(
        "Counter contention: {} writers x {} steps in {:?} ({} accepted, position {})",
        writers, steps_per_writer, duration, total, position
    );

    assert_eq!(position, total);
    // Should not take anywhere near this long on an in-process store
    assert!(duration.as_secs() < 30);
}

/// Twelve runners cross the line at the same instant; ranks must still form
/// a gap-free bijection onto 1..=12.
#[test]
fn rank_storm_under_contention() {
    let users: Vec<String> = (0..12).map(|i| format!("u{:02}", i)).collect();
    let user_refs: Vec<&str> = users.iter().map(String::as_str).collect();
    let service = started_service(6, &user_refs);

    let start = Instant::now();
    let handles: Vec<_> = users
        .iter()
        .map(|user| {
            let service = service.clone();
            let user = user.clone();
            thread::spawn(move || loop {
                match service.submit_step("race1", &user, 6) {
                    Ok(step) => return step.rank,
                    Err(RaceError::ContendedWrite(_)) => {}
                    Err(err) => panic!("unexpected error under load: {}", err),
                }
            })
        })
        .collect();

    let mut ranks: Vec<u32> = handles
        .into_iter()
        .map(|h| h.join().unwrap().expect("every finisher gets a rank"))
        .collect();
    ranks.sort_unstable();

    println!("Rank storm: 12 simultaneous finishers in {:?}", start.elapsed());
    let expected: Vec<u32> = (1..=12).collect();
    assert_eq!(ranks, expected);
}

/// A transaction that always loses gives up after its bounded retry budget
/// instead of spinning forever.
#[test]
fn retry_budget_is_bounded() {
    let store = Store::new();
    store.write("races/hot", json!(0));

    let interloper = store.clone();
    let mut attempts = 0u32;
    let start = Instant::now();
    let result = store.transact("races/hot", |current| {
        attempts += 1;
        let n = current.and_then(Value::as_u64).unwrap_or(0);
        interloper.write("races/hot", json!(n));
        TxDecision::Commit(json!(n + 1))
    });
    let duration = start.elapsed();

    println!(
        "Retry budget: gave up after {} attempts in {:?}",
        attempts, duration
    );
    assert_eq!(attempts, MAX_TX_RETRIES);
    assert!(matches!(result, Err(StoreError::Contended { .. })));
    assert!(duration.as_secs() < 5);
}

/// Sweeping a large population of expired rooms stays a cheap periodic
/// scan.
#[test]
fn sweep_scales_over_many_rooms() {
    let store = Store::with_clock(Clock::manual(0));
    let service = RaceService::new(store.clone());
    let rooms = engine::rooms::RoomManager::new(store.clone());

    for i in 0..200 {
        service
            .create_room_with_id(&format!("room-{:03}", i), 100)
            .unwrap();
    }
    store.clock().advance(Duration::from_secs(301));
    // A late room that must survive the sweep
    service.create_room_with_id("fresh", 100).unwrap();

    let start = Instant::now();
    let removed = rooms.sweep_once();
    let duration = start.elapsed();

    println!("Sweep: removed {} rooms in {:?}", removed.len(), duration);
    assert_eq!(removed.len(), 200);
    assert!(service.session("fresh").is_ok());
    assert!(duration.as_millis() < 1_000);
}

// HELPER FUNCTIONS

/// Room "race1" populated with `users`, already started.
fn started_service(finish_distance: u32, users: &[&str]) -> RaceService {
    let service = RaceService::new(Store::with_clock(Clock::manual(0)));
    service.create_room_with_id("race1", finish_distance).unwrap();
    for user in users {
        service.join_room("race1", user, user).unwrap();
    }
    service.start_countdown("race1").unwrap();
    service
        .store()
        .clock()
        .advance(Duration::from_millis(COUNTDOWN_DURATION_MS));
    assert!(countdown::try_begin_if_due(service.store(), "race1").unwrap());
    service
}
