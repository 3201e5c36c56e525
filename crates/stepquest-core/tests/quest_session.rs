//! End-to-end scenarios over a full `QuestSession`.
//!
//! Drives the simulated pedometer and a manual clock through scans, mission
//! completion, rewards, day changes and restarts, checking what reaches the
//! journal and which events are published.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use chrono::Duration;
use stepquest_core::mission::FALLBACK_REWARD;
use stepquest_core::{
    Clock, Config, Database, Event, GenerationError, Journal, LocationFix, ManualClock,
    MemoryStore, MissionState, OfflineGenerator, QuestSession, ScanContext, SimulatedPedometer,
    TextGenerator, Vibe,
};

struct Harness {
    session: QuestSession,
    clock: Arc<ManualClock>,
    pedometer: Arc<SimulatedPedometer>,
    events: Receiver<Event>,
}

fn harness_with(
    clock: Arc<ManualClock>,
    journal: Journal,
    text: Arc<dyn TextGenerator>,
) -> Harness {
    let pedometer = Arc::new(SimulatedPedometer::new(clock.clone()));
    let mut session = QuestSession::new(
        pedometer.clone(),
        clock.clone(),
        journal,
        text,
        &Config::default(),
    )
    .unwrap();
    let events = session.subscribe();
    Harness {
        session,
        clock,
        pedometer,
        events,
    }
}

fn harness(text: Arc<dyn TextGenerator>) -> Harness {
    harness_with(
        Arc::new(ManualClock::at(2026, 5, 4, 10, 0, 0)),
        Journal::new(Arc::new(MemoryStore::new())),
        text,
    )
}

fn drain(events: &Receiver<Event>) -> Vec<Event> {
    events.try_iter().collect()
}

fn mission_id(session: &QuestSession, vibe: Vibe) -> String {
    session
        .missions()
        .missions()
        .iter()
        .find(|m| m.vibe == vibe)
        .unwrap()
        .id
        .clone()
}

/// Answers with a fixed text the first time and times out afterwards.
struct FirstThenTimeout {
    first: String,
    calls: AtomicUsize,
}

impl TextGenerator for FirstThenTimeout {
    fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(self.first.clone())
        } else {
            Err(GenerationError::Timeout)
        }
    }
}

#[test]
fn workout_completes_exactly_once() {
    let mut h = harness(Arc::new(OfflineGenerator));
    h.pedometer
        .record_at(h.clock.now() - Duration::hours(2), 1_000);
    assert_eq!(h.session.start().unwrap(), 1_000);

    h.session.scan(&ScanContext::at("Riverside")).unwrap();
    let id = mission_id(&h.session, Vibe::Workout);
    h.session.select(&id).unwrap();
    assert_eq!(h.session.missions().active_mission().unwrap().mission.step_target, 5_000);

    h.pedometer.walk(1);
    h.pedometer.walk(3_000);
    h.session.pump();
    assert_eq!(h.session.missions().progress(), Some(0.6));

    h.pedometer.walk(2_000);
    h.session.pump();
    assert_eq!(h.session.steps(), 6_000);
    assert_eq!(h.session.missions().state(), MissionState::Completed);

    h.pedometer.walk(500);
    h.session.pump();
    h.pedometer.walk(500);
    h.session.pump();
    h.session.wait_for_rewards();

    let events = drain(&h.events);
    let completed = events
        .iter()
        .filter(|e| matches!(e, Event::MissionCompleted { .. }))
        .count();
    let rewards = events
        .iter()
        .filter(|e| matches!(e, Event::RewardReady { persisted: true, .. }))
        .count();
    assert_eq!(completed, 1);
    assert_eq!(rewards, 1);

    let history = h.session.journal().history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, id);
    assert_eq!(history[0].steps_completed, 5_000);
    assert_eq!(h.session.journal().stats().unwrap().total_missions, 1);
}

#[test]
fn chill_only_answer_still_offers_three_missions() {
    let answer = r#"[{"vibe":"chill","title":"Canal Drift","description":"Follow the water.","stepTarget":1240}]"#;
    let mut h = harness(Arc::new(FirstThenTimeout {
        first: answer.to_string(),
        calls: AtomicUsize::new(0),
    }));
    h.session.start().unwrap();

    let missions = h.session.scan(&ScanContext::default()).unwrap();
    let vibes: Vec<Vibe> = missions.iter().map(|m| m.vibe).collect();
    assert_eq!(vibes, vec![Vibe::Chill, Vibe::Discovery, Vibe::Workout]);
    assert_eq!(missions[0].title, "Canal Drift");
    assert_eq!(missions[0].step_target, 1_200);
    assert_eq!(missions[1].title, "Urban Explorer's Path");
    assert_eq!(missions[2].title, "The Endurance Trial");
    assert_eq!(h.session.missions().state(), MissionState::Selecting);
}

#[test]
fn reward_timeout_still_completes_and_persists() {
    let mut h = harness(Arc::new(FirstThenTimeout {
        first: String::new(),
        calls: AtomicUsize::new(0),
    }));
    h.session.start().unwrap();
    h.session.scan(&ScanContext::default()).unwrap();
    let id = mission_id(&h.session, Vibe::Chill);
    h.session.select(&id).unwrap();

    h.clock.advance(Duration::minutes(9));
    h.pedometer.walk(1);
    h.pedometer.walk(1_000);
    h.session.pump();
    assert_eq!(h.session.missions().state(), MissionState::Completed);

    h.session.wait_for_rewards();
    let active = h.session.missions().active_mission().unwrap();
    assert_eq!(active.reward_text.as_deref(), Some(FALLBACK_REWARD));

    let history = h.session.journal().history().unwrap();
    assert_eq!(history[0].reward_text, FALLBACK_REWARD);
    assert_eq!(history[0].duration_minutes, 9);
    assert_eq!(h.session.journal().stats().unwrap().total_missions, 1);
}

#[test]
fn failed_scan_can_be_retried() {
    let mut h = harness(Arc::new(FirstThenTimeout {
        first: "not json".to_string(),
        calls: AtomicUsize::new(1),
    }));
    h.session.start().unwrap();

    assert!(h.session.scan(&ScanContext::default()).is_err());
    assert_eq!(h.session.missions().state(), MissionState::Idle);
    assert!(h.session.missions().error().is_some());
    assert!(drain(&h.events)
        .iter()
        .any(|e| matches!(e, Event::ScanFailed { .. })));
}

#[test]
fn dismiss_and_cancel_leave_nothing_behind() {
    let mut h = harness(Arc::new(OfflineGenerator));
    h.session.start().unwrap();

    h.session.scan(&ScanContext::default()).unwrap();
    h.session.dismiss().unwrap();
    assert_eq!(h.session.missions().state(), MissionState::Idle);
    assert!(h.session.missions().missions().is_empty());

    h.session.scan(&ScanContext::default()).unwrap();
    let id = mission_id(&h.session, Vibe::Discovery);
    h.session.select(&id).unwrap();
    h.session.cancel().unwrap();
    assert_eq!(h.session.missions().state(), MissionState::Idle);
    assert!(h.session.missions().missions().is_empty());
    assert!(h.session.missions().active_mission().is_none());
    assert!(h.session.journal().history().unwrap().is_empty());
}

#[test]
fn route_is_recorded_and_saved_with_the_mission() {
    let mut h = harness(Arc::new(OfflineGenerator));
    h.session.start().unwrap();
    h.session.scan(&ScanContext::default()).unwrap();
    assert!(!h.session.on_location(&LocationFix::new(0.0, 0.0, 1)));

    let id = mission_id(&h.session, Vibe::Chill);
    h.session.select(&id).unwrap();
    assert!(h.session.on_location(&LocationFix::new(0.0, 0.0, 1)));
    assert!(!h.session.on_location(&LocationFix::new(0.0, 0.00004, 2)));
    assert!(h.session.on_location(&LocationFix::new(0.0, 0.0001, 3)));

    h.session.complete().unwrap();
    h.session.wait_for_rewards();
    let history = h.session.journal().history().unwrap();
    assert_eq!(history[0].route_coordinates.len(), 2);
    assert!(history[0].route_length_km() > 0.0);
}

#[test]
fn midnight_and_foreground_in_same_tick_reset_once() {
    let mut h = harness_with(
        Arc::new(ManualClock::at(2026, 5, 4, 23, 58, 0)),
        Journal::new(Arc::new(MemoryStore::new())),
        Arc::new(OfflineGenerator),
    );
    h.session.start().unwrap();
    h.pedometer.walk(1);
    h.pedometer.walk(900);
    h.session.pump();
    assert_eq!(h.session.journal().stats().unwrap().total_steps, 900);

    h.clock.advance(Duration::minutes(5));
    h.pedometer.walk_unobserved(30);
    h.session.tick();
    h.session.on_app_foreground();
    assert_eq!(h.session.steps(), 30);

    let events = drain(&h.events);
    let rollovers: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::DayRolledOver {
                previous_steps,
                steps,
                ..
            } => Some((*previous_steps, *steps)),
            _ => None,
        })
        .collect();
    assert_eq!(rollovers, vec![(900, 30)]);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::StepsReconciled { steps: 30, .. })));

    h.pedometer.walk(1);
    h.pedometer.walk(20);
    h.session.on_app_background();
    assert_eq!(h.session.steps(), 50);
    assert_eq!(h.session.journal().stats().unwrap().total_steps, 950);
}

#[test]
fn steps_walked_just_before_midnight_reach_the_lifetime_total() {
    let mut h = harness_with(
        Arc::new(ManualClock::at(2026, 5, 4, 23, 59, 0)),
        Journal::new(Arc::new(MemoryStore::new())),
        Arc::new(OfflineGenerator),
    );
    h.session.start().unwrap();
    h.pedometer.walk(1);
    h.pedometer.walk(40);
    h.session.pump();
    assert_eq!(h.session.steps(), 40);
    assert_eq!(h.session.journal().stats().unwrap().total_steps, 0);

    h.clock.advance(Duration::seconds(90));
    h.session.tick();
    assert_eq!(h.session.steps(), 0);
    assert_eq!(h.session.journal().stats().unwrap().total_steps, 40);
    assert!(drain(&h.events)
        .iter()
        .any(|e| matches!(e, Event::StepsSynced { delta: 40, total_steps: 40, .. })));

    h.pedometer.walk(60);
    h.session.on_app_background();
    h.session.stop();
    assert_eq!(h.session.steps(), 60);
    assert_eq!(h.session.journal().stats().unwrap().total_steps, 100);
    assert_eq!(h.session.sync_engine().synced_today(), 60);
}

#[test]
fn dropping_a_session_still_saves_its_reward() {
    let mut h = harness(Arc::new(OfflineGenerator));
    h.session.start().unwrap();
    h.session.scan(&ScanContext::default()).unwrap();
    let id = mission_id(&h.session, Vibe::Chill);
    h.session.select(&id).unwrap();
    h.session.complete().unwrap();

    let journal = h.session.journal().clone();
    drop(h);

    let history = journal.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, id);
    assert_eq!(journal.stats().unwrap().total_missions, 1);
}

#[test]
fn restart_over_sqlite_does_not_double_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stepquest.db");
    let clock = Arc::new(ManualClock::at(2026, 5, 4, 8, 0, 0));

    let journal = Journal::new(Arc::new(Database::open_at(&path).unwrap()));
    let mut first = harness_with(clock.clone(), journal, Arc::new(OfflineGenerator));
    first.session.start().unwrap();
    first.pedometer.walk(1);
    first.pedometer.walk(300);
    first.session.on_app_background();
    assert_eq!(first.session.journal().stats().unwrap().total_steps, 300);
    drop(first);

    // A fresh process sees the same platform history.
    clock.advance(Duration::hours(1));
    let journal = Journal::new(Arc::new(Database::open_at(&path).unwrap()));
    let pedometer = Arc::new(SimulatedPedometer::new(clock.clone()));
    pedometer.record_at(clock.now() - Duration::minutes(30), 301);
    let mut session = QuestSession::new(
        pedometer.clone(),
        clock.clone(),
        journal,
        Arc::new(OfflineGenerator),
        &Config::default(),
    )
    .unwrap();

    assert_eq!(session.start().unwrap(), 301);
    session.on_app_background();
    assert_eq!(session.journal().stats().unwrap().total_steps, 301);

    pedometer.walk(1);
    pedometer.walk(99);
    session.stop();
    assert_eq!(session.journal().stats().unwrap().total_steps, 400);
    assert_eq!(session.sync_engine().cursor(), 400);
}
