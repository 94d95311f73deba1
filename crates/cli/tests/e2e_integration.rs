//! End-to-end tests for the Waypoint booking orchestrator.
//!
//! These drive whole conversations through [`Orchestrator`] with the
//! built-in offline collaborators: classification, slot filling, planning,
//! search, selection, rule checks, payment and the itinerary.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use waypoint_config::AppConfig;
use waypoint_core::{
    ControlKind, ControlPayload, EventType, FixedClock, Leg, NodeId, ProtocolEvent, StateStore,
};
use waypoint_store::{FileStateStore, InMemoryStateStore};
use waypoint_workflow::{GraphExecutor, Orchestrator, Services};

const OPENING: &str = "我想去东京玩，从上海出发，下周五出发";
const NATIONAL_ID: &str = "110101199003078888";

// ── Harness ──────────────────────────────────────────────────────────────

/// Monday 2026-10-19, 10:00 at UTC+8.
fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2026, 10, 19, 2, 0, 0).unwrap())
}

fn orchestrator_on(store: Arc<dyn StateStore>, config: AppConfig) -> Orchestrator {
    let services = Services::from_config(config, Arc::new(clock())).unwrap();
    let executor = GraphExecutor::new(Arc::new(services)).unwrap();
    Orchestrator::new(executor, store)
}

fn orchestrator() -> Orchestrator {
    orchestrator_on(Arc::new(InMemoryStateStore::new()), AppConfig::default())
}

async fn say(orch: &Orchestrator, thread: &str, message: &str) -> Vec<ProtocolEvent> {
    orch.run_turn_collect(thread, message).await.unwrap()
}

fn controls(events: &[ProtocolEvent]) -> Vec<&ControlPayload> {
    events.iter().filter_map(|e| e.as_control()).collect()
}

fn text(events: &[ProtocolEvent]) -> String {
    events
        .iter()
        .filter_map(|e| e.as_message())
        .map(|m| m.content.as_str())
        .collect()
}

/// Opening message, economy plan, flight F2 selected.
async fn flight_locked(orch: &Orchestrator, thread: &str) {
    say(orch, thread, OPENING).await;
    say(orch, thread, "P1").await;
    say(orch, thread, "F2").await;
}

// ── Scenario: opening message ────────────────────────────────────────────

#[tokio::test]
async fn opening_message_fills_slots_and_offers_three_plans() {
    let orch = orchestrator();
    let events = say(&orch, "t1", OPENING).await;

    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert_eq!(state.slots.origin.as_deref(), Some("Shanghai"));
    assert_eq!(state.slots.destination.as_deref(), Some("Tokyo"));
    assert_eq!(state.slots.date, NaiveDate::from_ymd_opt(2026, 10, 30));
    assert_eq!(state.current_node, Some(NodeId::Plan));
    assert_eq!(state.plan_options.len(), 3);

    let controls = controls(&events);
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].kind, ControlKind::SelectPlan);
    assert_eq!(controls[0].options.len(), 3);
    assert_eq!(events.last().unwrap().event_type(), EventType::Control);
}

#[tokio::test]
async fn buffered_nodes_emit_one_message_and_one_control() {
    let orch = orchestrator();
    let events = say(&orch, "t1", OPENING).await;

    // collect and plan are both buffered: one final message each, no pieces.
    assert!(events.iter().filter_map(|e| e.as_message()).all(|m| !m.is_stream));
    let kinds: Vec<EventType> = events
        .iter()
        .map(|e| e.event_type())
        .filter(|k| *k != EventType::Status)
        .collect();
    assert_eq!(kinds, vec![EventType::Message, EventType::Message, EventType::Control]);
}

#[tokio::test]
async fn missing_origin_never_reaches_planning() {
    let orch = orchestrator();
    let events = say(&orch, "t1", "我想去东京，下周五出发").await;

    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert!(state.slots.origin.is_none());
    assert_eq!(state.current_node, Some(NodeId::Collect));
    assert!(state.plan_options.is_empty());
    assert!(controls(&events).is_empty());
    assert!(text(&events).contains("出发城市"));
}

// ── Scenario: payment without a lock ─────────────────────────────────────

#[tokio::test]
async fn paying_without_a_lock_is_blocked() {
    let orch = orchestrator();
    say(&orch, "t1", OPENING).await;
    let events = say(&orch, "t1", "帮我支付机票").await;

    let controls = controls(&events);
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].kind, ControlKind::Blocked);
    assert_eq!(controls[0].options[0]["rule_id"], "financial_transaction");
    assert!(text(&events).contains("尚未锁定机票"));
    assert!(events.iter().all(|e| e.as_error().is_none()));

    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert!(!state.booking.flight.is_paid());
    assert!(!state.booking.flight.is_locked());
    assert_eq!(state.current_node, Some(NodeId::Block));
    assert!(!state.security_flags.is_empty());
}

// ── Selection and payment ────────────────────────────────────────────────

#[tokio::test]
async fn option_token_locks_the_matching_flight() {
    let orch = orchestrator();
    say(&orch, "t1", OPENING).await;
    let events = say(&orch, "t1", "P1").await;
    let offered = controls(&events);
    assert_eq!(offered[0].kind, ControlKind::SelectFlight);
    assert_eq!(offered[0].options.len(), 3);

    say(&orch, "t1", "F2").await;
    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert!(state.booking.flight.is_locked());
    let selection = state.booking.flight.selection().unwrap();
    assert_eq!(selection.token, "F2");
    assert_eq!(selection.token, state.presented.flights[1].token);
}

#[tokio::test]
async fn out_of_range_token_reprompts_and_keeps_the_lock() {
    let orch = orchestrator();
    flight_locked(&orch, "t1").await;

    let events = say(&orch, "t1", "F9").await;
    assert!(text(&events).contains("F1 到 F3"));

    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert_eq!(state.booking.flight.selection().unwrap().token, "F2");
    assert!(state.booking.flight.is_locked());
}

#[tokio::test]
async fn repeated_payment_replays_the_same_order() {
    let orch = orchestrator();
    flight_locked(&orch, "t1").await;

    let first = say(&orch, "t1", "支付机票").await;
    let second = say(&orch, "t1", "支付机票").await;

    let receipt = |events: &[ProtocolEvent]| {
        controls(events)
            .into_iter()
            .find(|c| c.kind == ControlKind::Payment)
            .map(|c| c.options[0].clone())
            .unwrap()
    };
    let (first, second) = (receipt(&first), receipt(&second));
    assert_eq!(first["order_id"], second["order_id"]);
    assert_eq!(first["replayed"], false);
    assert_eq!(second["replayed"], true);

    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert!(state.booking.flight.is_paid());
    assert!(state.booking.flight.is_locked());
    assert_eq!(state.booking.flight.order_id(), first["order_id"].as_str());
}

#[tokio::test]
async fn full_booking_ends_with_an_itinerary() {
    let orch = orchestrator();
    flight_locked(&orch, "t1").await;
    say(&orch, "t1", "支付机票").await;

    let events = say(&orch, "t1", "订酒店").await;
    assert_eq!(controls(&events)[0].kind, ControlKind::SelectHotel);
    say(&orch, "t1", "H1").await;
    let events = say(&orch, "t1", "支付酒店").await;

    let kinds: Vec<ControlKind> = controls(&events).iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ControlKind::Payment, ControlKind::Itinerary]);
    let itinerary = &controls(&events)[1].options[0];
    assert_eq!(itinerary["origin"], "Shanghai");
    assert!(itinerary["hotel"]["order_id"].as_str().unwrap().starts_with("HT-"));
    assert!(itinerary["flight"]["order_id"].as_str().unwrap().starts_with("FL-"));

    let state = orch.thread_state("t1").await.unwrap().unwrap();
    for leg in [Leg::Flight, Leg::Hotel] {
        let booking = state.booking.leg(leg);
        assert!(booking.is_paid() && booking.is_locked());
    }
}

#[tokio::test]
async fn skipping_the_hotel_completes_the_trip() {
    let orch = orchestrator();
    flight_locked(&orch, "t1").await;
    say(&orch, "t1", "支付机票").await;

    let events = say(&orch, "t1", "这次不订酒店了").await;
    let itinerary = controls(&events)
        .into_iter()
        .find(|c| c.kind == ControlKind::Itinerary)
        .unwrap();
    assert_eq!(itinerary.options[0]["hotel"]["skipped"], true);
}

#[tokio::test]
async fn large_payment_needs_confirmation() {
    let orch = orchestrator();
    say(&orch, "t1", OPENING).await;
    say(&orch, "t1", "P2").await;
    say(&orch, "t1", "F1").await;

    let events = say(&orch, "t1", "支付机票").await;
    let confirm = controls(&events);
    assert_eq!(confirm[0].kind, ControlKind::Confirm);
    assert_eq!(confirm[0].options[0]["rule_id"], "financial_transaction");
    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert!(state.pending.is_some());
    assert!(!state.booking.flight.is_paid());

    say(&orch, "t1", "确认").await;
    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert!(state.booking.flight.is_paid());
    assert!(state.pending.is_none());
}

#[tokio::test]
async fn refusing_a_review_cancels_the_payment() {
    let orch = orchestrator();
    say(&orch, "t1", OPENING).await;
    say(&orch, "t1", "P2").await;
    say(&orch, "t1", "F1").await;
    say(&orch, "t1", "支付机票").await;

    let events = say(&orch, "t1", "取消").await;
    assert!(text(&events).contains("已取消"));
    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert!(!state.booking.flight.is_paid());
    assert!(state.pending.is_none());
}

// ── Rules ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn national_id_blocks_gated_transitions() {
    let orch = orchestrator();
    flight_locked(&orch, "t1").await;

    for message in [
        format!("支付机票，身份证{NATIONAL_ID}"),
        format!("F1 身份证{NATIONAL_ID}"),
    ] {
        let events = say(&orch, "t1", &message).await;
        let controls = controls(&events);
        assert_eq!(controls.len(), 1, "{message}");
        assert_eq!(controls[0].kind, ControlKind::Blocked);
        assert!(!text(&events).contains(NATIONAL_ID));
    }

    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert!(!state.booking.flight.is_paid());
    assert_eq!(state.booking.flight.selection().unwrap().token, "F2");
}

#[tokio::test]
async fn sensitive_destination_cannot_be_booked() {
    let mut config = AppConfig::default();
    config.rules.sensitive_locations = vec!["Tokyo".into()];
    let orch = orchestrator_on(Arc::new(InMemoryStateStore::new()), config);
    say(&orch, "t1", OPENING).await;
    say(&orch, "t1", "P1").await;

    let events = say(&orch, "t1", "F1").await;
    let controls = controls(&events);
    assert_eq!(controls[0].kind, ControlKind::Blocked);
    assert_eq!(controls[0].options[0]["rule_id"], "sensitive_location");
}

// ── Protocol and persistence ─────────────────────────────────────────────

#[tokio::test]
async fn sequence_numbers_increase_across_turns() {
    let orch = orchestrator();
    let mut all = Vec::new();
    for message in [OPENING, "P1", "F9", "你好", "天气怎么样"] {
        all.extend(say(&orch, "t1", message).await);
    }

    assert_eq!(all[0].sequence_no, 1);
    assert!(all.windows(2).all(|w| w[1].sequence_no == w[0].sequence_no + 1));
    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert_eq!(state.event_cursor, all.last().unwrap().sequence_no);
}

#[tokio::test]
async fn side_chat_streams_and_only_touches_history() {
    let orch = orchestrator();
    let events = say(&orch, "t1", "你好，你是谁").await;

    let pieces: Vec<_> = events.iter().filter_map(|e| e.as_message()).collect();
    assert!(pieces.len() > 1);
    assert!(pieces.iter().all(|m| m.is_stream));

    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert!(state.slots.is_empty());
    assert!(state.plan_options.is_empty());
    assert_eq!(state.history.len(), 2);
    assert_eq!(state.current_node, Some(NodeId::SideChat));
}

#[tokio::test]
async fn small_talk_mid_booking_falls_back_to_collect() {
    let orch = orchestrator();
    say(&orch, "t1", OPENING).await;
    say(&orch, "t1", "你好，你是谁").await;

    let state = orch.thread_state("t1").await.unwrap().unwrap();
    assert_eq!(state.current_node, Some(NodeId::Collect));
    assert_eq!(state.plan_options.len(), 3);
}

#[tokio::test]
async fn threads_are_isolated() {
    let orch = orchestrator();
    let (a, b) = tokio::join!(say(&orch, "alice", OPENING), say(&orch, "bob", "你好"));
    assert_eq!(a[0].sequence_no, 1);
    assert_eq!(b[0].sequence_no, 1);

    let bob = orch.thread_state("bob").await.unwrap().unwrap();
    assert!(bob.slots.is_empty());
    let mut threads = orch.list_threads().await.unwrap();
    threads.sort();
    assert_eq!(threads, vec!["alice".to_string(), "bob".to_string()]);
}

#[tokio::test]
async fn conversation_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = || -> Arc<dyn StateStore> { Arc::new(FileStateStore::new(dir.path().to_path_buf())) };

    let first = orchestrator_on(store(), AppConfig::default());
    let opening = say(&first, "t1", OPENING).await;
    drop(first);

    let second = orchestrator_on(store(), AppConfig::default());
    let events = say(&second, "t1", "P1").await;
    assert_eq!(events[0].sequence_no, opening.last().unwrap().sequence_no + 1);
    assert_eq!(controls(&events)[0].kind, ControlKind::SelectFlight);
}
