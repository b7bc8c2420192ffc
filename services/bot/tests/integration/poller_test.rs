use std::time::Duration;

use gatepass_bot::error::BotError;
use gatepass_bot::worker::Poller;
use gatepass_core::health::Heartbeat;
use gatepass_domain::assignment::Assignment;
use gatepass_domain::event::{ChatKind, Event};
use gatepass_domain::id::{AccessCode, UserId};
use gatepass_domain::membership::MembershipChange;

use crate::helpers::{
    GROUP, InMemoryCodePool, RecordingNotifier, ScriptedEventSource, StubMembership, engine,
};

const ALICE: UserId = UserId(1001);
const BOB: UserId = UserId(1002);

fn heartbeat() -> Heartbeat {
    Heartbeat::new(Duration::from_secs(60))
}

#[tokio::test]
async fn should_advance_cursor_past_handled_events() {
    let source = ScriptedEventSource::new(vec![
        Event::command(500, ALICE.0, ChatKind::Private),
        Event::ignored(501),
        Event::membership(502, BOB.0, GROUP.0, MembershipChange::Left),
    ]);
    let store = InMemoryCodePool::with_codes(&["A123"]);
    let mut poller = Poller::new(
        source.clone(),
        engine(
            StubMembership::members(&[ALICE]),
            store.clone(),
            RecordingNotifier::new(),
        ),
        Duration::from_millis(10),
        heartbeat(),
    );

    assert_eq!(poller.poll_once().await.unwrap(), 3);
    assert_eq!(poller.cursor(), 503);

    // Nothing new: the next poll asks from the advanced cursor and handles nothing.
    assert_eq!(poller.poll_once().await.unwrap(), 0);
    assert_eq!(source.cursors(), vec![0, 503]);
    assert_eq!(
        store.assignment(ALICE),
        Some(Assignment::delivered(AccessCode::new("A123")))
    );
}

#[tokio::test]
async fn should_hold_cursor_at_failed_event_and_retry_it() {
    let source = ScriptedEventSource::new(vec![
        Event::ignored(10),
        Event::command(11, ALICE.0, ChatKind::Private),
        Event::ignored(12),
    ]);
    let store = InMemoryCodePool::with_codes(&["A123"]);
    let notifier = RecordingNotifier::new();
    let mut poller = Poller::new(
        source.clone(),
        engine(
            StubMembership::members(&[ALICE]),
            store.clone(),
            notifier.clone(),
        ),
        Duration::from_millis(10),
        heartbeat(),
    );

    store.set_unavailable(true);
    let err = poller.poll_once().await.unwrap_err();
    assert!(matches!(err, BotError::Firestore { status: 503, .. }));
    assert_eq!(poller.cursor(), 11, "events before the failure stay acknowledged");

    store.set_unavailable(false);
    assert_eq!(poller.poll_once().await.unwrap(), 2);
    assert_eq!(poller.cursor(), 13);
    assert_eq!(source.cursors(), vec![0, 11]);
    assert_eq!(notifier.sent_to(ALICE).len(), 1);
}

#[tokio::test]
async fn should_retry_whole_update_when_one_of_its_events_fails() {
    // One update announcing two new members fans out into two events with one id.
    let source = ScriptedEventSource::new(vec![
        Event::membership(503, ALICE.0, GROUP.0, MembershipChange::Joined),
        Event::membership(503, BOB.0, GROUP.0, MembershipChange::Joined),
    ]);
    let store = InMemoryCodePool::with_codes(&["A123"]);
    store.put_assignment(ALICE, Assignment::delivered(AccessCode::new("OLD1")));
    store.put_assignment(BOB, Assignment::delivered(AccessCode::new("OLD2")));
    store.fail_next_delete(BOB);
    let mut poller = Poller::new(
        source.clone(),
        engine(
            StubMembership::default(),
            store.clone(),
            RecordingNotifier::new(),
        ),
        Duration::from_millis(10),
        heartbeat(),
    );

    assert!(poller.poll_once().await.is_err());
    assert_eq!(poller.cursor(), 0, "update 503 is only partly handled");
    assert_eq!(store.assignment(ALICE), None);

    assert_eq!(poller.poll_once().await.unwrap(), 2);
    assert_eq!(poller.cursor(), 504);
    assert_eq!(store.assignment(BOB), None, "second member's revocation applied");
    assert_eq!(source.cursors(), vec![0, 0]);
}

#[tokio::test]
async fn should_keep_cursor_when_poll_fails() {
    let source = ScriptedEventSource::new(vec![Event::ignored(42)]);
    source.fail_next(BotError::RateLimited { retry_after: 1 });
    let mut poller = Poller::new(
        source.clone(),
        engine(
            StubMembership::default(),
            InMemoryCodePool::empty(),
            RecordingNotifier::new(),
        ),
        Duration::from_millis(10),
        heartbeat(),
    );

    assert!(poller.poll_once().await.is_err());
    assert_eq!(poller.cursor(), 0);
    assert_eq!(poller.poll_once().await.unwrap(), 1);
    assert_eq!(poller.cursor(), 43);
}

#[tokio::test]
async fn should_deliver_once_when_upstream_replays_events() {
    let source = ScriptedEventSource::new(vec![Event::command(
        7,
        ALICE.0,
        ChatKind::Private,
    )]);
    let store = InMemoryCodePool::with_codes(&["A123", "B456"]);
    let notifier = RecordingNotifier::new();
    let mut poller = Poller::new(
        source.clone(),
        engine(
            StubMembership::members(&[ALICE]),
            store.clone(),
            notifier.clone(),
        ),
        Duration::from_millis(10),
        heartbeat(),
    );

    poller.poll_once().await.unwrap();
    // Upstream delivers the same command again under a new id.
    source.push(Event::command(8, ALICE.0, ChatKind::Private));
    poller.poll_once().await.unwrap();

    assert_eq!(notifier.sent_to(ALICE).len(), 1);
    assert_eq!(store.used_codes(), vec!["A123"]);
}

#[tokio::test]
async fn should_beat_heartbeat_and_survive_errors_while_running() {
    let source = ScriptedEventSource::new(vec![Event::command(
        1,
        ALICE.0,
        ChatKind::Private,
    )]);
    source.fail_next(BotError::Timeout);
    let notifier = RecordingNotifier::new();
    let heartbeat = heartbeat();
    let mut poller = Poller::new(
        source.clone(),
        engine(
            StubMembership::members(&[ALICE]),
            InMemoryCodePool::with_codes(&["A123"]),
            notifier.clone(),
        ),
        Duration::from_millis(10),
        heartbeat.clone(),
    );
    assert!(!heartbeat.is_fresh());

    let stopped = tokio::time::timeout(Duration::from_millis(200), poller.run()).await;

    assert!(stopped.is_err(), "run should only end when cancelled");
    assert!(heartbeat.is_fresh());
    assert_eq!(notifier.sent_to(ALICE).len(), 1);
    assert!(source.cursors().len() >= 3);
}
