use std::collections::HashSet;

use futures::future::join_all;

use gatepass_bot::domain::types::Outcome;
use gatepass_domain::event::{ChatKind, Event};
use gatepass_domain::id::{AccessCode, UserId};

use crate::helpers::{InMemoryCodePool, RecordingNotifier, StubMembership, engine};

#[tokio::test]
async fn should_never_hand_one_code_to_two_users() {
    let users: Vec<UserId> = (1..=20).map(|n| UserId(1000 + n)).collect();
    let store = InMemoryCodePool::with_codes(&["A1", "A2", "A3", "A4", "A5"]);
    let notifier = RecordingNotifier::new();
    let engine = engine(
        StubMembership::members(&users),
        store.clone(),
        notifier.clone(),
    );

    let events: Vec<Event> = users
        .iter()
        .enumerate()
        .map(|(i, user)| Event::command(i as i64, user.0, ChatKind::Private))
        .collect();
    let outcomes = join_all(events.iter().map(|e| engine.handle(e))).await;

    let delivered: Vec<AccessCode> = outcomes
        .into_iter()
        .filter_map(|o| match o.unwrap() {
            Outcome::Delivered(code) => Some(code),
            Outcome::PoolExhausted => None,
            other => panic!("unexpected outcome {other:?}"),
        })
        .collect();

    let distinct: HashSet<&AccessCode> = delivered.iter().collect();
    assert_eq!(delivered.len(), 5, "every code should be handed out");
    assert_eq!(distinct.len(), delivered.len(), "codes must be distinct");
    assert_eq!(store.used_codes().len(), 5);

    let mut assigned = HashSet::new();
    for user in &users {
        if let Some(assignment) = store.assignment(*user) {
            let code = assignment.code().cloned().unwrap();
            assert!(assigned.insert(code), "code assigned twice");
        }
    }
    assert_eq!(assigned.len(), 5);
}

#[tokio::test]
async fn should_suppress_duplicate_delivery_across_consumers() {
    let alice = UserId(1001);
    let store = InMemoryCodePool::with_codes(&["A123", "B456"]);
    let notifier = RecordingNotifier::new();
    let first = engine(
        StubMembership::members(&[alice]),
        store.clone(),
        notifier.clone(),
    );
    let second = engine(
        StubMembership::members(&[alice]),
        store.clone(),
        notifier.clone(),
    );
    let event = Event::command(1, alice.0, ChatKind::Private);

    let (a, b) = tokio::join!(first.handle(&event), second.handle(&event));
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| o.label());

    assert!(
        matches!(
            outcomes.as_slice(),
            [Outcome::Delivered(_), Outcome::DuplicateSuppressed]
        ),
        "unexpected outcomes {outcomes:?}"
    );
    assert_eq!(notifier.sent_to(alice).len(), 1, "user notified exactly once");

    let assignment = store.assignment(alice).unwrap();
    assert!(assignment.sent);
    let Outcome::Delivered(code) = &outcomes[0] else {
        unreachable!()
    };
    assert_eq!(assignment.code(), Some(code));
}

#[tokio::test]
async fn should_exhaust_gracefully_when_contention_outlasts_attempts() {
    let users: Vec<UserId> = (1..=8).map(|n| UserId(2000 + n)).collect();
    let store = InMemoryCodePool::with_codes(&["C1"]);
    let engine = engine(
        StubMembership::members(&users),
        store.clone(),
        RecordingNotifier::new(),
    );

    let events: Vec<Event> = users
        .iter()
        .map(|u| Event::command(1, u.0, ChatKind::Private))
        .collect();
    let outcomes: Vec<Outcome> = join_all(events.iter().map(|e| engine.handle(e)))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let delivered = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Delivered(_)))
        .count();
    let exhausted = outcomes
        .iter()
        .filter(|o| **o == Outcome::PoolExhausted)
        .count();
    assert_eq!(delivered, 1);
    assert_eq!(exhausted, 7);
}
