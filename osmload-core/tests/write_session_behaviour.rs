//! Behavioural tests for `WriteSession` transitions.

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;

use osmload_core::{
    EntityKind, SessionError, User, WriteSession,
    test_support::{RecordingSink, node},
};

struct Harness {
    sink: RecordingSink,
    session: WriteSession<RecordingSink>,
}

#[fixture]
fn harness() -> RefCell<Option<Harness>> {
    RefCell::new(None)
}

#[fixture]
fn outcome() -> RefCell<Option<Result<(), SessionError>>> {
    RefCell::new(None)
}

fn with_harness<T>(
    harness: &RefCell<Option<Harness>>,
    action: impl FnOnce(&mut Harness) -> T,
) -> T {
    let mut guard = harness.borrow_mut();
    let harness = guard.as_mut().expect("session prepared");
    action(harness)
}

#[given("a closed write session")]
fn closed_session(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    let sink = RecordingSink::new();
    let session = WriteSession::new(sink.clone());
    *harness.borrow_mut() = Some(Harness { sink, session });
}

#[when("users are inserted and the session switches to nodes")]
fn insert_then_switch(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), SessionError>>>,
) {
    let result = with_harness(harness, |h| {
        h.session.begin_batch(EntityKind::User)?;
        h.session.insert_users([(1, "alice"), (2, "bob")])?;
        let start = h.session.begin_batch(EntityKind::Node)?;
        assert!(start.previous_committed, "switch should report a commit");
        Ok(())
    });
    *outcome.borrow_mut() = Some(result);
}

#[when("nodes are inserted without beginning a batch")]
fn insert_while_closed(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), SessionError>>>,
) {
    let result = with_harness(harness, |h| {
        h.session
            .insert_nodes(&[node(1, User::unknown())])
            .map(|_| ())
    });
    *outcome.borrow_mut() = Some(result);
}

#[when("users are inserted and the batch ends without commit")]
fn insert_then_rollback(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), SessionError>>>,
) {
    let result = with_harness(harness, |h| {
        h.session.begin_batch(EntityKind::User)?;
        h.session.insert_users([(1, "alice")])?;
        h.session.end_batch(false)
    });
    *outcome.borrow_mut() = Some(result);
}

#[then("the users are committed")]
fn users_committed(
    #[from(harness)] harness: &RefCell<Option<Harness>>,
    #[from(outcome)] outcome: &RefCell<Option<Result<(), SessionError>>>,
) {
    let borrowed = outcome.borrow();
    let result = borrowed.as_ref().expect("action was attempted");
    assert!(result.is_ok(), "unexpected failure: {result:?}");
    with_harness(harness, |h| {
        assert_eq!(h.sink.committed_count("users"), 2);
        assert_eq!(h.session.open_kind(), Some(EntityKind::Node));
    });
}

#[then("only one connection was ever open")]
fn single_connection(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |h| assert_eq!(h.sink.max_open_connections(), 1));
}

#[then("an illegal state error is returned")]
fn illegal_state(#[from(outcome)] outcome: &RefCell<Option<Result<(), SessionError>>>) {
    let borrowed = outcome.borrow();
    match borrowed.as_ref().expect("action was attempted") {
        Err(SessionError::IllegalState {
            requested: EntityKind::Node,
            open: None,
        }) => {}
        other => panic!("expected an illegal state error, got {other:?}"),
    }
}

#[then("no users are committed")]
fn nothing_committed(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |h| {
        assert_eq!(h.sink.committed_count("users"), 0);
        assert_eq!(h.sink.rollbacks(), 1);
    });
}

#[then("the session is closed")]
fn session_closed(#[from(harness)] harness: &RefCell<Option<Harness>>) {
    with_harness(harness, |h| {
        assert!(!h.session.has_pending_write());
        assert_eq!(h.sink.open_connections(), 0);
    });
}

#[scenario(path = "tests/features/write_session.feature", index = 0)]
fn switching_commits_pending_work(
    harness: RefCell<Option<Harness>>,
    outcome: RefCell<Option<Result<(), SessionError>>>,
) {
    let _ = (harness, outcome);
}

#[scenario(path = "tests/features/write_session.feature", index = 1)]
fn rejecting_inserts_while_closed(
    harness: RefCell<Option<Harness>>,
    outcome: RefCell<Option<Result<(), SessionError>>>,
) {
    let _ = (harness, outcome);
}

#[scenario(path = "tests/features/write_session.feature", index = 2)]
fn ending_without_commit_discards_work(
    harness: RefCell<Option<Harness>>,
    outcome: RefCell<Option<Result<(), SessionError>>>,
) {
    let _ = (harness, outcome);
}
