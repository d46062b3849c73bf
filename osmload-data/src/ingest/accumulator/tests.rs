//! Unit tests for buffering, thresholds and counter resets.

use super::*;
use osmload_core::{
    ElementKind,
    test_support::{RecordingSink, SinkEvent, node, relation, way},
};
use rstest::{fixture, rstest};

#[fixture]
fn sink() -> RecordingSink {
    RecordingSink::new()
}

fn accumulator(
    sink: &RecordingSink,
    thresholds: Thresholds,
    reset: CounterReset,
) -> EntityAccumulator<RecordingSink> {
    EntityAccumulator::new(sink.clone(), thresholds, reset)
}

fn alice() -> User {
    User::new(1, "alice")
}

#[rstest]
#[case::one_short(2, Vec::new())]
#[case::at_threshold(3, vec![3])]
fn flushes_nodes_at_row_threshold(
    sink: RecordingSink,
    #[case] added: i64,
    #[case] expected: Vec<usize>,
) {
    let mut acc = accumulator(&sink, Thresholds::new(3, 100), CounterReset::Global);
    for id in 1..=added {
        acc.add_node(node(id, alice()));
    }
    assert_eq!(sink.executions("nodes"), expected);
    let remaining = if expected.is_empty() { 2 } else { 0 };
    assert_eq!(acc.buffered(EntityKind::Node), remaining);
}

#[rstest]
fn failed_flush_keeps_buffer_and_retries(sink: RecordingSink) {
    let mut acc = accumulator(&sink, Thresholds::new(3, 100), CounterReset::Global);
    sink.fail_execute("nodes");
    for id in 1..=3 {
        acc.add_node(node(id, alice()));
    }
    assert_eq!(acc.buffered(EntityKind::Node), 3);
    assert_eq!(acc.report().failed_flushes(EntityKind::Node), 1);

    sink.clear_failures();
    acc.add_node(node(4, alice()));

    assert_eq!(sink.executions("nodes"), vec![4]);
    assert_eq!(acc.buffered(EntityKind::Node), 0);
}

#[rstest]
fn explicit_failed_flush_reports_failure(sink: RecordingSink) {
    let mut acc = accumulator(&sink, Thresholds::default(), CounterReset::Global);
    acc.add_way(way(1, alice(), &[1, 2]));
    sink.fail_execute("ways");
    assert_eq!(acc.flush(EntityKind::Way), FlushOutcome::Failed);
    assert_eq!(acc.buffered(EntityKind::Way), 1);
    assert_eq!(acc.flush(EntityKind::Relation), FlushOutcome::Empty);
}

#[rstest]
fn commit_threshold_commits_and_resets(sink: RecordingSink) {
    let mut acc = accumulator(&sink, Thresholds::new(2, 4), CounterReset::Global);
    acc.add_node(node(1, alice()));
    acc.add_node(node(2, alice()));
    assert_eq!(acc.counters().get(EntityKind::Node), 2);
    assert!(acc.has_pending_write());

    acc.add_node(node(3, alice()));
    acc.add_node(node(4, alice()));

    assert_eq!(sink.committed_count("nodes"), 4);
    assert!(!acc.has_pending_write());
    assert_eq!(acc.counters().get(EntityKind::Node), 0);
}

#[rstest]
fn kind_switch_resets_every_counter(sink: RecordingSink) {
    let mut acc = accumulator(&sink, Thresholds::default(), CounterReset::Global);
    acc.add_node(node(1, alice()));
    assert_eq!(acc.flush(EntityKind::Node), FlushOutcome::Flushed { rows: 1 });
    assert_eq!(acc.counters().get(EntityKind::Node), 1);

    acc.add_way(way(2, alice(), &[1]));
    acc.flush(EntityKind::Way);

    assert_eq!(sink.commits(), 1);
    assert_eq!(sink.committed_count("nodes"), 1);
    assert_eq!(acc.counters().get(EntityKind::Node), 0);
    assert_eq!(acc.counters().get(EntityKind::Way), 1);
}

#[rstest]
#[case::global(CounterReset::Global, FlushOutcome::Flushed { rows: 2 })]
#[case::per_type(CounterReset::PerType, FlushOutcome::Committed { rows: 2 })]
fn reset_policy_decides_threshold_commits(
    sink: RecordingSink,
    #[case] policy: CounterReset,
    #[case] expected: FlushOutcome,
) {
    let mut acc = accumulator(&sink, Thresholds::new(100, 3), policy);
    acc.add_node(node(1, User::unknown()));
    acc.add_node(node(2, User::unknown()));
    acc.flush(EntityKind::Node);
    acc.add_way(way(10, User::unknown(), &[1, 2]));
    acc.flush(EntityKind::Way);

    acc.add_node(node(3, User::unknown()));
    acc.add_node(node(4, User::unknown()));
    assert_eq!(acc.flush(EntityKind::Node), expected);
}

#[rstest]
#[case::global(CounterReset::Global)]
#[case::per_type(CounterReset::PerType)]
fn failed_threshold_commit_is_counted_and_resets(
    sink: RecordingSink,
    #[case] policy: CounterReset,
) {
    let mut acc = accumulator(&sink, Thresholds::new(100, 2), policy);
    acc.add_node(node(1, alice()));
    acc.add_node(node(2, alice()));
    sink.fail_commit(true);

    assert_eq!(acc.flush(EntityKind::Node), FlushOutcome::CommitFailed { rows: 2 });

    assert_eq!(acc.report().failed_commits(), 1);
    assert_eq!(acc.report().failed_commits_of(EntityKind::Node), 1);
    assert_eq!(acc.report().total_failed_flushes(), 0);
    assert!(!acc.has_pending_write());
    assert_eq!(acc.counters().get(EntityKind::Node), 0);
    assert_eq!(acc.buffered(EntityKind::Node), 0);
    assert_eq!(sink.committed_count("nodes"), 0);
}

#[rstest]
fn failed_switch_commit_is_charged_to_the_previous_kind(sink: RecordingSink) {
    let mut acc = accumulator(&sink, Thresholds::default(), CounterReset::Global);
    acc.add_node(node(1, alice()));
    assert_eq!(acc.flush(EntityKind::User), FlushOutcome::Flushed { rows: 1 });
    assert_eq!(acc.counters().get(EntityKind::User), 1);
    sink.fail_commit(true);

    assert_eq!(acc.flush(EntityKind::Node), FlushOutcome::Flushed { rows: 1 });

    assert_eq!(acc.report().failed_commits_of(EntityKind::User), 1);
    assert_eq!(acc.report().failed_flushes(EntityKind::Node), 0);
    assert_eq!(acc.counters().get(EntityKind::User), 0);
    assert_eq!(acc.counters().get(EntityKind::Node), 1);
    assert_eq!(acc.buffered(EntityKind::Node), 0);
    assert!(acc.has_pending_write());

    sink.clear_failures();
    let report = acc.finish(Instant::now()).expect("final commit");

    assert_eq!(sink.committed_count("users"), 0);
    assert_eq!(sink.committed_count("nodes"), 1);
    assert_eq!(report.failed_commits(), 1);
    assert_eq!(report.total_failed_flushes(), 0);
    assert!(!report.is_complete());
}

#[rstest]
fn failed_reopen_after_switch_still_resets_counters(sink: RecordingSink) {
    let mut acc = accumulator(&sink, Thresholds::new(100, 3), CounterReset::Global);
    acc.add_node(node(1, alice()));
    acc.add_node(node(2, alice()));
    assert_eq!(acc.flush(EntityKind::Node), FlushOutcome::Flushed { rows: 2 });
    sink.fail_open(true);

    assert_eq!(acc.flush(EntityKind::User), FlushOutcome::Failed);

    assert_eq!(sink.committed_count("nodes"), 2);
    assert_eq!(acc.counters().get(EntityKind::Node), 0);
    assert_eq!(acc.report().failed_flushes(EntityKind::User), 1);
    assert_eq!(acc.report().failed_commits(), 0);
    assert!(!acc.has_pending_write());

    sink.clear_failures();
    acc.add_node(node(3, alice()));
    acc.add_node(node(4, alice()));
    assert_eq!(acc.flush(EntityKind::Node), FlushOutcome::Flushed { rows: 2 });
}

#[rstest]
fn users_are_deduplicated_within_the_window(sink: RecordingSink) {
    let mut acc = accumulator(&sink, Thresholds::default(), CounterReset::Global);
    acc.add_node(node(1, alice()));
    acc.add_node(node(2, alice()));
    acc.add_node(node(3, User::new(2, "bob")));
    assert_eq!(acc.buffered(EntityKind::User), 2);

    acc.flush(EntityKind::User);
    acc.add_node(node(4, alice()));

    assert_eq!(acc.buffered(EntityKind::User), 1);
}

#[rstest]
fn parents_expand_members_into_side_buffers(sink: RecordingSink) {
    let mut acc = accumulator(&sink, Thresholds::default(), CounterReset::Global);
    acc.add_way(way(1, alice(), &[1, 2, 3]));
    acc.add_relation(relation(
        9,
        alice(),
        &[(1, ElementKind::Way, "outer"), (2, ElementKind::Way, "inner")],
    ));
    assert_eq!(acc.buffered(EntityKind::WayNode), 1);
    assert_eq!(acc.buffered(EntityKind::RelationMember), 1);

    acc.flush(EntityKind::WayNode);
    acc.flush(EntityKind::RelationMember);

    assert_eq!(sink.executions("way_nodes"), vec![3]);
    assert_eq!(sink.executions("relation_members"), vec![2]);
}

#[rstest]
fn finish_drains_in_referential_order(sink: RecordingSink) {
    let mut acc = accumulator(&sink, Thresholds::default(), CounterReset::Global);
    acc.add_relation(relation(5, alice(), &[(1, ElementKind::Node, "")]));
    acc.add_way(way(4, alice(), &[1]));
    acc.add_node(node(1, alice()));

    let report = acc.finish(Instant::now()).expect("final commit");

    let prepared: Vec<&str> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SinkEvent::Prepare(table) => Some(table),
            _ => None,
        })
        .collect();
    assert_eq!(
        prepared,
        vec![
            "users",
            "nodes",
            "ways",
            "way_nodes",
            "relations",
            "relation_members"
        ]
    );
    assert_eq!(sink.events().last(), Some(&SinkEvent::Close));
    assert_eq!(sink.committed_count("relation_members"), 1);
    assert_eq!(report.written(EntityKind::User), 1);
    assert!(report.is_complete());
}

#[rstest]
fn finish_reports_failed_final_commit(sink: RecordingSink) {
    let mut acc = accumulator(&sink, Thresholds::default(), CounterReset::Global);
    acc.add_node(node(1, alice()));
    acc.flush(EntityKind::User);
    acc.flush(EntityKind::Node);
    sink.fail_commit(true);

    let error = acc.finish(Instant::now()).expect_err("commit fails");

    assert!(matches!(error, SessionError::Connection { .. }));
    assert_eq!(sink.committed_count("users"), 1);
    assert_eq!(sink.committed_count("nodes"), 0);
}

#[rstest]
fn finish_counts_buffers_that_never_flushed(sink: RecordingSink) {
    let mut acc = accumulator(&sink, Thresholds::default(), CounterReset::Global);
    acc.add_node(node(1, alice()));
    sink.fail_execute("nodes");

    let report = acc.finish(Instant::now()).expect("final commit");

    assert_eq!(report.failed_flushes(EntityKind::Node), 1);
    assert!(!report.is_complete());
    assert_eq!(sink.committed_count("users"), 1);
}

#[rstest]
fn thresholds_derive_member_commit() {
    let thresholds = Thresholds::new(10, 1_000);
    assert_eq!(thresholds.commit_for(EntityKind::WayNode), 50);
    assert_eq!(thresholds.commit_for(EntityKind::Node), 1_000);
    let custom = thresholds.with_member_commit(7);
    assert_eq!(custom.commit_for(EntityKind::RelationMember), 7);
    assert_eq!(Thresholds::default().member_commit, 50_000);
}
