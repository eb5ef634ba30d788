use super::*;
use crate::spec::PartialJoinSpec;
use crate::task::{BufferedCollector, CoordinatorRequests};
use crate::types::StreamPartition;

fn key_by_key() -> Arc<KeyFn> {
    Arc::new(|envelope: &MessageEnvelope| {
        GroupKey::of(envelope.key().downcast_ref::<String>().cloned().unwrap_or_default())
    })
}

fn concat() -> Arc<JoinFn> {
    Arc::new(|left: &MessageEnvelope, right: &MessageEnvelope| {
        let l = left.message().downcast_ref::<String>().cloned().unwrap_or_default();
        let r = right.message().downcast_ref::<String>().cloned().unwrap_or_default();
        Ok(left.with_message(Value::new(format!("{l}+{r}"))))
    })
}

fn sides() -> (PartialJoin, PartialJoin) {
    (
        PartialJoin::new(0, JoinSide::Left, key_by_key(), concat()),
        PartialJoin::new(0, JoinSide::Right, key_by_key(), concat()),
    )
}

fn msg(key: &str, message: &str) -> MessageEnvelope {
    MessageEnvelope::of(key.to_string(), message.to_string())
}

fn text(envelope: &MessageEnvelope) -> &str {
    envelope.message().downcast_ref::<String>().unwrap()
}

#[test]
fn test_match_within_ttl_joins_left_then_right() {
    let (left, right) = sides();
    let mut state = JoinState::new(0, Duration::from_secs(10));
    let mut out = Vec::new();

    right
        .on_message("join-2", msg("k", "r1"), 0, &mut state, &mut out)
        .unwrap();
    assert!(out.is_empty());
    left.on_message("join-1", msg("k", "l1"), 5_000, &mut state, &mut out)
        .unwrap();

    assert_eq!(out.len(), 1);
    // argument order is always (left, right)
    assert_eq!(text(&out[0]), "l1+r1");
}

#[test]
fn test_expired_entry_does_not_match() {
    let (left, right) = sides();
    let mut state = JoinState::new(0, Duration::from_secs(1));
    let mut out = Vec::new();

    left.on_message("join-1", msg("k", "l1"), 0, &mut state, &mut out)
        .unwrap();
    right
        .on_message("join-2", msg("k", "r1"), 1_000, &mut state, &mut out)
        .unwrap();
    assert!(out.is_empty());

    // the right entry is fresh, so a new left matches it
    left.on_message("join-1", msg("k", "l2"), 1_500, &mut state, &mut out)
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(text(&out[0]), "l2+r1");
}

#[test]
fn test_latest_message_per_key_wins() {
    let (left, right) = sides();
    let mut state = JoinState::new(0, Duration::from_secs(60));
    let mut out = Vec::new();

    left.on_message("join-1", msg("k", "old"), 0, &mut state, &mut out)
        .unwrap();
    left.on_message("join-1", msg("k", "new"), 10, &mut state, &mut out)
        .unwrap();
    right
        .on_message("join-2", msg("k", "r"), 20, &mut state, &mut out)
        .unwrap();
    right
        .on_message("join-2", msg("other", "x"), 20, &mut state, &mut out)
        .unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(text(&out[0]), "new+r");
    assert_eq!(state.len(), 3);
}

#[test]
fn test_expire_sweeps_both_sides() {
    let (left, right) = sides();
    let mut state = JoinState::new(0, Duration::from_millis(100));
    let mut out = Vec::new();
    left.on_message("join-1", msg("a", "l"), 0, &mut state, &mut out)
        .unwrap();
    right
        .on_message("join-2", msg("b", "r"), 50, &mut state, &mut out)
        .unwrap();

    state.expire(100);
    assert_eq!(state.len(), 1);
    state.expire(150);
    assert_eq!(state.len(), 0);
}

#[test]
fn test_join_through_compiled_graph() {
    let mut g = OperatorSpecGraph::new();
    let orders = g.add_input("orders", None).unwrap();
    let payments = g.add_input("payments", None).unwrap();
    g.add_output("paid-orders", None).unwrap();
    let join_id = g.next_join_id();
    let spec = |side| {
        OperatorLogic::Join(PartialJoinSpec::new(
            join_id,
            side,
            UserFn::shared(key_by_key()),
            UserFn::shared(concat()),
            Duration::from_secs(60),
        ))
    };
    let left = g.add_operator(spec(JoinSide::Left)).unwrap();
    let right = g.add_operator(spec(JoinSide::Right)).unwrap();
    let merge = g.add_operator(OperatorLogic::Merge).unwrap();
    let send = g
        .add_operator(OperatorLogic::SendTo {
            stream: StreamId::new("paid-orders"),
        })
        .unwrap();
    g.connect(orders, left).unwrap();
    g.connect(payments, right).unwrap();
    g.connect(left, merge).unwrap();
    g.connect(right, merge).unwrap();
    g.connect(merge, send).unwrap();

    let ctx = TaskContext::new("task-0", Config::new())
        .with_clock(Arc::new(crate::time::ManualClock::new(0)));
    let mut graph = OperatorImplGraph::compile(g, &ctx).unwrap();
    let mut collector = BufferedCollector::new();
    let mut coordinator = CoordinatorRequests::new();

    let incoming = |stream: &str, key: &str, message: &str| {
        IncomingMessageEnvelope::new(
            StreamPartition::new(stream, 0),
            "0",
            Value::new(key.to_string()),
            Value::new(message.to_string()),
        )
    };
    graph
        .on_message(incoming("orders", "o-1", "book"), &mut collector, &mut coordinator)
        .unwrap();
    graph
        .on_message(incoming("payments", "o-2", "$5"), &mut collector, &mut coordinator)
        .unwrap();
    graph
        .on_message(incoming("payments", "o-1", "$12"), &mut collector, &mut coordinator)
        .unwrap();

    assert_eq!(collector.len(), 1);
    let out = &collector.sent()[0];
    assert_eq!(out.stream.as_str(), "paid-orders");
    assert_eq!(out.message.downcast_ref::<String>().unwrap(), "book+$12");
    assert_eq!(graph.buffered_join_entries(), 3);
}
