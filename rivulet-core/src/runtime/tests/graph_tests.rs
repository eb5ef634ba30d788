use std::sync::Mutex;

use super::*;
use crate::config::stream_partitions_key;
use crate::task::{BufferedCollector, CoordinatorRequests, RequestScope};
use crate::time::ManualClock;
use crate::types::StreamPartition;

type Trace = Arc<Mutex<Vec<String>>>;

fn recording_sink(trace: &Trace, label: &str) -> OperatorLogic {
    let trace = trace.clone();
    let label = label.to_string();
    let f: Arc<SinkFn> = Arc::new(move |_: &MessageEnvelope, _: &mut dyn MessageCollector, _: &mut dyn TaskCoordinator| {
        trace.lock().unwrap().push(label.clone());
        Ok(())
    });
    OperatorLogic::Sink(UserFn::shared(f))
}

fn upper_map() -> OperatorLogic {
    let f: Arc<MapFn> = Arc::new(|envelope: &MessageEnvelope| {
        let text = envelope.message().downcast_ref::<String>().cloned().unwrap_or_default();
        Ok(envelope.with_message(Value::new(text.to_uppercase())))
    });
    OperatorLogic::Map(UserFn::shared(f))
}

fn context(config: Config) -> (TaskContext, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let ctx = TaskContext::new("task-0", config).with_clock(clock.clone());
    (ctx, clock)
}

fn incoming(stream: &str, key: &str, message: &str) -> IncomingMessageEnvelope {
    IncomingMessageEnvelope::new(
        StreamPartition::new(stream, 0),
        "0",
        Value::new(key.to_string()),
        Value::new(message.to_string()),
    )
}

fn run(graph: &mut OperatorImplGraph, envelope: IncomingMessageEnvelope) -> BufferedCollector {
    let mut collector = BufferedCollector::new();
    let mut coordinator = CoordinatorRequests::new();
    graph
        .on_message(envelope, &mut collector, &mut coordinator)
        .unwrap();
    collector
}

#[test]
fn test_propagation_is_depth_first_in_registration_order() {
    let trace: Trace = Arc::default();
    let mut g = OperatorSpecGraph::new();
    let input = g.add_input("in", None).unwrap();
    let first = g.add_operator(upper_map()).unwrap();
    let x = g.add_operator(recording_sink(&trace, "X")).unwrap();
    let second = g.add_operator(upper_map()).unwrap();
    let y = g.add_operator(recording_sink(&trace, "Y")).unwrap();
    let z = g.add_operator(recording_sink(&trace, "Z")).unwrap();
    g.connect(input, first).unwrap();
    g.connect(input, z).unwrap();
    g.connect(first, x).unwrap();
    g.connect(first, second).unwrap();
    g.connect(second, y).unwrap();

    let (ctx, _) = context(Config::new());
    let mut graph = OperatorImplGraph::compile(g, &ctx).unwrap();
    run(&mut graph, incoming("in", "k", "hello"));

    assert_eq!(*trace.lock().unwrap(), vec!["X", "Y", "Z"]);
}

#[test]
fn test_diamond_instantiates_shared_operator_once() {
    let trace: Trace = Arc::default();
    let mut g = OperatorSpecGraph::new();
    let input = g.add_input("in", None).unwrap();
    let left = g.add_operator(upper_map()).unwrap();
    let right = g.add_operator(upper_map()).unwrap();
    let merge = g.add_operator(OperatorLogic::Merge).unwrap();
    let sink = g.add_operator(recording_sink(&trace, "S")).unwrap();
    g.connect(input, left).unwrap();
    g.connect(input, right).unwrap();
    g.connect(left, merge).unwrap();
    g.connect(right, merge).unwrap();
    g.connect(merge, sink).unwrap();

    let (ctx, _) = context(Config::new());
    let mut graph = OperatorImplGraph::compile(g, &ctx).unwrap();
    assert_eq!(graph.len(), 5);
    assert_eq!(graph.operator(merge).unwrap().fan_out(), 1);

    run(&mut graph, incoming("in", "k", "v"));
    // one delivery per path into the shared merge
    assert_eq!(trace.lock().unwrap().len(), 2);
}

#[test]
fn test_unknown_stream_is_not_handled() {
    let mut g = OperatorSpecGraph::new();
    g.add_input("in", None).unwrap();
    let (ctx, _) = context(Config::new());
    let mut graph = OperatorImplGraph::compile(g, &ctx).unwrap();

    let mut collector = BufferedCollector::new();
    let mut coordinator = CoordinatorRequests::new();
    let handled = graph
        .on_message(incoming("other", "k", "v"), &mut collector, &mut coordinator)
        .unwrap();
    assert!(!handled);
    assert!(collector.is_empty());
}

#[test]
fn test_map_filter_flat_map_send_to() {
    let mut g = OperatorSpecGraph::new();
    let input = g.add_input("in", None).unwrap();
    g.add_output("out", None).unwrap();
    let split: Arc<FlatMapFn> = Arc::new(|envelope: &MessageEnvelope| {
        let text = envelope.message().downcast_ref::<String>().cloned().unwrap_or_default();
        Ok(text
            .split(' ')
            .map(|word| envelope.with_message(Value::new(word.to_string())))
            .collect())
    });
    let non_empty: Arc<FilterFn> = Arc::new(|envelope: &MessageEnvelope| {
        Ok(envelope.message().downcast_ref::<String>().is_some_and(|w| !w.is_empty()))
    });
    let flat_map = g.add_operator(OperatorLogic::FlatMap(UserFn::shared(split))).unwrap();
    let filter = g.add_operator(OperatorLogic::Filter(UserFn::shared(non_empty))).unwrap();
    let map = g.add_operator(upper_map()).unwrap();
    let send = g
        .add_operator(OperatorLogic::SendTo {
            stream: StreamId::new("out"),
        })
        .unwrap();
    g.connect(input, flat_map).unwrap();
    g.connect(flat_map, filter).unwrap();
    g.connect(filter, map).unwrap();
    g.connect(map, send).unwrap();

    let (ctx, _) = context(Config::new());
    let mut graph = OperatorImplGraph::compile(g, &ctx).unwrap();
    let collector = run(&mut graph, incoming("in", "k", "a  b"));

    let words: Vec<String> = collector
        .sent()
        .iter()
        .map(|out| out.message.downcast_ref::<String>().cloned().unwrap())
        .collect();
    assert_eq!(words, vec!["A", "B"]);
    assert!(collector.sent().iter().all(|out| out.stream.as_str() == "out"));
    assert!(collector.sent().iter().all(|out| out.partition.is_none()));
}

#[test]
fn test_partition_by_rekeys_and_assigns_partition() {
    let mut g = OperatorSpecGraph::new();
    let input = g.add_input("in", None).unwrap();
    g.add_intermediate("by-user", None).unwrap();
    let key_fn: Arc<KeyFn> = Arc::new(|envelope: &MessageEnvelope| {
        let text = envelope.message().downcast_ref::<String>().cloned().unwrap_or_default();
        GroupKey::of(text)
    });
    let partition_by = g
        .add_operator(OperatorLogic::PartitionBy {
            key_fn: UserFn::shared(key_fn),
            stream: StreamId::new("by-user"),
        })
        .unwrap();
    let output = g
        .add_operator(OperatorLogic::Output {
            stream: StreamId::new("by-user"),
        })
        .unwrap();
    g.connect(input, partition_by).unwrap();
    g.connect(partition_by, output).unwrap();

    let config = Config::new().with(stream_partitions_key(&StreamId::new("by-user")), 4);
    let (ctx, _) = context(config);
    let mut graph = OperatorImplGraph::compile(g, &ctx).unwrap();
    let collector = run(&mut graph, incoming("in", "old-key", "alice"));

    let sent = &collector.sent()[0];
    let expected = HashPartitioner.partition(&GroupKey::of("alice".to_string()).unwrap(), 4);
    assert_eq!(sent.stream.as_str(), "by-user");
    assert_eq!(sent.partition, Some(expected));
    assert_eq!(sent.key.downcast_ref::<String>().unwrap(), "alice");
}

#[test]
fn test_user_error_names_operator() {
    let mut g = OperatorSpecGraph::new();
    let input = g.add_input("in", None).unwrap();
    let failing: Arc<MapFn> = Arc::new(|_: &MessageEnvelope| Err(anyhow::anyhow!("boom")));
    let map = g.add_operator(OperatorLogic::Map(UserFn::shared(failing))).unwrap();
    g.connect(input, map).unwrap();

    let (ctx, _) = context(Config::new());
    let mut graph = OperatorImplGraph::compile(g, &ctx).unwrap();
    let mut collector = BufferedCollector::new();
    let mut coordinator = CoordinatorRequests::new();
    let err = graph
        .on_message(incoming("in", "k", "v"), &mut collector, &mut coordinator)
        .unwrap_err();
    assert_eq!(err.to_string(), "operator map-1 failed");
    assert!(format!("{err:#}").contains("boom"));
}

#[test]
fn test_sink_reaches_coordinator() {
    let mut g = OperatorSpecGraph::new();
    let input = g.add_input("in", None).unwrap();
    let f: Arc<SinkFn> = Arc::new(
        |_: &MessageEnvelope, _: &mut dyn MessageCollector, coordinator: &mut dyn TaskCoordinator| {
            coordinator.commit(RequestScope::CurrentTask);
            coordinator.shutdown(RequestScope::AllTasksInContainer);
            Ok(())
        },
    );
    let sink = g.add_operator(OperatorLogic::Sink(UserFn::shared(f))).unwrap();
    g.connect(input, sink).unwrap();

    let (ctx, _) = context(Config::new());
    let mut graph = OperatorImplGraph::compile(g, &ctx).unwrap();
    let mut collector = BufferedCollector::new();
    let mut coordinator = CoordinatorRequests::new();
    graph
        .on_message(incoming("in", "k", "v"), &mut collector, &mut coordinator)
        .unwrap();
    assert_eq!(coordinator.commit, Some(RequestScope::CurrentTask));
    assert_eq!(coordinator.shutdown, Some(RequestScope::AllTasksInContainer));
}

#[test]
fn test_invalid_graph_does_not_compile() {
    let mut g = OperatorSpecGraph::new();
    g.add_input("in", None).unwrap();
    g.add_operator(upper_map()).unwrap(); // never connected

    let (ctx, _) = context(Config::new());
    let err = OperatorImplGraph::compile(g, &ctx).unwrap_err();
    assert!(matches!(err, GraphError::Unreachable(name) if name == "map-1"));
}

#[test]
fn test_topo_order_diamond() {
    let trace: Trace = Arc::default();
    let mut g = OperatorSpecGraph::new();
    let input = g.add_input("in", None).unwrap();
    let a = g.add_operator(upper_map()).unwrap();
    let b = g.add_operator(upper_map()).unwrap();
    let merge = g.add_operator(OperatorLogic::Merge).unwrap();
    let sink = g.add_operator(recording_sink(&trace, "S")).unwrap();
    g.connect(input, a).unwrap();
    g.connect(input, b).unwrap();
    g.connect(a, merge).unwrap();
    g.connect(b, merge).unwrap();
    g.connect(merge, sink).unwrap();

    let (ctx, _) = context(Config::new());
    let graph = OperatorImplGraph::compile(g, &ctx).unwrap();
    let order = topo_order(&graph.operators);
    let position = |id: OpId| {
        let idx = graph.index[&id];
        order.iter().position(|&i| i == idx).unwrap()
    };
    assert_eq!(order.len(), 5);
    assert!(position(input) < position(a));
    assert!(position(b) < position(merge));
    assert!(position(a) < position(merge));
    assert!(position(merge) < position(sink));
}
