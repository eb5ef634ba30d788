use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rivulet_api::runner::ApplicationRunner;
use rivulet_api::{InMemorySystem, LocalApplicationRunner, StreamApplication, Windows};
use rivulet_core::codec::KvSerde;
use rivulet_core::config::{Config, JOB_PARTITIONS};
use rivulet_core::spec::WindowPane;
use rivulet_core::time::ManualClock;
use rivulet_core::types::StreamId;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct PageView {
    member: String,
    page: String,
}

#[test]
fn test_partition_by_brings_each_member_to_one_task() {
    let system = InMemorySystem::new();
    system.create_stream("page-views", 2);
    let mut expected = BTreeMap::new();
    for m in 0..5u64 {
        let member = format!("member-{m}");
        for v in 0..=m {
            let page = format!("/page/{v}");
            let view = PageView {
                member: member.clone(),
                page: page.clone(),
            };
            // keyed by page, so one member's views land on both partitions
            system.send("page-views", page, view, Some(0)).unwrap();
        }
        expected.insert(member, m + 1);
    }

    let app = StreamApplication::new("views-per-member");
    let views = app
        .open_input::<PageView>("page-views", KvSerde::bincode::<String, PageView>())
        .unwrap();
    let counts = app
        .open_output::<WindowPane<String, u64>>(
            "member-counts",
            KvSerde::bincode::<String, WindowPane<String, u64>>(),
        )
        .unwrap();
    views
        .partition_by(|view: &PageView| view.member.clone())
        .window(Windows::keyed_tumbling(
            |view: &PageView| view.member.clone(),
            Duration::from_secs(60),
            || 0u64,
            |_: &PageView, count: u64| count + 1,
        ))
        .send_to(&counts);

    let config = Config::new().with(JOB_PARTITIONS, 2);
    let summary = LocalApplicationRunner::new(config, system.clone())
        .with_clock(Arc::new(ManualClock::new(0)))
        .run(&app)
        .unwrap();

    // 15 input views, then the same 15 again from the intermediate stream
    assert_eq!(summary.processed, 30);
    assert_eq!(summary.emitted, 15 + 5);
    let intermediate = StreamId::new("views-per-member-partition_by-1");
    assert_eq!(system.partition_count(&intermediate), Some(2));

    let counted: BTreeMap<String, u64> = system
        .read_all::<String, WindowPane<String, u64>>("member-counts")
        .unwrap()
        .into_iter()
        .map(|(member, pane)| (member, *pane.value()))
        .collect();
    assert_eq!(counted, expected);
}

#[test]
fn test_filter_and_map_before_output() {
    let system = InMemorySystem::new();
    system.create_stream("words", 1);
    for word in ["apple", "kiwi", "banana", "fig"] {
        system
            .send("words", word.to_string(), word.to_string(), None)
            .unwrap();
    }

    let app = StreamApplication::new("long-words");
    let words = app
        .open_input::<String>("words", KvSerde::bincode::<String, String>())
        .unwrap();
    let out = app
        .open_output::<usize>("lengths", KvSerde::bincode::<String, usize>())
        .unwrap();
    words
        .filter(|w: &String| w.len() > 3)
        .map(|w: &String| w.len())
        .send_to(&out);

    LocalApplicationRunner::new(Config::new(), system.clone())
        .run(&app)
        .unwrap();

    let lengths: Vec<(String, usize)> = system.read_all("lengths").unwrap();
    assert_eq!(
        lengths,
        vec![
            ("apple".to_string(), 5),
            ("kiwi".to_string(), 4),
            ("banana".to_string(), 6),
        ]
    );
}
