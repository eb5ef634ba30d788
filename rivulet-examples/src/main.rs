use std::time::Duration;

use rivulet_api::runner::ApplicationRunner;
use rivulet_api::{InMemorySystem, LocalApplicationRunner, StreamApplication, Windows};
use rivulet_core::codec::KvSerde;
use rivulet_core::config::{Config, JOB_PARTITIONS};
use rivulet_core::spec::{Trigger, WindowPane};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct PageView {
    member: String,
    page: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let system = InMemorySystem::new();
    system.create_stream("page-views", 2);
    let pages = ["/home", "/jobs", "/feed"];
    for i in 0..30i64 {
        let view = PageView {
            member: format!("member-{}", i % 4),
            page: pages[i as usize % pages.len()].to_string(),
        };
        // three 10s windows worth of views
        system.send("page-views", view.member.clone(), view, Some(i * 1_000))?;
    }

    let app = StreamApplication::new("page-view-counter");
    let views = app.open_input::<PageView>("page-views", KvSerde::bincode::<String, PageView>())?;
    let counts = app.open_output::<WindowPane<String, u64>>(
        "page-view-counts",
        KvSerde::bincode::<String, WindowPane<String, u64>>(),
    )?;
    views
        .partition_by(|view: &PageView| view.page.clone())
        .window(
            Windows::keyed_tumbling(
                |view: &PageView| view.page.clone(),
                Duration::from_secs(10),
                || 0u64,
                |_: &PageView, count: u64| count + 1,
            )
            .early_trigger(Trigger::repeat(Trigger::count(2))),
        )
        .send_to(&counts);

    let config = Config::new().with(JOB_PARTITIONS, 2);
    let summary = LocalApplicationRunner::new(config, system.clone()).run(&app)?;
    tracing::info!("run finished: {:?}", summary);

    let mut out = system.read_all::<String, WindowPane<String, u64>>("page-view-counts")?;
    out.sort_by(|a, b| (&a.0, a.1.key().pane_id()).cmp(&(&b.0, b.1.key().pane_id())));
    for (page, pane) in out {
        println!(
            "page={} pane={} count={} firing={:?}",
            page,
            pane.key().pane_id().unwrap_or("-"),
            pane.value(),
            pane.firing()
        );
    }

    Ok(())
}
