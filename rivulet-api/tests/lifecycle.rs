use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::bounded;
use rivulet_api::runner::ApplicationRunner;
use rivulet_api::{ApplicationStatus, InMemorySystem, LocalApplicationRunner, StreamApplication};
use rivulet_core::codec::KvSerde;
use rivulet_core::config::Config;
use rivulet_core::task::{MessageCollector, TaskCoordinator};

fn numbers(count: u32) -> InMemorySystem {
    let system = InMemorySystem::new();
    system.create_stream("numbers", 1);
    for n in 0..count {
        system.send("numbers", n, n, None).unwrap();
    }
    system
}

/// `numbers` doubled into `doubled`.
fn doubler() -> StreamApplication {
    let app = StreamApplication::new("doubler");
    let out = app
        .open_output::<u32>("doubled", KvSerde::bincode::<u32, u32>())
        .unwrap();
    app.open_input::<u32>("numbers", KvSerde::bincode::<u32, u32>())
        .unwrap()
        .map(|n: &u32| n * 2)
        .send_to(&out);
    app
}

#[test]
fn test_status_follows_successful_run() {
    let system = numbers(5);
    let runner = LocalApplicationRunner::new(Config::new(), system.clone());
    assert_eq!(runner.status(), ApplicationStatus::New);

    let summary = runner.run(&doubler()).unwrap();
    assert_eq!(summary.processed, 5);
    assert!(!summary.killed);
    assert_eq!(runner.status(), ApplicationStatus::SuccessfulFinish);
    assert_eq!(
        runner.wait_for_finish(Some(Duration::from_millis(10))),
        ApplicationStatus::SuccessfulFinish
    );
    assert_eq!(system.read_all::<u32, u32>("doubled").unwrap().len(), 5);
}

#[test]
fn test_failed_run_reports_error() {
    let system = numbers(3);
    let app = StreamApplication::new("picky");
    let out = app
        .open_output::<u32>("accepted", KvSerde::bincode::<u32, u32>())
        .unwrap();
    app.open_input::<u32>("numbers", KvSerde::bincode::<u32, u32>())
        .unwrap()
        .try_map(|n: &u32| -> Result<u32> {
            if *n == 2 {
                anyhow::bail!("rejected record {n}");
            }
            Ok(*n)
        })
        .send_to(&out);

    let runner = LocalApplicationRunner::new(Config::new(), system);
    assert!(runner.run(&app).is_err());
    match runner.status() {
        ApplicationStatus::UnsuccessfulFinish(error) => {
            assert!(error.contains("rejected record 2"), "{error}");
        }
        status => panic!("unexpected status {status:?}"),
    }
}

#[test]
fn test_kill_outside_a_run_is_ignored() {
    let runner = LocalApplicationRunner::new(Config::new(), numbers(4));
    runner.kill();
    assert_eq!(runner.status(), ApplicationStatus::New);

    let summary = runner.run(&doubler()).unwrap();
    assert_eq!(summary.processed, 4);
    assert!(!summary.killed);
}

#[test]
fn test_kill_from_sink_stops_the_run() {
    let system = numbers(10);
    let runner = Arc::new(LocalApplicationRunner::new(Config::new(), system));

    let app = StreamApplication::new("stopper");
    let handle = Arc::clone(&runner);
    app.open_input::<u32>("numbers", KvSerde::bincode::<u32, u32>())
        .unwrap()
        .sink(
            move |n: &u32, _: &mut dyn MessageCollector, _: &mut dyn TaskCoordinator| -> Result<()> {
                if *n == 2 {
                    handle.kill();
                }
                Ok(())
            },
        );

    let summary = runner.run(&app).unwrap();
    assert!(summary.killed);
    assert_eq!(summary.processed, 3);
    assert_eq!(runner.status(), ApplicationStatus::SuccessfulFinish);
}

#[test]
fn test_kill_from_another_thread() {
    let system = numbers(10);
    let runner = Arc::new(LocalApplicationRunner::new(Config::new(), system));
    let (started_tx, started) = bounded::<()>(1);
    let (release, released) = bounded::<()>(1);

    let run = {
        let runner = Arc::clone(&runner);
        thread::spawn(move || {
            let app = StreamApplication::new("slow");
            app.open_input::<u32>("numbers", KvSerde::bincode::<u32, u32>())
                .unwrap()
                .sink(
                    move |_: &u32, _: &mut dyn MessageCollector, _: &mut dyn TaskCoordinator| -> Result<()> {
                        let _ = started_tx.try_send(());
                        let _ = released.recv_timeout(Duration::from_secs(5));
                        Ok(())
                    },
                );
            runner.run(&app)
        })
    };

    started.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(runner.status(), ApplicationStatus::Running);
    assert_eq!(
        runner.wait_for_finish(Some(Duration::from_millis(10))),
        ApplicationStatus::Running
    );

    runner.kill();
    release.send(()).unwrap();
    assert_eq!(
        runner.wait_for_finish(Some(Duration::from_secs(5))),
        ApplicationStatus::SuccessfulFinish
    );

    let summary = run.join().unwrap().unwrap();
    assert!(summary.killed);
    assert_eq!(summary.processed, 1);
}
