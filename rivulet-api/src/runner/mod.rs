//! Running applications.
//!
//! An [`ApplicationRunner`] takes a built [`StreamApplication`] and drives one task per
//! partition until its inputs are exhausted or the run is killed. Runners are looked
//! up by the `app.runner.class` config value through a [`RunnerRegistry`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, Sender, unbounded};
use indexmap::IndexMap;
use rivulet_core::codec::KvSerde;
use rivulet_core::config::{APP_RUNNER_CLASS, Config, JOB_PARTITIONS, TASK_WINDOW_MS};
use rivulet_core::error::ConfigError;
use rivulet_core::partitioner::{HashPartitioner, Partitioner};
use rivulet_core::spec::OperatorSpecGraph;
use rivulet_core::task::{
    BufferedCollector, CoordinatorRequests, StreamTask, TaskContext, TaskFactoryRegistry,
};
use rivulet_core::time::{Clock, SystemClock};
use rivulet_core::types::{
    EventTime, IncomingMessageEnvelope, OutgoingMessageEnvelope, StreamData, StreamId,
    StreamPartition,
};

use crate::application::StreamApplication;

mod local;
mod system;

pub use local::*;
pub use system::*;

/// Name of the built-in [`LocalApplicationRunner`].
pub const DEFAULT_RUNNER_CLASS: &str = "local";

/// Where an application stands under its runner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ApplicationStatus {
    /// Not started yet.
    #[default]
    New,
    Running,
    /// Inputs drained, shutdown requested, or killed.
    SuccessfulFinish,
    /// The run failed; holds the error chain.
    UnsuccessfulFinish(String),
}

impl ApplicationStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::SuccessfulFinish | Self::UnsuccessfulFinish(_))
    }
}

/// Executes a stream application.
///
/// `run` blocks the calling thread. `kill`, `status` and `wait_for_finish` never
/// wait on the run and may be called from any thread.
pub trait ApplicationRunner: Send + Sync {
    /// Run `app` until its inputs are exhausted, a task requests shutdown, or
    /// [`kill`](Self::kill) is called. Fails if a run is already in progress.
    fn run(&self, app: &StreamApplication) -> Result<RunSummary>;

    /// Stop the current run once the messages in flight are processed.
    /// Open panes are not flushed. Ignored when nothing is running.
    fn kill(&self);

    fn status(&self) -> ApplicationStatus;

    /// Block while the application is running, at most `timeout` if given.
    /// Returns the status seen last.
    fn wait_for_finish(&self, timeout: Option<Duration>) -> ApplicationStatus;
}

/// Counters reported by a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages handed to tasks.
    pub processed: u64,
    /// Messages written to output and intermediate streams.
    pub emitted: u64,
    /// Commit requests raised by tasks.
    pub commits: u64,
    /// Periodic `window` calls across all tasks.
    pub ticks: u64,
    pub shutdown_requested: bool,
    /// The run stopped because of [`ApplicationRunner::kill`].
    pub killed: bool,
}

/// Builds a runner from the job config.
pub type RunnerFactory =
    Arc<dyn Fn(&Config) -> Result<Box<dyn ApplicationRunner>> + Send + Sync>;

/// Runner factories resolved by `app.runner.class`.
#[derive(Clone)]
pub struct RunnerRegistry {
    runners: IndexMap<String, RunnerFactory>,
}

impl RunnerRegistry {
    pub fn empty() -> Self {
        Self {
            runners: IndexMap::new(),
        }
    }

    /// Registry with a `local` runner reading and writing `system`.
    pub fn local(system: InMemorySystem) -> Self {
        let local: RunnerFactory = Arc::new(move |config: &Config| {
            let runner: Box<dyn ApplicationRunner> =
                Box::new(LocalApplicationRunner::new(config.clone(), system.clone()));
            Ok(runner)
        });
        Self::empty().with_runner(DEFAULT_RUNNER_CLASS, local)
    }

    pub fn with_runner(mut self, name: impl Into<String>, factory: RunnerFactory) -> Self {
        self.register(name, factory);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, factory: RunnerFactory) {
        self.runners.insert(name.into(), factory);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.runners.keys().map(String::as_str)
    }

    pub fn resolve(&self, config: &Config) -> Result<&RunnerFactory, ConfigError> {
        let name = config.get_or(APP_RUNNER_CLASS, DEFAULT_RUNNER_CLASS);
        self.runners
            .get(name)
            .ok_or_else(|| ConfigError::UnknownFactory {
                kind: "application runner",
                name: name.to_string(),
            })
    }

    /// Instantiate the runner named by `app.runner.class`, `local` when unset.
    pub fn create(&self, config: &Config) -> Result<Box<dyn ApplicationRunner>> {
        let factory = self.resolve(config)?;
        factory(config)
    }
}

impl fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.runners.keys()).finish()
    }
}
