use super::*;

/// Everything a task knows about itself: identity, assigned partitions,
/// configuration and clock.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_name: String,
    partitions: Vec<StreamPartition>,
    config: Config,
    clock: Arc<dyn Clock>,
}

impl TaskContext {
    pub fn new(task_name: impl Into<String>, config: Config) -> Self {
        Self {
            task_name: task_name.into(),
            partitions: Vec::new(),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_partitions(mut self, partitions: Vec<StreamPartition>) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn partitions(&self) -> &[StreamPartition] {
        &self.partitions
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> EventTime {
        self.clock.now()
    }
}
