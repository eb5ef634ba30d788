use super::*;

/// Name of the built-in factory producing [`StreamOperatorTask`]s.
pub const DEFAULT_TASK_CLASS: &str = "stream-operator";

/// Builds one task for an application graph.
pub type TaskFactory =
    Arc<dyn Fn(&OperatorSpecGraph, &Config) -> Result<Box<dyn StreamTask>> + Send + Sync>;

/// Task factories resolved by the `task.class` config value.
#[derive(Clone)]
pub struct TaskFactoryRegistry {
    factories: IndexMap<String, TaskFactory>,
}

impl TaskFactoryRegistry {
    /// An empty registry. [`Default`] comes with `stream-operator` registered.
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    pub fn with_factory(mut self, name: impl Into<String>, factory: TaskFactory) -> Self {
        self.register(name, factory);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, factory: TaskFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Factory named by `task.class`, or `stream-operator` when unset.
    pub fn resolve(&self, config: &Config) -> Result<&TaskFactory, ConfigError> {
        let name = config.get_or(TASK_CLASS, DEFAULT_TASK_CLASS);
        self.factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownFactory {
                kind: "task factory",
                name: name.to_string(),
            })
    }

    /// Build a task for `specs` with the configured factory.
    pub fn create(&self, specs: &OperatorSpecGraph, config: &Config) -> Result<Box<dyn StreamTask>> {
        let factory = self.resolve(config)?;
        factory(specs, config)
    }
}

impl Default for TaskFactoryRegistry {
    fn default() -> Self {
        let stream_operator: TaskFactory = Arc::new(|specs: &OperatorSpecGraph, _: &Config| {
            let task: Box<dyn StreamTask> = Box::new(StreamOperatorTask::new(specs.try_clone()?));
            Ok(task)
        });
        Self::empty().with_factory(DEFAULT_TASK_CLASS, stream_operator)
    }
}

impl fmt::Debug for TaskFactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
