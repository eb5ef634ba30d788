use super::*;

/// Lifecycle of one task, driven by exactly one thread.
pub trait StreamTask: Send {
    /// Prepare for processing. Called once before any message.
    fn init(&mut self, context: &TaskContext) -> Result<()>;

    fn process(
        &mut self,
        envelope: IncomingMessageEnvelope,
        collector: &mut dyn MessageCollector,
        coordinator: &mut dyn TaskCoordinator,
    ) -> Result<()>;

    /// Periodic timer call.
    fn window(
        &mut self,
        collector: &mut dyn MessageCollector,
        coordinator: &mut dyn TaskCoordinator,
    ) -> Result<()>;

    /// End of a bounded input: emit whatever is still buffered.
    fn flush(
        &mut self,
        _collector: &mut dyn MessageCollector,
        _coordinator: &mut dyn TaskCoordinator,
    ) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Task running a compiled operator graph.
///
/// Holds its own copy of the application's spec graph until `init` compiles it.
pub struct StreamOperatorTask {
    specs: Option<OperatorSpecGraph>,
    graph: Option<OperatorImplGraph>,
    task_name: String,
}

impl StreamOperatorTask {
    pub fn new(specs: OperatorSpecGraph) -> Self {
        Self {
            specs: Some(specs),
            graph: None,
            task_name: String::new(),
        }
    }

    pub fn graph(&self) -> Option<&OperatorImplGraph> {
        self.graph.as_ref()
    }

    fn graph_mut(&mut self) -> Result<&mut OperatorImplGraph> {
        self.graph
            .as_mut()
            .ok_or_else(|| anyhow!("task {} is not initialised", self.task_name))
    }
}

impl fmt::Debug for StreamOperatorTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOperatorTask")
            .field("task_name", &self.task_name)
            .field("initialised", &self.graph.is_some())
            .finish()
    }
}

impl StreamTask for StreamOperatorTask {
    fn init(&mut self, context: &TaskContext) -> Result<()> {
        let specs = self
            .specs
            .take()
            .ok_or_else(|| GraphError::AlreadyInitialized(context.task_name().to_string()))?;
        self.task_name = context.task_name().to_string();
        let graph = OperatorImplGraph::compile(specs, context)
            .with_context(|| format!("compiling operator graph for {}", self.task_name))?;
        tracing::info!(
            "task {} initialised with {} operators over {} partitions",
            self.task_name,
            graph.len(),
            context.partitions().len()
        );
        self.graph = Some(graph);
        Ok(())
    }

    fn process(
        &mut self,
        envelope: IncomingMessageEnvelope,
        collector: &mut dyn MessageCollector,
        coordinator: &mut dyn TaskCoordinator,
    ) -> Result<()> {
        let stream = envelope.stream_partition.clone();
        let handled = self
            .graph_mut()?
            .on_message(envelope, collector, coordinator)?;
        if !handled {
            tracing::debug!(
                "task {} has no input operator for {}, message dropped",
                self.task_name,
                stream
            );
        }
        Ok(())
    }

    fn window(
        &mut self,
        collector: &mut dyn MessageCollector,
        coordinator: &mut dyn TaskCoordinator,
    ) -> Result<()> {
        self.graph_mut()?.on_timer(collector, coordinator)
    }

    fn flush(
        &mut self,
        collector: &mut dyn MessageCollector,
        coordinator: &mut dyn TaskCoordinator,
    ) -> Result<()> {
        self.graph_mut()?.flush(collector, coordinator)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(graph) = self.graph.take() {
            tracing::info!(
                "task {} closed, {} late messages dropped",
                self.task_name,
                graph.late_messages()
            );
        }
        Ok(())
    }
}
