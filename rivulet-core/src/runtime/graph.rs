use super::*;

/// Executable operator graph owned by one task.
pub struct OperatorImplGraph {
    task_name: String,
    operators: Vec<OperatorImpl>,
    index: HashMap<OpId, usize>,
    inputs: IndexMap<StreamId, usize>,
    joins: Vec<JoinState>,
    /// Window operators, upstream before downstream.
    timer_order: Vec<usize>,
    clock: Arc<dyn Clock>,
}

impl OperatorImplGraph {
    /// Compile a task's own copy of the spec graph.
    ///
    /// Operators are instantiated depth-first from each input; an operator shared by
    /// several paths is instantiated once.
    pub fn compile(specs: OperatorSpecGraph, context: &TaskContext) -> Result<Self, GraphError> {
        specs.validate()?;
        let (pending, input_specs) = specs.into_parts();
        let mut compiler = Compiler {
            context,
            pending,
            operators: Vec::new(),
            index: HashMap::new(),
            joins: Vec::new(),
            join_index: HashMap::new(),
        };
        let mut inputs = IndexMap::new();
        for input in input_specs.values() {
            let root = compiler.visit(input.op_id)?;
            inputs.insert(input.stream.clone(), root);
        }
        let Compiler {
            operators,
            index,
            joins,
            ..
        } = compiler;

        let timer_order = topo_order(&operators)
            .into_iter()
            .filter(|&idx| operators[idx].has_timer())
            .collect();
        tracing::info!(
            "compiled {} operators ({} joins) for {}",
            operators.len(),
            joins.len(),
            context.task_name()
        );
        Ok(Self {
            task_name: context.task_name().to_string(),
            operators,
            index,
            inputs,
            joins,
            timer_order,
            clock: context.clock().clone(),
        })
    }

    // ── Processing ───────────────────────────────────────────────────────

    /// Route one incoming message through the graph.
    ///
    /// Returns `false` when no input operator reads the message's stream.
    pub fn on_message(
        &mut self,
        envelope: IncomingMessageEnvelope,
        collector: &mut dyn MessageCollector,
        coordinator: &mut dyn TaskCoordinator,
    ) -> Result<bool> {
        let Some(&root) = self.inputs.get(envelope.stream()) else {
            return Ok(false);
        };
        let mut ctx = OperatorContext {
            collector,
            coordinator,
            now: self.clock.now(),
        };
        self.propagate(root, envelope.into_envelope(), &mut ctx)?;
        Ok(true)
    }

    /// Timer call: expire join entries, then run each window's timer, upstream first.
    pub fn on_timer(
        &mut self,
        collector: &mut dyn MessageCollector,
        coordinator: &mut dyn TaskCoordinator,
    ) -> Result<()> {
        let now = self.clock.now();
        for join in &mut self.joins {
            join.expire(now);
        }
        let mut ctx = OperatorContext {
            collector,
            coordinator,
            now,
        };
        for i in 0..self.timer_order.len() {
            let idx = self.timer_order[i];
            let mut output = Vec::new();
            self.operators[idx].on_timer(now, &mut output)?;
            self.forward(idx, output, &mut ctx)?;
        }
        Ok(())
    }

    /// Emit every open window pane, upstream first.
    pub fn flush(
        &mut self,
        collector: &mut dyn MessageCollector,
        coordinator: &mut dyn TaskCoordinator,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut ctx = OperatorContext {
            collector,
            coordinator,
            now,
        };
        for i in 0..self.timer_order.len() {
            let idx = self.timer_order[i];
            let mut output = Vec::new();
            self.operators[idx].flush(now, &mut output)?;
            self.forward(idx, output, &mut ctx)?;
        }
        tracing::debug!("{} flushed", self.task_name);
        Ok(())
    }

    /// Apply operator `idx` to `envelope` and push its outputs downstream.
    fn propagate(
        &mut self,
        idx: usize,
        envelope: MessageEnvelope,
        ctx: &mut OperatorContext<'_>,
    ) -> Result<()> {
        let mut output = Vec::new();
        let op = &mut self.operators[idx];
        op.on_message(envelope, ctx, &mut self.joins, &mut output)?;
        self.forward(idx, output, ctx)
    }

    /// Depth-first delivery of `outputs` of operator `idx` to its downstream
    /// operators, in registration order.
    fn forward(
        &mut self,
        idx: usize,
        outputs: Vec<MessageEnvelope>,
        ctx: &mut OperatorContext<'_>,
    ) -> Result<()> {
        if outputs.is_empty() || self.operators[idx].next.is_empty() {
            return Ok(());
        }
        let next = self.operators[idx].next.clone();
        for envelope in outputs {
            if let Some((&last, rest)) = next.split_last() {
                for &child in rest {
                    self.propagate(child, envelope.clone(), ctx)?;
                }
                self.propagate(last, envelope, ctx)?;
            }
        }
        Ok(())
    }

    // ── Introspection ────────────────────────────────────────────────────

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn operator(&self, id: OpId) -> Option<&OperatorImpl> {
        self.index.get(&id).map(|&idx| &self.operators[idx])
    }

    /// Operators in instantiation order.
    pub fn operators(&self) -> impl Iterator<Item = &OperatorImpl> {
        self.operators.iter()
    }

    pub fn input_streams(&self) -> impl Iterator<Item = &StreamId> {
        self.inputs.keys()
    }

    pub fn late_messages(&self) -> u64 {
        self.windows().map(WindowOperator::late_messages).sum()
    }

    pub fn open_panes(&self) -> usize {
        self.windows().map(WindowOperator::open_panes).sum()
    }

    /// Messages held in join buffers.
    pub fn buffered_join_entries(&self) -> usize {
        self.joins.iter().map(JoinState::len).sum()
    }

    fn windows(&self) -> impl Iterator<Item = &WindowOperator> {
        self.operators.iter().filter_map(OperatorImpl::window)
    }
}

impl fmt::Debug for OperatorImplGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorImplGraph")
            .field("task_name", &self.task_name)
            .field("operators", &self.operators)
            .field("inputs", &self.inputs)
            .finish()
    }
}

// ── Compiler ──────────────────────────────────────────────────────────────────

struct Compiler<'a> {
    context: &'a TaskContext,
    pending: IndexMap<OpId, OperatorSpec>,
    operators: Vec<OperatorImpl>,
    index: HashMap<OpId, usize>,
    joins: Vec<JoinState>,
    join_index: HashMap<u32, usize>,
}

impl Compiler<'_> {
    /// Instantiate `id` and, recursively, everything downstream of it.
    fn visit(&mut self, id: OpId) -> Result<usize, GraphError> {
        if let Some(&idx) = self.index.get(&id) {
            return Ok(idx);
        }
        let spec = self
            .pending
            .swap_remove(&id)
            .ok_or(GraphError::UnknownOperator(id))?;
        let name = spec.name();
        let op_type = spec.op_type();
        let (_, logic, next) = spec.into_parts();
        let kind = self.instantiate(&name, logic)?;

        let idx = self.operators.len();
        self.operators.push(OperatorImpl::new(id, op_type, name, kind));
        self.index.insert(id, idx);
        for next_id in next {
            let child = self.visit(next_id)?;
            self.operators[idx].next.push(child);
        }
        Ok(idx)
    }

    fn instantiate(&mut self, name: &str, logic: OperatorLogic) -> Result<ImplKind, GraphError> {
        let config = self.context.config();
        Ok(match logic {
            OperatorLogic::Input { .. } => ImplKind::Input,
            OperatorLogic::Merge => ImplKind::Merge,
            OperatorLogic::Map(f) => ImplKind::Map(f.instance()),
            OperatorLogic::FlatMap(f) => ImplKind::FlatMap(f.instance()),
            OperatorLogic::Filter(f) => ImplKind::Filter(f.instance()),
            OperatorLogic::Sink(f) => ImplKind::Sink(f.instance()),
            OperatorLogic::SendTo { stream } => ImplKind::SendTo { stream },
            OperatorLogic::Output { stream } => ImplKind::Output { stream },
            OperatorLogic::PartitionBy { key_fn, stream } => ImplKind::PartitionBy {
                key_fn: key_fn.instance(),
                partitions: config.stream_partitions(&stream)?,
            },
            OperatorLogic::Window(spec) => {
                ImplKind::Window(WindowOperator::new(name.to_string(), spec, config)?)
            }
            OperatorLogic::Join(spec) => {
                let join_index = match self.join_index.get(&spec.join_id()) {
                    Some(&existing) => existing,
                    None => {
                        self.joins.push(JoinState::new(spec.join_id(), spec.ttl()));
                        self.join_index.insert(spec.join_id(), self.joins.len() - 1);
                        self.joins.len() - 1
                    }
                };
                ImplKind::Join(PartialJoin::new(
                    join_index,
                    spec.side(),
                    spec.key_fn().instance(),
                    spec.join_fn().instance(),
                ))
            }
        })
    }
}

/// Kahn's algorithm over operator indices, lowest index first among ready nodes.
fn topo_order(operators: &[OperatorImpl]) -> Vec<usize> {
    let mut in_degree = vec![0usize; operators.len()];
    for op in operators {
        for &child in &op.next {
            in_degree[child] += 1;
        }
    }
    let mut ready: BTreeSet<usize> = (0..operators.len())
        .filter(|&idx| in_degree[idx] == 0)
        .collect();
    let mut order = Vec::with_capacity(operators.len());
    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for &child in &operators[idx].next {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }
    order
}

#[cfg(test)]
#[path = "tests/graph_tests.rs"]
mod tests;
