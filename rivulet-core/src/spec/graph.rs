use super::*;

/// Registration of an input stream and its entry operator.
#[derive(Debug, Clone)]
pub struct InputStreamSpec {
    pub stream: StreamId,
    pub op_id: OpId,
    pub serde: Option<KvSerde>,
    /// Fed by an `Output` operator of the same application.
    pub intermediate: bool,
}

#[derive(Debug, Clone)]
pub struct OutputStreamSpec {
    pub stream: StreamId,
    pub serde: Option<KvSerde>,
    pub intermediate: bool,
}

/// The logical DAG of one application.
///
/// ```text
///   input(page-views) ──► map-1 ──► window-2 ──► send_to-3
///   input(clicks) ─────► filter-4 ──┘
/// ```
///
/// Owns all operator specs. Operators are only reachable through input roots; ids
/// are handed out monotonically and never reused.
#[derive(Debug, Default)]
pub struct OperatorSpecGraph {
    operators: IndexMap<OpId, OperatorSpec>,
    inputs: IndexMap<StreamId, InputStreamSpec>,
    outputs: IndexMap<StreamId, OutputStreamSpec>,
    next_op_id: OpId,
    next_join_id: u32,
}

impl OperatorSpecGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ──────────────────────────────────────────────────────

    /// Register an input stream and create its entry operator.
    pub fn add_input(
        &mut self,
        stream: impl Into<StreamId>,
        serde: Option<KvSerde>,
    ) -> Result<OpId, GraphError> {
        self.register_input(stream.into(), serde, false)
    }

    /// Register an output stream for `SendTo` operators.
    pub fn add_output(
        &mut self,
        stream: impl Into<StreamId>,
        serde: Option<KvSerde>,
    ) -> Result<(), GraphError> {
        self.register_output(stream.into(), serde, false)
    }

    /// Register a stream written by this application and read back by it.
    ///
    /// Returns the id of the input operator reading the stream.
    pub fn add_intermediate(
        &mut self,
        stream: impl Into<StreamId>,
        serde: Option<KvSerde>,
    ) -> Result<OpId, GraphError> {
        let stream = stream.into();
        self.register_output(stream.clone(), serde.clone(), true)?;
        self.register_input(stream, serde, true)
    }

    fn register_input(
        &mut self,
        stream: StreamId,
        serde: Option<KvSerde>,
        intermediate: bool,
    ) -> Result<OpId, GraphError> {
        if self.inputs.contains_key(&stream) {
            return Err(GraphError::DuplicateStream(stream));
        }
        let op_id = self.allocate(OperatorLogic::Input {
            stream: stream.clone(),
        });
        self.inputs.insert(
            stream.clone(),
            InputStreamSpec {
                stream,
                op_id,
                serde,
                intermediate,
            },
        );
        Ok(op_id)
    }

    fn register_output(
        &mut self,
        stream: StreamId,
        serde: Option<KvSerde>,
        intermediate: bool,
    ) -> Result<(), GraphError> {
        if self.outputs.contains_key(&stream) {
            return Err(GraphError::DuplicateStream(stream));
        }
        self.outputs.insert(
            stream.clone(),
            OutputStreamSpec {
                stream,
                serde,
                intermediate,
            },
        );
        Ok(())
    }

    /// Create a non-input operator. Inputs come from [`add_input`](Self::add_input).
    pub fn add_operator(&mut self, logic: OperatorLogic) -> Result<OpId, GraphError> {
        if let OperatorLogic::Input { stream } = &logic {
            return Err(GraphError::malformed(
                format!("input({stream})"),
                "input operators are created by registering the stream",
            ));
        }
        Ok(self.allocate(logic))
    }

    fn allocate(&mut self, logic: OperatorLogic) -> OpId {
        let id = self.next_op_id;
        self.next_op_id += 1;
        self.operators.insert(id, OperatorSpec::new(id, logic));
        id
    }

    /// Allocate the id shared by the two sides of a join.
    pub fn next_join_id(&mut self) -> u32 {
        let id = self.next_join_id;
        self.next_join_id += 1;
        id
    }

    /// Add the edge `from -> to`. Re-adding an existing edge is a no-op.
    pub fn connect(&mut self, from: OpId, to: OpId) -> Result<(), GraphError> {
        let target = self
            .operators
            .get(&to)
            .ok_or(GraphError::UnknownOperator(to))?;
        if target.op_type() == OperatorType::Input {
            return Err(GraphError::malformed(
                target.name(),
                "input operators cannot have upstream operators",
            ));
        }
        let source = self
            .operators
            .get_mut(&from)
            .ok_or(GraphError::UnknownOperator(from))?;
        if source.op_type().is_terminal() {
            return Err(GraphError::malformed(
                source.name(),
                "terminal operators cannot have downstream operators",
            ));
        }
        source.register_next(to);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn operator(&self, id: OpId) -> Option<&OperatorSpec> {
        self.operators.get(&id)
    }

    /// All operators in id order.
    pub fn operators(&self) -> impl Iterator<Item = &OperatorSpec> {
        self.operators.values()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputStreamSpec> {
        self.inputs.values()
    }

    pub fn input(&self, stream: &StreamId) -> Option<&InputStreamSpec> {
        self.inputs.get(stream)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputStreamSpec> {
        self.outputs.values()
    }

    pub fn output(&self, stream: &StreamId) -> Option<&OutputStreamSpec> {
        self.outputs.get(stream)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Every edge as `(from, to)`, grouped by source in id order, targets in
    /// registration order.
    pub fn edges(&self) -> Vec<(OpId, OpId)> {
        self.operators
            .values()
            .flat_map(|op| op.next().iter().map(move |&next| (op.id(), next)))
            .collect()
    }

    // ── Validation ────────────────────────────────────────────────────────

    /// Check the wiring is executable.
    ///
    /// - every edge points at an existing operator
    /// - terminal operators have no downstream
    /// - `SendTo`/`Output` streams are registered, join sides come in pairs
    /// - every operator is reachable from an input and the graph is acyclic
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut join_sides: IndexMap<u32, Vec<JoinSide>> = IndexMap::new();

        for op in self.operators.values() {
            for &next in op.next() {
                if !self.operators.contains_key(&next) {
                    return Err(GraphError::UnknownOperator(next));
                }
            }
            if op.op_type().is_terminal() && !op.next().is_empty() {
                return Err(GraphError::malformed(
                    op.name(),
                    "terminal operators cannot have downstream operators",
                ));
            }
            match op.logic() {
                OperatorLogic::SendTo { stream } => {
                    let output = self
                        .outputs
                        .get(stream)
                        .ok_or_else(|| GraphError::UnknownStream(stream.clone()))?;
                    if output.intermediate {
                        return Err(GraphError::malformed(
                            op.name(),
                            format!("`{stream}` is an intermediate stream"),
                        ));
                    }
                }
                OperatorLogic::Output { stream } | OperatorLogic::PartitionBy { stream, .. } => {
                    let registered = self.outputs.get(stream).is_some_and(|o| o.intermediate)
                        && self.inputs.get(stream).is_some_and(|i| i.intermediate);
                    if !registered {
                        return Err(GraphError::UnknownStream(stream.clone()));
                    }
                }
                OperatorLogic::Join(join) => {
                    join_sides.entry(join.join_id()).or_default().push(join.side());
                }
                _ => {}
            }
        }

        for (join_id, sides) in &join_sides {
            let paired = sides.len() == 2
                && sides.contains(&JoinSide::Left)
                && sides.contains(&JoinSide::Right);
            if !paired {
                return Err(GraphError::malformed(
                    format!("join {join_id}"),
                    format!("expected one left and one right side, found {sides:?}"),
                ));
            }
        }

        self.check_reachable_and_acyclic()
    }

    fn check_reachable_and_acyclic(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }

        let mut marks: IndexMap<OpId, Mark> = IndexMap::with_capacity(self.operators.len());
        for input in self.inputs.values() {
            // iterative DFS: (node, index of the next child to visit)
            let mut stack: Vec<(OpId, usize)> = Vec::new();
            if marks.contains_key(&input.op_id) {
                continue;
            }
            marks.insert(input.op_id, Mark::Active);
            stack.push((input.op_id, 0));

            while let Some((id, child)) = stack.last().copied() {
                let op = self
                    .operators
                    .get(&id)
                    .ok_or(GraphError::UnknownOperator(id))?;
                match op.next().get_index(child) {
                    Some(&next) => {
                        if let Some(top) = stack.last_mut() {
                            top.1 += 1;
                        }
                        match marks.get(&next) {
                            Some(Mark::Active) => {
                                let name = self
                                    .operators
                                    .get(&next)
                                    .map_or_else(|| next.to_string(), OperatorSpec::name);
                                return Err(GraphError::Cycle(name));
                            }
                            Some(Mark::Done) => {}
                            None => {
                                marks.insert(next, Mark::Active);
                                stack.push((next, 0));
                            }
                        }
                    }
                    None => {
                        marks.insert(id, Mark::Done);
                        stack.pop();
                    }
                }
            }
        }

        if let Some(orphan) = self.operators.values().find(|op| !marks.contains_key(&op.id())) {
            return Err(GraphError::Unreachable(orphan.name()));
        }
        Ok(())
    }

    // ── Cloning ───────────────────────────────────────────────────────────

    /// Structural copy for one task.
    ///
    /// Walks from every input root, duplicates each node once (through an
    /// id -> copy map) and re-registers its edges among the copies. Shared
    /// functions are reused, per-task functions rebuilt; a pinned function
    /// fails the whole clone with [`GraphError::CloneFailure`].
    pub fn try_clone(&self) -> Result<Self, GraphError> {
        self.validate()?;

        let mut copies: IndexMap<OpId, OperatorSpec> =
            IndexMap::with_capacity(self.operators.len());
        for input in self.inputs.values() {
            self.copy_reachable(input.op_id, &mut copies)?;
        }
        copies.sort_keys();

        Ok(Self {
            operators: copies,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            next_op_id: self.next_op_id,
            next_join_id: self.next_join_id,
        })
    }

    fn copy_reachable(
        &self,
        id: OpId,
        copies: &mut IndexMap<OpId, OperatorSpec>,
    ) -> Result<(), GraphError> {
        if copies.contains_key(&id) {
            return Ok(());
        }
        let original = self
            .operators
            .get(&id)
            .ok_or(GraphError::UnknownOperator(id))?;
        copies.insert(id, original.copy_node()?);

        for &next in original.next() {
            self.copy_reachable(next, copies)?;
            if let Some(copy) = copies.get_mut(&id) {
                copy.register_next(next);
            }
        }
        Ok(())
    }

    /// `true` when `other` is a distinct graph with the same operators (by
    /// `(type, id)`), the same streams and the same edges in the same order.
    pub fn is_clone_of(&self, other: &OperatorSpecGraph) -> bool {
        !std::ptr::eq(self, other)
            && self.operators.len() == other.operators.len()
            && self
                .operators
                .values()
                .zip(other.operators.values())
                .all(|(a, b)| a.is_clone_of(b) && a.next().iter().eq(b.next().iter()))
            && self.inputs.keys().eq(other.inputs.keys())
            && self.outputs.keys().eq(other.outputs.keys())
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        IndexMap<OpId, OperatorSpec>,
        IndexMap<StreamId, InputStreamSpec>,
    ) {
        (self.operators, self.inputs)
    }
}
