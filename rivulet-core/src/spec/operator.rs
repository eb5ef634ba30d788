use super::*;

// ── OperatorType ──────────────────────────────────────────────────────────────

/// Kind of an operator, the tag of [`OperatorLogic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperatorType {
    Input,
    Map,
    FlatMap,
    Filter,
    Sink,
    SendTo,
    Join,
    Window,
    Merge,
    PartitionBy,
    Output,
}

impl OperatorType {
    pub fn as_str(self) -> &'static str {
        match self {
            OperatorType::Input => "input",
            OperatorType::Map => "map",
            OperatorType::FlatMap => "flat_map",
            OperatorType::Filter => "filter",
            OperatorType::Sink => "sink",
            OperatorType::SendTo => "send_to",
            OperatorType::Join => "join",
            OperatorType::Window => "window",
            OperatorType::Merge => "merge",
            OperatorType::PartitionBy => "partition_by",
            OperatorType::Output => "output",
        }
    }

    /// Terminal operators hand messages to the collector and have no downstream.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperatorType::Sink | OperatorType::SendTo | OperatorType::Output
        )
    }
}

impl fmt::Display for OperatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── OperatorLogic ─────────────────────────────────────────────────────────────

/// What an operator does, with the payload each kind needs.
pub enum OperatorLogic {
    /// Entry point of a physical or intermediate stream.
    Input { stream: StreamId },
    Map(UserFn<MapFn>),
    FlatMap(UserFn<FlatMapFn>),
    Filter(UserFn<FilterFn>),
    /// User function receiving the collector and coordinator.
    Sink(UserFn<SinkFn>),
    SendTo { stream: StreamId },
    /// One side of a two-sided join.
    Join(PartialJoinSpec),
    Window(WindowSpec),
    Merge,
    /// Re-key and assign the partition of intermediate `stream`.
    PartitionBy {
        key_fn: UserFn<KeyFn>,
        stream: StreamId,
    },
    /// Write to intermediate `stream`, keeping the partition set upstream.
    Output { stream: StreamId },
}

impl OperatorLogic {
    pub fn op_type(&self) -> OperatorType {
        match self {
            OperatorLogic::Input { .. } => OperatorType::Input,
            OperatorLogic::Map(_) => OperatorType::Map,
            OperatorLogic::FlatMap(_) => OperatorType::FlatMap,
            OperatorLogic::Filter(_) => OperatorType::Filter,
            OperatorLogic::Sink(_) => OperatorType::Sink,
            OperatorLogic::SendTo { .. } => OperatorType::SendTo,
            OperatorLogic::Join(_) => OperatorType::Join,
            OperatorLogic::Window(_) => OperatorType::Window,
            OperatorLogic::Merge => OperatorType::Merge,
            OperatorLogic::PartitionBy { .. } => OperatorType::PartitionBy,
            OperatorLogic::Output { .. } => OperatorType::Output,
        }
    }

    /// Copy the payload. `None` when it holds a pinned user function.
    fn try_clone(&self) -> Option<Self> {
        Some(match self {
            OperatorLogic::Input { stream } => OperatorLogic::Input {
                stream: stream.clone(),
            },
            OperatorLogic::Map(f) => OperatorLogic::Map(f.try_clone()?),
            OperatorLogic::FlatMap(f) => OperatorLogic::FlatMap(f.try_clone()?),
            OperatorLogic::Filter(f) => OperatorLogic::Filter(f.try_clone()?),
            OperatorLogic::Sink(f) => OperatorLogic::Sink(f.try_clone()?),
            OperatorLogic::SendTo { stream } => OperatorLogic::SendTo {
                stream: stream.clone(),
            },
            OperatorLogic::Join(join) => OperatorLogic::Join(join.try_clone()?),
            OperatorLogic::Window(window) => OperatorLogic::Window(window.try_clone()?),
            OperatorLogic::Merge => OperatorLogic::Merge,
            OperatorLogic::PartitionBy { key_fn, stream } => OperatorLogic::PartitionBy {
                key_fn: key_fn.try_clone()?,
                stream: stream.clone(),
            },
            OperatorLogic::Output { stream } => OperatorLogic::Output {
                stream: stream.clone(),
            },
        })
    }
}

impl fmt::Debug for OperatorLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorLogic::Input { stream }
            | OperatorLogic::SendTo { stream }
            | OperatorLogic::Output { stream }
            | OperatorLogic::PartitionBy { stream, .. } => {
                write!(f, "{}({})", self.op_type(), stream)
            }
            OperatorLogic::Join(join) => write!(f, "join({}/{:?})", join.join_id(), join.side()),
            _ => f.write_str(self.op_type().as_str()),
        }
    }
}

// ── OperatorSpec ──────────────────────────────────────────────────────────────

/// One node of the spec graph.
///
/// Identity is `(op_type, id)`. The downstream set keeps registration order, which
/// is the order messages are propagated in at runtime.
#[derive(Debug)]
pub struct OperatorSpec {
    id: OpId,
    logic: OperatorLogic,
    next: IndexSet<OpId>,
}

impl OperatorSpec {
    pub fn new(id: OpId, logic: OperatorLogic) -> Self {
        Self {
            id,
            logic,
            next: IndexSet::new(),
        }
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn op_type(&self) -> OperatorType {
        self.logic.op_type()
    }

    /// `"<type>-<id>"`, e.g. `window-4`. Used in logs, errors and config keys.
    pub fn name(&self) -> String {
        format!("{}-{}", self.op_type(), self.id)
    }

    pub fn logic(&self) -> &OperatorLogic {
        &self.logic
    }

    pub fn next(&self) -> &IndexSet<OpId> {
        &self.next
    }

    /// Append `next` to the downstream set. Returns `false` if already present.
    pub fn register_next(&mut self, next: OpId) -> bool {
        self.next.insert(next)
    }

    /// Same identity as `other`.
    pub fn is_clone_of(&self, other: &OperatorSpec) -> bool {
        self.id == other.id && self.op_type() == other.op_type()
    }

    /// Copy of this node without its edges.
    pub(crate) fn copy_node(&self) -> Result<Self, GraphError> {
        let logic = self.logic.try_clone().ok_or_else(|| GraphError::CloneFailure {
            op: self.name(),
            reason: "holds a pinned user function".to_string(),
        })?;
        Ok(Self::new(self.id, logic))
    }

    pub(crate) fn into_parts(self) -> (OpId, OperatorLogic, IndexSet<OpId>) {
        (self.id, self.logic, self.next)
    }
}
