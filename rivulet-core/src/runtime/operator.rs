use super::*;

/// Side-effect handles for one `process`/`window`/`flush` call.
pub struct OperatorContext<'a> {
    pub collector: &'a mut dyn MessageCollector,
    pub coordinator: &'a mut dyn TaskCoordinator,
    /// Clock reading taken once when the call started.
    pub now: EventTime,
}

/// Task-local behaviour of one compiled operator.
pub(crate) enum ImplKind {
    Input,
    Merge,
    Map(Arc<MapFn>),
    FlatMap(Arc<FlatMapFn>),
    Filter(Arc<FilterFn>),
    Sink(Arc<SinkFn>),
    SendTo { stream: StreamId },
    Output { stream: StreamId },
    PartitionBy { key_fn: Arc<KeyFn>, partitions: u32 },
    Window(WindowOperator),
    Join(PartialJoin),
}

/// One node of an [`OperatorImplGraph`].
pub struct OperatorImpl {
    id: OpId,
    op_type: OperatorType,
    name: String,
    kind: ImplKind,
    /// Indices of downstream nodes, in registration order.
    pub(crate) next: Vec<usize>,
}

impl OperatorImpl {
    pub(crate) fn new(id: OpId, op_type: OperatorType, name: String, kind: ImplKind) -> Self {
        Self {
            id,
            op_type,
            name,
            kind,
            next: Vec::new(),
        }
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn op_type(&self) -> OperatorType {
        self.op_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of downstream operators.
    pub fn fan_out(&self) -> usize {
        self.next.len()
    }

    pub fn window(&self) -> Option<&WindowOperator> {
        match &self.kind {
            ImplKind::Window(window) => Some(window),
            _ => None,
        }
    }

    pub(crate) fn has_timer(&self) -> bool {
        matches!(self.kind, ImplKind::Window(_))
    }

    /// Apply this operator to `envelope`, appending what flows downstream to `output`.
    pub(crate) fn on_message(
        &mut self,
        envelope: MessageEnvelope,
        ctx: &mut OperatorContext<'_>,
        joins: &mut [JoinState],
        output: &mut Vec<MessageEnvelope>,
    ) -> Result<()> {
        let name = &self.name;
        match &mut self.kind {
            ImplKind::Input | ImplKind::Merge => output.push(envelope),
            ImplKind::Map(f) => {
                output.push(f(&envelope).with_context(|| format!("operator {name} failed"))?)
            }
            ImplKind::FlatMap(f) => {
                output.extend(f(&envelope).with_context(|| format!("operator {name} failed"))?)
            }
            ImplKind::Filter(f) => {
                if f(&envelope).with_context(|| format!("operator {name} failed"))? {
                    output.push(envelope);
                }
            }
            ImplKind::Sink(f) => f(&envelope, &mut *ctx.collector, &mut *ctx.coordinator)
                .with_context(|| format!("operator {name} failed"))?,
            ImplKind::SendTo { stream } => {
                // the output system picks the partition from the key
                let mut outgoing = OutgoingMessageEnvelope::from_envelope(stream.clone(), envelope);
                outgoing.partition = None;
                ctx.collector.send(outgoing)?;
            }
            ImplKind::Output { stream } => ctx
                .collector
                .send(OutgoingMessageEnvelope::from_envelope(stream.clone(), envelope))?,
            ImplKind::PartitionBy { key_fn, partitions } => {
                let key = key_fn(&envelope).with_context(|| format!("operator {name} failed"))?;
                let partition = HashPartitioner.partition(&key, *partitions);
                output.push(envelope.rekey(key.into_value(), partition));
            }
            ImplKind::Window(window) => window.on_message(envelope, ctx.now, output)?,
            ImplKind::Join(join) => {
                let state = &mut joins[join.join_index()];
                join.on_message(name, envelope, ctx.now, state, output)?;
            }
        }
        Ok(())
    }

    pub(crate) fn on_timer(&mut self, now: EventTime, output: &mut Vec<MessageEnvelope>) -> Result<()> {
        if let ImplKind::Window(window) = &mut self.kind {
            window.on_timer(now, output)?;
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self, now: EventTime, output: &mut Vec<MessageEnvelope>) -> Result<()> {
        if let ImplKind::Window(window) = &mut self.kind {
            window.flush(now, output)?;
        }
        Ok(())
    }
}

impl fmt::Debug for OperatorImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorImpl")
            .field("name", &self.name)
            .field("next", &self.next)
            .finish()
    }
}
