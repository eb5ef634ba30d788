use super::*;

/// How long a closed pane (and its key's late-message horizon) is remembered.
pub const DEFAULT_CLOSED_PANE_RETENTION_MS: EventTime = 60_000;

/// Identity of one pane: key bytes plus window start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct PaneKey {
    key: Vec<u8>,
    start: EventTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaneStatus {
    Open,
    Closed { at: EventTime },
}

struct PaneState {
    key: Value,
    start: EventTime,
    end: EventTime,
    acc: Value,
    /// Messages folded since the last firing.
    pending: u64,
    trigger: Option<TriggerState>,
    status: PaneStatus,
}

/// Task-local state of one window operator.
///
/// Panes are keyed by `(group key, start)`. Each bounded pane registers a
/// close deadline at its end time. Closed panes are remembered for the retention
/// period so that late messages for them are recognised and dropped.
pub struct WindowOperator {
    name: String,
    window_type: WindowType,
    key_fn: Option<Arc<KeyFn>>,
    init: Arc<InitFn>,
    fold: Arc<FoldFn>,
    pane_fn: Arc<PaneFn>,
    early_trigger: Option<Trigger>,
    mode: AccumulationMode,
    panes: IndexMap<PaneKey, PaneState, RandomState>,
    /// Start of the open session per key.
    sessions: HashMap<Vec<u8>, EventTime, RandomState>,
    deadlines: TimerService,
    /// Per key: end of the latest closed pane, and when it closed.
    closed_through: HashMap<Vec<u8>, (EventTime, EventTime), RandomState>,
    retention: EventTime,
    late: u64,
}

impl WindowOperator {
    pub(crate) fn new(name: String, spec: WindowSpec, config: &Config) -> Result<Self, GraphError> {
        let width = config.get_duration_ms(&window_width_key(&name))?;
        let window_type = match (spec.window_type(), width) {
            (WindowType::Tumbling { .. }, Some(width)) => WindowType::Tumbling { width },
            (WindowType::Session { .. }, Some(gap)) => WindowType::Session { gap },
            (window_type, _) => window_type,
        };
        if let WindowType::Tumbling { width } | WindowType::Session { gap: width } = window_type {
            if duration_ms(width) <= 0 {
                return Err(GraphError::malformed(
                    name,
                    "window width must be at least one millisecond",
                ));
            }
        }
        let retention = config
            .get_duration_ms(CLOSED_PANE_RETENTION_MS)?
            .map_or(DEFAULT_CLOSED_PANE_RETENTION_MS, duration_ms);

        Ok(Self {
            key_fn: spec.key_fn().map(UserFn::instance),
            init: spec.init().instance(),
            fold: spec.fold().instance(),
            pane_fn: spec.pane_fn().instance(),
            early_trigger: spec.early_trigger().cloned(),
            mode: spec.accumulation_mode(),
            name,
            window_type,
            panes: IndexMap::default(),
            sessions: HashMap::default(),
            deadlines: TimerService::new(),
            closed_through: HashMap::default(),
            retention,
            late: 0,
        })
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    /// Panes still accepting messages.
    pub fn open_panes(&self) -> usize {
        self.panes
            .values()
            .filter(|pane| pane.status == PaneStatus::Open)
            .count()
    }

    /// Messages dropped because their pane had already closed.
    pub fn late_messages(&self) -> u64 {
        self.late
    }

    /// Earliest pending close deadline.
    pub fn next_deadline(&self) -> Option<EventTime> {
        self.deadlines.next_timer()
    }

    pub(crate) fn on_message(
        &mut self,
        envelope: MessageEnvelope,
        now: EventTime,
        output: &mut Vec<MessageEnvelope>,
    ) -> Result<()> {
        let ts = envelope.timestamp().unwrap_or(now);
        let key = match &self.key_fn {
            Some(key_fn) => key_fn(&envelope)
                .with_context(|| format!("operator {} failed to extract key", self.name))?,
            None => GroupKey::unit(),
        };
        let Some(pane_key) = self.assign(&key, ts, now, output)? else {
            self.late += 1;
            tracing::debug!(
                "{} dropped late message at {} for a closed pane",
                self.name,
                ts
            );
            return Ok(());
        };

        let Some(pane) = self.panes.get_mut(&pane_key) else {
            return Ok(());
        };
        let acc = mem::replace(&mut pane.acc, Value::new(()));
        pane.acc = (self.fold)(&envelope, acc)
            .with_context(|| format!("operator {} fold failed", self.name))?;
        pane.pending += 1;
        let fire = pane
            .trigger
            .as_mut()
            .is_some_and(|trigger| trigger.on_message(now));
        if fire {
            self.fire_early(&pane_key, output)?;
        }
        Ok(())
    }

    /// Timer call: time-based early triggers, then due closes, then retention sweep.
    pub(crate) fn on_timer(&mut self, now: EventTime, output: &mut Vec<MessageEnvelope>) -> Result<()> {
        let due: Vec<PaneKey> = self
            .panes
            .iter_mut()
            .filter(|(_, pane)| pane.status == PaneStatus::Open)
            .filter_map(|(pane_key, pane)| {
                let fire = pane
                    .trigger
                    .as_mut()
                    .is_some_and(|trigger| trigger.on_timer(now));
                fire.then(|| pane_key.clone())
            })
            .collect();
        for pane_key in due {
            self.fire_early(&pane_key, output)?;
        }

        for (timer_key, _) in self.deadlines.drain_due(now) {
            let pane_key: PaneKey =
                bincode::deserialize(&timer_key).context("decoding pane deadline")?;
            self.close(&pane_key, FiringType::Close, now, output)?;
        }

        let horizon = now.saturating_sub(self.retention);
        self.panes
            .retain(|_, pane| !matches!(pane.status, PaneStatus::Closed { at } if at <= horizon));
        self.closed_through.retain(|_, &mut (_, at)| at > horizon);
        Ok(())
    }

    /// Close every open pane, global panes included.
    pub(crate) fn flush(&mut self, now: EventTime, output: &mut Vec<MessageEnvelope>) -> Result<()> {
        let open: Vec<PaneKey> = self
            .panes
            .iter()
            .filter(|(_, pane)| pane.status == PaneStatus::Open)
            .map(|(pane_key, _)| pane_key.clone())
            .collect();
        if !open.is_empty() {
            tracing::debug!("{} flushing {} open panes", self.name, open.len());
        }
        for pane_key in open {
            self.close(&pane_key, FiringType::Flush, now, output)?;
        }
        Ok(())
    }

    // ── Pane assignment ──────────────────────────────────────────────────

    /// Pane for a message of `key` at `ts`, creating it if needed.
    /// `None` means the pane has already closed.
    fn assign(
        &mut self,
        key: &GroupKey,
        ts: EventTime,
        now: EventTime,
        output: &mut Vec<MessageEnvelope>,
    ) -> Result<Option<PaneKey>> {
        let (start, end) = match self.window_type {
            WindowType::Tumbling { width } => {
                let width = duration_ms(width);
                let start = ts.saturating_sub(ts.rem_euclid(width));
                (start, start.saturating_add(width))
            }
            WindowType::Global => (EVENT_TIME_MIN, EVENT_TIME_MAX),
            WindowType::Session { gap } => {
                let gap = duration_ms(gap);
                if let Some(&start) = self.sessions.get(key.bytes()) {
                    let latest = PaneKey {
                        key: key.bytes().to_vec(),
                        start,
                    };
                    let elapsed = self.panes.get(&latest).is_none_or(|pane| ts >= pane.end);
                    if elapsed {
                        // gap elapsed before the deadline fired
                        self.close(&latest, FiringType::Close, now, output)?;
                        self.sessions.remove(key.bytes());
                    }
                }
                if let Some(pane_key) = self.join_session(key.bytes(), ts, gap)? {
                    return Ok(Some(pane_key));
                }
                (ts, ts.saturating_add(gap))
            }
        };

        let pane_key = PaneKey {
            key: key.bytes().to_vec(),
            start,
        };
        if let Some(pane) = self.panes.get(&pane_key) {
            return Ok((pane.status == PaneStatus::Open).then_some(pane_key));
        }
        let closed = self
            .closed_through
            .get(key.bytes())
            .is_some_and(|&(through, _)| ts < through);
        if closed {
            return Ok(None);
        }

        self.panes.insert(
            pane_key.clone(),
            PaneState {
                key: key.value().clone(),
                start,
                end,
                acc: (self.init)(),
                pending: 0,
                trigger: self.early_trigger.as_ref().map(TriggerState::new),
                status: PaneStatus::Open,
            },
        );
        if end != EVENT_TIME_MAX {
            self.deadlines.register(encode_pane_key(&pane_key)?, end);
        }
        if matches!(self.window_type, WindowType::Session { .. }) {
            let latest = self.sessions.entry(key.bytes().to_vec()).or_insert(start);
            *latest = (*latest).max(start);
        }
        Ok(Some(pane_key))
    }

    /// Open session of `key` that `ts` falls into, extending its end.
    ///
    /// A session accepts messages from `start - gap` up to its end. The start
    /// (and so the pane id) stays where the first message put it, and two
    /// sessions are never merged. A message too early for every open session
    /// gets a session of its own.
    fn join_session(&mut self, key: &[u8], ts: EventTime, gap: EventTime) -> Result<Option<PaneKey>> {
        let found = self.panes.iter_mut().find(|(pane_key, pane)| {
            pane_key.key == key
                && pane.status == PaneStatus::Open
                && pane.start.saturating_sub(gap) <= ts
                && ts < pane.end
        });
        let Some((pane_key, pane)) = found else {
            return Ok(None);
        };
        let end = pane.end.max(ts.saturating_add(gap));
        if end != pane.end {
            self.deadlines
                .reschedule(encode_pane_key(pane_key)?, pane.end, end);
            pane.end = end;
        }
        Ok(Some(pane_key.clone()))
    }

    // ── Firing ───────────────────────────────────────────────────────────

    fn fire_early(&mut self, pane_key: &PaneKey, output: &mut Vec<MessageEnvelope>) -> Result<()> {
        let Some(pane) = self.panes.get_mut(pane_key) else {
            return Ok(());
        };
        if pane.pending == 0 {
            return Ok(());
        }
        let value = match self.mode {
            AccumulationMode::Discarding => mem::replace(&mut pane.acc, (self.init)()),
            AccumulationMode::Accumulating => pane.acc.clone(),
        };
        pane.pending = 0;
        if pane.trigger.as_ref().is_some_and(TriggerState::is_done) {
            pane.trigger = None;
        }
        let message = self.emit(pane_key, value, FiringType::Early)?;
        output.push(message);
        Ok(())
    }

    /// Final firing of a pane.
    ///
    /// A discarding pane with nothing folded since its last firing closes silently
    /// and is removed; an accumulating pane always emits its full result and is
    /// kept, marked closed, until the retention sweep.
    fn close(
        &mut self,
        pane_key: &PaneKey,
        firing: FiringType,
        now: EventTime,
        output: &mut Vec<MessageEnvelope>,
    ) -> Result<()> {
        let Some(pane) = self.panes.get_mut(pane_key) else {
            return Ok(());
        };
        if pane.status != PaneStatus::Open {
            return Ok(());
        }
        let value = match self.mode {
            AccumulationMode::Discarding if pane.pending == 0 => None,
            AccumulationMode::Discarding => Some(mem::replace(&mut pane.acc, Value::new(()))),
            AccumulationMode::Accumulating => Some(pane.acc.clone()),
        };
        pane.pending = 0;
        pane.trigger = None;
        pane.status = PaneStatus::Closed { at: now };
        let end = pane.end;

        if let Some(value) = value {
            let message = self.emit(pane_key, value, firing)?;
            output.push(message);
        }
        if end != EVENT_TIME_MAX {
            self.deadlines.delete(&encode_pane_key(pane_key)?, end);
        }
        self.closed_through
            .entry(pane_key.key.clone())
            .and_modify(|(through, at)| {
                *through = (*through).max(end);
                *at = now;
            })
            .or_insert((end, now));
        if self.sessions.get(&pane_key.key) == Some(&pane_key.start) {
            self.sessions.remove(&pane_key.key);
        }
        if self.mode == AccumulationMode::Discarding {
            self.panes.shift_remove(pane_key);
        }
        tracing::trace!("{} closed pane starting at {}", self.name, pane_key.start);
        Ok(())
    }

    /// Envelope for one firing: key is the group key, message is the pane output.
    fn emit(&self, pane_key: &PaneKey, value: Value, firing: FiringType) -> Result<MessageEnvelope> {
        let pane = self
            .panes
            .get(pane_key)
            .with_context(|| format!("{} lost pane starting at {}", self.name, pane_key.start))?;
        let pane_id = match self.window_type {
            WindowType::Global => None,
            _ => Some(pane.start.to_string()),
        };
        let window_pane = WindowPane::new(WindowKey::new(pane.key.clone(), pane_id), value, firing);
        let message = (self.pane_fn)(window_pane)
            .with_context(|| format!("operator {} failed to emit pane", self.name))?;
        let envelope = MessageEnvelope::new(pane.key.clone(), message);
        Ok(if pane.end == EVENT_TIME_MAX {
            envelope
        } else {
            envelope.with_timestamp(pane.end - 1)
        })
    }
}

impl fmt::Debug for WindowOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowOperator")
            .field("name", &self.name)
            .field("window_type", &self.window_type)
            .field("mode", &self.mode)
            .field("panes", &self.panes.len())
            .field("late", &self.late)
            .finish()
    }
}

fn encode_pane_key(pane_key: &PaneKey) -> Result<Vec<u8>> {
    bincode::serialize(pane_key).context("encoding pane key")
}

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;
