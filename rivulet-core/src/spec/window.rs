use super::*;

// ── Window types ──────────────────────────────────────────────────────────────

/// How messages are bucketed into panes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    /// Fixed, non-overlapping buckets `[n * width, (n + 1) * width)`.
    Tumbling { width: Duration },
    /// Per-key sessions closed after `gap` without messages.
    Session { gap: Duration },
    /// One pane per key that never closes on a timer.
    Global,
}

/// Whether the accumulator survives a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccumulationMode {
    /// Reset to the initial value after every firing.
    #[default]
    Discarding,
    /// Keep accumulating across firings.
    Accumulating,
}

// ── Triggers ──────────────────────────────────────────────────────────────────

/// Early trigger definition. A non-repeating trigger fires at most once per pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fires once `n` messages arrived.
    Count(u64),
    /// Fires once the given time passed since the first message.
    TimeSinceFirstMessage(Duration),
    /// Fires once no message arrived for the given time.
    TimeSinceLastMessage(Duration),
    /// Fires when any child fires.
    Any(Vec<Trigger>),
    /// Restarts the inner trigger every time it fires.
    Repeat(Box<Trigger>),
}

impl Trigger {
    pub fn count(n: u64) -> Self {
        Trigger::Count(n)
    }

    pub fn time_since_first_message(delay: Duration) -> Self {
        Trigger::TimeSinceFirstMessage(delay)
    }

    pub fn time_since_last_message(gap: Duration) -> Self {
        Trigger::TimeSinceLastMessage(gap)
    }

    pub fn any(triggers: impl IntoIterator<Item = Trigger>) -> Self {
        Trigger::Any(triggers.into_iter().collect())
    }

    pub fn repeat(trigger: Trigger) -> Self {
        Trigger::Repeat(Box::new(trigger))
    }
}

// ── Panes ─────────────────────────────────────────────────────────────────────

/// Identifies one firing window instance for one grouping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowKey<K> {
    key: K,
    pane_id: Option<String>,
}

impl<K> WindowKey<K> {
    pub fn new(key: K, pane_id: Option<String>) -> Self {
        Self { key, pane_id }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Start timestamp of the pane, absent for global windows.
    pub fn pane_id(&self) -> Option<&str> {
        self.pane_id.as_deref()
    }

    pub fn into_key(self) -> K {
        self.key
    }
}

/// What caused a pane to be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiringType {
    /// The early trigger fired.
    Early,
    /// The pane deadline passed.
    Close,
    /// End of input flushed an open pane.
    Flush,
}

/// Result of one window firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowPane<K, V> {
    key: WindowKey<K>,
    value: V,
    firing: FiringType,
}

impl<K, V> WindowPane<K, V> {
    pub fn new(key: WindowKey<K>, value: V, firing: FiringType) -> Self {
        Self { key, value, firing }
    }

    pub fn key(&self) -> &WindowKey<K> {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn firing(&self) -> FiringType {
        self.firing
    }

    pub fn into_parts(self) -> (WindowKey<K>, V, FiringType) {
        (self.key, self.value, self.firing)
    }
}

// ── WindowSpec ────────────────────────────────────────────────────────────────

/// Payload of a window operator.
pub struct WindowSpec {
    window_type: WindowType,
    key_fn: Option<UserFn<KeyFn>>,
    init: UserFn<InitFn>,
    fold: UserFn<FoldFn>,
    pane_fn: UserFn<PaneFn>,
    early_trigger: Option<Trigger>,
    mode: AccumulationMode,
}

impl WindowSpec {
    /// Unkeyed window folding every message into `init()` with `fold`.
    ///
    /// Emits `WindowPane<Value, Value>` messages unless a pane function is set.
    pub fn new(window_type: WindowType, init: UserFn<InitFn>, fold: UserFn<FoldFn>) -> Self {
        let identity: Arc<PaneFn> = Arc::new(|pane: WindowPane<Value, Value>| Ok(Value::new(pane)));
        Self {
            window_type,
            key_fn: None,
            init,
            fold,
            pane_fn: UserFn::shared(identity),
            early_trigger: None,
            mode: AccumulationMode::default(),
        }
    }

    pub fn with_key_fn(mut self, key_fn: UserFn<KeyFn>) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    pub fn with_pane_fn(mut self, pane_fn: UserFn<PaneFn>) -> Self {
        self.pane_fn = pane_fn;
        self
    }

    pub fn with_early_trigger(mut self, trigger: Trigger) -> Self {
        self.early_trigger = Some(trigger);
        self
    }

    pub fn with_accumulation_mode(mut self, mode: AccumulationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    pub fn key_fn(&self) -> Option<&UserFn<KeyFn>> {
        self.key_fn.as_ref()
    }

    pub fn init(&self) -> &UserFn<InitFn> {
        &self.init
    }

    pub fn fold(&self) -> &UserFn<FoldFn> {
        &self.fold
    }

    pub fn pane_fn(&self) -> &UserFn<PaneFn> {
        &self.pane_fn
    }

    pub fn early_trigger(&self) -> Option<&Trigger> {
        self.early_trigger.as_ref()
    }

    pub fn accumulation_mode(&self) -> AccumulationMode {
        self.mode
    }

    pub(crate) fn try_clone(&self) -> Option<Self> {
        let key_fn = match &self.key_fn {
            Some(f) => Some(f.try_clone()?),
            None => None,
        };
        Some(Self {
            window_type: self.window_type,
            key_fn,
            init: self.init.try_clone()?,
            fold: self.fold.try_clone()?,
            pane_fn: self.pane_fn.try_clone()?,
            early_trigger: self.early_trigger.clone(),
            mode: self.mode,
        })
    }
}

impl fmt::Debug for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowSpec")
            .field("window_type", &self.window_type)
            .field("keyed", &self.key_fn.is_some())
            .field("early_trigger", &self.early_trigger)
            .field("mode", &self.mode)
            .finish()
    }
}
