use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rivulet_core::functions::{FoldFn, InitFn, PaneFn, UserFn};
use rivulet_core::spec::{AccumulationMode, Trigger, WindowKey, WindowPane, WindowSpec, WindowType};
use rivulet_core::types::{MessageEnvelope, StreamData, Value};

use crate::stream::{key_fn, message_of};

/// A typed window definition: messages `M` grouped by key `K`, folded into `V`.
///
/// Built with [`Windows`]; applied with [`MessageStream::window`](crate::MessageStream::window).
pub struct Window<M, K, V> {
    spec: WindowSpec,
    _phantom: PhantomData<fn(M) -> (K, V)>,
}

impl<M, K, V> Window<M, K, V>
where
    M: StreamData,
    K: StreamData,
    V: StreamData,
{
    fn new(
        window_type: WindowType,
        init: impl Fn() -> V + Send + Sync + 'static,
        fold: impl Fn(&M, V) -> V + Send + Sync + 'static,
    ) -> Self {
        let init: Arc<InitFn> = Arc::new(move || Value::new(init()));
        let fold: Arc<FoldFn> = Arc::new(move |envelope: &MessageEnvelope, acc: Value| -> Result<Value> {
            let acc = acc.downcast::<V>()?;
            Ok(Value::new(fold(message_of::<M>(envelope)?, acc)))
        });
        let pane: Arc<PaneFn> = Arc::new(|pane: WindowPane<Value, Value>| -> Result<Value> {
            let (window_key, value, firing) = pane.into_parts();
            let pane_id = window_key.pane_id().map(str::to_string);
            let key = window_key.into_key().downcast::<K>()?;
            let typed = WindowPane::new(WindowKey::new(key, pane_id), value.downcast::<V>()?, firing);
            Ok(Value::new(typed))
        });
        let spec = WindowSpec::new(window_type, UserFn::shared(init), UserFn::shared(fold))
            .with_pane_fn(UserFn::shared(pane));
        Self {
            spec,
            _phantom: PhantomData,
        }
    }

    fn keyed(mut self, key: impl Fn(&M) -> K + Send + Sync + 'static) -> Self {
        self.spec = self
            .spec
            .with_key_fn(UserFn::shared(key_fn::<M, K, _>(key)));
        self
    }

    /// Fire partial results before the pane closes.
    pub fn early_trigger(mut self, trigger: Trigger) -> Self {
        self.spec = self.spec.with_early_trigger(trigger);
        self
    }

    pub fn accumulation_mode(mut self, mode: AccumulationMode) -> Self {
        self.spec = self.spec.with_accumulation_mode(mode);
        self
    }

    pub(crate) fn into_spec(self) -> WindowSpec {
        self.spec
    }
}

/// Constructors for [`Window`] definitions.
pub struct Windows;

impl Windows {
    /// Fixed-width panes per key.
    pub fn keyed_tumbling<M, K, V>(
        key: impl Fn(&M) -> K + Send + Sync + 'static,
        width: Duration,
        init: impl Fn() -> V + Send + Sync + 'static,
        fold: impl Fn(&M, V) -> V + Send + Sync + 'static,
    ) -> Window<M, K, V>
    where
        M: StreamData,
        K: StreamData,
        V: StreamData,
    {
        Window::new(WindowType::Tumbling { width }, init, fold).keyed(key)
    }

    /// Fixed-width panes over the whole stream.
    pub fn tumbling<M, V>(
        width: Duration,
        init: impl Fn() -> V + Send + Sync + 'static,
        fold: impl Fn(&M, V) -> V + Send + Sync + 'static,
    ) -> Window<M, (), V>
    where
        M: StreamData,
        V: StreamData,
    {
        Window::new(WindowType::Tumbling { width }, init, fold)
    }

    /// Per-key sessions that close after `gap` without messages.
    pub fn keyed_session<M, K, V>(
        key: impl Fn(&M) -> K + Send + Sync + 'static,
        gap: Duration,
        init: impl Fn() -> V + Send + Sync + 'static,
        fold: impl Fn(&M, V) -> V + Send + Sync + 'static,
    ) -> Window<M, K, V>
    where
        M: StreamData,
        K: StreamData,
        V: StreamData,
    {
        Window::new(WindowType::Session { gap }, init, fold).keyed(key)
    }

    /// One never-closing pane per key; emits on early triggers and on flush.
    pub fn keyed_global<M, K, V>(
        key: impl Fn(&M) -> K + Send + Sync + 'static,
        init: impl Fn() -> V + Send + Sync + 'static,
        fold: impl Fn(&M, V) -> V + Send + Sync + 'static,
    ) -> Window<M, K, V>
    where
        M: StreamData,
        K: StreamData,
        V: StreamData,
    {
        Window::new(WindowType::Global, init, fold).keyed(key)
    }
}
