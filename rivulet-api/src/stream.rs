use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use rivulet_core::codec::KvSerde;
use rivulet_core::functions::{
    FilterFn, FlatMapFn, GroupKey, JoinFn, KeyFn, MapFn, SinkFn, UserFn,
};
use rivulet_core::spec::{JoinSide, OperatorLogic, PartialJoinSpec, WindowPane};
use rivulet_core::task::{MessageCollector, TaskCoordinator};
use rivulet_core::types::{MessageEnvelope, OpId, StreamData, StreamId, Value};

use crate::application::{AppInner, OutputStream};
use crate::windows::Window;

/// Typed message of `envelope`, or an error naming both types.
pub(crate) fn message_of<M: 'static>(envelope: &MessageEnvelope) -> Result<&M> {
    envelope.message().downcast_ref::<M>().ok_or_else(|| {
        anyhow!(
            "expected message of type {}, got {}",
            std::any::type_name::<M>(),
            envelope.message().type_name()
        )
    })
}

pub(crate) fn key_fn<M, K, F>(f: F) -> Arc<KeyFn>
where
    M: StreamData,
    K: StreamData,
    F: Fn(&M) -> K + Send + Sync + 'static,
{
    Arc::new(move |envelope: &MessageEnvelope| -> Result<GroupKey> {
        GroupKey::of(f(message_of::<M>(envelope)?))
    })
}

/// A stream of messages of type `M` inside a [`StreamApplication`](crate::StreamApplication).
///
/// Handles are cheap to clone. Calling several operators on the same handle fans the
/// stream out; downstream operators see each message in the order they were added.
pub struct MessageStream<M> {
    app: Rc<RefCell<AppInner>>,
    op_id: OpId,
    _phantom: PhantomData<fn() -> M>,
}

impl<M> Clone for MessageStream<M> {
    fn clone(&self) -> Self {
        Self {
            app: Rc::clone(&self.app),
            op_id: self.op_id,
            _phantom: PhantomData,
        }
    }
}

impl<M: StreamData> MessageStream<M> {
    pub(crate) fn new(app: Rc<RefCell<AppInner>>, op_id: OpId) -> Self {
        Self {
            app,
            op_id,
            _phantom: PhantomData,
        }
    }

    /// Id of the operator producing this stream.
    pub fn op_id(&self) -> OpId {
        self.op_id
    }

    fn then<N: StreamData>(&self, logic: OperatorLogic) -> MessageStream<N> {
        let op_id = self.app.borrow_mut().chain(self.op_id, logic);
        MessageStream::new(Rc::clone(&self.app), op_id)
    }

    pub fn map<N, F>(&self, f: F) -> MessageStream<N>
    where
        N: StreamData,
        F: Fn(&M) -> N + Send + Sync + 'static,
    {
        self.try_map(move |m: &M| Ok(f(m)))
    }

    /// Like [`map`](Self::map) with a fallible function. An error fails the task.
    pub fn try_map<N, F>(&self, f: F) -> MessageStream<N>
    where
        N: StreamData,
        F: Fn(&M) -> Result<N> + Send + Sync + 'static,
    {
        let map: Arc<MapFn> = Arc::new(move |envelope: &MessageEnvelope| -> Result<MessageEnvelope> {
            let out = f(message_of::<M>(envelope)?)?;
            Ok(envelope.with_message(Value::new(out)))
        });
        self.then(OperatorLogic::Map(UserFn::shared(map)))
    }

    pub fn flat_map<N, I, F>(&self, f: F) -> MessageStream<N>
    where
        N: StreamData,
        I: IntoIterator<Item = N>,
        F: Fn(&M) -> I + Send + Sync + 'static,
    {
        let flat_map: Arc<FlatMapFn> =
            Arc::new(move |envelope: &MessageEnvelope| -> Result<Vec<MessageEnvelope>> {
                Ok(f(message_of::<M>(envelope)?)
                    .into_iter()
                    .map(|out| envelope.with_message(Value::new(out)))
                    .collect())
            });
        self.then(OperatorLogic::FlatMap(UserFn::shared(flat_map)))
    }

    pub fn filter<F>(&self, f: F) -> MessageStream<M>
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        let filter: Arc<FilterFn> =
            Arc::new(move |envelope: &MessageEnvelope| -> Result<bool> {
                Ok(f(message_of::<M>(envelope)?))
            });
        self.then(OperatorLogic::Filter(UserFn::shared(filter)))
    }

    /// Terminal operator handing each message to `f` with the task's collector and
    /// coordinator.
    pub fn sink<F>(&self, f: F)
    where
        F: Fn(&M, &mut dyn MessageCollector, &mut dyn TaskCoordinator) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        let sink: Arc<SinkFn> = Arc::new(
            move |envelope: &MessageEnvelope,
                  collector: &mut dyn MessageCollector,
                  coordinator: &mut dyn TaskCoordinator|
                  -> Result<()> { f(message_of::<M>(envelope)?, collector, coordinator) },
        );
        self.then::<M>(OperatorLogic::Sink(UserFn::shared(sink)));
    }

    /// Like [`sink`](Self::sink), with a fresh function from `factory` in every task.
    pub fn sink_per_task<S, G>(&self, factory: G)
    where
        S: Fn(&M, &mut dyn MessageCollector, &mut dyn TaskCoordinator) -> Result<()>
            + Send
            + Sync
            + 'static,
        G: Fn() -> S + Send + Sync + 'static,
    {
        let user_fn = UserFn::per_task(move || {
            let f = factory();
            let sink: Arc<SinkFn> = Arc::new(
                move |envelope: &MessageEnvelope,
                      collector: &mut dyn MessageCollector,
                      coordinator: &mut dyn TaskCoordinator|
                      -> Result<()> { f(message_of::<M>(envelope)?, collector, coordinator) },
            );
            sink
        });
        self.then::<M>(OperatorLogic::Sink(user_fn));
    }

    /// Terminal operator writing every message to `output`.
    pub fn send_to(&self, output: &OutputStream<M>) {
        self.then::<M>(OperatorLogic::SendTo {
            stream: output.stream.clone(),
        });
    }

    /// Group into panes and fold them with `window`.
    pub fn window<K, V>(&self, window: Window<M, K, V>) -> MessageStream<WindowPane<K, V>>
    where
        K: StreamData,
        V: StreamData,
    {
        self.then(OperatorLogic::Window(window.into_spec()))
    }

    /// Join with `other` on a shared key.
    ///
    /// Each side keeps its latest message per key for `ttl`; a message on either side
    /// that finds a live entry on the other emits `join_fn(this, other)`.
    pub fn join<O, K, JM, FK, FO, FJ>(
        &self,
        other: &MessageStream<O>,
        this_key: FK,
        other_key: FO,
        join_fn: FJ,
        ttl: Duration,
    ) -> MessageStream<JM>
    where
        O: StreamData,
        K: StreamData,
        JM: StreamData,
        FK: Fn(&M) -> K + Send + Sync + 'static,
        FO: Fn(&O) -> K + Send + Sync + 'static,
        FJ: Fn(&M, &O) -> JM + Send + Sync + 'static,
    {
        let join: Arc<JoinFn> =
            Arc::new(move |left: &MessageEnvelope, right: &MessageEnvelope| -> Result<MessageEnvelope> {
                let joined = join_fn(message_of::<M>(left)?, message_of::<O>(right)?);
                Ok(left.with_message(Value::new(joined)))
            });

        let mut app = self.app.borrow_mut();
        let join_id = app.graph.next_join_id();
        let left = app.chain(
            self.op_id,
            OperatorLogic::Join(PartialJoinSpec::new(
                join_id,
                JoinSide::Left,
                UserFn::shared(key_fn::<M, K, _>(this_key)),
                UserFn::shared(join.clone()),
                ttl,
            )),
        );
        let right = app.chain(
            other.op_id,
            OperatorLogic::Join(PartialJoinSpec::new(
                join_id,
                JoinSide::Right,
                UserFn::shared(key_fn::<O, K, _>(other_key)),
                UserFn::shared(join),
                ttl,
            )),
        );
        let merge = app.chain(left, OperatorLogic::Merge);
        app.connect(right, merge);
        drop(app);
        MessageStream::new(Rc::clone(&self.app), merge)
    }

    /// This stream and `others` as one.
    pub fn merge<'a>(&self, others: impl IntoIterator<Item = &'a MessageStream<M>>) -> MessageStream<M> {
        let mut app = self.app.borrow_mut();
        let merge = app.chain(self.op_id, OperatorLogic::Merge);
        for other in others {
            app.connect(other.op_id, merge);
        }
        drop(app);
        MessageStream::new(Rc::clone(&self.app), merge)
    }

    /// Re-key by `key` and route through an intermediate stream, so that every
    /// message with the same key reaches the same task.
    ///
    /// The intermediate stream is named `<application>-partition_by-<n>` and uses the
    /// `streams.<name>.partitions` (or `job.partitions`) partition count.
    pub fn partition_by<K, F>(&self, key: F) -> MessageStream<M>
    where
        K: StreamData,
        F: Fn(&M) -> K + Send + Sync + 'static,
    {
        let mut app = self.app.borrow_mut();
        app.intermediate_streams += 1;
        let stream = StreamId::new(format!(
            "{}-partition_by-{}",
            app.name, app.intermediate_streams
        ));
        let input = match app
            .graph
            .add_intermediate(stream.clone(), Some(KvSerde::bincode::<K, M>()))
        {
            Ok(input) => input,
            Err(err) => {
                app.record(err);
                return MessageStream::new(Rc::clone(&self.app), self.op_id);
            }
        };
        let partition_by = app.chain(
            self.op_id,
            OperatorLogic::PartitionBy {
                key_fn: UserFn::shared(key_fn::<M, K, _>(key)),
                stream: stream.clone(),
            },
        );
        app.chain(partition_by, OperatorLogic::Output { stream });
        drop(app);
        MessageStream::new(Rc::clone(&self.app), input)
    }
}
