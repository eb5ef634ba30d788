//! User functions carried by operator specs.
//!
//! Specs store functions behind a [`UserFn`] handle, which decides what happens when
//! the spec graph is cloned for another task: shared stateless closures are reused,
//! per-task functions are rebuilt from their factory, pinned functions refuse to be
//! copied.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::spec::WindowPane;
use crate::task::{MessageCollector, TaskCoordinator};
use crate::types::{MessageEnvelope, StreamData, Value};

pub type MapFn = dyn Fn(&MessageEnvelope) -> Result<MessageEnvelope> + Send + Sync;
pub type FlatMapFn = dyn Fn(&MessageEnvelope) -> Result<Vec<MessageEnvelope>> + Send + Sync;
pub type FilterFn = dyn Fn(&MessageEnvelope) -> Result<bool> + Send + Sync;
pub type SinkFn = dyn Fn(&MessageEnvelope, &mut dyn MessageCollector, &mut dyn TaskCoordinator) -> Result<()>
    + Send
    + Sync;
pub type KeyFn = dyn Fn(&MessageEnvelope) -> Result<GroupKey> + Send + Sync;
pub type InitFn = dyn Fn() -> Value + Send + Sync;
pub type FoldFn = dyn Fn(&MessageEnvelope, Value) -> Result<Value> + Send + Sync;
/// Merge of a matched pair, always called as `(left, right)`.
pub type JoinFn = dyn Fn(&MessageEnvelope, &MessageEnvelope) -> Result<MessageEnvelope> + Send + Sync;
/// Converts an erased window pane into the message emitted downstream.
pub type PaneFn = dyn Fn(WindowPane<Value, Value>) -> Result<Value> + Send + Sync;

enum Repr<F: ?Sized> {
    Shared(Arc<F>),
    PerTask {
        instance: Arc<F>,
        factory: Arc<dyn Fn() -> Arc<F> + Send + Sync>,
    },
    Pinned(Arc<F>),
}

/// Handle to a user function stored in an operator spec.
pub struct UserFn<F: ?Sized> {
    repr: Repr<F>,
}

impl<F: ?Sized> UserFn<F> {
    /// A stateless function; every task clone calls the same instance.
    pub fn shared(f: Arc<F>) -> Self {
        Self {
            repr: Repr::Shared(f),
        }
    }

    /// A stateful function; each task clone gets a fresh instance from `factory`.
    pub fn per_task(factory: impl Fn() -> Arc<F> + Send + Sync + 'static) -> Self {
        let factory: Arc<dyn Fn() -> Arc<F> + Send + Sync> = Arc::new(factory);
        Self {
            repr: Repr::PerTask {
                instance: factory(),
                factory,
            },
        }
    }

    /// A function that must not be duplicated. Cloning a graph holding one fails.
    pub fn pinned(f: Arc<F>) -> Self {
        Self {
            repr: Repr::Pinned(f),
        }
    }

    pub fn get(&self) -> &F {
        match &self.repr {
            Repr::Shared(f) | Repr::Pinned(f) => &**f,
            Repr::PerTask { instance, .. } => &**instance,
        }
    }

    pub(crate) fn instance(&self) -> Arc<F> {
        match &self.repr {
            Repr::Shared(f) | Repr::Pinned(f) => Arc::clone(f),
            Repr::PerTask { instance, .. } => Arc::clone(instance),
        }
    }

    pub fn is_copyable(&self) -> bool {
        !matches!(self.repr, Repr::Pinned(_))
    }

    /// Copy for another task. `None` for pinned functions.
    pub fn try_clone(&self) -> Option<Self> {
        let repr = match &self.repr {
            Repr::Shared(f) => Repr::Shared(Arc::clone(f)),
            Repr::PerTask { factory, .. } => Repr::PerTask {
                instance: factory(),
                factory: Arc::clone(factory),
            },
            Repr::Pinned(_) => return None,
        };
        Some(Self { repr })
    }
}

impl<F: ?Sized> From<Arc<F>> for UserFn<F> {
    fn from(f: Arc<F>) -> Self {
        Self::shared(f)
    }
}

impl<F: ?Sized> fmt::Debug for UserFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.repr {
            Repr::Shared(_) => "shared",
            Repr::PerTask { .. } => "per-task",
            Repr::Pinned(_) => "pinned",
        };
        write!(f, "UserFn({kind})")
    }
}

/// A grouping or join key: the key value plus its bincode bytes.
///
/// Equality and hashing use the bytes, so keys produced on different streams match
/// whenever they serialize identically.
#[derive(Clone)]
pub struct GroupKey {
    bytes: Vec<u8>,
    value: Value,
}

impl GroupKey {
    pub fn of<K: StreamData>(key: K) -> Result<Self> {
        let bytes = bincode::serialize(&key)
            .with_context(|| format!("serializing key {}", std::any::type_name::<K>()))?;
        Ok(Self {
            bytes,
            value: Value::new(key),
        })
    }

    /// The single key used by windows without a key function.
    pub fn unit() -> Self {
        Self {
            bytes: Vec::new(),
            value: Value::new(()),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupKey")
            .field("bytes", &self.bytes)
            .field("type", &self.value.type_name())
            .finish()
    }
}
