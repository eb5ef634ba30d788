use std::any::Any;
use std::fmt;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Event time in milliseconds since epoch.
pub type EventTime = i64;

/// Identifier of an operator spec, unique within one application.
pub type OpId = u32;

/// Name of a physical or intermediate stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StreamId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// One partition of a stream, the unit of work assigned to a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamPartition {
    pub stream: StreamId,
    pub partition: u32,
}

impl StreamPartition {
    pub fn new(stream: impl Into<StreamId>, partition: u32) -> Self {
        Self {
            stream: stream.into(),
            partition,
        }
    }
}

impl fmt::Display for StreamPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stream, self.partition)
    }
}

/// Trait bound for types that can cross a stream boundary.
pub trait StreamData: Send + Sync + Clone + Serialize + for<'de> Deserialize<'de> + 'static {}

impl<T> StreamData for T where T: Send + Sync + Clone + Serialize + for<'de> Deserialize<'de> + 'static
{}

// --- Type-erased cloneable value ---

/// Trait object that supports Any + Clone + Send.
pub trait CloneableAny: Any + Send {
    fn clone_box(&self) -> Box<dyn CloneableAny>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn type_name(&self) -> &'static str;
}

impl<T: Clone + Send + 'static> CloneableAny for T {
    fn clone_box(&self) -> Box<dyn CloneableAny> {
        Box::new(self.clone())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A cloneable, type-erased payload. Keys and messages travel through the
/// operator graph as `Value`s once decoded at the stream boundary.
pub struct Value(Box<dyn CloneableAny>);

impl Value {
    pub fn new<T: Clone + Send + 'static>(val: T) -> Self {
        Self(Box::new(val))
    }

    /// Reference to the inner value as `T`, or `None` on mismatch.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.0.as_any().is::<T>()
    }

    /// Unwrap the inner value, failing on type mismatch.
    pub fn downcast<T: 'static>(self) -> Result<T> {
        let found = self.0.type_name();
        self.0.into_any().downcast::<T>().map(|b| *b).map_err(|_| {
            anyhow!(
                "value type mismatch: expected {}, found {}",
                std::any::type_name::<T>(),
                found
            )
        })
    }

    /// Name of the concrete type held.
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value(<{}>)", self.0.type_name())
    }
}

// --- Envelopes ---

/// A keyed message flowing through the operator graph.
///
/// Never mutated during propagation: operators derive new envelopes with
/// [`with_message`](Self::with_message) or [`rekey`](Self::rekey).
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    key: Value,
    message: Value,
    offset: Option<String>,
    partition: Option<u32>,
    timestamp: Option<EventTime>,
}

impl MessageEnvelope {
    pub fn new(key: Value, message: Value) -> Self {
        Self {
            key,
            message,
            offset: None,
            partition: None,
            timestamp: None,
        }
    }

    /// Build an envelope from concrete key and message values.
    pub fn of<K, M>(key: K, message: M) -> Self
    where
        K: Clone + Send + 'static,
        M: Clone + Send + 'static,
    {
        Self::new(Value::new(key), Value::new(message))
    }

    pub fn with_offset(mut self, offset: impl Into<String>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    pub fn with_partition(mut self, partition: u32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_timestamp(mut self, timestamp: EventTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn message(&self) -> &Value {
        &self.message
    }

    pub fn offset(&self) -> Option<&str> {
        self.offset.as_deref()
    }

    pub fn partition(&self) -> Option<u32> {
        self.partition
    }

    pub fn timestamp(&self) -> Option<EventTime> {
        self.timestamp
    }

    /// New envelope carrying `message`, keeping key and positional metadata.
    pub fn with_message(&self, message: Value) -> Self {
        Self {
            key: self.key.clone(),
            message,
            offset: self.offset.clone(),
            partition: self.partition,
            timestamp: self.timestamp,
        }
    }

    /// New envelope with a different key, routed to `partition`.
    pub fn rekey(&self, key: Value, partition: u32) -> Self {
        Self {
            key,
            message: self.message.clone(),
            offset: self.offset.clone(),
            partition: Some(partition),
            timestamp: self.timestamp,
        }
    }

    pub fn into_parts(self) -> (Value, Value) {
        (self.key, self.message)
    }
}

/// A decoded message as delivered to a task by its input system.
#[derive(Debug, Clone)]
pub struct IncomingMessageEnvelope {
    pub stream_partition: StreamPartition,
    pub offset: String,
    pub key: Value,
    pub message: Value,
    pub timestamp: Option<EventTime>,
}

impl IncomingMessageEnvelope {
    pub fn new(
        stream_partition: StreamPartition,
        offset: impl Into<String>,
        key: Value,
        message: Value,
    ) -> Self {
        Self {
            stream_partition,
            offset: offset.into(),
            key,
            message,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: EventTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn stream(&self) -> &StreamId {
        &self.stream_partition.stream
    }

    /// Strip the stream identity, keeping offset, partition and timestamp.
    pub fn into_envelope(self) -> MessageEnvelope {
        let envelope = MessageEnvelope::new(self.key, self.message)
            .with_offset(self.offset)
            .with_partition(self.stream_partition.partition);
        match self.timestamp {
            Some(ts) => envelope.with_timestamp(ts),
            None => envelope,
        }
    }
}

/// A message handed to the output collector, tagged with its destination.
///
/// `partition == None` lets the system pick a partition from the key.
#[derive(Debug, Clone)]
pub struct OutgoingMessageEnvelope {
    pub stream: StreamId,
    pub partition: Option<u32>,
    pub key: Value,
    pub message: Value,
    pub timestamp: Option<EventTime>,
}

impl OutgoingMessageEnvelope {
    pub fn new(stream: impl Into<StreamId>, key: Value, message: Value) -> Self {
        Self {
            stream: stream.into(),
            partition: None,
            key,
            message,
            timestamp: None,
        }
    }

    /// Address `envelope` to `stream`, keeping its partition and timestamp.
    pub fn from_envelope(stream: StreamId, envelope: MessageEnvelope) -> Self {
        let partition = envelope.partition;
        let timestamp = envelope.timestamp;
        let (key, message) = envelope.into_parts();
        Self {
            stream,
            partition,
            key,
            message,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_downcast() {
        let v = Value::new(42i32);
        assert!(v.is::<i32>());
        assert_eq!(v.downcast_ref::<i32>(), Some(&42));
        assert_eq!(v.downcast_ref::<String>(), None);
        assert_eq!(v.downcast::<i32>().unwrap(), 42);
    }

    #[test]
    fn test_value_downcast_mismatch_reports_types() {
        let err = Value::new("x".to_string()).downcast::<u64>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("u64"), "{msg}");
        assert!(msg.contains("String"), "{msg}");
    }

    #[test]
    fn test_value_clone_is_deep() {
        let v = Value::new(vec![1, 2, 3]);
        let copy = v.clone();
        let mut inner = copy.downcast::<Vec<i32>>().unwrap();
        inner.push(4);
        assert_eq!(v.downcast_ref::<Vec<i32>>().unwrap().len(), 3);
    }

    #[test]
    fn test_incoming_into_envelope_keeps_metadata() {
        let incoming = IncomingMessageEnvelope::new(
            StreamPartition::new("page-views", 3),
            "17",
            Value::new("m1".to_string()),
            Value::new(1u32),
        )
        .with_timestamp(5_000);

        let envelope = incoming.into_envelope();
        assert_eq!(envelope.offset(), Some("17"));
        assert_eq!(envelope.partition(), Some(3));
        assert_eq!(envelope.timestamp(), Some(5_000));
        assert_eq!(envelope.key().downcast_ref::<String>().unwrap(), "m1");
    }

    #[test]
    fn test_with_message_keeps_key() {
        let envelope = MessageEnvelope::of("k".to_string(), 1i32).with_timestamp(10);
        let mapped = envelope.with_message(Value::new(2i32));
        assert_eq!(mapped.key().downcast_ref::<String>().unwrap(), "k");
        assert_eq!(mapped.message().downcast_ref::<i32>(), Some(&2));
        assert_eq!(mapped.timestamp(), Some(10));
        // original untouched
        assert_eq!(envelope.message().downcast_ref::<i32>(), Some(&1));
    }

    #[test]
    fn test_stream_data_trait() {
        fn assert_stream_data<T: StreamData>() {}
        assert_stream_data::<i32>();
        assert_stream_data::<String>();
        assert_stream_data::<(String, Vec<String>)>();
    }
}
