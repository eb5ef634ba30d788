use super::*;

/// One stored message: encoded key and message plus the optional event time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub key: Vec<u8>,
    pub message: Vec<u8>,
    pub timestamp: Option<EventTime>,
}

type Partitions = Vec<Vec<RawMessage>>;

/// Partitioned, append-only streams held in memory.
///
/// Clones share the same streams, so a test can seed inputs, hand a clone to a
/// runner and read outputs afterwards.
#[derive(Debug, Clone, Default)]
pub struct InMemorySystem {
    streams: Arc<Mutex<HashMap<StreamId, Partitions>>>,
}

impl InMemorySystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_streams<T>(&self, f: impl FnOnce(&mut HashMap<StreamId, Partitions>) -> T) -> T {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut streams)
    }

    /// Create `stream` with `partitions` partitions. Existing streams are left as they are.
    pub fn create_stream(&self, stream: impl Into<StreamId>, partitions: u32) {
        let stream = stream.into();
        self.with_streams(|streams| {
            streams
                .entry(stream)
                .or_insert_with(|| vec![Vec::new(); partitions.max(1) as usize]);
        });
    }

    pub fn partition_count(&self, stream: &StreamId) -> Option<u32> {
        self.with_streams(|streams| streams.get(stream).map(|p| p.len() as u32))
    }

    /// Append to one partition, returning the new message's offset.
    pub fn append(&self, stream: &StreamId, partition: u32, raw: RawMessage) -> Result<u64> {
        self.with_streams(|streams| {
            let partitions = streams
                .get_mut(stream)
                .ok_or_else(|| anyhow!("stream {stream} does not exist"))?;
            let count = partitions.len();
            let log = partitions
                .get_mut(partition as usize)
                .ok_or_else(|| anyhow!("stream {stream} has {count} partitions, not {partition}"))?;
            log.push(raw);
            Ok(log.len() as u64 - 1)
        })
    }

    pub fn read(&self, stream: &StreamId, partition: u32, offset: u64) -> Option<RawMessage> {
        self.with_streams(|streams| {
            streams
                .get(stream)?
                .get(partition as usize)?
                .get(offset as usize)
                .cloned()
        })
    }

    /// Messages in one partition.
    pub fn len(&self, stream: &StreamId, partition: u32) -> u64 {
        self.with_streams(|streams| {
            streams
                .get(stream)
                .and_then(|p| p.get(partition as usize))
                .map_or(0, |log| log.len() as u64)
        })
    }

    /// Encode with bincode and append to the partition chosen by hashing the key bytes.
    pub fn send<K: StreamData, M: StreamData>(
        &self,
        stream: impl Into<StreamId>,
        key: K,
        message: M,
        timestamp: Option<EventTime>,
    ) -> Result<u64> {
        self.send_to_partition(stream, None, key, message, timestamp)
    }

    pub fn send_to_partition<K: StreamData, M: StreamData>(
        &self,
        stream: impl Into<StreamId>,
        partition: Option<u32>,
        key: K,
        message: M,
        timestamp: Option<EventTime>,
    ) -> Result<u64> {
        let stream = stream.into();
        let count = self
            .partition_count(&stream)
            .ok_or_else(|| anyhow!("stream {stream} does not exist"))?;
        let key = bincode::serialize(&key).context("encoding key")?;
        let message = bincode::serialize(&message).context("encoding message")?;
        let partition = match partition {
            Some(p) => p,
            None => HashPartitioner.partition(&key[..], count),
        };
        self.append(
            &stream,
            partition,
            RawMessage {
                key,
                message,
                timestamp,
            },
        )
    }

    /// Decode every message of `stream`, partition by partition.
    pub fn read_all<K: StreamData, M: StreamData>(
        &self,
        stream: impl Into<StreamId>,
    ) -> Result<Vec<(K, M)>> {
        let stream = stream.into();
        let raw: Vec<RawMessage> = self.with_streams(|streams| {
            streams
                .get(&stream)
                .map(|partitions| partitions.iter().flatten().cloned().collect())
                .unwrap_or_default()
        });
        raw.iter()
            .map(|m| {
                let key = bincode::deserialize(&m.key)
                    .with_context(|| format!("decoding key from {stream}"))?;
                let message = bincode::deserialize(&m.message)
                    .with_context(|| format!("decoding message from {stream}"))?;
                Ok((key, message))
            })
            .collect()
    }
}
