use super::*;

struct Buffered {
    envelope: MessageEnvelope,
    expires_at: EventTime,
}

/// Latest message per key for one side of a join.
#[derive(Default)]
pub(crate) struct JoinBuffer {
    entries: HashMap<GroupKey, Buffered, RandomState>,
}

impl JoinBuffer {
    fn put(&mut self, key: GroupKey, envelope: MessageEnvelope, expires_at: EventTime) {
        self.entries.insert(
            key,
            Buffered {
                envelope,
                expires_at,
            },
        );
    }

    /// Entry for `key` unless it has expired by `now`.
    fn live(&self, key: &GroupKey, now: EventTime) -> Option<&MessageEnvelope> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| &entry.envelope)
    }

    fn expire(&mut self, now: EventTime) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Both buffers of one join, shared by its left and right partial joins.
pub(crate) struct JoinState {
    join_id: u32,
    ttl: EventTime,
    left: JoinBuffer,
    right: JoinBuffer,
}

impl JoinState {
    pub(crate) fn new(join_id: u32, ttl: Duration) -> Self {
        Self {
            join_id,
            ttl: duration_ms(ttl),
            left: JoinBuffer::default(),
            right: JoinBuffer::default(),
        }
    }

    /// Buffered entries across both sides, expired ones included until swept.
    pub(crate) fn len(&self) -> usize {
        self.left.len() + self.right.len()
    }

    pub(crate) fn expire(&mut self, now: EventTime) {
        let removed = self.left.expire(now) + self.right.expire(now);
        if removed > 0 {
            tracing::debug!("join {} expired {} buffered messages", self.join_id, removed);
        }
    }

    /// Store `envelope` as the latest on `side` and join it with the other side's
    /// live entry for `key`, if any. The join function always sees (left, right).
    fn correlate(
        &mut self,
        side: JoinSide,
        key: GroupKey,
        envelope: MessageEnvelope,
        now: EventTime,
        join_fn: &JoinFn,
    ) -> Result<Option<MessageEnvelope>> {
        let expires_at = now.saturating_add(self.ttl);
        let (own, other) = match side {
            JoinSide::Left => (&mut self.left, &self.right),
            JoinSide::Right => (&mut self.right, &self.left),
        };
        let joined = match other.live(&key, now) {
            Some(matched) => Some(match side {
                JoinSide::Left => join_fn(&envelope, matched)?,
                JoinSide::Right => join_fn(matched, &envelope)?,
            }),
            None => None,
        };
        own.put(key, envelope, expires_at);
        Ok(joined)
    }
}

/// One side of a join as compiled into a task.
pub(crate) struct PartialJoin {
    join_index: usize,
    side: JoinSide,
    key_fn: Arc<KeyFn>,
    join_fn: Arc<JoinFn>,
}

impl PartialJoin {
    pub(crate) fn new(
        join_index: usize,
        side: JoinSide,
        key_fn: Arc<KeyFn>,
        join_fn: Arc<JoinFn>,
    ) -> Self {
        Self {
            join_index,
            side,
            key_fn,
            join_fn,
        }
    }

    pub(crate) fn join_index(&self) -> usize {
        self.join_index
    }

    pub(crate) fn on_message(
        &self,
        name: &str,
        envelope: MessageEnvelope,
        now: EventTime,
        state: &mut JoinState,
        output: &mut Vec<MessageEnvelope>,
    ) -> Result<()> {
        let key = (self.key_fn)(&envelope)
            .with_context(|| format!("operator {name} failed to extract join key"))?;
        let joined = state
            .correlate(self.side, key, envelope, now, &*self.join_fn)
            .with_context(|| format!("operator {name} join function failed"))?;
        if let Some(joined) = joined {
            output.push(joined);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/join_tests.rs"]
mod tests;
