use super::*;

/// Deadline registry for one operator.
///
/// Deadlines are sorted by fire time in a `BTreeMap`, so the due ones come out with a
/// single range scan.
///
/// # Invariant
/// A `(key_bytes, fire_at)` pair is registered at most once; re-registering
/// the same pair is idempotent.
#[derive(Debug, Clone, Default)]
pub struct TimerService {
    /// fire_at -> serialized keys due at that time.
    timers: BTreeMap<EventTime, BTreeSet<Vec<u8>>>,
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key_bytes` to fire at `fire_at`.
    pub fn register(&mut self, key_bytes: Vec<u8>, fire_at: EventTime) {
        self.timers.entry(fire_at).or_default().insert(key_bytes);
    }

    /// Cancel a registration. No-op if the pair was never registered.
    pub fn delete(&mut self, key_bytes: &[u8], fire_at: EventTime) {
        if let Some(keys) = self.timers.get_mut(&fire_at) {
            keys.remove(key_bytes);
            if keys.is_empty() {
                self.timers.remove(&fire_at);
            }
        }
    }

    /// Move `key_bytes` from `old` to `new`.
    pub fn reschedule(&mut self, key_bytes: Vec<u8>, old: EventTime, new: EventTime) {
        if old != new {
            self.delete(&key_bytes, old);
        }
        self.register(key_bytes, new);
    }

    /// Drain every registration with `fire_at <= now`, in ascending `fire_at` order.
    pub fn drain_due(&mut self, now: EventTime) -> Vec<(Vec<u8>, EventTime)> {
        let pending = self.timers.split_off(&now.saturating_add(1));
        let mut due = std::mem::replace(&mut self.timers, pending);
        if now == EVENT_TIME_MAX {
            // split_off(MAX) kept the MAX bucket pending; it is due as well.
            due.append(&mut self.timers);
        }
        flatten(due)
    }

    /// Earliest pending deadline.
    pub fn next_timer(&self) -> Option<EventTime> {
        self.timers.keys().next().copied()
    }

    /// Number of registered `(key, fire_at)` pairs.
    pub fn len(&self) -> usize {
        self.timers.values().map(|keys| keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

fn flatten(due: BTreeMap<EventTime, BTreeSet<Vec<u8>>>) -> Vec<(Vec<u8>, EventTime)> {
    due.into_iter()
        .flat_map(|(fire_at, keys)| keys.into_iter().map(move |key| (key, fire_at)))
        .collect()
}
