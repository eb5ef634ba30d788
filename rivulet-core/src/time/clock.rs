use super::*;

/// Wall-clock source for a task. Drives pane deadlines, join expiry and the
/// timestamp of messages that carry none.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> EventTime;
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> EventTime {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(duration_ms)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to. Shared through an `Arc` between the code
/// under test and the tasks reading it.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: EventTime) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: EventTime) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by `by` and return the new time.
    pub fn advance(&self, by: Duration) -> EventTime {
        let by = duration_ms(by);
        self.now.fetch_add(by, Ordering::SeqCst) + by
    }
}

impl Clock for ManualClock {
    fn now(&self) -> EventTime {
        self.now.load(Ordering::SeqCst)
    }
}
