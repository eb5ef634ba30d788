use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::types::EventTime;

mod clock;
mod timer_service;

pub use clock::*;
pub use timer_service::*;

/// Earliest representable event time.
pub const EVENT_TIME_MIN: EventTime = EventTime::MIN;
/// Latest representable event time. Panes ending here never close on a timer.
pub const EVENT_TIME_MAX: EventTime = EventTime::MAX;

/// Milliseconds in `duration`, saturating at [`EVENT_TIME_MAX`].
pub fn duration_ms(duration: Duration) -> EventTime {
    EventTime::try_from(duration.as_millis()).unwrap_or(EVENT_TIME_MAX)
}

#[cfg(test)]
#[path = "tests/time_tests.rs"]
mod tests;
