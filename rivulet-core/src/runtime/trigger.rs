use super::*;

// ── TriggerState ──────────────────────────────────────────────────────────────

/// Progress of one early trigger for one pane.
///
/// `on_message` and `on_timer` return `true` when the trigger fires. A fired
/// non-repeating trigger stays done; `Repeat` restarts its inner trigger instead.
#[derive(Debug, Clone)]
pub(crate) enum TriggerState {
    Count {
        target: u64,
        seen: u64,
        fired: bool,
    },
    SinceFirst {
        delay: EventTime,
        first: Option<EventTime>,
        fired: bool,
    },
    SinceLast {
        gap: EventTime,
        last: Option<EventTime>,
        fired: bool,
    },
    Any {
        children: Vec<TriggerState>,
        fired: bool,
    },
    Repeat {
        definition: Trigger,
        inner: Box<TriggerState>,
    },
}

impl TriggerState {
    pub(crate) fn new(trigger: &Trigger) -> Self {
        match trigger {
            Trigger::Count(n) => TriggerState::Count {
                target: *n,
                seen: 0,
                fired: false,
            },
            Trigger::TimeSinceFirstMessage(delay) => TriggerState::SinceFirst {
                delay: duration_ms(*delay),
                first: None,
                fired: false,
            },
            Trigger::TimeSinceLastMessage(gap) => TriggerState::SinceLast {
                gap: duration_ms(*gap),
                last: None,
                fired: false,
            },
            Trigger::Any(children) => TriggerState::Any {
                children: children.iter().map(TriggerState::new).collect(),
                fired: false,
            },
            Trigger::Repeat(inner) => TriggerState::Repeat {
                definition: (**inner).clone(),
                inner: Box::new(TriggerState::new(inner)),
            },
        }
    }

    /// A message arrived at `now`.
    pub(crate) fn on_message(&mut self, now: EventTime) -> bool {
        match self {
            TriggerState::Count {
                target,
                seen,
                fired,
            } => {
                if *fired {
                    return false;
                }
                *seen += 1;
                *fired = *seen >= *target;
                *fired
            }
            TriggerState::SinceFirst {
                delay,
                first,
                fired,
            } => {
                if *fired {
                    return false;
                }
                let started = *first.get_or_insert(now);
                *fired = now.saturating_sub(started) >= *delay;
                *fired
            }
            TriggerState::SinceLast { gap, last, fired } => {
                if *fired {
                    return false;
                }
                *last = Some(now);
                *fired = *gap <= 0;
                *fired
            }
            TriggerState::Any { children, fired } => {
                if *fired {
                    return false;
                }
                // every child observes the message
                let any = children
                    .iter_mut()
                    .fold(false, |acc, child| child.on_message(now) | acc);
                *fired = any;
                any
            }
            TriggerState::Repeat { definition, inner } => {
                let fire = inner.on_message(now);
                if fire {
                    **inner = TriggerState::new(definition);
                }
                fire
            }
        }
    }

    /// Periodic timer call at `now`.
    pub(crate) fn on_timer(&mut self, now: EventTime) -> bool {
        match self {
            TriggerState::Count { .. } => false,
            TriggerState::SinceFirst {
                delay,
                first,
                fired,
            } => match first {
                Some(started) if !*fired && now.saturating_sub(*started) >= *delay => {
                    *fired = true;
                    true
                }
                _ => false,
            },
            TriggerState::SinceLast { gap, last, fired } => match last {
                Some(seen) if !*fired && now.saturating_sub(*seen) >= *gap => {
                    *fired = true;
                    true
                }
                _ => false,
            },
            TriggerState::Any { children, fired } => {
                if *fired {
                    return false;
                }
                let any = children
                    .iter_mut()
                    .fold(false, |acc, child| child.on_timer(now) | acc);
                *fired = any;
                any
            }
            TriggerState::Repeat { definition, inner } => {
                let fire = inner.on_timer(now);
                if fire {
                    **inner = TriggerState::new(definition);
                }
                fire
            }
        }
    }

    /// A fired non-repeating trigger never fires again.
    pub(crate) fn is_done(&self) -> bool {
        match self {
            TriggerState::Count { fired, .. }
            | TriggerState::SinceFirst { fired, .. }
            | TriggerState::SinceLast { fired, .. }
            | TriggerState::Any { fired, .. } => *fired,
            TriggerState::Repeat { .. } => false,
        }
    }
}
