use super::*;

// ── TimerService ──────────────────────────────────────────────────────────

#[test]
fn test_timer_drain_due_in_order() {
    let mut timers = TimerService::new();
    timers.register(b"b".to_vec(), 20);
    timers.register(b"a".to_vec(), 10);
    timers.register(b"c".to_vec(), 30);

    let due = timers.drain_due(20);
    assert_eq!(due, vec![(b"a".to_vec(), 10), (b"b".to_vec(), 20)]);
    assert_eq!(timers.len(), 1);
    assert_eq!(timers.next_timer(), Some(30));
}

#[test]
fn test_timer_register_is_idempotent() {
    let mut timers = TimerService::new();
    timers.register(b"k".to_vec(), 5);
    timers.register(b"k".to_vec(), 5);
    assert_eq!(timers.len(), 1);
}

#[test]
fn test_timer_delete_and_reschedule() {
    let mut timers = TimerService::new();
    timers.register(b"k".to_vec(), 5);
    timers.delete(b"missing", 5);
    assert_eq!(timers.len(), 1);

    timers.reschedule(b"k".to_vec(), 5, 15);
    assert!(timers.drain_due(10).is_empty());
    assert_eq!(timers.drain_due(15), vec![(b"k".to_vec(), 15)]);
    assert!(timers.is_empty());
}

#[test]
fn test_timer_drain_at_max_includes_max_bucket() {
    let mut timers = TimerService::new();
    timers.register(b"global".to_vec(), EVENT_TIME_MAX);
    timers.register(b"bounded".to_vec(), 100);
    assert_eq!(timers.drain_due(EVENT_TIME_MAX).len(), 2);
    assert!(timers.is_empty());
}

// ── Clocks ────────────────────────────────────────────────────────────────

#[test]
fn test_manual_clock_advances() {
    let clock = ManualClock::new(1_000);
    assert_eq!(clock.now(), 1_000);
    assert_eq!(clock.advance(Duration::from_secs(2)), 3_000);
    clock.set(10);
    assert_eq!(clock.now(), 10);
}

#[test]
fn test_system_clock_is_after_2020() {
    assert!(SystemClock.now() > 1_577_836_800_000);
}

#[test]
fn test_duration_ms_saturates() {
    assert_eq!(duration_ms(Duration::from_millis(1_500)), 1_500);
    assert_eq!(duration_ms(Duration::MAX), EVENT_TIME_MAX);
}
