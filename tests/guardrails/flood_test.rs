//! Flood monitor window and sweep behavior.

use std::time::{Duration, Instant};

use guardpost::guardrails::flood::{FloodMonitor, FLOOD_CEILING};

fn at(base: Instant, secs: u64) -> Instant {
    base.checked_add(Duration::from_secs(secs)).unwrap_or(base)
}

#[test]
fn messages_under_ceiling_pass() {
    let monitor = FloodMonitor::new();
    let base = Instant::now();
    for i in 0..FLOOD_CEILING {
        assert!(!monitor.record_at("s1", base), "message {i} should pass");
    }
}

#[test]
fn message_over_ceiling_is_blocked() {
    let monitor = FloodMonitor::new();
    let base = Instant::now();
    for _ in 0..FLOOD_CEILING {
        monitor.record_at("s1", base);
    }
    assert!(monitor.record_at("s1", base));
}

#[test]
fn window_expiry_resets_the_count() {
    let monitor = FloodMonitor::new();
    let base = Instant::now();
    for _ in 0..=FLOOD_CEILING {
        monitor.record_at("s1", base);
    }
    assert!(monitor.record_at("s1", at(base, 1)));
    // All stamps drop out of the window after 61 seconds.
    assert!(!monitor.record_at("s1", at(base, 61)));
}

#[test]
fn sessions_are_independent() {
    let monitor = FloodMonitor::new();
    let base = Instant::now();
    for _ in 0..=FLOOD_CEILING {
        monitor.record_at("loud", base);
    }
    assert!(monitor.record_at("loud", base));
    assert!(!monitor.record_at("quiet", base));
}

#[test]
fn sweep_drops_idle_sessions_only() {
    let monitor = FloodMonitor::new();
    let base = Instant::now();
    monitor.record_at("old", base);
    monitor.record_at("fresh", at(base, 100));
    assert_eq!(monitor.tracked_sessions(), 2);

    monitor.sweep_at(at(base, 150));
    assert_eq!(monitor.tracked_sessions(), 1);

    monitor.sweep_at(at(base, 400));
    assert_eq!(monitor.tracked_sessions(), 0);
}

#[test]
fn blocked_messages_still_extend_the_window() {
    let monitor = FloodMonitor::new();
    let base = Instant::now();
    for _ in 0..=FLOOD_CEILING {
        monitor.record_at("s1", base);
    }
    // Continued traffic at 30s keeps adding stamps, so the session is still
    // blocked at 65s even though the original burst has aged out.
    for _ in 0..=FLOOD_CEILING {
        monitor.record_at("s1", at(base, 30));
    }
    assert!(monitor.record_at("s1", at(base, 65)));
}
