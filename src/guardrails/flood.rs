//! Per-session message-rate tracking.
//!
//! The [`FloodMonitor`] keeps a sliding window of recent message timestamps
//! per session. This is deliberately ephemeral, in-process, best-effort
//! state — it is not a durable rate-limit record, and it resets on restart.
//! A background sweep prunes idle sessions so memory stays bounded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Rolling window length.
pub const FLOOD_WINDOW: Duration = Duration::from_secs(60);

/// Maximum messages allowed inside one window; the next one is blocked.
pub const FLOOD_CEILING: usize = 15;

/// Sessions with no timestamp inside two windows are swept.
const IDLE_CUTOFF: Duration = Duration::from_secs(120);

/// User-facing slow-down message for flood blocks.
pub const FLOOD_REPLY: &str =
    "You're sending messages a little too quickly! Give me a moment to catch up, \
     then ask away.";

/// Tracks message timestamps per session inside a rolling window.
///
/// The timestamp map is the only in-process mutable shared state in the
/// pipeline; a plain mutex guards it against concurrent requests for the
/// same session.
#[derive(Debug, Default)]
pub struct FloodMonitor {
    sessions: Mutex<HashMap<String, Vec<Instant>>>,
}

impl FloodMonitor {
    /// Create an empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `session_id` now and report whether it exceeds
    /// the ceiling.
    ///
    /// The timestamp is recorded even when blocked, so the window keeps
    /// growing while abuse continues and self-corrects once traffic drops.
    pub fn record(&self, session_id: &str) -> bool {
        self.record_at(session_id, Instant::now())
    }

    /// [`FloodMonitor::record`] with an explicit clock, for deterministic tests.
    pub fn record_at(&self, session_id: &str, now: Instant) -> bool {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("flood monitor mutex poisoned; recovering");
                poisoned.into_inner()
            }
        };

        let stamps = sessions.entry(session_id.to_owned()).or_default();
        stamps.retain(|t| now.saturating_duration_since(*t) < FLOOD_WINDOW);
        stamps.push(now);
        stamps.len() > FLOOD_CEILING
    }

    /// Drop sessions with no activity inside two window-durations.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    /// [`FloodMonitor::sweep`] with an explicit clock, for deterministic tests.
    pub fn sweep_at(&self, now: Instant) {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = sessions.len();
        sessions.retain(|_, stamps| {
            stamps
                .last()
                .is_some_and(|t| now.saturating_duration_since(*t) < IDLE_CUTOFF)
        });
        let swept = before.saturating_sub(sessions.len());
        if swept > 0 {
            debug!(swept, remaining = sessions.len(), "flood monitor sweep");
        }
    }

    /// Number of tracked sessions (for tests and diagnostics).
    pub fn tracked_sessions(&self) -> usize {
        match self.sessions.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Spawn the background sweep on a fixed interval, independent of request
/// traffic. The task runs until the process exits.
pub fn spawn_sweeper(monitor: Arc<FloodMonitor>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(FLOOD_WINDOW);
        // The first tick fires immediately; harmless against an empty map.
        loop {
            tick.tick().await;
            monitor.sweep();
        }
    })
}
