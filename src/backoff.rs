//! Backoff Controller (C2, spec.md §4.2).
//!
//! Tracks per-venue error streaks (invalid-nonce, rate-limit) and derives
//! an exponentially growing pause window from them, mirroring
//! `error_backoff_controller.py`'s constants exactly: 120s minimum, ×2.0
//! per consecutive error, 3600s ceiling, and a 1800s silence window after
//! which the streak resets to first-error severity. A restart hook may be
//! registered per venue and is throttled to at most once per 30s, the
//! same shape as the teacher's `BackoffCalculator`/`SessionMetrics` pair
//! in `scrapers/binance_session.rs` but driven by wall-clock error
//! bookkeeping instead of connection-attempt counting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

const MIN_BACKOFF: Duration = Duration::from_secs(120);
const MAX_BACKOFF: Duration = Duration::from_secs(3600);
const BACKOFF_MULTIPLIER: f64 = 2.0;
const ERROR_RESET_WINDOW: Duration = Duration::from_secs(1800);
const RESTART_HOOK_THROTTLE: Duration = Duration::from_secs(30);

/// Error classes the controller reacts to (spec.md §4.2 "Triggers").
/// Any other error code is ignored by `register_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    InvalidNonce,
    RateLimit,
    RateLimitL1,
}

impl ErrorClass {
    /// Classifies a raw error code/message the way
    /// `ErrorBackoffController._parse_error_type` does: substring match,
    /// not exact equality, since venues embed the code in longer strings.
    pub fn classify(code: &str, message: &str) -> Option<Self> {
        if code.contains("21104") {
            return Some(Self::InvalidNonce);
        }
        if code.contains("429") {
            return Some(Self::RateLimit);
        }
        if code.contains("23000") || message.to_lowercase().contains("too many requests") {
            return Some(Self::RateLimitL1);
        }
        None
    }

    fn label(self) -> &'static str {
        match self {
            Self::InvalidNonce => "21104",
            Self::RateLimit => "429",
            Self::RateLimitL1 => "23000",
        }
    }
}

struct BackoffState {
    error_class: ErrorClass,
    error_count: u32,
    last_error_at: Instant,
    pause_until: Instant,
    recovery_logged: bool,
}

/// Per-venue restart hook, invoked at most once every 30s on a nonce
/// error (spec.md §4.2 "Restart hook"). `Arc`-wrapped so a clone can be
/// taken out from under the state lock and called after it drops.
pub type RestartHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    states: HashMap<String, BackoffState>,
    restart_hooks: HashMap<String, RestartHook>,
    last_restart_at: HashMap<String, Instant>,
}

/// Thread-safe, one instance shared across all venue sessions.
pub struct BackoffController {
    inner: Mutex<Inner>,
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffController {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn set_restart_hook(&self, venue: &str, hook: RestartHook) {
        self.inner
            .lock()
            .restart_hooks
            .insert(venue.to_lowercase(), hook);
    }

    /// Registers an error and recomputes the pause window. No-op if
    /// `code`/`message` don't match a recognized error class.
    pub fn register_error(&self, venue: &str, code: &str, message: &str) {
        let Some(error_class) = ErrorClass::classify(code, message) else {
            return;
        };

        let venue_key = venue.to_lowercase();
        let now = Instant::now();

        // The restart hook must run without the state lock held, so the
        // decision of whether to fire it is made inside the locked
        // section but the call itself happens after the guard drops.
        let mut hook_to_fire: Option<RestartHook> = None;

        {
            let mut inner = self.inner.lock();

            let (error_count, pause_duration) = match inner.states.get(&venue_key) {
                None => (1, MIN_BACKOFF),
                Some(state) => {
                    if now.duration_since(state.last_error_at) > ERROR_RESET_WINDOW {
                        info!(
                            venue = %venue,
                            idle_secs = now.duration_since(state.last_error_at).as_secs(),
                            "backoff streak reset after quiet window"
                        );
                        (1, MIN_BACKOFF)
                    } else {
                        let count = state.error_count + 1;
                        let scaled = MIN_BACKOFF.as_secs_f64()
                            * BACKOFF_MULTIPLIER.powi(count as i32 - 1);
                        (count, Duration::from_secs_f64(scaled).min(MAX_BACKOFF))
                    }
                }
            };

            let pause_until = now + pause_duration;
            inner.states.insert(
                venue_key.clone(),
                BackoffState {
                    error_class,
                    error_count,
                    last_error_at: now,
                    pause_until,
                    recovery_logged: false,
                },
            );

            if error_class == ErrorClass::InvalidNonce {
                let last = inner.last_restart_at.get(&venue_key).copied();
                if last.map(|t| now.duration_since(t) >= RESTART_HOOK_THROTTLE).unwrap_or(true) {
                    if let Some(hook) = inner.restart_hooks.get(&venue_key).cloned() {
                        inner.last_restart_at.insert(venue_key.clone(), now);
                        hook_to_fire = Some(hook);
                    }
                }
            }

            warn!(
                venue = %venue,
                error = error_class.label(),
                count = error_count,
                pause_secs = pause_duration.as_secs(),
                "venue paused by backoff controller"
            );
        }

        if let Some(hook) = hook_to_fire {
            hook();
        }
    }

    /// True while the venue is within its pause window. Transitions out
    /// of pause are logged exactly once (spec.md §4.2 "Recovery log").
    pub fn is_paused(&self, venue: &str) -> bool {
        let venue_key = venue.to_lowercase();
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let Some(state) = inner.states.get_mut(&venue_key) else {
            return false;
        };

        if now < state.pause_until {
            return true;
        }

        if !state.recovery_logged {
            info!(
                venue = %venue,
                error = state.error_class.label(),
                count = state.error_count,
                "backoff pause ended, resuming normal operation"
            );
            state.recovery_logged = true;
        }

        false
    }

    /// Returns `(reason, remaining_secs)` while paused, `None` otherwise.
    pub fn pause_info(&self, venue: &str) -> Option<(String, u64)> {
        let venue_key = venue.to_lowercase();
        let now = Instant::now();
        let inner = self.inner.lock();
        let state = inner.states.get(&venue_key)?;

        if now >= state.pause_until {
            return None;
        }

        let remaining = (state.pause_until - now).as_secs();
        let reason = format!(
            "{} error (×{} consecutive)",
            state.error_class.label(),
            state.error_count
        );
        Some((reason, remaining))
    }

    pub fn reset(&self, venue: &str) {
        self.inner.lock().states.remove(&venue.to_lowercase());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn first_error_pauses_for_minimum_window() {
        let ctrl = BackoffController::new();
        ctrl.register_error("edgex", "21104", "invalid nonce");
        assert!(ctrl.is_paused("edgex"));
        let (_, remaining) = ctrl.pause_info("edgex").unwrap();
        assert!(remaining <= 120 && remaining > 110);
    }

    #[test]
    fn consecutive_errors_escalate_exponentially() {
        let ctrl = BackoffController::new();
        ctrl.register_error("lighter", "429", "");
        ctrl.register_error("lighter", "429", "");
        let (_, remaining) = ctrl.pause_info("lighter").unwrap();
        // second error: 120 * 2^1 = 240s
        assert!(remaining > 200 && remaining <= 240);
    }

    #[test]
    fn unrecognized_error_code_is_ignored() {
        let ctrl = BackoffController::new();
        ctrl.register_error("edgex", "500", "internal error");
        assert!(!ctrl.is_paused("edgex"));
    }

    #[test]
    fn restart_hook_fires_on_nonce_error_and_is_throttled() {
        let ctrl = BackoffController::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        ctrl.set_restart_hook("lighter", Arc::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        ctrl.register_error("lighter", "21104", "nonce too low");
        ctrl.register_error("lighter", "21104", "nonce too low");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restart_hook_may_reenter_the_controller_without_deadlocking() {
        let ctrl = Arc::new(BackoffController::new());
        let ctrl_clone = ctrl.clone();
        ctrl.set_restart_hook(
            "lighter",
            Arc::new(move || {
                // the hook must run with the state lock released, or this
                // re-entrant call would deadlock.
                ctrl_clone.reset("lighter");
            }),
        );
        ctrl.register_error("lighter", "21104", "nonce too low");
        assert!(!ctrl.is_paused("lighter"));
    }

    #[test]
    fn reset_clears_state() {
        let ctrl = BackoffController::new();
        ctrl.register_error("edgex", "429", "");
        ctrl.reset("edgex");
        assert!(!ctrl.is_paused("edgex"));
        assert!(ctrl.pause_info("edgex").is_none());
    }
}
