//! Health-check record surface (spec.md §7): a read-only snapshot of
//! every venue session's state and counters, grounded on
//! `SessionMetrics::summary` in `scrapers/binance_session.rs`.

use crate::backoff::BackoffController;
use crate::session::{SessionManager, SessionState};

#[derive(Debug, Clone)]
pub struct VenueHealth {
    pub venue: String,
    pub state: SessionState,
    pub connect_attempts: u64,
    pub connect_successes: u64,
    pub reconnects: u64,
    pub auth_failures: u64,
    pub silence_events: u64,
    pub ping_failures: u64,
    pub backoff_paused: bool,
    pub backoff_remaining_secs: Option<u64>,
}

/// Builds a point-in-time health snapshot for one venue session. Never
/// blocks — every field is either an atomic load or a lock-free read.
pub fn venue_health(session: &SessionManager, backoff: &BackoffController) -> VenueHealth {
    use std::sync::atomic::Ordering;

    let metrics = session.metrics();
    let (paused, remaining) = match backoff.pause_info(session.venue()) {
        Some((_, remaining)) => (true, Some(remaining)),
        None => (false, None),
    };

    VenueHealth {
        venue: session.venue().to_string(),
        state: session.state(),
        connect_attempts: metrics.connect_attempts.load(Ordering::Relaxed),
        connect_successes: metrics.connect_successes.load(Ordering::Relaxed),
        reconnects: metrics.reconnects.load(Ordering::Relaxed),
        auth_failures: metrics.auth_failures.load(Ordering::Relaxed),
        silence_events: metrics.silence_events.load(Ordering::Relaxed),
        ping_failures: metrics.ping_failures.load(Ordering::Relaxed),
        backoff_paused: paused,
        backoff_remaining_secs: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionConfig, TransitionReason};

    #[test]
    fn health_reflects_session_state_and_backoff() {
        let session = SessionManager::new("edgex", SessionConfig::default());
        let backoff = BackoffController::new();

        session.transition(crate::session::SessionState::Connected, TransitionReason::ConnectSuccess);
        let health = venue_health(&session, &backoff);
        assert_eq!(health.state, SessionState::Connected);
        assert!(!health.backoff_paused);

        backoff.register_error("edgex", "429", "rate limited");
        let health = venue_health(&session, &backoff);
        assert!(health.backoff_paused);
        assert!(health.backoff_remaining_secs.unwrap() > 0);
    }
}
