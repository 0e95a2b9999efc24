//! End-to-end seed scenario: reconnect after silence — fixed-then-
//! exponential schedule and subscription persistence across reconnects.

use std::time::Duration;

use arb_collector::session::{SessionManager, SessionConfig, SessionState, TransitionReason};

#[test]
fn reconnect_schedule_matches_first_attempts_then_doubles() {
    let session = SessionManager::new("edgex", SessionConfig::default());

    let expected = [0u64, 1, 2, 4, 8, 16, 32];
    for secs in expected {
        assert_eq!(session.next_reconnect_delay(), Duration::from_secs(secs));
    }
}

#[test]
fn reconnect_schedule_resets_on_successful_connect() {
    let session = SessionManager::new("lighter", SessionConfig::default());

    session.next_reconnect_delay();
    session.next_reconnect_delay();
    assert_eq!(session.next_reconnect_delay(), Duration::from_secs(2));

    session.transition(SessionState::Connected, TransitionReason::ConnectSuccess);
    assert_eq!(session.next_reconnect_delay(), Duration::from_secs(0));
}

#[test]
fn silence_transition_moves_session_to_error_state() {
    let session = SessionManager::new("edgex", SessionConfig::default());
    session.transition(SessionState::Connected, TransitionReason::ConnectSuccess);
    session.transition(SessionState::Error, TransitionReason::Silence);
    assert_eq!(session.state(), SessionState::Error);
    assert_eq!(session.metrics().silence_events.load(std::sync::atomic::Ordering::Relaxed), 1);
}
