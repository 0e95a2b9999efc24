//! Venue Session (C4, spec.md §4.4): WebSocket lifecycle, heartbeat, and
//! reconnect for one venue connection (public or private).
//!
//! Shaped after `scrapers/binance_session.rs`'s `SessionManager` —
//! state machine plus a `HeartbeatMonitor` plus a reconnect calculator,
//! coordinated through one `RwLock`-guarded struct with atomics for the
//! hot-path counters. Two things differ deliberately from the teacher:
//! there is no multi-endpoint rotation (each venue here has exactly one
//! public and one private URL) and the reconnect schedule is the spec's
//! own fixed-then-exponential curve rather than the teacher's
//! jittered-exponential-from-first-attempt curve (see DESIGN.md).

pub mod auth;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{info, warn};

/// Connection state machine (spec.md §4.4 "States"). Names are the
/// spec's own, not the teacher's Init/Connecting/Subscribing/Streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
    Error,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Authenticated => write!(f, "AUTHENTICATED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    Started,
    ConnectSuccess,
    AuthSuccess,
    ConnectFailed,
    AuthFailed,
    Silence,
    PingFailed,
    ServerClose,
    ShutdownRequested,
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::ConnectSuccess => write!(f, "connect_ok"),
            Self::AuthSuccess => write!(f, "auth_ok"),
            Self::ConnectFailed => write!(f, "connect_failed"),
            Self::AuthFailed => write!(f, "auth_failed"),
            Self::Silence => write!(f, "silence_timeout"),
            Self::PingFailed => write!(f, "ping_failed"),
            Self::ServerClose => write!(f, "server_close"),
            Self::ShutdownRequested => write!(f, "shutdown"),
        }
    }
}

/// Tunable timing (spec.md §4.4). Defaults match the spec's named
/// constants; `config::SessionOverrides` lets a venue override any of
/// them.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// No frame of any kind for this long ⇒ reconnect.
    pub data_silence_timeout: Duration,
    /// No frame for this long (but under `data_silence_timeout`) ⇒ send
    /// a manual ping probe.
    pub manual_ping_threshold: Duration,
    /// How often the heartbeat loop wakes to evaluate the above.
    pub heartbeat_check_interval: Duration,
    /// Reconnect backoff ceiling once past the fixed opening steps.
    pub reconnect_cap: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_silence_timeout: Duration::from_secs(60),
            manual_ping_threshold: Duration::from_secs(30),
            heartbeat_check_interval: Duration::from_secs(5),
            reconnect_cap: Duration::from_secs(300),
        }
    }
}

/// Fixed-then-exponential reconnect schedule (spec.md §4.4): 0s, 1s,
/// 2s, 4s, 8s, then doubling again capped at `reconnect_cap`. Diverges
/// from the teacher's jittered-exponential curve by design (DESIGN.md).
#[derive(Debug)]
pub struct ReconnectSchedule {
    cap: Duration,
    attempt: u32,
}

const FIXED_STEPS_SECS: &[u64] = &[0, 1, 2, 4, 8];

impl ReconnectSchedule {
    pub fn new(cap: Duration) -> Self {
        Self { cap, attempt: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = if let Some(&secs) = FIXED_STEPS_SECS.get(self.attempt as usize) {
            Duration::from_secs(secs)
        } else {
            let beyond = self.attempt as usize - FIXED_STEPS_SECS.len() + 1;
            let secs = FIXED_STEPS_SECS.last().copied().unwrap_or(8) * (1u64 << beyond);
            Duration::from_secs(secs).min(self.cap)
        };
        self.attempt += 1;
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    Ok,
    SendPing,
    Silence,
    PingFailed,
}

/// Tracks `last_message_time` (any frame) vs `last_business_message_time`
/// (non-heartbeat frame) separately, matching spec.md §4.4's distinction
/// — a venue that only ever echoes pongs back still counts as silent for
/// business purposes, but not for raw-liveness purposes.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: SessionConfig,
    last_message_at: Instant,
    last_business_message_at: Instant,
    ping_sent_at: Option<Instant>,
    awaiting_pong: bool,
}

impl HeartbeatMonitor {
    pub fn new(config: SessionConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            last_message_at: now,
            last_business_message_at: now,
            ping_sent_at: None,
            awaiting_pong: false,
        }
    }

    pub fn reset(&mut self) {
        let now = Instant::now();
        self.last_message_at = now;
        self.last_business_message_at = now;
        self.ping_sent_at = None;
        self.awaiting_pong = false;
    }

    #[inline]
    pub fn record_any_message(&mut self) {
        self.last_message_at = Instant::now();
    }

    #[inline]
    pub fn record_business_message(&mut self) {
        let now = Instant::now();
        self.last_message_at = now;
        self.last_business_message_at = now;
    }

    pub fn record_pong(&mut self) {
        self.last_message_at = Instant::now();
        self.awaiting_pong = false;
    }

    pub fn record_ping_sent(&mut self) {
        self.ping_sent_at = Some(Instant::now());
        self.awaiting_pong = true;
    }

    /// Evaluates silence/ping state (spec.md §4.4 "Heartbeat"): a single
    /// unanswered manual ping makes the session unusable (`PingFailed`),
    /// not just a retry — the caller reconnects rather than pinging again.
    pub fn check(&mut self) -> HeartbeatAction {
        let now = Instant::now();

        if self.awaiting_pong {
            if let Some(sent) = self.ping_sent_at {
                if now.duration_since(sent) > self.config.manual_ping_threshold {
                    return HeartbeatAction::PingFailed;
                }
            }
        }

        // The silence timer uses last_business_message_time, not
        // last_message_time — a venue that keeps answering pings forever
        // but sends zero business data must still trip (spec.md §4.4).
        if now.duration_since(self.last_business_message_at) > self.config.data_silence_timeout {
            return HeartbeatAction::Silence;
        }

        if !self.awaiting_pong
            && now.duration_since(self.last_message_at) > self.config.manual_ping_threshold
        {
            return HeartbeatAction::SendPing;
        }

        HeartbeatAction::Ok
    }
}

/// Atomics-backed counters (spec.md §7 health surface), mirroring
/// `SessionMetrics` in the teacher.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    pub connect_attempts: AtomicU64,
    pub connect_successes: AtomicU64,
    pub reconnects: AtomicU64,
    pub auth_failures: AtomicU64,
    pub silence_events: AtomicU64,
    pub ping_failures: AtomicU64,
}

impl SessionMetrics {
    #[inline]
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn record_connect_success(&self) {
        self.connect_successes.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn record_silence(&self) {
        self.silence_events.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn record_ping_failure(&self) {
        self.ping_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Coordinates state, heartbeat and reconnect scheduling for one venue
/// connection. The actual socket I/O loop lives in the binary/codec
/// glue; this type only owns the decisions.
pub struct SessionManager {
    venue: String,
    state: RwLock<SessionState>,
    heartbeat: RwLock<HeartbeatMonitor>,
    reconnect: RwLock<ReconnectSchedule>,
    metrics: SessionMetrics,
}

impl SessionManager {
    pub fn new(venue: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            venue: venue.into(),
            state: RwLock::new(SessionState::Disconnected),
            heartbeat: RwLock::new(HeartbeatMonitor::new(config.clone())),
            reconnect: RwLock::new(ReconnectSchedule::new(config.reconnect_cap)),
            metrics: SessionMetrics::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn transition(&self, new_state: SessionState, reason: TransitionReason) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        match new_state {
            SessionState::Connecting => self.metrics.record_connect_attempt(),
            SessionState::Connected | SessionState::Authenticated
                if old_state != SessionState::Connected && old_state != SessionState::Authenticated =>
            {
                self.metrics.record_connect_success();
                self.reconnect.write().reset();
                self.heartbeat.write().reset();
            }
            SessionState::Error => {
                self.metrics.record_reconnect();
                match reason {
                    TransitionReason::Silence => self.metrics.record_silence(),
                    TransitionReason::PingFailed => self.metrics.record_ping_failure(),
                    TransitionReason::AuthFailed => self.metrics.record_auth_failure(),
                    _ => {}
                }
            }
            _ => {}
        }

        if old_state != new_state {
            if new_state == SessionState::Error {
                warn!(venue = %self.venue, from = %old_state, to = %new_state, reason = %reason, "session transition");
            } else {
                info!(venue = %self.venue, from = %old_state, to = %new_state, reason = %reason, "session transition");
            }
        }
    }

    pub fn next_reconnect_delay(&self) -> Duration {
        self.reconnect.write().next_delay()
    }

    #[inline]
    pub fn record_business_message(&self) {
        self.heartbeat.write().record_business_message();
    }

    #[inline]
    pub fn record_any_message(&self) {
        self.heartbeat.write().record_any_message();
    }

    pub fn record_ping_sent(&self) {
        self.heartbeat.write().record_ping_sent();
    }

    pub fn record_pong(&self) {
        self.heartbeat.write().record_pong();
    }

    pub fn check_heartbeat(&self) -> HeartbeatAction {
        self.heartbeat.write().check()
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }
}
