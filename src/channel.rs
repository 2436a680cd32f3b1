//! Event Channel Client: connection state, reconnection policy, and typed
//! dispatch of inbound events.
//!
//! The client never performs I/O itself. A driver opens the stream and
//! reports what happened through [`EventChannelClient::on_open`],
//! [`EventChannelClient::on_closed`], [`EventChannelClient::on_connect_failed`]
//! and [`EventChannelClient::ingest`]. The client answers with the state
//! transition and, on loss, a [`ReconnectDecision`] the driver must follow.
//!
//! Every connection attempt carries a [`ConnectionAttempt`] number. Signals
//! from an attempt that is no longer current are ignored, so a late result
//! from an abandoned stream cannot corrupt connection state.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use sim_api::retry::{
    backoff_delay, is_retryable_status, BASE_DELAY_MS, MAX_DELAY_MS, MAX_RECONNECT_ATTEMPTS,
};
use sim_api::{DecodedEvent, EventKind, ServerEvent};

/// Identifies one physical connection attempt.
pub type ConnectionAttempt = u64;

pub type EventHandler = Box<dyn FnMut(&ServerEvent) + Send>;
pub type LifecycleHandler = Box<dyn FnMut(&LifecycleEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Closed on request; no reconnection follows.
    Closed,
    /// Lost unexpectedly; a reconnection attempt follows.
    Lost,
    /// Reconnection attempts are used up. Terminal until the next `connect`.
    Exhausted { attempts: u32 },
    /// The server answered the stream request with a status that retrying
    /// will not fix. Terminal until the next `connect`.
    Refused { status: u16 },
}

/// Connection notifications, kept apart from the domain event set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected,
    Disconnected { reason: DisconnectReason },
    Reconnecting { attempt: u32, delay: Duration },
    ConnectionError { message: String },
}

impl LifecycleEvent {
    pub fn kind(&self) -> LifecycleKind {
        match self {
            Self::Connected => LifecycleKind::Connected,
            Self::Disconnected { .. } => LifecycleKind::Disconnected,
            Self::Reconnecting { .. } => LifecycleKind::Reconnecting,
            Self::ConnectionError { .. } => LifecycleKind::ConnectionError,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Disconnected {
                reason: DisconnectReason::Exhausted { .. } | DisconnectReason::Refused { .. }
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleKind {
    Connected,
    Disconnected,
    Reconnecting,
    ConnectionError,
}

impl LifecycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::ConnectionError => "connection_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_delay: Duration::from_millis(MAX_DELAY_MS),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the 1-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        backoff_delay(attempt, base, max)
    }
}

/// What the driver must do after a lost or failed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then open a new stream for `connection`.
    Retry {
        attempt: u32,
        delay: Duration,
        connection: ConnectionAttempt,
    },
    /// Attempts exhausted; state is terminally `Disconnected`.
    GiveUp,
    /// The signal came from a superseded attempt or a closed client.
    Stale,
}

pub struct EventChannelClient {
    state: ConnectionState,
    policy: ReconnectPolicy,
    current: ConnectionAttempt,
    attempts: u32,
    closed: bool,
    handlers: BTreeMap<EventKind, Vec<EventHandler>>,
    lifecycle_handlers: Vec<LifecycleHandler>,
}

impl fmt::Debug for EventChannelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannelClient")
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("current", &self.current)
            .field("attempts", &self.attempts)
            .field("closed", &self.closed)
            .field("handler_kinds", &self.handlers.keys().collect::<Vec<_>>())
            .field("lifecycle_handlers", &self.lifecycle_handlers.len())
            .finish()
    }
}

impl Default for EventChannelClient {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

impl EventChannelClient {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            policy,
            current: 0,
            attempts: 0,
            closed: true,
            handlers: BTreeMap::new(),
            lifecycle_handlers: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Reconnection attempts used since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_current(&self, connection: ConnectionAttempt) -> bool {
        !self.closed && connection == self.current
    }

    pub fn subscribe(&mut self, kind: EventKind, handler: EventHandler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    pub fn subscribe_lifecycle(&mut self, handler: LifecycleHandler) {
        self.lifecycle_handlers.push(handler);
    }

    /// Begins a fresh connection attempt and resets the reconnection budget.
    pub fn connect(&mut self) -> ConnectionAttempt {
        self.closed = false;
        self.attempts = 0;
        self.current += 1;
        self.state = ConnectionState::Connecting;
        tracing::debug!(connection = self.current, "event channel connecting");
        self.current
    }

    pub fn on_open(&mut self, connection: ConnectionAttempt) -> bool {
        if !self.is_current(connection) {
            tracing::debug!(connection, "ignoring open from stale connection attempt");
            return false;
        }

        self.attempts = 0;
        self.state = ConnectionState::Connected;
        tracing::info!(connection, "event channel connected");
        self.emit(LifecycleEvent::Connected);
        true
    }

    /// The stream ended after it had been opened, or dropped mid-read.
    pub fn on_closed(&mut self, connection: ConnectionAttempt) -> ReconnectDecision {
        if !self.is_current(connection) {
            return ReconnectDecision::Stale;
        }

        tracing::warn!(connection, "event channel lost");
        self.state = ConnectionState::Disconnected;
        self.emit(LifecycleEvent::Disconnected {
            reason: DisconnectReason::Lost,
        });
        self.schedule_reconnect()
    }

    /// The stream could not be opened at all.
    pub fn on_connect_failed(
        &mut self,
        connection: ConnectionAttempt,
        message: impl Into<String>,
    ) -> ReconnectDecision {
        if !self.is_current(connection) {
            return ReconnectDecision::Stale;
        }

        let message = message.into();
        tracing::warn!(connection, error = %message, "event channel connection failed");
        self.emit(LifecycleEvent::ConnectionError { message });
        self.schedule_reconnect()
    }

    /// The stream request was answered with an HTTP error `status`.
    /// Transient statuses reconnect like any failure; the rest give up at once.
    pub fn on_connect_status(
        &mut self,
        connection: ConnectionAttempt,
        status: u16,
        message: impl Into<String>,
    ) -> ReconnectDecision {
        if is_retryable_status(status) {
            return self.on_connect_failed(connection, message);
        }
        if !self.is_current(connection) {
            return ReconnectDecision::Stale;
        }

        let message = message.into();
        tracing::error!(connection, status, error = %message, "event stream refused");
        self.emit(LifecycleEvent::ConnectionError { message });
        self.give_up(DisconnectReason::Refused { status });
        ReconnectDecision::GiveUp
    }

    /// Closes on request. Outstanding attempts become stale.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;
        self.current += 1;
        self.state = ConnectionState::Disconnected;
        tracing::info!("event channel closed");
        self.emit(LifecycleEvent::Disconnected {
            reason: DisconnectReason::Closed,
        });
    }

    /// Dispatches one decoded event to the handlers registered for its kind,
    /// in subscription order. Anomalies are logged and otherwise ignored.
    pub fn ingest(&mut self, connection: ConnectionAttempt, decoded: DecodedEvent) -> bool {
        if !self.is_current(connection) {
            tracing::debug!(
                connection,
                kind = %decoded.event.kind(),
                "dropping event from stale connection attempt"
            );
            return false;
        }

        for anomaly in &decoded.anomalies {
            tracing::warn!(kind = %decoded.event.kind(), %anomaly, "protocol anomaly");
        }

        let kind = decoded.event.kind();
        match self.handlers.get_mut(&kind) {
            Some(handlers) => {
                for handler in handlers.iter_mut() {
                    handler(&decoded.event);
                }
            }
            None => tracing::debug!(%kind, "no subscriber for event"),
        }
        true
    }

    fn give_up(&mut self, reason: DisconnectReason) {
        self.closed = true;
        self.current += 1;
        self.state = ConnectionState::Disconnected;
        self.emit(LifecycleEvent::Disconnected { reason });
    }

    fn schedule_reconnect(&mut self) -> ReconnectDecision {
        if self.attempts >= self.policy.max_attempts {
            let attempts = self.attempts;
            tracing::error!(attempts, "event channel reconnection attempts exhausted");
            self.give_up(DisconnectReason::Exhausted { attempts });
            return ReconnectDecision::GiveUp;
        }

        self.attempts += 1;
        self.current += 1;
        let attempt = self.attempts;
        let delay = self.policy.delay_for(attempt);
        self.state = ConnectionState::Reconnecting;
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(attempt, delay_ms, "event channel reconnecting");
        self.emit(LifecycleEvent::Reconnecting { attempt, delay });

        ReconnectDecision::Retry {
            attempt,
            delay,
            connection: self.current,
        }
    }

    fn emit(&mut self, event: LifecycleEvent) {
        for handler in self.lifecycle_handlers.iter_mut() {
            handler(&event);
        }
    }
}
