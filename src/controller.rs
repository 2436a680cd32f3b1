use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use sim_api::{
    DecodedEvent, DepthRatio, EventKind, InteractionPayload, ProtocolAnomaly, Sentiment,
    ServerEvent, SimulationId, StartSimulationRequest,
};
use thiserror::Error;

use crate::channel::{
    ConnectionAttempt, ConnectionState, DisconnectReason, EventChannelClient, LifecycleEvent,
    ReconnectDecision,
};
use crate::depth::{self, ConversationDepth};
use crate::participants::{ParticipantCheck, PersonaId, PersonaSelection};
use crate::scenario::Scenario;

/// Numbers each outbound start so its response can be matched to it.
pub type StartAttempt = u64;

const STATUS_STARTING: &str = "Starting simulation...";
const STATUS_STARTED: &str = "Simulation started successfully";
const STATUS_STOPPING: &str = "Stopping simulation...";
const STATUS_STOPPED: &str = "Simulation stopped";
const STATUS_STOP_FAILED: &str = "Failed to stop simulation";
const STATUS_CONNECTED: &str = "Connected to server";
const STATUS_CONNECTION_ERROR: &str = "Connection error. Attempting to reconnect...";
const STATUS_DISCONNECTED: &str = "Disconnected from server";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Idle,
    Starting,
    Running,
    Stopping,
    Ended,
    Errored,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Ended => "ended",
            Self::Errored => "errored",
        }
    }

    /// A backend session exists or is being requested.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Danger,
}

/// The single most recent operator-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn new(level: StatusLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub initiator: String,
    pub receiver: String,
    pub content: String,
    pub sentiment: Sentiment,
    pub timestamp: Option<String>,
    /// 1-based arrival position within the session.
    pub depth_index: u32,
    pub ceiling: u32,
    pub reported_depth: Option<DepthRatio>,
}

impl Interaction {
    /// Depth index clipped to the session ceiling.
    pub fn display_depth(&self) -> u32 {
        self.depth_index.min(self.ceiling)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub count: u32,
    pub ceiling: u32,
    pub percent: f64,
}

impl ProgressUpdate {
    fn new(count: u32, ceiling: u32) -> Self {
        Self {
            count,
            ceiling,
            percent: depth::progress(count, ceiling),
        }
    }

    pub fn is_complete(&self) -> bool {
        depth::is_complete(self.percent)
    }
}

/// Render instructions pushed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Phase(SessionPhase),
    Status(StatusMessage),
    FeedPrepended(Interaction),
    FeedCleared,
    Progress(ProgressUpdate),
    Participants(ParticipantCheck),
    Connection(ConnectionState),
}

/// Side effects requested by the controller. Responses come back through
/// the controller's `on_*` methods.
pub trait SessionHost {
    fn send_start(&mut self, attempt: StartAttempt, request: StartSimulationRequest);
    fn send_stop(&mut self, simulation_id: SimulationId);
    fn navigate_to_results(&mut self);
    fn publish(&mut self, update: SessionUpdate);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("Please select a scenario")]
    NoScenario,
    #[error("Please enter a simulation name")]
    EmptyName,
    #[error("This scenario declares invalid participant bounds ({min}-{max})")]
    InvalidBounds { min: usize, max: usize },
    #[error("{0}")]
    Participants(ParticipantCheck),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartRejected {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("a start request is already in flight")]
    Duplicate,
    #[error("a simulation is already {0}")]
    Busy(SessionPhase),
}

/// Operator inputs for the next start request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSetup {
    pub name: String,
    pub scenario: Option<Scenario>,
    pub personas: PersonaSelection,
    pub custom_context: String,
    pub depth: ConversationDepth,
}

impl SessionSetup {
    /// `None` without a scenario or when its bounds are unusable.
    pub fn participant_check(&self) -> Option<ParticipantCheck> {
        let bounds = self.scenario.as_ref()?.bounds()?;
        Some(bounds.check(self.personas.len()))
    }

    pub fn preconditions(&self) -> Result<&Scenario, PreconditionError> {
        let scenario = self.scenario.as_ref().ok_or(PreconditionError::NoScenario)?;
        if self.name.trim().is_empty() {
            return Err(PreconditionError::EmptyName);
        }
        let bounds = scenario
            .bounds()
            .ok_or(PreconditionError::InvalidBounds {
                min: scenario.min_participants,
                max: scenario.max_participants,
            })?;
        let check = bounds.check(self.personas.len());
        if !check.ok {
            return Err(PreconditionError::Participants(check));
        }
        Ok(scenario)
    }

    pub fn start_request(&self) -> Result<StartSimulationRequest, PreconditionError> {
        let scenario = self.preconditions()?;
        Ok(StartSimulationRequest {
            name: self.name.trim().to_string(),
            scenario_id: scenario.id,
            personas: self.personas.ids(),
            custom_context: scenario.context_with(&self.custom_context),
            conversation_depth: self.depth.label().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationSession {
    id: Option<SimulationId>,
    phase: SessionPhase,
    name: String,
    depth: ConversationDepth,
    ceiling: u32,
    interaction_count: u32,
    interactions: Vec<Interaction>,
}

impl Default for SimulationSession {
    fn default() -> Self {
        Self::new(String::new(), ConversationDepth::default())
    }
}

impl SimulationSession {
    fn new(name: String, depth: ConversationDepth) -> Self {
        Self {
            id: None,
            phase: SessionPhase::Idle,
            name,
            depth,
            ceiling: depth.ceiling(),
            interaction_count: 0,
            interactions: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<SimulationId> {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> ConversationDepth {
        self.depth
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn interaction_count(&self) -> u32 {
        self.interaction_count
    }

    pub fn progress(&self) -> f64 {
        depth::progress(self.interaction_count, self.ceiling)
    }

    /// Interactions in arrival order.
    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Interactions newest first, as displayed.
    pub fn feed(&self) -> impl Iterator<Item = &Interaction> {
        self.interactions.iter().rev()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingStart {
    attempt: StartAttempt,
    stop_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChannelInput {
    Domain(ServerEvent),
    Lifecycle(LifecycleEvent),
}

type ChannelQueue = Arc<Mutex<VecDeque<ChannelInput>>>;

/// Owns the session lifecycle and the injected event channel.
///
/// Channel handlers only enqueue. Queued inputs are applied in arrival order
/// by [`SessionController::pump`], which every transport entry point calls
/// before returning, so each input is folded into the session to completion
/// before the next one is looked at.
pub struct SessionController {
    channel: EventChannelClient,
    queue: ChannelQueue,
    setup: SessionSetup,
    session: SimulationSession,
    next_attempt: StartAttempt,
    pending_start: Option<PendingStart>,
    pre_ack: Vec<ServerEvent>,
    status: Option<StatusMessage>,
    navigated: bool,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("channel", &self.channel)
            .field("setup", &self.setup)
            .field("session", &self.session)
            .field("pending_start", &self.pending_start)
            .field("pre_ack", &self.pre_ack.len())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(EventChannelClient::default())
    }
}

impl SessionController {
    pub fn new(mut channel: EventChannelClient) -> Self {
        let queue: ChannelQueue = Arc::new(Mutex::new(VecDeque::new()));

        for kind in EventKind::ALL {
            let queue = Arc::clone(&queue);
            channel.subscribe(
                kind,
                Box::new(move |event| {
                    lock_unpoisoned(&queue).push_back(ChannelInput::Domain(event.clone()));
                }),
            );
        }
        {
            let queue = Arc::clone(&queue);
            channel.subscribe_lifecycle(Box::new(move |event| {
                lock_unpoisoned(&queue).push_back(ChannelInput::Lifecycle(event.clone()));
            }));
        }

        Self {
            channel,
            queue,
            setup: SessionSetup::default(),
            session: SimulationSession::default(),
            next_attempt: 1,
            pending_start: None,
            pre_ack: Vec::new(),
            status: None,
            navigated: false,
        }
    }

    pub fn channel(&self) -> &EventChannelClient {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut EventChannelClient {
        &mut self.channel
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn setup(&self) -> &SessionSetup {
        &self.setup
    }

    pub fn session(&self) -> &SimulationSession {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.setup.name = name.into();
    }

    pub fn set_custom_context(&mut self, context: impl Into<String>) {
        self.setup.custom_context = context.into();
    }

    pub fn set_depth(&mut self, depth: ConversationDepth) {
        self.setup.depth = depth;
    }

    pub fn select_scenario(&mut self, host: &mut dyn SessionHost, scenario: Option<Scenario>) {
        self.setup.scenario = scenario;
        self.publish_participants(host);
    }

    pub fn add_persona(&mut self, host: &mut dyn SessionHost, id: PersonaId) -> bool {
        let added = self.setup.personas.add(id);
        if added {
            self.publish_participants(host);
        }
        added
    }

    pub fn remove_persona(&mut self, host: &mut dyn SessionHost, id: PersonaId) -> bool {
        let removed = self.setup.personas.remove(id);
        if removed {
            self.publish_participants(host);
        }
        removed
    }

    pub fn request_start(
        &mut self,
        host: &mut dyn SessionHost,
    ) -> Result<StartAttempt, StartRejected> {
        match self.session.phase {
            SessionPhase::Starting => {
                tracing::debug!("dropping duplicate start request");
                return Err(StartRejected::Duplicate);
            }
            phase @ (SessionPhase::Running | SessionPhase::Stopping) => {
                return Err(StartRejected::Busy(phase));
            }
            SessionPhase::Idle | SessionPhase::Ended | SessionPhase::Errored => {}
        }

        let request = match self.setup.start_request() {
            Ok(request) => request,
            Err(error) => {
                tracing::info!(%error, "start blocked by precondition");
                self.set_status(host, StatusLevel::Danger, error.to_string());
                return Err(error.into());
            }
        };

        let attempt = self.next_attempt;
        self.next_attempt += 1;
        self.pending_start = Some(PendingStart {
            attempt,
            stop_requested: false,
        });
        self.pre_ack.clear();
        self.navigated = false;
        self.session = SimulationSession::new(request.name.clone(), self.setup.depth);

        tracing::info!(
            attempt,
            scenario_id = request.scenario_id,
            depth = %self.setup.depth,
            "starting simulation"
        );
        host.publish(SessionUpdate::FeedCleared);
        host.publish(SessionUpdate::Progress(ProgressUpdate::new(
            0,
            self.session.ceiling,
        )));
        self.set_phase(host, SessionPhase::Starting);
        self.set_status(host, StatusLevel::Info, STATUS_STARTING);
        host.send_start(attempt, request);
        Ok(attempt)
    }

    pub fn on_start_acknowledged(
        &mut self,
        host: &mut dyn SessionHost,
        attempt: StartAttempt,
        simulation_id: SimulationId,
    ) {
        let Some(pending) = self.take_pending_start(attempt) else {
            tracing::warn!(
                attempt,
                simulation_id,
                "start acknowledged for abandoned attempt; stopping orphaned session"
            );
            host.send_stop(simulation_id);
            return;
        };

        self.session.id = Some(simulation_id);
        self.session.interaction_count = 0;
        self.session.interactions.clear();
        tracing::info!(attempt, simulation_id, "simulation started");

        if pending.stop_requested {
            self.set_phase(host, SessionPhase::Stopping);
            self.set_status(host, StatusLevel::Info, STATUS_STOPPING);
            host.send_stop(simulation_id);
        } else {
            self.set_phase(host, SessionPhase::Running);
            self.set_status(host, StatusLevel::Success, STATUS_STARTED);
        }
        host.publish(SessionUpdate::Progress(ProgressUpdate::new(
            0,
            self.session.ceiling,
        )));

        let buffered = std::mem::take(&mut self.pre_ack);
        if !buffered.is_empty() {
            tracing::debug!(count = buffered.len(), "flushing events received before acknowledgment");
        }
        for event in buffered {
            self.apply_event(host, event);
        }
    }

    pub fn on_start_failed(&mut self, host: &mut dyn SessionHost, attempt: StartAttempt, reason: &str) {
        if self.take_pending_start(attempt).is_none() {
            tracing::debug!(attempt, "ignoring failure of abandoned start attempt");
            return;
        }

        tracing::warn!(attempt, %reason, "simulation start failed");
        self.pre_ack.clear();
        self.session.id = None;
        self.set_phase(host, SessionPhase::Idle);
        self.set_status(
            host,
            StatusLevel::Danger,
            format!("Error starting simulation: {reason}"),
        );
    }

    /// Returns `false` when there is nothing to stop.
    pub fn request_stop(&mut self, host: &mut dyn SessionHost) -> bool {
        match self.session.phase {
            SessionPhase::Starting => {
                let Some(pending) = self.pending_start.as_mut() else {
                    return false;
                };
                if pending.stop_requested {
                    return false;
                }
                pending.stop_requested = true;
                tracing::info!(attempt = pending.attempt, "stop requested before acknowledgment");
                self.set_status(host, StatusLevel::Info, STATUS_STOPPING);
                true
            }
            SessionPhase::Running => {
                let Some(simulation_id) = self.session.id else {
                    return false;
                };
                tracing::info!(simulation_id, "stopping simulation");
                self.set_phase(host, SessionPhase::Stopping);
                self.set_status(host, StatusLevel::Info, STATUS_STOPPING);
                host.send_stop(simulation_id);
                true
            }
            SessionPhase::Idle
            | SessionPhase::Stopping
            | SessionPhase::Ended
            | SessionPhase::Errored => {
                tracing::debug!(phase = %self.session.phase, "ignoring stop request");
                false
            }
        }
    }

    pub fn on_stop_acknowledged(&mut self, host: &mut dyn SessionHost, simulation_id: SimulationId) {
        if self.session.phase != SessionPhase::Stopping || self.session.id != Some(simulation_id) {
            tracing::debug!(simulation_id, phase = %self.session.phase, "ignoring stale stop acknowledgment");
            return;
        }

        tracing::info!(simulation_id, "simulation stopped");
        self.session.id = None;
        self.session.interaction_count = 0;
        self.set_phase(host, SessionPhase::Idle);
        self.set_status(host, StatusLevel::Success, STATUS_STOPPED);
        host.publish(SessionUpdate::Progress(ProgressUpdate::new(
            0,
            self.session.ceiling,
        )));
    }

    pub fn on_stop_failed(&mut self, host: &mut dyn SessionHost, simulation_id: SimulationId, reason: &str) {
        if self.session.phase != SessionPhase::Stopping || self.session.id != Some(simulation_id) {
            tracing::debug!(simulation_id, "ignoring stale stop failure");
            return;
        }

        tracing::warn!(simulation_id, %reason, "simulation stop failed");
        self.set_phase(host, SessionPhase::Running);
        self.set_status(host, StatusLevel::Danger, STATUS_STOP_FAILED);
    }

    /// Starts a fresh stream connection and returns its attempt number.
    pub fn connect(&mut self, host: &mut dyn SessionHost) -> ConnectionAttempt {
        let connection = self.channel.connect();
        host.publish(SessionUpdate::Connection(self.channel.state()));
        connection
    }

    pub fn disconnect(&mut self, host: &mut dyn SessionHost) {
        self.channel.close();
        self.pump(host);
    }

    pub fn on_stream_opened(&mut self, host: &mut dyn SessionHost, connection: ConnectionAttempt) {
        self.channel.on_open(connection);
        self.pump(host);
    }

    pub fn on_stream_events(
        &mut self,
        host: &mut dyn SessionHost,
        connection: ConnectionAttempt,
        events: Vec<DecodedEvent>,
    ) {
        for decoded in events {
            self.channel.ingest(connection, decoded);
            self.pump(host);
        }
    }

    pub fn on_stream_closed(
        &mut self,
        host: &mut dyn SessionHost,
        connection: ConnectionAttempt,
    ) -> ReconnectDecision {
        let decision = self.channel.on_closed(connection);
        self.pump(host);
        decision
    }

    pub fn on_stream_failed(
        &mut self,
        host: &mut dyn SessionHost,
        connection: ConnectionAttempt,
        message: &str,
    ) -> ReconnectDecision {
        let decision = self.channel.on_connect_failed(connection, message);
        self.pump(host);
        decision
    }

    /// The stream request was answered with an HTTP error status.
    pub fn on_stream_status(
        &mut self,
        host: &mut dyn SessionHost,
        connection: ConnectionAttempt,
        status: u16,
        message: &str,
    ) -> ReconnectDecision {
        let decision = self.channel.on_connect_status(connection, status, message);
        self.pump(host);
        decision
    }

    /// Applies queued channel inputs in arrival order. Returns how many were applied.
    pub fn pump(&mut self, host: &mut dyn SessionHost) -> usize {
        let mut drained = 0usize;

        loop {
            let input = lock_unpoisoned(&self.queue).pop_front();
            match input {
                Some(ChannelInput::Domain(event)) => self.on_server_event(host, event),
                Some(ChannelInput::Lifecycle(event)) => self.on_lifecycle_event(host, event),
                None => break,
            }
            drained += 1;
        }

        drained
    }

    fn on_server_event(&mut self, host: &mut dyn SessionHost, event: ServerEvent) {
        match self.session.phase {
            SessionPhase::Starting => {
                if let ServerEvent::SessionError { error, .. } = &event {
                    self.pending_start = None;
                    self.pre_ack.clear();
                    self.fail_session(host, format!("Simulation error: {error}"));
                } else {
                    self.pre_ack.push(event);
                }
            }
            SessionPhase::Running | SessionPhase::Stopping => self.apply_event(host, event),
            SessionPhase::Idle | SessionPhase::Ended | SessionPhase::Errored => {
                tracing::debug!(kind = %event.kind(), phase = %self.session.phase, "dropping event without active session");
            }
        }
    }

    fn apply_event(&mut self, host: &mut dyn SessionHost, event: ServerEvent) {
        if !self.session.phase.is_active() {
            tracing::debug!(kind = %event.kind(), "dropping buffered event after session closed");
            return;
        }
        if let (Some(incoming), Some(active)) = (event.simulation_id(), self.session.id) {
            if incoming != active {
                tracing::debug!(incoming, active, kind = %event.kind(), "dropping event for another session");
                return;
            }
        }

        match event {
            ServerEvent::InteractionGenerating {
                initiator,
                receiver,
                conversation_depth,
                ..
            } => {
                let mut text = format!("Generating interaction between {initiator} and {receiver}...");
                if let Some(ratio) = conversation_depth {
                    self.check_reported_depth(ratio);
                    text.push_str(&format!(" ({ratio})"));
                }
                self.set_status(host, StatusLevel::Info, text);
            }
            ServerEvent::InteractionReceived { interaction, .. } => {
                self.append_interaction(host, interaction);
            }
            ServerEvent::SessionWarning { message, .. } => {
                tracing::warn!(%message, "simulation warning");
                self.set_status(host, StatusLevel::Warning, message);
            }
            ServerEvent::SessionEnded { message, .. } => {
                tracing::info!(simulation_id = ?self.session.id, %message, "simulation ended");
                self.session.id = None;
                self.set_phase(host, SessionPhase::Ended);
                self.set_status(host, StatusLevel::Info, message);
                if !self.navigated {
                    self.navigated = true;
                    host.navigate_to_results();
                }
            }
            ServerEvent::SessionError { error, .. } => {
                self.fail_session(host, format!("Simulation error: {error}"));
            }
        }
    }

    fn append_interaction(&mut self, host: &mut dyn SessionHost, payload: InteractionPayload) {
        self.session.interaction_count += 1;
        let depth_index = self.session.interaction_count;
        let ceiling = self.session.ceiling;

        if let Some(ratio) = payload.conversation_depth {
            self.check_reported_depth(ratio);
        }
        if depth_index > ceiling {
            tracing::warn!(depth_index, ceiling, "interaction count exceeds session ceiling");
        }

        let interaction = Interaction {
            initiator: payload.initiator,
            receiver: payload.receiver,
            content: payload.content,
            sentiment: payload.sentiment,
            timestamp: payload.timestamp,
            depth_index,
            ceiling,
            reported_depth: payload.conversation_depth,
        };
        self.session.interactions.push(interaction.clone());

        host.publish(SessionUpdate::FeedPrepended(interaction));
        host.publish(SessionUpdate::Progress(ProgressUpdate::new(depth_index, ceiling)));
    }

    fn check_reported_depth(&self, ratio: DepthRatio) {
        let ceiling = self.session.ceiling;
        if ratio.current > ceiling {
            let anomaly = ProtocolAnomaly::DepthOverflow {
                reported: ratio.current,
                ceiling,
            };
            tracing::warn!(%anomaly, "protocol anomaly");
        }
    }

    fn on_lifecycle_event(&mut self, host: &mut dyn SessionHost, event: LifecycleEvent) {
        host.publish(SessionUpdate::Connection(self.channel.state()));

        match event {
            LifecycleEvent::Connected => {
                self.set_status(host, StatusLevel::Success, STATUS_CONNECTED);
            }
            LifecycleEvent::ConnectionError { .. } => {
                self.set_status(host, StatusLevel::Danger, STATUS_CONNECTION_ERROR);
            }
            LifecycleEvent::Reconnecting { attempt, .. } => {
                let max = self.channel.policy().max_attempts;
                self.set_status(
                    host,
                    StatusLevel::Warning,
                    format!("Connection lost. Reconnecting (attempt {attempt} of {max})..."),
                );
            }
            LifecycleEvent::Disconnected { reason } => {
                let message = match reason {
                    DisconnectReason::Exhausted { attempts } => format!(
                        "Lost connection to the simulation server after {attempts} reconnection attempts"
                    ),
                    DisconnectReason::Refused { status } => {
                        format!("The simulation server refused the event stream (HTTP {status})")
                    }
                    DisconnectReason::Closed | DisconnectReason::Lost => return,
                };
                match self.session.phase {
                    SessionPhase::Starting | SessionPhase::Running => {
                        tracing::error!(?reason, "event stream lost during active session");
                        self.pending_start = None;
                        self.pre_ack.clear();
                        self.fail_session(host, message);
                    }
                    _ => self.set_status(host, StatusLevel::Danger, STATUS_DISCONNECTED),
                }
            }
        }
    }

    fn fail_session(&mut self, host: &mut dyn SessionHost, message: String) {
        tracing::error!(simulation_id = ?self.session.id, %message, "simulation errored");
        self.session.id = None;
        self.set_phase(host, SessionPhase::Errored);
        self.set_status(host, StatusLevel::Danger, message);
    }

    fn take_pending_start(&mut self, attempt: StartAttempt) -> Option<PendingStart> {
        match self.pending_start {
            Some(pending) if pending.attempt == attempt && self.session.phase == SessionPhase::Starting => {
                self.pending_start = None;
                Some(pending)
            }
            _ => None,
        }
    }

    fn publish_participants(&self, host: &mut dyn SessionHost) {
        if let Some(check) = self.setup.participant_check() {
            host.publish(SessionUpdate::Participants(check));
        }
    }

    fn set_phase(&mut self, host: &mut dyn SessionHost, phase: SessionPhase) {
        if self.session.phase == phase {
            return;
        }
        tracing::info!(from = %self.session.phase, to = %phase, "session phase changed");
        self.session.phase = phase;
        host.publish(SessionUpdate::Phase(phase));
    }

    fn set_status(&mut self, host: &mut dyn SessionHost, level: StatusLevel, text: impl Into<String>) {
        let status = StatusMessage::new(level, text);
        self.status = Some(status.clone());
        host.publish(SessionUpdate::Status(status));
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
