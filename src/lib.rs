//! Simulation session client for live multi-persona conversation runs.
//!
//! The crate is synchronous and transport-agnostic. A driver feeds it start
//! and stop responses plus event-stream signals; the [`SessionController`]
//! folds them into one session state machine and hands side effects back
//! through [`SessionHost`].
//!
//! # Public API Overview
//! - Map conversation-length labels to ceilings and progress with [`depth`].
//! - Check persona selections against scenario bounds with [`participants`].
//! - Merge operator context into scenario context with [`scenario`].
//! - Track stream connectivity and reconnection with [`EventChannelClient`].
//! - Drive a session end to end with [`SessionController`].

pub mod channel;
pub mod controller;
pub mod depth;
pub mod participants;
pub mod scenario;

pub use channel::{
    ConnectionAttempt, ConnectionState, DisconnectReason, EventChannelClient, LifecycleEvent,
    LifecycleKind, ReconnectDecision, ReconnectPolicy,
};
pub use controller::{
    Interaction, PreconditionError, ProgressUpdate, SessionController, SessionHost, SessionPhase,
    SessionSetup, SessionUpdate, SimulationSession, StartAttempt, StartRejected, StatusLevel,
    StatusMessage,
};
pub use depth::{ceiling_for, is_complete, progress, ConversationDepth};
pub use participants::{validate, ParticipantBounds, ParticipantCheck, PersonaId, PersonaSelection};
pub use scenario::{combined_context, Scenario, ScenarioId};
