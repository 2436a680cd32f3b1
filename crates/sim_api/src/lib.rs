//! Transport-only client primitives for the persona simulation backend.
//!
//! This crate owns request building, response parsing, and event-stream
//! decoding for the simulation endpoints. It holds no session semantics:
//! lifecycle, ordering, and reconnection decisions belong to the caller.
//!
//! Inbound events are normalized into [`ServerEvent`] variants. Missing or
//! malformed fields are defaulted and reported as [`ProtocolAnomaly`] records
//! next to the event rather than failing the stream.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, EventStream, SimApiClient};
pub use config::SimApiConfig;
pub use error::SimApiError;
pub use events::{
    DecodedEvent, DepthRatio, EventKind, InteractionPayload, ProtocolAnomaly, Sentiment,
    ServerEvent,
};
pub use payload::{SimulationId, StartSimulationRequest, StartSimulationResponse};
pub use sse::SseStreamParser;
pub use url::normalize_base_url;
