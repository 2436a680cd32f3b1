use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::SimulationId;

const UNKNOWN_PARTICIPANT: &str = "unknown";
const DEFAULT_END_MESSAGE: &str = "Simulation completed";
const DEFAULT_ERROR_MESSAGE: &str = "Unknown simulation error";

static EMPTY: Value = Value::Null;

/// Domain event kinds pushed by the simulation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InteractionGenerating,
    InteractionReceived,
    SessionWarning,
    SessionEnded,
    SessionError,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        Self::InteractionGenerating,
        Self::InteractionReceived,
        Self::SessionWarning,
        Self::SessionEnded,
        Self::SessionError,
    ];

    /// Maps a wire event name to a kind. Legacy names are accepted as aliases.
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.trim() {
            "interaction_generating" | "generating_interaction" => Self::InteractionGenerating,
            "interaction_received" | "new_interaction" => Self::InteractionReceived,
            "session_warning" | "simulation_warning" => Self::SessionWarning,
            "session_ended" | "simulation_ended" => Self::SessionEnded,
            "session_error" | "simulation_error" => Self::SessionError,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InteractionGenerating => "interaction_generating",
            Self::InteractionReceived => "interaction_received",
            Self::SessionWarning => "session_warning",
            Self::SessionEnded => "session_ended",
            Self::SessionError => "session_error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.trim().to_ascii_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            "neutral" => Self::Neutral,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

/// Server-reported `"current/max"` conversation depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthRatio {
    pub current: u32,
    pub max: u32,
}

impl DepthRatio {
    /// Parses `"3/5"`. A zero or missing denominator is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        let (current, max) = value.trim().split_once('/')?;
        let current = current.trim().parse().ok()?;
        let max = max.trim().parse().ok()?;
        if max == 0 {
            return None;
        }
        Some(Self { current, max })
    }
}

impl fmt::Display for DepthRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current, self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionPayload {
    pub initiator: String,
    pub receiver: String,
    pub content: String,
    pub sentiment: Sentiment,
    pub timestamp: Option<String>,
    pub conversation_depth: Option<DepthRatio>,
}

/// Typed inbound event, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    InteractionGenerating {
        simulation_id: Option<SimulationId>,
        initiator: String,
        receiver: String,
        conversation_depth: Option<DepthRatio>,
    },
    InteractionReceived {
        simulation_id: Option<SimulationId>,
        interaction: InteractionPayload,
    },
    SessionWarning {
        simulation_id: Option<SimulationId>,
        message: String,
    },
    SessionEnded {
        simulation_id: Option<SimulationId>,
        message: String,
    },
    SessionError {
        simulation_id: Option<SimulationId>,
        error: String,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::InteractionGenerating { .. } => EventKind::InteractionGenerating,
            Self::InteractionReceived { .. } => EventKind::InteractionReceived,
            Self::SessionWarning { .. } => EventKind::SessionWarning,
            Self::SessionEnded { .. } => EventKind::SessionEnded,
            Self::SessionError { .. } => EventKind::SessionError,
        }
    }

    pub fn simulation_id(&self) -> Option<SimulationId> {
        match self {
            Self::InteractionGenerating { simulation_id, .. }
            | Self::InteractionReceived { simulation_id, .. }
            | Self::SessionWarning { simulation_id, .. }
            | Self::SessionEnded { simulation_id, .. }
            | Self::SessionError { simulation_id, .. } => *simulation_id,
        }
    }
}

/// A recoverable irregularity in an inbound event. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolAnomaly {
    MissingField {
        kind: EventKind,
        field: &'static str,
    },
    MalformedDepth {
        kind: EventKind,
        raw: String,
    },
    UnknownSentiment {
        raw: String,
    },
    DepthOverflow {
        reported: u32,
        ceiling: u32,
    },
}

impl fmt::Display for ProtocolAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { kind, field } => {
                write!(f, "{kind} event is missing field '{field}'")
            }
            Self::MalformedDepth { kind, raw } => {
                write!(f, "{kind} event has malformed conversation depth '{raw}'")
            }
            Self::UnknownSentiment { raw } => write!(f, "unknown sentiment '{raw}'"),
            Self::DepthOverflow { reported, ceiling } => {
                write!(f, "reported depth {reported} exceeds session ceiling {ceiling}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub event: ServerEvent,
    pub anomalies: Vec<ProtocolAnomaly>,
}

impl DecodedEvent {
    pub fn clean(event: ServerEvent) -> Self {
        Self {
            event,
            anomalies: Vec::new(),
        }
    }
}

/// Decodes one event payload. Returns `None` for kinds this client does not handle.
pub fn decode_event(name: &str, payload: &Value) -> Option<DecodedEvent> {
    let kind = EventKind::parse(name)?;
    let mut reader = FieldReader::new(kind);
    let simulation_id = simulation_id_of(payload);

    let event = match kind {
        EventKind::InteractionGenerating => ServerEvent::InteractionGenerating {
            simulation_id,
            initiator: reader.string(payload, "initiator", UNKNOWN_PARTICIPANT),
            receiver: reader.string(payload, "receiver", UNKNOWN_PARTICIPANT),
            conversation_depth: reader.depth(payload, "conversation_depth"),
        },
        EventKind::InteractionReceived => {
            let interaction = match payload.get("interaction") {
                Some(value) if value.is_object() => value,
                _ => {
                    reader.missing("interaction");
                    &EMPTY
                }
            };
            ServerEvent::InteractionReceived {
                simulation_id,
                interaction: InteractionPayload {
                    initiator: reader.string(interaction, "initiator", UNKNOWN_PARTICIPANT),
                    receiver: reader.string(interaction, "receiver", UNKNOWN_PARTICIPANT),
                    content: reader.string(interaction, "content", ""),
                    sentiment: reader.sentiment(interaction),
                    timestamp: reader.optional_string(interaction, "timestamp"),
                    conversation_depth: reader.depth(interaction, "conversation_depth"),
                },
            }
        }
        EventKind::SessionWarning => ServerEvent::SessionWarning {
            simulation_id,
            message: reader.string(payload, "message", ""),
        },
        EventKind::SessionEnded => ServerEvent::SessionEnded {
            simulation_id,
            message: reader.string(payload, "message", DEFAULT_END_MESSAGE),
        },
        EventKind::SessionError => ServerEvent::SessionError {
            simulation_id,
            error: reader.string(payload, "error", DEFAULT_ERROR_MESSAGE),
        },
    };

    Some(DecodedEvent {
        event,
        anomalies: reader.anomalies,
    })
}

fn simulation_id_of(payload: &Value) -> Option<SimulationId> {
    match payload.get("simulation_id")? {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

struct FieldReader {
    kind: EventKind,
    anomalies: Vec<ProtocolAnomaly>,
}

impl FieldReader {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            anomalies: Vec::new(),
        }
    }

    fn missing(&mut self, field: &'static str) {
        self.anomalies.push(ProtocolAnomaly::MissingField {
            kind: self.kind,
            field,
        });
    }

    fn string(&mut self, value: &Value, field: &'static str, default: &str) -> String {
        match value.get(field).and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => {
                self.missing(field);
                default.to_string()
            }
        }
    }

    fn optional_string(&mut self, value: &Value, field: &'static str) -> Option<String> {
        let text = value.get(field).and_then(Value::as_str).map(ToString::to_string);
        if text.is_none() {
            self.missing(field);
        }
        text
    }

    fn sentiment(&mut self, value: &Value) -> Sentiment {
        let Some(raw) = value.get("sentiment").and_then(Value::as_str) else {
            self.missing("sentiment");
            return Sentiment::Neutral;
        };

        Sentiment::parse(raw).unwrap_or_else(|| {
            self.anomalies.push(ProtocolAnomaly::UnknownSentiment {
                raw: raw.to_string(),
            });
            Sentiment::Neutral
        })
    }

    // The ratio is optional on the wire, so absence is not an anomaly.
    fn depth(&mut self, value: &Value, field: &'static str) -> Option<DepthRatio> {
        let raw = value.get(field)?.as_str()?;
        let parsed = DepthRatio::parse(raw);
        if parsed.is_none() {
            self.anomalies.push(ProtocolAnomaly::MalformedDepth {
                kind: self.kind,
                raw: raw.to_string(),
            });
        }
        parsed
    }
}
