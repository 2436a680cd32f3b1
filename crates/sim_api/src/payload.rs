use serde::{Deserialize, Serialize};

/// Backend-assigned simulation identifier.
pub type SimulationId = u64;

/// Request body for `POST /simulation/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSimulationRequest {
    pub name: String,
    pub scenario_id: u64,
    pub personas: Vec<u64>,
    /// Scenario default context, already merged with any operator addition.
    pub custom_context: String,
    pub conversation_depth: String,
}

/// Response body for `POST /simulation/start`.
///
/// The backend answers with either an identifier or an error string; an
/// `error` field wins when both are somehow present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StartSimulationResponse {
    Rejected { error: String },
    Started { simulation_id: SimulationId },
}

/// Response body for `POST /simulation/{id}/stop`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StopSimulationResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
