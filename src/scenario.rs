use serde::{Deserialize, Serialize};

use crate::participants::ParticipantBounds;

pub type ScenarioId = u64;

const ADDITIONAL_CONTEXT_LABEL: &str = "Additional Context:";

/// Read-only scenario description supplied by the backend catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub duration_minutes: u32,
    pub min_participants: usize,
    pub max_participants: usize,
    #[serde(default)]
    pub context: String,
}

impl Scenario {
    /// `None` when the declared bounds are unusable (zero minimum or `min > max`).
    pub fn bounds(&self) -> Option<ParticipantBounds> {
        ParticipantBounds::new(self.min_participants, self.max_participants)
    }

    pub fn context_with(&self, custom: &str) -> String {
        combined_context(&self.context, custom)
    }
}

/// Appends operator context to a scenario's default context.
pub fn combined_context(default_context: &str, custom: &str) -> String {
    let custom = custom.trim();
    if custom.is_empty() {
        return default_context.to_string();
    }
    format!("{default_context}\n\n{ADDITIONAL_CONTEXT_LABEL}\n{custom}")
}
