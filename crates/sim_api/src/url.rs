use crate::payload::SimulationId;

/// Default base URL for the simulation backend.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Normalize a base URL: trim whitespace and trailing slashes, falling back to
/// [`DEFAULT_BASE_URL`] when empty.
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    base.trim_end_matches('/').to_string()
}

pub fn start_url(base: &str) -> String {
    format!("{}/simulation/start", normalize_base_url(base))
}

pub fn stop_url(base: &str, simulation_id: SimulationId) -> String {
    format!("{}/simulation/{simulation_id}/stop", normalize_base_url(base))
}

pub fn events_url(base: &str) -> String {
    format!("{}/simulation/events", normalize_base_url(base))
}

/// Location of the results view the operator is handed off to when a session ends.
pub fn results_url(base: &str) -> String {
    format!("{}/results", normalize_base_url(base))
}
