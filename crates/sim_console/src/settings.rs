use std::path::{Path, PathBuf};
use std::time::Duration;

use persona_sim::{ConversationDepth, PersonaId, Scenario};
use serde::Deserialize;
use sim_api::SimApiConfig;
use thiserror::Error;

pub const CONFIG_PATH_ENV_VAR: &str = "SIM_CONSOLE_CONFIG_PATH";
pub const BASE_URL_ENV_VAR: &str = "SIM_CONSOLE_BASE_URL";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("SIM_CONSOLE_CONFIG_PATH is not set")]
    MissingPath,

    #[error("I/O error while reading settings at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings JSON at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid settings at {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    #[serde(default)]
    base_url: Option<String>,
    name: String,
    scenario: Scenario,
    personas: Vec<PersonaId>,
    #[serde(default)]
    custom_context: String,
    #[serde(default)]
    conversation_depth: Option<String>,
    #[serde(default)]
    timeout_sec: Option<u64>,
}

/// Everything the console needs to run one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSettings {
    pub base_url: String,
    pub name: String,
    pub scenario: Scenario,
    pub personas: Vec<PersonaId>,
    pub custom_context: String,
    pub depth: ConversationDepth,
    pub timeout: Option<Duration>,
}

impl ConsoleSettings {
    /// Loads the file named by [`CONFIG_PATH_ENV_VAR`] and applies the
    /// [`BASE_URL_ENV_VAR`] override.
    pub fn from_env() -> Result<Self, SettingsError> {
        let path = std::env::var(CONFIG_PATH_ENV_VAR)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(SettingsError::MissingPath)?;

        let mut settings = Self::from_path(Path::new(&path))?;
        if let Some(base_url) = std::env::var(BASE_URL_ENV_VAR)
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            settings.base_url = sim_api::normalize_base_url(&base_url);
        }
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(path, &text)
    }

    pub fn from_json_str(path: &Path, text: &str) -> Result<Self, SettingsError> {
        let raw: RawSettings = serde_json::from_str(text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let invalid = |message: String| SettingsError::Invalid {
            path: path.to_path_buf(),
            message,
        };

        if raw.personas.is_empty() {
            return Err(invalid("personas must not be empty".to_string()));
        }
        if raw.scenario.bounds().is_none() {
            return Err(invalid(format!(
                "scenario participant bounds must satisfy 1 <= min <= max (got {}-{})",
                raw.scenario.min_participants, raw.scenario.max_participants
            )));
        }
        let timeout = match raw.timeout_sec {
            Some(0) => return Err(invalid("timeout_sec must be > 0".to_string())),
            Some(seconds) => Some(Duration::from_secs(seconds)),
            None => None,
        };

        let depth = match raw.conversation_depth.as_deref() {
            None => ConversationDepth::default(),
            Some(label) => ConversationDepth::parse(label).unwrap_or_else(|| {
                tracing::warn!(%label, "unknown conversation depth; using default");
                ConversationDepth::default()
            }),
        };

        Ok(Self {
            base_url: sim_api::normalize_base_url(raw.base_url.as_deref().unwrap_or_default()),
            name: raw.name,
            scenario: raw.scenario,
            personas: raw.personas,
            custom_context: raw.custom_context,
            depth,
            timeout,
        })
    }

    pub fn api_config(&self) -> SimApiConfig {
        let config = SimApiConfig::new(&self.base_url)
            .with_user_agent(concat!("sim_console/", env!("CARGO_PKG_VERSION")));
        match self.timeout {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        }
    }
}
