//! Conversation-length labels and the progress math built on them.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Ceiling used when a label is not recognized.
pub const DEFAULT_CEILING: u32 = 5;

/// Operator-chosen conversation length. Each label maps to exactly one ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConversationDepth {
    Short,
    #[default]
    Medium,
    Long,
    Extended,
    Longform,
    Marathon,
}

impl ConversationDepth {
    pub const ALL: [ConversationDepth; 6] = [
        Self::Short,
        Self::Medium,
        Self::Long,
        Self::Extended,
        Self::Longform,
        Self::Marathon,
    ];

    /// Case-insensitive, whitespace-tolerant lookup.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|depth| depth.label().eq_ignore_ascii_case(label))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
            Self::Extended => "extended",
            Self::Longform => "longform",
            Self::Marathon => "marathon",
        }
    }

    pub fn ceiling(&self) -> u32 {
        match self {
            Self::Short => 2,
            Self::Medium => 5,
            Self::Long => 10,
            Self::Extended => 25,
            Self::Longform => 50,
            Self::Marathon => 100,
        }
    }
}

impl fmt::Display for ConversationDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown conversation depth '{0}'")]
pub struct UnknownDepthLabel(pub String);

impl FromStr for ConversationDepth {
    type Err = UnknownDepthLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| UnknownDepthLabel(value.to_string()))
    }
}

/// Ceiling for a raw label. Total: unknown labels get [`DEFAULT_CEILING`].
pub fn ceiling_for(label: &str) -> u32 {
    ConversationDepth::parse(label).map_or(DEFAULT_CEILING, |depth| depth.ceiling())
}

/// Completion percentage in `[0, 100]`. A zero ceiling reads as complete.
pub fn progress(count: u32, ceiling: u32) -> f64 {
    if ceiling == 0 {
        return 100.0;
    }
    (100.0 * f64::from(count) / f64::from(ceiling)).min(100.0)
}

pub fn is_complete(percentage: f64) -> bool {
    percentage >= 100.0
}

/// `"1 interaction"`, `"3 interactions"`.
pub fn interaction_count_label(count: u32) -> String {
    if count == 1 {
        "1 interaction".to_string()
    } else {
        format!("{count} interactions")
    }
}
