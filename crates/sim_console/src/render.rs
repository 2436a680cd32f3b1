use persona_sim::depth::interaction_count_label;
use persona_sim::{Interaction, SessionUpdate, StatusLevel, StatusMessage};

/// One plain-text line per update. Feed resets render as a separator.
pub fn render_update(update: &SessionUpdate) -> String {
    match update {
        SessionUpdate::Phase(phase) => format!("[phase] {phase}"),
        SessionUpdate::Status(status) => render_status(status),
        SessionUpdate::FeedPrepended(interaction) => render_interaction(interaction),
        SessionUpdate::FeedCleared => "----".to_string(),
        SessionUpdate::Progress(progress) => format!(
            "[progress] {:.0}% ({} of {})",
            progress.percent,
            interaction_count_label(progress.count),
            progress.ceiling
        ),
        SessionUpdate::Participants(check) => match check.message() {
            Some(message) => format!("[participants] {message}"),
            None => format!("[participants] ok ({}-{})", check.min, check.max),
        },
        SessionUpdate::Connection(state) => format!("[connection] {state}"),
    }
}

pub fn render_status(status: &StatusMessage) -> String {
    format!("[{}] {}", level_label(status.level), status.text)
}

pub fn render_interaction(interaction: &Interaction) -> String {
    let mut line = format!(
        "#{}/{} {} -> {} ({})",
        interaction.display_depth(),
        interaction.ceiling,
        interaction.initiator,
        interaction.receiver,
        interaction.sentiment.as_str(),
    );
    if let Some(timestamp) = interaction.timestamp.as_deref() {
        line.push_str(" @ ");
        line.push_str(timestamp);
    }
    line.push_str(": ");
    line.push_str(interaction.content.trim());
    line
}

fn level_label(level: StatusLevel) -> &'static str {
    match level {
        StatusLevel::Info => "info",
        StatusLevel::Success => "success",
        StatusLevel::Warning => "warning",
        StatusLevel::Danger => "danger",
    }
}
