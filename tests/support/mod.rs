#![allow(dead_code)]

use persona_sim::{
    ConnectionAttempt, Scenario, SessionController, SessionHost, SessionPhase, SessionUpdate,
    StartAttempt, StatusMessage,
};
use sim_api::{
    DecodedEvent, DepthRatio, InteractionPayload, Sentiment, ServerEvent, SimulationId,
    StartSimulationRequest,
};

#[derive(Default)]
pub struct HostSpy {
    pub starts: Vec<(StartAttempt, StartSimulationRequest)>,
    pub stops: Vec<SimulationId>,
    pub navigations: usize,
    pub updates: Vec<SessionUpdate>,
}

impl HostSpy {
    pub fn last_status(&self) -> Option<&StatusMessage> {
        self.updates.iter().rev().find_map(|update| match update {
            SessionUpdate::Status(status) => Some(status),
            _ => None,
        })
    }

    pub fn phases(&self) -> Vec<SessionPhase> {
        self.updates
            .iter()
            .filter_map(|update| match update {
                SessionUpdate::Phase(phase) => Some(*phase),
                _ => None,
            })
            .collect()
    }

    pub fn last_progress(&self) -> Option<f64> {
        self.updates.iter().rev().find_map(|update| match update {
            SessionUpdate::Progress(progress) => Some(progress.percent),
            _ => None,
        })
    }
}

impl SessionHost for HostSpy {
    fn send_start(&mut self, attempt: StartAttempt, request: StartSimulationRequest) {
        self.starts.push((attempt, request));
    }

    fn send_stop(&mut self, simulation_id: SimulationId) {
        self.stops.push(simulation_id);
    }

    fn navigate_to_results(&mut self) {
        self.navigations += 1;
    }

    fn publish(&mut self, update: SessionUpdate) {
        self.updates.push(update);
    }
}

pub fn scenario(min: usize, max: usize) -> Scenario {
    Scenario {
        id: 7,
        name: "Budget meeting".to_string(),
        description: "Quarterly budget negotiation".to_string(),
        difficulty: "Medium".to_string(),
        duration_minutes: 30,
        min_participants: min,
        max_participants: max,
        context: "A tense budget meeting.".to_string(),
    }
}

/// A controller with a valid setup (scenario bounds 2-4, personas 1 and 2)
/// and an open event stream.
pub fn ready_controller(host: &mut HostSpy) -> (SessionController, ConnectionAttempt) {
    let mut controller = SessionController::default();
    controller.set_name("Budget run");
    controller.select_scenario(host, Some(scenario(2, 4)));
    controller.add_persona(host, 1);
    controller.add_persona(host, 2);
    let connection = controller.connect(host);
    controller.on_stream_opened(host, connection);
    (controller, connection)
}

/// Drives a ready controller into `Running` with the given backend id.
pub fn running_controller(
    host: &mut HostSpy,
    simulation_id: SimulationId,
) -> (SessionController, ConnectionAttempt) {
    let (mut controller, connection) = ready_controller(host);
    let attempt = controller.request_start(host).expect("start accepted");
    controller.on_start_acknowledged(host, attempt, simulation_id);
    assert_eq!(controller.phase(), SessionPhase::Running);
    (controller, connection)
}

pub fn interaction(simulation_id: Option<SimulationId>, content: &str) -> DecodedEvent {
    DecodedEvent::clean(ServerEvent::InteractionReceived {
        simulation_id,
        interaction: InteractionPayload {
            initiator: "Ava".to_string(),
            receiver: "Ben".to_string(),
            content: content.to_string(),
            sentiment: Sentiment::Neutral,
            timestamp: Some("2026-01-01T00:00:00".to_string()),
            conversation_depth: None,
        },
    })
}

pub fn interaction_with_depth(
    simulation_id: Option<SimulationId>,
    content: &str,
    current: u32,
    max: u32,
) -> DecodedEvent {
    let mut decoded = interaction(simulation_id, content);
    if let ServerEvent::InteractionReceived { interaction, .. } = &mut decoded.event {
        interaction.conversation_depth = Some(DepthRatio { current, max });
    }
    decoded
}

pub fn ended(simulation_id: Option<SimulationId>) -> DecodedEvent {
    DecodedEvent::clean(ServerEvent::SessionEnded {
        simulation_id,
        message: "Simulation completed".to_string(),
    })
}

pub fn errored(simulation_id: Option<SimulationId>, error: &str) -> DecodedEvent {
    DecodedEvent::clean(ServerEvent::SessionError {
        simulation_id,
        error: error.to_string(),
    })
}

pub fn warning(simulation_id: Option<SimulationId>, message: &str) -> DecodedEvent {
    DecodedEvent::clean(ServerEvent::SessionWarning {
        simulation_id,
        message: message.to_string(),
    })
}

pub fn contents(controller: &SessionController) -> Vec<String> {
    controller
        .session()
        .interactions()
        .iter()
        .map(|interaction| interaction.content.clone())
        .collect()
}
