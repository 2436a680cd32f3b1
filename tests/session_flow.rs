mod support;

use persona_sim::{
    ConversationDepth, PreconditionError, SessionController, SessionPhase, SessionUpdate,
    StartRejected, StatusLevel,
};
use support::*;

#[test]
fn start_is_blocked_until_preconditions_hold() {
    let mut host = HostSpy::default();
    let mut controller = SessionController::default();

    assert_eq!(
        controller.request_start(&mut host),
        Err(StartRejected::Precondition(PreconditionError::NoScenario))
    );

    controller.select_scenario(&mut host, Some(scenario(3, 5)));
    assert_eq!(
        controller.request_start(&mut host),
        Err(StartRejected::Precondition(PreconditionError::EmptyName))
    );

    controller.set_name("   ");
    assert_eq!(
        controller.request_start(&mut host),
        Err(StartRejected::Precondition(PreconditionError::EmptyName))
    );

    controller.set_name("Run");
    controller.add_persona(&mut host, 1);
    controller.add_persona(&mut host, 2);
    let Err(StartRejected::Precondition(PreconditionError::Participants(check))) =
        controller.request_start(&mut host)
    else {
        panic!("expected participant precondition failure");
    };
    assert_eq!((check.ok, check.deficit, check.excess), (false, 1, 0));

    assert!(host.starts.is_empty());
    assert_eq!(controller.phase(), SessionPhase::Idle);
    let status = host.last_status().expect("status surfaced");
    assert_eq!(status.level, StatusLevel::Danger);
    assert!(status.text.starts_with("Need at least 1 more participant"));
}

#[test]
fn inverted_scenario_bounds_block_start_without_a_participant_check() {
    let mut host = HostSpy::default();
    let mut controller = SessionController::default();
    controller.set_name("Run");
    controller.select_scenario(&mut host, Some(scenario(4, 2)));
    controller.add_persona(&mut host, 1);
    controller.add_persona(&mut host, 2);
    controller.add_persona(&mut host, 3);

    assert_eq!(controller.setup().participant_check(), None);
    assert!(!host
        .updates
        .iter()
        .any(|update| matches!(update, SessionUpdate::Participants(_))));
    assert_eq!(
        controller.request_start(&mut host),
        Err(StartRejected::Precondition(PreconditionError::InvalidBounds {
            min: 4,
            max: 2
        }))
    );
    assert!(host.starts.is_empty());
    assert_eq!(
        host.last_status().map(|status| status.text.as_str()),
        Some("This scenario declares invalid participant bounds (4-2)")
    );
}

#[test]
fn participant_updates_follow_every_selection_change() {
    let mut host = HostSpy::default();
    let mut controller = SessionController::default();

    controller.add_persona(&mut host, 1);
    assert!(host.updates.is_empty(), "no scenario means no validation");

    controller.select_scenario(&mut host, Some(scenario(1, 1)));
    controller.add_persona(&mut host, 2);
    controller.remove_persona(&mut host, 1);

    let checks: Vec<_> = host
        .updates
        .iter()
        .filter_map(|update| match update {
            SessionUpdate::Participants(check) => Some((check.ok, check.excess)),
            _ => None,
        })
        .collect();
    assert_eq!(checks, vec![(true, 0), (false, 1), (true, 0)]);
}

#[test]
fn start_request_carries_merged_context_and_depth_label() {
    let mut host = HostSpy::default();
    let (mut controller, _) = ready_controller(&mut host);
    controller.set_custom_context("  Keep it short. ");
    controller.set_depth(ConversationDepth::Long);

    let attempt = controller.request_start(&mut host).expect("start accepted");

    let (sent_attempt, request) = host.starts.last().expect("start sent");
    assert_eq!(*sent_attempt, attempt);
    assert_eq!(request.name, "Budget run");
    assert_eq!(request.scenario_id, 7);
    assert_eq!(request.personas, vec![1, 2]);
    assert_eq!(
        request.custom_context,
        "A tense budget meeting.\n\nAdditional Context:\nKeep it short."
    );
    assert_eq!(request.conversation_depth, "long");
    assert_eq!(controller.phase(), SessionPhase::Starting);
    assert_eq!(controller.session().ceiling(), 10);
    assert_eq!(
        controller.status().map(|status| status.text.as_str()),
        Some("Starting simulation...")
    );
}

#[test]
fn rapid_double_start_sends_exactly_one_request() {
    let mut host = HostSpy::default();
    let (mut controller, _) = ready_controller(&mut host);

    assert!(controller.request_start(&mut host).is_ok());
    assert_eq!(
        controller.request_start(&mut host),
        Err(StartRejected::Duplicate)
    );
    assert_eq!(host.starts.len(), 1);
}

#[test]
fn medium_depth_reaches_full_progress_but_keeps_running() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 11);

    for index in 0..5 {
        controller.on_stream_events(
            &mut host,
            connection,
            vec![interaction(Some(11), &format!("line {index}"))],
        );
    }

    assert_eq!(controller.session().interaction_count(), 5);
    assert_eq!(controller.session().progress(), 100.0);
    assert_eq!(host.last_progress(), Some(100.0));
    assert_eq!(controller.phase(), SessionPhase::Running);
}

#[test]
fn feed_is_newest_first_and_depth_index_counts_arrivals() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 3);

    controller.on_stream_events(
        &mut host,
        connection,
        vec![
            interaction(Some(3), "first"),
            interaction(Some(3), "second"),
            interaction(Some(3), "third"),
        ],
    );

    let feed: Vec<_> = controller
        .session()
        .feed()
        .map(|interaction| (interaction.content.as_str(), interaction.depth_index))
        .collect();
    assert_eq!(feed, vec![("third", 3), ("second", 2), ("first", 1)]);
}

#[test]
fn overflowing_depth_is_clipped_for_display() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 3);

    let events = (0..7)
        .map(|index| interaction_with_depth(Some(3), &format!("line {index}"), 40, 5))
        .collect();
    controller.on_stream_events(&mut host, connection, events);

    let newest = controller.session().feed().next().expect("newest");
    assert_eq!(newest.depth_index, 7);
    assert_eq!(newest.display_depth(), 5);
    assert_eq!(controller.session().progress(), 100.0);
    assert_eq!(controller.phase(), SessionPhase::Running);
}

#[test]
fn warnings_replace_the_status_line() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 3);

    controller.on_stream_events(&mut host, connection, vec![warning(Some(3), "Model is slow")]);

    let status = controller.status().expect("status");
    assert_eq!(status.level, StatusLevel::Warning);
    assert_eq!(status.text, "Model is slow");
}

#[test]
fn generating_event_reports_participants_and_server_depth() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 3);
    let decoded = sim_api::events::decode_event(
        "generating_interaction",
        &serde_json::json!({
            "simulation_id": 3,
            "initiator": "Ava",
            "receiver": "Ben",
            "conversation_depth": "2/5"
        }),
    )
    .expect("decoded");

    controller.on_stream_events(&mut host, connection, vec![decoded]);

    assert_eq!(
        controller.status().map(|status| status.text.as_str()),
        Some("Generating interaction between Ava and Ben... (2/5)")
    );
    assert_eq!(controller.session().interaction_count(), 0);
}

#[test]
fn operator_stop_returns_to_idle_and_resets_depth() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 21);
    controller.on_stream_events(&mut host, connection, vec![interaction(Some(21), "hi")]);

    assert!(controller.request_stop(&mut host));
    assert_eq!(controller.phase(), SessionPhase::Stopping);
    assert_eq!(host.stops, vec![21]);
    assert!(!controller.request_stop(&mut host), "second stop is a no-op");
    assert_eq!(host.stops, vec![21]);

    controller.on_stop_acknowledged(&mut host, 21);

    assert_eq!(controller.phase(), SessionPhase::Idle);
    assert_eq!(controller.session().id(), None);
    assert_eq!(controller.session().interaction_count(), 0);
    assert_eq!(
        controller.status().map(|status| status.text.as_str()),
        Some("Simulation stopped")
    );
    assert_eq!(host.navigations, 0);
}

#[test]
fn stop_without_active_session_is_a_noop() {
    let mut host = HostSpy::default();
    let (mut controller, _) = ready_controller(&mut host);

    assert!(!controller.request_stop(&mut host));
    assert!(host.stops.is_empty());
    assert_eq!(controller.phase(), SessionPhase::Idle);
}

#[test]
fn stop_failure_returns_to_running_with_danger_status() {
    let mut host = HostSpy::default();
    let (mut controller, _) = running_controller(&mut host, 8);

    controller.request_stop(&mut host);
    controller.on_stop_failed(&mut host, 8, "HTTP 500");

    assert_eq!(controller.phase(), SessionPhase::Running);
    let status = controller.status().expect("status");
    assert_eq!(status.level, StatusLevel::Danger);
    assert_eq!(status.text, "Failed to stop simulation");
}

#[test]
fn start_failure_returns_to_idle_without_identifier() {
    let mut host = HostSpy::default();
    let (mut controller, _) = ready_controller(&mut host);

    let attempt = controller.request_start(&mut host).expect("start accepted");
    controller.on_start_failed(&mut host, attempt, "Scenario not found");

    assert_eq!(controller.phase(), SessionPhase::Idle);
    assert_eq!(controller.session().id(), None);
    assert_eq!(
        controller.status().map(|status| status.text.as_str()),
        Some("Error starting simulation: Scenario not found")
    );

    assert!(controller.request_start(&mut host).is_ok(), "retry allowed");
    assert_eq!(host.starts.len(), 2);
}

#[test]
fn session_ended_navigates_exactly_once() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 4);

    controller.on_stream_events(&mut host, connection, vec![ended(Some(4)), ended(Some(4))]);

    assert_eq!(controller.phase(), SessionPhase::Ended);
    assert_eq!(host.navigations, 1);
    assert_eq!(
        controller.status().map(|status| status.text.as_str()),
        Some("Simulation completed")
    );
}

#[test]
fn session_ended_while_stopping_still_ends() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 4);

    controller.request_stop(&mut host);
    controller.on_stream_events(&mut host, connection, vec![ended(Some(4))]);

    assert_eq!(controller.phase(), SessionPhase::Ended);
    assert_eq!(host.navigations, 1);

    controller.on_stop_acknowledged(&mut host, 4);
    assert_eq!(controller.phase(), SessionPhase::Ended, "late stop ack is stale");
}

#[test]
fn interactions_while_stopping_are_still_appended() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 4);

    controller.request_stop(&mut host);
    controller.on_stream_events(&mut host, connection, vec![interaction(Some(4), "late")]);

    assert_eq!(contents(&controller), vec!["late".to_string()]);
    assert_eq!(controller.phase(), SessionPhase::Stopping);
}

#[test]
fn session_error_is_terminal_and_allows_a_fresh_attempt() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 4);
    controller.on_stream_events(&mut host, connection, vec![interaction(Some(4), "hi")]);

    controller.on_stream_events(&mut host, connection, vec![errored(Some(4), "LLM quota")]);

    assert_eq!(controller.phase(), SessionPhase::Errored);
    assert_eq!(
        controller.status().map(|status| status.text.as_str()),
        Some("Simulation error: LLM quota")
    );

    let attempt = controller.request_start(&mut host).expect("new attempt");
    assert_eq!(controller.phase(), SessionPhase::Starting);
    assert_eq!(controller.session().interaction_count(), 0);
    assert!(controller.session().interactions().is_empty());
    assert!(host.updates.contains(&SessionUpdate::FeedCleared));
    assert_eq!(attempt, 2);
}

#[test]
fn events_after_terminal_phase_are_dropped() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 4);
    controller.on_stream_events(&mut host, connection, vec![ended(Some(4))]);
    let before = controller.session().clone();

    controller.on_stream_events(
        &mut host,
        connection,
        vec![interaction(Some(4), "ghost"), errored(None, "ghost")],
    );

    assert_eq!(controller.session(), &before);
    assert_eq!(controller.phase(), SessionPhase::Ended);
}
