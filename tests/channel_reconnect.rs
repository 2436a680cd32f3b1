mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use persona_sim::{
    ConnectionState, DisconnectReason, EventChannelClient, LifecycleEvent, LifecycleKind,
    ReconnectDecision, ReconnectPolicy, SessionPhase, SessionUpdate, StatusLevel,
};
use support::*;

fn lifecycle_log(channel: &mut EventChannelClient) -> Arc<Mutex<Vec<LifecycleEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    channel.subscribe_lifecycle(Box::new(move |event| {
        sink.lock().expect("lifecycle log").push(event.clone());
    }));
    log
}

#[test]
fn reconnect_delays_back_off_and_cap() {
    let mut channel = EventChannelClient::default();
    let mut connection = channel.connect();
    channel.on_open(connection);

    let mut delays = Vec::new();
    let mut decision = channel.on_closed(connection);
    while let ReconnectDecision::Retry {
        attempt,
        delay,
        connection: next,
    } = decision
    {
        assert_eq!(channel.state(), ConnectionState::Reconnecting);
        assert_eq!(channel.attempts(), attempt);
        delays.push(delay);
        connection = next;
        decision = channel.on_connect_failed(connection, "connection refused");
    }

    assert_eq!(decision, ReconnectDecision::GiveUp);
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(4000),
            Duration::from_millis(5000),
            Duration::from_millis(5000),
        ]
    );
    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert!(!channel.is_current(connection), "no silent retry after giving up");
}

#[test]
fn successful_reopen_resets_the_attempt_budget() {
    let mut channel = EventChannelClient::new(ReconnectPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
    });
    let connection = channel.connect();
    channel.on_open(connection);

    let ReconnectDecision::Retry { connection, .. } = channel.on_closed(connection) else {
        panic!("expected first retry");
    };
    let ReconnectDecision::Retry { connection, .. } =
        channel.on_connect_failed(connection, "refused")
    else {
        panic!("expected second retry");
    };
    assert!(channel.on_open(connection));
    assert_eq!(channel.attempts(), 0);

    assert!(matches!(
        channel.on_closed(connection),
        ReconnectDecision::Retry { attempt: 1, .. }
    ));
}

#[test]
fn lifecycle_notifications_are_emitted_in_order() {
    let mut channel = EventChannelClient::new(ReconnectPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(5),
    });
    let log = lifecycle_log(&mut channel);

    let connection = channel.connect();
    channel.on_open(connection);
    let ReconnectDecision::Retry { connection, .. } = channel.on_closed(connection) else {
        panic!("expected retry");
    };
    assert_eq!(
        channel.on_connect_failed(connection, "refused"),
        ReconnectDecision::GiveUp
    );

    let kinds: Vec<_> = log
        .lock()
        .expect("log")
        .iter()
        .map(LifecycleEvent::kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            LifecycleKind::Connected,
            LifecycleKind::Disconnected,
            LifecycleKind::Reconnecting,
            LifecycleKind::ConnectionError,
            LifecycleKind::Disconnected,
        ]
    );
    assert!(log.lock().expect("log").last().is_some_and(LifecycleEvent::is_terminal));
}

#[test]
fn reconnecting_does_not_change_running_session() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 9);

    let decision = controller.on_stream_closed(&mut host, connection);

    assert!(matches!(decision, ReconnectDecision::Retry { attempt: 1, .. }));
    assert_eq!(controller.phase(), SessionPhase::Running);
    assert_eq!(controller.connection_state(), ConnectionState::Reconnecting);
    assert!(host
        .updates
        .contains(&SessionUpdate::Connection(ConnectionState::Reconnecting)));
    let status = controller.status().expect("status");
    assert_eq!(status.level, StatusLevel::Warning);
    assert_eq!(status.text, "Connection lost. Reconnecting (attempt 1 of 5)...");
}

#[test]
fn exhausted_reconnects_while_running_error_the_session() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 9);

    let mut decision = controller.on_stream_closed(&mut host, connection);
    while let ReconnectDecision::Retry { connection, .. } = decision {
        decision = controller.on_stream_failed(&mut host, connection, "connection refused");
    }

    assert_eq!(decision, ReconnectDecision::GiveUp);
    assert_eq!(controller.phase(), SessionPhase::Errored);
    assert_eq!(controller.session().id(), None);
    let status = controller.status().expect("status");
    assert_eq!(status.level, StatusLevel::Danger);
    assert_eq!(
        status.text,
        "Lost connection to the simulation server after 5 reconnection attempts"
    );
}

#[test]
fn exhausted_reconnects_while_idle_only_affect_connectivity() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = ready_controller(&mut host);

    let mut decision = controller.on_stream_closed(&mut host, connection);
    while let ReconnectDecision::Retry { connection, .. } = decision {
        decision = controller.on_stream_failed(&mut host, connection, "refused");
    }

    assert_eq!(controller.phase(), SessionPhase::Idle);
    assert_eq!(
        controller.status().map(|status| status.text.as_str()),
        Some("Disconnected from server")
    );
}

#[test]
fn events_from_abandoned_connection_are_dropped() {
    let mut host = HostSpy::default();
    let (mut controller, old) = running_controller(&mut host, 9);

    let ReconnectDecision::Retry { connection, .. } = controller.on_stream_closed(&mut host, old)
    else {
        panic!("expected retry");
    };
    controller.on_stream_events(&mut host, old, vec![interaction(Some(9), "late")]);
    assert_eq!(controller.session().interaction_count(), 0);

    controller.on_stream_opened(&mut host, connection);
    controller.on_stream_events(&mut host, connection, vec![interaction(Some(9), "fresh")]);

    assert_eq!(contents(&controller), vec!["fresh".to_string()]);
    assert_eq!(
        controller.status().map(|status| status.text.as_str()),
        Some("Connected to server")
    );
}

#[test]
fn explicit_disconnect_is_not_a_terminal_loss() {
    let mut host = HostSpy::default();
    let (mut controller, _) = running_controller(&mut host, 9);
    let log = lifecycle_log(controller.channel_mut());

    controller.disconnect(&mut host);

    assert_eq!(controller.phase(), SessionPhase::Running);
    assert_eq!(
        *log.lock().expect("log"),
        vec![LifecycleEvent::Disconnected {
            reason: DisconnectReason::Closed
        }]
    );
}

#[test]
fn non_retryable_stream_status_gives_up_without_reconnecting() {
    let mut channel = EventChannelClient::default();
    let log = lifecycle_log(&mut channel);
    let connection = channel.connect();

    assert_eq!(
        channel.on_connect_status(connection, 404, "HTTP 404 Not Found"),
        ReconnectDecision::GiveUp
    );

    assert_eq!(channel.attempts(), 0);
    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert!(!channel.is_current(connection));
    assert_eq!(
        log.lock().expect("log").last(),
        Some(&LifecycleEvent::Disconnected {
            reason: DisconnectReason::Refused { status: 404 }
        })
    );
    assert!(log.lock().expect("log").last().is_some_and(LifecycleEvent::is_terminal));
}

#[test]
fn transient_stream_status_still_reconnects() {
    let mut channel = EventChannelClient::default();
    let connection = channel.connect();

    assert!(matches!(
        channel.on_connect_status(connection, 503, "warming up"),
        ReconnectDecision::Retry { attempt: 1, .. }
    ));
    assert_eq!(channel.state(), ConnectionState::Reconnecting);
}

#[test]
fn refused_stream_while_running_errors_the_session() {
    let mut host = HostSpy::default();
    let (mut controller, connection) = running_controller(&mut host, 9);

    let ReconnectDecision::Retry { connection, .. } =
        controller.on_stream_closed(&mut host, connection)
    else {
        panic!("expected retry");
    };
    let decision = controller.on_stream_status(&mut host, connection, 400, "bad request");

    assert_eq!(decision, ReconnectDecision::GiveUp);
    assert_eq!(controller.phase(), SessionPhase::Errored);
    assert_eq!(
        controller.status().map(|status| status.text.as_str()),
        Some("The simulation server refused the event stream (HTTP 400)")
    );
}
