use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use persona_sim::{
    ConnectionAttempt, ReconnectDecision, SessionController, SessionHost, SessionPhase,
    SessionUpdate, StartAttempt,
};
use sim_api::{
    CancellationSignal, DecodedEvent, SimApiClient, SimApiError, SimulationId,
    StartSimulationRequest,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::render::render_update;
use crate::settings::ConsoleSettings;

const START_FAILED_PREFIX: &str = "Error starting simulation";
/// Per-message wait for in-flight requests once the session has settled,
/// used when the settings carry no request timeout.
const DEFAULT_SETTLE_WAIT: Duration = Duration::from_secs(30);

/// Everything that can wake the runtime loop.
#[derive(Debug)]
pub enum RuntimeMessage {
    StartFinished {
        attempt: StartAttempt,
        result: Result<SimulationId, String>,
    },
    StopFinished {
        simulation_id: SimulationId,
        result: Result<(), String>,
    },
    StreamOpened {
        connection: ConnectionAttempt,
    },
    StreamEvents {
        connection: ConnectionAttempt,
        events: Vec<DecodedEvent>,
    },
    StreamClosed {
        connection: ConnectionAttempt,
    },
    /// The stream could not be opened. `status` is set when the server
    /// answered with an HTTP error.
    StreamFailed {
        connection: ConnectionAttempt,
        status: Option<u16>,
        message: String,
    },
    ReconnectDue {
        connection: ConnectionAttempt,
    },
    /// Operator interrupt (Ctrl-C).
    Interrupt,
}

/// How a console run finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The backend ended the session; the operator is handed the results view.
    Ended { results_url: String },
    /// Stopped on request.
    Stopped,
    StartFailed { reason: String },
    Errored { reason: String },
}

/// Performs controller side effects: network calls run in spawned tasks
/// that report back through the runtime inbox.
pub struct ConsoleHost {
    client: Arc<SimApiClient>,
    sender: UnboundedSender<RuntimeMessage>,
    output: Box<dyn Write + Send>,
    results_url: Option<String>,
    requests_in_flight: usize,
}

impl ConsoleHost {
    fn write_line(&mut self, line: &str) {
        if let Err(error) = writeln!(self.output, "{line}") {
            tracing::warn!(%error, "failed to write console output");
        }
        if let Err(error) = self.output.flush() {
            tracing::warn!(%error, "failed to flush console output");
        }
    }

    fn spawn_stream(&self, connection: ConnectionAttempt, cancel: CancellationSignal) {
        let client = Arc::clone(&self.client);
        let sender = self.sender.clone();
        tokio::spawn(run_stream(client, connection, cancel, sender));
    }
}

impl SessionHost for ConsoleHost {
    fn send_start(&mut self, attempt: StartAttempt, request: StartSimulationRequest) {
        self.requests_in_flight += 1;
        let client = Arc::clone(&self.client);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = client
                .start_simulation(&request)
                .await
                .map_err(|error| error.reason());
            let _ = sender.send(RuntimeMessage::StartFinished { attempt, result });
        });
    }

    fn send_stop(&mut self, simulation_id: SimulationId) {
        self.requests_in_flight += 1;
        let client = Arc::clone(&self.client);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = client
                .stop_simulation(simulation_id)
                .await
                .map_err(|error| error.reason());
            let _ = sender.send(RuntimeMessage::StopFinished {
                simulation_id,
                result,
            });
        });
    }

    fn navigate_to_results(&mut self) {
        let url = self.client.results_url();
        self.write_line(&format!("Results: {url}"));
        self.results_url = Some(url);
    }

    fn publish(&mut self, update: SessionUpdate) {
        self.write_line(&render_update(&update));
    }
}

/// Owns the session controller and applies one inbox message at a time.
pub struct SimulationRuntime {
    controller: SessionController,
    host: ConsoleHost,
    inbox: UnboundedReceiver<RuntimeMessage>,
    stream_cancel: Option<CancellationSignal>,
    settle_wait: Duration,
}

impl SimulationRuntime {
    pub fn new(
        settings: &ConsoleSettings,
        output: Box<dyn Write + Send>,
    ) -> Result<Self, SimApiError> {
        let client = Arc::new(SimApiClient::new(settings.api_config())?);
        let (sender, inbox) = unbounded_channel();
        let mut host = ConsoleHost {
            client,
            sender,
            output,
            results_url: None,
            requests_in_flight: 0,
        };

        let mut controller = SessionController::default();
        controller.set_name(settings.name.clone());
        controller.set_custom_context(settings.custom_context.clone());
        controller.set_depth(settings.depth);
        controller.select_scenario(&mut host, Some(settings.scenario.clone()));
        for persona in &settings.personas {
            controller.add_persona(&mut host, *persona);
        }

        Ok(Self {
            controller,
            host,
            inbox,
            stream_cancel: None,
            settle_wait: settings.timeout.unwrap_or(DEFAULT_SETTLE_WAIT),
        })
    }

    /// Sender for injecting messages such as [`RuntimeMessage::Interrupt`].
    pub fn sender(&self) -> UnboundedSender<RuntimeMessage> {
        self.host.sender.clone()
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Forwards Ctrl-C presses to the inbox for the lifetime of the process.
    pub fn spawn_interrupt_listener(&self) {
        let sender = self.sender();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if sender.send(RuntimeMessage::Interrupt).is_err() {
                    break;
                }
            }
        });
    }

    /// Connects the event stream, starts the configured session, and runs
    /// until it settles. Start and stop requests still in flight at that
    /// point are awaited, so a late acknowledgment of an abandoned start
    /// still stops the backend session.
    pub async fn run(mut self) -> RunOutcome {
        self.open_stream();

        if let Err(rejected) = self.controller.request_start(&mut self.host) {
            self.close_stream();
            return RunOutcome::StartFailed {
                reason: rejected.to_string(),
            };
        }

        loop {
            let Some(message) = self.inbox.recv().await else {
                self.close_stream();
                return RunOutcome::Errored {
                    reason: "runtime inbox closed".to_string(),
                };
            };

            self.apply(message);

            if let Some(outcome) = self.settled() {
                self.close_stream();
                self.finish_requests().await;
                return outcome;
            }
        }
    }

    async fn finish_requests(&mut self) {
        while self.host.requests_in_flight > 0 {
            match tokio::time::timeout(self.settle_wait, self.inbox.recv()).await {
                Ok(Some(message)) => self.apply(message),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        in_flight = self.host.requests_in_flight,
                        "stopped waiting for in-flight requests"
                    );
                    break;
                }
            }
        }
    }

    fn apply(&mut self, message: RuntimeMessage) {
        if matches!(
            message,
            RuntimeMessage::StartFinished { .. } | RuntimeMessage::StopFinished { .. }
        ) {
            self.host.requests_in_flight = self.host.requests_in_flight.saturating_sub(1);
        }

        let host = &mut self.host;
        match message {
            RuntimeMessage::StartFinished { attempt, result } => match result {
                Ok(simulation_id) => {
                    self.controller
                        .on_start_acknowledged(host, attempt, simulation_id);
                }
                Err(reason) => self.controller.on_start_failed(host, attempt, &reason),
            },
            RuntimeMessage::StopFinished {
                simulation_id,
                result,
            } => match result {
                Ok(()) => self.controller.on_stop_acknowledged(host, simulation_id),
                Err(reason) => {
                    self.controller
                        .on_stop_failed(host, simulation_id, &reason);
                }
            },
            RuntimeMessage::StreamOpened { connection } => {
                self.controller.on_stream_opened(host, connection);
            }
            RuntimeMessage::StreamEvents { connection, events } => {
                self.controller.on_stream_events(host, connection, events);
            }
            RuntimeMessage::StreamClosed { connection } => {
                let decision = self.controller.on_stream_closed(host, connection);
                self.follow(decision);
            }
            RuntimeMessage::StreamFailed {
                connection,
                status,
                message,
            } => {
                let decision = match status {
                    Some(status) => {
                        self.controller
                            .on_stream_status(host, connection, status, &message)
                    }
                    None => self.controller.on_stream_failed(host, connection, &message),
                };
                self.follow(decision);
            }
            RuntimeMessage::ReconnectDue { connection } => {
                if self.controller.channel().is_current(connection) {
                    let cancel = self.fresh_cancel();
                    self.host.spawn_stream(connection, cancel);
                } else {
                    tracing::debug!(connection, "skipping superseded reconnection");
                }
            }
            RuntimeMessage::Interrupt => {
                if !self.controller.request_stop(host) {
                    tracing::info!(phase = %self.controller.phase(), "interrupt with nothing to stop");
                }
            }
        }
    }

    fn follow(&mut self, decision: ReconnectDecision) {
        match decision {
            ReconnectDecision::Retry {
                attempt,
                delay,
                connection,
            } => {
                tracing::debug!(attempt, ?delay, connection, "scheduling reconnection");
                let sender = self.sender();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = sender.send(RuntimeMessage::ReconnectDue { connection });
                });
            }
            ReconnectDecision::GiveUp | ReconnectDecision::Stale => {}
        }
    }

    fn settled(&self) -> Option<RunOutcome> {
        let status_text = || {
            self.controller
                .status()
                .map(|status| status.text.clone())
                .unwrap_or_default()
        };

        match self.controller.phase() {
            SessionPhase::Ended => Some(RunOutcome::Ended {
                results_url: self
                    .host
                    .results_url
                    .clone()
                    .unwrap_or_else(|| self.host.client.results_url()),
            }),
            SessionPhase::Errored => Some(RunOutcome::Errored {
                reason: status_text(),
            }),
            SessionPhase::Idle => {
                let start_failed = self
                    .controller
                    .status()
                    .is_some_and(|status| status.text.starts_with(START_FAILED_PREFIX));
                if start_failed {
                    Some(RunOutcome::StartFailed {
                        reason: status_text(),
                    })
                } else {
                    Some(RunOutcome::Stopped)
                }
            }
            SessionPhase::Starting | SessionPhase::Running | SessionPhase::Stopping => None,
        }
    }

    fn open_stream(&mut self) {
        let connection = self.controller.connect(&mut self.host);
        let cancel = self.fresh_cancel();
        self.host.spawn_stream(connection, cancel);
    }

    fn close_stream(&mut self) {
        if let Some(cancel) = self.stream_cancel.take() {
            cancel.store(true, Ordering::Release);
        }
        self.controller.disconnect(&mut self.host);
    }

    fn fresh_cancel(&mut self) -> CancellationSignal {
        if let Some(previous) = self.stream_cancel.take() {
            previous.store(true, Ordering::Release);
        }
        let cancel = Arc::new(AtomicBool::new(false));
        self.stream_cancel = Some(Arc::clone(&cancel));
        cancel
    }
}

async fn run_stream(
    client: Arc<SimApiClient>,
    connection: ConnectionAttempt,
    cancel: CancellationSignal,
    sender: UnboundedSender<RuntimeMessage>,
) {
    let mut stream = match client.connect_events(Some(&cancel)).await {
        Ok(stream) => stream,
        Err(SimApiError::Cancelled) => return,
        Err(error) => {
            let _ = sender.send(RuntimeMessage::StreamFailed {
                connection,
                status: error.status().map(|status| status.as_u16()),
                message: error.to_string(),
            });
            return;
        }
    };

    if sender
        .send(RuntimeMessage::StreamOpened { connection })
        .is_err()
    {
        return;
    }

    loop {
        match stream.next_events(Some(&cancel)).await {
            Ok(Some(events)) => {
                if sender
                    .send(RuntimeMessage::StreamEvents { connection, events })
                    .is_err()
                {
                    return;
                }
            }
            Ok(None) => break,
            Err(SimApiError::Cancelled) => return,
            Err(error) => {
                tracing::warn!(connection, %error, "event stream read failed");
                break;
            }
        }
    }

    let _ = sender.send(RuntimeMessage::StreamClosed { connection });
}
