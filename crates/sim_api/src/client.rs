use std::future::Future;
use std::pin::Pin;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Response};

use crate::config::SimApiConfig;
use crate::error::{parse_error_message, SimApiError};
use crate::events::DecodedEvent;
use crate::payload::{
    SimulationId, StartSimulationRequest, StartSimulationResponse, StopSimulationResponse,
};
use crate::sse::SseStreamParser;
use crate::url::{events_url, results_url, start_url, stop_url};

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);
const EVENT_STREAM_MIME: &str = "text/event-stream";

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

#[derive(Debug)]
pub struct SimApiClient {
    http: Client,
    config: SimApiConfig,
}

impl SimApiClient {
    pub fn new(config: SimApiConfig) -> Result<Self, SimApiError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(SimApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SimApiConfig {
        &self.config
    }

    pub fn results_url(&self) -> String {
        results_url(&self.config.base_url)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, SimApiError> {
        let mut out = HeaderMap::new();
        if let Some(user_agent) = self.config.user_agent.as_deref() {
            out.insert(
                USER_AGENT,
                HeaderValue::from_str(user_agent)
                    .map_err(|_| SimApiError::InvalidHeader("value for User-Agent".to_string()))?,
            );
        }
        for (key, value) in &self.config.extra_headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| SimApiError::InvalidHeader(format!("key: {key}")))?,
                HeaderValue::from_str(value)
                    .map_err(|_| SimApiError::InvalidHeader(format!("value for {key}")))?,
            );
        }
        Ok(out)
    }

    /// Posts a start request. Never retried: a retry could allocate a second
    /// backend session.
    pub async fn start_simulation(
        &self,
        request: &StartSimulationRequest,
    ) -> Result<SimulationId, SimApiError> {
        let mut builder = self
            .http
            .post(start_url(&self.config.base_url))
            .headers(self.build_headers()?)
            .json(request);
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<StartSimulationResponse>(&body) {
            Ok(StartSimulationResponse::Rejected { error }) => Err(SimApiError::Rejected(error)),
            Ok(StartSimulationResponse::Started { simulation_id }) if status.is_success() => {
                Ok(simulation_id)
            }
            _ if !status.is_success() => {
                Err(SimApiError::Status(status, parse_error_message(status, &body)))
            }
            _ => Err(SimApiError::MalformedResponse(format!(
                "start response has neither simulation_id nor error: {body}"
            ))),
        }
    }

    /// Posts a stop request for `simulation_id`. Never retried.
    pub async fn stop_simulation(&self, simulation_id: SimulationId) -> Result<(), SimApiError> {
        let mut builder = self
            .http
            .post(stop_url(&self.config.base_url, simulation_id))
            .headers(self.build_headers()?);
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SimApiError::Status(status, parse_error_message(status, &body)));
        }

        let parsed: StopSimulationResponse = serde_json::from_str(&body).unwrap_or_default();
        match parsed.error {
            Some(error) => Err(SimApiError::Rejected(error)),
            None => Ok(()),
        }
    }

    /// Opens the server-sent event stream. Resolves once the server has
    /// answered with a success status.
    pub async fn connect_events(
        &self,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<EventStream, SimApiError> {
        let mut headers = self.build_headers()?;
        headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM_MIME));
        let request = self
            .http
            .get(events_url(&self.config.base_url))
            .headers(headers)
            .send();

        let response = await_or_cancel(request, cancellation).await??;
        let status = response.status();
        if !status.is_success() {
            let body = await_or_cancel(response.text(), cancellation)
                .await?
                .unwrap_or_default();
            return Err(SimApiError::Status(status, parse_error_message(status, &body)));
        }

        Ok(EventStream::new(response))
    }
}

/// An open event stream yielding decoded event batches in arrival order.
pub struct EventStream {
    bytes: ByteStream,
    parser: SseStreamParser,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("parser", &self.parser)
            .finish_non_exhaustive()
    }
}

impl EventStream {
    fn new(response: Response) -> Self {
        Self {
            bytes: Box::pin(
                response
                    .bytes_stream()
                    .map(|chunk| chunk.map(|bytes| bytes.to_vec())),
            ),
            parser: SseStreamParser::default(),
        }
    }

    /// Waits for the next chunk that completes at least one frame.
    ///
    /// Returns `Ok(None)` when the server closes the stream.
    pub async fn next_events(
        &mut self,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Option<Vec<DecodedEvent>>, SimApiError> {
        loop {
            let Some(chunk) = await_or_cancel(self.bytes.next(), cancellation).await? else {
                return Ok(None);
            };
            let chunk = chunk.map_err(|error| SimApiError::StreamFailed(error.to_string()))?;
            let events = self.parser.feed(&chunk);
            if !events.is_empty() {
                return Ok(Some(events));
            }
        }
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, SimApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(SimApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(SimApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
