//! Long-lived OBS WebSocket connection.
//!
//! [`ObsConnection::run`] owns the socket: it performs the Hello/Identify
//! handshake, routes request responses back to their callers and tracks
//! `RecordStateChanged` events. When the socket drops it waits
//! [`ReconnectPolicy::delay`] and connects again until cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::auth::authentication_string;
use super::protocol::{
    Identify, RecordStateChanged, RecordStatus, Request, RequestResponse, ServerMessage,
    GET_RECORD_STATUS, RECORD_STATE_CHANGED,
};
use super::RecorderClient;
use crate::config::{MarkerServerConfig, ReconnectPolicy};
use crate::error::{ObsError, ObsResult};
use crate::metrics;

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct ObsSettings {
    pub url: Url,
    pub password: Option<String>,
    /// Bounds each request round-trip and each handshake step
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ObsSettings {
    pub fn from_config(config: &MarkerServerConfig) -> ObsResult<Self> {
        Ok(Self {
            url: config.obs_url()?,
            password: config.obs_password.clone(),
            request_timeout: config.obs_request_timeout,
            reconnect: config.reconnect,
        })
    }
}

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    recording: AtomicBool,
    /// Frames queued for the socket writer; `None` while disconnected
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<RequestResponse>>>,
    next_request: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the recorder connection. Clones share one socket.
#[derive(Clone)]
pub struct ObsConnection {
    settings: Arc<ObsSettings>,
    shared: Arc<Shared>,
}

impl ObsConnection {
    pub fn new(settings: ObsSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Run the connection loop on a background task.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let connection = self.clone();
        tokio::spawn(async move { connection.run(cancel).await })
    }

    /// Connect, serve, and reconnect until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let delay = self.settings.reconnect.delay;

        loop {
            info!(url = %self.settings.url, "Connecting to OBS WebSocket");

            match self.session(&cancel).await {
                Ok(()) => info!("OBS WebSocket session ended"),
                Err(e) if !e.is_retryable() => {
                    error!(error = %e, "OBS WebSocket connection rejected");
                }
                Err(e) => {
                    warn!(error = %e, retry_in_secs = delay.as_secs(), "OBS WebSocket unavailable");
                }
            }
            self.detach();

            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("OBS connection stopped");
    }

    async fn session(&self, cancel: &CancellationToken) -> ObsResult<()> {
        let timeout = self.settings.request_timeout;

        let connect = tokio::time::timeout(timeout, connect_async(self.settings.url.as_str()));
        let (socket, _response) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            connected = connect => connected
                .map_err(|_| ObsError::connect(format!("no answer from {}", self.settings.url)))??,
        };
        let (mut sink, mut stream) = socket.split();

        let hello = match step(timeout, "Hello", next_message(&mut stream)).await? {
            ServerMessage::Hello(hello) => hello,
            other => return Err(ObsError::protocol(format!("expected Hello, got {:?}", other))),
        };

        let authentication = match (&hello.authentication, &self.settings.password) {
            (Some(auth), Some(password)) => {
                Some(authentication_string(password, &auth.salt, &auth.challenge))
            }
            (Some(_), None) => return Err(ObsError::PasswordRequired),
            (None, _) => None,
        };
        sink.send(Message::Text(Identify::new(authentication).encode()?))
            .await?;

        let identified = match step(timeout, "Identify", next_message(&mut stream)).await? {
            ServerMessage::Identified(identified) => identified,
            other => {
                return Err(ObsError::protocol(format!("expected Identified, got {:?}", other)))
            }
        };
        info!(
            obs_version = hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
            rpc_version = identified.negotiated_rpc_version,
            "Connected to OBS WebSocket"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        self.attach(tx);
        self.seed_recording_state();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(frame) = rx.recv() => {
                    sink.send(Message::Text(frame)).await?;
                }
                message = next_message(&mut stream) => match message {
                    Ok(message) => self.dispatch(message),
                    Err(ObsError::Json(e)) => warn!(error = %e, "Skipping malformed OBS message"),
                    Err(e) => return Err(e),
                },
            }
        }
    }

    fn attach(&self, outbound: mpsc::UnboundedSender<String>) {
        *lock(&self.shared.outbound) = Some(outbound);
        self.shared.connected.store(true, Ordering::SeqCst);
        metrics::record_obs_connected(true);
    }

    fn detach(&self) {
        let was_connected = self.shared.connected.swap(false, Ordering::SeqCst);
        self.shared.recording.store(false, Ordering::SeqCst);
        *lock(&self.shared.outbound) = None;
        // Dropping the senders fails every in-flight request with `Closed`
        lock(&self.shared.pending).clear();
        if was_connected {
            metrics::record_obs_connected(false);
        }
    }

    /// Query the recording state once the session is up.
    fn seed_recording_state(&self) {
        let connection = self.clone();
        tokio::spawn(async move {
            match connection.record_status().await {
                Ok(status) if status.output_active => info!("Recording is active"),
                Ok(_) => info!("Recording is not active"),
                Err(e) => debug!(error = %e, "Initial recording status unavailable"),
            }
        });
    }

    fn dispatch(&self, message: ServerMessage) {
        match message {
            ServerMessage::RequestResponse(response) => {
                let waiter = lock(&self.shared.pending).remove(&response.request_id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => debug!(request_id = %response.request_id, "Response for unknown request"),
                }
            }
            ServerMessage::Event(event) if event.event_type == RECORD_STATE_CHANGED => {
                match serde_json::from_value::<RecordStateChanged>(event.event_data) {
                    Ok(change) => {
                        self.shared
                            .recording
                            .store(change.output_active, Ordering::SeqCst);
                        info!(
                            recording = change.output_active,
                            state = change.output_state.as_deref().unwrap_or(""),
                            "Recording state changed"
                        );
                    }
                    Err(e) => warn!(error = %e, "Unreadable RecordStateChanged event"),
                }
            }
            ServerMessage::Event(_) => {}
            other => debug!(message = ?other, "Ignoring OBS message"),
        }
    }

    /// Send one request and wait for its response.
    async fn request(&self, request_type: &'static str) -> ObsResult<RequestResponse> {
        let seq = self.shared.next_request.fetch_add(1, Ordering::Relaxed) + 1;
        let request_id = format!("obsclip-{}", seq);
        let frame = Request {
            request_type,
            request_id: &request_id,
        }
        .encode()?;

        let (tx, rx) = oneshot::channel();
        {
            let outbound = lock(&self.shared.outbound);
            let Some(sender) = outbound.as_ref() else {
                return Err(ObsError::NotConnected);
            };
            lock(&self.shared.pending).insert(request_id.clone(), tx);
            if sender.send(frame).is_err() {
                lock(&self.shared.pending).remove(&request_id);
                return Err(ObsError::NotConnected);
            }
        }

        let start = Instant::now();
        let result = match tokio::time::timeout(self.settings.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ObsError::Closed),
            Err(_) => {
                lock(&self.shared.pending).remove(&request_id);
                Err(ObsError::Timeout(request_type.to_string()))
            }
        };
        metrics::record_obs_request(request_type, result.is_ok(), start.elapsed().as_secs_f64());
        result
    }
}

#[async_trait]
impl RecorderClient for ObsConnection {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    async fn record_status(&self) -> ObsResult<RecordStatus> {
        let status: RecordStatus = self.request(GET_RECORD_STATUS).await?.into_data()?;
        self.shared
            .recording
            .store(status.output_active, Ordering::SeqCst);
        Ok(status)
    }
}

/// Bound one handshake step.
async fn step<F>(timeout: Duration, name: &str, fut: F) -> ObsResult<ServerMessage>
where
    F: std::future::Future<Output = ObsResult<ServerMessage>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ObsError::Timeout(name.to_string()))?
}

/// Next decodable frame; control frames are skipped.
async fn next_message<S>(stream: &mut S) -> ObsResult<ServerMessage>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return ServerMessage::parse(&text),
            Some(Ok(Message::Binary(bytes))) => {
                return ServerMessage::parse(&String::from_utf8_lossy(&bytes))
            }
            Some(Ok(Message::Close(frame))) => {
                info!(frame = ?frame, "OBS closed the WebSocket");
                return Err(ObsError::Closed);
            }
            // Ping/Pong are answered by tungstenite
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ObsError::Closed),
        }
    }
}
