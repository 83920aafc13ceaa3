use std::{pin::Pin, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    config::Settings,
    error::{ConnectError, TransportError},
    message_log::{Message, MessageLog},
    registry::DeviceRegistry,
};

const CLOSE_SLACK: Duration = Duration::from_millis(250);

pub type FrameWriter = Pin<Box<dyn Sink<WsMessage, Error = tungstenite::Error> + Send>>;

#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), TransportError>;
}

pub fn check_token(settings: &Settings, token: &str) -> Result<(), ConnectError> {
    if token.trim().is_empty() {
        return Err(ConnectError::EmptyToken);
    }
    if let Some(prefix) = &settings.token_prefix {
        if !token.starts_with(prefix.as_str()) {
            return Err(ConnectError::MalformedToken {
                prefix: prefix.clone(),
            });
        }
    }
    Ok(())
}

pub fn build_endpoint_url(settings: &Settings, token: &str) -> Result<Url, ConnectError> {
    let mut url = Url::parse(&settings.endpoint)?;
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair(
            "supportedAccessories",
            &settings.supported_accessories.join(","),
        );
    Ok(url)
}

pub struct SessionTransport {
    writer: Mutex<Option<FrameWriter>>,
    receiver: Mutex<Option<ReceiverHandle>>,
    shutdown_grace: Duration,
}

impl SessionTransport {
    pub async fn connect(
        settings: &Settings,
        token: &str,
        log: MessageLog,
        registry: Arc<DeviceRegistry>,
    ) -> Result<Self, ConnectError> {
        check_token(settings, token)?;
        let url = build_endpoint_url(settings, token)?;

        info!(endpoint = %settings.endpoint, "session: connecting");
        let handshake = connect_async(url.as_str());
        let (ws_stream, _) = tokio::time::timeout(settings.connect_timeout, handshake)
            .await
            .map_err(|_| ConnectError::Timeout(settings.connect_timeout))?
            .map_err(|err| ConnectError::Handshake(Box::new(err)))?;
        let (ws_writer, ws_reader) = ws_stream.split();
        info!(endpoint = %settings.endpoint, "session: connected");

        let receiver = ReceiverHandle::spawn(ws_reader, log, registry, settings.idle_frame_timeout);
        Ok(Self::from_parts(
            Box::pin(ws_writer),
            receiver,
            settings.shutdown_grace,
        ))
    }

    pub(crate) fn from_parts(
        writer: FrameWriter,
        receiver: ReceiverHandle,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
            receiver: Mutex::new(Some(receiver)),
            shutdown_grace,
        }
    }

    pub async fn is_receiving(&self) -> bool {
        self.receiver
            .lock()
            .await
            .as_ref()
            .is_some_and(|receiver| !receiver.is_finished())
    }

    /// Bounded by the shutdown grace plus `CLOSE_SLACK`. Idempotent.
    pub async fn close(&self) {
        let deadline = Instant::now() + self.shutdown_grace + CLOSE_SLACK;

        let receiver = self.receiver.lock().await.take();
        if let Some(receiver) = receiver {
            debug!("session: stopping receive loop");
            receiver.stop(self.shutdown_grace).await;
        }

        let writer = match tokio::time::timeout_at(deadline, self.writer.lock()).await {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                warn!("session: writer still busy, skipping websocket close");
                None
            }
        };
        if let Some(mut writer) = writer {
            debug!("session: closing websocket");
            match tokio::time::timeout_at(deadline, writer.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("session: error closing websocket: {err}"),
                Err(_) => warn!("session: websocket close timed out"),
            }
        }
    }
}

#[async_trait]
impl FrameSink for SessionTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;
        writer
            .send(WsMessage::Text(text))
            .await
            .map_err(|err| TransportError::Send(Box::new(err)))
    }
}

pub(crate) struct ReceiverHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReceiverHandle {
    pub(crate) fn spawn<S>(
        reader: S,
        log: MessageLog,
        registry: Arc<DeviceRegistry>,
        idle_timeout: Duration,
    ) -> Self
    where
        S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Send + Unpin + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(receive_loop(
            reader,
            log,
            registry,
            idle_timeout,
            shutdown_rx,
        ));
        Self { shutdown, task }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub(crate) async fn stop(mut self, grace: Duration) {
        let _ = self.shutdown.send(true);
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => debug!("session: receive loop stopped"),
            Ok(Err(err)) if err.is_cancelled() => {}
            Ok(Err(err)) => warn!("session: receive loop ended abnormally: {err}"),
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "session: receive loop ignored shutdown, aborting"
                );
                self.task.abort();
            }
        }
    }
}

pub(crate) async fn receive_loop<S>(
    mut reader: S,
    log: MessageLog,
    registry: Arc<DeviceRegistry>,
    idle_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    info!("session: receive loop started");
    let mut last_frame_at = Instant::now();

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("session: receive loop cancelled");
                break;
            }
            next = tokio::time::timeout(idle_timeout, reader.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                info!(
                    idle_secs = last_frame_at.elapsed().as_secs(),
                    "session: no frames received, listener still active"
                );
                continue;
            }
            Ok(None) => {
                info!("session: websocket stream ended");
                break;
            }
            Ok(Some(frame)) => frame,
        };

        match frame {
            Ok(WsMessage::Text(text)) => {
                last_frame_at = Instant::now();
                ingest_frame(&log, &registry, text).await;
            }
            Ok(WsMessage::Binary(bytes)) => {
                last_frame_at = Instant::now();
                match String::from_utf8(bytes) {
                    Ok(text) => ingest_frame(&log, &registry, text).await,
                    Err(err) => warn!("session: dropping non-utf8 binary frame: {err}"),
                }
            }
            Ok(WsMessage::Close(close)) => {
                info!(?close, "session: server closed the connection");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                info!("session: websocket connection closed");
                break;
            }
            Err(err @ (tungstenite::Error::Utf8 | tungstenite::Error::Capacity(_))) => {
                warn!("session: dropping unreadable frame: {err}");
            }
            Err(err) => {
                error!("session: websocket receive failed: {err}");
                break;
            }
        }
    }
}

async fn ingest_frame(log: &MessageLog, registry: &DeviceRegistry, text: String) {
    match Message::from_frame(text, Utc::now()) {
        Ok(message) => {
            let observed = message.clone();
            log.append(message).await;
            registry.observe(&observed).await;
        }
        Err(err) => warn!("session: dropping malformed frame: {err}"),
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
