use std::{sync::Arc, time::Duration};

use shared::{domain::Device, protocol::Command};
use tracing::info;

use crate::{
    config::Settings,
    correlator::Correlator,
    error::{CommandError, ConnectError},
    message_log::{Message, MessageLog},
    registry::DeviceRegistry,
    transport::{FrameSink, SessionTransport},
};

/// One live connection and everything observed on it.
pub struct Session {
    log: MessageLog,
    registry: Arc<DeviceRegistry>,
    transport: Arc<SessionTransport>,
    correlator: Correlator,
    discovery_timeout: Duration,
    poll_interval: Duration,
}

impl Session {
    pub async fn connect(settings: &Settings, token: &str) -> Result<Self, ConnectError> {
        let log = MessageLog::with_retention(settings.message_retention);
        let registry = Arc::new(DeviceRegistry::new());
        let transport = Arc::new(
            SessionTransport::connect(settings, token, log.clone(), registry.clone()).await?,
        );
        Ok(Self::from_transport(settings, log, registry, transport))
    }

    pub(crate) fn from_transport(
        settings: &Settings,
        log: MessageLog,
        registry: Arc<DeviceRegistry>,
        transport: Arc<SessionTransport>,
    ) -> Self {
        let sink: Arc<dyn FrameSink> = transport.clone();
        Self {
            correlator: Correlator::new(sink, log.clone(), settings.poll_interval),
            log,
            registry,
            transport,
            discovery_timeout: settings.discovery_timeout,
            poll_interval: settings.poll_interval,
        }
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub async fn discover(&self) -> Vec<Device> {
        let devices = self
            .registry
            .discover(&self.log, self.discovery_timeout, self.poll_interval)
            .await;
        info!(count = devices.len(), "discovery: finished");
        devices
    }

    pub async fn send_and_await(
        &self,
        command: &Command,
        timeout: Duration,
    ) -> Result<Message, CommandError> {
        self.correlator.send_and_await(command, timeout).await
    }

    /// False once the receive loop has stopped; the session must be replaced.
    pub async fn is_alive(&self) -> bool {
        self.transport.is_receiving().await
    }

    pub async fn close(&self) {
        self.transport.close().await;
        info!("session: closed");
    }
}
