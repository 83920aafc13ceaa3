use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    cook::CookProgram,
    domain::{Device, DeviceId, Temperature, TemperatureUnit},
    protocol::Command,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub mod config;
pub mod correlator;
pub mod error;
pub mod message_log;
pub mod payload;
pub mod registry;
pub mod session;
pub mod transport;

pub use config::{load_settings, Settings};
pub use error::{CommandError, ConnectError, TransportError};
pub use message_log::{LogCursor, Message, MessageLog};
pub use payload::OvenPreset;
pub use session::Session;

/// What a front end (menu, CLI, UI) needs from the core.
#[async_trait]
pub trait ControllerHandle: Send + Sync {
    async fn connect(&self, token: &str) -> Result<(), ConnectError>;
    /// Waits for discovery and selects the first device found.
    async fn discover_and_select_device(&self) -> Option<Device>;
    async fn select_device(&self, id: &DeviceId) -> Option<Device>;
    async fn selected_device(&self) -> Option<Device>;
    async fn issue_command(
        &self,
        command: Command,
        timeout: Duration,
        warn_if_slow: bool,
    ) -> Result<Message, CommandError>;
    async fn recent_messages(&self, n: usize) -> Vec<Message>;
    async fn messages_since(&self, index: usize) -> Vec<Message>;
    async fn close(&self);
}

pub struct DeviceController {
    settings: Settings,
    inner: Mutex<ControllerState>,
}

struct ControllerState {
    session: Option<Arc<Session>>,
    selected: Option<Device>,
    /// Unit assumed for cook inputs; changes only after the device accepts it.
    temperature_unit: TemperatureUnit,
}

impl DeviceController {
    pub fn new(settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            inner: Mutex::new(ControllerState {
                session: None,
                selected: None,
                temperature_unit: TemperatureUnit::default(),
            }),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn temperature_unit(&self) -> TemperatureUnit {
        self.inner.lock().await.temperature_unit
    }

    pub async fn message_cursor(&self) -> Option<LogCursor> {
        let session = self.inner.lock().await.session.clone()?;
        Some(session.log().cursor().await)
    }

    async fn session(&self) -> Result<Arc<Session>, CommandError> {
        self.inner
            .lock()
            .await
            .session
            .clone()
            .ok_or(CommandError::NotConnected)
    }

    async fn target(&self) -> Result<(Device, TemperatureUnit), CommandError> {
        let inner = self.inner.lock().await;
        if inner.session.is_none() {
            return Err(CommandError::NotConnected);
        }
        let device = inner
            .selected
            .clone()
            .ok_or(CommandError::NoDeviceSelected)?;
        Ok((device, inner.temperature_unit))
    }

    pub async fn start_sous_vide(
        &self,
        value: f64,
        timer: Duration,
    ) -> Result<Message, CommandError> {
        let (device, unit) = self.target().await?;
        let command = payload::sous_vide(&device, Temperature { value, unit }, timer)?;
        self.issue_command(command, self.settings.command_timeout, false)
            .await
    }

    pub async fn start_oven(
        &self,
        preset: OvenPreset,
        value: f64,
        timer: Duration,
    ) -> Result<Message, CommandError> {
        let (device, unit) = self.target().await?;
        let command = payload::oven_preset(&device, preset, Temperature { value, unit }, timer)?;
        self.issue_command(command, self.settings.command_timeout, false)
            .await
    }

    pub async fn start_oven_program(&self, program: &CookProgram) -> Result<Message, CommandError> {
        let (device, _) = self.target().await?;
        let command = payload::start_oven(&device, program)?;
        self.issue_command(command, self.settings.command_timeout, false)
            .await
    }

    pub async fn stop(&self) -> Result<Message, CommandError> {
        let (device, _) = self.target().await?;
        self.issue_command(payload::stop(&device), self.settings.command_timeout, false)
            .await
    }

    pub async fn set_temperature_unit(
        &self,
        unit: TemperatureUnit,
    ) -> Result<Message, CommandError> {
        let (device, _) = self.target().await?;
        let response = self
            .issue_command(
                payload::set_temperature_unit(&device, unit),
                self.settings.command_timeout,
                false,
            )
            .await?;
        self.inner.lock().await.temperature_unit = unit;
        info!(%unit, "command: temperature unit preference saved");
        Ok(response)
    }

    /// Requests a telemetry export for `start..=end` (`YYYY-MM-DD`).
    pub async fn export_telemetry(&self, start: &str, end: &str) -> Result<Message, CommandError> {
        let (device, _) = self.target().await?;
        let command = payload::export_telemetry(&device, start, end, Utc::now().date_naive())?;
        self.issue_command(command, self.settings.export_timeout, true)
            .await
    }
}

#[async_trait]
impl ControllerHandle for DeviceController {
    async fn connect(&self, token: &str) -> Result<(), ConnectError> {
        let previous = {
            let mut inner = self.inner.lock().await;
            inner.selected = None;
            inner.session.take()
        };
        if let Some(previous) = previous {
            previous.close().await;
        }

        let session = Session::connect(&self.settings, token).await?;
        self.inner.lock().await.session = Some(Arc::new(session));
        Ok(())
    }

    async fn discover_and_select_device(&self) -> Option<Device> {
        let Ok(session) = self.session().await else {
            warn!("discovery: not connected");
            return None;
        };
        let devices = session.discover().await;
        let Some(device) = devices.into_iter().next() else {
            info!("discovery: no devices found");
            return None;
        };

        info!(
            device_id = %device.id,
            family = %device.family,
            name = %device.name,
            "discovery: selected device"
        );
        self.inner.lock().await.selected = Some(device.clone());
        Some(device)
    }

    async fn select_device(&self, id: &DeviceId) -> Option<Device> {
        let session = self.session().await.ok()?;
        let device = session.registry().get(id).await?;
        self.inner.lock().await.selected = Some(device.clone());
        Some(device)
    }

    async fn selected_device(&self) -> Option<Device> {
        self.inner.lock().await.selected.clone()
    }

    async fn issue_command(
        &self,
        command: Command,
        timeout: Duration,
        warn_if_slow: bool,
    ) -> Result<Message, CommandError> {
        let session = self.session().await?;
        if !session.is_alive().await {
            warn!(command = %command.command, "command: session is no longer receiving");
            return Err(CommandError::NotConnected);
        }
        if warn_if_slow {
            info!(
                command = %command.command,
                timeout_secs = timeout.as_secs(),
                "command: waiting, this may take a while"
            );
        }

        let result = session.send_and_await(&command, timeout).await;
        if let (true, Err(CommandError::Timeout { command: kind, .. })) = (warn_if_slow, &result) {
            warn!(command = %kind, "command: timed out, the device may still complete it");
        }
        result
    }

    async fn recent_messages(&self, n: usize) -> Vec<Message> {
        match self.session().await {
            Ok(session) => session.log().recent(n).await,
            Err(_) => Vec::new(),
        }
    }

    async fn messages_since(&self, index: usize) -> Vec<Message> {
        match self.session().await {
            Ok(session) => session.log().since(index).await,
            Err(_) => Vec::new(),
        }
    }

    async fn close(&self) {
        let session = {
            let mut inner = self.inner.lock().await;
            inner.selected = None;
            inner.session.take()
        };
        if let Some(session) = session {
            session.close().await;
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
