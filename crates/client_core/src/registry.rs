use std::time::Duration;

use serde_json::Value;
use shared::{
    domain::{Device, DeviceFamily, DeviceId, UNKNOWN_DEVICE_TYPE},
    protocol::{discovery_family, DeviceDescriptor},
};
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, info, warn};

use crate::message_log::{Message, MessageLog};

/// Devices announced by discovery events, in first-seen order.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<Vec<Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records devices from a discovery event. Identifiers already known are
    /// dropped without overwriting. Returns how many devices were added.
    pub async fn observe(&self, message: &Message) -> usize {
        let Some(family) = discovery_family(&message.command) else {
            return 0;
        };
        let Value::Array(entries) = &message.payload else {
            warn!(
                command = %message.command,
                "discovery: device list payload is not a list"
            );
            return 0;
        };

        let mut guard = self.devices.write().await;
        let mut added = 0;
        for entry in entries {
            let descriptor = match serde_json::from_value::<DeviceDescriptor>(entry.clone()) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    warn!(command = %message.command, "discovery: skipping descriptor: {err}");
                    continue;
                }
            };
            if guard.iter().any(|d| d.id.as_str() == descriptor.cooker_id) {
                continue;
            }
            let device = device_from_descriptor(family, descriptor);
            info!(
                device_id = %device.id,
                family = %device.family,
                protocol_version = %device.protocol_version,
                "discovery: found device"
            );
            guard.push(device);
            added += 1;
        }
        added
    }

    pub async fn devices(&self) -> Vec<Device> {
        self.devices.read().await.clone()
    }

    pub async fn get(&self, id: &DeviceId) -> Option<Device> {
        self.devices
            .read()
            .await
            .iter()
            .find(|device| &device.id == id)
            .cloned()
    }

    /// Scans the log for discovery events until a device is known or
    /// `timeout` passes. An empty result means no devices, not a failure.
    pub async fn discover(
        &self,
        log: &MessageLog,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Vec<Device> {
        let deadline = Instant::now() + timeout;
        let mut next = 0;

        loop {
            for message in log.since(next).await {
                next = message.sequence + 1;
                self.observe(&message).await;
            }

            let devices = self.devices().await;
            if !devices.is_empty() {
                return devices;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(timeout_ms = timeout.as_millis() as u64, "discovery: no devices found");
                return devices;
            }
            log.wait_for_growth(next, remaining.min(poll_interval)).await;
        }
    }
}

fn device_from_descriptor(family: DeviceFamily, descriptor: DeviceDescriptor) -> Device {
    Device {
        id: DeviceId(descriptor.cooker_id),
        name: descriptor
            .name
            .unwrap_or_else(|| family.default_name().to_string()),
        family,
        protocol_version: descriptor
            .device_type
            .unwrap_or_else(|| UNKNOWN_DEVICE_TYPE.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
