use std::{collections::HashMap, fs, path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub endpoint: String,
    pub supported_accessories: Vec<String>,
    /// Tokens without this prefix are refused before dialing out.
    pub token_prefix: Option<String>,
    pub connect_timeout: Duration,
    /// Receive wait before the listener logs a liveness probe and waits again.
    pub idle_frame_timeout: Duration,
    pub shutdown_grace: Duration,
    pub discovery_timeout: Duration,
    pub poll_interval: Duration,
    pub command_timeout: Duration,
    pub export_timeout: Duration,
    /// `None` keeps every inbound message.
    pub message_retention: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: "wss://devices.anovaculinary.io".into(),
            supported_accessories: vec!["APC".into(), "APO".into()],
            token_prefix: Some("anova-".into()),
            connect_timeout: Duration::from_secs(10),
            idle_frame_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(2),
            discovery_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            command_timeout: Duration::from_secs(10),
            export_timeout: Duration::from_secs(30),
            message_retention: None,
        }
    }
}

/// Defaults, then `client.toml` in the working directory, then environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    let path = Path::new(DEFAULT_SETTINGS_FILE);
    if path.exists() {
        match read_settings_file(path) {
            Ok(file_cfg) => apply_overrides(&mut settings, |key| file_cfg.get(key).cloned()),
            Err(err) => warn!(path = %path.display(), "config: ignoring settings file: {err:#}"),
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub fn read_settings_file(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    toml::from_str::<HashMap<String, String>>(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))
}

/// Plain names first, then their `APP__` variants, which win.
pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    apply_overrides(settings, |key| lookup(&key.to_ascii_uppercase()));
    apply_overrides(settings, |key| {
        lookup(&format!("APP__{}", key.to_ascii_uppercase()))
    });
}

pub fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("endpoint") {
        settings.endpoint = v;
    }
    if let Some(v) = lookup("supported_accessories") {
        let accessories: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if accessories.is_empty() {
            warn!("config: supported_accessories is empty, keeping previous value");
        } else {
            settings.supported_accessories = accessories;
        }
    }
    if let Some(v) = lookup("token_prefix") {
        settings.token_prefix = if v.is_empty() { None } else { Some(v) };
    }

    override_millis(&lookup, "connect_timeout_ms", &mut settings.connect_timeout);
    override_millis(&lookup, "idle_frame_timeout_ms", &mut settings.idle_frame_timeout);
    override_millis(&lookup, "shutdown_grace_ms", &mut settings.shutdown_grace);
    override_millis(&lookup, "discovery_timeout_ms", &mut settings.discovery_timeout);
    override_millis(&lookup, "poll_interval_ms", &mut settings.poll_interval);
    override_millis(&lookup, "command_timeout_ms", &mut settings.command_timeout);
    override_millis(&lookup, "export_timeout_ms", &mut settings.export_timeout);

    if let Some(v) = lookup("message_retention") {
        if v.is_empty() || v == "0" {
            settings.message_retention = None;
        } else if let Some(parsed) = parse_value::<usize>("message_retention", &v) {
            settings.message_retention = Some(parsed);
        }
    }
}

fn override_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    target: &mut Duration,
) {
    if let Some(parsed) = lookup(key).and_then(|v| parse_value::<u64>(key, &v)) {
        *target = Duration::from_millis(parsed);
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = raw, "config: ignoring unparseable value");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
