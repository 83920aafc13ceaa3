use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Descriptor `type` that selects the condition-tree oven payloads.
pub const OVEN_V2_DEVICE_TYPE: &str = "oven_v2";
pub const UNKNOWN_DEVICE_TYPE: &str = "unknown";

pub const EXPORT_MAX_RANGE_DAYS: i64 = 14;
pub const EXPORT_MAX_AGE_DAYS: i64 = 90;
const EXPORT_DATE_FORMAT: &str = "%Y-%m-%d";

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(DeviceId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFamily {
    /// Immersion circulator.
    #[serde(rename = "APC")]
    Apc,
    /// Combi oven.
    #[serde(rename = "APO")]
    Apo,
}

impl DeviceFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apc => "APC",
            Self::Apo => "APO",
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            Self::Apc => "Anova Precision Cooker",
            Self::Apo => "Anova Precision Oven",
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvenGeneration {
    /// Flat stage list keyed by `stepType`/`stageTransitionType`.
    V1,
    /// Stage list with `do`/`exit` condition trees.
    V2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub family: DeviceFamily,
    /// Raw descriptor `type`, echoed back in several command payloads.
    pub protocol_version: String,
}

impl Device {
    pub fn oven_generation(&self) -> OvenGeneration {
        if self.protocol_version == OVEN_V2_DEVICE_TYPE {
            OvenGeneration::V2
        } else {
            OvenGeneration::V1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "C")]
    Celsius,
    #[serde(rename = "F")]
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "C",
            Self::Fahrenheit => "F",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "C" => Some(Self::Celsius),
            "F" => Some(Self::Fahrenheit),
            _ => None,
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "°{}", self.symbol())
    }
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// A user-entered temperature in whichever unit the user typed it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature {
    pub value: f64,
    pub unit: TemperatureUnit,
}

impl Temperature {
    pub fn celsius(value: f64) -> Self {
        Self {
            value,
            unit: TemperatureUnit::Celsius,
        }
    }

    pub fn fahrenheit(value: f64) -> Self {
        Self {
            value,
            unit: TemperatureUnit::Fahrenheit,
        }
    }

    pub fn to_celsius(self) -> f64 {
        match self.unit {
            TemperatureUnit::Celsius => self.value,
            TemperatureUnit::Fahrenheit => fahrenheit_to_celsius(self.value),
        }
    }
}

/// Validated telemetry export date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ExportWindow {
    /// Parses `YYYY-MM-DD` bounds. The range may span at most
    /// [`EXPORT_MAX_RANGE_DAYS`] and must not start more than
    /// [`EXPORT_MAX_AGE_DAYS`] before `today`.
    pub fn parse(start: &str, end: &str, today: NaiveDate) -> Result<Self, ValidationError> {
        let start = parse_export_date(start)?;
        let end = parse_export_date(end)?;

        if end < start {
            return Err(ValidationError::ExportRangeReversed { start, end });
        }
        let span = (end - start).num_days();
        if span > EXPORT_MAX_RANGE_DAYS {
            return Err(ValidationError::ExportRangeTooLong {
                days: span,
                max: EXPORT_MAX_RANGE_DAYS,
            });
        }
        let age = (today - start).num_days();
        if age > EXPORT_MAX_AGE_DAYS {
            return Err(ValidationError::ExportStartTooOld {
                start,
                max_age_days: EXPORT_MAX_AGE_DAYS,
            });
        }

        Ok(Self { start, end })
    }

    pub fn start_string(&self) -> String {
        self.start.format(EXPORT_DATE_FORMAT).to_string()
    }

    pub fn end_string(&self) -> String {
        self.end.format(EXPORT_DATE_FORMAT).to_string()
    }
}

fn parse_export_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), EXPORT_DATE_FORMAT).map_err(|_| {
        ValidationError::InvalidDate {
            value: raw.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn fahrenheit_sous_vide_ceiling_converts_to_95_celsius() {
        let celsius = Temperature::fahrenheit(203.0).to_celsius();
        assert!((celsius - 95.0).abs() < 0.05, "got {celsius}");
    }

    #[test]
    fn only_oven_v2_selects_condition_tree_generation() {
        let mut device = Device {
            id: DeviceId::from("oven-1"),
            name: "Oven".into(),
            family: DeviceFamily::Apo,
            protocol_version: OVEN_V2_DEVICE_TYPE.into(),
        };
        assert_eq!(device.oven_generation(), OvenGeneration::V2);

        device.protocol_version = "oven_v1".into();
        assert_eq!(device.oven_generation(), OvenGeneration::V1);
        device.protocol_version = UNKNOWN_DEVICE_TYPE.into();
        assert_eq!(device.oven_generation(), OvenGeneration::V1);
    }

    #[test]
    fn temperature_unit_parse_is_case_insensitive() {
        assert_eq!(TemperatureUnit::parse(" f "), Some(TemperatureUnit::Fahrenheit));
        assert_eq!(TemperatureUnit::parse("c"), Some(TemperatureUnit::Celsius));
        assert_eq!(TemperatureUnit::parse("K"), None);
    }

    #[test]
    fn export_window_accepts_fourteen_days() {
        let window =
            ExportWindow::parse("2026-10-01", "2026-10-15", date("2026-10-16")).expect("window");
        assert_eq!(window.start_string(), "2026-10-01");
        assert_eq!(window.end_string(), "2026-10-15");
    }

    #[test]
    fn export_window_rejects_fifteen_days() {
        let err = ExportWindow::parse("2026-10-01", "2026-10-16", date("2026-10-16"))
            .expect_err("too long");
        assert_eq!(
            err,
            ValidationError::ExportRangeTooLong {
                days: 15,
                max: EXPORT_MAX_RANGE_DAYS
            }
        );
    }

    #[test]
    fn export_window_rejects_stale_start() {
        let err = ExportWindow::parse("2026-07-17", "2026-07-18", date("2026-10-16"))
            .expect_err("too old");
        assert!(matches!(err, ValidationError::ExportStartTooOld { .. }));

        ExportWindow::parse("2026-07-18", "2026-07-19", date("2026-10-16"))
            .expect("exactly 90 days old is allowed");
    }

    #[test]
    fn export_window_rejects_bad_dates() {
        let err = ExportWindow::parse("2026/10/01", "2026-10-02", date("2026-10-16"))
            .expect_err("format");
        assert_eq!(
            err,
            ValidationError::InvalidDate {
                value: "2026/10/01".into()
            }
        );

        let err = ExportWindow::parse("2026-10-05", "2026-10-01", date("2026-10-16"))
            .expect_err("reversed");
        assert!(matches!(err, ValidationError::ExportRangeReversed { .. }));
    }
}
