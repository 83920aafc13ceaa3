use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{DeviceFamily, TemperatureUnit};

/// Rejected cook or export parameters. Raised before anything touches the wire.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("temperature must be a finite number")]
    NotFinite,
    #[error("{operation} temperature {value}{unit} exceeds the maximum of {max}{unit}")]
    AboveCeiling {
        operation: &'static str,
        value: f64,
        max: f64,
        unit: TemperatureUnit,
    },
    #[error("{operation} temperature {value}{unit} is below the minimum of {min}{unit}")]
    BelowFloor {
        operation: &'static str,
        value: f64,
        min: f64,
        unit: TemperatureUnit,
    },
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("dry-bulb target {celsius}°C exceeds {max}°C with only the bottom element on")]
    BottomElementLimit { celsius: f64, max: f64 },
    #[error("a cook program needs at least one stage")]
    EmptyProgram,
    #[error("{operation} is not supported on {family} devices")]
    UnsupportedDevice {
        operation: &'static str,
        family: DeviceFamily,
    },
    #[error("invalid date `{value}`: expected YYYY-MM-DD")]
    InvalidDate { value: String },
    #[error("export end {end} is before start {start}")]
    ExportRangeReversed { start: NaiveDate, end: NaiveDate },
    #[error("export range spans {days} days, maximum is {max}")]
    ExportRangeTooLong { days: i64, max: i64 },
    #[error("export start {start} is more than {max_age_days} days in the past")]
    ExportStartTooOld { start: NaiveDate, max_age_days: i64 },
}
