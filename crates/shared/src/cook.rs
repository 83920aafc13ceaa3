//! Oven cook programs. A [`CookProgram`] is an ordered list of validated
//! [`Stage`]s; the protocol layer turns it into either oven payload shape.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const WET_BULB_RANGE_C: (f64, f64) = (25.0, 100.0);
pub const DRY_BULB_RANGE_C: (f64, f64) = (25.0, 250.0);
pub const PROBE_RANGE_C: (f64, f64) = (1.0, 100.0);
/// Hardware limit for the dry bulb when only the bottom element heats.
pub const BOTTOM_ONLY_DRY_MAX_C: f64 = 180.0;
pub const MAX_FAN_SPEED: u8 = 100;
pub const MAX_STEAM_SETPOINT: u8 = 100;
pub const RACK_POSITIONS: (u8, u8) = (1, 5);
pub const DEFAULT_RACK_POSITION: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Preheat,
    Cook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulbMode {
    Dry,
    Wet,
}

/// Dry- and wet-bulb control are mutually exclusive, so a stage carries
/// exactly one mode and its Celsius target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureBulb {
    pub mode: BulbMode,
    pub celsius: f64,
}

impl TemperatureBulb {
    pub fn dry(celsius: f64) -> Self {
        Self {
            mode: BulbMode::Dry,
            celsius,
        }
    }

    pub fn wet(celsius: f64) -> Self {
        Self {
            mode: BulbMode::Wet,
            celsius,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let (field, (min, max)) = match self.mode {
            BulbMode::Dry => ("dry-bulb temperature", DRY_BULB_RANGE_C),
            BulbMode::Wet => ("wet-bulb temperature", WET_BULB_RANGE_C),
        };
        check_range(field, self.celsius, min, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatingElements {
    pub top: bool,
    pub bottom: bool,
    pub rear: bool,
}

impl HeatingElements {
    pub const TOP_ONLY: Self = Self::new(true, false, false);
    pub const BOTTOM_ONLY: Self = Self::new(false, true, false);
    pub const REAR_ONLY: Self = Self::new(false, false, true);
    pub const TOP_AND_REAR: Self = Self::new(true, false, true);
    pub const TOP_AND_BOTTOM: Self = Self::new(true, true, false);
    pub const BOTTOM_AND_REAR: Self = Self::new(false, true, true);
    pub const ALL: Self = Self::new(true, true, true);

    pub const fn new(top: bool, bottom: bool, rear: bool) -> Self {
        Self { top, bottom, rear }
    }

    pub fn is_bottom_only(&self) -> bool {
        self.bottom && !self.top && !self.rear
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteamSetting {
    Idle,
    RelativeHumidity(u8),
    SteamPercentage(u8),
}

impl SteamSetting {
    fn setpoint(&self) -> Option<u8> {
        match self {
            Self::Idle => None,
            Self::RelativeHumidity(value) | Self::SteamPercentage(value) => Some(*value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Automatic,
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    kind: StageKind,
    bulb: TemperatureBulb,
    heating_elements: HeatingElements,
    fan_speed: u8,
    probe_celsius: Option<f64>,
    steam: SteamSetting,
    rack_position: u8,
    transition: Transition,
    user_action_required: bool,
    timer: Option<Duration>,
    title: String,
    description: String,
}

impl Stage {
    pub fn builder(kind: StageKind, bulb: TemperatureBulb) -> StageBuilder {
        StageBuilder {
            stage: Stage {
                kind,
                bulb,
                heating_elements: HeatingElements::REAR_ONLY,
                fan_speed: MAX_FAN_SPEED,
                probe_celsius: None,
                steam: SteamSetting::Idle,
                rack_position: DEFAULT_RACK_POSITION,
                transition: Transition::Automatic,
                user_action_required: false,
                timer: None,
                title: String::new(),
                description: String::new(),
            },
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn bulb(&self) -> TemperatureBulb {
        self.bulb
    }

    pub fn heating_elements(&self) -> HeatingElements {
        self.heating_elements
    }

    pub fn fan_speed(&self) -> u8 {
        self.fan_speed
    }

    pub fn probe_celsius(&self) -> Option<f64> {
        self.probe_celsius
    }

    pub fn steam(&self) -> SteamSetting {
        self.steam
    }

    pub fn rack_position(&self) -> u8 {
        self.rack_position
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn user_action_required(&self) -> bool {
        self.user_action_required
    }

    pub fn timer(&self) -> Option<Duration> {
        self.timer
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self) -> Result<(), ValidationError> {
        self.bulb.validate()?;

        if self.heating_elements.is_bottom_only()
            && self.bulb.mode == BulbMode::Dry
            && self.bulb.celsius > BOTTOM_ONLY_DRY_MAX_C
        {
            return Err(ValidationError::BottomElementLimit {
                celsius: self.bulb.celsius,
                max: BOTTOM_ONLY_DRY_MAX_C,
            });
        }

        check_range(
            "fan speed",
            f64::from(self.fan_speed),
            0.0,
            f64::from(MAX_FAN_SPEED),
        )?;

        if let Some(probe) = self.probe_celsius {
            check_range("probe temperature", probe, PROBE_RANGE_C.0, PROBE_RANGE_C.1)?;
        }

        if let Some(setpoint) = self.steam.setpoint() {
            check_range(
                "steam setpoint",
                f64::from(setpoint),
                0.0,
                f64::from(MAX_STEAM_SETPOINT),
            )?;
        }

        check_range(
            "rack position",
            f64::from(self.rack_position),
            f64::from(RACK_POSITIONS.0),
            f64::from(RACK_POSITIONS.1),
        )
    }
}

/// Collects stage settings; [`StageBuilder::build`] enforces every stage invariant.
#[derive(Debug, Clone)]
pub struct StageBuilder {
    stage: Stage,
}

impl StageBuilder {
    pub fn heating_elements(mut self, elements: HeatingElements) -> Self {
        self.stage.heating_elements = elements;
        self
    }

    pub fn fan_speed(mut self, speed: u8) -> Self {
        self.stage.fan_speed = speed;
        self
    }

    pub fn probe_celsius(mut self, celsius: f64) -> Self {
        self.stage.probe_celsius = Some(celsius);
        self
    }

    pub fn steam(mut self, steam: SteamSetting) -> Self {
        self.stage.steam = steam;
        self
    }

    pub fn rack_position(mut self, position: u8) -> Self {
        self.stage.rack_position = position;
        self
    }

    pub fn transition(mut self, transition: Transition) -> Self {
        self.stage.transition = transition;
        self
    }

    pub fn user_action_required(mut self, required: bool) -> Self {
        self.stage.user_action_required = required;
        self
    }

    pub fn timer(mut self, timer: Duration) -> Self {
        self.stage.timer = Some(timer);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.stage.title = title.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.stage.description = description.into();
        self
    }

    pub fn build(self) -> Result<Stage, ValidationError> {
        self.stage.validate()?;
        Ok(self.stage)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CookProgram {
    stages: Vec<Stage>,
}

impl CookProgram {
    pub fn new(stages: Vec<Stage>) -> Result<Self, ValidationError> {
        if stages.is_empty() {
            return Err(ValidationError::EmptyProgram);
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn into_stages(self) -> Vec<Stage> {
        self.stages
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite);
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bottom_only_dry(celsius: f64) -> Result<Stage, ValidationError> {
        Stage::builder(StageKind::Cook, TemperatureBulb::dry(celsius))
            .heating_elements(HeatingElements::BOTTOM_ONLY)
            .build()
    }

    #[test]
    fn bottom_only_dry_bulb_limit_is_inclusive() {
        bottom_only_dry(180.0).expect("180°C is allowed");
        let err = bottom_only_dry(181.0).expect_err("181°C must fail");
        assert_eq!(
            err,
            ValidationError::BottomElementLimit {
                celsius: 181.0,
                max: BOTTOM_ONLY_DRY_MAX_C
            }
        );
    }

    #[test]
    fn bottom_only_limit_ignores_wet_bulb_and_other_elements() {
        Stage::builder(StageKind::Cook, TemperatureBulb::dry(240.0))
            .heating_elements(HeatingElements::BOTTOM_AND_REAR)
            .build()
            .expect("rear element lifts the bottom-only limit");
        Stage::builder(StageKind::Cook, TemperatureBulb::wet(90.0))
            .heating_elements(HeatingElements::BOTTOM_ONLY)
            .build()
            .expect("wet bulb is bounded by its own range");
    }

    #[test]
    fn bulb_ranges_are_mode_specific() {
        Stage::builder(StageKind::Cook, TemperatureBulb::wet(100.0))
            .build()
            .expect("wet max");
        let err = Stage::builder(StageKind::Cook, TemperatureBulb::wet(100.5))
            .build()
            .expect_err("wet above 100");
        assert!(matches!(
            err,
            ValidationError::OutOfRange {
                field: "wet-bulb temperature",
                ..
            }
        ));

        Stage::builder(StageKind::Cook, TemperatureBulb::dry(250.0))
            .build()
            .expect("dry max");
        assert!(Stage::builder(StageKind::Cook, TemperatureBulb::dry(251.0))
            .build()
            .is_err());
        assert!(Stage::builder(StageKind::Preheat, TemperatureBulb::dry(24.0))
            .build()
            .is_err());
    }

    #[test]
    fn rejects_out_of_range_stage_settings() {
        let base = || Stage::builder(StageKind::Cook, TemperatureBulb::dry(200.0));

        assert!(base().fan_speed(101).build().is_err());
        assert!(base().rack_position(0).build().is_err());
        assert!(base().rack_position(6).build().is_err());
        assert!(base().probe_celsius(0.5).build().is_err());
        assert!(base().probe_celsius(101.0).build().is_err());
        assert!(base()
            .steam(SteamSetting::RelativeHumidity(101))
            .build()
            .is_err());
        assert!(base()
            .steam(SteamSetting::SteamPercentage(101))
            .build()
            .is_err());
        assert_eq!(
            Stage::builder(StageKind::Cook, TemperatureBulb::dry(f64::NAN))
                .build()
                .expect_err("nan"),
            ValidationError::NotFinite
        );

        let stage = base()
            .fan_speed(0)
            .rack_position(5)
            .probe_celsius(1.0)
            .steam(SteamSetting::SteamPercentage(100))
            .build()
            .expect("boundary values are valid");
        assert_eq!(stage.rack_position(), 5);
        assert_eq!(stage.probe_celsius(), Some(1.0));
    }

    #[test]
    fn program_requires_a_stage() {
        assert_eq!(
            CookProgram::new(Vec::new()).expect_err("empty"),
            ValidationError::EmptyProgram
        );
    }
}
