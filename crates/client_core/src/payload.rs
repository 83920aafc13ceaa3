use std::time::Duration;

use chrono::NaiveDate;
use shared::{
    cook::{
        CookProgram, HeatingElements, Stage, StageBuilder, StageKind, SteamSetting,
        TemperatureBulb, Transition,
    },
    domain::{
        celsius_to_fahrenheit, Device, DeviceFamily, ExportWindow, OvenGeneration, Temperature,
        TemperatureUnit,
    },
    error::ValidationError,
    protocol::{
        ApcSetTemperatureUnitPayload, ApcStartPayload, ApcTarget, ApoEnvelope, Command, CommandKind,
        CommandPayload, CookV1, CookV2, ElementState, ExitConditions, ExhaustVent, ExportEnvelope,
        ExportRange, Fan, HeatingElementsWire, Probe, ProbeSetpoint, Setpoint, StageAction,
        StageV1, StageV2, SteamGenerators, SteamMode, SteamSetpoint, TemperatureBulbs,
        TemperatureUnitBody, Timer,
    },
};
use tracing::debug;
use uuid::Uuid;

/// Lowest target any cook accepts.
pub const FLOOR_CELSIUS: f64 = 0.0;
pub const FLOOR_FAHRENHEIT: f64 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ceiling {
    pub operation: &'static str,
    pub celsius: f64,
    pub fahrenheit: f64,
}

pub const SOUS_VIDE_CEILING: Ceiling = Ceiling {
    operation: "sous-vide",
    celsius: 95.0,
    fahrenheit: 203.0,
};
pub const OVEN_SOUS_VIDE_CEILING: Ceiling = Ceiling {
    operation: "oven sous-vide",
    celsius: 100.0,
    fahrenheit: 212.0,
};
pub const ROAST_CEILING: Ceiling = Ceiling {
    operation: "roast",
    celsius: 250.0,
    fahrenheit: 482.0,
};
pub const STEAM_CEILING: Ceiling = Ceiling {
    operation: "steam",
    celsius: 250.0,
    fahrenheit: 482.0,
};

impl Ceiling {
    pub fn check(&self, target: Temperature) -> Result<f64, ValidationError> {
        if !target.value.is_finite() {
            return Err(ValidationError::NotFinite);
        }
        let (min, max) = match target.unit {
            TemperatureUnit::Celsius => (FLOOR_CELSIUS, self.celsius),
            TemperatureUnit::Fahrenheit => (FLOOR_FAHRENHEIT, self.fahrenheit),
        };
        if target.value < min {
            return Err(ValidationError::BelowFloor {
                operation: self.operation,
                value: target.value,
                min,
                unit: target.unit,
            });
        }
        if target.value > max {
            return Err(ValidationError::AboveCeiling {
                operation: self.operation,
                value: target.value,
                max,
                unit: target.unit,
            });
        }
        Ok(target.to_celsius())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvenPreset {
    SousVide,
    Roast,
    /// Dry bulb with relative humidity in percent.
    Steam { relative_humidity: u8 },
}

impl OvenPreset {
    pub fn ceiling(self) -> Ceiling {
        match self {
            Self::SousVide => OVEN_SOUS_VIDE_CEILING,
            Self::Roast => ROAST_CEILING,
            Self::Steam { .. } => STEAM_CEILING,
        }
    }

    fn template(self, kind: StageKind, celsius: f64, generation: OvenGeneration) -> StageBuilder {
        let (bulb, elements, fan, steam) = match (self, generation) {
            (Self::SousVide, _) => (
                TemperatureBulb::wet(celsius),
                HeatingElements::REAR_ONLY,
                100,
                SteamSetting::RelativeHumidity(100),
            ),
            (Self::Roast, _) => (
                TemperatureBulb::dry(celsius),
                HeatingElements::BOTTOM_AND_REAR,
                75,
                SteamSetting::Idle,
            ),
            (Self::Steam { relative_humidity }, OvenGeneration::V2) => (
                TemperatureBulb::dry(celsius),
                HeatingElements::BOTTOM_AND_REAR,
                100,
                SteamSetting::RelativeHumidity(relative_humidity),
            ),
            (Self::Steam { relative_humidity }, OvenGeneration::V1) => (
                TemperatureBulb::dry(celsius),
                HeatingElements::ALL,
                50,
                SteamSetting::RelativeHumidity(relative_humidity),
            ),
        };
        Stage::builder(kind, bulb)
            .heating_elements(elements)
            .fan_speed(fan)
            .steam(steam)
            .transition(Transition::Automatic)
    }
}

fn require_family(
    device: &Device,
    family: DeviceFamily,
    operation: &'static str,
) -> Result<(), ValidationError> {
    if device.family == family {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedDevice {
            operation,
            family: device.family,
        })
    }
}

fn apc_target(device: &Device) -> ApcTarget {
    ApcTarget {
        cooker_id: device.id.to_string(),
        device_type: device.protocol_version.clone(),
    }
}

fn apo_envelope<T>(device: &Device, kind: CommandKind, payload: Option<T>) -> ApoEnvelope<T> {
    ApoEnvelope {
        id: device.id.to_string(),
        kind,
        payload,
    }
}

pub fn sous_vide(
    device: &Device,
    target: Temperature,
    timer: Duration,
) -> Result<Command, ValidationError> {
    require_family(device, DeviceFamily::Apc, "sous-vide cook")?;
    let celsius = SOUS_VIDE_CEILING.check(target)?;

    Ok(Command::new(
        CommandKind::ApcStart,
        CommandPayload::ApcStart(ApcStartPayload {
            target: apc_target(device),
            target_temperature: celsius,
            unit: TemperatureUnit::Celsius,
            timer: timer.as_secs(),
        }),
    ))
}

/// A single timed cook stage on v2 ovens; preheat then cook on v1 ovens,
/// which run until stopped.
pub fn preset_program(
    preset: OvenPreset,
    generation: OvenGeneration,
    target: Temperature,
    timer: Duration,
) -> Result<CookProgram, ValidationError> {
    let celsius = preset.ceiling().check(target)?;
    let cook = preset
        .template(StageKind::Cook, celsius, generation)
        .timer(timer)
        .build()?;
    let stages = match generation {
        OvenGeneration::V2 => vec![cook],
        OvenGeneration::V1 => vec![
            preset
                .template(StageKind::Preheat, celsius, generation)
                .build()?,
            cook,
        ],
    };
    CookProgram::new(stages)
}

pub fn oven_preset(
    device: &Device,
    preset: OvenPreset,
    target: Temperature,
    timer: Duration,
) -> Result<Command, ValidationError> {
    require_family(device, DeviceFamily::Apo, "oven cook")?;
    let program = preset_program(preset, device.oven_generation(), target, timer)?;
    start_oven(device, &program)
}

pub fn start_oven(device: &Device, program: &CookProgram) -> Result<Command, ValidationError> {
    require_family(device, DeviceFamily::Apo, "oven cook")?;

    let payload = match device.oven_generation() {
        OvenGeneration::V1 => {
            if program.stages().iter().any(|stage| stage.timer().is_some()) {
                debug!(
                    device_id = %device.id,
                    "command: v1 ovens take no stage timer, sending without it"
                );
            }
            CommandPayload::ApoStartV1(apo_envelope(
                device,
                CommandKind::ApoStart,
                Some(CookV1 {
                    cook_id: Uuid::new_v4(),
                    stages: program.stages().iter().map(stage_v1).collect(),
                }),
            ))
        }
        OvenGeneration::V2 => CommandPayload::ApoStartV2(apo_envelope(
            device,
            CommandKind::ApoStart,
            Some(CookV2::new(
                device.id.to_string(),
                device.protocol_version.clone(),
                program.stages().iter().map(stage_v2).collect(),
            )),
        )),
    };
    Ok(Command::new(CommandKind::ApoStart, payload))
}

pub fn stop(device: &Device) -> Command {
    match device.family {
        DeviceFamily::Apc => Command::new(
            CommandKind::ApcStop,
            CommandPayload::ApcStop(apc_target(device)),
        ),
        DeviceFamily::Apo => Command::new(
            CommandKind::ApoStop,
            CommandPayload::ApoStop(apo_envelope(device, CommandKind::ApoStop, None)),
        ),
    }
}

pub fn set_temperature_unit(device: &Device, unit: TemperatureUnit) -> Command {
    match device.family {
        DeviceFamily::Apc => Command::new(
            CommandKind::ApcSetTemperatureUnit,
            CommandPayload::ApcSetTemperatureUnit(ApcSetTemperatureUnitPayload {
                target: apc_target(device),
                unit,
            }),
        ),
        DeviceFamily::Apo => Command::new(
            CommandKind::ApoSetTemperatureUnit,
            CommandPayload::ApoSetTemperatureUnit(apo_envelope(
                device,
                CommandKind::ApoSetTemperatureUnit,
                Some(TemperatureUnitBody {
                    temperature_unit: unit,
                }),
            )),
        ),
    }
}

/// `CMD_EXPORT_TELEMETRY` for `start..=end` (`YYYY-MM-DD`), checked against `today`.
pub fn export_telemetry(
    device: &Device,
    start: &str,
    end: &str,
    today: NaiveDate,
) -> Result<Command, ValidationError> {
    let window = ExportWindow::parse(start, end, today)?;
    Ok(Command::new(
        CommandKind::ExportTelemetry,
        CommandPayload::ExportTelemetry(ExportEnvelope {
            id: Uuid::new_v4(),
            kind: CommandKind::ExportTelemetry,
            payload: ExportRange {
                device_id: device.id.to_string(),
                start_time: window.start_string(),
                end_time: window.end_string(),
            },
        }),
    ))
}

fn stage_v1(stage: &Stage) -> StageV1 {
    let bulb = stage.bulb();
    StageV1 {
        title: stage.title().to_string(),
        description: stage.description().to_string(),
        user_action_required: stage.user_action_required(),
        temperature_bulbs: TemperatureBulbs::new(
            bulb.mode,
            Setpoint {
                celsius: bulb.celsius,
                fahrenheit: Some(celsius_to_fahrenheit(bulb.celsius)),
            },
        ),
        heating_elements: elements_wire(stage.heating_elements()),
        fan: Fan {
            speed: stage.fan_speed(),
        },
        rack_position: stage.rack_position(),
        stage_transition_type: stage.transition(),
        steam_generators: steam_wire(stage.steam()),
        probe: probe_wire(stage.probe_celsius()),
        ..StageV1::new(Uuid::new_v4(), stage.kind())
    }
}

fn stage_v2(stage: &Stage) -> StageV2 {
    let bulb = stage.bulb();
    // Only an automatic stage with a timer advances on its own.
    let exit = (stage.timer().is_some() && stage.transition() == Transition::Automatic)
        .then(ExitConditions::timer_completed);

    StageV2 {
        id: Uuid::new_v4(),
        action: StageAction {
            kind: stage.kind(),
            fan: Fan {
                speed: stage.fan_speed(),
            },
            heating_elements: elements_wire(stage.heating_elements()),
            exhaust_vent: ExhaustVent::default(),
            temperature_bulbs: TemperatureBulbs::new(
                bulb.mode,
                Setpoint {
                    celsius: bulb.celsius,
                    fahrenheit: None,
                },
            ),
            steam_generators: steam_wire(stage.steam()),
            timer: stage.timer().map(|timer| Timer {
                initial: timer.as_secs(),
            }),
            probe: probe_wire(stage.probe_celsius()),
        },
        exit,
        title: stage.title().to_string(),
        description: stage.description().to_string(),
        rack_position: stage.rack_position(),
    }
}

fn elements_wire(elements: HeatingElements) -> HeatingElementsWire {
    HeatingElementsWire {
        top: ElementState { on: elements.top },
        bottom: ElementState {
            on: elements.bottom,
        },
        rear: ElementState { on: elements.rear },
    }
}

fn steam_wire(steam: SteamSetting) -> Option<SteamGenerators> {
    match steam {
        SteamSetting::Idle => None,
        SteamSetting::RelativeHumidity(setpoint) => Some(SteamGenerators {
            mode: SteamMode::RelativeHumidity,
            relative_humidity: Some(SteamSetpoint { setpoint }),
            steam_percentage: None,
        }),
        SteamSetting::SteamPercentage(setpoint) => Some(SteamGenerators {
            mode: SteamMode::SteamPercentage,
            relative_humidity: None,
            steam_percentage: Some(SteamSetpoint { setpoint }),
        }),
    }
}

fn probe_wire(celsius: Option<f64>) -> Option<Probe> {
    celsius.map(|celsius| Probe {
        setpoint: ProbeSetpoint { celsius },
    })
}

#[cfg(test)]
#[path = "tests/payload_tests.rs"]
mod tests;
