use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    cook::{BulbMode, StageKind, Transition},
    domain::{DeviceFamily, TemperatureUnit},
};

pub const EVENT_APC_WIFI_LIST: &str = "EVENT_APC_WIFI_LIST";
pub const EVENT_APO_WIFI_LIST: &str = "EVENT_APO_WIFI_LIST";
pub const EVENT_EXPORT_READY: &str = "EVENT_EXPORT_READY";
pub const RESPONSE_PREFIX: &str = "RESPONSE";
pub const COMMAND_ECHO_PREFIX: &str = "CMD_";
pub const STATE_ECHO_PREFIX: &str = "CMD_STATE";

pub const TIMER_EXIT_NODE: &str = "nodes.timer.mode";
pub const TIMER_COMPLETED: &str = "completed";
const ORIGIN_SOURCE_API: &str = "api";
const COOKABLE_TYPE_MANUAL: &str = "manual";
const STEP_TYPE_STAGE: &str = "stage";
const EXHAUST_VENT_CLOSED: &str = "closed";

/// Device list events announce paired devices of one family.
pub fn discovery_family(command: &str) -> Option<DeviceFamily> {
    match command {
        EVENT_APC_WIFI_LIST => Some(DeviceFamily::Apc),
        EVENT_APO_WIFI_LIST => Some(DeviceFamily::Apo),
        _ => None,
    }
}

/// Whether an inbound `command` name answers an outbound command.
///
/// State-update echoes (`CMD_STATE*`) never count; they stream continuously
/// regardless of what was sent.
pub fn is_response_command(command: &str) -> bool {
    command.starts_with(RESPONSE_PREFIX)
        || (command.starts_with(COMMAND_ECHO_PREFIX) && !command.starts_with(STATE_ECHO_PREFIX))
        || command == EVENT_EXPORT_READY
}

/// Entry of a device list event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub cooker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    #[serde(rename = "CMD_APC_START")]
    ApcStart,
    #[serde(rename = "CMD_APC_STOP")]
    ApcStop,
    #[serde(rename = "CMD_APC_SET_TEMPERATURE_UNIT")]
    ApcSetTemperatureUnit,
    #[serde(rename = "CMD_APO_START")]
    ApoStart,
    #[serde(rename = "CMD_APO_STOP")]
    ApoStop,
    #[serde(rename = "CMD_APO_SET_TEMPERATURE_UNIT")]
    ApoSetTemperatureUnit,
    #[serde(rename = "CMD_EXPORT_TELEMETRY")]
    ExportTelemetry,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApcStart => "CMD_APC_START",
            Self::ApcStop => "CMD_APC_STOP",
            Self::ApcSetTemperatureUnit => "CMD_APC_SET_TEMPERATURE_UNIT",
            Self::ApoStart => "CMD_APO_START",
            Self::ApoStop => "CMD_APO_STOP",
            Self::ApoSetTemperatureUnit => "CMD_APO_SET_TEMPERATURE_UNIT",
            Self::ExportTelemetry => "CMD_EXPORT_TELEMETRY",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound frame. Serialises to `{"command", "requestId", "payload"}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub command: CommandKind,
    pub request_id: Uuid,
    pub payload: CommandPayload,
}

impl Command {
    pub fn new(command: CommandKind, payload: CommandPayload) -> Self {
        Self {
            command,
            request_id: Uuid::new_v4(),
            payload,
        }
    }
}

/// One payload shape per device family, protocol generation and operation.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CommandPayload {
    ApcStart(ApcStartPayload),
    ApcStop(ApcTarget),
    ApcSetTemperatureUnit(ApcSetTemperatureUnitPayload),
    ApoStartV1(ApoEnvelope<CookV1>),
    ApoStartV2(ApoEnvelope<CookV2>),
    ApoStop(ApoEnvelope<()>),
    ApoSetTemperatureUnit(ApoEnvelope<TemperatureUnitBody>),
    ExportTelemetry(ExportEnvelope),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApcTarget {
    pub cooker_id: String,
    #[serde(rename = "type")]
    pub device_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApcStartPayload {
    #[serde(flatten)]
    pub target: ApcTarget,
    /// Always Celsius on the wire.
    pub target_temperature: f64,
    pub unit: TemperatureUnit,
    /// Seconds.
    pub timer: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApcSetTemperatureUnitPayload {
    #[serde(flatten)]
    pub target: ApcTarget,
    pub unit: TemperatureUnit,
}

/// Oven commands wrap their body as `{"id", "type", "payload"}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApoEnvelope<T> {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureUnitBody {
    pub temperature_unit: TemperatureUnit,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookV1 {
    pub cook_id: Uuid,
    pub stages: Vec<StageV1>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageV1 {
    pub step_type: &'static str,
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: StageKind,
    pub user_action_required: bool,
    pub temperature_bulbs: TemperatureBulbs,
    pub heating_elements: HeatingElementsWire,
    pub fan: Fan,
    pub vent: Vent,
    pub rack_position: u8,
    pub stage_transition_type: Transition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steam_generators: Option<SteamGenerators>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<Probe>,
}

impl StageV1 {
    pub fn new(id: Uuid, kind: StageKind) -> Self {
        Self {
            step_type: STEP_TYPE_STAGE,
            id,
            title: String::new(),
            description: String::new(),
            kind,
            user_action_required: false,
            temperature_bulbs: TemperatureBulbs::default(),
            heating_elements: HeatingElementsWire::default(),
            fan: Fan { speed: 0 },
            vent: Vent { open: false },
            rack_position: 0,
            stage_transition_type: Transition::Automatic,
            steam_generators: None,
            probe: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookV2 {
    pub stages: Vec<StageV2>,
    pub cook_id: Uuid,
    pub cooker_id: String,
    pub cookable_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub origin_source: &'static str,
    pub cookable_type: &'static str,
}

impl CookV2 {
    pub fn new(cooker_id: String, device_type: String, stages: Vec<StageV2>) -> Self {
        Self {
            stages,
            cook_id: Uuid::new_v4(),
            cooker_id,
            cookable_id: String::new(),
            title: String::new(),
            device_type,
            origin_source: ORIGIN_SOURCE_API,
            cookable_type: COOKABLE_TYPE_MANUAL,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageV2 {
    pub id: Uuid,
    #[serde(rename = "do")]
    pub action: StageAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitConditions>,
    pub title: String,
    pub description: String,
    pub rack_position: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageAction {
    #[serde(rename = "type")]
    pub kind: StageKind,
    pub fan: Fan,
    pub heating_elements: HeatingElementsWire,
    pub exhaust_vent: ExhaustVent,
    pub temperature_bulbs: TemperatureBulbs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steam_generators: Option<SteamGenerators>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer: Option<Timer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<Probe>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExitConditions {
    pub conditions: ConditionTree,
}

impl ExitConditions {
    /// Advance once the stage timer reports completion.
    pub fn timer_completed() -> Self {
        let mut and = BTreeMap::new();
        and.insert(
            TIMER_EXIT_NODE.to_string(),
            Comparison {
                equals: TIMER_COMPLETED.to_string(),
            },
        );
        Self {
            conditions: ConditionTree { and },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConditionTree {
    pub and: BTreeMap<String, Comparison>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    #[serde(rename = "=")]
    pub equals: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExhaustVent {
    pub state: &'static str,
}

impl Default for ExhaustVent {
    fn default() -> Self {
        Self {
            state: EXHAUST_VENT_CLOSED,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Fan {
    pub speed: u8,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Vent {
    pub open: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Timer {
    /// Seconds.
    pub initial: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ElementState {
    pub on: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HeatingElementsWire {
    pub top: ElementState,
    pub bottom: ElementState,
    pub rear: ElementState,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Setpoint {
    pub celsius: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fahrenheit: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BulbSetpoint {
    pub setpoint: Setpoint,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TemperatureBulbs {
    pub mode: BulbMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wet: Option<BulbSetpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry: Option<BulbSetpoint>,
}

impl Default for TemperatureBulbs {
    fn default() -> Self {
        Self {
            mode: BulbMode::Dry,
            wet: None,
            dry: None,
        }
    }
}

impl TemperatureBulbs {
    pub fn new(mode: BulbMode, setpoint: Setpoint) -> Self {
        let bulb = Some(BulbSetpoint { setpoint });
        match mode {
            BulbMode::Wet => Self {
                mode,
                wet: bulb,
                dry: None,
            },
            BulbMode::Dry => Self {
                mode,
                wet: None,
                dry: bulb,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SteamMode {
    Idle,
    RelativeHumidity,
    SteamPercentage,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SteamSetpoint {
    pub setpoint: u8,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SteamGenerators {
    pub mode: SteamMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_humidity: Option<SteamSetpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steam_percentage: Option<SteamSetpoint>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProbeSetpoint {
    pub celsius: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Probe {
    pub setpoint: ProbeSetpoint,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportEnvelope {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub payload: ExportRange,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRange {
    pub device_id: String,
    pub start_time: String,
    pub end_time: String,
}
