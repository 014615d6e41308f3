//! Decoding of the sparse telemetry updates the gateway reports for climate devices.
//!
//! A key missing from an update means the device did not report that field this time, never
//! that the field is zero. Decoding validates every field it is going to use up front, so that
//! the caller can apply an update as a whole or not at all.

use crate::modes::{
    AC_PACKED_FAN, AC_PACKED_HVAC, AC_TELEMETRY_FAN, AC_TELEMETRY_HVAC, FanMode, HvacMode, Mode,
    ModeTable, SwingMode, YUBA_FAN, YUBA_HVAC,
};
use crate::packed::PackedClimateState;
use serde_json::Value;

pub const POWER: &str = "power";
pub const MODE: &str = "mode";
pub const FAN_MODE: &str = "fan_mode";
pub const SWING_MODE: &str = "swing_mode";
pub const TARGET_TEMPERATURE: &str = "target_temperature";
pub const CURRENT_TEMPERATURE: &str = "current_temperature";

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("telemetry payload is not a JSON object")]
    NotAnObject,
    #[error("could not parse the telemetry payload")]
    Parse(#[source] serde_json::Error),
    #[error("`{key}` has an unexpected value {value}")]
    Malformed { key: String, value: Value },
    #[error("`{key}` reports code {code} which the {model} {kind} table does not know")]
    UnknownCode { key: String, code: u8, model: &'static str, kind: &'static str },
}

/// One telemetry update, as a map from attribute names to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry(serde_json::Map<String, Value>);

impl From<serde_json::Map<String, Value>> for Telemetry {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Telemetry {
    type Error = TelemetryError;
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(TelemetryError::NotAnObject),
        }
    }
}

impl std::str::FromStr for Telemetry {
    type Err = TelemetryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str::<Value>(s).map_err(TelemetryError::Parse)?.try_into()
    }
}

impl std::fmt::Display for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", Value::Object(self.0.clone())))
    }
}

impl Telemetry {
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn malformed(key: &str, value: &Value) -> TelemetryError {
        TelemetryError::Malformed { key: key.to_string(), value: value.clone() }
    }

    /// Booleans arrive either as JSON booleans or as `0`/`1`.
    pub fn flag(&self, key: &str) -> Result<Option<bool>, TelemetryError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value {
            Value::Bool(b) => Ok(Some(*b)),
            Value::Number(n) => match n.as_u64() {
                Some(0) => Ok(Some(false)),
                Some(1) => Ok(Some(true)),
                _ => Err(Self::malformed(key, value)),
            },
            _ => Err(Self::malformed(key, value)),
        }
    }

    /// Small integers, which some firmwares send as `22.0`. `null` counts as not reported.
    pub fn byte(&self, key: &str) -> Result<Option<u8>, TelemetryError> {
        let value = match self.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value,
        };
        let byte = match value.as_u64() {
            Some(v) => u8::try_from(v).ok(),
            None => value
                .as_f64()
                .filter(|v| v.fract() == 0.0 && (0.0..=255.0).contains(v))
                .map(|v| v as u8),
        };
        byte.map(Some).ok_or_else(|| Self::malformed(key, value))
    }

    pub fn number(&self, key: &str) -> Result<Option<f64>, TelemetryError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        value.as_f64().map(Some).ok_or_else(|| Self::malformed(key, value))
    }

    fn mode<M: Mode>(
        &self,
        key: &str,
        table: &ModeTable<M>,
    ) -> Result<Option<M>, TelemetryError> {
        let Some(code) = self.byte(key)? else {
            return Ok(None);
        };
        lookup(key, code, table).map(Some)
    }

    /// Read the packed state attribute stored under `key`.
    ///
    /// The gateway replays the retained value of the attribute as a decimal string when a
    /// device first shows up, and sends plain numbers afterwards.
    pub fn packed(&self, key: &str) -> Result<Option<PackedObservation>, TelemetryError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let (raw, retained) = match value {
            Value::Number(n) => (n.as_u64(), false),
            Value::String(s) => (s.trim().parse::<u64>().ok(), true),
            _ => (None, false),
        };
        let raw = raw.and_then(|v| u32::try_from(v).ok());
        let state = PackedClimateState::decode(raw.ok_or_else(|| Self::malformed(key, value))?);
        let seed = if retained {
            Some(PackedSeed {
                hvac_mode: lookup(key, state.hvac_code, &AC_PACKED_HVAC)?,
                fan_mode: lookup(key, state.fan_code, &AC_PACKED_FAN)?,
                target_temperature: state.target_temperature,
            })
        } else {
            None
        };
        Ok(Some(PackedObservation { state, seed }))
    }
}

fn lookup<M: Mode>(key: &str, code: u8, table: &ModeTable<M>) -> Result<M, TelemetryError> {
    table.mode(code).ok_or_else(|| TelemetryError::UnknownCode {
        key: key.to_string(),
        code,
        model: table.model(),
        kind: M::KIND,
    })
}

/// The code tables a device model reports its `mode` and `fan_mode` telemetry in.
#[derive(Clone, Copy)]
pub struct TelemetryTables {
    pub hvac: &'static ModeTable<HvacMode>,
    pub fan: &'static ModeTable<FanMode>,
}

impl TelemetryTables {
    pub fn ac_partner() -> Self {
        Self { hvac: &AC_TELEMETRY_HVAC, fan: &AC_TELEMETRY_FAN }
    }

    pub fn yuba() -> Self {
        Self { hvac: &YUBA_HVAC, fan: &YUBA_FAN }
    }
}

/// Fields reported while the device is powered on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoweredOn {
    pub hvac_mode: Option<HvacMode>,
    pub fan_mode: Option<FanMode>,
    pub swing_mode: Option<SwingMode>,
    pub target_temperature: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerObservation {
    /// Everything else the device sends alongside a power-off is stale and has been dropped.
    Off,
    On(PoweredOn),
}

/// The result of decoding one telemetry update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClimateObservation {
    /// `None` when the update did not report power at all, in which case mode and target
    /// fields are not considered either.
    pub power: Option<PowerObservation>,
    pub current_temperature: Option<f64>,
}

impl ClimateObservation {
    pub fn is_on(&self) -> Option<bool> {
        self.power.map(|p| matches!(p, PowerObservation::On(_)))
    }

    fn on(&self) -> Option<&PoweredOn> {
        match &self.power {
            Some(PowerObservation::On(on)) => Some(on),
            _ => None,
        }
    }

    pub fn hvac_mode(&self) -> Option<HvacMode> {
        self.on()?.hvac_mode
    }

    pub fn fan_mode(&self) -> Option<FanMode> {
        self.on()?.fan_mode
    }

    pub fn swing_mode(&self) -> Option<SwingMode> {
        self.on()?.swing_mode
    }

    /// A powered off device always reads as a target of 0 degrees.
    pub fn target_temperature(&self) -> Option<u8> {
        match &self.power {
            None => None,
            Some(PowerObservation::Off) => Some(0),
            Some(PowerObservation::On(on)) => on.target_temperature,
        }
    }
}

/// Swing telemetry uses `1` for "not swinging" and anything else for swinging.
fn swing_from_code(code: u8) -> SwingMode {
    if code == 1 { SwingMode::Off } else { SwingMode::On }
}

pub fn decode_climate(
    telemetry: &Telemetry,
    tables: TelemetryTables,
) -> Result<ClimateObservation, TelemetryError> {
    let power = match telemetry.flag(POWER)? {
        None => None,
        Some(false) => Some(PowerObservation::Off),
        Some(true) => Some(PowerObservation::On(PoweredOn {
            hvac_mode: telemetry.mode(MODE, tables.hvac)?,
            fan_mode: telemetry.mode(FAN_MODE, tables.fan)?,
            swing_mode: telemetry.byte(SWING_MODE)?.map(swing_from_code),
            target_temperature: telemetry.byte(TARGET_TEMPERATURE)?,
        })),
    };
    let current_temperature = telemetry.number(CURRENT_TEMPERATURE)?;
    Ok(ClimateObservation { power, current_temperature })
}

/// Modes recovered from a retained packed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedSeed {
    pub hvac_mode: HvacMode,
    pub fan_mode: FanMode,
    pub target_temperature: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedObservation {
    pub state: PackedClimateState,
    pub seed: Option<PackedSeed>,
}
