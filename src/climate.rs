//! Climate entities for air conditioner partners and Yuba bathroom heaters.
//!
//! Both translate between the platform's climate vocabulary and what the device speaks. The AC
//! partner keeps its whole control state in one packed attribute (see [`crate::packed`]); every
//! control operation rewrites one byte of the last observed state and sends it back. The Yuba
//! takes raw mode codes and temperatures on its attribute instead.

use crate::gateway::{ControlMessage, Gateway};
use crate::modes::{
    FAN_MODES, FanMode, HvacMode, InvalidModeError, SwingMode, YUBA_FAN, YUBA_HVAC,
};
use crate::packed::{self, PackedClimateState, ZeroTemperature};
use crate::telemetry::{self, PowerObservation, Telemetry, TelemetryError, TelemetryTables};

pub const SUPPORT_TARGET_TEMPERATURE: u32 = 1;
pub const SUPPORT_FAN_MODE: u32 = 8;
pub const SUPPORT_SWING_MODE: u32 = 32;

pub const TEMPERATURE_UNIT: &str = "°C";
pub const PRECISION_WHOLE: f64 = 1.0;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClimateKind {
    /// Air conditioner partner with a packed state attribute.
    AcPartner,
    /// Yuba bathroom heater.
    Yuba,
}

impl ClimateKind {
    pub fn default_attribute(self) -> &'static str {
        match self {
            ClimateKind::AcPartner => "ac_state",
            ClimateKind::Yuba => "yuba",
        }
    }

    pub fn hvac_modes(self) -> &'static [HvacMode] {
        match self {
            ClimateKind::AcPartner => &[HvacMode::Off, HvacMode::Cool, HvacMode::Heat],
            ClimateKind::Yuba => &[HvacMode::Off, HvacMode::Dry, HvacMode::Heat, HvacMode::Auto],
        }
    }

    pub fn swing_modes(self) -> Option<&'static [SwingMode]> {
        match self {
            ClimateKind::AcPartner => None,
            ClimateKind::Yuba => Some(&[SwingMode::Off, SwingMode::On]),
        }
    }

    pub fn supported_features(self) -> u32 {
        match self {
            ClimateKind::AcPartner => SUPPORT_TARGET_TEMPERATURE | SUPPORT_FAN_MODE,
            ClimateKind::Yuba => SUPPORT_TARGET_TEMPERATURE | SUPPORT_FAN_MODE | SUPPORT_SWING_MODE,
        }
    }

    fn telemetry_tables(self) -> TelemetryTables {
        match self {
            ClimateKind::AcPartner => TelemetryTables::ac_partner(),
            ClimateKind::Yuba => TelemetryTables::yuba(),
        }
    }
}

#[derive(clap::Parser, Clone, Debug)]
#[group(id = "climate::Args")]
pub struct Args {
    /// The kind of climate device behind the gateway.
    #[arg(long, value_enum, default_value_t = ClimateKind::AcPartner)]
    kind: ClimateKind,

    /// The device identifier used when addressing control messages.
    #[arg(long, default_value = "lumi.climate")]
    did: String,

    /// The attribute that carries the device state.
    ///
    /// Defaults to `ac_state` for AC partners and `yuba` for Yuba heaters.
    #[arg(long)]
    attribute: Option<String>,

    /// How to treat a requested target temperature of zero.
    #[arg(long, value_enum, default_value_t = ZeroTemperature::Ignore)]
    zero_temperature: ZeroTemperature,
}

impl Args {
    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn to_config(&self) -> ClimateConfig {
        ClimateConfig {
            kind: self.kind,
            attribute: self
                .attribute
                .clone()
                .unwrap_or_else(|| self.kind.default_attribute().to_string()),
            zero_temperature: self.zero_temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClimateConfig {
    pub kind: ClimateKind,
    pub attribute: String,
    pub zero_temperature: ZeroTemperature,
}

impl ClimateConfig {
    pub fn new(kind: ClimateKind) -> Self {
        Self {
            kind,
            attribute: kind.default_attribute().to_string(),
            zero_temperature: ZeroTemperature::default(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ControlError {
    #[error("no state has been observed from the device yet")]
    NoBaseline,
    #[error("a target temperature of zero is ignored")]
    ZeroTemperature,
    #[error("{0} is not a valid target temperature")]
    InvalidTemperature(f64),
    #[error(transparent)]
    InvalidMode(#[from] InvalidModeError),
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),
    #[error("could not send the control message to the gateway")]
    Send(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Snapshot of what the entity currently exposes to the platform.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct ClimateState {
    pub is_on: Option<bool>,
    pub hvac_mode: Option<HvacMode>,
    pub hvac_modes: &'static [HvacMode],
    pub fan_mode: Option<FanMode>,
    pub fan_modes: &'static [FanMode],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swing_mode: Option<SwingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swing_modes: Option<&'static [SwingMode]>,
    pub target_temperature: u8,
    pub current_temperature: Option<f64>,
    pub supported_features: u32,
    pub temperature_unit: &'static str,
    pub precision: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packed_state: Option<u32>,
}

pub struct Climate<G> {
    did: String,
    config: ClimateConfig,
    gateway: G,
    is_on: Option<bool>,
    hvac_mode: Option<HvacMode>,
    fan_mode: Option<FanMode>,
    swing_mode: Option<SwingMode>,
    target_temperature: u8,
    current_temperature: Option<f64>,
    packed: Option<PackedClimateState>,
    observed: bool,
}

impl<G: Gateway> Climate<G> {
    pub fn new(did: impl Into<String>, config: ClimateConfig, gateway: G) -> Self {
        Self {
            did: did.into(),
            config,
            gateway,
            is_on: None,
            hvac_mode: None,
            fan_mode: None,
            swing_mode: None,
            target_temperature: 0,
            current_temperature: None,
            packed: None,
            observed: false,
        }
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn config(&self) -> &ClimateConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn packed_state(&self) -> Option<PackedClimateState> {
        self.packed
    }

    /// The platform shows `off` whenever the device is not running, whatever mode it was in.
    pub fn hvac_mode(&self) -> Option<HvacMode> {
        if self.is_on == Some(true) { self.hvac_mode } else { Some(HvacMode::Off) }
    }

    pub fn fan_mode(&self) -> Option<FanMode> {
        self.fan_mode
    }

    pub fn swing_mode(&self) -> Option<SwingMode> {
        self.swing_mode
    }

    pub fn target_temperature(&self) -> u8 {
        self.target_temperature
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.current_temperature
    }

    pub fn state(&self) -> ClimateState {
        let kind = self.config.kind;
        ClimateState {
            is_on: self.is_on,
            hvac_mode: self.hvac_mode(),
            hvac_modes: kind.hvac_modes(),
            fan_mode: self.fan_mode,
            fan_modes: &FAN_MODES,
            swing_mode: self.swing_mode,
            swing_modes: kind.swing_modes(),
            target_temperature: self.target_temperature,
            current_temperature: self.current_temperature,
            supported_features: kind.supported_features(),
            temperature_unit: TEMPERATURE_UNIT,
            precision: PRECISION_WHOLE,
            packed_state: self.packed.map(|p| p.encode()),
        }
    }

    /// Apply a telemetry update.
    ///
    /// An update that cannot be decoded is logged and otherwise ignored, leaving the entity as
    /// it was.
    pub fn update(&mut self, telemetry: &Telemetry) {
        if let Err(error) = self.try_update(telemetry) {
            tracing::error!(
                did = %self.did,
                %telemetry,
                error = &error as &dyn std::error::Error,
                "can't read climate data"
            );
        }
    }

    pub fn try_update(&mut self, telemetry: &Telemetry) -> Result<(), TelemetryError> {
        let kind = self.config.kind;
        let observation = telemetry::decode_climate(telemetry, kind.telemetry_tables())?;
        let packed = match kind {
            ClimateKind::AcPartner => telemetry.packed(&self.config.attribute)?,
            ClimateKind::Yuba => None,
        };

        if let Some(power) = observation.power {
            self.is_on = Some(matches!(power, PowerObservation::On(_)));
            match power {
                PowerObservation::Off => {
                    self.hvac_mode = None;
                    self.fan_mode = None;
                    self.target_temperature = 0;
                }
                PowerObservation::On(on) => {
                    if let Some(mode) = on.hvac_mode {
                        self.hvac_mode = Some(mode);
                    }
                    if let Some(mode) = on.fan_mode {
                        self.fan_mode = Some(mode);
                    }
                    if let (Some(mode), Some(_)) = (on.swing_mode, kind.swing_modes()) {
                        self.swing_mode = Some(mode);
                    }
                    if let Some(degrees) = on.target_temperature {
                        self.target_temperature = degrees;
                    }
                }
            }
        }
        if let Some(degrees) = observation.current_temperature {
            self.current_temperature = Some(degrees);
        }
        if let Some(packed) = packed {
            self.packed = Some(packed.state);
            if let Some(seed) = packed.seed {
                self.hvac_mode = Some(seed.hvac_mode);
                self.fan_mode = Some(seed.fan_mode);
                self.target_temperature = seed.target_temperature;
            }
        }
        self.observed = true;
        tracing::trace!(did = %self.did, state = ?self.state(), "applied climate telemetry");
        Ok(())
    }

    fn has_baseline(&self) -> bool {
        match self.config.kind {
            ClimateKind::AcPartner => self.packed.is_some(),
            ClimateKind::Yuba => self.observed,
        }
    }

    fn send(&mut self, value: u32) -> Result<(), ControlError> {
        let message = ControlMessage::new(self.config.attribute.clone(), value);
        tracing::debug!(did = %self.did, attribute = %self.config.attribute, value, "sending");
        self.gateway.send(&self.did, message).map_err(|e| ControlError::Send(Box::new(e)))
    }

    /// Commit a new packed state once the gateway has accepted it.
    fn send_packed(&mut self, state: PackedClimateState) -> Result<(), ControlError> {
        self.send(state.encode())?;
        self.packed = Some(state);
        Ok(())
    }

    pub fn set_temperature(&mut self, degrees: f64) -> Result<(), ControlError> {
        if !self.has_baseline() {
            tracing::debug!(did = %self.did, degrees, "can't set temperature without a state");
            return Err(ControlError::NoBaseline);
        }
        if !degrees.is_finite() {
            return Err(ControlError::InvalidTemperature(degrees));
        }
        if !self.config.zero_temperature.permits(degrees) {
            return Err(ControlError::ZeroTemperature);
        }
        match self.config.kind {
            ClimateKind::AcPartner => {
                let state = packed::set_target_temperature(
                    self.packed,
                    degrees,
                    self.config.zero_temperature,
                )
                .ok_or(ControlError::NoBaseline)?;
                self.send_packed(state)
            }
            ClimateKind::Yuba => self.send(u32::from(degrees as u8)),
        }
    }

    pub fn set_hvac_mode(&mut self, name: &str) -> Result<(), ControlError> {
        if !self.has_baseline() {
            return Err(ControlError::NoBaseline);
        }
        match self.config.kind {
            ClimateKind::AcPartner => {
                let state =
                    packed::set_hvac_mode(self.packed, name)?.ok_or(ControlError::NoBaseline)?;
                self.send_packed(state)
            }
            ClimateKind::Yuba => {
                let code = YUBA_HVAC
                    .code_by_name(name)
                    .ok_or_else(|| InvalidModeError::Hvac(name.into()))?;
                self.send(code.into())
            }
        }
    }

    pub fn set_fan_mode(&mut self, name: &str) -> Result<(), ControlError> {
        if !self.has_baseline() {
            return Err(ControlError::NoBaseline);
        }
        match self.config.kind {
            ClimateKind::AcPartner => {
                let state =
                    packed::set_fan_mode(self.packed, name)?.ok_or(ControlError::NoBaseline)?;
                self.send_packed(state)
            }
            ClimateKind::Yuba => {
                let code = YUBA_FAN
                    .code_by_name(name)
                    .ok_or_else(|| InvalidModeError::Fan(name.into()))?;
                self.send(code.into())
            }
        }
    }

    pub fn set_swing_mode(&mut self, name: &str) -> Result<(), ControlError> {
        if self.config.kind.swing_modes().is_none() {
            return Err(ControlError::Unsupported("swing mode"));
        }
        if !self.has_baseline() {
            return Err(ControlError::NoBaseline);
        }
        let mode = name
            .parse::<SwingMode>()
            .map_err(|_| InvalidModeError::Swing(name.into()))?;
        self.send(match mode {
            SwingMode::On => 0,
            SwingMode::Off => 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::WriteCommand;
    use serde_json::json;

    fn telemetry(value: serde_json::Value) -> Telemetry {
        value.try_into().unwrap()
    }

    fn ac_partner() -> Climate<Vec<WriteCommand>> {
        Climate::new("lumi.ac", ClimateConfig::new(ClimateKind::AcPartner), Vec::new())
    }

    fn yuba() -> Climate<Vec<WriteCommand>> {
        Climate::new("lumi.yuba", ClimateConfig::new(ClimateKind::Yuba), Vec::new())
    }

    fn sent(climate: &Climate<Vec<WriteCommand>>) -> Vec<(String, u32)> {
        climate
            .gateway()
            .iter()
            .map(|c| (c.message.attribute.clone(), c.message.value))
            .collect()
    }

    #[derive(thiserror::Error, Debug)]
    #[error("gateway is unreachable")]
    struct Unreachable;

    struct FailingGateway;
    impl Gateway for FailingGateway {
        type Error = Unreachable;
        fn send(&mut self, _: &str, _: ControlMessage) -> Result<(), Unreachable> {
            Err(Unreachable)
        }
    }

    #[test]
    fn test_initial_state() {
        let climate = ac_partner();
        let state = climate.state();
        assert_eq!(state.is_on, None);
        assert_eq!(state.hvac_mode, Some(HvacMode::Off));
        assert_eq!(state.target_temperature, 0);
        assert_eq!(state.supported_features, 9);
        assert_eq!(state.hvac_modes, &[HvacMode::Off, HvacMode::Cool, HvacMode::Heat]);
    }

    #[test]
    fn test_controls_need_baseline() {
        let mut climate = ac_partner();
        assert!(matches!(climate.set_temperature(22.0), Err(ControlError::NoBaseline)));
        assert!(matches!(climate.set_hvac_mode("cool"), Err(ControlError::NoBaseline)));
        assert!(matches!(climate.set_fan_mode("low"), Err(ControlError::NoBaseline)));
        // Plain telemetry is not a baseline for the packed state.
        climate.update(&telemetry(json!({"power": 1, "mode": 1})));
        assert!(matches!(climate.set_hvac_mode("cool"), Err(ControlError::NoBaseline)));
        assert!(sent(&climate).is_empty());
    }

    #[test]
    fn test_packed_controls() {
        let mut climate = ac_partner();
        climate.update(&telemetry(json!({"ac_state": 0x01000E00u32})));
        climate.set_hvac_mode("cool").unwrap();
        climate.set_fan_mode("auto").unwrap();
        climate.set_temperature(24.0).unwrap();
        assert_eq!(
            sent(&climate),
            vec![
                ("ac_state".to_string(), 0x11000E00),
                ("ac_state".to_string(), 0x11300E00),
                ("ac_state".to_string(), 0x11301800),
            ]
        );
        assert_eq!(climate.packed_state().unwrap().encode(), 0x11301800);
    }

    #[test]
    fn test_invalid_requests_do_not_send() {
        let mut climate = ac_partner();
        climate.update(&telemetry(json!({"ac_state": 0x10201600u32})));
        assert!(matches!(
            climate.set_hvac_mode("dry"),
            Err(ControlError::InvalidMode(InvalidModeError::Hvac(_)))
        ));
        assert!(matches!(climate.set_temperature(0.0), Err(ControlError::ZeroTemperature)));
        assert!(matches!(climate.set_swing_mode("on"), Err(ControlError::Unsupported(_))));
        assert!(sent(&climate).is_empty());
        assert_eq!(climate.packed_state().unwrap().encode(), 0x10201600);
    }

    #[test]
    fn test_zero_temperature_accepted() {
        let config = ClimateConfig {
            zero_temperature: ZeroTemperature::Accept,
            ..ClimateConfig::new(ClimateKind::AcPartner)
        };
        let mut climate = Climate::new("lumi.ac", config, Vec::new());
        climate.update(&telemetry(json!({"ac_state": 0x10201600u32})));
        climate.set_temperature(0.0).unwrap();
        assert_eq!(sent(&climate), vec![("ac_state".to_string(), 0x10200000)]);
    }

    #[test]
    fn test_non_finite_temperature_is_rejected() {
        for kind in [ClimateKind::AcPartner, ClimateKind::Yuba] {
            let config =
                ClimateConfig { zero_temperature: ZeroTemperature::Accept, ..ClimateConfig::new(kind) };
            let mut climate = Climate::new("lumi.climate", config, Vec::new());
            climate.update(&telemetry(json!({"ac_state": 0x10201600u32, "power": 1})));
            for degrees in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
                assert!(matches!(
                    climate.set_temperature(degrees),
                    Err(ControlError::InvalidTemperature(_))
                ));
            }
            assert!(sent(&climate).is_empty());
            let packed = climate.packed_state().map(|p| p.encode());
            match kind {
                ClimateKind::AcPartner => assert_eq!(packed, Some(0x10201600)),
                ClimateKind::Yuba => assert_eq!(packed, None),
            }
        }
    }

    #[test]
    fn test_yuba_temperature_saturates() {
        let mut climate = yuba();
        climate.update(&telemetry(json!({"power": 1})));
        climate.set_temperature(-5.0).unwrap();
        climate.set_temperature(300.0).unwrap();
        climate.set_temperature(42.9).unwrap();
        assert_eq!(
            sent(&climate),
            vec![("yuba".to_string(), 0), ("yuba".to_string(), 255), ("yuba".to_string(), 42)]
        );
    }

    #[test]
    fn test_failed_send_keeps_state() {
        let config = ClimateConfig::new(ClimateKind::AcPartner);
        let mut climate = Climate::new("lumi.ac", config, FailingGateway);
        climate.update(&telemetry(json!({"ac_state": 0x10201600u32})));
        let err = climate.set_hvac_mode("cool").unwrap_err();
        assert!(matches!(err, ControlError::Send(_)));
        assert_eq!(climate.packed_state().unwrap().encode(), 0x10201600);
    }

    #[test]
    fn test_telemetry_updates() {
        let mut climate = ac_partner();
        climate.update(&telemetry(json!({
            "power": 1,
            "mode": 0,
            "fan_mode": 2,
            "target_temperature": 26,
            "current_temperature": 24.5,
        })));
        let state = climate.state();
        assert_eq!(state.is_on, Some(true));
        assert_eq!(state.hvac_mode, Some(HvacMode::Heat));
        assert_eq!(state.fan_mode, Some(FanMode::High));
        assert_eq!(state.target_temperature, 26);
        assert_eq!(state.current_temperature, Some(24.5));

        climate.update(&telemetry(json!({"power": 0, "mode": 1, "current_temperature": 24})));
        let state = climate.state();
        assert_eq!(state.is_on, Some(false));
        assert_eq!(state.hvac_mode, Some(HvacMode::Off));
        assert_eq!(state.fan_mode, None);
        assert_eq!(state.target_temperature, 0);
        assert_eq!(state.current_temperature, Some(24.0));
    }

    #[test]
    fn test_bad_telemetry_keeps_state() {
        let mut climate = ac_partner();
        climate.update(&telemetry(json!({"power": 1, "mode": 1, "target_temperature": 20})));
        let before = climate.state();
        climate.update(&telemetry(json!({
            "power": 1,
            "mode": 0,
            "target_temperature": 30,
            "ac_state": "garbage",
        })));
        climate.update(&telemetry(json!({"power": 1, "mode": 9, "current_temperature": 10})));
        assert_eq!(climate.state(), before);
        assert!(climate.try_update(&telemetry(json!({"power": [1]}))).is_err());
    }

    #[test]
    fn test_retained_packed_seeds_modes() {
        let mut climate = ac_partner();
        climate.update(&telemetry(json!({"ac_state": 0x11101700u32.to_string()})));
        assert_eq!(climate.fan_mode(), Some(FanMode::Medium));
        assert_eq!(climate.target_temperature(), 23);
        climate.update(&telemetry(json!({"power": 1})));
        assert_eq!(climate.hvac_mode(), Some(HvacMode::Cool));
        // Live packed values only replace the buffer.
        climate.update(&telemetry(json!({"ac_state": 0x10001900u32})));
        assert_eq!(climate.hvac_mode(), Some(HvacMode::Cool));
        assert_eq!(climate.packed_state().unwrap().encode(), 0x10001900);
    }

    #[test]
    fn test_yuba() {
        let mut climate = yuba();
        assert!(matches!(climate.set_hvac_mode("heat"), Err(ControlError::NoBaseline)));
        climate.update(&telemetry(json!({
            "power": 1,
            "mode": 3,
            "fan_mode": 1,
            "swing_mode": 0,
            "target_temperature": 40,
        })));
        let state = climate.state();
        assert_eq!(state.hvac_mode, Some(HvacMode::Auto));
        assert_eq!(state.fan_mode, Some(FanMode::Medium));
        assert_eq!(state.swing_mode, Some(SwingMode::On));
        assert_eq!(state.supported_features, 41);

        climate.set_hvac_mode("dry").unwrap();
        climate.set_fan_mode("high").unwrap();
        climate.set_swing_mode("off").unwrap();
        climate.set_swing_mode("on").unwrap();
        climate.set_temperature(38.6).unwrap();
        assert!(climate.set_hvac_mode("cool").is_err());
        assert!(climate.set_swing_mode("sideways").is_err());
        assert_eq!(
            sent(&climate),
            vec![
                ("yuba".to_string(), 2),
                ("yuba".to_string(), 2),
                ("yuba".to_string(), 1),
                ("yuba".to_string(), 0),
                ("yuba".to_string(), 38),
            ]
        );
    }

    #[test]
    fn test_state_serialization() {
        let mut climate = yuba();
        climate.update(&telemetry(json!({"power": 0, "current_temperature": 21})));
        assert_eq!(
            serde_json::to_value(climate.state()).unwrap(),
            json!({
                "is_on": false,
                "hvac_mode": "off",
                "hvac_modes": ["off", "dry", "heat", "auto"],
                "fan_mode": null,
                "fan_modes": ["low", "medium", "high", "auto"],
                "swing_modes": ["off", "on"],
                "target_temperature": 0,
                "current_temperature": 21.0,
                "supported_features": 41,
                "temperature_unit": "°C",
                "precision": 1.0,
            })
        );
    }
}
