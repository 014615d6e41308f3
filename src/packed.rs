//! The packed climate state exchanged with AC partner devices.
//!
//! The device reports (and accepts) its whole control state as one unsigned 32-bit integer,
//! big-endian, one field per byte:
//!
//! ```text
//!  byte 0      byte 1      byte 2                byte 3
//! +-----------+-----------+---------------------+----------+
//! | hvac code | fan code  | target temperature  | reserved |
//! +-----------+-----------+---------------------+----------+
//! ```
//!
//! Control operations change one byte and hand the re-encoded integer back to the gateway.

use crate::modes::{AC_PACKED_FAN, AC_PACKED_HVAC, FanMode, HvacMode, InvalidModeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PackedClimateState {
    pub hvac_code: u8,
    pub fan_code: u8,
    /// Whole degrees.
    pub target_temperature: u8,
    pub reserved: u8,
}

/// What to do with a requested target temperature of zero.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ZeroTemperature {
    /// Treat zero as "no temperature given" and do nothing.
    #[default]
    Ignore,
    /// Treat zero as a genuine target of 0 degrees.
    Accept,
}

impl ZeroTemperature {
    pub fn permits(self, degrees: f64) -> bool {
        degrees != 0.0 || self == ZeroTemperature::Accept
    }
}

impl PackedClimateState {
    pub const fn decode(raw: u32) -> Self {
        let [hvac_code, fan_code, target_temperature, reserved] = raw.to_be_bytes();
        Self { hvac_code, fan_code, target_temperature, reserved }
    }

    pub const fn encode(&self) -> u32 {
        u32::from_be_bytes([self.hvac_code, self.fan_code, self.target_temperature, self.reserved])
    }

    pub fn with_hvac_mode(self, name: &str) -> Result<Self, InvalidModeError> {
        let hvac_code =
            AC_PACKED_HVAC.code_by_name(name).ok_or_else(|| InvalidModeError::Hvac(name.into()))?;
        Ok(Self { hvac_code, ..self })
    }

    pub fn with_fan_mode(self, name: &str) -> Result<Self, InvalidModeError> {
        let fan_code =
            AC_PACKED_FAN.code_by_name(name).ok_or_else(|| InvalidModeError::Fan(name.into()))?;
        Ok(Self { fan_code, ..self })
    }

    /// Replace the target temperature byte.
    ///
    /// Fractions are dropped and values outside of 0..=255 saturate.
    pub fn with_target_temperature(self, degrees: f64) -> Self {
        Self { target_temperature: degrees as u8, ..self }
    }

    pub fn hvac_mode(&self) -> Option<HvacMode> {
        AC_PACKED_HVAC.mode(self.hvac_code)
    }

    pub fn fan_mode(&self) -> Option<FanMode> {
        AC_PACKED_FAN.mode(self.fan_code)
    }
}

/// Apply an hvac mode change to a possibly not-yet-observed state.
///
/// `Ok(None)` means there is no baseline to change and nothing must be transmitted.
pub fn set_hvac_mode(
    state: Option<PackedClimateState>,
    name: &str,
) -> Result<Option<PackedClimateState>, InvalidModeError> {
    state.map(|s| s.with_hvac_mode(name)).transpose()
}

pub fn set_fan_mode(
    state: Option<PackedClimateState>,
    name: &str,
) -> Result<Option<PackedClimateState>, InvalidModeError> {
    state.map(|s| s.with_fan_mode(name)).transpose()
}

pub fn set_target_temperature(
    state: Option<PackedClimateState>,
    degrees: f64,
    zero: ZeroTemperature,
) -> Option<PackedClimateState> {
    if !degrees.is_finite() || !zero.permits(degrees) {
        return None;
    }
    state.map(|s| s.with_target_temperature(degrees))
}
