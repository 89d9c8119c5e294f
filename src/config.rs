//! Rig configuration
//!
//! Everything that depends on how a particular rig is wired and tuned: pin
//! assignments, servo calibration, timing thresholds and the solenoid
//! engagement mode. [`RigConfig::default`] describes the reference ten-fret
//! rig; other rigs load a TOML file where every key is optional.
//!
//! ```toml
//! servo_threshold_ms = 120
//! engage_mode = "soft_start"
//!
//! [soft_start]
//! ramp_ms = 800
//! curve = "sine"
//! ```

use crate::actuator::soft_start::SoftStartConfig;
use crate::hardware::{BitOrder, BoardPins};
use crate::{Result, RigError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Calibrated endpoints of one picker servo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoCalibration {
    /// Servo signal pin
    pub pin: u8,
    /// First picking endpoint in degrees
    pub pos_a: u8,
    /// Second picking endpoint in degrees
    pub pos_b: u8,
    /// Damped rest position; the midpoint of the endpoints when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<u8>,
}

impl ServoCalibration {
    /// Calibration with the default rest position
    pub const fn new(pin: u8, pos_a: u8, pos_b: u8) -> Self {
        ServoCalibration {
            pin,
            pos_a,
            pos_b,
            rest: None,
        }
    }

    /// Rest position in degrees
    pub fn rest_angle(&self) -> u8 {
        self.rest
            .unwrap_or(((self.pos_a as u16 + self.pos_b as u16) / 2) as u8)
    }
}

/// How a pressed fret's solenoid is switched on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngageMode {
    /// Full power immediately
    #[default]
    Instant,
    /// Software-PWM ramp up to full power
    SoftStart,
}

const REFERENCE_BOARDS: [(u8, u8, u8); 10] = [
    (22, 26, 24),
    (28, 32, 30),
    (34, 38, 36),
    (40, 44, 42),
    (50, 46, 48),
    (23, 27, 25),
    (29, 33, 31),
    (35, 39, 37),
    (41, 45, 43),
    (47, 51, 49),
];

const REFERENCE_SERVOS: [ServoCalibration; 6] = [
    ServoCalibration::new(2, 86, 106),
    ServoCalibration::new(3, 78, 96),
    ServoCalibration::new(4, 79, 100),
    ServoCalibration::new(5, 80, 96),
    ServoCalibration::new(6, 85, 107),
    ServoCalibration::new(7, 74, 97),
];

/// Complete rig description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Physical register bit of each string, string 1 first
    pub string_bits: [u8; 6],
    /// Minimum gap to the next note on a string for a re-pick
    pub servo_threshold_ms: u32,
    /// Move the picker to rest when a string is switched off
    pub damp_on_release: bool,
    /// Clear other frets of a string before pressing a new one
    pub enforce_single_fret: bool,
    /// Minimum spacing of status reports
    pub status_interval_ms: u32,
    /// Bounded wait for a shared-resource token
    pub token_timeout_ms: u64,
    /// Solenoid engagement mode
    pub engage_mode: EngageMode,
    /// Ramp parameters used by [`EngageMode::SoftStart`]
    pub soft_start: SoftStartConfig,
    /// One entry per fret board, fret 1 first
    pub boards: Vec<BoardPins>,
    /// One picker servo per string, string 1 first
    pub servos: Vec<ServoCalibration>,
}

impl Default for RigConfig {
    fn default() -> Self {
        RigConfig {
            boards: REFERENCE_BOARDS
                .iter()
                .map(|&(clk, data, clear)| BoardPins {
                    clk,
                    data,
                    clear,
                    bit_order: BitOrder::LsbFirst,
                })
                .collect(),
            string_bits: [0, 1, 5, 4, 7, 6],
            servos: REFERENCE_SERVOS.to_vec(),
            servo_threshold_ms: 100,
            damp_on_release: false,
            enforce_single_fret: true,
            status_interval_ms: 1000,
            token_timeout_ms: 5,
            engage_mode: EngageMode::Instant,
            soft_start: SoftStartConfig::default(),
        }
    }
}

impl RigConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RigConfig =
            toml::from_str(text).map_err(|e| RigError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!(
            "loaded rig config from {} ({} boards)",
            path.display(),
            config.boards.len()
        );
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| RigError::Config(e.to_string()))
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.boards.is_empty() {
            return Err(RigError::Config("at least one fret board is required".into()));
        }
        let mut seen = 0u8;
        for (i, &bit) in self.string_bits.iter().enumerate() {
            if bit > 7 {
                return Err(RigError::Config(format!(
                    "string {} mapped to bit {}, registers have 8 bits",
                    i + 1,
                    bit
                )));
            }
            if seen & (1 << bit) != 0 {
                return Err(RigError::Config(format!(
                    "register bit {} assigned to more than one string",
                    bit
                )));
            }
            seen |= 1 << bit;
        }
        if self.servos.len() > 6 {
            return Err(RigError::Config(format!(
                "{} servos configured for 6 strings",
                self.servos.len()
            )));
        }
        for (i, servo) in self.servos.iter().enumerate() {
            if servo.pos_a == servo.pos_b {
                return Err(RigError::Config(format!(
                    "servo for string {} has identical endpoints",
                    i + 1
                )));
            }
        }
        if self.soft_start.period_ms == 0 {
            return Err(RigError::Config("soft-start PWM period must be positive".into()));
        }
        Ok(())
    }

    /// Number of fret boards
    pub fn fret_count(&self) -> usize {
        self.boards.len()
    }

    /// Token wait as a [`Duration`]
    pub fn token_timeout(&self) -> Duration {
        Duration::from_millis(self.token_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::soft_start::RampCurve;

    #[test]
    fn test_default_is_reference_rig() {
        let config = RigConfig::default();
        assert_eq!(config.fret_count(), 10);
        assert_eq!(config.boards[4].clk, 50);
        assert_eq!(config.servos.len(), 6);
        assert_eq!(config.servos[0].rest_angle(), 96);
        assert_eq!(config.token_timeout(), Duration::from_millis(5));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RigConfig::from_toml_str(
            r#"
            servo_threshold_ms = 120
            engage_mode = "soft_start"

            [soft_start]
            ramp_ms = 800
            curve = "sine"
            "#,
        )
        .unwrap();
        assert_eq!(config.servo_threshold_ms, 120);
        assert_eq!(config.engage_mode, EngageMode::SoftStart);
        assert_eq!(config.soft_start.ramp_ms, 800);
        assert_eq!(config.soft_start.period_ms, 5);
        assert_eq!(config.soft_start.curve, RampCurve::Sine);
        assert_eq!(config.fret_count(), 10);
    }

    #[test]
    fn test_board_bit_order_from_toml() {
        let config = RigConfig::from_toml_str(
            r#"
            [[boards]]
            clk = 1
            data = 2
            clear = 3
            bit_order = "msb_first"
            "#,
        )
        .unwrap();
        assert_eq!(config.fret_count(), 1);
        assert_eq!(config.boards[0].bit_order, BitOrder::MsbFirst);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = RigConfig {
            string_bits: [0, 1, 2, 3, 4, 4],
            ..RigConfig::default()
        };
        assert!(matches!(config.validate(), Err(RigError::Config(_))));

        config.string_bits = [0, 1, 2, 3, 4, 8];
        assert!(config.validate().is_err());

        config = RigConfig::default();
        config.boards.clear();
        assert!(config.validate().is_err());

        config = RigConfig::default();
        config.servos[2].pos_b = config.servos[2].pos_a;
        assert!(config.validate().is_err());

        config = RigConfig::default();
        config.soft_start.period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RigConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(RigConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        assert!(matches!(
            RigConfig::from_toml_str("servo_threshold_ms = \"soon\""),
            Err(RigError::Config(_))
        ));
    }
}
