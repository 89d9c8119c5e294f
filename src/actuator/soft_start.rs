//! Soft-start solenoid engagement
//!
//! A solenoid slammed to full power is loud. Soft-start instead drives it
//! with software PWM whose duty cycle climbs from 0 to 100% over `ramp_ms`.
//! Each ramp is a small state machine advanced by [`SoftStart::poll`], so
//! the playback tick (or a test with simulated time) decides when it runs.
//!
//! Duty within one PWM period:
//! - `on_time = duty(progress) * period`
//! - `off_time = period - on_time`
//!
//! Once `elapsed >= ramp_ms` the output snaps to full-on and stays there.

use crate::song::GuitarString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f32::consts::PI;

/// Duty-cycle profile over the ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampCurve {
    /// Duty equals progress
    #[default]
    Linear,
    /// Fast start, slow finish
    Logarithmic,
    /// Slow start and finish
    Sine,
}

impl RampCurve {
    /// Duty cycle (0.0..=1.0) at `progress` (0.0..=1.0)
    pub fn duty(self, progress: f32) -> f32 {
        let p = progress.clamp(0.0, 1.0);
        match self {
            RampCurve::Linear => p,
            RampCurve::Logarithmic => (1.0 + 255.0 * p).ln() / 256f32.ln(),
            RampCurve::Sine => ((PI * p - PI / 2.0).sin() + 1.0) / 2.0,
        }
    }
}

/// Ramp parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftStartConfig {
    /// Time from first engagement to full power
    pub ramp_ms: u32,
    /// Software PWM period
    pub period_ms: u32,
    /// Duty profile
    pub curve: RampCurve,
}

impl Default for SoftStartConfig {
    fn default() -> Self {
        SoftStartConfig {
            ramp_ms: 1000,
            period_ms: 5,
            curve: RampCurve::Linear,
        }
    }
}

/// Where a ramp is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftStartPhase {
    /// Not engaged, output off
    #[default]
    Idle,
    /// PWM ramp in progress
    Ramping {
        /// Time the ramp began
        start_ms: u64,
        /// Time of the last output toggle
        last_toggle_ms: u64,
        /// Current PWM output level
        pwm_on: bool,
    },
    /// Ramp complete, output held on
    FullOn,
}

/// One solenoid's soft-start state machine
#[derive(Debug, Clone, Copy)]
pub struct SoftStart {
    config: SoftStartConfig,
    phase: SoftStartPhase,
}

impl SoftStart {
    /// Idle ramp
    pub fn new(config: SoftStartConfig) -> Self {
        SoftStart {
            config,
            phase: SoftStartPhase::Idle,
        }
    }

    /// Current phase
    pub fn phase(&self) -> SoftStartPhase {
        self.phase
    }

    /// Whether the solenoid is currently powered
    pub fn output(&self) -> bool {
        match self.phase {
            SoftStartPhase::Idle => false,
            SoftStartPhase::Ramping { pwm_on, .. } => pwm_on,
            SoftStartPhase::FullOn => true,
        }
    }

    /// Start ramping at `now_ms`; returns the output level
    pub fn begin(&mut self, now_ms: u64) -> bool {
        self.phase = if self.config.ramp_ms == 0 {
            SoftStartPhase::FullOn
        } else {
            SoftStartPhase::Ramping {
                start_ms: now_ms,
                last_toggle_ms: now_ms,
                pwm_on: false,
            }
        };
        self.output()
    }

    /// Drop back to idle
    pub fn cancel(&mut self) {
        self.phase = SoftStartPhase::Idle;
    }

    /// Advance to `now_ms`; returns the output level
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if let SoftStartPhase::Ramping {
            start_ms,
            last_toggle_ms,
            pwm_on,
        } = self.phase
        {
            let elapsed = now_ms.saturating_sub(start_ms);
            let ramp = self.config.ramp_ms as u64;
            if elapsed >= ramp {
                self.phase = SoftStartPhase::FullOn;
                return true;
            }

            let progress = elapsed as f32 / ramp as f32;
            let period = self.config.period_ms as f32;
            let on_time = self.config.curve.duty(progress) * period;
            let off_time = period - on_time;
            let since_toggle = now_ms.saturating_sub(last_toggle_ms) as f32;

            let toggle = if pwm_on {
                since_toggle >= on_time
            } else {
                since_toggle >= off_time
            };
            if toggle {
                self.phase = SoftStartPhase::Ramping {
                    start_ms,
                    last_toggle_ms: now_ms,
                    pwm_on: !pwm_on,
                };
            }
        }
        self.output()
    }
}

/// Output change reported by [`SoftStartBank::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateChange {
    /// Fret board index
    pub board: usize,
    /// String on that board
    pub string: GuitarString,
    /// `true` while the solenoid must be held off
    pub gated: bool,
}

/// Active ramps, one per (board, string)
#[derive(Debug, Clone)]
pub struct SoftStartBank {
    config: SoftStartConfig,
    ramps: BTreeMap<(usize, GuitarString), SoftStart>,
}

impl SoftStartBank {
    /// Empty bank
    pub fn new(config: SoftStartConfig) -> Self {
        SoftStartBank {
            config,
            ramps: BTreeMap::new(),
        }
    }

    /// Number of ramps still in progress
    pub fn active(&self) -> usize {
        self.ramps.len()
    }

    /// Whether `(board, string)` is ramping
    pub fn is_ramping(&self, board: usize, string: GuitarString) -> bool {
        self.ramps.contains_key(&(board, string))
    }

    /// Start a ramp; returns whether the solenoid must be gated off now
    pub fn engage(&mut self, board: usize, string: GuitarString, now_ms: u64) -> bool {
        let mut ramp = SoftStart::new(self.config);
        let on = ramp.begin(now_ms);
        if !on {
            self.ramps.insert((board, string), ramp);
        }
        !on
    }

    /// Forget the ramp on `(board, string)`
    pub fn cancel(&mut self, board: usize, string: GuitarString) {
        self.ramps.remove(&(board, string));
    }

    /// Forget every ramp on `string`
    pub fn cancel_string(&mut self, string: GuitarString) {
        self.ramps.retain(|&(_, s), _| s != string);
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.ramps.clear();
    }

    /// Advance every ramp; returns the gates whose level changed
    ///
    /// Ramps that reach full-on are reported ungated and dropped.
    pub fn poll(&mut self, now_ms: u64) -> Vec<GateChange> {
        let mut changes = Vec::new();
        self.ramps.retain(|&(board, string), ramp| {
            let before = ramp.output();
            let after = ramp.poll(now_ms);
            if before != after {
                changes.push(GateChange {
                    board,
                    string,
                    gated: !after,
                });
            }
            ramp.phase() != SoftStartPhase::FullOn
        });
        changes
    }
}
