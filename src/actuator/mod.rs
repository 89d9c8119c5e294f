//! String and fret actuators
//!
//! Picker servos pluck strings; soft-start ramps ease fret solenoids in.

pub mod picker;
pub mod soft_start;

pub use crate::config::ServoCalibration;
pub use picker::{MoveRate, PickSide, StringPicker};
pub use soft_start::{
    GateChange, RampCurve, SoftStart, SoftStartBank, SoftStartConfig, SoftStartPhase,
};
