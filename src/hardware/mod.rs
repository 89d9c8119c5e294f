//! Fret board hardware
//!
//! Logical per-fret string masks, the shift registers they are serialized
//! to, and the pin sinks everything is written through.

pub mod fret_state;
pub mod fretboard;
pub mod pins;
pub mod shift_register;

pub use fret_state::{FretState, StringSet};
pub use fretboard::Fretboard;
pub use pins::{LogPins, PinSink, PinWrite, RecordingPins, ServoSink};
pub use shift_register::{BitOrder, BoardPins, ShiftRegister};
