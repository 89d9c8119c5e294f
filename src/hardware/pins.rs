//! Output sinks
//!
//! The rig touches hardware through two narrow traits: digital pin writes
//! (shift-register clock/data/clear lines) and servo angle writes. Firmware
//! builds implement them over the board HAL; host builds use [`LogPins`] or
//! [`RecordingPins`].

use parking_lot::Mutex;
use std::sync::Arc;

/// Digital output lines
pub trait PinSink: Send {
    /// Drive `pin` high (`true`) or low (`false`)
    fn write_pin(&mut self, pin: u8, high: bool);
}

/// Servo position outputs
pub trait ServoSink: Send {
    /// Command the servo on `pin` to `angle` degrees
    fn write_angle(&mut self, pin: u8, angle: u8);
}

/// One recorded hardware write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinWrite {
    /// Digital line change
    Digital {
        /// Pin number
        pin: u8,
        /// Line level
        high: bool,
    },
    /// Servo angle command
    Servo {
        /// Pin number
        pin: u8,
        /// Commanded angle in degrees
        angle: u8,
    },
}

/// Sink that logs every write at trace level and otherwise discards it
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPins;

impl PinSink for LogPins {
    fn write_pin(&mut self, pin: u8, high: bool) {
        log::trace!("pin {} -> {}", pin, if high { "HIGH" } else { "LOW" });
    }
}

impl ServoSink for LogPins {
    fn write_angle(&mut self, pin: u8, angle: u8) {
        log::trace!("servo {} -> {}°", pin, angle);
    }
}

/// Sink that records every write in order
///
/// Clones share one log, so a test can keep a handle while the scheduler owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct RecordingPins {
    writes: Arc<Mutex<Vec<PinWrite>>>,
}

impl RecordingPins {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all writes so far
    pub fn writes(&self) -> Vec<PinWrite> {
        self.writes.lock().clone()
    }

    /// Number of writes so far
    pub fn len(&self) -> usize {
        self.writes.lock().len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.writes.lock().is_empty()
    }

    /// Forget recorded writes
    pub fn clear(&self) {
        self.writes.lock().clear();
    }

    /// Angles commanded on one servo pin, in order
    pub fn servo_angles(&self, pin: u8) -> Vec<u8> {
        self.writes
            .lock()
            .iter()
            .filter_map(|w| match *w {
                PinWrite::Servo { pin: p, angle } if p == pin => Some(angle),
                _ => None,
            })
            .collect()
    }

    /// Data-line level sampled at every rising edge of `clk`
    ///
    /// This is what a shift register latches, so the result is the bit stream
    /// clocked into the board.
    pub fn latched_bits(&self, clk: u8, data: u8) -> Vec<bool> {
        let mut bits = Vec::new();
        let mut clk_high = false;
        let mut data_high = false;
        for write in self.writes.lock().iter() {
            if let PinWrite::Digital { pin, high } = *write {
                if pin == data {
                    data_high = high;
                } else if pin == clk {
                    if high && !clk_high {
                        bits.push(data_high);
                    }
                    clk_high = high;
                }
            }
        }
        bits
    }

    /// Number of low pulses seen on a clear line
    pub fn clear_pulses(&self, clear: u8) -> usize {
        self.writes
            .lock()
            .iter()
            .filter(|w| matches!(w, PinWrite::Digital { pin, high: false } if *pin == clear))
            .count()
    }
}

impl PinSink for RecordingPins {
    fn write_pin(&mut self, pin: u8, high: bool) {
        self.writes.lock().push(PinWrite::Digital { pin, high });
    }
}

impl ServoSink for RecordingPins {
    fn write_angle(&mut self, pin: u8, angle: u8) {
        self.writes.lock().push(PinWrite::Servo { pin, angle });
    }
}
