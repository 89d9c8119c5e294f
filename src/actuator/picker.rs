//! Servo string pickers
//!
//! A picker plucks its string by swinging from one calibrated endpoint to
//! the other, so consecutive picks alternate direction. The real-time path
//! uses [`StringPicker::pick_once`], which remembers the last note it picked
//! and ignores a repeated request for the same note.

use crate::config::ServoCalibration;
use crate::hardware::ServoSink;
use crate::timing::Clock;

/// How fast a picker travels to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveRate {
    /// One position write
    #[default]
    Immediate,
    /// One-degree steps with a delay between writes (blocks the caller)
    Stepped {
        /// Delay after each step
        step_delay_ms: u64,
    },
}

/// Endpoint a picker is resting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickSide {
    /// `pos_a`
    A,
    /// `pos_b`
    B,
}

/// One string's picker servo
#[derive(Debug, Clone)]
pub struct StringPicker {
    calibration: ServoCalibration,
    side: PickSide,
    angle: u8,
    last_note: Option<u64>,
}

impl StringPicker {
    /// Picker parked (logically) at `pos_a`; nothing is written until
    /// [`attach`](Self::attach)
    pub fn new(calibration: ServoCalibration) -> Self {
        StringPicker {
            angle: calibration.pos_a,
            calibration,
            side: PickSide::A,
            last_note: None,
        }
    }

    /// Calibration in use
    pub fn calibration(&self) -> &ServoCalibration {
        &self.calibration
    }

    /// Endpoint the next pick moves away from
    pub fn side(&self) -> PickSide {
        self.side
    }

    /// Last commanded angle
    pub fn angle(&self) -> u8 {
        self.angle
    }

    /// Drive the servo to `pos_a`
    pub fn attach<S: ServoSink + ?Sized>(&mut self, servos: &mut S) {
        self.side = PickSide::A;
        self.angle = self.calibration.pos_a;
        self.last_note = None;
        servos.write_angle(self.calibration.pin, self.angle);
    }

    /// Swing to the opposite endpoint
    pub fn pick<S: ServoSink + ?Sized>(
        &mut self,
        servos: &mut S,
        clock: &dyn Clock,
        rate: MoveRate,
    ) {
        let (target, side) = match self.side {
            PickSide::A => (self.calibration.pos_b, PickSide::B),
            PickSide::B => (self.calibration.pos_a, PickSide::A),
        };
        self.move_to(servos, clock, target, rate);
        self.side = side;
    }

    /// Pick for `note`, unless this note was already picked
    ///
    /// Always moves immediately. Returns whether the servo moved.
    pub fn pick_once<S: ServoSink + ?Sized>(&mut self, servos: &mut S, note: u64) -> bool {
        if self.last_note == Some(note) {
            return false;
        }
        let (target, side) = match self.side {
            PickSide::A => (self.calibration.pos_b, PickSide::B),
            PickSide::B => (self.calibration.pos_a, PickSide::A),
        };
        self.angle = target;
        servos.write_angle(self.calibration.pin, target);
        self.side = side;
        self.last_note = Some(note);
        true
    }

    /// Move to the rest position, muting the string
    ///
    /// The picking side is kept, so the next pick still travels to the
    /// opposite endpoint of the last pick.
    pub fn damp<S: ServoSink + ?Sized>(
        &mut self,
        servos: &mut S,
        clock: &dyn Clock,
        rate: MoveRate,
    ) {
        let rest = self.calibration.rest_angle();
        self.move_to(servos, clock, rest, rate);
    }

    /// Forget which note was last picked
    pub fn reset_note(&mut self) {
        self.last_note = None;
    }

    fn move_to<S: ServoSink + ?Sized>(
        &mut self,
        servos: &mut S,
        clock: &dyn Clock,
        target: u8,
        rate: MoveRate,
    ) {
        match rate {
            MoveRate::Immediate => {
                self.angle = target;
                servos.write_angle(self.calibration.pin, target);
            }
            MoveRate::Stepped { step_delay_ms } => {
                while self.angle != target {
                    if self.angle < target {
                        self.angle += 1;
                    } else {
                        self.angle -= 1;
                    }
                    servos.write_angle(self.calibration.pin, self.angle);
                    clock.sleep_ms(step_delay_ms);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::RecordingPins;
    use crate::timing::{Clock, ManualClock};

    fn picker() -> (StringPicker, RecordingPins, ManualClock) {
        let mut servos = RecordingPins::new();
        let mut p = StringPicker::new(ServoCalibration::new(9, 80, 100));
        p.attach(&mut servos);
        (p, servos, ManualClock::new())
    }

    #[test]
    fn test_pick_toggles_between_endpoints() {
        let (mut p, mut servos, clock) = picker();
        p.pick(&mut servos, &clock, MoveRate::Immediate);
        assert_eq!(p.side(), PickSide::B);
        p.pick(&mut servos, &clock, MoveRate::Immediate);
        assert_eq!(p.side(), PickSide::A);
        assert_eq!(servos.servo_angles(9), vec![80, 100, 80]);
    }

    #[test]
    fn test_pick_once_is_idempotent_per_note() {
        let (mut p, mut servos, _) = picker();
        assert!(p.pick_once(&mut servos, 7));
        assert!(!p.pick_once(&mut servos, 7));
        assert!(p.pick_once(&mut servos, 8));
        assert_eq!(servos.servo_angles(9), vec![80, 100, 80]);
    }

    #[test]
    fn test_damp_goes_to_rest_and_keeps_side() {
        let (mut p, mut servos, clock) = picker();
        p.pick(&mut servos, &clock, MoveRate::Immediate);
        p.damp(&mut servos, &clock, MoveRate::Immediate);
        assert_eq!(p.angle(), 90);
        assert_eq!(p.side(), PickSide::B);
        p.pick(&mut servos, &clock, MoveRate::Immediate);
        assert_eq!(p.angle(), 80);
    }

    #[test]
    fn test_stepped_move_writes_every_degree() {
        let (mut p, mut servos, clock) = picker();
        servos.clear();
        p.pick(&mut servos, &clock, MoveRate::Stepped { step_delay_ms: 2 });
        let angles = servos.servo_angles(9);
        assert_eq!(angles.len(), 20);
        assert_eq!(angles.first(), Some(&81));
        assert_eq!(angles.last(), Some(&100));
        assert_eq!(clock.now_ms(), 40);
    }
}
