//! Event dispatch onto the rig hardware
//!
//! [`Rig`] owns every actuator: the fret boards, the picker servos and the
//! soft-start ramps. Dispatching one event mutates the fret state and then
//! re-serializes only the boards whose output may have changed.

use crate::actuator::{MoveRate, SoftStartBank, StringPicker};
use crate::config::{EngageMode, RigConfig};
use crate::hardware::{Fretboard, PinSink, ServoSink};
use crate::song::{Event, Fret, GuitarString};
use crate::timing::{Clock, SystemClock};
use crate::{Result, RigError};
use std::sync::Arc;

/// What one dispatch did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Boards re-serialized, in order
    pub serialized: Vec<usize>,
    /// Whether the string was picked
    pub picked: bool,
    /// Whether the picker moved to rest
    pub damped: bool,
}

/// Actuators of the whole rig
pub struct Rig<P: PinSink, S: ServoSink> {
    board: Fretboard<P>,
    servos: S,
    pickers: Vec<StringPicker>,
    soft_start: SoftStartBank,
    engage_mode: EngageMode,
    damp_on_release: bool,
    enforce_single_fret: bool,
    clock: Arc<dyn Clock>,
}

impl<P: PinSink, S: ServoSink> Rig<P, S> {
    /// Bring up boards and pickers described by `config`
    ///
    /// Boards are driven idle and every picker is attached at its first
    /// endpoint.
    pub fn new(config: &RigConfig, pins: P, mut servos: S) -> Self {
        if let Err(e) = config.validate() {
            log::error!("bringing up rig with an invalid configuration: {}", e);
        }
        let board = Fretboard::new(config, pins);
        let pickers = config
            .servos
            .iter()
            .map(|cal| {
                let mut picker = StringPicker::new(*cal);
                picker.attach(&mut servos);
                picker
            })
            .collect();
        Rig {
            board,
            servos,
            pickers,
            soft_start: SoftStartBank::new(config.soft_start),
            engage_mode: config.engage_mode,
            damp_on_release: config.damp_on_release,
            enforce_single_fret: config.enforce_single_fret,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Clock used for blocking (stepped) picker moves
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    /// Fret boards
    pub fn board(&self) -> &Fretboard<P> {
        &self.board
    }

    /// Servo sink
    pub fn servos(&self) -> &S {
        &self.servos
    }

    /// Picker for `string`, if one is configured
    pub fn picker(&self, string: GuitarString) -> Option<&StringPicker> {
        self.pickers.get(string.index())
    }

    /// Soft-start ramps in progress
    pub fn soft_start(&self) -> &SoftStartBank {
        &self.soft_start
    }

    /// Apply one event
    ///
    /// `note` identifies the event for idempotent picking; `pick` is the
    /// hammer-on decision. A fret beyond the configured boards is rejected
    /// before anything is written.
    pub fn dispatch(
        &mut self,
        event: &Event,
        note: u64,
        pick: bool,
        now_ms: u64,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        let string = event.string;

        match event.fret {
            Fret::Off | Fret::Open => {
                self.board.clear_string(string);
                self.soft_start.cancel_string(string);
                self.board.serialize_all();
                report.serialized = (0..self.board.fret_count()).collect();

                if event.fret == Fret::Off {
                    if self.damp_on_release {
                        report.damped = self.damp(string);
                    }
                } else if pick {
                    report.picked = self.pick(string, note);
                }
            }
            Fret::Pressed(n) => {
                let target = n as usize - 1;
                if target >= self.board.fret_count() {
                    return Err(RigError::BadEvent(format!(
                        "fret {} beyond the {} configured boards",
                        n,
                        self.board.fret_count()
                    )));
                }

                if !self.board.state().is_set(target, string) {
                    if self.enforce_single_fret {
                        for other in self.board.state().boards_holding(string) {
                            log::warn!(
                                "string {} still held on fret {}, releasing before fret {}",
                                string,
                                other + 1,
                                n
                            );
                            self.board.clear_bit(other, string)?;
                            self.soft_start.cancel(other, string);
                            self.board.serialize(other);
                            report.serialized.push(other);
                        }
                    }

                    self.board.set_bit(target, string)?;
                    if self.engage_mode == EngageMode::SoftStart {
                        let gated = self.soft_start.engage(target, string, now_ms);
                        self.board.set_gate(target, string, gated);
                    }
                    self.board.serialize(target);
                    report.serialized.push(target);
                }

                if pick {
                    report.picked = self.pick(string, note);
                }
            }
        }

        log::debug!(
            "dispatched {} (boards {:?}, picked {})",
            event,
            report.serialized,
            report.picked
        );
        Ok(report)
    }

    /// Advance soft-start ramps; returns the boards re-serialized
    pub fn poll_soft_start(&mut self, now_ms: u64) -> Vec<usize> {
        let mut boards: Vec<usize> = Vec::new();
        for change in self.soft_start.poll(now_ms) {
            self.board.set_gate(change.board, change.string, change.gated);
            if !boards.contains(&change.board) {
                boards.push(change.board);
            }
        }
        for &board in &boards {
            self.board.serialize(board);
        }
        boards
    }

    /// Release every string on every board
    pub fn release_all(&mut self) {
        self.soft_start.clear();
        self.board.clear_all();
    }

    /// Forget picked-note ids, so a restarted song picks again
    pub fn reset_notes(&mut self) {
        for picker in &mut self.pickers {
            picker.reset_note();
        }
    }

    fn pick(&mut self, string: GuitarString, note: u64) -> bool {
        match self.pickers.get_mut(string.index()) {
            Some(picker) => picker.pick_once(&mut self.servos, note),
            None => {
                log::debug!("no picker configured for string {}", string);
                false
            }
        }
    }

    fn damp(&mut self, string: GuitarString) -> bool {
        match self.pickers.get_mut(string.index()) {
            Some(picker) => {
                picker.damp(&mut self.servos, self.clock.as_ref(), MoveRate::Immediate);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::RecordingPins;

    fn rig(config: &RigConfig) -> (Rig<RecordingPins, RecordingPins>, RecordingPins, RecordingPins) {
        let pins = RecordingPins::new();
        let servos = RecordingPins::new();
        let rig = Rig::new(config, pins.clone(), servos.clone());
        pins.clear();
        servos.clear();
        (rig, pins, servos)
    }

    fn ev(t: u32, s: i64, f: i64) -> Event {
        Event::new(t, s, f).unwrap()
    }

    #[test]
    fn test_repeated_press_does_not_reserialize() {
        let config = RigConfig::default();
        let (mut rig, pins, _) = rig(&config);
        let first = rig.dispatch(&ev(0, 1, 2), 0, false, 0).unwrap();
        assert_eq!(first.serialized, vec![1]);
        let writes = pins.len();

        let second = rig.dispatch(&ev(10, 1, 2), 1, false, 10).unwrap();
        assert!(second.serialized.is_empty());
        assert_eq!(pins.len(), writes);
        assert!(rig.board().state().is_set(1, GuitarString::HighE));
    }

    #[test]
    fn test_off_clears_every_board() {
        let config = RigConfig {
            enforce_single_fret: false,
            ..RigConfig::default()
        };
        let (mut rig, pins, _) = rig(&config);
        rig.dispatch(&ev(0, 1, 2), 0, false, 0).unwrap();
        rig.dispatch(&ev(0, 1, 7), 1, false, 0).unwrap();
        assert_eq!(rig.board().state().boards_holding(GuitarString::HighE), vec![1, 6]);

        pins.clear();
        let report = rig.dispatch(&ev(5, 1, -1), 2, true, 5).unwrap();
        assert!(rig.board().state().is_clear());
        assert_eq!(report.serialized.len(), config.fret_count());
        assert!(!report.picked);
        for p in &config.boards {
            assert_eq!(pins.clear_pulses(p.clear), 1);
        }
    }

    #[test]
    fn test_single_fret_enforced() {
        let config = RigConfig::default();
        let (mut rig, _, _) = rig(&config);
        rig.dispatch(&ev(0, 3, 2), 0, false, 0).unwrap();
        let report = rig.dispatch(&ev(10, 3, 5), 1, false, 10).unwrap();
        assert_eq!(report.serialized, vec![1, 4]);
        assert_eq!(rig.board().state().boards_holding(GuitarString::G), vec![4]);
    }

    #[test]
    fn test_fret_beyond_boards_rejected_without_writes() {
        let config = RigConfig::default();
        let (mut rig, pins, servos) = rig(&config);
        let result = rig.dispatch(&ev(0, 2, 11), 0, true, 0);
        assert!(matches!(result, Err(RigError::BadEvent(_))));
        assert!(pins.is_empty());
        assert!(servos.is_empty());
        assert!(rig.board().state().is_clear());
    }

    #[test]
    fn test_pick_is_idempotent_per_note() {
        let config = RigConfig::default();
        let (mut rig, _, servos) = rig(&config);
        let pin = config.servos[0].pin;
        assert!(rig.dispatch(&ev(0, 1, 0), 4, true, 0).unwrap().picked);
        assert!(!rig.dispatch(&ev(0, 1, 0), 4, true, 0).unwrap().picked);
        assert_eq!(servos.servo_angles(pin), vec![config.servos[0].pos_b]);
    }

    #[test]
    fn test_damp_on_release() {
        let config = RigConfig {
            damp_on_release: true,
            ..RigConfig::default()
        };
        let (mut rig, _, servos) = rig(&config);
        let report = rig.dispatch(&ev(0, 2, -1), 0, false, 0).unwrap();
        assert!(report.damped);
        let cal = config.servos[1];
        assert_eq!(servos.servo_angles(cal.pin), vec![cal.rest_angle()]);
    }

    #[test]
    fn test_soft_start_gates_then_releases() {
        let mut config = RigConfig::default();
        config.engage_mode = EngageMode::SoftStart;
        config.soft_start.ramp_ms = 50;
        let (mut rig, _, _) = rig(&config);

        rig.dispatch(&ev(0, 6, 1), 0, false, 0).unwrap();
        assert!(rig.soft_start().is_ramping(0, GuitarString::LowE));
        assert_eq!(rig.board().physical_byte(0), 0);

        for t in 1..=50 {
            rig.poll_soft_start(t);
        }
        assert_eq!(rig.soft_start().active(), 0);
        assert_eq!(rig.board().physical_byte(0), 1 << config.string_bits[5]);
    }
}
