//! Hardware State Model
//!
//! Couples the logical [`FretState`] with the shift registers that realise
//! it. Mutations only touch the in-memory masks; nothing reaches the pins
//! until [`Fretboard::serialize`] is called for a board, which lets the
//! scheduler re-serialize exactly the boards an event affected.

use super::{BoardPins, FretState, PinSink, ShiftRegister, StringSet};
use crate::config::RigConfig;
use crate::song::GuitarString;
use crate::Result;

/// All fret boards of the rig plus their output sink
pub struct Fretboard<P: PinSink> {
    state: FretState,
    registers: Vec<ShiftRegister>,
    string_bits: [u8; 6],
    /// Strings whose solenoid is held off by a soft-start PWM phase
    pwm_gate: Vec<StringSet>,
    sink: P,
}

impl<P: PinSink> Fretboard<P> {
    /// Build the boards described by `config` and drive their lines idle
    pub fn new(config: &RigConfig, mut sink: P) -> Self {
        let registers: Vec<ShiftRegister> =
            config.boards.iter().copied().map(ShiftRegister::new).collect();
        for reg in &registers {
            reg.init(&mut sink);
        }
        Fretboard {
            state: FretState::new(registers.len()),
            pwm_gate: vec![StringSet::empty(); registers.len()],
            registers,
            string_bits: config.string_bits,
            sink,
        }
    }

    /// Number of boards
    pub fn fret_count(&self) -> usize {
        self.registers.len()
    }

    /// Logical state
    pub fn state(&self) -> &FretState {
        &self.state
    }

    /// Engaged strings on `board`
    pub fn mask(&self, board: usize) -> StringSet {
        self.state.mask(board)
    }

    /// Pin assignment of `board`
    pub fn board_pins(&self, board: usize) -> Option<&BoardPins> {
        self.registers.get(board).map(ShiftRegister::pins)
    }

    /// Engage `string` on `board` (state only)
    pub fn set_bit(&mut self, board: usize, string: GuitarString) -> Result<bool> {
        self.state.set(board, string)
    }

    /// Release `string` on `board` (state only)
    pub fn clear_bit(&mut self, board: usize, string: GuitarString) -> Result<bool> {
        let changed = self.state.clear(board, string)?;
        self.pwm_gate[board].remove(StringSet::of(string));
        Ok(changed)
    }

    /// Release `string` on every board (state only); returns changed boards
    pub fn clear_string(&mut self, string: GuitarString) -> Vec<usize> {
        for gate in &mut self.pwm_gate {
            gate.remove(StringSet::of(string));
        }
        self.state.clear_string(string)
    }

    /// Hold a string's solenoid off (or let it through) without changing
    /// the logical state
    pub fn set_gate(&mut self, board: usize, string: GuitarString, gated: bool) {
        if let Some(gate) = self.pwm_gate.get_mut(board) {
            gate.set(StringSet::of(string), gated);
        }
    }

    /// Byte that `serialize(board)` would emit
    pub fn physical_byte(&self, board: usize) -> u8 {
        let gate = self.pwm_gate.get(board).copied().unwrap_or_default();
        (self.state.mask(board) - gate).to_physical(&self.string_bits)
    }

    /// Emit `board`'s current mask to its shift register
    pub fn serialize(&mut self, board: usize) {
        let byte = self.physical_byte(board);
        if let Some(reg) = self.registers.get(board) {
            reg.shift_out(&mut self.sink, byte);
        }
    }

    /// Emit every board
    pub fn serialize_all(&mut self) {
        for board in 0..self.registers.len() {
            self.serialize(board);
        }
    }

    /// Release every string and emit every board
    pub fn clear_all(&mut self) {
        self.state.clear_all();
        self.pwm_gate.fill(StringSet::empty());
        self.serialize_all();
    }

    /// Output sink
    pub fn sink(&self) -> &P {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::RecordingPins;

    fn board() -> (Fretboard<RecordingPins>, RecordingPins, RigConfig) {
        let config = RigConfig::default();
        let pins = RecordingPins::new();
        let board = Fretboard::new(&config, pins.clone());
        pins.clear();
        (board, pins, config)
    }

    #[test]
    fn test_mutation_does_not_touch_pins() {
        let (mut board, pins, _) = board();
        board.set_bit(0, GuitarString::HighE).unwrap();
        board.clear_string(GuitarString::B);
        assert!(pins.is_empty());
    }

    #[test]
    fn test_serialize_uses_string_wiring() {
        let (mut board, pins, config) = board();
        board.set_bit(2, GuitarString::G).unwrap();
        board.serialize(2);

        let p = config.boards[2];
        let bits = pins.latched_bits(p.clk, p.data);
        assert_eq!(bits.len(), 8);
        // string 3 is wired to output bit 5; reference boards shift LSB first
        let expected: Vec<bool> = (0..8).map(|i| i == config.string_bits[2]).collect();
        assert_eq!(bits, expected);
    }

    #[test]
    fn test_gate_masks_output_only() {
        let (mut board, _, config) = board();
        board.set_bit(0, GuitarString::LowE).unwrap();
        board.set_gate(0, GuitarString::LowE, true);
        assert_eq!(board.physical_byte(0), 0);
        assert!(board.state().is_set(0, GuitarString::LowE));

        board.set_gate(0, GuitarString::LowE, false);
        assert_eq!(board.physical_byte(0), 1 << config.string_bits[5]);
    }

    #[test]
    fn test_clear_all_emits_every_board() {
        let (mut board, pins, config) = board();
        board.set_bit(4, GuitarString::D).unwrap();
        board.clear_all();
        assert!(board.state().is_clear());
        for p in &config.boards {
            assert_eq!(pins.clear_pulses(p.clear), 1);
            assert!(pins.latched_bits(p.clk, p.data).iter().all(|b| !b));
        }
    }
}
