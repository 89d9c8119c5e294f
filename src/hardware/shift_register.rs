//! Fret Board Shift Register
//!
//! Each fret board is one 8-bit serial-in shift register driving six
//! solenoids. Writing a mask pulses the (active-low) clear line and then
//! clocks the eight bits out on the data line, one per rising clock edge.
//!
//! Bit order depends on how the board sits in the daisy chain, so it is a
//! per-board setting rather than a property of the call site.

use super::PinSink;
use serde::{Deserialize, Serialize};

/// Order in which mask bits are clocked out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitOrder {
    /// Bit 0 first
    #[default]
    LsbFirst,
    /// Bit 7 first
    MsbFirst,
}

impl BitOrder {
    /// Bit positions in transmission order
    pub fn positions(self) -> [u8; 8] {
        match self {
            BitOrder::LsbFirst => [0, 1, 2, 3, 4, 5, 6, 7],
            BitOrder::MsbFirst => [7, 6, 5, 4, 3, 2, 1, 0],
        }
    }
}

/// Pin assignment of one fret board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardPins {
    /// Shift clock line
    pub clk: u8,
    /// Serial data line
    pub data: u8,
    /// Register clear line (active low)
    pub clear: u8,
    /// Transmission order for this board
    #[serde(default)]
    pub bit_order: BitOrder,
}

/// One fret board's shift register
#[derive(Debug, Clone, Copy)]
pub struct ShiftRegister {
    pins: BoardPins,
}

impl ShiftRegister {
    /// Create a register bound to the given pins
    pub fn new(pins: BoardPins) -> Self {
        ShiftRegister { pins }
    }

    /// Pin assignment
    pub fn pins(&self) -> &BoardPins {
        &self.pins
    }

    /// Drive all lines to their idle levels
    pub fn init<P: PinSink>(&self, sink: &mut P) {
        sink.write_pin(self.pins.clk, false);
        sink.write_pin(self.pins.data, false);
        sink.write_pin(self.pins.clear, true);
    }

    /// Clear the register, then clock `byte` in
    pub fn shift_out<P: PinSink>(&self, sink: &mut P, byte: u8) {
        sink.write_pin(self.pins.clear, false);
        sink.write_pin(self.pins.clear, true);

        for bit in self.pins.bit_order.positions() {
            sink.write_pin(self.pins.clk, false);
            sink.write_pin(self.pins.data, (byte >> bit) & 1 == 1);
            sink.write_pin(self.pins.clk, true);
        }
        sink.write_pin(self.pins.clk, false);
    }
}
