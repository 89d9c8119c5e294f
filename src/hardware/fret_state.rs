//! Logical fret state
//!
//! One [`StringSet`] per fret board records which strings that board is
//! currently pressing. Bit `n` is string `n + 1`, independent of how the
//! board is wired; the physical byte is produced by [`StringSet::to_physical`].

use crate::song::GuitarString;
use crate::{Result, RigError};
use bitflags::bitflags;

bitflags! {
    /// Set of strings engaged on one fret board
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StringSet: u8 {
        /// String 1 (high E)
        const S1 = 0x01;
        /// String 2 (B)
        const S2 = 0x02;
        /// String 3 (G)
        const S3 = 0x04;
        /// String 4 (D)
        const S4 = 0x08;
        /// String 5 (A)
        const S5 = 0x10;
        /// String 6 (low E)
        const S6 = 0x20;
    }
}

impl StringSet {
    /// Set containing a single string
    pub fn of(string: GuitarString) -> Self {
        StringSet::from_bits_truncate(1 << string.index())
    }

    /// Map logical string bits onto the board's wiring
    ///
    /// `string_bits[i]` is the output bit (0..=7) that string `i + 1` is
    /// wired to. A string mapped past bit 7 has no output.
    pub fn to_physical(self, string_bits: &[u8; 6]) -> u8 {
        GuitarString::ALL
            .iter()
            .filter(|s| self.contains(StringSet::of(**s)))
            .fold(0u8, |acc, s| {
                acc | 1u8.checked_shl(u32::from(string_bits[s.index()])).unwrap_or(0)
            })
    }
}

/// Engaged strings for every fret board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FretState {
    masks: Vec<StringSet>,
}

impl FretState {
    /// State for `fret_count` boards, all released
    pub fn new(fret_count: usize) -> Self {
        FretState {
            masks: vec![StringSet::empty(); fret_count],
        }
    }

    /// Number of boards
    pub fn fret_count(&self) -> usize {
        self.masks.len()
    }

    fn check_board(&self, board: usize) -> Result<()> {
        if board >= self.masks.len() {
            return Err(RigError::BadEvent(format!(
                "fret board {} out of range (rig has {})",
                board + 1,
                self.masks.len()
            )));
        }
        Ok(())
    }

    /// Engage `string` on `board`; returns whether anything changed
    pub fn set(&mut self, board: usize, string: GuitarString) -> Result<bool> {
        self.check_board(board)?;
        let bit = StringSet::of(string);
        let changed = !self.masks[board].contains(bit);
        self.masks[board].insert(bit);
        Ok(changed)
    }

    /// Release `string` on `board`; returns whether anything changed
    pub fn clear(&mut self, board: usize, string: GuitarString) -> Result<bool> {
        self.check_board(board)?;
        let bit = StringSet::of(string);
        let changed = self.masks[board].contains(bit);
        self.masks[board].remove(bit);
        Ok(changed)
    }

    /// Release `string` on every board; returns the boards that changed
    pub fn clear_string(&mut self, string: GuitarString) -> Vec<usize> {
        let bit = StringSet::of(string);
        let mut changed = Vec::new();
        for (board, mask) in self.masks.iter_mut().enumerate() {
            if mask.contains(bit) {
                mask.remove(bit);
                changed.push(board);
            }
        }
        changed
    }

    /// Whether `string` is engaged on `board`
    pub fn is_set(&self, board: usize, string: GuitarString) -> bool {
        self.masks
            .get(board)
            .is_some_and(|m| m.contains(StringSet::of(string)))
    }

    /// Engaged strings on `board` (empty if out of range)
    pub fn mask(&self, board: usize) -> StringSet {
        self.masks.get(board).copied().unwrap_or_default()
    }

    /// Boards on which `string` is engaged
    pub fn boards_holding(&self, string: GuitarString) -> Vec<usize> {
        let bit = StringSet::of(string);
        self.masks
            .iter()
            .enumerate()
            .filter(|(_, m)| m.contains(bit))
            .map(|(b, _)| b)
            .collect()
    }

    /// Release everything
    pub fn clear_all(&mut self) {
        self.masks.fill(StringSet::empty());
    }

    /// Whether no string is engaged anywhere
    pub fn is_clear(&self) -> bool {
        self.masks.iter().all(|m| m.is_empty())
    }
}
