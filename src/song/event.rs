//! Note events
//!
//! An [`Event`] says "at `time_ms` after song start, put `string` into
//! `fret`". Construction validates ranges; the decoders keep raw values
//! around until an event is actually requested so that a single bad record
//! is skipped instead of failing the whole song.

use crate::{Result, RigError};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use std::fmt;

/// Highest fret number the song formats can express
pub const MAX_FRET: u8 = 30;

/// One of the six strings, numbered from the high E
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum GuitarString {
    /// String 1
    HighE = 1,
    /// String 2
    B = 2,
    /// String 3
    G = 3,
    /// String 4
    D = 4,
    /// String 5
    A = 5,
    /// String 6
    LowE = 6,
}

impl GuitarString {
    /// All strings in number order
    pub const ALL: [GuitarString; 6] = [
        GuitarString::HighE,
        GuitarString::B,
        GuitarString::G,
        GuitarString::D,
        GuitarString::A,
        GuitarString::LowE,
    ];

    /// String for a 1-based number
    pub fn from_number(number: i64) -> Option<Self> {
        GuitarString::from_i64(number)
    }

    /// 1-based string number
    pub fn number(self) -> u8 {
        self.to_u8().unwrap_or(1)
    }

    /// 0-based index
    pub fn index(self) -> usize {
        self.number() as usize - 1
    }
}

impl fmt::Display for GuitarString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// What a string should do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fret {
    /// Release and damp the string (`-1`)
    Off,
    /// Release every fret and let the open string sound (`0`)
    Open,
    /// Press at fret `n` (1-based)
    Pressed(u8),
}

impl Fret {
    /// Decode the numeric convention used by the song formats
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(Fret::Off),
            0 => Some(Fret::Open),
            n if (1..=MAX_FRET as i64).contains(&n) => Some(Fret::Pressed(n as u8)),
            _ => None,
        }
    }

    /// Numeric form: -1, 0 or the fret number
    pub fn code(self) -> i32 {
        match self {
            Fret::Off => -1,
            Fret::Open => 0,
            Fret::Pressed(n) => n as i32,
        }
    }

    /// 0-based fret board index for pressed notes
    pub fn board(self) -> Option<usize> {
        match self {
            Fret::Pressed(n) => Some(n as usize - 1),
            _ => None,
        }
    }
}

/// A timestamped note event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Offset from song start in milliseconds
    pub time_ms: u32,
    /// Target string
    pub string: GuitarString,
    /// Target fret state
    pub fret: Fret,
}

impl Event {
    /// Build an event from raw song values, validating ranges
    pub fn new(time_ms: u32, string: i64, fret: i64) -> Result<Self> {
        let string = GuitarString::from_number(string).ok_or_else(|| {
            RigError::BadEvent(format!("string {} at {}ms is not in 1..=6", string, time_ms))
        })?;
        let fret = Fret::from_code(fret).ok_or_else(|| {
            RigError::BadEvent(format!(
                "fret {} at {}ms is not in -1..={}",
                fret, time_ms, MAX_FRET
            ))
        })?;
        Ok(Event {
            time_ms,
            string,
            fret,
        })
    }

    /// `(time, string, fret)` in the numeric song convention
    pub fn as_tuple(&self) -> (u32, u8, i32) {
        (self.time_ms, self.string.number(), self.fret.code())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ms string {} fret {}",
            self.time_ms,
            self.string,
            self.fret.code()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_validation() {
        let e = Event::new(500, 1, 2).unwrap();
        assert_eq!(e.string, GuitarString::HighE);
        assert_eq!(e.fret, Fret::Pressed(2));
        assert_eq!(e.fret.board(), Some(1));
        assert_eq!(e.as_tuple(), (500, 1, 2));

        assert!(matches!(Event::new(0, 7, 0), Err(RigError::BadEvent(_))));
        assert!(matches!(Event::new(0, 0, 0), Err(RigError::BadEvent(_))));
        assert!(matches!(Event::new(0, 1, -2), Err(RigError::BadEvent(_))));
        assert!(matches!(Event::new(0, 1, 31), Err(RigError::BadEvent(_))));
    }

    #[test]
    fn test_fret_codes() {
        assert_eq!(Fret::from_code(-1), Some(Fret::Off));
        assert_eq!(Fret::from_code(0), Some(Fret::Open));
        assert_eq!(Fret::from_code(30), Some(Fret::Pressed(30)));
        assert_eq!(Fret::Off.code(), -1);
        assert_eq!(Fret::Open.board(), None);
    }

    #[test]
    fn test_string_numbering() {
        for (i, s) in GuitarString::ALL.iter().enumerate() {
            assert_eq!(s.index(), i);
            assert_eq!(GuitarString::from_number(i as i64 + 1), Some(*s));
        }
    }
}
