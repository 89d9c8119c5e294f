//! Random-access event sources
//!
//! The scheduler never holds a whole song; it asks its source for the event
//! at the cursor and, for the hammer-on decision, peeks a little further.

use super::{Event, GuitarString};
use crate::{Result, RigError};

/// An ordered, indexable sequence of song events
pub trait SongSource: Send {
    /// Number of records (including ones that fail validation)
    fn event_count(&self) -> usize;

    /// Declared song length in milliseconds
    fn total_duration_ms(&self) -> u32;

    /// Decode record `index`
    ///
    /// A record with out-of-range values yields [`RigError::BadEvent`]; any
    /// other error means the source itself is unusable.
    fn event_at(&mut self, index: usize) -> Result<Event>;

    /// Short format label for logs
    fn format_name(&self) -> &'static str;

    /// First playable event after `index` on `string` whose time is within
    /// `window_ms` of `from_ms`
    ///
    /// Records that fail validation and presses beyond `fret_count` boards
    /// are passed over, since neither ever reaches the rig. The scan stops
    /// as soon as records are further than the window away, which is sound
    /// because event times never decrease.
    fn next_on_string(
        &mut self,
        index: usize,
        string: GuitarString,
        from_ms: u32,
        window_ms: u32,
        fret_count: usize,
    ) -> Result<Option<Event>> {
        for j in index + 1..self.event_count() {
            let next = match self.event_at(j) {
                Ok(e) => e,
                Err(RigError::BadEvent(_)) => continue,
                Err(e) => return Err(e),
            };
            if next.time_ms.saturating_sub(from_ms) >= window_ms {
                return Ok(None);
            }
            if next.fret.board().is_some_and(|board| board >= fret_count) {
                continue;
            }
            if next.string == string {
                return Ok(Some(next));
            }
        }
        Ok(None)
    }
}

/// In-memory list of already validated events
#[derive(Debug, Clone, Default)]
pub struct EventList {
    events: Vec<Event>,
    total_duration_ms: u32,
}

impl EventList {
    /// Wrap events; duration defaults to the last event's time
    pub fn new(events: Vec<Event>) -> Self {
        let total_duration_ms = events.last().map_or(0, |e| e.time_ms);
        EventList {
            events,
            total_duration_ms,
        }
    }

    /// Override the declared duration
    pub fn with_duration(mut self, total_duration_ms: u32) -> Self {
        self.total_duration_ms = total_duration_ms;
        self
    }

    /// Borrow the events
    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

impl SongSource for EventList {
    fn event_count(&self) -> usize {
        self.events.len()
    }

    fn total_duration_ms(&self) -> u32 {
        self.total_duration_ms
    }

    fn event_at(&mut self, index: usize) -> Result<Event> {
        self.events.get(index).copied().ok_or_else(|| {
            RigError::Format(format!(
                "event {} requested from a song of {}",
                index,
                self.events.len()
            ))
        })
    }

    fn format_name(&self) -> &'static str {
        "list"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(tuples: &[(u32, i64, i64)]) -> EventList {
        EventList::new(
            tuples
                .iter()
                .map(|&(t, s, f)| Event::new(t, s, f).unwrap())
                .collect(),
        )
    }

    #[test]
    fn test_next_on_string_skips_other_strings() {
        let mut song = list(&[(0, 1, 0), (10, 2, 3), (40, 1, 5)]);
        let next = song
            .next_on_string(0, GuitarString::HighE, 0, 100, 10)
            .unwrap()
            .unwrap();
        assert_eq!(next.time_ms, 40);
    }

    #[test]
    fn test_next_on_string_stops_at_window() {
        let mut song = list(&[(0, 1, 0), (150, 1, 5)]);
        assert_eq!(
            song.next_on_string(0, GuitarString::HighE, 0, 100, 10).unwrap(),
            None
        );
    }

    #[test]
    fn test_next_on_string_ignores_unreachable_frets() {
        let mut song = list(&[(0, 1, 2), (20, 1, 12), (60, 1, 4)]);
        let next = song
            .next_on_string(0, GuitarString::HighE, 0, 100, 10)
            .unwrap()
            .unwrap();
        assert_eq!(next.time_ms, 60);
        assert_eq!(
            song.next_on_string(0, GuitarString::HighE, 0, 50, 10).unwrap(),
            None
        );
    }

    #[test]
    fn test_duration_defaults_to_last_event() {
        let song = list(&[(0, 1, 0), (900, 1, -1)]);
        assert_eq!(song.total_duration_ms(), 900);
        assert_eq!(song.with_duration(1200).total_duration_ms(), 1200);
    }
}
