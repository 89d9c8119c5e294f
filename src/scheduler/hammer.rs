//! Hammer-on heuristic
//!
//! A string re-picked moments before its next note chokes that note. When
//! the next event on the same string follows within the threshold, the
//! current note is left to the fret change alone.

use crate::song::{Event, Fret, SongSource};
use crate::Result;

/// Whether the event at `index` should pick its string
///
/// Off events never pick. Otherwise the note picks unless another event on
/// the same string starts less than `threshold_ms` later. Presses beyond the
/// rig's `fret_count` boards are never played, so they do not count.
pub fn should_pick(
    song: &mut dyn SongSource,
    index: usize,
    event: &Event,
    threshold_ms: u32,
    fret_count: usize,
) -> Result<bool> {
    if event.fret == Fret::Off {
        return Ok(false);
    }
    let next = song.next_on_string(index, event.string, event.time_ms, threshold_ms, fret_count)?;
    Ok(next.is_none())
}
