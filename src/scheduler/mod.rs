//! Playback scheduling
//!
//! The scheduler walks a song's events against the clock, decides per note
//! whether to pick, and applies each event to the rig.

pub mod dispatch;
pub mod hammer;
pub mod player;
pub mod state;

pub use dispatch::{DispatchReport, Rig};
pub use hammer::should_pick;
pub use player::{PlaybackScheduler, TickOutcome};
pub use state::{PlaybackCursor, PlaybackPhase, PlaybackState};
