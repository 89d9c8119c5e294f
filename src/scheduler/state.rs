//! Playback state owned by the scheduler

use crate::song::{Event, SongSource};
use std::fmt;

/// Where playback is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    /// No song
    #[default]
    Stopped,
    /// Waiting for the storage token to open a requested song
    Loading,
    /// Dispatching events against the clock
    Playing,
    /// Position frozen at the pause offset
    Paused,
    /// Last event dispatched; song closed
    Finished,
}

impl PlaybackPhase {
    /// Phases in which no events are dispatched and hardware rests
    pub fn is_idle(self) -> bool {
        matches!(
            self,
            PlaybackPhase::Stopped | PlaybackPhase::Paused | PlaybackPhase::Finished
        )
    }
}

impl fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackPhase::Stopped => "stopped",
            PlaybackPhase::Loading => "loading",
            PlaybackPhase::Playing => "playing",
            PlaybackPhase::Paused => "paused",
            PlaybackPhase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Position within the current song
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackCursor {
    /// Storage path of the song, if one is selected
    pub song_path: Option<String>,
    /// Clock time that corresponds to song time 0
    pub start_ms: u64,
    /// Song time captured at pause
    pub pause_offset_ms: u64,
    /// Next event to dispatch
    pub event_index: usize,
    /// Set when a song completes; the next play starts fresh
    pub new_song_requested: bool,
    /// Pause arrived while the song was loading
    pub pause_requested: bool,
}

impl PlaybackCursor {
    /// Song time at clock time `now_ms`
    pub fn elapsed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.start_ms)
    }

    /// Anchor a fresh song at `now_ms`
    pub fn start(&mut self, now_ms: u64) {
        self.start_ms = now_ms;
        self.pause_offset_ms = 0;
        self.event_index = 0;
    }

    /// Freeze song time at `now_ms`
    pub fn pause(&mut self, now_ms: u64) {
        self.pause_offset_ms = self.elapsed(now_ms);
    }

    /// Re-anchor so song time continues from the pause offset
    pub fn resume(&mut self, now_ms: u64) {
        self.start_ms = now_ms.saturating_sub(self.pause_offset_ms);
    }
}

/// Everything the scheduler mutates between ticks
#[derive(Default)]
pub struct PlaybackState {
    /// Current phase
    pub phase: PlaybackPhase,
    /// Song position
    pub cursor: PlaybackCursor,
    /// Open song, present while Playing or Paused
    pub song: Option<Box<dyn SongSource>>,
    /// Event read from the song but not yet due
    pub staged: Option<Event>,
    /// Hardware has been released since playback last went idle
    pub hardware_cleared: bool,
    /// Idle status has been published since playback last went idle
    pub idle_status_sent: bool,
}

impl PlaybackState {
    /// Switch phase, re-arming the idle guards when entering an idle phase
    pub fn enter(&mut self, phase: PlaybackPhase) {
        if phase != self.phase {
            log::info!("playback {} -> {}", self.phase, phase);
            self.phase = phase;
            self.hardware_cleared = false;
            self.idle_status_sent = false;
        }
    }

    /// Drop the song and everything derived from it
    pub fn close_song(&mut self) {
        self.song = None;
        self.staged = None;
        self.cursor.song_path = None;
        self.cursor.event_index = 0;
        self.cursor.pause_offset_ms = 0;
        self.cursor.pause_requested = false;
    }

    /// Declared length of the open song
    pub fn total_duration_ms(&self) -> u32 {
        self.song.as_ref().map_or(0, |s| s.total_duration_ms())
    }
}
