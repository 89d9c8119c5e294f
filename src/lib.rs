//! Playback core for a robotic guitar rig
//!
//! Drives servo string pickers and shift-register solenoid fret boards from
//! timestamped note events. The core is host-testable: every physical output
//! goes through an injectable sink and every wait goes through a [`Clock`].
//!
//! # Features
//! - Per-fret string bitmasks serialized to daisy-chained shift registers
//! - Toggle-based servo pickers with a per-note idempotent `pick_once`
//! - Software-PWM soft-start ramps for quieter solenoid engagement
//! - Streaming binary song decoder (bounded memory) and a JSON decoder
//! - Time-driven scheduler with pause/resume and a hammer-on heuristic
//! - Token-guarded shared state and a framed control protocol
//!
//! # Crate feature flags
//! - `json-songs` (default): JSON song decoding (`song::json`)
//!
//! # Quick start
//! ```no_run
//! use fretwork::control::{RigHandle, SharedResources};
//! use fretwork::hardware::LogPins;
//! use fretwork::scheduler::PlaybackScheduler;
//! use fretwork::storage::FsStorage;
//! use fretwork::{Clock, RigConfig, SystemClock};
//! use std::sync::Arc;
//!
//! let config = RigConfig::default();
//! let resources = Arc::new(SharedResources::new(
//!     Box::new(FsStorage::new("/sd")),
//!     config.token_timeout(),
//! ));
//! let mut scheduler = PlaybackScheduler::new(&config, LogPins, LogPins, Arc::clone(&resources));
//! let handle = RigHandle::new(Arc::clone(&resources));
//! handle.play("/rock/band/song.bin").unwrap();
//! scheduler.tick(SystemClock::new().now_ms());
//! ```

#![warn(missing_docs)]

pub mod actuator; // Servo pickers and soft-start ramps
pub mod config; // Rig configuration
pub mod control; // Tokens, control surface, command protocol, tasks
pub mod hardware; // Fret state and shift-register output
pub mod scheduler; // Playback state machine
pub mod song; // Song formats
pub mod status; // Status reporting
pub mod storage; // Song storage access
pub mod timing; // Clocks

/// Error types for rig operations
#[derive(thiserror::Error, Debug)]
pub enum RigError {
    /// Storage could not be opened, read or seeked
    #[error("Storage error: {0}")]
    Storage(String),

    /// Song data failed header or layout validation
    #[error("Format error: {0}")]
    Format(String),

    /// A single event carries an out-of-range string or fret
    #[error("Bad event: {0}")]
    BadEvent(String),

    /// A shared-resource token could not be acquired in time
    #[error("Resource busy: {0}")]
    Busy(&'static str),

    /// Tokens requested against the storage-then-playback order
    #[error("Lock order violation: {0}")]
    LockOrder(&'static str),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for RigError {
    /// Converts a String into `RigError::Other`.
    ///
    /// Prefer the specific variants (`Format`, `Storage`, `Config`) where the
    /// failure kind matters to the caller.
    fn from(msg: String) -> Self {
        RigError::Other(msg)
    }
}

impl From<&str> for RigError {
    fn from(msg: &str) -> Self {
        RigError::Other(msg.to_string())
    }
}

/// Result type for rig operations
pub type Result<T> = std::result::Result<T, RigError>;

// Public API exports
pub use config::RigConfig;
pub use control::{RigHandle, SharedResources};
pub use scheduler::{PlaybackPhase, PlaybackScheduler};
pub use song::{Event, Fret, GuitarString, SongSource};
pub use status::PlaybackStatus;
pub use timing::{Clock, ManualClock, SystemClock};
