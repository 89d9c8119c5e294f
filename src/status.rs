//! Status reporting
//!
//! The scheduler publishes `{currentTime, totalTime}` snapshots at most once
//! per status interval. On the wire a snapshot is one line:
//!
//! ```text
//! STATUS:{"currentTime":500,"totalTime":1000}
//! ```

use crate::{Result, RigError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::mpsc;
use std::sync::Arc;

/// Line prefix of a status report
pub const STATUS_PREFIX: &str = "STATUS:";

/// Playback position snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    /// Position in milliseconds (0 while stopped)
    #[serde(rename = "currentTime")]
    pub current_time_ms: u32,
    /// Song length in milliseconds
    #[serde(rename = "totalTime")]
    pub total_time_ms: u32,
}

impl PlaybackStatus {
    /// Render as a wire line, newline included
    pub fn to_wire(&self) -> Result<String> {
        Ok(format!("{}{}\n", STATUS_PREFIX, serde_json::to_string(self)?))
    }

    /// Parse a wire line
    pub fn parse_wire(line: &str) -> Result<Self> {
        let body = line
            .trim_end()
            .strip_prefix(STATUS_PREFIX)
            .ok_or_else(|| RigError::Format(format!("not a status line: {:?}", line)))?;
        Ok(serde_json::from_str(body)?)
    }
}

/// Destination for status snapshots
pub trait StatusSink: Send {
    /// Deliver one snapshot
    fn publish(&mut self, status: &PlaybackStatus);
}

impl StatusSink for mpsc::Sender<PlaybackStatus> {
    fn publish(&mut self, status: &PlaybackStatus) {
        // receiver gone means nobody is listening any more
        let _ = self.send(*status);
    }
}

/// Writes wire lines to any byte sink (serial port, stdout, socket)
pub struct WireStatusSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> WireStatusSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        WireStatusSink { writer }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> StatusSink for WireStatusSink<W> {
    fn publish(&mut self, status: &PlaybackStatus) {
        let result = status.to_wire().and_then(|line| {
            self.writer.write_all(line.as_bytes())?;
            self.writer.flush()?;
            Ok(())
        });
        if let Err(e) = result {
            log::warn!("status report dropped: {}", e);
        }
    }
}

/// Keeps every snapshot; clones share the log
#[derive(Debug, Clone, Default)]
pub struct StatusLog {
    entries: Arc<Mutex<Vec<PlaybackStatus>>>,
}

impl StatusLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots so far
    pub fn entries(&self) -> Vec<PlaybackStatus> {
        self.entries.lock().clone()
    }

    /// Most recent snapshot
    pub fn last(&self) -> Option<PlaybackStatus> {
        self.entries.lock().last().copied()
    }
}

impl StatusSink for StatusLog {
    fn publish(&mut self, status: &PlaybackStatus) {
        self.entries.lock().push(*status);
    }
}

/// Rate limiter for periodic reports
#[derive(Debug, Clone, Copy)]
pub struct StatusThrottle {
    interval_ms: u64,
    last_ms: Option<u64>,
}

impl StatusThrottle {
    /// Allow one report per `interval_ms`
    pub fn new(interval_ms: u32) -> Self {
        StatusThrottle {
            interval_ms: interval_ms as u64,
            last_ms: None,
        }
    }

    /// Whether a report is due at `now_ms`; marks it sent if so
    pub fn due(&mut self, now_ms: u64) -> bool {
        match self.last_ms {
            Some(last) if now_ms.saturating_sub(last) < self.interval_ms => false,
            _ => {
                self.last_ms = Some(now_ms);
                true
            }
        }
    }

    /// Make the next call to [`due`](Self::due) succeed
    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}
