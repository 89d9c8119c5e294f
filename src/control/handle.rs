//! Control surface
//!
//! [`RigHandle`] is how the rest of the system steers playback. It never
//! touches the scheduler directly: commands are queued under the playback
//! token and the scheduler applies them on its next tick.

use super::command::{Request, SongRequest};
use super::resources::{ControlCommand, SharedResources};
use crate::scheduler::PlaybackPhase;
use crate::status::PlaybackStatus;
use crate::{Result, RigError};
use std::sync::Arc;

/// Cloneable handle to a running rig
#[derive(Clone)]
pub struct RigHandle {
    resources: Arc<SharedResources>,
}

impl RigHandle {
    /// Handle over `resources`
    pub fn new(resources: Arc<SharedResources>) -> Self {
        RigHandle { resources }
    }

    /// Play the song at `path`
    ///
    /// The file must exist. If it is the paused song, playback resumes where
    /// it stopped; otherwise it starts from the beginning.
    pub fn play(&self, path: &str) -> Result<()> {
        let (storage, mut control) = self.resources.lock_both()?;
        if !storage.exists(path) {
            return Err(RigError::Storage(format!("{} not found", path)));
        }
        log::info!("play {}", path);
        control
            .commands
            .push_back(ControlCommand::Play(path.to_string()));
        Ok(())
    }

    /// Names filed directly under storage directory `dir`
    ///
    /// Walk `/`, then `/<genre>`, then `/<genre>/<artist>` to browse songs
    /// filed by metadata.
    pub fn list_songs(&self, dir: &str) -> Result<Vec<String>> {
        self.resources.lock_storage()?.list(dir)
    }

    /// Play a song named by metadata or path
    pub fn play_song(&self, song: &SongRequest) -> Result<()> {
        self.play(&song.path())
    }

    /// Pause playback
    pub fn pause(&self) -> Result<()> {
        self.queue(ControlCommand::Pause)
    }

    /// Resume a paused song
    pub fn resume(&self) -> Result<()> {
        self.queue(ControlCommand::Resume)
    }

    /// Stop playback and release the rig
    pub fn stop(&self) -> Result<()> {
        self.queue(ControlCommand::Stop)
    }

    /// Last published position
    pub fn status(&self) -> Result<PlaybackStatus> {
        Ok(self.resources.lock_playback()?.status)
    }

    /// Last published phase
    pub fn phase(&self) -> Result<PlaybackPhase> {
        Ok(self.resources.lock_playback()?.phase)
    }

    /// Most recent load failure, if any
    pub fn last_error(&self) -> Result<Option<String>> {
        Ok(self.resources.lock_playback()?.last_error.clone())
    }

    /// Carry out a decoded protocol request
    ///
    /// Returns the position for `Status` requests.
    pub fn execute(&self, request: &Request) -> Result<Option<PlaybackStatus>> {
        match request {
            Request::Play(song) => self.play_song(song)?,
            Request::Pause => self.pause()?,
            Request::Resume => self.resume()?,
            Request::Stop => self.stop()?,
            Request::Status => return self.status().map(Some),
        }
        Ok(None)
    }

    fn queue(&self, command: ControlCommand) -> Result<()> {
        log::debug!("queue {:?}", command);
        self.resources.lock_playback()?.commands.push_back(command);
        Ok(())
    }
}
