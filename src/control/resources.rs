//! Shared resources and their tokens
//!
//! Two tokens arbitrate between the command task and the playback task:
//! - the storage token guards every storage operation
//! - the playback token guards the [`ControlBlock`] (queued commands and the
//!   published playback snapshot)
//!
//! Acquisition waits at most the configured timeout and fails with
//! [`RigError::Busy`]; callers skip the work and retry later. Code that
//! needs both takes storage first ([`SharedResources::lock_both`]). Asking
//! for the storage token while the same thread holds the playback token is
//! refused with [`RigError::LockOrder`].

use crate::scheduler::PlaybackPhase;
use crate::status::PlaybackStatus;
use crate::storage::Storage;
use crate::{Result, RigError};
use parking_lot::{Mutex, MutexGuard};
use std::cell::Cell;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

thread_local! {
    static PLAYBACK_HELD: Cell<u32> = const { Cell::new(0) };
}

/// Playback intent queued for the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Play the song at this storage path (resumes if it is the paused song)
    Play(String),
    /// Freeze playback position
    Pause,
    /// Continue a paused song
    Resume,
    /// Abandon the current song
    Stop,
}

/// State behind the playback token
#[derive(Debug, Clone, Default)]
pub struct ControlBlock {
    /// Commands not yet applied by the scheduler
    pub commands: VecDeque<ControlCommand>,
    /// Last published position
    pub status: PlaybackStatus,
    /// Last published phase
    pub phase: PlaybackPhase,
    /// Song the scheduler has selected
    pub song_path: Option<String>,
    /// Set once a song completes
    pub new_song_requested: bool,
    /// Most recent load failure
    pub last_error: Option<String>,
}

/// Tokens and the state they guard
pub struct SharedResources {
    storage: Mutex<Box<dyn Storage>>,
    playback: Mutex<ControlBlock>,
    timeout: Duration,
}

impl SharedResources {
    /// Wrap `storage`; tokens wait at most `timeout`
    pub fn new(storage: Box<dyn Storage>, timeout: Duration) -> Self {
        SharedResources {
            storage: Mutex::new(storage),
            playback: Mutex::new(ControlBlock::default()),
            timeout,
        }
    }

    /// Token wait bound
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire the storage token
    pub fn lock_storage(&self) -> Result<StorageGuard<'_>> {
        if PLAYBACK_HELD.with(Cell::get) > 0 {
            return Err(RigError::LockOrder(
                "storage token requested while holding the playback token",
            ));
        }
        self.storage
            .try_lock_for(self.timeout)
            .map(|guard| StorageGuard { guard })
            .ok_or(RigError::Busy("storage"))
    }

    /// Acquire the playback token
    pub fn lock_playback(&self) -> Result<PlaybackGuard<'_>> {
        let guard = self
            .playback
            .try_lock_for(self.timeout)
            .ok_or(RigError::Busy("playback"))?;
        PLAYBACK_HELD.with(|held| held.set(held.get() + 1));
        Ok(PlaybackGuard { guard })
    }

    /// Acquire storage, then playback
    ///
    /// If the playback token times out the storage token is released before
    /// returning.
    pub fn lock_both(&self) -> Result<(StorageGuard<'_>, PlaybackGuard<'_>)> {
        let storage = self.lock_storage()?;
        let playback = self.lock_playback()?;
        Ok((storage, playback))
    }
}

/// Held storage token
pub struct StorageGuard<'a> {
    guard: MutexGuard<'a, Box<dyn Storage>>,
}

impl Deref for StorageGuard<'_> {
    type Target = dyn Storage;

    fn deref(&self) -> &Self::Target {
        &**self.guard
    }
}

impl DerefMut for StorageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.guard
    }
}

/// Held playback token
pub struct PlaybackGuard<'a> {
    guard: MutexGuard<'a, ControlBlock>,
}

impl Deref for PlaybackGuard<'_> {
    type Target = ControlBlock;

    fn deref(&self) -> &ControlBlock {
        &self.guard
    }
}

impl DerefMut for PlaybackGuard<'_> {
    fn deref_mut(&mut self) -> &mut ControlBlock {
        &mut self.guard
    }
}

impl Drop for PlaybackGuard<'_> {
    fn drop(&mut self) {
        PLAYBACK_HELD.with(|held| held.set(held.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    fn resources() -> Arc<SharedResources> {
        Arc::new(SharedResources::new(
            Box::new(MemStorage::new()),
            Duration::from_millis(5),
        ))
    }

    #[test]
    fn test_lock_both_takes_storage_then_playback() {
        let res = resources();
        let (storage, mut playback) = res.lock_both().unwrap();
        assert!(!storage.exists("/x.bin"));
        playback.commands.push_back(ControlCommand::Stop);
        drop(playback);
        drop(storage);
        assert_eq!(res.lock_playback().unwrap().commands.len(), 1);
    }

    #[test]
    fn test_storage_after_playback_is_refused() {
        let res = resources();
        let playback = res.lock_playback().unwrap();
        assert!(matches!(res.lock_storage(), Err(RigError::LockOrder(_))));
        drop(playback);
        assert!(res.lock_storage().is_ok());
    }

    #[test]
    fn test_contended_token_times_out() {
        let res = resources();
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let res = Arc::clone(&res);
            thread::spawn(move || {
                let _storage = res.lock_storage().unwrap();
                locked_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };

        locked_rx.recv().unwrap();
        assert!(matches!(res.lock_storage(), Err(RigError::Busy("storage"))));
        assert!(matches!(res.lock_both(), Err(RigError::Busy("storage"))));
        // playback token is independent
        assert!(res.lock_playback().is_ok());

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(res.lock_storage().is_ok());
    }

    #[test]
    fn test_playback_timeout_releases_storage() {
        let res = resources();
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let res = Arc::clone(&res);
            thread::spawn(move || {
                let _playback = res.lock_playback().unwrap();
                locked_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };

        locked_rx.recv().unwrap();
        assert!(matches!(res.lock_both(), Err(RigError::Busy("playback"))));
        // storage was not left held
        assert!(res.lock_storage().is_ok());

        release_tx.send(()).unwrap();
        holder.join().unwrap();
    }
}
