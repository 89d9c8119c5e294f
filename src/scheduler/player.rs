//! Time-driven playback scheduler
//!
//! [`PlaybackScheduler::tick`] is called at high frequency by the playback
//! task. Each tick:
//! 1. takes the playback token and applies queued commands
//! 2. advances the current phase (load, dispatch due events, or rest)
//! 3. takes the playback token again to publish the new snapshot
//!
//! Storage is only touched under the storage token and never while the
//! playback token is held. When a token cannot be had in time the tick does
//! nothing and reports [`TickOutcome::Busy`].

use super::dispatch::Rig;
use super::hammer::should_pick;
use super::state::{PlaybackCursor, PlaybackPhase, PlaybackState};
use crate::config::RigConfig;
use crate::control::{ControlCommand, SharedResources};
use crate::hardware::{PinSink, ServoSink};
use crate::song::open_song;
use crate::status::{PlaybackStatus, StatusSink, StatusThrottle};
use crate::timing::Clock;
use crate::RigError;
use std::sync::Arc;

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to play
    Idle,
    /// A song was opened and playback started
    Loaded,
    /// Playing, next event not yet due
    Waiting,
    /// Playing, this many events were dispatched
    Dispatched(usize),
    /// The song ran out of events
    Finished,
    /// A token was unavailable; nothing changed
    Busy,
    /// The song could not be opened or read; playback stopped
    LoadFailed,
}

/// Playback state machine plus the rig it drives
pub struct PlaybackScheduler<P: PinSink, S: ServoSink> {
    rig: Rig<P, S>,
    state: PlaybackState,
    resources: Arc<SharedResources>,
    status_sink: Option<Box<dyn StatusSink>>,
    throttle: StatusThrottle,
    servo_threshold_ms: u32,
    pending_error: Option<String>,
}

impl<P: PinSink, S: ServoSink> PlaybackScheduler<P, S> {
    /// Bring up the rig and start Stopped
    pub fn new(config: &RigConfig, pins: P, servos: S, resources: Arc<SharedResources>) -> Self {
        PlaybackScheduler {
            rig: Rig::new(config, pins, servos),
            state: PlaybackState::default(),
            resources,
            status_sink: None,
            throttle: StatusThrottle::new(config.status_interval_ms),
            servo_threshold_ms: config.servo_threshold_ms,
            pending_error: None,
        }
    }

    /// Send status snapshots to `sink`
    pub fn with_status_sink(mut self, sink: Box<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    /// Clock for blocking actuator moves
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.rig.set_clock(clock);
        self
    }

    /// Current phase
    pub fn phase(&self) -> PlaybackPhase {
        self.state.phase
    }

    /// Song position
    pub fn cursor(&self) -> &PlaybackCursor {
        &self.state.cursor
    }

    /// Actuators
    pub fn rig(&self) -> &Rig<P, S> {
        &self.rig
    }

    /// Position snapshot at `now_ms`
    pub fn status(&self, now_ms: u64) -> PlaybackStatus {
        let current = match self.state.phase {
            PlaybackPhase::Playing => self.state.cursor.elapsed(now_ms),
            PlaybackPhase::Paused => self.state.cursor.pause_offset_ms,
            _ => 0,
        };
        PlaybackStatus {
            current_time_ms: current.min(u32::MAX as u64) as u32,
            total_time_ms: self.state.total_duration_ms(),
        }
    }

    /// Run one scheduling step at clock time `now_ms`
    pub fn tick(&mut self, now_ms: u64) -> TickOutcome {
        let resources = Arc::clone(&self.resources);
        match resources.lock_playback() {
            Ok(mut control) => {
                while let Some(command) = control.commands.pop_front() {
                    self.apply(command, now_ms);
                }
            }
            Err(e) => {
                log::trace!("tick skipped: {}", e);
                return TickOutcome::Busy;
            }
        }

        let outcome = match self.state.phase {
            PlaybackPhase::Loading => self.load(now_ms),
            PlaybackPhase::Playing => self.advance(now_ms),
            PlaybackPhase::Stopped | PlaybackPhase::Paused | PlaybackPhase::Finished => {
                self.rest(now_ms)
            }
        };

        self.publish(now_ms);
        outcome
    }

    fn apply(&mut self, command: ControlCommand, now_ms: u64) {
        log::debug!("command {:?} while {}", command, self.state.phase);
        match command {
            ControlCommand::Play(path) => {
                let same_song = self.state.cursor.song_path.as_deref() == Some(path.as_str())
                    && !self.state.cursor.new_song_requested;
                match self.state.phase {
                    PlaybackPhase::Paused if same_song => self.resume(now_ms),
                    PlaybackPhase::Playing | PlaybackPhase::Loading if same_song => {
                        log::debug!("{} already selected", path);
                    }
                    _ => {
                        self.state.close_song();
                        self.state.cursor.song_path = Some(path);
                        self.state.cursor.new_song_requested = false;
                        self.state.enter(PlaybackPhase::Loading);
                    }
                }
            }
            ControlCommand::Pause => match self.state.phase {
                PlaybackPhase::Playing => {
                    self.state.cursor.pause(now_ms);
                    self.state.enter(PlaybackPhase::Paused);
                }
                PlaybackPhase::Loading => self.state.cursor.pause_requested = true,
                _ => {}
            },
            ControlCommand::Resume => match self.state.phase {
                PlaybackPhase::Paused => self.resume(now_ms),
                PlaybackPhase::Loading => self.state.cursor.pause_requested = false,
                _ => {}
            },
            ControlCommand::Stop => {
                if self.state.phase != PlaybackPhase::Stopped {
                    self.state.close_song();
                    self.state.enter(PlaybackPhase::Stopped);
                }
            }
        }
    }

    fn resume(&mut self, now_ms: u64) {
        self.state.cursor.resume(now_ms);
        self.state.enter(PlaybackPhase::Playing);
        self.throttle.reset();
    }

    fn load(&mut self, now_ms: u64) -> TickOutcome {
        let path = match self.state.cursor.song_path.clone() {
            Some(path) => path,
            None => {
                self.state.enter(PlaybackPhase::Stopped);
                return TickOutcome::Idle;
            }
        };

        let resources = Arc::clone(&self.resources);
        let opened = {
            let mut storage = match resources.lock_storage() {
                Ok(storage) => storage,
                Err(e) => {
                    log::trace!("load of {} deferred: {}", path, e);
                    return TickOutcome::Busy;
                }
            };
            storage
                .open(&path)
                .and_then(|(reader, size)| open_song(reader, size, &path))
        };

        match opened {
            Ok(song) => {
                log::info!(
                    "loaded {} ({} {} events, {}ms)",
                    path,
                    song.event_count(),
                    song.format_name(),
                    song.total_duration_ms()
                );
                self.rig.release_all();
                self.rig.reset_notes();
                self.state.song = Some(song);
                self.state.staged = None;
                self.state.cursor.start(now_ms);
                if std::mem::take(&mut self.state.cursor.pause_requested) {
                    self.state.enter(PlaybackPhase::Paused);
                } else {
                    self.state.enter(PlaybackPhase::Playing);
                    self.throttle.reset();
                }
                TickOutcome::Loaded
            }
            Err(e) => {
                self.abort(&path, e);
                TickOutcome::LoadFailed
            }
        }
    }

    fn advance(&mut self, now_ms: u64) -> TickOutcome {
        let count = match self.state.song.as_ref() {
            Some(song) => song.event_count(),
            None => {
                self.state.enter(PlaybackPhase::Stopped);
                return TickOutcome::Idle;
            }
        };
        if self.state.cursor.event_index >= count {
            self.finish();
            return TickOutcome::Finished;
        }

        self.rig.poll_soft_start(now_ms);

        let resources = Arc::clone(&self.resources);
        let storage = match resources.lock_storage() {
            Ok(storage) => storage,
            Err(e) => {
                log::trace!("dispatch deferred: {}", e);
                return TickOutcome::Busy;
            }
        };

        let elapsed = self.state.cursor.elapsed(now_ms);
        let fret_count = self.rig.board().fret_count();
        let mut dispatched = 0;
        let mut failure = None;

        if let Some(song) = self.state.song.as_mut() {
            while self.state.cursor.event_index < count {
                let index = self.state.cursor.event_index;
                let event = match self.state.staged {
                    Some(event) => event,
                    None => match song.event_at(index) {
                        Ok(event) => {
                            self.state.staged = Some(event);
                            event
                        }
                        Err(RigError::BadEvent(msg)) => {
                            log::warn!("skipping event {}: {}", index, msg);
                            self.state.cursor.event_index += 1;
                            continue;
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    },
                };

                if elapsed < event.time_ms as u64 {
                    break;
                }

                let pick = match should_pick(
                    &mut **song,
                    index,
                    &event,
                    self.servo_threshold_ms,
                    fret_count,
                ) {
                    Ok(pick) => pick,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };
                match self.rig.dispatch(&event, index as u64, pick, now_ms) {
                    Ok(_) => dispatched += 1,
                    Err(e) => log::warn!("skipping event {} ({}): {}", index, event, e),
                }
                self.state.cursor.event_index += 1;
                self.state.staged = None;
            }
        }
        drop(storage);

        if let Some(e) = failure {
            let path = self.state.cursor.song_path.clone().unwrap_or_default();
            self.abort(&path, e);
            return TickOutcome::LoadFailed;
        }

        if self.throttle.due(now_ms) {
            let status = self.status(now_ms);
            if let Some(sink) = self.status_sink.as_mut() {
                sink.publish(&status);
            }
        }

        if dispatched > 0 {
            TickOutcome::Dispatched(dispatched)
        } else {
            TickOutcome::Waiting
        }
    }

    fn finish(&mut self) {
        log::info!(
            "finished {}",
            self.state.cursor.song_path.as_deref().unwrap_or("song")
        );
        self.state.close_song();
        self.state.cursor.new_song_requested = true;
        self.rig.release_all();
        self.state.enter(PlaybackPhase::Finished);
        self.state.hardware_cleared = true;
    }

    fn abort(&mut self, path: &str, error: RigError) {
        log::error!("playback of {} aborted: {}", path, error);
        self.pending_error = Some(error.to_string());
        self.state.close_song();
        self.state.enter(PlaybackPhase::Stopped);
    }

    fn rest(&mut self, now_ms: u64) -> TickOutcome {
        if !self.state.hardware_cleared {
            self.rig.release_all();
            self.state.hardware_cleared = true;
        }
        if !self.state.idle_status_sent {
            let status = self.status(now_ms);
            if let Some(sink) = self.status_sink.as_mut() {
                sink.publish(&status);
            }
            self.state.idle_status_sent = true;
        }
        TickOutcome::Idle
    }

    fn publish(&mut self, now_ms: u64) {
        let status = self.status(now_ms);
        if let Ok(mut control) = self.resources.lock_playback() {
            control.status = status;
            control.phase = self.state.phase;
            control.song_path = self.state.cursor.song_path.clone();
            control.new_song_requested = self.state.cursor.new_song_requested;
            if let Some(error) = self.pending_error.take() {
                control.last_error = Some(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RigHandle;
    use crate::hardware::RecordingPins;
    use crate::song::{binary, Event};
    use crate::status::StatusLog;
    use crate::storage::MemStorage;

    struct Harness {
        scheduler: PlaybackScheduler<RecordingPins, RecordingPins>,
        handle: RigHandle,
        storage: MemStorage,
        status: StatusLog,
    }

    fn harness() -> Harness {
        let config = RigConfig::default();
        let storage = MemStorage::new();
        let resources = Arc::new(SharedResources::new(
            Box::new(storage.clone()),
            config.token_timeout(),
        ));
        let status = StatusLog::new();
        let scheduler = PlaybackScheduler::new(
            &config,
            RecordingPins::new(),
            RecordingPins::new(),
            Arc::clone(&resources),
        )
        .with_status_sink(Box::new(status.clone()));
        Harness {
            scheduler,
            handle: RigHandle::new(resources),
            storage,
            status,
        }
    }

    fn song(tuples: &[(u32, i64, i64)], duration: u32) -> Vec<u8> {
        let events: Vec<Event> = tuples
            .iter()
            .map(|&(t, s, f)| Event::new(t, s, f).unwrap())
            .collect();
        binary::encode(duration, &events).unwrap()
    }

    #[test]
    fn test_starts_stopped_and_idle() {
        let mut h = harness();
        assert_eq!(h.scheduler.tick(0), TickOutcome::Idle);
        assert_eq!(h.scheduler.phase(), PlaybackPhase::Stopped);
        assert_eq!(h.status.entries().len(), 1);
        h.scheduler.tick(10);
        assert_eq!(h.status.entries().len(), 1);
    }

    #[test]
    fn test_load_failure_reports_upstream() {
        let mut h = harness();
        let mut bad = song(&[(0, 1, 0)], 10);
        bad.push(0);
        h.storage.insert("/rock/a/b.bin", bad);
        h.handle.play("/rock/a/b.bin").unwrap();

        assert_eq!(h.scheduler.tick(0), TickOutcome::LoadFailed);
        assert_eq!(h.scheduler.phase(), PlaybackPhase::Stopped);
        assert!(h.handle.last_error().unwrap().is_some());
        assert!(h.scheduler.rig().board().state().is_clear());
    }

    #[test]
    fn test_chord_dispatches_in_one_tick() {
        let mut h = harness();
        h.storage
            .insert("/a.bin", song(&[(0, 1, 1), (0, 2, 1), (0, 3, 1), (50, 1, -1)], 50));
        h.handle.play("/a.bin").unwrap();
        assert_eq!(h.scheduler.tick(100), TickOutcome::Loaded);
        assert_eq!(h.scheduler.tick(100), TickOutcome::Dispatched(3));
        assert_eq!(h.scheduler.tick(149), TickOutcome::Waiting);
        assert_eq!(h.scheduler.tick(150), TickOutcome::Dispatched(1));
    }

    #[test]
    fn test_bad_event_skipped() {
        let mut h = harness();
        let mut data = song(&[(0, 1, 0), (10, 2, 0), (20, 3, 0)], 20);
        data[6 + 5 + 4] = 0b1110_0000;
        h.storage.insert("/a.bin", data);
        h.handle.play("/a.bin").unwrap();
        h.scheduler.tick(0);
        assert_eq!(h.scheduler.tick(30), TickOutcome::Dispatched(2));
        assert_eq!(h.scheduler.cursor().event_index, 3);
    }

    #[test]
    fn test_fret_beyond_boards_skipped() {
        let mut h = harness();
        h.storage.insert("/a.bin", song(&[(0, 1, 12), (5, 1, 2)], 5));
        h.handle.play("/a.bin").unwrap();
        h.scheduler.tick(0);
        assert_eq!(h.scheduler.tick(10), TickOutcome::Dispatched(1));
        let state = h.scheduler.rig().board().state();
        assert_eq!(state.boards_holding(crate::GuitarString::HighE), vec![1]);
    }

    #[test]
    fn test_stop_releases_hardware() {
        let mut h = harness();
        h.storage.insert("/a.bin", song(&[(0, 4, 3), (900, 4, -1)], 900));
        h.handle.play("/a.bin").unwrap();
        h.scheduler.tick(0);
        h.scheduler.tick(1);
        assert!(!h.scheduler.rig().board().state().is_clear());

        h.handle.stop().unwrap();
        assert_eq!(h.scheduler.tick(2), TickOutcome::Idle);
        assert_eq!(h.scheduler.phase(), PlaybackPhase::Stopped);
        assert!(h.scheduler.rig().board().state().is_clear());
        assert_eq!(h.handle.status().unwrap(), PlaybackStatus::default());
    }

    #[test]
    fn test_status_throttled_while_playing() {
        let mut h = harness();
        h.storage.insert("/a.bin", song(&[(0, 1, 0), (5000, 1, -1)], 5000));
        h.handle.play("/a.bin").unwrap();
        h.scheduler.tick(0);
        let before = h.status.entries().len();
        for t in 0..=2500 {
            h.scheduler.tick(t);
        }
        // reports at 0, 1000 and 2000
        assert_eq!(h.status.entries().len() - before, 3);
        assert_eq!(h.status.last().unwrap().current_time_ms, 2000);
        assert_eq!(h.status.last().unwrap().total_time_ms, 5000);
    }

    #[test]
    fn test_pause_while_loading_holds_song_at_start() {
        let mut h = harness();
        h.storage
            .insert("/a.bin", song(&[(0, 1, 3), (500, 1, -1)], 500));
        h.handle.play("/a.bin").unwrap();
        h.handle.pause().unwrap();

        assert_eq!(h.scheduler.tick(0), TickOutcome::Loaded);
        assert_eq!(h.scheduler.phase(), PlaybackPhase::Paused);
        assert_eq!(h.scheduler.tick(100), TickOutcome::Idle);
        assert!(h.scheduler.rig().board().state().is_clear());
        assert_eq!(h.scheduler.status(100).current_time_ms, 0);

        h.handle.resume().unwrap();
        assert_eq!(h.scheduler.tick(200), TickOutcome::Dispatched(1));
        assert_eq!(h.scheduler.cursor().elapsed(200), 0);
    }

    #[test]
    fn test_resume_while_loading_cancels_pending_pause() {
        let mut h = harness();
        h.storage.insert("/a.bin", song(&[(0, 1, 3)], 0));
        h.handle.play("/a.bin").unwrap();
        h.handle.pause().unwrap();
        h.handle.resume().unwrap();

        assert_eq!(h.scheduler.tick(0), TickOutcome::Loaded);
        assert_eq!(h.scheduler.phase(), PlaybackPhase::Playing);
    }

    #[test]
    fn test_unreachable_fret_leaves_previous_note_picked() {
        let mut h = harness();
        h.storage
            .insert("/a.bin", song(&[(0, 1, 2), (20, 1, 12), (1000, 1, -1)], 1000));
        h.handle.play("/a.bin").unwrap();
        for now in [0, 0, 20, 1000] {
            h.scheduler.tick(now);
        }
        assert_eq!(h.scheduler.rig().servos().servo_angles(2), vec![86, 106]);
    }

    #[test]
    fn test_busy_playback_token_skips_tick() {
        let mut h = harness();
        h.storage.insert("/a.bin", song(&[(0, 1, 0)], 0));
        h.handle.play("/a.bin").unwrap();

        let resources = Arc::clone(&h.scheduler.resources);
        let holder = std::thread::spawn(move || {
            let _guard = resources.lock_playback().unwrap();
            std::thread::sleep(std::time::Duration::from_millis(100));
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(h.scheduler.tick(0), TickOutcome::Busy);
        assert_eq!(h.scheduler.phase(), PlaybackPhase::Stopped);
        holder.join().unwrap();
        assert_eq!(h.scheduler.tick(0), TickOutcome::Loaded);
    }
}
