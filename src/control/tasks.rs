//! Playback and command task runners
//!
//! Each task is a named thread looping until its stop flag clears. The
//! playback task ticks the scheduler and yields; the command task decodes
//! framed requests from a byte stream and carries them out.

use super::command::{FrameDecoder, Request};
use super::handle::RigHandle;
use crate::hardware::{PinSink, ServoSink};
use crate::scheduler::{PlaybackScheduler, TickOutcome};
use crate::status::{PlaybackStatus, StatusSink, WireStatusSink};
use crate::timing::Clock;
use crate::{Result, RigError};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Attempts at a request that keeps hitting a busy token
const COMMAND_RETRIES: usize = 3;

/// A running task
pub struct TaskHandle<T> {
    thread: JoinHandle<T>,
    running: Arc<AtomicBool>,
}

impl<T> TaskHandle<T> {
    /// Whether the thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Ask the task to stop after its current iteration
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Stop the task and wait for its result
    pub fn shutdown(self) -> Result<T> {
        self.request_stop();
        self.thread
            .join()
            .map_err(|_| RigError::Other("task thread panicked".into()))
    }
}

/// Run the scheduler on its own thread
///
/// Ticks every `tick_interval_ms` on `clock`. The scheduler is handed back
/// by [`TaskHandle::shutdown`].
pub fn spawn_playback_task<P, S>(
    mut scheduler: PlaybackScheduler<P, S>,
    clock: Arc<dyn Clock>,
    tick_interval_ms: u64,
) -> Result<TaskHandle<PlaybackScheduler<P, S>>>
where
    P: PinSink + 'static,
    S: ServoSink + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    let thread = std::thread::Builder::new()
        .name("playback".into())
        .spawn(move || {
            while running_clone.load(Ordering::Relaxed) {
                if scheduler.tick(clock.now_ms()) == TickOutcome::Busy {
                    log::trace!("playback tick skipped");
                }
                clock.sleep_ms(tick_interval_ms);
            }
            scheduler
        })?;
    Ok(TaskHandle { thread, running })
}

/// Decode framed requests from `input` and execute them
///
/// Status replies are written to `replies` as wire lines. The task ends at
/// end of input or when stopped; it returns the number of requests handled.
pub fn spawn_command_task<R, W>(
    mut input: R,
    handle: RigHandle,
    replies: W,
) -> Result<TaskHandle<usize>>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    let thread = std::thread::Builder::new()
        .name("command".into())
        .spawn(move || {
            let mut decoder = FrameDecoder::new();
            let mut replies = WireStatusSink::new(replies);
            let mut handled = 0;
            let mut buf = [0u8; 64];

            while running_clone.load(Ordering::Relaxed) {
                let n = match input.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::error!("command input failed: {}", e);
                        break;
                    }
                };

                for request in decoder.feed(&buf[..n]) {
                    let request = match request {
                        Ok(request) => request,
                        Err(e) => {
                            log::warn!("rejected command: {}", e);
                            continue;
                        }
                    };
                    match execute_with_retry(&handle, &request) {
                        Ok(Some(status)) => replies.publish(&status),
                        Ok(None) => {}
                        Err(e) => log::warn!("{:?} failed: {}", request, e),
                    }
                    handled += 1;
                }
            }
            handled
        })?;
    Ok(TaskHandle { thread, running })
}

fn execute_with_retry(handle: &RigHandle, request: &Request) -> Result<Option<PlaybackStatus>> {
    let mut attempt = 0;
    loop {
        match handle.execute(request) {
            Err(RigError::Busy(token)) if attempt + 1 < COMMAND_RETRIES => {
                log::debug!("{} token busy, retrying {:?}", token, request);
                attempt += 1;
                std::thread::yield_now();
            }
            result => return result,
        }
    }
}
