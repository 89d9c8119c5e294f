//! Control layer
//!
//! Shared-resource tokens, the control surface built on them, the framed
//! command protocol, and the task runners that tie everything together.

pub mod command;
pub mod handle;
pub mod resources;
pub mod tasks;

pub use command::{encode_frame, parse_payload, FrameDecoder, Request, SongRequest};
pub use handle::RigHandle;
pub use resources::{ControlBlock, ControlCommand, PlaybackGuard, SharedResources, StorageGuard};
pub use tasks::{spawn_command_task, spawn_playback_task, TaskHandle};
