//! Framed control protocol
//!
//! Commands arrive over a byte stream as frames:
//!
//! ```text
//! 0xAA <len: 1..=255> <payload: len bytes>
//! ```
//!
//! Payloads are ASCII: `Pause`, `Resume`, `Stop`, `Status`, or `[Play]`
//! followed by a JSON object naming the song either by metadata
//! (`{"title":..,"artist":..,"genre":..}`) or by storage path
//! (`{"path":..}`).

use crate::storage::song_path;
use crate::{Result, RigError};
use serde::{Deserialize, Serialize};

/// Frame start byte
pub const FRAME_START: u8 = 0xAA;
/// Largest payload a frame can carry
pub const MAX_PAYLOAD: usize = 255;

const PLAY_PREFIX: &str = "[Play]";

/// How a Play request names its song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SongRequest {
    /// Explicit storage path
    Path {
        /// Storage path
        path: String,
    },
    /// Song filed by metadata
    Metadata {
        /// Song title
        title: String,
        /// Performing artist
        artist: String,
        /// Genre directory
        genre: String,
    },
}

impl SongRequest {
    /// Storage path the request refers to
    pub fn path(&self) -> String {
        match self {
            SongRequest::Path { path } => path.clone(),
            SongRequest::Metadata {
                title,
                artist,
                genre,
            } => song_path(genre, artist, title),
        }
    }
}

/// A decoded control request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Start (or resume) a song
    Play(SongRequest),
    /// Pause playback
    Pause,
    /// Resume playback
    Resume,
    /// Stop playback
    Stop,
    /// Report position
    Status,
}

impl Request {
    /// Payload text for this request
    pub fn to_payload(&self) -> Result<String> {
        Ok(match self {
            Request::Play(song) => format!("{}{}", PLAY_PREFIX, serde_json::to_string(song)?),
            Request::Pause => "Pause".to_string(),
            Request::Resume => "Resume".to_string(),
            Request::Stop => "Stop".to_string(),
            Request::Status => "Status".to_string(),
        })
    }

    /// Complete frame for this request
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        encode_frame(self.to_payload()?.as_bytes())
    }
}

/// Decode one payload
pub fn parse_payload(payload: &[u8]) -> Result<Request> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| RigError::Format("command payload is not UTF-8".into()))?
        .trim_end_matches(['\0', '\r', '\n']);

    if let Some(json) = text.strip_prefix(PLAY_PREFIX) {
        let song: SongRequest = serde_json::from_str(json)
            .map_err(|e| RigError::Format(format!("Play request: {}", e)))?;
        return Ok(Request::Play(song));
    }

    match text {
        "Pause" => Ok(Request::Pause),
        "Resume" => Ok(Request::Resume),
        "Stop" => Ok(Request::Stop),
        "Status" => Ok(Request::Status),
        other => Err(RigError::Format(format!("unknown command {:?}", other))),
    }
}

/// Wrap a payload in a frame
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD {
        return Err(RigError::Format(format!(
            "payload of {} bytes does not fit a frame (1..={})",
            payload.len(),
            MAX_PAYLOAD
        )));
    }
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.push(FRAME_START);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    Ok(frame)
}

#[derive(Debug, Clone, Default)]
enum DecodeState {
    #[default]
    WaitStart,
    WaitLength,
    Payload {
        len: usize,
    },
}

/// Byte-at-a-time frame decoder
///
/// Bytes before a start byte are ignored; a zero length byte drops back to
/// waiting for a start byte.
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    state: DecodeState,
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Decoder waiting for a start byte
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns a request when a frame completes
    pub fn push(&mut self, byte: u8) -> Option<Result<Request>> {
        match self.state {
            DecodeState::WaitStart => {
                if byte == FRAME_START {
                    self.state = DecodeState::WaitLength;
                }
                None
            }
            DecodeState::WaitLength => {
                if byte == 0 {
                    log::debug!("zero-length frame, resynchronising");
                    self.state = DecodeState::WaitStart;
                } else {
                    self.buf.clear();
                    self.state = DecodeState::Payload { len: byte as usize };
                }
                None
            }
            DecodeState::Payload { len } => {
                self.buf.push(byte);
                if self.buf.len() < len {
                    return None;
                }
                self.state = DecodeState::WaitStart;
                Some(parse_payload(&self.buf))
            }
        }
    }

    /// Feed a slice; returns every completed request in order
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Request>> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_play_by_metadata() {
        let payload = br#"[Play]{"title":"Tune","artist":"Band","genre":"rock"}"#;
        let mut frame = vec![0x00, 0x13, FRAME_START, payload.len() as u8];
        frame.extend_from_slice(payload);

        let mut decoder = FrameDecoder::new();
        let requests = decoder.feed(&frame);
        assert_eq!(requests.len(), 1);
        let request = requests.into_iter().next().unwrap().unwrap();
        match request {
            Request::Play(song) => assert_eq!(song.path(), "/rock/Band/Tune.bin"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_simple_commands_round_trip() {
        let mut decoder = FrameDecoder::new();
        for request in [Request::Pause, Request::Resume, Request::Stop, Request::Status] {
            let frame = request.to_frame().unwrap();
            let decoded = decoder.feed(&frame).pop().unwrap().unwrap();
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn test_play_by_path() {
        let request = Request::Play(SongRequest::Path {
            path: "/jazz/trio/x.bin".into(),
        });
        let frame = request.to_frame().unwrap();
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.feed(&frame).pop().unwrap().unwrap(), request);
    }

    #[test]
    fn test_zero_length_resets() {
        let mut decoder = FrameDecoder::new();
        let mut bytes = vec![FRAME_START, 0];
        bytes.extend(Request::Stop.to_frame().unwrap());
        let out = decoder.feed(&bytes);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), &Request::Stop);
    }

    #[test]
    fn test_bad_payloads() {
        assert!(matches!(parse_payload(b"Jump"), Err(RigError::Format(_))));
        assert!(matches!(parse_payload(b"[Play]{"), Err(RigError::Format(_))));
        assert!(matches!(parse_payload(&[0xFF, 0xFE]), Err(RigError::Format(_))));
        assert_eq!(parse_payload(b"Pause\r\n").unwrap(), Request::Pause);
    }

    #[test]
    fn test_frame_limits() {
        assert!(encode_frame(&[]).is_err());
        assert!(encode_frame(&[b'x'; 256]).is_err());
        assert_eq!(encode_frame(&[b'x'; 255]).unwrap().len(), 257);
    }
}
