//! Song formats
//!
//! Songs arrive either as JSON documents or as the fixed-layout binary
//! format. Both decode to [`Event`]s behind the [`SongSource`] trait, which
//! is all the scheduler sees.

pub mod binary;
pub mod event;
#[cfg(feature = "json-songs")]
pub mod json;
pub mod source;

pub use binary::{BinaryHeader, BinarySongReader};
pub use event::{Event, Fret, GuitarString, MAX_FRET};
#[cfg(feature = "json-songs")]
pub use json::JsonSong;
pub use source::{EventList, SongSource};

use crate::{Result, RigError};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Read, Seek, SeekFrom};

/// Largest JSON song accepted; larger files must be converted to binary
pub const MAX_JSON_SONG_BYTES: u64 = 256 * 1024;

/// Any seekable byte source that can move between tasks
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Descriptive song fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongMetadata {
    /// Song title
    pub title: Option<String>,
    /// Performing artist
    pub artist: Option<String>,
    /// Genre directory the song is filed under
    pub genre: Option<String>,
}

/// On-disk song encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongFormat {
    /// JSON document
    Json,
    /// Fixed-layout binary records
    Binary,
}

impl SongFormat {
    /// Guess the format from a path's extension
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1;
        if ext.eq_ignore_ascii_case("json") {
            Some(SongFormat::Json)
        } else if ext.eq_ignore_ascii_case("bin") {
            Some(SongFormat::Binary)
        } else {
            None
        }
    }

    /// Guess the format from the first byte of the file
    pub fn sniff(first_byte: u8) -> Self {
        if first_byte == b'{' {
            SongFormat::Json
        } else {
            SongFormat::Binary
        }
    }
}

/// Open a song for playback
///
/// `size` is the file size reported by storage. The format comes from the
/// extension of `path`, falling back to the first byte of the data.
pub fn open_song(
    mut reader: Box<dyn ReadSeek>,
    size: u64,
    path: &str,
) -> Result<Box<dyn SongSource>> {
    let format = match SongFormat::from_path(path) {
        Some(format) => format,
        None => {
            let mut first = [0u8; 1];
            reader
                .seek(SeekFrom::Start(0))
                .and_then(|_| reader.read_exact(&mut first))
                .map_err(|e| RigError::Storage(format!("reading {}: {}", path, e)))?;
            SongFormat::sniff(first[0])
        }
    };

    match format {
        SongFormat::Binary => Ok(Box::new(BinarySongReader::open(reader, size)?)),
        SongFormat::Json => open_json(reader, size, path),
    }
}

#[cfg(feature = "json-songs")]
fn open_json(mut reader: Box<dyn ReadSeek>, size: u64, path: &str) -> Result<Box<dyn SongSource>> {
    if size > MAX_JSON_SONG_BYTES {
        return Err(RigError::Storage(format!(
            "{} is {} bytes, over the {} byte JSON limit",
            path, size, MAX_JSON_SONG_BYTES
        )));
    }
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| RigError::Storage(format!("seeking {}: {}", path, e)))?;
    Ok(Box::new(JsonSong::from_reader(BufReader::new(reader.take(size)))?))
}

#[cfg(not(feature = "json-songs"))]
fn open_json(_reader: Box<dyn ReadSeek>, _size: u64, path: &str) -> Result<Box<dyn SongSource>> {
    Err(RigError::Format(format!(
        "{}: JSON songs need the json-songs feature",
        path
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn boxed(data: Vec<u8>) -> (Box<dyn ReadSeek>, u64) {
        let size = data.len() as u64;
        (Box::new(Cursor::new(data)), size)
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(SongFormat::from_path("/rock/a/b.bin"), Some(SongFormat::Binary));
        assert_eq!(SongFormat::from_path("song.JSON"), Some(SongFormat::Json));
        assert_eq!(SongFormat::from_path("noext"), None);
        assert_eq!(SongFormat::sniff(b'{'), SongFormat::Json);
        assert_eq!(SongFormat::sniff(0), SongFormat::Binary);
    }

    #[test]
    fn test_open_binary_by_extension() {
        let data = binary::encode(40, &[Event::new(0, 1, 0).unwrap()]).unwrap();
        let (reader, size) = boxed(data);
        let song = open_song(reader, size, "/x/y/z.bin").unwrap();
        assert_eq!(song.format_name(), "binary");
        assert_eq!(song.event_count(), 1);
    }

    #[cfg(feature = "json-songs")]
    #[test]
    fn test_open_json_by_sniffing() {
        let (reader, size) = boxed(br#"{"events":[{"time":3,"string":2,"fret":1}]}"#.to_vec());
        let mut song = open_song(reader, size, "upload").unwrap();
        assert_eq!(song.format_name(), "json");
        assert_eq!(song.event_at(0).unwrap().as_tuple(), (3, 2, 1));
    }

    #[cfg(feature = "json-songs")]
    #[test]
    fn test_oversize_json_is_storage_error() {
        let (reader, _) = boxed(b"{}".to_vec());
        let result = open_song(reader, MAX_JSON_SONG_BYTES + 1, "big.json");
        assert!(matches!(result, Err(RigError::Storage(_))));
    }
}
