//! Binary song format
//!
//! Compact fixed-layout event file for memory-constrained playback.
//!
//! Format details (all integers big-endian):
//! - Header: 6 bytes, `total_duration_ms: u32`, `event_count: u16`
//! - Records: `event_count` × 5 bytes, `time_ms: u32`, `packed: u8`
//! - `packed = (string - 1) << 5 | fret_code`, where `fret_code` is the
//!   fret 0..=30 or 31 for "off"
//!
//! The file size must be exactly `6 + 5 * event_count`. The reader checks
//! this before any record is touched and then seeks to one record at a time,
//! so memory use does not grow with song length.

use super::{Event, Fret, GuitarString, SongSource};
use crate::{Result, RigError};
use nom::number::complete::{be_u16, be_u32, u8 as be_u8};
use nom::sequence::tuple;
use nom::IResult;
use std::io::{Cursor, Read, Seek, SeekFrom};

/// Header length in bytes
pub const HEADER_LEN: usize = 6;
/// Record length in bytes
pub const RECORD_LEN: usize = 5;
/// Fret code meaning "string off"
pub const FRET_OFF_CODE: u8 = 31;

/// Parsed file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHeader {
    /// Song length in milliseconds
    pub total_duration_ms: u32,
    /// Number of records that follow
    pub event_count: u16,
}

impl BinaryHeader {
    /// File size implied by the header
    pub fn expected_file_size(&self) -> u64 {
        HEADER_LEN as u64 + RECORD_LEN as u64 * self.event_count as u64
    }
}

fn header(input: &[u8]) -> IResult<&[u8], BinaryHeader> {
    let (rest, (total_duration_ms, event_count)) = tuple((be_u32, be_u16))(input)?;
    Ok((
        rest,
        BinaryHeader {
            total_duration_ms,
            event_count,
        },
    ))
}

fn record(input: &[u8]) -> IResult<&[u8], (u32, u8)> {
    tuple((be_u32, be_u8))(input)
}

/// Pack string and fret into the record byte
pub fn pack(string: GuitarString, fret: Fret) -> u8 {
    let code = match fret {
        Fret::Off => FRET_OFF_CODE,
        Fret::Open => 0,
        Fret::Pressed(n) => n,
    };
    ((string.number() - 1) << 5) | (code & 0x1F)
}

/// Unpack the record byte
///
/// The three string bits can encode 7 and 8, which are not strings; such
/// records are bad events.
pub fn unpack(time_ms: u32, packed: u8) -> Result<Event> {
    let string = (packed >> 5) as i64 + 1;
    let code = packed & 0x1F;
    let fret = if code == FRET_OFF_CODE { -1 } else { code as i64 };
    Event::new(time_ms, string, fret)
}

/// Serialize events into the binary layout
pub fn encode(total_duration_ms: u32, events: &[Event]) -> Result<Vec<u8>> {
    let count = u16::try_from(events.len()).map_err(|_| {
        RigError::Format(format!(
            "{} events exceed the binary format limit of {}",
            events.len(),
            u16::MAX
        ))
    })?;

    let mut out = Vec::with_capacity(HEADER_LEN + RECORD_LEN * events.len());
    out.extend_from_slice(&total_duration_ms.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    for event in events {
        out.extend_from_slice(&event.time_ms.to_be_bytes());
        out.push(pack(event.string, event.fret));
    }
    Ok(out)
}

/// Streaming reader over a binary song
pub struct BinarySongReader<R: Read + Seek> {
    reader: R,
    header: BinaryHeader,
}

impl<R: Read + Seek> BinarySongReader<R> {
    /// Validate the header and file size
    ///
    /// `file_size` is the size reported by storage; no record is read here.
    pub fn open(mut reader: R, file_size: u64) -> Result<Self> {
        if file_size < HEADER_LEN as u64 {
            return Err(RigError::Format(format!(
                "binary song too small for header: {} bytes",
                file_size
            )));
        }

        let mut buf = [0u8; HEADER_LEN];
        reader
            .seek(SeekFrom::Start(0))
            .and_then(|_| reader.read_exact(&mut buf))
            .map_err(|e| RigError::Storage(format!("reading song header: {}", e)))?;
        let (_, header) =
            header(&buf).map_err(|e| RigError::Format(format!("malformed header: {:?}", e)))?;

        if file_size != header.expected_file_size() {
            return Err(RigError::Format(format!(
                "binary song size {} does not match {} declared events (expected {} bytes)",
                file_size,
                header.event_count,
                header.expected_file_size()
            )));
        }

        Ok(BinarySongReader { reader, header })
    }

    /// Parsed header
    pub fn header(&self) -> BinaryHeader {
        self.header
    }
}

impl BinarySongReader<Cursor<Vec<u8>>> {
    /// Reader over an in-memory file
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let size = data.len() as u64;
        Self::open(Cursor::new(data), size)
    }
}

impl<R: Read + Seek + Send> SongSource for BinarySongReader<R> {
    fn event_count(&self) -> usize {
        self.header.event_count as usize
    }

    fn total_duration_ms(&self) -> u32 {
        self.header.total_duration_ms
    }

    fn event_at(&mut self, index: usize) -> Result<Event> {
        if index >= self.event_count() {
            return Err(RigError::Format(format!(
                "record {} requested from a song of {}",
                index,
                self.event_count()
            )));
        }

        let offset = HEADER_LEN as u64 + RECORD_LEN as u64 * index as u64;
        let mut buf = [0u8; RECORD_LEN];
        self.reader
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.reader.read_exact(&mut buf))
            .map_err(|e| RigError::Storage(format!("reading record {}: {}", index, e)))?;

        let (_, (time_ms, packed)) =
            record(&buf).map_err(|e| RigError::Format(format!("malformed record: {:?}", e)))?;
        unpack(time_ms, packed)
    }

    fn format_name(&self) -> &'static str {
        "binary"
    }
}
