//! JSON song format
//!
//! `{"events":[{"time":0,"string":1,"fret":0}, ...]}`, optionally with
//! `title`, `artist`, `genre` and `totalDuration`. The whole document is
//! parsed up front, so memory use is proportional to file size; prefer the
//! binary format on the rig itself.

use super::{Event, SongMetadata, SongSource};
use crate::{Result, RigError};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Event values exactly as written in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Milliseconds from song start
    pub time: u32,
    /// String number (validated on access)
    pub string: i64,
    /// Fret code (validated on access)
    pub fret: i64,
}

impl From<Event> for RawEvent {
    fn from(event: Event) -> Self {
        RawEvent {
            time: event.time_ms,
            string: event.string.number() as i64,
            fret: event.fret.code() as i64,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct SongDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    genre: Option<String>,
    #[serde(
        default,
        rename = "totalDuration",
        skip_serializing_if = "Option::is_none"
    )]
    total_duration: Option<u32>,
    events: Vec<RawEvent>,
}

/// A parsed JSON song
#[derive(Debug, Clone)]
pub struct JsonSong {
    metadata: SongMetadata,
    events: Vec<RawEvent>,
    total_duration_ms: u32,
}

impl JsonSong {
    /// Parse a document from bytes
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let doc: SongDocument = serde_json::from_slice(data)
            .map_err(|e| RigError::Format(format!("JSON song: {}", e)))?;
        Ok(Self::from_document(doc))
    }

    /// Parse a document from a reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let doc: SongDocument = serde_json::from_reader(reader)
            .map_err(|e| RigError::Format(format!("JSON song: {}", e)))?;
        Ok(Self::from_document(doc))
    }

    fn from_document(doc: SongDocument) -> Self {
        let last = doc.events.last().map_or(0, |e| e.time);
        JsonSong {
            metadata: SongMetadata {
                title: doc.title,
                artist: doc.artist,
                genre: doc.genre,
            },
            total_duration_ms: doc.total_duration.unwrap_or(last),
            events: doc.events,
        }
    }

    /// Title/artist/genre, where present
    pub fn metadata(&self) -> &SongMetadata {
        &self.metadata
    }

    /// Raw records
    pub fn raw_events(&self) -> &[RawEvent] {
        &self.events
    }

    /// Validate every record, keeping failures in place
    pub fn validated(&self) -> Vec<Result<Event>> {
        self.events
            .iter()
            .map(|r| Event::new(r.time, r.string, r.fret))
            .collect()
    }

    /// Render events back to a JSON document
    pub fn to_json(metadata: &SongMetadata, events: &[Event]) -> Result<String> {
        let doc = SongDocument {
            title: metadata.title.clone(),
            artist: metadata.artist.clone(),
            genre: metadata.genre.clone(),
            total_duration: None,
            events: events.iter().copied().map(RawEvent::from).collect(),
        };
        Ok(serde_json::to_string(&doc)?)
    }
}

impl SongSource for JsonSong {
    fn event_count(&self) -> usize {
        self.events.len()
    }

    fn total_duration_ms(&self) -> u32 {
        self.total_duration_ms
    }

    fn event_at(&mut self, index: usize) -> Result<Event> {
        let raw = self.events.get(index).ok_or_else(|| {
            RigError::Format(format!(
                "event {} requested from a song of {}",
                index,
                self.events.len()
            ))
        })?;
        Event::new(raw.time, raw.string, raw.fret)
    }

    fn format_name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::Fret;

    #[test]
    fn test_parse_minimal_document() {
        let mut song = JsonSong::from_slice(
            br#"{"events":[{"time":0,"string":1,"fret":0},{"time":250,"string":6,"fret":-1}]}"#,
        )
        .unwrap();
        assert_eq!(song.event_count(), 2);
        assert_eq!(song.total_duration_ms(), 250);
        assert_eq!(song.event_at(1).unwrap().fret, Fret::Off);
        assert_eq!(song.metadata(), &SongMetadata::default());
    }

    #[test]
    fn test_metadata_and_duration() {
        let song = JsonSong::from_slice(
            br#"{"title":"Etude","artist":"Anon","genre":"classical","totalDuration":4000,
                 "events":[{"time":0,"string":2,"fret":3}]}"#,
        )
        .unwrap();
        assert_eq!(song.metadata().title.as_deref(), Some("Etude"));
        assert_eq!(song.metadata().genre.as_deref(), Some("classical"));
        assert_eq!(song.total_duration_ms(), 4000);
    }

    #[test]
    fn test_bad_record_does_not_fail_parse() {
        let mut song = JsonSong::from_slice(
            br#"{"events":[{"time":0,"string":9,"fret":0},{"time":5,"string":1,"fret":44},{"time":9,"string":1,"fret":1}]}"#,
        )
        .unwrap();
        assert!(matches!(song.event_at(0), Err(RigError::BadEvent(_))));
        assert!(matches!(song.event_at(1), Err(RigError::BadEvent(_))));
        assert!(song.event_at(2).is_ok());
        assert_eq!(song.validated().iter().filter(|r| r.is_ok()).count(), 1);
    }

    #[test]
    fn test_malformed_document_is_format_error() {
        assert!(matches!(
            JsonSong::from_slice(b"{\"events\": [}"),
            Err(RigError::Format(_))
        ));
        assert!(matches!(
            JsonSong::from_slice(b"{\"notes\": []}"),
            Err(RigError::Format(_))
        ));
    }

    #[test]
    fn test_to_json_round_trips_through_parser() {
        let events = vec![Event::new(0, 1, 0).unwrap(), Event::new(20, 3, -1).unwrap()];
        let meta = SongMetadata {
            title: Some("t".into()),
            ..SongMetadata::default()
        };
        let text = JsonSong::to_json(&meta, &events).unwrap();
        let mut song = JsonSong::from_slice(text.as_bytes()).unwrap();
        assert_eq!(song.event_at(1).unwrap(), events[1]);
        assert_eq!(song.metadata().title.as_deref(), Some("t"));
    }
}
