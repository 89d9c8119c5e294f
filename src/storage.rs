//! Song storage access
//!
//! Songs live on removable storage under `/<genre>/<artist>/<title>.bin`.
//! The rig only needs three operations (open, exists, list), so storage is
//! a small trait with a directory-backed implementation for hosts and an
//! in-memory one for tests and simulation.

use crate::song::ReadSeek;
use crate::{Result, RigError};
use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Song storage
pub trait Storage: Send {
    /// Open `path` for reading; returns the reader and the file size
    fn open(&mut self, path: &str) -> Result<(Box<dyn ReadSeek>, u64)>;

    /// Whether `path` names an existing file
    fn exists(&self, path: &str) -> bool;

    /// Sorted names of the entries directly under `dir`
    fn list(&self, dir: &str) -> Result<Vec<String>>;
}

/// Canonical location of a song filed by metadata
pub fn song_path(genre: &str, artist: &str, title: &str) -> String {
    format!("/{}/{}/{}.bin", genre, artist, title)
}

/// Storage rooted at a host directory
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Serve songs from `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsStorage { root: root.into() }
    }

    /// Host path for a rig path, refusing anything that escapes the root
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(RigError::Storage(format!("path {} leaves the song root", path)));
        }
        Ok(self.root.join(relative))
    }
}

impl Storage for FsStorage {
    fn open(&mut self, path: &str) -> Result<(Box<dyn ReadSeek>, u64)> {
        let host = self.resolve(path)?;
        let file = std::fs::File::open(&host)
            .map_err(|e| RigError::Storage(format!("opening {}: {}", path, e)))?;
        let size = file
            .metadata()
            .map_err(|e| RigError::Storage(format!("stat {}: {}", path, e)))?
            .len();
        Ok((Box::new(file), size))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let host = self.resolve(dir)?;
        let entries = std::fs::read_dir(&host)
            .map_err(|e| RigError::Storage(format!("listing {}: {}", dir, e)))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RigError::Storage(format!("listing {}: {}", dir, e)))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory storage
///
/// Clones share contents, so a test can add files after handing the
/// storage to the rig.
#[derive(Debug, Clone, Default)]
pub struct MemStorage {
    files: Arc<parking_lot::Mutex<HashMap<String, Arc<Vec<u8>>>>>,
}

impl MemStorage {
    /// Empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .insert(normalize(path), Arc::new(data.into()));
    }

    /// Remove a file; returns whether it existed
    pub fn remove(&self, path: &str) -> bool {
        self.files.lock().remove(&normalize(path)).is_some()
    }
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

impl Storage for MemStorage {
    fn open(&mut self, path: &str) -> Result<(Box<dyn ReadSeek>, u64)> {
        let data = self
            .files
            .lock()
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| RigError::Storage(format!("{} not found", path)))?;
        let size = data.len() as u64;
        Ok((Box::new(Cursor::new(data.as_ref().clone())), size))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.lock().contains_key(&normalize(path))
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let dir = normalize(dir);
        let prefix = if dir == "/" { dir } else { format!("{}/", dir) };
        let names: BTreeSet<String> = self
            .files
            .lock()
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_string)
            .collect();
        Ok(names.into_iter().collect())
    }
}
