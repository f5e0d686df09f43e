//! Enrolled face gallery.
//!
//! One entry per person id, holding the display name and the embedding
//! together. Entry order is enrollment order and is preserved across
//! removals, so tie-breaking in the matcher stays stable.

use crate::error::Result;
use crate::persist;
use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub person_id: String,
    pub name: String,
    pub embedding: Embedding,
}

#[derive(Debug)]
pub struct Gallery {
    path: PathBuf,
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    /// Load the gallery from `path`.
    ///
    /// A missing file yields an empty gallery. An unreadable file is
    /// logged and also yields an empty gallery; `reencode_all` rebuilds it
    /// from the roster images.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match persist::read_json_or_default::<Vec<GalleryEntry>>(&path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid gallery data; starting empty");
                Vec::new()
            }
        };
        tracing::info!(path = %path.display(), entries = entries.len(), "gallery loaded");
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, person_id: &str) -> Option<&GalleryEntry> {
        self.entries.iter().find(|e| e.person_id == person_id)
    }

    /// Insert or replace the entry for `entry.person_id`. Replacement keeps position.
    pub fn upsert(&mut self, entry: GalleryEntry) {
        match self.entries.iter_mut().find(|e| e.person_id == entry.person_id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Remove the entry for `person_id`, keeping the order of the rest.
    pub fn remove(&mut self, person_id: &str) -> Option<GalleryEntry> {
        let idx = self.entries.iter().position(|e| e.person_id == person_id)?;
        Some(self.entries.remove(idx))
    }

    /// Remove the entry for `person_id`, returning it with its former position.
    pub fn take(&mut self, person_id: &str) -> Option<(usize, GalleryEntry)> {
        let idx = self.entries.iter().position(|e| e.person_id == person_id)?;
        Some((idx, self.entries.remove(idx)))
    }

    /// Put back an entry taken with [`take`](Self::take).
    pub fn restore(&mut self, idx: usize, entry: GalleryEntry) {
        let idx = idx.min(self.entries.len());
        self.entries.insert(idx, entry);
    }

    /// Update the display name carried by an entry. Returns false if absent.
    pub fn rename(&mut self, person_id: &str, name: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.person_id == person_id) {
            Some(entry) => {
                entry.name = name.to_string();
                true
            }
            None => false,
        }
    }

    pub fn replace_all(&mut self, entries: Vec<GalleryEntry>) {
        self.entries = entries;
    }

    pub fn save(&self) -> Result<()> {
        persist::write_json_atomic(&self.path, &self.entries)
    }
}
