use std::path::PathBuf;

use crate::names::listing;

const PLAYLIST_MSG: &str = "playlist";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Append only, insertion ordered, duplicates allowed
#[derive(Debug, Default)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: PlaylistEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_list(&self) -> String {
        listing(PLAYLIST_MSG, self.entries.iter().map(|e| e.name.as_str()))
    }
}
