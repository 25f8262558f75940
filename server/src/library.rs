//! Read only view of the music directory.
//!
//! Music files are plain named byte blobs directly under one directory,
//! subdirectories are ignored.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::LibraryError;

#[async_trait]
pub trait MusicLibrary: Send + Sync {
    /// Names of the music files currently on disk, sorted
    async fn musics(&self) -> std::io::Result<Vec<String>>;

    /// Whole file contents
    async fn read(&self, name: &str) -> Result<Bytes, LibraryError>;

    /// Where a music file lives, as stored in the playlist
    fn path_of(&self, name: &str) -> PathBuf;
}

#[derive(Debug, Clone)]
pub struct DirLibrary {
    root: PathBuf,
}

impl DirLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MusicLibrary for DirLibrary {
    async fn musics(&self) -> std::io::Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Music directory does not exist: {}", self.root.display());
                return Ok(vec![]);
            },
            Err(e) => return Err(e),
        };

        let mut musics = vec![];
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            musics.push(entry.file_name().to_string_lossy().into_owned());
        }

        musics.sort();
        Ok(musics)
    }

    async fn read(&self, name: &str) -> Result<Bytes, LibraryError> {
        if !is_plain_name(name) {
            debug!("rejecting music name {:?}", name);
            return Err(LibraryError::NotFound(name.to_owned()));
        }

        let path = self.path_of(name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {},
            Ok(_) => return Err(LibraryError::NotFound(name.to_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(LibraryError::NotFound(name.to_owned())),
            Err(e) => return Err(e.into()),
        }

        let data = fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => LibraryError::NotFound(name.to_owned()),
            _ => LibraryError::Io(e),
        })?;

        Ok(Bytes::from(data))
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

// exactly one normal path component, no separators or dot entries
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}
