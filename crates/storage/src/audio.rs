use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

const EXTENSIONS: &[&str] = &["mp3", "wav", "ogg"];

#[derive(Debug, Error)]
pub enum AudioStoreError {
    #[error("invalid audio file name `{0}`")]
    InvalidName(String),
    #[error("unsupported audio extension `{0}`")]
    UnsupportedExtension(String),
    #[error("audio i/o failed for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Directory of synthesized replies named `tts_<uuid>.<ext>`.
#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_valid_name(name: &str) -> bool {
        let Some((stem, extension)) = name.rsplit_once('.') else {
            return false;
        };
        let Some(id) = stem.strip_prefix("tts_") else {
            return false;
        };
        EXTENSIONS.contains(&extension)
            && id.len() == 36
            && Uuid::parse_str(id).is_ok_and(|uuid| uuid.hyphenated().to_string() == id)
    }

    /// Writes the clip and returns its file name, which doubles as the audio reference.
    pub async fn save(&self, bytes: &[u8], extension: &str) -> Result<String, AudioStoreError> {
        if !EXTENSIONS.contains(&extension) {
            return Err(AudioStoreError::UnsupportedExtension(extension.to_string()));
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| AudioStoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let name = format!("tts_{}.{extension}", Uuid::new_v4());
        let path = self.dir.join(&name);
        fs::write(&path, bytes)
            .await
            .map_err(|source| AudioStoreError::Io { path, source })?;

        debug!(file = %name, bytes = bytes.len(), "stored synthesized audio");
        Ok(name)
    }

    /// `None` when the clip does not exist (or was purged).
    pub async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, AudioStoreError> {
        if !Self::is_valid_name(name) {
            return Err(AudioStoreError::InvalidName(name.to_string()));
        }

        let path = self.dir.join(name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(AudioStoreError::Io { path, source }),
        }
    }

    /// Deletes clips whose modification time is older than `max_age`. Other files are left alone.
    pub async fn purge_older_than(&self, max_age: Duration) -> Result<u64, AudioStoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(AudioStoreError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| AudioStoreError::Io { path, source }
        };

        let now = SystemTime::now();
        let mut removed = 0_u64;
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&self.dir))? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !Self::is_valid_name(name) {
                continue;
            }

            let path = entry.path();
            let modified = entry
                .metadata()
                .await
                .and_then(|metadata| metadata.modified())
                .map_err(io_error(&path))?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= max_age {
                fs::remove_file(&path).await.map_err(io_error(&path))?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(directory = %self.dir.display(), removed, "purged synthesized audio");
        }
        Ok(removed)
    }
}
