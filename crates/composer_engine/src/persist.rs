use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_error, engine_info, engine_warn};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("document directory missing or not writable: {0}")]
    DocumentDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("save task did not finish: {0}")]
    Interrupted(String),
}

/// Ensure the document directory exists; create if missing.
pub fn ensure_document_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::DocumentDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::DocumentDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::DocumentDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_document_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

const SLUG_CHARS: usize = 64;

/// Durable home of the document; receives the full text and a title.
pub trait DocumentStore: Send + Sync {
    fn save(&self, title: &str, html: &str) -> Result<PathBuf, PersistError>;
}

/// Saves each document as `{slug}--{hash}.html` in one directory.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    writer: AtomicFileWriter,
}

impl FileDocumentStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
        }
    }

    /// `{slug}--{hash}.html`: the slug keeps letters and digits, joining
    /// everything else with single dashes; the hash of the trimmed title
    /// keeps titles that slug alike apart.
    pub fn filename_for(title: &str) -> String {
        let title = title.trim();
        let mut slug = String::new();
        for word in title.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            if slug.chars().count() >= SLUG_CHARS {
                break;
            }
            if !slug.is_empty() {
                slug.push('-');
            }
            slug.push_str(word);
        }
        if let Some((cut, _)) = slug.char_indices().nth(SLUG_CHARS) {
            slug.truncate(cut);
        }
        let slug = slug.trim_end_matches('-');
        let slug = if slug.is_empty() { "untitled" } else { slug };
        let digest = Sha256::digest(title.as_bytes());
        let hash: String = digest.iter().take(4).map(|byte| format!("{byte:02x}")).collect();
        format!("{slug}--{hash}.html")
    }

    pub fn path_for(&self, title: &str) -> PathBuf {
        self.writer.dir().join(Self::filename_for(title))
    }

    /// Reads a previously saved document, if any.
    pub fn load(&self, title: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path_for(title)) {
            Ok(html) => Ok(Some(html)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl DocumentStore for FileDocumentStore {
    fn save(&self, title: &str, html: &str) -> Result<PathBuf, PersistError> {
        self.writer.write(&Self::filename_for(title), html)
    }
}

/// Retry policy for saves: `attempts` tries, doubling the delay after each failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(failed_attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }
}

/// Saves with exponential backoff. Returns the last error once the attempts run out.
///
/// Each attempt runs on the blocking pool so file IO never stalls the runtime.
pub async fn save_with_retry(
    store: Arc<dyn DocumentStore>,
    title: &str,
    html: &str,
    policy: RetryPolicy,
) -> Result<PathBuf, PersistError> {
    let attempts = policy.attempts.max(1);
    let title: Arc<str> = Arc::from(title);
    let html: Arc<str> = Arc::from(html);
    let mut attempt = 1;
    loop {
        let result = {
            let (store, title, html) = (store.clone(), title.clone(), html.clone());
            tokio::task::spawn_blocking(move || store.save(&title, &html))
                .await
                .unwrap_or_else(|err| Err(PersistError::Interrupted(err.to_string())))
        };
        match result {
            Ok(path) => {
                engine_info!("saved {:?} to {}", title, path.display());
                return Ok(path);
            }
            Err(err) if attempt < attempts => {
                let delay = policy.delay_after(attempt);
                engine_warn!(
                    "save attempt {}/{} failed: {}; retrying in {:?}",
                    attempt,
                    attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                engine_error!("giving up saving {:?} after {} attempts: {}", title, attempts, err);
                return Err(err);
            }
        }
    }
}
