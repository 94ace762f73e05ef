#[cfg(test)]
mod tests;

mod metadata;
mod tensors;

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::index::{FlatIndex, IndexSnapshot};
use crate::{DocsError, Result};

use self::metadata::{read_metadata, write_metadata};
use self::tensors::{read_f32_matrix, write_f32_matrix};

pub const INDEX_FILE: &str = "index.safetensors";
pub const METADATA_FILE: &str = "metadata.jsonl";
pub const EMBEDDINGS_FILE: &str = "embeddings.safetensors";

const INDEX_TENSOR: &str = "index";
const EMBEDDINGS_TENSOR: &str = "embeddings";
const INDEX_FORMAT: &str = "flat_ip";

const LOAD_ATTEMPTS: u32 = 3;
const SWAP_SETTLE_DELAY: Duration = Duration::from_millis(10);

/// Persists an [`IndexSnapshot`] as three files in one directory.
///
/// Saves are staged: every artifact is written into a sibling
/// `<dir>.staging` directory, then the live directory is swapped out for it.
/// A reader therefore sees either the previous complete state or the new
/// one, never a mix.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
    dimension: usize,
}

impl RecordStore {
    #[inline]
    pub fn new(dir: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(DocsError::Config(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dir: dir.into(),
            dimension,
        })
    }

    /// Store rooted at the configured index directory
    #[inline]
    pub fn open(config: &Config) -> Result<Self> {
        Self::new(config.index_dir_path(), config.embedding_dimension())
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Whether any persisted state exists yet
    #[inline]
    pub fn exists(&self) -> bool {
        has_any_artifact(&self.dir) || has_any_artifact(&self.backup_dir())
    }

    /// Read the persisted state.
    ///
    /// A directory with no artifacts yields an empty snapshot. If the live
    /// directory is missing but a backup from an interrupted swap remains,
    /// the backup is read instead; it is only moved back into place by the
    /// next [`save`](Self::save).
    ///
    /// When a save from another handle swaps directories while the read is
    /// in flight, the directory being read disappears; the read is then
    /// retried against whichever directory is live afterwards.
    #[inline]
    pub fn load(&self) -> Result<IndexSnapshot> {
        let mut attempt = 1;
        loop {
            let Some(source) = self.resolve_source() else {
                debug!("No index at {}, starting empty", self.dir.display());
                return Ok(IndexSnapshot::empty(self.dimension));
            };
            let result = self.read_from(&source);
            if attempt >= LOAD_ATTEMPTS || !moved_during_read(&source, &result) {
                return result;
            }
            debug!(
                "{} moved during load, retrying (attempt {}/{})",
                source.display(),
                attempt + 1,
                LOAD_ATTEMPTS
            );
            thread::sleep(SWAP_SETTLE_DELAY * attempt);
            attempt += 1;
        }
    }

    fn resolve_source(&self) -> Option<PathBuf> {
        if self.dir.is_dir() {
            return Some(self.dir.clone());
        }
        let backup = self.backup_dir();
        if !backup.is_dir() {
            return None;
        }
        warn!(
            "Index directory missing, reading backup at {}",
            backup.display()
        );
        Some(backup)
    }

    /// Persist `snapshot`, replacing whatever was stored before.
    #[inline]
    pub fn save(&self, snapshot: &IndexSnapshot) -> Result<()> {
        if snapshot.dimension() != self.dimension {
            return Err(DocsError::DimensionMismatch {
                expected: self.dimension,
                found: snapshot.dimension(),
            });
        }

        self.recover_interrupted_save()?;

        let staging = self.staging_dir();
        fs::create_dir_all(&staging)?;
        if let Err(e) = self.write_into(&staging, snapshot) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let backup = self.backup_dir();
        let had_live = self.dir.is_dir();
        if had_live {
            fs::rename(&self.dir, &backup)?;
        }
        if let Err(e) = fs::rename(&staging, &self.dir) {
            if had_live {
                let _ = fs::rename(&backup, &self.dir);
            }
            return Err(e.into());
        }
        if had_live {
            fs::remove_dir_all(&backup)?;
        }
        sync_parent(&self.dir);

        info!(
            "Saved {} records to {}",
            snapshot.len(),
            self.dir.display()
        );
        Ok(())
    }

    /// Clean up after a save that stopped part way through the swap
    fn recover_interrupted_save(&self) -> Result<()> {
        let staging = self.staging_dir();
        if staging.exists() {
            warn!("Removing stale staging directory {}", staging.display());
            fs::remove_dir_all(&staging)?;
        }

        let backup = self.backup_dir();
        if backup.is_dir() {
            if self.dir.is_dir() {
                fs::remove_dir_all(&backup)?;
            } else {
                warn!("Restoring index from backup {}", backup.display());
                fs::rename(&backup, &self.dir)?;
            }
        }
        Ok(())
    }

    fn write_into(&self, dir: &Path, snapshot: &IndexSnapshot) -> Result<()> {
        let rows = snapshot.len();
        let dims = snapshot.dimension();

        let header = HashMap::from([
            ("format".to_string(), INDEX_FORMAT.to_string()),
            ("dimension".to_string(), dims.to_string()),
        ]);
        write_f32_matrix(
            &dir.join(INDEX_FILE),
            INDEX_TENSOR,
            snapshot.index().vectors(),
            rows,
            dims,
            Some(header),
        )?;
        write_f32_matrix(
            &dir.join(EMBEDDINGS_FILE),
            EMBEDDINGS_TENSOR,
            snapshot.embeddings(),
            rows,
            dims,
            None,
        )?;
        write_metadata(&dir.join(METADATA_FILE), snapshot.metadata())?;
        Ok(())
    }

    fn read_from(&self, dir: &Path) -> Result<IndexSnapshot> {
        let index_path = dir.join(INDEX_FILE);
        let embeddings_path = dir.join(EMBEDDINGS_FILE);
        let metadata_path = dir.join(METADATA_FILE);

        match (
            index_path.is_file(),
            embeddings_path.is_file(),
            metadata_path.is_file(),
        ) {
            (false, false, false) => {
                debug!("{} holds no index artifacts", dir.display());
                return Ok(IndexSnapshot::empty(self.dimension));
            }
            (false, _, _) => {
                return Err(DocsError::StorageCorruption(format!(
                    "{} is missing while other index artifacts exist in {}",
                    INDEX_FILE,
                    dir.display()
                )));
            }
            (true, false, _) | (true, _, false) => {
                return Err(DocsError::StorageCorruption(format!(
                    "{} exists in {} without {} and {}",
                    INDEX_FILE,
                    dir.display(),
                    EMBEDDINGS_FILE,
                    METADATA_FILE
                )));
            }
            (true, true, true) => {}
        }

        let index = read_f32_matrix(&index_path, INDEX_TENSOR)?;
        match index.header.get("format").map(String::as_str) {
            Some(INDEX_FORMAT) => {}
            other => {
                return Err(DocsError::StorageCorruption(format!(
                    "{} has unsupported index format {:?}",
                    index_path.display(),
                    other
                )));
            }
        }
        self.check_dimension(index.dims)?;

        let embeddings = read_f32_matrix(&embeddings_path, EMBEDDINGS_TENSOR)?;
        self.check_dimension(embeddings.dims)?;
        if embeddings.rows != index.rows {
            return Err(DocsError::StorageCorruption(format!(
                "{} holds {} rows but {} holds {}",
                INDEX_FILE, index.rows, EMBEDDINGS_FILE, embeddings.rows
            )));
        }

        let records = read_metadata(&metadata_path)?;
        let flat = FlatIndex::from_vectors(index.dims, index.data)?;
        let snapshot = IndexSnapshot::from_parts(flat, records, embeddings.data)?;

        debug!(
            "Loaded {} records from {}",
            snapshot.len(),
            dir.display()
        );
        Ok(snapshot)
    }

    fn check_dimension(&self, found: usize) -> Result<()> {
        if found != self.dimension {
            return Err(DocsError::DimensionMismatch {
                expected: self.dimension,
                found,
            });
        }
        Ok(())
    }

    fn staging_dir(&self) -> PathBuf {
        self.sibling(".staging")
    }

    fn backup_dir(&self) -> PathBuf {
        self.sibling(".backup")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .dir
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("index"));
        name.push(suffix);
        self.dir.with_file_name(name)
    }
}

/// Whether a concurrent directory swap may have cut `result` short
fn moved_during_read(source: &Path, result: &Result<IndexSnapshot>) -> bool {
    if !source.is_dir() {
        return true;
    }
    matches!(result, Err(DocsError::Io(e)) if e.kind() == ErrorKind::NotFound)
}

fn has_any_artifact(dir: &Path) -> bool {
    [INDEX_FILE, EMBEDDINGS_FILE, METADATA_FILE]
        .iter()
        .any(|name| dir.join(name).is_file())
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(Ok(dir)) = path.parent().map(fs::File::open) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}
