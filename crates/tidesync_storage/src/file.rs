//! File-based storage adapter for persistent caches.

use crate::adapter::StorageAdapter;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A file-based storage adapter.
///
/// Each key is stored in its own file inside a cache directory. Data
/// survives process restarts.
///
/// # Durability
///
/// - `save` writes a temporary file, calls `File::sync_all()`, then renames
///   it over the previous value, so a crash never leaves a half-written
///   snapshot behind
/// - Files are opened for the duration of one call and closed before it
///   returns
///
/// # Thread Safety
///
/// This adapter is thread-safe. Writes are serialized internally.
///
/// # Example
///
/// ```no_run
/// use tidesync_storage::{FileStorage, StorageAdapter};
/// use std::path::Path;
///
/// let storage = FileStorage::open(Path::new("cache")).unwrap();
/// storage.save("dataset_todos", b"{}").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Opens a file adapter rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the directory cannot be created.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir).map_err(|source| StorageError::Open {
            location: dir.display().to_string(),
            source,
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path used for `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }

    fn check_dir(&self) -> StorageResult<()> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(StorageError::Open {
                location: self.dir.display().to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "cache directory missing"),
            })
        }
    }
}

impl StorageAdapter for FileStorage {
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check_dir()?;
        let path = self.path_for(key);

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        debug!(key, bytes = buffer.len(), "loaded value");
        Ok(Some(buffer))
    }

    fn save(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.check_dir()?;
        let _guard = self.write_lock.lock();

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(key, bytes = value.len(), "saved value");
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.check_dir()?;
        let _guard = self.write_lock.lock();

        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Maps an arbitrary key onto a portable file name.
///
/// ASCII alphanumerics, `-` and `_` are kept; every other byte becomes `%XX`.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
