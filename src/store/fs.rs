use super::{Result, StoreError, TextStore, check_key};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// Directory-backed store: one file per key.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so the nameserver polling these files never reads a
/// half-written zone.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root.to_string_lossy(), e))?;
        debug!("Opened file store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of the file holding `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(key))
    }

    fn stage(&self, key: &str, contents: &str) -> Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(|e| StoreError::io(key, e))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| StoreError::io(key, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(key, e))?;
        Ok(tmp)
    }
}

impl TextStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => {
                trace!("Read {} bytes from {}", contents.len(), path.display());
                Ok(Some(contents))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    fn write(&self, key: &str, contents: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = self.stage(key, contents)?;
        tmp.persist(&path)
            .map_err(|e| StoreError::io(key, e.error))?;
        trace!("Wrote {} bytes to {}", contents.len(), path.display());
        Ok(())
    }

    fn create_new(&self, key: &str, contents: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = self.stage(key, contents)?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                trace!("Created {}", path.display());
                Ok(())
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(key.to_string()))
            }
            Err(e) => Err(StoreError::io(key, e.error)),
        }
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                trace!("Removed {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    fn size(&self, key: &str) -> Result<Option<u64>> {
        let path = self.path_for(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        path.try_exists().map_err(|e| StoreError::io(key, e))
    }

    fn keys(&self) -> Result<Vec<String>> {
        let root = self.root.to_string_lossy().to_string();
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.root).map_err(|e| StoreError::io(&root, e))? {
            let entry = entry.map_err(|e| StoreError::io(&root, e))?;
            let is_file = entry
                .file_type()
                .map_err(|e| StoreError::io(&root, e))?
                .is_file();
            if !is_file {
                continue;
            }
            // Staged temporaries are dotfiles and never valid keys
            if let Some(name) = entry.file_name().to_str() {
                if check_key(name).is_ok() {
                    keys.push(name.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
