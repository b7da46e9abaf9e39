/*
File Cache Storage

Cache storage port backed by one JSON file per key in a directory. Writes go to a temporary
file first and are renamed into place, so a crash mid-write never leaves a truncated entry
behind.
*/

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::application::ports::output::cache_storage_port::{
    CacheStoragePort, StorageError, StorageResult,
};

#[derive(Debug, Clone)]
pub struct FileCacheStorage {
    directory: PathBuf,
}

impl FileCacheStorage {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        self.directory.join(format!("{}.json", file_name))
    }
}

fn map_io_error(error: std::io::Error) -> StorageError {
    match error.kind() {
        ErrorKind::PermissionDenied => StorageError::Unavailable(error.to_string()),
        _ => StorageError::IoError(error.to_string()),
    }
}

#[async_trait]
impl CacheStoragePort for FileCacheStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io_error(e)),
        }
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        fs::create_dir_all(&self.directory).await.map_err(map_io_error)?;

        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value).await.map_err(map_io_error)?;
        fs::rename(&staging, &path).await.map_err(map_io_error)
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io_error(e)),
        }
    }
}
