//! # File Cache Backend
//!
//! One JSON file per key in a single directory. `:` in keys becomes `-` in
//! file names (`gwsync-v1-gw7.json`). Writes go to a temporary file first and
//! are renamed into place, so a crash never leaves a half-written entry
//! under a real key.
//!
//! Out-of-space from the filesystem (`ENOSPC`, `EDQUOT`) and the optional
//! byte budget both surface as [`CacheError::Capacity`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::cache::store::CacheBackend;
use crate::error::CacheError;

const EXTENSION: &str = "json";

/// Directory-backed [`CacheBackend`].
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
    /// Byte budget over all entry files; `0` is unbounded.
    capacity: u64,
}

impl FileBackend {
    /// Opens (creating if needed) a cache directory.
    pub async fn open(dir: impl Into<PathBuf>, capacity: u64) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir, capacity })
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", key.replace(':', "-")))
    }

    fn key_for(path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != EXTENSION {
            return None;
        }
        Some(path.file_stem()?.to_str()?.replace('-', ":"))
    }

    /// Total size of entry files, and the size of `key`'s file.
    async fn usage(&self, key: &str) -> Result<(u64, u64), CacheError> {
        let target = self.path_for(key);
        let mut total = 0;
        let mut existing = 0;
        let mut rd = fs::read_dir(&self.dir).await?;
        while let Some(ent) = rd.next_entry().await? {
            let path = ent.path();
            if Self::key_for(&path).is_none() {
                continue;
            }
            let len = ent.metadata().await.map(|m| m.len()).unwrap_or(0);
            total += len;
            if path == target {
                existing = len;
            }
        }
        Ok((total, existing))
    }

    async fn fits(&self, key: &str, bytes: u64) -> Result<bool, CacheError> {
        if self.capacity == 0 {
            return Ok(true);
        }
        let (total, existing) = self.usage(key).await?;
        Ok(total - existing + bytes <= self.capacity)
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        if !self.fits(key, value.len() as u64).await? {
            return Err(CacheError::Capacity);
        }
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        if let Err(e) = fs::write(&tmp, value).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut out = Vec::new();
        let mut rd = fs::read_dir(&self.dir).await?;
        while let Some(ent) = rd.next_entry().await? {
            if let Some(key) = Self::key_for(&ent.path()) {
                if key.starts_with(prefix) {
                    out.push(key);
                }
            }
        }
        Ok(out)
    }

    async fn would_fit(&self, key: &str, bytes: usize) -> bool {
        self.fits(key, bytes as u64).await.unwrap_or(false)
    }
}
