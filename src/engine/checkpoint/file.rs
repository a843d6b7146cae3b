// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{Checkpoint, CheckpointStore};
use crate::engine::error::CheckpointError;

/// Stores each checkpoint as `<dir>/<encoded thread_id>.json`.
///
/// Thread ids are opaque: bytes outside `[A-Za-z0-9_-]` are written as
/// `%XX`, so ids such as `tenant/42` or `..` never leave the directory.
/// A save writes a temporary file next to the target and renames it into
/// place, so readers never observe a partially written snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileCheckpointStore {
    dir: PathBuf,
}

impl JsonFileCheckpointStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf, CheckpointError> {
        if thread_id.is_empty() {
            return Err(CheckpointError::InvalidThreadId(thread_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", encode_file_stem(thread_id))))
    }
}

fn encode_file_stem(thread_id: &str) -> String {
    let mut stem = String::with_capacity(thread_id.len());
    for byte in thread_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

fn decode_file_stem(stem: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(stem.len());
    let mut rest = stem.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        if byte == b'%' {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(byte);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(&checkpoint.thread_id)?;
        let tmp = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

        let bytes = serde_json::to_vec_pretty(&checkpoint)?;
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(thread_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(thread_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError> {
        let path = self.path_for(thread_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn thread_ids(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(id) = name.strip_suffix(".json").and_then(decode_file_stem) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
