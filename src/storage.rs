use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StorageError;

/// Client-side durable key-value storage (the browser's local storage in
/// the original deployment).
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-memory fake.
#[derive(Debug, Default)]
pub struct MemoryKv {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Entry {
    key: String,
    value: String,
}

struct KvFile {
    file: File,
    items: HashMap<String, String>,
}

/// File-backed storage: an append-only log of `[Length (4b)][JSON entry]`
/// frames, replayed on open. The last frame for a key wins; a log holding
/// superseded frames is rewritten on open.
pub struct FileKv {
    pub file_path: PathBuf,
    inner: Mutex<KvFile>,
}

struct Replay {
    items: HashMap<String, String>,
    frames: usize,
    valid_len: u64,
}

impl FileKv {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut file = Self::open_log(path)?;

        let replay = Self::replay(&file)?;
        if replay.frames > replay.items.len() {
            drop(file);
            file = Self::compact(path, &replay.items)?;
            tracing::debug!(path = %path.display(), dropped = replay.frames - replay.items.len(), "compacted key-value log");
        } else if replay.valid_len < file.metadata()?.len() {
            file.set_len(replay.valid_len)?;
        }
        tracing::debug!(path = %path.display(), keys = replay.items.len(), "opened key-value log");

        Ok(Self {
            file_path: path.to_path_buf(),
            inner: Mutex::new(KvFile { file, items: replay.items }),
        })
    }

    fn open_log(path: &Path) -> Result<File, StorageError> {
        Ok(OpenOptions::new().read(true).append(true).create(true).open(path)?)
    }

    fn frame(key: &str, value: &str) -> Result<Vec<u8>, StorageError> {
        let bytes = serde_json::to_vec(&Entry { key: key.to_string(), value: value.to_string() })?;
        let mut frame = Vec::with_capacity(4 + bytes.len());
        frame.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        frame.extend_from_slice(&bytes);
        Ok(frame)
    }

    /// Rewrites the log with one frame per key, swapping it in by rename.
    fn compact(path: &Path, items: &HashMap<String, String>) -> Result<File, StorageError> {
        let tmp = path.with_extension("compact");
        {
            let mut out = File::create(&tmp)?;
            for (k, v) in items {
                out.write_all(&Self::frame(k, v)?)?;
            }
            out.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Self::open_log(path)
    }

    fn replay(file: &File) -> Result<Replay, StorageError> {
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file.try_clone()?);
        let mut replay = Replay { items: HashMap::new(), frames: 0, valid_len: 0 };

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                // also covers a partial length prefix
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(len_buf) as u64;

            // A torn tail frame from an interrupted write is dropped, and so
            // is a prefix claiming more bytes than the file holds.
            let remaining = file_len.saturating_sub(replay.valid_len + 4);
            if len > remaining {
                tracing::warn!(claimed = len, remaining, "ignoring truncated trailing entry");
                break;
            }

            let mut bytes = vec![0u8; len as usize];
            reader.read_exact(&mut bytes)?;

            let entry: Entry = serde_json::from_slice(&bytes)?;
            replay.items.insert(entry.key, entry.value);
            replay.frames += 1;
            replay.valid_len += 4 + len;
        }
        Ok(replay)
    }
}

impl KeyValueStore for FileKv {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(inner.items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;

        let frame = Self::frame(key, value)?;
        inner.file.write_all(&frame)?;
        inner.file.flush()?;

        inner.items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
