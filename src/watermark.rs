use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Default file name of the watermark document inside the data directory
pub const WATERMARK_FILE: &str = "last_seen.json";

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("watermark file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("io error on watermark file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize watermarks: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable mapping of channel key to the highest item id already processed.
#[derive(Debug)]
pub struct ChannelWatermarkStore {
    path: PathBuf,
    marks: BTreeMap<String, u64>,
}

impl ChannelWatermarkStore {
    /// Load the store from `path`. A missing file is an empty mapping.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, WatermarkError> {
        let path = path.into();
        let marks = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| {
                WatermarkError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No watermark file at {path}, starting empty", path = path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Loaded {count} channel watermarks from {path}",
            count = marks.len(),
            path = path.display()
        );
        Ok(Self { path, marks })
    }

    /// Current watermark for `key`; absent entries are 0
    pub fn get(&self, key: &str) -> u64 {
        self.marks.get(key).copied().unwrap_or(0)
    }

    /// Raise the watermark for `key` to `candidate` if it is higher.
    /// Returns true when the stored value changed.
    pub fn advance(&mut self, key: &str, candidate: u64) -> bool {
        let current = self.get(key);
        if candidate <= current && self.marks.contains_key(key) {
            return false;
        }
        let next = current.max(candidate);
        self.marks.insert(key.to_string(), next);
        debug!("Watermark for {key} advanced from {current} to {next}");
        next != current
    }

    pub fn marks(&self) -> &BTreeMap<String, u64> {
        &self.marks
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically rewrite the whole mapping (temp file in the same directory,
    /// then rename over the target).
    pub fn persist(&self) -> Result<(), WatermarkError> {
        let json = serde_json::to_string_pretty(&self.marks)?;

        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&self.path).map_err(|e| WatermarkError::Io(e.error))?;

        debug!("Persisted watermarks to {path}", path = self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ChannelWatermarkStore::load(dir.path().join(WATERMARK_FILE)).unwrap();
        assert!(store.marks().is_empty());
        assert_eq!(store.get("anything"), 0);
    }

    #[test]
    fn test_advance_never_lowers() {
        let dir = TempDir::new().unwrap();
        let mut store = ChannelWatermarkStore::load(dir.path().join(WATERMARK_FILE)).unwrap();

        assert!(store.advance("news", 100));
        assert!(!store.advance("news", 50));
        assert_eq!(store.get("news"), 100);
        assert!(store.advance("news", 104));
        assert_eq!(store.get("news"), 104);
    }

    #[test]
    fn test_sequence_of_advances_is_non_decreasing() {
        let dir = TempDir::new().unwrap();
        let mut store = ChannelWatermarkStore::load(dir.path().join(WATERMARK_FILE)).unwrap();

        let mut previous = 0;
        for candidate in [5, 3, 9, 9, 1, 20, 7] {
            store.advance("c", candidate);
            let now = store.get("c");
            assert!(now >= previous);
            previous = now;
        }
        assert_eq!(previous, 20);
    }

    #[test]
    fn test_persist_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(WATERMARK_FILE);

        let mut store = ChannelWatermarkStore::load(&path).unwrap();
        store.advance("news", 104);
        store.advance("1234", 7);
        store.persist().unwrap();

        let reloaded = ChannelWatermarkStore::load(&path).unwrap();
        assert_eq!(reloaded.get("news"), 104);
        assert_eq!(reloaded.get("1234"), 7);
    }

    #[test]
    fn test_persist_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(WATERMARK_FILE);

        let mut store = ChannelWatermarkStore::load(&path).unwrap();
        store.advance("news", 1);
        store.persist().unwrap();
        store.advance("news", 2);
        store.persist().unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(WATERMARK_FILE);
        fs::write(&path, "{\"news\": ").unwrap();

        let err = ChannelWatermarkStore::load(&path).unwrap_err();
        assert!(matches!(err, WatermarkError::Corrupt { .. }));
    }

    #[test]
    fn test_reads_plain_object_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(WATERMARK_FILE);
        fs::write(&path, "{\n  \"meta_ads_expert\": 321\n}").unwrap();

        let store = ChannelWatermarkStore::load(&path).unwrap();
        assert_eq!(store.get("meta_ads_expert"), 321);
    }
}
