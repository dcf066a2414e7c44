use crate::fsutil::write_atomic_text;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const ORIGIN_INDEX_VERSION: u32 = 1;

/// Cached file listing of a packed origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginIndex {
    pub version: u32,
    pub entries: Vec<OriginIndexEntry>,
    #[serde(default)]
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginIndexEntry {
    pub relative_path: String,
    pub size: u64,
}

impl OriginIndex {
    pub fn new(entries: Vec<OriginIndexEntry>) -> Self {
        let total_bytes = entries.iter().map(|entry| entry.size).sum();
        Self {
            version: ORIGIN_INDEX_VERSION,
            entries,
            total_bytes,
        }
    }
}

pub fn origin_index_root(cache_root: &Path) -> PathBuf {
    cache_root.join("origin_index")
}

pub fn origin_index_path(cache_root: &Path, origin_id: &str) -> PathBuf {
    origin_index_root(cache_root).join(format!("{origin_id}.json"))
}

pub fn write_origin_index(cache_root: &Path, origin_id: &str, index: &OriginIndex) -> Result<()> {
    let path = origin_index_path(cache_root, origin_id);
    let raw = serde_json::to_string_pretty(index).context("serialize origin index")?;
    write_atomic_text(&path, &raw).context("write origin index")?;
    Ok(())
}

pub fn load_origin_index(cache_root: &Path, origin_id: &str) -> Option<OriginIndex> {
    let path = origin_index_path(cache_root, origin_id);
    let raw = fs::read_to_string(path).ok()?;
    let index: OriginIndex = serde_json::from_str(&raw).ok()?;
    if index.version != ORIGIN_INDEX_VERSION {
        log::warn!("origin index for {origin_id} has version {}, ignoring", index.version);
        return None;
    }
    Some(index)
}

pub fn remove_origin_index(cache_root: &Path, origin_id: &str) {
    let path = origin_index_path(cache_root, origin_id);
    let _ = fs::remove_file(path);
}
