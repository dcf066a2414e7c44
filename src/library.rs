use crate::{
    fsutil::{is_ignored_path, relative_key, write_atomic_text},
    origin_index::load_origin_index,
    plugin::{is_plugin_file, name_key, PluginSource},
};
use anyhow::{Context, Result};
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use walkdir::WalkDir;

pub const GAME_DATA_ORIGIN: &str = "<game data>";

/// Installed origins, persisted as `library.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Library {
    pub origins: Vec<OriginEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub priority: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub packed: bool,
}

impl OriginEntry {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl Library {
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        let library_path = data_dir.join("library.json");
        if library_path.exists() {
            let raw = fs::read_to_string(&library_path).context("read library.json")?;
            let mut library: Library = serde_json::from_str(&raw).context("parse library.json")?;
            library.origins.retain(|origin| !origin.id.trim().is_empty());
            return Ok(library);
        }

        let library = Library::default();
        library.save(data_dir)?;
        Ok(library)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let library_path = data_dir.join("library.json");
        let raw = serde_json::to_string_pretty(self).context("serialize library.json")?;
        write_atomic_text(&library_path, &raw).context("write library.json")?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginFile {
    pub relative_path: String,
    pub size: u64,
    pub modified: Option<u64>,
}

/// One origin's scanned file set.
#[derive(Debug, Clone)]
pub struct Origin {
    pub id: String,
    pub name: String,
    pub priority: i64,
    pub packed: bool,
    pub root: PathBuf,
    pub files: Vec<OriginFile>,
}

impl Origin {
    pub fn new(id: &str, priority: i64, packed: bool, root: PathBuf, files: Vec<OriginFile>) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            priority,
            packed,
            root,
            files,
        }
    }

    /// Loose origins outrank packed ones, then priority, then id.
    pub fn rank_cmp(&self, other: &Origin) -> Ordering {
        (!self.packed)
            .cmp(&!other.packed)
            .then(self.priority.cmp(&other.priority))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Active origins ordered from lowest to highest rank.
#[derive(Debug, Clone, Default)]
pub struct OriginSet {
    origins: Vec<Origin>,
}

impl OriginSet {
    pub fn new(mut origins: Vec<Origin>) -> Self {
        origins.sort_by(|a, b| a.rank_cmp(b));
        Self { origins }
    }

    /// Scans enabled library origins below `mods_dir` plus the game data directory.
    pub fn scan(
        library: &Library,
        mods_dir: &Path,
        game_data: Option<&Path>,
        cache_root: &Path,
    ) -> Result<Self> {
        let mut origins = Vec::new();
        if let Some(data) = game_data.filter(|path| path.is_dir()) {
            let files = scan_loose(data)?;
            let mut origin = Origin::new(GAME_DATA_ORIGIN, i64::MIN, false, data.to_path_buf(), files);
            origin.name = GAME_DATA_ORIGIN.to_string();
            origins.push(origin);
        }

        for entry in library.origins.iter().filter(|entry| entry.enabled) {
            let root = mods_dir.join(&entry.id);
            let files = if entry.packed {
                match load_origin_index(cache_root, &entry.id) {
                    Some(index) => index
                        .entries
                        .into_iter()
                        .map(|item| OriginFile {
                            relative_path: item.relative_path,
                            size: item.size,
                            modified: None,
                        })
                        .collect(),
                    None => {
                        log::warn!("no file index for packed origin {}", entry.id);
                        Vec::new()
                    }
                }
            } else if root.is_dir() {
                scan_loose(&root).with_context(|| format!("scan origin {}", entry.id))?
            } else {
                log::warn!("origin directory missing: {}", root.display());
                Vec::new()
            };
            let mut origin = Origin::new(&entry.id, entry.priority, entry.packed, root, files);
            origin.name = entry.display_name().to_string();
            origins.push(origin);
        }

        let set = OriginSet::new(origins);
        log::debug!(
            "scanned {} origin(s), {} file(s)",
            set.origins.len(),
            set.origins.iter().map(|origin| origin.files.len()).sum::<usize>()
        );
        Ok(set)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Origin> {
        self.origins.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Origin> {
        self.origins.iter().find(|origin| origin.id == id)
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Top-level plugin files; the highest-ranked origin supplying a name wins.
    pub fn plugin_sources(&self) -> Vec<PluginSource> {
        let mut winners: HashMap<String, PluginSource> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for origin in &self.origins {
            for file in &origin.files {
                if file.relative_path.contains('/') || !is_plugin_file(&file.relative_path) {
                    continue;
                }
                let key = name_key(&file.relative_path);
                if !winners.contains_key(&key) {
                    order.push(key.clone());
                }
                winners.insert(
                    key,
                    PluginSource {
                        name: file.relative_path.clone(),
                        origin: origin.id.clone(),
                        path: origin.root.join(&file.relative_path),
                    },
                );
            }
        }
        order
            .into_iter()
            .filter_map(|key| winners.remove(&key))
            .collect()
    }

    /// Hash over everything that affects conflict resolution.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Hasher::new();
        for origin in &self.origins {
            hasher.update(origin.id.as_bytes());
            hasher.update(&origin.priority.to_le_bytes());
            hasher.update(&[origin.packed as u8]);
            for file in &origin.files {
                hasher.update(file.relative_path.as_bytes());
                hasher.update(&file.size.to_le_bytes());
                hasher.update(&file.modified.unwrap_or_default().to_le_bytes());
            }
            hasher.update(&[0xff]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

pub fn scan_loose(root: &Path) -> Result<Vec<OriginFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_ignored_path(entry.path()))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).context("rel path")?;
        let meta = entry.metadata()?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_secs());
        files.push(OriginFile {
            relative_path: relative_key(rel),
            size: meta.len(),
            modified,
        });
    }
    Ok(files)
}

fn default_true() -> bool {
    true
}
