use crate::{
    error::{EngineError, EngineResult},
    fsutil::write_atomic_text,
    load_order::{LoadOrder, SnapshotEntry},
    plugin::is_plugin_file,
    plugins_txt::{parse_plugins_txt, render_plugins_txt, PLUGINS_FILE},
};
use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use time::OffsetDateTime;

pub const BACKUP_DIR: &str = "backups";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub id: String,
    pub path: PathBuf,
    pub plugins: usize,
}

impl BackupInfo {
    /// `YYYY-MM-DD HH:MM:SS` taken from the id.
    pub fn created(&self) -> String {
        let parts: Vec<&str> = self.id.split('_').collect();
        if parts.len() < 6 {
            return self.id.clone();
        }
        format!(
            "{}-{}-{} {}:{}:{}",
            parts[0], parts[1], parts[2], parts[3], parts[4], parts[5]
        )
    }

    fn sort_key(&self) -> (String, u32) {
        split_id(&self.id)
    }
}

fn split_id(id: &str) -> (String, u32) {
    let parts: Vec<&str> = id.split('_').collect();
    if parts.len() == 7 {
        if let Ok(counter) = parts[6].parse() {
            return (parts[..6].join("_"), counter);
        }
    }
    (id.to_string(), 1)
}

/// Timestamped copies of a profile's `plugins.txt`.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(profile_dir: &Path) -> Self {
        Self {
            dir: profile_dir.join(BACKUP_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{PLUGINS_FILE}.{id}"))
    }

    pub fn create(&self, snapshot: &[SnapshotEntry]) -> EngineResult<BackupInfo> {
        self.create_at(snapshot, timestamp_id(now()))
    }

    fn create_at(&self, snapshot: &[SnapshotEntry], base: String) -> EngineResult<BackupInfo> {
        fs::create_dir_all(&self.dir)?;
        let mut id = base.clone();
        let mut counter = 2;
        while self.path_for(&id).exists() {
            id = format!("{base}_{counter}");
            counter += 1;
        }
        let path = self.path_for(&id);
        write_atomic_text(&path, &render_plugins_txt(snapshot))?;
        log::info!("created load order backup {id}");
        Ok(BackupInfo {
            id,
            path,
            plugins: snapshot.len(),
        })
    }

    /// Newest first.
    pub fn list(&self) -> EngineResult<Vec<BackupInfo>> {
        let prefix = format!("{PLUGINS_FILE}.");
        let mut backups = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::NoBackups)
            }
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(id) = name.strip_prefix(&prefix) else {
                continue;
            };
            if id.ends_with(".tmp") || id.is_empty() {
                continue;
            }
            let plugins = fs::read_to_string(entry.path())
                .map(|raw| parse_plugins_txt(&raw).len())
                .unwrap_or_default();
            backups.push(BackupInfo {
                id: id.to_string(),
                path: entry.path(),
                plugins,
            });
        }
        if backups.is_empty() {
            return Err(EngineError::NoBackups);
        }
        backups.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
        Ok(backups)
    }

    pub fn load(&self, id: &str) -> EngineResult<Vec<SnapshotEntry>> {
        let raw = fs::read_to_string(self.path_for(id))
            .map_err(|err| EngineError::restore_io(id, &err))?;
        let snapshot = parse_plugins_txt(&raw);
        if snapshot.is_empty() {
            return Err(EngineError::Restore {
                id: id.to_string(),
                reason: "backup lists no plugins".to_string(),
                code: None,
            });
        }
        if let Some(bad) = snapshot.iter().find(|entry| !is_plugin_file(&entry.name)) {
            return Err(EngineError::Restore {
                id: id.to_string(),
                reason: format!("{:?} is not a plugin file name", bad.name),
                code: None,
            });
        }
        Ok(snapshot)
    }

    /// Replaces `order` with the backup; on any failure `order` is untouched.
    pub fn restore(&self, id: &str, order: &mut LoadOrder) -> EngineResult<Vec<String>> {
        let snapshot = self.load(id)?;
        let warnings = order.restore_snapshot(&snapshot)?;
        log::info!("restored load order backup {id}");
        Ok(warnings)
    }

    /// Deletes all but the newest `keep` backups.
    pub fn prune(&self, keep: usize) -> EngineResult<usize> {
        let backups = match self.list() {
            Ok(backups) => backups,
            Err(EngineError::NoBackups) => return Ok(0),
            Err(err) => return Err(err),
        };
        let mut removed = 0;
        for backup in backups.iter().skip(keep) {
            fs::remove_file(&backup.path)?;
            removed += 1;
        }
        if removed > 0 {
            log::info!("pruned {removed} old backup(s)");
        }
        Ok(removed)
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn timestamp_id(now: OffsetDateTime) -> String {
    format!(
        "{:04}_{:02}_{:02}_{:02}_{:02}_{:02}",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
