use crate::{
    fsutil::write_atomic_text,
    game::{self, GameId},
};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_PROFILE: &str = "Default";
pub const DEFAULT_BACKUPS_TO_KEEP: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub active_game: GameId,
    #[serde(default = "default_true")]
    pub confirm_bulk_toggle: bool,
    #[serde(default = "default_true")]
    pub confirm_group_remove: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            active_game: GameId::default(),
            confirm_bulk_toggle: true,
            confirm_group_remove: true,
        }
    }
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_in(&base_data_dir()?)
    }

    pub fn load_or_create_in(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            return Ok(config);
        }

        let config = AppConfig::default();
        config.save_in(base_dir)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_in(&base_data_dir()?)
    }

    pub fn save_in(&self, base_dir: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        write_atomic_text(&base_dir.join("config.json"), &raw).context("write app config")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default)]
    pub game_id: GameId,
    pub game_name: String,
    pub data_dir: PathBuf,
    pub game_root: PathBuf,
    pub mods_dir: PathBuf,
    pub active_profile: String,
    #[serde(default)]
    pub sort_tool: PathBuf,
    /// Command the sorting tool is launched through, e.g. `["wine"]`.
    #[serde(default)]
    pub launcher_wrapper: Vec<String>,
    #[serde(default)]
    pub offline: bool,
    /// Sorting tool lists that `groups import` reads group names from.
    #[serde(default)]
    pub masterlist: PathBuf,
    #[serde(default)]
    pub userlist: PathBuf,
    #[serde(default)]
    pub ignore_master_conflicts: bool,
    #[serde(default)]
    pub locked_disabled: Vec<String>,
    #[serde(default = "default_backups_to_keep")]
    pub backups_to_keep: usize,
}

impl GameConfig {
    pub fn load_or_create(game: GameId) -> Result<Self> {
        Self::load_or_create_at(game, data_dir_for_game(game)?)
    }

    pub fn load_or_create_at(game: GameId, data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir).context("create data dir")?;

        let config_path = data_dir.join("config.json");
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path).context("read config")?;
            let mut config: GameConfig = serde_json::from_str(&raw).context("parse config")?;
            config.game_id = game;
            config.game_name = game.display_name().to_string();
            config.data_dir = data_dir;
            if config.active_profile.trim().is_empty() {
                config.active_profile = DEFAULT_PROFILE.to_string();
            }
            config.save()?;
            return Ok(config);
        }

        let game_root = game::detect_game_root(game).unwrap_or_default();
        let config = GameConfig {
            game_id: game,
            game_name: game.display_name().to_string(),
            mods_dir: data_dir.join("mods"),
            data_dir,
            game_root,
            active_profile: DEFAULT_PROFILE.to_string(),
            sort_tool: PathBuf::new(),
            launcher_wrapper: Vec::new(),
            offline: false,
            masterlist: PathBuf::new(),
            userlist: PathBuf::new(),
            ignore_master_conflicts: false,
            locked_disabled: Vec::new(),
            backups_to_keep: DEFAULT_BACKUPS_TO_KEEP,
        };

        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = self.data_dir.join("config.json");
        let raw = serde_json::to_string_pretty(self).context("serialize config")?;
        write_atomic_text(&config_path, &raw).context("write config")?;
        Ok(())
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.profile_dir_for(&self.active_profile)
    }

    pub fn profile_dir_for(&self, profile: &str) -> PathBuf {
        self.data_dir.join("profiles").join(profile)
    }

    pub fn cache_root(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// The game's `Data` directory, when a game root is configured.
    pub fn game_data_dir(&self) -> Option<PathBuf> {
        if self.game_root.as_os_str().is_empty() {
            None
        } else {
            Some(game::data_dir(&self.game_root))
        }
    }
}

pub fn data_dir_for_game(game: GameId) -> Result<PathBuf> {
    let base = base_data_dir()?;
    Ok(base.join(game.data_dir_name()))
}

fn default_true() -> bool {
    true
}

fn default_backups_to_keep() -> usize {
    DEFAULT_BACKUPS_TO_KEEP
}

pub fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("plugsmith"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn app_config_is_created_with_confirmations_on() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_or_create_in(dir.path()).unwrap();
        assert!(config.confirm_bulk_toggle);
        assert!(config.confirm_group_remove);

        let mut changed = config;
        changed.confirm_bulk_toggle = false;
        changed.save_in(dir.path()).unwrap();
        let reloaded = AppConfig::load_or_create_in(dir.path()).unwrap();
        assert!(!reloaded.confirm_bulk_toggle);
    }

    #[test]
    fn game_config_fills_defaults_for_older_files() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"game_name": "x", "data_dir": "/elsewhere", "game_root": "/games/skyrim",
                "mods_dir": "/mods", "active_profile": ""}"#,
        )
        .unwrap();
        let config = GameConfig::load_or_create_at(GameId::Fallout4, dir.path().to_path_buf())
            .unwrap();
        assert_eq!(config.game_id, GameId::Fallout4);
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.active_profile, DEFAULT_PROFILE);
        assert_eq!(config.backups_to_keep, DEFAULT_BACKUPS_TO_KEEP);
        assert_eq!(config.profile_dir(), dir.path().join("profiles").join("Default"));
        assert_eq!(
            config.game_data_dir(),
            Some(PathBuf::from("/games/skyrim").join("Data"))
        );
    }
}
