use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameId {
    Oblivion,
    SkyrimSe,
    Fallout4,
    Starfield,
}

impl Default for GameId {
    fn default() -> Self {
        GameId::SkyrimSe
    }
}

/// Size of a record header in bytes, which differs between engine generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    Oblivion,
    Standard,
}

impl HeaderLayout {
    pub fn record_header_len(self) -> usize {
        match self {
            HeaderLayout::Oblivion => 20,
            HeaderLayout::Standard => 24,
        }
    }
}

impl GameId {
    pub fn display_name(self) -> &'static str {
        match self {
            GameId::Oblivion => "Oblivion",
            GameId::SkyrimSe => "Skyrim Special Edition",
            GameId::Fallout4 => "Fallout 4",
            GameId::Starfield => "Starfield",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameId::Oblivion => "oblivion",
            GameId::SkyrimSe => "skyrimse",
            GameId::Fallout4 => "fallout4",
            GameId::Starfield => "starfield",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        supported_games()
            .into_iter()
            .find(|game| game.as_str().eq_ignore_ascii_case(value))
    }

    /// Name the external sorting tool expects for `--game`.
    pub fn sort_tool_name(self) -> &'static str {
        match self {
            GameId::Oblivion => "Oblivion",
            GameId::SkyrimSe => "Skyrim Special Edition",
            GameId::Fallout4 => "Fallout4",
            GameId::Starfield => "Starfield",
        }
    }

    pub fn data_dir_name(self) -> &'static str {
        self.as_str()
    }

    fn steam_folders(self) -> &'static [&'static str] {
        match self {
            GameId::Oblivion => &["Oblivion"],
            GameId::SkyrimSe => &["Skyrim Special Edition"],
            GameId::Fallout4 => &["Fallout 4"],
            GameId::Starfield => &["Starfield"],
        }
    }

    fn always_enabled_list(self) -> Option<&'static str> {
        match self {
            GameId::Oblivion => None,
            GameId::SkyrimSe => Some("Skyrim.ccc"),
            GameId::Fallout4 => Some("Fallout4.ccc"),
            GameId::Starfield => Some("Starfield.ccc"),
        }
    }

    pub fn rules(self) -> GameRules {
        let (primary, light, overlay, layout): (&[&str], bool, bool, HeaderLayout) = match self {
            GameId::Oblivion => (&["Oblivion.esm"], false, false, HeaderLayout::Oblivion),
            GameId::SkyrimSe => (
                &[
                    "Skyrim.esm",
                    "Update.esm",
                    "Dawnguard.esm",
                    "HearthFires.esm",
                    "Dragonborn.esm",
                ],
                true,
                false,
                HeaderLayout::Standard,
            ),
            GameId::Fallout4 => (
                &[
                    "Fallout4.esm",
                    "DLCRobot.esm",
                    "DLCworkshop01.esm",
                    "DLCCoast.esm",
                    "DLCworkshop02.esm",
                    "DLCworkshop03.esm",
                    "DLCNukaWorld.esm",
                ],
                true,
                false,
                HeaderLayout::Standard,
            ),
            GameId::Starfield => (
                &[
                    "Starfield.esm",
                    "Constellation.esm",
                    "OldMars.esm",
                    "BlueprintShips-Starfield.esm",
                    "SFBGS003.esm",
                    "SFBGS004.esm",
                    "SFBGS006.esm",
                    "SFBGS007.esm",
                    "SFBGS008.esm",
                ],
                true,
                true,
                HeaderLayout::Standard,
            ),
        };
        GameRules {
            game: self,
            primary_plugins: primary.iter().map(|name| name.to_string()).collect(),
            always_enabled: Vec::new(),
            locked_disabled: Vec::new(),
            light_supported: light,
            overlay_supported: overlay,
            layout,
        }
    }
}

pub fn supported_games() -> Vec<GameId> {
    vec![
        GameId::Oblivion,
        GameId::SkyrimSe,
        GameId::Fallout4,
        GameId::Starfield,
    ]
}

/// Engine constraints the load order has to respect for one game.
#[derive(Debug, Clone)]
pub struct GameRules {
    pub game: GameId,
    /// Loaded by the engine itself, always enabled and pinned in this order.
    pub primary_plugins: Vec<String>,
    /// Always enabled but free to move.
    pub always_enabled: Vec<String>,
    /// Locked off by the user.
    pub locked_disabled: Vec<String>,
    pub light_supported: bool,
    pub overlay_supported: bool,
    pub layout: HeaderLayout,
}

impl GameRules {
    pub const MASTER_FLAG: u32 = 0x1;

    pub fn light_flag(&self) -> Option<u32> {
        if !self.light_supported {
            return None;
        }
        if self.overlay_supported {
            Some(0x100)
        } else {
            Some(0x200)
        }
    }

    pub fn overlay_flag(&self) -> Option<u32> {
        self.overlay_supported.then_some(0x200)
    }

    pub fn is_primary(&self, name: &str) -> bool {
        contains_name(&self.primary_plugins, name)
    }

    pub fn primary_rank(&self, name: &str) -> Option<usize> {
        self.primary_plugins
            .iter()
            .position(|primary| primary.eq_ignore_ascii_case(name))
    }

    pub fn is_always_enabled(&self, name: &str) -> bool {
        self.is_primary(name) || contains_name(&self.always_enabled, name)
    }

    pub fn is_locked_disabled(&self, name: &str) -> bool {
        !self.is_always_enabled(name) && contains_name(&self.locked_disabled, name)
    }

    /// Adds the game's creation-club list from the game root, if present.
    pub fn with_always_enabled_from(mut self, game_root: &Path) -> Self {
        let Some(file) = self.game.always_enabled_list() else {
            return self;
        };
        let path = game_root.join(file);
        if let Ok(raw) = fs::read_to_string(&path) {
            for line in raw.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if !contains_name(&self.always_enabled, line) {
                    self.always_enabled.push(line.to_string());
                }
            }
        }
        self
    }

    pub fn with_locked_disabled(mut self, names: &[String]) -> Self {
        self.locked_disabled = names.to_vec();
        self
    }
}

fn contains_name(list: &[String], name: &str) -> bool {
    list.iter().any(|entry| entry.eq_ignore_ascii_case(name))
}

pub fn data_dir(game_root: &Path) -> PathBuf {
    game_root.join("Data")
}

pub fn looks_like_game_root(game: GameId, path: &Path) -> bool {
    let data = data_dir(path);
    data.is_dir()
        && game
            .rules()
            .primary_plugins
            .first()
            .map(|main| data.join(main).is_file())
            .unwrap_or(false)
}

pub fn detect_game_root(game: GameId) -> Result<PathBuf> {
    find_game_root(game).with_context(|| format!("locate {} game directory", game.display_name()))
}

fn find_game_root(game: GameId) -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(home) = dirs_home() {
        candidates.push(home.join(".local/share/Steam"));
        candidates.push(home.join(".steam/steam"));
    }

    let mut libraries = Vec::new();
    for base in candidates {
        let vdf = base.join("steamapps/libraryfolders.vdf");
        if vdf.exists() {
            if let Ok(paths) = parse_steam_library_paths(&vdf) {
                libraries.extend(paths);
            }
        }
        libraries.push(base);
    }

    for lib in libraries {
        for folder in game.steam_folders() {
            let candidate = lib.join("steamapps/common").join(folder);
            if looks_like_game_root(game, &candidate) {
                return Some(candidate);
            }
        }
    }

    None
}

fn parse_steam_library_paths(path: &Path) -> Result<Vec<PathBuf>> {
    let raw = fs::read_to_string(path).context("read libraryfolders.vdf")?;
    Ok(library_paths_from_vdf(&raw))
}

fn library_paths_from_vdf(raw: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if !line.contains("\"path\"") {
            continue;
        }

        let parts: Vec<&str> = line.split('"').collect();
        if parts.len() >= 4 {
            let path = parts[3].replace("\\\\", "\\");
            paths.push(PathBuf::from(path));
        }
    }
    paths
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
