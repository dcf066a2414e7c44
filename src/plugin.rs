use crate::{
    error::{EngineError, EngineResult},
    game::GameRules,
};
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

const HEADER_TYPE: &[u8; 4] = b"TES4";
const MAX_HEADER_DATA: usize = 16 * 1024 * 1024;

pub fn is_plugin_file(name: &str) -> bool {
    matches!(extension(name).as_deref(), Some("esm" | "esp" | "esl"))
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Lowercased lookup key; plugin names compare case-insensitively.
pub fn name_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PluginFlags {
    pub master: bool,
    pub light: bool,
    pub overlay: bool,
    /// Header declares zero records.
    pub dummy: bool,
    /// Loaded by the engine in a fixed slot.
    pub pinned: bool,
    pub force_enabled: bool,
    pub force_disabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Plugin {
    pub name: String,
    pub origin: String,
    pub path: PathBuf,
    pub flags: PluginFlags,
    pub masters: Vec<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    /// Masters absent from the loaded set.
    pub missing_masters: Vec<String>,
}

impl Plugin {
    pub fn is_master_file(&self) -> bool {
        self.flags.master
    }

    pub fn is_light(&self) -> bool {
        self.flags.light
    }

    pub fn is_always_enabled(&self) -> bool {
        self.flags.pinned || self.flags.force_enabled
    }

    pub fn can_be_toggled(&self) -> bool {
        !self.is_always_enabled() && !self.flags.force_disabled
    }

    pub fn has_master(&self, name: &str) -> bool {
        self.masters
            .iter()
            .any(|master| master.eq_ignore_ascii_case(name))
    }

    /// Whether the engine requires `self` to come after `other`.
    pub fn must_load_after(&self, other: &Plugin) -> bool {
        if self.has_master(&other.name) {
            return true;
        }
        if other.flags.pinned && !self.flags.pinned {
            return true;
        }
        other.is_master_file() && !self.is_master_file()
    }
}

/// Where a plugin file was found.
#[derive(Debug, Clone)]
pub struct PluginSource {
    pub name: String,
    pub origin: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginHeader {
    pub flags: u32,
    pub record_count: Option<u32>,
    pub masters: Vec<String>,
    pub author: Option<String>,
    pub description: Option<String>,
}

pub fn read_header(path: &Path, rules: &GameRules) -> EngineResult<PluginHeader> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let parse_err = |reason: String| EngineError::Parse {
        name: name.clone(),
        reason,
    };

    let mut file = File::open(path).map_err(|err| parse_err(err.to_string()))?;
    let header_len = rules.layout.record_header_len();
    let mut record = vec![0u8; header_len];
    file.read_exact(&mut record)
        .map_err(|_| parse_err("file is shorter than a record header".to_string()))?;
    if &record[0..4] != HEADER_TYPE {
        return Err(parse_err(format!(
            "expected TES4 header, found {:?}",
            String::from_utf8_lossy(&record[0..4])
        )));
    }
    let data_len = read_u32(&record, 4) as usize;
    if data_len > MAX_HEADER_DATA {
        return Err(parse_err(format!("header data length {data_len} is implausible")));
    }
    let flags = read_u32(&record, 8);
    let mut data = vec![0u8; data_len];
    file.read_exact(&mut data)
        .map_err(|_| parse_err("header data is truncated".to_string()))?;

    parse_subrecords(flags, &data).map_err(parse_err)
}

fn parse_subrecords(flags: u32, data: &[u8]) -> Result<PluginHeader, String> {
    let mut header = PluginHeader {
        flags,
        ..PluginHeader::default()
    };
    let mut offset = 0usize;
    let mut oversize: Option<usize> = None;
    while offset < data.len() {
        if offset + 6 > data.len() {
            return Err(format!("subrecord header truncated at offset {offset}"));
        }
        let kind = &data[offset..offset + 4];
        let mut len = u16::from_le_bytes([data[offset + 4], data[offset + 5]]) as usize;
        if let Some(size) = oversize.take() {
            len = size;
        }
        let start = offset + 6;
        let end = start + len;
        if end > data.len() {
            return Err(format!(
                "subrecord {} overruns header data",
                String::from_utf8_lossy(kind)
            ));
        }
        let body = &data[start..end];
        match kind {
            b"XXXX" => {
                if body.len() < 4 {
                    return Err("XXXX subrecord is too short".to_string());
                }
                oversize = Some(read_u32(body, 0) as usize);
            }
            b"HEDR" => {
                if body.len() >= 8 {
                    header.record_count = Some(read_u32(body, 4));
                }
            }
            b"MAST" => header.masters.push(zstring(body)),
            b"CNAM" => header.author = Some(zstring(body)).filter(|value| !value.is_empty()),
            b"SNAM" => {
                header.description = Some(zstring(body)).filter(|value| !value.is_empty())
            }
            _ => {}
        }
        offset = end;
    }
    Ok(header)
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn zstring(body: &[u8]) -> String {
    let end = body.iter().position(|b| *b == 0).unwrap_or(body.len());
    String::from_utf8_lossy(&body[..end]).trim().to_string()
}

pub fn flags_from_header(name: &str, header: &PluginHeader, rules: &GameRules) -> PluginFlags {
    let ext = extension(name);
    let is_esm = ext.as_deref() == Some("esm");
    let is_esl = rules.light_supported && ext.as_deref() == Some("esl");
    let light_bit = rules
        .light_flag()
        .map(|bit| header.flags & bit != 0)
        .unwrap_or(false);
    let overlay = rules
        .overlay_flag()
        .map(|bit| header.flags & bit != 0)
        .unwrap_or(false);

    PluginFlags {
        master: header.flags & GameRules::MASTER_FLAG != 0 || is_esm || is_esl,
        light: light_bit || is_esl,
        overlay,
        dummy: header.record_count == Some(0),
        pinned: rules.is_primary(name),
        force_enabled: rules.is_always_enabled(name),
        force_disabled: rules.is_locked_disabled(name),
    }
}

#[derive(Debug)]
pub struct ParseFailure {
    pub name: String,
    pub origin: String,
    pub error: EngineError,
}

#[derive(Debug, Clone, Default)]
pub struct PluginStore {
    plugins: Vec<Plugin>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct StoreLoad {
    pub store: PluginStore,
    pub failures: Vec<ParseFailure>,
}

impl PluginStore {
    /// Parses every source; unreadable headers are reported, not fatal.
    pub fn load<I>(sources: I, rules: &GameRules) -> StoreLoad
    where
        I: IntoIterator<Item = PluginSource>,
    {
        let mut store = PluginStore::default();
        let mut failures = Vec::new();

        for source in sources {
            if store.index.contains_key(&name_key(&source.name)) {
                continue;
            }
            match read_header(&source.path, rules) {
                Ok(header) => {
                    let flags = flags_from_header(&source.name, &header, rules);
                    store.insert(Plugin {
                        name: source.name,
                        origin: source.origin,
                        path: source.path,
                        flags,
                        masters: header.masters,
                        author: header.author,
                        description: header.description,
                        missing_masters: Vec::new(),
                    });
                }
                Err(error) => {
                    log::warn!("skipping plugin {}: {error}", source.name);
                    failures.push(ParseFailure {
                        name: source.name,
                        origin: source.origin,
                        error,
                    });
                }
            }
        }

        store.refresh_missing_masters();
        let missing = store
            .plugins
            .iter()
            .filter(|plugin| !plugin.missing_masters.is_empty())
            .count();
        log::info!(
            "loaded {} plugin(s), {} failed, {} with missing masters",
            store.plugins.len(),
            failures.len(),
            missing
        );
        StoreLoad { store, failures }
    }

    pub fn from_plugins(plugins: Vec<Plugin>) -> Self {
        let mut store = PluginStore::default();
        for plugin in plugins {
            store.insert(plugin);
        }
        store.refresh_missing_masters();
        store
    }

    fn insert(&mut self, plugin: Plugin) {
        self.index.insert(name_key(&plugin.name), self.plugins.len());
        self.plugins.push(plugin);
    }

    fn refresh_missing_masters(&mut self) {
        let known: HashSet<String> = self.index.keys().cloned().collect();
        for plugin in &mut self.plugins {
            plugin.missing_masters = plugin
                .masters
                .iter()
                .filter(|master| !known.contains(&name_key(master)))
                .cloned()
                .collect();
        }
    }

    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.index
            .get(&name_key(name))
            .and_then(|idx| self.plugins.get(*idx))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name_key(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugins supplied by one origin.
    pub fn by_origin<'a>(&'a self, origin: &'a str) -> impl Iterator<Item = &'a Plugin> + 'a {
        self.plugins
            .iter()
            .filter(move |plugin| plugin.origin == origin)
    }
}
