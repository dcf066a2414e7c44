use crate::{
    error::EngineResult,
    fsutil::write_atomic_text,
    load_order::SnapshotEntry,
    plugin::name_key,
};
use std::{collections::HashSet, fs, io, path::Path};

pub const PLUGINS_FILE: &str = "plugins.txt";
pub const LOADORDER_FILE: &str = "loadorder.txt";
const HEADER: &str = "# This file was automatically generated by plugsmith.";

/// `*Name.esp` marks an enabled plugin. Comments, blanks and repeats are skipped.
pub fn parse_plugins_txt(raw: &str) -> Vec<SnapshotEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for line in clean_lines(raw) {
        let (enabled, name) = match line.strip_prefix('*') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        if name.is_empty() || !seen.insert(name_key(name)) {
            continue;
        }
        entries.push(SnapshotEntry {
            name: name.to_string(),
            enabled,
        });
    }
    entries
}

pub fn render_plugins_txt(entries: &[SnapshotEntry]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for entry in entries {
        if entry.enabled {
            out.push('*');
        }
        out.push_str(&entry.name);
        out.push('\n');
    }
    out
}

pub fn parse_loadorder_txt(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    clean_lines(raw)
        .filter(|name| seen.insert(name_key(name)))
        .map(|name| name.to_string())
        .collect()
}

pub fn render_loadorder_txt(names: &[String]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for name in names {
        out.push_str(name);
        out.push('\n');
    }
    out
}

fn clean_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// A missing file reads as an empty list.
pub fn read_plugins_txt(path: &Path) -> EngineResult<Vec<SnapshotEntry>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(parse_plugins_txt(&raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

pub fn write_plugins_txt(path: &Path, entries: &[SnapshotEntry]) -> EngineResult<()> {
    write_atomic_text(path, &render_plugins_txt(entries))?;
    Ok(())
}

pub fn read_loadorder_txt(path: &Path) -> EngineResult<Vec<String>> {
    let raw = fs::read_to_string(path)?;
    Ok(parse_loadorder_txt(&raw))
}

pub fn write_loadorder_txt(path: &Path, names: &[String]) -> EngineResult<()> {
    write_atomic_text(path, &render_loadorder_txt(names))?;
    Ok(())
}

/// Writes both files for a profile directory.
pub fn save_profile_order(profile_dir: &Path, snapshot: &[SnapshotEntry]) -> EngineResult<()> {
    write_plugins_txt(&profile_dir.join(PLUGINS_FILE), snapshot)?;
    let names: Vec<String> = snapshot.iter().map(|entry| entry.name.clone()).collect();
    write_loadorder_txt(&profile_dir.join(LOADORDER_FILE), &names)?;
    Ok(())
}
