use crate::{
    library::OriginSet,
    plugin::{Plugin, PluginStore},
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConflictCandidate {
    pub origin_id: String,
    pub origin_name: String,
}

/// A path supplied by more than one origin.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictEntry {
    pub relative_path: String,
    /// Lowest rank first; the last one wins.
    pub candidates: Vec<ConflictCandidate>,
    pub winner_id: String,
    pub winner_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictMode {
    All,
    NearestOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictRelation {
    /// The queried origin overwrites this one.
    Overwrites,
    OverwrittenBy,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConflictingOrigin {
    pub origin_id: String,
    pub origin_name: String,
    pub relation: ConflictRelation,
    pub shared_files: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ConflictSets {
    pub winning: Vec<String>,
    pub losing: Vec<String>,
    pub unique: Vec<String>,
}

#[derive(Debug, Clone)]
struct OriginSlot {
    id: String,
    name: String,
}

#[derive(Debug, Clone)]
struct PathProviders {
    display: String,
    /// Slot indices, ascending rank.
    providers: Vec<usize>,
}

/// Path to providing origins, rebuilt wholesale when the origin set changes.
#[derive(Debug, Clone, Default)]
pub struct ConflictIndex {
    fingerprint: String,
    slots: Vec<OriginSlot>,
    paths: HashMap<String, PathProviders>,
    by_origin: Vec<Vec<String>>,
}

impl ConflictIndex {
    pub fn build(origins: &OriginSet) -> Self {
        let mut index = ConflictIndex {
            fingerprint: origins.fingerprint(),
            ..ConflictIndex::default()
        };

        for (slot, origin) in origins.iter().enumerate() {
            index.slots.push(OriginSlot {
                id: origin.id.clone(),
                name: origin.name.clone(),
            });
            let mut keys = Vec::with_capacity(origin.files.len());
            let mut seen = HashSet::new();
            for file in &origin.files {
                let key = file.relative_path.to_ascii_lowercase();
                if !seen.insert(key.clone()) {
                    continue;
                }
                index
                    .paths
                    .entry(key.clone())
                    .or_insert_with(|| PathProviders {
                        display: file.relative_path.clone(),
                        providers: Vec::new(),
                    })
                    .providers
                    .push(slot);
                keys.push(key);
            }
            keys.sort();
            index.by_origin.push(keys);
        }

        log::debug!(
            "conflict index built: {} path(s) across {} origin(s)",
            index.paths.len(),
            index.slots.len()
        );
        index
    }

    pub fn is_stale(&self, origins: &OriginSet) -> bool {
        self.fingerprint != origins.fingerprint()
    }

    /// Rebuilds when the origin set changed. Returns whether it did.
    pub fn refresh(&mut self, origins: &OriginSet) -> bool {
        if !self.is_stale(origins) {
            return false;
        }
        *self = ConflictIndex::build(origins);
        true
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    fn slot_of(&self, origin_id: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id == origin_id)
    }

    pub fn winner(&self, path: &str) -> Option<&str> {
        self.paths
            .get(&path.to_ascii_lowercase())
            .and_then(|entry| entry.providers.last())
            .map(|slot| self.slots[*slot].id.as_str())
    }

    pub fn origins_for(&self, path: &str) -> Vec<&str> {
        self.paths
            .get(&path.to_ascii_lowercase())
            .map(|entry| {
                entry
                    .providers
                    .iter()
                    .map(|slot| self.slots[*slot].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn winning_conflicts(&self, origin_id: &str) -> Vec<String> {
        self.conflict_sets(origin_id).winning
    }

    pub fn losing_conflicts(&self, origin_id: &str) -> Vec<String> {
        self.conflict_sets(origin_id).losing
    }

    pub fn no_conflicts(&self, origin_id: &str) -> Vec<String> {
        self.conflict_sets(origin_id).unique
    }

    pub fn conflict_sets(&self, origin_id: &str) -> ConflictSets {
        match self.slot_of(origin_id) {
            Some(slot) => self.classify(slot, &HashSet::new()),
            None => ConflictSets::default(),
        }
    }

    fn classify(&self, slot: usize, ignored: &HashSet<usize>) -> ConflictSets {
        let mut sets = ConflictSets::default();
        for key in &self.by_origin[slot] {
            let Some(entry) = self.paths.get(key) else {
                continue;
            };
            let providers: Vec<usize> = entry
                .providers
                .iter()
                .copied()
                .filter(|other| *other == slot || !ignored.contains(other))
                .collect();
            let display = entry.display.clone();
            if providers.len() <= 1 {
                sets.unique.push(display);
            } else if providers.last() == Some(&slot) {
                sets.winning.push(display);
            } else {
                sets.losing.push(display);
            }
        }
        sets
    }

    /// Origins sharing at least one path with `origin_id`, in rank order.
    pub fn conflicting_mods(&self, origin_id: &str, mode: ConflictMode) -> Vec<ConflictingOrigin> {
        let Some(slot) = self.slot_of(origin_id) else {
            return Vec::new();
        };
        let mut shared: HashMap<usize, usize> = HashMap::new();
        for key in &self.by_origin[slot] {
            if let Some(entry) = self.paths.get(key) {
                for other in entry.providers.iter().filter(|other| **other != slot) {
                    *shared.entry(*other).or_default() += 1;
                }
            }
        }

        let mut others: Vec<usize> = shared.keys().copied().collect();
        others.sort_unstable();
        if mode == ConflictMode::NearestOnly {
            let below = others.iter().copied().filter(|other| *other < slot).max();
            let above = others.iter().copied().filter(|other| *other > slot).min();
            others = below.into_iter().chain(above).collect();
        }

        others
            .into_iter()
            .map(|other| ConflictingOrigin {
                origin_id: self.slots[other].id.clone(),
                origin_name: self.slots[other].name.clone(),
                relation: if other < slot {
                    ConflictRelation::Overwrites
                } else {
                    ConflictRelation::OverwrittenBy
                },
                shared_files: shared.get(&other).copied().unwrap_or_default(),
            })
            .collect()
    }

    pub fn entries(&self) -> Vec<ConflictEntry> {
        let mut entries: Vec<ConflictEntry> = self
            .paths
            .values()
            .filter(|entry| entry.providers.len() > 1)
            .filter_map(|entry| {
                let winner = &self.slots[*entry.providers.last()?];
                Some(ConflictEntry {
                    relative_path: entry.display.clone(),
                    candidates: entry
                        .providers
                        .iter()
                        .map(|slot| ConflictCandidate {
                            origin_id: self.slots[*slot].id.clone(),
                            origin_name: self.slots[*slot].name.clone(),
                        })
                        .collect(),
                    winner_id: winner.id.clone(),
                    winner_name: winner.name.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            a.relative_path
                .to_ascii_lowercase()
                .cmp(&b.relative_path.to_ascii_lowercase())
        });
        entries
    }

    /// Conflict sets of the origin that supplies `plugin`.
    ///
    /// With `ignore_master_conflicts`, origins whose plugins are all masters of
    /// `plugin` do not count as conflicting.
    pub fn plugin_conflicts(
        &self,
        plugin: &Plugin,
        store: &PluginStore,
        ignore_master_conflicts: bool,
    ) -> ConflictSets {
        let Some(slot) = self.slot_of(&plugin.origin) else {
            return ConflictSets::default();
        };
        let mut ignored = HashSet::new();
        if ignore_master_conflicts {
            for (other, origin) in self.slots.iter().enumerate() {
                if other == slot {
                    continue;
                }
                let mut supplied = store.by_origin(&origin.id).peekable();
                if supplied.peek().is_none() {
                    continue;
                }
                if supplied.all(|candidate| plugin.has_master(&candidate.name)) {
                    ignored.insert(other);
                }
            }
        }
        self.classify(slot, &ignored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{tests::origin, OriginSet};
    use crate::plugin::tests::plugin;
    use pretty_assertions::assert_eq;

    fn sample() -> OriginSet {
        OriginSet::new(vec![
            origin("base", 1, false, &["Meshes/a.nif", "b.dds", "only-base.txt"]),
            origin("mid", 2, false, &["meshes/A.nif", "c.dds"]),
            origin("top", 3, false, &["meshes/a.nif", "b.dds", "c.dds", "only-top.txt"]),
            origin("archive", 99, true, &["b.dds", "d.dds"]),
        ])
    }

    #[test]
    fn every_path_has_one_winner() {
        let index = ConflictIndex::build(&sample());
        assert_eq!(index.path_count(), 6);
        assert_eq!(index.winner("MESHES/A.NIF"), Some("top"));
        assert_eq!(index.winner("b.dds"), Some("top"));
        assert_eq!(index.winner("d.dds"), Some("archive"));
        assert_eq!(index.origins_for("b.dds"), vec!["archive", "base", "top"]);
        assert_eq!(index.winner("missing.txt"), None);
    }

    #[test]
    fn conflict_sets_partition_origin_files() {
        let index = ConflictIndex::build(&sample());
        let base = index.conflict_sets("base");
        assert_eq!(base.winning, Vec::<String>::new());
        assert_eq!(base.losing, vec!["b.dds", "Meshes/a.nif"]);
        assert_eq!(base.unique, vec!["only-base.txt"]);

        let top = index.conflict_sets("top");
        assert_eq!(top.winning.len() + top.losing.len() + top.unique.len(), 4);
        assert_eq!(top.unique, vec!["only-top.txt"]);

        let archive = index.conflict_sets("archive");
        assert_eq!(archive.losing, vec!["b.dds"]);
        assert_eq!(archive.unique, vec!["d.dds"]);
        assert_eq!(index.winning_conflicts("archive"), Vec::<String>::new());
        assert_eq!(index.losing_conflicts("archive").len(), index.conflict_sets("archive").losing.len());
        assert_eq!(index.no_conflicts("nope"), Vec::<String>::new());
    }

    #[test]
    fn conflicting_mods_all_and_nearest() {
        let index = ConflictIndex::build(&sample());
        let all: Vec<(String, ConflictRelation)> = index
            .conflicting_mods("mid", ConflictMode::All)
            .into_iter()
            .map(|item| (item.origin_id, item.relation))
            .collect();
        assert_eq!(
            all,
            vec![
                ("base".to_string(), ConflictRelation::Overwrites),
                ("top".to_string(), ConflictRelation::OverwrittenBy),
            ]
        );

        let nearest: Vec<String> = index
            .conflicting_mods("top", ConflictMode::NearestOnly)
            .into_iter()
            .map(|item| item.origin_id)
            .collect();
        assert_eq!(nearest, vec!["mid"]);

        let all_top = index.conflicting_mods("top", ConflictMode::All);
        assert_eq!(all_top.len(), 3);
        assert_eq!(all_top[0].origin_id, "archive");
        assert_eq!(all_top[2].shared_files, 2);
    }

    #[test]
    fn entries_list_only_shared_paths() {
        let index = ConflictIndex::build(&sample());
        let entries = index.entries();
        let paths: Vec<&str> = entries
            .iter()
            .map(|entry| entry.relative_path.as_str())
            .collect();
        assert_eq!(paths, vec!["b.dds", "c.dds", "Meshes/a.nif"]);
        assert_eq!(entries[0].winner_id, "top");
        assert_eq!(entries[0].candidates.len(), 3);
    }

    #[test]
    fn refresh_only_rebuilds_on_change() {
        let set = sample();
        let mut index = ConflictIndex::build(&set);
        assert!(!index.refresh(&set));
        let changed = OriginSet::new(vec![origin("base", 1, false, &["x"])]);
        assert!(index.is_stale(&changed));
        assert!(index.refresh(&changed));
        assert_eq!(index.winner("x"), Some("base"));
    }

    #[test]
    fn master_origins_can_be_ignored_for_plugin_conflicts() {
        let set = OriginSet::new(vec![
            origin("base", 1, false, &["Base.esm", "shared.nif"]),
            origin("patch", 2, false, &["Patch.esp", "shared.nif"]),
        ]);
        let index = ConflictIndex::build(&set);
        let mut base = plugin("Base.esm");
        base.origin = "base".to_string();
        let mut patch = plugin("Patch.esp");
        patch.origin = "patch".to_string();
        patch.masters.push("Base.esm".to_string());
        let store = PluginStore::from_plugins(vec![base, patch.clone()]);

        let strict = index.plugin_conflicts(&patch, &store, false);
        assert_eq!(strict.winning, vec!["shared.nif"]);
        let relaxed = index.plugin_conflicts(&patch, &store, true);
        assert_eq!(relaxed.winning, Vec::<String>::new());
        assert_eq!(relaxed.unique, vec!["Patch.esp", "shared.nif"]);
    }
}
