use crate::{
    error::{EngineError, EngineResult},
    game::GameRules,
    plugin::{name_key, Plugin, PluginFlags, PluginStore},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    fmt,
};

/// Slot the engine assigns an enabled plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModIndex {
    Inactive,
    Regular { index: u32 },
    Light { page: u32, slot: u32 },
    Overlay,
}

impl fmt::Display for ModIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModIndex::Inactive => Ok(()),
            ModIndex::Regular { index } => write!(f, "{index:02X}"),
            ModIndex::Light { page, slot } => write!(f, "{page:02X}:{slot:03X}"),
            ModIndex::Overlay => f.write_str("XX"),
        }
    }
}

/// First page of the light plugin index space.
pub const LIGHT_PAGE_BASE: u32 = 0xFE;
const LIGHT_PAGE_SIZE: u32 = 0x1000;

#[derive(Debug, Clone, Serialize)]
pub struct OrderEntry {
    pub name: String,
    pub origin: String,
    pub enabled: bool,
    pub flags: PluginFlags,
    pub masters: Vec<String>,
    pub mod_index: ModIndex,
    /// Position among enabled plugins.
    pub load_order_index: Option<usize>,
    /// Masters that are not enabled.
    pub missing_masters: Vec<String>,
}

impl OrderEntry {
    fn from_plugin(plugin: &Plugin, enabled: bool) -> Self {
        Self {
            name: plugin.name.clone(),
            origin: plugin.origin.clone(),
            enabled,
            flags: plugin.flags,
            masters: plugin.masters.clone(),
            mod_index: ModIndex::Inactive,
            load_order_index: None,
            missing_masters: Vec::new(),
        }
    }

    pub fn is_master_file(&self) -> bool {
        self.flags.master
    }

    pub fn is_always_enabled(&self) -> bool {
        self.flags.pinned || self.flags.force_enabled
    }

    pub fn can_be_toggled(&self) -> bool {
        !self.is_always_enabled() && !self.flags.force_disabled
    }

    pub fn kind_label(&self) -> &'static str {
        if self.flags.light {
            "esl"
        } else if self.flags.overlay {
            "overlay"
        } else if self.flags.master {
            "esm"
        } else {
            "esp"
        }
    }

    fn forced_state(&self) -> Option<bool> {
        if self.is_always_enabled() {
            Some(true)
        } else if self.flags.force_disabled {
            Some(false)
        } else {
            None
        }
    }
}

/// A `(plugin, enabled)` pair as persisted and backed up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A master is placed after the plugin that needs it.
    MasterAfterDependent,
    /// A non-master plugin is placed ahead of a master-type plugin.
    NonMasterBeforeMaster,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterOrderViolation {
    pub plugin: String,
    pub other: String,
    pub kind: ViolationKind,
}

impl fmt::Display for MasterOrderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::MasterAfterDependent => {
                write!(f, "{} loads before its master {}", self.plugin, self.other)
            }
            ViolationKind::NonMasterBeforeMaster => {
                write!(f, "{} is a master but loads after {}", self.plugin, self.other)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    pub total: usize,
    pub active: usize,
    pub active_masters: usize,
    pub active_regular: usize,
    pub active_light: usize,
    pub active_overlay: usize,
}

/// Held by whoever is running a sort. Not clonable.
#[derive(Debug, PartialEq, Eq)]
pub struct SortToken(u64);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub moved: usize,
    pub warnings: Vec<String>,
}

/// Canonical plugin order and enabled state.
#[derive(Debug, Clone, Default)]
pub struct LoadOrder {
    entries: Vec<OrderEntry>,
    positions: HashMap<String, usize>,
    lock: Option<u64>,
    next_token: u64,
}

impl LoadOrder {
    /// Persisted entries first, then new plugins, then primary plugins on top.
    pub fn from_store(store: &PluginStore, persisted: &[SnapshotEntry], rules: &GameRules) -> Self {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(store.len());
        for item in persisted {
            let Some(plugin) = store.get(&item.name) else {
                log::debug!("dropping unknown plugin {} from saved order", item.name);
                continue;
            };
            if seen.insert(name_key(&plugin.name)) {
                entries.push(OrderEntry::from_plugin(plugin, item.enabled));
            }
        }
        let mut added = 0usize;
        for plugin in store.iter() {
            if !seen.insert(name_key(&plugin.name)) {
                continue;
            }
            let entry = OrderEntry::from_plugin(plugin, false);
            if plugin.is_master_file() {
                // New masters go right after the last plugin they must follow.
                let at = entries
                    .iter()
                    .rposition(|existing: &OrderEntry| {
                        store
                            .get(&existing.name)
                            .is_some_and(|other| plugin.must_load_after(other))
                    })
                    .map_or(0, |idx| idx + 1);
                entries.insert(at, entry);
            } else {
                entries.push(entry);
            }
            added += 1;
        }
        if added > 0 {
            log::info!("{added} new plugin(s) added to the load order");
        }

        let (mut pinned, rest): (Vec<OrderEntry>, Vec<OrderEntry>) =
            entries.into_iter().partition(|entry| entry.flags.pinned);
        pinned.sort_by_key(|entry| rules.primary_rank(&entry.name).unwrap_or(usize::MAX));
        pinned.extend(rest);

        let mut order = LoadOrder {
            entries: pinned,
            ..LoadOrder::default()
        };
        order.apply_forced_states();
        order.recompute();
        order
    }

    fn apply_forced_states(&mut self) {
        for entry in &mut self.entries {
            if let Some(forced) = entry.forced_state() {
                entry.enabled = forced;
            }
        }
    }

    /// Derived fields are refreshed after every mutation.
    fn recompute(&mut self) {
        self.positions = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (name_key(&entry.name), idx))
            .collect();

        let mut regular = 0u32;
        let mut light = 0u32;
        let mut load_index = 0usize;
        for entry in &mut self.entries {
            if !entry.enabled {
                entry.mod_index = ModIndex::Inactive;
                entry.load_order_index = None;
                continue;
            }
            entry.load_order_index = Some(load_index);
            load_index += 1;
            entry.mod_index = if entry.flags.light {
                let index = ModIndex::Light {
                    page: LIGHT_PAGE_BASE + light / LIGHT_PAGE_SIZE,
                    slot: light % LIGHT_PAGE_SIZE,
                };
                light += 1;
                index
            } else if entry.flags.overlay {
                ModIndex::Overlay
            } else {
                let index = ModIndex::Regular { index: regular };
                regular += 1;
                index
            };
        }

        let enabled: HashSet<String> = self
            .entries
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| name_key(&entry.name))
            .collect();
        for entry in &mut self.entries {
            entry.missing_masters = entry
                .masters
                .iter()
                .filter(|master| !enabled.contains(&name_key(master)))
                .cloned()
                .collect();
        }
    }

    pub fn entries(&self) -> &[OrderEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(&name_key(name)).copied()
    }

    pub fn get(&self, name: &str) -> Option<&OrderEntry> {
        self.position(name).map(|idx| &self.entries[idx])
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.name.clone()).collect()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    fn ensure_unlocked(&self) -> EngineResult<()> {
        if self.lock.is_some() {
            return Err(EngineError::OrderLocked);
        }
        Ok(())
    }

    fn require(&self, name: &str) -> EngineResult<usize> {
        self.position(name)
            .ok_or_else(|| EngineError::UnknownPlugin(name.to_string()))
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> EngineResult<()> {
        self.ensure_unlocked()?;
        let idx = self.require(name)?;
        let entry = &mut self.entries[idx];
        if !entry.can_be_toggled() {
            return Err(EngineError::ForcedState(entry.name.clone()));
        }
        if entry.enabled != enabled {
            entry.enabled = enabled;
            log::debug!(
                "{} {}",
                if enabled { "enabled" } else { "disabled" },
                entry.name
            );
            self.recompute();
        }
        Ok(())
    }

    /// Toggles every entry matching `predicate`, or none of them.
    pub fn bulk_set_enabled<F>(&mut self, predicate: F, enabled: bool) -> EngineResult<usize>
    where
        F: Fn(&OrderEntry) -> bool,
    {
        self.ensure_unlocked()?;
        let mut staged: Vec<bool> = self.entries.iter().map(|entry| entry.enabled).collect();
        let mut changed = 0usize;
        for (idx, entry) in self.entries.iter().enumerate() {
            if !predicate(entry) {
                continue;
            }
            if !entry.can_be_toggled() {
                log::warn!(
                    "bulk toggle rejected by {}, {changed} pending change(s) discarded",
                    entry.name
                );
                return Err(EngineError::ForcedState(entry.name.clone()));
            }
            if staged[idx] != enabled {
                staged[idx] = enabled;
                changed += 1;
            }
        }
        for (entry, state) in self.entries.iter_mut().zip(staged) {
            entry.enabled = state;
        }
        if changed > 0 {
            self.recompute();
        }
        Ok(changed)
    }

    fn check_move(&self, from: usize, to: usize) -> EngineResult<()> {
        let entry = &self.entries[from];
        if entry.flags.pinned {
            return Err(EngineError::ForcedPosition {
                plugin: entry.name.clone(),
                blocker: entry.name.clone(),
            });
        }
        let (low, high) = if from < to { (from, to) } else { (to, from) };
        if let Some(blocker) = self.entries[low..=high]
            .iter()
            .find(|other| other.flags.pinned)
        {
            return Err(EngineError::ForcedPosition {
                plugin: entry.name.clone(),
                blocker: blocker.name.clone(),
            });
        }
        Ok(())
    }

    pub fn move_to(&mut self, name: &str, position: usize) -> EngineResult<()> {
        self.ensure_unlocked()?;
        let from = self.require(name)?;
        if position >= self.entries.len() {
            return Err(EngineError::PositionOutOfRange {
                position,
                len: self.entries.len(),
            });
        }
        self.check_move(from, position)?;
        if from == position {
            return Ok(());
        }
        let entry = self.entries.remove(from);
        log::debug!("moved {} from {from} to {position}", entry.name);
        self.entries.insert(position, entry);
        self.recompute();
        Ok(())
    }

    /// Moves to an absolute priority, clamped to the list.
    pub fn set_priority(&mut self, name: &str, priority: i64) -> EngineResult<()> {
        if self.entries.is_empty() {
            return Err(EngineError::UnknownPlugin(name.to_string()));
        }
        let max = self.entries.len() as i64 - 1;
        self.move_to(name, priority.clamp(0, max) as usize)
    }

    pub fn shift_priority(&mut self, name: &str, offset: i64) -> EngineResult<()> {
        let current = self.require(name)? as i64;
        self.set_priority(name, current + offset)
    }

    /// Moves just below the last pinned plugin.
    pub fn send_to_top(&mut self, name: &str) -> EngineResult<()> {
        let from = self.require(name)?;
        let target = self.entries[..from]
            .iter()
            .rposition(|entry| entry.flags.pinned)
            .map(|idx| idx + 1)
            .unwrap_or(0);
        self.move_to(name, target)
    }

    pub fn send_to_bottom(&mut self, name: &str) -> EngineResult<()> {
        let target = self.entries.len().saturating_sub(1);
        self.move_to(name, target)
    }

    pub fn validate_master_order(&self) -> Vec<MasterOrderViolation> {
        let mut violations = Vec::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            for master in &entry.masters {
                if let Some(pos) = self.position(master) {
                    if pos > idx {
                        violations.push(MasterOrderViolation {
                            plugin: entry.name.clone(),
                            other: self.entries[pos].name.clone(),
                            kind: ViolationKind::MasterAfterDependent,
                        });
                    }
                }
            }
        }

        let mut first_regular: Option<&OrderEntry> = None;
        for entry in &self.entries {
            if entry.is_master_file() {
                if let Some(regular) = first_regular {
                    violations.push(MasterOrderViolation {
                        plugin: entry.name.clone(),
                        other: regular.name.clone(),
                        kind: ViolationKind::NonMasterBeforeMaster,
                    });
                }
            } else if first_regular.is_none() {
                first_regular = Some(entry);
            }
        }
        violations
    }

    pub fn missing_masters(&self) -> Vec<(&str, &[String])> {
        self.entries
            .iter()
            .filter(|entry| entry.enabled && !entry.missing_masters.is_empty())
            .map(|entry| (entry.name.as_str(), entry.missing_masters.as_slice()))
            .collect()
    }

    pub fn stats(&self) -> OrderStats {
        let mut stats = OrderStats {
            total: self.entries.len(),
            ..OrderStats::default()
        };
        for entry in self.entries.iter().filter(|entry| entry.enabled) {
            stats.active += 1;
            if entry.flags.light {
                stats.active_light += 1;
            } else if entry.flags.overlay {
                stats.active_overlay += 1;
            } else if entry.flags.master {
                stats.active_masters += 1;
            } else {
                stats.active_regular += 1;
            }
        }
        stats
    }

    pub fn snapshot(&self) -> Vec<SnapshotEntry> {
        self.entries
            .iter()
            .map(|entry| SnapshotEntry {
                name: entry.name.clone(),
                enabled: entry.enabled,
            })
            .collect()
    }

    /// Replaces order and enabled state wholesale. Returns warnings.
    pub fn restore_snapshot(&mut self, snapshot: &[SnapshotEntry]) -> EngineResult<Vec<String>> {
        self.ensure_unlocked()?;
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();
        let mut restored = Vec::with_capacity(self.entries.len());
        for item in snapshot {
            match self.position(&item.name) {
                Some(idx) if seen.insert(idx) => {
                    let mut entry = self.entries[idx].clone();
                    entry.enabled = item.enabled;
                    restored.push(entry);
                }
                Some(_) => {}
                None => warnings.push(format!("{} is no longer installed", item.name)),
            }
        }
        for (idx, entry) in self.entries.iter().enumerate() {
            if !seen.contains(&idx) {
                warnings.push(format!("{} was not in the snapshot, kept at the end", entry.name));
                restored.push(entry.clone());
            }
        }
        let (mut pinned, rest): (Vec<OrderEntry>, Vec<OrderEntry>) =
            restored.into_iter().partition(|entry| entry.flags.pinned);
        pinned.sort_by_key(|entry| self.position(&entry.name));
        pinned.extend(rest);

        self.entries = pinned;
        self.apply_forced_states();
        self.recompute();
        for warning in &warnings {
            log::warn!("{warning}");
        }
        Ok(warnings)
    }

    pub fn lock_for_sort(&mut self) -> EngineResult<SortToken> {
        self.ensure_unlocked()?;
        self.next_token += 1;
        self.lock = Some(self.next_token);
        Ok(SortToken(self.next_token))
    }

    pub fn release(&mut self, token: SortToken) -> bool {
        if self.lock == Some(token.0) {
            self.lock = None;
            true
        } else {
            false
        }
    }

    /// Applies a sorted proposal and ends the lock, all or nothing.
    pub fn commit_sorted(
        &mut self,
        token: SortToken,
        proposal: &[String],
    ) -> EngineResult<CommitOutcome> {
        if self.lock != Some(token.0) {
            return Err(EngineError::OrderLocked);
        }
        self.lock = None;

        let mut warnings = Vec::new();
        let mut seen = HashSet::new();
        let mut target: Vec<usize> = Vec::with_capacity(self.entries.len());
        for name in proposal {
            match self.position(name) {
                Some(idx) if seen.insert(idx) => target.push(idx),
                Some(_) => {}
                None => warnings.push(format!("sorted order names unknown plugin {name}")),
            }
        }
        for idx in 0..self.entries.len() {
            if !seen.contains(&idx) {
                target.push(idx);
            }
        }

        for (position, idx) in target.iter().enumerate() {
            let entry = &self.entries[*idx];
            if entry.flags.pinned && position != *idx {
                let blocker = self.entries[target[*idx]].name.clone();
                return Err(EngineError::ForcedPosition {
                    plugin: entry.name.clone(),
                    blocker,
                });
            }
        }

        let mut working = self.entries.clone();
        let mut moved = 0usize;
        for (position, idx) in target.iter().enumerate() {
            let name = &self.entries[*idx].name;
            let from = working[position..]
                .iter()
                .position(|entry| &entry.name == name)
                .map(|offset| offset + position);
            if let Some(from) = from.filter(|from| *from != position) {
                let entry = working.remove(from);
                working.insert(position, entry);
                moved += 1;
            }
        }

        self.entries = working;
        self.recompute();
        for warning in &warnings {
            log::warn!("{warning}");
        }
        log::info!("sorted order applied, {moved} plugin(s) moved");
        Ok(CommitOutcome { moved, warnings })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::GameId;
    use crate::plugin::tests::plugin;
    use pretty_assertions::assert_eq;

    pub(crate) fn order_of(plugins: Vec<Plugin>, enabled: &[&str]) -> LoadOrder {
        let persisted: Vec<SnapshotEntry> = plugins
            .iter()
            .map(|plugin| SnapshotEntry {
                name: plugin.name.clone(),
                enabled: enabled.contains(&plugin.name.as_str()),
            })
            .collect();
        let store = PluginStore::from_plugins(plugins);
        LoadOrder::from_store(&store, &persisted, &GameId::SkyrimSe.rules())
    }

    fn names(order: &LoadOrder) -> Vec<String> {
        order.names()
    }

    fn abc() -> LoadOrder {
        let mut a = plugin("A.esm");
        a.flags.master = true;
        a.flags.pinned = true;
        a.flags.force_enabled = true;
        let mut b = plugin("B.esp");
        b.masters.push("A.esm".to_string());
        let c = plugin("C.esp");
        order_of(vec![a, b, c], &["B.esp", "C.esp"])
    }

    fn plain(count: usize) -> Vec<Plugin> {
        (0..count).map(|idx| plugin(&format!("P{idx}.esp"))).collect()
    }

    #[test]
    fn pinned_plugin_blocks_moves_past_it() {
        let mut order = abc();
        let before = names(&order);
        let err = order.move_to("C.esp", 0).unwrap_err();
        assert!(matches!(err, EngineError::ForcedPosition { ref blocker, .. } if blocker == "A.esm"));
        assert_eq!(names(&order), before);

        order.move_to("B.esp", 2).unwrap();
        assert_eq!(names(&order), vec!["A.esm", "C.esp", "B.esp"]);
    }

    #[test]
    fn pinned_and_forced_plugins_are_immovable() {
        let mut order = abc();
        let before = order.snapshot();
        assert!(matches!(
            order.move_to("A.esm", 0),
            Err(EngineError::ForcedPosition { .. })
        ));
        assert!(matches!(
            order.set_enabled("a.esm", false),
            Err(EngineError::ForcedState(_))
        ));
        assert!(matches!(
            order.send_to_bottom("A.esm"),
            Err(EngineError::ForcedPosition { .. })
        ));
        assert_eq!(order.snapshot(), before);
    }

    #[test]
    fn move_is_idempotent_and_reversible() {
        let mut order = order_of(plain(6), &[]);
        let original = names(&order);
        order.move_to("P2.esp", 2).unwrap();
        assert_eq!(names(&order), original);

        order.move_to("P2.esp", 5).unwrap();
        order.move_to("P2.esp", 0).unwrap();
        order.move_to("P2.esp", 2).unwrap();
        assert_eq!(names(&order), original);

        assert!(matches!(
            order.move_to("P2.esp", 6),
            Err(EngineError::PositionOutOfRange { position: 6, len: 6 })
        ));
        assert!(matches!(
            order.move_to("nope.esp", 1),
            Err(EngineError::UnknownPlugin(_))
        ));
    }

    #[test]
    fn priority_helpers_translate_to_moves() {
        let mut order = abc();
        order.set_priority("C.esp", -4).unwrap_err();
        order.set_priority("C.esp", 99).unwrap();
        assert_eq!(names(&order), vec!["A.esm", "B.esp", "C.esp"]);
        order.shift_priority("C.esp", -1).unwrap();
        assert_eq!(names(&order), vec!["A.esm", "C.esp", "B.esp"]);
        order.send_to_bottom("C.esp").unwrap();
        order.send_to_top("C.esp").unwrap();
        assert_eq!(names(&order), vec!["A.esm", "C.esp", "B.esp"]);
    }

    #[test]
    fn bulk_toggle_is_atomic() {
        let mut plugins = plain(10);
        plugins[6].flags.force_disabled = true;
        let mut order = order_of(plugins, &[]);
        let before = order.snapshot();

        let err = order.bulk_set_enabled(|_| true, true).unwrap_err();
        assert!(matches!(err, EngineError::ForcedState(ref name) if name == "P6.esp"));
        assert_eq!(order.snapshot(), before);

        let changed = order
            .bulk_set_enabled(|entry| entry.can_be_toggled(), true)
            .unwrap();
        assert_eq!(changed, 9);
        assert_eq!(order.stats().active, 9);
    }

    #[test]
    fn mod_indices_split_regular_and_light() {
        let mut base = plugin("Base.esm");
        base.flags.master = true;
        let mut small = plugin("Small.esl");
        small.flags.light = true;
        small.flags.master = true;
        let mut small2 = plugin("Small2.esp");
        small2.flags.light = true;
        let off = plugin("Off.esp");
        let patch = plugin("Patch.esp");
        let mut order = order_of(
            vec![base, small, off, small2, patch],
            &["Base.esm", "Small.esl", "Small2.esp", "Patch.esp"],
        );

        let indices: Vec<String> = order
            .entries()
            .iter()
            .map(|entry| entry.mod_index.to_string())
            .collect();
        assert_eq!(indices, vec!["00", "FE:000", "", "FE:001", "01"]);
        assert_eq!(order.get("Patch.esp").unwrap().load_order_index, Some(3));

        order.set_enabled("Off.esp", true).unwrap();
        assert_eq!(order.get("Off.esp").unwrap().mod_index.to_string(), "01");
        assert_eq!(order.get("Patch.esp").unwrap().mod_index.to_string(), "02");

        let stats = order.stats();
        assert_eq!(stats.active_masters, 1);
        assert_eq!(stats.active_regular, 2);
        assert_eq!(stats.active_light, 2);
    }

    #[test]
    fn light_index_space_rolls_into_next_page() {
        let index = ModIndex::Light {
            page: LIGHT_PAGE_BASE + 4096 / LIGHT_PAGE_SIZE,
            slot: 4096 % LIGHT_PAGE_SIZE,
        };
        assert_eq!(index.to_string(), "FF:000");
        assert_eq!(ModIndex::Overlay.to_string(), "XX");
    }

    #[test]
    fn master_order_violations_are_reported() {
        let mut base = plugin("Base.esm");
        base.flags.master = true;
        let mut child = plugin("Child.esp");
        child.masters.push("Base.esm".to_string());
        let order = order_of(vec![child, base], &["Child.esp", "Base.esm"]);

        let violations = order.validate_master_order();
        assert_eq!(
            violations,
            vec![
                MasterOrderViolation {
                    plugin: "Child.esp".to_string(),
                    other: "Base.esm".to_string(),
                    kind: ViolationKind::MasterAfterDependent,
                },
                MasterOrderViolation {
                    plugin: "Base.esm".to_string(),
                    other: "Child.esp".to_string(),
                    kind: ViolationKind::NonMasterBeforeMaster,
                },
            ]
        );
        assert!(abc().validate_master_order().is_empty());
    }

    #[test]
    fn missing_masters_track_enabled_set() {
        let mut order = abc();
        assert!(order.missing_masters().is_empty());
        let mut d = plugin("D.esp");
        d.masters.push("C.esp".to_string());
        order = order_of(vec![plugin("C.esp"), d], &["D.esp"]);
        assert_eq!(order.missing_masters(), vec![("D.esp", &["C.esp".to_string()][..])]);
        order.set_enabled("C.esp", true).unwrap();
        assert!(order.missing_masters().is_empty());
    }

    #[test]
    fn reconciliation_appends_new_and_pins_primaries() {
        let mut skyrim = plugin("Skyrim.esm");
        skyrim.flags.pinned = true;
        skyrim.flags.master = true;
        let mut update = plugin("Update.esm");
        update.flags.pinned = true;
        update.flags.master = true;
        let store = PluginStore::from_plugins(vec![
            plugin("New.esp"),
            update,
            skyrim,
            plugin("Old.esp"),
        ]);
        let persisted = vec![
            SnapshotEntry {
                name: "Old.esp".to_string(),
                enabled: true,
            },
            SnapshotEntry {
                name: "Update.esm".to_string(),
                enabled: false,
            },
            SnapshotEntry {
                name: "Gone.esp".to_string(),
                enabled: true,
            },
        ];
        let order = LoadOrder::from_store(&store, &persisted, &GameId::SkyrimSe.rules());
        assert_eq!(
            names(&order),
            vec!["Skyrim.esm", "Update.esm", "Old.esp", "New.esp"]
        );
        assert!(order.get("Update.esm").unwrap().enabled);
        assert!(order.get("Old.esp").unwrap().enabled);
        assert!(!order.get("New.esp").unwrap().enabled);
    }

    #[test]
    fn new_masters_are_placed_after_the_plugins_they_follow() {
        let mut skyrim = plugin("Skyrim.esm");
        skyrim.flags.pinned = true;
        skyrim.flags.master = true;
        let mut base = plugin("Base.esm");
        base.flags.master = true;
        let mut addon = plugin("Addon.esm");
        addon.flags.master = true;
        addon.masters.push("Base.esm".to_string());
        let store = PluginStore::from_plugins(vec![
            skyrim,
            base,
            plugin("Old.esp"),
            addon,
            plugin("Late.esp"),
        ]);
        let persisted: Vec<SnapshotEntry> = ["Skyrim.esm", "Base.esm", "Old.esp"]
            .iter()
            .map(|name| SnapshotEntry {
                name: name.to_string(),
                enabled: true,
            })
            .collect();
        let order = LoadOrder::from_store(&store, &persisted, &GameId::SkyrimSe.rules());
        assert_eq!(
            names(&order),
            vec!["Skyrim.esm", "Base.esm", "Addon.esm", "Old.esp", "Late.esp"]
        );
        assert!(order.validate_master_order().is_empty());
    }

    #[test]
    fn lock_rejects_manual_changes_until_commit() {
        let mut order = abc();
        let token = order.lock_for_sort().unwrap();
        assert!(matches!(order.lock_for_sort(), Err(EngineError::OrderLocked)));
        assert!(matches!(
            order.move_to("C.esp", 1),
            Err(EngineError::OrderLocked)
        ));
        assert!(matches!(
            order.set_enabled("C.esp", false),
            Err(EngineError::OrderLocked)
        ));

        let proposal = vec![
            "A.esm".to_string(),
            "C.esp".to_string(),
            "Ghost.esp".to_string(),
        ];
        let outcome = order.commit_sorted(token, &proposal).unwrap();
        assert_eq!(names(&order), vec!["A.esm", "C.esp", "B.esp"]);
        assert_eq!(outcome.moved, 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(!order.is_locked());
        order.move_to("C.esp", 2).unwrap();
    }

    #[test]
    fn commit_rejects_moving_pinned_plugins() {
        let mut order = abc();
        let before = names(&order);
        let token = order.lock_for_sort().unwrap();
        let proposal = vec!["C.esp".to_string(), "A.esm".to_string()];
        assert!(matches!(
            order.commit_sorted(token, &proposal),
            Err(EngineError::ForcedPosition { .. })
        ));
        assert_eq!(names(&order), before);
        assert!(!order.is_locked());

        let token = order.lock_for_sort().unwrap();
        assert!(order.release(token));
        assert!(!order.is_locked());
    }

    #[test]
    fn snapshot_restore_replaces_order() {
        let mut order = order_of(plain(4), &["P0.esp"]);
        let saved = order.snapshot();
        order.move_to("P3.esp", 0).unwrap();
        order.set_enabled("P0.esp", false).unwrap();
        let warnings = order.restore_snapshot(&saved).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(order.snapshot(), saved);
    }
}
