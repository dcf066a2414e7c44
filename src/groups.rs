use crate::{
    error::{EngineError, EngineResult},
    fsutil::write_atomic_text,
    load_order::OrderEntry,
    plugin::name_key,
};
use regex::RegexBuilder;
use serde::Serialize;
use serde_yaml::Value;
use std::{cmp::Ordering, collections::HashMap, fs, io, path::Path};

pub const GROUPS_FILE: &str = "plugingroups.txt";
pub const ROOT_NAME: &str = "All Items";
const HEADER: &str = "# This file was automatically generated by plugsmith.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GroupId(usize);

pub const ROOT_GROUP: GroupId = GroupId(0);

#[derive(Debug, Clone)]
struct GroupNode {
    name: String,
    parent: Option<GroupId>,
    children: Vec<GroupId>,
    plugins: Vec<String>,
    collapsed: bool,
}

impl GroupNode {
    fn new(name: &str, parent: Option<GroupId>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            plugins: Vec::new(),
            collapsed: false,
        }
    }
}

/// Characters that mark a list entry's plugin name as a regular expression.
const PATTERN_MARKERS: &[char] = &[':', '\\', '*', '?', '|', '"'];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportedGroups {
    pub groups: usize,
    pub plugins: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovedGroup {
    pub children_moved: usize,
    pub plugins_moved: usize,
}

/// Named groups over plugins. Nodes live in an arena; removed slots stay empty
/// so ids remain stable.
#[derive(Debug, Clone)]
pub struct GroupTree {
    nodes: Vec<Option<GroupNode>>,
    assignments: HashMap<String, GroupId>,
}

impl Default for GroupTree {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(GroupNode::new(ROOT_NAME, None))],
            assignments: HashMap::new(),
        }
    }

    fn node(&self, id: GroupId) -> EngineResult<&GroupNode> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(EngineError::UnknownGroup)
    }

    fn node_mut(&mut self, id: GroupId) -> EngineResult<&mut GroupNode> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(EngineError::UnknownGroup)
    }

    fn validate_name(name: &str) -> EngineResult<String> {
        let name = name.trim();
        if name.is_empty() || name.contains('/') || name.contains('|') {
            return Err(EngineError::InvalidGroupName(name.to_string()));
        }
        Ok(name.to_string())
    }

    fn sibling_named(&self, parent: GroupId, name: &str) -> Option<GroupId> {
        let node = self.node(parent).ok()?;
        node.children.iter().copied().find(|child| {
            self.node(*child)
                .map(|child| child.name.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
    }

    pub fn create_group(&mut self, parent: GroupId, name: &str) -> EngineResult<GroupId> {
        let name = Self::validate_name(name)?;
        self.node(parent)?;
        if self.sibling_named(parent, &name).is_some() {
            return Err(EngineError::DuplicateName(name));
        }
        let id = GroupId(self.nodes.len());
        self.nodes.push(Some(GroupNode::new(&name, Some(parent))));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub fn rename_group(&mut self, id: GroupId, name: &str) -> EngineResult<()> {
        if id == ROOT_GROUP {
            return Err(EngineError::RootGroup);
        }
        let name = Self::validate_name(name)?;
        let parent = self.node(id)?.parent.unwrap_or(ROOT_GROUP);
        if let Some(existing) = self.sibling_named(parent, &name) {
            if existing != id {
                return Err(EngineError::DuplicateName(name));
            }
        }
        self.node_mut(id)?.name = name;
        Ok(())
    }

    /// Removes a group, handing its children and plugins to its parent.
    pub fn remove_group(&mut self, id: GroupId) -> EngineResult<RemovedGroup> {
        if id == ROOT_GROUP {
            return Err(EngineError::RootGroup);
        }
        let parent = self.node(id)?.parent.unwrap_or(ROOT_GROUP);
        let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return Err(EngineError::UnknownGroup);
        };

        let parent_node = self.node_mut(parent)?;
        let slot = match parent_node.children.iter().position(|child| *child == id) {
            Some(slot) => {
                parent_node.children.remove(slot);
                slot
            }
            None => parent_node.children.len(),
        };
        for (offset, child) in node.children.iter().enumerate() {
            parent_node.children.insert(slot + offset, *child);
        }

        // Moved children yield to the parent's groups and to earlier moved siblings.
        for (index, child) in node.children.iter().enumerate() {
            let child_name = self.node(*child)?.name.clone();
            let clash = self.node(parent)?.children.iter().any(|other| {
                other != child
                    && (!node.children.contains(other) || node.children[..index].contains(other))
                    && self
                        .node(*other)
                        .map(|other| other.name.eq_ignore_ascii_case(&child_name))
                        .unwrap_or(false)
            });
            if clash {
                let renamed = self.free_name(parent, &child_name);
                log::warn!("group {child_name} renamed to {renamed} while moving up");
                self.node_mut(*child)?.name = renamed;
            }
            self.node_mut(*child)?.parent = Some(parent);
        }

        for plugin in &node.plugins {
            let key = name_key(plugin);
            if parent == ROOT_GROUP {
                self.assignments.remove(&key);
            } else {
                self.assignments.insert(key, parent);
            }
        }
        if parent != ROOT_GROUP {
            self.node_mut(parent)?.plugins.extend(node.plugins.iter().cloned());
        }

        log::info!(
            "removed group {}, {} child group(s) and {} plugin(s) moved up",
            node.name,
            node.children.len(),
            node.plugins.len()
        );
        Ok(RemovedGroup {
            children_moved: node.children.len(),
            plugins_moved: node.plugins.len(),
        })
    }

    fn free_name(&self, parent: GroupId, base: &str) -> String {
        let mut counter = 2;
        loop {
            let candidate = format!("{base} ({counter})");
            if self.sibling_named(parent, &candidate).is_none() {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Puts `plugin` in `group`; the root group means ungrouped.
    pub fn assign(&mut self, plugin: &str, group: GroupId) -> EngineResult<()> {
        self.node(group)?;
        self.unassign(plugin);
        if group == ROOT_GROUP {
            return Ok(());
        }
        self.node_mut(group)?.plugins.push(plugin.to_string());
        self.assignments.insert(name_key(plugin), group);
        Ok(())
    }

    pub fn unassign(&mut self, plugin: &str) {
        let key = name_key(plugin);
        if let Some(previous) = self.assignments.remove(&key) {
            if let Ok(node) = self.node_mut(previous) {
                node.plugins.retain(|name| name_key(name) != key);
            }
        }
    }

    pub fn group_of(&self, plugin: &str) -> GroupId {
        self.assignments
            .get(&name_key(plugin))
            .copied()
            .unwrap_or(ROOT_GROUP)
    }

    pub fn name(&self, id: GroupId) -> EngineResult<&str> {
        Ok(self.node(id)?.name.as_str())
    }

    pub fn parent(&self, id: GroupId) -> EngineResult<Option<GroupId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn children(&self, id: GroupId) -> EngineResult<&[GroupId]> {
        Ok(self.node(id)?.children.as_slice())
    }

    pub fn plugins_in(&self, id: GroupId) -> EngineResult<&[String]> {
        Ok(self.node(id)?.plugins.as_slice())
    }

    pub fn set_collapsed(&mut self, id: GroupId, collapsed: bool) -> EngineResult<()> {
        self.node_mut(id)?.collapsed = collapsed;
        Ok(())
    }

    pub fn is_collapsed(&self, id: GroupId) -> EngineResult<bool> {
        Ok(self.node(id)?.collapsed)
    }

    /// Slash separated path below the root; empty for the root itself.
    pub fn path(&self, id: GroupId) -> EngineResult<String> {
        let mut parts = Vec::new();
        let mut current = id;
        while current != ROOT_GROUP {
            let node = self.node(current)?;
            parts.push(node.name.clone());
            current = node.parent.unwrap_or(ROOT_GROUP);
        }
        parts.reverse();
        Ok(parts.join("/"))
    }

    pub fn find_path(&self, path: &str) -> Option<GroupId> {
        let mut current = ROOT_GROUP;
        for part in path.split('/').map(str::trim).filter(|part| !part.is_empty()) {
            current = self.sibling_named(current, part)?;
        }
        Some(current)
    }

    fn ensure_path(&mut self, path: &str) -> EngineResult<GroupId> {
        let mut current = ROOT_GROUP;
        for part in path.split('/').map(str::trim).filter(|part| !part.is_empty()) {
            current = match self.sibling_named(current, part) {
                Some(existing) => existing,
                None => self.create_group(current, part)?,
            };
        }
        Ok(current)
    }

    /// Every live group below the root, depth first.
    pub fn walk(&self) -> Vec<GroupId> {
        let mut out = Vec::new();
        let mut stack: Vec<GroupId> = self
            .node(ROOT_GROUP)
            .map(|root| root.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            if let Ok(node) = self.node(id) {
                out.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Group a plugin ends up in when moved from `from` to `to`, given the
    /// order before the move. Dropping it between two members of a group
    /// joins that group; pulling it out of the middle of its own group leaves it.
    pub fn destination_group(&self, order: &[OrderEntry], from: usize, to: usize) -> GroupId {
        let Some(moved) = order.get(from) else {
            return ROOT_GROUP;
        };
        let original = self.group_of(&moved.name);
        let master = moved.is_master_file();
        let previous = |at: usize| {
            (0..at.min(order.len()))
                .rev()
                .filter(|idx| *idx != from)
                .find_map(|idx| order.get(idx))
        };
        let next = |at: usize| {
            (at + 1..order.len())
                .filter(|idx| *idx != from)
                .find_map(|idx| order.get(idx))
        };
        let in_original = |entry: Option<&OrderEntry>| {
            entry.is_some_and(|entry| {
                self.group_of(&entry.name) == original && entry.is_master_file() == master
            })
        };

        let left_group =
            original != ROOT_GROUP && (in_original(previous(from)) || in_original(next(from)));
        let displaced = order
            .get(to)
            .map_or(ROOT_GROUP, |entry| self.group_of(&entry.name));
        let neighbor = match to.cmp(&from) {
            Ordering::Less => previous(to),
            Ordering::Greater => next(to),
            Ordering::Equal => None,
        }
        .map(|entry| self.group_of(&entry.name));

        if displaced != ROOT_GROUP && neighbor == Some(displaced) {
            displaced
        } else if !left_group || displaced == original {
            original
        } else {
            ROOT_GROUP
        }
    }

    /// Builds a tree from the `plugins[].group` entries of the sorting tool's
    /// masterlist and userlist. Later lists override earlier ones and missing
    /// lists are skipped.
    pub fn from_sort_lists<'a>(
        plugins: impl IntoIterator<Item = &'a str>,
        lists: &[&Path],
    ) -> EngineResult<(Self, ImportedGroups)> {
        let mut wanted: Vec<(String, Option<String>)> = plugins
            .into_iter()
            .map(|name| (name.to_string(), None))
            .collect();
        for list in lists {
            apply_sort_list(list, &mut wanted)?;
        }

        let mut tree = GroupTree::new();
        let mut imported = ImportedGroups::default();
        for (plugin, group) in wanted {
            let Some(group) = group else {
                continue;
            };
            let id = match tree.sibling_named(ROOT_GROUP, group.trim()) {
                Some(id) => id,
                None => match tree.create_group(ROOT_GROUP, &group) {
                    Ok(id) => {
                        imported.groups += 1;
                        id
                    }
                    Err(err) => {
                        log::warn!("skipping group {group:?} for {plugin}: {err}");
                        continue;
                    }
                },
            };
            tree.assign(&plugin, id)?;
            imported.plugins += 1;
        }
        log::info!(
            "imported {} group(s) covering {} plugin(s)",
            imported.groups,
            imported.plugins
        );
        Ok((tree, imported))
    }

    /// Reads `plugin|Group/Sub` lines, keeping only plugins `is_known` accepts.
    pub fn parse(raw: &str, is_known: impl Fn(&str) -> bool) -> Self {
        let mut tree = GroupTree::new();
        for (number, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((plugin, path)) = line.split_once('|') else {
                log::warn!("{GROUPS_FILE}:{}: missing separator, skipped", number + 1);
                continue;
            };
            let group = match tree.ensure_path(path) {
                Ok(group) => group,
                Err(err) => {
                    log::warn!("{GROUPS_FILE}:{}: {err}, skipped", number + 1);
                    continue;
                }
            };
            let plugin = plugin.trim();
            if plugin.is_empty() {
                continue;
            }
            if !is_known(plugin) {
                log::debug!("ignoring group entry for unknown plugin {plugin}");
                continue;
            }
            if let Err(err) = tree.assign(plugin, group) {
                log::warn!("{GROUPS_FILE}:{}: {err}", number + 1);
            }
        }
        tree
    }

    pub fn render(&self) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');
        for id in self.walk() {
            let (Ok(node), Ok(path)) = (self.node(id), self.path(id)) else {
                continue;
            };
            if node.plugins.is_empty() {
                out.push_str(&format!("|{path}\n"));
            }
            for plugin in &node.plugins {
                out.push_str(&format!("{plugin}|{path}\n"));
            }
        }
        out
    }

    pub fn load(path: &Path, is_known: impl Fn(&str) -> bool) -> EngineResult<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Self::parse(&raw, is_known)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        write_atomic_text(path, &self.render())?;
        Ok(())
    }
}

fn apply_sort_list(path: &Path, wanted: &mut [(String, Option<String>)]) -> EngineResult<()> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::debug!("no group list at {}", path.display());
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    let document: Value = serde_yaml::from_str(&raw).map_err(|err| EngineError::GroupList {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let Some(entries) = document.get("plugins").and_then(Value::as_sequence) else {
        return Ok(());
    };

    for entry in entries {
        let (Some(name), Some(group)) = (
            entry.get("name").and_then(Value::as_str),
            entry.get("group").and_then(Value::as_str),
        ) else {
            continue;
        };
        if name.contains(PATTERN_MARKERS) {
            let pattern = match RegexBuilder::new(&format!("^(?:{name})$"))
                .case_insensitive(true)
                .build()
            {
                Ok(pattern) => pattern,
                Err(err) => {
                    log::warn!("{}: bad plugin pattern {name:?}: {err}", path.display());
                    continue;
                }
            };
            for (plugin, slot) in wanted.iter_mut() {
                if pattern.is_match(plugin) {
                    *slot = Some(group.to_string());
                }
            }
        } else if let Some((_, slot)) = wanted
            .iter_mut()
            .find(|(plugin, _)| plugin.eq_ignore_ascii_case(name))
        {
            *slot = Some(group.to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_order::tests::order_of;
    use crate::plugin::tests::plugin;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn duplicate_names_are_rejected_per_parent() {
        let mut tree = GroupTree::new();
        let armor = tree.create_group(ROOT_GROUP, "Armor").unwrap();
        assert!(matches!(
            tree.create_group(ROOT_GROUP, "armor"),
            Err(EngineError::DuplicateName(_))
        ));
        let nested = tree.create_group(armor, "Armor").unwrap();
        assert_eq!(tree.path(nested).unwrap(), "Armor/Armor");
        assert!(matches!(
            tree.create_group(ROOT_GROUP, "a/b"),
            Err(EngineError::InvalidGroupName(_))
        ));
        let weapons = tree.create_group(ROOT_GROUP, "Weapons").unwrap();
        assert!(matches!(
            tree.rename_group(weapons, "ARMOR"),
            Err(EngineError::DuplicateName(_))
        ));
        tree.rename_group(weapons, "weapons").unwrap();
        assert!(matches!(
            tree.rename_group(ROOT_GROUP, "x"),
            Err(EngineError::RootGroup)
        ));
    }

    #[test]
    fn removal_reparents_children_and_plugins() {
        let mut tree = GroupTree::new();
        let gear = tree.create_group(ROOT_GROUP, "Gear").unwrap();
        let armor = tree.create_group(gear, "Armor").unwrap();
        let heavy = tree.create_group(armor, "Heavy").unwrap();
        let light = tree.create_group(armor, "Light").unwrap();
        tree.assign("Plate.esp", armor).unwrap();
        tree.assign("Chain.esp", heavy).unwrap();

        let removed = tree.remove_group(armor).unwrap();
        assert_eq!(
            removed,
            RemovedGroup {
                children_moved: 2,
                plugins_moved: 1,
            }
        );
        assert_eq!(tree.children(gear).unwrap(), &[heavy, light]);
        assert_eq!(tree.group_of("plate.esp"), gear);
        assert_eq!(tree.path(heavy).unwrap(), "Gear/Heavy");
        assert!(matches!(tree.name(armor), Err(EngineError::UnknownGroup)));

        let removed = tree.remove_group(gear).unwrap();
        assert_eq!(removed.plugins_moved, 1);
        assert_eq!(tree.group_of("Plate.esp"), ROOT_GROUP);
        assert_eq!(tree.parent(heavy).unwrap(), Some(ROOT_GROUP));
        assert!(matches!(tree.remove_group(ROOT_GROUP), Err(EngineError::RootGroup)));
    }

    #[test]
    fn reparented_child_with_clashing_name_is_renamed() {
        let mut tree = GroupTree::new();
        tree.create_group(ROOT_GROUP, "Misc").unwrap();
        let boxed = tree.create_group(ROOT_GROUP, "Box").unwrap();
        let inner = tree.create_group(boxed, "misc").unwrap();
        tree.remove_group(boxed).unwrap();
        assert_eq!(tree.name(inner).unwrap(), "misc (2)");
        assert_eq!(tree.children(ROOT_GROUP).unwrap().len(), 2);
    }

    #[test]
    fn renamed_child_does_not_take_a_moving_sibling_name() {
        let mut tree = GroupTree::new();
        tree.create_group(ROOT_GROUP, "Misc").unwrap();
        let boxed = tree.create_group(ROOT_GROUP, "Box").unwrap();
        let lower = tree.create_group(boxed, "misc").unwrap();
        let numbered = tree.create_group(boxed, "Misc (2)").unwrap();
        tree.remove_group(boxed).unwrap();

        assert_eq!(tree.name(numbered).unwrap(), "Misc (2)");
        assert_eq!(tree.name(lower).unwrap(), "misc (3)");
        let mut names: Vec<String> = tree
            .children(ROOT_GROUP)
            .unwrap()
            .iter()
            .map(|child| tree.name(*child).unwrap().to_lowercase())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn sort_lists_seed_groups_with_later_lists_winning() {
        let dir = tempdir().unwrap();
        let masterlist = dir.path().join("masterlist.yaml");
        let userlist = dir.path().join("userlist.yaml");
        fs::write(
            &masterlist,
            r#"
groups:
  - name: Early
plugins:
  - name: 'Alpha.esp'
    group: Early
  - name: 'Beta.*\.esp'
    group: Late Loaders
  - name: 'Gamma.esp'
    after: [ 'Alpha.esp' ]
  - just a string
"#,
        )
        .unwrap();
        fs::write(&userlist, "plugins:\n  - name: alpha.esp\n    group: Fixes\n").unwrap();

        let plugins = ["Alpha.esp", "BetaArmor.ESP", "Gamma.esp", "Other.esm"];
        let missing = dir.path().join("missing.yaml");
        let (tree, imported) = GroupTree::from_sort_lists(
            plugins.iter().copied(),
            &[masterlist.as_path(), userlist.as_path(), missing.as_path()],
        )
        .unwrap();

        assert_eq!(
            imported,
            ImportedGroups {
                groups: 2,
                plugins: 2,
            }
        );
        assert_eq!(tree.path(tree.group_of("Alpha.esp")).unwrap(), "Fixes");
        assert_eq!(tree.path(tree.group_of("betaarmor.esp")).unwrap(), "Late Loaders");
        assert_eq!(tree.group_of("Gamma.esp"), ROOT_GROUP);
        assert!(tree.find_path("Early").is_none());

        fs::write(&userlist, "plugins: [ name: x\n").unwrap();
        assert!(matches!(
            GroupTree::from_sort_lists(plugins.iter().copied(), &[userlist.as_path()]),
            Err(EngineError::GroupList { .. })
        ));
    }

    #[test]
    fn moved_plugins_follow_their_new_neighbours() {
        let order = order_of(
            (0..6).map(|idx| plugin(&format!("P{idx}.esp"))).collect(),
            &[],
        );
        let mut tree = GroupTree::new();
        let mid = tree.create_group(ROOT_GROUP, "Mid").unwrap();
        for name in ["P1.esp", "P2.esp", "P3.esp"] {
            tree.assign(name, mid).unwrap();
        }
        let entries = order.entries();

        // Dropped between two members of Mid.
        assert_eq!(tree.destination_group(entries, 0, 2), mid);
        assert_eq!(tree.destination_group(entries, 5, 2), mid);
        // Pulled out of the middle of Mid.
        assert_eq!(tree.destination_group(entries, 2, 5), ROOT_GROUP);
        // Reordered inside Mid.
        assert_eq!(tree.destination_group(entries, 3, 1), mid);
        // Moved along the edge of the group without entering it.
        assert_eq!(tree.destination_group(entries, 5, 4), ROOT_GROUP);
        assert_eq!(tree.destination_group(entries, 0, 0), ROOT_GROUP);
    }

    #[test]
    fn plugins_belong_to_one_group() {
        let mut tree = GroupTree::new();
        let a = tree.create_group(ROOT_GROUP, "A").unwrap();
        let b = tree.create_group(ROOT_GROUP, "B").unwrap();
        tree.assign("Mod.esp", a).unwrap();
        tree.assign("MOD.esp", b).unwrap();
        assert!(tree.plugins_in(a).unwrap().is_empty());
        assert_eq!(tree.group_of("mod.esp"), b);
        tree.unassign("Mod.esp");
        assert_eq!(tree.group_of("Mod.esp"), ROOT_GROUP);
        tree.set_collapsed(a, true).unwrap();
        assert!(tree.is_collapsed(a).unwrap());
    }

    #[test]
    fn file_round_trip_keeps_empty_groups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(GROUPS_FILE);
        fs::write(
            &path,
            "# comment\nArmor.esp|Gear/Armor\n|Gear/Empty\nGone.esp|Gear\nbroken line\nWeapon.esp|Gear\n",
        )
        .unwrap();

        let tree = GroupTree::load(&path, |name| name != "Gone.esp").unwrap();
        let armor = tree.find_path("gear/armor").unwrap();
        assert_eq!(tree.plugins_in(armor).unwrap(), &["Armor.esp".to_string()]);
        assert!(tree.find_path("Gear/Empty").is_some());
        assert_eq!(tree.group_of("Gone.esp"), ROOT_GROUP);

        tree.save(&path).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().skip(1).collect();
        assert_eq!(
            lines,
            vec!["Weapon.esp|Gear", "Armor.esp|Gear/Armor", "|Gear/Empty"]
        );
    }
}
