use anyhow::{bail, Context, Result};
use plugsmith::{
    backup::{BackupInfo, BackupManager},
    config::{AppConfig, GameConfig},
    conflicts::{ConflictIndex, ConflictMode, ConflictSets, ConflictingOrigin},
    game::GameRules,
    groups::{GroupId, GroupTree, ImportedGroups, RemovedGroup, GROUPS_FILE, ROOT_GROUP},
    library::{Library, OriginSet, GAME_DATA_ORIGIN},
    load_order::{CommitOutcome, LoadOrder, SortToken},
    logging::{self, FileLogger, LogEntry},
    loot::{self, SortCommand, SortEvent, SortFinish, SortReport, SortRequest, SortStage, SortTask},
    origin_fs,
    plugin::{ParseFailure, PluginStore},
    plugins_txt::{read_plugins_txt, save_profile_order, LOADORDER_FILE, PLUGINS_FILE},
    EngineError,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

const SORT_REPORT_FILE: &str = "lootreport.json";
/// Scratch plugin list handed to the sorting tool; the profile's own files
/// are only rewritten after a sorted order is committed.
const SORT_LIST_FILE: &str = "loadorder.sort.txt";

struct RunningSort {
    task: SortTask,
    token: SortToken,
}

#[derive(Debug)]
pub enum SortResult {
    Applied {
        commit: CommitOutcome,
        report: SortReport,
    },
    Cancelled,
}

pub struct App {
    pub app_config: AppConfig,
    pub config: GameConfig,
    pub rules: GameRules,
    pub library: Library,
    pub origins: OriginSet,
    pub store: PluginStore,
    pub order: LoadOrder,
    pub groups: GroupTree,
    pub conflicts: ConflictIndex,
    pub backups: BackupManager,
    pub load_failures: Vec<ParseFailure>,
    pub status: String,
    logger: Option<&'static FileLogger>,
    sort: Option<RunningSort>,
    sort_stage: SortStage,
}

impl App {
    pub fn initialize(profile: Option<&str>) -> Result<Self> {
        let app_config = AppConfig::load_or_create()?;
        let mut config = GameConfig::load_or_create(app_config.active_game)?;
        if let Some(profile) = profile.filter(|name| !name.trim().is_empty()) {
            config.active_profile = profile.to_string();
        }
        let logger = match logging::init(&config.data_dir, log::LevelFilter::Info) {
            Ok(logger) => Some(logger),
            Err(err) => {
                eprintln!("logging disabled: {err}");
                None
            }
        };
        let mut app = Self::open(app_config, config)?;
        app.logger = logger;
        Ok(app)
    }

    /// Loads everything for the configured game and active profile.
    pub fn open(app_config: AppConfig, config: GameConfig) -> Result<Self> {
        let rules = config
            .game_id
            .rules()
            .with_always_enabled_from(&config.game_root)
            .with_locked_disabled(&config.locked_disabled);
        let library = Library::load_or_create(&config.data_dir)?;
        let profile_dir = config.profile_dir();
        let backups = BackupManager::new(&profile_dir);

        let mut app = App {
            app_config,
            config,
            rules,
            library,
            origins: OriginSet::default(),
            store: PluginStore::default(),
            order: LoadOrder::default(),
            groups: GroupTree::new(),
            conflicts: ConflictIndex::default(),
            backups,
            load_failures: Vec::new(),
            status: String::new(),
            logger: None,
            sort: None,
            sort_stage: SortStage::Idle,
        };

        let persisted = read_plugins_txt(&profile_dir.join(PLUGINS_FILE))
            .context("read plugins.txt")?;
        app.rescan_origins()?;
        app.reload_store();
        app.order = LoadOrder::from_store(&app.store, &persisted, &app.rules);
        let store = &app.store;
        app.groups = GroupTree::load(&profile_dir.join(GROUPS_FILE), |name| store.contains(name))
            .context("read plugin groups")?;

        let stats = app.order.stats();
        app.log_info(format!(
            "{}: {} origin(s), {} plugin(s), {} active, {} conflicting path(s)",
            app.config.game_name,
            app.origins.len(),
            stats.total,
            stats.active,
            app.conflicts.path_count()
        ));
        for failure in &app.load_failures {
            log::warn!("unreadable plugin {}: {}", failure.name, failure.error);
        }
        Ok(app)
    }

    pub fn log_info(&self, message: String) {
        log::info!("{message}");
    }

    pub fn log_warn(&self, message: String) {
        log::warn!("{message}");
    }

    pub fn log_error(&self, message: String) {
        log::error!("{message}");
    }

    pub fn recent_logs(&self) -> Vec<LogEntry> {
        self.logger.map(FileLogger::recent).unwrap_or_default()
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.config.profile_dir()
    }

    pub fn plugins_path(&self) -> PathBuf {
        self.profile_dir().join(PLUGINS_FILE)
    }

    pub fn loadorder_path(&self) -> PathBuf {
        self.profile_dir().join(LOADORDER_FILE)
    }

    pub fn groups_path(&self) -> PathBuf {
        self.profile_dir().join(GROUPS_FILE)
    }

    fn rescan_origins(&mut self) -> Result<()> {
        let game_data = self.config.game_data_dir();
        self.origins = OriginSet::scan(
            &self.library,
            &self.config.mods_dir,
            game_data.as_deref(),
            &self.config.cache_root(),
        )?;
        if self.conflicts.refresh(&self.origins) {
            log::debug!("conflict index rebuilt");
        }
        Ok(())
    }

    fn reload_store(&mut self) {
        let loaded = PluginStore::load(self.origins.plugin_sources(), &self.rules);
        self.store = loaded.store;
        self.load_failures = loaded.failures;
    }

    /// Rescans origins and plugins, keeping the current order where it still applies.
    pub fn refresh(&mut self) -> Result<()> {
        if self.order.is_locked() {
            return Err(EngineError::OrderLocked.into());
        }
        let snapshot = self.order.snapshot();
        self.rescan_origins()?;
        self.reload_store();
        self.order = LoadOrder::from_store(&self.store, &snapshot, &self.rules);
        self.save_order()
    }

    pub fn save_order(&self) -> Result<()> {
        save_profile_order(&self.profile_dir(), &self.order.snapshot())
            .context("save load order")?;
        Ok(())
    }

    pub fn set_enabled(&mut self, plugin: &str, enabled: bool) -> Result<()> {
        self.order.set_enabled(plugin, enabled)?;
        self.save_order()
    }

    /// Toggles every plugin that can be toggled.
    pub fn set_all_enabled(&mut self, enabled: bool) -> Result<usize> {
        let changed = self
            .order
            .bulk_set_enabled(|entry| entry.can_be_toggled(), enabled)?;
        self.save_order()?;
        self.log_info(format!(
            "{} {changed} plugin(s)",
            if enabled { "enabled" } else { "disabled" }
        ));
        Ok(changed)
    }

    /// Runs a single-plugin move and carries the plugin into the group of
    /// its new neighbours.
    fn move_with_group<F>(&mut self, plugin: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut LoadOrder) -> Result<(), EngineError>,
    {
        let from = self
            .order
            .position(plugin)
            .ok_or_else(|| EngineError::UnknownPlugin(plugin.to_string()))?;
        let before = self.order.entries().to_vec();
        apply(&mut self.order)?;
        self.save_order()?;

        let Some(to) = self.order.position(plugin).filter(|to| *to != from) else {
            return Ok(());
        };
        let name = &before[from].name;
        let destination = self.groups.destination_group(&before, from, to);
        if destination != self.groups.group_of(name) {
            self.groups.assign(name, destination)?;
            log::info!(
                "{name} moved to group {}",
                self.groups.path(destination).unwrap_or_default()
            );
            self.save_groups()?;
        }
        Ok(())
    }

    pub fn move_plugin(&mut self, plugin: &str, position: usize) -> Result<()> {
        self.move_with_group(plugin, |order| order.move_to(plugin, position))
    }

    pub fn set_priority(&mut self, plugin: &str, priority: i64) -> Result<()> {
        self.move_with_group(plugin, |order| order.set_priority(plugin, priority))
    }

    pub fn shift_priority(&mut self, plugin: &str, offset: i64) -> Result<()> {
        self.move_with_group(plugin, |order| order.shift_priority(plugin, offset))
    }

    pub fn send_to_top(&mut self, plugin: &str) -> Result<()> {
        self.move_with_group(plugin, |order| order.send_to_top(plugin))
    }

    pub fn send_to_bottom(&mut self, plugin: &str) -> Result<()> {
        self.move_with_group(plugin, |order| order.send_to_bottom(plugin))
    }

    pub fn conflicting_mods(&self, origin_id: &str, nearest: bool) -> Result<Vec<ConflictingOrigin>> {
        self.ensure_origin(origin_id)?;
        let mode = if nearest {
            ConflictMode::NearestOnly
        } else {
            ConflictMode::All
        };
        Ok(self.conflicts.conflicting_mods(origin_id, mode))
    }

    pub fn conflict_sets(&self, origin_id: &str) -> Result<ConflictSets> {
        self.ensure_origin(origin_id)?;
        Ok(self.conflicts.conflict_sets(origin_id))
    }

    pub fn plugin_conflicts(&self, plugin: &str) -> Result<ConflictSets> {
        let plugin = self
            .store
            .get(plugin)
            .ok_or_else(|| EngineError::UnknownPlugin(plugin.to_string()))?;
        Ok(self.conflicts.plugin_conflicts(
            plugin,
            &self.store,
            self.config.ignore_master_conflicts,
        ))
    }

    fn ensure_origin(&self, origin_id: &str) -> Result<()> {
        if self.origins.get(origin_id).is_none() {
            bail!("Unknown mod: {origin_id}");
        }
        Ok(())
    }

    pub fn move_file(&mut self, origin_id: &str, from: &Path, to: &Path) -> Result<PathBuf> {
        let origin = self
            .origins
            .get(origin_id)
            .with_context(|| format!("Unknown mod: {origin_id}"))?;
        if origin.packed {
            bail!("{origin_id} is packed; its files cannot be moved");
        }
        if origin.id == GAME_DATA_ORIGIN {
            bail!("files in the game data directory are not managed");
        }
        let dest = origin_fs::move_within_origin(&origin.root, from, to)?;
        self.refresh()?;
        Ok(dest)
    }

    pub fn sort_stage(&self) -> SortStage {
        self.sort_stage
    }

    pub fn is_sorting(&self) -> bool {
        self.sort.is_some()
    }

    /// Backs up the order, locks it, and launches the sorting tool.
    pub fn start_sort(&mut self, offline: bool) -> Result<()> {
        if self.sort.is_some() {
            bail!("a sort is already running");
        }
        if self.config.sort_tool.as_os_str().is_empty() {
            bail!("no sorting tool configured (set sort_tool in the game config)");
        }
        let snapshot = self.order.snapshot();
        let backup = self.backups.create(&snapshot)?;
        self.backups.prune(self.config.backups_to_keep)?;
        self.log_info(format!("backed up load order as {}", backup.id));

        let token = self.order.lock_for_sort()?;
        let command = SortCommand {
            program: self.config.sort_tool.clone(),
            wrapper: self.config.launcher_wrapper.clone(),
        };
        let request = SortRequest {
            game: self.config.game_id,
            game_root: self.config.game_root.clone(),
            plugin_list_path: self.sort_list_path(),
            report_path: self.profile_dir().join(SORT_REPORT_FILE),
            snapshot,
            offline: offline || self.config.offline,
            log_level: "info".to_string(),
            language: "en".to_string(),
        };
        match loot::start_sort(&command, request) {
            Ok(task) => {
                self.sort = Some(RunningSort { task, token });
                self.sort_stage = SortStage::Idle;
                Ok(())
            }
            Err(err) => {
                self.order.release(token);
                self.discard_sort_list();
                Err(err.into())
            }
        }
    }

    fn sort_list_path(&self) -> PathBuf {
        self.profile_dir().join(SORT_LIST_FILE)
    }

    fn discard_sort_list(&self) {
        let path = self.sort_list_path();
        match fs::remove_file(&path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                log::debug!("could not remove {}: {err}", path.display());
            }
            _ => {}
        }
    }

    /// Drains sort progress; returns the result once the task has ended.
    pub fn poll_sort(&mut self) -> Result<Option<SortResult>> {
        let Some(running) = self.sort.as_mut() else {
            return Ok(None);
        };
        let mut finished = None;
        while let Some(event) = running.task.try_next() {
            match event {
                SortEvent::Stage(stage) => {
                    self.sort_stage = stage;
                    self.status = format!("Sorting: {stage}");
                    log::info!("sort stage: {stage}");
                }
                SortEvent::Log { level, text } => log::log!(level, "sorting tool: {text}"),
                SortEvent::Finished(finish) => {
                    finished = Some(finish);
                    break;
                }
            }
        }
        let Some(finish) = finished else {
            return Ok(None);
        };
        let Some(running) = self.sort.take() else {
            return Ok(None);
        };
        self.sort_stage = finish.stage();
        self.finish_sort(running.token, finish).map(Some)
    }

    pub fn cancel_sort(&mut self) {
        if let Some(running) = &self.sort {
            running.task.cancel();
            self.log_warn("sort cancel requested".to_string());
        }
    }

    pub fn run_sort_blocking(&mut self, offline: bool) -> Result<SortResult> {
        self.start_sort(offline)?;
        loop {
            if let Some(result) = self.poll_sort()? {
                return Ok(result);
            }
            thread::sleep(Duration::from_millis(100));
        }
    }

    fn finish_sort(&mut self, token: SortToken, finish: SortFinish) -> Result<SortResult> {
        self.discard_sort_list();
        let result = match finish {
            SortFinish::Completed(outcome) => {
                let commit = match outcome.apply(&mut self.order, token) {
                    Ok(commit) => commit,
                    Err(err) => {
                        self.sort_stage = SortStage::Failed;
                        self.status = "Sorted order rejected".to_string();
                        self.log_error(format!("sorted order rejected: {err}"));
                        return Err(err.into());
                    }
                };
                self.save_order()?;
                for warning in &commit.warnings {
                    self.log_warn(warning.clone());
                }
                self.status = format!("Sorted, {} plugin(s) moved", commit.moved);
                SortResult::Applied {
                    commit,
                    report: outcome.report,
                }
            }
            SortFinish::Failed(err) => {
                self.order.release(token);
                self.status = "Sorting failed".to_string();
                self.log_error(format!("sorting failed: {err}"));
                return Err(err.into());
            }
            SortFinish::Cancelled => {
                self.order.release(token);
                self.status = "Sorting cancelled".to_string();
                SortResult::Cancelled
            }
        };
        self.sort_stage = SortStage::Idle;
        Ok(result)
    }

    pub fn create_backup(&self) -> Result<BackupInfo> {
        let info = self.backups.create(&self.order.snapshot())?;
        self.backups.prune(self.config.backups_to_keep)?;
        Ok(info)
    }

    pub fn restore_backup(&mut self, id: &str) -> Result<Vec<String>> {
        let warnings = self.backups.restore(id, &mut self.order)?;
        for warning in &warnings {
            self.log_warn(warning.clone());
        }
        self.save_order()?;
        Ok(warnings)
    }

    fn group_at(&self, path: &str) -> Result<GroupId> {
        self.groups
            .find_path(path)
            .with_context(|| format!("Unknown group: {path}"))
    }

    pub fn save_groups(&self) -> Result<()> {
        self.groups.save(&self.groups_path()).context("save plugin groups")?;
        Ok(())
    }

    pub fn create_group(&mut self, parent: &str, name: &str) -> Result<GroupId> {
        let parent = self.group_at(parent)?;
        let id = self.groups.create_group(parent, name)?;
        self.save_groups()?;
        Ok(id)
    }

    pub fn rename_group(&mut self, path: &str, name: &str) -> Result<()> {
        let id = self.group_at(path)?;
        self.groups.rename_group(id, name)?;
        self.save_groups()
    }

    pub fn remove_group(&mut self, path: &str) -> Result<RemovedGroup> {
        let id = self.group_at(path)?;
        let removed = self.groups.remove_group(id)?;
        self.save_groups()?;
        Ok(removed)
    }

    /// Replaces the group tree with the groups named in the sorting tool's
    /// masterlist and userlist.
    pub fn import_sort_groups(
        &mut self,
        masterlist: &Path,
        userlist: &Path,
    ) -> Result<ImportedGroups> {
        let (tree, imported) = GroupTree::from_sort_lists(
            self.order.entries().iter().map(|entry| entry.name.as_str()),
            &[masterlist, userlist],
        )?;
        self.groups = tree;
        self.save_groups()?;
        Ok(imported)
    }

    /// An empty group path unassigns the plugin.
    pub fn assign_group(&mut self, plugin: &str, path: &str) -> Result<()> {
        let Some(entry) = self.store.get(plugin) else {
            return Err(EngineError::UnknownPlugin(plugin.to_string()).into());
        };
        let name = entry.name.clone();
        let group = if path.trim().is_empty() {
            ROOT_GROUP
        } else {
            self.group_at(path)?
        };
        self.groups.assign(&name, group)?;
        self.save_groups()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugsmith::game::GameId;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn write_plugin(dir: &Path, name: &str) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"TES4");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        fs::write(dir.join(name), bytes).unwrap();
    }

    fn fixture() -> (TempDir, App) {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let mods_dir = dir.path().join("mods");
        for (origin, files) in [("alpha", ["A.esp", "shared.txt"]), ("beta", ["B.esp", "shared.txt"])] {
            let root = mods_dir.join(origin);
            fs::create_dir_all(&root).unwrap();
            for file in files {
                if file.ends_with(".esp") {
                    write_plugin(&root, file);
                } else {
                    fs::write(root.join(file), origin).unwrap();
                }
            }
        }
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(
            data_dir.join("library.json"),
            r#"{"origins": [{"id": "alpha", "priority": 1}, {"id": "beta", "priority": 2}]}"#,
        )
        .unwrap();

        let config = GameConfig {
            game_id: GameId::SkyrimSe,
            game_name: GameId::SkyrimSe.display_name().to_string(),
            data_dir,
            game_root: PathBuf::new(),
            mods_dir,
            active_profile: "Default".to_string(),
            sort_tool: PathBuf::new(),
            launcher_wrapper: Vec::new(),
            offline: false,
            masterlist: PathBuf::new(),
            userlist: PathBuf::new(),
            ignore_master_conflicts: false,
            locked_disabled: Vec::new(),
            backups_to_keep: 3,
        };
        let app = App::open(AppConfig::default(), config).unwrap();
        (dir, app)
    }

    #[test]
    fn open_builds_order_and_conflicts() {
        let (_dir, app) = fixture();
        assert_eq!(app.order.names(), vec!["A.esp", "B.esp"]);
        assert_eq!(app.conflicts.winner("shared.txt"), Some("beta"));
        let others = app.conflicting_mods("alpha", false).unwrap();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].origin_id, "beta");
    }

    #[test]
    fn mutations_are_persisted_to_the_profile() {
        let (_dir, mut app) = fixture();
        app.set_enabled("B.esp", true).unwrap();
        app.send_to_top("B.esp").unwrap();
        let raw = fs::read_to_string(app.plugins_path()).unwrap();
        assert!(raw.contains("*B.esp\nA.esp\n"));

        let reopened = App::open(app.app_config.clone(), app.config.clone()).unwrap();
        assert_eq!(reopened.order.snapshot(), app.order.snapshot());
    }

    #[test]
    fn groups_round_trip_through_the_profile() {
        let (_dir, mut app) = fixture();
        app.create_group("", "Patches").unwrap();
        app.assign_group("a.esp", "Patches").unwrap();
        let reopened = App::open(app.app_config.clone(), app.config.clone()).unwrap();
        let group = reopened.groups.find_path("Patches").unwrap();
        assert_eq!(reopened.groups.group_of("A.esp"), group);
        assert!(app.assign_group("Missing.esp", "Patches").is_err());
    }

    #[test]
    fn moves_carry_plugins_into_neighbouring_groups() {
        let (_dir, mut app) = fixture();
        write_plugin(&app.config.mods_dir.join("beta"), "C.esp");
        app.refresh().unwrap();
        assert_eq!(app.order.names(), vec!["A.esp", "B.esp", "C.esp"]);
        app.create_group("", "Core").unwrap();
        app.assign_group("A.esp", "Core").unwrap();
        app.assign_group("B.esp", "Core").unwrap();

        app.move_plugin("C.esp", 1).unwrap();
        let core = app.groups.find_path("Core").unwrap();
        assert_eq!(app.groups.group_of("C.esp"), core);
        let raw = fs::read_to_string(app.groups_path()).unwrap();
        assert!(raw.contains("C.esp|Core"));
        assert!(app.move_plugin("Missing.esp", 0).is_err());
    }

    #[test]
    fn imported_sort_groups_replace_the_tree() {
        let (dir, mut app) = fixture();
        app.create_group("", "Old").unwrap();
        let masterlist = dir.path().join("masterlist.yaml");
        fs::write(&masterlist, "plugins:\n  - name: 'B.esp'\n    group: Late\n").unwrap();

        let imported = app
            .import_sort_groups(&masterlist, &dir.path().join("userlist.yaml"))
            .unwrap();
        assert_eq!(imported.plugins, 1);
        assert!(app.groups.find_path("Old").is_none());

        let reopened = App::open(app.app_config.clone(), app.config.clone()).unwrap();
        let late = reopened.groups.group_of("B.esp");
        assert_eq!(reopened.groups.path(late).unwrap(), "Late");
    }

    #[test]
    fn moving_a_file_refreshes_conflicts() {
        let (_dir, mut app) = fixture();
        app.move_file("beta", Path::new("shared.txt"), Path::new("optional/shared.txt"))
            .unwrap();
        assert_eq!(app.conflicts.winner("shared.txt"), Some("alpha"));
        assert!(app.conflicting_mods("alpha", false).unwrap().is_empty());
    }

    #[test]
    fn sorting_without_a_tool_leaves_the_order_unlocked() {
        let (_dir, mut app) = fixture();
        assert!(app.start_sort(true).is_err());
        assert!(!app.order.is_locked());
        assert!(!app.is_sorting());
    }

    #[cfg(unix)]
    mod sorting {
        use super::*;
        use plugsmith::plugins_txt::read_loadorder_txt;
        use pretty_assertions::assert_eq;
        use std::{fs, time::Instant};
        use tempfile::TempDir;

        const ARGS: &str = r#"
out=""
list=""
while [ $# -gt 0 ]; do
  case "$1" in
    --out) out="$2"; shift ;;
    --pluginListPath) list="$2"; shift ;;
  esac
  shift
done
"#;

        fn with_oracle(app: &mut App, dir: &TempDir, body: &str) {
            let path = dir.path().join("oracle.sh");
            fs::write(&path, format!("{ARGS}{body}")).unwrap();
            app.config.sort_tool = path;
            app.config.launcher_wrapper = vec!["/bin/sh".to_string()];
        }

        fn wait_for_result(app: &mut App) -> Result<SortResult> {
            let started = Instant::now();
            loop {
                if let Some(result) = app.poll_sort().transpose() {
                    return result;
                }
                assert!(started.elapsed() < Duration::from_secs(20));
                thread::sleep(Duration::from_millis(20));
            }
        }

        fn saved_order(app: &App) -> Vec<String> {
            read_loadorder_txt(&app.loadorder_path()).unwrap()
        }

        #[test]
        fn successful_sort_backs_up_and_persists_the_order() {
            let (dir, mut app) = fixture();
            app.set_enabled("B.esp", true).unwrap();
            with_oracle(
                &mut app,
                &dir,
                "echo '[progress] 4'\nprintf '%s\\n' B.esp A.esp > \"$list\"\necho '{}' > \"$out\"\n",
            );

            let result = app.run_sort_blocking(true).unwrap();
            let SortResult::Applied { commit, .. } = result else {
                panic!("sort was not applied");
            };
            assert_eq!(commit.moved, 1);
            assert_eq!(app.order.names(), vec!["B.esp", "A.esp"]);
            assert_eq!(saved_order(&app), vec!["B.esp", "A.esp"]);
            let raw = fs::read_to_string(app.plugins_path()).unwrap();
            assert!(raw.contains("*B.esp\nA.esp\n"));

            let backups = app.backups.list().unwrap();
            assert_eq!(backups.len(), 1);
            let saved: Vec<String> = app
                .backups
                .load(&backups[0].id)
                .unwrap()
                .into_iter()
                .map(|entry| entry.name)
                .collect();
            assert_eq!(saved, vec!["A.esp", "B.esp"]);

            assert!(!app.order.is_locked());
            assert!(!app.is_sorting());
            assert_eq!(app.sort_stage(), SortStage::Idle);
            assert!(!app.sort_list_path().exists());
        }

        #[test]
        fn failed_sort_keeps_the_saved_order() {
            let scripts = [
                "printf '%s\\n' B.esp A.esp > \"$list\"\necho 'not json' > \"$out\"\n",
                "printf '%s\\n' B.esp A.esp > \"$list\"\nexit 3\n",
            ];
            for script in scripts {
                let (dir, mut app) = fixture();
                app.save_order().unwrap();
                with_oracle(&mut app, &dir, script);

                let err = app.run_sort_blocking(true).unwrap_err();
                assert!(matches!(
                    err.downcast_ref::<EngineError>(),
                    Some(EngineError::ReportParse(_)) | Some(EngineError::ExternalToolExit { code: 3 })
                ));
                assert_eq!(app.order.names(), vec!["A.esp", "B.esp"]);
                assert_eq!(saved_order(&app), vec!["A.esp", "B.esp"]);
                assert!(!app.order.is_locked());
                assert!(!app.is_sorting());
                assert_eq!(app.sort_stage(), SortStage::Failed);
            }
        }

        #[test]
        fn rejected_proposal_unlocks_and_keeps_the_order() {
            let (dir, mut app) = fixture();
            write_plugin(&app.config.mods_dir.join("alpha"), "Skyrim.esm");
            app.refresh().unwrap();
            assert_eq!(app.order.names(), vec!["Skyrim.esm", "A.esp", "B.esp"]);
            with_oracle(
                &mut app,
                &dir,
                "printf '%s\\n' B.esp A.esp Skyrim.esm > \"$list\"\necho '{}' > \"$out\"\n",
            );

            let err = app.run_sort_blocking(true).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<EngineError>(),
                Some(EngineError::ForcedPosition { .. })
            ));
            assert_eq!(app.order.names(), vec!["Skyrim.esm", "A.esp", "B.esp"]);
            assert_eq!(saved_order(&app), vec!["Skyrim.esm", "A.esp", "B.esp"]);
            assert!(!app.order.is_locked());
            assert_eq!(app.sort_stage(), SortStage::Failed);
            app.move_plugin("B.esp", 1).unwrap();
        }

        #[test]
        fn cancelled_sort_returns_to_idle() {
            let (dir, mut app) = fixture();
            app.save_order().unwrap();
            with_oracle(
                &mut app,
                &dir,
                "echo '[progress] 3'\necho '[progress] 4'\nexec sleep 30\n",
            );
            let before = app.order.snapshot();

            app.start_sort(true).unwrap();
            assert!(app.is_sorting());
            assert!(matches!(
                app.set_enabled("A.esp", true).unwrap_err().downcast_ref::<EngineError>(),
                Some(EngineError::OrderLocked)
            ));
            let started = Instant::now();
            while app.sort_stage() != SortStage::Sorting {
                assert!(started.elapsed() < Duration::from_secs(20));
                assert!(app.poll_sort().unwrap().is_none());
                thread::sleep(Duration::from_millis(20));
            }

            app.cancel_sort();
            assert!(matches!(wait_for_result(&mut app), Ok(SortResult::Cancelled)));
            assert_eq!(app.sort_stage(), SortStage::Idle);
            assert!(!app.order.is_locked());
            assert_eq!(app.order.snapshot(), before);
            assert_eq!(saved_order(&app), vec!["A.esp", "B.esp"]);
        }
    }
}
