use crate::app::{App, SortResult};
use anyhow::{bail, Result};
use plugsmith::{
    backup::BackupInfo,
    groups::ROOT_GROUP,
    load_order::ModIndex,
    loot::Severity,
    EngineError,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

struct GlobalOptions {
    format: OutputFormat,
    profile: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    PluginsList,
    Enable(String),
    Disable(String),
    EnableAll { yes: bool },
    DisableAll { yes: bool },
    Move { plugin: String, position: usize },
    Priority { plugin: String, priority: i64 },
    Shift { plugin: String, offset: i64 },
    Top(String),
    Bottom(String),
    Check,
    Stats,
    ConflictsAll,
    Conflicts { origin: String, nearest: bool, files: bool },
    Sort { offline: bool, report: bool },
    BackupCreate,
    BackupList,
    BackupRestore(String),
    BackupPrune(usize),
    GroupsList,
    GroupCreate { parent: String, name: String },
    GroupRename { path: String, name: String },
    GroupRemove { path: String, yes: bool },
    GroupAssign { plugin: String, group: String },
    GroupImport { masterlist: Option<PathBuf>, userlist: Option<PathBuf>, yes: bool },
    FilesMove { origin: String, from: PathBuf, to: PathBuf },
    Paths,
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, tokens) = parse_global_options(&args);
    let command = parse_command(&tokens)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("plugsmith v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let mut app = App::initialize(global.profile.as_deref())?;
            run_command(&mut app, command, global.format)
        }
    }
}

fn parse_global_options(args: &[String]) -> (GlobalOptions, Vec<String>) {
    let mut format = OutputFormat::Text;
    let mut profile = None;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            if let Some(parsed) = OutputFormat::parse(value) {
                format = parsed;
            }
            continue;
        }
        if arg == "--format" {
            if let Some(value) = iter.next() {
                if let Some(parsed) = OutputFormat::parse(value) {
                    format = parsed;
                }
            }
            continue;
        }
        if let Some(value) = arg.strip_prefix("--profile=") {
            profile = Some(value.to_string());
            continue;
        }
        if arg == "--profile" {
            if let Some(value) = iter.next() {
                profile = Some(value.to_string());
            }
            continue;
        }
        tokens.push(arg.to_string());
    }

    (GlobalOptions { format, profile }, tokens)
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let words: Vec<&str> = tokens
        .iter()
        .map(String::as_str)
        .filter(|token| !token.starts_with("--"))
        .collect();
    let has_flag = |flag: &str| tokens.iter().any(|token| token == flag);
    let arg = |index: usize, what: &str| -> Result<String> {
        words
            .get(index)
            .map(|value| value.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing {what}"))
    };

    if has_flag("--help") {
        return Ok(CliCommand::Help);
    }
    if has_flag("--version") {
        return Ok(CliCommand::Version);
    }
    let Some(head) = words.first().copied() else {
        return Ok(CliCommand::Help);
    };
    let command = match head {
        "help" | "-h" => CliCommand::Help,
        "version" | "-V" => CliCommand::Version,
        "plugins" => match words.get(1).copied() {
            None | Some("list") => CliCommand::PluginsList,
            Some(other) => bail!("Unknown plugins command: {other}"),
        },
        "enable" => CliCommand::Enable(arg(1, "plugin name")?),
        "disable" => CliCommand::Disable(arg(1, "plugin name")?),
        "enable-all" => CliCommand::EnableAll { yes: has_flag("--yes") },
        "disable-all" => CliCommand::DisableAll { yes: has_flag("--yes") },
        "move" => CliCommand::Move {
            plugin: arg(1, "plugin name")?,
            position: parse_number(&arg(2, "position")?)?,
        },
        "priority" => {
            let plugin = arg(1, "plugin name")?;
            let value = arg(2, "priority")?;
            // `+n` / `-n` shift relative to the current position.
            match value.strip_prefix('+') {
                Some(rest) => CliCommand::Shift {
                    plugin,
                    offset: parse_number(rest)?,
                },
                None if value.starts_with('-') => CliCommand::Shift {
                    plugin,
                    offset: parse_number(&value)?,
                },
                None => CliCommand::Priority {
                    plugin,
                    priority: parse_number(&value)?,
                },
            }
        }
        "top" => CliCommand::Top(arg(1, "plugin name")?),
        "bottom" => CliCommand::Bottom(arg(1, "plugin name")?),
        "check" => CliCommand::Check,
        "stats" => CliCommand::Stats,
        "conflicts" => match words.get(1) {
            None => CliCommand::ConflictsAll,
            Some(origin) => CliCommand::Conflicts {
                origin: origin.to_string(),
                nearest: has_flag("--nearest"),
                files: has_flag("--files"),
            },
        },
        "sort" => CliCommand::Sort {
            offline: has_flag("--offline"),
            report: has_flag("--report"),
        },
        "backup" => match words.get(1).copied() {
            None | Some("list") => CliCommand::BackupList,
            Some("create") => CliCommand::BackupCreate,
            Some("restore") => CliCommand::BackupRestore(arg(2, "backup id")?),
            Some("prune") => CliCommand::BackupPrune(parse_number(&arg(2, "count")?)?),
            Some(other) => bail!("Unknown backup command: {other}"),
        },
        "groups" => match words.get(1).copied() {
            None | Some("list") => CliCommand::GroupsList,
            Some("create") => {
                // `groups create <name>` creates below the root.
                if words.len() > 3 {
                    CliCommand::GroupCreate {
                        parent: arg(2, "parent group")?,
                        name: arg(3, "group name")?,
                    }
                } else {
                    CliCommand::GroupCreate {
                        parent: String::new(),
                        name: arg(2, "group name")?,
                    }
                }
            }
            Some("rename") => CliCommand::GroupRename {
                path: arg(2, "group")?,
                name: arg(3, "new name")?,
            },
            Some("remove") => CliCommand::GroupRemove {
                path: arg(2, "group")?,
                yes: has_flag("--yes"),
            },
            Some("assign") => CliCommand::GroupAssign {
                plugin: arg(2, "plugin name")?,
                group: words.get(3).map(|value| value.to_string()).unwrap_or_default(),
            },
            Some("import") => CliCommand::GroupImport {
                masterlist: words.get(2).map(PathBuf::from),
                userlist: words.get(3).map(PathBuf::from),
                yes: has_flag("--yes"),
            },
            Some(other) => bail!("Unknown groups command: {other}"),
        },
        "files" => match words.get(1).copied() {
            Some("mv") => CliCommand::FilesMove {
                origin: arg(2, "mod id")?,
                from: PathBuf::from(arg(3, "source path")?),
                to: PathBuf::from(arg(4, "destination path")?),
            },
            _ => bail!("Unknown files command (use 'files mv <mod> <from> <to>')"),
        },
        "paths" => CliCommand::Paths,
        other => bail!("Unknown command: {other} (see 'plugsmith help')"),
    };
    Ok(command)
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("not a number: {value}"))
}

fn run_command(app: &mut App, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::PluginsList => list_plugins(app, format),
        CliCommand::Enable(plugin) => {
            app.set_enabled(&plugin, true)?;
            println!("Enabled {plugin}");
            Ok(())
        }
        CliCommand::Disable(plugin) => {
            app.set_enabled(&plugin, false)?;
            println!("Disabled {plugin}");
            Ok(())
        }
        CliCommand::EnableAll { yes } | CliCommand::DisableAll { yes }
            if app.app_config.confirm_bulk_toggle && !yes =>
        {
            bail!("This changes every plugin; re-run with --yes to confirm")
        }
        CliCommand::EnableAll { .. } => {
            let changed = app.set_all_enabled(true)?;
            println!("Enabled {changed} plugin(s)");
            Ok(())
        }
        CliCommand::DisableAll { .. } => {
            let changed = app.set_all_enabled(false)?;
            println!("Disabled {changed} plugin(s)");
            Ok(())
        }
        CliCommand::Move { plugin, position } => {
            app.move_plugin(&plugin, position)?;
            print_position(app, &plugin);
            Ok(())
        }
        CliCommand::Priority { plugin, priority } => {
            app.set_priority(&plugin, priority)?;
            print_position(app, &plugin);
            Ok(())
        }
        CliCommand::Shift { plugin, offset } => {
            app.shift_priority(&plugin, offset)?;
            print_position(app, &plugin);
            Ok(())
        }
        CliCommand::Top(plugin) => {
            app.send_to_top(&plugin)?;
            print_position(app, &plugin);
            Ok(())
        }
        CliCommand::Bottom(plugin) => {
            app.send_to_bottom(&plugin)?;
            print_position(app, &plugin);
            Ok(())
        }
        CliCommand::Check => check_order(app, format),
        CliCommand::Stats => print_stats(app, format),
        CliCommand::ConflictsAll => list_all_conflicts(app, format),
        CliCommand::Conflicts {
            origin,
            nearest,
            files,
        } => list_conflicts(app, &origin, nearest, files, format),
        CliCommand::Sort { offline, report } => sort(app, offline, report, format),
        CliCommand::BackupCreate => {
            let info = app.create_backup()?;
            print_backups(&[info], format)
        }
        CliCommand::BackupList => match app.backups.list() {
            Ok(backups) => print_backups(&backups, format),
            Err(EngineError::NoBackups) => {
                if format == OutputFormat::Json {
                    println!("[]");
                } else {
                    println!("No backups");
                }
                Ok(())
            }
            Err(err) => Err(err.into()),
        },
        CliCommand::BackupRestore(id) => {
            let warnings = app.restore_backup(&id)?;
            println!("Restored backup {id}");
            for warning in warnings {
                println!("Warning: {warning}");
            }
            Ok(())
        }
        CliCommand::BackupPrune(keep) => {
            let removed = app.backups.prune(keep)?;
            println!("Removed {removed} backup(s)");
            Ok(())
        }
        CliCommand::GroupsList => list_groups(app, format),
        CliCommand::GroupCreate { parent, name } => {
            app.create_group(&parent, &name)?;
            println!("Created group {name}");
            Ok(())
        }
        CliCommand::GroupRename { path, name } => {
            app.rename_group(&path, &name)?;
            println!("Renamed {path} to {name}");
            Ok(())
        }
        CliCommand::GroupRemove { path, yes } => {
            if app.app_config.confirm_group_remove && !yes {
                bail!("Removing {path} moves its contents to the parent; re-run with --yes");
            }
            let removed = app.remove_group(&path)?;
            println!(
                "Removed {path} ({} group(s), {} plugin(s) moved up)",
                removed.children_moved, removed.plugins_moved
            );
            Ok(())
        }
        CliCommand::GroupAssign { plugin, group } => {
            app.assign_group(&plugin, &group)?;
            if group.is_empty() {
                println!("Removed {plugin} from its group");
            } else {
                println!("Assigned {plugin} to {group}");
            }
            Ok(())
        }
        CliCommand::GroupImport {
            masterlist,
            userlist,
            yes,
        } => {
            if app.app_config.confirm_group_remove && !yes && !app.groups.walk().is_empty() {
                bail!("Importing replaces the current groups; re-run with --yes");
            }
            let masterlist = masterlist.unwrap_or_else(|| app.config.masterlist.clone());
            let userlist = userlist.unwrap_or_else(|| app.config.userlist.clone());
            if masterlist.as_os_str().is_empty() && userlist.as_os_str().is_empty() {
                bail!("no masterlist or userlist given (set masterlist/userlist in the game config)");
            }
            let imported = app.import_sort_groups(&masterlist, &userlist)?;
            println!(
                "Imported {} group(s) for {} plugin(s)",
                imported.groups, imported.plugins
            );
            Ok(())
        }
        CliCommand::FilesMove { origin, from, to } => {
            let dest = app.move_file(&origin, &from, &to)?;
            println!("Moved to {}", dest.display());
            Ok(())
        }
        CliCommand::Paths => list_paths(app, format),
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn print_position(app: &App, plugin: &str) {
    if let (Some(entry), Some(position)) = (app.order.get(plugin), app.order.position(plugin)) {
        println!("{} is now at position {position}", entry.name);
    }
}

#[derive(Serialize)]
struct PluginListItem<'a> {
    position: usize,
    name: &'a str,
    origin: &'a str,
    kind: &'static str,
    enabled: bool,
    mod_index: ModIndex,
    locked: bool,
    group: Option<String>,
    missing_masters: &'a [String],
}

fn list_plugins(app: &App, format: OutputFormat) -> Result<()> {
    let items: Vec<PluginListItem> = app
        .order
        .entries()
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            let group = app.groups.group_of(&entry.name);
            PluginListItem {
                position,
                name: &entry.name,
                origin: &entry.origin,
                kind: entry.kind_label(),
                enabled: entry.enabled,
                mod_index: entry.mod_index,
                locked: !entry.can_be_toggled(),
                group: (group != ROOT_GROUP)
                    .then(|| app.groups.path(group).ok())
                    .flatten(),
                missing_masters: &entry.missing_masters,
            }
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            for item in items {
                let mark = match (item.enabled, item.locked) {
                    (true, true) => "#",
                    (true, false) => "*",
                    (false, true) => "-",
                    (false, false) => " ",
                };
                let mut line = format!(
                    "{:>4} {mark} {:<8} {:<4} {}",
                    item.position,
                    item.mod_index.to_string(),
                    item.kind,
                    item.name
                );
                if let Some(group) = item.group {
                    line.push_str(&format!("  [{group}]"));
                }
                if !item.missing_masters.is_empty() {
                    line.push_str(&format!(
                        "  (missing: {})",
                        item.missing_masters.join(", ")
                    ));
                }
                println!("{line}");
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    violations: Vec<String>,
    missing_masters: Vec<MissingMasters<'a>>,
    unreadable: Vec<UnreadablePlugin<'a>>,
}

#[derive(Serialize)]
struct MissingMasters<'a> {
    plugin: &'a str,
    masters: &'a [String],
}

#[derive(Serialize)]
struct UnreadablePlugin<'a> {
    plugin: &'a str,
    origin: &'a str,
    error: String,
}

fn check_order(app: &App, format: OutputFormat) -> Result<()> {
    let output = CheckOutput {
        violations: app
            .order
            .validate_master_order()
            .iter()
            .map(ToString::to_string)
            .collect(),
        missing_masters: app
            .order
            .missing_masters()
            .into_iter()
            .map(|(plugin, masters)| MissingMasters { plugin, masters })
            .collect(),
        unreadable: app
            .load_failures
            .iter()
            .map(|failure| UnreadablePlugin {
                plugin: &failure.name,
                origin: &failure.origin,
                error: failure.error.to_string(),
            })
            .collect(),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            if output.violations.is_empty()
                && output.missing_masters.is_empty()
                && output.unreadable.is_empty()
            {
                println!("No problems found");
            }
            for violation in &output.violations {
                println!("Order: {violation}");
            }
            for missing in &output.missing_masters {
                println!(
                    "Missing masters for {}: {}",
                    missing.plugin,
                    missing.masters.join(", ")
                );
            }
            for failure in &output.unreadable {
                println!("Unreadable: {} ({}): {}", failure.plugin, failure.origin, failure.error);
            }
        }
    }
    Ok(())
}

fn print_stats(app: &App, format: OutputFormat) -> Result<()> {
    let stats = app.order.stats();
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Text => {
            println!("Plugins: {} ({} active)", stats.total, stats.active);
            println!("Masters: {}", stats.active_masters);
            println!("Regular: {}", stats.active_regular);
            println!("Light: {}", stats.active_light);
            println!("Overlay: {}", stats.active_overlay);
        }
    }
    Ok(())
}

fn list_conflicts(
    app: &App,
    origin: &str,
    nearest: bool,
    files: bool,
    format: OutputFormat,
) -> Result<()> {
    let others = app.conflicting_mods(origin, nearest)?;
    let sets = if files {
        Some(app.conflict_sets(origin)?)
    } else {
        None
    };

    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Output<'a> {
                origin: &'a str,
                conflicting: &'a [plugsmith::conflicts::ConflictingOrigin],
                #[serde(skip_serializing_if = "Option::is_none")]
                files: Option<&'a plugsmith::conflicts::ConflictSets>,
            }
            let output = Output {
                origin,
                conflicting: &others,
                files: sets.as_ref(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            if others.is_empty() {
                println!("{origin} has no conflicts");
            }
            for other in &others {
                let relation = match other.relation {
                    plugsmith::conflicts::ConflictRelation::Overwrites => "overwrites",
                    plugsmith::conflicts::ConflictRelation::OverwrittenBy => "overwritten by",
                };
                println!(
                    "{relation} {} ({} file(s))",
                    other.origin_name, other.shared_files
                );
            }
            if let Some(sets) = sets {
                for path in &sets.winning {
                    println!("  + {path}");
                }
                for path in &sets.losing {
                    println!("  - {path}");
                }
                println!("  {} file(s) without conflicts", sets.unique.len());
            }
        }
    }
    Ok(())
}

fn list_all_conflicts(app: &App, format: OutputFormat) -> Result<()> {
    let entries = app.conflicts.entries();
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No file conflicts");
            }
            for entry in entries {
                let losers: Vec<&str> = entry
                    .candidates
                    .iter()
                    .filter(|candidate| candidate.origin_id != entry.winner_id)
                    .map(|candidate| candidate.origin_name.as_str())
                    .collect();
                println!(
                    "{}: {} (over {})",
                    entry.relative_path,
                    entry.winner_name,
                    losers.join(", ")
                );
            }
        }
    }
    Ok(())
}

fn sort(app: &mut App, offline: bool, show_report: bool, format: OutputFormat) -> Result<()> {
    match app.run_sort_blocking(offline)? {
        SortResult::Cancelled => {
            println!("Sorting cancelled");
        }
        SortResult::Applied { commit, report } => match format {
            OutputFormat::Json => {
                #[derive(Serialize)]
                struct Output<'a> {
                    commit: &'a plugsmith::load_order::CommitOutcome,
                    diagnostics: Vec<plugsmith::loot::Diagnostic>,
                    report: &'a plugsmith::loot::SortReport,
                }
                let output = Output {
                    commit: &commit,
                    diagnostics: report.diagnostics(),
                    report: &report,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                println!("Sorted, {} plugin(s) moved", commit.moved);
                for warning in &commit.warnings {
                    println!("Warning: {warning}");
                }
                for diagnostic in report.diagnostics() {
                    let label = match diagnostic.severity {
                        Severity::Error => "Error",
                        Severity::Warning => "Warning",
                    };
                    match diagnostic.plugin {
                        Some(plugin) => println!("{label} [{plugin}]: {}", diagnostic.text),
                        None => println!("{label}: {}", diagnostic.text),
                    }
                }
                if show_report {
                    println!();
                    println!("{}", report.to_markdown());
                }
            }
        },
    }
    Ok(())
}

#[derive(Serialize)]
struct BackupItem<'a> {
    id: &'a str,
    created: String,
    plugins: usize,
    path: String,
}

fn print_backups(backups: &[BackupInfo], format: OutputFormat) -> Result<()> {
    let items: Vec<BackupItem> = backups
        .iter()
        .map(|backup| BackupItem {
            id: &backup.id,
            created: backup.created(),
            plugins: backup.plugins,
            path: backup.path.display().to_string(),
        })
        .collect();
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            for item in items {
                println!("{}  {}  {} plugin(s)", item.id, item.created, item.plugins);
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct GroupItem {
    path: String,
    collapsed: bool,
    plugins: Vec<String>,
}

fn list_groups(app: &App, format: OutputFormat) -> Result<()> {
    let mut items = Vec::new();
    for id in app.groups.walk() {
        items.push(GroupItem {
            path: app.groups.path(id)?,
            collapsed: app.groups.is_collapsed(id)?,
            plugins: app.groups.plugins_in(id)?.to_vec(),
        });
    }
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No groups");
            }
            for item in items {
                let depth = item.path.matches('/').count();
                let name = item.path.rsplit('/').next().unwrap_or_default();
                println!("{}{} ({})", "  ".repeat(depth), name, item.plugins.len());
                for plugin in item.plugins {
                    println!("{}  - {plugin}", "  ".repeat(depth));
                }
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct PathsOutput {
    game: String,
    game_root: String,
    game_data: Option<String>,
    mods_dir: String,
    data_dir: String,
    profile_dir: String,
    plugins_txt: String,
    sort_tool: String,
}

fn list_paths(app: &App, format: OutputFormat) -> Result<()> {
    let output = PathsOutput {
        game: app.config.game_name.clone(),
        game_root: app.config.game_root.display().to_string(),
        game_data: app
            .config
            .game_data_dir()
            .map(|path| path.display().to_string()),
        mods_dir: app.config.mods_dir.display().to_string(),
        data_dir: app.config.data_dir.display().to_string(),
        profile_dir: app.profile_dir().display().to_string(),
        plugins_txt: app.plugins_path().display().to_string(),
        sort_tool: app.config.sort_tool.display().to_string(),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Game: {}", output.game);
            println!("Game root: {}", output.game_root);
            if let Some(data) = &output.game_data {
                println!("Game data: {data}");
            } else {
                println!("Warning: game root is not configured");
            }
            println!("Mods dir: {}", output.mods_dir);
            println!("Data dir: {}", output.data_dir);
            println!("Profile: {}", output.profile_dir);
            println!("plugins.txt: {}", output.plugins_txt);
            println!("Sorting tool: {}", output.sort_tool);
        }
    }
    Ok(())
}

fn print_help() {
    println!("plugsmith v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  plugsmith plugins [list]                List plugins in load order");
    println!("  plugsmith enable|disable <plugin>       Toggle one plugin");
    println!("  plugsmith enable-all|disable-all --yes  Toggle every plugin");
    println!("  plugsmith move <plugin> <position>      Move to a 0-based position");
    println!("  plugsmith priority <plugin> <n|+n|-n>   Set or shift priority (clamped)");
    println!("  plugsmith top|bottom <plugin>           Send to the top or bottom");
    println!("  plugsmith check                         Report master order problems");
    println!("  plugsmith stats                         Count active plugins by type");
    println!("  plugsmith conflicts [<mod> [--nearest] [--files]]");
    println!("                                          Show file conflicts");
    println!("  plugsmith sort [--offline] [--report]   Run the sorting tool");
    println!("  plugsmith backup create|list|restore <id>|prune <n>");
    println!("  plugsmith groups list|create [<parent>] <name>|rename <group> <name>");
    println!("  plugsmith groups remove <group> --yes|assign <plugin> [<group>]");
    println!("  plugsmith groups import [<masterlist> [<userlist>]] --yes");
    println!("  plugsmith files mv <mod> <from> <to>    Move a file inside a mod");
    println!("  plugsmith paths                         Show configured paths");
    println!();
    println!("Global options:");
    println!("  --format <json|text>                    Output format");
    println!("  --profile <name>                        Profile to operate on");
    println!("  -h, --help                              Show help");
    println!("  -V, --version                           Show version");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn global_options_are_stripped() {
        let (global, rest) =
            parse_global_options(&tokens("--format json plugins --profile=Survival list"));
        assert_eq!(global.format, OutputFormat::Json);
        assert_eq!(global.profile.as_deref(), Some("Survival"));
        assert_eq!(rest, tokens("plugins list"));
    }

    #[test]
    fn commands_parse_with_flags_anywhere() {
        assert_eq!(
            parse_command(&tokens("conflicts --files alpha --nearest")).unwrap(),
            CliCommand::Conflicts {
                origin: "alpha".to_string(),
                nearest: true,
                files: true,
            }
        );
        assert_eq!(
            parse_command(&tokens("move Patch.esp 3")).unwrap(),
            CliCommand::Move {
                plugin: "Patch.esp".to_string(),
                position: 3,
            }
        );
        assert_eq!(
            parse_command(&tokens("groups create Patches")).unwrap(),
            CliCommand::GroupCreate {
                parent: String::new(),
                name: "Patches".to_string(),
            }
        );
        assert_eq!(
            parse_command(&tokens("priority Patch.esp -2")).unwrap(),
            CliCommand::Shift {
                plugin: "Patch.esp".to_string(),
                offset: -2,
            }
        );
        assert_eq!(
            parse_command(&tokens("groups import --yes lists/masterlist.yaml")).unwrap(),
            CliCommand::GroupImport {
                masterlist: Some(PathBuf::from("lists/masterlist.yaml")),
                userlist: None,
                yes: true,
            }
        );
        assert_eq!(
            parse_command(&tokens("disable-all")).unwrap(),
            CliCommand::DisableAll { yes: false }
        );
        assert_eq!(parse_command(&[]).unwrap(), CliCommand::Help);
        assert_eq!(parse_command(&tokens("--version")).unwrap(), CliCommand::Version);
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(parse_command(&tokens("move Patch.esp later")).is_err());
        assert!(parse_command(&tokens("priority Patch.esp +x")).is_err());
        assert!(parse_command(&tokens("enable")).is_err());
        assert!(parse_command(&tokens("frobnicate")).is_err());
        assert!(parse_command(&tokens("files rm a b")).is_err());
    }
}
