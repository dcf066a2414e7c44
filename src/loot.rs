use crate::{
    error::{EngineError, EngineResult},
    game::GameId,
    load_order::{CommitOutcome, LoadOrder, SnapshotEntry, SortToken},
    plugin::name_key,
    plugins_txt::{read_loadorder_txt, write_loadorder_txt},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    ffi::OsString,
    fmt, fs,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortStage {
    Idle,
    CheckingMasterlist,
    UpdatingMasterlist,
    LoadingLists,
    ReadingPlugins,
    Sorting,
    WritingOrder,
    ParsingMessages,
    Done,
    Failed,
    Cancelled,
}

impl SortStage {
    /// Maps the oracle's `[progress] <n>` values.
    pub fn from_progress(value: u32) -> Option<Self> {
        Some(match value {
            0 => SortStage::CheckingMasterlist,
            1 => SortStage::UpdatingMasterlist,
            2 => SortStage::LoadingLists,
            3 => SortStage::ReadingPlugins,
            4 => SortStage::Sorting,
            5 => SortStage::WritingOrder,
            6 => SortStage::ParsingMessages,
            7 => SortStage::Done,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SortStage::Done | SortStage::Failed | SortStage::Cancelled
        )
    }

    /// Stages only move forward; failure and cancellation end any running stage.
    pub fn can_advance_to(self, next: SortStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            SortStage::Failed | SortStage::Cancelled => true,
            SortStage::Idle => false,
            _ => next > self,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortStage::Idle => "Idle",
            SortStage::CheckingMasterlist => "Checking masterlist existence",
            SortStage::UpdatingMasterlist => "Updating masterlist",
            SortStage::LoadingLists => "Loading lists",
            SortStage::ReadingPlugins => "Reading plugins",
            SortStage::Sorting => "Sorting plugins",
            SortStage::WritingOrder => "Writing load order",
            SortStage::ParsingMessages => "Parsing messages",
            SortStage::Done => "Done",
            SortStage::Failed => "Failed",
            SortStage::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for SortStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMessage {
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub text: String,
}

impl ReportMessage {
    fn to_markdown(&self) -> String {
        match self.kind {
            MessageKind::Error => format!("**Error**: {}", self.text),
            MessageKind::Warn => format!("**Warning**: {}", self.text),
            MessageKind::Info => self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incompatibility {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cleanliness {
    pub crc: u32,
    pub itm: u32,
    pub deleted_references: u32,
    pub deleted_navmesh: u32,
    pub cleaning_utility: String,
    pub info: String,
}

impl Cleanliness {
    fn utility(&self) -> &str {
        if self.cleaning_utility.is_empty() {
            "?"
        } else {
            &self.cleaning_utility
        }
    }

    pub fn dirty_text(&self) -> String {
        let mut text = format!(
            "{} found {} ITM record(s), {} deleted reference(s) and {} deleted navmesh(es).",
            self.utility(),
            self.itm,
            self.deleted_references,
            self.deleted_navmesh
        );
        if !self.info.is_empty() {
            text.push(' ');
            text.push_str(&self.info);
        }
        text
    }

    pub fn clean_text(&self) -> String {
        format!("Verified clean by {}", self.utility())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginReport {
    pub name: String,
    pub incompatibilities: Vec<Incompatibility>,
    pub messages: Vec<ReportMessage>,
    pub dirty: Vec<Cleanliness>,
    pub clean: Vec<Cleanliness>,
    pub missing_masters: Vec<String>,
    pub loads_archive: bool,
    pub is_master: bool,
    pub is_light_master: bool,
}

impl PluginReport {
    fn to_markdown(&self) -> String {
        let mut out = String::new();
        if !self.incompatibilities.is_empty() {
            let names: Vec<&str> = self
                .incompatibilities
                .iter()
                .map(|item| {
                    if item.display_name.is_empty() {
                        item.name.as_str()
                    } else {
                        item.display_name.as_str()
                    }
                })
                .collect();
            out.push_str(&format!(" - **Incompatibilities: {}**\n", names.join(", ")));
        }
        if !self.missing_masters.is_empty() {
            out.push_str(&format!(
                " - **Missing masters: {}**\n",
                self.missing_masters.join(", ")
            ));
        }
        for message in &self.messages {
            out.push_str(&format!(" - {}\n", message.to_markdown()));
        }
        for dirty in &self.dirty {
            out.push_str(&format!(" - {}\n", dirty.dirty_text()));
        }
        if out.is_empty() {
            return out;
        }
        format!("#### {}\n{out}", self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportStats {
    /// Milliseconds.
    pub time: u64,
    pub lootcli_version: String,
    pub loot_version: String,
}

/// The oracle's JSON report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawReport {
    pub messages: Vec<ReportMessage>,
    pub plugins: Vec<PluginReport>,
    pub stats: ReportStats,
    pub order: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub plugin: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SortReport {
    /// Error and warning lines the oracle printed while running.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub messages: Vec<ReportMessage>,
    pub plugins: Vec<PluginReport>,
    pub stats: ReportStats,
}

impl SortReport {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        let severity_of = |kind: MessageKind| match kind {
            MessageKind::Error => Some(Severity::Error),
            MessageKind::Warn => Some(Severity::Warning),
            MessageKind::Info => None,
        };
        for message in &self.messages {
            if let Some(severity) = severity_of(message.kind) {
                out.push(Diagnostic {
                    severity,
                    plugin: None,
                    text: message.text.clone(),
                });
            }
        }
        for plugin in &self.plugins {
            let scoped = |severity, text| Diagnostic {
                severity,
                plugin: Some(plugin.name.clone()),
                text,
            };
            if !plugin.incompatibilities.is_empty() {
                let names: Vec<&str> = plugin
                    .incompatibilities
                    .iter()
                    .map(|item| item.name.as_str())
                    .collect();
                out.push(scoped(
                    Severity::Error,
                    format!("Incompatible with {}", names.join(", ")),
                ));
            }
            if !plugin.missing_masters.is_empty() {
                out.push(scoped(
                    Severity::Error,
                    format!("Missing masters: {}", plugin.missing_masters.join(", ")),
                ));
            }
            for message in &plugin.messages {
                if let Some(severity) = severity_of(message.kind) {
                    out.push(scoped(severity, message.text.clone()));
                }
            }
            for dirty in &plugin.dirty {
                out.push(scoped(Severity::Warning, dirty.dirty_text()));
            }
        }
        out
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        if !self.errors.is_empty() {
            out.push_str("### Errors:\n");
            for error in &self.errors {
                out.push_str(&format!(" - {error}\n"));
            }
        }
        if !self.warnings.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("### Warnings:\n");
            for warning in &self.warnings {
                out.push_str(&format!(" - {warning}\n"));
            }
        }

        let mut body = String::new();
        if !self.messages.is_empty() {
            body.push_str("### General messages\n");
            for message in &self.messages {
                body.push_str(&format!(" - {}\n", message.to_markdown()));
            }
        }
        let plugin_sections: Vec<String> = self
            .plugins
            .iter()
            .map(PluginReport::to_markdown)
            .filter(|section| !section.is_empty())
            .collect();
        if !plugin_sections.is_empty() {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str("### Plugins\n");
            for section in plugin_sections {
                body.push_str(&section);
                body.push('\n');
            }
        }
        if body.is_empty() {
            body.push_str("**No messages.**\n");
        }
        body.push_str(&format!(
            "`stats: {:.2}s, lootcli {}, loot {}`",
            self.stats.time as f64 / 1000.0,
            self.stats.lootcli_version,
            self.stats.loot_version
        ));

        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&body);
        out
    }
}

/// Parsed report plus the proposed order.
#[derive(Debug, Clone)]
pub struct SortOutcome {
    pub report: SortReport,
    pub proposal: Vec<String>,
}

impl SortOutcome {
    pub fn apply(&self, order: &mut LoadOrder, token: SortToken) -> EngineResult<CommitOutcome> {
        order.commit_sorted(token, &self.proposal)
    }
}

#[derive(Debug)]
pub enum SortFinish {
    Completed(Box<SortOutcome>),
    Failed(EngineError),
    Cancelled,
}

impl SortFinish {
    pub fn stage(&self) -> SortStage {
        match self {
            SortFinish::Completed(_) => SortStage::Done,
            SortFinish::Failed(_) => SortStage::Failed,
            SortFinish::Cancelled => SortStage::Cancelled,
        }
    }
}

#[derive(Debug)]
pub enum SortEvent {
    Stage(SortStage),
    Log { level: log::Level, text: String },
    Finished(SortFinish),
}

/// How to launch the oracle, optionally through a wrapper such as `wine`.
#[derive(Debug, Clone)]
pub struct SortCommand {
    pub program: PathBuf,
    pub wrapper: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SortRequest {
    pub game: GameId,
    pub game_root: PathBuf,
    pub plugin_list_path: PathBuf,
    pub report_path: PathBuf,
    pub snapshot: Vec<SnapshotEntry>,
    pub offline: bool,
    pub log_level: String,
    pub language: String,
}

impl SortRequest {
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--game".into(),
            self.game.sort_tool_name().into(),
            "--gamePath".into(),
            self.game_root.clone().into_os_string(),
            "--pluginListPath".into(),
            self.plugin_list_path.clone().into_os_string(),
            "--logLevel".into(),
            self.log_level.clone().into(),
            "--out".into(),
            self.report_path.clone().into_os_string(),
            "--language".into(),
            self.language.clone().into(),
        ];
        if self.offline {
            args.push("--skipUpdateMasterlist".into());
        }
        args
    }
}

impl SortCommand {
    fn command(&self, request: &SortRequest) -> (PathBuf, Command) {
        let (program, mut args): (PathBuf, Vec<OsString>) = match self.wrapper.split_first() {
            Some((wrapper, rest)) => {
                let mut args: Vec<OsString> = rest.iter().map(OsString::from).collect();
                args.push(self.program.clone().into_os_string());
                (PathBuf::from(wrapper), args)
            }
            None => (self.program.clone(), Vec::new()),
        };
        args.extend(request.args());
        let mut command = Command::new(&program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        (program, command)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum OracleLine {
    Progress(u32),
    Log(log::Level, String),
}

fn parse_line(line: &str) -> Option<OracleLine> {
    let rest = line.trim().strip_prefix('[')?;
    let (tag, text) = rest.split_once(']')?;
    let text = text.trim();
    let level = match tag.trim().to_ascii_lowercase().as_str() {
        "progress" => return text.parse().ok().map(OracleLine::Progress),
        "trace" => log::Level::Trace,
        "debug" => log::Level::Debug,
        "info" => log::Level::Info,
        "warning" | "warn" => log::Level::Warn,
        "error" => log::Level::Error,
        _ => return None,
    };
    Some(OracleLine::Log(level, text.to_string()))
}

#[derive(Debug, Default)]
struct CollectedLines {
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// A running oracle invocation.
pub struct SortTask {
    rx: Receiver<SortEvent>,
    cancel: Arc<AtomicBool>,
    stage: SortStage,
    pid: u32,
    worker: Option<JoinHandle<()>>,
}

/// Launches the oracle. A launch failure is returned directly; later failures
/// arrive as a `Finished` event.
pub fn start_sort(command: &SortCommand, request: SortRequest) -> EngineResult<SortTask> {
    match fs::remove_file(&request.report_path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
        _ => {}
    }
    let names: Vec<String> = request
        .snapshot
        .iter()
        .map(|entry| entry.name.clone())
        .collect();
    write_loadorder_txt(&request.plugin_list_path, &names)?;

    let (program, mut process) = command.command(&request);
    log::info!(
        "running sorting tool {} ({})",
        program.display(),
        if request.offline { "offline" } else { "online" }
    );
    let mut child = process
        .spawn()
        .map_err(|source| EngineError::ExternalToolLaunch {
            program: program.clone(),
            source,
        })?;
    let pid = child.id();
    let stdout = child.stdout.take();

    let (tx, rx) = mpsc::channel();
    let cancel = Arc::new(AtomicBool::new(false));
    let worker_cancel = cancel.clone();
    let worker = thread::spawn(move || {
        let finish = supervise(child, stdout, &request, &worker_cancel, &tx);
        let _ = tx.send(SortEvent::Finished(finish));
    });

    Ok(SortTask {
        rx,
        cancel,
        stage: SortStage::Idle,
        pid,
        worker: Some(worker),
    })
}

fn supervise(
    mut child: Child,
    stdout: Option<std::process::ChildStdout>,
    request: &SortRequest,
    cancel: &AtomicBool,
    tx: &Sender<SortEvent>,
) -> SortFinish {
    let reader = stdout.map(|stdout| {
        let tx = tx.clone();
        thread::spawn(move || read_output(stdout, &tx))
    });

    let status = loop {
        if cancel.load(Ordering::SeqCst) {
            let _ = child.kill();
            let _ = child.wait();
            log::info!("sorting cancelled");
            return SortFinish::Cancelled;
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return SortFinish::Failed(err.into());
            }
        }
    };

    let collected = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if !status.success() {
        let code = status.code().unwrap_or(-1);
        for error in &collected.errors {
            log::error!("sorting tool: {error}");
        }
        return SortFinish::Failed(EngineError::ExternalToolExit { code });
    }

    let _ = tx.send(SortEvent::Stage(SortStage::ParsingMessages));
    match build_outcome(request, collected) {
        Ok(outcome) => SortFinish::Completed(Box::new(outcome)),
        Err(err) => SortFinish::Failed(err),
    }
}

fn read_output(stdout: std::process::ChildStdout, tx: &Sender<SortEvent>) -> CollectedLines {
    let mut collected = CollectedLines::default();
    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else {
            break;
        };
        match parse_line(&line) {
            // Done is only reached once the report has been parsed.
            Some(OracleLine::Progress(value)) => match SortStage::from_progress(value) {
                Some(SortStage::Done) => {}
                Some(stage) => {
                    let _ = tx.send(SortEvent::Stage(stage));
                }
                None => log::debug!("unknown sorting progress value {value}"),
            },
            Some(OracleLine::Log(level, text)) => {
                match level {
                    log::Level::Error => collected.errors.push(text.clone()),
                    log::Level::Warn => collected.warnings.push(text.clone()),
                    _ => {}
                }
                let _ = tx.send(SortEvent::Log { level, text });
            }
            None if line.trim().is_empty() => {}
            None => log::debug!("sorting tool: {line}"),
        }
    }
    collected
}

fn build_outcome(request: &SortRequest, collected: CollectedLines) -> EngineResult<SortOutcome> {
    let raw = parse_report_file(&request.report_path)?;
    let proposal = match raw.order {
        Some(order) => order,
        None => read_loadorder_txt(&request.plugin_list_path).map_err(|err| {
            EngineError::ReportParse(format!("failed to read sorted plugin list: {err}"))
        })?,
    };
    let enabled: HashSet<String> = request
        .snapshot
        .iter()
        .filter(|entry| entry.enabled)
        .map(|entry| name_key(&entry.name))
        .collect();
    let plugins = raw
        .plugins
        .into_iter()
        .filter(|plugin| enabled.contains(&name_key(&plugin.name)))
        .collect();

    Ok(SortOutcome {
        report: SortReport {
            errors: collected.errors,
            warnings: collected.warnings,
            messages: raw.messages,
            plugins,
            stats: raw.stats,
        },
        proposal,
    })
}

pub fn parse_report_file(path: &Path) -> EngineResult<RawReport> {
    let raw = fs::read_to_string(path).map_err(|err| {
        EngineError::ReportParse(format!("cannot read {}: {err}", path.display()))
    })?;
    parse_report(&raw)
}

pub fn parse_report(raw: &str) -> EngineResult<RawReport> {
    serde_json::from_str(raw).map_err(|err| EngineError::ReportParse(err.to_string()))
}

impl SortTask {
    pub fn stage(&self) -> SortStage {
        self.stage
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn observe(&mut self, event: &SortEvent) -> bool {
        match event {
            SortEvent::Log { .. } => true,
            SortEvent::Stage(stage) => {
                if self.stage.can_advance_to(*stage) {
                    self.stage = *stage;
                    true
                } else {
                    false
                }
            }
            SortEvent::Finished(finish) => {
                self.stage = finish.stage();
                if let Some(worker) = self.worker.take() {
                    let _ = worker.join();
                }
                true
            }
        }
    }

    /// Next event without blocking. Stage events that would move backwards are dropped.
    pub fn try_next(&mut self) -> Option<SortEvent> {
        while let Ok(event) = self.rx.try_recv() {
            if self.observe(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Blocks until the task ends, returning how it ended.
    pub fn wait(mut self) -> SortFinish {
        loop {
            match self.rx.recv() {
                Ok(event) => {
                    self.observe(&event);
                    if let SortEvent::Finished(finish) = event {
                        return finish;
                    }
                }
                Err(_) => {
                    self.stage = SortStage::Failed;
                    return SortFinish::Failed(EngineError::Io(io::Error::other(
                        "sort worker stopped without a result",
                    )));
                }
            }
        }
    }
}

impl Drop for SortTask {
    fn drop(&mut self) {
        if !self.stage.is_terminal() {
            self.cancel.store(true, Ordering::SeqCst);
        }
    }
}
