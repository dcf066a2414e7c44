use std::{
    collections::VecDeque,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

pub const LOG_FILE: &str = "plugsmith.log";
pub const LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: log::Level,
    pub message: String,
}

impl LogEntry {
    pub fn line(&self) -> String {
        format!("[{}] {}", level_label(self.level), self.message)
    }
}

pub fn level_label(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN",
        log::Level::Info => "INFO",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

/// Appends records to a file and keeps the most recent ones in memory.
pub struct FileLogger {
    path: PathBuf,
    level: log::LevelFilter,
    recent: Mutex<VecDeque<LogEntry>>,
}

impl FileLogger {
    pub fn new(path: PathBuf, level: log::LevelFilter) -> Self {
        Self {
            path,
            level,
            recent: Mutex::new(VecDeque::with_capacity(LOG_CAPACITY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn push(&self, level: log::Level, message: String) {
        let entry = LogEntry { level, message };
        let _ = append_log_file(&self.path, &entry);
        if let Ok(mut recent) = self.recent.lock() {
            recent.push_back(entry);
            while recent.len() > LOG_CAPACITY {
                recent.pop_front();
            }
        }
    }

    pub fn recent(&self) -> Vec<LogEntry> {
        self.recent
            .lock()
            .map(|recent| recent.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn tail(&self, lines: usize) -> Vec<LogEntry> {
        let recent = self.recent();
        let skip = recent.len().saturating_sub(lines);
        recent.into_iter().skip(skip).collect()
    }
}

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            self.push(record.level(), record.args().to_string());
        }
    }

    fn flush(&self) {}
}

fn append_log_file(path: &Path, entry: &LogEntry) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", entry.line())
}

/// Installs the process logger writing to `<data_dir>/plugsmith.log`.
pub fn init(data_dir: &Path, level: log::LevelFilter) -> anyhow::Result<&'static FileLogger> {
    let logger: &'static FileLogger =
        Box::leak(Box::new(FileLogger::new(data_dir.join(LOG_FILE), level)));
    log::set_logger(logger).map_err(|err| anyhow::anyhow!("install logger: {err}"))?;
    log::set_max_level(level);
    Ok(logger)
}
