use std::{io, path::PathBuf};
use thiserror::Error;

/// Failures raised by the engine. Every variant leaves the order it was
/// rejected against untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read plugin header of {name}: {reason}")]
    Parse { name: String, reason: String },

    #[error("the enabled state of {0} is forced by the game")]
    ForcedState(String),

    #[error("cannot move {plugin}: {blocker} has a fixed load position")]
    ForcedPosition { plugin: String, blocker: String },

    #[error("plugin not found: {0}")]
    UnknownPlugin(String),

    #[error("position {position} is out of range for {len} plugin(s)")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("the load order is locked while a sort is running")]
    OrderLocked,

    #[error("failed to start {program:?}: {source}")]
    ExternalToolLaunch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sorting failed. Exit code was: 0x{code:x}")]
    ExternalToolExit { code: i32 },

    #[error("invalid sort report: {0}")]
    ReportParse(String),

    #[error("no backups available")]
    NoBackups,

    #[error("failed to restore backup {id}: {reason}{}", os_code_suffix(.code))]
    Restore {
        id: String,
        reason: String,
        code: Option<i32>,
    },

    #[error("a group named {0:?} already exists here")]
    DuplicateName(String),

    #[error("group name {0:?} is not allowed")]
    InvalidGroupName(String),

    #[error("unknown group")]
    UnknownGroup,

    #[error("the root group cannot be changed")]
    RootGroup,

    #[error("failed to read group list {path:?}: {reason}")]
    GroupList { path: PathBuf, reason: String },

    #[error("path {0:?} is outside the origin")]
    InvalidPath(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl EngineError {
    pub(crate) fn restore_io(id: &str, err: &io::Error) -> Self {
        EngineError::Restore {
            id: id.to_string(),
            reason: err.to_string(),
            code: err.raw_os_error(),
        }
    }
}

fn os_code_suffix(code: &Option<i32>) -> String {
    code.map(|code| format!(" (error {code})")).unwrap_or_default()
}

pub type EngineResult<T> = Result<T, EngineError>;
