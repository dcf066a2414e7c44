pub mod backup;
pub mod config;
pub mod conflicts;
pub mod error;
pub mod fsutil;
pub mod game;
pub mod groups;
pub mod library;
pub mod load_order;
pub mod logging;
pub mod loot;
pub mod origin_fs;
pub mod origin_index;
pub mod plugin;
pub mod plugins_txt;

pub use error::{EngineError, EngineResult};
