//! Backup, export, import and restore engine for the readshelf reading
//! tracker.

pub mod archive;
pub mod assets;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod repo;
pub mod settings;
pub mod time;

pub use error::{AppError, AppResult};
pub use logging::{init_file_logging, init_logging};
