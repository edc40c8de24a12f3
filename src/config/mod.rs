//! Configuration management for rallysync.
//!
//! This module handles loading and saving configuration from `~/.rallysync/`.

mod paths;
mod settings;

pub use paths::Paths;
pub use settings::{Config, GeneralConfig, RemoteConfig, SyncConfig};
