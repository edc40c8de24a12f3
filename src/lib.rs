//! rallysync - offline sync for a volleyball team backend
//!
//! This crate queues writes to a PostgREST-style backend while it is
//! unreachable, replays them in order once it is back, and keeps the last
//! fetched copy of each table for offline reads.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod output;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::RallyError;
pub use features::sync::OfflineSync;
