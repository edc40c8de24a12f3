//! Storage layer for rallysync.
//!
//! This module provides the durable key-value primitive the sync queue and
//! cache store persist through:
//! - `SQLite` database with versioned migrations
//! - `KeyValueStore` trait with `SQLite` and in-memory implementations

mod database;
mod kv;
mod migrations;

pub use database::Database;
pub use kv::{KeyValueStore, MemoryStore, SqliteStore};
