//! Command line surface.

pub mod args;
pub mod commands;
