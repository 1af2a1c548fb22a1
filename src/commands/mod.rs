//! Command implementations for the CLI

pub mod install;
pub mod sync;
