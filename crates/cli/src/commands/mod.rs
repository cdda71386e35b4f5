//! CLI subcommand implementations

pub mod controller;
pub mod settings;
