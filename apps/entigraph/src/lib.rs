//! # Entigraph
//!
//! Command-line front end over `entigraph-core`.
//!
//! - [`cli`]: argument parsing and command implementations
//! - [`config`]: TOML configuration file
//! - [`output`]: JSON output shapes

pub mod cli;
pub mod config;
pub mod output;
