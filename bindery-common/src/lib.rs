//! # Bindery Common Library
//!
//! Shared code for the Bindery crates:
//! - Common error and result types
//! - TOML bootstrap configuration and config-file resolution

pub mod config;
pub mod error;

pub use config::{CatalogSettings, LoggingConfig, PipelineSettings, TomlConfig};
pub use error::{Error, Result};
