//! Shared error model, configuration, and report types for cityprep.
//!
//! This crate is the foundation depended on by all other cityprep crates.
//! It provides:
//! - [`CityPrepError`] — the unified error type
//! - Run-report types ([`InsertReport`], [`RemapReport`], [`MergeReport`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, UsetypeConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{CityPrepError, Result};
pub use types::{
    AttributeTarget, InsertReport, MergeReport, REPORT_SCHEMA_VERSION, RemapReport, RowIssue,
    UnknownCode,
};
