//! Shared types, error model, and configuration for LeadRevive.
//!
//! This crate is the foundation depended on by all other LeadRevive crates.
//! It provides:
//! - [`LeadReviveError`], the unified error type
//! - Domain types ([`ParsedLead`], [`NewLead`], [`Lead`], [`ImportProgress`])
//! - The [`LeadSink`] persistence seam
//! - Configuration ([`AppConfig`], [`ImportConfig`], config loading)

pub mod config;
pub mod error;
pub mod sink;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, DefaultsConfig, ImportConfig, ImportSettings, SinkKind,
    StorageConfig, config_dir, config_file_path, database_path, init_config, load_config,
    load_config_from, resolve_api_key,
};
pub use error::{LeadReviveError, Result};
pub use sink::LeadSink;
pub use types::{ImportProgress, Lead, LeadId, LeadStatus, NewLead, ParsedLead};
