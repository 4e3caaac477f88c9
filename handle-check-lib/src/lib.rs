//! # Handle Check Library
//!
//! Checks whether a username is registered on many websites at once.
//!
//! A [`SiteCatalog`] describes, per site, where a profile lives and how to
//! tell an existing profile from a missing one. [`UsernameChecker`] probes
//! every site concurrently under one connection pool and a global
//! concurrency ceiling, and returns one [`ProbeOutcome`] per site.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use handle_check_lib::{SiteCatalog, UsernameChecker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = SiteCatalog::from_file("data.json")?;
//!     let checker = UsernameChecker::new();
//!     let batch = checker.check_username("alice", &catalog).await?;
//!
//!     for outcome in batch.claimed() {
//!         println!("[+] {}: {}", outcome.site, outcome.url);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Catalog driven**: sherlock-style `data.json` catalogs, `$schema` ignored
//! - **Four strategies**: body message, status code, final status, error URL
//! - **Bounded concurrency**: one shared client, one semaphore per batch
//! - **Failure isolation**: a broken site is `Unknown`, never a batch error
//! - **Streaming**: outcomes can be consumed as they complete

pub use checker::UsernameChecker;
pub use classify::{classify, is_bot_challenge, ProbeResponse};
pub use config::{
    load_env_config, load_env_config_from, parse_timeout_string, ConfigManager, DefaultsConfig,
    EnvConfig, FileConfig, OutputConfig,
};
pub use error::HandleCheckError;
pub use interpolate::{interpolate, interpolate_str};
pub use site::{load_exclusions, parse_exclusions, OneOrMany, ServiceDefinition, SiteCatalog};
pub use summary::BatchSummary;
pub use types::{
    CheckConfig, ProbeBatch, ProbeOutcome, QueryStatus, Strategy, DEFAULT_USER_AGENT,
    MAX_CONCURRENCY,
};
pub use utils::{match_keywords, validate_username};

pub mod classify;
pub mod interpolate;

mod checker;
mod config;
mod error;
mod site;
mod summary;
mod types;
mod utils;

pub type Result<T> = std::result::Result<T, HandleCheckError>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// Get library information for debugging or display purposes.
pub fn info() -> LibraryInfo {
    LibraryInfo {
        version: VERSION,
        author: AUTHOR,
        strategies: vec!["message", "status_code", "response_url", "errorUrl"],
    }
}

/// Information about the library build
#[derive(Debug, Clone)]
pub struct LibraryInfo {
    pub version: &'static str,
    pub author: &'static str,

    /// Strategy names understood in catalog files
    pub strategies: Vec<&'static str>,
}
