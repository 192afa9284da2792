//! Metasearch: query many upstream search engines at once and merge their
//! results.
//!
//! This crate is the host around [`metasearch_core`]:
//! Settings file → engine registration → search pipeline → output
//!
//! # Architecture
//!
//! - **Settings**: TOML file with engine definitions and tunables, loaded once
//! - **Pipeline**: dispatch, ban tracking and aggregation live in `metasearch-core`
//! - **Output**: JSON or plain-text rendering of a response
//! - **Bridge**: newline-delimited JSON commands over stdin/stdout
//! - **Logging**: `tracing` to stderr, optionally to a rolling file

pub mod bridge;
pub mod error;
pub mod logging;
pub mod output;
pub mod paths;
pub mod request;
pub mod settings;

pub use error::{MetasearchError, Result};
pub use metasearch_core;
pub use output::OutputFormat;
pub use request::SearchRequest;
pub use settings::Settings;
