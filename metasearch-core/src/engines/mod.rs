//! Engine adapter implementations.
//!
//! Each module provides a struct implementing
//! [`crate::engine::EngineAdapter`] for one family of upstream APIs.

pub mod json_api;

pub use json_api::JsonApiEngine;
