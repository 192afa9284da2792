//! Capability interface implemented by every upstream engine adapter.
//!
//! The dispatcher only ever talks to engines through [`EngineAdapter`].
//! New engines are added by implementing the trait and registering the
//! adapter with [`crate::registry::EngineRegistryBuilder::register`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::EngineFailure;
use crate::types::{Query, ResultItem};

/// A pluggable upstream search backend.
///
/// Implementors handle their own request construction, transport and
/// response parsing, and classify failures into a
/// [`crate::error::FailureKind`] so that the ban tracker can react to them.
///
/// All implementations must be `Send + Sync`: one adapter instance serves
/// every concurrent dispatch.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Run `query` against the upstream and return its result batch.
    ///
    /// `timeout` is the time budget left for this call. The dispatcher
    /// enforces it regardless, but adapters should pass it on to their
    /// transport so that abandoned requests release resources early.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineFailure`] describing why the upstream could not
    /// be queried.
    async fn fetch(&self, query: &Query, timeout: Duration) -> Result<Vec<ResultItem>, EngineFailure>;
}
