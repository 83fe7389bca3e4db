//! The data-source collaborator contract
//!
//! Every backend a view aggregates over - machine lists, shift
//! configurations, scheduled hours, utilization, alarm counts - implements
//! [`SourceFetch`]. The coordinator never sees HTTP, only this trait.

use crate::error::SourceError;
use crate::result::{EchoedParams, SourceId};
use floorsight_selection::Selection;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A scoped request issued by the orchestrator
#[derive(Debug, Clone)]
pub struct SourceRequest {
    /// Correlation id for log lines across the request's lifetime
    pub request_id: Uuid,
    /// The declared source being fetched
    pub source_id: SourceId,
    /// The selection snapshot the request is scoped to
    pub selection: Selection,
    /// Committed payloads of this source's declared dependencies
    pub dependencies: BTreeMap<SourceId, Value>,
    /// For fan-out shapes: the item this request covers
    pub item: Option<Value>,
}

impl SourceRequest {
    /// Create a request scoped to `selection`
    #[must_use]
    pub fn new(source_id: SourceId, selection: Selection) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            source_id,
            selection,
            dependencies: BTreeMap::new(),
            item: None,
        }
    }

    /// With dependency payloads attached
    #[inline]
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: BTreeMap<SourceId, Value>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// With a fan-out item attached
    #[inline]
    #[must_use]
    pub fn with_item(mut self, item: Value) -> Self {
        self.item = Some(item);
        self
    }
}

/// A successful response from a collaborator
#[derive(Debug, Clone)]
pub struct SourceResponse {
    /// The JSON document the backend returned
    pub payload: Value,
    /// The parameters the backend reports it used
    pub echoed: EchoedParams,
}

impl SourceResponse {
    /// Response with no echoed parameters
    #[inline]
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            echoed: EchoedParams::none(),
        }
    }

    /// With echoed parameters attached
    #[inline]
    #[must_use]
    pub fn with_echo(mut self, echoed: EchoedParams) -> Self {
        self.echoed = echoed;
        self
    }
}

/// An opaque data-source collaborator
///
/// Implementations wrap whatever transport the host application uses. A
/// failure must be returned as [`SourceError`], never panicked; the
/// orchestrator isolates it to this source's result.
#[async_trait::async_trait]
pub trait SourceFetch: Send + Sync {
    /// Execute one scoped request
    async fn fetch(&self, request: SourceRequest) -> Result<SourceResponse, SourceError>;
}
