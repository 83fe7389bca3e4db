//! Scoped fetch execution over a plan
//!
//! The orchestrator walks a [`FetchPlan`] in dependency waves. Everything in
//! a wave runs concurrently; a dependent source is only invoked once every
//! dependency settled successfully *within the same refresh*, so dependents
//! never fire on stale dependency values. Each request is tagged with the
//! generation captured before any await, wrapped in a per-source timeout,
//! and aborted outright when the refresh's cancellation token fires - the
//! staleness gate downstream remains the second line of defense.
//!
//! Failure policy: a source that fails settles as a result carrying its own
//! error. It never rejects the refresh and never cancels siblings.

use crate::error::SourceError;
use crate::fetch::{SourceRequest, SourceResponse};
use crate::plan::{FetchPlan, FetchShape, SourceSpec};
use crate::result::{EchoedParams, SourceId, SourceResult};
use floorsight_selection::{Generation, Selection};
use futures::future::join_all;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Default per-source timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on concurrently running fetches
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Executes refreshes against a fetch plan
pub struct Orchestrator {
    plan: Arc<FetchPlan>,
    default_timeout: Duration,
    limiter: Arc<Semaphore>,
}

impl Orchestrator {
    /// Create an orchestrator with default timeout and concurrency caps
    #[must_use]
    pub fn new(plan: Arc<FetchPlan>) -> Self {
        Self {
            plan,
            default_timeout: DEFAULT_TIMEOUT,
            limiter: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
        }
    }

    /// Override the default per-source timeout
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Override the concurrent-fetch cap
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.limiter = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    /// The plan being executed
    #[inline]
    #[must_use]
    pub fn plan(&self) -> &Arc<FetchPlan> {
        &self.plan
    }

    /// Run one full refresh for `selection`
    ///
    /// `generation` must be the generation current when the refresh was
    /// decided - it is stamped on every result before any await. Returns
    /// one settled result per declared source, in wave order.
    pub async fn refresh(
        &self,
        selection: &Selection,
        generation: Generation,
        cancel: &CancellationToken,
    ) -> Vec<SourceResult> {
        tracing::info!(%generation, sources = self.plan.len(), "refresh started");
        let mut settled: HashMap<SourceId, SourceResult> = HashMap::new();

        for wave in self.plan.waves() {
            let results = join_all(
                wave.iter()
                    .map(|id| self.fetch_source(*id, selection, generation, cancel, &settled)),
            )
            .await;
            for result in results {
                settled.insert(result.source_id, result);
            }
        }

        let failed = settled.values().filter(|r| !r.is_success()).count();
        tracing::info!(%generation, failed, "refresh settled");
        self.plan
            .ids()
            .filter_map(|id| settled.remove(&id))
            .collect()
    }

    async fn fetch_source(
        &self,
        id: SourceId,
        selection: &Selection,
        generation: Generation,
        cancel: &CancellationToken,
        settled: &HashMap<SourceId, SourceResult>,
    ) -> SourceResult {
        let Some(spec) = self.plan.spec(id) else {
            return SourceResult::failure(
                generation,
                id,
                SourceError::Backend("source not declared in plan".into()),
            );
        };

        let mut dependencies = BTreeMap::new();
        for dependency in spec.dependencies() {
            match settled.get(dependency) {
                Some(result) if result.is_success() => {
                    dependencies.insert(
                        *dependency,
                        result.payload.clone().unwrap_or(Value::Null),
                    );
                }
                _ => {
                    tracing::warn!(source = %id, dependency = %dependency, "dependency unavailable, fetch skipped");
                    return SourceResult::failure(
                        generation,
                        id,
                        SourceError::DependencyUnavailable {
                            dependency: *dependency,
                        },
                    );
                }
            }
        }

        match spec.shape() {
            FetchShape::Single => {
                self.fetch_single(spec, selection, generation, cancel, dependencies)
                    .await
            }
            FetchShape::FanOut { over, items, merge } => {
                self.fetch_fan_out(
                    spec,
                    selection,
                    generation,
                    cancel,
                    dependencies,
                    *over,
                    *items,
                    *merge,
                )
                .await
            }
        }
    }

    async fn fetch_single(
        &self,
        spec: &SourceSpec,
        selection: &Selection,
        generation: Generation,
        cancel: &CancellationToken,
        dependencies: BTreeMap<SourceId, Value>,
    ) -> SourceResult {
        let id = spec.id();
        let request = SourceRequest::new(id, selection.clone()).with_dependencies(dependencies);
        tracing::debug!(source = %id, %generation, request_id = %request.request_id, "issuing fetch");

        match self.execute(spec, request, cancel).await {
            Ok(response) => {
                let summary = spec.summary_projection().map(|project| project(&response.payload));
                SourceResult::success(generation, id, response.payload, summary, response.echoed)
            }
            Err(error) => {
                tracing::warn!(source = %id, %generation, %error, "source settled with error");
                SourceResult::failure(generation, id, error)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_fan_out(
        &self,
        spec: &SourceSpec,
        selection: &Selection,
        generation: Generation,
        cancel: &CancellationToken,
        dependencies: BTreeMap<SourceId, Value>,
        over: SourceId,
        items: fn(&Value) -> Vec<Value>,
        merge: fn(&[Value]) -> Value,
    ) -> SourceResult {
        let id = spec.id();
        let provider = dependencies.get(&over).cloned().unwrap_or(Value::Null);
        let item_values = items(&provider);

        if item_values.is_empty() {
            // No items to fan out over (e.g. a lab with no machines):
            // settle immediately with the zero merge.
            let payload = merge(&[]);
            let summary = spec.summary_projection().map(|project| project(&payload));
            tracing::debug!(source = %id, %generation, "fan-out over empty item list, settled zeroed");
            return SourceResult::success(generation, id, payload, summary, EchoedParams::none());
        }

        tracing::debug!(source = %id, %generation, items = item_values.len(), "fanning out");
        let outcomes = join_all(item_values.iter().map(|item| {
            let request = SourceRequest::new(id, selection.clone())
                .with_dependencies(dependencies.clone())
                .with_item(item.clone());
            self.execute(spec, request, cancel)
        }))
        .await;

        let mut payloads = Vec::with_capacity(outcomes.len());
        let mut echoed = EchoedParams::none();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(response) => {
                    if echoed.is_empty() {
                        // Per-item echoes disagree on machine by construction;
                        // the merged result reports only the shared fields.
                        echoed = response.echoed;
                        echoed.machine = None;
                    }
                    payloads.push(response.payload);
                }
                Err(error) => {
                    tracing::warn!(source = %id, %generation, %error, "fan-out item failed, contributes nothing");
                    errors.push(error);
                }
            }
        }

        if payloads.is_empty() {
            let error = if errors.contains(&SourceError::Cancelled) {
                SourceError::Cancelled
            } else {
                SourceError::Backend(format!("all {} item fetches failed", errors.len()))
            };
            return SourceResult::failure(generation, id, error);
        }

        let payload = merge(&payloads);
        let summary = spec.summary_projection().map(|project| project(&payload));
        SourceResult::success(generation, id, payload, summary, echoed)
    }

    async fn execute(
        &self,
        spec: &SourceSpec,
        request: SourceRequest,
        cancel: &CancellationToken,
    ) -> Result<SourceResponse, SourceError> {
        let _permit = tokio::select! {
            () = cancel.cancelled() => return Err(SourceError::Cancelled),
            permit = self.limiter.acquire() => permit.map_err(|_| SourceError::Cancelled)?,
        };

        let budget = spec.timeout_override().unwrap_or(self.default_timeout);
        let fetch = spec.fetcher().fetch(request);
        tokio::select! {
            () = cancel.cancelled() => Err(SourceError::Cancelled),
            outcome = tokio::time::timeout(budget, fetch) => match outcome {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout {
                    timeout_ms: budget.as_millis() as u64,
                }),
            },
        }
    }
}
