//! Fetch plans: declared sources and their dependency graph
//!
//! A view declares its sources once, up front, through [`FetchPlanBuilder`].
//! The builder validates the declarations into a [`FetchPlan`] - a directed
//! acyclic graph of sources grouped into dependency waves. Everything
//! structural (duplicates, unknown or self dependencies, cycles) is rejected
//! here so the orchestrator can execute without policy checks.

use crate::error::PlanError;
use crate::fetch::SourceFetch;
use crate::result::{SourceId, SourceSummary};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Projection from a payload to its small numeric summary
pub type Summarize = fn(&Value) -> SourceSummary;

/// Projection from a dependency payload to fan-out items
pub type FanOutItems = fn(&Value) -> Vec<Value>;

/// Merge of per-item payloads into one result payload
pub type FanOutMerge = fn(&[Value]) -> Value;

/// How a source is fetched on each refresh
#[derive(Clone)]
pub enum FetchShape {
    /// One scoped request per refresh
    Single,
    /// One request per item of a dependency's committed payload, merged
    /// into a single result (e.g. one alarm-count request per machine)
    FanOut {
        /// Dependency whose payload yields the items
        over: SourceId,
        /// Extract the items from that payload
        items: FanOutItems,
        /// Merge the per-item payloads
        merge: FanOutMerge,
    },
}

impl Debug for FetchShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("Single"),
            Self::FanOut { over, .. } => write!(f, "FanOut(over: {over})"),
        }
    }
}

/// A declared data source
pub struct SourceSpec {
    id: SourceId,
    depends_on: Vec<SourceId>,
    shape: FetchShape,
    fetcher: Arc<dyn SourceFetch>,
    summarize: Option<Summarize>,
    timeout: Option<Duration>,
    required: bool,
}

impl SourceSpec {
    /// Declare a single-request source
    #[must_use]
    pub fn new(id: SourceId, fetcher: Arc<dyn SourceFetch>) -> Self {
        Self {
            id,
            depends_on: Vec::new(),
            shape: FetchShape::Single,
            fetcher,
            summarize: None,
            timeout: None,
            required: true,
        }
    }

    /// Declare a dependency; the source only fires once the dependency has
    /// a committed, current-generation value
    #[must_use]
    pub fn depends_on(mut self, dependency: SourceId) -> Self {
        self.depends_on.push(dependency);
        self
    }

    /// Fan out over a dependency's items instead of issuing one request
    #[must_use]
    pub fn fan_out(mut self, over: SourceId, items: FanOutItems, merge: FanOutMerge) -> Self {
        self.shape = FetchShape::FanOut { over, items, merge };
        self
    }

    /// Attach the numeric summary projection used for fingerprinting
    #[must_use]
    pub fn summarize(mut self, projection: Summarize) -> Self {
        self.summarize = Some(projection);
        self
    }

    /// Override the per-source timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark the source as not required for the derived analysis
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Source id
    #[inline]
    #[must_use]
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Declared dependencies
    #[inline]
    #[must_use]
    pub fn dependencies(&self) -> &[SourceId] {
        &self.depends_on
    }

    /// Fetch shape
    #[inline]
    #[must_use]
    pub fn shape(&self) -> &FetchShape {
        &self.shape
    }

    /// The collaborator backing this source
    #[inline]
    #[must_use]
    pub fn fetcher(&self) -> &Arc<dyn SourceFetch> {
        &self.fetcher
    }

    /// Summary projection, if declared
    #[inline]
    #[must_use]
    pub fn summary_projection(&self) -> Option<Summarize> {
        self.summarize
    }

    /// Timeout override, if declared
    #[inline]
    #[must_use]
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether the derived analysis requires this source
    #[inline]
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }
}

impl Debug for SourceSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSpec")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("shape", &self.shape)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`FetchPlan`]
#[derive(Default)]
pub struct FetchPlanBuilder {
    specs: Vec<SourceSpec>,
}

impl FetchPlanBuilder {
    /// Empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source
    ///
    /// # Errors
    /// Returns [`PlanError::DuplicateSource`] if the id is already taken.
    pub fn add_source(&mut self, spec: SourceSpec) -> Result<(), PlanError> {
        if self.specs.iter().any(|s| s.id == spec.id) {
            return Err(PlanError::DuplicateSource(spec.id));
        }
        self.specs.push(spec);
        Ok(())
    }

    /// Validate the declarations into an executable plan
    ///
    /// # Errors
    /// Rejects empty plans, unknown or self dependencies, fan-outs over
    /// non-dependencies, and dependency cycles.
    pub fn build(self) -> Result<FetchPlan, PlanError> {
        if self.specs.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut graph: DiGraphMap<SourceId, ()> = DiGraphMap::new();
        for spec in &self.specs {
            graph.add_node(spec.id);
        }

        for spec in &self.specs {
            for dependency in &spec.depends_on {
                if *dependency == spec.id {
                    return Err(PlanError::SelfDependency(spec.id));
                }
                if !graph.contains_node(*dependency) {
                    return Err(PlanError::UnknownDependency {
                        source_id: spec.id,
                        dependency: *dependency,
                    });
                }
                graph.add_edge(*dependency, spec.id, ());
            }
            if let FetchShape::FanOut { over, .. } = &spec.shape {
                if !spec.depends_on.contains(over) {
                    return Err(PlanError::FanOutNotADependency {
                        source_id: spec.id,
                        over: *over,
                    });
                }
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| PlanError::CycleDetected(cycle.node_id()))?;

        // Wave = longest dependency path; everything in a wave can run
        // concurrently once every earlier wave has settled.
        let mut level: HashMap<SourceId, usize> = HashMap::new();
        let mut waves: Vec<Vec<SourceId>> = Vec::new();
        let by_id: HashMap<SourceId, usize> = self
            .specs
            .iter()
            .enumerate()
            .map(|(idx, spec)| (spec.id, idx))
            .collect();

        for id in order {
            let spec = &self.specs[by_id[&id]];
            let depth = spec
                .depends_on
                .iter()
                .map(|dep| level[dep] + 1)
                .max()
                .unwrap_or(0);
            level.insert(id, depth);
            if waves.len() <= depth {
                waves.resize_with(depth + 1, Vec::new);
            }
            waves[depth].push(id);
        }

        let specs: HashMap<SourceId, SourceSpec> = self
            .specs
            .into_iter()
            .map(|spec| (spec.id, spec))
            .collect();

        Ok(FetchPlan { specs, waves })
    }
}

/// A validated, executable fetch plan
pub struct FetchPlan {
    specs: HashMap<SourceId, SourceSpec>,
    waves: Vec<Vec<SourceId>>,
}

impl FetchPlan {
    /// Sources grouped into dependency waves, dependencies first
    #[inline]
    #[must_use]
    pub fn waves(&self) -> &[Vec<SourceId>] {
        &self.waves
    }

    /// Look up a declared source
    #[inline]
    #[must_use]
    pub fn spec(&self, id: SourceId) -> Option<&SourceSpec> {
        self.specs.get(&id)
    }

    /// Every declared source id, in wave order
    pub fn ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.waves.iter().flatten().copied()
    }

    /// Ids of sources the derived analysis requires
    #[must_use]
    pub fn required_ids(&self) -> Vec<SourceId> {
        self.ids()
            .filter(|id| self.specs[id].is_required())
            .collect()
    }

    /// Number of declared sources
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the plan declares no sources (never true for built plans)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Debug for FetchPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchPlan")
            .field("waves", &self.waves)
            .finish_non_exhaustive()
    }
}
