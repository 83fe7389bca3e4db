//! The per-view coordinator
//!
//! One [`ViewCoordinator`] is constructed per dashboard view through
//! [`CoordinatorBuilder`], parameterized by its source declarations - the
//! same machinery serves every page instead of per-page copies of the fetch
//! plumbing.
//!
//! A refresh snapshots the selection and generation under one lock, runs
//! the fetch plan, pushes every settled result through the staleness gate,
//! commits the survivors, reconciles the analysis fingerprint, and (when
//! configured) auto-triggers the analysis. Applying a selection patch aborts
//! the in-flight refresh outright; the staleness gate stays as the second
//! line of defense for anything that still settles late.

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use floorsight_insight::{
    fingerprint, AnalysisBackend, AnalysisError, AnalysisGate, AnalysisState, TriggerContext,
    TriggerOutcome,
};
use floorsight_selection::{Generation, Selection, SelectionPatch, SelectionStore};
use floorsight_sources::{
    Admission, AggregateView, FetchPlanBuilder, Orchestrator, SourceError, SourceId, SourceResult,
    SourceSpec, StalenessGate,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What one refresh did
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Generation the refresh was issued at
    pub generation: Generation,
    /// Sources committed with fresh payloads
    pub committed: Vec<SourceId>,
    /// Sources committed with their own errors
    pub failed: Vec<(SourceId, SourceError)>,
    /// Results dropped by the staleness gate
    pub discarded: usize,
    /// Whether the stored analysis was cleared by this refresh
    pub analysis_invalidated: bool,
    /// Outcome of the automatic analysis trigger, when configured
    pub analysis: Option<Result<TriggerOutcome, AnalysisError>>,
}

/// A refresh over the active window paired with its preceding window
#[derive(Debug)]
pub struct ComparisonReport {
    /// The active window's refresh
    pub current: RefreshReport,
    /// The preceding window's refresh
    pub previous: RefreshReport,
}

/// Builder for a per-view coordinator
pub struct CoordinatorBuilder {
    initial: Selection,
    plan: FetchPlanBuilder,
    backend: Option<Arc<dyn AnalysisBackend>>,
    config: CoordinatorConfig,
}

impl CoordinatorBuilder {
    /// Start a coordinator for a view opening on `initial`
    #[must_use]
    pub fn new(initial: Selection) -> Self {
        Self {
            initial,
            plan: FetchPlanBuilder::new(),
            backend: None,
            config: CoordinatorConfig::default(),
        }
    }

    /// Declare a data source
    ///
    /// # Errors
    /// Returns [`CoordinatorError::Plan`] on a duplicate id.
    pub fn source(mut self, spec: SourceSpec) -> Result<Self, CoordinatorError> {
        self.plan.add_source(spec)?;
        Ok(self)
    }

    /// Attach the analysis collaborator
    #[must_use]
    pub fn analysis_backend(mut self, backend: Arc<dyn AnalysisBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Override the configuration
    #[must_use]
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the declarations and construct the coordinator
    ///
    /// # Errors
    /// Fails on structural plan errors or a missing analysis backend.
    pub fn build(self) -> Result<ViewCoordinator, CoordinatorError> {
        let backend = self.backend.ok_or(CoordinatorError::MissingBackend)?;
        let plan = Arc::new(self.plan.build()?);
        let required = plan.required_ids();
        let store = Arc::new(SelectionStore::new(self.initial));
        let orchestrator = Orchestrator::new(plan)
            .with_default_timeout(self.config.default_timeout())
            .with_max_in_flight(self.config.max_in_flight);

        Ok(ViewCoordinator {
            staleness: StalenessGate::new(store.clone()),
            store,
            orchestrator,
            view: AggregateView::new(),
            previous: AggregateView::new(),
            gate: AnalysisGate::new(backend),
            required,
            config: self.config,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }
}

/// Selection-scoped, staleness-safe aggregation for one view
pub struct ViewCoordinator {
    store: Arc<SelectionStore>,
    orchestrator: Orchestrator,
    staleness: StalenessGate,
    view: AggregateView,
    previous: AggregateView,
    gate: AnalysisGate,
    required: Vec<SourceId>,
    config: CoordinatorConfig,
    cancel: Mutex<CancellationToken>,
}

impl ViewCoordinator {
    /// Start building a coordinator
    #[must_use]
    pub fn builder(initial: Selection) -> CoordinatorBuilder {
        CoordinatorBuilder::new(initial)
    }

    /// Apply a selection patch
    ///
    /// On a structural change the generation bumps and the in-flight
    /// refresh (if any) is aborted; returns the new generation. A no-op
    /// patch returns `None` and cancels nothing.
    pub fn apply(&self, patch: &SelectionPatch) -> Option<Generation> {
        let bumped = self.store.apply(patch);
        if let Some(generation) = bumped {
            let mut cancel = self.cancel.lock();
            cancel.cancel();
            *cancel = CancellationToken::new();
            tracing::info!(%generation, "selection advanced, superseded fetches aborted");
        }
        bumped
    }

    /// Current selection
    #[must_use]
    pub fn selection(&self) -> Selection {
        self.store.selection()
    }

    /// Current generation
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.store.generation()
    }

    /// The merged view state for the active window
    #[inline]
    #[must_use]
    pub fn view(&self) -> &AggregateView {
        &self.view
    }

    /// The merged view state for the preceding window
    #[inline]
    #[must_use]
    pub fn previous_view(&self) -> &AggregateView {
        &self.previous
    }

    /// Current analysis gate state
    #[must_use]
    pub fn analysis_state(&self) -> AnalysisState {
        self.gate.state()
    }

    /// The stored analysis text, if ready
    #[must_use]
    pub fn analysis_text(&self) -> Option<String> {
        self.gate.text()
    }

    /// Results dropped by the staleness gate over this coordinator's life
    #[must_use]
    pub fn discarded_count(&self) -> u64 {
        self.staleness.discarded_count()
    }

    /// Refresh the active window
    pub async fn refresh(&self) -> RefreshReport {
        let (selection, generation) = self.store.snapshot();
        let cancel = self.cancel.lock().clone();

        let results = self
            .orchestrator
            .refresh(&selection, generation, &cancel)
            .await;
        let mut report = self.admit_into(&self.view, results, generation);
        self.reconcile_analysis(&mut report).await;
        report
    }

    /// Refresh the active window and its preceding window in parallel
    ///
    /// One parameterized pipeline invoked twice with different date
    /// windows; the preceding window commits into its own view and never
    /// participates in consistency checks or fingerprinting.
    pub async fn refresh_with_comparison(&self) -> ComparisonReport {
        let (selection, generation) = self.store.snapshot();
        let cancel = self.cancel.lock().clone();
        let preceding = selection.over_range(selection.range.previous_period());

        let (current_results, previous_results) = tokio::join!(
            self.orchestrator.refresh(&selection, generation, &cancel),
            self.orchestrator.refresh(&preceding, generation, &cancel),
        );

        let mut current = self.admit_into(&self.view, current_results, generation);
        let previous = self.admit_into(&self.previous, previous_results, generation);
        self.reconcile_analysis(&mut current).await;

        ComparisonReport { current, previous }
    }

    /// Trigger the derived analysis against the live selection
    ///
    /// # Errors
    /// Propagates precondition and backend failures from the gate; an
    /// in-flight analysis makes this a no-op.
    pub async fn trigger_analysis(&self) -> Result<TriggerOutcome, AnalysisError> {
        let (selection, generation) = self.store.snapshot();
        self.gate
            .trigger(TriggerContext {
                view: &self.view,
                selection: &selection,
                generation,
                required: &self.required,
            })
            .await
    }

    fn admit_into(
        &self,
        view: &AggregateView,
        results: Vec<SourceResult>,
        generation: Generation,
    ) -> RefreshReport {
        let mut report = RefreshReport {
            generation,
            ..RefreshReport::default()
        };
        for result in results {
            match self.staleness.admit(result) {
                Admission::Fresh(result) => {
                    match &result.error {
                        Some(error) => report.failed.push((result.source_id, error.clone())),
                        None => report.committed.push(result.source_id),
                    }
                    view.commit(result);
                }
                Admission::Discarded { .. } => report.discarded += 1,
            }
        }
        report
    }

    async fn reconcile_analysis(&self, report: &mut RefreshReport) {
        // Fingerprint against the *live* selection: if the user moved on
        // mid-refresh, the stored analysis must go even though this
        // refresh's results were discarded.
        let (selection, _) = self.store.snapshot();
        let current = fingerprint(&selection, &self.view.summaries());
        report.analysis_invalidated = self.gate.sync_fingerprint(current);

        if self.config.auto_analyze && self.gate.state() == AnalysisState::Invalidated {
            let outcome = self.trigger_analysis().await;
            if let Err(error) = &outcome {
                tracing::warn!(%error, "automatic analysis trigger did not run");
            }
            report.analysis = Some(outcome);
        }
    }
}

impl std::fmt::Debug for ViewCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewCoordinator")
            .field("generation", &self.store.generation())
            .field("committed", &self.view.len())
            .field("analysis", &self.gate.state())
            .finish_non_exhaustive()
    }
}
