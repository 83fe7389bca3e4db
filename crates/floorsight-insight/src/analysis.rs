//! The derived-analysis gate
//!
//! The analysis is expensive, non-idempotent, and produced by an external
//! collaborator; the gate is what makes it safe to hang off rapid,
//! concurrent, user-driven input changes:
//!
//! ```text
//! IDLE --(fingerprint mismatch)--> INVALIDATED
//! INVALIDATED --(trigger, inputs fresh+consistent)--> RUNNING
//! RUNNING --(success)--> READY(fingerprint = at-trigger)
//! RUNNING --(failure)--> INVALIDATED (error surfaced)
//! READY --(fingerprint mismatch)--> INVALIDATED
//! RUNNING --(trigger)--> RUNNING (ignored, no second invocation)
//! ```
//!
//! The check-and-set into RUNNING is one synchronous critical section with
//! no await inside, which is the whole single-flight guarantee: two
//! triggers racing each other produce exactly one backend invocation.

use crate::consistency::validate;
use crate::error::AnalysisError;
use crate::fingerprint::{fingerprint, Fingerprint};
use floorsight_selection::{Generation, Selection};
use floorsight_sources::{AggregateView, SourceId, SourceSummary};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    /// No analysis requested yet
    Idle,
    /// Inputs changed since the stored analysis (or since startup); a
    /// trigger is needed
    Invalidated,
    /// A backend invocation is in flight
    Running,
    /// The stored text matches the fingerprint captured at trigger time
    Ready,
}

/// What the analysis collaborator receives
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// The selection the analysis describes
    pub selection: Selection,
    /// Per-source numeric summaries, in canonical order
    pub summaries: BTreeMap<SourceId, SourceSummary>,
}

/// What the analysis collaborator returns
///
/// Either one full document or an incremental chunk stream; streamed chunks
/// accumulate into the same text slot, leaving the invalidation logic
/// untouched.
pub enum AnalysisResponse {
    /// The complete analysis text
    Document(String),
    /// Incremental chunks, terminated by the stream's end
    Stream(BoxStream<'static, Result<String, AnalysisError>>),
}

impl std::fmt::Debug for AnalysisResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document(text) => f.debug_tuple("Document").field(&text.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// The expensive derived-computation collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Produce an analysis for the given inputs
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;
}

/// Outcome of a trigger attempt that did not error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The backend ran and the gate is READY
    Completed,
    /// An invocation was already in flight; this trigger was ignored
    AlreadyRunning,
}

/// Everything the gate needs to evaluate trigger preconditions
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    /// The merged view state
    pub view: &'a AggregateView,
    /// The live selection
    pub selection: &'a Selection,
    /// The current generation
    pub generation: Generation,
    /// Sources that must be fresh before the backend may run
    pub required: &'a [SourceId],
}

#[derive(Debug)]
struct GateInner {
    state: AnalysisState,
    fingerprint: Option<Fingerprint>,
    text: Option<String>,
}

/// Single-flight gate around the derived analysis
pub struct AnalysisGate {
    backend: Arc<dyn AnalysisBackend>,
    inner: Mutex<GateInner>,
}

impl AnalysisGate {
    /// Gate invocations of `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self {
            backend,
            inner: Mutex::new(GateInner {
                state: AnalysisState::Idle,
                fingerprint: None,
                text: None,
            }),
        }
    }

    /// Current gate state
    #[inline]
    #[must_use]
    pub fn state(&self) -> AnalysisState {
        self.inner.lock().state
    }

    /// The stored analysis text, if READY
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.inner.lock().text.clone()
    }

    /// The fingerprint the stored analysis was computed for
    #[must_use]
    pub fn stored_fingerprint(&self) -> Option<Fingerprint> {
        self.inner.lock().fingerprint
    }

    /// Reconcile the gate against the current fingerprint
    ///
    /// On mismatch the stored text is cleared and the gate moves to
    /// INVALIDATED; returns whether an invalidation happened. Idempotent -
    /// re-invalidating an already invalid gate is a no-op. A RUNNING gate is
    /// left alone; its completion stores the at-trigger fingerprint and the
    /// next reconcile catches any divergence.
    pub fn sync_fingerprint(&self, current: Fingerprint) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            AnalysisState::Running => false,
            AnalysisState::Invalidated => {
                inner.text = None;
                false
            }
            AnalysisState::Idle | AnalysisState::Ready => {
                if inner.fingerprint == Some(current) {
                    return false;
                }
                tracing::debug!(
                    fingerprint = %current.short(),
                    "inputs diverged from stored analysis, invalidating"
                );
                inner.state = AnalysisState::Invalidated;
                inner.fingerprint = None;
                inner.text = None;
                true
            }
        }
    }

    /// Trigger the analysis
    ///
    /// Ignored (no second invocation) while RUNNING. Otherwise the
    /// preconditions run inside the same critical section that moves the
    /// gate to RUNNING: every required source committed, error-free, and at
    /// the current generation, and no echoed-parameter mismatch against the
    /// live selection.
    ///
    /// # Errors
    /// - [`AnalysisError::NotReady`] / [`AnalysisError::Inconsistent`] -
    ///   precondition failures; the gate state is unchanged
    /// - [`AnalysisError::Backend`] / [`AnalysisError::Stream`] - the
    ///   invocation itself failed; the gate returns to INVALIDATED
    pub async fn trigger(&self, ctx: TriggerContext<'_>) -> Result<TriggerOutcome, AnalysisError> {
        let (at_trigger, summaries) = {
            // Check-and-set must not cross an await point
            let mut inner = self.inner.lock();
            if inner.state == AnalysisState::Running {
                tracing::debug!("analysis already in flight, trigger ignored");
                return Ok(TriggerOutcome::AlreadyRunning);
            }

            let missing: Vec<SourceId> = ctx
                .required
                .iter()
                .copied()
                .filter(|id| !ctx.view.is_fresh(*id, ctx.generation))
                .collect();
            if !missing.is_empty() {
                tracing::warn!(?missing, "analysis trigger rejected, sources not ready");
                return Err(AnalysisError::NotReady { missing });
            }

            let mismatches = validate(ctx.view, ctx.selection);
            if !mismatches.is_empty() {
                tracing::warn!(
                    count = mismatches.len(),
                    "analysis trigger rejected, view inconsistent"
                );
                return Err(AnalysisError::Inconsistent { mismatches });
            }

            let summaries = ctx.view.summaries();
            let at_trigger = fingerprint(ctx.selection, &summaries);
            inner.state = AnalysisState::Running;
            (at_trigger, summaries)
        };

        tracing::info!(fingerprint = %at_trigger.short(), "analysis started");
        let request = AnalysisRequest {
            selection: ctx.selection.clone(),
            summaries,
        };

        match self.run_backend(request).await {
            Ok(text) => {
                let mut inner = self.inner.lock();
                inner.state = AnalysisState::Ready;
                inner.fingerprint = Some(at_trigger);
                inner.text = Some(text);
                tracing::info!(fingerprint = %at_trigger.short(), "analysis ready");
                Ok(TriggerOutcome::Completed)
            }
            Err(error) => {
                let mut inner = self.inner.lock();
                inner.state = AnalysisState::Invalidated;
                inner.fingerprint = None;
                inner.text = None;
                tracing::error!(%error, "analysis failed");
                Err(error)
            }
        }
    }

    async fn run_backend(&self, request: AnalysisRequest) -> Result<String, AnalysisError> {
        match self.backend.analyze(request).await? {
            AnalysisResponse::Document(text) => Ok(text),
            AnalysisResponse::Stream(mut chunks) => {
                let mut text = String::new();
                while let Some(chunk) = chunks.next().await {
                    text.push_str(&chunk?);
                }
                Ok(text)
            }
        }
    }
}

impl std::fmt::Debug for AnalysisGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisGate")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use floorsight_selection::{DateRange, LabId, ShiftName};
    use floorsight_sources::{EchoedParams, SourceError, SourceResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SCHEDULED: SourceId = SourceId::new("scheduled-hours");
    const UTILIZATION: SourceId = SourceId::new("utilization");
    const REQUIRED: [SourceId; 2] = [SCHEDULED, UTILIZATION];

    fn selection() -> Selection {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
        )
        .unwrap();
        Selection::new(LabId::new("lab-1"), range).with_shift(ShiftName::new("A"))
    }

    fn ready_view(selection: &Selection, generation: Generation) -> AggregateView {
        let view = AggregateView::new();
        for id in REQUIRED {
            view.commit(SourceResult::success(
                generation,
                id,
                json!({"ok": true}),
                Some(SourceSummary::new().metric("value", 1.0)),
                EchoedParams::from_selection(selection),
            ));
        }
        view
    }

    /// Counts invocations; optional delay and scripted response
    struct Counting {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl Counting {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail,
            })
        }
    }

    #[async_trait::async_trait]
    impl AnalysisBackend for Counting {
        async fn analyze(
            &self,
            _request: AnalysisRequest,
        ) -> Result<AnalysisResponse, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(AnalysisError::Backend("scripted failure".into()));
            }
            Ok(AnalysisResponse::Document("all machines nominal".into()))
        }
    }

    #[tokio::test]
    async fn trigger_runs_backend_and_stores_text() {
        let backend = Counting::new(Duration::ZERO, false);
        let gate = AnalysisGate::new(backend.clone());
        let selection = selection();
        let view = ready_view(&selection, Generation::INITIAL);

        let outcome = gate
            .trigger(TriggerContext {
                view: &view,
                selection: &selection,
                generation: Generation::INITIAL,
                required: &REQUIRED,
            })
            .await
            .unwrap();

        assert_eq!(outcome, TriggerOutcome::Completed);
        assert_eq!(gate.state(), AnalysisState::Ready);
        assert_eq!(gate.text().as_deref(), Some("all machines nominal"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            gate.stored_fingerprint(),
            Some(fingerprint(&selection, &view.summaries()))
        );
    }

    #[tokio::test]
    async fn concurrent_triggers_invoke_backend_once() {
        let backend = Counting::new(Duration::from_millis(50), false);
        let gate = AnalysisGate::new(backend.clone());
        let selection = selection();
        let view = ready_view(&selection, Generation::INITIAL);
        let ctx = TriggerContext {
            view: &view,
            selection: &selection,
            generation: Generation::INITIAL,
            required: &REQUIRED,
        };

        let (first, second) = tokio::join!(gate.trigger(ctx), async {
            // The second click lands while the first call is still pending
            tokio::time::sleep(Duration::from_millis(10)).await;
            gate.trigger(ctx).await
        });

        assert_eq!(first.unwrap(), TriggerOutcome::Completed);
        assert_eq!(second.unwrap(), TriggerOutcome::AlreadyRunning);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn trigger_rejects_when_a_required_source_is_missing() {
        let backend = Counting::new(Duration::ZERO, false);
        let gate = AnalysisGate::new(backend.clone());
        let selection = selection();
        let view = AggregateView::new();
        view.commit(SourceResult::success(
            Generation::INITIAL,
            SCHEDULED,
            json!({}),
            None,
            EchoedParams::none(),
        ));

        let err = gate
            .trigger(TriggerContext {
                view: &view,
                selection: &selection,
                generation: Generation::INITIAL,
                required: &REQUIRED,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::NotReady { ref missing } if missing == &[UTILIZATION]));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(gate.state(), AnalysisState::Idle);
    }

    #[tokio::test]
    async fn trigger_rejects_stale_generation_sources() {
        let backend = Counting::new(Duration::ZERO, false);
        let gate = AnalysisGate::new(backend.clone());
        let selection = selection();
        let view = ready_view(&selection, Generation::INITIAL);

        // The selection has since moved to generation 1
        let err = gate
            .trigger(TriggerContext {
                view: &view,
                selection: &selection,
                generation: Generation::INITIAL.next(),
                required: &REQUIRED,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::NotReady { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn trigger_rejects_failed_required_source() {
        let backend = Counting::new(Duration::ZERO, false);
        let gate = AnalysisGate::new(backend.clone());
        let selection = selection();
        let view = ready_view(&selection, Generation::INITIAL);
        view.commit(SourceResult::failure(
            Generation::INITIAL,
            UTILIZATION,
            SourceError::Backend("down".into()),
        ));

        let err = gate
            .trigger(TriggerContext {
                view: &view,
                selection: &selection,
                generation: Generation::INITIAL,
                required: &REQUIRED,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::NotReady { ref missing } if missing == &[UTILIZATION]));
    }

    #[tokio::test]
    async fn trigger_rejects_inconsistent_view() {
        let backend = Counting::new(Duration::ZERO, false);
        let gate = AnalysisGate::new(backend.clone());
        let selection = selection();
        let view = ready_view(&selection, Generation::INITIAL);

        // A slow response echoed yesterday's shift inside the same generation
        view.commit(SourceResult::success(
            Generation::INITIAL,
            UTILIZATION,
            json!({}),
            Some(SourceSummary::new().metric("value", 1.0)),
            EchoedParams::from_selection(&selection).with_shift(ShiftName::new("B")),
        ));

        let err = gate
            .trigger(TriggerContext {
                view: &view,
                selection: &selection,
                generation: Generation::INITIAL,
                required: &REQUIRED,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Inconsistent { .. }));
        assert!(err.is_precondition());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(gate.state(), AnalysisState::Idle);
    }

    #[tokio::test]
    async fn backend_failure_returns_gate_to_invalidated() {
        let backend = Counting::new(Duration::ZERO, true);
        let gate = AnalysisGate::new(backend.clone());
        let selection = selection();
        let view = ready_view(&selection, Generation::INITIAL);

        let err = gate
            .trigger(TriggerContext {
                view: &view,
                selection: &selection,
                generation: Generation::INITIAL,
                required: &REQUIRED,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Backend(_)));
        assert_eq!(gate.state(), AnalysisState::Invalidated);
        assert_eq!(gate.text(), None);

        // A retry is possible and succeeds against a healthy backend
        let healthy = Counting::new(Duration::ZERO, false);
        let gate = AnalysisGate::new(healthy);
        gate.trigger(TriggerContext {
            view: &view,
            selection: &selection,
            generation: Generation::INITIAL,
            required: &REQUIRED,
        })
        .await
        .unwrap();
        assert_eq!(gate.state(), AnalysisState::Ready);
    }

    #[tokio::test]
    async fn streamed_chunks_accumulate_into_the_text_slot() {
        struct Streaming;

        #[async_trait::async_trait]
        impl AnalysisBackend for Streaming {
            async fn analyze(
                &self,
                _request: AnalysisRequest,
            ) -> Result<AnalysisResponse, AnalysisError> {
                let chunks = futures::stream::iter(vec![
                    Ok("utilization held ".to_string()),
                    Ok("at 82% ".to_string()),
                    Ok("across the window".to_string()),
                ]);
                Ok(AnalysisResponse::Stream(chunks.boxed()))
            }
        }

        let gate = AnalysisGate::new(Arc::new(Streaming));
        let selection = selection();
        let view = ready_view(&selection, Generation::INITIAL);

        gate.trigger(TriggerContext {
            view: &view,
            selection: &selection,
            generation: Generation::INITIAL,
            required: &REQUIRED,
        })
        .await
        .unwrap();

        assert_eq!(
            gate.text().as_deref(),
            Some("utilization held at 82% across the window")
        );
    }

    #[tokio::test]
    async fn aborted_stream_surfaces_and_invalidates() {
        struct Aborting;

        #[async_trait::async_trait]
        impl AnalysisBackend for Aborting {
            async fn analyze(
                &self,
                _request: AnalysisRequest,
            ) -> Result<AnalysisResponse, AnalysisError> {
                let chunks = futures::stream::iter(vec![
                    Ok("partial".to_string()),
                    Err(AnalysisError::Stream("connection reset".into())),
                ]);
                Ok(AnalysisResponse::Stream(chunks.boxed()))
            }
        }

        let gate = AnalysisGate::new(Arc::new(Aborting));
        let selection = selection();
        let view = ready_view(&selection, Generation::INITIAL);

        let err = gate
            .trigger(TriggerContext {
                view: &view,
                selection: &selection,
                generation: Generation::INITIAL,
                required: &REQUIRED,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Stream(_)));
        assert_eq!(gate.state(), AnalysisState::Invalidated);
        assert_eq!(gate.text(), None);
    }

    #[tokio::test]
    async fn fingerprint_mismatch_invalidates_ready_gate() {
        let backend = Counting::new(Duration::ZERO, false);
        let gate = AnalysisGate::new(backend);
        let selection = selection();
        let view = ready_view(&selection, Generation::INITIAL);

        gate.trigger(TriggerContext {
            view: &view,
            selection: &selection,
            generation: Generation::INITIAL,
            required: &REQUIRED,
        })
        .await
        .unwrap();
        assert_eq!(gate.state(), AnalysisState::Ready);

        // Same fingerprint: nothing happens
        let same = fingerprint(&selection, &view.summaries());
        assert!(!gate.sync_fingerprint(same));
        assert_eq!(gate.state(), AnalysisState::Ready);

        // The user picks another shift: stored text must go
        let moved = Selection {
            shift: Some(ShiftName::new("B")),
            ..selection.clone()
        };
        let diverged = fingerprint(&moved, &view.summaries());
        assert!(gate.sync_fingerprint(diverged));
        assert_eq!(gate.state(), AnalysisState::Invalidated);
        assert_eq!(gate.text(), None);

        // Idempotent: a second reconcile changes nothing
        assert!(!gate.sync_fingerprint(diverged));
        assert_eq!(gate.state(), AnalysisState::Invalidated);
    }

    #[tokio::test]
    async fn mock_backend_via_mockall() {
        let mut mock = MockAnalysisBackend::new();
        mock.expect_analyze()
            .times(1)
            .returning(|_| Ok(AnalysisResponse::Document("mocked".into())));

        let gate = AnalysisGate::new(Arc::new(mock));
        let selection = selection();
        let view = ready_view(&selection, Generation::INITIAL);

        gate.trigger(TriggerContext {
            view: &view,
            selection: &selection,
            generation: Generation::INITIAL,
            required: &REQUIRED,
        })
        .await
        .unwrap();
        assert_eq!(gate.text().as_deref(), Some("mocked"));
    }
}
