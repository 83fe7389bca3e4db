//! End-to-end scenarios: churn races, double triggers, echo drift

use chrono::NaiveDate;
use floorsight_core::{CoordinatorConfig, ViewCoordinator};
use floorsight_insight::{
    AnalysisBackend, AnalysisError, AnalysisRequest, AnalysisResponse, AnalysisState,
    TriggerOutcome,
};
use floorsight_selection::{DateRange, LabId, MachineScope, Selection, SelectionPatch, ShiftName};
use floorsight_sources::{
    EchoedParams, SourceError, SourceFetch, SourceId, SourceRequest, SourceResponse, SourceSpec,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MACHINES: SourceId = SourceId::new("machines");
const SCHEDULED: SourceId = SourceId::new("scheduled-hours");

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
}

fn initial_selection() -> Selection {
    Selection::new(LabId::new("L1"), DateRange::new(day(1), day(7)).unwrap())
}

/// Well-behaved endpoint echoing the selection it was asked for
struct Honest {
    delay: Duration,
}

#[async_trait::async_trait]
impl SourceFetch for Honest {
    async fn fetch(&self, request: SourceRequest) -> Result<SourceResponse, SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let lab = request.selection.lab_id.to_string();
        Ok(SourceResponse::new(json!({ "lab": lab, "machines": ["m-1"] }))
            .with_echo(EchoedParams::from_selection(&request.selection)))
    }
}

/// Analysis backend that counts invocations
struct CountingAnalysis {
    calls: AtomicUsize,
    delay: Duration,
}

#[async_trait::async_trait]
impl AnalysisBackend for CountingAnalysis {
    async fn analyze(&self, _request: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(AnalysisResponse::Document("insight".into()))
    }
}

fn build(
    machines: Arc<dyn SourceFetch>,
    scheduled: Arc<dyn SourceFetch>,
    backend: Arc<dyn AnalysisBackend>,
) -> ViewCoordinator {
    ViewCoordinator::builder(initial_selection())
        .analysis_backend(backend)
        .config(CoordinatorConfig::new().with_default_timeout_secs(5))
        .source(SourceSpec::new(MACHINES, machines))
        .unwrap()
        .source(SourceSpec::new(SCHEDULED, scheduled).depends_on(MACHINES))
        .unwrap()
        .build()
        .unwrap()
}

/// A lab-list refetch from the old selection is still in flight when the
/// user churns again; the view must only ever reflect the newest
/// generation once it settles.
#[tokio::test]
async fn mid_flight_churn_leaves_only_newest_generation_visible() {
    let backend = Arc::new(CountingAnalysis {
        calls: AtomicUsize::new(0),
        delay: Duration::ZERO,
    });
    let coordinator = Arc::new(build(
        Arc::new(Honest {
            delay: Duration::from_millis(60),
        }),
        Arc::new(Honest {
            delay: Duration::ZERO,
        }),
        backend,
    ));

    // Generation 0 refresh in flight...
    let worker = coordinator.clone();
    let in_flight = tokio::spawn(async move { worker.refresh().await });
    tokio::time::sleep(Duration::from_millis(5)).await;

    // ...user switches lab (g1), then immediately picks a shift (g2)
    coordinator
        .apply(&SelectionPatch::new().lab(LabId::new("L2")))
        .expect("lab switch");
    coordinator
        .apply(&SelectionPatch::new().shift(Some(ShiftName::new("A"))))
        .expect("shift change");
    assert_eq!(coordinator.generation().value(), 2);

    let settled = coordinator.refresh().await;
    let stale = in_flight.await.unwrap();

    assert_eq!(settled.committed.len(), 2);
    assert!(stale.committed.is_empty());

    for result in coordinator.view().results() {
        assert_eq!(result.generation.value(), 2);
    }
    assert_eq!(coordinator.view().payload(MACHINES).unwrap()["lab"], "L2");
}

/// Two "Generate Analysis" clicks 50ms apart while the first call is
/// pending must produce exactly one underlying invocation.
#[tokio::test]
async fn double_click_produces_one_analysis_call() {
    let backend = Arc::new(CountingAnalysis {
        calls: AtomicUsize::new(0),
        delay: Duration::from_millis(150),
    });
    let coordinator = Arc::new(build(
        Arc::new(Honest {
            delay: Duration::ZERO,
        }),
        Arc::new(Honest {
            delay: Duration::ZERO,
        }),
        backend.clone(),
    ));

    coordinator.refresh().await;

    let first_clicker = coordinator.clone();
    let second_clicker = coordinator.clone();
    let (first, second) = tokio::join!(
        tokio::spawn(async move { first_clicker.trigger_analysis().await }),
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            second_clicker.trigger_analysis().await
        }),
    );

    let outcomes = [first.unwrap().unwrap(), second.unwrap().unwrap()];
    assert!(outcomes.contains(&TriggerOutcome::Completed));
    assert!(outcomes.contains(&TriggerOutcome::AlreadyRunning));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.analysis_state(), AnalysisState::Ready);
}

/// A source reporting success while echoing parameters from a different
/// selection must block the analysis with a distinct precondition error.
#[tokio::test]
async fn echo_drift_blocks_the_analysis() {
    /// Always answers for machine "m-9", whatever was asked
    struct Drifted;

    #[async_trait::async_trait]
    impl SourceFetch for Drifted {
        async fn fetch(&self, request: SourceRequest) -> Result<SourceResponse, SourceError> {
            let echo = EchoedParams::from_selection(&request.selection)
                .with_machine(MachineScope::One("m-9".into()));
            Ok(SourceResponse::new(json!({"machines": ["m-9"]})).with_echo(echo))
        }
    }

    let backend = Arc::new(CountingAnalysis {
        calls: AtomicUsize::new(0),
        delay: Duration::ZERO,
    });
    let coordinator = build(
        Arc::new(Drifted),
        Arc::new(Honest {
            delay: Duration::ZERO,
        }),
        backend.clone(),
    );

    let report = coordinator.refresh().await;
    assert_eq!(report.committed.len(), 2);

    let err = coordinator.trigger_analysis().await.unwrap_err();
    match err {
        AnalysisError::Inconsistent { mismatches } => {
            assert!(!mismatches.is_empty());
            assert!(mismatches.iter().any(|m| m.echoed == "m-9"));
        }
        other => panic!("expected consistency rejection, got {other:?}"),
    }
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert_ne!(coordinator.analysis_state(), AnalysisState::Running);
}

/// A hung endpoint resolves as a timeout error result instead of wedging
/// the refresh.
#[tokio::test]
async fn hung_endpoint_times_out_into_an_error_result() {
    struct Hung;

    #[async_trait::async_trait]
    impl SourceFetch for Hung {
        async fn fetch(&self, _request: SourceRequest) -> Result<SourceResponse, SourceError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(SourceResponse::new(json!({})))
        }
    }

    let backend = Arc::new(CountingAnalysis {
        calls: AtomicUsize::new(0),
        delay: Duration::ZERO,
    });
    let coordinator = ViewCoordinator::builder(initial_selection())
        .analysis_backend(backend)
        .source(
            SourceSpec::new(MACHINES, Arc::new(Hung)).timeout(Duration::from_millis(30)),
        )
        .unwrap()
        .build()
        .unwrap();

    let report = coordinator.refresh().await;
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].1,
        SourceError::Timeout { timeout_ms: 30 }
    ));
}

/// Rapid churn with automatic analysis: only the final state's analysis
/// survives, and the text matches the final selection's data.
#[tokio::test]
async fn auto_analysis_settles_on_the_final_selection() {
    struct ShiftAwareAnalysis;

    #[async_trait::async_trait]
    impl AnalysisBackend for ShiftAwareAnalysis {
        async fn analyze(
            &self,
            request: AnalysisRequest,
        ) -> Result<AnalysisResponse, AnalysisError> {
            let shift = request
                .selection
                .shift
                .as_ref()
                .map_or("(none)", |s| s.as_str())
                .to_string();
            Ok(AnalysisResponse::Document(format!("analysis for {shift}")))
        }
    }

    let coordinator = ViewCoordinator::builder(initial_selection())
        .analysis_backend(Arc::new(ShiftAwareAnalysis))
        .config(CoordinatorConfig::new().with_auto_analyze(true))
        .source(SourceSpec::new(
            MACHINES,
            Arc::new(Honest {
                delay: Duration::ZERO,
            }),
        ))
        .unwrap()
        .build()
        .unwrap();

    for shift in ["A", "B", "C"] {
        coordinator
            .apply(&SelectionPatch::new().shift(Some(ShiftName::new(shift))))
            .expect("structural change");
        let report = coordinator.refresh().await;
        assert!(matches!(
            report.analysis,
            Some(Ok(TriggerOutcome::Completed))
        ));
    }

    assert_eq!(coordinator.analysis_state(), AnalysisState::Ready);
    assert_eq!(
        coordinator.analysis_text().as_deref(),
        Some("analysis for C")
    );
}
