//! Selection-churn simulator
//!
//! Drives a real coordinator against scripted in-process endpoints with
//! seeded latencies, replaying the interaction pattern that motivates the
//! whole stack: a user flipping filters faster than the backends answer.
//! After the churn settles, the report checks the invariants that must
//! hold - no committed result from a superseded generation, and a READY
//! analysis over consistent inputs.

use crate::config::CoordinatorConfig;
use crate::coordinator::ViewCoordinator;
use crate::error::CoordinatorError;
use crate::views::{self, ids, InsightsSources};
use chrono::NaiveDate;
use floorsight_insight::{
    AnalysisBackend, AnalysisError, AnalysisRequest, AnalysisResponse, AnalysisState,
};
use floorsight_selection::{DateRange, LabId, Selection, SelectionPatch, ShiftName};
use floorsight_sources::{SourceError, SourceFetch, SourceRequest, SourceResponse, EchoedParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Simulator tunables
#[derive(Debug, Clone, Copy)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of selection churns to replay
    pub churns: u64,
    /// Machines in the simulated lab
    pub machines: usize,
    /// Upper bound for simulated endpoint latency
    pub max_latency_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            churns: 25,
            machines: 4,
            max_latency_ms: 40,
        }
    }
}

/// What the simulation observed
#[derive(Debug, Default)]
pub struct SimulatorReport {
    /// Churns replayed
    pub churns: u64,
    /// Refreshes issued (including the final settling refresh)
    pub refreshes: u64,
    /// Results committed across all refreshes
    pub committed: u64,
    /// Results dropped by the staleness gate
    pub discarded: u64,
    /// Final generation reached
    pub final_generation: u64,
    /// Whether the final analysis reached READY
    pub analysis_ready: bool,
    /// Invariant violations (must be empty to pass)
    pub violations: Vec<String>,
}

impl SimulatorReport {
    /// Whether the run upheld every invariant
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Render the report for the terminal
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Selection-Churn Simulation Report");
        let _ = writeln!(out, "=================================");
        let _ = writeln!(out, "Churns:            {}", self.churns);
        let _ = writeln!(out, "Refreshes:         {}", self.refreshes);
        let _ = writeln!(out, "Commits:           {}", self.committed);
        let _ = writeln!(out, "Stale discards:    {}", self.discarded);
        let _ = writeln!(out, "Final generation:  {}", self.final_generation);
        let _ = writeln!(out, "Analysis ready:    {}", self.analysis_ready);
        if self.violations.is_empty() {
            let _ = writeln!(out, "Result:            PASS");
        } else {
            let _ = writeln!(out, "Result:            FAIL");
            for violation in &self.violations {
                let _ = writeln!(out, "  - {violation}");
            }
        }
        out
    }
}

/// A scripted endpoint with a fixed seeded latency
struct SimEndpoint {
    kind: EndpointKind,
    latency: Duration,
    machines: usize,
}

#[derive(Clone, Copy)]
enum EndpointKind {
    Machines,
    Shifts,
    ScheduledHours,
    QueryInfo,
    Utilization,
}

#[async_trait::async_trait]
impl SourceFetch for SimEndpoint {
    async fn fetch(&self, request: SourceRequest) -> Result<SourceResponse, SourceError> {
        tokio::time::sleep(self.latency).await;
        let selection = &request.selection;
        let days = selection.range.num_days() as f64;
        let shift_factor = selection
            .shift
            .as_ref()
            .and_then(|shift| shift.as_str().bytes().next())
            .map_or(1.0, |byte| f64::from(byte - b'A' + 1));

        let payload = match self.kind {
            EndpointKind::Machines => {
                let machines: Vec<String> =
                    (0..self.machines).map(|i| format!("m-{i}")).collect();
                json!({ "machines": machines })
            }
            EndpointKind::Shifts => json!({ "shifts": ["A", "B", "C"] }),
            EndpointKind::ScheduledHours => json!({ "scheduledHours": 8.0 * days }),
            EndpointKind::QueryInfo => json!({ "records": days * 24.0 }),
            EndpointKind::Utilization => json!({
                "averageUtilization": 60.0 + 10.0 * shift_factor,
                "machinesWithData": self.machines,
            }),
        };
        Ok(SourceResponse::new(payload).with_echo(EchoedParams::from_selection(selection)))
    }
}

/// A scripted analysis collaborator
struct SimAnalysis;

#[async_trait::async_trait]
impl AnalysisBackend for SimAnalysis {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        let utilization = request
            .summaries
            .get(&ids::UTILIZATION)
            .and_then(|summary| summary.get("avg_utilization"))
            .unwrap_or(0.0);
        Ok(AnalysisResponse::Document(format!(
            "Average utilization {utilization:.1}% across {} for shift {}",
            request.selection.range,
            request
                .selection
                .shift
                .as_ref()
                .map_or("(none)", |shift| shift.as_str()),
        )))
    }
}

fn endpoint(
    kind: EndpointKind,
    rng: &mut StdRng,
    config: &SimulatorConfig,
) -> Arc<dyn SourceFetch> {
    let latency = Duration::from_millis(rng.gen_range(1..=config.max_latency_ms.max(2)));
    Arc::new(SimEndpoint {
        kind,
        latency,
        machines: config.machines,
    })
}

fn build_coordinator(
    rng: &mut StdRng,
    config: &SimulatorConfig,
) -> Result<ViewCoordinator, CoordinatorError> {
    let today = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap_or_default();
    let initial = Selection::new(LabId::new("lab-1"), DateRange::last_days(7, today))
        .with_shift(ShiftName::new("A"));

    views::insights_view(
        initial,
        InsightsSources {
            machines: endpoint(EndpointKind::Machines, rng, config),
            shifts: endpoint(EndpointKind::Shifts, rng, config),
            scheduled_hours: endpoint(EndpointKind::ScheduledHours, rng, config),
            query_info: endpoint(EndpointKind::QueryInfo, rng, config),
            utilization: endpoint(EndpointKind::Utilization, rng, config),
        },
        Arc::new(SimAnalysis),
        CoordinatorConfig::new().with_default_timeout_secs(5),
    )
}

/// Replay a churn scenario and verify the coordinator's invariants
///
/// # Errors
/// Fails only on structural setup problems; runtime races are what the
/// report is for.
pub async fn run_simulator(config: SimulatorConfig) -> Result<SimulatorReport, CoordinatorError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let coordinator = Arc::new(build_coordinator(&mut rng, &config)?);
    let shifts = ["A", "B", "C"];

    let mut report = SimulatorReport {
        churns: config.churns,
        ..SimulatorReport::default()
    };
    let mut handles = Vec::new();

    for churn in 0..config.churns {
        let shift = shifts[(churn as usize) % shifts.len()];
        let patch = if churn % 5 == 4 {
            let today = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap_or_default();
            let days = 7 + (churn % 3) * 7;
            SelectionPatch::new().range(DateRange::last_days(days, today))
        } else {
            SelectionPatch::new().shift(Some(ShiftName::new(shift)))
        };
        coordinator.apply(&patch);

        let worker = coordinator.clone();
        handles.push(tokio::spawn(async move { worker.refresh().await }));
        report.refreshes += 1;

        // Churn again before most endpoints can answer
        tokio::time::sleep(Duration::from_millis(rng.gen_range(1..=config.max_latency_ms / 2 + 1)))
            .await;
    }

    for handle in handles {
        if let Ok(refresh) = handle.await {
            report.committed += refresh.committed.len() as u64;
        }
    }

    // Let the final selection settle completely, then ask for the analysis
    let final_refresh = coordinator.refresh().await;
    report.refreshes += 1;
    report.committed += final_refresh.committed.len() as u64;
    for (source_id, error) in &final_refresh.failed {
        report
            .violations
            .push(format!("final refresh failed for {source_id}: {error}"));
    }

    if let Err(error) = coordinator.trigger_analysis().await {
        report
            .violations
            .push(format!("final analysis trigger rejected: {error}"));
    }

    let generation = coordinator.generation();
    report.final_generation = generation.value();
    report.discarded = coordinator.discarded_count();
    report.analysis_ready = coordinator.analysis_state() == AnalysisState::Ready;

    for result in coordinator.view().results() {
        if result.generation != generation {
            report.violations.push(format!(
                "stale commit survived: {} at {} (current {})",
                result.source_id, result.generation, generation
            ));
        }
    }
    if !report.analysis_ready {
        report
            .violations
            .push("analysis did not reach READY after settling".to_string());
    }

    Ok(report)
}
