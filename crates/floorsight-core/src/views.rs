//! Preset source plans for the two dashboard views
//!
//! Both pages used to carry their own copy of the fetch plumbing; here each
//! is a declaration list handed to the shared coordinator. The host
//! application supplies one [`SourceFetch`] per backend endpoint; summaries
//! mirror the numbers each page feeds into its fingerprint.

use crate::config::CoordinatorConfig;
use crate::coordinator::{CoordinatorBuilder, ViewCoordinator};
use crate::error::CoordinatorError;
use floorsight_insight::AnalysisBackend;
use floorsight_selection::Selection;
use floorsight_sources::{merge, SourceFetch, SourceSpec, SourceSummary};
use serde_json::Value;
use std::sync::Arc;

/// Source ids shared by the view presets
pub mod ids {
    use floorsight_sources::SourceId;

    /// Machine list for the selected lab
    pub const MACHINES: SourceId = SourceId::new("machines");
    /// Shift configuration for the selected lab
    pub const SHIFTS: SourceId = SourceId::new("shifts");
    /// Scheduled hours for the selected shift and window
    pub const SCHEDULED_HOURS: SourceId = SourceId::new("scheduled-hours");
    /// Query provenance for the utilization computation
    pub const QUERY_INFO: SourceId = SourceId::new("query-info");
    /// Per-machine utilization over the window
    pub const UTILIZATION: SourceId = SourceId::new("utilization");
    /// Work orders over the window
    pub const WORK_ORDERS: SourceId = SourceId::new("work-orders");
    /// Alarm events, one request per machine
    pub const ALERTS: SourceId = SourceId::new("alerts");
    /// Shift utilization aggregate for the maintenance page
    pub const SHIFT_UTILIZATION: SourceId = SourceId::new("shift-utilization");
    /// Downtime incident counts
    pub const DOWNTIME: SourceId = SourceId::new("downtime");
}

fn machine_count_summary(payload: &Value) -> SourceSummary {
    let count = payload
        .get("machines")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    SourceSummary::new().metric("machine_count", count as f64)
}

fn scheduled_hours_summary(payload: &Value) -> SourceSummary {
    SourceSummary::new().metric(
        "scheduled_hours",
        payload
            .get("scheduledHours")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    )
}

fn utilization_summary(payload: &Value) -> SourceSummary {
    SourceSummary::new()
        .metric(
            "avg_utilization",
            payload
                .get("averageUtilization")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        )
        .metric(
            "machines_with_data",
            payload
                .get("machinesWithData")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        )
}

fn work_orders_summary(payload: &Value) -> SourceSummary {
    let count = payload
        .get("workOrders")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    SourceSummary::new().metric("work_orders", count as f64)
}

fn total_summary(payload: &Value) -> SourceSummary {
    SourceSummary::new().metric(
        "total",
        payload.get("total").and_then(Value::as_f64).unwrap_or(0.0),
    )
}

fn downtime_summary(payload: &Value) -> SourceSummary {
    SourceSummary::new()
        .metric(
            "downtime_hours",
            payload
                .get("totalNonProductiveHours")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        )
        .metric(
            "incidents",
            payload
                .get("incidentCount")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        )
}

/// Extract fan-out items from a machine-list payload
///
/// Accepts both `{"machines": ["m-1", ...]}` and
/// `{"machines": [{"id": "m-1", ...}, ...]}`.
fn machine_items(payload: &Value) -> Vec<Value> {
    payload
        .get("machines")
        .and_then(Value::as_array)
        .map(|machines| {
            machines
                .iter()
                .map(|machine| machine.get("id").cloned().unwrap_or_else(|| machine.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Collaborators backing the utilization-insights page
pub struct InsightsSources {
    /// Machine list endpoint
    pub machines: Arc<dyn SourceFetch>,
    /// Shift configuration endpoint
    pub shifts: Arc<dyn SourceFetch>,
    /// Scheduled-hours endpoint
    pub scheduled_hours: Arc<dyn SourceFetch>,
    /// Query-provenance endpoint
    pub query_info: Arc<dyn SourceFetch>,
    /// Utilization endpoint
    pub utilization: Arc<dyn SourceFetch>,
}

/// Build the coordinator for the utilization-insights page
///
/// Machine and shift lists fan out in parallel; scheduled hours wait on the
/// shift list, utilization on both lists. Analysis is button-driven on this
/// page, so automatic triggering stays off unless the config says
/// otherwise.
///
/// # Errors
/// Propagates structural plan errors.
pub fn insights_view(
    initial: Selection,
    sources: InsightsSources,
    backend: Arc<dyn AnalysisBackend>,
    config: CoordinatorConfig,
) -> Result<ViewCoordinator, CoordinatorError> {
    CoordinatorBuilder::new(initial)
        .config(config)
        .analysis_backend(backend)
        .source(
            SourceSpec::new(ids::MACHINES, sources.machines).summarize(machine_count_summary),
        )?
        .source(SourceSpec::new(ids::SHIFTS, sources.shifts))?
        .source(
            SourceSpec::new(ids::SCHEDULED_HOURS, sources.scheduled_hours)
                .depends_on(ids::SHIFTS)
                .summarize(scheduled_hours_summary),
        )?
        .source(SourceSpec::new(ids::QUERY_INFO, sources.query_info))?
        .source(
            SourceSpec::new(ids::UTILIZATION, sources.utilization)
                .depends_on(ids::MACHINES)
                .depends_on(ids::SHIFTS)
                .summarize(utilization_summary),
        )?
        .build()
}

/// Collaborators backing the maintenance-overview page
pub struct MaintenanceSources {
    /// Machine list endpoint
    pub machines: Arc<dyn SourceFetch>,
    /// Work-order endpoint
    pub work_orders: Arc<dyn SourceFetch>,
    /// Alarm-events endpoint, queried once per machine
    pub alerts: Arc<dyn SourceFetch>,
    /// Shift-utilization endpoint
    pub shift_utilization: Arc<dyn SourceFetch>,
    /// Downtime endpoint
    pub downtime: Arc<dyn SourceFetch>,
}

/// Build the coordinator for the maintenance-overview page
///
/// Alert counts fan out per machine and merge by summation; an empty lab
/// settles every dependent with zeroed stats. This page regenerates its
/// analysis automatically whenever fresh, consistent data lands.
///
/// # Errors
/// Propagates structural plan errors.
pub fn maintenance_view(
    initial: Selection,
    sources: MaintenanceSources,
    backend: Arc<dyn AnalysisBackend>,
    config: CoordinatorConfig,
) -> Result<ViewCoordinator, CoordinatorError> {
    CoordinatorBuilder::new(initial)
        .config(config.with_auto_analyze(true))
        .analysis_backend(backend)
        .source(
            SourceSpec::new(ids::MACHINES, sources.machines).summarize(machine_count_summary),
        )?
        .source(
            SourceSpec::new(ids::WORK_ORDERS, sources.work_orders)
                .summarize(work_orders_summary),
        )?
        .source(
            SourceSpec::new(ids::ALERTS, sources.alerts)
                .depends_on(ids::MACHINES)
                .fan_out(ids::MACHINES, machine_items, merge::sum_counts)
                .summarize(total_summary),
        )?
        .source(
            SourceSpec::new(ids::SHIFT_UTILIZATION, sources.shift_utilization)
                .depends_on(ids::MACHINES)
                .summarize(utilization_summary),
        )?
        .source(
            SourceSpec::new(ids::DOWNTIME, sources.downtime)
                .depends_on(ids::MACHINES)
                .summarize(downtime_summary)
                .optional(),
        )?
        .build()
}
