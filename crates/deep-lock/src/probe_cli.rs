//! Library half of the `deep_lock_probe` binary: import a JSON graph, lock
//! it, verify the result and render the outcome.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph_locker::{DeepLocker, LockEvent, LockReport, LockerConfig};
use crate::json_graph::import_json;
use crate::lock_action::{DeepLockOptions, LockAction, resolve_action};
use crate::lock_verifier::{LockVerdict, verify_lock};
use crate::readonly_projection::{TypeShape, deep_readonly, readonly_paths};
use crate::realm::Realm;

/// Flags accepted by the probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub action: Option<String>,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// Every reachable node was locked.
    Locked,
    /// The action was rejected; nothing was touched.
    Rejected,
    /// A lock primitive failed part way; earlier nodes stay locked.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutput {
    pub generated_at_utc: String,
    pub trace_id: String,
    pub outcome: ProbeOutcome,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub report: Option<LockReport>,
    pub report_hash: Option<String>,
    pub verdict: Option<LockVerdict>,
    /// Property paths a typed caller would see as read-only; only filled
    /// for `freeze`.
    pub readonly_paths: Vec<String>,
    pub events: Vec<LockEvent>,
}

/// Import `document`, lock it according to `request` and verify.
///
/// Import failures are errors; lock failures are reported in the output.
pub fn run_probe(document: &Value, request: &ProbeRequest) -> Result<ProbeOutput> {
    let mut realm = Realm::new();
    let graph = import_json(&mut realm, document).context("failed to import graph document")?;

    let mut config = LockerConfig::default();
    if let Some(trace_id) = &request.trace_id {
        config.trace_id = trace_id.clone();
    }
    let trace_id = config.trace_id.clone();
    let mut locker = DeepLocker::new(config);
    let options = request.action.as_deref().map(DeepLockOptions::with_action_name);

    let mut output = ProbeOutput {
        generated_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        trace_id,
        outcome: ProbeOutcome::Locked,
        error_code: None,
        error: None,
        report: None,
        report_hash: None,
        verdict: None,
        readonly_paths: Vec::new(),
        events: Vec::new(),
    };

    match locker.lock_with_report(&mut realm, graph.root, options.as_ref()) {
        Ok(report) => {
            let verdict = verify_lock(&realm, &report.root, report.action)
                .context("failed to verify locked graph")?;
            if report.action == LockAction::Freeze {
                let shape = TypeShape::of_value(&realm, &report.root)
                    .context("failed to project locked graph")?;
                let shape = deep_readonly(&shape);
                output.readonly_paths = readonly_paths(&shape).into_iter().collect();
            }
            output.report_hash = Some(report.canonical_hash());
            output.report = Some(report);
            output.verdict = Some(verdict);
        }
        Err(error) => {
            output.outcome = if error.is_partial_lock() {
                ProbeOutcome::Partial
            } else {
                ProbeOutcome::Rejected
            };
            output.error_code = Some(error.error_code().to_string());
            output.error = Some(error.to_string());
        }
    }
    output.events = locker.drain_events();
    Ok(output)
}

/// Check the requested action without importing anything.
pub fn validate_action(action: Option<&str>) -> Result<LockAction> {
    let options = action.map(DeepLockOptions::with_action_name);
    Ok(resolve_action(options.as_ref())?)
}

pub fn render_probe_summary(output: &ProbeOutput) -> String {
    let mut lines = Vec::new();
    lines.push(format!("generated_at_utc: {}", output.generated_at_utc));
    lines.push(format!("trace_id: {}", output.trace_id));
    lines.push(format!(
        "outcome: {}",
        match output.outcome {
            ProbeOutcome::Locked => "locked",
            ProbeOutcome::Rejected => "rejected",
            ProbeOutcome::Partial => "partial",
        }
    ));
    if let (Some(code), Some(error)) = (&output.error_code, &output.error) {
        lines.push(format!("error: {code} {error}"));
    }
    if let Some(report) = &output.report {
        lines.push(format!("action: {}", report.action));
        lines.push(format!("nodes_locked: {}", report.stats.nodes_locked));
        lines.push(format!("revisits_skipped: {}", report.stats.revisits_skipped));
        lines.push(format!(
            "binary_views_skipped: {}",
            report.stats.binary_views_skipped
        ));
        lines.push(format!("restricted_stops: {}", report.stats.restricted_stops));
        for node in &report.locked {
            lines.push(format!("  - {} {}", node.path, node.handle));
        }
    }
    if let Some(hash) = &output.report_hash {
        lines.push(format!("report_hash: {hash}"));
    }
    if let Some(verdict) = &output.verdict {
        lines.push(format!(
            "verdict: checked={} violations={}",
            verdict.checked,
            verdict.violations.len()
        ));
        for violation in &verdict.violations {
            lines.push(format!("  - {} observed={:?}", violation.path, violation.observed));
        }
    }
    if !output.readonly_paths.is_empty() {
        lines.push(format!("readonly_paths: {}", output.readonly_paths.len()));
    }
    lines.push(format!("events: {}", output.events.len()));
    lines.join("\n")
}
