use anyhow::{Context, Result};
use chainrig_api::{Epoch, ValidatorIndex, ValidatorPerformance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::{EvaluationFailure, RunError};
use crate::evaluation::scheduler::EvaluationRecord;
use crate::orchestrator::ProcessEntry;

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// First fatal error of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureSummary {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch: Option<Epoch>,
}

impl FailureSummary {
    pub fn from_error(err: &RunError) -> Self {
        match err {
            RunError::Orchestration(e) => Self {
                message: err.to_string(),
                component: e.component().map(str::to_string),
                evaluator: None,
                epoch: None,
            },
            RunError::Evaluation(e) => Self {
                message: err.to_string(),
                component: None,
                evaluator: e.evaluator().map(str::to_string),
                epoch: Some(e.epoch()),
            },
        }
    }
}

impl From<&EvaluationFailure> for FailureSummary {
    fn from(e: &EvaluationFailure) -> Self {
        Self {
            message: e.to_string(),
            component: None,
            evaluator: e.evaluator().map(str::to_string),
            epoch: Some(e.epoch()),
        }
    }
}

/// PID listing row as persisted in the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessRow {
    pub component: String,
    pub member: String,
    pub pid: u32,
}

impl From<&ProcessEntry> for ProcessRow {
    fn from(p: &ProcessEntry) -> Self {
        Self {
            component: p.component.clone(),
            member: p.member.clone(),
            pid: p.pid,
        }
    }
}

/// Summary artifact written at the end of every run, pass or fail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub schema_version: String,
    pub run_id: Uuid,
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub epochs: Epoch,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_epoch: Option<Epoch>,
    pub passed: bool,
    pub evaluations: Vec<EvaluationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,
    pub processes: Vec<ProcessRow>,
    /// Validators a fault was injected for, ascending.
    pub injected_faults: Vec<ValidatorIndex>,
}

impl RunReport {
    pub fn passed_count(&self) -> usize {
        self.evaluations.iter().filter(|r| r.passed).count()
    }
}

/// One row of the balance history table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceRow {
    pub epoch: Epoch,
    pub validator_index: ValidatorIndex,
    pub balance_before: u64,
    pub balance_after: u64,
    pub effective_balance: u64,
}

impl From<&ValidatorPerformance> for BalanceRow {
    fn from(p: &ValidatorPerformance) -> Self {
        Self {
            epoch: p.epoch,
            validator_index: p.validator_index,
            balance_before: p.balance_before,
            balance_after: p.balance_after,
            effective_balance: p.effective_balance,
        }
    }
}

/// Write run_report.json in pretty JSON format.
pub fn write_run_report_json(path: &Path, report: &RunReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write balance_history.json as an array of rows ordered by epoch, then index.
pub fn write_balance_history_json(path: &Path, rows: &[ValidatorPerformance]) -> Result<()> {
    let mut table: Vec<BalanceRow> = rows.iter().map(BalanceRow::from).collect();
    table.sort_by_key(|r| (r.epoch, r.validator_index));
    let content = serde_json::to_string_pretty(&table).context("serialize balance history")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render a markdown summary of a run.
pub fn render_run_summary_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# Run Summary\n\n");
    out.push_str(&format!(
        "- run: `{}`\n- seed: {}\n- result: {}\n- evaluations: {}/{} passed\n- injected faults: {}\n\n",
        report.run_id,
        report.seed,
        if report.passed { "PASS" } else { "FAIL" },
        report.passed_count(),
        report.evaluations.len(),
        report.injected_faults.len()
    ));

    if let Some(failure) = &report.failure {
        out.push_str("## Failure\n");
        out.push_str(&format!("{}\n\n", failure.message));
    }

    if !report.evaluations.is_empty() {
        out.push_str("## Evaluations\n");
        out.push_str("| epoch | evaluator | result | ms |\n|---|---|---|---|\n");
        for r in &report.evaluations {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                r.epoch,
                r.name,
                if r.passed { "pass" } else { "fail" },
                r.duration_ms
            ));
        }
    }
    out
}

/// Write run_summary.md.
pub fn write_run_summary_md(path: &Path, report: &RunReport) -> Result<()> {
    let md = render_run_summary_md(report);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
