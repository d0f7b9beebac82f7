//! Result types returned by the assembly entry points.

use crate::error::RenderError;
use crate::report::{ReportJob, ReportKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of rendering one job. Produced exactly once per job.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub job: ReportJob,
    /// Path of the rendered PDF inside the run's working directory.
    pub result: Result<PathBuf, RenderError>,
    pub duration_ms: u64,
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// A report left out of the final document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedReport {
    pub kind: ReportKind,
    pub label: String,
    pub error: RenderError,
}

/// What happened to the combined document during blank-page removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinalizeStatus {
    /// Blank pages were removed; indices are 1-based, relative to the
    /// combined document.
    Trimmed { removed_pages: Vec<usize> },
    /// No page was classified as empty; the document was not rewritten.
    AlreadyClean,
    /// Blank-page removal is disabled in the configuration.
    Skipped,
    /// The document was generated but could not be trimmed. The combined
    /// document is in place and valid.
    Failed { reason: String },
}

impl FinalizeStatus {
    /// True unless finalization was attempted and failed.
    pub fn is_ok(&self) -> bool {
        !matches!(self, FinalizeStatus::Failed { .. })
    }
}

/// Wall-clock time spent rendering one report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTiming {
    pub kind: ReportKind,
    pub label: String,
    pub duration_ms: u64,
    pub success: bool,
}

/// Aggregate statistics for one assembly run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyStats {
    /// Jobs dispatched to the renderer.
    pub requested_reports: usize,
    pub rendered_reports: usize,
    pub failed_reports: usize,
    /// Sources handed to the combiner, including cover and marketing.
    pub source_documents: usize,
    /// Sources skipped by the combiner (missing or unreadable).
    pub skipped_sources: usize,
    /// Pages written by the combiner.
    pub combined_pages: usize,
    /// Pages dropped by the combiner's coarse content filter.
    pub filtered_pages: usize,
    /// Pages removed by the blank-page finalizer.
    pub removed_pages: usize,
    /// Pages in the document at the output path.
    pub final_pages: usize,
    pub render_duration_ms: u64,
    pub combine_duration_ms: u64,
    pub finalize_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Per-report timings in canonical order.
    pub reports: Vec<ReportTiming>,
}

/// Complete result of a successful assembly run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyOutput {
    pub output_path: PathBuf,
    /// Reports included in the document, in canonical order.
    pub succeeded: Vec<ReportKind>,
    /// Reports excluded because they failed to render.
    pub failed: Vec<FailedReport>,
    /// 1-based indices (in the combined document) removed by the finalizer.
    pub removed_pages: Vec<usize>,
    pub finalize: FinalizeStatus,
    pub stats: AssemblyStats,
}

impl AssemblyOutput {
    /// Canonical keys of the reports that failed, for callers that only need ids.
    pub fn failed_kinds(&self) -> Vec<ReportKind> {
        self.failed.iter().map(|f| f.kind).collect()
    }
}
