//! Assembly entry points.
//!
//! [`assemble`] renders every requested report concurrently, waits for all of
//! them, orders the successes canonically, merges them with the optional
//! cover and marketing inserts, and finally strips blank pages from the
//! merged document.
//!
//! A run either leaves a complete document at the output path or returns an
//! error and writes nothing there. Intermediate files live in a per-run
//! working directory that is removed on every exit path, including
//! cancellation.

use crate::config::{AssemblyConfig, ClassifierThresholds};
use crate::error::{PipelineError, RenderError};
use crate::output::{
    AssemblyOutput, AssemblyStats, FailedReport, FinalizeStatus, RenderOutcome, ReportTiming,
};
use crate::pipeline::assets::Assets;
use crate::pipeline::classify::{self, PageStats};
use crate::pipeline::finalize::{self, FinalizeReport};
use crate::pipeline::markup::TemplateSet;
use crate::pipeline::plan::AssemblyPlan;
use crate::pipeline::render::{self, HtmlConverter, RenderContext, WkhtmltopdfConverter};
use crate::pipeline::tempfiles::TempRegistry;
use crate::pipeline::{combine, pdf};
use crate::progress::{AssemblyStage, ProgressCallback};
use crate::report::{ReportJob, ReportKind, ReportMeta};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Everything one run needs besides configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyRequest {
    /// Jobs in any order; duplicates of the same slot are dropped.
    pub jobs: Vec<ReportJob>,
    pub meta: ReportMeta,
    /// Pre-made cover, copied verbatim as the first pages.
    #[serde(default)]
    pub cover: Option<PathBuf>,
    /// Pre-made inserts, copied verbatim after the reports, in this order.
    #[serde(default)]
    pub marketing: Vec<PathBuf>,
    pub output_path: PathBuf,
}

impl AssemblyRequest {
    pub fn new(meta: ReportMeta, output_path: impl Into<PathBuf>) -> Self {
        Self {
            jobs: Vec::new(),
            meta,
            cover: None,
            marketing: Vec::new(),
            output_path: output_path.into(),
        }
    }

    pub fn job(mut self, job: ReportJob) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn cover(mut self, path: impl Into<PathBuf>) -> Self {
        self.cover = Some(path.into());
        self
    }

    pub fn marketing(mut self, path: impl Into<PathBuf>) -> Self {
        self.marketing.push(path.into());
        self
    }
}

/// Assemble the report document described by `request`.
///
/// # Returns
/// `Ok(AssemblyOutput)` when a document exists at `request.output_path`,
/// even if some reports failed (see `output.failed`) or blank-page removal
/// failed (see `output.finalize`).
///
/// # Errors
/// Returns `Err(PipelineError)` only when no document could be produced:
/// - every report failed ([`PipelineError::NoValidReports`])
/// - the converter could not be started at all
///   ([`PipelineError::RendererUnavailable`])
/// - combining failed or produced no pages
pub async fn assemble(
    request: AssemblyRequest,
    config: &AssemblyConfig,
) -> Result<AssemblyOutput, PipelineError> {
    assemble_with_cancel(request, config, std::future::pending()).await
}

/// [`assemble`], aborted when `cancel` completes during rendering.
///
/// In-flight converter processes are killed, intermediate files are removed
/// and [`PipelineError::Cancelled`] is returned. Once rendering has finished
/// the run completes regardless of `cancel`.
pub async fn assemble_with_cancel<C>(
    request: AssemblyRequest,
    config: &AssemblyConfig,
    cancel: C,
) -> Result<AssemblyOutput, PipelineError>
where
    C: Future<Output = ()>,
{
    run_pipeline(request, config, cancel).await
}

/// Synchronous wrapper around [`assemble`].
///
/// Creates a temporary tokio runtime internally.
pub fn assemble_sync(
    request: AssemblyRequest,
    config: &AssemblyConfig,
) -> Result<AssemblyOutput, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(assemble(request, config))
}

/// Categorise the pages of an existing PDF without modifying it.
pub async fn inspect(
    path: impl AsRef<Path>,
    thresholds: &ClassifierThresholds,
) -> Result<PageStats, PipelineError> {
    let path = path.as_ref().to_path_buf();
    let t = thresholds.clone();
    let stats = tokio::task::spawn_blocking(move || classify::analyze_file(&path, &t))
        .await
        .map_err(|e| PipelineError::Internal(format!("Inspect task panicked: {}", e)))??;
    Ok(stats)
}

/// Remove blank pages from an existing PDF, in place.
pub async fn finalize_file(
    path: impl AsRef<Path>,
    thresholds: &ClassifierThresholds,
) -> Result<FinalizeReport, PipelineError> {
    let path = path.as_ref().to_path_buf();
    let t = thresholds.clone();
    let report = tokio::task::spawn_blocking(move || finalize::finalize(&path, &t))
        .await
        .map_err(|e| PipelineError::Internal(format!("Finalize task panicked: {}", e)))??;
    Ok(report)
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run_pipeline<C>(
    request: AssemblyRequest,
    config: &AssemblyConfig,
    cancel: C,
) -> Result<AssemblyOutput, PipelineError>
where
    C: Future<Output = ()>,
{
    let total_start = Instant::now();
    let output_path = request.output_path.clone();
    let jobs = canonical_jobs(request.jobs);
    info!(
        "Assembling {} reports for {} ({}) into {}",
        jobs.len(),
        request.meta.client_name,
        request.meta.period(),
        output_path.display()
    );
    if jobs.is_empty() {
        return Err(PipelineError::NoValidReports {
            attempted: 0,
            first_error: "no report jobs were supplied".to_string(),
        });
    }

    // ── Step 1: Per-run resources ────────────────────────────────────────
    let registry = Arc::new(TempRegistry::new(config.keep_temp_files).map_err(PipelineError::TempDir)?);
    let converter: Arc<dyn HtmlConverter> = match &config.converter {
        Some(c) => Arc::clone(c),
        None => Arc::new(WkhtmltopdfConverter::new(config.converter_command.clone())),
    };
    let ctx = RenderContext {
        converter,
        templates: TemplateSet::load(config.template_dir.as_deref()),
        assets: Assets::load(config),
        registry: Arc::clone(&registry),
        meta: request.meta.clone(),
        layout: config.layout.clone(),
        timeout: Duration::from_secs(config.render_timeout_secs),
    };
    let callback = config.progress_callback.as_ref();
    if let Some(cb) = callback {
        cb.on_assembly_start(jobs.len());
    }

    // ── Step 2: Render every job, then join ──────────────────────────────
    let render_start = Instant::now();
    let attempted = jobs.len();
    let mut outcomes = tokio::select! {
        outcomes = render_all(jobs, &ctx, callback, config.concurrency) => outcomes,
        () = cancel => {
            warn!("Cancelled while rendering; discarding intermediate files");
            return Err(PipelineError::Cancelled);
        }
    };
    outcomes.sort_by_key(|o| slot_position(o.job.kind));
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    let rendered = outcomes.iter().filter(|o| o.is_success()).count();
    info!(
        "Rendered {}/{} reports in {}ms",
        rendered, attempted, render_duration_ms
    );
    if rendered == 0 {
        return Err(no_document_error(&outcomes));
    }

    // ── Step 3: Plan and combine ─────────────────────────────────────────
    let plan = AssemblyPlan::build(request.cover.clone(), &outcomes, &request.marketing);
    debug!("Plan has {} sources", plan.len());
    if let Some(cb) = callback {
        cb.on_stage(AssemblyStage::Combining);
    }
    let combine_start = Instant::now();
    let summary = {
        let plan = plan.clone();
        let out = output_path.clone();
        tokio::task::spawn_blocking(move || combine::combine(&plan, &out))
            .await
            .map_err(|e| PipelineError::Internal(format!("Combine task panicked: {}", e)))??
    };
    let combine_duration_ms = combine_start.elapsed().as_millis() as u64;

    // ── Step 4: Remove blank pages ───────────────────────────────────────
    let finalize_start = Instant::now();
    let (finalize_status, removed_pages, final_pages) = if config.remove_blank_pages {
        if let Some(cb) = callback {
            cb.on_stage(AssemblyStage::Finalizing);
        }
        finalize_output(&output_path, &config.thresholds, summary.pages_written).await
    } else {
        (FinalizeStatus::Skipped, Vec::new(), summary.pages_written)
    };
    let finalize_duration_ms = finalize_start.elapsed().as_millis() as u64;

    // ── Step 5: Compute stats ────────────────────────────────────────────
    let failed: Vec<FailedReport> = outcomes
        .iter()
        .filter_map(|o| match &o.result {
            Err(e) => Some(FailedReport {
                kind: o.job.kind,
                label: o.job.label.clone(),
                error: e.clone(),
            }),
            Ok(_) => None,
        })
        .collect();
    let succeeded = plan.reports();

    let stats = AssemblyStats {
        requested_reports: attempted,
        rendered_reports: rendered,
        failed_reports: failed.len(),
        source_documents: plan.len(),
        skipped_sources: summary.skipped.len(),
        combined_pages: summary.pages_written,
        filtered_pages: summary.pages_filtered,
        removed_pages: removed_pages.len(),
        final_pages,
        render_duration_ms,
        combine_duration_ms,
        finalize_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        reports: outcomes.iter().map(timing).collect(),
    };

    info!(
        "Assembly complete: {} reports, {} pages ({} removed), {}ms total",
        succeeded.len(),
        stats.final_pages,
        stats.removed_pages,
        stats.total_duration_ms
    );
    if let Some(cb) = callback {
        cb.on_assembly_complete(succeeded.len(), removed_pages.len());
    }

    Ok(AssemblyOutput {
        output_path,
        succeeded,
        failed,
        removed_pages,
        finalize: finalize_status,
        stats,
    })
}

/// Walk the canonical slots and keep the first job supplied for each.
///
/// Jobs whose kind is not a canonical slot go last; they fail validation and
/// are reported like any other failed report.
fn canonical_jobs(jobs: Vec<ReportJob>) -> Vec<ReportJob> {
    let order = ReportKind::canonical_order();
    let mut slots: Vec<Option<ReportJob>> = std::iter::repeat_with(|| None).take(order.len()).collect();
    let mut stray = Vec::new();
    for job in jobs {
        match order.iter().position(|&kind| kind == job.kind) {
            Some(i) if slots[i].is_none() => slots[i] = Some(job),
            Some(_) => warn!("Ignoring duplicate job for {}", job.kind),
            None => {
                warn!("{} is not a report slot; it will be rejected", job.kind);
                stray.push(job);
            }
        }
    }
    slots.into_iter().flatten().chain(stray).collect()
}

/// Position of `kind` in the canonical order; unknown slots sort last.
fn slot_position(kind: ReportKind) -> usize {
    ReportKind::canonical_order()
        .iter()
        .position(|&k| k == kind)
        .unwrap_or(usize::MAX)
}

async fn render_all(
    jobs: Vec<ReportJob>,
    ctx: &RenderContext,
    callback: Option<&ProgressCallback>,
    concurrency: usize,
) -> Vec<RenderOutcome> {
    stream::iter(jobs.into_iter().map(move |job| async move {
        if let Some(cb) = callback {
            cb.on_report_start(job.kind, &job.label);
        }
        let outcome = render::render_job(job, ctx).await;
        if let Some(cb) = callback {
            match &outcome.result {
                Ok(_) => cb.on_report_complete(outcome.job.kind, &outcome.job.label, outcome.duration_ms),
                Err(e) => cb.on_report_error(outcome.job.kind, &outcome.job.label, &e.to_string()),
            }
        }
        outcome
    }))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await
}

/// Fatal error for a run in which no report rendered.
fn no_document_error(outcomes: &[RenderOutcome]) -> PipelineError {
    let errors: Vec<&RenderError> = outcomes.iter().filter_map(|o| o.result.as_ref().err()).collect();
    if errors.iter().all(|e| e.is_converter_unavailable()) {
        if let Some(RenderError::ConverterUnavailable { command, detail, .. }) = errors.first().copied() {
            error!("Converter '{}' could not be started: {}", command, detail);
            return PipelineError::RendererUnavailable {
                command: command.clone(),
                detail: detail.clone(),
            };
        }
    }
    let first_error = errors
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "Unknown error".to_string());
    error!("No report rendered; nothing will be written");
    PipelineError::NoValidReports {
        attempted: outcomes.len(),
        first_error,
    }
}

/// Trim the combined document. Failures leave the combined document in
/// place and are reported through the status.
async fn finalize_output(
    path: &Path,
    thresholds: &ClassifierThresholds,
    combined_pages: usize,
) -> (FinalizeStatus, Vec<usize>, usize) {
    let out = path.to_path_buf();
    let t = thresholds.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let result = finalize::finalize(&out, &t);
        let pages = match &result {
            Ok(report) => report.final_pages,
            Err(_) => pdf::page_count(&out).unwrap_or(combined_pages),
        };
        (result, pages)
    })
    .await;

    match joined {
        Ok((Ok(report), pages)) if report.rewritten => (
            FinalizeStatus::Trimmed {
                removed_pages: report.removed_pages.clone(),
            },
            report.removed_pages,
            pages,
        ),
        Ok((Ok(_), pages)) => (FinalizeStatus::AlreadyClean, Vec::new(), pages),
        Ok((Err(e), pages)) => {
            warn!("Document generated but not page-trimmed: {}", e);
            (
                FinalizeStatus::Failed {
                    reason: e.to_string(),
                },
                Vec::new(),
                pages,
            )
        }
        Err(e) => {
            warn!("Finalize task panicked: {}", e);
            (
                FinalizeStatus::Failed {
                    reason: format!("finalize task panicked: {e}"),
                },
                Vec::new(),
                combined_pages,
            )
        }
    }
}

fn timing(outcome: &RenderOutcome) -> ReportTiming {
    ReportTiming {
        kind: outcome.job.kind,
        label: outcome.job.label.clone(),
        duration_ms: outcome.duration_ms,
        success: outcome.is_success(),
    }
}
