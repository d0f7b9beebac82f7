//! Render one report job to a standalone PDF.
//!
//! Rendering writes the report markup and a footer fragment into the run's
//! working directory, hands both to an [`HtmlConverter`], and checks that the
//! converter left a loadable, non-empty PDF behind. Markup and footer are
//! deleted as soon as the converter returns.
//!
//! The converter is a trait so the pipeline can be driven without the real
//! external binary. [`WkhtmltopdfConverter`] is the production implementation:
//! one child process per report, killed on timeout or when the render future
//! is dropped.

use crate::config::PageLayout;
use crate::error::RenderError;
use crate::output::RenderOutcome;
use crate::pipeline::assets::Assets;
use crate::pipeline::markup::TemplateSet;
use crate::pipeline::pdf;
use crate::pipeline::tempfiles::TempRegistry;
use crate::report::{ReportJob, ReportMeta};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Everything a converter needs for one document.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub label: String,
    /// Report markup, written to `html_path` before conversion.
    pub html: String,
    pub html_path: PathBuf,
    /// Footer markup, written to `footer_path` before conversion.
    pub footer_html: String,
    pub footer_path: PathBuf,
    /// Where the converter must write the PDF.
    pub output_path: PathBuf,
    pub layout: PageLayout,
    pub timeout: Duration,
}

/// HTML → PDF conversion backend.
///
/// Implementations must write a PDF to `request.output_path` and return `Ok`,
/// or return a [`RenderError`]. The pipeline abandons a conversion that runs
/// past `request.timeout` and reports [`RenderError::Timeout`], whether or not
/// the implementation enforces the limit itself.
#[async_trait]
pub trait HtmlConverter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn convert(&self, request: &ConversionRequest) -> Result<(), RenderError>;
}

/// Runs the `wkhtmltopdf` executable.
#[derive(Debug, Clone)]
pub struct WkhtmltopdfConverter {
    command: String,
}

impl WkhtmltopdfConverter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

/// Lines of converter stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

#[async_trait]
impl HtmlConverter for WkhtmltopdfConverter {
    fn name(&self) -> &str {
        &self.command
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<(), RenderError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(request.layout.converter_args(&request.footer_path))
            .arg(&request.html_path)
            .arg(&request.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                RenderError::ConverterUnavailable {
                    label: request.label.clone(),
                    command: self.command.clone(),
                    detail: e.to_string(),
                }
            }
            _ => RenderError::Io {
                label: request.label.clone(),
                detail: format!("spawning {}: {}", self.command, e),
            },
        })?;

        // Dropping `wait_with_output` on timeout drops the child, which kills it.
        let output = tokio::time::timeout(request.timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout {
                label: request.label.clone(),
                secs: request.timeout.as_secs(),
            })?
            .map_err(|e| RenderError::Io {
                label: request.label.clone(),
                detail: format!("waiting for {}: {}", self.command, e),
            })?;

        if !output.status.success() {
            return Err(RenderError::ConversionFailed {
                label: request.label.clone(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

// ── Job rendering ────────────────────────────────────────────────────────

/// Shared, read-only state for every render of one run.
pub struct RenderContext {
    pub converter: Arc<dyn HtmlConverter>,
    pub templates: TemplateSet,
    pub assets: Assets,
    pub registry: Arc<TempRegistry>,
    pub meta: ReportMeta,
    pub layout: PageLayout,
    pub timeout: Duration,
}

/// Render `job`. Never fails the run: errors are captured in the outcome.
pub async fn render_job(job: ReportJob, ctx: &RenderContext) -> RenderOutcome {
    let start = Instant::now();
    let result = render_inner(&job, ctx).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(path) => info!("{} rendered in {}ms → {}", job.label, duration_ms, path.display()),
        Err(e) => warn!("{} failed after {}ms: {}", job.label, duration_ms, e),
    }
    RenderOutcome {
        job,
        result,
        duration_ms,
    }
}

async fn render_inner(job: &ReportJob, ctx: &RenderContext) -> Result<PathBuf, RenderError> {
    job.validate().map_err(|detail| RenderError::InvalidPayload {
        label: job.label.clone(),
        detail,
    })?;

    let html = ctx
        .templates
        .render_report(job, &ctx.meta, ctx.assets.logo_data_uri.as_deref())?;
    let footer = ctx
        .templates
        .render_footer(
            ctx.assets.footer_image_url.as_deref(),
            ctx.layout.footer_image_height_mm,
        )
        .map_err(|detail| RenderError::Template {
            label: job.label.clone(),
            template: "footer".to_string(),
            detail,
        })?;

    let stem = file_stem(&job.template_id);
    let html_path = ctx.registry.allocate(&stem, "html");
    let footer_path = ctx.registry.allocate(&format!("{stem}_footer"), "html");
    let output_path = ctx.registry.allocate(&stem, "pdf");

    let request = ConversionRequest {
        label: job.label.clone(),
        html,
        html_path,
        footer_html: footer,
        footer_path,
        output_path,
        layout: ctx.layout.clone(),
        timeout: ctx.timeout,
    };

    let converted = match write_inputs(&request).await {
        Ok(()) => convert_with_deadline(ctx.converter.as_ref(), &request).await,
        Err(e) => Err(e),
    };
    ctx.registry.release(&request.html_path);
    ctx.registry.release(&request.footer_path);

    let checked = match converted {
        Ok(()) => check_output(&request).await,
        Err(e) => Err(e),
    };
    if checked.is_err() {
        ctx.registry.release(&request.output_path);
    }
    checked.map(|()| request.output_path)
}

/// Run the converter under `request.timeout`, on top of any limit it applies.
async fn convert_with_deadline(
    converter: &dyn HtmlConverter,
    request: &ConversionRequest,
) -> Result<(), RenderError> {
    debug!("{}: converting with {}", request.label, converter.name());
    tokio::time::timeout(request.timeout, converter.convert(request))
        .await
        .map_err(|_| RenderError::Timeout {
            label: request.label.clone(),
            secs: request.timeout.as_secs(),
        })?
}

async fn write_inputs(request: &ConversionRequest) -> Result<(), RenderError> {
    let io_err = |e: std::io::Error| RenderError::Io {
        label: request.label.clone(),
        detail: e.to_string(),
    };
    tokio::fs::write(&request.html_path, &request.html)
        .await
        .map_err(io_err)?;
    tokio::fs::write(&request.footer_path, &request.footer_html)
        .await
        .map_err(io_err)
}

/// The converter must leave a loadable PDF with at least one page.
async fn check_output(request: &ConversionRequest) -> Result<(), RenderError> {
    let empty = |detail: String| RenderError::EmptyOutput {
        label: request.label.clone(),
        detail,
    };
    let meta = tokio::fs::metadata(&request.output_path)
        .await
        .map_err(|e| empty(format!("no output file: {e}")))?;
    if meta.len() == 0 {
        return Err(empty("output file is 0 bytes".to_string()));
    }

    let path = request.output_path.clone();
    let pages = tokio::task::spawn_blocking(move || pdf::page_count(&path))
        .await
        .map_err(|e| empty(format!("validation task panicked: {e}")))?
        .map_err(|e| empty(format!("not a readable PDF: {e}")))?;
    if pages == 0 {
        return Err(empty("PDF has no pages".to_string()));
    }
    Ok(())
}

fn file_stem(template_id: &str) -> String {
    let stem: String = template_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "report".to_string()
    } else {
        stem
    }
}
