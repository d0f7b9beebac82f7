//! Configuration types for report assembly.
//!
//! All pipeline behaviour is controlled through [`AssemblyConfig`], built via
//! its [`AssemblyConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config across concurrent runs and to log exactly what a
//! run was asked to do.
//!
//! The blank-page heuristics are empirical, so their cutoffs live here as
//! [`ClassifierThresholds`] instead of being hard-coded in the classifier.

use crate::error::PipelineError;
use crate::pipeline::render::HtmlConverter;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable overriding the converter executable.
pub const ENV_CONVERTER_CMD: &str = "WKHTMLTOPDF_CMD";
/// Environment variable overriding the footer image path.
pub const ENV_FOOTER_IMAGE: &str = "RODAPE_IMG_PATH";
/// Set to `1` to keep intermediate HTML and PDF files for debugging.
pub const ENV_KEEP_TEMP: &str = "KEEP_WKHTML_HTML";

/// Configuration for one assembly run.
///
/// Built via [`AssemblyConfig::builder()`] or using
/// [`AssemblyConfig::default()`].
///
/// # Example
/// ```rust
/// use report_assembler::AssemblyConfig;
///
/// let config = AssemblyConfig::builder()
///     .concurrency(4)
///     .render_timeout_secs(90)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AssemblyConfig {
    /// Maximum number of reports rendered at the same time. Default: 4.
    ///
    /// Every render spawns its own converter process, so this is effectively
    /// a cap on concurrent child processes. Use 1 for strictly sequential
    /// rendering.
    pub concurrency: usize,

    /// Converter executable. Default: `wkhtmltopdf`.
    pub converter_command: String,

    /// Pre-constructed converter. Takes precedence over `converter_command`.
    pub converter: Option<Arc<dyn HtmlConverter>>,

    /// Page geometry handed to the converter.
    pub layout: PageLayout,

    /// Per-report converter timeout in seconds. Default: 120.
    ///
    /// A converter still running after this is killed and the report is
    /// recorded as failed; the other reports are unaffected.
    pub render_timeout_secs: u64,

    /// Root directory holding `<template_id>/template.html` files. Reports
    /// whose template is missing fall back to the built-in layout.
    pub template_dir: Option<PathBuf>,

    /// Image shown in the page footer. Missing images yield an empty footer.
    pub footer_image: Option<PathBuf>,

    /// Logo embedded in the index page.
    pub logo_image: Option<PathBuf>,

    /// Keep intermediate HTML/PDF files instead of deleting them. Default: false.
    pub keep_temp_files: bool,

    /// Run the blank-page finalizer after combining. Default: true.
    pub remove_blank_pages: bool,

    /// Cutoffs used by the blank-page classifier.
    pub thresholds: ClassifierThresholds,

    /// Receives per-report progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            converter_command: "wkhtmltopdf".to_string(),
            converter: None,
            layout: PageLayout::default(),
            render_timeout_secs: 120,
            template_dir: Some(PathBuf::from("templates")),
            footer_image: None,
            logo_image: None,
            keep_temp_files: false,
            remove_blank_pages: true,
            thresholds: ClassifierThresholds::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AssemblyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyConfig")
            .field("concurrency", &self.concurrency)
            .field("converter_command", &self.converter_command)
            .field("converter", &self.converter.as_ref().map(|c| c.name().to_string()))
            .field("layout", &self.layout)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("template_dir", &self.template_dir)
            .field("footer_image", &self.footer_image)
            .field("logo_image", &self.logo_image)
            .field("keep_temp_files", &self.keep_temp_files)
            .field("remove_blank_pages", &self.remove_blank_pages)
            .field("thresholds", &self.thresholds)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AssemblyProgressCallback>"),
            )
            .finish()
    }
}

impl AssemblyConfig {
    /// Create a new builder for `AssemblyConfig`.
    pub fn builder() -> AssemblyConfigBuilder {
        AssemblyConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overlaid with `WKHTMLTOPDF_CMD`, `RODAPE_IMG_PATH` and
    /// `KEEP_WKHTML_HTML`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(cmd) = std::env::var(ENV_CONVERTER_CMD) {
            if !cmd.trim().is_empty() {
                config.converter_command = cmd;
            }
        }
        if let Ok(path) = std::env::var(ENV_FOOTER_IMAGE) {
            if !path.trim().is_empty() {
                config.footer_image = Some(PathBuf::from(path));
            }
        }
        config.keep_temp_files = std::env::var(ENV_KEEP_TEMP).is_ok_and(|v| v == "1");
        config
    }
}

/// Builder for [`AssemblyConfig`].
#[derive(Debug)]
pub struct AssemblyConfigBuilder {
    config: AssemblyConfig,
}

impl AssemblyConfigBuilder {
    /// Start from [`AssemblyConfig::from_env`] instead of the plain defaults.
    pub fn from_env() -> Self {
        Self {
            config: AssemblyConfig::from_env(),
        }
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn converter_command(mut self, cmd: impl Into<String>) -> Self {
        self.config.converter_command = cmd.into();
        self
    }

    pub fn converter(mut self, converter: Arc<dyn HtmlConverter>) -> Self {
        self.config.converter = Some(converter);
        self
    }

    pub fn layout(mut self, layout: PageLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.template_dir = Some(dir.into());
        self
    }

    /// Use only the built-in templates.
    pub fn builtin_templates(mut self) -> Self {
        self.config.template_dir = None;
        self
    }

    pub fn footer_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.footer_image = Some(path.into());
        self
    }

    pub fn logo_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.logo_image = Some(path.into());
        self
    }

    pub fn keep_temp_files(mut self, v: bool) -> Self {
        self.config.keep_temp_files = v;
        self
    }

    pub fn remove_blank_pages(mut self, v: bool) -> Self {
        self.config.remove_blank_pages = v;
        self
    }

    pub fn thresholds(mut self, thresholds: ClassifierThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssemblyConfig, PipelineError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.render_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "Render timeout must be ≥ 1 second".into(),
            ));
        }
        if c.converter.is_none() && c.converter_command.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Converter command must not be empty".into(),
            ));
        }
        c.thresholds.validate()?;
        Ok(self.config)
    }
}

// ── Layout ───────────────────────────────────────────────────────────────

/// Fixed page geometry for converted reports.
///
/// The bottom margin is deliberately larger than the others so the footer
/// image overlay never overlaps body content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_size: String,
    pub margin_top_mm: u32,
    pub margin_bottom_mm: u32,
    pub margin_left_mm: u32,
    pub margin_right_mm: u32,
    /// Gap between body content and the footer.
    pub footer_spacing_mm: u32,
    /// Height of the footer image.
    pub footer_image_height_mm: u32,
    /// Draw a separator line above the footer.
    pub footer_line: bool,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            page_size: "A4".to_string(),
            margin_top_mm: 10,
            margin_bottom_mm: 18,
            margin_left_mm: 6,
            margin_right_mm: 6,
            footer_spacing_mm: 0,
            footer_image_height_mm: 12,
            footer_line: false,
        }
    }
}

impl PageLayout {
    /// Converter flags for this geometry, excluding input and output paths.
    pub fn converter_args(&self, footer_html: &std::path::Path) -> Vec<String> {
        let mut args = vec![
            "--enable-local-file-access".to_string(),
            "--page-size".to_string(),
            self.page_size.clone(),
            "--margin-top".to_string(),
            format!("{}mm", self.margin_top_mm),
            "--margin-bottom".to_string(),
            format!("{}mm", self.margin_bottom_mm),
            "--margin-left".to_string(),
            format!("{}mm", self.margin_left_mm),
            "--margin-right".to_string(),
            format!("{}mm", self.margin_right_mm),
        ];
        if !self.footer_line {
            args.push("--no-footer-line".to_string());
        }
        args.push("--footer-html".to_string());
        args.push(footer_html.display().to_string());
        args.push("--footer-spacing".to_string());
        args.push(self.footer_spacing_mm.to_string());
        args
    }
}

// ── Classifier thresholds ────────────────────────────────────────────────

/// Cutoffs for the blank-page classifier.
///
/// The defaults were calibrated on generated monthly reports: a page whose
/// only text is the footer boilerplate has well under 20 meaningful
/// characters, while the sparsest real page (a single chart title) has more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierThresholds {
    /// Pages at the start of the document that are never removed. Default: 1.
    pub protected_leading_pages: usize,
    /// Pages at the end of the document that are never removed. Default: 2.
    pub protected_trailing_pages: usize,
    /// XObject entries above which a page is assumed to hold a chart. Default: 1.
    pub chart_xobject_count: usize,
    /// Meaningful characters above which a page always has content. Default: 20.
    pub meaningful_text_chars: usize,
    /// Meaningful characters above which a page with visual resources has
    /// content. Default: 5.
    pub visual_text_chars: usize,
    /// Residual characters above which a page is kept as suspicious. Default: 100.
    pub suspicious_raw_chars: usize,
    /// Meaningful characters below which a kept page without visual
    /// resources is reported as suspicious by `analyze`. Default: 50.
    pub sparse_page_chars: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            protected_leading_pages: 1,
            protected_trailing_pages: 2,
            chart_xobject_count: 1,
            meaningful_text_chars: 20,
            visual_text_chars: 5,
            suspicious_raw_chars: 100,
            sparse_page_chars: 50,
        }
    }
}

impl ClassifierThresholds {
    fn validate(&self) -> Result<(), PipelineError> {
        if self.visual_text_chars > self.meaningful_text_chars {
            return Err(PipelineError::InvalidConfig(format!(
                "visual_text_chars ({}) must not exceed meaningful_text_chars ({})",
                self.visual_text_chars, self.meaningful_text_chars
            )));
        }
        Ok(())
    }
}
