//! Blank-page classifier.
//!
//! Generated reports sometimes end with a page that holds nothing but the
//! footer overlay. This pass finds such pages without touching pages that
//! merely look sparse (a chart with a one-word caption, a short closing note).
//!
//! Each page is judged on its own by [`decide`], a pure function of the page's
//! [`Page`] record and the configured [`ClassifierThresholds`]. The rules are
//! terminal and applied in order:
//!
//! 1. first page and last two pages are protected;
//! 2. an image XObject, or more XObjects than a chart needs, means content;
//! 3. text is stripped of footer boilerplate, punctuation is blanked and
//!    whitespace collapsed, leaving the *meaningful* length;
//! 4. meaningful length above `meaningful_text_chars` means content;
//! 5. other drawing resources plus meaningful length above
//!    `visual_text_chars` means content;
//! 6. more than `suspicious_raw_chars` left after boilerplate removal, with
//!    any meaningful text, is kept as suspicious;
//! 7. anything else is truly empty.
//!
//! A page whose text cannot be extracted is always kept.

use crate::config::ClassifierThresholds;
use crate::error::ClassifyError;
use crate::pipeline::pdf::{self, PageResources};
use lopdf::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Footer and contact boilerplate that never counts as content.
static RE_BOILERPLATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"ize\.com\.br",
        r"@ize_",
        r"\d{2}/\d{2}/\d{4}",
        r"página\s+\d+",
        r"relatório\s+mensal",
        r"www\.",
        r"contato@",
        r"instagram\.com",
        r"facebook\.com",
        r"linkedin\.com",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
    .collect()
});

static RE_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// ── Page model ───────────────────────────────────────────────────────────

/// Everything the classifier knows about one page.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based page number.
    pub number: usize,
    /// Extracted text; `None` when extraction failed.
    pub text: Option<String>,
    pub resources: PageResources,
    pub protected: bool,
}

impl Page {
    pub fn new(
        number: usize,
        total: usize,
        text: Option<String>,
        resources: PageResources,
        t: &ClassifierThresholds,
    ) -> Self {
        Self {
            number,
            text,
            resources,
            protected: is_protected(number, total, t),
        }
    }
}

/// Text measurements behind a verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageEvidence {
    /// Characters of trimmed extracted text.
    pub raw_chars: usize,
    /// Characters left after boilerplate removal, before punctuation is blanked.
    pub residual_chars: usize,
    /// Characters after punctuation removal and whitespace collapse.
    pub meaningful_chars: usize,
    /// Boilerplate fragments that were stripped.
    pub boilerplate: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    HasContent,
    TrulyEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Protected,
    Images,
    MeaningfulText,
    VisualWithText,
    Suspicious,
    InspectionFailed,
    FooterOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageClassification {
    pub page: usize,
    pub verdict: Verdict,
    pub reason: Reason,
    /// `None` when the page text could not be extracted.
    pub evidence: Option<PageEvidence>,
}

impl PageClassification {
    pub fn is_empty(&self) -> bool {
        self.verdict == Verdict::TrulyEmpty
    }
}

fn is_protected(number: usize, total: usize, t: &ClassifierThresholds) -> bool {
    number <= t.protected_leading_pages || number + t.protected_trailing_pages > total
}

/// Strip boilerplate and measure what is left.
pub fn normalize(text: &str) -> PageEvidence {
    let raw = text.trim();
    let mut residual = raw.to_string();
    let mut boilerplate = Vec::new();
    for re in RE_BOILERPLATE.iter() {
        boilerplate.extend(re.find_iter(&residual).map(|m| m.as_str().to_string()));
        residual = re.replace_all(&residual, "").into_owned();
    }
    let residual = residual.trim();
    let blanked = RE_PUNCTUATION.replace_all(residual, " ");
    let meaningful = RE_WHITESPACE.replace_all(&blanked, " ");

    PageEvidence {
        raw_chars: raw.chars().count(),
        residual_chars: residual.chars().count(),
        meaningful_chars: meaningful.trim().chars().count(),
        boilerplate,
    }
}

/// Classify one page.
pub fn decide(page: &Page, t: &ClassifierThresholds) -> PageClassification {
    let evidence = page.text.as_deref().map(normalize);
    let verdict = |verdict, reason| PageClassification {
        page: page.number,
        verdict,
        reason,
        evidence: evidence.clone(),
    };

    if page.protected {
        return verdict(Verdict::HasContent, Reason::Protected);
    }
    let res = &page.resources;
    if res.image_count > 0 || res.xobject_count > t.chart_xobject_count {
        return verdict(Verdict::HasContent, Reason::Images);
    }
    let Some(ev) = evidence.as_ref() else {
        return verdict(Verdict::HasContent, Reason::InspectionFailed);
    };
    if ev.meaningful_chars > t.meaningful_text_chars {
        return verdict(Verdict::HasContent, Reason::MeaningfulText);
    }
    if res.has_visual() && ev.meaningful_chars > t.visual_text_chars {
        return verdict(Verdict::HasContent, Reason::VisualWithText);
    }
    if ev.residual_chars > t.suspicious_raw_chars && ev.meaningful_chars > 0 {
        return verdict(Verdict::HasContent, Reason::Suspicious);
    }
    verdict(Verdict::TrulyEmpty, Reason::FooterOnly)
}

/// Build the [`Page`] records of a document.
pub fn inspect_pages(doc: &Document, t: &ClassifierThresholds) -> Vec<Page> {
    let pages = doc.get_pages();
    let total = pages.len();
    pages
        .iter()
        .map(|(&page_no, &page_id)| {
            let text = match pdf::page_text(doc, page_no) {
                Ok(text) => Some(text),
                Err(detail) => {
                    let err = ClassifyError::Page {
                        page: page_no as usize,
                        detail,
                    };
                    warn!("{}; keeping the page", err);
                    None
                }
            };
            let resources = PageResources::inspect(doc, page_id);
            Page::new(page_no as usize, total, text, resources, t)
        })
        .collect()
}

// ── Document-level operations ────────────────────────────────────────────

/// Per-page verdicts and the pages to remove.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyReport {
    pub total_pages: usize,
    /// 1-based, ascending.
    pub removed: Vec<usize>,
    pub pages: Vec<PageClassification>,
}

impl ClassifyReport {
    pub fn kept(&self) -> usize {
        self.total_pages - self.removed.len()
    }
}

/// Classify every page. Fails if no page would survive.
pub fn classify(doc: &Document, t: &ClassifierThresholds) -> Result<ClassifyReport, ClassifyError> {
    let pages: Vec<PageClassification> = inspect_pages(doc, t)
        .iter()
        .map(|p| decide(p, t))
        .collect();
    let removed: Vec<usize> = pages.iter().filter(|c| c.is_empty()).map(|c| c.page).collect();

    for c in pages.iter().filter(|c| c.is_empty()) {
        if let Some(ev) = &c.evidence {
            debug!(
                "Page {}: empty ({} chars, {} meaningful, boilerplate {:?})",
                c.page, ev.raw_chars, ev.meaningful_chars, ev.boilerplate
            );
        }
    }

    let total = pages.len();
    if removed.len() == total {
        return Err(ClassifyError::WouldBeEmpty { total });
    }
    Ok(ClassifyReport {
        total_pages: total,
        removed,
        pages,
    })
}

/// Delete `removed` (1-based) from `doc` and drop objects only they used.
pub fn remove_pages(doc: &mut Document, removed: &[usize]) {
    if removed.is_empty() {
        return;
    }
    let numbers: Vec<u32> = removed.iter().map(|&n| n as u32).collect();
    doc.delete_pages(&numbers);
    doc.prune_objects();
    doc.renumber_objects();
    doc.compress();
    info!("Removed {} empty pages: {:?}", removed.len(), removed);
}

/// Page counts by category, without modifying anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageStats {
    pub total_pages: usize,
    /// Pages the classifier would remove.
    pub empty_pages: Vec<usize>,
    /// Kept pages with little meaningful text and no drawing resources.
    pub suspicious_pages: Vec<usize>,
    pub good_pages: Vec<usize>,
    /// Pages whose text could not be extracted.
    pub error_pages: Vec<usize>,
}

impl PageStats {
    pub fn has_empty_pages(&self) -> bool {
        !self.empty_pages.is_empty()
    }
}

/// Categorise every page of `doc`.
pub fn analyze(doc: &Document, t: &ClassifierThresholds) -> PageStats {
    let mut stats = PageStats::default();
    for page in inspect_pages(doc, t) {
        stats.total_pages += 1;
        let c = decide(&page, t);
        match &c.evidence {
            None => stats.error_pages.push(c.page),
            Some(_) if c.is_empty() => stats.empty_pages.push(c.page),
            Some(ev) if ev.meaningful_chars < t.sparse_page_chars && !page.resources.has_visual() => {
                stats.suspicious_pages.push(c.page)
            }
            Some(_) => stats.good_pages.push(c.page),
        }
    }
    stats
}

/// [`analyze`] a file on disk.
pub fn analyze_file(path: &Path, t: &ClassifierThresholds) -> Result<PageStats, ClassifyError> {
    let doc = pdf::load(path).map_err(|e| ClassifyError::Unreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(analyze(&doc, t))
}
