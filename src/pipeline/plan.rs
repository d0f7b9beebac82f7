//! Composition order of the final document.
//!
//! The plan is built only after every render has finished, from the outcomes
//! sorted by canonical key, so the page order never depends on which report
//! finished first.

use crate::output::RenderOutcome;
use crate::report::ReportKind;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

/// Where a source document sits and how the combiner treats its pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "role", content = "kind", rename_all = "snake_case")]
pub enum SourceRole {
    /// Pre-made cover, copied verbatim.
    Cover,
    /// Generated index or report, subject to the content filter.
    Report(ReportKind),
    /// Pre-made marketing insert, copied verbatim.
    Marketing,
}

impl SourceRole {
    /// Verbatim sources bypass the combiner's content filter.
    pub fn is_verbatim(self) -> bool {
        !matches!(self, SourceRole::Report(_))
    }
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRole::Cover => f.write_str("cover"),
            SourceRole::Report(kind) => write!(f, "{kind}"),
            SourceRole::Marketing => f.write_str("marketing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub role: SourceRole,
    pub label: String,
    pub path: PathBuf,
}

/// `[cover?, index?, reports by canonical key..., marketing...]`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssemblyPlan {
    entries: Vec<PlanEntry>,
}

impl AssemblyPlan {
    /// Build the plan from all render outcomes. Failures are logged and left
    /// out; the remaining successes keep their relative canonical order.
    pub fn build(
        cover: Option<PathBuf>,
        outcomes: &[RenderOutcome],
        marketing: &[PathBuf],
    ) -> Self {
        let mut successes: Vec<(&RenderOutcome, &PathBuf)> = Vec::new();
        for outcome in outcomes {
            match &outcome.result {
                Ok(path) => successes.push((outcome, path)),
                Err(e) => warn!("Excluding {}: {}", outcome.job.label, e),
            }
        }
        successes.sort_by_key(|(o, _)| o.job.canonical_key());

        let mut entries = Vec::with_capacity(successes.len() + marketing.len() + 1);
        if let Some(path) = cover {
            entries.push(PlanEntry {
                role: SourceRole::Cover,
                label: "Capa".to_string(),
                path,
            });
        }
        entries.extend(successes.into_iter().map(|(o, path)| PlanEntry {
            role: SourceRole::Report(o.job.kind),
            label: o.job.label.clone(),
            path: path.clone(),
        }));
        entries.extend(marketing.iter().enumerate().map(|(i, path)| PlanEntry {
            role: SourceRole::Marketing,
            label: format!("Marketing {}", i + 1),
            path: path.clone(),
        }));
        Self { entries }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reports included, in document order.
    pub fn reports(&self) -> Vec<ReportKind> {
        self.entries
            .iter()
            .filter_map(|e| match e.role {
                SourceRole::Report(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }
}
