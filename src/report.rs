//! Report jobs: what gets rendered, and where it lands in the final document.
//!
//! Every report occupies a fixed slot identified by its [`ReportKind`]. The
//! slot's canonical key decides its position in the assembled PDF regardless
//! of request order or render completion order: the index always comes first,
//! then the numbered reports in ascending id.
//!
//! Payloads are opaque to this crate (the financial figures are computed
//! upstream) but their *shape* is a tagged union, so an index slot can never
//! be fed a report body by accident.

use crate::error::PipelineError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one report slot in the canonical document order.
///
/// Serialised as its canonical key: `0` is the index, `1..=8` the numbered
/// reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ReportKind {
    /// Table of contents; always the first generated document.
    Index,
    /// Numbered report, `1..=MAX_REPORT_ID`. Prefer [`ReportKind::report`];
    /// jobs carrying any other id are rejected by [`ReportJob::validate`].
    Report(u8),
}

impl ReportKind {
    /// Highest numbered report the pipeline knows about.
    pub const MAX_REPORT_ID: u8 = 8;

    /// Build a numbered report kind, rejecting ids outside `1..=8`.
    pub fn report(id: u8) -> Option<Self> {
        (1..=Self::MAX_REPORT_ID)
            .contains(&id)
            .then_some(ReportKind::Report(id))
    }

    /// The fixed enumeration every run walks: index, then reports 1–8.
    pub fn canonical_order() -> Vec<ReportKind> {
        std::iter::once(ReportKind::Index)
            .chain((1..=Self::MAX_REPORT_ID).map(ReportKind::Report))
            .collect()
    }

    /// Ordinal position in the final document.
    pub fn canonical_key(self) -> u8 {
        match self {
            ReportKind::Index => 0,
            ReportKind::Report(id) => id,
        }
    }

    /// Human-facing label used in logs and in the caller's failure list.
    pub fn default_label(self) -> String {
        match self {
            ReportKind::Index => "Índice".to_string(),
            ReportKind::Report(id) => format!("Relatório {id}"),
        }
    }

    /// Template directory name under the configured template root.
    pub fn default_template_id(self) -> String {
        match self {
            ReportKind::Index => "indice".to_string(),
            ReportKind::Report(id) => format!("relatorio{id}"),
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.default_label())
    }
}

impl From<ReportKind> for u8 {
    fn from(kind: ReportKind) -> u8 {
        kind.canonical_key()
    }
}

impl TryFrom<u8> for ReportKind {
    type Error = String;

    fn try_from(key: u8) -> Result<Self, Self::Error> {
        match key {
            0 => Ok(ReportKind::Index),
            id => ReportKind::report(id).ok_or_else(|| {
                format!(
                    "report id must be 0 (index) or 1–{}, got {id}",
                    ReportKind::MAX_REPORT_ID
                )
            }),
        }
    }
}

/// Client and period the document is generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub client_name: String,
    /// Month name as printed on the cover and index, e.g. "Setembro".
    pub month_name: String,
    pub year: i32,
}

impl ReportMeta {
    pub fn new(client_name: impl Into<String>, month_name: impl Into<String>, year: i32) -> Self {
        Self {
            client_name: client_name.into(),
            month_name: month_name.into(),
            year,
        }
    }

    /// "Setembro 2025".
    pub fn period(&self) -> String {
        format!("{} {}", self.month_name, self.year)
    }

    /// Default output file name: `Relatorio_<client>_<month>_<year>.pdf`.
    pub fn default_file_name(&self) -> String {
        format!(
            "Relatorio_{}_{}_{}.pdf",
            slugify(&self.client_name),
            slugify(&self.month_name),
            self.year
        )
    }
}

/// Structured data for one report, tagged by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportPayload {
    /// Data for the index page.
    Index(IndexData),
    /// Data for a numbered report.
    Report(ReportData),
}

impl ReportPayload {
    fn shape(&self) -> &'static str {
        match self {
            ReportPayload::Index(_) => "index",
            ReportPayload::Report(_) => "report",
        }
    }
}

/// Body of a numbered report as produced by the upstream indicator queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    /// Opaque report figures, handed to the template as `data`.
    pub sections: serde_json::Value,
    /// Free-form consultant notes rendered under the report, if any.
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReportData {
    pub fn new(sections: serde_json::Value) -> Self {
        Self {
            sections,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    fn is_empty(&self) -> bool {
        match &self.sections {
            serde_json::Value::Null => true,
            serde_json::Value::Array(a) => a.is_empty(),
            serde_json::Value::Object(o) => o.is_empty(),
            serde_json::Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// Flags and labels printed on the index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexData {
    /// Any of reports 1–5 requested.
    pub cash_flow: bool,
    /// Report 6 requested.
    pub income_statement: bool,
    /// Report 7 requested.
    pub indicators: bool,
    /// Report 8 requested.
    pub consultant_note: bool,
    pub client_name: String,
    pub period: String,
    #[serde(default)]
    pub brand: Option<String>,
}

impl IndexData {
    /// Derive the index sections from the requested report ids.
    pub fn for_selection(requested: &[u8], meta: &ReportMeta) -> Self {
        let has = |id: u8| requested.contains(&id);
        Self {
            cash_flow: (1..=5).any(has),
            income_statement: has(6),
            indicators: has(7),
            consultant_note: has(8),
            client_name: meta.client_name.clone(),
            period: meta.period(),
            brand: None,
        }
    }
}

/// One report to render. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportJob {
    pub kind: ReportKind,
    pub label: String,
    pub template_id: String,
    pub payload: ReportPayload,
}

impl ReportJob {
    /// Create a job with the kind's default label and template.
    pub fn new(kind: ReportKind, payload: ReportPayload) -> Self {
        Self {
            kind,
            label: kind.default_label(),
            template_id: kind.default_template_id(),
            payload,
        }
    }

    /// Index job for the given selection.
    pub fn index(requested: &[u8], meta: &ReportMeta) -> Self {
        Self::new(
            ReportKind::Index,
            ReportPayload::Index(IndexData::for_selection(requested, meta)),
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = template_id.into();
        self
    }

    pub fn canonical_key(&self) -> u8 {
        self.kind.canonical_key()
    }

    /// Check that the payload shape fits the slot and carries data.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.kind, &self.payload) {
            (ReportKind::Report(id), _) if ReportKind::report(*id).is_none() => Err(format!(
                "report id {id} is outside 1–{}",
                ReportKind::MAX_REPORT_ID
            )),
            (ReportKind::Index, ReportPayload::Index(_)) => Ok(()),
            (ReportKind::Report(_), ReportPayload::Report(data)) if data.is_empty() => {
                Err("report payload has no data".to_string())
            }
            (ReportKind::Report(_), ReportPayload::Report(_)) => Ok(()),
            (kind, payload) => Err(format!(
                "slot '{}' received a {} payload",
                kind.default_template_id(),
                payload.shape()
            )),
        }
    }
}

/// Restrict `jobs` to the `requested` report ids and make sure an index job
/// describes exactly the reports that remain.
///
/// Without a selection every report is kept and an existing index is left as
/// supplied. With one, any supplied index is rebuilt from the remaining
/// report ids, keeping its label, template and brand.
pub fn select_jobs(jobs: Vec<ReportJob>, requested: Option<&[u8]>, meta: &ReportMeta) -> Vec<ReportJob> {
    let (indexes, mut reports): (Vec<ReportJob>, Vec<ReportJob>) =
        jobs.into_iter().partition(|j| j.kind == ReportKind::Index);
    if let Some(ids) = requested {
        reports.retain(|j| match j.kind {
            ReportKind::Report(id) => ids.contains(&id),
            ReportKind::Index => false,
        });
    }
    let kept: Vec<u8> = reports.iter().map(|j| j.canonical_key()).collect();

    let index = match (indexes.into_iter().next(), requested) {
        (Some(existing), None) => existing,
        (Some(existing), Some(_)) => {
            let brand = match &existing.payload {
                ReportPayload::Index(data) => data.brand.clone(),
                ReportPayload::Report(_) => None,
            };
            let mut data = IndexData::for_selection(&kept, meta);
            data.brand = brand;
            ReportJob::new(ReportKind::Index, ReportPayload::Index(data))
                .with_label(existing.label)
                .with_template(existing.template_id)
        }
        (None, _) => ReportJob::index(&kept, meta),
    };

    std::iter::once(index).chain(reports).collect()
}

static RE_REPORT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static RE_SELECTION_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;]+").unwrap());

/// Parse a requested-report list such as `"7,8"`, `"1 3 5"` or
/// `"Relatório 7, Relatório 8"` into unique ids, preserving first-seen order.
pub fn parse_report_ids(input: &str) -> Result<Vec<u8>, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidReportSelection {
        input: input.to_string(),
        reason,
    };

    let mut ids: Vec<u8> = Vec::new();
    for token in RE_SELECTION_SPLIT
        .split(input)
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        let numbers: Vec<&str> = RE_REPORT_ID.find_iter(token).map(|m| m.as_str()).collect();
        if numbers.is_empty() {
            return Err(invalid(format!("'{token}' does not name a report")));
        }
        // "1 3 5" arrives as one token with several numbers.
        for n in numbers {
            let id: u8 = n
                .parse()
                .ok()
                .filter(|id| ReportKind::report(*id).is_some())
                .ok_or_else(|| {
                    invalid(format!(
                        "report ids must be between 1 and {}, got {n}",
                        ReportKind::MAX_REPORT_ID
                    ))
                })?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    if ids.is_empty() {
        return Err(invalid("select at least one report".to_string()));
    }
    Ok(ids)
}

/// Reduce a display name to something safe for a file name.
fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_alphanumeric() || c == '-' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> ReportMeta {
        ReportMeta::new("Cliente 235", "Setembro", 2025)
    }

    #[test]
    fn canonical_order_is_index_then_ascending_reports() {
        let order = ReportKind::canonical_order();
        assert_eq!(order.len(), 9);
        assert_eq!(order[0], ReportKind::Index);
        let keys: Vec<u8> = order.iter().map(|k| k.canonical_key()).collect();
        assert_eq!(keys, vec![0, 1, 2, 3, 4, 5, 6, 7, 8]);
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, order, "derived Ord must agree with canonical keys");
    }

    #[test]
    fn report_kind_rejects_out_of_range_ids() {
        assert_eq!(ReportKind::report(3), Some(ReportKind::Report(3)));
        assert_eq!(ReportKind::report(0), None);
        assert_eq!(ReportKind::report(9), None);
        assert!(ReportKind::try_from(12u8).is_err());
        assert_eq!(ReportKind::try_from(0u8), Ok(ReportKind::Index));
    }

    #[test]
    fn report_kind_serialises_as_canonical_key() {
        assert_eq!(serde_json::to_string(&ReportKind::Report(5)).unwrap(), "5");
        let kind: ReportKind = serde_json::from_str("0").unwrap();
        assert_eq!(kind, ReportKind::Index);
    }

    #[test]
    fn defaults_follow_the_slot() {
        let job = ReportJob::new(
            ReportKind::Report(7),
            ReportPayload::Report(ReportData::new(json!({"ebitda": 1}))),
        );
        assert_eq!(job.label, "Relatório 7");
        assert_eq!(job.template_id, "relatorio7");
        assert_eq!(job.canonical_key(), 7);
        assert!(job.validate().is_ok());
    }

    #[test]
    fn validate_rejects_mismatched_shapes() {
        let wrong = ReportJob::new(
            ReportKind::Index,
            ReportPayload::Report(ReportData::new(json!([1]))),
        );
        let err = wrong.validate().unwrap_err();
        assert_eq!(err, "slot 'indice' received a report payload");

        let empty = ReportJob::new(
            ReportKind::Report(1),
            ReportPayload::Report(ReportData::new(json!([]))),
        );
        assert!(empty.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_ids() {
        for id in [0, 9] {
            let job = ReportJob::new(
                ReportKind::Report(id),
                ReportPayload::Report(ReportData::new(json!({"x": 1}))),
            );
            let err = job.validate().unwrap_err();
            assert!(err.contains(&format!("report id {id}")), "got: {err}");
        }
    }

    #[test]
    fn index_flags_follow_selection() {
        let index = IndexData::for_selection(&[3, 8], &meta());
        assert!(index.cash_flow);
        assert!(!index.income_statement);
        assert!(!index.indicators);
        assert!(index.consultant_note);
        assert_eq!(index.period, "Setembro 2025");

        let only_dre = IndexData::for_selection(&[6], &meta());
        assert!(!only_dre.cash_flow);
        assert!(only_dre.income_statement);
    }

    fn report_job(id: u8) -> ReportJob {
        ReportJob::new(
            ReportKind::Report(id),
            ReportPayload::Report(ReportData::new(json!({"receita": id}))),
        )
    }

    fn index_of(jobs: &[ReportJob]) -> &IndexData {
        match &jobs[0].payload {
            ReportPayload::Index(data) => data,
            other => panic!("expected an index first, got {other:?}"),
        }
    }

    #[test]
    fn selection_rebuilds_a_supplied_index() {
        let mut full = IndexData::for_selection(&[1, 6, 7, 8], &meta());
        full.brand = Some("IZE".to_string());
        let supplied = ReportJob::new(ReportKind::Index, ReportPayload::Index(full))
            .with_label("Sumário");
        let jobs = vec![report_job(1), supplied, report_job(6), report_job(7), report_job(8)];

        let jobs = select_jobs(jobs, Some(&[8]), &meta());

        let kinds: Vec<ReportKind> = jobs.iter().map(|j| j.kind).collect();
        assert_eq!(kinds, vec![ReportKind::Index, ReportKind::Report(8)]);
        assert_eq!(jobs[0].label, "Sumário");
        let index = index_of(&jobs);
        assert!(index.consultant_note);
        assert!(!index.cash_flow);
        assert!(!index.income_statement);
        assert!(!index.indicators);
        assert_eq!(index.brand.as_deref(), Some("IZE"));
    }

    #[test]
    fn missing_index_is_added_for_the_kept_reports() {
        let jobs = select_jobs(vec![report_job(6), report_job(2)], None, &meta());
        assert_eq!(jobs.len(), 3);
        let index = index_of(&jobs);
        assert!(index.cash_flow);
        assert!(index.income_statement);
        assert!(!index.indicators);
    }

    #[test]
    fn supplied_index_is_untouched_without_a_selection() {
        let supplied = ReportJob::index(&[1, 2, 3], &meta());
        let jobs = select_jobs(vec![supplied.clone(), report_job(7)], None, &meta());
        assert_eq!(jobs[0], supplied);
    }

    #[test]
    fn parse_report_ids_accepts_mixed_forms() {
        assert_eq!(parse_report_ids("7,8").unwrap(), vec![7, 8]);
        assert_eq!(
            parse_report_ids("Relatório 7, Relatorio 8, 3").unwrap(),
            vec![7, 8, 3]
        );
        assert_eq!(parse_report_ids("1 3 5").unwrap(), vec![1, 3, 5]);
        assert_eq!(parse_report_ids("2,2,1,2").unwrap(), vec![2, 1]);
    }

    #[test]
    fn parse_report_ids_rejects_bad_input() {
        assert!(parse_report_ids("").is_err());
        assert!(parse_report_ids("9").is_err());
        assert!(parse_report_ids("0").is_err());
        assert!(parse_report_ids("Relatório").is_err());
    }

    #[test]
    fn default_file_name_is_slugged() {
        assert_eq!(
            meta().default_file_name(),
            "Relatorio_Cliente_235_Setembro_2025.pdf"
        );
        let odd = ReportMeta::new("  Acme / Filial #2 ", "Março", 2024);
        assert_eq!(odd.default_file_name(), "Relatorio_Acme_Filial_2_Março_2024.pdf");
    }
}
