//! HTML markup for reports and the footer overlay, rendered with Tera.
//!
//! Each report's template lives at `<template_dir>/<template_id>/template.html`.
//! Templates that are absent fall back to a built-in layout so a missing file
//! never costs a report. Templates that exist but fail to parse are recorded
//! and surface as a per-report [`RenderError::Template`].
//!
//! Every template receives the same context:
//!
//! | key          | content                                          |
//! |--------------|--------------------------------------------------|
//! | `label`      | report label, e.g. "Relatório 3"                 |
//! | `client_name`, `month_name`, `year`, `period` | run metadata    |
//! | `logo`       | base64 `data:` URI of the logo, or empty         |
//! | `index`      | index flags (index slot only)                    |
//! | `data`       | opaque report figures (numbered slots only)      |
//! | `rows`       | top-level `data` entries as `{key, value}` pairs |
//! | `notes`      | optional consultant notes                        |
//!
//! Filters `format_currency`, `format_percentage` and `format_number` print
//! values the Brazilian way (`R$ 1.234,56`, `12,5%`, `1.234,57`).

use crate::error::RenderError;
use crate::report::{ReportJob, ReportMeta, ReportPayload};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, warn};

const BUILTIN_INDEX: &str = "builtin/index.html";
const BUILTIN_REPORT: &str = "builtin/report.html";
const BUILTIN_FOOTER: &str = "builtin/footer.html";

const INDEX_TEMPLATE: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Índice</title>
<style>
body{font-family:Helvetica,Arial,sans-serif;color:#1d2b36;margin:0}
header{display:flex;align-items:center;gap:8mm;margin-bottom:10mm}
header img{height:18mm}
h1{font-size:22pt;margin:0}
ol{font-size:13pt;line-height:2}
</style></head>
<body>
<header>{% if logo %}<img src="{{ logo | safe }}" alt="logo"/>{% endif %}
<div><h1>{{ index.client_name }}</h1><p>{{ index.period }}</p></div></header>
<h2>Índice</h2>
<ol>
{% if index.cash_flow %}<li>Fluxo de Caixa</li>{% endif %}
{% if index.income_statement %}<li>Demonstração de Resultado</li>{% endif %}
{% if index.indicators %}<li>Indicadores</li>{% endif %}
{% if index.consultant_note %}<li>Nota do Consultor</li>{% endif %}
</ol>
</body></html>
"#;

const REPORT_TEMPLATE: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>{{ label }}</title>
<style>
body{font-family:Helvetica,Arial,sans-serif;color:#1d2b36;margin:0}
h1{font-size:18pt;border-bottom:1px solid #c9d3db;padding-bottom:2mm}
table{width:100%;border-collapse:collapse;font-size:10pt}
th,td{padding:1.5mm 2mm;border-bottom:1px solid #eef1f4;text-align:left}
td{text-align:right}
.notes{margin-top:8mm;white-space:pre-wrap}
</style></head>
<body>
<h1>{{ label }}</h1>
<p>{{ client_name }} · {{ period }}</p>
<table>
{% for row in rows %}<tr><th>{{ row.key }}</th><td>{{ row.value }}</td></tr>
{% endfor %}</table>
{% if notes %}<div class="notes">{{ notes }}</div>{% endif %}
</body></html>
"#;

const FOOTER_TEMPLATE: &str = r#"<!doctype html>
<html><head><meta charset="utf-8">
<style>
html,body{margin:0;padding:0}
.wrap{width:100%;text-align:center}
img{height:{{ height_mm }}mm;width:auto}
</style></head>
<body>
<div class="wrap">{% if image_url %}<img src="{{ image_url | safe }}" alt="rodapé"/>{% endif %}</div>
</body></html>
"#;

/// Compiled templates for one run.
pub struct TemplateSet {
    tera: Tera,
    /// template_id → parse error, for overrides that failed to compile.
    broken: HashMap<String, String>,
}

impl TemplateSet {
    /// Built-in templates only.
    pub fn builtin() -> Self {
        let mut tera = Tera::default();
        for (name, body) in [
            (BUILTIN_INDEX, INDEX_TEMPLATE),
            (BUILTIN_REPORT, REPORT_TEMPLATE),
            (BUILTIN_FOOTER, FOOTER_TEMPLATE),
        ] {
            if let Err(e) = tera.add_raw_template(name, body) {
                // Only reachable if a built-in is edited into invalid syntax.
                warn!("Built-in template {} does not compile: {}", name, e);
            }
        }
        register_filters(&mut tera);
        Self {
            tera,
            broken: HashMap::new(),
        }
    }

    /// Built-ins plus every `<id>/template.html` found under `dir`.
    ///
    /// A missing or unreadable directory is not an error.
    pub fn load(dir: Option<&Path>) -> Self {
        let mut set = Self::builtin();
        let Some(dir) = dir else {
            return set;
        };
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Template directory {} not readable ({}); using built-ins", dir.display(), e);
                return set;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path().join("template.html");
            if !path.is_file() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            let result = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|body| {
                    set.tera
                        .add_raw_template(&template_name(&id), &body)
                        .map_err(|e| error_chain(&e))
                });
            match result {
                Ok(()) => debug!("Loaded template '{}' from {}", id, path.display()),
                Err(e) => {
                    warn!("Template '{}' failed to load: {}", id, e);
                    set.broken.insert(id, e);
                }
            }
        }
        set
    }

    /// True if `template_id` has a loaded override.
    pub fn has_override(&self, template_id: &str) -> bool {
        self.tera
            .get_template_names()
            .any(|n| n == template_name(template_id))
    }

    /// Render the body markup for `job`.
    pub fn render_report(
        &self,
        job: &ReportJob,
        meta: &ReportMeta,
        logo: Option<&str>,
    ) -> Result<String, RenderError> {
        let template_err = |detail: String| RenderError::Template {
            label: job.label.clone(),
            template: job.template_id.clone(),
            detail,
        };

        if let Some(detail) = self.broken.get(&job.template_id) {
            return Err(template_err(detail.clone()));
        }

        let name = if self.has_override(&job.template_id) {
            template_name(&job.template_id)
        } else {
            match job.payload {
                ReportPayload::Index(_) => BUILTIN_INDEX.to_string(),
                ReportPayload::Report(_) => BUILTIN_REPORT.to_string(),
            }
        };

        let mut value = json!({
            "label": job.label,
            "client_name": meta.client_name,
            "month_name": meta.month_name,
            "year": meta.year,
            "period": meta.period(),
            "logo": logo.unwrap_or_default(),
        });
        match &job.payload {
            ReportPayload::Index(index) => {
                value["index"] = json!(index);
            }
            ReportPayload::Report(data) => {
                value["data"] = data.sections.clone();
                value["rows"] = Value::Array(rows(&data.sections));
                value["notes"] = json!(data.notes);
            }
        }

        let context = Context::from_value(value).map_err(|e| template_err(error_chain(&e)))?;
        self.tera
            .render(&name, &context)
            .map_err(|e| template_err(error_chain(&e)))
    }

    /// Footer overlay referencing `image_url`; empty footer when `None`.
    pub fn render_footer(&self, image_url: Option<&str>, height_mm: u32) -> Result<String, String> {
        let mut context = Context::new();
        context.insert("image_url", &image_url.unwrap_or_default());
        context.insert("height_mm", &height_mm);
        self.tera
            .render(BUILTIN_FOOTER, &context)
            .map_err(|e| error_chain(&e))
    }
}

fn template_name(id: &str) -> String {
    format!("{id}/template.html")
}

// Tera hides the useful message in the source chain.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    msg
}

/// Flatten top-level entries of a report body into printable rows.
fn rows(sections: &Value) -> Vec<Value> {
    let text = |v: &Value| match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    match sections {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": text(v) }))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| json!({ "key": (i + 1).to_string(), "value": text(v) }))
            .collect(),
        Value::Null => Vec::new(),
        other => vec![json!({ "key": "", "value": text(other) })],
    }
}

// ── Filters ──────────────────────────────────────────────────────────────

fn register_filters(tera: &mut Tera) {
    tera.register_filter("format_currency", format_currency_filter);
    tera.register_filter("format_percentage", format_percentage_filter);
    tera.register_filter("format_number", format_number_filter);
}

fn numeric(value: &Value, filter: &str) -> tera::Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| tera::Error::msg(format!("{filter}: '{s}' is not a number"))),
        other => Err(tera::Error::msg(format!("{filter}: {other} is not a number"))),
    }
}

fn format_currency_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let v = numeric(value, "format_currency")?.unwrap_or(0.0);
    Ok(Value::String(format_currency(v)))
}

fn format_percentage_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let v = numeric(value, "format_percentage")?.unwrap_or(0.0);
    Ok(Value::String(format_percentage(v)))
}

fn format_number_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let decimals = match args.get("decimals") {
        Some(d) => d
            .as_u64()
            .ok_or_else(|| tera::Error::msg("format_number: `decimals` must be a non-negative integer"))?
            as usize,
        None => 2,
    };
    match numeric(value, "format_number")? {
        Some(v) => Ok(Value::String(format_number(v, decimals))),
        None => Ok(Value::String("0".to_string())),
    }
}

/// `R$ 1.234,56`; negatives as `R$ -1.234,56`.
pub fn format_currency(value: f64) -> String {
    format!("R$ {}", format_number(value, 2))
}

/// `12,5%`.
pub fn format_percentage(value: f64) -> String {
    format!("{}%", format_number(value, 1))
}

/// Dot thousands separator, comma decimal separator.
pub fn format_number(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut out = String::with_capacity(formatted.len() + int_part.len() / 3 + 1);
    if value < 0.0 && formatted.bytes().any(|b| (b'1'..=b'9').contains(&b)) {
        out.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push(',');
        out.push_str(frac);
    }
    out
}
