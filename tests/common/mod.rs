//! Shared helpers for integration tests: in-memory PDFs and a scripted
//! converter that needs no external binary.

#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use report_assembler::{
    AssemblyConfig, ConversionRequest, HtmlConverter, RenderError, ReportData, ReportJob,
    ReportKind, ReportMeta, ReportPayload,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Text of a page that carries nothing but the footer overlay.
pub const FOOTER_ONLY: [&str; 3] = [
    "www.ize.com.br | contato@ize.com.br | instagram.com | facebook.com | linkedin.com",
    "30/09/2025 - www.ize.com.br - @ize_",
    "Setembro",
];

// ── PDF helpers ──────────────────────────────────────────────────────────────

/// One page per entry; an empty entry is a page with no content at all.
pub fn pdf_bytes(pages: &[Vec<String>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut ops = Vec::new();
        if !lines.is_empty() {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new("Tf", vec!["F1".into(), 11.into()]));
            ops.push(Operation::new("Td", vec![40.into(), 800.into()]));
            for line in lines {
                ops.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
                ops.push(Operation::new("Td", vec![0.into(), (-14).into()]));
            }
            ops.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations: ops };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if !lines.is_empty() {
            page.set("Resources", dictionary! { "Font" => dictionary! { "F1" => font_id } });
        }
        kids.push(doc.add_object(page).into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Default page text for a label; long enough to count as content.
pub fn body_text(label: &str) -> String {
    format!("{label} conteudo do relatorio financeiro")
}

/// `text` as [`page_texts`] reports it.
pub fn squashed(text: &str) -> String {
    text.split_whitespace().collect()
}

pub fn text_page(text: &str) -> Vec<String> {
    vec![text.to_string()]
}

pub fn footer_page() -> Vec<String> {
    FOOTER_ONLY.iter().map(|l| l.to_string()).collect()
}

pub fn blank_page() -> Vec<String> {
    Vec::new()
}

pub fn write_pdf(path: &Path, pages: &[Vec<String>]) -> PathBuf {
    std::fs::write(path, pdf_bytes(pages)).unwrap();
    path.to_path_buf()
}

/// Text of every page of the PDF at `path`, whitespace removed.
pub fn page_texts(path: &Path) -> Vec<String> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .keys()
        .map(|&n| {
            doc.extract_text(&[n])
                .unwrap_or_default()
                .split_whitespace()
                .collect::<String>()
        })
        .collect()
}

// ── Fake converter ───────────────────────────────────────────────────────────

/// What the fake converter does for one label.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Write a PDF with these pages.
    Pages(Vec<Vec<String>>),
    /// Exit "non-zero".
    Fail,
    /// Behave like a missing binary.
    Unavailable,
    /// Never finish on its own.
    Hang,
}

/// Scripted [`HtmlConverter`]. Labels without a script get one page of
/// [`body_text`].
#[derive(Default)]
pub struct FakeConverter {
    scripts: HashMap<String, Behaviour>,
    delays: HashMap<String, Duration>,
    pub calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, label: &str, behaviour: Behaviour) -> Self {
        self.scripts.insert(label.to_string(), behaviour);
        self
    }

    pub fn delay(mut self, label: &str, ms: u64) -> Self {
        self.delays.insert(label.to_string(), Duration::from_millis(ms));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HtmlConverter for FakeConverter {
    fn name(&self) -> &str {
        "fake"
    }

    async fn convert(&self, req: &ConversionRequest) -> Result<(), RenderError> {
        self.calls.lock().unwrap().push(req.label.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&req.label) {
            tokio::time::sleep(*delay).await;
        }
        let behaviour = self
            .scripts
            .get(&req.label)
            .cloned()
            .unwrap_or_else(|| Behaviour::Pages(vec![text_page(&body_text(&req.label))]));

        let result = match behaviour {
            Behaviour::Pages(pages) => {
                std::fs::write(&req.output_path, pdf_bytes(&pages)).unwrap();
                Ok(())
            }
            Behaviour::Fail => Err(RenderError::ConversionFailed {
                label: req.label.clone(),
                status: "exit status: 1".to_string(),
                stderr: "Exit with code 1 due to network error".to_string(),
            }),
            Behaviour::Unavailable => Err(RenderError::ConverterUnavailable {
                label: req.label.clone(),
                command: "wkhtmltopdf".to_string(),
                detail: "No such file or directory (os error 2)".to_string(),
            }),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ── Jobs and config ──────────────────────────────────────────────────────────

pub fn meta() -> ReportMeta {
    ReportMeta::new("ACME Ltda", "Setembro", 2025)
}

/// Report job labelled `R<id>` so page text identifies its source.
pub fn report(id: u8) -> ReportJob {
    ReportJob::new(
        ReportKind::Report(id),
        ReportPayload::Report(ReportData::new(serde_json::json!({ "receita": 1000.0 * id as f64 }))),
    )
    .with_label(format!("R{id}"))
}

/// Index job labelled `Indice`.
pub fn index(ids: &[u8]) -> ReportJob {
    ReportJob::index(ids, &meta()).with_label("Indice")
}

pub fn config(converter: Arc<FakeConverter>) -> AssemblyConfig {
    AssemblyConfig::builder()
        .converter(converter)
        .builtin_templates()
        .build()
        .unwrap()
}
