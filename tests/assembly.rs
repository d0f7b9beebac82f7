//! Integration tests for the assembly pipeline.
//!
//! Every test drives the real pipeline (templates, temp registry, lopdf
//! combiner, blank-page finalizer) with a scripted converter, so no
//! external binary is needed.

mod common;

use common::*;
use report_assembler::{
    assemble, assemble_with_cancel, finalize_file, inspect, AssemblyConfig,
    AssemblyProgressCallback, AssemblyRequest, AssemblyStage, ClassifierThresholds,
    FinalizeStatus, PipelineError, RenderError, ReportKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn request(dir: &std::path::Path) -> AssemblyRequest {
    AssemblyRequest::new(meta(), dir.join("out").join("relatorio.pdf"))
}

// ── Ordering ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pages_follow_canonical_order_not_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let cover = write_pdf(&dir.path().join("capa.pdf"), &[text_page("Capa ACME")]);
    let marketing = write_pdf(&dir.path().join("m1.pdf"), &[text_page("Marketing um")]);

    // R5 finishes first, R1 last.
    let fake = FakeConverter::new()
        .delay("R1", 150)
        .delay("R3", 100)
        .delay("Indice", 50)
        .shared();
    let req = request(dir.path())
        .job(report(5))
        .job(report(1))
        .job(index(&[1, 3, 5]))
        .job(report(3))
        .cover(&cover)
        .marketing(&marketing);

    let output = assemble(req, &config(fake.clone())).await.unwrap();

    assert_eq!(
        output.succeeded,
        vec![
            ReportKind::Index,
            ReportKind::Report(1),
            ReportKind::Report(3),
            ReportKind::Report(5)
        ]
    );
    assert!(output.failed.is_empty());
    assert_eq!(
        page_texts(&output.output_path),
        vec![
            squashed("Capa ACME"),
            squashed(&body_text("Indice")),
            squashed(&body_text("R1")),
            squashed(&body_text("R3")),
            squashed(&body_text("R5")),
            squashed("Marketing um")
        ]
    );
    assert_eq!(output.finalize, FinalizeStatus::AlreadyClean);
    assert_eq!(output.stats.final_pages, 6);
    assert_eq!(fake.calls().len(), 4);
}

#[tokio::test]
async fn failed_report_is_excluded_and_listed() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeConverter::new().script("R2", Behaviour::Fail).shared();
    let req = request(dir.path())
        .job(index(&[1, 2, 3]))
        .job(report(1))
        .job(report(2))
        .job(report(3));

    let output = assemble(req, &config(fake)).await.unwrap();

    assert_eq!(output.failed_kinds(), vec![ReportKind::Report(2)]);
    assert!(matches!(
        output.failed[0].error,
        RenderError::ConversionFailed { .. }
    ));
    assert_eq!(
        output.succeeded,
        vec![ReportKind::Index, ReportKind::Report(1), ReportKind::Report(3)]
    );
    assert_eq!(
        page_texts(&output.output_path),
        vec![
            squashed(&body_text("Indice")),
            squashed(&body_text("R1")),
            squashed(&body_text("R3"))
        ]
    );
    assert_eq!(output.stats.failed_reports, 1);
    assert_eq!(output.stats.rendered_reports, 3);
}

#[tokio::test]
async fn hung_report_times_out_while_the_rest_are_assembled() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeConverter::new().script("R1", Behaviour::Hang).shared();
    let config = AssemblyConfig::builder()
        .converter(fake)
        .builtin_templates()
        .render_timeout_secs(1)
        .build()
        .unwrap();
    let req = request(dir.path()).job(report(1)).job(report(2));

    let start = Instant::now();
    let output = tokio::time::timeout(Duration::from_secs(15), assemble(req, &config))
        .await
        .expect("run must finish once the hung conversion times out")
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(15));
    assert_eq!(output.succeeded, vec![ReportKind::Report(2)]);
    assert_eq!(output.failed_kinds(), vec![ReportKind::Report(1)]);
    assert!(matches!(
        output.failed[0].error,
        RenderError::Timeout { secs: 1, .. }
    ));
    assert_eq!(
        page_texts(&output.output_path),
        vec![squashed(&body_text("R2"))]
    );
}

// ── Fatal outcomes ───────────────────────────────────────────────────────────

#[tokio::test]
async fn all_reports_failing_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeConverter::new()
        .script("Indice", Behaviour::Fail)
        .script("R1", Behaviour::Fail)
        .script("R4", Behaviour::Fail)
        .shared();
    let req = request(dir.path()).job(index(&[1, 4])).job(report(1)).job(report(4));
    let out = req.output_path.clone();

    let err = assemble(req, &config(fake)).await.unwrap_err();

    match err {
        PipelineError::NoValidReports { attempted, .. } => assert_eq!(attempted, 3),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!out.exists());
}

#[tokio::test]
async fn cover_and_marketing_alone_do_not_make_a_document() {
    let dir = tempfile::tempdir().unwrap();
    let cover = write_pdf(&dir.path().join("capa.pdf"), &[text_page("Capa")]);
    let marketing = write_pdf(&dir.path().join("m.pdf"), &[text_page("Insert")]);
    let fake = FakeConverter::new().script("R7", Behaviour::Fail).shared();
    let req = request(dir.path()).job(report(7)).cover(&cover).marketing(&marketing);
    let out = req.output_path.clone();

    let err = assemble(req, &config(fake)).await.unwrap_err();

    assert!(matches!(err, PipelineError::NoValidReports { .. }));
    assert!(!out.exists());
}

#[tokio::test]
async fn missing_converter_is_renderer_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeConverter::new()
        .script("R1", Behaviour::Unavailable)
        .script("R2", Behaviour::Unavailable)
        .shared();
    let req = request(dir.path()).job(report(1)).job(report(2));
    let out = req.output_path.clone();

    let err = assemble(req, &config(fake)).await.unwrap_err();

    assert!(
        matches!(err, PipelineError::RendererUnavailable { ref command, .. } if command == "wkhtmltopdf"),
        "got: {err}"
    );
    assert!(!out.exists());
}

#[tokio::test]
async fn real_converter_missing_binary_is_renderer_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let config = AssemblyConfig::builder()
        .converter_command("no-such-html-to-pdf-converter")
        .builtin_templates()
        .build()
        .unwrap();
    let req = request(dir.path()).job(report(1));

    let err = assemble(req, &config).await.unwrap_err();
    assert!(matches!(err, PipelineError::RendererUnavailable { .. }), "got: {err}");
}

// ── Blank-page removal ───────────────────────────────────────────────────────

fn with_trailing_footer_page(dir: &std::path::Path) -> AssemblyRequest {
    let cover = write_pdf(&dir.join("capa.pdf"), &[text_page("Capa ACME")]);
    let m1 = write_pdf(&dir.join("m1.pdf"), &[text_page("Marketing um")]);
    let m2 = write_pdf(&dir.join("m2.pdf"), &[text_page("Marketing dois")]);
    request(dir)
        .job(index(&[1, 3]))
        .job(report(1))
        .job(report(3))
        .cover(&cover)
        .marketing(&m1)
        .marketing(&m2)
}

fn r1_with_overflow() -> Behaviour {
    Behaviour::Pages(vec![
        text_page("R1 fluxo de caixa consolidado do mes"),
        blank_page(),
        footer_page(),
    ])
}

#[tokio::test]
async fn footer_only_page_is_removed_after_combining() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeConverter::new().script("R1", r1_with_overflow()).shared();
    let req = with_trailing_footer_page(dir.path());

    let output = assemble(req, &config(fake)).await.unwrap();

    // Combined: capa, indice, r1, r1 footer, r3, m1, m2 (blank page filtered)
    assert_eq!(output.stats.filtered_pages, 1);
    assert_eq!(output.stats.combined_pages, 7);
    assert_eq!(output.removed_pages, vec![4]);
    assert_eq!(
        output.finalize,
        FinalizeStatus::Trimmed {
            removed_pages: vec![4]
        }
    );
    assert_eq!(output.stats.final_pages, 6);
    assert_eq!(
        page_texts(&output.output_path),
        vec![
            squashed("Capa ACME"),
            squashed(&body_text("Indice")),
            squashed("R1 fluxo de caixa consolidado do mes"),
            squashed(&body_text("R3")),
            squashed("Marketing um"),
            squashed("Marketing dois")
        ]
    );
}

#[tokio::test]
async fn finalizing_twice_removes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeConverter::new().script("R1", r1_with_overflow()).shared();
    let output = assemble(with_trailing_footer_page(dir.path()), &config(fake))
        .await
        .unwrap();
    let before = std::fs::read(&output.output_path).unwrap();

    let again = finalize_file(&output.output_path, &ClassifierThresholds::default())
        .await
        .unwrap();

    assert!(again.removed_pages.is_empty());
    assert!(!again.rewritten);
    assert_eq!(std::fs::read(&output.output_path).unwrap(), before);
}

#[tokio::test]
async fn protected_pages_are_never_removed() {
    let dir = tempfile::tempdir().unwrap();
    // First page and last two pages hold only the footer.
    let cover = write_pdf(&dir.path().join("capa.pdf"), &[footer_page()]);
    let m1 = write_pdf(&dir.path().join("m1.pdf"), &[footer_page()]);
    let m2 = write_pdf(&dir.path().join("m2.pdf"), &[footer_page()]);
    let req = request(dir.path())
        .job(index(&[1]))
        .job(report(1))
        .cover(&cover)
        .marketing(&m1)
        .marketing(&m2);

    let output = assemble(req, &config(FakeConverter::new().shared()))
        .await
        .unwrap();

    assert_eq!(output.finalize, FinalizeStatus::AlreadyClean);
    assert!(output.removed_pages.is_empty());
    assert_eq!(output.stats.final_pages, 5);
}

#[tokio::test]
async fn blank_page_removal_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeConverter::new().script("R1", r1_with_overflow()).shared();
    let config = AssemblyConfig::builder()
        .converter(fake)
        .builtin_templates()
        .remove_blank_pages(false)
        .build()
        .unwrap();

    let output = assemble(with_trailing_footer_page(dir.path()), &config)
        .await
        .unwrap();

    assert_eq!(output.finalize, FinalizeStatus::Skipped);
    assert_eq!(output.stats.final_pages, 7);

    let stats = inspect(&output.output_path, &ClassifierThresholds::default())
        .await
        .unwrap();
    assert_eq!(stats.total_pages, 7);
    assert_eq!(stats.empty_pages, vec![4]);
}

// ── Concurrency, cancellation, progress ──────────────────────────────────────

#[tokio::test]
async fn concurrency_limit_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    let mut fake = FakeConverter::new();
    for id in 1..=6 {
        fake = fake.delay(&format!("R{id}"), 40);
    }
    let fake = fake.shared();
    let config = AssemblyConfig::builder()
        .converter(fake.clone())
        .builtin_templates()
        .concurrency(2)
        .build()
        .unwrap();
    let mut req = request(dir.path());
    for id in 1..=6 {
        req = req.job(report(id));
    }

    let output = assemble(req, &config).await.unwrap();

    assert_eq!(output.succeeded.len(), 6);
    assert!(fake.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn cancellation_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeConverter::new().script("R1", Behaviour::Hang).shared();
    let req = request(dir.path()).job(report(1)).job(report(2));
    let out = req.output_path.clone();

    let start = Instant::now();
    let err = assemble_with_cancel(
        req,
        &config(fake),
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(!out.exists());
}

#[derive(Default)]
struct RecordingCallback {
    started_with: AtomicUsize,
    completed: AtomicUsize,
    errors: AtomicUsize,
    stages: Mutex<Vec<AssemblyStage>>,
    finished: Mutex<Option<(usize, usize)>>,
}

impl AssemblyProgressCallback for RecordingCallback {
    fn on_assembly_start(&self, total_reports: usize) {
        self.started_with.store(total_reports, Ordering::SeqCst);
    }

    fn on_report_complete(&self, _kind: ReportKind, _label: &str, _duration_ms: u64) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_report_error(&self, kind: ReportKind, _label: &str, _error: &str) {
        assert_eq!(kind, ReportKind::Report(2));
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stage(&self, stage: AssemblyStage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_assembly_complete(&self, succeeded: usize, removed_pages: usize) {
        *self.finished.lock().unwrap() = Some((succeeded, removed_pages));
    }
}

#[tokio::test]
async fn progress_callback_sees_every_report() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeConverter::new().script("R2", Behaviour::Fail).shared();
    let cb = Arc::new(RecordingCallback::default());
    let config = AssemblyConfig::builder()
        .converter(fake)
        .builtin_templates()
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let req = request(dir.path()).job(index(&[1, 2])).job(report(1)).job(report(2));

    assemble(req, &config).await.unwrap();

    assert_eq!(cb.started_with.load(Ordering::SeqCst), 3);
    assert_eq!(cb.completed.load(Ordering::SeqCst), 2);
    assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
    assert_eq!(
        *cb.stages.lock().unwrap(),
        vec![AssemblyStage::Combining, AssemblyStage::Finalizing]
    );
    assert_eq!(*cb.finished.lock().unwrap(), Some((2, 0)));
}

#[tokio::test]
async fn unreadable_marketing_insert_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.pdf");
    std::fs::write(&broken, b"this is not a pdf").unwrap();
    let req = request(dir.path())
        .job(report(1))
        .marketing(&broken)
        .marketing(dir.path().join("missing.pdf"));

    let output = assemble(req, &config(FakeConverter::new().shared()))
        .await
        .unwrap();

    assert_eq!(output.stats.skipped_sources, 2);
    assert_eq!(page_texts(&output.output_path), vec![squashed(&body_text("R1"))]);
}
