//! End-to-end tests that drive the real external programs and PDFium.
//!
//! They are gated behind the `E2E_ENABLED` environment variable; each test
//! also skips itself when the program it needs is not installed. The PDFium
//! library is downloaded into the user cache on first use.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use pdfium_render::prelude::*;
use scriptkit::diagram::{self, DiagramConfig};
use scriptkit::pdf::{self, engine, PdfOptions};
use scriptkit::process::{Tool, DOT, FFMPEG};
use scriptkit::video::{self, ConvertConfig};
use scriptkit::{ImageFormat, PageSelection, Rotation};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        init_tracing();
    };
}

macro_rules! skip_without {
    ($tool:expr, $flag:expr) => {
        if !installed(&$tool, $flag) {
            println!("SKIP — {} not found ({})", $tool.name, $tool.hint);
            return;
        }
    };
}

/// Library logs on the test writer; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn installed(tool: &Tool, flag: &str) -> bool {
    std::process::Command::new(tool.program())
        .arg(flag)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Write an A4 PDF with `pages` blank pages.
async fn blank_pdf(dir: &Path, name: &str, pages: usize) -> PathBuf {
    engine::ensure_library(None).await.unwrap();
    let path = dir.join(name);
    let pdfium = engine::bind().unwrap();
    let mut doc = pdfium.create_new_pdf().unwrap();
    for _ in 0..pages {
        doc.pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .unwrap();
    }
    doc.save_to_file(&path).unwrap();
    path
}

fn page_count(path: &Path) -> usize {
    let pdfium = engine::bind().unwrap();
    let doc = pdfium.load_pdf_from_file(path, None).unwrap();
    doc.pages().len() as usize
}

// ── PDF ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pdf_inspect_counts_pages() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let input = blank_pdf(dir.path(), "doc.pdf", 4).await;

    let meta = pdf::inspect(&input, None).await.unwrap();
    assert_eq!(meta.page_count, 4);
    assert!(!meta.pdf_version.is_empty());
}

#[tokio::test]
async fn test_pdf_merge_then_split() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let a = blank_pdf(dir.path(), "a.pdf", 2).await;
    let b = blank_pdf(dir.path(), "b.pdf", 3).await;
    let merged = dir.path().join("merged.pdf");
    let opts = PdfOptions::default();

    let report = pdf::merge(&[a, b], &merged, &opts).await.unwrap();
    assert_eq!(report.pages_in, 5);
    assert_eq!(report.pages_out, 5);
    assert_eq!(page_count(&merged), 5);

    let parts = dir.path().join("parts");
    let report = pdf::split(&merged, &parts, 2, &opts).await.unwrap();
    assert_eq!(report.outputs.len(), 3);
    assert_eq!(page_count(&report.outputs[0]), 2);
    assert_eq!(page_count(&report.outputs[2]), 1);
    assert!(parts.join("merged-001.pdf").exists());
}

#[tokio::test]
async fn test_pdf_extract_delete_rotate() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let input = blank_pdf(dir.path(), "doc.pdf", 6).await;
    let opts = PdfOptions::default();

    let sel: PageSelection = "1,3,5-6".parse().unwrap();
    let out = dir.path().join("extract.pdf");
    pdf::extract(&input, &sel, &out, &opts).await.unwrap();
    assert_eq!(page_count(&out), 4);

    let out = dir.path().join("delete.pdf");
    pdf::delete(&input, &sel, &out, &opts).await.unwrap();
    assert_eq!(page_count(&out), 2);

    let all: PageSelection = "all".parse().unwrap();
    let err = pdf::delete(&input, &all, &dir.path().join("none.pdf"), &opts).await;
    assert!(err.is_err(), "deleting every page must fail");

    let out = dir.path().join("rotate.pdf");
    pdf::rotate(&input, &PageSelection::Single(2), Rotation::Quarter, &out, &opts)
        .await
        .unwrap();
    let pdfium = engine::bind().unwrap();
    let doc = pdfium.load_pdf_from_file(&out, None).unwrap();
    assert_eq!(
        doc.pages().get(1).unwrap().rotation().unwrap(),
        PdfPageRenderRotation::Degrees90
    );
    assert_eq!(
        doc.pages().get(0).unwrap().rotation().unwrap(),
        PdfPageRenderRotation::None
    );
}

#[tokio::test]
async fn test_pdf_render_caps_longest_edge() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let input = blank_pdf(dir.path(), "doc.pdf", 2).await;

    let report = pdf::render(
        &input,
        &PageSelection::All,
        dir.path(),
        400,
        &PdfOptions::default(),
        None,
    )
    .await
    .unwrap();
    assert_eq!(report.outputs.len(), 2);
    let img = image::open(&report.outputs[0]).unwrap();
    assert!(img.width().max(img.height()) <= 400);
    assert!(dir.path().join("doc-p001.png").exists());
}

// ── Video ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_video_remux_and_audio_extract() {
    e2e_skip_unless_enabled!();
    skip_without!(FFMPEG, "-version");
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("clip.mkv");
    let status = std::process::Command::new(FFMPEG.program())
        .args(["-hide_banner", "-loglevel", "error", "-f", "lavfi", "-i"])
        .arg("testsrc=duration=2:size=320x240:rate=10")
        .args(["-f", "lavfi", "-i", "sine=frequency=440:duration=2"])
        .args(["-c:v", "libx264", "-c:a", "aac", "-shortest"])
        .arg(&src)
        .status()
        .unwrap();
    assert!(status.success());

    let mp4 = dir.path().join("clip.mp4");
    let report = video::convert(&src, &mp4, &ConvertConfig::default(), None)
        .await
        .unwrap();
    assert!(report.output_bytes > 0);
    assert!(report.source_duration_secs.unwrap_or(0.0) > 1.0);

    let mp3 = dir.path().join("clip.mp3");
    let report = video::convert(&src, &mp3, &ConvertConfig::default(), None)
        .await
        .unwrap();
    assert!(report.output_bytes > 0);

    let err = video::convert(&src, &mp4, &ConvertConfig::default(), None).await;
    assert!(err.is_err(), "existing output must not be replaced");
}

// ── Diagram ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_graphviz_renders_svg() {
    e2e_skip_unless_enabled!();
    skip_without!(DOT, "-V");
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("g.dot");
    std::fs::write(&src, "digraph { a -> b }").unwrap();

    let config = DiagramConfig {
        format: Some(ImageFormat::Svg),
        ..Default::default()
    };
    let report = diagram::render(&src, None, &config).await.unwrap();
    assert_eq!(report.output, dir.path().join("g.svg"));
    let svg = std::fs::read_to_string(&report.output).unwrap();
    assert!(svg.contains("<svg"));
}
