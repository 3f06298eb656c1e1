//! The page operations: inspect, merge, split, extract, delete, rotate, render.
//!
//! Each public function validates its inputs on the async side, then moves
//! the PDFium work onto `spawn_blocking`. PDFium is bound per call; binding
//! is cheap once the library file is resolved.

use super::{engine, DocumentMetadata, PageSelection, PdfReport, Rotation};
use crate::error::KitError;
use crate::input::require_pdf;
use crate::output::{ensure_dir, prepare_output, write_atomic};
use crate::progress::{emit, ProgressCallback};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Options shared by every writing operation.
#[derive(Debug, Clone, Default)]
pub struct PdfOptions {
    /// Password for encrypted inputs. Applied to every input of a merge.
    pub password: Option<String>,
    /// Replace existing output files.
    pub overwrite: bool,
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// File version as printed in a PDF header, e.g. `1.7`.
fn version_string(version: PdfDocumentVersion) -> String {
    let raw = match version {
        PdfDocumentVersion::Unset => return "unknown".to_string(),
        PdfDocumentVersion::Pdf1_0 => 10,
        PdfDocumentVersion::Pdf1_1 => 11,
        PdfDocumentVersion::Pdf1_2 => 12,
        PdfDocumentVersion::Pdf1_3 => 13,
        PdfDocumentVersion::Pdf1_4 => 14,
        PdfDocumentVersion::Pdf1_5 => 15,
        PdfDocumentVersion::Pdf1_6 => 16,
        PdfDocumentVersion::Pdf1_7 => 17,
        PdfDocumentVersion::Pdf2_0 => 20,
        PdfDocumentVersion::Other(n) => n,
    };
    format!("{}.{}", raw / 10, raw % 10)
}

async fn blocking<T, F>(op: &'static str, f: F) -> Result<T, KitError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, KitError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| KitError::Internal(format!("{op} task panicked: {e}")))?
}

fn pdf_err(op: &'static str) -> impl Fn(PdfiumError) -> KitError {
    move |e| KitError::PdfOperation {
        op,
        detail: format!("{e:?}"),
    }
}

fn open<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, KitError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.to_lowercase().contains("password") {
            if password.is_some() {
                KitError::WrongPassword {
                    path: path.to_path_buf(),
                }
            } else {
                KitError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            }
        } else {
            KitError::CorruptPdf {
                path: path.to_path_buf(),
                detail,
            }
        }
    })
}

fn page_count(doc: &PdfDocument) -> usize {
    doc.pages().len() as usize
}

fn page_index(idx: usize) -> Result<u16, KitError> {
    u16::try_from(idx).map_err(|_| KitError::PdfOperation {
        op: "page lookup",
        detail: format!("page {} exceeds PDFium's page index range", idx + 1),
    })
}

/// Append the pages at `indices` (0-based) of `src` to the end of `dest`.
fn copy_pages(
    dest: &mut PdfDocument,
    src: &PdfDocument,
    indices: &[usize],
    op: &'static str,
) -> Result<(), KitError> {
    for &idx in indices {
        let at = dest.pages().len();
        dest.pages_mut()
            .copy_page_from_document(src, page_index(idx)?, at)
            .map_err(pdf_err(op))?;
    }
    Ok(())
}

fn save(doc: &PdfDocument, path: &Path, op: &'static str) -> Result<(), KitError> {
    let bytes = doc.save_to_bytes().map_err(pdf_err(op))?;
    write_atomic(path, &bytes)
}

/// `<stem>` of the input, used to name split and render outputs.
fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Build a new document from `indices` of `input` and save it to `output`.
fn write_subset(
    pdfium: &Pdfium,
    src: &PdfDocument,
    indices: &[usize],
    output: &Path,
    op: &'static str,
) -> Result<(), KitError> {
    let mut dest = pdfium.create_new_pdf().map_err(pdf_err(op))?;
    copy_pages(&mut dest, src, indices, op)?;
    save(&dest, output, op)
}

// ── Operations ───────────────────────────────────────────────────────────

/// Read document metadata and the page count.
pub async fn inspect(input: &Path, password: Option<&str>) -> Result<DocumentMetadata, KitError> {
    let input = require_pdf(input)?;
    let password = password.map(str::to_string);

    blocking("inspect", move || {
        let pdfium = engine::bind()?;
        let doc = open(&pdfium, &input, password.as_deref())?;
        let metadata = doc.metadata();

        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata
                .get(tag)
                .map(|t| t.value().trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(DocumentMetadata {
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
            subject: get_meta(PdfDocumentMetadataTagType::Subject),
            creator: get_meta(PdfDocumentMetadataTagType::Creator),
            producer: get_meta(PdfDocumentMetadataTagType::Producer),
            creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
            modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
            page_count: page_count(&doc),
            pdf_version: version_string(doc.version()),
            path: input.clone(),
        })
    })
    .await
}

/// Concatenate every page of `inputs`, in order, into `output`.
pub async fn merge(
    inputs: &[PathBuf],
    output: &Path,
    options: &PdfOptions,
) -> Result<PdfReport, KitError> {
    if inputs.len() < 2 {
        return Err(KitError::invalid(
            format!("{} input(s)", inputs.len()),
            "merge needs at least two PDFs",
        ));
    }
    let inputs = inputs
        .iter()
        .map(|p| require_pdf(p))
        .collect::<Result<Vec<_>, _>>()?;
    prepare_output(output, options.overwrite)?;

    let output = output.to_path_buf();
    let password = options.password.clone();

    blocking("merge", move || {
        let pdfium = engine::bind()?;
        let mut dest = pdfium.create_new_pdf().map_err(pdf_err("merge"))?;
        let mut pages_in = 0;

        for input in &inputs {
            let src = open(&pdfium, input, password.as_deref())?;
            let total = page_count(&src);
            debug!("Merging {} ({} pages)", input.display(), total);
            let all: Vec<usize> = (0..total).collect();
            copy_pages(&mut dest, &src, &all, "merge")?;
            pages_in += total;
        }

        save(&dest, &output, "merge")?;
        let pages_out = page_count(&dest);
        info!("Merged {} files → {} ({} pages)", inputs.len(), output.display(), pages_out);
        Ok(PdfReport {
            operation: "merge",
            outputs: vec![output],
            pages_in,
            pages_out,
        })
    })
    .await
}

/// Output path of chunk `n` (1-based) when splitting `input`.
pub fn split_output_path(out_dir: &Path, input: &Path, n: usize) -> PathBuf {
    out_dir.join(format!("{}-{:03}.pdf", stem_of(input), n))
}

/// Split `input` into files of `every` pages each, named `<stem>-NNN.pdf`.
pub async fn split(
    input: &Path,
    out_dir: &Path,
    every: usize,
    options: &PdfOptions,
) -> Result<PdfReport, KitError> {
    if every == 0 {
        return Err(KitError::invalid("0", "pages per file must be at least 1"));
    }
    let input = require_pdf(input)?;
    ensure_dir(out_dir)?;

    let out_dir = out_dir.to_path_buf();
    let options = options.clone();

    blocking("split", move || {
        let pdfium = engine::bind()?;
        let src = open(&pdfium, &input, options.password.as_deref())?;
        let total = page_count(&src);
        let mut outputs = Vec::new();

        let indices: Vec<usize> = (0..total).collect();
        for (n, chunk) in indices.chunks(every).enumerate() {
            let path = split_output_path(&out_dir, &input, n + 1);
            prepare_output(&path, options.overwrite)?;
            write_subset(&pdfium, &src, chunk, &path, "split")?;
            debug!("Wrote pages {}-{} → {}", chunk[0] + 1, chunk[chunk.len() - 1] + 1, path.display());
            outputs.push(path);
        }

        info!("Split {} into {} files", input.display(), outputs.len());
        Ok(PdfReport {
            operation: "split",
            outputs,
            pages_in: total,
            pages_out: total,
        })
    })
    .await
}

/// Write the selected pages of `input` to a new PDF.
pub async fn extract(
    input: &Path,
    selection: &PageSelection,
    output: &Path,
    options: &PdfOptions,
) -> Result<PdfReport, KitError> {
    let input = require_pdf(input)?;
    prepare_output(output, options.overwrite)?;

    let output = output.to_path_buf();
    let selection = selection.clone();
    let password = options.password.clone();

    blocking("extract", move || {
        let pdfium = engine::bind()?;
        let src = open(&pdfium, &input, password.as_deref())?;
        let total = page_count(&src);
        let indices = selection.resolve(total)?;

        write_subset(&pdfium, &src, &indices, &output, "extract")?;
        info!("Extracted {} of {} pages → {}", indices.len(), total, output.display());
        Ok(PdfReport {
            operation: "extract",
            outputs: vec![output],
            pages_in: total,
            pages_out: indices.len(),
        })
    })
    .await
}

/// Write `input` without the selected pages.
pub async fn delete(
    input: &Path,
    selection: &PageSelection,
    output: &Path,
    options: &PdfOptions,
) -> Result<PdfReport, KitError> {
    let input = require_pdf(input)?;
    prepare_output(output, options.overwrite)?;

    let output = output.to_path_buf();
    let selection = selection.clone();
    let password = options.password.clone();

    blocking("delete", move || {
        let pdfium = engine::bind()?;
        let src = open(&pdfium, &input, password.as_deref())?;
        let total = page_count(&src);
        let removed = selection.resolve(total)?;
        let kept = kept_pages(total, &removed);
        if kept.is_empty() {
            return Err(KitError::invalid(
                selection.to_string(),
                "selection covers every page; the result would be empty",
            ));
        }

        write_subset(&pdfium, &src, &kept, &output, "delete")?;
        info!("Deleted {} of {} pages → {}", removed.len(), total, output.display());
        Ok(PdfReport {
            operation: "delete",
            outputs: vec![output],
            pages_in: total,
            pages_out: kept.len(),
        })
    })
    .await
}

/// 0-based pages of a `total`-page document not listed in `removed`.
pub(crate) fn kept_pages(total: usize, removed: &[usize]) -> Vec<usize> {
    (0..total).filter(|i| removed.binary_search(i).is_err()).collect()
}

/// Rotate the selected pages clockwise by `rotation`, keeping the others.
pub async fn rotate(
    input: &Path,
    selection: &PageSelection,
    rotation: Rotation,
    output: &Path,
    options: &PdfOptions,
) -> Result<PdfReport, KitError> {
    let input = require_pdf(input)?;
    prepare_output(output, options.overwrite)?;

    let output = output.to_path_buf();
    let selection = selection.clone();
    let password = options.password.clone();

    blocking("rotate", move || {
        let pdfium = engine::bind()?;
        let doc = open(&pdfium, &input, password.as_deref())?;
        let total = page_count(&doc);
        let indices = selection.resolve(total)?;

        for &idx in &indices {
            let mut page = doc.pages().get(page_index(idx)?).map_err(pdf_err("rotate"))?;
            let current = page.rotation().map_err(pdf_err("rotate"))?;
            page.set_rotation(rotation.apply(current));
        }

        save(&doc, &output, "rotate")?;
        info!(
            "Rotated {} of {} pages by {}° → {}",
            indices.len(),
            total,
            rotation.degrees(),
            output.display()
        );
        Ok(PdfReport {
            operation: "rotate",
            outputs: vec![output],
            pages_in: total,
            pages_out: total,
        })
    })
    .await
}

/// Output path of 0-based page `idx` when rendering `input`.
pub fn render_output_path(out_dir: &Path, input: &Path, idx: usize) -> PathBuf {
    out_dir.join(format!("{}-p{:03}.png", stem_of(input), idx + 1))
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, KitError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| KitError::PdfOperation {
            op: "render",
            detail: format!("PNG encode: {e}"),
        })?;
    Ok(buf)
}

/// Rasterise the selected pages to PNG files, longest edge capped at
/// `max_pixels`. Progress counts pages.
pub async fn render(
    input: &Path,
    selection: &PageSelection,
    out_dir: &Path,
    max_pixels: u32,
    options: &PdfOptions,
    progress: Option<&ProgressCallback>,
) -> Result<PdfReport, KitError> {
    if max_pixels < 16 {
        return Err(KitError::invalid(
            max_pixels.to_string(),
            "maximum pixel size must be at least 16",
        ));
    }
    let input = require_pdf(input)?;
    ensure_dir(out_dir)?;

    let out_dir = out_dir.to_path_buf();
    let selection = selection.clone();
    let options = options.clone();
    let task_progress = progress.cloned();

    let result = blocking("render", move || {
        let progress = task_progress;
        let pdfium = engine::bind()?;
        let doc = open(&pdfium, &input, options.password.as_deref())?;
        let total = page_count(&doc);
        let indices = selection.resolve(total)?;
        emit(progress.as_ref(), |p| p.on_start("Rendering", Some(indices.len() as u64)));

        let render_config = PdfRenderConfig::new()
            .set_target_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let mut outputs = Vec::with_capacity(indices.len());
        for &idx in &indices {
            let path = render_output_path(&out_dir, &input, idx);
            prepare_output(&path, options.overwrite)?;

            let page = doc.pages().get(page_index(idx)?).map_err(pdf_err("render"))?;
            let image = page
                .render_with_config(&render_config)
                .map_err(pdf_err("render"))?
                .as_image();
            debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());

            write_atomic(&path, &encode_png(&image)?)?;
            outputs.push(path);
            emit(progress.as_ref(), |p| p.on_advance(1));
        }

        info!("Rendered {} pages of {}", outputs.len(), input.display());
        Ok(PdfReport {
            operation: "render",
            pages_out: outputs.len(),
            outputs,
            pages_in: total,
        })
    })
    .await;

    emit(progress, |p| p.on_finish(result.is_ok()));
    result
}
