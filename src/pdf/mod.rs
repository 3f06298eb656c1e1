//! PDF page manipulation on top of PDFium.
//!
//! Every operation loads its inputs, builds or edits a document in memory,
//! saves it to bytes and writes it atomically. PDFium calls are blocking
//! and run on `spawn_blocking`. Call [`engine::ensure_library`] once before
//! the first operation so a missing library is downloaded with progress
//! instead of failing at bind time.

pub mod engine;
pub mod ops;
pub mod pages;

use crate::error::KitError;
use pdfium_render::prelude::PdfPageRenderRotation;
use serde::Serialize;
use std::path::PathBuf;

pub use ops::{delete, extract, inspect, merge, render, rotate, split, PdfOptions};
pub use pages::PageSelection;

/// Default longest edge, in pixels, for rendered pages.
pub const DEFAULT_MAX_PIXELS: u32 = 2000;

/// Metadata read by [`inspect`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentMetadata {
    pub path: PathBuf,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// What a writing operation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfReport {
    pub operation: &'static str,
    pub outputs: Vec<PathBuf>,
    /// Pages across all inputs.
    pub pages_in: usize,
    /// Pages across all outputs.
    pub pages_out: usize,
}

/// Clockwise rotation added to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rotation {
    Quarter,
    Half,
    ThreeQuarters,
}

impl Rotation {
    /// Accepts 90, 180, 270 and their negative (counter-clockwise) forms.
    pub fn from_degrees(degrees: i32) -> Result<Self, KitError> {
        match degrees.rem_euclid(360) {
            90 => Ok(Rotation::Quarter),
            180 => Ok(Rotation::Half),
            270 => Ok(Rotation::ThreeQuarters),
            _ => Err(KitError::invalid(
                degrees.to_string(),
                "rotation must be 90, 180, 270 or -90",
            )),
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarters => 270,
        }
    }

    /// The page rotation after applying `self` on top of `current`.
    pub fn apply(self, current: PdfPageRenderRotation) -> PdfPageRenderRotation {
        let current = match current {
            PdfPageRenderRotation::None => 0,
            PdfPageRenderRotation::Degrees90 => 90,
            PdfPageRenderRotation::Degrees180 => 180,
            PdfPageRenderRotation::Degrees270 => 270,
        };
        match (current + self.degrees()) % 360 {
            90 => PdfPageRenderRotation::Degrees90,
            180 => PdfPageRenderRotation::Degrees180,
            270 => PdfPageRenderRotation::Degrees270,
            _ => PdfPageRenderRotation::None,
        }
    }
}
