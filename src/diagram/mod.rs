//! Diagram source → image conversion.
//!
//! ```text
//! .mmd / .dot / .puml ──▶ backend ──▶ .png / .svg / .pdf
//!                          ├─ local: mmdc (headless Chromium), dot, plantuml
//!                          └─ kroki: HTTP render service
//! ```
//!
//! The diagram language is picked from the source extension. Whatever the
//! backend, the written file is sniffed afterwards and must actually be the
//! requested format: renderers have a habit of exiting 0 after writing an
//! error page or nothing at all.

pub mod kroki;
pub mod local;

use crate::error::KitError;
use crate::input::{extension_of, require_file};
use crate::output::{prepare_output, OutputGuard};
use crate::progress::{emit, ProgressCallback};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Diagram language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramKind {
    Mermaid,
    Graphviz,
    PlantUml,
}

impl DiagramKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mmd" | "mermaid" => Some(DiagramKind::Mermaid),
            "dot" | "gv" => Some(DiagramKind::Graphviz),
            "puml" | "plantuml" | "pu" => Some(DiagramKind::PlantUml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, KitError> {
        extension_of(path)
            .and_then(|e| Self::from_extension(&e))
            .ok_or_else(|| {
                KitError::invalid(
                    path.display().to_string(),
                    "unknown diagram type; expected .mmd, .mermaid, .dot, .gv, .puml, .plantuml or .pu",
                )
            })
    }

    /// Path segment used by Kroki.
    pub fn kroki_name(self) -> &'static str {
        match self {
            DiagramKind::Mermaid => "mermaid",
            DiagramKind::Graphviz => "graphviz",
            DiagramKind::PlantUml => "plantuml",
        }
    }
}

impl fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kroki_name())
    }
}

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Svg,
    Pdf,
}

impl ImageFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "svg" => Some(ImageFormat::Svg),
            "pdf" => Some(ImageFormat::Pdf),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
            ImageFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Identify an image from its leading bytes.
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(ImageFormat::Png);
    }
    if bytes.starts_with(b"%PDF") {
        return Some(ImageFormat::Pdf);
    }
    let head = &bytes[..bytes.len().min(4096)];
    if String::from_utf8_lossy(head).contains("<svg") {
        return Some(ImageFormat::Svg);
    }
    None
}

/// Where rendering happens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Backend {
    /// Local programs: `mmdc`, `dot`, `plantuml`.
    #[default]
    Local,
    /// A Kroki server, e.g. `https://kroki.io`.
    Kroki { base_url: String },
}

/// Default public Kroki instance.
pub const DEFAULT_KROKI_URL: &str = "https://kroki.io";

/// Rendering options. Options a renderer does not understand are ignored
/// (logged at debug level).
#[derive(Debug, Clone)]
pub struct DiagramConfig {
    /// Output format. `None` → taken from the output extension, else PNG.
    pub format: Option<ImageFormat>,
    pub backend: Backend,
    /// Mermaid theme: default, dark, forest, neutral.
    pub theme: Option<String>,
    /// Background colour, e.g. `white` or `transparent`.
    pub background: Option<String>,
    /// Page width in pixels (Mermaid).
    pub width: Option<u32>,
    /// Scale factor (Mermaid `-s`, Graphviz DPI multiplier).
    pub scale: Option<f32>,
    /// Puppeteer JSON config passed to mmdc (`-p`), e.g. for `--no-sandbox`.
    pub puppeteer_config: Option<PathBuf>,
    /// Per-diagram timeout in seconds. Default: 60.
    pub timeout_secs: u64,
    /// Replace existing output files.
    pub overwrite: bool,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            format: None,
            backend: Backend::default(),
            theme: None,
            background: None,
            width: None,
            scale: None,
            puppeteer_config: None,
            timeout_secs: 60,
            overwrite: false,
        }
    }
}

/// Result of one rendered diagram.
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub kind: DiagramKind,
    pub format: ImageFormat,
    pub bytes: u64,
    pub elapsed_ms: u64,
}

/// Resolve the output format and path for `input`.
pub fn plan_output(
    input: &Path,
    output: Option<&Path>,
    requested: Option<ImageFormat>,
) -> Result<(PathBuf, ImageFormat), KitError> {
    let from_ext = output.and_then(extension_of).and_then(|e| ImageFormat::from_extension(&e));

    let format = match (requested, from_ext) {
        (Some(req), Some(ext)) if req != ext => {
            return Err(KitError::invalid(
                output.map(|p| p.display().to_string()).unwrap_or_default(),
                format!("output extension says {ext} but --format asks for {req}"),
            ));
        }
        (Some(req), _) => req,
        (None, Some(ext)) => ext,
        (None, None) => ImageFormat::default(),
    };

    let path = match output {
        Some(p) if from_ext.is_some() => p.to_path_buf(),
        Some(p) => p.with_extension(format.extension()),
        None => input.with_extension(format.extension()),
    };
    Ok((path, format))
}

/// Render one diagram source file.
///
/// `output` defaults to the input path with the format's extension.
pub async fn render(
    input: &Path,
    output: Option<&Path>,
    config: &DiagramConfig,
) -> Result<RenderReport, KitError> {
    let start = Instant::now();
    let input = require_file(input)?;
    let kind = DiagramKind::from_path(&input)?;
    let (output, format) = plan_output(&input, output, config.format)?;
    prepare_output(&output, config.overwrite)?;
    let guard = OutputGuard::new(&output);

    info!(
        "Rendering {} diagram {} → {}",
        kind,
        input.display(),
        output.display()
    );

    let tool_name = match &config.backend {
        Backend::Local => local::render(kind, &input, &output, format, config).await?,
        Backend::Kroki { base_url } => {
            let source = tokio::fs::read_to_string(&input)
                .await
                .map_err(|e| KitError::invalid(input.display().to_string(), e.to_string()))?;
            let bytes = kroki::render(base_url, kind, format, &source, config.timeout_secs).await?;
            crate::output::write_atomic_async(&output, &bytes).await?;
            "kroki"
        }
    };

    let bytes = verify_output(tool_name, &output, format)?;
    guard.commit();
    debug!("{} wrote {} bytes", tool_name, bytes);

    Ok(RenderReport {
        input,
        output,
        kind,
        format,
        bytes,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

/// Render every recognised diagram source in `dir`.
///
/// Outputs go to `out_dir` (default: next to each source). Stops at the
/// first failure.
pub async fn render_dir(
    dir: &Path,
    out_dir: Option<&Path>,
    config: &DiagramConfig,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<RenderReport>, KitError> {
    let sources = collect_sources(dir)?;
    if sources.is_empty() {
        return Err(KitError::invalid(
            dir.display().to_string(),
            "directory contains no diagram sources",
        ));
    }

    let format = config.format.unwrap_or_default();
    emit(progress, |p| p.on_start("Rendering", Some(sources.len() as u64)));

    let mut reports = Vec::with_capacity(sources.len());
    for src in &sources {
        let name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        emit(progress, |p| p.on_message(&name));

        let target = out_dir.map(|d| d.join(src.with_extension(format.extension()).file_name().unwrap_or_default()));
        match render(src, target.as_deref(), config).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                emit(progress, |p| p.on_finish(false));
                return Err(e);
            }
        }
        emit(progress, |p| p.on_advance(1));
    }

    emit(progress, |p| p.on_finish(true));
    Ok(reports)
}

/// Sorted list of files in `dir` with a diagram extension.
fn collect_sources(dir: &Path) -> Result<Vec<PathBuf>, KitError> {
    let entries = std::fs::read_dir(dir).map_err(|_| KitError::FileNotFound {
        path: dir.to_path_buf(),
    })?;
    let mut sources: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| DiagramKind::from_path(p).is_ok())
        .collect();
    sources.sort();
    Ok(sources)
}

/// Check the rendered file exists, is non-empty and has the right magic.
fn verify_output(tool: &str, output: &Path, format: ImageFormat) -> Result<u64, KitError> {
    let len = crate::output::ensure_non_empty(tool, output)?;
    let mut head = vec![0u8; 4096];
    let n = {
        use std::io::Read;
        let mut f = std::fs::File::open(output).map_err(|e| KitError::write_failed(output, e))?;
        f.read(&mut head).map_err(|e| KitError::write_failed(output, e))?
    };
    head.truncate(n);

    match sniff_format(&head) {
        Some(found) if found == format => Ok(len),
        found => Err(KitError::ToolFailed {
            tool: tool.to_string(),
            status: "exit status: 0".into(),
            stderr: format!(
                "expected a {} file but '{}' looks like {}",
                format,
                output.display(),
                found.map(|f| f.to_string()).unwrap_or_else(|| "something else".into())
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension() {
        assert_eq!(DiagramKind::from_extension("mmd"), Some(DiagramKind::Mermaid));
        assert_eq!(DiagramKind::from_extension("GV"), Some(DiagramKind::Graphviz));
        assert_eq!(DiagramKind::from_extension("pu"), Some(DiagramKind::PlantUml));
        assert_eq!(DiagramKind::from_extension("txt"), None);
        assert!(DiagramKind::from_path(Path::new("flow.txt")).is_err());
    }

    #[test]
    fn sniff_recognises_formats() {
        assert_eq!(
            sniff_format(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"),
            Some(ImageFormat::Png)
        );
        assert_eq!(sniff_format(b"%PDF-1.5\n"), Some(ImageFormat::Pdf));
        assert_eq!(
            sniff_format(b"<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\">"),
            Some(ImageFormat::Svg)
        );
        assert_eq!(sniff_format(b"<html>error</html>"), None);
        assert_eq!(sniff_format(b""), None);
    }

    #[test]
    fn plan_defaults_to_png_next_to_input() {
        let (path, fmt) = plan_output(Path::new("d/flow.mmd"), None, None).unwrap();
        assert_eq!(path, PathBuf::from("d/flow.png"));
        assert_eq!(fmt, ImageFormat::Png);
    }

    #[test]
    fn plan_takes_format_from_output_extension() {
        let (path, fmt) =
            plan_output(Path::new("flow.dot"), Some(Path::new("out/flow.svg")), None).unwrap();
        assert_eq!(path, PathBuf::from("out/flow.svg"));
        assert_eq!(fmt, ImageFormat::Svg);
    }

    #[test]
    fn plan_appends_extension_when_output_has_none() {
        let (path, fmt) = plan_output(
            Path::new("flow.puml"),
            Some(Path::new("out/flow")),
            Some(ImageFormat::Pdf),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("out/flow.pdf"));
        assert_eq!(fmt, ImageFormat::Pdf);
    }

    #[test]
    fn plan_rejects_conflicting_format() {
        let err = plan_output(
            Path::new("flow.mmd"),
            Some(Path::new("flow.svg")),
            Some(ImageFormat::Png),
        )
        .unwrap_err();
        assert!(err.to_string().contains("--format"));
    }

    #[test]
    fn verify_rejects_wrong_magic() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.png");
        std::fs::write(&out, b"<svg></svg>").unwrap();
        let err = verify_output("mmdc", &out, ImageFormat::Png).unwrap_err();
        assert!(err.to_string().contains("svg"), "got: {err}");
        assert!(verify_output("mmdc", &out, ImageFormat::Svg).is_ok());
    }

    #[test]
    fn collect_sources_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.dot", "a.mmd", "notes.txt", "c.puml"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let found: Vec<String> = collect_sources(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, vec!["a.mmd", "b.dot", "c.puml"]);
    }

    #[tokio::test]
    async fn empty_dir_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = render_dir(dir.path(), None, &DiagramConfig::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, KitError::InvalidInput { .. }));
    }
}
