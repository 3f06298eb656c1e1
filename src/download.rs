//! Video downloads through `yt-dlp`.
//!
//! yt-dlp does the site extraction, format selection and merging; this
//! module picks the format selector, runs it with line-buffered progress and
//! collects the final file paths it prints after post-processing.

use crate::error::KitError;
use crate::input::require_url;
use crate::output::ensure_dir;
use crate::process::{run_streaming, StreamKind, YT_DLP};
use crate::progress::{emit, ProgressCallback};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Container yt-dlp merges separate video and audio streams into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeFormat {
    #[default]
    Mp4,
    Mkv,
    Webm,
}

impl MergeFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeFormat::Mp4 => "mp4",
            MergeFormat::Mkv => "mkv",
            MergeFormat::Webm => "webm",
        }
    }
}

impl fmt::Display for MergeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeFormat {
    type Err = KitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(MergeFormat::Mp4),
            "mkv" => Ok(MergeFormat::Mkv),
            "webm" => Ok(MergeFormat::Webm),
            other => Err(KitError::invalid(other, "merge format must be mp4, mkv or webm")),
        }
    }
}

/// Options for one download.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Highest acceptable video height, e.g. 1080. `None` takes the best.
    pub max_height: Option<u32>,
    pub output_dir: PathBuf,
    pub merge_format: MergeFormat,
    /// Download audio only and convert it to mp3.
    pub audio_only: bool,
    /// Download just the video when the URL also names a playlist.
    pub no_playlist: bool,
    /// Kill yt-dlp after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            max_height: None,
            output_dir: PathBuf::from("downloads"),
            merge_format: MergeFormat::default(),
            audio_only: false,
            no_playlist: false,
            timeout_secs: None,
        }
    }
}

impl DownloadConfig {
    /// yt-dlp `-f` selector.
    pub fn format_selector(&self) -> String {
        if self.audio_only {
            return "bestaudio/best".to_string();
        }
        match self.max_height {
            Some(h) => format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
            None => "bestvideo+bestaudio/best".to_string(),
        }
    }

    /// yt-dlp `-o` template: one file per title inside the output directory.
    pub fn output_template(&self) -> String {
        self.output_dir
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned()
    }
}

/// What a download produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub url: String,
    pub files: Vec<PathBuf>,
    pub elapsed_ms: u64,
}

/// Full yt-dlp argument vector for `url`.
pub fn build_args(url: &str, config: &DownloadConfig) -> Vec<String> {
    let mut args: Vec<String> = ["--newline", "--no-colors", "--progress", "-f"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(config.format_selector());
    args.extend([
        "--merge-output-format".to_string(),
        config.merge_format.to_string(),
        "-o".to_string(),
        config.output_template(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
    ]);
    if config.no_playlist {
        args.push("--no-playlist".to_string());
    }
    if config.audio_only {
        args.extend(["-x", "--audio-format", "mp3"].iter().map(|s| s.to_string()));
    }
    args.push(url.to_string());
    args
}

/// One `[download]` progress line.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub percent: f64,
    pub total: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

static PROGRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[download\]\s+(\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(\S+))?(?:.*?\s+at\s+(\S+))?(?:.*?\s+ETA\s+(\S+))?",
    )
    .unwrap()
});

/// Parse yt-dlp's `[download]  42.0% of 10.00MiB at 1.2MiB/s ETA 00:07`.
pub fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let caps = PROGRESS_RE.captures(line.trim_start())?;
    let percent: f64 = caps.get(1)?.as_str().parse().ok()?;
    let text = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str().to_string())
            .filter(|s| s != "Unknown" && !s.starts_with("N/A"))
    };
    Some(DownloadProgress {
        percent: percent.clamp(0.0, 100.0),
        total: text(2),
        speed: text(3),
        eta: text(4),
    })
}

/// A stdout line that is a file path printed by `--print after_move:filepath`.
fn printed_path(line: &str) -> Option<PathBuf> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('[') || line.starts_with("WARNING:") {
        return None;
    }
    Some(PathBuf::from(line))
}

/// Download `url` into `config.output_dir`.
///
/// Progress is reported in per-mille of the current file; yt-dlp restarts
/// the count for each stream it fetches.
///
/// # Errors
/// - [`KitError::InvalidInput`] when `url` is not http(s)
/// - [`KitError::ToolNotFound`] / [`KitError::ToolFailed`] from yt-dlp
pub async fn download(
    url: &str,
    config: &DownloadConfig,
    progress: Option<&ProgressCallback>,
) -> Result<DownloadReport, KitError> {
    let start = Instant::now();
    let url = require_url(url)?.to_string();
    ensure_dir(&config.output_dir)?;

    info!(
        "Downloading {} ({}) → {}",
        url,
        config.format_selector(),
        config.output_dir.display()
    );
    emit(progress, |p| p.on_start("Downloading", Some(1000)));

    let args = build_args(&url, config);
    let timeout = config.timeout_secs.map(Duration::from_secs);
    let mut files = Vec::new();

    let run = run_streaming(&YT_DLP, &args, timeout, |kind, line| {
        if let Some(p) = parse_progress_line(line) {
            emit(progress, |cb| {
                cb.on_position((p.percent * 10.0).round() as u64);
                let mut parts = Vec::new();
                if let Some(ref total) = p.total {
                    parts.push(total.clone());
                }
                if let Some(ref speed) = p.speed {
                    parts.push(speed.clone());
                }
                if let Some(ref eta) = p.eta {
                    parts.push(format!("ETA {eta}"));
                }
                cb.on_message(&parts.join(" · "));
            });
            return;
        }
        match kind {
            StreamKind::Stdout => match printed_path(line) {
                Some(path) => {
                    debug!("yt-dlp wrote {}", path.display());
                    files.push(path);
                }
                None => debug!("yt-dlp: {}", line),
            },
            StreamKind::Stderr => {
                if line.starts_with("[Merger]") || line.starts_with("[ExtractAudio]") {
                    emit(progress, |cb| cb.on_message("post-processing"));
                }
                debug!("yt-dlp: {}", line);
            }
        }
    })
    .await;

    if let Err(e) = run {
        emit(progress, |p| p.on_finish(false));
        return Err(e);
    }
    emit(progress, |p| p.on_finish(true));

    if files.is_empty() {
        warn!("yt-dlp finished without reporting an output file");
    }
    let report = DownloadReport {
        url,
        files,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    info!("Downloaded {} file(s) in {}ms", report.files.len(), report.elapsed_ms);
    Ok(report)
}
