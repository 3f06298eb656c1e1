//! ffmpeg invocation: argument construction, progress parsing, execution.

use super::{probe, Container, ConvertConfig, ConvertReport};
use crate::error::KitError;
use crate::input::require_file;
use crate::output::{ensure_non_empty, prepare_output, OutputGuard};
use crate::process::{run_streaming, StreamKind, FFMPEG};
use crate::progress::{emit, ProgressCallback};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A line of `-progress pipe:1` output that matters to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfmpegProgress {
    /// Media time written so far, in milliseconds.
    OutTimeMs(u64),
    /// ffmpeg finished writing.
    End,
}

/// Parse one `key=value` line of ffmpeg's machine-readable progress.
///
/// Both `out_time_us` and the misnamed `out_time_ms` carry microseconds.
/// Before the first frame ffmpeg prints `N/A` or a negative value.
pub fn parse_progress_line(line: &str) -> Option<FfmpegProgress> {
    let (key, value) = line.split_once('=')?;
    let value = value.trim();
    match key.trim() {
        "out_time_us" | "out_time_ms" => value
            .parse::<i64>()
            .ok()
            .filter(|us| *us >= 0)
            .map(|us| FfmpegProgress::OutTimeMs(us as u64 / 1000)),
        "progress" if value == "end" => Some(FfmpegProgress::End),
        _ => None,
    }
}

/// Build the full ffmpeg argument vector for one conversion.
pub fn build_args(
    input: &Path,
    output: &Path,
    container: Container,
    config: &ConvertConfig,
) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(input.to_string_lossy().into_owned());

    let audio_codec = config
        .audio_codec
        .clone()
        .or_else(|| container.forced_audio_codec().map(str::to_string));

    if container.is_audio_only() {
        args.push("-vn".into());
    } else if !config.reencodes_video() && !container.forces_video_reencode() && audio_codec.is_none() {
        // Pure remux. MKV can carry every stream type, so keep them all.
        if container == Container::Mkv {
            args.extend(["-map".to_string(), "0".to_string()]);
        }
        args.extend(["-c".to_string(), "copy".to_string()]);
    } else if config.reencodes_video() || container.forces_video_reencode() {
        let codec = config
            .video_codec
            .clone()
            .unwrap_or_else(|| container.default_video_codec().to_string());
        args.extend(["-c:v".to_string(), codec.clone()]);
        if let Some(crf) = config.crf {
            args.extend(["-crf".to_string(), crf.to_string()]);
            // libvpx only honours CRF in constant-quality mode.
            if codec.starts_with("libvpx") {
                args.extend(["-b:v".to_string(), "0".to_string()]);
            }
        }
        if let Some(ref preset) = config.preset {
            args.extend(["-preset".to_string(), preset.clone()]);
        }
        if let Some(h) = config.max_height {
            args.extend(["-vf".to_string(), format!("scale=-2:'min({h},ih)'")]);
        }
    } else {
        args.extend(["-c:v".to_string(), "copy".to_string()]);
    }

    if container.is_audio_only() || config.reencodes_video() || container.forces_video_reencode() || audio_codec.is_some() {
        match audio_codec {
            Some(codec) => args.extend(["-c:a".to_string(), codec]),
            None => args.extend(["-c:a".to_string(), "copy".to_string()]),
        }
    }

    if container.wants_faststart() {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }

    args.extend(
        ["-progress", "pipe:1", "-nostats"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Convert `input` into the container implied by `output`'s extension.
///
/// Progress is reported in milliseconds of media time against the source
/// duration from ffprobe.
///
/// # Errors
/// - [`KitError::FileNotFound`] / [`KitError::PermissionDenied`] for a bad input
/// - [`KitError::InvalidInput`] for an unknown container or output == input
/// - [`KitError::OutputExists`] when `output` exists and overwrite is off
/// - [`KitError::ToolNotFound`] / [`KitError::ToolFailed`] from ffmpeg
pub async fn convert(
    input: &Path,
    output: &Path,
    config: &ConvertConfig,
    progress: Option<&ProgressCallback>,
) -> Result<ConvertReport, KitError> {
    let start = Instant::now();
    let input = require_file(input)?;
    let container = Container::from_path(output)?;

    if let (Ok(a), Ok(b)) = (std::fs::canonicalize(&input), std::fs::canonicalize(output)) {
        if a == b {
            return Err(KitError::invalid(
                output.display().to_string(),
                "output would overwrite the input",
            ));
        }
    }
    prepare_output(output, config.overwrite)?;

    let source_duration_secs = match probe::duration_secs(&input).await {
        Ok(d) => d,
        Err(e) => {
            warn!("Could not read duration, progress will be indeterminate: {}", e);
            None
        }
    };

    info!(
        "Converting {} → {} ({})",
        input.display(),
        output.display(),
        if config.reencodes_video() { "re-encode" } else { "remux" }
    );

    emit(progress, |p| {
        p.on_start(
            "Converting",
            source_duration_secs.map(|d| (d * 1000.0) as u64),
        )
    });

    let args = build_args(&input, output, container, config);
    let timeout = config.timeout_secs.map(Duration::from_secs);
    let guard = OutputGuard::new(output);

    let run = run_streaming(&FFMPEG, &args, timeout, |kind, line| match kind {
        StreamKind::Stdout => match parse_progress_line(line) {
            Some(FfmpegProgress::OutTimeMs(ms)) => emit(progress, |p| p.on_position(ms)),
            Some(FfmpegProgress::End) => debug!("ffmpeg reported progress=end"),
            None => {}
        },
        StreamKind::Stderr => debug!("ffmpeg: {}", line),
    })
    .await;

    if let Err(e) = run {
        emit(progress, |p| p.on_finish(false));
        return Err(e);
    }

    let output_bytes = match ensure_non_empty(FFMPEG.name, output) {
        Ok(n) => n,
        Err(e) => {
            emit(progress, |p| p.on_finish(false));
            return Err(e);
        }
    };
    guard.commit();
    emit(progress, |p| p.on_finish(true));

    let report = ConvertReport {
        input,
        output: output.to_path_buf(),
        container,
        source_duration_secs,
        output_bytes,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Wrote {} ({} bytes) in {}ms",
        report.output.display(),
        report.output_bytes,
        report.elapsed_ms
    );
    Ok(report)
}
