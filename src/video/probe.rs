//! Media duration lookup via `ffprobe`.
//!
//! Only used to size the progress bar; a missing ffprobe or a stream without
//! a duration (live captures, some raw formats) leaves the bar indeterminate.

use crate::error::KitError;
use crate::process::{run_capture, FFPROBE};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Container duration of `input` in seconds, or `None` if unknown.
pub async fn duration_secs(input: &Path) -> Result<Option<f64>, KitError> {
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        input.to_string_lossy().into_owned(),
    ];
    let stdout = run_capture(&FFPROBE, &args, None, Some(Duration::from_secs(30))).await?;
    let duration = parse_duration(&String::from_utf8_lossy(&stdout));
    debug!("ffprobe duration for {}: {:?}", input.display(), duration);
    Ok(duration)
}

/// Parse ffprobe's bare duration output (`"12.345000\n"`, or `"N/A"`).
pub fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}
