//! Video container conversion via `ffmpeg`.
//!
//! ```text
//! input ──▶ ffprobe (duration) ──▶ ffmpeg -progress pipe:1 ──▶ output
//! ```
//!
//! The default is a pure remux (`-c copy`): streams are moved into the new
//! container untouched, which is fast and lossless. Any quality option
//! (codec, CRF, preset, height cap) switches the video stream to a
//! re-encode. Containers that only accept specific codecs (WebM, the
//! audio-only targets) pick a sensible encoder automatically.

pub mod probe;
pub mod transcode;

use crate::error::KitError;
use crate::input::extension_of;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub use transcode::{build_args, convert, parse_progress_line, FfmpegProgress};

/// Output container, chosen from the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    M4v,
    Mkv,
    Webm,
    Mov,
    Avi,
    Ts,
    Flv,
    Mp3,
    M4a,
    Wav,
    Ogg,
    Flac,
}

impl Container {
    pub const ALL: [Container; 13] = [
        Container::Mp4,
        Container::M4v,
        Container::Mkv,
        Container::Webm,
        Container::Mov,
        Container::Avi,
        Container::Ts,
        Container::Flv,
        Container::Mp3,
        Container::M4a,
        Container::Wav,
        Container::Ogg,
        Container::Flac,
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.extension() == ext)
    }

    /// Container for `path`, based on its extension.
    pub fn from_path(path: &Path) -> Result<Self, KitError> {
        extension_of(path)
            .and_then(|e| Self::from_extension(&e))
            .ok_or_else(|| {
                KitError::invalid(
                    path.display().to_string(),
                    format!(
                        "unsupported output container; expected one of: {}",
                        Self::ALL.map(|c| c.extension()).join(", ")
                    ),
                )
            })
    }

    pub fn extension(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::M4v => "m4v",
            Container::Mkv => "mkv",
            Container::Webm => "webm",
            Container::Mov => "mov",
            Container::Avi => "avi",
            Container::Ts => "ts",
            Container::Flv => "flv",
            Container::Mp3 => "mp3",
            Container::M4a => "m4a",
            Container::Wav => "wav",
            Container::Ogg => "ogg",
            Container::Flac => "flac",
        }
    }

    /// Audio-only targets drop the video stream (`-vn`).
    pub fn is_audio_only(self) -> bool {
        matches!(
            self,
            Container::Mp3 | Container::M4a | Container::Wav | Container::Ogg | Container::Flac
        )
    }

    /// Video encoder used when the stream cannot be copied or a re-encode
    /// was requested without naming a codec.
    pub fn default_video_codec(self) -> &'static str {
        match self {
            Container::Webm => "libvpx-vp9",
            _ => "libx264",
        }
    }

    /// Audio encoder forced by the container, if any. `None` means the
    /// source audio is copied.
    pub fn forced_audio_codec(self) -> Option<&'static str> {
        match self {
            Container::Webm => Some("libopus"),
            Container::Mp3 => Some("libmp3lame"),
            Container::M4a => Some("aac"),
            Container::Wav => Some("pcm_s16le"),
            Container::Ogg => Some("libvorbis"),
            Container::Flac => Some("flac"),
            _ => None,
        }
    }

    /// Whether video must be re-encoded even in remux mode.
    pub fn forces_video_reencode(self) -> bool {
        matches!(self, Container::Webm)
    }

    /// MP4-family containers get `-movflags +faststart` for web playback.
    pub fn wants_faststart(self) -> bool {
        matches!(self, Container::Mp4 | Container::M4v | Container::Mov)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Options for a conversion.
///
/// Built via [`ConvertConfig::builder()`] or [`ConvertConfig::default()`]
/// (pure remux, refuse to overwrite).
#[derive(Debug, Clone, Default)]
pub struct ConvertConfig {
    /// Video encoder, e.g. `libx265`. Forces a re-encode.
    pub video_codec: Option<String>,
    /// Audio encoder, e.g. `aac`.
    pub audio_codec: Option<String>,
    /// Constant rate factor, 0–51. Forces a re-encode.
    pub crf: Option<u8>,
    /// Encoder preset, e.g. `veryfast`. Forces a re-encode.
    pub preset: Option<String>,
    /// Cap on output height in pixels; width follows the aspect ratio.
    pub max_height: Option<u32>,
    /// Replace an existing output file.
    pub overwrite: bool,
    /// Kill ffmpeg after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl ConvertConfig {
    pub fn builder() -> ConvertConfigBuilder {
        ConvertConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when the video stream will be re-encoded rather than copied.
    pub fn reencodes_video(&self) -> bool {
        self.video_codec.is_some()
            || self.crf.is_some()
            || self.preset.is_some()
            || self.max_height.is_some()
    }
}

/// Builder for [`ConvertConfig`].
#[derive(Debug)]
pub struct ConvertConfigBuilder {
    config: ConvertConfig,
}

impl ConvertConfigBuilder {
    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.config.video_codec = Some(codec.into());
        self
    }

    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.config.audio_codec = Some(codec.into());
        self
    }

    pub fn crf(mut self, crf: u8) -> Self {
        self.config.crf = Some(crf);
        self
    }

    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.config.preset = Some(preset.into());
        self
    }

    pub fn max_height(mut self, height: u32) -> Self {
        self.config.max_height = Some(height);
        self
    }

    pub fn overwrite(mut self, v: bool) -> Self {
        self.config.overwrite = v;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = Some(secs);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConvertConfig, KitError> {
        let c = &self.config;
        if let Some(crf) = c.crf {
            if crf > 51 {
                return Err(KitError::InvalidConfig(format!(
                    "CRF must be 0–51, got {crf}"
                )));
            }
        }
        if let Some(h) = c.max_height {
            if h < 16 {
                return Err(KitError::InvalidConfig(format!(
                    "Height must be at least 16 px, got {h}"
                )));
            }
        }
        if c.timeout_secs == Some(0) {
            return Err(KitError::InvalidConfig("Timeout must be ≥ 1 second".into()));
        }
        Ok(self.config)
    }
}

/// Output path next to `input` with extension `ext`.
pub fn derive_output(input: &Path, ext: &str) -> Result<PathBuf, KitError> {
    let container = Container::from_extension(ext).ok_or_else(|| {
        KitError::invalid(ext, "unsupported target container")
    })?;
    let output = input.with_extension(container.extension());
    if output == input {
        return Err(KitError::invalid(
            input.display().to_string(),
            format!("input is already a .{container} file"),
        ));
    }
    Ok(output)
}

/// Result of a finished conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub container: Container,
    /// Source duration reported by ffprobe, when known.
    pub source_duration_secs: Option<f64>,
    pub output_bytes: u64,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_from_extension_is_case_insensitive() {
        assert_eq!(Container::from_extension("MKV"), Some(Container::Mkv));
        assert_eq!(Container::from_extension(".webm"), Some(Container::Webm));
        assert_eq!(Container::from_extension("docx"), None);
    }

    #[test]
    fn container_from_path_rejects_unknown() {
        let err = Container::from_path(Path::new("clip.xyz")).unwrap_err();
        assert!(err.to_string().contains("mp4"), "got: {err}");
    }

    #[test]
    fn audio_only_targets_force_codecs() {
        for c in Container::ALL {
            if c.is_audio_only() {
                assert!(c.forced_audio_codec().is_some(), "{c} needs an encoder");
            }
        }
        assert_eq!(Container::Mkv.forced_audio_codec(), None);
    }

    #[test]
    fn builder_validates_crf() {
        assert!(ConvertConfig::builder().crf(23).build().is_ok());
        assert!(ConvertConfig::builder().crf(52).build().is_err());
    }

    #[test]
    fn builder_validates_height_and_timeout() {
        assert!(ConvertConfig::builder().max_height(8).build().is_err());
        assert!(ConvertConfig::builder().timeout_secs(0).build().is_err());
        assert!(ConvertConfig::builder().max_height(720).build().is_ok());
    }

    #[test]
    fn quality_options_imply_reencode() {
        assert!(!ConvertConfig::default().reencodes_video());
        let c = ConvertConfig::builder().preset("fast").build().unwrap();
        assert!(c.reencodes_video());
    }

    #[test]
    fn derive_output_swaps_extension() {
        let out = derive_output(Path::new("/v/clip.avi"), "mp4").unwrap();
        assert_eq!(out, PathBuf::from("/v/clip.mp4"));
        assert!(derive_output(Path::new("/v/clip.mp4"), "mp4").is_err());
        assert!(derive_output(Path::new("/v/clip.mp4"), "zip").is_err());
    }
}
