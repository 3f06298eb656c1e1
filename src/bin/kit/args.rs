//! Command-line surface.

use clap::{Args, Parser, Subcommand, ValueEnum};
use scriptkit::diagram::DEFAULT_KROKI_URL;
use scriptkit::pdf::DEFAULT_MAX_PIXELS;
use scriptkit::{ImageFormat, MergeFormat, PageSelection};
use std::path::PathBuf;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Remux a screen recording into MP4 (no re-encode)
  kit video capture.mkv -o capture.mp4

  # Re-encode to 720p WebM
  kit video talk.mov --to webm --max-height 720 --crf 32

  # Render a Mermaid diagram to SVG, or a whole folder through Kroki
  kit diagram flow.mmd --format svg
  kit diagram docs/diagrams/ -o build/img --kroki

  # PDF page surgery
  kit pdf merge a.pdf b.pdf -o both.pdf
  kit pdf extract report.pdf --pages 1,3,5-7 -o summary.pdf
  kit pdf rotate scan.pdf --pages 2 --degrees -90 -o fixed.pdf
  kit pdf render slides.pdf --pages 1-3 -o thumbs/

  # 50 users for 30 s, ramped over 10 s, results saved as JSON
  kit stress --url https://staging.example.com --users 50 --duration 30 \
      --ramp-up 10 --output results.json

  # Download at most 1080p into ./videos as MKV
  kit download "https://youtube.com/watch?v=XXXX" -r 1080 -m mkv -o videos

ENVIRONMENT VARIABLES:
  KIT_FFMPEG, KIT_FFPROBE   ffmpeg / ffprobe executables
  KIT_MMDC, KIT_DOT         mermaid-cli / Graphviz executables
  KIT_PLANTUML              PlantUML executable
  KIT_YT_DLP                yt-dlp executable
  KIT_KROKI_URL             Kroki server for `diagram --kroki`
  PDFIUM_LIB_PATH           Path to an existing libpdfium; skips auto-download
  KIT_PDFIUM_CACHE_DIR      Override the PDFium cache directory
  RUST_LOG                  Log filter, overrides --verbose / --quiet

  PDFium (~30 MB) is downloaded automatically on the first `kit pdf` run and
  cached under the user cache directory (scriptkit/pdfium-7690/).

  Only download videos you own or have permission to download.
"#;

/// Small media, document and web utilities.
#[derive(Parser, Debug)]
#[command(
    name = "kit",
    version,
    about = "Small media, document and web utilities",
    long_about = "Video remuxing (ffmpeg), diagram rendering (mermaid-cli, Graphviz, PlantUML \
or Kroki), PDF page manipulation (PDFium), HTTP load testing and video downloads (yt-dlp).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "KIT_VERBOSE")]
    pub verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "KIT_QUIET")]
    pub quiet: bool,

    /// Disable progress bars.
    #[arg(long, global = true, env = "KIT_NO_PROGRESS")]
    pub no_progress: bool,

    /// Print the result as JSON on stdout.
    #[arg(long, global = true, env = "KIT_JSON")]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert a video (or its audio) to another container with ffmpeg.
    Video(VideoArgs),
    /// Render Mermaid, Graphviz or PlantUML sources to PNG, SVG or PDF.
    Diagram(DiagramArgs),
    /// Inspect, merge, split, extract, delete, rotate or render PDF pages.
    Pdf(PdfArgs),
    /// Load-test a URL with concurrent simulated users.
    Stress(StressArgs),
    /// Download a video with yt-dlp.
    Download(DownloadArgs),
}

// ── video ───────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct VideoArgs {
    /// Source media file.
    pub input: PathBuf,

    /// Output file; its extension picks the container.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Target container when no output is given (written next to the input).
    #[arg(short = 't', long = "to", env = "KIT_VIDEO_TO", default_value = "mp4")]
    pub to: String,

    /// Video encoder, e.g. libx264, libx265, libvpx-vp9. Forces a re-encode.
    #[arg(long, env = "KIT_VIDEO_CODEC")]
    pub video_codec: Option<String>,

    /// Audio encoder, e.g. aac, libopus.
    #[arg(long, env = "KIT_AUDIO_CODEC")]
    pub audio_codec: Option<String>,

    /// Constant rate factor (0–51, lower is better). Forces a re-encode.
    #[arg(long, env = "KIT_VIDEO_CRF", value_parser = clap::value_parser!(u8).range(0..=51))]
    pub crf: Option<u8>,

    /// Encoder preset, e.g. veryfast, medium, slow. Forces a re-encode.
    #[arg(long, env = "KIT_VIDEO_PRESET")]
    pub preset: Option<String>,

    /// Cap output height in pixels (e.g. 1080, 720). Forces a re-encode.
    #[arg(long, env = "KIT_VIDEO_MAX_HEIGHT", value_parser = clap::value_parser!(u32).range(16..))]
    pub max_height: Option<u32>,

    /// Replace the output if it exists.
    #[arg(long)]
    pub overwrite: bool,

    /// Kill ffmpeg after this many seconds.
    #[arg(long, env = "KIT_VIDEO_TIMEOUT")]
    pub timeout: Option<u64>,
}

// ── diagram ─────────────────────────────────────────────────────────────────

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FormatArg {
    Png,
    Svg,
    Pdf,
}

impl From<FormatArg> for ImageFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Png => ImageFormat::Png,
            FormatArg::Svg => ImageFormat::Svg,
            FormatArg::Pdf => ImageFormat::Pdf,
        }
    }
}

#[derive(Args, Debug)]
pub struct DiagramArgs {
    /// Diagram source (.mmd, .dot, .puml …) or a directory of sources.
    pub input: PathBuf,

    /// Output file, or output directory when the input is a directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Image format. Default: from the output extension, else png.
    #[arg(short, long, value_enum, env = "KIT_DIAGRAM_FORMAT")]
    pub format: Option<FormatArg>,

    /// Mermaid theme: default, dark, forest, neutral.
    #[arg(long, env = "KIT_DIAGRAM_THEME")]
    pub theme: Option<String>,

    /// Background colour, e.g. white or transparent.
    #[arg(short, long, env = "KIT_DIAGRAM_BACKGROUND")]
    pub background: Option<String>,

    /// Page width in pixels (Mermaid).
    #[arg(short, long, env = "KIT_DIAGRAM_WIDTH")]
    pub width: Option<u32>,

    /// Scale factor (Mermaid scale, Graphviz DPI multiplier).
    #[arg(short, long, env = "KIT_DIAGRAM_SCALE")]
    pub scale: Option<f32>,

    /// Puppeteer JSON config for mmdc (e.g. to pass --no-sandbox).
    #[arg(long, env = "KIT_PUPPETEER_CONFIG")]
    pub puppeteer_config: Option<PathBuf>,

    /// Render through a Kroki server instead of local programs.
    #[arg(long, env = "KIT_KROKI")]
    pub kroki: bool,

    /// Kroki server used with --kroki and --share-url.
    #[arg(long, env = "KIT_KROKI_URL", default_value = DEFAULT_KROKI_URL)]
    pub kroki_url: String,

    /// Print a shareable Kroki link for the source instead of rendering.
    #[arg(long)]
    pub share_url: bool,

    /// Per-diagram timeout in seconds.
    #[arg(long, env = "KIT_DIAGRAM_TIMEOUT", default_value_t = 60)]
    pub timeout: u64,

    /// Replace outputs that exist.
    #[arg(long)]
    pub overwrite: bool,
}

// ── pdf ─────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct PdfArgs {
    #[command(subcommand)]
    pub op: PdfOp,

    /// Password for encrypted PDFs.
    #[arg(long, global = true, env = "KIT_PDF_PASSWORD")]
    pub password: Option<String>,

    /// Replace outputs that exist.
    #[arg(long, global = true)]
    pub overwrite: bool,
}

#[derive(Subcommand, Debug)]
pub enum PdfOp {
    /// Print document metadata and page count.
    Info {
        input: PathBuf,
    },
    /// Concatenate PDFs in the given order.
    Merge {
        /// Two or more PDFs.
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Split into files of N pages each (<stem>-001.pdf, …).
    Split {
        input: PathBuf,
        /// Output directory. Default: next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Pages per output file.
        #[arg(short, long, default_value_t = 1,
              value_parser = clap::value_parser!(u64).range(1..))]
        every: u64,
    },
    /// Copy selected pages into a new PDF.
    Extract {
        input: PathBuf,
        /// Pages: 5, 3-15, 7-, or 1,3,5-7.
        #[arg(short, long)]
        pages: PageSelection,
        /// Default: <stem>-extract.pdf next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove selected pages.
    Delete {
        input: PathBuf,
        /// Pages: 5, 3-15, 7-, or 1,3,5-7.
        #[arg(short, long)]
        pages: PageSelection,
        /// Default: <stem>-delete.pdf next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rotate selected pages clockwise.
    Rotate {
        input: PathBuf,
        /// 90, 180, 270 or -90.
        #[arg(short, long, allow_negative_numbers = true)]
        degrees: i32,
        /// Pages: all, 5, 3-15, 7-, or 1,3,5-7.
        #[arg(short, long, default_value = "all")]
        pages: PageSelection,
        /// Default: <stem>-rotate.pdf next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render pages to PNG (<stem>-p001.png, …).
    Render {
        input: PathBuf,
        /// Pages: all, 5, 3-15, 7-, or 1,3,5-7.
        #[arg(short, long, default_value = "all")]
        pages: PageSelection,
        /// Output directory. Default: next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Longest edge of each image in pixels.
        #[arg(long, env = "KIT_PDF_MAX_PIXELS", default_value_t = DEFAULT_MAX_PIXELS,
              value_parser = clap::value_parser!(u32).range(16..))]
        max_pixels: u32,
    },
}

// ── stress ──────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct StressArgs {
    /// Target URL to stress test.
    #[arg(long, env = "KIT_STRESS_URL")]
    pub url: String,

    /// Number of concurrent users.
    #[arg(long, env = "KIT_STRESS_USERS", default_value_t = 10)]
    pub users: usize,

    /// Test duration in seconds.
    #[arg(long, env = "KIT_STRESS_DURATION", default_value_t = 60)]
    pub duration: u64,

    /// Gradually ramp up users over this many seconds.
    #[arg(long, env = "KIT_STRESS_RAMP_UP", default_value_t = 0)]
    pub ramp_up: u64,

    /// Delay between requests for each user in milliseconds.
    #[arg(long, env = "KIT_STRESS_DELAY", default_value_t = 1000)]
    pub delay: u64,

    /// Request timeout in milliseconds.
    #[arg(long, env = "KIT_STRESS_TIMEOUT", default_value_t = 5000)]
    pub timeout: u64,

    /// Save results to a JSON file.
    #[arg(long, env = "KIT_STRESS_OUTPUT")]
    pub output: Option<PathBuf>,

    /// HTTP method (GET, POST, …).
    #[arg(long, env = "KIT_STRESS_METHOD", default_value = "GET")]
    pub method: String,

    /// HTTP headers as a JSON object.
    #[arg(long, env = "KIT_STRESS_HEADERS", default_value = "{}")]
    pub headers: String,

    /// Request body for POST/PUT/PATCH.
    #[arg(long, env = "KIT_STRESS_BODY", default_value = "")]
    pub body: String,
}

// ── download ────────────────────────────────────────────────────────────────

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum MergeArg {
    Mp4,
    Mkv,
    Webm,
}

impl From<MergeArg> for MergeFormat {
    fn from(v: MergeArg) -> Self {
        match v {
            MergeArg::Mp4 => MergeFormat::Mp4,
            MergeArg::Mkv => MergeFormat::Mkv,
            MergeArg::Webm => MergeFormat::Webm,
        }
    }
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Video URL (YouTube or any site yt-dlp supports).
    pub url: String,

    /// Maximum video height (e.g. 2160 for 4K, 1080, 720).
    #[arg(short, long, env = "KIT_DOWNLOAD_RESOLUTION")]
    pub resolution: Option<u32>,

    /// Output folder.
    #[arg(short, long, env = "KIT_DOWNLOAD_DIR", default_value = "downloads")]
    pub output: PathBuf,

    /// Merge output format.
    #[arg(short, long, value_enum, env = "KIT_DOWNLOAD_MERGE", default_value = "mp4")]
    pub merge: MergeArg,

    /// Download audio only, converted to mp3.
    #[arg(long, env = "KIT_DOWNLOAD_AUDIO_ONLY")]
    pub audio_only: bool,

    /// Download only the video when the URL also refers to a playlist.
    #[arg(long, env = "KIT_DOWNLOAD_NO_PLAYLIST")]
    pub no_playlist: bool,

    /// Kill yt-dlp after this many seconds.
    #[arg(long, env = "KIT_DOWNLOAD_TIMEOUT")]
    pub timeout: Option<u64>,
}
