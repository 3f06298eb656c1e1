//! One handler per subcommand: map flags to the library config, run, report.

use crate::args::{DiagramArgs, DownloadArgs, PdfArgs, PdfOp, StressArgs, VideoArgs};
use crate::ui::{bold, cyan, dim, green, human_bytes, red, BarProgress, Unit};
use anyhow::{Context, Result};
use scriptkit::diagram::{self, kroki};
use scriptkit::pdf::{self, engine, PdfOptions};
use scriptkit::{
    download, video, Backend, DiagramConfig, DiagramKind, DownloadConfig, PdfReport,
    ProgressCallback, Rotation, StressConfig, StressTest,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Copy)]
pub struct Ctx {
    pub quiet: bool,
    pub json: bool,
    pub show_progress: bool,
}

impl Ctx {
    fn progress(&self, unit: Unit, prefix: &str) -> Option<ProgressCallback> {
        self.show_progress
            .then(|| BarProgress::new(unit, prefix) as ProgressCallback)
    }

    fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("Failed to serialise result")?
        );
        Ok(())
    }

    fn done(&self, line: String) {
        if !self.quiet && !self.json {
            eprintln!("{} {}", green("✔"), line);
        }
    }
}

// ── video ───────────────────────────────────────────────────────────────────

pub async fn video(args: VideoArgs, ctx: Ctx) -> Result<()> {
    let output = match args.output {
        Some(ref o) => o.clone(),
        None => video::derive_output(&args.input, &args.to).context("Cannot derive output path")?,
    };

    let mut builder = video::ConvertConfig::builder().overwrite(args.overwrite);
    if let Some(c) = args.video_codec {
        builder = builder.video_codec(c);
    }
    if let Some(c) = args.audio_codec {
        builder = builder.audio_codec(c);
    }
    if let Some(crf) = args.crf {
        builder = builder.crf(crf);
    }
    if let Some(p) = args.preset {
        builder = builder.preset(p);
    }
    if let Some(h) = args.max_height {
        builder = builder.max_height(h);
    }
    if let Some(t) = args.timeout {
        builder = builder.timeout_secs(t);
    }
    let config = builder.build().context("Invalid configuration")?;

    let progress = ctx.progress(Unit::Percent, "Converting");
    let report = video::convert(&args.input, &output, &config, progress.as_ref())
        .await
        .context("Video conversion failed")?;

    if ctx.json {
        return ctx.print_json(&report);
    }
    ctx.done(format!(
        "{}  {}  {}",
        bold(&report.output.display().to_string()),
        dim(&human_bytes(report.output_bytes)),
        dim(&format!("{:.1}s", report.elapsed_ms as f64 / 1000.0)),
    ));
    Ok(())
}

// ── diagram ─────────────────────────────────────────────────────────────────

pub async fn diagram(args: DiagramArgs, ctx: Ctx) -> Result<()> {
    if args.share_url {
        let kind = DiagramKind::from_path(&args.input)?;
        let source = tokio::fs::read_to_string(&args.input)
            .await
            .with_context(|| format!("Failed to read {:?}", args.input))?;
        let format = args.format.map(Into::into).unwrap_or_default();
        println!("{}", kroki::share_url(&args.kroki_url, kind, format, &source)?);
        return Ok(());
    }

    let config = DiagramConfig {
        format: args.format.map(Into::into),
        backend: if args.kroki {
            Backend::Kroki {
                base_url: args.kroki_url.clone(),
            }
        } else {
            Backend::Local
        },
        theme: args.theme,
        background: args.background,
        width: args.width,
        scale: args.scale,
        puppeteer_config: args.puppeteer_config,
        timeout_secs: args.timeout,
        overwrite: args.overwrite,
    };

    if args.input.is_dir() {
        let progress = ctx.progress(Unit::Count("diagrams"), "Rendering");
        let reports = diagram::render_dir(&args.input, args.output.as_deref(), &config, progress.as_ref())
            .await
            .context("Diagram rendering failed")?;
        if ctx.json {
            return ctx.print_json(&reports);
        }
        if !ctx.quiet {
            for r in &reports {
                eprintln!("  {} {}  {}", green("✓"), r.output.display(), dim(&human_bytes(r.bytes)));
            }
        }
        ctx.done(format!("{} diagrams rendered", bold(&reports.len().to_string())));
        return Ok(());
    }

    let report = diagram::render(&args.input, args.output.as_deref(), &config)
        .await
        .context("Diagram rendering failed")?;
    if ctx.json {
        return ctx.print_json(&report);
    }
    ctx.done(format!(
        "{}  {}  {}",
        bold(&report.output.display().to_string()),
        dim(&human_bytes(report.bytes)),
        dim(&format!("{}ms", report.elapsed_ms)),
    ));
    Ok(())
}

// ── pdf ─────────────────────────────────────────────────────────────────────

/// `<dir of input>/<stem>-<suffix>.pdf`
fn sibling(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{stem}-{suffix}.pdf"))
}

/// Directory holding `input`, `.` for bare file names.
fn parent_dir(input: &Path) -> PathBuf {
    match input.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub async fn pdf(args: PdfArgs, ctx: Ctx) -> Result<()> {
    // First run downloads PDFium (~30 MB); later runs only check the cache.
    if engine::cached_library().is_none() {
        let progress: Option<ProgressCallback> =
            (!ctx.quiet).then(|| BarProgress::new(Unit::Bytes, "PDF engine") as ProgressCallback);
        engine::ensure_library(progress.as_ref())
            .await
            .context("Failed to download PDFium engine")?;
    }

    let options = PdfOptions {
        password: args.password,
        overwrite: args.overwrite,
    };

    let report = match args.op {
        PdfOp::Info { input } => {
            let meta = pdf::inspect(&input, options.password.as_deref())
                .await
                .context("Failed to inspect PDF")?;
            if ctx.json {
                return ctx.print_json(&meta);
            }
            println!("File:         {}", input.display());
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
            if let Some(ref d) = meta.creation_date {
                println!("Created:      {}", d);
            }
            if let Some(ref d) = meta.modification_date {
                println!("Modified:     {}", d);
            }
            return Ok(());
        }
        PdfOp::Merge { inputs, output } => pdf::merge(&inputs, &output, &options).await,
        PdfOp::Split {
            input,
            output,
            every,
        } => {
            let dir = output.unwrap_or_else(|| parent_dir(&input));
            pdf::split(&input, &dir, every as usize, &options).await
        }
        PdfOp::Extract {
            input,
            pages,
            output,
        } => {
            let output = output.unwrap_or_else(|| sibling(&input, "extract"));
            pdf::extract(&input, &pages, &output, &options).await
        }
        PdfOp::Delete {
            input,
            pages,
            output,
        } => {
            let output = output.unwrap_or_else(|| sibling(&input, "delete"));
            pdf::delete(&input, &pages, &output, &options).await
        }
        PdfOp::Rotate {
            input,
            degrees,
            pages,
            output,
        } => {
            let rotation = Rotation::from_degrees(degrees)?;
            let output = output.unwrap_or_else(|| sibling(&input, "rotate"));
            pdf::rotate(&input, &pages, rotation, &output, &options).await
        }
        PdfOp::Render {
            input,
            pages,
            output,
            max_pixels,
        } => {
            let dir = output.unwrap_or_else(|| parent_dir(&input));
            let progress = ctx.progress(Unit::Count("pages"), "Rendering");
            pdf::render(&input, &pages, &dir, max_pixels, &options, progress.as_ref()).await
        }
    }
    .context("PDF operation failed")?;

    print_pdf_report(&report, ctx)
}

fn print_pdf_report(report: &PdfReport, ctx: Ctx) -> Result<()> {
    if ctx.json {
        return ctx.print_json(report);
    }
    if !ctx.quiet && report.outputs.len() > 1 {
        for path in &report.outputs {
            eprintln!("  {} {}", green("✓"), path.display());
        }
    }
    let target = match report.outputs.as_slice() {
        [single] => single.display().to_string(),
        many => format!("{} files", many.len()),
    };
    ctx.done(format!(
        "{}  {} → {} pages  →  {}",
        report.operation,
        report.pages_in,
        report.pages_out,
        bold(&target)
    ));
    Ok(())
}

// ── stress ──────────────────────────────────────────────────────────────────

pub async fn stress(args: StressArgs, ctx: Ctx) -> Result<()> {
    let mut builder = StressConfig::builder(args.url)
        .users(args.users)
        .duration_secs(args.duration)
        .ramp_up_secs(args.ramp_up)
        .delay_ms(args.delay)
        .timeout_ms(args.timeout)
        .method(args.method)
        .headers_json(args.headers)
        .body(args.body);
    if let Some(ref out) = args.output {
        builder = builder.output(out);
    }
    let config = builder.build().context("Invalid configuration")?;

    if !ctx.quiet && !ctx.json {
        eprintln!();
        eprintln!("{} Starting stress test for {}", cyan("◆"), bold(config.url.as_str()));
        eprintln!(
            "  Simulating up to {} concurrent users for {} seconds",
            config.users,
            config.duration.as_secs()
        );
        if !config.ramp_up.is_zero() {
            eprintln!("  Gradually ramping up users over {} seconds", config.ramp_up.as_secs());
        }
        eprintln!();
    }

    let test = StressTest::new(config);
    let stop = test.stop_handle();
    let quiet = ctx.quiet;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if !quiet {
                eprintln!("\n{}", red("Test interrupted by user"));
            }
            stop.stop();
        }
    });

    let progress = ctx.progress(Unit::Count("req"), "Requests");
    let report = test.run(progress.as_ref()).await.context("Stress test failed")?;

    if ctx.json {
        ctx.print_json(&report)?;
    } else if !ctx.quiet {
        println!();
        print!("{report}");
    }

    if let Some(ref path) = test.config().output {
        report.save(path).context("Failed to save results")?;
        if !ctx.quiet && !ctx.json {
            eprintln!("\nDetailed results saved to {}", path.display());
        }
    }
    Ok(())
}

// ── download ────────────────────────────────────────────────────────────────

pub async fn download(args: DownloadArgs, ctx: Ctx) -> Result<()> {
    let config = DownloadConfig {
        max_height: args.resolution,
        output_dir: args.output,
        merge_format: args.merge.into(),
        audio_only: args.audio_only,
        no_playlist: args.no_playlist,
        timeout_secs: args.timeout,
    };

    let progress = ctx.progress(Unit::Percent, "Downloading");
    let report = download::download(&args.url, &config, progress.as_ref())
        .await
        .context("Download failed")?;

    if ctx.json {
        return ctx.print_json(&report);
    }
    if !ctx.quiet {
        for file in &report.files {
            eprintln!("  {} {}", green("✓"), file.display());
        }
    }
    ctx.done(format!(
        "{} file(s) in {}",
        bold(&report.files.len().to_string()),
        dim(&format!("{:.1}s", report.elapsed_ms as f64 / 1000.0))
    ));
    Ok(())
}
