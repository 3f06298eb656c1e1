//! Local renderers: `mmdc`, `dot`, `plantuml`.

use super::{DiagramConfig, DiagramKind, ImageFormat};
use crate::error::KitError;
use crate::output::write_atomic_async;
use crate::process::{run_capture, Tool, DOT, MMDC, PLANTUML};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Program used for `kind`.
pub fn tool_for(kind: DiagramKind) -> &'static Tool {
    match kind {
        DiagramKind::Mermaid => &MMDC,
        DiagramKind::Graphviz => &DOT,
        DiagramKind::PlantUml => &PLANTUML,
    }
}

/// mermaid-cli arguments. mmdc drives a headless Chromium through puppeteer.
pub fn mmdc_args(input: &Path, output: &Path, format: ImageFormat, config: &DiagramConfig) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-o".to_string(),
        output.to_string_lossy().into_owned(),
        "-e".to_string(),
        format.extension().to_string(),
        "-q".to_string(),
    ];
    if let Some(ref theme) = config.theme {
        args.extend(["-t".to_string(), theme.clone()]);
    }
    if let Some(ref bg) = config.background {
        args.extend(["-b".to_string(), bg.clone()]);
    }
    if let Some(w) = config.width {
        args.extend(["-w".to_string(), w.to_string()]);
    }
    if let Some(s) = config.scale {
        args.extend(["-s".to_string(), s.to_string()]);
    }
    if let Some(ref p) = config.puppeteer_config {
        args.extend(["-p".to_string(), p.to_string_lossy().into_owned()]);
    }
    args
}

/// Graphviz arguments.
pub fn dot_args(input: &Path, output: &Path, format: ImageFormat, config: &DiagramConfig) -> Vec<String> {
    let mut args = vec![format!("-T{}", format.extension())];
    if let Some(ref bg) = config.background {
        args.push(format!("-Gbgcolor={bg}"));
    }
    if let Some(s) = config.scale {
        args.push(format!("-Gdpi={}", (96.0 * s).round() as u32));
    }
    args.extend([
        "-o".to_string(),
        output.to_string_lossy().into_owned(),
        input.to_string_lossy().into_owned(),
    ]);
    args
}

/// PlantUML pipe-mode arguments: source on stdin, image on stdout.
pub fn plantuml_args(format: ImageFormat, config: &DiagramConfig) -> Vec<String> {
    let mut args = vec![format!("-t{}", format.extension()), "-pipe".to_string()];
    if let Some(ref bg) = config.background {
        args.push(format!("-SbackgroundColor={bg}"));
    }
    args
}

/// Render with the local program for `kind`. Returns the program name.
pub async fn render(
    kind: DiagramKind,
    input: &Path,
    output: &Path,
    format: ImageFormat,
    config: &DiagramConfig,
) -> Result<&'static str, KitError> {
    let tool = tool_for(kind);
    let timeout = Some(Duration::from_secs(config.timeout_secs));

    match kind {
        DiagramKind::Mermaid => {
            let args = mmdc_args(input, output, format, config);
            run_capture(tool, &args, None, timeout).await?;
        }
        DiagramKind::Graphviz => {
            if config.theme.is_some() || config.width.is_some() {
                debug!("dot ignores --theme and --width");
            }
            let args = dot_args(input, output, format, config);
            run_capture(tool, &args, None, timeout).await?;
        }
        DiagramKind::PlantUml => {
            let source = tokio::fs::read(input)
                .await
                .map_err(|e| KitError::invalid(input.display().to_string(), e.to_string()))?;
            let args = plantuml_args(format, config);
            let image = run_capture(tool, &args, Some(&source), timeout).await?;
            write_atomic_async(output, &image).await?;
        }
    }
    Ok(tool.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmdc_args_include_options() {
        let config = DiagramConfig {
            theme: Some("dark".into()),
            background: Some("transparent".into()),
            width: Some(1200),
            scale: Some(2.0),
            ..Default::default()
        };
        let args = mmdc_args(Path::new("a.mmd"), Path::new("a.svg"), ImageFormat::Svg, &config);
        assert_eq!(
            args,
            vec![
                "-i", "a.mmd", "-o", "a.svg", "-e", "svg", "-q", "-t", "dark", "-b",
                "transparent", "-w", "1200", "-s", "2"
            ]
        );
    }

    #[test]
    fn dot_args_scale_to_dpi() {
        let config = DiagramConfig {
            scale: Some(1.5),
            ..Default::default()
        };
        let args = dot_args(Path::new("g.dot"), Path::new("g.png"), ImageFormat::Png, &config);
        assert_eq!(args, vec!["-Tpng", "-Gdpi=144", "-o", "g.png", "g.dot"]);
    }

    #[test]
    fn plantuml_uses_pipe_mode() {
        let args = plantuml_args(ImageFormat::Pdf, &DiagramConfig::default());
        assert_eq!(args, vec!["-tpdf", "-pipe"]);
    }

    #[test]
    fn each_kind_has_a_tool() {
        assert_eq!(tool_for(DiagramKind::Mermaid).name, "mmdc");
        assert_eq!(tool_for(DiagramKind::Graphviz).name, "dot");
        assert_eq!(tool_for(DiagramKind::PlantUml).name, "plantuml");
    }
}
