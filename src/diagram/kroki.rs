//! Kroki backend: render through an HTTP service instead of local programs.
//!
//! Useful on machines without Node/Chromium/Java. The source is POSTed as
//! plain text to `{base}/{kind}/{format}`; the response body is the image.

use super::{DiagramKind, ImageFormat};
use crate::error::KitError;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use flate2::{write::ZlibEncoder, Compression};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

/// Whether Kroki can produce `format` for `kind`.
pub fn supports(kind: DiagramKind, format: ImageFormat) -> bool {
    !matches!((kind, format), (DiagramKind::Mermaid, ImageFormat::Pdf))
}

/// Render endpoint for `kind`/`format` under `base_url`.
pub fn endpoint(base_url: &str, kind: DiagramKind, format: ImageFormat) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        kind.kroki_name(),
        format.extension()
    )
}

/// Kroki's GET payload encoding: zlib (level 9) then URL-safe base64.
pub fn encode_source(source: &str) -> Result<String, KitError> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::best());
    enc.write_all(source.as_bytes())
        .map_err(|e| KitError::Internal(format!("zlib encode: {e}")))?;
    let bytes = enc
        .finish()
        .map_err(|e| KitError::Internal(format!("zlib encode: {e}")))?;
    Ok(URL_SAFE.encode(bytes))
}

/// Shareable GET URL that renders `source` on the given Kroki server.
pub fn share_url(
    base_url: &str,
    kind: DiagramKind,
    format: ImageFormat,
    source: &str,
) -> Result<String, KitError> {
    Ok(format!(
        "{}/{}",
        endpoint(base_url, kind, format),
        encode_source(source)?
    ))
}

/// POST `source` to Kroki and return the rendered bytes.
pub async fn render(
    base_url: &str,
    kind: DiagramKind,
    format: ImageFormat,
    source: &str,
    timeout_secs: u64,
) -> Result<Vec<u8>, KitError> {
    if !supports(kind, format) {
        return Err(KitError::invalid(
            format!("{kind} → {format}"),
            "Kroki cannot render this combination; use the local backend",
        ));
    }

    let url = endpoint(base_url, kind, format);
    info!("Rendering via Kroki: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| KitError::HttpFailed {
            url: url.clone(),
            reason: e.to_string(),
        })?;

    let response = client
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, "text/plain")
        .body(source.to_string())
        .send()
        .await
        .map_err(|e| KitError::HttpFailed {
            url: url.clone(),
            reason: if e.is_timeout() {
                format!("timed out after {timeout_secs}s")
            } else {
                e.to_string()
            },
        })?;

    let status = response.status();
    let bytes = response.bytes().await.map_err(|e| KitError::HttpFailed {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    if !status.is_success() {
        // Kroki puts the renderer's error message in the body.
        let detail = String::from_utf8_lossy(&bytes);
        return Err(KitError::HttpFailed {
            url,
            reason: format!("HTTP {}: {}", status, detail.trim()),
        });
    }

    debug!("Kroki returned {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint("https://kroki.io/", DiagramKind::Graphviz, ImageFormat::Svg),
            "https://kroki.io/graphviz/svg"
        );
    }

    #[test]
    fn mermaid_pdf_is_unsupported() {
        assert!(!supports(DiagramKind::Mermaid, ImageFormat::Pdf));
        assert!(supports(DiagramKind::Mermaid, ImageFormat::Svg));
        assert!(supports(DiagramKind::PlantUml, ImageFormat::Pdf));
    }

    #[test]
    fn encoded_source_inflates_back() {
        let src = "digraph G { a -> b }";
        let encoded = encode_source(src).unwrap();
        assert!(!encoded.contains('+') && !encoded.contains('/'));

        let compressed = URL_SAFE.decode(encoded).unwrap();
        let mut out = String::new();
        ZlibDecoder::new(&compressed[..]).read_to_string(&mut out).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn share_url_has_payload_segment() {
        let url = share_url(DEFAULT, DiagramKind::Mermaid, ImageFormat::Png, "graph TD; A-->B").unwrap();
        assert!(url.starts_with("https://kroki.io/mermaid/png/"));
    }

    const DEFAULT: &str = super::super::DEFAULT_KROKI_URL;

    #[tokio::test]
    async fn unsupported_combination_fails_without_network() {
        let err = render(DEFAULT, DiagramKind::Mermaid, ImageFormat::Pdf, "graph TD", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, KitError::InvalidInput { .. }));
    }
}
