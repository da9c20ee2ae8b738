//! Pairing token → displayable payload.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cb_domain::config::ArtifactFormat;
use qrcode::render::svg;
use qrcode::QrCode;

#[derive(thiserror::Error, Debug)]
#[error("render pairing token: {0}")]
pub struct RenderError(pub String);

/// Pure function from a pairing token to what the user is shown.
pub trait PairingRenderer: Send + Sync + 'static {
    fn render(&self, token: &str) -> Result<String, RenderError>;
}

/// Renders the token as a QR code, returned as an SVG `data:` URL that can
/// be dropped straight into an `<img src>`.
#[derive(Debug, Clone)]
pub struct QrSvgRenderer {
    min_size: u32,
}

impl Default for QrSvgRenderer {
    fn default() -> Self {
        Self { min_size: 200 }
    }
}

impl PairingRenderer for QrSvgRenderer {
    fn render(&self, token: &str) -> Result<String, RenderError> {
        let code = QrCode::new(token.as_bytes()).map_err(|e| RenderError(e.to_string()))?;
        let image = code
            .render::<svg::Color<'_>>()
            .min_dimensions(self.min_size, self.min_size)
            .build();
        Ok(format!(
            "data:image/svg+xml;base64,{}",
            BASE64.encode(image.as_bytes())
        ))
    }
}

/// Hands the raw token through unchanged.
#[derive(Debug, Clone, Default)]
pub struct TextRenderer;

impl PairingRenderer for TextRenderer {
    fn render(&self, token: &str) -> Result<String, RenderError> {
        Ok(token.to_owned())
    }
}

/// Renderer for the configured artifact format.
pub fn renderer_for(format: ArtifactFormat) -> Arc<dyn PairingRenderer> {
    match format {
        ArtifactFormat::SvgDataUrl => Arc::new(QrSvgRenderer::default()),
        ArtifactFormat::Text => Arc::new(TextRenderer),
    }
}
