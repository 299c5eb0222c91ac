pub mod tesseract;

use crate::error::EnvelopeError;
use serde::{Deserialize, Serialize};

/// Page layout assumption handed to the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// Treat the image as one uniform block of text.
    SingleBlock,
    SingleLine,
    Auto,
}

/// Trait for OCR backends.
///
/// An engine failure must be an `Err`; an image with no recognisable text is
/// `Ok` with an empty string.
pub trait OcrEngine: Send + Sync {
    fn recognize(
        &self,
        image: &[u8],
        language: &str,
        layout: LayoutMode,
    ) -> Result<String, EnvelopeError>;

    /// Name of this OCR backend (for diagnostics).
    fn backend_name(&self) -> &str;
}

/// Remove every whitespace character from OCR output.
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
