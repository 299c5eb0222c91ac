pub mod poppler;
pub mod raster;

use crate::error::EnvelopeError;
use crate::model::{BBox, Token};

/// An image drawn on a page, as delivered by the source.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Bounds in page coordinates (bottom-left origin).
    pub bounds: BBox,
    /// Encoded raster (PNG, JPEG, ...).
    pub data: Vec<u8>,
}

/// Tokens and images extracted from a single page of a PDF.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub page_number: usize,
    pub height: f32,
    /// Words in reading order.
    pub tokens: Vec<Token>,
    pub images: Vec<PageImage>,
}

/// Trait for PDF token/image extraction backends.
pub trait PageSource: Send + Sync {
    /// Extract tokens and images from PDF bytes, returning one PageContent per page.
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<PageContent>, EnvelopeError>;

    /// Name of this extraction backend (for diagnostics).
    fn backend_name(&self) -> &str;
}
