use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("PDF extraction failed: {0}")]
    Extraction(String),

    #[error("{tool} not found. Install poppler: brew install poppler (macOS) or apt install poppler-utils (Linux)")]
    PopplerNotFound { tool: &'static str },

    #[error("{tool} failed with exit code {code}: {stderr}")]
    PopplerFailed {
        tool: &'static str,
        code: i32,
        stderr: String,
    },

    #[error("tesseract not found. Install it with the chi_tra language data: apt install tesseract-ocr tesseract-ocr-chi-tra")]
    TesseractNotFound,

    #[error("tesseract failed with exit code {code}: {stderr}")]
    TesseractFailed { code: i32, stderr: String },

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("label token '{token}' on page {page} appears before any sequence token")]
    OrphanLabel { token: String, page: usize },

    #[error("record {sequence}: {reason}")]
    RecordField { sequence: String, reason: String },

    #[error("unsupported image type: {0}")]
    UnsupportedImage(String),

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("invalid document container: {0}")]
    Container(String),

    #[error("XML error in {part}: {reason}")]
    Xml { part: String, reason: String },

    #[error("failed to load postal table from {path}: {reason}")]
    PostalLoad { path: PathBuf, reason: String },

    #[error("failed to load configuration from {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<zip::result::ZipError> for EnvelopeError {
    fn from(e: zip::result::ZipError) -> Self {
        EnvelopeError::Container(e.to_string())
    }
}
