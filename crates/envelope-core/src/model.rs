use std::fmt;

/// A point in page coordinates (bottom-left origin, PDF points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned box in page coordinates (bottom-left origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

/// A positioned word produced by the token source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub page: usize,
    /// Location of the first glyph.
    pub position: Point,
    pub bbox: BBox,
}

/// An image region on a page that may hold a rasterised address.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub page: usize,
    pub file_name: String,
    /// Bottom-left Y of the image bounds.
    pub bottom_y: f32,
    /// Trimmed raster, PNG encoded.
    pub data: Vec<u8>,
}

/// One owner/address entry reconstructed from the token stream.
#[derive(Debug, Clone)]
pub struct Record {
    /// 4-character code cut out of the sequence token.
    pub sequence: String,
    pub page: usize,
    pub sequence_token: Token,
    pub owner_token: Option<Token>,
    pub id_token: Option<Token>,
    pub address_token: Option<Token>,
    pub other_token: Option<Token>,
    /// Inline address with the label stripped.
    pub address: Option<String>,
    /// Index into the candidate list of the extraction this record came from.
    pub address_image: Option<usize>,
    pub ocr_text: Option<String>,
    pub postal_code: Option<String>,
    /// Owner as printed on the envelope, e.g. `王先生`.
    pub recipient: Option<String>,
}

impl Record {
    pub fn new(sequence: String, token: Token) -> Self {
        Record {
            sequence,
            page: token.page,
            sequence_token: token,
            owner_token: None,
            id_token: None,
            address_token: None,
            other_token: None,
            address: None,
            address_image: None,
            ocr_text: None,
            postal_code: None,
            recipient: None,
        }
    }

    pub fn address_source(&self) -> AddressSource {
        match (&self.address, self.address_image) {
            (Some(_), _) => AddressSource::Inline,
            (None, Some(_)) => AddressSource::Image,
            (None, None) => AddressSource::Missing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    Inline,
    Image,
    Missing,
}

impl fmt::Display for AddressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSource::Inline => f.pad("text"),
            AddressSource::Image => f.pad("image"),
            AddressSource::Missing => f.pad("missing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    ImageSkipped,
    UnresolvedImage,
    OcrFailed,
    EmptyOcr,
    PostalMiss,
    OwnerUnavailable,
}

/// A non-fatal problem found while extracting or resolving records.
#[derive(Debug, Clone)]
pub struct ExtractionWarning {
    pub sequence: Option<String>,
    pub kind: WarningKind,
    pub reason: String,
}

impl ExtractionWarning {
    /// Build a warning and emit it on the log at the same time.
    pub fn new(sequence: Option<&str>, kind: WarningKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match sequence {
            Some(seq) => tracing::warn!(sequence = seq, ?kind, "{reason}"),
            None => tracing::warn!(?kind, "{reason}"),
        }
        ExtractionWarning {
            sequence: sequence.map(str::to_string),
            kind,
            reason,
        }
    }
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sequence {
            Some(seq) => write!(f, "[{seq}] {}", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}
