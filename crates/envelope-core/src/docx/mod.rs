//! Word document handling: the zip container, an owned XML tree, the
//! tag-span merge engine and the multi-record assembler.

pub mod assemble;
pub mod merge;
pub mod package;
pub mod xml;

use crate::error::EnvelopeError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::io::Cursor;

/// English Metric Units per centimetre.
const EMU_PER_CM: i64 = 360_000;

/// Image encodings that may be embedded in the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
}

impl EmbedFormat {
    pub fn extension(self) -> &'static str {
        match self {
            EmbedFormat::Png => "png",
            EmbedFormat::Jpeg => "jpeg",
            EmbedFormat::Gif => "gif",
            EmbedFormat::Bmp => "bmp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            EmbedFormat::Png => "image/png",
            EmbedFormat::Jpeg => "image/jpeg",
            EmbedFormat::Gif => "image/gif",
            EmbedFormat::Bmp => "image/bmp",
        }
    }

    fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(EmbedFormat::Png),
            image::ImageFormat::Jpeg => Some(EmbedFormat::Jpeg),
            image::ImageFormat::Gif => Some(EmbedFormat::Gif),
            image::ImageFormat::Bmp => Some(EmbedFormat::Bmp),
            _ => None,
        }
    }
}

/// An image to be placed inline in place of a tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageValue {
    pub data: Vec<u8>,
    pub format: EmbedFormat,
    pub width_cm: Decimal,
    pub height_cm: Decimal,
}

impl ImageValue {
    /// Decode just enough of `data` to learn its format and pixel size.
    /// The display size defaults to the natural size at `dpi`.
    pub fn from_bytes(data: Vec<u8>, dpi: u32) -> Result<Self, EnvelopeError> {
        if dpi == 0 {
            return Err(EnvelopeError::Image("dpi must be positive".into()));
        }

        let guessed =
            image::guess_format(&data).map_err(|e| EnvelopeError::UnsupportedImage(e.to_string()))?;
        let format = EmbedFormat::from_image_format(guessed).ok_or_else(|| {
            EnvelopeError::UnsupportedImage(format!("{guessed:?} cannot be embedded"))
        })?;

        let (width_px, height_px) = image::ImageReader::new(Cursor::new(&data))
            .with_guessed_format()
            .map_err(|e| EnvelopeError::Image(e.to_string()))?
            .into_dimensions()
            .map_err(|e| EnvelopeError::Image(e.to_string()))?;

        let to_cm = |px: u32| Decimal::from(px) / Decimal::from(dpi) * Decimal::new(254, 2);
        Ok(ImageValue {
            width_cm: to_cm(width_px),
            height_cm: to_cm(height_px),
            data,
            format,
        })
    }

    pub fn with_size(mut self, width_cm: Decimal, height_cm: Decimal) -> Self {
        self.width_cm = width_cm;
        self.height_cm = height_cm;
        self
    }

    pub fn width_emu(&self) -> i64 {
        cm_to_emu(self.width_cm)
    }

    pub fn height_emu(&self) -> i64 {
        cm_to_emu(self.height_cm)
    }
}

fn cm_to_emu(cm: Decimal) -> i64 {
    (cm * Decimal::from(EMU_PER_CM))
        .round()
        .to_i64()
        .unwrap_or_default()
}

/// What a tag is replaced with.
#[derive(Debug, Clone, PartialEq)]
pub enum SubstitutionValue {
    /// Text; the two-character sequence `\n` marks a line break.
    Text(String),
    Image(ImageValue),
}

impl From<&str> for SubstitutionValue {
    fn from(s: &str) -> Self {
        SubstitutionValue::Text(s.to_string())
    }
}

impl From<String> for SubstitutionValue {
    fn from(s: String) -> Self {
        SubstitutionValue::Text(s)
    }
}

#[cfg(test)]
pub(crate) fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}
