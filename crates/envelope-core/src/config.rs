use crate::error::EnvelopeError;
use crate::ocr::LayoutMode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for the whole pipeline. Every field has a default matching the
/// land-title layout this tool was written for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub labels: LabelConfig,
    pub association: AssociationConfig,
    pub image_filter: ImageFilterConfig,
    pub ocr: OcrConfig,
    pub address_image: AddressImageConfig,
    pub fields: FieldNames,
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, EnvelopeError> {
        let content = std::fs::read_to_string(path).map_err(|e| EnvelopeError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| EnvelopeError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Token prefixes and offsets used by the record assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub sequence_sentinel: char,
    /// Exact length, in characters, of a sequence token.
    pub sequence_length: usize,
    pub sequence_offset: usize,
    pub sequence_width: usize,
    pub owner_prefix: String,
    pub id_prefix: String,
    pub address_prefix: String,
    pub other_prefix: String,
    /// Character of the owner token shown on the envelope.
    pub owner_name_offset: usize,
    /// Character of the id token that selects the title suffix.
    pub gender_offset: usize,
    pub male_marker: char,
    pub male_suffix: String,
    pub female_suffix: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        LabelConfig {
            sequence_sentinel: '（',
            sequence_length: 15,
            sequence_offset: 1,
            sequence_width: 4,
            owner_prefix: "所有權人".into(),
            id_prefix: "統一編號".into(),
            address_prefix: "址：".into(),
            other_prefix: "權利範圍".into(),
            owner_name_offset: 5,
            gender_offset: 6,
            male_marker: '1',
            male_suffix: "先生".into(),
            female_suffix: "小姐".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    /// Distance below the id token that still belongs to the record's window.
    pub vertical_margin: f32,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        AssociationConfig {
            vertical_margin: 30.0,
        }
    }
}

/// Which page images are kept as address candidates (pixel units).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageFilterConfig {
    /// Columns removed from the left once the trimmed width reaches this value.
    pub crop_left: u32,
    /// Exclusive lower bound on the trimmed height.
    pub min_height: u32,
    /// Exclusive upper bound on the trimmed height.
    pub max_height: u32,
    /// Integer width / height must exceed this.
    pub min_aspect: u32,
}

impl Default for ImageFilterConfig {
    fn default() -> Self {
        ImageFilterConfig {
            crop_left: 230,
            min_height: 40,
            max_height: 50,
            min_aspect: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub language: String,
    pub layout: LayoutMode,
}

impl Default for OcrConfig {
    fn default() -> Self {
        OcrConfig {
            language: "chi_tra".into(),
            layout: LayoutMode::SingleBlock,
        }
    }
}

/// Physical size of an address image placed in the output document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressImageConfig {
    pub width_cm: Decimal,
    pub height_cm: Decimal,
    pub dpi: u32,
}

impl Default for AddressImageConfig {
    fn default() -> Self {
        AddressImageConfig {
            width_cm: Decimal::new(15, 0),
            height_cm: Decimal::new(6, 1),
            dpi: 300,
        }
    }
}

/// Generic tag names used by the single-record template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub recipient: String,
    pub zip: String,
    pub address: String,
}

impl FieldNames {
    pub fn all(&self) -> [&str; 3] {
        [&self.recipient, &self.zip, &self.address]
    }
}

impl Default for FieldNames {
    fn default() -> Self {
        FieldNames {
            recipient: "recipient".into(),
            zip: "zip".into(),
            address: "address".into(),
        }
    }
}
