pub mod xlsx;

use crate::error::EnvelopeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

const BUILTIN_ZIP_CODES_JSON: &str = include_str!("../../data/zip-codes.json");

/// Characters that end a region or district name in a postal address.
const SEPARATORS: &[char] = &['市', '縣', '區', '鎮', '鄉'];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct District {
    pub name: String,
    pub zip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub districts: Vec<District>,
}

/// Why an address could not be mapped to a postal code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostalMiss {
    TooFewSegments,
    UnknownRegion(String),
    UnknownDistrict { region: String, district: String },
}

impl fmt::Display for PostalMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostalMiss::TooFewSegments => write!(f, "address has no region/district part"),
            PostalMiss::UnknownRegion(region) => write!(f, "unknown region '{region}'"),
            PostalMiss::UnknownDistrict { region, district } => {
                write!(f, "{region} has no district '{district}'")
            }
        }
    }
}

/// Immutable region → district → postal code table.
#[derive(Debug, Clone)]
pub struct PostalLookup {
    regions: Vec<Region>,
}

impl PostalLookup {
    pub fn new(regions: Vec<Region>) -> Self {
        PostalLookup { regions }
    }

    /// The table shipped with the crate.
    pub fn builtin() -> Result<Self, EnvelopeError> {
        Self::from_json_str(BUILTIN_ZIP_CODES_JSON)
    }

    /// Parse a table from JSON: `[{"name": .., "districts": [{"name": .., "zip": ..}]}]`.
    pub fn from_json_str(json: &str) -> Result<Self, EnvelopeError> {
        let regions: Vec<Region> = serde_json::from_str(json)?;
        Ok(Self::new(regions))
    }

    /// Load a table from a `.json` or `.xlsx` file.
    pub fn load(path: &Path) -> Result<Self, EnvelopeError> {
        let load_error = |reason: String| EnvelopeError::PostalLoad {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|e| load_error(e.to_string()))?;

        let is_xlsx = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("xlsx"))
            .unwrap_or(false);

        let regions = if is_xlsx {
            xlsx::parse_postal_xlsx(&bytes).map_err(|e| load_error(e.to_string()))?
        } else {
            serde_json::from_slice(&bytes).map_err(|e| load_error(e.to_string()))?
        };
        Ok(Self::new(regions))
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Find the postal code for a full address.
    ///
    /// The address is cut at region/district suffix characters; the first
    /// piece selects regions whose name contains it, the second selects a
    /// district whose name contains it. Regions are tried in table order and
    /// the first one holding a matching district wins.
    pub fn lookup(&self, address: &str) -> Result<&str, PostalMiss> {
        let address = normalize(address);
        let mut segments = address.split(SEPARATORS).filter(|s| !s.is_empty());
        let (Some(region_key), Some(district_key)) = (segments.next(), segments.next()) else {
            return Err(PostalMiss::TooFewSegments);
        };

        let mut region_found = None;
        for region in self
            .regions
            .iter()
            .filter(|r| normalize(&r.name).contains(region_key))
        {
            if let Some(d) = region
                .districts
                .iter()
                .find(|d| normalize(&d.name).contains(district_key))
            {
                return Ok(&d.zip);
            }
            tracing::debug!(region = %region.name, district = district_key, "district not found");
            region_found.get_or_insert(region.name.clone());
        }

        match region_found {
            Some(region) => Err(PostalMiss::UnknownDistrict {
                region,
                district: district_key.to_string(),
            }),
            None => Err(PostalMiss::UnknownRegion(region_key.to_string())),
        }
    }
}

/// `臺` and `台` are interchangeable in place names.
fn normalize(s: &str) -> String {
    s.replace('臺', "台")
}
