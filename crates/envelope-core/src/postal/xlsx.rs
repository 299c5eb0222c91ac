use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};

use crate::error::EnvelopeError;
use crate::postal::{District, Region};

/// Parse a postal table from the first sheet of an xlsx workbook.
///
/// Columns: A = region, B = district, C = postal code. A first row whose
/// code cell is not numeric is treated as a header and skipped. Rows are
/// grouped by region in first-seen order.
pub fn parse_postal_xlsx(bytes: &[u8]) -> Result<Vec<Region>, EnvelopeError> {
    let cursor = Cursor::new(bytes);
    let mut workbook: Xlsx<_> = calamine::open_workbook_from_rs(cursor)
        .map_err(|e| EnvelopeError::Container(format!("failed to open xlsx: {e}")))?;

    let sheet = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EnvelopeError::Container("workbook has no sheets".into()))?
        .map_err(|e| EnvelopeError::Container(format!("failed to read first sheet: {e}")))?;

    let mut regions: Vec<Region> = Vec::new();

    for (row_idx, row) in sheet.rows().enumerate() {
        let cell = |col: usize| row.get(col).and_then(cell_as_string);
        let (Some(region), Some(district), Some(zip)) = (cell(0), cell(1), cell(2)) else {
            continue;
        };

        if !zip.chars().all(|c| c.is_ascii_digit()) {
            if row_idx == 0 {
                continue;
            }
            return Err(EnvelopeError::Container(format!(
                "row {}: postal code '{zip}' is not numeric",
                row_idx + 1
            )));
        }

        let district = District {
            name: district,
            zip,
        };
        match regions.iter_mut().find(|r| r.name == region) {
            Some(r) => r.districts.push(district),
            None => regions.push(Region {
                name: region,
                districts: vec![district],
            }),
        }
    }

    if regions.is_empty() {
        return Err(EnvelopeError::Container(
            "no postal code rows found in xlsx".into(),
        ));
    }

    Ok(regions)
}

fn cell_as_string(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Data::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Empty => None,
        _ => Some(format!("{cell}")),
    }
}
