use crate::config::AssociationConfig;
use crate::model::{ExtractionWarning, ImageCandidate, Record, WarningKind};
use std::collections::HashSet;

/// Pick the image that holds a record's address.
///
/// Pure function over the record, the candidate list and the set of
/// candidates already taken. Returns the index of the chosen candidate.
///
/// - The last record takes the last unassigned candidate.
/// - Otherwise the first unassigned candidate on the record's page whose
///   bottom edge lies strictly between the sequence token and the id token
///   minus `vertical_margin`.
/// - Failing that, the first unassigned candidate on the next page at or
///   above the other-field token.
pub fn find_address_image(
    record: &Record,
    is_last: bool,
    candidates: &[ImageCandidate],
    assigned: &HashSet<usize>,
    config: &AssociationConfig,
) -> Option<usize> {
    let free = |i: &usize| !assigned.contains(i);

    if is_last {
        return (0..candidates.len()).rev().find(free);
    }

    if let Some(id) = &record.id_token {
        let upper = record.sequence_token.position.y;
        let lower = id.position.y - config.vertical_margin;
        let in_window = (0..candidates.len()).filter(free).find(|&i| {
            let c = &candidates[i];
            c.page == record.page && c.bottom_y < upper && c.bottom_y > lower
        });
        if in_window.is_some() {
            return in_window;
        }
    }

    let anchor = record.other_token.as_ref()?.position.y;
    (0..candidates.len()).filter(free).find(|&i| {
        let c = &candidates[i];
        c.page == record.page + 1 && c.bottom_y >= anchor
    })
}

/// Attach an address image to every record that has no inline address.
///
/// Greedy and order dependent: records are visited in order and a chosen
/// candidate is never offered again. Records left without an image produce
/// a warning.
pub fn associate_images(
    records: &mut [Record],
    candidates: &[ImageCandidate],
    config: &AssociationConfig,
) -> Vec<ExtractionWarning> {
    let mut assigned = HashSet::new();
    let mut warnings = Vec::new();
    let count = records.len();

    for (i, record) in records.iter_mut().enumerate() {
        if record.address.is_some() {
            continue;
        }

        match find_address_image(record, i + 1 == count, candidates, &assigned, config) {
            Some(idx) => {
                tracing::debug!(
                    sequence = %record.sequence,
                    image = %candidates[idx].file_name,
                    "address image associated"
                );
                assigned.insert(idx);
                record.address_image = Some(idx);
            }
            None => warnings.push(ExtractionWarning::new(
                Some(&record.sequence),
                WarningKind::UnresolvedImage,
                format!(
                    "no address text or image found for record on page {}",
                    record.page
                ),
            )),
        }
    }

    warnings
}
