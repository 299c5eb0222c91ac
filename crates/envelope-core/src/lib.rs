pub mod config;
pub mod docx;
pub mod error;
pub mod extraction;
pub mod model;
pub mod ocr;
pub mod postal;
pub mod records;

use std::collections::HashMap;

use config::PipelineConfig;
use docx::assemble::{assemble_document, scoped_tag_name};
use docx::{ImageValue, SubstitutionValue};
use error::EnvelopeError;
use extraction::PageSource;
use model::{AddressSource, ExtractionWarning, ImageCandidate, Record, WarningKind};
use ocr::OcrEngine;
use postal::PostalLookup;

/// Records found in one PDF together with the image candidates they point
/// into and every soft problem met on the way.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub candidates: Vec<ImageCandidate>,
    pub warnings: Vec<ExtractionWarning>,
}

impl Extraction {
    /// Candidate image attached to `record`, if any.
    pub fn address_image(&self, record: &Record) -> Option<&ImageCandidate> {
        record.address_image.and_then(|i| self.candidates.get(i))
    }
}

/// Output of a full conversion.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub docx: Vec<u8>,
    pub records: Vec<Record>,
    pub warnings: Vec<ExtractionWarning>,
}

/// Read tokens and images from the PDF, assemble records and attach address
/// images to the records without inline text.
///
/// A label token ahead of any sequence token aborts the document; every
/// other problem is collected as a warning.
pub fn extract_records(
    pdf_bytes: &[u8],
    source: &dyn PageSource,
    config: &PipelineConfig,
) -> Result<Extraction, EnvelopeError> {
    let pages = source.extract_pages(pdf_bytes)?;
    tracing::info!(backend = source.backend_name(), pages = pages.len(), "extracted pages");

    let tokens = pages.iter().flat_map(|p| p.tokens.iter());
    let mut records = records::assemble_records(tokens, &config.labels)?;
    tracing::info!(records = records.len(), "assembled records");

    let (candidates, mut warnings) = extraction::raster::scan_candidates(&pages, &config.image_filter);
    tracing::info!(candidates = candidates.len(), "scanned page images");

    warnings.extend(records::associate::associate_images(
        &mut records,
        &candidates,
        &config.association,
    ));

    Ok(Extraction {
        records,
        candidates,
        warnings,
    })
}

/// Fill in recipient, OCR text and postal code for every record.
///
/// Image-backed addresses go through OCR first. OCR failures, empty OCR
/// output, postal misses and unreadable owner fields become warnings.
pub fn resolve_records(
    extraction: &mut Extraction,
    ocr: &dyn OcrEngine,
    postal: &PostalLookup,
    config: &PipelineConfig,
) {
    let mut warnings = Vec::new();

    for record in extraction.records.iter_mut() {
        let seq = record.sequence.clone();

        match records::owner_display(record, &config.labels) {
            Ok(name) => record.recipient = Some(name),
            Err(e) => warnings.push(ExtractionWarning::new(
                Some(&seq),
                WarningKind::OwnerUnavailable,
                e.to_string(),
            )),
        }

        let address = match record.address_source() {
            AddressSource::Inline => record.address.clone(),
            AddressSource::Image => {
                let candidate = record
                    .address_image
                    .and_then(|i| extraction.candidates.get(i));
                match candidate {
                    Some(candidate) => {
                        recognize_address(record, candidate, ocr, config, &mut warnings)
                    }
                    None => None,
                }
            }
            AddressSource::Missing => None,
        };

        let Some(address) = address else {
            continue;
        };

        let code = match postal.lookup(&address) {
            Ok(code) => code.to_string(),
            Err(miss) => {
                warnings.push(ExtractionWarning::new(
                    Some(&seq),
                    WarningKind::PostalMiss,
                    format!("{address}: {miss}"),
                ));
                String::new()
            }
        };
        tracing::info!(sequence = %seq, zip = %code, address = %address, "resolved");
        record.postal_code = Some(code);
    }

    extraction.warnings.extend(warnings);
}

fn recognize_address(
    record: &mut Record,
    candidate: &ImageCandidate,
    ocr: &dyn OcrEngine,
    config: &PipelineConfig,
    warnings: &mut Vec<ExtractionWarning>,
) -> Option<String> {
    let seq = record.sequence.clone();
    match ocr.recognize(&candidate.data, &config.ocr.language, config.ocr.layout) {
        Ok(text) => {
            let text = ocr::strip_whitespace(&text);
            tracing::debug!(sequence = %seq, image = %candidate.file_name, text = %text, "ocr");
            record.ocr_text = Some(text.clone());
            if text.is_empty() {
                warnings.push(ExtractionWarning::new(
                    Some(&seq),
                    WarningKind::EmptyOcr,
                    format!("no text recognised in {}", candidate.file_name),
                ));
                return None;
            }
            Some(text)
        }
        Err(e) => {
            warnings.push(ExtractionWarning::new(
                Some(&seq),
                WarningKind::OcrFailed,
                format!("{}: {e}", candidate.file_name),
            ));
            None
        }
    }
}

/// Build the tag → value map for the assembled document: three scoped
/// entries per record.
///
/// Fails only when an address image cannot be embedded.
pub fn build_value_map(
    extraction: &Extraction,
    config: &PipelineConfig,
) -> Result<HashMap<String, SubstitutionValue>, EnvelopeError> {
    let fields = &config.fields;
    let mut values = HashMap::with_capacity(extraction.records.len() * 3);

    for (i, record) in extraction.records.iter().enumerate() {
        values.insert(
            scoped_tag_name(&fields.recipient, i),
            SubstitutionValue::Text(record.recipient.clone().unwrap_or_default()),
        );
        values.insert(
            scoped_tag_name(&fields.zip, i),
            SubstitutionValue::Text(record.postal_code.clone().unwrap_or_default()),
        );

        let address = match (&record.address, extraction.address_image(record)) {
            (Some(text), _) => SubstitutionValue::Text(text.clone()),
            (None, Some(candidate)) => {
                let size = &config.address_image;
                let image = ImageValue::from_bytes(candidate.data.clone(), size.dpi)?
                    .with_size(size.width_cm, size.height_cm);
                SubstitutionValue::Image(image)
            }
            (None, None) => SubstitutionValue::Text(String::new()),
        };
        values.insert(scoped_tag_name(&fields.address, i), address);
    }

    Ok(values)
}

/// Run the whole pipeline on one PDF and merge the result into `template`.
pub fn convert(
    pdf_bytes: &[u8],
    template: &[u8],
    source: &dyn PageSource,
    ocr: &dyn OcrEngine,
    postal: &PostalLookup,
    config: &PipelineConfig,
) -> Result<Conversion, EnvelopeError> {
    let mut extraction = extract_records(pdf_bytes, source, config)?;
    if extraction.records.is_empty() {
        return Err(EnvelopeError::Extraction(
            "no owner records found in the document".into(),
        ));
    }

    resolve_records(&mut extraction, ocr, postal, config);

    let values = build_value_map(&extraction, config)?;
    let docx = assemble_document(
        template,
        extraction.records.len(),
        &config.fields.all(),
        &values,
    )?;
    tracing::info!(records = extraction.records.len(), bytes = docx.len(), "assembled document");

    Ok(Conversion {
        docx,
        records: extraction.records,
        warnings: extraction.warnings,
    })
}
