use chrono::{DateTime, Local};
use envelope_core::config::PipelineConfig;
use envelope_core::error::EnvelopeError;
use envelope_core::extraction::poppler::PopplerSource;
use envelope_core::ocr::tesseract::TesseractCli;
use envelope_core::postal::PostalLookup;
use std::path::{Path, PathBuf};

use crate::output;

const TEMPLATE_FILE: &str = "template.docx";
const CONFIG_FILE: &str = "envelope.json";
const POSTAL_FILES: [&str; 2] = ["ZipCodeMap.json", "ZipCodeMap.xlsx"];

/// Files shared by every input of a batch.
struct Resources {
    template: Vec<u8>,
    postal: PostalLookup,
    config: PipelineConfig,
}

impl Resources {
    fn load(dir: &Path) -> Result<Self, EnvelopeError> {
        let template_path = dir.join(TEMPLATE_FILE);
        let template = std::fs::read(&template_path).map_err(|e| {
            EnvelopeError::Container(format!("cannot read {}: {e}", template_path.display()))
        })?;

        let postal = match POSTAL_FILES.iter().map(|f| dir.join(f)).find(|p| p.exists()) {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading postal table");
                PostalLookup::load(&path)?
            }
            None => {
                tracing::info!("no postal table next to the executable, using the built-in one");
                PostalLookup::builtin()?
            }
        };

        let config_path = dir.join(CONFIG_FILE);
        let config = if config_path.exists() {
            PipelineConfig::load(&config_path)?
        } else {
            PipelineConfig::default()
        };

        Ok(Resources {
            template,
            postal,
            config,
        })
    }
}

/// Directory holding the template and lookup tables: the executable's own.
fn resource_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `{dir}/{stem}-{YYYYMMDD_HHMMSS}.docx` beside the input.
pub fn output_path(input: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "envelope".into());
    let name = format!("{stem}-{}.docx", now.format("%Y%m%d_%H%M%S"));
    match input.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Convert every input. Returns how many inputs failed; an input failing
/// does not stop the rest of the batch.
pub fn run(inputs: &[PathBuf]) -> Result<usize, EnvelopeError> {
    let resources = Resources::load(&resource_dir())?;
    let source = PopplerSource::new();
    let ocr = TesseractCli::new();

    let mut failed = 0;
    for input in inputs {
        println!("=== {} ===\n", input.display());
        match convert_one(input, &resources, &source, &ocr) {
            Ok(out) => println!("  Written: {}\n", out.display()),
            Err(e) => {
                eprintln!("Error: {}: {e}\n", input.display());
                failed += 1;
            }
        }
    }

    Ok(failed)
}

fn convert_one(
    input: &Path,
    resources: &Resources,
    source: &PopplerSource,
    ocr: &TesseractCli,
) -> Result<PathBuf, EnvelopeError> {
    let pdf_bytes = std::fs::read(input)?;
    let conversion = envelope_core::convert(
        &pdf_bytes,
        &resources.template,
        source,
        ocr,
        &resources.postal,
        &resources.config,
    )?;

    output::table::print(&conversion);

    let out = output_path(input, Local::now());
    std::fs::write(&out, &conversion.docx)?;
    Ok(out)
}
