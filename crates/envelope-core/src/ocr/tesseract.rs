use crate::error::EnvelopeError;
use crate::ocr::{LayoutMode, OcrEngine};
use std::io::Write;
use std::process::Command;

/// OCR backend that shells out to the `tesseract` CLI.
///
/// Runs the legacy engine (`--oem 0`), which the traditional-Chinese
/// training data was tuned for.
pub struct TesseractCli {
    binary: String,
}

impl TesseractCli {
    pub fn new() -> Self {
        TesseractCli {
            binary: "tesseract".into(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        TesseractCli {
            binary: binary.into(),
        }
    }

    /// Check if tesseract is available on the system.
    pub fn is_available() -> bool {
        Command::new("tesseract")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new()
    }
}

fn page_seg_mode(layout: LayoutMode) -> &'static str {
    match layout {
        LayoutMode::Auto => "3",
        LayoutMode::SingleBlock => "6",
        LayoutMode::SingleLine => "7",
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(
        &self,
        image: &[u8],
        language: &str,
        layout: LayoutMode,
    ) -> Result<String, EnvelopeError> {
        let mut tmpfile = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(|e| EnvelopeError::Ocr(e.to_string()))?;
        tmpfile
            .write_all(image)
            .map_err(|e| EnvelopeError::Ocr(e.to_string()))?;

        let output = Command::new(&self.binary)
            .arg(tmpfile.path())
            .arg("stdout")
            .args(["-l", language])
            .args(["--oem", "0"])
            .args(["--psm", page_seg_mode(layout)])
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EnvelopeError::TesseractNotFound
                } else {
                    EnvelopeError::Ocr(format!("tesseract failed: {}", e))
                }
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(EnvelopeError::TesseractFailed { code, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn backend_name(&self) -> &str {
        "tesseract"
    }
}
