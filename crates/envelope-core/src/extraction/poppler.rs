use crate::error::EnvelopeError;
use crate::extraction::{PageContent, PageImage, PageSource};
use crate::model::{BBox, Point, Token};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

/// Token/image backend built on poppler-utils.
///
/// Words and their boxes come from `pdftotext -bbox`; images and their
/// placement come from `pdftohtml -xml`. Both tools report top-left
/// coordinates, which are flipped to the bottom-left PDF convention here.
pub struct PopplerSource;

impl PopplerSource {
    pub fn new() -> Self {
        PopplerSource
    }

    /// Check if both poppler tools are available on the system.
    pub fn is_available() -> bool {
        ["pdftotext", "pdftohtml"].iter().all(|tool| {
            Command::new(tool)
                .arg("-v")
                .output()
                .map(|o| o.status.success() || !o.stderr.is_empty())
                .unwrap_or(false)
        })
    }
}

impl Default for PopplerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for PopplerSource {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<PageContent>, EnvelopeError> {
        let mut tmpfile = tempfile::Builder::new()
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| EnvelopeError::Extraction(e.to_string()))?;
        tmpfile
            .write_all(pdf_bytes)
            .map_err(|e| EnvelopeError::Extraction(e.to_string()))?;
        let pdf_path = tmpfile.path().to_path_buf();

        let output = run_tool(
            "pdftotext",
            Command::new("pdftotext").arg("-bbox").arg(&pdf_path).arg("-"),
        )?;
        let html = String::from_utf8_lossy(&output.stdout);
        let word_pages = parse_bbox_words(&html);
        tracing::debug!(pages = word_pages.len(), "pdftotext -bbox done");

        let image_dir = tempfile::tempdir().map_err(|e| EnvelopeError::Extraction(e.to_string()))?;
        let prefix = image_dir.path().join("page");
        run_tool(
            "pdftohtml",
            Command::new("pdftohtml")
                .args(["-xml", "-q", "-zoom", "1", "-fmt", "png"])
                .arg(&pdf_path)
                .arg(&prefix),
        )?;
        let xml = std::fs::read_to_string(prefix.with_extension("xml"))?;
        let image_pages = parse_image_xml(&xml)?;

        let mut pages = Vec::with_capacity(word_pages.len());
        for (i, words) in word_pages.into_iter().enumerate() {
            let page_number = i + 1;
            let height = words.height;
            let tokens = words
                .words
                .into_iter()
                .map(|w| w.into_token(page_number, height))
                .collect();

            let mut images = Vec::new();
            for placed in image_pages.iter().filter(|p| p.page_number == page_number) {
                let file_name = Path::new(&placed.src).file_name().ok_or_else(|| {
                    EnvelopeError::Extraction(format!("bad image path '{}'", placed.src))
                })?;
                let data = std::fs::read(image_dir.path().join(file_name))?;
                images.push(PageImage {
                    bounds: placed.bounds(),
                    data,
                });
            }

            pages.push(PageContent {
                page_number,
                height,
                tokens,
                images,
            });
        }

        Ok(pages)
    }

    fn backend_name(&self) -> &str {
        "poppler"
    }
}

fn run_tool(tool: &'static str, cmd: &mut Command) -> Result<Output, EnvelopeError> {
    let output = cmd.output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EnvelopeError::PopplerNotFound { tool }
        } else {
            EnvelopeError::Extraction(format!("{tool} failed: {e}"))
        }
    })?;

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(EnvelopeError::PopplerFailed { tool, code, stderr });
    }

    Ok(output)
}

#[derive(Debug, Clone)]
struct BBoxWord {
    text: String,
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
}

impl BBoxWord {
    fn into_token(self, page: usize, page_height: f32) -> Token {
        Token {
            text: self.text,
            page,
            position: Point {
                x: self.x_min,
                y: page_height - self.y_max,
            },
            bbox: BBox {
                x_min: self.x_min,
                y_min: page_height - self.y_max,
                x_max: self.x_max,
                y_max: page_height - self.y_min,
            },
        }
    }
}

#[derive(Debug, Default)]
struct BBoxPage {
    height: f32,
    words: Vec<BBoxWord>,
}

/// Parse `pdftotext -bbox` output: one `<page>` per page, one `<word>` per line.
fn parse_bbox_words(html: &str) -> Vec<BBoxPage> {
    let mut pages = Vec::new();
    let mut current: Option<BBoxPage> = None;

    for raw in html.lines() {
        let line = raw.trim();

        if line.starts_with("<page ") {
            if let Some(page) = current.take() {
                pages.push(page);
            }
            current = Some(BBoxPage {
                height: parse_attr_f32(line, "height").unwrap_or(0.0),
                words: Vec::new(),
            });
            continue;
        }

        if line.starts_with("<word ") {
            let Some(page) = current.as_mut() else {
                continue;
            };
            let text = parse_word_text(line)
                .map(|t| decode_xml_entities(&t).trim().to_string())
                .unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            if let (Some(x_min), Some(y_min), Some(x_max), Some(y_max)) = (
                parse_attr_f32(line, "xMin"),
                parse_attr_f32(line, "yMin"),
                parse_attr_f32(line, "xMax"),
                parse_attr_f32(line, "yMax"),
            ) {
                page.words.push(BBoxWord {
                    text,
                    x_min,
                    y_min,
                    x_max,
                    y_max,
                });
            }
            continue;
        }

        if line.starts_with("</page>") {
            if let Some(page) = current.take() {
                pages.push(page);
            }
        }
    }

    if let Some(page) = current.take() {
        pages.push(page);
    }

    pages
}

#[derive(Debug, Clone)]
struct PlacedImage {
    page_number: usize,
    page_height: f32,
    top: f32,
    left: f32,
    width: f32,
    height: f32,
    src: String,
}

impl PlacedImage {
    fn bounds(&self) -> BBox {
        BBox {
            x_min: self.left,
            y_min: self.page_height - (self.top + self.height),
            x_max: self.left + self.width,
            y_max: self.page_height - self.top,
        }
    }
}

/// Parse `pdftohtml -xml` output for `<image>` placements.
fn parse_image_xml(xml: &str) -> Result<Vec<PlacedImage>, EnvelopeError> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    let mut page_number = 0usize;
    let mut page_height = 0f32;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => match e.name().as_ref() {
                b"page" => {
                    page_number = xml_attr(&e, "number")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(page_number + 1);
                    page_height = xml_attr(&e, "height")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0.0);
                }
                b"image" => {
                    let num = |name: &str| xml_attr(&e, name).and_then(|v| v.parse::<f32>().ok());
                    if let (Some(top), Some(left), Some(width), Some(height), Some(src)) = (
                        num("top"),
                        num("left"),
                        num("width"),
                        num("height"),
                        xml_attr(&e, "src"),
                    ) {
                        out.push(PlacedImage {
                            page_number,
                            page_height,
                            top,
                            left,
                            width,
                            height,
                            src,
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EnvelopeError::Xml {
                    part: "pdftohtml output".into(),
                    reason: e.to_string(),
                })
            }
            _ => {}
        }
    }

    Ok(out)
}

fn xml_attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn parse_attr_f32(tag: &str, name: &str) -> Option<f32> {
    parse_attr(tag, name)?.parse().ok()
}

fn parse_attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {}=\"", name);
    let start = tag.find(&needle)? + needle.len();
    let rest = &tag[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

fn parse_word_text(word_tag: &str) -> Option<String> {
    let start = word_tag.find('>')? + 1;
    let end = word_tag.rfind("</word>")?;
    Some(word_tag[start..end].to_string())
}

fn decode_xml_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
