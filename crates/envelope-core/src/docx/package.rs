use crate::docx::merge::{EmbeddedImage, ImageEmbedder};
use crate::docx::xml::{self, Element, Node, XmlDocument};
use crate::docx::ImageValue;
use crate::error::EnvelopeError;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const PACKAGE_RELS: &str = "_rels/.rels";
const CONTENT_TYPES: &str = "[Content_Types].xml";
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const FIRST_DRAWING_ID: u32 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

/// A Word document held in memory as an ordered list of zip entries.
pub struct DocxPackage {
    entries: Vec<(String, Vec<u8>)>,
    next_drawing_id: u32,
}

impl DocxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.push((file.name().to_string(), data));
        }

        let package = DocxPackage {
            entries,
            next_drawing_id: FIRST_DRAWING_ID,
        };
        if package.part(CONTENT_TYPES).is_none() {
            return Err(EnvelopeError::Container(format!("missing {CONTENT_TYPES}")));
        }
        Ok(package)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in &self.entries {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(data)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_slice())
    }

    /// Replace a part's content, appending a new entry if it does not exist.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = data,
            None => self.entries.push((name.to_string(), data)),
        }
    }

    pub fn read_xml(&self, name: &str) -> Result<XmlDocument, EnvelopeError> {
        let data = self
            .part(name)
            .ok_or_else(|| EnvelopeError::Container(format!("missing part {name}")))?;
        xml::parse(data, name)
    }

    pub fn write_xml(&mut self, name: &str, doc: &XmlDocument) -> Result<(), EnvelopeError> {
        let data = xml::write(doc, name)?;
        self.set_part(name, data);
        Ok(())
    }

    /// Relationships declared by `part` (or by the package when `part` is empty).
    pub fn relationships(&self, part: &str) -> Result<Vec<Relationship>, EnvelopeError> {
        let rels_path = rels_path_for(part);
        if self.part(&rels_path).is_none() {
            return Ok(Vec::new());
        }
        let doc = self.read_xml(&rels_path)?;
        Ok(doc
            .root
            .child_elements()
            .filter(|e| e.name == "Relationship")
            .map(|e| Relationship {
                id: e.attr("Id").unwrap_or_default().to_string(),
                rel_type: e.attr("Type").unwrap_or_default().to_string(),
                target: e.attr("Target").unwrap_or_default().to_string(),
            })
            .collect())
    }

    /// Path of the main document part, as declared in the package relationships.
    pub fn main_document_path(&self) -> Result<String, EnvelopeError> {
        self.relationships("")?
            .into_iter()
            .find(|r| r.rel_type == REL_OFFICE_DOCUMENT)
            .map(|r| resolve_target("", &r.target))
            .ok_or_else(|| EnvelopeError::Container("no main document relationship".into()))
    }

    /// Header parts followed by footer parts referenced from `main`.
    pub fn header_footer_paths(&self, main: &str) -> Result<Vec<String>, EnvelopeError> {
        let rels = self.relationships(main)?;
        let mut paths = Vec::new();
        for suffix in ["/header", "/footer"] {
            for rel in rels.iter().filter(|r| r.rel_type.ends_with(suffix)) {
                let path = resolve_target(main, &rel.target);
                if self.part(&path).is_some() && !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        Ok(paths)
    }

    /// Store an image as a new media part owned by `owner` and register it.
    pub fn add_image(
        &mut self,
        owner: &str,
        image: &ImageValue,
    ) -> Result<EmbeddedImage, EnvelopeError> {
        let dir = part_dir(owner);
        let ext = image.format.extension();

        let mut n = 1;
        let media_name = loop {
            let candidate = format!("media/envelope{n}.{ext}");
            if self.part(&format!("{dir}{candidate}")).is_none() {
                break candidate;
            }
            n += 1;
        };
        self.set_part(&format!("{dir}{media_name}"), image.data.clone());

        let relationship_id = self.add_relationship(owner, REL_IMAGE, &media_name)?;
        self.ensure_default_content_type(ext, image.format.content_type())?;

        let drawing_id = self.next_drawing_id;
        self.next_drawing_id += 1;
        tracing::debug!(owner, media = %media_name, rel = %relationship_id, "embedded image");

        Ok(EmbeddedImage {
            relationship_id,
            drawing_id,
            name: format!("envelope{n}.{ext}"),
        })
    }

    /// An embedder that places images into `owner`.
    pub fn embedder_for<'a>(&'a mut self, owner: &'a str) -> PartEmbedder<'a> {
        PartEmbedder {
            package: self,
            owner,
        }
    }

    fn add_relationship(
        &mut self,
        owner: &str,
        rel_type: &str,
        target: &str,
    ) -> Result<String, EnvelopeError> {
        let rels_path = rels_path_for(owner);
        let mut doc = match self.part(&rels_path) {
            Some(data) => xml::parse(data, &rels_path)?,
            None => XmlDocument::new(Element::new("Relationships").with_attr("xmlns", REL_NS)),
        };

        let taken: Vec<String> = doc
            .root
            .child_elements()
            .filter_map(|e| e.attr("Id").map(str::to_string))
            .collect();
        let mut n = taken.len() + 1;
        let id = loop {
            let candidate = format!("rId{n}");
            if !taken.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };

        doc.root.children.push(Node::Element(
            Element::new("Relationship")
                .with_attr("Id", id.as_str())
                .with_attr("Type", rel_type)
                .with_attr("Target", target),
        ));
        self.write_xml(&rels_path, &doc)?;
        Ok(id)
    }

    fn ensure_default_content_type(
        &mut self,
        extension: &str,
        content_type: &str,
    ) -> Result<(), EnvelopeError> {
        let mut doc = self.read_xml(CONTENT_TYPES)?;
        let present = doc.root.child_elements().any(|e| {
            e.name == "Default"
                && e.attr("Extension")
                    .is_some_and(|x| x.eq_ignore_ascii_case(extension))
        });
        if present {
            return Ok(());
        }
        let default = Element::new("Default")
            .with_attr("Extension", extension)
            .with_attr("ContentType", content_type);
        // Defaults must precede Overrides.
        let at = doc
            .root
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.name == "Override"))
            .unwrap_or(doc.root.children.len());
        doc.root.children.insert(at, Node::Element(default));
        self.write_xml(CONTENT_TYPES, &doc)
    }
}

/// [`ImageEmbedder`] bound to one part of a package.
pub struct PartEmbedder<'a> {
    package: &'a mut DocxPackage,
    owner: &'a str,
}

impl ImageEmbedder for PartEmbedder<'_> {
    fn embed(&mut self, image: &ImageValue) -> Result<EmbeddedImage, EnvelopeError> {
        self.package.add_image(self.owner, image)
    }
}

/// `word/document.xml` → `word/_rels/document.xml.rels`; `""` → `_rels/.rels`.
fn rels_path_for(part: &str) -> String {
    if part.is_empty() {
        return PACKAGE_RELS.to_string();
    }
    let (dir, file) = match part.rfind('/') {
        Some(i) => (&part[..=i], &part[i + 1..]),
        None => ("", part),
    };
    format!("{dir}_rels/{file}.rels")
}

fn part_dir(part: &str) -> &str {
    match part.rfind('/') {
        Some(i) => &part[..=i],
        None => "",
    }
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(source: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = part_dir(source).split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/header1.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml"/></Types>"#;

    pub(crate) const PACKAGE_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

    pub(crate) const DOCUMENT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/></Relationships>"#;

    /// Build a minimal docx with the given body and header XML fragments.
    pub(crate) fn build_docx(body: &str, header: &str) -> Vec<u8> {
        let w = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {w}><w:body>{body}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#
        );
        let header = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:hdr {w}>{header}</w:hdr>"#
        );

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in [
            (CONTENT_TYPES, CONTENT_TYPES_XML.to_string()),
            (PACKAGE_RELS, PACKAGE_RELS_XML.to_string()),
            ("word/document.xml", document),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML.to_string()),
            ("word/header1.xml", header),
        ] {
            writer.start_file(name, options).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_rels_path_for() {
        assert_eq!(rels_path_for(""), "_rels/.rels");
        assert_eq!(rels_path_for("word/document.xml"), "word/_rels/document.xml.rels");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
        assert_eq!(resolve_target("word/document.xml", "header1.xml"), "word/header1.xml");
        assert_eq!(resolve_target("word/document.xml", "../customXml/item1.xml"), "customXml/item1.xml");
        assert_eq!(resolve_target("word/document.xml", "/word/footer1.xml"), "word/footer1.xml");
    }

    #[test]
    fn test_open_and_locate_parts() {
        let bytes = build_docx("<w:p/>", "<w:p/>");
        let package = DocxPackage::from_bytes(&bytes).unwrap();
        let main = package.main_document_path().unwrap();
        assert_eq!(main, "word/document.xml");
        assert_eq!(package.header_footer_paths(&main).unwrap(), vec!["word/header1.xml"]);
    }

    #[test]
    fn test_not_a_zip() {
        assert!(DocxPackage::from_bytes(b"plain text").is_err());
    }

    #[test]
    fn test_add_image_registers_part_rel_and_content_type() {
        let bytes = build_docx("<w:p/>", "<w:p/>");
        let mut package = DocxPackage::from_bytes(&bytes).unwrap();
        let image = ImageValue::from_bytes(crate::docx::tiny_png(4, 4), 96)
            .unwrap()
            .with_size(dec!(1), dec!(1));

        let first = package.add_image("word/header1.xml", &image).unwrap();
        let second = package.add_image("word/header1.xml", &image).unwrap();
        assert_ne!(first.relationship_id, second.relationship_id);
        assert_ne!(first.drawing_id, second.drawing_id);

        assert!(package.part("word/media/envelope1.png").is_some());
        assert!(package.part("word/media/envelope2.png").is_some());

        let rels = package.relationships("word/header1.xml").unwrap();
        assert_eq!(rels.len(), 2);
        assert!(rels.iter().all(|r| r.rel_type == REL_IMAGE));
        assert_eq!(rels[0].target, "media/envelope1.png");

        let types = package.read_xml(CONTENT_TYPES).unwrap();
        let png_defaults = types
            .root
            .child_elements()
            .filter(|e| e.attr("Extension") == Some("png"))
            .count();
        assert_eq!(png_defaults, 1);

        let reopened = DocxPackage::from_bytes(&package.to_bytes().unwrap()).unwrap();
        assert!(reopened.part("word/media/envelope2.png").is_some());
    }
}
