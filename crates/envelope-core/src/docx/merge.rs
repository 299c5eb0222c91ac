//! Tag-span merge engine.
//!
//! Word splits the text of a paragraph into runs (`w:r`) wherever formatting,
//! spell-check state or editing history changes, so a tag such as `[$zip$]`
//! can be spread across several runs. The engine scans the text of every run
//! in document order, reassembles tags that span runs, and rewrites the first
//! covering run with the substitution value while removing the rest.

use crate::docx::xml::{Element, Node};
use crate::docx::{ImageValue, SubstitutionValue};
use crate::error::EnvelopeError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

pub(crate) const RUN: &str = "w:r";
pub(crate) const TEXT: &str = "w:t";
const BREAK: &str = "w:br";
const RUN_PROPERTIES: &str = "w:rPr";
const HIGHLIGHT: &str = "w:highlight";

const TAG_OPEN: char = '[';
const TAG_CLOSE: char = ']';

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\$(\w+)\$\]").expect("tag pattern is valid"));

/// A tag found by [`scan_tags`].
#[derive(Debug, Clone, PartialEq)]
pub struct TagMatch {
    pub tag_name: String,
    /// Indices of the covering spans, in order.
    pub spans: Vec<usize>,
    pub reconstructed_text: String,
    /// Byte offset in `reconstructed_text` just past the tag name.
    pub name_end: usize,
}

enum ScanState {
    Idle,
    Accumulating { spans: Vec<usize>, buffer: String },
}

/// Find every well-formed tag in an ordered sequence of span texts.
///
/// A span starting with `[` opens a candidate, discarding any candidate in
/// progress. A span ending with `]` closes it; the first `[$name$]` found in
/// the accumulated text is the match, and a candidate without one is dropped.
pub fn scan_tags<S: AsRef<str>>(spans: &[S]) -> Vec<TagMatch> {
    let mut state = ScanState::Idle;
    let mut matches = Vec::new();

    for (index, text) in spans.iter().enumerate() {
        let text = text.as_ref();

        if text.starts_with(TAG_OPEN) {
            state = ScanState::Accumulating {
                spans: vec![index],
                buffer: text.to_string(),
            };
        } else if let ScanState::Accumulating { spans, buffer } = &mut state {
            spans.push(index);
            buffer.push_str(text);
        } else {
            continue;
        }

        if !text.ends_with(TAG_CLOSE) {
            continue;
        }

        if let ScanState::Accumulating { spans, buffer } = std::mem::replace(&mut state, ScanState::Idle) {
            if let Some(name) = TAG_PATTERN.captures(&buffer).and_then(|c| c.get(1)) {
                matches.push(TagMatch {
                    tag_name: name.as_str().to_string(),
                    name_end: name.end(),
                    spans,
                    reconstructed_text: buffer,
                });
            }
        }
    }

    matches
}

/// Text of a run: its direct `w:t` children, concatenated.
pub(crate) fn run_text(run: &Element) -> String {
    run.child_elements()
        .filter(|e| e.name == TEXT)
        .flat_map(|t| t.children.iter())
        .filter_map(|n| match n {
            Node::Text(s) => Some(s.as_str()),
            _ => None,
        })
        .collect()
}

/// Every run below `root` in document order, as child-index paths.
pub(crate) fn collect_runs(root: &Element) -> Vec<(Vec<usize>, String)> {
    fn walk(el: &Element, path: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, String)>) {
        for (i, child) in el.children.iter().enumerate() {
            if let Node::Element(e) = child {
                path.push(i);
                if e.name == RUN {
                    out.push((path.clone(), run_text(e)));
                }
                walk(e, path, out);
                path.pop();
            }
        }
    }
    let mut out = Vec::new();
    walk(root, &mut Vec::new(), &mut out);
    out
}

/// Follow `path` from `root`, returning the run it points at.
pub(crate) fn run_at_mut<'a>(root: &'a mut Element, path: &[usize]) -> Option<&'a mut Element> {
    let mut current = root;
    for &i in path {
        current = match current.children.get_mut(i) {
            Some(Node::Element(e)) => e,
            _ => return None,
        };
    }
    (current.name == RUN).then_some(current)
}

fn remove_run(root: &mut Element, path: &[usize]) {
    let Some((&last, parent_path)) = path.split_last() else {
        return;
    };
    let mut parent = &mut *root;
    for &i in parent_path {
        parent = match parent.children.get_mut(i) {
            Some(Node::Element(e)) => e,
            _ => return,
        };
    }
    if matches!(parent.children.get(last), Some(Node::Element(e)) if e.name == RUN) {
        parent.children.remove(last);
    }
}

/// Relationship details of an image stored in the package.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedImage {
    pub relationship_id: String,
    pub drawing_id: u32,
    pub name: String,
}

/// Stores image bytes in the document and hands back a relationship.
pub trait ImageEmbedder {
    fn embed(&mut self, image: &ImageValue) -> Result<EmbeddedImage, EnvelopeError>;
}

/// Replace every known tag under `root`. Returns the number of substitutions.
pub fn merge_container(
    root: &mut Element,
    values: &HashMap<String, SubstitutionValue>,
    embedder: &mut dyn ImageEmbedder,
) -> Result<usize, EnvelopeError> {
    let runs = collect_runs(root);
    let texts: Vec<&str> = runs.iter().map(|(_, t)| t.as_str()).collect();

    let mut substituted = 0;
    let mut doomed: Vec<&[usize]> = Vec::new();

    for tag in scan_tags(&texts) {
        let Some(value) = values.get(&tag.tag_name) else {
            tracing::debug!(tag = %tag.reconstructed_text, "no value for tag, left in place");
            continue;
        };

        let first = &runs[tag.spans[0]].0;
        let Some(run) = run_at_mut(root, first) else {
            continue;
        };
        rewrite_run(run, value, embedder)?;
        substituted += 1;

        doomed.extend(tag.spans[1..].iter().map(|&i| runs[i].0.as_slice()));
    }

    // Deepest and right-most first so earlier paths stay valid.
    doomed.sort_unstable_by(|a, b| b.cmp(a));
    for path in doomed {
        remove_run(root, path);
    }

    Ok(substituted)
}

fn rewrite_run(
    run: &mut Element,
    value: &SubstitutionValue,
    embedder: &mut dyn ImageEmbedder,
) -> Result<(), EnvelopeError> {
    run.children
        .retain(|n| matches!(n, Node::Element(e) if e.name == RUN_PROPERTIES));
    if let Some(props) = run.find_child_mut(RUN_PROPERTIES) {
        props
            .children
            .retain(|n| !matches!(n, Node::Element(e) if e.name == HIGHLIGHT));
    }

    match value {
        SubstitutionValue::Text(text) => {
            for (i, line) in text.split("\\n").enumerate() {
                if i > 0 {
                    run.children.push(Node::Element(Element::new(BREAK)));
                }
                run.children.push(Node::Element(
                    Element::new(TEXT)
                        .with_attr("xml:space", "preserve")
                        .with_text(line),
                ));
            }
        }
        SubstitutionValue::Image(image) => {
            let embedded = embedder.embed(image)?;
            run.children
                .push(Node::Element(inline_drawing(&embedded, image.width_emu(), image.height_emu())));
        }
    }
    Ok(())
}

/// `w:drawing` holding an inline picture of `cx` × `cy` EMU.
fn inline_drawing(image: &EmbeddedImage, cx: i64, cy: i64) -> Element {
    let cx = cx.to_string();
    let cy = cy.to_string();
    let id = image.drawing_id.to_string();

    let graphic_data = Element::new("a:graphicData")
        .with_attr("uri", "http://schemas.openxmlformats.org/drawingml/2006/picture")
        .with_child(
            Element::new("pic:pic")
                .with_attr("xmlns:pic", "http://schemas.openxmlformats.org/drawingml/2006/picture")
                .with_child(
                    Element::new("pic:nvPicPr")
                        .with_child(
                            Element::new("pic:cNvPr")
                                .with_attr("id", "0")
                                .with_attr("name", image.name.as_str()),
                        )
                        .with_child(Element::new("pic:cNvPicPr")),
                )
                .with_child(
                    Element::new("pic:blipFill")
                        .with_child(
                            Element::new("a:blip")
                                .with_attr("r:embed", image.relationship_id.as_str())
                                .with_attr("cstate", "none"),
                        )
                        .with_child(Element::new("a:stretch").with_child(Element::new("a:fillRect"))),
                )
                .with_child(
                    Element::new("pic:spPr")
                        .with_child(
                            Element::new("a:xfrm")
                                .with_child(Element::new("a:off").with_attr("x", "0").with_attr("y", "0"))
                                .with_child(
                                    Element::new("a:ext")
                                        .with_attr("cx", cx.as_str())
                                        .with_attr("cy", cy.as_str()),
                                ),
                        )
                        .with_child(
                            Element::new("a:prstGeom")
                                .with_attr("prst", "rect")
                                .with_child(Element::new("a:avLst")),
                        ),
                ),
        );

    let inline = Element::new("wp:inline")
        .with_attr("distT", "0")
        .with_attr("distB", "0")
        .with_attr("distL", "0")
        .with_attr("distR", "0")
        .with_child(
            Element::new("wp:extent")
                .with_attr("cx", cx.as_str())
                .with_attr("cy", cy.as_str()),
        )
        .with_child(
            Element::new("wp:effectExtent")
                .with_attr("l", "0")
                .with_attr("t", "0")
                .with_attr("r", "0")
                .with_attr("b", "0"),
        )
        .with_child(
            Element::new("wp:docPr")
                .with_attr("id", id.as_str())
                .with_attr("name", format!("Picture {id}")),
        )
        .with_child(
            Element::new("wp:cNvGraphicFramePr").with_child(
                Element::new("a:graphicFrameLocks")
                    .with_attr("noChangeAspect", "1"),
            ),
        )
        .with_child(
            Element::new("a:graphic")
                .with_attr("xmlns:a", "http://schemas.openxmlformats.org/drawingml/2006/main")
                .with_child(graphic_data),
        );

    Element::new("w:drawing").with_child(
        inline
            .with_attr(
                "xmlns:wp",
                "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing",
            )
            .with_attr(
                "xmlns:r",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
            ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml;
    use rust_decimal_macros::dec;

    /// Records embed calls without touching a package.
    #[derive(Default)]
    struct RecordingEmbedder {
        calls: usize,
    }

    impl ImageEmbedder for RecordingEmbedder {
        fn embed(&mut self, _image: &ImageValue) -> Result<EmbeddedImage, EnvelopeError> {
            self.calls += 1;
            Ok(EmbeddedImage {
                relationship_id: format!("rIdTest{}", self.calls),
                drawing_id: self.calls as u32,
                name: format!("test{}.png", self.calls),
            })
        }
    }

    fn paragraph(runs: &[&str]) -> Element {
        let mut p = Element::new("w:p");
        for text in runs {
            p = p.with_child(
                Element::new(RUN)
                    .with_child(
                        Element::new(RUN_PROPERTIES)
                            .with_child(Element::new("w:b"))
                            .with_child(Element::new(HIGHLIGHT).with_attr("w:val", "yellow")),
                    )
                    .with_child(Element::new(TEXT).with_text(*text)),
            );
        }
        Element::new("w:body").with_child(p)
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, SubstitutionValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), SubstitutionValue::from(*v)))
            .collect()
    }

    fn body_runs(body: &Element) -> Vec<&Element> {
        body.find_child("w:p").unwrap().child_elements().collect()
    }

    #[test]
    fn test_scan_single_span() {
        let found = scan_tags(&["hello ", "[$zip$]", " world"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tag_name, "zip");
        assert_eq!(found[0].spans, vec![1]);
        assert_eq!(found[0].name_end, 5);
    }

    #[test]
    fn test_scan_split_spans() {
        let found = scan_tags(&["[", "$", "recipient", "$", "]"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tag_name, "recipient");
        assert_eq!(found[0].spans, vec![0, 1, 2, 3, 4]);
        assert_eq!(found[0].reconstructed_text, "[$recipient$]");
    }

    #[test]
    fn test_scan_new_opener_discards_candidate() {
        let found = scan_tags(&["[$a", "[$b$]"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tag_name, "b");
        assert_eq!(found[0].spans, vec![1]);
    }

    #[test]
    fn test_scan_malformed_close_resets() {
        // "[x]" closes without matching; the following span must not extend it.
        let found = scan_tags(&["[x", "]", "$zip$]", "[$zip$]"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].spans, vec![3]);
    }

    #[test]
    fn test_scan_rejects_malformed_names() {
        assert!(scan_tags(&["[$zi p$]"]).is_empty());
        assert!(scan_tags(&["[$$]"]).is_empty());
        assert!(scan_tags(&["no tags here"]).is_empty());
    }

    #[test]
    fn test_scan_tag_with_trailing_text() {
        let found = scan_tags(&["[$zip$] and more]"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tag_name, "zip");
        assert_eq!(found[0].name_end, 5);
    }

    #[test]
    fn test_scan_two_tags_in_one_run_matches_first() {
        let found = scan_tags(&["[$zip$] [$address$]"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tag_name, "zip");
        assert_eq!(found[0].spans, vec![0]);
        assert_eq!(found[0].reconstructed_text, "[$zip$] [$address$]");
    }

    #[test]
    fn test_merge_split_tag_collapses_to_one_run() {
        for split in [
            vec!["[$foo$]"],
            vec!["[$", "foo$]"],
            vec!["[", "$fo", "o", "$", "]"],
        ] {
            let mut body = paragraph(&split);
            let mut embedder = RecordingEmbedder::default();
            let n = merge_container(&mut body, &values(&[("foo", "bar")]), &mut embedder).unwrap();
            assert_eq!(n, 1);

            let runs = body_runs(&body);
            assert_eq!(runs.len(), 1, "split {split:?}");
            assert_eq!(run_text(runs[0]), "bar");

            let props = runs[0].find_child(RUN_PROPERTIES).unwrap();
            assert!(props.find_child("w:b").is_some());
            assert!(props.find_child(HIGHLIGHT).is_none());
        }
    }

    #[test]
    fn test_merge_line_breaks() {
        let mut body = paragraph(&["[$address$]"]);
        let map = values(&[("address", "line1\\nline2")]);
        merge_container(&mut body, &map, &mut RecordingEmbedder::default()).unwrap();

        let run = body_runs(&body)[0];
        let names: Vec<&str> = run.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![RUN_PROPERTIES, TEXT, BREAK, TEXT]);
        assert_eq!(run_text(run), "line1line2");
    }

    #[test]
    fn test_merge_unknown_tag_untouched() {
        let mut body = paragraph(&["[$", "nobody", "$]"]);
        let before = body.clone();
        let n = merge_container(&mut body, &values(&[("zip", "100")]), &mut RecordingEmbedder::default())
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(body, before);
    }

    #[test]
    fn test_merge_several_tags_one_paragraph() {
        let mut body = paragraph(&["[$zip$]", " ", "[$", "recipient", "$]", "!"]);
        let map = values(&[("zip", "100"), ("recipient", "王先生")]);
        merge_container(&mut body, &map, &mut RecordingEmbedder::default()).unwrap();

        let texts: Vec<String> = body_runs(&body).into_iter().map(run_text).collect();
        assert_eq!(texts, vec!["100", " ", "王先生", "!"]);
    }

    #[test]
    fn test_merge_image_value() {
        let mut body = paragraph(&["[$", "address", "$]"]);
        let image = ImageValue::from_bytes(crate::docx::tiny_png(8, 2), 300)
            .unwrap()
            .with_size(dec!(15), dec!(0.6));
        let mut map = HashMap::new();
        map.insert("address".to_string(), SubstitutionValue::Image(image));

        let mut embedder = RecordingEmbedder::default();
        merge_container(&mut body, &map, &mut embedder).unwrap();
        assert_eq!(embedder.calls, 1);

        let runs = body_runs(&body);
        assert_eq!(runs.len(), 1);
        let written = xml::write(&xml::XmlDocument::new(body.clone()), "test").unwrap();
        let written = String::from_utf8(written).unwrap();
        assert!(written.contains(r#"r:embed="rIdTest1""#));
        assert!(written.contains(r#"cx="5400000""#));
        assert!(written.contains(r#"cy="216000""#));
    }

    #[test]
    fn test_runs_inside_nested_containers() {
        let table = Element::new("w:tbl").with_child(
            Element::new("w:tr").with_child(Element::new("w:tc").with_child(
                Element::new("w:p").with_child(Element::new(RUN).with_child(Element::new(TEXT).with_text("[$zip$]"))),
            )),
        );
        let mut body = Element::new("w:body").with_child(table);
        merge_container(&mut body, &values(&[("zip", "302")]), &mut RecordingEmbedder::default()).unwrap();
        assert_eq!(body.text(), "302");
    }
}
