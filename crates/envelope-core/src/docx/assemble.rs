use crate::docx::merge::{self, collect_runs, merge_container, run_at_mut, scan_tags, TagMatch};
use crate::docx::package::DocxPackage;
use crate::docx::xml::{Element, Node};
use crate::docx::SubstitutionValue;
use crate::error::EnvelopeError;
use std::collections::HashMap;

const BODY: &str = "w:body";
const SECTION_PROPERTIES: &str = "w:sectPr";

/// Tag name of `name` inside the copy for record `index`.
pub fn scoped_tag_name(name: &str, index: usize) -> String {
    format!("{name}_{index}")
}

/// Produce the merged document: one copy of the template body per record,
/// each with its generic tags scoped to the record, then every body, header
/// and footer merged against `values`.
pub fn assemble_document(
    template: &[u8],
    record_count: usize,
    generic_tags: &[&str],
    values: &HashMap<String, SubstitutionValue>,
) -> Result<Vec<u8>, EnvelopeError> {
    let mut package = DocxPackage::from_bytes(template)?;
    let main = package.main_document_path()?;
    let mut document = package.read_xml(&main)?;

    let body = document
        .root
        .find_child_mut(BODY)
        .ok_or_else(|| EnvelopeError::Container(format!("{main} has no body")))?;
    replicate_body(body, record_count, generic_tags);

    for part in package.header_footer_paths(&main)? {
        let mut xml = package.read_xml(&part)?;
        let n = merge_container(&mut xml.root, values, &mut package.embedder_for(&part))?;
        tracing::debug!(part = %part, substitutions = n, "merged");
        package.write_xml(&part, &xml)?;
    }

    let n = merge_container(&mut document.root, values, &mut package.embedder_for(&main))?;
    tracing::debug!(part = %main, substitutions = n, "merged");
    package.write_xml(&main, &document)?;

    package.to_bytes()
}

/// Replace the body content with `count` scoped copies of itself. A trailing
/// section-properties element stays once, at the end.
pub fn replicate_body(body: &mut Element, count: usize, generic_tags: &[&str]) {
    let mut content = std::mem::take(&mut body.children);
    let section = content
        .iter()
        .rposition(|n| matches!(n, Node::Element(e) if e.name == SECTION_PROPERTIES))
        .map(|i| content.remove(i));

    let mut copies = Vec::with_capacity(content.len() * count + 1);
    for index in 0..count {
        let mut holder = Element::new(BODY);
        holder.children = content.clone();
        scope_tags(&mut holder, generic_tags, index);
        copies.append(&mut holder.children);
    }
    copies.extend(section);
    body.children = copies;
}

/// Rename every tag in `generic_tags` under `root` to its scoped form.
/// Works across run boundaries. Returns the number of renamed tags.
pub fn scope_tags(root: &mut Element, generic_tags: &[&str], index: usize) -> usize {
    let runs = collect_runs(root);
    let texts: Vec<&str> = runs.iter().map(|(_, t)| t.as_str()).collect();
    let suffix = scoped_tag_name("", index);

    let mut renamed = 0;
    for tag in scan_tags(&texts) {
        if !generic_tags.contains(&tag.tag_name.as_str()) {
            continue;
        }
        let Some((span, offset)) = locate(&tag, &texts) else {
            continue;
        };
        let Some(run) = run_at_mut(root, &runs[span].0) else {
            continue;
        };
        if insert_in_run(run, offset, &suffix) {
            renamed += 1;
        }
    }
    renamed
}

/// Span index and in-span byte offset of the end of the tag name.
fn locate(tag: &TagMatch, texts: &[&str]) -> Option<(usize, usize)> {
    let mut start = 0;
    for &span in &tag.spans {
        let end = start + texts[span].len();
        if start < tag.name_end && tag.name_end <= end {
            return Some((span, tag.name_end - start));
        }
        start = end;
    }
    None
}

fn insert_in_run(run: &mut Element, offset: usize, insert: &str) -> bool {
    let mut start = 0;
    for child in run.children.iter_mut() {
        let Node::Element(t) = child else { continue };
        if t.name != merge::TEXT {
            continue;
        }
        for node in t.children.iter_mut() {
            let Node::Text(s) = node else { continue };
            let end = start + s.len();
            if start < offset && offset <= end {
                s.insert_str(offset - start, insert);
                return true;
            }
            start = end;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::merge::run_text;
    use crate::docx::package::tests::build_docx;

    fn run(text: &str) -> String {
        format!("<w:r><w:t>{text}</w:t></w:r>")
    }

    fn body_of(texts: &[&str]) -> Element {
        let mut p = Element::new("w:p");
        for t in texts {
            p = p.with_child(Element::new(merge::RUN).with_child(Element::new(merge::TEXT).with_text(*t)));
        }
        Element::new(BODY).with_child(p)
    }

    fn all_run_texts(root: &Element) -> Vec<String> {
        collect_runs(root).into_iter().map(|(_, t)| t).collect()
    }

    #[test]
    fn test_scoped_tag_name() {
        assert_eq!(scoped_tag_name("zip", 0), "zip_0");
        assert_eq!(scoped_tag_name("address", 12), "address_12");
    }

    #[test]
    fn test_scope_split_tag() {
        let mut body = body_of(&["[", "$zi", "p", "$]"]);
        assert_eq!(scope_tags(&mut body, &["zip"], 3), 1);
        assert_eq!(all_run_texts(&body), vec!["[", "$zi", "p_3", "$]"]);
    }

    #[test]
    fn test_scope_ignores_other_tags() {
        let mut body = body_of(&["[$zip$]", "[$date$]"]);
        scope_tags(&mut body, &["zip"], 0);
        assert_eq!(all_run_texts(&body), vec!["[$zip_0$]", "[$date$]"]);
    }

    #[test]
    fn test_replicate_keeps_one_section() {
        let mut body = body_of(&["[$zip$]"]);
        body.children
            .push(Node::Element(Element::new(SECTION_PROPERTIES)));
        replicate_body(&mut body, 3, &["zip"]);

        let names: Vec<&str> = body.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["w:p", "w:p", "w:p", SECTION_PROPERTIES]);
        assert_eq!(all_run_texts(&body), vec!["[$zip_0$]", "[$zip_1$]", "[$zip_2$]"]);
    }

    #[test]
    fn test_assemble_document() {
        let body = format!(
            "<w:p>{}{}{}</w:p><w:p>{}</w:p>",
            run("[$"),
            run("recipient"),
            run("$]"),
            run("[$zip$]")
        );
        let header = format!("<w:p>{}</w:p>", run("[$title$]"));
        let template = build_docx(&body, &header);

        let mut values = HashMap::new();
        for (k, v) in [
            ("recipient_0", "王先生"),
            ("zip_0", "100"),
            ("recipient_1", "李小姐"),
            ("zip_1", "106"),
            ("title", "信封"),
        ] {
            values.insert(k.to_string(), SubstitutionValue::from(v));
        }

        let out = assemble_document(&template, 2, &["recipient", "zip"], &values).unwrap();
        let package = DocxPackage::from_bytes(&out).unwrap();

        let document = package.read_xml("word/document.xml").unwrap();
        let body = document.root.find_child(BODY).unwrap();
        let paragraphs: Vec<String> = body
            .child_elements()
            .filter(|e| e.name == "w:p")
            .map(|p| p.child_elements().map(run_text).collect())
            .collect();
        assert_eq!(paragraphs, vec!["王先生", "100", "李小姐", "106"]);
        assert_eq!(body.child_elements().last().unwrap().name, SECTION_PROPERTIES);

        let header = package.read_xml("word/header1.xml").unwrap();
        assert_eq!(header.root.text(), "信封");
    }

    #[test]
    fn test_assemble_rejects_non_docx() {
        let err = assemble_document(b"nope", 1, &[], &HashMap::new()).unwrap_err();
        assert!(matches!(err, EnvelopeError::Container(_)));
    }
}
