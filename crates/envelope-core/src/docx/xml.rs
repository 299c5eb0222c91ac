use crate::error::EnvelopeError;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// A node of an owned XML tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    /// Raw comment body, written back unchanged.
    Comment(String),
}

/// An element with qualified name, attributes in document order and children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    pub fn find_child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Element(e) => e.collect_text(out),
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                Node::Comment(_) => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// A parsed XML part: optional declaration plus the root element.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub declaration: Option<Declaration>,
    pub root: Element,
}

impl XmlDocument {
    pub fn new(root: Element) -> Self {
        XmlDocument {
            declaration: Some(Declaration {
                version: "1.0".into(),
                encoding: Some("UTF-8".into()),
                standalone: Some("yes".into()),
            }),
            root,
        }
    }
}

/// Parse a UTF-8 XML part into an owned tree. `part` names the source in errors.
pub fn parse(bytes: &[u8], part: &str) -> Result<XmlDocument, EnvelopeError> {
    let xml_error = |reason: String| EnvelopeError::Xml {
        part: part.to_string(),
        reason,
    };

    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| xml_error(e.to_string()))?;
    let mut reader = Reader::from_str(text);

    let mut declaration = None;
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        let event = reader.read_event().map_err(|e| xml_error(e.to_string()))?;
        match event {
            Event::Decl(d) => {
                let lossy = |b: &[u8]| String::from_utf8_lossy(b).into_owned();
                declaration = Some(Declaration {
                    version: d
                        .version()
                        .map(|v| lossy(&v))
                        .map_err(|e| xml_error(e.to_string()))?,
                    encoding: d.encoding().and_then(|r| r.ok()).map(|v| lossy(&v)),
                    standalone: d.standalone().and_then(|r| r.ok()).map(|v| lossy(&v)),
                });
            }
            Event::Start(e) => stack.push(start_element(&e).map_err(xml_error)?),
            Event::Empty(e) => {
                let el = start_element(&e).map_err(xml_error)?;
                attach(&mut stack, &mut root, el);
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| xml_error("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, el);
            }
            Event::Text(t) => {
                if let Some(parent) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| xml_error(e.to_string()))?;
                    parent.children.push(Node::Text(text.into_owned()));
                }
            }
            Event::CData(c) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    parent.children.push(Node::CData(text));
                }
            }
            Event::Comment(c) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    parent.children.push(Node::Comment(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(xml_error("unclosed element at end of input".into()));
    }

    let root = root.ok_or_else(|| xml_error("no root element".into()))?;
    Ok(XmlDocument { declaration, root })
}

fn start_element(e: &BytesStart<'_>) -> Result<Element, String> {
    let mut el = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => *root = Some(el),
    }
}

/// Serialize a tree back to bytes.
pub fn write(doc: &XmlDocument, part: &str) -> Result<Vec<u8>, EnvelopeError> {
    let mut writer = Writer::new(Vec::new());
    let result = match &doc.declaration {
        Some(decl) => emit(
            &mut writer,
            Event::Decl(BytesDecl::new(
                &decl.version,
                decl.encoding.as_deref(),
                decl.standalone.as_deref(),
            )),
        ),
        None => Ok(()),
    }
    .and_then(|()| write_element(&mut writer, &doc.root));

    result.map_err(|reason| EnvelopeError::Xml {
        part: part.to_string(),
        reason,
    })?;
    Ok(writer.into_inner())
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), String> {
    writer.write_event(event).map_err(|e| e.to_string())
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<(), String> {
    let mut start = BytesStart::new(el.name.as_str());
    for (k, v) in &el.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    if el.children.is_empty() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    for child in &el.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => emit(writer, Event::Text(BytesText::new(t)))?,
            Node::CData(t) => emit(writer, Event::CData(BytesCData::new(t.as_str())))?,
            Node::Comment(t) => emit(writer, Event::Comment(BytesText::from_escaped(t.as_str())))?,
        }
    }
    emit(writer, Event::End(BytesEnd::new(el.name.as_str())))
}
