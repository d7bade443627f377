//! Small query layer over parsed XML documents.
//!
//! Documents are parsed eagerly into an element arena; [`Selection`] values
//! are cheap views over sets of elements that support descendant lookups
//! (`filter`), direct-child lookups (`children`), indexed access, text values
//! and attributes.

use std::collections::HashSet;
use std::io::Read;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed xml: {0}")]
    Malformed(String),
    #[error("xml document has no root element")]
    Empty,
    #[error("failed to read xml source: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<usize>,
}

/// Parsed XML document.
#[derive(Debug)]
pub struct Document {
    elements: Vec<Element>,
    root: usize,
}

impl Document {
    /// Selection containing only the root element.
    pub fn root(&self) -> Selection<'_> {
        Selection {
            document: self,
            nodes: vec![self.root],
        }
    }
}

/// Parse an XML document held in memory.
pub fn parse(text: &str) -> Result<Document, XmlError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut elements: Vec<Element> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut root = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| XmlError::Malformed(format!("at byte {}: {err}", reader.buffer_position())))?;

        match event {
            Event::Start(start) => {
                let index = push_element(&mut elements, &open, &mut root, &start)?;
                open.push(index);
            }
            Event::Empty(start) => {
                push_element(&mut elements, &open, &mut root, &start)?;
            }
            Event::End(_) => {
                if open.pop().is_none() {
                    return Err(XmlError::Malformed("unbalanced closing tag".to_string()));
                }
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|err| XmlError::Malformed(err.to_string()))?;
                if let Some(&current) = open.last() {
                    elements[current].text.push_str(&value);
                }
            }
            Event::CData(data) => {
                if let Some(&current) = open.last() {
                    let raw = data.into_inner();
                    elements[current]
                        .text
                        .push_str(&String::from_utf8_lossy(&raw));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !open.is_empty() {
        return Err(XmlError::Malformed("unclosed element at end of input".to_string()));
    }

    let root = root.ok_or(XmlError::Empty)?;
    Ok(Document { elements, root })
}

/// Parse an XML document from any reader.
pub fn parse_reader<R: Read>(mut reader: R) -> Result<Document, XmlError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    parse(&text)
}

fn push_element(
    elements: &mut Vec<Element>,
    open: &[usize],
    root: &mut Option<usize>,
    start: &BytesStart<'_>,
) -> Result<usize, XmlError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

    let mut attrs = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|err| XmlError::Malformed(err.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|err| XmlError::Malformed(err.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }

    let index = elements.len();
    elements.push(Element {
        name,
        attrs,
        text: String::new(),
        children: Vec::new(),
    });

    match open.last() {
        Some(&parent) => elements[parent].children.push(index),
        None if root.is_none() => *root = Some(index),
        None => return Err(XmlError::Malformed("multiple root elements".to_string())),
    }

    Ok(index)
}

/// An ordered set of elements from one document.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    document: &'a Document,
    nodes: Vec<usize>,
}

impl<'a> Selection<'a> {
    /// All descendants named `name`, in document order.
    pub fn filter(&self, name: &str) -> Selection<'a> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for &node in &self.nodes {
            self.collect_descendants(node, name, &mut seen, &mut found);
        }
        self.with_nodes(found)
    }

    /// Direct children named `name`.
    pub fn children(&self, name: &str) -> Selection<'a> {
        let found = self
            .nodes
            .iter()
            .flat_map(|&node| self.document.elements[node].children.iter().copied())
            .filter(|&child| self.document.elements[child].name == name)
            .collect();
        self.with_nodes(found)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Selection<'a>> {
        self.nodes
            .get(index)
            .map(|&node| self.with_nodes(vec![node]))
    }

    pub fn iter(&self) -> impl Iterator<Item = Selection<'a>> + '_ {
        self.nodes.iter().map(|&node| self.with_nodes(vec![node]))
    }

    /// Tag name of the first element.
    pub fn name(&self) -> Option<&'a str> {
        self.first().map(|element| element.name.as_str())
    }

    /// Text content of the first element.
    pub fn value(&self) -> Option<&'a str> {
        self.first().map(|element| element.text.trim())
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.first().and_then(|element| {
            element
                .attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        })
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.first()
            .into_iter()
            .flat_map(|element| element.attrs.iter())
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    fn first(&self) -> Option<&'a Element> {
        let document: &'a Document = self.document;
        self.nodes.first().map(|&node| &document.elements[node])
    }

    fn with_nodes(&self, nodes: Vec<usize>) -> Selection<'a> {
        Selection {
            document: self.document,
            nodes,
        }
    }

    fn collect_descendants(
        &self,
        node: usize,
        name: &str,
        seen: &mut HashSet<usize>,
        found: &mut Vec<usize>,
    ) {
        for &child in &self.document.elements[node].children {
            if self.document.elements[child].name == name && seen.insert(child) {
                found.push(child);
            }
            self.collect_descendants(child, name, seen, found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML_DATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<document>
    <section id="section-0">
        <title>Section 0</title>
    </section>
    <section id="section-1">
        <title>Section 1</title>
    </section>
    <section id="section-2">
        <title>Section 2</title>
    </section>
    <section id="section-3">
        <title>Section 3</title>
    </section>
</document>"#;

    #[test]
    fn parses_from_reader() {
        let document = parse_reader(std::io::Cursor::new(XML_DATA)).expect("document parses");
        assert_eq!(document.root().name(), Some("document"));
    }

    #[test]
    fn reads_values_and_attributes() {
        let document = parse(XML_DATA).expect("document parses");
        let root = document.root();

        assert_eq!(root.filter("title").value(), Some("Section 0"));
        assert_eq!(
            root.filter("title").get(1).and_then(|title| title.value()),
            Some("Section 1")
        );

        for (index, title) in root.filter("title").iter().enumerate() {
            assert_eq!(title.value(), Some(format!("Section {index}").as_str()));
        }

        let sections = root.children("section");
        assert_eq!(sections.len(), 4);
        for (index, section) in sections.iter().enumerate() {
            assert_eq!(section.attr("id"), Some(format!("section-{index}").as_str()));
        }

        assert_eq!(root.children("title").len(), 0);
        assert!(root.children("title").value().is_none());
    }

    #[test]
    fn unescapes_text_and_attributes() {
        let document =
            parse(r#"<feed><entry kind="a&amp;b">Fish &amp; Chips<![CDATA[ <raw> ]]></entry></feed>"#)
                .expect("document parses");
        let entry = document.root().children("entry");

        assert_eq!(entry.attr("kind"), Some("a&b"));
        assert_eq!(entry.value(), Some("Fish & Chips <raw>"));
        assert_eq!(entry.attrs().collect::<Vec<_>>(), vec![("kind", "a&b")]);
    }

    #[test]
    fn self_closing_elements_are_selected() {
        let document = parse(r#"<list><item n="1"/><group><item n="2"/></group></list>"#)
            .expect("document parses");
        let items = document.root().filter("item");

        assert_eq!(items.len(), 2);
        assert_eq!(items.get(1).and_then(|item| item.attr("n")), Some("2"));
        assert!(items.get(2).is_none());
    }

    #[test]
    fn rejects_malformed_and_empty_documents() {
        assert!(matches!(
            parse("<open><inner></open>"),
            Err(XmlError::Malformed(_))
        ));
        assert!(matches!(parse("<a/><b/>"), Err(XmlError::Malformed(_))));
        assert!(matches!(parse(""), Err(XmlError::Empty)));
    }
}
