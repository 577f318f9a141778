//! Generic element tree for profile documents.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::XmlError;

/// Owned XML element with its attributes, trimmed text and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// Look up an attribute value by name.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Write the element as a complete document, one `indent` unit per depth.
    ///
    /// Elements without children are written inline with their text; elements
    /// with children wrap them on separate lines and drop their own text.
    /// `indent` must repeat a single character, or be empty for no indentation.
    pub fn to_document_string(&self, indent: &str) -> Result<String, XmlError> {
        let (indent_char, indent_size) = indent_unit(indent)?;
        let mut writer = Writer::new_with_indent(Vec::with_capacity(256), indent_char, indent_size);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|err| XmlError::Xml(err.to_string()))?;
        self.write_events(&mut writer)
            .map_err(|err| XmlError::Xml(err.to_string()))?;
        let mut out =
            String::from_utf8(writer.into_inner()).map_err(|err| XmlError::Xml(err.to_string()))?;
        out.push('\n');
        Ok(out)
    }

    fn write_events<W: Write>(&self, writer: &mut Writer<W>) -> quick_xml::Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        writer.write_event(Event::Start(start))?;
        if self.children.is_empty() {
            // An empty text event keeps the closing tag on the same line.
            writer.write_event(Event::Text(BytesText::new(&self.text)))?;
        } else {
            for child in &self.children {
                child.write_events(writer)?;
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

fn indent_unit(indent: &str) -> Result<(u8, usize), XmlError> {
    let bytes = indent.as_bytes();
    match bytes.first() {
        None => Ok((b' ', 0)),
        Some(&first) if first.is_ascii_whitespace() && bytes.iter().all(|b| *b == first) => {
            Ok((first, bytes.len()))
        }
        Some(_) => Err(XmlError::Invalid(format!(
            "indent must repeat one whitespace character, got {indent:?}"
        ))),
    }
}

/// Parse a profile document into its root element.
pub fn parse_document(xml: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => stack.push(element_from_start(&e)?),
            Ok(Event::Empty(e)) => {
                let element = element_from_start(&e)?;
                close_element(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(current) = stack.last_mut() {
                    let value = t.unescape().map_err(|err| XmlError::Xml(err.to_string()))?;
                    current.text.push_str(value.trim());
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(data.into_inner().as_ref()));
                }
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Xml("unexpected closing tag".into()))?;
                close_element(&mut stack, &mut root, element)?;
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(XmlError::Xml(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(XmlError::Xml("document ended inside an element".into()));
    }
    root.ok_or_else(|| XmlError::Xml("document has no root element".into()))
}

fn element_from_start(event: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let mut element = XmlElement::new(String::from_utf8_lossy(event.name().as_ref()));
    for attr in event.attributes() {
        let attr = attr.map_err(|err| XmlError::Xml(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Xml(err.to_string()))?;
        element.attributes.push((key, value.to_string()));
    }
    Ok(element)
}

fn close_element(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.push_child(element),
        None if root.is_some() => {
            return Err(XmlError::Xml("document has more than one root element".into()))
        }
        None => *root = Some(element),
    }
    Ok(())
}
