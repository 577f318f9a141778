//! Load and pre-parse parameter template descriptions using quick-xml.
//!
//! A template describes the schema tree a user fills in: branches group
//! other nodes, leaves carry a declared value type, an input kind and an
//! optional restriction set. Profile documents (the filled-in values) are
//! handled by [`XmlElement`] and [`parse_document`].

use std::future::Future;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::debug;

mod document;

pub use document::{parse_document, XmlElement};

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml: {0}")]
    Xml(String),
    #[error("invalid template: {0}")]
    Invalid(String),
    #[error("transport: {0}")]
    Transport(String),
}

/// Upper occurrence bound declared for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurs {
    Bounded(u32),
    Unbounded,
}

impl Occurs {
    /// A node may be repeated when its upper bound is anything but one.
    pub fn is_repeatable(&self) -> bool {
        !matches!(self, Occurs::Bounded(1))
    }

    /// Whether `count` occurrences fit under this bound.
    pub fn allows(&self, count: usize) -> bool {
        match self {
            Occurs::Bounded(max) => count <= *max as usize,
            Occurs::Unbounded => true,
        }
    }
}

/// How the value of a leaf is entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputDecl {
    /// Display-only leaf, for example the marker left by a choice.
    None,
    /// Free text field.
    Text,
    /// Drop-down selection among fixed options.
    Select(Vec<String>),
    /// File upload field.
    File,
}

/// Leaf payload declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafDecl {
    /// Declared primitive type such as `xs:double` or `integerList`.
    pub value_type: String,
    pub input: InputDecl,
    /// The leaf has a companion unit field.
    pub unit: bool,
    /// Raw restriction set, a flat JSON object keyed by `xs:*` facet names.
    pub restrictions: Option<String>,
    /// Initial value filled in when the tree is built.
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    Leaf(LeafDecl),
    Branch {
        /// Children are mutually exclusive alternatives.
        choice: bool,
        children: Vec<NodeDecl>,
    },
}

/// One node of a template description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDecl {
    /// Fully-qualified element name used in profile documents.
    pub name: String,
    pub optional: bool,
    pub min_occurs: u32,
    pub max_occurs: Occurs,
    pub kind: DeclKind,
}

impl NodeDecl {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, DeclKind::Leaf(_))
    }

    /// Child declarations; empty for leaves.
    pub fn children(&self) -> &[NodeDecl] {
        match &self.kind {
            DeclKind::Branch { children, .. } => children,
            DeclKind::Leaf(_) => &[],
        }
    }
}

/// Parsed template description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateModel {
    pub id: String,
    pub name: String,
    pub root: NodeDecl,
}

/// Fetch a template description using the provided fetch closure and parse it.
///
/// The closure receives the template identifier and must return the raw
/// description bytes; how they are retrieved is up to the caller.
pub async fn fetch_template<F, Fut>(
    mut fetch: F,
    template_id: &str,
) -> Result<TemplateModel, XmlError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<u8>, XmlError>>,
{
    let bytes = fetch(template_id.to_string()).await?;
    let xml = String::from_utf8(bytes)
        .map_err(|err| XmlError::Xml(format!("invalid UTF-8: {err}")))?;
    let mut model = parse(&xml)?;
    if model.id.is_empty() {
        model.id = template_id.to_string();
    } else if model.id != template_id {
        return Err(XmlError::Invalid(format!(
            "requested template '{template_id}' but received '{}'",
            model.id
        )));
    }
    debug!(template = %model.id, "fetched template description");
    Ok(model)
}

enum Frame {
    Node(NodeDecl),
    Option(String),
}

/// Parse a template description into a [`TemplateModel`].
pub fn parse(xml: &str) -> Result<TemplateModel, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut id = String::new();
    let mut name = String::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<NodeDecl> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"Template" => read_template_header(&e, &mut id, &mut name)?,
                b"Branch" | b"Leaf" => stack.push(Frame::Node(node_from_start(&e)?)),
                b"Option" => stack.push(Frame::Option(String::new())),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"Template" => read_template_header(&e, &mut id, &mut name)?,
                b"Branch" | b"Leaf" => {
                    let node = node_from_start(&e)?;
                    attach(&mut stack, &mut root, node)?;
                }
                b"Option" => attach_option(&mut stack, String::new())?,
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some(Frame::Option(text)) = stack.last_mut() {
                    let value = t.unescape().map_err(|err| XmlError::Xml(err.to_string()))?;
                    text.push_str(value.trim());
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"Branch" | b"Leaf" => match stack.pop() {
                    Some(Frame::Node(node)) => attach(&mut stack, &mut root, node)?,
                    _ => return Err(XmlError::Invalid("unbalanced node element".into())),
                },
                b"Option" => match stack.pop() {
                    Some(Frame::Option(text)) => attach_option(&mut stack, text)?,
                    _ => return Err(XmlError::Invalid("unbalanced Option element".into())),
                },
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(XmlError::Xml(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let root = root.ok_or_else(|| XmlError::Invalid("template declares no root node".into()))?;
    if root.is_leaf() {
        return Err(XmlError::Invalid(format!(
            "root node '{}' must be a branch",
            root.name
        )));
    }
    if name.is_empty() {
        name = root.name.clone();
    }
    Ok(TemplateModel { id, name, root })
}

fn read_template_header(
    event: &BytesStart<'_>,
    id: &mut String,
    name: &mut String,
) -> Result<(), XmlError> {
    if let Some(value) = attribute_value(event, b"Id")? {
        *id = value;
    }
    if let Some(value) = attribute_value(event, b"Name")? {
        *name = value;
    }
    Ok(())
}

fn node_from_start(event: &BytesStart<'_>) -> Result<NodeDecl, XmlError> {
    let element = String::from_utf8_lossy(event.name().as_ref()).to_string();
    let name = attribute_value(event, b"Name")?
        .ok_or_else(|| XmlError::Invalid(format!("{element} without Name attribute")))?;
    let optional = parse_flag(&name, "Optional", attribute_value(event, b"Optional")?)?;
    let min_occurs = match attribute_value(event, b"MinOccurs")? {
        Some(value) => value.parse().map_err(|err| {
            XmlError::Invalid(format!("node {name}: invalid MinOccurs '{value}': {err}"))
        })?,
        None => 1,
    };
    let max_occurs = match attribute_value(event, b"MaxOccurs")? {
        Some(value) => parse_occurs(&name, &value)?,
        None => Occurs::Bounded(1),
    };

    let kind = if element == "Leaf" {
        let input = match attribute_value(event, b"Input")?.as_deref() {
            None | Some("text") => InputDecl::Text,
            Some("select") => InputDecl::Select(Vec::new()),
            Some("file") => InputDecl::File,
            Some("none") => InputDecl::None,
            Some(other) => {
                return Err(XmlError::Invalid(format!(
                    "leaf {name}: unknown input kind '{other}'"
                )))
            }
        };
        DeclKind::Leaf(LeafDecl {
            value_type: attribute_value(event, b"Type")?.unwrap_or_else(|| "xs:string".into()),
            input,
            unit: parse_flag(&name, "Unit", attribute_value(event, b"Unit")?)?,
            restrictions: attribute_value(event, b"Restrictions")?,
            default: attribute_value(event, b"Default")?,
        })
    } else {
        DeclKind::Branch {
            choice: parse_flag(&name, "Choice", attribute_value(event, b"Choice")?)?,
            children: Vec::new(),
        }
    };

    Ok(NodeDecl {
        name,
        optional,
        min_occurs,
        max_occurs,
        kind,
    })
}

fn attach(
    stack: &mut [Frame],
    root: &mut Option<NodeDecl>,
    node: NodeDecl,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(Frame::Node(parent)) => match &mut parent.kind {
            DeclKind::Branch { children, .. } => {
                children.push(node);
                Ok(())
            }
            DeclKind::Leaf(_) => Err(XmlError::Invalid(format!(
                "leaf {} cannot contain node {}",
                parent.name, node.name
            ))),
        },
        Some(Frame::Option(_)) => Err(XmlError::Invalid(format!(
            "node {} nested inside an Option",
            node.name
        ))),
        None => {
            if root.is_some() {
                return Err(XmlError::Invalid(
                    "template declares more than one root node".into(),
                ));
            }
            *root = Some(node);
            Ok(())
        }
    }
}

fn attach_option(stack: &mut [Frame], option: String) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(Frame::Node(NodeDecl {
            name,
            kind: DeclKind::Leaf(leaf),
            ..
        })) => match &mut leaf.input {
            InputDecl::Select(options) => {
                options.push(option);
                Ok(())
            }
            _ => Err(XmlError::Invalid(format!(
                "leaf {name} declares options but is not a select input"
            ))),
        },
        _ => Err(XmlError::Invalid("Option outside of a select leaf".into())),
    }
}

fn parse_flag(node: &str, key: &str, value: Option<String>) -> Result<bool, XmlError> {
    match value {
        None => Ok(false),
        Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        Some(value) => Err(XmlError::Invalid(format!(
            "node {node}: {key} must be true or false, got '{value}'"
        ))),
    }
}

fn parse_occurs(node: &str, value: &str) -> Result<Occurs, XmlError> {
    if value.eq_ignore_ascii_case("unbounded") {
        return Ok(Occurs::Unbounded);
    }
    value
        .parse()
        .map(Occurs::Bounded)
        .map_err(|err| XmlError::Invalid(format!("node {node}: invalid MaxOccurs '{value}': {err}")))
}

fn attribute_value(event: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, XmlError> {
    for attr in event.attributes() {
        let attr = attr.map_err(|err| XmlError::Xml(err.to_string()))?;
        if attr.key.as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|err| XmlError::Xml(err.to_string()))?;
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                return Ok(None);
            }
            return Ok(Some(trimmed));
        }
    }
    Ok(None)
}
