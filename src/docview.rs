//! Metadata documents (`.content.xml`)
//!
//! A metadata document serializes one aggregate: the root element is
//! `jcr:root`, its attributes are the aggregate node's properties and every
//! nested element declares a sub-node below it. An element without attributes
//! is an intermediate declaration; it only fixes the position of a node that
//! is serialized elsewhere.

use crate::error::AnalyzeError;
use crate::path;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use tracing::trace;

/// File name of the metadata document inside an aggregate's directory
pub const DOT_CONTENT_XML: &str = ".content.xml";

/// Name of the root element of a metadata document
pub const ROOT_ELEMENT: &str = "jcr:root";

pub const PRIMARY_TYPE: &str = "jcr:primaryType";
pub const MIXIN_TYPES: &str = "jcr:mixinTypes";

/// A node declared by a metadata document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocViewNode {
    pub name: String,
    pub primary_type: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub children: Vec<DocViewNode>,
    /// Declared without attributes (ordering only)
    pub intermediate: bool,
}

impl DocViewNode {
    fn from_element(element: &BytesStart<'_>) -> Result<Self, AnalyzeError> {
        let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
        let mut primary_type = None;
        let mut properties = BTreeMap::new();
        let mut declared_attributes = 0usize;

        for attribute in element.attributes() {
            let attribute = attribute.map_err(|e| AnalyzeError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            declared_attributes += 1;
            let value = attribute
                .unescape_value()
                .map_err(|e| AnalyzeError::Xml(e.to_string()))?
                .into_owned();
            if key == PRIMARY_TYPE {
                primary_type = Some(value);
            } else {
                properties.insert(key, value);
            }
        }

        Ok(Self {
            name,
            primary_type,
            properties,
            children: Vec::new(),
            intermediate: declared_attributes == 0,
        })
    }

    /// Visit this node and all descendants with their absolute paths
    pub fn walk<F>(&self, node_path: &str, visit: &mut F)
    where
        F: FnMut(&str, &DocViewNode),
    {
        visit(node_path, self);
        for child in &self.children {
            child.walk(&path::join(node_path, &child.name), visit);
        }
    }
}

/// Parse a metadata document into its declared node tree
pub fn parse(payload: &[u8]) -> Result<DocViewNode, AnalyzeError> {
    let mut reader = Reader::from_reader(payload);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<DocViewNode> = Vec::new();
    let mut root: Option<DocViewNode> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) => {
                let node = DocViewNode::from_element(&element)?;
                check_root(&stack, &root, &node)?;
                stack.push(node);
            }
            Ok(Event::Empty(element)) => {
                let node = DocViewNode::from_element(&element)?;
                check_root(&stack, &root, &node)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::End(_)) => {
                let Some(node) = stack.pop() else {
                    return Err(AnalyzeError::Xml("unbalanced end tag".to_string()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(AnalyzeError::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(AnalyzeError::Xml("unexpected end of document".to_string()));
    }
    let mut root = root.ok_or_else(|| AnalyzeError::NotDocView(String::new()))?;
    // The root element always describes the aggregate node itself.
    root.intermediate = false;
    Ok(root)
}

fn check_root(
    stack: &[DocViewNode],
    root: &Option<DocViewNode>,
    node: &DocViewNode,
) -> Result<(), AnalyzeError> {
    if !stack.is_empty() {
        return Ok(());
    }
    if root.is_some() {
        return Err(AnalyzeError::Xml("multiple root elements".to_string()));
    }
    if node.name != ROOT_ELEMENT {
        return Err(AnalyzeError::NotDocView(node.name.clone()));
    }
    Ok(())
}

/// Probe a payload: true when it is a well-formed metadata document
pub fn is_docview(payload: &[u8]) -> bool {
    parse(payload).is_ok()
}

/// Discovers the nodes a metadata document declares
pub trait MetadataAnalyzer {
    /// Invoke `on_node(path, intermediate, declared_type)` once per declared node
    ///
    /// `base_path` is the repository path of the aggregate the document
    /// describes; the root element reports that path.
    fn analyze(
        &self,
        payload: &[u8],
        base_path: &str,
        on_node: &mut dyn FnMut(&str, bool, Option<&str>),
    ) -> Result<(), AnalyzeError>;
}

/// Analyzer for XML metadata documents
#[derive(Debug, Clone, Copy, Default)]
pub struct DocViewAnalyzer;

impl MetadataAnalyzer for DocViewAnalyzer {
    fn analyze(
        &self,
        payload: &[u8],
        base_path: &str,
        on_node: &mut dyn FnMut(&str, bool, Option<&str>),
    ) -> Result<(), AnalyzeError> {
        let root = parse(payload)?;
        root.walk(base_path, &mut |node_path, node| {
            trace!(path = node_path, intermediate = node.intermediate, "Declared node");
            on_node(node_path, node.intermediate, node.primary_type.as_deref());
        });
        Ok(())
    }
}
