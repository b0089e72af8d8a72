//! Repository nodes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NT_FILE: &str = "nt:file";
pub const NT_FOLDER: &str = "nt:folder";
pub const NT_UNSTRUCTURED: &str = "nt:unstructured";
pub const MIX_VERSIONABLE: &str = "mix:versionable";

/// Property marking nodes that hold a serialized type-definition document
pub const SERIALIZATION_PROPERTY: &str = "vlt:serialization";
pub const CND_SERIALIZATION: &str = "cnd";

pub const CHECKED_OUT_PROPERTY: &str = "jcr:isCheckedOut";

/// A node of the content tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub primary_type: String,
    pub mixins: Vec<String>,
    pub properties: BTreeMap<String, String>,
    /// Binary content (file data, or a binary property of an inline node)
    pub content: Option<Vec<u8>>,
}

/// How a node is represented in the filesystem view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    /// A single view file
    File,
    /// A single `<name>.cnd` view file
    TypeDefinition,
    /// A bare view directory
    Folder,
    /// A view directory plus a metadata document
    Typed,
}

impl Node {
    pub fn new(primary_type: impl Into<String>) -> Self {
        Self {
            primary_type: primary_type.into(),
            mixins: Vec::new(),
            properties: BTreeMap::new(),
            content: None,
        }
    }

    pub fn folder() -> Self {
        Self::new(NT_FOLDER)
    }

    pub fn file(content: impl Into<Vec<u8>>) -> Self {
        let mut node = Self::new(NT_FILE);
        node.content = Some(content.into());
        node
    }

    pub fn type_definition(content: impl Into<Vec<u8>>) -> Self {
        let mut node = Self::file(content);
        node.properties.insert(
            SERIALIZATION_PROPERTY.to_string(),
            CND_SERIALIZATION.to_string(),
        );
        node
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_mixin(mut self, mixin: impl Into<String>) -> Self {
        self.mixins.push(mixin.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn shape(&self) -> NodeShape {
        if self.primary_type == NT_FILE {
            if self.properties.get(SERIALIZATION_PROPERTY).map(String::as_str)
                == Some(CND_SERIALIZATION)
            {
                NodeShape::TypeDefinition
            } else {
                NodeShape::File
            }
        } else if self.primary_type == NT_FOLDER && self.properties.is_empty() && self.mixins.is_empty()
        {
            NodeShape::Folder
        } else {
            NodeShape::Typed
        }
    }

    pub fn is_versionable(&self) -> bool {
        self.mixins.iter().any(|m| m == MIX_VERSIONABLE)
    }

    pub fn is_checked_out(&self) -> bool {
        self.properties.get(CHECKED_OUT_PROPERTY).map(String::as_str) != Some("false")
    }
}
