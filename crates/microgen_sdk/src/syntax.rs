//! Plain-data view of the host crate's syntax handed to generators.
//!
//! The host parses its crate with its own syntax library; generators only ever see these owned values so
//! that nothing parser-specific has to cross the module boundary.

use std::fmt;

/// Stable index of a syntax node within one generation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The syntactic category of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Struct,
    Enum,
    Union,
    Trait,
    Impl,
    Fn,
    /// A function inside an `impl` or `trait` block
    Method,
    Mod,
    Use,
    Const,
    Static,
    TypeAlias,
    Macro,
    ExternCrate,
    Other,
}

impl NodeKind {
    /// Whether this node declares a nominal type.
    pub fn is_type_declaration(self) -> bool {
        matches!(self, NodeKind::Struct | NodeKind::Enum | NodeKind::Union | NodeKind::Trait)
    }

    /// The Rust keyword that introduces this kind of declaration, if any.
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            NodeKind::Struct => Some("struct"),
            NodeKind::Enum => Some("enum"),
            NodeKind::Union => Some("union"),
            NodeKind::Trait => Some("trait"),
            NodeKind::Impl => Some("impl"),
            NodeKind::Fn | NodeKind::Method => Some("fn"),
            NodeKind::Mod => Some("mod"),
            NodeKind::Use => Some("use"),
            NodeKind::Const => Some("const"),
            NodeKind::Static => Some("static"),
            NodeKind::TypeAlias => Some("type"),
            NodeKind::ExternCrate => Some("extern crate"),
            NodeKind::Macro | NodeKind::Other => None,
        }
    }
}

/// A position in a host source file (1-based line and column).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// An outer attribute attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeInfo {
    /// The attribute path as written (`generate_comment`, `serde::rename`)
    pub path: String,
    /// Fully qualified candidates the path may resolve to, best first
    pub resolved: Vec<String>,
    /// Token text of the whole attribute (`#[serde(rename = "x")]`)
    pub tokens: String,
}

impl AttributeInfo {
    /// Whether the attribute names `path`, either as written or through one of its resolutions.
    ///
    /// A single-segment query (`generate_comment`) also matches on the last path segment so generators can
    /// stay agnostic of how the host imported the attribute.
    pub fn matches(&self, path: &str) -> bool {
        if self.path == path || self.resolved.iter().any(|r| r == path) {
            return true;
        }
        !path.contains("::") && self.path.rsplit("::").next() == Some(path)
    }
}

/// A syntax node of the host crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Declared identifier, when the node declares one
    pub name: Option<String>,
    /// Module path of the scope containing the node (`[]` is the crate root)
    pub module_path: Vec<String>,
    pub attributes: Vec<AttributeInfo>,
    /// Token text of the node
    pub source: String,
    pub location: SourceLocation,
}

impl SyntaxNode {
    /// Whether the node carries an attribute matching `path` (see [`AttributeInfo::matches`]).
    pub fn has_attribute(&self, path: &str) -> bool {
        self.attributes.iter().any(|a| a.matches(path))
    }

    /// The `::`-joined path of the declared item, e.g. `models::User`.
    pub fn qualified_name(&self) -> Option<String> {
        let name = self.name.as_ref()?;
        if self.module_path.is_empty() {
            Some(name.clone())
        } else {
            Some(format!("{}::{}", self.module_path.join("::"), name))
        }
    }
}
