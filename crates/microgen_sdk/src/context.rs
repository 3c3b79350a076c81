//! The semantic context generators receive for a pass.

use crate::syntax::{AttributeInfo, NodeId, NodeKind, SourceLocation, SyntaxNode};

/// A declaration the host resolved to a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredSymbol {
    pub name: String,
    pub kind: NodeKind,
    pub module_path: Vec<String>,
    pub attributes: Vec<AttributeInfo>,
    /// The node that declares this symbol
    pub node: NodeId,
    pub location: SourceLocation,
}

impl DeclaredSymbol {
    /// `::`-joined path relative to the crate root (`models::User`).
    pub fn path(&self) -> String {
        if self.module_path.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.module_path.join("::"), self.name)
        }
    }

    pub fn has_attribute(&self, path: &str) -> bool {
        self.attributes.iter().any(|a| a.matches(path))
    }
}

/// Read-only snapshot of the host crate's declared symbols.
///
/// One context is built per pass and shared by every dispatch unit, so it must stay immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationContext {
    crate_name: String,
    symbols: Vec<DeclaredSymbol>,
}

impl GenerationContext {
    pub fn new(crate_name: impl Into<String>, symbols: Vec<DeclaredSymbol>) -> Self {
        Self {
            crate_name: crate_name.into(),
            symbols,
        }
    }

    pub fn crate_name(&self) -> &str {
        &self.crate_name
    }

    pub fn symbols(&self) -> &[DeclaredSymbol] {
        &self.symbols
    }

    /// The symbol declared by `node`, if the node declares one.
    pub fn symbol_for(&self, node: &SyntaxNode) -> Option<&DeclaredSymbol> {
        self.symbols.iter().find(|s| s.node == node.id)
    }

    /// Look a type up by its crate-relative path (`models::User`, or `crate::models::User`).
    pub fn find_type(&self, path: &str) -> Option<&DeclaredSymbol> {
        let path = path.strip_prefix("crate::").unwrap_or(path);
        self.symbols
            .iter()
            .find(|s| s.kind.is_type_declaration() && s.path() == path)
    }

    /// All type declarations carrying an attribute that matches `path`.
    pub fn types_with_attribute<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a DeclaredSymbol> + 'a {
        self.symbols
            .iter()
            .filter(move |s| s.kind.is_type_declaration() && s.has_attribute(path))
    }
}
