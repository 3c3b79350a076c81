//! Extraction of marked type declarations.

use std::path::PathBuf;

use microgen_sdk::NodeKind;

use crate::host::semantic::{Scope, SemanticModel, item_attributes};
use crate::host::{MarkerKind, SourceUnit, UnitId};
use crate::incremental::Fingerprint;

/// A marked declaration plus the context it needs to compile on its own.
///
/// Two fragments are equal when their declaration, impls, imports, inner attributes and module path are
/// token-equal; spans and layout never take part.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub unit: UnitId,
    pub unit_path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub module_path: Vec<String>,
    pub marker: MarkerKind,
    /// Attributes as written, marker included
    pub attributes: Vec<syn::Attribute>,
    /// The declaration with the marker attribute removed
    pub declaration: syn::Item,
    /// `impl` blocks for the type found in the same scope
    pub impls: Vec<syn::ItemImpl>,
    /// `use` and `extern crate` items of the declaring module
    pub imports: Vec<syn::Item>,
    pub inner_attrs: Vec<syn::Attribute>,
    pub generic: bool,
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        self.module_path == other.module_path
            && self.declaration == other.declaration
            && self.impls == other.impls
            && self.imports == other.imports
            && self.inner_attrs == other.inner_attrs
    }
}

impl Eq for Fragment {}

impl Fragment {
    /// `::`-joined path relative to the crate root.
    pub fn path(&self) -> String {
        if self.module_path.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.module_path.join("::"), self.name)
        }
    }

    /// Whether a probe can name this type as a concrete `Probe<T>`.
    pub fn is_probe_candidate(&self) -> bool {
        !self.generic && self.kind != NodeKind::Trait
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut parts = vec![
            Fingerprint::of_str(&self.module_path.join("::")),
            Fingerprint::of_tokens(&self.declaration),
        ];
        parts.extend(self.impls.iter().map(Fingerprint::of_tokens));
        parts.extend(self.imports.iter().map(Fingerprint::of_tokens));
        parts.extend(self.inner_attrs.iter().map(Fingerprint::of_tokens));
        Fingerprint::combine(parts)
    }
}

/// Collect the fragments of one source unit, in declaration order.
#[tracing::instrument(skip_all, fields(unit = %unit.display_path()))]
pub fn collect_unit_fragments(unit: &SourceUnit, semantic: &SemanticModel<'_>) -> Vec<Fragment> {
    let mut out = Vec::new();
    let scope = Scope::for_unit(unit);
    collect_scope(unit, semantic, &scope, &unit.file().items, &mut out);
    tracing::debug!(fragments = out.len(), "collected fragments");
    out
}

fn collect_scope(
    unit: &SourceUnit,
    semantic: &SemanticModel<'_>,
    scope: &Scope,
    items: &[syn::Item],
    out: &mut Vec<Fragment>,
) {
    for item in items {
        if let syn::Item::Mod(module) = item {
            if let (Some(nested), Some((_, content))) = (scope.nested(module), module.content.as_ref()) {
                collect_scope(unit, semantic, &nested, content, out);
            }
            continue;
        }

        let Some((kind, name, generic)) = nominal_type(item) else {
            continue;
        };
        let attrs = item_attributes(item);
        // Cheap structural filter before any resolution.
        if attrs.is_empty() {
            continue;
        }
        let Some((index, marker)) = attrs
            .iter()
            .enumerate()
            .find_map(|(i, attr)| semantic.marker_of(scope, attr).map(|marker| (i, marker)))
        else {
            continue;
        };

        let impls = items
            .iter()
            .filter_map(|candidate| match candidate {
                syn::Item::Impl(imp) if self_type_name(&imp.self_ty).as_deref() == Some(name.as_str()) => {
                    Some(imp.clone())
                }
                _ => None,
            })
            .collect();

        out.push(Fragment {
            unit: unit.id(),
            unit_path: unit.path().to_path_buf(),
            name,
            kind,
            module_path: scope.module_path.clone(),
            marker,
            attributes: attrs.to_vec(),
            declaration: strip_attribute(item, index),
            impls,
            imports: scope.imports.clone(),
            inner_attrs: scope.inner_attrs.clone(),
            generic,
        });
    }
}

/// Kind, name and genericity of a nominal type declaration.
fn nominal_type(item: &syn::Item) -> Option<(NodeKind, String, bool)> {
    let (kind, ident, generics) = match item {
        syn::Item::Struct(i) => (NodeKind::Struct, &i.ident, &i.generics),
        syn::Item::Enum(i) => (NodeKind::Enum, &i.ident, &i.generics),
        syn::Item::Union(i) => (NodeKind::Union, &i.ident, &i.generics),
        syn::Item::Trait(i) => (NodeKind::Trait, &i.ident, &i.generics),
        _ => return None,
    };
    Some((kind, ident.to_string(), !generics.params.is_empty()))
}

/// Last identifier of a path type: `Foo` for `Foo`, `a::Foo` and `Foo<T>`.
fn self_type_name(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Path(path) if path.qself.is_none() => path.path.segments.last().map(|s| s.ident.to_string()),
        syn::Type::Group(group) => self_type_name(&group.elem),
        syn::Type::Paren(paren) => self_type_name(&paren.elem),
        _ => None,
    }
}

/// Copy of `item` without its `index`-th outer attribute.
fn strip_attribute(item: &syn::Item, index: usize) -> syn::Item {
    let mut item = item.clone();
    if let Some(attrs) = type_attributes_mut(&mut item) {
        if index < attrs.len() {
            attrs.remove(index);
        }
    }
    item
}

fn type_attributes_mut(item: &mut syn::Item) -> Option<&mut Vec<syn::Attribute>> {
    match item {
        syn::Item::Struct(i) => Some(&mut i.attrs),
        syn::Item::Enum(i) => Some(&mut i.attrs),
        syn::Item::Union(i) => Some(&mut i.attrs),
        syn::Item::Trait(i) => Some(&mut i.attrs),
        _ => None,
    }
}
