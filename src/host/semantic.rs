//! Name resolution over the host crate
//!
//! Rust resolves an attribute path through the `use` items of the module it appears in. This module
//! flattens `use` trees into bindings, tracks the bindings and inner attributes of each module scope, and
//! canonicalises attribute paths to `crate::…` or `extern_crate::…` form so markers can be recognised however
//! they were imported.

use quote::ToTokens;

use microgen_sdk::AttributeInfo;

use super::markers::{MarkerKind, MarkerSymbols};
use super::program::HostProgram;
use super::unit::SourceUnit;
use crate::error::PipelineError;

/// Crates every Rust program can name without a reference.
const BUILTIN_CRATES: [&str; 3] = ["std", "core", "alloc"];

/// One name brought into scope by a `use` or `extern crate` item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Name visible in the scope (the alias when renamed, `*` for globs)
    pub name: String,
    /// Path the name refers to, as written
    pub target: Vec<String>,
    pub glob: bool,
}

/// Flatten a `use` tree into its bindings.
pub fn use_bindings(tree: &syn::UseTree) -> Vec<ImportBinding> {
    let mut out = Vec::new();
    flatten(tree, &mut Vec::new(), &mut out);
    out
}

fn flatten(tree: &syn::UseTree, prefix: &mut Vec<String>, out: &mut Vec<ImportBinding>) {
    match tree {
        syn::UseTree::Path(path) => {
            prefix.push(path.ident.to_string());
            flatten(&path.tree, prefix, out);
            prefix.pop();
        }
        syn::UseTree::Name(name) => {
            let ident = name.ident.to_string();
            if ident == "self" {
                if let Some(last) = prefix.last() {
                    out.push(ImportBinding {
                        name: last.clone(),
                        target: prefix.clone(),
                        glob: false,
                    });
                }
            } else {
                let mut target = prefix.clone();
                target.push(ident.clone());
                out.push(ImportBinding {
                    name: ident,
                    target,
                    glob: false,
                });
            }
        }
        syn::UseTree::Rename(rename) => {
            let mut target = prefix.clone();
            if rename.ident != "self" {
                target.push(rename.ident.to_string());
            }
            out.push(ImportBinding {
                name: rename.rename.to_string(),
                target,
                glob: false,
            });
        }
        syn::UseTree::Glob(_) => out.push(ImportBinding {
            name: "*".to_string(),
            target: prefix.clone(),
            glob: true,
        }),
        syn::UseTree::Group(group) => {
            for item in &group.items {
                flatten(item, prefix, out);
            }
        }
    }
}

/// Inner attributes (`#![…]`) among `attrs`.
pub fn inner_attributes(attrs: &[syn::Attribute]) -> impl Iterator<Item = &syn::Attribute> {
    attrs.iter().filter(|a| matches!(a.style, syn::AttrStyle::Inner(_)))
}

/// Crate-level attributes a generator module may still need.
const CRATE_ROOT_ATTRIBUTES: &[&str] = &["feature", "recursion_limit", "type_length_limit"];

/// The inner attributes carried into the generator module.
///
/// Only `allow` survives in every scope; the crate root also keeps feature gates and limits. Docs,
/// `no_std` and stricter lint levels would change how the module builds.
pub fn carried_inner_attributes(
    attrs: &[syn::Attribute],
    crate_root: bool,
) -> impl Iterator<Item = &syn::Attribute> {
    inner_attributes(attrs).filter(move |attr| {
        let path = attr.path();
        path.is_ident("allow") || (crate_root && CRATE_ROOT_ATTRIBUTES.iter().any(|name| path.is_ident(name)))
    })
}

/// The outer attributes of an item.
pub fn item_attributes(item: &syn::Item) -> &[syn::Attribute] {
    match item {
        syn::Item::Const(i) => &i.attrs,
        syn::Item::Enum(i) => &i.attrs,
        syn::Item::ExternCrate(i) => &i.attrs,
        syn::Item::Fn(i) => &i.attrs,
        syn::Item::ForeignMod(i) => &i.attrs,
        syn::Item::Impl(i) => &i.attrs,
        syn::Item::Macro(i) => &i.attrs,
        syn::Item::Mod(i) => &i.attrs,
        syn::Item::Static(i) => &i.attrs,
        syn::Item::Struct(i) => &i.attrs,
        syn::Item::Trait(i) => &i.attrs,
        syn::Item::TraitAlias(i) => &i.attrs,
        syn::Item::Type(i) => &i.attrs,
        syn::Item::Union(i) => &i.attrs,
        syn::Item::Use(i) => &i.attrs,
        _ => &[],
    }
}

/// `::`-joined text of a path as written.
pub fn path_to_string(path: &syn::Path) -> String {
    let joined = path
        .segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect::<Vec<_>>()
        .join("::");
    if path.leading_colon.is_some() {
        format!("::{joined}")
    } else {
        joined
    }
}

/// Names and context visible inside one module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub module_path: Vec<String>,
    pub bindings: Vec<ImportBinding>,
    /// The `use` and `extern crate` items of the module, verbatim
    pub imports: Vec<syn::Item>,
    /// Inner attributes of the file and of every enclosing inline module
    pub inner_attrs: Vec<syn::Attribute>,
}

impl Scope {
    pub fn new(module_path: Vec<String>, items: &[syn::Item], inner_attrs: Vec<syn::Attribute>) -> Self {
        let mut bindings = Vec::new();
        let mut imports = Vec::new();
        for item in items {
            match item {
                syn::Item::Use(item_use) => {
                    bindings.extend(use_bindings(&item_use.tree));
                    imports.push(item.clone());
                }
                syn::Item::ExternCrate(extern_crate) => {
                    let name = extern_crate
                        .rename
                        .as_ref()
                        .map(|(_, rename)| rename.to_string())
                        .unwrap_or_else(|| extern_crate.ident.to_string());
                    bindings.push(ImportBinding {
                        name,
                        target: vec![extern_crate.ident.to_string()],
                        glob: false,
                    });
                    imports.push(item.clone());
                }
                _ => {}
            }
        }
        Self {
            module_path,
            bindings,
            imports,
            inner_attrs,
        }
    }

    /// Root scope of a source unit.
    pub fn for_unit(unit: &SourceUnit) -> Self {
        let file = unit.file();
        Self::new(
            unit.module_path().to_vec(),
            &file.items,
            carried_inner_attributes(&file.attrs, unit.module_path().is_empty())
                .cloned()
                .collect(),
        )
    }

    /// Scope of an inline module declared in this one; `None` for `mod x;` declarations.
    pub fn nested(&self, module: &syn::ItemMod) -> Option<Self> {
        let (_, items) = module.content.as_ref()?;
        let mut module_path = self.module_path.clone();
        module_path.push(module.ident.to_string());
        let inner_attrs = carried_inner_attributes(&module.attrs, false).cloned().collect();
        Some(Self::new(module_path, items, inner_attrs))
    }
}

/// Semantic view of a host program for one pass.
pub struct SemanticModel<'p> {
    program: &'p HostProgram,
    markers: MarkerSymbols,
    extern_crates: Vec<String>,
}

impl<'p> SemanticModel<'p> {
    /// Build the model; fails when the marker attributes cannot be resolved.
    pub fn new(program: &'p HostProgram) -> Result<Self, PipelineError> {
        let markers = MarkerSymbols::resolve(program)?;
        let mut extern_crates: Vec<String> = BUILTIN_CRATES.iter().map(|c| c.to_string()).collect();
        extern_crates.extend(program.references().iter().map(|r| r.name.clone()));
        Ok(Self {
            program,
            markers,
            extern_crates,
        })
    }

    pub fn program(&self) -> &'p HostProgram {
        self.program
    }

    pub fn markers(&self) -> &MarkerSymbols {
        &self.markers
    }

    pub fn is_extern_crate(&self, name: &str) -> bool {
        self.extern_crates.iter().any(|c| c == name)
    }

    /// Candidate canonical paths for `path` as written in `scope`, best first.
    pub fn resolve_path(&self, scope: &Scope, path: &syn::Path) -> Vec<String> {
        let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
        if path.leading_colon.is_some() {
            return vec![segments.join("::")];
        }
        let Some((first, rest)) = segments.split_first() else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        if matches!(first.as_str(), "crate" | "self" | "super") {
            candidates.push(self.canonical(&scope.module_path, &segments));
            return candidates;
        }

        for binding in scope.bindings.iter().filter(|b| !b.glob && b.name == *first) {
            let mut full = binding.target.clone();
            full.extend(rest.iter().cloned());
            push_unique(&mut candidates, self.canonical(&scope.module_path, &full));
        }
        if !candidates.is_empty() {
            return candidates;
        }

        if self.is_extern_crate(first) {
            candidates.push(segments.join("::"));
        }
        for binding in scope.bindings.iter().filter(|b| b.glob) {
            let mut full = binding.target.clone();
            full.extend(segments.iter().cloned());
            push_unique(&mut candidates, self.canonical(&scope.module_path, &full));
        }
        push_unique(&mut candidates, self.canonical(&scope.module_path, &segments));
        candidates
    }

    /// Canonical form of `segments` written inside `module_path`.
    fn canonical(&self, module_path: &[String], segments: &[String]) -> String {
        let Some(first) = segments.first() else {
            return "crate".to_string();
        };
        let (mut base, rest): (Vec<String>, &[String]) = match first.as_str() {
            "crate" => (Vec::new(), &segments[1..]),
            "self" => (module_path.to_vec(), &segments[1..]),
            "super" => {
                let mut base = module_path.to_vec();
                let supers = segments.iter().take_while(|s| *s == "super").count();
                for _ in 0..supers {
                    base.pop();
                }
                (base, &segments[supers..])
            }
            name if self.is_extern_crate(name) => return segments.join("::"),
            _ => (module_path.to_vec(), segments),
        };
        base.extend(rest.iter().cloned());
        if base.is_empty() {
            "crate".to_string()
        } else {
            format!("crate::{}", base.join("::"))
        }
    }

    /// The marker `attr` names, if any.
    pub fn marker_of(&self, scope: &Scope, attr: &syn::Attribute) -> Option<MarkerKind> {
        self.markers.classify(&self.resolve_path(scope, attr.path()))
    }

    /// Plain-data view of `attr` for generators.
    pub fn attribute_info(&self, scope: &Scope, attr: &syn::Attribute) -> AttributeInfo {
        AttributeInfo {
            path: path_to_string(attr.path()),
            resolved: self.resolve_path(scope, attr.path()),
            tokens: attr.to_token_stream().to_string(),
        }
    }
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}
