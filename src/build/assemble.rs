//! Assembly of the synthetic crate's `lib.rs`
//!
//! Fragments are grouped by module path and the module tree is rebuilt from those paths, so declarations
//! keep the relative paths they were written with:
//!
//! ```text
//! #![allow(..)]
//! use crate::__microgen_context::*;      // every module glob-imports the global context
//! pub mod __microgen_context { pub use serde::Serialize; }
//! pub mod plugins {
//!     use crate::__microgen_context::*;
//!     use microgen_sdk::micro_generator;   // the module's own imports, verbatim
//!     pub struct CommentGenerator;          // marker stripped
//!     impl MicroGenerator for CommentGenerator { .. }
//!     pub(crate) fn __microgen_offer(discovery: &mut Discovery) { .. probes .. }
//! }
//! #[no_mangle] pub extern "C" fn microgen_module_manifest() -> ModuleManifest { .. }
//! #[no_mangle] pub extern "C" fn microgen_module_discover() -> *mut Discovery { .. }
//! ```

use std::collections::BTreeMap;

use quote::{format_ident, quote};
use syn::parse_quote;

use crate::collect::{Fragment, GlobalImportSet};

/// Name of the module holding the re-emitted global imports.
pub const CONTEXT_MODULE: &str = "__microgen_context";

/// Output of assembly: the formatted source and the probes it registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledCrate {
    pub source: String,
    /// Crate-relative paths of the probed types, in registration order
    pub probes: Vec<String>,
}

#[derive(Default)]
struct ModuleNode {
    inner_attrs: Vec<syn::Attribute>,
    imports: Vec<syn::Item>,
    items: Vec<syn::Item>,
    probes: Vec<(syn::Ident, String)>,
    children: BTreeMap<String, ModuleNode>,
}

fn push_unique<T: PartialEq>(vec: &mut Vec<T>, value: T) {
    if !vec.contains(&value) {
        vec.push(value);
    }
}

impl ModuleNode {
    fn child_mut(&mut self, path: &[String]) -> &mut ModuleNode {
        match path.split_first() {
            None => self,
            Some((head, rest)) => self.children.entry(head.clone()).or_default().child_mut(rest),
        }
    }

    fn add(&mut self, fragment: &Fragment) {
        for attr in &fragment.inner_attrs {
            push_unique(&mut self.inner_attrs, attr.clone());
        }
        for import in &fragment.imports {
            push_unique(&mut self.imports, import.clone());
        }
        self.items.push(fragment.declaration.clone());
        for imp in &fragment.impls {
            push_unique(&mut self.items, syn::Item::Impl(imp.clone()));
        }
        if fragment.is_probe_candidate() {
            self.probes.push((format_ident!("{}", fragment.name), fragment.path()));
        }
    }

    /// Paths of the modules that define an offer function, depth first.
    fn offering_paths(&self, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        if !self.probes.is_empty() {
            out.push(prefix.clone());
        }
        for (name, child) in &self.children {
            prefix.push(name.clone());
            child.offering_paths(prefix, out);
            prefix.pop();
        }
    }

    fn render_items(&self) -> Vec<syn::Item> {
        let context = format_ident!("{}", CONTEXT_MODULE);
        let mut items: Vec<syn::Item> = vec![parse_quote! {
            #[allow(unused_imports)]
            use crate::#context::*;
        }];
        items.extend(self.imports.iter().cloned());
        items.extend(self.items.iter().cloned());
        if !self.probes.is_empty() {
            items.push(self.offer_fn());
        }
        for (name, child) in &self.children {
            let ident = format_ident!("{}", name);
            let attrs = &child.inner_attrs;
            let body = child.render_items();
            items.push(parse_quote! {
                pub mod #ident {
                    #(#attrs)*
                    #(#body)*
                }
            });
        }
        items
    }

    fn offer_fn(&self) -> syn::Item {
        let probes = self.probes.iter().map(|(ident, label)| {
            quote! {
                discovery.offer((&&&::microgen_sdk::registry::Probe::<#ident>::new(#label)).describe());
            }
        });
        parse_quote! {
            #[doc(hidden)]
            pub(crate) fn __microgen_offer(discovery: &mut ::microgen_sdk::registry::Discovery) {
                #[allow(unused_imports)]
                use ::microgen_sdk::registry::{ViaAnyType as _, ViaConstructible as _, ViaGenerator as _};
                #(#probes)*
            }
        }
    }
}

/// Assemble the synthetic crate for `fragments` and the global imports.
#[tracing::instrument(skip_all, fields(fragments = fragments.len(), globals = globals.len()))]
pub fn assemble(fragments: &[Fragment], globals: &GlobalImportSet) -> AssembledCrate {
    let mut root = ModuleNode::default();
    for fragment in fragments {
        root.child_mut(&fragment.module_path).add(fragment);
    }

    let mut offering = Vec::new();
    root.offering_paths(&mut Vec::new(), &mut offering);
    let offer_calls = offering.iter().map(|path| {
        let segments = path.iter().map(|s| format_ident!("{}", s));
        quote! { crate #(::#segments)* ::__microgen_offer(&mut discovery); }
    });

    let context = format_ident!("{}", CONTEXT_MODULE);
    let global_items = globals.imports();

    let mut items = root.render_items();
    items.push(parse_quote! {
        #[doc(hidden)]
        pub mod #context {
            #(#global_items)*
        }
    });
    items.push(parse_quote! {
        #[doc(hidden)]
        #[no_mangle]
        pub extern "C" fn microgen_module_manifest() -> ::microgen_sdk::registry::ModuleManifest {
            ::microgen_sdk::registry::ModuleManifest::current()
        }
    });
    items.push(parse_quote! {
        #[doc(hidden)]
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn microgen_module_discover() -> *mut ::microgen_sdk::registry::Discovery {
            let mut discovery = ::microgen_sdk::registry::Discovery::new();
            #(#offer_calls)*
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(discovery))
        }
    });

    // Must stay last: a later lint level overrides an earlier one.
    let mut attrs: Vec<syn::Attribute> = root.inner_attrs.clone();
    attrs.push(parse_quote! {
        #![allow(unused_imports, dead_code, non_snake_case, non_camel_case_types, unused_attributes)]
    });

    let file = syn::File {
        shebang: None,
        attrs,
        items,
    };

    let mut probes = Vec::new();
    collect_probe_labels(&root, &mut probes);
    AssembledCrate {
        source: prettyplease::unparse(&file),
        probes,
    }
}

fn collect_probe_labels(node: &ModuleNode, out: &mut Vec<String>) {
    out.extend(node.probes.iter().map(|(_, label)| label.clone()));
    for child in node.children.values() {
        collect_probe_labels(child, out);
    }
}
