//! Aggregation of crate-wide import directives.

use quote::ToTokens;
use syn::visit::{self, Visit};

use crate::host::HostProgram;
use crate::incremental::Fingerprint;

/// The program's global import directives, deduplicated and in a stable order.
///
/// A `use` item is global when it is `pub` or `pub(crate)` and its path starts at an external crate. Such
/// imports are re-emitted verbatim into a context module of the synthetic crate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalImportSet {
    imports: Vec<syn::ItemUse>,
}

impl GlobalImportSet {
    #[tracing::instrument(skip_all, fields(crate_name = program.crate_name()))]
    pub fn collect(program: &HostProgram) -> Self {
        let mut collector = UseCollector::default();
        for unit in program.units() {
            collector.visit_file(unit.file());
        }
        let set = Self::from_imports(collector.found);
        tracing::debug!(imports = set.len(), "aggregated global imports");
        set
    }

    /// Deduplicate structurally and sort by token text.
    pub fn from_imports(imports: impl IntoIterator<Item = syn::ItemUse>) -> Self {
        let mut keyed: Vec<(String, syn::ItemUse)> = imports
            .into_iter()
            .map(|item| (item.to_token_stream().to_string(), item))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.1 == b.1);
        Self {
            imports: keyed.into_iter().map(|(_, item)| item).collect(),
        }
    }

    pub fn imports(&self) -> &[syn::ItemUse] {
        &self.imports
    }

    pub fn len(&self) -> usize {
        self.imports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::combine(self.imports.iter().map(Fingerprint::of_tokens))
    }
}

#[derive(Default)]
struct UseCollector {
    found: Vec<syn::ItemUse>,
}

impl<'ast> Visit<'ast> for UseCollector {
    fn visit_item_use(&mut self, item: &'ast syn::ItemUse) {
        if is_global_import(item) {
            self.found.push(item.clone());
        }
        visit::visit_item_use(self, item);
    }
}

/// `pub`/`pub(crate)` and rooted at an external crate.
pub fn is_global_import(item: &syn::ItemUse) -> bool {
    let visible = match &item.vis {
        syn::Visibility::Public(_) => true,
        syn::Visibility::Restricted(restricted) => restricted.in_token.is_none() && restricted.path.is_ident("crate"),
        syn::Visibility::Inherited => false,
    };
    if !visible {
        return false;
    }
    if item.leading_colon.is_some() {
        return true;
    }
    let mut roots = Vec::new();
    use_roots(&item.tree, &mut roots);
    !roots.is_empty() && roots.iter().all(|root| !matches!(root.as_str(), "self" | "super" | "crate" | "*"))
}

fn use_roots(tree: &syn::UseTree, out: &mut Vec<String>) {
    match tree {
        syn::UseTree::Path(path) => out.push(path.ident.to_string()),
        syn::UseTree::Name(name) => out.push(name.ident.to_string()),
        syn::UseTree::Rename(rename) => out.push(rename.ident.to_string()),
        syn::UseTree::Glob(_) => out.push("*".to_string()),
        syn::UseTree::Group(group) => {
            for item in &group.items {
                use_roots(item, out);
            }
        }
    }
}
