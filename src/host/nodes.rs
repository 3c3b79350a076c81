//! Enumeration of the syntax nodes generators are dispatched over.

use proc_macro2::Span;
use quote::ToTokens;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};

use microgen_sdk::{AttributeInfo, DeclaredSymbol, GenerationContext, NodeId, NodeKind, SourceLocation, SyntaxNode};

use super::semantic::{Scope, SemanticModel, item_attributes};
use super::unit::SourceUnit;

/// Every node of a host program plus the context snapshot built from its declarations.
#[derive(Debug, Clone)]
pub struct NodeIndex {
    nodes: Vec<SyntaxNode>,
    context: GenerationContext,
}

impl NodeIndex {
    #[tracing::instrument(skip_all, fields(crate_name = semantic.program().crate_name()))]
    pub fn build(semantic: &SemanticModel<'_>) -> Self {
        let program = semantic.program();
        let mut nodes = Vec::new();
        let mut symbols = Vec::new();
        for unit in program.units() {
            let mut collector = NodeCollector {
                semantic,
                unit,
                scopes: vec![Scope::for_unit(unit)],
                nodes: &mut nodes,
                symbols: &mut symbols,
            };
            collector.visit_file(unit.file());
        }
        tracing::debug!(nodes = nodes.len(), symbols = symbols.len(), "indexed host program");
        Self {
            nodes,
            context: GenerationContext::new(program.crate_name(), symbols),
        }
    }

    pub fn nodes(&self) -> &[SyntaxNode] {
        &self.nodes
    }

    pub fn context(&self) -> &GenerationContext {
        &self.context
    }
}

struct NodeCollector<'a, 'p> {
    semantic: &'a SemanticModel<'p>,
    unit: &'a SourceUnit,
    scopes: Vec<Scope>,
    nodes: &'a mut Vec<SyntaxNode>,
    symbols: &'a mut Vec<DeclaredSymbol>,
}

impl NodeCollector<'_, '_> {
    fn scope(&self) -> &Scope {
        // The root scope is pushed before visiting and never popped.
        &self.scopes[self.scopes.len() - 1]
    }

    fn location(&self, span: Span) -> SourceLocation {
        let start = span.start();
        SourceLocation::new(self.unit.display_path(), start.line, start.column + 1)
    }

    fn attributes(&self, attrs: &[syn::Attribute]) -> Vec<AttributeInfo> {
        let scope = self.scope();
        attrs
            .iter()
            .filter(|a| matches!(a.style, syn::AttrStyle::Outer) && !a.path().is_ident("doc"))
            .map(|a| self.semantic.attribute_info(scope, a))
            .collect()
    }

    fn record(
        &mut self,
        kind: NodeKind,
        name: Option<String>,
        attrs: &[syn::Attribute],
        tokens: &dyn ToTokens,
        span: Span,
    ) {
        let id = NodeId(self.nodes.len() as u32);
        let attributes = self.attributes(attrs);
        let location = self.location(span);
        let module_path = self.scope().module_path.clone();

        if let Some(name) = &name {
            if declares_symbol(kind) {
                self.symbols.push(DeclaredSymbol {
                    name: name.clone(),
                    kind,
                    module_path: module_path.clone(),
                    attributes: attributes.clone(),
                    node: id,
                    location: location.clone(),
                });
            }
        }

        self.nodes.push(SyntaxNode {
            id,
            kind,
            name,
            module_path,
            attributes,
            source: tokens.to_token_stream().to_string(),
            location,
        });
    }
}

fn declares_symbol(kind: NodeKind) -> bool {
    !matches!(kind, NodeKind::Impl | NodeKind::Use | NodeKind::Macro | NodeKind::Other)
}

/// Kind and declared name of an item.
fn classify(item: &syn::Item) -> (NodeKind, Option<String>) {
    match item {
        syn::Item::Struct(i) => (NodeKind::Struct, Some(i.ident.to_string())),
        syn::Item::Enum(i) => (NodeKind::Enum, Some(i.ident.to_string())),
        syn::Item::Union(i) => (NodeKind::Union, Some(i.ident.to_string())),
        syn::Item::Trait(i) => (NodeKind::Trait, Some(i.ident.to_string())),
        syn::Item::Impl(i) => (NodeKind::Impl, Some(i.self_ty.to_token_stream().to_string())),
        syn::Item::Fn(i) => (NodeKind::Fn, Some(i.sig.ident.to_string())),
        syn::Item::Mod(i) => (NodeKind::Mod, Some(i.ident.to_string())),
        syn::Item::Use(_) => (NodeKind::Use, None),
        syn::Item::Const(i) => (NodeKind::Const, Some(i.ident.to_string())),
        syn::Item::Static(i) => (NodeKind::Static, Some(i.ident.to_string())),
        syn::Item::Type(i) => (NodeKind::TypeAlias, Some(i.ident.to_string())),
        syn::Item::Macro(i) => (NodeKind::Macro, i.ident.as_ref().map(|id| id.to_string())),
        syn::Item::ExternCrate(i) => (NodeKind::ExternCrate, Some(i.ident.to_string())),
        _ => (NodeKind::Other, None),
    }
}

impl<'ast> Visit<'ast> for NodeCollector<'_, '_> {
    fn visit_item(&mut self, item: &'ast syn::Item) {
        let (kind, name) = classify(item);
        self.record(kind, name, item_attributes(item), item, item.span());

        if let syn::Item::Mod(module) = item {
            if let Some(nested) = self.scope().nested(module) {
                self.scopes.push(nested);
                visit::visit_item(self, item);
                self.scopes.pop();
                return;
            }
        }
        visit::visit_item(self, item);
    }

    fn visit_impl_item_fn(&mut self, method: &'ast syn::ImplItemFn) {
        self.record(
            NodeKind::Method,
            Some(method.sig.ident.to_string()),
            &method.attrs,
            method,
            method.span(),
        );
        visit::visit_impl_item_fn(self, method);
    }

    fn visit_trait_item_fn(&mut self, method: &'ast syn::TraitItemFn) {
        self.record(
            NodeKind::Method,
            Some(method.sig.ident.to_string()),
            &method.attrs,
            method,
            method.span(),
        );
        visit::visit_trait_item_fn(self, method);
    }
}
