//! Marker attributes for the microgen meta generator.
//!
//! Both attributes are identity macros: they leave the annotated declaration untouched so the host crate
//! compiles as usual. Their only job is to be *resolvable*, which lets the meta generator find the marked
//! declarations in the host's syntax and recompile them into a plugin module.
//!
//! - `micro_generator`: marks a type that implements `MicroGenerator` and should be loaded as a plugin
//! - `generator_dependency`: marks a type the generators need at generation time (attribute types, helpers)
//!
//! Both markers only apply to nominal type declarations (`struct`, `enum`, `union`, `trait`).

use proc_macro::TokenStream;
use quote::quote;
use syn::{Item, parse_macro_input};

/// Marks a generator type for extraction into the plugin module.
///
/// # Example
/// ```ignore
/// #[micro_generator]
/// #[derive(Default)]
/// struct CommentGenerator;
///
/// impl MicroGenerator for CommentGenerator { /* ... */ }
/// ```
#[proc_macro_attribute]
pub fn micro_generator(args: TokenStream, input: TokenStream) -> TokenStream {
    expand_marker("micro_generator", args, input)
}

/// Marks a type that generators depend on so it is extracted alongside them.
///
/// # Example
/// ```ignore
/// #[generator_dependency]
/// pub struct GenerateComment;
/// ```
#[proc_macro_attribute]
pub fn generator_dependency(args: TokenStream, input: TokenStream) -> TokenStream {
    expand_marker("generator_dependency", args, input)
}

fn expand_marker(marker: &str, args: TokenStream, input: TokenStream) -> TokenStream {
    let args = proc_macro2::TokenStream::from(args);
    if !args.is_empty() {
        return syn::Error::new_spanned(args, format!("`#[{marker}]` takes no arguments"))
            .to_compile_error()
            .into();
    }

    let item = parse_macro_input!(input as Item);
    match &item {
        Item::Struct(_) | Item::Enum(_) | Item::Union(_) | Item::Trait(_) => quote!(#item).into(),
        other => syn::Error::new_spanned(
            other,
            format!("`#[{marker}]` can only be applied to a struct, enum, union or trait"),
        )
        .to_compile_error()
        .into(),
    }
}
