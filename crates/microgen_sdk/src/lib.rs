//! Plugin contract for micro source generators.
//!
//! A micro generator is an ordinary type in the host crate, marked with [`micro_generator`] and
//! implementing [`MicroGenerator`]. At generation time the microgen meta generator extracts the marked
//! declarations, compiles them against this crate into a standalone module, loads it, and drives every
//! generator over the host crate's syntax nodes.
//!
//! ```ignore
//! use microgen_sdk::{GenerationContext, GeneratorError, MicroGenerator, SourceSink, SyntaxNode};
//! use microgen_sdk::{generator_dependency, micro_generator};
//!
//! #[generator_dependency]
//! pub struct GenerateComment;
//!
//! #[micro_generator]
//! #[derive(Default)]
//! struct CommentGenerator;
//!
//! impl MicroGenerator for CommentGenerator {
//!     fn accept(&self, _: &GenerationContext, node: &SyntaxNode) -> bool {
//!         node.kind.is_type_declaration() && node.has_attribute("generate_comment")
//!     }
//!
//!     fn produce_source(
//!         &self,
//!         sink: &mut dyn SourceSink,
//!         _: &GenerationContext,
//!         node: &SyntaxNode,
//!     ) -> Result<(), GeneratorError> {
//!         let name = node.name.clone().unwrap_or_default();
//!         sink.add_source(&format!("{name}.g.rs"), format!("// Hello from {name}\n"))
//!     }
//! }
//! ```
//!
//! ## Threading
//!
//! `accept` and `produce_source` may run concurrently for different nodes. Generators take `&self` there and
//! must be `Send + Sync`.
//!
//! ## Faults
//!
//! Panics and returned errors are captured by [`guard`] on the generator's side of the boundary and reported
//! by the host as diagnostics; they never abort other generators or nodes.

pub mod context;
pub mod fault;
pub mod generator;
pub mod registry;
pub mod syntax;

pub use context::{DeclaredSymbol, GenerationContext};
pub use fault::{Fault, PANIC_CATEGORY, guard};
pub use generator::{GeneratorError, Guarded, GuardedGenerator, MicroGenerator, SourceSink};
pub use syntax::{AttributeInfo, NodeId, NodeKind, SourceLocation, SyntaxNode};

pub use microgen_macros::{generator_dependency, micro_generator};
