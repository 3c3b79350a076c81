//! The generator capability and the output sink.

use thiserror::Error;

use crate::context::GenerationContext;
use crate::fault::{Fault, guard};
use crate::syntax::SyntaxNode;

/// Errors a generator may return from its fallible operations.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("a source named `{0}` was already produced in this pass")]
    DuplicateSource(String),

    #[error("node {0} is not supported by this generator")]
    UnsupportedNode(String),

    #[error("{0}")]
    Message(String),
}

impl GeneratorError {
    pub fn message(message: impl Into<String>) -> Self {
        GeneratorError::Message(message.into())
    }

    /// Short name of the error variant, reported as the fault category.
    pub fn category(&self) -> &'static str {
        match self {
            GeneratorError::DuplicateSource(_) => "DuplicateSource",
            GeneratorError::UnsupportedNode(_) => "UnsupportedNode",
            GeneratorError::Message(_) => "Message",
        }
    }
}

/// Destination for generated source text.
///
/// Source names must be unique within a pass; adding a name twice fails with
/// [`GeneratorError::DuplicateSource`].
pub trait SourceSink {
    fn add_source(&mut self, name: &str, text: String) -> Result<(), GeneratorError>;
}

/// A micro source generator.
///
/// The host calls [`initialize`](MicroGenerator::initialize) once per pass, then
/// [`accept`](MicroGenerator::accept) for every syntax node, then
/// [`produce_source`](MicroGenerator::produce_source) for the nodes it accepted. Nodes are visited in no
/// particular order and possibly from several threads at once.
///
/// Generator types are instantiated through `Default`; a generator without a `Default` impl is reported
/// and skipped.
pub trait MicroGenerator: Send + Sync {
    fn initialize(&mut self, context: &GenerationContext) -> Result<(), GeneratorError> {
        let _ = context;
        Ok(())
    }

    /// Whether this generator wants to produce source for `node`. Must not mutate shared state.
    fn accept(&self, context: &GenerationContext, node: &SyntaxNode) -> bool;

    fn produce_source(
        &self,
        sink: &mut dyn SourceSink,
        context: &GenerationContext,
        node: &SyntaxNode,
    ) -> Result<(), GeneratorError>;
}

/// Object-safe generator whose every call is fault-isolated.
///
/// This is the form the host drives. Implementations run generator code under [`guard`], so the host only
/// ever sees `Result`s.
pub trait GuardedGenerator: Send + Sync {
    fn initialize(&mut self, context: &GenerationContext) -> Result<(), Fault>;

    fn accept(&self, context: &GenerationContext, node: &SyntaxNode) -> Result<bool, Fault>;

    fn produce_source(
        &self,
        sink: &mut dyn SourceSink,
        context: &GenerationContext,
        node: &SyntaxNode,
    ) -> Result<(), Fault>;
}

/// Adapts a [`MicroGenerator`] into a [`GuardedGenerator`].
pub struct Guarded<G>(G);

impl<G: MicroGenerator> Guarded<G> {
    pub fn new(generator: G) -> Self {
        Self(generator)
    }

    pub fn into_inner(self) -> G {
        self.0
    }
}

impl<G: MicroGenerator> GuardedGenerator for Guarded<G> {
    fn initialize(&mut self, context: &GenerationContext) -> Result<(), Fault> {
        guard(|| self.0.initialize(context))
    }

    fn accept(&self, context: &GenerationContext, node: &SyntaxNode) -> Result<bool, Fault> {
        guard(|| Ok(self.0.accept(context, node)))
    }

    fn produce_source(
        &self,
        sink: &mut dyn SourceSink,
        context: &GenerationContext,
        node: &SyntaxNode,
    ) -> Result<(), Fault> {
        guard(|| self.0.produce_source(sink, context, node))
    }
}
