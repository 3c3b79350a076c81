//! The dispatch orchestrator: initialize, filter and emit over every (node, generator) pair.
//!
//! Every call into generator code returns a `Result<_, Fault>`; a fault becomes one diagnostic and only
//! excludes its own unit (or, for initialization, its own generator) from the pass.

pub mod sink;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use microgen_sdk::{GenerationContext, SyntaxNode};

pub use sink::{GeneratedSource, PassSink, UnitSink};

use crate::build::Epoch;
use crate::diagnostics::Diagnostic;
use crate::load::PluginInstance;

/// Sources and diagnostics of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOutput {
    /// Generated sources ordered by name
    pub sources: Vec<GeneratedSource>,
    pub diagnostics: Vec<Diagnostic>,
}

impl GenerationOutput {
    pub fn source(&self, name: &str) -> Option<&GeneratedSource> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Drives one pass of generator instances over the host's nodes.
pub struct Orchestrator<'c> {
    context: &'c GenerationContext,
    epoch: Epoch,
    parallel: bool,
}

impl<'c> Orchestrator<'c> {
    pub fn new(context: &'c GenerationContext, epoch: Epoch) -> Self {
        Self {
            context,
            epoch,
            parallel: true,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[tracing::instrument(skip_all, fields(epoch = self.epoch.0, instances = instances.len(), nodes = nodes.len()))]
    pub fn run(&self, instances: Vec<PluginInstance>, nodes: &[SyntaxNode]) -> GenerationOutput {
        let mut diagnostics = Vec::new();
        let mut live = Vec::with_capacity(instances.len());

        for mut instance in instances {
            if instance.epoch() != self.epoch {
                warn!(
                    generator = instance.type_name(),
                    instance_epoch = instance.epoch().0,
                    "dropping generator from a stale module"
                );
                continue;
            }
            match instance.generator_mut().initialize(self.context) {
                Ok(()) => live.push(instance),
                Err(fault) => {
                    warn!(generator = instance.type_name(), %fault, "generator failed to initialize");
                    diagnostics.push(Diagnostic::initialization_failure(instance.type_name(), &fault));
                }
            }
        }

        let units: Vec<(&PluginInstance, &SyntaxNode)> = nodes
            .iter()
            .flat_map(|node| live.iter().map(move |instance| (instance, node)))
            .collect();

        let pass = PassSink::new();
        let faults: Vec<Diagnostic> = if self.parallel {
            units
                .par_iter()
                .filter_map(|(instance, node)| self.run_unit(&pass, instance, node))
                .collect()
        } else {
            units
                .iter()
                .filter_map(|(instance, node)| self.run_unit(&pass, instance, node))
                .collect()
        };
        diagnostics.extend(faults);

        let sources = pass.into_sources();
        info!(
            generators = live.len(),
            sources = sources.len(),
            diagnostics = diagnostics.len(),
            "dispatch pass finished"
        );
        GenerationOutput { sources, diagnostics }
    }

    fn run_unit(&self, pass: &PassSink, instance: &PluginInstance, node: &SyntaxNode) -> Option<Diagnostic> {
        let generator = instance.type_name();
        match instance.generator().accept(self.context, node) {
            Err(fault) => Some(Diagnostic::filter_failure(generator, &fault, node.location.clone())),
            Ok(false) => None,
            Ok(true) => {
                let mut unit = pass.unit(generator, node.id);
                let produced = instance.generator().produce_source(&mut unit, self.context, node);
                let fault = match produced {
                    Ok(()) => match unit.commit() {
                        Ok(count) => {
                            debug!(generator, node = node.id.0, count, "committed sources");
                            return None;
                        }
                        Err(fault) => fault,
                    },
                    Err(fault) => fault,
                };
                Some(Diagnostic::production_failure(generator, &fault, node.location.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use microgen_sdk::{GeneratorError, MicroGenerator, NodeId, NodeKind, SourceLocation, SourceSink};

    fn node(id: u32, name: &str) -> SyntaxNode {
        SyntaxNode {
            id: NodeId(id),
            kind: NodeKind::Struct,
            name: Some(name.to_string()),
            module_path: vec![],
            attributes: vec![],
            source: format!("struct {name} ;"),
            location: SourceLocation::new("src/lib.rs", id as usize + 1, 1),
        }
    }

    /// Emits `<name>.g.rs` for every struct; panics in the configured phase for the configured node.
    #[derive(Default)]
    struct Emitter {
        explode_accept: Option<&'static str>,
        explode_emit: Option<&'static str>,
        fail_init: bool,
        calls: Option<Arc<AtomicUsize>>,
    }

    impl MicroGenerator for Emitter {
        fn initialize(&mut self, _: &GenerationContext) -> Result<(), GeneratorError> {
            if self.fail_init {
                return Err(GeneratorError::message("no context"));
            }
            Ok(())
        }

        fn accept(&self, _: &GenerationContext, node: &SyntaxNode) -> bool {
            if let Some(calls) = &self.calls {
                calls.fetch_add(1, Ordering::SeqCst);
            }
            if node.name.as_deref() == self.explode_accept {
                panic!("accept exploded");
            }
            true
        }

        fn produce_source(
            &self,
            sink: &mut dyn SourceSink,
            _: &GenerationContext,
            node: &SyntaxNode,
        ) -> Result<(), GeneratorError> {
            let name = node.name.clone().unwrap_or_default();
            sink.add_source(&format!("{name}.g.rs"), format!("// {name}\n"))?;
            if Some(name.as_str()) == self.explode_emit {
                panic!("emit exploded");
            }
            Ok(())
        }
    }

    fn instance(emitter: Emitter, epoch: u64) -> PluginInstance {
        PluginInstance::in_process("Emitter", Epoch(epoch), emitter)
    }

    fn run(instances: Vec<PluginInstance>, nodes: &[SyntaxNode], parallel: bool) -> GenerationOutput {
        let context = GenerationContext::default();
        Orchestrator::new(&context, Epoch(1))
            .with_parallel(parallel)
            .run(instances, nodes)
    }

    #[test]
    fn test_emits_for_every_accepted_node() {
        let nodes = [node(0, "A"), node(1, "B")];
        let output = run(vec![instance(Emitter::default(), 1)], &nodes, true);
        assert!(output.diagnostics.is_empty());
        let names: Vec<_> = output.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A.g.rs", "B.g.rs"]);
        assert_eq!(output.source("B.g.rs").unwrap().text, "// B\n");
    }

    #[test]
    fn test_filter_fault_is_isolated_to_its_unit() {
        let nodes = [node(0, "A"), node(1, "B")];
        let exploding = Emitter {
            explode_accept: Some("A"),
            ..Emitter::default()
        };
        let output = run(vec![instance(exploding, 1)], &nodes, false);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].id, "MSG002");
        assert_eq!(output.diagnostics[0].location.as_ref().unwrap().line, 1);
        assert!(output.source("B.g.rs").is_some());
        assert!(output.source("A.g.rs").is_none());
    }

    #[test]
    fn test_emit_fault_discards_staged_sources() {
        let nodes = [node(0, "A"), node(1, "B")];
        let exploding = Emitter {
            explode_emit: Some("B"),
            ..Emitter::default()
        };
        let output = run(vec![instance(exploding, 1)], &nodes, true);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].id, "MSG001");
        assert!(output.diagnostics[0].message.contains("emit exploded"));
        assert!(output.source("B.g.rs").is_none());
        assert!(output.source("A.g.rs").is_some());
    }

    #[test]
    fn test_initialization_fault_excludes_generator() {
        let calls = Arc::new(AtomicUsize::new(0));
        let broken = Emitter {
            fail_init: true,
            calls: Some(calls.clone()),
            ..Emitter::default()
        };
        let output = run(vec![instance(broken, 1)], &[node(0, "A")], true);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].id, "MSG003");
        assert!(output.diagnostics[0].location.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(output.sources.is_empty());
    }

    #[test]
    fn test_stale_instances_are_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stale = Emitter {
            calls: Some(calls.clone()),
            ..Emitter::default()
        };
        let output = run(vec![instance(stale, 0)], &[node(0, "A")], true);
        assert_eq!(output, GenerationOutput::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_names_across_generators_report_once() {
        let nodes = [node(0, "A")];
        let output = run(
            vec![instance(Emitter::default(), 1), instance(Emitter::default(), 1)],
            &nodes,
            false,
        );
        assert_eq!(output.sources.len(), 1);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].id, "MSG001");
        assert!(output.diagnostics[0].message.contains("DuplicateSource"));
    }
}
