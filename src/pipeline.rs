//! The incremental generation pipeline
//!
//! ```text
//! HostProgram ─┬─ fragments (per unit) ─┐
//!              └─ global imports ───────┴─ module ── load ── dispatch ── GenerationOutput
//! ```
//!
//! Every stage sits behind a memo cell keyed by structural equality of its inputs, so a pass over a
//! merely reformatted host program recompiles nothing and reloads nothing. Dispatch also keys on the raw
//! text, because the nodes and diagnostics it produces carry source locations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::build::{BuildError, CargoCompiler, Epoch, ModuleCompiler, SyntheticModule, build_module};
use crate::collect::{Fragment, GlobalImportSet, collect_unit_fragments};
use crate::config::GeneratorConfig;
use crate::dispatch::{GenerationOutput, Orchestrator};
use crate::error::PipelineError;
use crate::host::{CrateReference, HostProgram, NodeIndex, SDK_CRATE, SemanticModel};
use crate::incremental::{CancellationToken, Fingerprint, KeyedMemo, Memo, StageStats};
use crate::load::{DylibLoader, LoadOutcome, ModuleLoader};

type ModuleInput = (Vec<Fragment>, GlobalImportSet, Vec<CrateReference>);

/// Hit/miss counters of every stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub fragments: StageStats,
    pub globals: StageStats,
    pub module: StageStats,
    pub load: StageStats,
    pub dispatch: StageStats,
}

/// The meta generator: owns the compiler, the loader and the memo state carried between passes.
pub struct MetaGenerator<C: ModuleCompiler = CargoCompiler, L: ModuleLoader = DylibLoader> {
    config: GeneratorConfig,
    compiler: C,
    loader: L,
    fragments: KeyedMemo<PathBuf, (Fingerprint, Fingerprint), Vec<Fragment>>,
    globals: Memo<Fingerprint, GlobalImportSet>,
    module: Memo<ModuleInput, SyntheticModule>,
    plugins: Memo<Epoch, LoadOutcome>,
    // Keyed on layout too: node locations and fault locations are span-derived.
    output: Memo<(Fingerprint, Fingerprint, Epoch), GenerationOutput>,
    epoch: Epoch,
}

impl MetaGenerator {
    /// A generator that compiles with cargo and loads the module as a dynamic library.
    pub fn new(config: GeneratorConfig) -> Result<Self, BuildError> {
        let compiler = CargoCompiler::new(config.clone())?;
        Ok(Self::with_backends(config, compiler, DylibLoader))
    }
}

impl<C: ModuleCompiler, L: ModuleLoader> MetaGenerator<C, L> {
    pub fn with_backends(config: GeneratorConfig, compiler: C, loader: L) -> Self {
        Self {
            config,
            compiler,
            loader,
            fragments: KeyedMemo::new(),
            globals: Memo::new(),
            module: Memo::new(),
            plugins: Memo::new(),
            output: Memo::new(),
            epoch: Epoch::default(),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            fragments: self.fragments.stats(),
            globals: self.globals.stats(),
            module: self.module.stats(),
            load: self.plugins.stats(),
            dispatch: self.output.stats(),
        }
    }

    /// The module built by the most recent pass.
    pub fn current_module(&self) -> Option<&SyntheticModule> {
        self.module.peek()
    }

    /// Load the crate at `root` from disk and run a pass over it.
    pub fn generate_crate(
        &mut self,
        root: &Path,
        cancellation: &CancellationToken,
    ) -> Result<GenerationOutput, PipelineError> {
        let program = HostProgram::load_crate(root, &self.config)?;
        self.run(&program, cancellation)
    }

    /// Run one pass over `program`.
    ///
    /// Only an unresolvable marker (or cancellation) fails the pass; every other problem is reported in
    /// the output's diagnostics.
    #[tracing::instrument(skip_all, fields(crate_name = program.crate_name(), units = program.units().len()))]
    pub fn run(
        &mut self,
        program: &HostProgram,
        cancellation: &CancellationToken,
    ) -> Result<GenerationOutput, PipelineError> {
        cancellation.check()?;
        let semantic = SemanticModel::new(program)?;
        let references = self.reference_set(program);
        let references_fingerprint =
            Fingerprint::combine(references.iter().map(|r| Fingerprint::of_str(&r.manifest_entry())));

        // Fragments, one memo entry per unit
        let mut fragments = Vec::new();
        let mut live = HashSet::new();
        for unit in program.units() {
            let key = unit.path().to_path_buf();
            let collected = self.fragments.get_or_compute(
                &key,
                (unit.fingerprint(), references_fingerprint),
                |_| collect_unit_fragments(unit, &semantic),
            );
            fragments.extend(collected);
            live.insert(key);
        }
        self.fragments.retain_keys(&live);
        debug!(fragments = fragments.len(), "collected fragments");

        cancellation.check()?;
        let globals = self
            .globals
            .get_or_compute(program.fingerprint(), |_| GlobalImportSet::collect(program));

        cancellation.check()?;
        let compiler = &self.compiler;
        let epoch = &mut self.epoch;
        let module = self
            .module
            .get_or_compute((fragments, globals, references), |(fragments, globals, references)| {
                *epoch = epoch.next();
                build_module(compiler, *epoch, fragments, globals, references)
            });

        cancellation.check()?;
        let loader = &self.loader;
        let loaded = self.plugins.get_or_compute(module.epoch(), |_| loader.load(&module));

        cancellation.check()?;
        let parallel = self.config.parallel;
        let output = self
            .output
            .get_or_compute((program.fingerprint(), program.layout_fingerprint(), module.epoch()), |_| {
                let mut output = GenerationOutput {
                    sources: Vec::new(),
                    diagnostics: module.diagnostics().to_vec(),
                };
                output.diagnostics.extend(loaded.diagnostics.iter().cloned());
                let Some(source) = loaded.source.clone() else {
                    return output;
                };

                let instantiation = source.instantiate();
                output.diagnostics.extend(instantiation.diagnostics);
                let index = NodeIndex::build(&semantic);
                let pass = Orchestrator::new(index.context(), module.epoch())
                    .with_parallel(parallel)
                    .run(instantiation.instances, index.nodes());
                output.sources = pass.sources;
                output.diagnostics.extend(pass.diagnostics);
                output
            });

        info!(
            epoch = module.epoch().0,
            sources = output.sources.len(),
            diagnostics = output.diagnostics.len(),
            "generation pass finished"
        );
        Ok(output)
    }

    /// Host references plus the SDK, which generator modules always compile against.
    fn reference_set(&self, program: &HostProgram) -> Vec<CrateReference> {
        let mut references = program.references().to_vec();
        if !references.iter().any(|r| r.name == SDK_CRATE) {
            references.push(CrateReference::path(SDK_CRATE, self.config.sdk_path.clone()));
            references.sort_by(|a, b| a.name.cmp(&b.name));
        }
        references
    }
}
