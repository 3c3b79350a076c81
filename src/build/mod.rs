//! Building the synthetic generator module: assembly, compilation and the resulting module.

pub mod assemble;
pub mod compiler;
pub mod module;

use std::sync::Arc;

use tracing::{info, warn};

pub use assemble::{AssembledCrate, CONTEXT_MODULE, assemble};
pub use compiler::{
    BuildError, CargoCompiler, CompileOutput, CompileRequest, CompilerMessage, MessageLevel, ModuleCompiler,
};
pub use module::{Epoch, SyntheticModule, crate_name_for};

use crate::collect::{Fragment, GlobalImportSet};
use crate::diagnostics::Diagnostic;
use crate::host::CrateReference;

/// Assemble and compile `fragments` into the module for `epoch`.
///
/// Never fails: compile errors are forwarded as the module's diagnostics and a compiler that cannot run
/// becomes a build-failure diagnostic. Without fragments no compilation is attempted.
#[tracing::instrument(skip_all, fields(epoch = epoch.0, fragments = fragments.len()))]
pub fn build_module(
    compiler: &dyn ModuleCompiler,
    epoch: Epoch,
    fragments: &[Fragment],
    globals: &GlobalImportSet,
    references: &[CrateReference],
) -> SyntheticModule {
    if fragments.is_empty() {
        info!("no marked declarations; skipping module compilation");
        return SyntheticModule::empty(epoch);
    }

    let crate_name = crate_name_for(epoch);
    let assembled = assemble(fragments, globals);
    let request = CompileRequest {
        crate_name: &crate_name,
        lib_source: &assembled.source,
        references,
    };

    let (image, diagnostics): (Option<Arc<[u8]>>, Vec<Diagnostic>) = match compiler.compile(&request) {
        Ok(output) => {
            let diagnostics = output.messages.iter().map(Diagnostic::from_compiler).collect();
            (output.image.map(Arc::from), diagnostics)
        }
        Err(error) => {
            warn!(%error, "generator module could not be built");
            (None, vec![Diagnostic::module_build_failure(&crate_name, &error)])
        }
    };
    info!(
        crate_name = %crate_name,
        loadable = image.is_some(),
        probes = assembled.probes.len(),
        "built generator module"
    );
    SyntheticModule::new(epoch, crate_name, assembled.source, image, diagnostics, assembled.probes)
}
