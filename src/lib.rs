#![deny(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Microgen: a meta source generator
//!
//! Generators are ordinary types inside the crate being generated for, marked with
//! `#[microgen_sdk::micro_generator]`. A pass over a host crate:
//!
//! 1. collects the marked declarations (and `#[generator_dependency]` helpers) together with the imports
//!    they need,
//! 2. assembles them into a synthetic cdylib crate and compiles it with cargo,
//! 3. loads the library and discovers the generator types it contains,
//! 4. runs every generator over every syntax node of the host crate.
//!
//! ```no_run
//! use microgen::{CancellationToken, GeneratorConfig, MetaGenerator};
//!
//! # fn main() -> miette::Result<()> {
//! let config = GeneratorConfig::from_env();
//! let mut generator = MetaGenerator::new(config).map_err(miette::Report::msg)?;
//! let output = generator.generate_crate("path/to/crate".as_ref(), &CancellationToken::new())?;
//! for source in &output.sources {
//!     println!("{}: {} bytes", source.name, source.text.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Panic Policy
//!
//! - **Library code**: explicit `Result`s; `unwrap`/`expect` are denied outside tests.
//! - **Generator code**: panics and errors are captured by `microgen_sdk::guard` on the generator's side
//!   of the library boundary and reported as [`Diagnostic`]s. They never unwind into the host.
//!
//! ## Unsafe
//!
//! Only [`load`] uses `unsafe`, to open the compiled module and call its two entry points.

pub mod build;
pub mod collect;
pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod incremental;
pub mod load;
pub mod pipeline;

pub use build::{BuildError, CargoCompiler, Epoch, ModuleCompiler, SyntheticModule};
pub use config::GeneratorConfig;
pub use diagnostics::{Diagnostic, DiagnosticDescriptor, Severity};
pub use dispatch::{GeneratedSource, GenerationOutput, Orchestrator};
pub use error::{HostError, PipelineError, PipelineResult};
pub use host::{CrateReference, HostProgram, HostProgramBuilder};
pub use incremental::{CancellationToken, Fingerprint, StageStats};
pub use load::{DylibLoader, InProcessLoader, LoadError, ModuleLoader, PluginInstance};
pub use pipeline::{MetaGenerator, PipelineStats};

pub use microgen_sdk;
