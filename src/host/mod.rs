//! The host program model: parsed source units, crate references, name resolution and node enumeration.

pub mod markers;
pub mod nodes;
pub mod program;
pub mod semantic;
pub mod unit;

pub use markers::{MarkerKind, MarkerSymbols};
pub use nodes::NodeIndex;
pub use program::{CrateReference, HostProgram, HostProgramBuilder, ReferenceSource, SDK_CRATE};
pub use semantic::{ImportBinding, Scope, SemanticModel};
pub use unit::{SourceUnit, UnitId, module_path_for};
