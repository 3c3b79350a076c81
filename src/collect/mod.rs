//! Collection stages: marked fragments per source unit and the crate-wide global imports.

pub mod fragments;
pub mod imports;

pub use fragments::{Fragment, collect_unit_fragments};
pub use imports::{GlobalImportSet, is_global_import};
