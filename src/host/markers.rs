//! The marker attributes that flag declarations for extraction.

use std::fmt;

use super::program::{HostProgram, SDK_CRATE};
use crate::error::PipelineError;

/// Crates that declare the markers; `microgen_sdk` re-exports them from `microgen_macros`.
pub const MARKER_CRATES: [&str; 2] = [SDK_CRATE, "microgen_macros"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarkerKind {
    /// `#[micro_generator]`: the declaration is a generator
    Generator,
    /// `#[generator_dependency]`: the declaration is needed by a generator
    Dependency,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 2] = [MarkerKind::Generator, MarkerKind::Dependency];

    pub fn attribute_name(self) -> &'static str {
        match self {
            MarkerKind::Generator => "micro_generator",
            MarkerKind::Dependency => "generator_dependency",
        }
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SDK_CRATE}::{}", self.attribute_name())
    }
}

/// Canonical paths under which each marker is reachable from the host program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSymbols {
    paths: Vec<(String, MarkerKind)>,
}

impl MarkerSymbols {
    /// Resolve the markers against the crates `program` references.
    ///
    /// Fails with [`PipelineError::MarkerUnresolved`] when no marker crate is referenced.
    pub fn resolve(program: &HostProgram) -> Result<Self, PipelineError> {
        let crates: Vec<&str> = MARKER_CRATES
            .iter()
            .copied()
            .filter(|name| program.reference(name).is_some())
            .collect();

        let mut paths = Vec::new();
        for kind in MarkerKind::ALL {
            if crates.is_empty() {
                return Err(PipelineError::MarkerUnresolved { marker: kind.to_string() });
            }
            paths.extend(
                crates
                    .iter()
                    .map(|krate| (format!("{krate}::{}", kind.attribute_name()), kind)),
            );
        }
        Ok(Self { paths })
    }

    /// The marker any of the resolution candidates names.
    pub fn classify(&self, candidates: &[String]) -> Option<MarkerKind> {
        candidates
            .iter()
            .find_map(|candidate| self.paths.iter().find(|(path, _)| path == candidate).map(|(_, k)| *k))
    }
}
