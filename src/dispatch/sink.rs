//! Output sinks: a pass-wide registry and per-unit staging buffers.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use microgen_sdk::{Fault, GeneratorError, NodeId, SourceSink};

/// A source artifact produced during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSource {
    pub name: String,
    pub text: String,
    /// Type name of the generator that produced it
    pub generator: String,
    pub node: NodeId,
}

/// Pass-wide registry of committed sources, shared by every dispatch unit.
#[derive(Debug, Default)]
pub struct PassSink {
    sources: Mutex<BTreeMap<String, GeneratedSource>>,
}

impl PassSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Open a staging buffer for one (node, generator) unit.
    pub fn unit<'p>(&'p self, generator: &'p str, node: NodeId) -> UnitSink<'p> {
        UnitSink {
            pass: self,
            generator,
            node,
            staged: Vec::new(),
        }
    }

    /// Committed sources, ordered by name.
    pub fn into_sources(self) -> Vec<GeneratedSource> {
        self.sources
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_values()
            .collect()
    }
}

/// Staging buffer of one dispatch unit.
///
/// Sources become visible to the pass only on [`commit`](UnitSink::commit); dropping the buffer discards
/// them, which is what happens when the unit faults.
pub struct UnitSink<'p> {
    pass: &'p PassSink,
    generator: &'p str,
    node: NodeId,
    staged: Vec<(String, String)>,
}

impl UnitSink<'_> {
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Publish the staged sources atomically. A name committed concurrently by another unit fails the
    /// whole commit and nothing is published.
    pub fn commit(self) -> Result<usize, Fault> {
        let mut sources = self.pass.sources.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((name, _)) = self.staged.iter().find(|(name, _)| sources.contains_key(name)) {
            let error = GeneratorError::DuplicateSource(name.clone());
            return Err(Fault::new(error.category(), "<commit>", error.to_string()));
        }
        let count = self.staged.len();
        for (name, text) in self.staged {
            sources.insert(
                name.clone(),
                GeneratedSource {
                    name,
                    text,
                    generator: self.generator.to_string(),
                    node: self.node,
                },
            );
        }
        Ok(count)
    }
}

impl SourceSink for UnitSink<'_> {
    fn add_source(&mut self, name: &str, text: String) -> Result<(), GeneratorError> {
        if self.staged.iter().any(|(staged, _)| staged == name) || self.pass.contains(name) {
            return Err(GeneratorError::DuplicateSource(name.to_string()));
        }
        self.staged.push((name.to_string(), text));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_publishes_staged_sources() {
        let pass = PassSink::new();
        let mut unit = pass.unit("Gen", NodeId(1));
        unit.add_source("A.g.rs", "// a".to_string()).unwrap();
        assert!(!pass.contains("A.g.rs"));
        assert_eq!(unit.commit(), Ok(1));

        let sources = pass.into_sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].generator, "Gen");
        assert_eq!(sources[0].node, NodeId(1));
    }

    #[test]
    fn test_duplicate_within_unit_is_rejected() {
        let pass = PassSink::new();
        let mut unit = pass.unit("Gen", NodeId(1));
        unit.add_source("A.g.rs", String::new()).unwrap();
        let err = unit.add_source("A.g.rs", String::new()).unwrap_err();
        assert!(matches!(err, GeneratorError::DuplicateSource(name) if name == "A.g.rs"));
        assert_eq!(unit.staged_len(), 1);
    }

    #[test]
    fn test_duplicate_across_units_is_rejected() {
        let pass = PassSink::new();
        let mut first = pass.unit("Gen", NodeId(1));
        first.add_source("A.g.rs", String::new()).unwrap();
        first.commit().unwrap();

        let mut second = pass.unit("Other", NodeId(2));
        assert!(second.add_source("A.g.rs", String::new()).is_err());
    }

    #[test]
    fn test_conflicting_commit_publishes_nothing() {
        let pass = PassSink::new();
        let mut first = pass.unit("Gen", NodeId(1));
        let mut second = pass.unit("Other", NodeId(2));
        first.add_source("A.g.rs", String::new()).unwrap();
        second.add_source("B.g.rs", String::new()).unwrap();
        second.add_source("A.g.rs", String::new()).unwrap();
        first.commit().unwrap();

        let fault = second.commit().unwrap_err();
        assert_eq!(fault.category, "DuplicateSource");
        let names: Vec<_> = pass.into_sources().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["A.g.rs"]);
    }

    #[test]
    fn test_dropped_unit_discards_sources() {
        let pass = PassSink::new();
        let mut unit = pass.unit("Gen", NodeId(1));
        unit.add_source("A.g.rs", String::new()).unwrap();
        drop(unit);
        assert!(pass.into_sources().is_empty());
    }
}
