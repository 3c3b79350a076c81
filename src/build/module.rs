//! The synthetic module produced by one build.

use std::fmt;
use std::sync::Arc;

use crate::diagnostics::Diagnostic;

/// Generation tag of a module build. Every rebuild gets a fresh, larger epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn next(self) -> Self {
        Epoch(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {}", self.0)
    }
}

/// A compiled (or failed) generator module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticModule {
    epoch: Epoch,
    crate_name: String,
    source: String,
    image: Option<Arc<[u8]>>,
    diagnostics: Vec<Diagnostic>,
    probes: Vec<String>,
}

impl SyntheticModule {
    pub fn new(
        epoch: Epoch,
        crate_name: impl Into<String>,
        source: String,
        image: Option<Arc<[u8]>>,
        diagnostics: Vec<Diagnostic>,
        probes: Vec<String>,
    ) -> Self {
        Self {
            epoch,
            crate_name: crate_name.into(),
            source,
            image,
            diagnostics,
            probes,
        }
    }

    /// A module with no fragments: nothing compiled, nothing to load.
    pub fn empty(epoch: Epoch) -> Self {
        Self::new(epoch, crate_name_for(epoch), String::new(), None, Vec::new(), Vec::new())
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn crate_name(&self) -> &str {
        &self.crate_name
    }

    /// The assembled `lib.rs` (empty when there were no fragments).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The loadable binary image, present only when compilation succeeded.
    pub fn image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }

    pub fn is_loadable(&self) -> bool {
        self.image.is_some()
    }

    /// Compiler and build diagnostics of this module.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Types the module probes for generators.
    pub fn probes(&self) -> &[String] {
        &self.probes
    }
}

/// Crate name of the module built in `epoch`.
pub fn crate_name_for(epoch: Epoch) -> String {
    format!("microgen_module_{}", epoch.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_module_is_not_loadable() {
        let module = SyntheticModule::empty(Epoch(3));
        assert!(!module.is_loadable());
        assert_eq!(module.crate_name(), "microgen_module_3");
        assert!(module.diagnostics().is_empty());
        assert!(module.source().is_empty());
    }

    #[test]
    fn test_epochs_increase() {
        assert!(Epoch(1).next() > Epoch(1));
        assert_eq!(Epoch::default().next().to_string(), "epoch 1");
    }
}
