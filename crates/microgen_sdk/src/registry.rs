//! Discovery of generator types inside a compiled plugin module.
//!
//! The host generates, for every type extracted into the module, a probe expression of the form
//!
//! ```ignore
//! use microgen_sdk::registry::{Probe, ViaAnyType, ViaConstructible, ViaGenerator};
//! discovery.offer((&&&Probe::<MyType>::new("path::MyType")).describe());
//! ```
//!
//! Method resolution picks the most specific `describe` available for the concrete type:
//!
//! 1. [`ViaConstructible`]: the type implements `MicroGenerator + Default` and is instantiated
//! 2. [`ViaGenerator`]: the type implements `MicroGenerator` but has no `Default`
//! 3. [`ViaAnyType`]: anything else, which is not a generator
//!
//! so a type of the wrong shape never becomes a plugin instance and never breaks the module's compilation.
//!
//! The module exports two entry points, [`MANIFEST_SYMBOL`] returning a [`ModuleManifest`] and
//! [`DISCOVER_SYMBOL`] returning a boxed [`Discovery`].

use std::ffi::c_char;
use std::marker::PhantomData;

use crate::fault::{Fault, guard};
use crate::generator::{Guarded, GuardedGenerator, MicroGenerator};

/// ABI revision of the entry points. Host and module must agree exactly.
pub const FFI_PROTOCOL_VERSION: u32 = 1;

/// SDK version the module was compiled against, NUL-terminated.
pub const SDK_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

pub const MANIFEST_SYMBOL: &[u8] = b"microgen_module_manifest";
pub const DISCOVER_SYMBOL: &[u8] = b"microgen_module_discover";

/// Signature of the manifest entry point.
pub type ManifestFn = unsafe extern "C" fn() -> ModuleManifest;

/// Signature of the discovery entry point.
#[allow(improper_ctypes_definitions)]
pub type DiscoverFn = unsafe extern "C" fn() -> *mut Discovery;

/// Version information exported by every plugin module.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ModuleManifest {
    pub ffi_version: u32,
    pub sdk_version: *const c_char,
}

impl ModuleManifest {
    pub fn current() -> Self {
        Self {
            ffi_version: FFI_PROTOCOL_VERSION,
            sdk_version: SDK_VERSION.as_ptr().cast(),
        }
    }
}

/// What a probe found out about one type.
pub enum CandidateShape {
    Generator(Box<dyn GuardedGenerator>),
    /// Implements the generator capability but has no `Default` constructor
    MissingConstructor,
    /// `Default` panicked
    ConstructionFailed(Fault),
    NotAGenerator,
}

impl std::fmt::Debug for CandidateShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateShape::Generator(_) => write!(f, "Generator(..)"),
            CandidateShape::MissingConstructor => write!(f, "MissingConstructor"),
            CandidateShape::ConstructionFailed(fault) => write!(f, "ConstructionFailed({fault})"),
            CandidateShape::NotAGenerator => write!(f, "NotAGenerator"),
        }
    }
}

/// A probed type.
#[derive(Debug)]
pub struct Candidate {
    pub type_name: String,
    pub shape: CandidateShape,
}

impl Candidate {
    pub fn new(type_name: impl Into<String>, shape: CandidateShape) -> Self {
        Self {
            type_name: type_name.into(),
            shape,
        }
    }
}

/// Everything a module's discovery entry point reports, in declaration order.
#[derive(Debug, Default)]
pub struct Discovery {
    pub candidates: Vec<Candidate>,
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }
}

/// Zero-sized probe over a concrete type; see the module docs.
pub struct Probe<T> {
    type_name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Probe<T> {
    pub const fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            _marker: PhantomData,
        }
    }
}

pub trait ViaConstructible {
    fn describe(&self) -> Candidate;
}

pub trait ViaGenerator {
    fn describe(&self) -> Candidate;
}

pub trait ViaAnyType {
    fn describe(&self) -> Candidate;
}

impl<T: MicroGenerator + Default + 'static> ViaConstructible for &&Probe<T> {
    fn describe(&self) -> Candidate {
        let shape = match guard(|| Ok(T::default())) {
            Ok(generator) => CandidateShape::Generator(Box::new(Guarded::new(generator))),
            Err(fault) => CandidateShape::ConstructionFailed(fault),
        };
        Candidate::new(self.type_name, shape)
    }
}

impl<T: MicroGenerator + 'static> ViaGenerator for &Probe<T> {
    fn describe(&self) -> Candidate {
        Candidate::new(self.type_name, CandidateShape::MissingConstructor)
    }
}

impl<T> ViaAnyType for Probe<T> {
    fn describe(&self) -> Candidate {
        Candidate::new(self.type_name, CandidateShape::NotAGenerator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GenerationContext;
    use crate::generator::{GeneratorError, SourceSink};
    use crate::syntax::SyntaxNode;

    #[derive(Default)]
    struct Constructible;

    struct NoDefault;

    struct Exploding;

    impl Default for Exploding {
        fn default() -> Self {
            panic!("constructor failed")
        }
    }

    struct PlainData {
        _value: u32,
    }

    macro_rules! impl_noop_generator {
        ($($ty:ty),*) => {$(
            impl MicroGenerator for $ty {
                fn accept(&self, _: &GenerationContext, _: &SyntaxNode) -> bool {
                    false
                }

                fn produce_source(
                    &self,
                    _: &mut dyn SourceSink,
                    _: &GenerationContext,
                    _: &SyntaxNode,
                ) -> Result<(), GeneratorError> {
                    Ok(())
                }
            }
        )*};
    }

    impl_noop_generator!(Constructible, NoDefault, Exploding);

    #[test]
    fn test_probe_instantiates_constructible_generator() {
        let candidate = (&&&Probe::<Constructible>::new("Constructible")).describe();
        assert_eq!(candidate.type_name, "Constructible");
        assert!(matches!(candidate.shape, CandidateShape::Generator(_)));
    }

    #[test]
    fn test_probe_reports_missing_constructor() {
        let candidate = (&&&Probe::<NoDefault>::new("NoDefault")).describe();
        assert!(matches!(candidate.shape, CandidateShape::MissingConstructor));
    }

    #[test]
    fn test_probe_reports_constructor_panic() {
        let candidate = (&&&Probe::<Exploding>::new("Exploding")).describe();
        match candidate.shape {
            CandidateShape::ConstructionFailed(fault) => assert_eq!(fault.message, "constructor failed"),
            other => panic!("expected construction failure, got {other:?}"),
        }
    }

    #[test]
    fn test_probe_skips_wrong_shape() {
        let _ = PlainData { _value: 1 };
        let candidate = (&&&Probe::<PlainData>::new("PlainData")).describe();
        assert!(matches!(candidate.shape, CandidateShape::NotAGenerator));
    }

    #[test]
    fn test_manifest_carries_sdk_version() {
        let manifest = ModuleManifest::current();
        assert_eq!(manifest.ffi_version, FFI_PROTOCOL_VERSION);
        let version = unsafe { std::ffi::CStr::from_ptr(manifest.sdk_version) };
        assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }
}
