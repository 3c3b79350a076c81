//! Loading the generator module and instantiating its generators
//!
//! A [`ModuleLoader`] turns a [`SyntheticModule`] into a [`PluginSource`]; the source hands out fresh
//! [`PluginInstance`]s once per pass. [`DylibLoader`] loads the compiled image with `libloading`;
//! [`InProcessLoader`] serves generators the host registered directly.

#![allow(unsafe_code)]

use std::ffi::CStr;
use std::fs;
use std::io;
use std::sync::Arc;

use libloading::Library;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use microgen_sdk::registry::{
    Candidate, CandidateShape, DISCOVER_SYMBOL, DiscoverFn, Discovery, FFI_PROTOCOL_VERSION, MANIFEST_SYMBOL,
    ManifestFn, SDK_VERSION,
};
use microgen_sdk::{Fault, Guarded, GuardedGenerator, MicroGenerator, guard};

use crate::build::{Epoch, SyntheticModule};
use crate::diagnostics::Diagnostic;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to stage the module image: {0}")]
    Stage(#[from] io::Error),

    #[error("failed to load the module library: {0}")]
    Library(#[source] libloading::Error),

    #[error("module does not export `{symbol}`: {source}")]
    MissingSymbol {
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    #[error("module speaks FFI protocol {found}, host expects {expected}")]
    IncompatibleFfiVersion { expected: u32, found: u32 },

    #[error("module was built against microgen_sdk {found}, host uses {expected}")]
    IncompatibleSdkVersion { expected: String, found: String },

    #[error("module manifest is malformed: {0}")]
    InvalidManifest(String),

    #[error("module returned no discovery table")]
    EmptyDiscovery,
}

// ============================================================================
// Plugin instances
// ============================================================================

/// One generator instance, owned by exactly one dispatch pass.
pub struct PluginInstance {
    // Dropped before `_keepalive`: the generator's code lives in the loaded library.
    generator: Box<dyn GuardedGenerator>,
    type_name: String,
    epoch: Epoch,
    _keepalive: Option<Arc<dyn PluginSource>>,
}

impl PluginInstance {
    pub fn new(
        type_name: impl Into<String>,
        epoch: Epoch,
        generator: Box<dyn GuardedGenerator>,
        keepalive: Option<Arc<dyn PluginSource>>,
    ) -> Self {
        Self {
            generator,
            type_name: type_name.into(),
            epoch,
            _keepalive: keepalive,
        }
    }

    /// Wrap a generator value living in the host process.
    pub fn in_process<G: MicroGenerator + 'static>(type_name: impl Into<String>, epoch: Epoch, generator: G) -> Self {
        Self::new(type_name, epoch, Box::new(Guarded::new(generator)), None)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn generator(&self) -> &dyn GuardedGenerator {
        self.generator.as_ref()
    }

    pub fn generator_mut(&mut self) -> &mut dyn GuardedGenerator {
        self.generator.as_mut()
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("type_name", &self.type_name)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

/// Instances created for one pass, plus construction diagnostics.
#[derive(Debug, Default)]
pub struct Instantiation {
    pub instances: Vec<PluginInstance>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Instantiation {
    /// Turn a discovery table into instances; wrong-shape candidates become diagnostics or are skipped.
    pub fn from_discovery(
        discovery: Discovery,
        epoch: Epoch,
        keepalive: Option<Arc<dyn PluginSource>>,
    ) -> Self {
        let mut out = Self::default();
        for Candidate { type_name, shape } in discovery.candidates {
            match shape {
                CandidateShape::Generator(generator) => {
                    out.instances
                        .push(PluginInstance::new(type_name, epoch, generator, keepalive.clone()));
                }
                CandidateShape::MissingConstructor => {
                    let fault = Fault::new(
                        "MissingConstructor",
                        "<discovery>",
                        format!("`{type_name}` implements MicroGenerator but not Default"),
                    );
                    out.diagnostics.push(Diagnostic::construction_failure(&type_name, &fault));
                }
                CandidateShape::ConstructionFailed(fault) => {
                    out.diagnostics.push(Diagnostic::construction_failure(&type_name, &fault));
                }
                CandidateShape::NotAGenerator => {
                    debug!(%type_name, "extracted type is not a generator");
                }
            }
        }
        out
    }
}

/// A loaded module that can produce generator instances.
pub trait PluginSource: Send + Sync {
    fn epoch(&self) -> Epoch;

    /// Create a fresh set of instances; called once per dispatch pass.
    fn instantiate(self: Arc<Self>) -> Instantiation;
}

/// Result of a load attempt.
#[derive(Clone, Default)]
pub struct LoadOutcome {
    pub source: Option<Arc<dyn PluginSource>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn loaded(source: Arc<dyn PluginSource>) -> Self {
        Self {
            source: Some(source),
            diagnostics: Vec::new(),
        }
    }
}

impl std::fmt::Debug for LoadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOutcome")
            .field("epoch", &self.source.as_ref().map(|s| s.epoch()))
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

/// Makes a module's generators available to the host.
pub trait ModuleLoader {
    /// Load `module`. Modules without an image are never loaded.
    fn load(&self, module: &SyntheticModule) -> LoadOutcome;
}

// ============================================================================
// Dynamic library loading
// ============================================================================

/// Loads compiled modules with `libloading`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DylibLoader;

impl ModuleLoader for DylibLoader {
    #[tracing::instrument(skip_all, fields(epoch = module.epoch().0))]
    fn load(&self, module: &SyntheticModule) -> LoadOutcome {
        let Some(image) = module.image() else {
            return LoadOutcome::empty();
        };
        match LoadedLibrary::open(module.epoch(), module.crate_name(), image) {
            Ok(library) => {
                info!(crate_name = module.crate_name(), "loaded generator module");
                LoadOutcome::loaded(Arc::new(library))
            }
            Err(error) => {
                warn!(%error, "generator module failed to load");
                LoadOutcome {
                    source: None,
                    diagnostics: vec![Diagnostic::module_load_failure(module.crate_name(), &error)],
                }
            }
        }
    }
}

/// A module image loaded from a scratch file.
pub struct LoadedLibrary {
    epoch: Epoch,
    discover: DiscoverFn,
    // Unloaded before the scratch directory is removed.
    _library: Library,
    _dir: TempDir,
}

impl LoadedLibrary {
    pub fn open(epoch: Epoch, crate_name: &str, image: &[u8]) -> Result<Self, LoadError> {
        let dir = tempfile::Builder::new().prefix("microgen-module-").tempdir()?;
        let path = dir.path().join(format!(
            "{}{crate_name}.{}",
            std::env::consts::DLL_PREFIX,
            std::env::consts::DLL_EXTENSION
        ));
        fs::write(&path, image)?;

        // Safety: the image was compiled by this process from the host's own marked declarations
        let library = unsafe { Library::new(&path) }.map_err(LoadError::Library)?;

        let manifest_fn: ManifestFn = unsafe {
            *library
                .get::<ManifestFn>(MANIFEST_SYMBOL)
                .map_err(|source| LoadError::MissingSymbol {
                    symbol: String::from_utf8_lossy(MANIFEST_SYMBOL).into_owned(),
                    source,
                })?
        };
        let manifest = unsafe { manifest_fn() };

        // Check FFI protocol version first (ABI compatibility)
        if manifest.ffi_version != FFI_PROTOCOL_VERSION {
            return Err(LoadError::IncompatibleFfiVersion {
                expected: FFI_PROTOCOL_VERSION,
                found: manifest.ffi_version,
            });
        }
        if manifest.sdk_version.is_null() {
            return Err(LoadError::InvalidManifest("missing SDK version".to_string()));
        }
        // Safety: points at the module's NUL-terminated static SDK_VERSION
        let sdk_version = unsafe { CStr::from_ptr(manifest.sdk_version) }
            .to_str()
            .map_err(|e| LoadError::InvalidManifest(e.to_string()))?;
        if !is_compatible_sdk_version(sdk_version) {
            return Err(LoadError::IncompatibleSdkVersion {
                expected: host_sdk_version().to_string(),
                found: sdk_version.to_string(),
            });
        }

        let discover: DiscoverFn = unsafe {
            *library
                .get::<DiscoverFn>(DISCOVER_SYMBOL)
                .map_err(|source| LoadError::MissingSymbol {
                    symbol: String::from_utf8_lossy(DISCOVER_SYMBOL).into_owned(),
                    source,
                })?
        };

        Ok(Self {
            epoch,
            discover,
            _library: library,
            _dir: dir,
        })
    }
}

impl PluginSource for LoadedLibrary {
    fn epoch(&self) -> Epoch {
        self.epoch
    }

    fn instantiate(self: Arc<Self>) -> Instantiation {
        let epoch = self.epoch;
        // Safety: the discover entry point was checked against the manifest's protocol version
        let raw = unsafe { (self.discover)() };
        if raw.is_null() {
            return Instantiation {
                instances: Vec::new(),
                diagnostics: vec![Diagnostic::module_load_failure(
                    &epoch.to_string(),
                    &LoadError::EmptyDiscovery,
                )],
            };
        }
        // Safety: the module hands over ownership of a `Box<Discovery>` it leaked with `Box::into_raw`
        let discovery = unsafe { Box::from_raw(raw) };
        let keepalive: Arc<dyn PluginSource> = self;
        let instantiation = Instantiation::from_discovery(*discovery, epoch, Some(keepalive));
        debug!(instances = instantiation.instances.len(), "instantiated generators");
        instantiation
    }
}

fn host_sdk_version() -> &'static str {
    SDK_VERSION.trim_end_matches('\0')
}

/// Check if module SDK version is compatible with host: major and minor must match.
fn is_compatible_sdk_version(module_version: &str) -> bool {
    let host_parts: Vec<&str> = host_sdk_version().split('.').collect();
    let module_parts: Vec<&str> = module_version.split('.').collect();

    if host_parts.len() < 2 || module_parts.len() < 2 {
        return false;
    }
    host_parts[0] == module_parts[0] && host_parts[1] == module_parts[1]
}

// ============================================================================
// In-process registration
// ============================================================================

type Factory = Arc<dyn Fn() -> CandidateShape + Send + Sync>;

/// Serves generators registered by the host instead of loading the compiled image.
///
/// A module is still required to be loadable, so compile failures keep suppressing dispatch.
#[derive(Clone, Default)]
pub struct InProcessLoader {
    registrations: Vec<(String, Factory)>,
}

impl InProcessLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generator constructed through `Default` on every pass.
    pub fn register<G: MicroGenerator + Default + 'static>(self, type_name: impl Into<String>) -> Self {
        self.register_with(type_name, || match guard(|| Ok(G::default())) {
            Ok(generator) => CandidateShape::Generator(Box::new(Guarded::new(generator))),
            Err(fault) => CandidateShape::ConstructionFailed(fault),
        })
    }

    /// Register a raw factory, called once per pass.
    pub fn register_with(
        mut self,
        type_name: impl Into<String>,
        factory: impl Fn() -> CandidateShape + Send + Sync + 'static,
    ) -> Self {
        self.registrations.push((type_name.into(), Arc::new(factory)));
        self
    }
}

impl ModuleLoader for InProcessLoader {
    fn load(&self, module: &SyntheticModule) -> LoadOutcome {
        if !module.is_loadable() {
            return LoadOutcome::empty();
        }
        LoadOutcome::loaded(Arc::new(InProcessModule {
            epoch: module.epoch(),
            registrations: self.registrations.clone(),
        }))
    }
}

struct InProcessModule {
    epoch: Epoch,
    registrations: Vec<(String, Factory)>,
}

impl PluginSource for InProcessModule {
    fn epoch(&self) -> Epoch {
        self.epoch
    }

    fn instantiate(self: Arc<Self>) -> Instantiation {
        let mut discovery = Discovery::new();
        for (type_name, factory) in &self.registrations {
            discovery.offer(Candidate::new(type_name.clone(), factory()));
        }
        Instantiation::from_discovery(discovery, self.epoch, None)
    }
}
