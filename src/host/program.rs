//! The host program: the crate being generated for, and the crates it references.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::unit::{SourceUnit, UnitId, module_path_for};
use crate::config::GeneratorConfig;
use crate::error::HostError;
use crate::incremental::Fingerprint;

/// Name of the crate that declares the marker attributes and the plugin contract.
pub const SDK_CRATE: &str = "microgen_sdk";

/// Where a referenced crate comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceSource {
    Path(PathBuf),
    /// A crates.io version requirement
    Version(String),
}

/// A crate the host program depends on. The generator module is compiled against the same set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrateReference {
    pub name: String,
    pub source: ReferenceSource,
}

impl CrateReference {
    pub fn path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: ReferenceSource::Path(path.into()),
        }
    }

    pub fn version(name: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: ReferenceSource::Version(requirement.into()),
        }
    }

    /// The `[dependencies]` line for this reference.
    pub fn manifest_entry(&self) -> String {
        match &self.source {
            ReferenceSource::Path(path) => {
                format!("{} = {{ path = {:?} }}", self.name, path.display().to_string())
            }
            ReferenceSource::Version(requirement) => format!("{} = {:?}", self.name, requirement),
        }
    }
}

/// A host crate held as parsed source units.
#[derive(Debug, Clone)]
pub struct HostProgram {
    crate_name: String,
    units: Vec<SourceUnit>,
    references: Vec<CrateReference>,
    fingerprint: Fingerprint,
    layout: Fingerprint,
}

impl HostProgram {
    pub fn builder(crate_name: impl Into<String>) -> HostProgramBuilder {
        HostProgramBuilder::new(crate_name)
    }

    /// Load the library target of the crate at `root`: every `src/**/*.rs` file except other target roots.
    ///
    /// `src/bin/` always belongs to separate binaries, and `src/main.rs` is skipped when `src/lib.rs` exists.
    /// A crate without `lib.rs` is loaded from `main.rs`.
    ///
    /// The crate name is the directory name with `-` replaced by `_`. Crate references are not read from
    /// the manifest; only the SDK is injected (from `config.sdk_path`). Add others with
    /// [`HostProgramBuilder::reference`] through [`HostProgram::load_crate_with`].
    pub fn load_crate(root: &Path, config: &GeneratorConfig) -> Result<Self, HostError> {
        Self::load_crate_with(root, config, |builder| builder)
    }

    pub fn load_crate_with(
        root: &Path,
        config: &GeneratorConfig,
        customize: impl FnOnce(HostProgramBuilder) -> HostProgramBuilder,
    ) -> Result<Self, HostError> {
        let src = root.join("src");
        if !src.is_dir() {
            return Err(HostError::MissingSourceDir(root.to_path_buf()));
        }
        let crate_name = root
            .file_name()
            .map(|n| n.to_string_lossy().replace('-', "_"))
            .unwrap_or_else(|| "host".to_string());

        let has_lib = src.join("lib.rs").is_file();
        let mut files = Vec::new();
        collect_rust_files(&src, &mut files)?;
        files.retain(|file| {
            let relative = file.strip_prefix(&src).unwrap_or(file);
            let binary_root = relative.starts_with("bin") || (has_lib && relative == Path::new("main.rs"));
            if binary_root {
                debug!(file = %relative.display(), "skipping binary target source");
            }
            !binary_root
        });
        files.sort();

        let mut builder = HostProgramBuilder::new(crate_name).sdk_path(&config.sdk_path);
        for file in files {
            let text = fs::read_to_string(&file).map_err(|source| HostError::Read {
                path: file.clone(),
                source,
            })?;
            let relative = file.strip_prefix(&src).unwrap_or(&file);
            let module_path = module_path_for(relative);
            let display = Path::new("src").join(relative);
            builder = builder.unit_at(display, module_path, text);
        }
        debug!(root = %root.display(), "loaded host crate from disk");
        customize(builder).build()
    }

    pub fn crate_name(&self) -> &str {
        &self.crate_name
    }

    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    pub fn unit(&self, id: UnitId) -> Option<&SourceUnit> {
        self.units.get(id.0 as usize)
    }

    pub fn references(&self) -> &[CrateReference] {
        &self.references
    }

    pub fn reference(&self, name: &str) -> Option<&CrateReference> {
        self.references.iter().find(|r| r.name == name)
    }

    /// Token-level fingerprint of all units and references.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Fingerprint of the raw unit texts. Changes whenever a line or column moves.
    pub fn layout_fingerprint(&self) -> Fingerprint {
        self.layout
    }
}

fn collect_rust_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), HostError> {
    let entries = fs::read_dir(dir).map_err(|source| HostError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| HostError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
    Ok(())
}

struct PendingUnit {
    path: PathBuf,
    module_path: Vec<String>,
    text: String,
}

/// Builder for an in-memory [`HostProgram`].
///
/// Unless [`without_markers`](Self::without_markers) is called, the SDK crate is injected as a reference so
/// the marker attributes resolve.
pub struct HostProgramBuilder {
    crate_name: String,
    units: Vec<PendingUnit>,
    references: Vec<CrateReference>,
    inject_markers: bool,
    sdk_path: PathBuf,
}

impl HostProgramBuilder {
    pub fn new(crate_name: impl Into<String>) -> Self {
        Self {
            crate_name: crate_name.into(),
            units: Vec::new(),
            references: Vec::new(),
            inject_markers: true,
            sdk_path: GeneratorConfig::default().sdk_path,
        }
    }

    /// Add a unit; its module path is derived from the path below `src/`.
    pub fn unit(self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let path = path.into();
        let relative = path.strip_prefix("src").unwrap_or(&path).to_path_buf();
        let module_path = module_path_for(&relative);
        self.unit_at(path, module_path, text)
    }

    /// Add a unit defining an explicit module path.
    pub fn unit_at(mut self, path: impl Into<PathBuf>, module_path: Vec<String>, text: impl Into<String>) -> Self {
        self.units.push(PendingUnit {
            path: path.into(),
            module_path,
            text: text.into(),
        });
        self
    }

    /// Add or replace a crate reference.
    pub fn reference(mut self, reference: CrateReference) -> Self {
        self.references.retain(|r| r.name != reference.name);
        self.references.push(reference);
        self
    }

    /// Location of the SDK crate injected for the markers.
    pub fn sdk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sdk_path = path.into();
        self
    }

    /// Do not inject the SDK reference.
    pub fn without_markers(mut self) -> Self {
        self.inject_markers = false;
        self
    }

    pub fn build(self) -> Result<HostProgram, HostError> {
        let mut references = self.references;
        if self.inject_markers && !references.iter().any(|r| r.name == SDK_CRATE) {
            references.push(CrateReference::path(SDK_CRATE, self.sdk_path));
        }
        references.sort_by(|a, b| a.name.cmp(&b.name));

        let units = self
            .units
            .into_iter()
            .enumerate()
            .map(|(i, pending)| SourceUnit::parse(UnitId(i as u32), pending.path, pending.module_path, pending.text))
            .collect::<Result<Vec<_>, _>>()?;

        let mut parts = Vec::with_capacity(units.len() * 2 + references.len());
        for unit in &units {
            parts.push(Fingerprint::of_str(&unit.display_path()));
            parts.push(Fingerprint::of_str(&unit.module_path().join("::")));
            parts.push(unit.fingerprint());
        }
        parts.extend(references.iter().map(|r| Fingerprint::of_str(&r.manifest_entry())));
        let layout = Fingerprint::combine(
            units
                .iter()
                .flat_map(|u| [Fingerprint::of_str(&u.display_path()), Fingerprint::of_str(u.text())]),
        );

        Ok(HostProgram {
            crate_name: self.crate_name,
            units,
            references,
            fingerprint: Fingerprint::combine(parts),
            layout,
        })
    }
}
