//! Source units: one parsed file of the host crate.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::HostError;
use crate::incremental::Fingerprint;

/// Index of a unit within its [`HostProgram`](super::HostProgram).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit{}", self.0)
    }
}

/// A parsed source file together with the module it defines.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    id: UnitId,
    path: PathBuf,
    module_path: Vec<String>,
    file: syn::File,
    text: String,
    fingerprint: Fingerprint,
}

impl SourceUnit {
    pub fn parse(
        id: UnitId,
        path: impl Into<PathBuf>,
        module_path: Vec<String>,
        text: impl Into<String>,
    ) -> Result<Self, HostError> {
        let path = path.into();
        let text = text.into();
        let file = syn::parse_file(&text).map_err(|e| {
            let start = e.span().start();
            HostError::Parse {
                path: path.clone(),
                message: e.to_string(),
                line: start.line,
                column: start.column + 1,
            }
        })?;
        let fingerprint = Fingerprint::of_tokens(&file);
        Ok(Self {
            id,
            path,
            module_path,
            file,
            text,
            fingerprint,
        })
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as reported in diagnostic locations.
    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    /// Module this file defines (`[]` for the crate root).
    pub fn module_path(&self) -> &[String] {
        &self.module_path
    }

    pub fn file(&self) -> &syn::File {
        &self.file
    }

    /// Original text, kept for rendering diagnostics.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// Module path of a file given its path relative to the crate's `src/` directory.
///
/// `lib.rs` and `main.rs` are the root, `a/mod.rs` is `a`, `a/b.rs` is `a::b`.
pub fn module_path_for(relative: &Path) -> Vec<String> {
    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if let Some(last) = segments.pop() {
        let stem = last.strip_suffix(".rs").unwrap_or(&last).to_string();
        let is_root = segments.is_empty() && (stem == "lib" || stem == "main");
        if stem != "mod" && !is_root {
            segments.push(stem);
        }
    }
    segments
}
