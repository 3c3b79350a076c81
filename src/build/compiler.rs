//! Compilation of the synthetic crate
//!
//! [`CargoCompiler`] writes the assembled crate into a scratch directory and builds it as a `cdylib`:
//! - `Cargo.toml` with the explicit reference set as dependencies
//! - `src/lib.rs` with the assembled source
//! - `cargo build --lib --message-format=json`
//!
//! Compiler messages for the synthetic crate are parsed from cargo's JSON stream and returned as data. Only
//! the inability to run cargo at all is an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::Deserialize;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

use microgen_sdk::SourceLocation;

use crate::config::GeneratorConfig;
use crate::host::CrateReference;

const MICROGEN_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to prepare the synthetic crate in `{path}`: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("cargo reported success but produced no library artifact for `{crate_name}`")]
    MissingArtifact { crate_name: String },

    #[error("failed to read the compiled module `{path}`: {source}")]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What to compile.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub crate_name: &'a str,
    pub lib_source: &'a str,
    pub references: &'a [CrateReference],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageLevel {
    Error,
    Warning,
    Note,
}

/// A diagnostic reported by the compiler for the synthetic crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerMessage {
    /// Compiler error code such as `E0412`
    pub code: Option<String>,
    pub level: MessageLevel,
    pub message: String,
    pub rendered: Option<String>,
    pub location: Option<SourceLocation>,
}

/// Result of one compilation: the loadable image on success, and every message either way.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub image: Option<Vec<u8>>,
    pub messages: Vec<CompilerMessage>,
}

impl CompileOutput {
    pub fn succeeded(&self) -> bool {
        self.image.is_some()
    }
}

/// Turns a synthetic crate into a loadable image.
pub trait ModuleCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutput, BuildError>;
}

/// [`ModuleCompiler`] backed by `cargo build`.
pub struct CargoCompiler {
    config: GeneratorConfig,
    scratch: TempDir,
}

impl CargoCompiler {
    pub fn new(config: GeneratorConfig) -> Result<Self, BuildError> {
        let scratch = tempfile::Builder::new()
            .prefix("microgen-build-")
            .tempdir()
            .map_err(|source| BuildError::Scratch {
                path: std::env::temp_dir(),
                source,
            })?;
        Ok(Self { config, scratch })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn project_dir(&self, crate_name: &str) -> PathBuf {
        self.scratch.path().join(crate_name)
    }

    fn target_dir(&self) -> PathBuf {
        self.config
            .target_dir
            .clone()
            .unwrap_or_else(|| self.scratch.path().join("target"))
    }

    /// Write the project structure for `request`, returning its directory.
    pub fn generate(&self, request: &CompileRequest<'_>) -> Result<PathBuf, BuildError> {
        let project_dir = self.project_dir(request.crate_name);
        let scratch_error = |source| BuildError::Scratch {
            path: project_dir.clone(),
            source,
        };
        let src_dir = project_dir.join("src");
        fs::create_dir_all(&src_dir).map_err(scratch_error)?;
        fs::write(
            project_dir.join("Cargo.toml"),
            generate_cargo_toml(request, &self.config.edition),
        )
        .map_err(scratch_error)?;
        fs::write(src_dir.join("lib.rs"), request.lib_source).map_err(scratch_error)?;
        Ok(project_dir)
    }

    fn run_cargo(&self, project_dir: &Path) -> Result<Output, BuildError> {
        let mut command = Command::new(&self.config.cargo);
        command
            .arg("build")
            .arg("--lib")
            .arg("--message-format=json")
            .arg("--target-dir")
            .arg(self.target_dir())
            .env("CARGO_TERM_COLOR", "never")
            .current_dir(project_dir);
        if self.config.offline {
            command.arg("--offline");
        }
        if self.config.release {
            command.arg("--release");
        }
        command.output().map_err(|source| BuildError::Spawn {
            program: self.config.cargo.display().to_string(),
            source,
        })
    }
}

impl ModuleCompiler for CargoCompiler {
    #[tracing::instrument(skip_all, fields(crate_name = request.crate_name))]
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutput, BuildError> {
        let project_dir = self.generate(request)?;
        let output = self.run_cargo(&project_dir)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let parsed = parse_cargo_messages(&stdout, request.crate_name);

        let mut messages = parsed.messages;
        let success = parsed.success.unwrap_or_else(|| output.status.success());
        if !success && !messages.iter().any(|m| m.level == MessageLevel::Error) {
            // Failures before rustc runs (manifest, dependency resolution) only reach stderr.
            messages.push(CompilerMessage {
                code: None,
                level: MessageLevel::Error,
                message: stderr.trim().to_string(),
                rendered: None,
                location: None,
            });
        }

        if !success {
            warn!(errors = messages.len(), "generator module failed to compile");
            return Ok(CompileOutput { image: None, messages });
        }

        let artifact = parsed.artifact.ok_or_else(|| BuildError::MissingArtifact {
            crate_name: request.crate_name.to_string(),
        })?;
        let image = fs::read(&artifact).map_err(|source| BuildError::ReadArtifact {
            path: artifact.clone(),
            source,
        })?;
        debug!(artifact = %artifact.display(), bytes = image.len(), "compiled generator module");
        Ok(CompileOutput {
            image: Some(image),
            messages,
        })
    }
}

/// Generate Cargo.toml content
fn generate_cargo_toml(request: &CompileRequest<'_>, edition: &str) -> String {
    let dependencies = if request.references.is_empty() {
        "# No additional dependencies".to_string()
    } else {
        request
            .references
            .iter()
            .map(CrateReference::manifest_entry)
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"[package]
name = "{name}"
version = "0.0.0"
edition = "{edition}"
publish = false

# Generated by microgen {version}

[lib]
path = "src/lib.rs"
crate-type = ["cdylib"]

[dependencies]
{dependencies}

[workspace]
"#,
        name = request.crate_name,
        version = MICROGEN_VERSION,
    )
}

// ============================================================================
// Cargo JSON messages
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
enum CargoMessage {
    CompilerMessage {
        target: CargoTarget,
        message: RustcMessage,
    },
    CompilerArtifact {
        target: CargoTarget,
        filenames: Vec<PathBuf>,
    },
    BuildFinished {
        success: bool,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct CargoTarget {
    name: String,
    #[serde(default)]
    kind: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RustcMessage {
    message: String,
    code: Option<RustcCode>,
    level: String,
    #[serde(default)]
    spans: Vec<RustcSpan>,
    rendered: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RustcCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct RustcSpan {
    file_name: String,
    line_start: usize,
    column_start: usize,
    is_primary: bool,
}

#[derive(Debug, Default)]
struct ParsedBuild {
    messages: Vec<CompilerMessage>,
    artifact: Option<PathBuf>,
    success: Option<bool>,
}

/// Parse cargo's JSON lines, keeping what concerns `crate_name`. Non-JSON lines are ignored.
fn parse_cargo_messages(stdout: &str, crate_name: &str) -> ParsedBuild {
    let mut parsed = ParsedBuild::default();
    for line in stdout.lines().filter(|l| l.starts_with('{')) {
        let Ok(message) = serde_json::from_str::<CargoMessage>(line) else {
            continue;
        };
        match message {
            CargoMessage::CompilerMessage { target, message } if target.name == crate_name => {
                let level = match message.level.as_str() {
                    "error" | "error: internal compiler error" => MessageLevel::Error,
                    "warning" => MessageLevel::Warning,
                    _ => continue,
                };
                let location = message
                    .spans
                    .iter()
                    .find(|s| s.is_primary)
                    .map(|s| SourceLocation::new(format!("{crate_name}/{}", s.file_name), s.line_start, s.column_start));
                parsed.messages.push(CompilerMessage {
                    code: message.code.map(|c| c.code),
                    level,
                    message: message.message,
                    rendered: message.rendered,
                    location,
                });
            }
            CargoMessage::CompilerArtifact { target, filenames }
                if target.name == crate_name && target.kind.iter().any(|k| k == "cdylib") =>
            {
                parsed.artifact = filenames
                    .into_iter()
                    .find(|f| f.extension().is_some_and(|ext| ext == std::env::consts::DLL_EXTENSION));
            }
            CargoMessage::BuildFinished { success } => parsed.success = Some(success),
            _ => {}
        }
    }
    parsed
}
