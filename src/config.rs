//! Generator configuration
//!
//! Settings for building the synthetic generator module and dispatching it. Every field has a default;
//! [`GeneratorConfig::from_env`] layers `MICROGEN_*` environment overrides on top.

use std::env;
use std::path::PathBuf;

/// Location of the SDK crate inside this workspace.
const WORKSPACE_SDK_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/crates/microgen_sdk");

/// Generator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Path of the `microgen_sdk` crate the generator module is compiled against
    pub sdk_path: PathBuf,
    /// Cargo executable
    pub cargo: PathBuf,
    /// Cargo target directory shared by all module builds (a per-process scratch dir when unset)
    pub target_dir: Option<PathBuf>,
    /// Pass `--offline` to cargo
    pub offline: bool,
    /// Rust edition of the synthetic crate
    pub edition: String,
    /// Build the module with the release profile
    pub release: bool,
    /// Evaluate dispatch units on the rayon thread pool
    pub parallel: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sdk_path: PathBuf::from(WORKSPACE_SDK_PATH),
            cargo: PathBuf::from("cargo"),
            target_dir: None,
            offline: false,
            edition: "2021".to_string(),
            release: false,
            parallel: true,
        }
    }
}

impl GeneratorConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `MICROGEN_SDK_PATH`, `CARGO`, `MICROGEN_TARGET_DIR`, `MICROGEN_OFFLINE`
    /// and `MICROGEN_RELEASE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = env::var_os("MICROGEN_SDK_PATH") {
            config.sdk_path = PathBuf::from(path);
        }
        if let Some(cargo) = env::var_os("CARGO") {
            config.cargo = PathBuf::from(cargo);
        }
        if let Some(dir) = env::var_os("MICROGEN_TARGET_DIR") {
            config.target_dir = Some(PathBuf::from(dir));
        }
        if let Ok(value) = env::var("MICROGEN_OFFLINE") {
            config.offline = parse_flag(&value);
        }
        if let Ok(value) = env::var("MICROGEN_RELEASE") {
            config.release = parse_flag(&value);
        }
        config
    }

    /// Set the SDK crate path
    pub fn with_sdk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sdk_path = path.into();
        self
    }

    /// Set the cargo executable
    pub fn with_cargo(mut self, cargo: impl Into<PathBuf>) -> Self {
        self.cargo = cargo.into();
        self
    }

    /// Share a cargo target directory across module builds
    pub fn with_target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Set the edition of the synthetic crate
    pub fn with_edition(mut self, edition: impl Into<String>) -> Self {
        self.edition = edition.into();
        self
    }

    pub fn with_release(mut self, release: bool) -> Self {
        self.release = release;
        self
    }

    /// Toggle parallel dispatch
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================
    // Default config tests
    // ========================================

    #[test]
    fn test_default_config_points_at_workspace_sdk() {
        let config = GeneratorConfig::default();
        assert!(config.sdk_path.ends_with("crates/microgen_sdk"));
        assert!(config.sdk_path.join("Cargo.toml").exists());
    }

    #[test]
    fn test_default_config_flags() {
        let config = GeneratorConfig::default();
        assert_eq!(config.cargo, PathBuf::from("cargo"));
        assert_eq!(config.edition, "2021");
        assert!(config.target_dir.is_none());
        assert!(!config.offline);
        assert!(!config.release);
        assert!(config.parallel);
    }

    #[test]
    fn test_new_equals_default() {
        assert_eq!(GeneratorConfig::new(), GeneratorConfig::default());
    }

    // ========================================
    // Builder method tests
    // ========================================

    #[test]
    fn test_builder_chain_all() {
        let config = GeneratorConfig::new()
            .with_sdk_path("/opt/sdk")
            .with_cargo("/usr/bin/cargo")
            .with_target_dir("/tmp/target")
            .with_offline(true)
            .with_edition("2024")
            .with_release(true)
            .with_parallel(false);

        assert_eq!(config.sdk_path, PathBuf::from("/opt/sdk"));
        assert_eq!(config.cargo, PathBuf::from("/usr/bin/cargo"));
        assert_eq!(config.target_dir, Some(PathBuf::from("/tmp/target")));
        assert!(config.offline);
        assert_eq!(config.edition, "2024");
        assert!(config.release);
        assert!(!config.parallel);
    }

    #[test]
    fn test_builder_override() {
        let config = GeneratorConfig::new().with_edition("2018").with_edition("2021");
        assert_eq!(config.edition, "2021"); // Last value wins
    }

    // ========================================
    // Flag parsing
    // ========================================

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
        assert!(!parse_flag(""));
    }
}
