//! The build manifest: the declarative description of what to package.
//!
//! The manifest is a TOML file (default `packager.toml`) naming the entry
//! point, the module/resource/exclusion lists PyInstaller needs, the
//! application identity, and the UI behavior flags that end up in the
//! bundle's metadata descriptor.
//!
//! ```toml
//! entry_point = "main.py"
//! extra_modules = ["requests"]
//! excluded_packages = ["numpy"]
//! resources = [{ source = "assets/help.txt", dest = "help.txt" }]
//!
//! [identity]
//! name = "NodeForge"
//! bundle_identifier = "org.nodeforge.app"
//! version = "1.0.0"
//!
//! [ui]
//! windowed = true
//! high_resolution = true
//! dark_mode_aware = false
//! ```

use crate::pipeline::error::{Error, ErrorExt, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// CPU architecture for the packed executable payload.
///
/// Defaults to the host's native architecture when neither the manifest
/// nor the `--arch` flag specifies one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    /// Intel 64-bit.
    #[value(name = "x86_64")]
    X86_64,
    /// Apple Silicon.
    #[value(name = "arm64")]
    Arm64,
    /// Fat binary containing both x86_64 and arm64 slices.
    #[value(name = "universal2")]
    Universal2,
}

impl Arch {
    /// The host's native architecture.
    pub fn host_native() -> Self {
        if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else {
            Arch::X86_64
        }
    }

    /// The value PyInstaller's `--target-arch` flag expects.
    pub fn target_arch_flag(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Arm64 => "arm64",
            Arch::Universal2 => "universal2",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target_arch_flag())
    }
}

/// A (source, destination) resource-file pair bundled into the app.
///
/// `source` is relative to the project root; `dest` is the path inside
/// the bundle's resource area.
#[derive(Clone, Debug, Deserialize)]
pub struct ResourceFile {
    /// Path of the file on disk, relative to the project root.
    pub source: PathBuf,
    /// Destination path inside the bundle.
    pub dest: String,
}

/// Application identity fields written into the metadata descriptor.
#[derive(Clone, Debug, Deserialize)]
pub struct Identity {
    /// Product name shown to users; also names the `.app` directory.
    pub name: String,
    /// Reverse-DNS bundle identifier, unique to the application.
    pub bundle_identifier: String,
    /// Version triple. Monotonic increase across releases is operator
    /// discipline, not enforced here.
    pub version: String,
    /// `LSApplicationCategoryType` value, e.g.
    /// "public.app-category.developer-tools".
    #[serde(default)]
    pub category: Option<String>,
    /// Human-readable copyright line.
    #[serde(default)]
    pub copyright: Option<String>,
}

fn default_true() -> bool {
    true
}

/// UI behavior flags carried into the metadata descriptor.
#[derive(Clone, Debug, Deserialize)]
pub struct UiFlags {
    /// Windowed app (no console surface).
    #[serde(default = "default_true")]
    pub windowed: bool,
    /// Advertise high-resolution (Retina) support.
    #[serde(default = "default_true")]
    pub high_resolution: bool,
    /// Opt in to dark-mode appearance.
    #[serde(default)]
    pub dark_mode_aware: bool,
}

impl Default for UiFlags {
    fn default() -> Self {
        Self {
            windowed: true,
            high_resolution: true,
            dark_mode_aware: false,
        }
    }
}

/// The declarative description of what to package.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildManifest {
    /// Application entry-point script, relative to the project root.
    pub entry_point: PathBuf,
    /// Target architecture; CLI `--arch` overrides, host-native otherwise.
    #[serde(default)]
    pub arch: Option<Arch>,
    /// Modules the static analyzer cannot discover on its own
    /// (dynamically imported); unioned into the closed module set.
    #[serde(default)]
    pub extra_modules: Vec<String>,
    /// Third-party packages excluded from the final artifact. The build
    /// is hermetic with respect to this list.
    #[serde(default)]
    pub excluded_packages: Vec<String>,
    /// Data/resource files copied into the bundle.
    #[serde(default)]
    pub resources: Vec<ResourceFile>,
    /// Permission-usage descriptions keyed by the platform's usage keys,
    /// e.g. `NSAppleEventsUsageDescription`.
    #[serde(default)]
    pub usage_descriptions: BTreeMap<String, String>,
    /// Application identity.
    pub identity: Identity,
    /// UI behavior flags.
    #[serde(default)]
    pub ui: UiFlags,
}

impl BuildManifest {
    /// Loads and parses a manifest from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).fs_context("reading manifest", path)?;
        let manifest: BuildManifest = toml::from_str(&contents)?;
        Ok(manifest)
    }

    /// Validates the manifest against a project root.
    ///
    /// The entry point must exist, the bundle identifier must be
    /// reverse-DNS shaped, and the version must parse as a semantic
    /// version.
    pub fn validate(&self, project_root: &Path) -> Result<()> {
        let entry = project_root.join(&self.entry_point);
        if !entry.is_file() {
            return Err(Error::Manifest(format!(
                "entry point {} does not exist",
                entry.display()
            )));
        }
        if !is_reverse_dns(&self.identity.bundle_identifier) {
            return Err(Error::Manifest(format!(
                "bundle identifier '{}' is not a reverse-DNS identifier \
                 (expected e.g. org.example.app)",
                self.identity.bundle_identifier
            )));
        }
        semver::Version::parse(&self.identity.version).map_err(|e| {
            Error::Manifest(format!(
                "version '{}' is not a valid version triple: {}",
                self.identity.version, e
            ))
        })?;
        if self.identity.name.trim().is_empty() {
            return Err(Error::Manifest("application name is empty".into()));
        }
        Ok(())
    }
}

/// Whether a string looks like a reverse-DNS bundle identifier: at least
/// two dot-separated, non-empty labels of ASCII alphanumerics or hyphens.
fn is_reverse_dns(identifier: &str) -> bool {
    let labels: Vec<&str> = identifier.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_dns_accepts_typical_identifiers() {
        assert!(is_reverse_dns("org.nodeforge.app"));
        assert!(is_reverse_dns("com.example-inc.tool"));
        assert!(is_reverse_dns("io.app"));
    }

    #[test]
    fn reverse_dns_rejects_malformed_identifiers() {
        assert!(!is_reverse_dns("nodeforge"));
        assert!(!is_reverse_dns("org..app"));
        assert!(!is_reverse_dns(".org.app"));
        assert!(!is_reverse_dns("org.node forge.app"));
    }

    #[test]
    fn arch_flag_values_match_pyinstaller() {
        assert_eq!(Arch::X86_64.target_arch_flag(), "x86_64");
        assert_eq!(Arch::Arm64.target_arch_flag(), "arm64");
        assert_eq!(Arch::Universal2.target_arch_flag(), "universal2");
    }

    #[test]
    fn ui_flags_default_to_windowed_retina() {
        let flags = UiFlags::default();
        assert!(flags.windowed);
        assert!(flags.high_resolution);
        assert!(!flags.dark_mode_aware);
    }
}
