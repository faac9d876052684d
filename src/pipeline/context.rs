//! Shared build context passed to every pipeline stage.
//!
//! All of the directory layout and run options live here so that no stage
//! reaches for process-wide state. The context is constructed once from
//! the CLI arguments and the parsed manifest and handed to each stage by
//! reference.

use crate::pipeline::manifest::{Arch, BuildManifest};
use crate::pipeline::utils::fs;
use crate::pipeline::error::Result;
use std::path::{Path, PathBuf};

/// Immutable configuration and directory layout for one pipeline run.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Project root; manifest paths are resolved against it.
    project_root: PathBuf,
    /// The parsed build manifest.
    manifest: BuildManifest,
    /// Code identity for signing, if supplied.
    signing_identity: Option<String>,
    /// Whether notarization was requested.
    notarize: bool,
    /// Whether the disk-image stage is skipped entirely.
    skip_dmg: bool,
    /// Effective target architecture (CLI override > manifest > host).
    arch: Arch,
}

impl BuildContext {
    /// Creates a context from a validated manifest and run options.
    pub fn new(
        project_root: PathBuf,
        manifest: BuildManifest,
        signing_identity: Option<String>,
        notarize: bool,
        skip_dmg: bool,
        arch_override: Option<Arch>,
    ) -> Self {
        let arch = arch_override
            .or(manifest.arch)
            .unwrap_or_else(Arch::host_native);
        Self {
            project_root,
            manifest,
            signing_identity,
            notarize,
            skip_dmg,
            arch,
        }
    }

    /// The project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// The parsed build manifest.
    pub fn manifest(&self) -> &BuildManifest {
        &self.manifest
    }

    /// Product name from the manifest identity.
    pub fn product_name(&self) -> &str {
        &self.manifest.identity.name
    }

    /// Version string from the manifest identity.
    pub fn version_string(&self) -> &str {
        &self.manifest.identity.version
    }

    /// Code identity for signing, if supplied at invocation time.
    pub fn signing_identity(&self) -> Option<&str> {
        self.signing_identity.as_deref()
    }

    /// Whether notarization was requested.
    pub fn notarize(&self) -> bool {
        self.notarize
    }

    /// Whether the disk-image stage is skipped.
    pub fn skip_dmg(&self) -> bool {
        self.skip_dmg
    }

    /// Effective target architecture.
    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Output directory holding the final bundle and disk image.
    pub fn dist_dir(&self) -> PathBuf {
        self.project_root.join("dist")
    }

    /// Scratch directory used by the packaging tool; safe to delete
    /// between runs.
    pub fn build_dir(&self) -> PathBuf {
        self.project_root.join("build")
    }

    /// Isolated environment directory, reused across runs.
    pub fn venv_dir(&self) -> PathBuf {
        self.project_root.join(".venv")
    }

    /// Generated resources (icon, entitlements); the icon is cached here.
    pub fn resources_dir(&self) -> PathBuf {
        self.project_root.join("resources")
    }

    /// Path of the application bundle the Bundle Builder produces.
    pub fn app_bundle_path(&self) -> PathBuf {
        self.dist_dir().join(format!("{}.app", self.product_name()))
    }

    /// Path of the disk-image artifact.
    pub fn dmg_path(&self) -> PathBuf {
        self.dist_dir()
            .join(format!("{}-{}.dmg", self.product_name(), self.version_string()))
    }

    /// Path of the packed platform icon resource.
    pub fn icns_path(&self) -> PathBuf {
        self.resources_dir()
            .join(format!("{}.icns", self.product_name()))
    }

    /// Removes all prior build, output, and environment directories.
    pub async fn clean(&self) -> Result<()> {
        for dir in [self.dist_dir(), self.build_dir(), self.venv_dir()] {
            log::info!("removing {}", dir.display());
            fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }
}
