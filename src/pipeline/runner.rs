//! Stage orchestration.
//!
//! Runs the fixed stage order: icon, environment, bundle, signing, disk
//! image, notarization. Each stage receives the shared [`BuildContext`]
//! and the outputs of earlier stages explicitly; nothing flows through
//! global state.

use crate::cli::OutputManager;
use crate::pipeline::context::BuildContext;
use crate::pipeline::error::{Error, Result};
use crate::pipeline::notarize::NotaryCredentials;
use crate::pipeline::sign::SignReport;
use crate::pipeline::{bundle, dmg, env, icon, notarize, sign};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// One distributable output of a completed run.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Path under the distribution directory.
    pub path: PathBuf,
    /// SHA-256 of the file contents; `None` for directory artifacts
    /// such as the application bundle itself.
    pub sha256: Option<String>,
}

/// What a completed run produced.
#[derive(Debug)]
pub struct BuildSummary {
    /// Distributable outputs in creation order.
    pub artifacts: Vec<Artifact>,
    /// Per-file signing outcomes when an identity was supplied.
    pub sign_report: Option<SignReport>,
    /// Whether the bundle carries a stapled notarization ticket.
    pub notarized: bool,
}

/// Drives a full packaging run for one [`BuildContext`].
pub struct Pipeline {
    ctx: BuildContext,
    clean: bool,
    out: OutputManager,
}

impl Pipeline {
    /// Creates a runner; `clean` erases prior build products first.
    /// Stage banners go through `out`; per-action detail goes to the log.
    pub fn new(ctx: BuildContext, clean: bool, out: OutputManager) -> Self {
        Self { ctx, clean, out }
    }

    /// Runs every requested stage and returns the artifact summary.
    pub async fn run(&self) -> Result<BuildSummary> {
        self.preflight()?;
        let credentials = if self.ctx.notarize() {
            Some(NotaryCredentials::from_env()?)
        } else {
            None
        };

        if self.clean {
            log::info!("cleaning prior build products");
            self.ctx.clean().await?;
        }

        self.out.section("Icon");
        let icon_path = icon::synthesize(&self.ctx).await;

        self.out.section("Environment");
        let prepared = env::prepare(&self.ctx).await?;

        self.out.section("Bundle");
        let app_path = bundle::build(&self.ctx, &prepared, icon_path.as_deref()).await?;

        let sign_report = match self.ctx.signing_identity() {
            Some(identity) => {
                self.out.section("Sign");
                Some(sign::sign_bundle(&self.ctx, &app_path, identity).await?)
            }
            None => {
                log::warn!(
                    "no signing identity supplied; the bundle is unsigned and \
                     Gatekeeper will block it on other machines"
                );
                None
            }
        };

        let mut dmg_path = if self.ctx.skip_dmg() {
            log::info!("disk image stage skipped by request");
            None
        } else {
            self.out.section("Disk Image");
            dmg::package(&self.ctx, &app_path).await?
        };

        let mut notarized = false;
        if let Some(credentials) = &credentials {
            self.out.section("Notarize");
            notarize::notarize(&self.ctx, credentials, &app_path, dmg_path.as_deref())
                .await?;
            notarized = true;
            // The stapled ticket lives inside the bundle, so any image
            // built before stapling is stale. Rebuild it from scratch.
            if dmg_path.is_some() {
                log::info!("rebuilding disk image around the stapled bundle");
                dmg_path = dmg::package(&self.ctx, &app_path).await?;
            }
        }

        let mut artifacts = vec![Artifact {
            path: app_path,
            sha256: None,
        }];
        if let Some(dmg) = dmg_path {
            let digest = file_sha256(&dmg).await?;
            artifacts.push(Artifact {
                path: dmg,
                sha256: Some(digest),
            });
        }

        Ok(BuildSummary {
            artifacts,
            sign_report,
            notarized,
        })
    }

    /// Checks host requirements before any filesystem work.
    fn preflight(&self) -> Result<()> {
        if !cfg!(target_os = "macos") {
            return Err(Error::Preflight(
                "application bundles, code signing, and disk images require \
                 a macOS host"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Hex-encoded SHA-256 of a file's contents.
async fn file_sha256(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_sha256_matches_known_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact.bin");
        tokio::fs::write(&path, b"hello").await.expect("write");
        let digest = file_sha256(&path).await.expect("digest");
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
