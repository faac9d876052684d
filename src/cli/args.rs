//! Command line argument parsing and validation.
//!
//! The tool is designed to "just work": point it at a manifest, it
//! produces a distributable application.

use crate::pipeline::Arch;
use clap::Parser;
use std::path::PathBuf;

/// Packages a Python desktop application as a macOS bundle
#[derive(Parser, Debug)]
#[command(
    name = "nodeforge_packager",
    version,
    about = "Build, sign, notarize, and package a macOS application",
    long_about = "Build a standalone macOS application bundle from a Python \
project, then optionally sign it, wrap it in a styled disk image, and \
notarize it for Gatekeeper.

Usage:
  nodeforge_packager
  nodeforge_packager packager.toml --sign \"Developer ID Application: ...\"
  nodeforge_packager --sign \"Developer ID Application: ...\" --notarize
  nodeforge_packager --arch universal2 --clean"
)]
pub struct Args {
    /// Path to the build manifest
    #[arg(index = 1, value_name = "MANIFEST", default_value = "packager.toml")]
    pub manifest: PathBuf,

    /// Code signing identity (e.g. "Developer ID Application: Name (TEAM)")
    #[arg(long, value_name = "IDENTITY")]
    pub sign: Option<String>,

    /// Submit the build for notarization after signing
    #[arg(long)]
    pub notarize: bool,

    /// Target architecture (defaults to the manifest, then the host)
    #[arg(long, value_enum, value_name = "ARCH")]
    pub arch: Option<Arch>,

    /// Stop after the bundle; do not produce a disk image
    #[arg(long)]
    pub skip_dmg: bool,

    /// Erase prior build products before building
    #[arg(long)]
    pub clean: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.notarize && self.sign.is_none() {
            return Err("--notarize requires --sign: the notary service \
                        rejects unsigned submissions"
                .to_string());
        }

        if let Some(identity) = &self.sign
            && identity.trim().is_empty()
        {
            return Err("--sign requires a non-empty identity".to_string());
        }

        Ok(())
    }
}
