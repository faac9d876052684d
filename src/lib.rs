//! # NodeForge Packager
//!
//! Builds a distributable macOS application from a Python desktop project.
//!
//! The pipeline produces a standalone `.app` bundle with a generated icon,
//! optionally signs it with a hardened runtime, wraps it in a styled disk
//! image, and notarizes the result so Gatekeeper accepts it on other
//! machines.
//!
//! ## Stages
//!
//! - **Icon**: render the application icon in-process and pack an `.icns`
//! - **Environment**: select a Python runtime and provision a pinned venv
//! - **Bundle**: drive the freezer and finalize the bundle metadata
//! - **Sign**: per-file code signing, whole-bundle seal, verification
//! - **Disk image**: staged UDRW image with Finder layout, compressed
//! - **Notarize**: submit, wait for the verdict, staple the ticket
//!
//! ## Usage
//!
//! ```bash
//! nodeforge_packager                        # unsigned local build
//! nodeforge_packager --sign "Developer ID Application: ..." --notarize
//! nodeforge_packager --arch universal2 --clean
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cli;
pub mod pipeline;

pub use cli::Args;
pub use pipeline::{
    Arch, Artifact, BuildContext, BuildManifest, BuildSummary, Error, NotaryCredentials,
    Pipeline, Result, SignReport, SignStatus,
};
