//! Command line interface for nodeforge_packager.
//!
//! Parses arguments, loads and validates the build manifest, and drives
//! the packaging pipeline with user-facing progress output.

mod args;
mod output;

pub use args::Args;
pub use output::OutputManager;

use crate::pipeline::error::{Error, Result};
use crate::pipeline::runner::BuildSummary;
use crate::pipeline::{BuildContext, BuildManifest, Pipeline};
use std::path::PathBuf;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    args.validate().map_err(Error::Preflight)?;

    let out = OutputManager::new();
    let manifest_path = args.manifest.clone();
    if !manifest_path.exists() {
        return Err(Error::Preflight(format!(
            "manifest not found: {} (pass a path or create packager.toml)",
            manifest_path.display()
        )));
    }

    let manifest = BuildManifest::load(&manifest_path)?;
    let project_root = project_root_for(&manifest_path)?;
    manifest.validate(&project_root)?;

    out.section(&format!(
        "Packaging {} {}",
        manifest.identity.name, manifest.identity.version
    ));

    let ctx = BuildContext::new(
        project_root,
        manifest,
        args.sign.clone(),
        args.notarize,
        args.skip_dmg,
        args.arch,
    );
    let summary = Pipeline::new(ctx, args.clean, out.clone()).run().await?;
    print_summary(&out, &summary, args.sign.is_some());

    Ok(0)
}

/// Resolves the project root from the manifest location.
fn project_root_for(manifest_path: &std::path::Path) -> Result<PathBuf> {
    let absolute = if manifest_path.is_absolute() {
        manifest_path.to_path_buf()
    } else {
        std::env::current_dir()?.join(manifest_path)
    };
    match absolute.parent() {
        Some(parent) => Ok(parent.to_path_buf()),
        None => Ok(std::env::current_dir()?),
    }
}

fn print_summary(out: &OutputManager, summary: &BuildSummary, signed: bool) {
    out.section("Build Summary");
    for artifact in &summary.artifacts {
        out.success(&format!("{}", artifact.path.display()));
        if let Some(digest) = &artifact.sha256 {
            out.indent(&format!("sha256: {digest}"));
        }
    }

    if let Some(report) = &summary.sign_report {
        out.info(&format!(
            "signing: {} signed, {} skipped, {} failed",
            report.signed(),
            report.skipped(),
            report.failed()
        ));
        if report.failed() > 0 {
            out.warn("some files could not be signed; see the log above");
        }
    }

    if summary.notarized {
        out.success("notarized and stapled; Gatekeeper will accept this build");
    } else if !signed {
        out.warn("unsigned build: distribute only for local testing");
        out.indent("for a distributable build, re-run with:");
        out.indent("  nodeforge_packager --sign \"Developer ID Application: ...\" --notarize");
    }
}
