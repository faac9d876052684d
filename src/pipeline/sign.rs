//! Code signing: per-file batch pass, whole-bundle signature, verification.
//!
//! Every shared library and executable inside the bundle is signed
//! individually with forced re-signing, hardened runtime, entitlements,
//! and a trusted timestamp; then the bundle is signed as a single unit
//! and verified. Per-file outcomes are collected into a report the caller
//! inspects only for logging — the whole-bundle signature and its strict
//! verification are the authoritative gates.
//!
//! Signing is idempotent: `--force` replaces any pre-existing signature,
//! so re-running on a signed bundle yields an equivalent valid signature.

use crate::pipeline::context::BuildContext;
use crate::pipeline::error::{ErrorExt, Result};
use crate::pipeline::utils::cmd;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Outcome of one per-file signing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignStatus {
    /// The tool accepted the file and wrote a signature.
    Signed,
    /// The file is not signable (or already carries an equivalent
    /// signature); expected, not a problem.
    Skipped(String),
    /// The tool failed for a reason other than signability. Logged as a
    /// warning; does not abort the batch.
    Failed(String),
}

/// One entry in the per-file signing report.
#[derive(Debug, Clone)]
pub struct SignOutcome {
    /// File the attempt was made on.
    pub path: PathBuf,
    /// What happened.
    pub status: SignStatus,
}

/// Batch result of the per-file signing pass.
#[derive(Debug, Default)]
pub struct SignReport {
    /// Per-file outcomes, in the (lexicographic) order they were signed.
    pub outcomes: Vec<SignOutcome>,
}

impl SignReport {
    /// Number of files actually signed.
    pub fn signed(&self) -> usize {
        self.count(|s| matches!(s, SignStatus::Signed))
    }

    /// Number of files skipped as unsignable/already signed.
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, SignStatus::Skipped(_)))
    }

    /// Number of genuine per-file failures.
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, SignStatus::Failed(_)))
    }

    fn count(&self, f: impl Fn(&SignStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| f(&o.status)).count()
    }
}

/// Signs the bundle: per-file pass, whole-bundle signature, strict
/// verification, Gatekeeper assessment.
///
/// Returns the per-file report. Fatal only if the whole-bundle signature
/// or its verification fails; the assessment result is downgraded to a
/// warning since unsigned/self-signed builds remain valid for local
/// testing.
pub async fn sign_bundle(ctx: &BuildContext, app_path: &Path, identity: &str) -> Result<SignReport> {
    let entitlements = write_entitlements(ctx)?;

    let files = collect_signable(app_path)?;
    log::info!(
        "signing {} embedded binaries with identity '{}'",
        files.len(),
        identity
    );

    let mut report = SignReport::default();
    for file in files {
        let status = sign_file(&file, identity, &entitlements).await;
        match &status {
            SignStatus::Signed => log::debug!("signed {}", file.display()),
            SignStatus::Skipped(reason) => {
                log::debug!("skipped {}: {}", file.display(), reason)
            }
            SignStatus::Failed(reason) => {
                log::warn!("per-file signing failed for {}: {}", file.display(), reason)
            }
        }
        report.outcomes.push(SignOutcome { path: file, status });
    }

    // The whole-bundle signature is authoritative.
    log::info!("signing bundle as a whole");
    cmd::run_checked("codesign", sign_args(app_path, identity, Some(&entitlements)), None)
        .await?;

    log::info!("verifying signature");
    cmd::run_checked(
        "codesign",
        [
            OsString::from("--verify"),
            "--strict".into(),
            "--deep".into(),
            app_path.into(),
        ],
        None,
    )
    .await?;

    // Gatekeeper-style assessment; failure here is a distribution
    // readiness risk, not a local-build error.
    let assess = cmd::run(
        "spctl",
        [
            OsString::from("--assess"),
            "--type".into(),
            "execute".into(),
            app_path.into(),
        ],
        None,
    )
    .await?;
    if !assess.success() {
        log::warn!(
            "Gatekeeper assessment did not accept the bundle ({}); it will \
             run locally but may be blocked on other machines",
            assess.stderr_tail()
        );
    }

    Ok(report)
}

/// Signs the disk image. Lighter-weight than the bundle signature: no
/// entitlements, no hardened runtime.
pub async fn sign_dmg(dmg_path: &Path, identity: &str) -> Result<()> {
    log::info!("signing disk image {}", dmg_path.display());
    cmd::run_checked(
        "codesign",
        [
            OsString::from("--force"),
            "--timestamp".into(),
            "--sign".into(),
            identity.into(),
            dmg_path.into(),
        ],
        None,
    )
    .await?;
    Ok(())
}

/// Attempts to sign one file, classifying failure as skip or genuine.
async fn sign_file(path: &Path, identity: &str, entitlements: &Path) -> SignStatus {
    let output = match cmd::run("codesign", sign_args(path, identity, Some(entitlements)), None)
        .await
    {
        Ok(output) => output,
        Err(e) => return SignStatus::Failed(e.to_string()),
    };
    if output.success() {
        SignStatus::Signed
    } else {
        classify_sign_failure(&output.stderr_tail())
    }
}

/// The shared codesign argument set: forced re-signing, hardened runtime,
/// entitlements, trusted timestamp.
fn sign_args(target: &Path, identity: &str, entitlements: Option<&Path>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--force".into(),
        "--options".into(),
        "runtime".into(),
        "--timestamp".into(),
    ];
    if let Some(plist) = entitlements {
        args.push("--entitlements".into());
        args.push(plist.into());
    }
    args.push("--sign".into());
    args.push(identity.into());
    args.push(target.into());
    args
}

/// Distinguishes "already signed / not signable" from genuine OS-level
/// failures, so the latter are at least surfaced in the logs.
pub(crate) fn classify_sign_failure(stderr: &str) -> SignStatus {
    let lower = stderr.to_ascii_lowercase();
    let benign = [
        "is already signed",
        "unsupported format",
        "bundle format unrecognized",
        "code object is not signed at all",
        "not a valid",
    ];
    if benign.iter().any(|needle| lower.contains(needle)) {
        SignStatus::Skipped(stderr.trim().to_string())
    } else {
        SignStatus::Failed(stderr.trim().to_string())
    }
}

/// Enumerates every file in the bundle that is a shared library or has
/// any execute permission bit set, in lexicographic path order for
/// reproducible logs.
pub(crate) fn collect_signable(app_path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(app_path).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        // The signature directory itself is never re-signed.
        if entry
            .path()
            .components()
            .any(|c| c.as_os_str() == "_CodeSignature")
        {
            continue;
        }
        if is_signable(entry.path(), &entry.metadata()?) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

/// Shared-library extension or any execute bit.
fn is_signable(path: &Path, metadata: &std::fs::Metadata) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str())
        && matches!(ext, "dylib" | "so")
    {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        false
    }
}

/// Writes the fixed entitlements descriptor paired with every signed
/// binary: the hardened-runtime exceptions an interpreter-embedding app
/// needs.
pub(crate) fn write_entitlements(ctx: &BuildContext) -> Result<PathBuf> {
    use plist::Value;

    let path = ctx.resources_dir().join("entitlements.plist");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).fs_context("creating resources directory", parent)?;
    }

    let mut dict = plist::Dictionary::new();
    dict.insert("com.apple.security.cs.allow-jit".into(), true.into());
    dict.insert(
        "com.apple.security.cs.allow-unsigned-executable-memory".into(),
        true.into(),
    );
    dict.insert(
        "com.apple.security.cs.disable-library-validation".into(),
        true.into(),
    );

    Value::Dictionary(dict).to_file_xml(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_already_signed_as_skip() {
        let status = classify_sign_failure("main binary is already signed");
        assert!(matches!(status, SignStatus::Skipped(_)));
    }

    #[test]
    fn classifies_unsupported_format_as_skip() {
        let status = classify_sign_failure("foo.txt: unsupported format for signature");
        assert!(matches!(status, SignStatus::Skipped(_)));
    }

    #[test]
    fn classifies_permission_denied_as_failure() {
        let status = classify_sign_failure("foo.dylib: Permission denied");
        assert!(matches!(status, SignStatus::Failed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn collects_dylibs_and_executables_in_order() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let app = dir.path().join("Example App.app");
        let macos = app.join("Contents/MacOS");
        let frameworks = app.join("Contents/Frameworks");
        std::fs::create_dir_all(&macos).expect("mkdir");
        std::fs::create_dir_all(&frameworks).expect("mkdir");

        let exe = macos.join("Example App");
        std::fs::write(&exe, b"bin").expect("write");
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");

        std::fs::write(frameworks.join("libz.dylib"), b"lib").expect("write");
        std::fs::write(frameworks.join("readme.txt"), b"doc").expect("write");

        let sig_dir = app.join("Contents/_CodeSignature");
        std::fs::create_dir_all(&sig_dir).expect("mkdir");
        let sig = sig_dir.join("CodeResources");
        std::fs::write(&sig, b"sig").expect("write");
        std::fs::set_permissions(&sig, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");

        let files = collect_signable(&app).expect("collect");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["libz.dylib", "Example App"]);
    }

    #[test]
    fn report_counts_by_status() {
        let report = SignReport {
            outcomes: vec![
                SignOutcome {
                    path: PathBuf::from("a"),
                    status: SignStatus::Signed,
                },
                SignOutcome {
                    path: PathBuf::from("b"),
                    status: SignStatus::Skipped("already signed".into()),
                },
                SignOutcome {
                    path: PathBuf::from("c"),
                    status: SignStatus::Failed("permission denied".into()),
                },
            ],
        };
        assert_eq!(report.signed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
    }
}
