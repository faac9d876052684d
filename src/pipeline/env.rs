//! Runtime discovery and isolated build-environment provisioning.
//!
//! Scans a prioritized list of Python interpreters, keeps the first one
//! that satisfies the minimum version, provisions a virtual environment
//! exactly once, and installs the pinned build/runtime packages into it.

use crate::pipeline::context::BuildContext;
use crate::pipeline::error::{Error, Result};
use crate::pipeline::utils::cmd;
use semver::Version;
use std::path::{Path, PathBuf};

/// Interpreter candidates, most specific first.
const RUNTIME_CANDIDATES: [&str; 5] = [
    "python3.13",
    "python3.12",
    "python3.11",
    "python3.10",
    "python3",
];

/// Minimum runtime version the packaging tool supports.
const MIN_RUNTIME_VERSION: Version = Version::new(3, 10, 0);

/// Packages installed into the isolated environment. PyInstaller is the
/// packaging tool itself; the rest are the app's runtime dependencies.
const PINNED_PACKAGES: [&str; 3] = [
    "pyinstaller==6.10.0",
    "requests==2.32.3",
    "pillow==10.4.0",
];

/// A provisioned, ready-to-use build environment.
#[derive(Debug, Clone)]
pub struct PreparedEnv {
    /// Interpreter the environment was created with.
    pub python: PathBuf,
    /// Version that interpreter reported.
    pub python_version: Version,
    /// The packaging tool inside the environment.
    pub pyinstaller: PathBuf,
}

/// Locates a suitable runtime and provisions the isolated environment.
///
/// Fatal if no candidate satisfies the minimum version. Environment
/// creation is idempotent: an existing environment directory is reused
/// as-is apart from refreshing the pinned packages.
pub async fn prepare(ctx: &BuildContext) -> Result<PreparedEnv> {
    let (python, python_version) = select_runtime().await?;
    log::info!(
        "using {} ({})",
        python.display(),
        python_version
    );

    if python.starts_with("/usr/bin") {
        log::warn!(
            "selected runtime {} appears to be the OS-bundled one, which \
             ships without a usable Tk binding; prefer a Homebrew or \
             python.org install if the packed app fails to launch",
            python.display()
        );
    }

    let venv = ctx.venv_dir();
    if venv.is_dir() {
        log::info!("environment {} already exists, reusing", venv.display());
    } else {
        log::info!("creating environment at {}", venv.display());
        cmd::run_checked(
            python.to_string_lossy().as_ref(),
            ["-m", "venv", venv.to_string_lossy().as_ref()],
            None,
        )
        .await?;
    }

    let pip = venv.join("bin/pip");
    install_pinned(&pip).await?;

    Ok(PreparedEnv {
        python,
        python_version,
        pyinstaller: venv.join("bin/pyinstaller"),
    })
}

/// Selects the first candidate runtime satisfying the minimum version.
async fn select_runtime() -> Result<(PathBuf, Version)> {
    for candidate in RUNTIME_CANDIDATES {
        let Some(path) = cmd::find_tool(candidate) else {
            continue;
        };
        match probe_version(&path).await {
            Ok(version) if version >= MIN_RUNTIME_VERSION => {
                return Ok((path, version));
            }
            Ok(version) => {
                log::debug!(
                    "{} is {}, below the required {}",
                    path.display(),
                    version,
                    MIN_RUNTIME_VERSION
                );
            }
            Err(e) => {
                log::debug!("probing {} failed: {}", path.display(), e);
            }
        }
    }
    Err(Error::Preflight(format!(
        "no Python >= {MIN_RUNTIME_VERSION} found (tried: {})",
        RUNTIME_CANDIDATES.join(", ")
    )))
}

/// Runs `--version` on an interpreter and parses the reported version.
async fn probe_version(python: &Path) -> Result<Version> {
    let output = cmd::run_checked(
        python.to_string_lossy().as_ref(),
        ["--version"],
        None,
    )
    .await?;
    // Older interpreters print the banner on stderr.
    let banner = if output.stdout.trim().is_empty() {
        output.stderr.trim().to_string()
    } else {
        output.stdout.trim().to_string()
    };
    parse_version_banner(&banner)
}

/// Parses "Python 3.12.4" (or just "3.12") into a version.
pub(crate) fn parse_version_banner(banner: &str) -> Result<Version> {
    let raw = banner
        .split_whitespace()
        .find(|token| token.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .ok_or_else(|| Error::Generic(format!("unrecognized version banner: '{banner}'")))?;
    // Drop suffixes like "3.13.0rc1" and pad a missing patch component.
    let numeric: String = raw
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let padded = match numeric.matches('.').count() {
        0 => format!("{numeric}.0.0"),
        1 => format!("{numeric}.0"),
        _ => numeric.trim_end_matches('.').to_string(),
    };
    Ok(Version::parse(&padded)?)
}

/// Upgrades pip itself, then installs the pinned package set.
async fn install_pinned(pip: &Path) -> Result<()> {
    let pip_str = pip.to_string_lossy();
    log::info!("upgrading pip");
    cmd::run_checked(pip_str.as_ref(), ["install", "--upgrade", "pip"], None).await?;

    for package in PINNED_PACKAGES {
        log::info!("installing {package}");
        cmd::run_checked(pip_str.as_ref(), ["install", package], None).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_version_banner() {
        let v = parse_version_banner("Python 3.12.4").expect("parse");
        assert_eq!(v, Version::new(3, 12, 4));
    }

    #[test]
    fn pads_short_versions() {
        assert_eq!(
            parse_version_banner("Python 3.12").expect("parse"),
            Version::new(3, 12, 0)
        );
        assert_eq!(
            parse_version_banner("3").expect("parse"),
            Version::new(3, 0, 0)
        );
    }

    #[test]
    fn strips_prerelease_suffixes() {
        assert_eq!(
            parse_version_banner("Python 3.13.0rc1").expect("parse"),
            Version::new(3, 13, 0)
        );
    }

    #[test]
    fn rejects_garbage_banners() {
        assert!(parse_version_banner("no version here").is_err());
    }

    #[test]
    fn minimum_version_gate() {
        let old = parse_version_banner("Python 3.9.6").expect("parse");
        assert!(old < MIN_RUNTIME_VERSION);
        let new = parse_version_banner("Python 3.10.0").expect("parse");
        assert!(new >= MIN_RUNTIME_VERSION);
    }
}
