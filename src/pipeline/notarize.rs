//! Notarization: submit, wait for a verdict, staple.
//!
//! Credentials are validated before any build work starts; a missing
//! environment value is a fatal pre-flight error. The submission blocks
//! until the notary service returns a verdict or times out on its side —
//! there is no cancellation path once submitted.

use crate::pipeline::context::BuildContext;
use crate::pipeline::error::{Error, Result};
use crate::pipeline::utils::cmd;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment value naming the notary account.
pub const APPLE_ID_VAR: &str = "APPLE_ID";
/// Environment value naming the 10-character organization identifier.
pub const TEAM_ID_VAR: &str = "APPLE_TEAM_ID";
/// Environment value carrying the credential: either a literal
/// app-specific password or a `@keychain:NAME` reference, passed through
/// to the notary client verbatim.
pub const PASSWORD_VAR: &str = "APPLE_PASSWORD";

/// Notary service credentials, resolved from the environment.
#[derive(Debug, Clone)]
pub struct NotaryCredentials {
    /// Account identifier (Apple ID email).
    pub apple_id: String,
    /// 10-character team identifier.
    pub team_id: String,
    /// Literal secret or secure-credential-store reference. A single
    /// channel carries both forms, so no precedence question arises.
    pub password: String,
}

impl NotaryCredentials {
    /// Loads credentials from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads credentials through a lookup function (testable without
    /// touching process-wide environment state).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    Error::Preflight(format!(
                        "--notarize requires the {key} environment value"
                    ))
                })
        };
        let apple_id = require(APPLE_ID_VAR)?;
        let team_id = require(TEAM_ID_VAR)?;
        let password = require(PASSWORD_VAR)?;

        if team_id.chars().count() != 10 {
            return Err(Error::Preflight(format!(
                "{TEAM_ID_VAR} must be the 10-character team identifier \
                 (got {} characters)",
                team_id.chars().count()
            )));
        }

        Ok(Self {
            apple_id,
            team_id,
            password,
        })
    }
}

/// Subset of the notary client's JSON submission result.
#[derive(Debug, Deserialize)]
struct SubmissionResult {
    id: Option<String>,
    status: Option<String>,
    message: Option<String>,
}

/// Submits the artifact, waits for the verdict, and staples the ticket
/// onto the bundle.
///
/// The artifact is the disk image when one exists, otherwise a fresh
/// compressed archive of the bundle. A verdict other than `Accepted` is
/// reported as [`Error::NotarizationRejected`]; prior artifacts are left
/// intact. On success the caller re-runs the disk-image stage so the
/// distributed image contains the stapled bundle.
pub async fn notarize(
    ctx: &BuildContext,
    credentials: &NotaryCredentials,
    app_path: &Path,
    dmg_path: Option<&Path>,
) -> Result<()> {
    let artifact = match dmg_path {
        Some(dmg) => dmg.to_path_buf(),
        None => archive_bundle(ctx, app_path).await?,
    };

    log::info!(
        "submitting {} for notarization (this blocks until the service \
         returns a verdict)",
        artifact.display()
    );
    let output = cmd::run(
        "xcrun",
        [
            OsString::from("notarytool"),
            "submit".into(),
            artifact.clone().into(),
            "--apple-id".into(),
            credentials.apple_id.as_str().into(),
            "--team-id".into(),
            credentials.team_id.as_str().into(),
            "--password".into(),
            credentials.password.as_str().into(),
            "--wait".into(),
            "--output-format".into(),
            "json".into(),
        ],
        None,
    )
    .await?;

    let result: SubmissionResult = match serde_json::from_str(output.stdout.trim()) {
        Ok(result) => result,
        Err(e) if output.success() => return Err(Error::Json(e)),
        // A failed submission may not print JSON at all; carry the
        // stderr tail forward as the service message.
        Err(_) => SubmissionResult {
            id: None,
            status: None,
            message: Some(output.stderr_tail()),
        },
    };

    if let Some(id) = &result.id {
        log::info!("submission id: {id}");
    }

    let status = result.status.unwrap_or_else(|| {
        if output.success() {
            "Accepted".to_string()
        } else {
            "Unknown".to_string()
        }
    });

    if !output.success() || status != "Accepted" {
        return Err(Error::NotarizationRejected {
            status,
            message: result
                .message
                .unwrap_or_else(|| output.stderr_tail()),
        });
    }

    log::info!("notarization accepted; stapling ticket onto the bundle");
    cmd::run_checked(
        "xcrun",
        [
            OsString::from("stapler"),
            "staple".into(),
            app_path.into(),
        ],
        None,
    )
    .await?;

    Ok(())
}

/// Creates a compressed archive of the bundle suitable for submission.
async fn archive_bundle(ctx: &BuildContext, app_path: &Path) -> Result<PathBuf> {
    let zip_path = ctx.build_dir().join(format!(
        "{}-{}.zip",
        ctx.product_name(),
        ctx.version_string()
    ));
    if let Some(parent) = zip_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    log::info!("archiving bundle for submission: {}", zip_path.display());
    cmd::run_checked(
        "ditto",
        [
            OsString::from("-c"),
            "-k".into(),
            "--keepParent".into(),
            app_path.into(),
            zip_path.clone().into(),
        ],
        None,
    )
    .await?;
    Ok(zip_path)
}
