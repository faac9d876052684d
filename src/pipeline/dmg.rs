//! Disk image packaging with hdiutil.
//!
//! Stages a fresh copy of the signed bundle next to an `/Applications`
//! symlink, creates a read-write image, lays out the Finder window
//! (geometry, icon positions, volume icon) through AppleScript, then
//! converts to compressed read-only UDZO. The image file is always
//! deleted and recreated, never patched: UDZO contents are immutable, so
//! post-notarization stapling forces a full regeneration pass through
//! this module.

use crate::pipeline::context::BuildContext;
use crate::pipeline::error::{Context, Error, ErrorExt, Result};
use crate::pipeline::utils::{cmd, fs};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

/// Finder window and icon layout for the drag-to-install image.
const WINDOW_ORIGIN: (u32, u32) = (100, 100);
const WINDOW_SIZE: (u32, u32) = (600, 400);
const APP_ICON_POSITION: (u32, u32) = (180, 170);
const INSTALL_SHORTCUT_POSITION: (u32, u32) = (480, 170);
const ICON_SIZE: u32 = 72;

/// Packages the signed bundle into `dist/<Name>-<version>.dmg`.
///
/// Skipped with a warning (returns `None`) when `hdiutil` is unavailable;
/// the bundle alone is still a valid artifact. When a signing identity
/// was supplied, the finished image is itself signed.
pub async fn package(ctx: &BuildContext, app_path: &Path) -> Result<Option<PathBuf>> {
    if cmd::find_tool("hdiutil").is_none() {
        log::warn!("hdiutil not available; skipping disk image creation");
        return Ok(None);
    }

    let dmg_path = ctx.dmg_path();
    fs::remove_file(&dmg_path).await?;
    fs::create_dir_all(&ctx.build_dir(), false).await?;

    // Fresh staging directory per run, removed when it goes out of scope.
    let staging = tempfile::tempdir_in(ctx.build_dir())
        .map_err(|e| Error::Generic(format!("creating staging directory: {e}")))?;

    let app_name = app_path
        .file_name()
        .context("invalid app bundle path")?;
    let staged_app = staging.path().join(app_name);
    log::info!("staging bundle into {}", staged_app.display());
    fs::copy_dir(app_path, &staged_app)
        .await
        .context("copying bundle into staging directory")?;

    #[cfg(unix)]
    {
        let applications_link = staging.path().join("Applications");
        std::os::unix::fs::symlink("/Applications", &applications_link)
            .fs_context("creating Applications symlink", &applications_link)?;
    }

    let volume_name = ctx.product_name().to_string();
    log::info!("creating read-write image");
    cmd::run_checked(
        "hdiutil",
        [
            OsString::from("create"),
            "-volname".into(),
            volume_name.as_str().into(),
            "-srcfolder".into(),
            staging.path().into(),
            "-ov".into(),
            "-format".into(),
            "UDRW".into(),
            dmg_path.clone().into(),
        ],
        None,
    )
    .await?;

    drop(staging);

    apply_layout(ctx, &dmg_path, &volume_name).await?;
    convert_to_compressed(&dmg_path).await?;

    if let Some(identity) = ctx.signing_identity() {
        super::sign::sign_dmg(&dmg_path, identity).await?;
    }

    log::info!("created disk image: {}", dmg_path.display());
    Ok(Some(dmg_path))
}

/// Mounts the image read-write, applies the Finder layout and volume
/// icon, and detaches.
///
/// The volume comes back off on both paths: a still-attached image makes
/// the UDZO conversion (and any re-run) fail against a busy file.
async fn apply_layout(ctx: &BuildContext, dmg_path: &Path, volume_name: &str) -> Result<()> {
    let mount_point = mount_rw(dmg_path, volume_name).await?;
    let layout = layout_volume(ctx, &mount_point, volume_name).await;
    let detach = detach(volume_name).await;
    first_failure(layout, detach)
}

/// Reports the layout failure ahead of any detach failure; a clean layout
/// passes the detach result through.
fn first_failure(layout: Result<()>, detach: Result<()>) -> Result<()> {
    match (layout, detach) {
        (Err(layout), Err(detach)) => {
            log::warn!("detach after failed layout also failed: {detach}");
            Err(layout)
        }
        (Err(layout), Ok(())) => Err(layout),
        (Ok(()), detach) => detach,
    }
}

/// Applies the volume icon and the Finder layout to a mounted volume.
async fn layout_volume(ctx: &BuildContext, mount_point: &Path, volume_name: &str) -> Result<()> {
    // Volume icon; cosmetic, best effort.
    let icns = ctx.icns_path();
    if icns.is_file() {
        let volume_icon = mount_point.join(".VolumeIcon.icns");
        if let Err(e) = fs::copy_file(&icns, &volume_icon).await {
            log::warn!("could not place volume icon: {e}");
        } else if let Ok(output) = cmd::run(
            "SetFile",
            [OsString::from("-a"), "C".into(), mount_point.into()],
            None,
        )
        .await
            && !output.success()
        {
            log::warn!("SetFile could not mark the volume icon: {}", output.stderr_tail());
        }
    }

    let app_name = format!("{}.app", ctx.product_name());
    let script = layout_script(volume_name, &app_name);
    let output = cmd::run("osascript", [OsString::from("-e"), script.into()], None).await?;
    if !output.success() {
        // Appearance only; the image still works without the layout.
        log::warn!("Finder layout script had issues: {}", output.stderr_tail());
    }

    Ok(())
}

/// Mounts the image read-write and waits for the mount point to appear.
async fn mount_rw(dmg_path: &Path, volume_name: &str) -> Result<PathBuf> {
    cmd::run_checked(
        "hdiutil",
        [
            OsString::from("attach"),
            dmg_path.into(),
            "-readwrite".into(),
            "-noverify".into(),
            "-nobrowse".into(),
        ],
        None,
    )
    .await?;

    let mount_point = PathBuf::from(format!("/Volumes/{volume_name}"));
    let max_retries = 10;
    for attempt in 0..max_retries {
        if mount_point.exists() {
            return Ok(mount_point);
        }
        if attempt == max_retries - 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Err(Error::Generic(format!(
        "mount point {} did not appear",
        mount_point.display()
    )))
}

/// Detaches the mounted image, force-detaching if the polite way fails.
async fn detach(volume_name: &str) -> Result<()> {
    let mount_point = format!("/Volumes/{volume_name}");

    // Give Finder a moment to flush the layout metadata.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let output = cmd::run("hdiutil", ["detach", mount_point.as_str()], None).await?;
    if !output.success() {
        log::warn!("detach had issues: {}", output.stderr_tail());
        cmd::run("hdiutil", ["detach", mount_point.as_str(), "-force"], None)
            .await
            .ok();
    }
    Ok(())
}

/// Converts the read-write image to compressed read-only UDZO in place.
async fn convert_to_compressed(dmg_path: &Path) -> Result<()> {
    let compressed = dmg_path.with_extension("dmg.compressed");

    cmd::run_checked(
        "hdiutil",
        [
            OsString::from("convert"),
            dmg_path.into(),
            "-format".into(),
            "UDZO".into(),
            "-o".into(),
            compressed.clone().into(),
        ],
        None,
    )
    .await?;

    fs::remove_file(dmg_path).await?;
    tokio::fs::rename(&compressed, dmg_path)
        .await
        .fs_context("replacing image with compressed copy", dmg_path)?;
    Ok(())
}

/// Builds the Finder layout script with the fixed window geometry and
/// icon placement.
pub(crate) fn layout_script(volume_name: &str, app_name: &str) -> String {
    let volume = escape_applescript_string(volume_name);
    let app = escape_applescript_string(app_name);
    let (x, y) = WINDOW_ORIGIN;
    let (width, height) = WINDOW_SIZE;
    let (app_x, app_y) = APP_ICON_POSITION;
    let (link_x, link_y) = INSTALL_SHORTCUT_POSITION;

    format!(
        r#"
        tell application "Finder"
            tell disk "{volume}"
                open
                set current view of container window to icon view
                set toolbar visible of container window to false
                set statusbar visible of container window to false
                set bounds of container window to {{{x}, {y}, {right}, {bottom}}}
                set viewOptions to icon view options of container window
                set arrangement of viewOptions to not arranged
                set icon size of viewOptions to {icon_size}
                set position of item "{app}" to {{{app_x}, {app_y}}}
                set position of item "Applications" to {{{link_x}, {link_y}}}
                close
                open
                update without registering applications
                delay 2
            end tell
        end tell
        "#,
        right = x + width,
        bottom = y + height,
        icon_size = ICON_SIZE,
    )
}

/// Escapes backslashes and double quotes so product names cannot break
/// out of the AppleScript string literals.
pub(crate) fn escape_applescript_string(s: &str) -> String {
    s.replace('\\', r"\\").replace('"', r#"\""#)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_backslashes() {
        assert_eq!(escape_applescript_string(r#"My"App"#), r#"My\"App"#);
        assert_eq!(escape_applescript_string(r"Path\File"), r"Path\\File");
        assert_eq!(escape_applescript_string("Plain"), "Plain");
    }

    #[test]
    fn layout_script_places_both_icons() {
        let script = layout_script("Example App", "Example App.app");
        assert!(script.contains(r#"set position of item "Example App.app" to {180, 170}"#));
        assert!(script.contains(r#"set position of item "Applications" to {480, 170}"#));
        assert!(script.contains("set bounds of container window to {100, 100, 700, 500}"));
    }

    #[test]
    fn layout_script_escapes_volume_name() {
        let script = layout_script(r#"Ex"ample"#, "a.app");
        assert!(script.contains(r#"tell disk "Ex\"ample""#));
    }

    #[test]
    fn layout_failure_wins_over_a_failed_detach() {
        let layout: Result<()> = Err(Error::Generic("layout broke".into()));
        let detach: Result<()> = Err(Error::Generic("detach broke".into()));
        let err = first_failure(layout, detach).unwrap_err();
        assert!(err.to_string().contains("layout broke"));
    }

    #[test]
    fn layout_failure_propagates_after_a_clean_detach() {
        let layout: Result<()> = Err(Error::Generic("layout broke".into()));
        let err = first_failure(layout, Ok(())).unwrap_err();
        assert!(err.to_string().contains("layout broke"));
    }

    #[test]
    fn detach_failure_surfaces_when_layout_succeeds() {
        let detach: Result<()> = Err(Error::Generic("detach broke".into()));
        assert!(first_failure(Ok(()), detach).is_err());
        assert!(first_failure(Ok(()), Ok(())).is_ok());
    }
}
