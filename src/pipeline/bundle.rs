//! Application bundle creation via PyInstaller.
//!
//! Three staged transformations: dependency analysis of the entry point
//! (hidden imports unioned in, excluded packages subtracted), packing of
//! the closed module set plus interpreter into a windowed single-file
//! payload, and collection into the final `.app` directory. Afterwards
//! the metadata descriptor is rewritten from the manifest and the
//! hermetic-exclusion guarantee is enforced.

use crate::pipeline::context::BuildContext;
use crate::pipeline::env::PreparedEnv;
use crate::pipeline::error::{Error, Result};
use crate::pipeline::utils::{cmd, fs};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Builds the application bundle described by the manifest.
///
/// Returns the path of the produced `.app`. Fatal stage failure if the
/// packaging tool does not produce the expected output directory.
pub async fn build(ctx: &BuildContext, env: &PreparedEnv, icon: Option<&Path>) -> Result<PathBuf> {
    let app_path = ctx.app_bundle_path();
    let args = pyinstaller_args(ctx, icon);

    log::info!("packing {} with PyInstaller", ctx.product_name());
    cmd::run_checked(
        env.pyinstaller.to_string_lossy().as_ref(),
        &args,
        Some(ctx.project_root()),
    )
    .await?;

    if !app_path.is_dir() {
        return Err(Error::StageFailed {
            stage: "bundle",
            reason: format!(
                "expected output bundle {} was not produced",
                app_path.display()
            ),
        });
    }

    remove_stray_payload(ctx).await?;
    write_metadata(&app_path, ctx, icon.is_some())?;

    let residues = excluded_residues(&app_path, &ctx.manifest().excluded_packages)?;
    if !residues.is_empty() {
        return Err(Error::StageFailed {
            stage: "bundle",
            reason: format!(
                "excluded packages leaked into the bundle: {}",
                residues
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        });
    }

    log::info!("bundle created at {}", app_path.display());
    Ok(app_path)
}

/// Assembles the PyInstaller argument list from the manifest.
pub(crate) fn pyinstaller_args(ctx: &BuildContext, icon: Option<&Path>) -> Vec<OsString> {
    let manifest = ctx.manifest();
    let mut args: Vec<OsString> = vec![
        "--noconfirm".into(),
        "--onefile".into(),
        "--name".into(),
        manifest.identity.name.as_str().into(),
        "--osx-bundle-identifier".into(),
        manifest.identity.bundle_identifier.as_str().into(),
        "--target-arch".into(),
        ctx.arch().target_arch_flag().into(),
        "--distpath".into(),
        ctx.dist_dir().into(),
        "--workpath".into(),
        ctx.build_dir().into(),
        "--specpath".into(),
        ctx.build_dir().into(),
    ];

    if manifest.ui.windowed {
        args.push("--windowed".into());
        // File-open events arrive as argv on macOS only with emulation on.
        args.push("--argv-emulation".into());
    }

    for module in &manifest.extra_modules {
        args.push("--hidden-import".into());
        args.push(module.as_str().into());
    }
    for package in &manifest.excluded_packages {
        args.push("--exclude-module".into());
        args.push(package.as_str().into());
    }
    for resource in &manifest.resources {
        args.push("--add-data".into());
        args.push(format!("{}:{}", resource.source.display(), resource.dest).into());
    }
    if let Some(icns) = icon {
        args.push("--icon".into());
        args.push(icns.into());
    }

    args.push(manifest.entry_point.clone().into());
    args
}

/// Removes the bare payload PyInstaller leaves next to the `.app`.
///
/// In single-file windowed mode the tool emits both `dist/<Name>` (the
/// standalone executable) and `dist/<Name>.app`; only the bundle is a
/// distributable artifact, so the sibling is deleted once the bundle is
/// confirmed.
pub(crate) async fn remove_stray_payload(ctx: &BuildContext) -> Result<()> {
    let stray = ctx.dist_dir().join(ctx.product_name());
    if stray.is_dir() {
        log::debug!("removing stray payload directory {}", stray.display());
        fs::remove_dir_all(&stray).await?;
    } else if stray.is_file() {
        log::debug!("removing stray payload {}", stray.display());
        fs::remove_file(&stray).await?;
    }
    Ok(())
}

/// Rewrites the bundle's metadata descriptor (`Contents/Info.plist`) from
/// the manifest's identity fields and UI flags.
///
/// The packaging tool writes a baseline descriptor; this pass overlays the
/// fields the manifest owns. When no icon resource exists the icon key is
/// omitted rather than pointing at a missing file.
pub(crate) fn write_metadata(app_path: &Path, ctx: &BuildContext, has_icon: bool) -> Result<()> {
    use plist::Value;

    let manifest = ctx.manifest();
    let plist_path = app_path.join("Contents/Info.plist");

    let mut dict = if plist_path.is_file() {
        match Value::from_file(&plist_path)? {
            Value::Dictionary(d) => d,
            _ => plist::Dictionary::new(),
        }
    } else {
        plist::Dictionary::new()
    };

    dict.insert("CFBundleName".into(), manifest.identity.name.clone().into());
    dict.insert(
        "CFBundleDisplayName".into(),
        manifest.identity.name.clone().into(),
    );
    dict.insert(
        "CFBundleIdentifier".into(),
        manifest.identity.bundle_identifier.clone().into(),
    );
    dict.insert(
        "CFBundleShortVersionString".into(),
        manifest.identity.version.clone().into(),
    );
    dict.insert(
        "CFBundleVersion".into(),
        manifest.identity.version.clone().into(),
    );
    dict.insert("CFBundlePackageType".into(), "APPL".into());

    if let Some(category) = manifest.identity.category.as_ref() {
        dict.insert("LSApplicationCategoryType".into(), category.clone().into());
    }
    if let Some(copyright) = manifest.identity.copyright.as_ref() {
        dict.insert("NSHumanReadableCopyright".into(), copyright.clone().into());
    }

    dict.insert(
        "NSHighResolutionCapable".into(),
        manifest.ui.high_resolution.into(),
    );
    // NSRequiresAquaSystemAppearance=true pins the light appearance;
    // dark-mode-aware apps leave the system free to choose.
    dict.insert(
        "NSRequiresAquaSystemAppearance".into(),
        (!manifest.ui.dark_mode_aware).into(),
    );

    for (key, description) in &manifest.usage_descriptions {
        dict.insert(key.clone(), description.clone().into());
    }

    if has_icon {
        dict.insert(
            "CFBundleIconFile".into(),
            format!("{}.icns", manifest.identity.name).into(),
        );
    } else {
        dict.remove("CFBundleIconFile");
    }

    if let Some(parent) = plist_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Value::Dictionary(dict).to_file_xml(&plist_path)?;
    Ok(())
}

/// Scans the bundle for files left behind by excluded packages.
///
/// The build must be hermetic with respect to the exclusion list: none of
/// those packages' code may be reachable in the output. Matches any path
/// component equal to an excluded package name, or prefixed by it plus a
/// separator ("numpy", "numpy.libs", "numpy-1.26.dist-info").
pub(crate) fn excluded_residues(app_path: &Path, excluded: &[String]) -> Result<Vec<PathBuf>> {
    if excluded.is_empty() {
        return Ok(Vec::new());
    }

    let mut residues = Vec::new();
    for entry in WalkDir::new(app_path).sort_by_file_name() {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        for package in excluded {
            let package = package.to_ascii_lowercase();
            let matched = name == package
                || name
                    .strip_prefix(package.as_str())
                    .is_some_and(|rest| rest.starts_with(['.', '-']));
            if matched {
                residues.push(entry.path().to_path_buf());
                break;
            }
        }
    }
    Ok(residues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::manifest::BuildManifest;

    fn test_ctx(dir: &Path) -> BuildContext {
        let toml = r#"
            entry_point = "main.py"
            extra_modules = ["requests"]
            excluded_packages = ["numpy"]

            [identity]
            name = "Example App"
            bundle_identifier = "com.example.app"
            version = "1.0.0"
        "#;
        let manifest: BuildManifest = toml::from_str(toml).expect("manifest");
        BuildContext::new(dir.to_path_buf(), manifest, None, false, false, None)
    }

    #[test]
    fn args_carry_hidden_imports_and_exclusions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = test_ctx(dir.path());
        let args = pyinstaller_args(&ctx, None);
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.contains(&"--windowed".to_string()));
        assert!(args.contains(&"--argv-emulation".to_string()));
        let hidden = args.iter().position(|a| a == "--hidden-import").unwrap();
        assert_eq!(args[hidden + 1], "requests");
        let excluded = args.iter().position(|a| a == "--exclude-module").unwrap();
        assert_eq!(args[excluded + 1], "numpy");
        assert!(!args.contains(&"--icon".to_string()));
        assert_eq!(args.last().unwrap(), "main.py");
    }

    #[test]
    fn args_pack_a_single_file_payload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = test_ctx(dir.path());
        let args = pyinstaller_args(&ctx, None);
        assert!(
            args.iter().any(|a| a == "--onefile"),
            "payload must be packed as a single file"
        );
    }

    #[tokio::test]
    async fn stray_payload_is_removed_and_the_bundle_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = test_ctx(dir.path());
        let dist = ctx.dist_dir();
        std::fs::create_dir_all(dist.join("Example App.app/Contents")).expect("mkdir");
        std::fs::write(dist.join("Example App"), b"payload").expect("write");

        remove_stray_payload(&ctx).await.expect("cleanup");

        assert!(!dist.join("Example App").exists());
        assert!(dist.join("Example App.app").is_dir());
    }

    #[tokio::test]
    async fn stray_payload_directory_is_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = test_ctx(dir.path());
        let stray = ctx.dist_dir().join("Example App");
        std::fs::create_dir_all(&stray).expect("mkdir");
        std::fs::write(stray.join("Example App"), b"payload").expect("write");

        remove_stray_payload(&ctx).await.expect("cleanup");

        assert!(!stray.exists());
    }

    #[test]
    fn metadata_omits_icon_key_when_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = test_ctx(dir.path());
        let app = dir.path().join("Example App.app");
        std::fs::create_dir_all(app.join("Contents")).expect("mkdir");

        write_metadata(&app, &ctx, false).expect("metadata");

        let value = plist::Value::from_file(app.join("Contents/Info.plist")).expect("plist");
        let dict = value.as_dictionary().expect("dict");
        assert!(dict.get("CFBundleIconFile").is_none());
        assert_eq!(
            dict.get("CFBundleIdentifier").and_then(|v| v.as_string()),
            Some("com.example.app")
        );
        assert_eq!(
            dict.get("CFBundleShortVersionString")
                .and_then(|v| v.as_string()),
            Some("1.0.0")
        );
        assert_eq!(
            dict.get("NSHighResolutionCapable").and_then(|v| v.as_boolean()),
            Some(true)
        );
    }

    #[test]
    fn residue_scan_flags_excluded_package_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = dir.path().join("Example App.app");
        let libs = app.join("Contents/Frameworks");
        std::fs::create_dir_all(&libs).expect("mkdir");
        std::fs::write(libs.join("numpy.libs"), b"residue").expect("write");
        std::fs::write(libs.join("requests.py"), b"fine").expect("write");

        let residues =
            excluded_residues(&app, &["numpy".to_string()]).expect("scan");
        assert_eq!(residues.len(), 1);
        assert!(residues[0].ends_with("numpy.libs"));
    }

    #[test]
    fn residue_scan_clean_bundle_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = dir.path().join("Example App.app");
        std::fs::create_dir_all(app.join("Contents/MacOS")).expect("mkdir");
        std::fs::write(app.join("Contents/MacOS/Example App"), b"bin").expect("write");

        let residues =
            excluded_residues(&app, &["numpy".to_string()]).expect("scan");
        assert!(residues.is_empty());
    }
}
