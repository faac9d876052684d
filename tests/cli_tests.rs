//! End-to-end checks of the command line surface.
//!
//! These exercise argument validation and manifest loading only; no
//! platform tooling is invoked.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn packager() -> Command {
    Command::cargo_bin("nodeforge_packager").expect("binary built")
}

fn write_manifest(dir: &std::path::Path) {
    fs::write(dir.join("main.py"), "print('hello')\n").expect("entry point");
    fs::write(
        dir.join("packager.toml"),
        r#"
entry_point = "main.py"

[identity]
name = "Example App"
bundle_identifier = "org.example.app"
version = "1.0.0"
"#,
    )
    .expect("manifest");
}

#[test]
fn help_lists_the_full_flag_surface() {
    packager()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--sign")
                .and(predicate::str::contains("--notarize"))
                .and(predicate::str::contains("--arch"))
                .and(predicate::str::contains("--skip-dmg"))
                .and(predicate::str::contains("--clean")),
        );
}

#[test]
fn notarize_without_sign_fails_before_any_build_work() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_manifest(dir.path());

    packager()
        .current_dir(dir.path())
        .arg("--notarize")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--sign"));

    // Validation failed before any stage ran, so no build products exist.
    assert!(!dir.path().join("dist").exists());
    assert!(!dir.path().join("build").exists());
    assert!(!dir.path().join(".venv").exists());
}

#[test]
fn missing_manifest_is_reported_by_path() {
    let dir = tempfile::tempdir().expect("tempdir");

    packager()
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("packager.toml"));
}

#[test]
fn malformed_bundle_identifier_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("main.py"), "print('hello')\n").expect("entry point");
    fs::write(
        dir.path().join("packager.toml"),
        r#"
entry_point = "main.py"

[identity]
name = "Example App"
bundle_identifier = "not-reverse-dns"
version = "1.0.0"
"#,
    )
    .expect("manifest");

    packager()
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("reverse-DNS"));
}

#[test]
fn missing_entry_point_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("packager.toml"),
        r#"
entry_point = "main.py"

[identity]
name = "Example App"
bundle_identifier = "org.example.app"
version = "1.0.0"
"#,
    )
    .expect("manifest");

    packager()
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("entry point"));
}

// Host support is checked before any stage runs, so this is deterministic
// off macOS: the section header has already gone to stdout, the fatal
// pre-flight error goes to stderr.
#[cfg(not(target_os = "macos"))]
#[test]
fn progress_goes_to_stdout_and_fatal_errors_to_stderr() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_manifest(dir.path());

    packager()
        .current_dir(dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("Packaging Example App 1.0.0"))
        .stderr(predicate::str::contains("macOS"));
}

#[test]
fn unknown_arch_value_is_rejected_by_the_parser() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_manifest(dir.path());

    packager()
        .current_dir(dir.path())
        .args(["--arch", "ppc64"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("x86_64"));
}
