//! Integration tests driving the `parcel` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package>
  <metadata>
    <id>Sample</id>
    <version>1.0.0</version>
    <authors>alice</authors>
    <description>A sample package.</description>
    <dependencies>
      <dependency id="Json" version="1.0" />
    </dependencies>
  </metadata>
  <files>
    <file src="bin\Sample.dll" target="lib\net45" />
  </files>
</package>"#;

/// A temporary project with a manifest and one binary.
struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("bin")).expect("failed to create bin");
        std::fs::write(root.join("bin/Sample.dll"), b"MZ").expect("failed to write dll");
        std::fs::write(root.join("Sample.nuspec"), MANIFEST).expect("failed to write manifest");
        Self { temp_dir }
    }

    fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    fn manifest(&self) -> PathBuf {
        self.root().join("Sample.nuspec")
    }

    fn parcel(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_parcel"));
        cmd.current_dir(self.root());
        cmd.env_remove("PARCEL_BASE_PATH");
        cmd.env_remove("PARCEL_OUTPUT_DIR");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.parcel().args(args).output().expect("failed to run parcel")
    }

    fn pack(&self) -> PathBuf {
        let out = self.root().join("out");
        let output = self
            .parcel()
            .arg("pack")
            .arg(self.manifest())
            .arg("--output-dir")
            .arg(&out)
            .output()
            .expect("failed to run parcel");
        assert!(
            output.status.success(),
            "pack failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        out.join("Sample.1.0.0.nupkg")
    }
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("pack"));
}

#[test]
fn test_pack_writes_package() {
    let ctx = TestContext::new();
    let package = ctx.pack();
    assert!(package.exists());

    // Only the package remains; the temporary file was renamed into place
    let entries: Vec<_> = std::fs::read_dir(package.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_pack_relative_manifest_from_its_directory() {
    let ctx = TestContext::new();
    let output = ctx.run(&["pack", "Sample.nuspec", "-o", "out"]);
    assert!(
        output.status.success(),
        "pack failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(ctx.root().join("out/Sample.1.0.0.nupkg").exists());
}

#[test]
fn test_verbose_pack_logs_to_stderr() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--verbose", "pack", "Sample.nuspec", "-o", "out"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("writing package"), "stderr: {stderr}");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("writing package"));
}

#[test]
fn test_pack_output_dir_from_env() {
    let ctx = TestContext::new();
    let out = ctx.root().join("from-env");
    let output = ctx
        .parcel()
        .arg("pack")
        .arg(ctx.manifest())
        .env("PARCEL_OUTPUT_DIR", &out)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(out.join("Sample.1.0.0.nupkg").exists());
}

#[test]
fn test_pack_missing_file_fails() {
    let ctx = TestContext::new();
    std::fs::remove_file(ctx.root().join("bin/Sample.dll")).unwrap();
    let out = ctx.root().join("out");
    let output = ctx
        .parcel()
        .arg("pack")
        .arg(ctx.manifest())
        .arg("-o")
        .arg(&out)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Sample.dll"));
    assert!(!out.join("Sample.1.0.0.nupkg").exists());
}

#[test]
fn test_check_reports_schema() {
    let ctx = TestContext::new();
    let output = ctx.run(&["check", "Sample.nuspec"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Sample"));
    assert!(stdout.contains("schema"));
}

#[test]
fn test_check_rejects_invalid_manifest() {
    let ctx = TestContext::new();
    std::fs::write(
        ctx.manifest(),
        MANIFEST.replace("<authors>alice</authors>", ""),
    )
    .unwrap();
    let output = ctx.run(&["check", "Sample.nuspec"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("authors"));
}

#[test]
fn test_inspect_json() {
    let ctx = TestContext::new();
    let package = ctx.pack();
    let output = ctx
        .parcel()
        .arg("inspect")
        .arg(&package)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["metadata"]["id"], "Sample");
    assert_eq!(report["files"][0], r"lib\net45\Sample.dll");
    assert_eq!(report["files"].as_array().unwrap().len(), 1);
}

#[test]
fn test_manifest_roundtrip_through_package() {
    let ctx = TestContext::new();
    let package = ctx.pack();
    let rebuilt = ctx.root().join("rebuilt.nuspec");
    let output = ctx
        .parcel()
        .arg("manifest")
        .arg(&package)
        .arg("-o")
        .arg(&rebuilt)
        .output()
        .unwrap();
    assert!(output.status.success());

    let text = std::fs::read_to_string(&rebuilt).unwrap();
    assert!(text.contains("<id>Sample</id>"));
    assert!(text.contains(r#"id="Json""#));
    assert!(!text.contains("<files"));
}
