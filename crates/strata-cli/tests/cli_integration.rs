use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

struct CliFixture {
    tmp: TempDir,
    config_path: PathBuf,
}

impl CliFixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let store_dir = tmp.path().join("store");
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            format!(
                "path = \"{}\"\nretention = 3\n\n[chunker]\nmethod = \"fixed\"\nexcept_size = 4\n",
                store_dir.display()
            ),
        )
        .unwrap();
        Self { tmp, config_path }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_strata"))
            .arg("--config-file")
            .arg(&self.config_path)
            .args(args)
            .output()
            .expect("failed to launch strata binary")
    }

    fn write_input(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.tmp.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn status_on_fresh_store_reports_zero_versions() {
    let fixture = CliFixture::new();
    let output = fixture.run(&["status"]);
    assert!(output.status.success(), "status failed: {output:?}");
    assert!(stdout(&output).contains("0 versions stored"));
}

#[test]
fn write_restore_lifecycle() {
    let fixture = CliFixture::new();
    let input = fixture.write_input("input", b"AAAABBBBAAAA");

    let output = fixture.run(&["write", "--input-file", input.to_str().unwrap()]);
    assert!(output.status.success(), "write failed: {output:?}");
    assert!(stdout(&output).contains("version 1 written"));

    let restored = fixture.tmp.path().join("restored");
    let output = fixture.run(&[
        "restore",
        "--restore-version",
        "1",
        "--restore-path",
        restored.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "restore failed: {output:?}");
    assert_eq!(std::fs::read(&restored).unwrap(), b"AAAABBBBAAAA");

    let output = fixture.run(&["status"]);
    assert!(stdout(&output).contains("1 versions stored"));
}

#[test]
fn delete_shifts_the_earliest_version_out() {
    let fixture = CliFixture::new();
    for (name, data) in [("v1", b"AAAABBBB"), ("v2", b"AAAACCCC")] {
        let input = fixture.write_input(name, data);
        let output = fixture.run(&["write", "--input-file", input.to_str().unwrap()]);
        assert!(output.status.success(), "write failed: {output:?}");
    }

    let output = fixture.run(&["delete"]);
    assert!(output.status.success(), "delete failed: {output:?}");

    let restored = fixture.tmp.path().join("restored");
    let output = fixture.run(&[
        "restore",
        "--restore-path",
        restored.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "restore failed: {output:?}");
    assert_eq!(std::fs::read(&restored).unwrap(), b"AAAACCCC");
}

#[test]
fn missing_config_file_exits_nonzero() {
    let fixture = CliFixture::new();
    let output = Command::new(env!("CARGO_BIN_EXE_strata"))
        .arg("--config-file")
        .arg(fixture.tmp.path().join("nope.toml"))
        .arg("status")
        .output()
        .expect("failed to launch strata binary");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error"));
}

#[test]
fn restore_of_unknown_version_fails() {
    let fixture = CliFixture::new();
    let input = fixture.write_input("input", b"AAAABBBB");
    fixture.run(&["write", "--input-file", input.to_str().unwrap()]);

    let restored = fixture.tmp.path().join("restored");
    let output = fixture.run(&[
        "restore",
        "--restore-version",
        "9",
        "--restore-path",
        restored.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}
