use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const GUIDE: &str = "# Guide\nintro text\n## Install\nrun the installer\n# Usage\nthe needle is here\n";

struct Sandbox {
    home: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            home: tempfile::tempdir().unwrap(),
        }
    }

    fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.home.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn path(&self, name: &str) -> PathBuf {
        self.home.path().join(name)
    }

    /// A `folio` invocation whose config, data and log dirs live in the sandbox.
    fn folio(&self) -> Command {
        let home = self.home.path();
        let mut cmd = Command::cargo_bin("folio").unwrap();
        cmd.env("HOME", home)
            .env("XDG_CONFIG_HOME", home.join("config"))
            .env("XDG_DATA_HOME", home.join("data"))
            .env_remove("RUST_LOG");
        cmd
    }

    fn small_pages(&self) -> PathBuf {
        self.file("folio.toml", "[text]\nlines_per_page = 2\ncolumns = 40\n")
    }
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn info_reports_title_and_page_count_as_json() {
    let sandbox = Sandbox::new();
    let doc = sandbox.file("guide.md", GUIDE);
    let config = sandbox.small_pages();

    let output = sandbox
        .folio()
        .args(["--config", arg(&config), "info", "--json", arg(&doc)])
        .output()
        .unwrap();
    assert!(output.status.success());

    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["title"], "Guide");
    assert_eq!(info["pages"], "3");
    assert_eq!(info["mimeType"], "text/markdown");
}

#[test]
fn synopsis_is_indented_by_level() {
    let sandbox = Sandbox::new();
    let doc = sandbox.file("guide.md", GUIDE);
    let config = sandbox.small_pages();

    sandbox
        .folio()
        .args(["--config", arg(&config), "synopsis", arg(&doc)])
        .assert()
        .success()
        .stdout("Guide (1)\n  Install (2)\nUsage (3)\n");
}

#[test]
fn search_lists_matching_pages() {
    let sandbox = Sandbox::new();
    let doc = sandbox.file("guide.md", GUIDE);
    let config = sandbox.small_pages();

    sandbox
        .folio()
        .args(["--config", arg(&config), "search", arg(&doc), "NEEDLE"])
        .assert()
        .success()
        .stdout(predicate::str::contains("page 3: 1 match area(s)"));

    sandbox
        .folio()
        .args([
            "--config",
            arg(&config),
            "search",
            arg(&doc),
            "NEEDLE",
            "--case-sensitive",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("no matches"));
}

#[test]
fn search_json_report_marks_found() {
    let sandbox = Sandbox::new();
    let doc = sandbox.file("guide.md", GUIDE);

    let output = sandbox
        .folio()
        .args(["search", arg(&doc), "installer needle", "--mode", "any-word", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["found"], true);
    assert_eq!(report["pages"][0]["page"], 0);
}

#[test]
fn export_copies_the_text() {
    let sandbox = Sandbox::new();
    let doc = sandbox.file("notes.txt", "plain\ntext\n");
    let out = sandbox.path("out.txt");

    sandbox
        .folio()
        .args(["export", arg(&doc), arg(&out)])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(out).unwrap(), "plain\ntext\n");
}

#[test]
fn render_writes_an_image_of_the_requested_size() {
    let sandbox = Sandbox::new();
    let doc = sandbox.file("guide.md", GUIDE);
    let out = sandbox.path("page.png");

    sandbox
        .folio()
        .args([
            "render",
            arg(&doc),
            "--width",
            "120",
            "--height",
            "90",
            "-o",
            arg(&out),
        ])
        .assert()
        .success();

    let image = image::open(&out).unwrap();
    assert_eq!((image.width(), image.height()), (120, 90));
}

#[test]
fn render_rejects_pages_past_the_end() {
    let sandbox = Sandbox::new();
    let doc = sandbox.file("guide.md", GUIDE);
    let out = sandbox.path("page.png");

    sandbox
        .folio()
        .args(["render", arg(&doc), "--page", "9", "-o", arg(&out)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("document has 1 pages"));
    assert!(!out.exists());
}

#[test]
fn fonts_lists_the_monospace_face() {
    let sandbox = Sandbox::new();
    let doc = sandbox.file("guide.md", GUIDE);

    sandbox
        .folio()
        .args(["fonts", arg(&doc)])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Monospace\t"));
}

#[test]
fn config_prints_the_settings_in_effect() {
    let sandbox = Sandbox::new();
    let config = sandbox.small_pages();

    sandbox
        .folio()
        .args(["config", "--config", arg(&config)])
        .assert()
        .success()
        .stdout(predicate::str::contains("lines_per_page = 2"));
}

#[test]
fn unknown_formats_fail_to_open() {
    let sandbox = Sandbox::new();
    let doc = sandbox.file("scan.xyz", "whatever");

    sandbox
        .folio()
        .args(["info", arg(&doc)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open"));
}
