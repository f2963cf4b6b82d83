//! Shared helpers for integration tests: throwaway git remotes and config files.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Run git with a fixed identity, panicking on a non-zero exit.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git should be installed");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Create a source repository with one commit under `root/source`.
pub fn init_source_repo(root: &Path) -> PathBuf {
    let source = root.join("source");
    fs::create_dir_all(source.join("content")).unwrap();
    git(&source, &["init", "-q"]);
    fs::write(source.join("content/index.md"), "# Hello\n").unwrap();
    git(&source, &["add", "."]);
    git(&source, &["commit", "-q", "-m", "initial"]);
    source
}

/// Add a commit touching `file` in the source repository.
pub fn commit_file(source: &Path, file: &str, contents: &str) {
    let path = source.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
    git(source, &["add", "."]);
    git(source, &["commit", "-q", "-m", &format!("update {}", file)]);
}

pub fn head(repo: &Path) -> String {
    git(repo, &["rev-parse", "HEAD"]).trim().to_string()
}

/// Quote a string as a TOML basic string.
pub fn toml_str(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Write a config file under `root` for a hugo site built by `build_script` (run with `sh -c`).
pub fn write_config(root: &Path, source: &Path, build_script: &str, extra: &str) -> PathBuf {
    let path = root.join("config.toml");
    let text = format!(
        r#"
[listen]
ip = "127.0.0.1"
port = 8080
url = "/hook"
secretKey = "s3cr3t"

[repo]
source = {source}
blogApp = "hugo"
buildCommand = ["sh", "-c", {script}]

{extra}
"#,
        source = toml_str(&source.display().to_string()),
        script = toml_str(build_script),
        extra = extra,
    );
    fs::write(&path, text).unwrap();
    path
}
