//! Binary-level tests for the `docmem` CLI.
//!
//! Embedding is set to `disabled` and OCR is switched off, so
//! these exercise the command surface and the failure reporting without a
//! model or external tools.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docmem_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docmem");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    let config_content = format!(
        r#"[store]
path = "{}/data/docmem.sqlite"
collection = "pdf_memory"

[embedding]
provider = "disabled"

[ocr]
enabled = false

[server]
bind = "127.0.0.1:0"
"#,
        root.display()
    );

    let config_path = config_dir.join("docmem.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docmem(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docmem_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docmem binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn write_docx(path: &Path, paragraphs: &[&str]) {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    fs::write(path, buf).unwrap();
}

#[test]
fn test_init_creates_store() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docmem(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/docmem.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_docmem(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_docmem(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_stats_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_docmem(&config_path, &["init"]);
    let (stdout, stderr, success) = run_docmem(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("pdf_memory (cosine)"));
    assert!(stdout.contains("Records:     0"));
}

#[test]
fn test_ingest_unsupported_file_fails() {
    let (tmp, config_path) = setup_test_env();
    let path = tmp.path().join("files/notes.txt");
    fs::write(&path, "plain text").unwrap();

    let (stdout, _, success) = run_docmem(&config_path, &["ingest", path.to_str().unwrap()]);
    assert!(!success, "ingest of .txt should fail");
    assert!(
        stdout.contains("unsupported_format"),
        "expected unsupported_format, got: {}",
        stdout
    );
}

#[test]
fn test_ingest_empty_docx_reports_no_text() {
    let (tmp, config_path) = setup_test_env();
    let path = tmp.path().join("files/empty.docx");
    write_docx(&path, &[]);

    let (stdout, _, success) = run_docmem(&config_path, &["ingest", path.to_str().unwrap()]);
    assert!(!success);
    assert!(
        stdout.contains("no_text_found"),
        "expected no_text_found, got: {}",
        stdout
    );
}

#[test]
fn test_ingest_without_embedding_provider_stores_nothing() {
    let (tmp, config_path) = setup_test_env();
    let path = tmp.path().join("files/report.docx");
    write_docx(&path, &["Battery pack thermal management overview."]);

    let (stdout, _, success) = run_docmem(&config_path, &["ingest", path.to_str().unwrap()]);
    assert!(!success);
    assert!(
        stdout.contains("embedding_failed"),
        "expected embedding_failed, got: {}",
        stdout
    );

    let (stats, _, _) = run_docmem(&config_path, &["stats"]);
    assert!(stats.contains("Records:     0"), "stats: {}", stats);
}

#[test]
fn test_directory_failures_do_not_fail_the_run() {
    let (tmp, config_path) = setup_test_env();
    write_docx(&tmp.path().join("files/empty.docx"), &[]);
    fs::write(tmp.path().join("files/ignored.txt"), "skip me").unwrap();

    let dir = tmp.path().join("files");
    let (stdout, stderr, success) = run_docmem(&config_path, &["ingest", dir.to_str().unwrap()]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("failed: 1"));
    assert!(!stdout.contains("ignored.txt"));
}

#[test]
fn test_ingest_directory_without_documents_fails() {
    let (tmp, config_path) = setup_test_env();
    fs::write(tmp.path().join("files/readme.md"), "# hi").unwrap();

    let dir = tmp.path().join("files");
    let (_, stderr, success) = run_docmem(&config_path, &["ingest", dir.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("No supported documents"));
}

#[test]
fn test_query_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_docmem(&config_path, &["init"]);
    let (stdout, stderr, success) = run_docmem(&config_path, &["query", "anything at all"]);
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("No matches."));
}

#[test]
fn test_missing_config_uses_defaults_for_help() {
    let (stdout, _, success) = run_docmem(Path::new("/nonexistent/docmem.toml"), &["--help"]);
    assert!(success);
    assert!(stdout.contains("ingest"));
    assert!(stdout.contains("serve"));
}
