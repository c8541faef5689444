use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn reglex_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("reglex");
    path
}

fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Port 9 (discard) keeps any accidental request local and failing fast.
    let config_content = format!(
        r#"[db]
path = "{root}/data/index.sqlite"

[paths]
raw_dir = "{root}/data/raw"
summary_dir = "{root}/data/summarized"
pdf_dir = "{root}/data/pdf"

[harvest]
page_timeout_secs = 2
render_wait_ms = 0
document_wait_ms = 0

[[sources]]
name = "eurlex"
metadata = "{root}/data/eurlex_results.json"
query_url = "http://127.0.0.1:9/search?{{filter}}&year={{year}}&page={{page}}"
base_url = "http://127.0.0.1:9/"

[[sources.categories]]
name = "regulation"
filter = "type=REG"

[[sources.categories]]
name = "directive"
filter = "type=DIR"
{extra}
"#,
        root = root.display(),
        extra = extra
    );

    let config_path = config_dir.join("reglex.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_reglex(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = reglex_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run reglex binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_layout() {
    let (tmp, config) = setup_test_env("");
    let (stdout, stderr, success) = run_reglex(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("ok"));
    assert!(tmp.path().join("data/raw").is_dir());
    assert!(tmp.path().join("data/summarized").is_dir());
    assert!(tmp.path().join("data/pdf").is_dir());
    assert!(tmp.path().join("data/index.sqlite").exists());

    // Idempotent.
    let (_, stderr, success) = run_reglex(&config, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_records_on_missing_store_is_empty() {
    let (tmp, config) = setup_test_env("");
    let (stdout, stderr, success) = run_reglex(&config, &["records"]);
    assert!(success, "records failed: {}", stderr);
    assert!(stdout.contains("records eurlex (0)"));
    assert!(!tmp.path().join("data/eurlex_results.json").exists());
}

#[test]
fn test_records_lists_newest_first() {
    let (tmp, config) = setup_test_env("");
    fs::create_dir_all(tmp.path().join("data")).unwrap();
    fs::write(
        tmp.path().join("data/eurlex_results.json"),
        r#"[
  {"celex": "OLD", "title": "Old act", "link": "l", "date": "01/02/2024", "page": 1},
  {"celex": "UNDATED", "title": "No date", "link": "l", "date": null, "page": 1},
  {"celex": "NEW", "title": "New act", "link": "l", "date": "15/03/2025", "page": 2, "category": "regulation"}
]"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_reglex(&config, &["records"]);
    assert!(success, "records failed: {}", stderr);
    let new = stdout.find("NEW").unwrap();
    let old = stdout.find("OLD").unwrap();
    let undated = stdout.find("UNDATED").unwrap();
    assert!(new < old && old < undated, "unexpected order:\n{}", stdout);

    let (stdout, _, _) = run_reglex(&config, &["records", "--limit", "1"]);
    assert!(stdout.contains("NEW"));
    assert!(!stdout.contains("OLD"));
}

#[test]
fn test_unknown_category_fails_before_harvesting() {
    let (tmp, config) = setup_test_env("");
    let (_, stderr, success) = run_reglex(&config, &["harvest", "--category", "treaty"]);
    assert!(!success);
    assert!(stderr.contains("unknown category 'treaty'"), "stderr: {}", stderr);
    assert!(stderr.contains("regulation, directive"));
    assert!(!tmp.path().join("data/eurlex_results.json").exists());
}

#[test]
fn test_unknown_source_fails() {
    let (_tmp, config) = setup_test_env("");
    let (_, stderr, success) = run_reglex(&config, &["fetch", "--source", "nowhere"]);
    assert!(!success);
    assert!(stderr.contains("unknown source 'nowhere'"), "stderr: {}", stderr);
}

#[test]
fn test_process_with_no_raw_texts() {
    let (_tmp, config) = setup_test_env("");
    let (stdout, stderr, success) = run_reglex(&config, &["process"]);
    assert!(success, "process failed: {}", stderr);
    assert!(stdout.contains("raw documents: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_clean_pdfs_with_nothing_downloaded() {
    let (_tmp, config) = setup_test_env("");
    let (stdout, stderr, success) = run_reglex(&config, &["clean-pdfs"]);
    assert!(success, "clean-pdfs failed: {}", stderr);
    assert!(stdout.contains("pdfs: 0"));
}

#[test]
fn test_index_requires_embeddings() {
    let (_tmp, config) = setup_test_env("");
    let (_, stderr, success) = run_reglex(&config, &["index"]);
    assert!(!success);
    assert!(stderr.contains("requires embeddings"));
}

#[test]
fn test_empty_search_has_no_results() {
    let (_tmp, config) = setup_test_env("");
    let (stdout, _, success) = run_reglex(&config, &["search", "  "]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_invalid_chunking_is_rejected() {
    let (_tmp, config) = setup_test_env("\n[chunking]\nsize = 100\noverlap = 100\n");
    let (_, stderr, success) = run_reglex(&config, &["records"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr: {}", stderr);
}

#[test]
fn test_unknown_progress_mode_is_rejected() {
    let (_tmp, config) = setup_test_env("");
    let output = Command::new(reglex_binary())
        .arg("--config")
        .arg(config.to_str().unwrap())
        .args(["--progress", "loud", "records"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown progress mode"));
}
