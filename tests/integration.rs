use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const EXPORT_CSV: &str = "\
issue_key,u_product_name_display_value,description,close_notes,u_resolution_tier_1,u_resolution_tier_2,u_resolution_tier3,sys_created_on,sys_created_by,priority
INC0001,Billing,Invoice totals are wrong after tax update,Recalculated tax table,Software,Config,Tax,03/15/2024, amy ,3
INC0002,Payroll,Payslips not generated,,,,,03/18/2024,bob,2
,Payroll,Row without a key,,,,,03/18/2024,bob,2
INC0003,Payroll,Bad priority,,,,,03/18/2024,bob,urgent
";

fn irag_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_irag"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("export.csv"), EXPORT_CSV).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/irag.sqlite"

[retrieval]
limit = 5
similarity_threshold = 0.5

[server]
bind = "127.0.0.1:7339"
"#,
        root.display()
    );

    let config_path = config_dir.join("irag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_irag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = irag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run irag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn export_path(config_path: &Path) -> String {
    config_path
        .parent()
        .and_then(|p| p.parent())
        .unwrap()
        .join("export.csv")
        .to_string_lossy()
        .to_string()
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_irag(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_irag(&config_path, &["init"]);
    assert!(success, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_csv_counts_and_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let export = export_path(&config_path);

    run_irag(&config_path, &["init"]);
    let (stdout, stderr, success) = run_irag(&config_path, &["ingest", &export]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("total rows: 4"), "got: {}", stdout);
    assert!(stdout.contains("processed: 2"), "got: {}", stdout);
    assert!(stdout.contains("skipped: 2"), "got: {}", stdout);
    // Embeddings are disabled, so both incidents are stored bare.
    assert!(stdout.contains("stored without embeddings: 2"), "got: {}", stdout);

    let (stdout, _, _) = run_irag(&config_path, &["ingest", &export]);
    assert!(stdout.contains("processed: 0"), "got: {}", stdout);
    assert!(stdout.contains("skipped: 4"), "got: {}", stdout);
}

#[test]
fn test_stats_after_ingest() {
    let (_tmp, config_path) = setup_test_env();
    let export = export_path(&config_path);

    run_irag(&config_path, &["init"]);
    run_irag(&config_path, &["ingest", &export]);

    let (stdout, stderr, success) = run_irag(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Incidents:   2"), "got: {}", stdout);
    assert!(stdout.contains("Embeddings:  0"), "got: {}", stdout);
}

#[test]
fn test_incidents_by_period() {
    let (_tmp, config_path) = setup_test_env();
    let export = export_path(&config_path);

    run_irag(&config_path, &["init"]);
    run_irag(&config_path, &["ingest", &export]);

    let (stdout, stderr, success) = run_irag(&config_path, &["incidents", "100 years"]);
    assert!(success, "incidents failed: {}", stderr);
    assert!(stdout.contains(": 2"), "got: {}", stdout);
    assert!(stdout.contains("INC0001"));
    assert!(stdout.contains("amy"));
}

#[test]
fn test_search_without_embeddings_has_no_results() {
    let (_tmp, config_path) = setup_test_env();

    run_irag(&config_path, &["init"]);
    let (stdout, _, success) = run_irag(&config_path, &["search", "invoice totals"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_rejects_bad_content_type() {
    let (_tmp, config_path) = setup_test_env();

    run_irag(&config_path, &["init"]);
    let (_, stderr, success) = run_irag(
        &config_path,
        &["search", "invoice", "--content-type", "summary"],
    );
    assert!(!success);
    assert!(stderr.contains("invalid content_type"));
}

#[test]
fn test_ask_with_chat_disabled_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_irag(&config_path, &["init"]);
    let (_, stderr, success) = run_irag(&config_path, &["ask", "incidents this week?"]);
    assert!(!success);
    assert!(stderr.contains("Error initializing"), "got: {}", stderr);
}

#[test]
fn test_ingest_rejects_unknown_extension() {
    let (tmp, config_path) = setup_test_env();
    let path = tmp.path().join("export.xlsx");
    fs::write(&path, "not a spreadsheet").unwrap();

    run_irag(&config_path, &["init"]);
    let (_, stderr, success) = run_irag(&config_path, &["ingest", path.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Unsupported input file"));
}
