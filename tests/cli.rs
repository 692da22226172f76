use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn replydesk_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_replydesk"))
}

const CORPUS: &str = "\
Dear User,
Your payment is delayed by the bank and will settle in 3 working days.
Thanks,
Qoneqt Support Team
**********
Dear User,
Your refund has been issued to the original payment method.
Thanks,
Qoneqt Support Team
***************
ok
**********
Dear User,
----------
Thanks,
Qoneqt Support Team
";

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(data_dir.join("emails.txt"), CORPUS).unwrap();

    // No network: both backends disabled.
    let config_content = format!(
        r#"[paths]
corpus = "{root}/data/emails.txt"
knowledge_base = "{root}/data/knowledge_base.json"
index = "{root}/data/index.sqlite"

[embedding]
provider = "disabled"

[generation]
provider = "disabled"

[eligibility]
blocked_senders = ["no-reply", "mailer-daemon"]
blocked_subject_keywords = ["newsletter", "unsubscribe"]
auto_submitted_values = ["auto-replied", "auto-generated"]
"#,
        root = root.display()
    );

    let config_path = config_dir.join("replydesk.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_replydesk(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = replydesk_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run replydesk binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_prepare_writes_knowledge_base() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_replydesk(&config_path, &["prepare"]);
    assert!(success, "prepare failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("templates: 3"), "stdout={}", stdout);
    assert!(stdout.contains("templates with empty topic: 1"));

    let kb_path = tmp.path().join("data/knowledge_base.json");
    let kb: serde_json::Value = serde_json::from_str(&fs::read_to_string(kb_path).unwrap()).unwrap();
    let records = kb.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records[0]["topic"],
        "Your payment is delayed by the bank and will settle in 3 working days."
    );
    assert!(records[0]["reply"]
        .as_str()
        .unwrap()
        .starts_with("Dear User,\nYour payment"));
}

#[test]
fn test_prepare_is_deterministic() {
    let (tmp, config_path) = setup_test_env();
    let kb_path = tmp.path().join("data/knowledge_base.json");

    run_replydesk(&config_path, &["prepare"]);
    let first = fs::read_to_string(&kb_path).unwrap();
    run_replydesk(&config_path, &["prepare"]);
    let second = fs::read_to_string(&kb_path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_prepare_missing_corpus_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("nope.txt");

    let (_, stderr, success) =
        run_replydesk(&config_path, &["prepare", "--input", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr={}", stderr);
}

#[test]
fn test_check_eligible_sender() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) =
        run_replydesk(&config_path, &["check", "alice@example.com", "Payment failed"]);
    assert!(success);
    assert_eq!(stdout.trim(), "eligible");
}

#[test]
fn test_check_blocked_sender() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) =
        run_replydesk(&config_path, &["check", "No-Reply@bank.example", "Statement"]);
    assert!(success);
    assert!(stdout.starts_with("ineligible"));
    assert!(stdout.contains("no-reply"));
}

#[test]
fn test_check_auto_submitted() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, _) = run_replydesk(
        &config_path,
        &[
            "check",
            "alice@example.com",
            "Out of office",
            "--auto-submitted",
            "auto-replied",
        ],
    );
    assert!(stdout.starts_with("ineligible"));
}

#[test]
fn test_index_info_without_index() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_replydesk(&config_path, &["index", "info"]);
    assert!(success);
    assert!(stdout.contains("no index"));
}

#[test]
fn test_index_build_errors_when_disabled() {
    let (_tmp, config_path) = setup_test_env();
    run_replydesk(&config_path, &["prepare"]);
    let (_, stderr, success) = run_replydesk(&config_path, &["index", "build"]);
    assert!(!success);
    assert!(stderr.contains("disabled"));
}

#[test]
fn test_draft_prints_placeholder_when_generation_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_replydesk(&config_path, &["draft", "My payment failed"]);
    assert!(success, "draft failed: stderr={}", stderr);
    assert!(stdout.contains("context templates: 0"));
    assert!(stdout.contains("Error generating reply."));
    assert!(stderr.contains("generation failed"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[retrieval]\ntop_k = 0\n").unwrap();

    let (_, stderr, success) = run_replydesk(&bad, &["check", "a@b.c", "hi"]);
    assert!(!success);
    assert!(stderr.contains("top_k"));
}

#[test]
fn test_search_without_index_leaves_no_database_behind() {
    let (tmp, config_path) = setup_test_env();
    let index_path = tmp.path().join("data/index.sqlite");

    let (_, stderr, success) = run_replydesk(&config_path, &["search", "payment"]);
    assert!(!success);
    assert!(stderr.contains("index build"), "stderr={}", stderr);
    assert!(!index_path.exists());

    let (stdout, _, success) = run_replydesk(&config_path, &["index", "info"]);
    assert!(success);
    assert!(stdout.contains("no index"), "stdout={}", stdout);
}
