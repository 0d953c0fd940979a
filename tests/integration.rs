use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn oracle_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("oracle");
    path
}

/// A temporary repository with a few files and an empty config.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(
        root.join("src/lib.rs"),
        "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n",
    )
    .unwrap();
    fs::write(
        root.join("README.md"),
        "# Demo\n\nA small crate used by the integration tests.\n",
    )
    .unwrap();
    fs::write(root.join("logo.png"), [0x89, b'P', b'N', b'G']).unwrap();

    let config_path = root.join("oracle.toml");
    fs::write(&config_path, "# all providers disabled\n").unwrap();

    (tmp, config_path)
}

fn run_oracle(cwd: &Path, config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = oracle_binary();
    let output = Command::new(&binary)
        .current_dir(cwd)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("ORACLE_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run oracle binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn init(root: &Path, config: &Path) {
    let (stdout, stderr, ok) = run_oracle(root, config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Initialized"));
}

#[test]
fn test_init_creates_layout() {
    let (tmp, config) = setup_test_env();
    let root = tmp.path();
    init(root, &config);

    let state = root.join(".oracle");
    assert!(state.join("staging").is_dir());
    assert!(state.join("database.db").is_file());
    assert!(state.join("vectors.db").is_file());
    assert!(state.join("repo-graph-lock.json").is_file());
    let thread = fs::read_to_string(state.join("thread")).unwrap();
    assert_eq!(thread.trim().len(), 36);
}

#[test]
fn test_init_twice_fails() {
    let (tmp, config) = setup_test_env();
    init(tmp.path(), &config);

    let (_, stderr, ok) = run_oracle(tmp.path(), &config, &["init"]);
    assert!(!ok);
    assert!(stderr.contains("already initialized"));
}

#[test]
fn test_commands_outside_project_fail() {
    let (tmp, config) = setup_test_env();
    for args in [&["status"][..], &["ls"][..], &["add", "README.md"][..]] {
        let (_, stderr, ok) = run_oracle(tmp.path(), &config, args);
        assert!(!ok, "{:?} should fail outside a project", args);
        assert!(stderr.contains("oracle init"), "stderr: {}", stderr);
    }
}

#[test]
fn test_add_status_rm() {
    let (tmp, config) = setup_test_env();
    let root = tmp.path();
    init(root, &config);

    let (stdout, _, ok) = run_oracle(root, &config, &["add", "src"]);
    assert!(ok);
    assert!(stdout.contains("Staged 1 file(s)"));
    let (_, _, ok) = run_oracle(root, &config, &["add", "README.md"]);
    assert!(ok);

    let (stdout, _, _) = run_oracle(root, &config, &["status"]);
    assert!(stdout.contains("lib.rs"));
    assert!(stdout.contains("README.md"));

    let (stdout, _, ok) = run_oracle(root, &config, &["rm", "README.md"]);
    assert!(ok);
    assert!(stdout.contains("Unstaged"));

    let (stdout, _, _) = run_oracle(root, &config, &["status"]);
    assert!(stdout.contains("lib.rs"));
    assert!(!stdout.contains("README.md"));
}

#[test]
fn test_diff_reports_new_files() {
    let (tmp, config) = setup_test_env();
    let root = tmp.path();
    init(root, &config);
    run_oracle(root, &config, &["add", "README.md"]);

    let (stdout, stderr, ok) = run_oracle(root, &config, &["diff"]);
    assert!(ok, "diff failed: {}", stderr);
    assert!(stdout.starts_with("new"));
    assert!(stdout.contains("README.md"));
}

#[test]
fn test_reset_clears_staging() {
    let (tmp, config) = setup_test_env();
    let root = tmp.path();
    init(root, &config);
    run_oracle(root, &config, &["add", "src"]);

    let (stdout, _, ok) = run_oracle(root, &config, &["reset"]);
    assert!(ok);
    assert!(stdout.contains("Cleared 1 staged file(s)"));
    let (stdout, _, _) = run_oracle(root, &config, &["status"]);
    assert!(stdout.contains("Nothing staged"));
}

#[test]
fn test_reset_hard_reinitializes() {
    let (tmp, config) = setup_test_env();
    let root = tmp.path();
    init(root, &config);
    let before = fs::read_to_string(root.join(".oracle/thread")).unwrap();

    let (_, stderr, ok) = run_oracle(root, &config, &["reset", "--hard"]);
    assert!(ok, "reset --hard failed: {}", stderr);
    let after = fs::read_to_string(root.join(".oracle/thread")).unwrap();
    assert_ne!(before, after);
    assert!(root.join(".oracle/database.db").is_file());
}

#[test]
fn test_ls_and_tree_on_fresh_project() {
    let (tmp, config) = setup_test_env();
    let root = tmp.path();
    init(root, &config);

    let (stdout, _, ok) = run_oracle(root, &config, &["ls"]);
    assert!(ok);
    assert!(stdout.contains("No documents indexed"));

    let (stdout, _, ok) = run_oracle(root, &config, &["tree"]);
    assert!(ok);
    assert!(stdout.starts_with("╙──"));
    assert!(stdout.contains("lib.rs"));
    assert!(!stdout.contains(".oracle"));
}

#[test]
fn test_commit_skips_unsupported_without_embedding() {
    let (tmp, config) = setup_test_env();
    let root = tmp.path();
    init(root, &config);
    run_oracle(root, &config, &["add", "logo.png"]);

    let (stdout, stderr, ok) = run_oracle(root, &config, &["commit"]);
    assert!(ok, "commit failed: {}", stderr);
    assert!(stdout.contains("skipped:   1"));
    assert!(stdout.contains("indexed:   0"));
}

#[test]
fn test_commit_without_embedder_keeps_staging() {
    let (tmp, config) = setup_test_env();
    let root = tmp.path();
    init(root, &config);
    run_oracle(root, &config, &["add", "README.md"]);

    let (_, stderr, ok) = run_oracle(root, &config, &["commit"]);
    assert!(!ok);
    assert!(stderr.contains("Embedding provider is not configured"));

    let (stdout, _, _) = run_oracle(root, &config, &["status"]);
    assert!(stdout.contains("README.md"));
}

#[test]
fn test_ask_requires_chat_provider() {
    let (tmp, config) = setup_test_env();
    let root = tmp.path();
    init(root, &config);

    let (_, stderr, ok) = run_oracle(root, &config, &["ask"]);
    assert!(!ok);
    assert!(stderr.contains("Chat provider is not configured"));
}

#[test]
fn test_config_writes_template_once() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("conf/oracle.toml");

    let (_, _, ok) = run_oracle(tmp.path(), &config, &["config"]);
    assert!(ok);
    assert!(fs::read_to_string(&config).unwrap().contains("[chat]"));

    let (_, stderr, ok) = run_oracle(tmp.path(), &config, &["config"]);
    assert!(!ok);
    assert!(stderr.contains("already exists"));
}
