use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn docgpt_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docgpt"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(docs_dir.join("empty.txt"), "").unwrap();
    fs::write(
        docs_dir.join("notes.md"),
        "# Notes\nThe quarterly report covers revenue.\nHeadcount is flat.",
    )
    .unwrap();
    fs::write(docs_dir.join("tool.exe"), b"MZ\x90\x00").unwrap();

    let config_content = format!(
        r#"[cache]
root = "{}/.cache"

[chunking]
separator = "\n"
chunk_size = 600
chunk_overlap = 100

[embedding]
provider = "disabled"

[chat]
echo_delay_ms = 0
"#,
        root.display()
    );

    let config_path = config_dir.join("docgpt.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docgpt(config_path: &Path, args: &[&str], stdin: &str) -> (String, String, bool) {
    run_docgpt_without_env(config_path, args, stdin, &[])
}

fn run_docgpt_without_env(
    config_path: &Path,
    args: &[&str],
    stdin: &str,
    unset: &[&str],
) -> (String, String, bool) {
    let binary = docgpt_binary();
    let mut command = Command::new(&binary);
    for var in unset {
        command.env_remove(var);
    }
    let mut child = command
        .arg("--config")
        .arg(config_path)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("Failed to run docgpt binary at {:?}: {}", binary, e));

    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn doc(config_path: &Path, name: &str) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("docs")
        .join(name)
        .display()
        .to_string()
}

#[test]
fn test_echo_replies_with_user_text() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_docgpt(&config_path, &["echo"], "What is this?\n");

    assert!(success, "echo failed: {}", stderr);
    assert_eq!(stdout, "human: What is this?\nai: You said: What is this?\n");
}

#[test]
fn test_echo_ignores_blank_lines() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_docgpt(&config_path, &["echo"], "\n   \nhi\n");

    assert!(success);
    assert_eq!(stdout, "human: hi\nai: You said: hi\n");
}

#[test]
fn test_chat_without_file_rejects_input() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_docgpt(&config_path, &["chat"], "hello?\n/quit\n");

    assert!(success, "chat loop must survive a rejected turn: {}", stderr);
    assert!(stdout.is_empty(), "nothing should be rendered: {}", stdout);
    assert!(stderr.contains("error: no file selected"), "stderr: {}", stderr);
}

#[test]
fn test_chat_with_file_greets_and_replies() {
    let (_tmp, config_path) = setup_test_env();
    let empty = doc(&config_path, "empty.txt");
    let (stdout, stderr, success) = run_docgpt(
        &config_path,
        &["chat", "--file", &empty],
        "What is this?\n/close\nstill there?\n",
    );

    assert!(success, "chat failed: {}", stderr);
    assert_eq!(
        stdout,
        "ai: I'm ready! Ask away!\nhuman: What is this?\nai: ㅋㅋㅋ\n"
    );
    assert!(stderr.contains("no file selected"), "stderr: {}", stderr);
}

#[test]
fn test_chat_open_command_selects_file() {
    let (_tmp, config_path) = setup_test_env();
    let script = format!("/open {}\nhi\n/history\n", doc(&config_path, "empty.txt"));
    let (stdout, stderr, success) = run_docgpt(&config_path, &["chat"], &script);

    assert!(success, "chat failed: {}", stderr);
    assert_eq!(
        stdout,
        "ai: I'm ready! Ask away!\nhuman: hi\nai: ㅋㅋㅋ\nhuman: hi\nai: ㅋㅋㅋ\n"
    );
}

#[test]
fn test_ingest_empty_file() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) =
        run_docgpt(&config_path, &["ingest", &doc(&config_path, "empty.txt")], "");

    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("chunks:     0"), "stdout: {}", stdout);
    assert!(stdout.trim_end().ends_with("ok"));
    assert!(tmp.path().join(".cache/files/empty.txt").exists());
}

#[test]
fn test_ingest_unsupported_type_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) =
        run_docgpt(&config_path, &["ingest", &doc(&config_path, "tool.exe")], "");

    assert!(!success);
    assert!(stderr.contains("unsupported file type"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_with_disabled_provider_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) =
        run_docgpt(&config_path, &["ingest", &doc(&config_path, "notes.md")], "");

    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_docgpt(
        &config_path,
        &["search", &doc(&config_path, "notes.md"), "  "],
        "",
    );

    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(
        &config_path,
        "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
    )
    .unwrap();
    let (_, stderr, success) = run_docgpt(&config_path, &["echo"], "");

    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (stdout, stderr, success) = run_docgpt(&missing, &["echo"], "");

    assert!(success, "echo failed: {}", stderr);
    assert!(stdout.is_empty());
}

#[test]
fn test_chat_without_openai_key_fails_only_the_ingest_turn() {
    let (tmp, config_path) = setup_test_env();
    // No [embedding] section: the default OpenAI provider.
    fs::write(
        &config_path,
        format!("[cache]\nroot = \"{}/.cache\"\n", tmp.path().display()),
    )
    .unwrap();
    let script = format!(
        "/open {}\n/open {}\nhi\n/quit\n",
        doc(&config_path, "notes.md"),
        doc(&config_path, "empty.txt")
    );

    let (stdout, stderr, success) =
        run_docgpt_without_env(&config_path, &["chat"], &script, &["OPENAI_API_KEY"]);

    assert!(success, "chat must start without a key: {}", stderr);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr: {}", stderr);
    assert_eq!(stdout, "ai: I'm ready! Ask away!\nhuman: hi\nai: ㅋㅋㅋ\n");
}

#[test]
fn test_chat_rejects_malformed_commands() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) =
        run_docgpt(&config_path, &["echo"], "/close now\n/open\nhi\n");

    assert!(success, "echo failed: {}", stderr);
    assert!(stderr.contains("usage: /close"), "stderr: {}", stderr);
    assert!(stderr.contains("usage: /open <path>"), "stderr: {}", stderr);
    assert_eq!(stdout, "human: hi\nai: You said: hi\n");
}
