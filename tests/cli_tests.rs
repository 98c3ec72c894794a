use assert_cmd::Command;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn sqldash() -> Command {
    let mut cmd = Command::cargo_bin("sqldash").unwrap();
    cmd.env_remove("SQLDASH_LOG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "sqldash failed: {:?}", output);
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn test_help_and_quit() {
    let stdout = stdout_of(sqldash().arg(":memory:").write_stdin(":help\n:quit\n"));
    assert!(stdout.contains("Welcome to sqldash! Database: :memory:."));
    assert!(stdout.contains("Available commands:"));
    assert!(stdout.contains(":insight <number | name>"));
}

#[test]
fn test_session_against_database_file() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("food.db");
    let script = [
        ":init",
        ":generate 8",
        ":read customers 1",
        ":insight 4",
        "SELECT COUNT(*) AS orders FROM orders",
        ":quit",
    ]
    .join("\n");

    let stdout = stdout_of(sqldash().arg(&db).write_stdin(script));
    assert!(stdout.contains("Created tables: "));
    assert!(stdout.contains("Inserted 40 rows: "));
    assert!(stdout.contains("rows 1-8 of 8"));
    assert!(stdout.contains("Insight 4 of 30: Total orders per month"));
    assert!(stdout.contains("| 8      |") || stdout.contains("|      8 |"));
    assert!(db.is_file());
}

#[test]
fn test_config_file_is_used() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("configured.db");
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "[database]\npath = {:?}\n\n[ui]\npage_size = 2", db.to_string_lossy()).unwrap();

    let stdout = stdout_of(
        sqldash()
            .arg("--config")
            .arg(config.path())
            .write_stdin(":create-table n v INTEGER\n:insert n {\"v\": 1}\n:insert n {\"v\": 2}\n:insert n {\"v\": 3}\n:read n\n"),
    );
    assert!(stdout.contains(&format!("Database: {}.", db.to_string_lossy())));
    assert!(stdout.contains("rows 1-2 of 3"));
}

#[test]
fn test_bad_arguments_fail() {
    let output = sqldash().arg("--bogus").output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("unknown option '--bogus'"));
}
