use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::process::{Command, Stdio};
use tempfile::TempDir;
use watchbridge::PublishedAddress;

fn watchbridge() -> Command {
    Command::new(env!("CARGO_BIN_EXE_watchbridge"))
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let output = watchbridge()
        .arg("init")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");

    assert!(output.status.success());

    let config_path = temp_path.join(".watchbridge/settings.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[server]"));
    assert!(content.contains("[publish]"));

    // A second init refuses to overwrite
    let again = watchbridge()
        .arg("init")
        .current_dir(temp_path)
        .output()
        .unwrap();
    assert!(!again.status.success());
    let stderr = String::from_utf8(again.stderr).unwrap();
    assert!(stderr.contains("already exists"));

    let forced = watchbridge()
        .args(["init", "--force"])
        .current_dir(temp_path)
        .output()
        .unwrap();
    assert!(forced.status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let config_dir = temp_path.join(".watchbridge");
    std::fs::create_dir_all(&config_dir).unwrap();

    let config_content = r#"
version = 2
[server]
max_sessions = 7
"#;

    std::fs::write(config_dir.join("settings.toml"), config_content).unwrap();

    let output = watchbridge()
        .arg("config")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run config command");

    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version = 2"));
    assert!(stdout.contains("max_sessions = 7"));
    assert!(stdout.contains("settings.toml"));
    assert!(!stdout.contains("not found"));
}

#[test]
fn test_config_flag_points_at_custom_file() {
    let temp_dir = TempDir::new().unwrap();
    let custom = temp_dir.path().join("custom.toml");
    std::fs::write(&custom, "[publish]\nplugin = \"tsserver-watcher\"\n").unwrap();

    let output = watchbridge()
        .args(["config", "--config"])
        .arg(&custom)
        .current_dir(temp_dir.path())
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("plugin = \"tsserver-watcher\""));
    assert!(stdout.contains(&format!("# Settings file: {}", custom.display())));
}

#[test]
fn test_serve_publishes_reachable_address() {
    let temp_dir = TempDir::new().unwrap();

    let mut child = watchbridge()
        .args(["serve", "--publish", "stdout", "--plugin", "test-plugin"])
        .current_dir(temp_dir.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start serve");

    let stdout = child.stdout.take().unwrap();
    let mut line = String::new();
    BufReader::new(stdout).read_line(&mut line).unwrap();

    let published: Result<PublishedAddress, _> = serde_json::from_str(line.trim());
    let connected = published
        .as_ref()
        .ok()
        .map(|address| TcpStream::connect((address.address.as_str(), address.port)).is_ok());

    child.kill().unwrap();
    child.wait().unwrap();

    let published = published.unwrap();
    assert_eq!(published.plugin, "test-plugin");
    assert_eq!(published.address, "127.0.0.1");
    assert_eq!(published.family, "IPv4");
    assert_ne!(published.port, 0);
    assert_eq!(connected, Some(true));
}
