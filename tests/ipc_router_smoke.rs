use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_studentd");
    let mut child = Command::new(exe)
        .env_remove("STUDENTD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn studentd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("studentd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert_eq!(health["result"]["workspacePath"], json!(null));

    let early = request(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(error_code(&early), Some("no_workspace"));

    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "roll": "S1", "name": "Smoke Student" }),
    );
    let _ = request(&mut stdin, &mut reader, "5", "students.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "students.get",
        json!({ "roll": "S1" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "marks.set",
        json!({ "roll": "S1", "marks": { "Math": 70 } }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "marks.update",
        json!({ "roll": "S1", "subject": "Sci", "marks": 65 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.mark",
        json!({ "roll": "S1", "status": "P" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.list",
        json!({ "roll": "S1" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.semester",
        json!({ "roll": "S1" }),
    );
    let _ = request(&mut stdin, &mut reader, "12", "attendance.undo", json!({}));

    let payload = json!({ "id": "13", "method": "grades.frobnicate", "params": {} });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let unknown = read_response(&mut reader);
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    writeln!(stdin, "this is not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let bad = read_response(&mut reader);
    assert_eq!(error_code(&bad), Some("bad_json"));

    let after = request(&mut stdin, &mut reader, "14", "health", json!({}));
    assert_eq!(after["ok"], json!(true));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn workspace_env_var_opens_database_at_startup() {
    let workspace = temp_dir("studentd-env-workspace");
    let exe = env!("CARGO_BIN_EXE_studentd");
    let mut child = Command::new(exe)
        .env("STUDENTD_WORKSPACE", &workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn studentd");
    let mut stdin = child.stdin.take().expect("child stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("child stdout"));

    let listed = request(&mut stdin, &mut reader, "1", "students.list", json!({}));
    assert_eq!(listed["ok"], json!(true), "{}", listed);
    assert!(workspace.join("studentd.sqlite3").is_file());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
