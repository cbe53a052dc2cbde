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
    let exe = env!("CARGO_BIN_EXE_labbookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn labbookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
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

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn create_list_delete_roundtrip_preserves_steps() {
    let workspace = temp_dir("labbook-practicals");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "practicals.create",
        json!({
            "name": "Acid-base titration",
            "description": "Determine concentration of NaOH",
            "steps": [
                { "order": 1, "text": "Rinse the burette with the acid" },
                { "order": 2, "text": "Add indicator to the flask" },
                { "order": 3, "text": "Titrate until the endpoint" }
            ]
        }),
    );
    let practical_id = created
        .get("practicalId")
        .and_then(|v| v.as_str())
        .expect("practicalId")
        .to_string();

    let listed = request_ok(&mut stdin, &mut reader, "3", "practicals.list", json!({}));
    let practicals = listed
        .get("practicals")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("practicals");
    assert_eq!(practicals.len(), 1);
    assert_eq!(
        practicals[0].get("name").and_then(|v| v.as_str()),
        Some("Acid-base titration")
    );
    assert_eq!(
        practicals[0]
            .get("steps")
            .and_then(|v| v.as_array())
            .map(Vec::len),
        Some(3)
    );
    assert_eq!(
        practicals[0].pointer("/steps/2/text").and_then(|v| v.as_str()),
        Some("Titrate until the endpoint")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "practicals.delete",
        json!({ "practicalId": practical_id }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "5", "practicals.list", json!({}));
    assert_eq!(
        listed
            .get("practicals")
            .and_then(|v| v.as_array())
            .map(Vec::len),
        Some(0)
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn create_rejects_missing_name_and_non_object_steps() {
    let workspace = temp_dir("labbook-practicals-validate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "practicals.create",
        json!({ "description": "no name" }),
    );
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "practicals.create",
        json!({ "name": "Broken", "steps": ["just a string"] }),
    );
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let _ = std::fs::remove_dir_all(workspace);
}
