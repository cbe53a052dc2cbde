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
fn slots_are_searchable_by_lab_and_badge() {
    let workspace = temp_dir("labbook-timetable-search");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "timetable.addSlot",
        json!({
            "badge": "B1",
            "lab": "Chem Lab 1",
            "day": "Monday",
            "startTime": "09:00",
            "endTime": "11:00"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.addSlot",
        json!({
            "badge": "B2",
            "lab": "Chem Lab 1",
            "day": "Tuesday",
            "startTime": "14:00",
            "endTime": "16:00"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.addSlot",
        json!({
            "badge": "B1",
            "lab": "Physics Lab",
            "day": "Friday",
            "startTime": "10:00",
            "endTime": "12:00"
        }),
    );

    let by_lab = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.byLab",
        json!({ "lab": "Chem Lab 1" }),
    );
    assert_eq!(
        by_lab.get("slots").and_then(|v| v.as_array()).map(Vec::len),
        Some(2)
    );

    let by_badge = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "timetable.byBadge",
        json!({ "badge": "B1" }),
    );
    let slots = by_badge
        .get("slots")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("slots");
    assert_eq!(slots.len(), 2);
    let labs: Vec<&str> = slots
        .iter()
        .filter_map(|s| s.get("lab").and_then(|v| v.as_str()))
        .collect();
    assert!(labs.contains(&"Chem Lab 1"));
    assert!(labs.contains(&"Physics Lab"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn add_slot_rejects_bad_day_and_inverted_times() {
    let workspace = temp_dir("labbook-timetable-validate");
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
        "timetable.addSlot",
        json!({
            "badge": "B1",
            "lab": "Chem Lab 1",
            "day": "Sunday",
            "startTime": "09:00",
            "endTime": "11:00"
        }),
    );
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.addSlot",
        json!({
            "badge": "B1",
            "lab": "Chem Lab 1",
            "day": "Monday",
            "startTime": "11:00",
            "endTime": "09:00"
        }),
    );
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.addSlot",
        json!({
            "badge": "B1",
            "lab": "Chem Lab 1",
            "day": "Monday",
            "startTime": "9 am",
            "endTime": "11:00"
        }),
    );
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn delete_slot_removes_it_from_searches() {
    let workspace = temp_dir("labbook-timetable-delete");
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
        "timetable.addSlot",
        json!({
            "badge": "B4",
            "lab": "Bio Lab",
            "day": "Wednesday",
            "startTime": "13:00",
            "endTime": "15:00"
        }),
    );
    let slot_id = created
        .get("slotId")
        .and_then(|v| v.as_str())
        .expect("slotId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.deleteSlot",
        json!({ "slotId": slot_id }),
    );

    let by_badge = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.byBadge",
        json!({ "badge": "B4" }),
    );
    assert_eq!(
        by_badge.get("slots").and_then(|v| v.as_array()).map(Vec::len),
        Some(0)
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.deleteSlot",
        json!({ "slotId": "does-not-exist" }),
    );
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_found")
    );

    let _ = std::fs::remove_dir_all(workspace);
}
