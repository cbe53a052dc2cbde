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

fn add_equipment(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    count: i64,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "equipment.add",
        json!({ "equipmentName": name, "count": count, "labName": "Chem Lab 1" }),
    );
}

#[test]
fn threshold_boundary_is_inclusive_and_rows_sort_by_urgency() {
    let workspace = temp_dir("labbook-threshold-boundary");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    add_equipment(&mut stdin, &mut reader, "2", "Burette", 50);
    add_equipment(&mut stdin, &mut reader, "3", "Pipette", 5);
    add_equipment(&mut stdin, &mut reader, "4", "Funnel", 20);
    add_equipment(&mut stdin, &mut reader, "5", "AtThreshold", 10);
    add_equipment(&mut stdin, &mut reader, "6", "JustAbove", 11);

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "stock.equipmentSummary",
        json!({}),
    );
    let rows = summary
        .get("rows")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("rows");

    let availables: Vec<f64> = rows
        .iter()
        .map(|r| r.get("available").and_then(|v| v.as_f64()).expect("available"))
        .collect();
    assert_eq!(availables, vec![5.0, 10.0, 11.0, 20.0, 50.0]);

    let by_name = |name: &str| {
        rows.iter()
            .find(|r| r.get("name").and_then(|v| v.as_str()) == Some(name))
            .cloned()
            .expect("row")
    };
    assert_eq!(
        by_name("AtThreshold").get("lowStock").and_then(|v| v.as_bool()),
        Some(true)
    );
    assert_eq!(
        by_name("JustAbove").get("lowStock").and_then(|v| v.as_bool()),
        Some(false)
    );
    assert_eq!(
        by_name("Pipette").get("lowStock").and_then(|v| v.as_bool()),
        Some(true)
    );
    assert_eq!(summary.pointer("/lowStockCount").and_then(|v| v.as_i64()), Some(2));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn per_query_threshold_override_and_persisted_settings() {
    let workspace = temp_dir("labbook-threshold-settings");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    add_equipment(&mut stdin, &mut reader, "2", "Beaker", 20);

    // Defaults first.
    let thresholds = request_ok(&mut stdin, &mut reader, "3", "stock.thresholds", json!({}));
    assert_eq!(
        thresholds.get("equipment").and_then(|v| v.as_f64()),
        Some(10.0)
    );
    assert_eq!(
        thresholds.get("chemical").and_then(|v| v.as_f64()),
        Some(50.0)
    );

    // One-off override flips the classification.
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "stock.equipmentSummary",
        json!({ "threshold": 25 }),
    );
    assert_eq!(
        summary.pointer("/rows/0/lowStock").and_then(|v| v.as_bool()),
        Some(true)
    );

    // Persisted setting applies without the override.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "stock.setThresholds",
        json!({ "equipment": 30 }),
    );
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "stock.equipmentSummary",
        json!({}),
    );
    assert_eq!(
        summary.get("threshold").and_then(|v| v.as_f64()),
        Some(30.0)
    );
    assert_eq!(
        summary.pointer("/rows/0/lowStock").and_then(|v| v.as_bool()),
        Some(true)
    );

    // Chemical default untouched by the equipment update.
    let thresholds = request_ok(&mut stdin, &mut reader, "7", "stock.thresholds", json!({}));
    assert_eq!(
        thresholds.get("chemical").and_then(|v| v.as_f64()),
        Some(50.0)
    );

    let bad = request(
        &mut stdin,
        &mut reader,
        "8",
        "stock.setThresholds",
        json!({ "equipment": -4 }),
    );
    assert_eq!(
        bad.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn negative_available_is_preserved_not_clamped() {
    let workspace = temp_dir("labbook-threshold-negative");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    add_equipment(&mut stdin, &mut reader, "2", "Crucible", 3);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "equipment.distribute",
        json!({
            "badgeNumber": "B2",
            "equipmentName": "Crucible",
            "count": 8,
            "labName": "Chem Lab 1"
        }),
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "stock.equipmentSummary",
        json!({}),
    );
    let row = summary.pointer("/rows/0").cloned().expect("row");
    assert_eq!(row.get("available").and_then(|v| v.as_f64()), Some(-5.0));
    assert_eq!(row.get("lowStock").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(row.get("stockPercent").and_then(|v| v.as_f64()), Some(0.0));

    let _ = std::fs::remove_dir_all(workspace);
}
