use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn required_str(params: &serde_json::Value, key: &str) -> Result<String, String> {
    let v = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if v.is_empty() {
        return Err(format!("missing {}", key));
    }
    Ok(v)
}

fn handle_students_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let reg_no = match required_str(&req.params, "regNo") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let badge = match required_str(&req.params, "badge") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let student_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, reg_no, name, badge, created_at) VALUES(?, ?, ?, ?, ?)",
        (&student_id, &reg_no, &name, &badge, &created_at),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(
        &req.id,
        json!({ "studentId": student_id, "regNo": reg_no, "name": name, "badge": badge }),
    )
}

fn handle_students_bulk_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(entries) = req.params.get("students").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing students", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let mut inserted = 0_i64;
    let mut rejected = 0_i64;
    let created_at = Utc::now().to_rfc3339();
    for entry in entries {
        let reg_no = entry
            .get("regNo")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        let name = entry
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        let badge = entry
            .get("badge")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        if reg_no.is_empty() || name.is_empty() || badge.is_empty() {
            rejected += 1;
            continue;
        }
        let student_id = Uuid::new_v4().to_string();
        if let Err(e) = tx.execute(
            "INSERT INTO students(id, reg_no, name, badge, created_at) VALUES(?, ?, ?, ?, ?)",
            (&student_id, reg_no, name, badge, &created_at),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            );
        }
        inserted += 1;
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "inserted": inserted, "rejected": rejected }),
    )
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let badge = req
        .params
        .get("badge")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let (sql, bind): (&str, Vec<String>) = match &badge {
        Some(b) => (
            "SELECT id, reg_no, name, badge FROM students WHERE badge = ? ORDER BY reg_no",
            vec![b.clone()],
        ),
        None => (
            "SELECT id, reg_no, name, badge FROM students ORDER BY badge, reg_no",
            Vec::new(),
        ),
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(rusqlite::params_from_iter(bind), |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "regNo": row.get::<_, String>(1)?,
                "name": row.get::<_, String>(2)?,
                "badge": row.get::<_, String>(3)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    if let Err(e) = conn.execute("DELETE FROM students WHERE id = ?", [&student_id]) {
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.add" => Some(handle_students_add(state, req)),
        "students.bulkAdd" => Some(handle_students_bulk_add(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
