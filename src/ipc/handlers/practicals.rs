use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let description = req
        .params
        .get("description")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    // Steps are stored as submitted; only the overall shape is checked.
    let steps = match req.params.get("steps") {
        None => json!([]),
        Some(v) if v.is_array() => {
            for step in v.as_array().unwrap_or(&Vec::new()) {
                if !step.is_object() {
                    return err(&req.id, "bad_params", "steps must be objects", None);
                }
            }
            v.clone()
        }
        Some(_) => return err(&req.id, "bad_params", "steps must be an array", None),
    };
    let steps_json = match serde_json::to_string(&steps) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    let practical_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO practicals(id, name, description, steps_json, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&practical_id, &name, &description, &steps_json, &created_at),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "practicals" })),
        );
    }

    ok(
        &req.id,
        json!({ "practicalId": practical_id, "name": name, "createdAt": created_at }),
    )
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "practicals": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, description, steps_json, created_at
         FROM practicals
         ORDER BY created_at DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let steps_raw: String = row.get(3)?;
            let steps: serde_json::Value =
                serde_json::from_str(&steps_raw).unwrap_or_else(|_| json!([]));
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "description": row.get::<_, String>(2)?,
                "steps": steps,
                "createdAt": row.get::<_, String>(4)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(practicals) => ok(&req.id, json!({ "practicals": practicals })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let practical_id = match req.params.get("practicalId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing practicalId", None),
    };

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM practicals WHERE id = ?",
            [&practical_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "practical not found", None);
    }

    if let Err(e) = conn.execute("DELETE FROM practicals WHERE id = ?", [&practical_id]) {
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "practicals" })),
        );
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "practicals.create" => Some(handle_create(state, req)),
        "practicals.list" => Some(handle_list(state, req)),
        "practicals.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
