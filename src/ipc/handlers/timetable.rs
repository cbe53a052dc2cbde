use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::{NaiveTime, Utc};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

const WEEKDAYS: [&str; 5] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];

fn required_str(params: &serde_json::Value, key: &str) -> Result<String, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing {}", key))
}

fn parse_slot_time(raw: &str) -> Option<String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .ok()
        .map(|t| t.format("%H:%M").to_string())
}

fn handle_add_slot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let badge = match required_str(&req.params, "badge") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let lab = match required_str(&req.params, "lab") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let day = match required_str(&req.params, "day") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if !WEEKDAYS.contains(&day.as_str()) {
        return err(
            &req.id,
            "bad_params",
            "day must be Monday through Friday",
            None,
        );
    }
    let start_raw = match required_str(&req.params, "startTime") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let end_raw = match required_str(&req.params, "endTime") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let Some(start_time) = parse_slot_time(&start_raw) else {
        return err(&req.id, "bad_params", "startTime must be HH:MM", None);
    };
    let Some(end_time) = parse_slot_time(&end_raw) else {
        return err(&req.id, "bad_params", "endTime must be HH:MM", None);
    };
    if end_time <= start_time {
        return err(
            &req.id,
            "bad_params",
            "endTime must be after startTime",
            None,
        );
    }

    let slot_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO timetable_slots(id, badge, lab, day, start_time, end_time, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &slot_id,
            &badge,
            &lab,
            &day,
            &start_time,
            &end_time,
            &created_at,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "timetable_slots" })),
        );
    }

    ok(
        &req.id,
        json!({
            "slotId": slot_id,
            "badge": badge,
            "lab": lab,
            "day": day,
            "startTime": start_time,
            "endTime": end_time
        }),
    )
}

fn list_slots(
    state: &mut AppState,
    req: &Request,
    filter_key: &str,
    column: &str,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "slots": [] }));
    };

    let value = match required_str(&req.params, filter_key) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let sql = format!(
        "SELECT id, badge, lab, day, start_time, end_time
         FROM timetable_slots
         WHERE {} = ?
         ORDER BY day, start_time",
        column
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&value], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "badge": row.get::<_, String>(1)?,
                "lab": row.get::<_, String>(2)?,
                "day": row.get::<_, String>(3)?,
                "startTime": row.get::<_, String>(4)?,
                "endTime": row.get::<_, String>(5)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(slots) => ok(&req.id, json!({ "slots": slots })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_delete_slot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let slot_id = match required_str(&req.params, "slotId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM timetable_slots WHERE id = ?",
            [&slot_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "timetable slot not found", None);
    }

    if let Err(e) = conn.execute("DELETE FROM timetable_slots WHERE id = ?", [&slot_id]) {
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "timetable_slots" })),
        );
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetable.addSlot" => Some(handle_add_slot(state, req)),
        "timetable.byLab" => Some(list_slots(state, req, "lab", "lab")),
        "timetable.byBadge" => Some(list_slots(state, req, "badge", "badge")),
        "timetable.deleteSlot" => Some(handle_delete_slot(state, req)),
        _ => None,
    }
}
