use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, None)
    }
}

fn bad_params(message: impl Into<String>) -> HandlerErr {
    HandlerErr {
        code: "bad_params",
        message: message.into(),
    }
}

fn db_err(e: impl std::fmt::Display) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_params(format!("missing {}", key)))
}

fn parse_date(params: &serde_json::Value) -> Result<String, HandlerErr> {
    match params.get("date").and_then(|v| v.as_str()) {
        None => Ok(Local::now().date_naive().format("%Y-%m-%d").to_string()),
        Some(raw) => {
            let t = raw.trim();
            NaiveDate::parse_from_str(t, "%Y-%m-%d")
                .map(|d| d.format("%Y-%m-%d").to_string())
                .map_err(|_| bad_params("date must be YYYY-MM-DD"))
        }
    }
}

#[derive(Debug, Clone)]
struct RosterStudent {
    reg_no: String,
    name: String,
}

fn roster_for_badge(conn: &Connection, badge: &str) -> Result<Vec<RosterStudent>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT reg_no, name FROM students WHERE badge = ? ORDER BY reg_no")
        .map_err(db_err)?;
    stmt.query_map([badge], |r| {
        Ok(RosterStudent {
            reg_no: r.get(0)?,
            name: r.get(1)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

fn attendance_mark(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let badge = get_required_str(params, "badge")?;
    let lab = get_required_str(params, "lab")?;
    let date = parse_date(params)?;
    let Some(present_json) = params.get("presentRegNos").and_then(|v| v.as_array()) else {
        return Err(bad_params("missing presentRegNos"));
    };
    let present: HashSet<String> = present_json
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
        .collect();

    let roster = roster_for_badge(conn, &badge)?;
    if roster.is_empty() {
        return Err(HandlerErr {
            code: "not_found",
            message: format!("no students registered for badge {}", badge),
        });
    }

    let time = Local::now().format("%H:%M:%S").to_string();
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
    })?;

    let mut present_count = 0_i64;
    let mut absent_count = 0_i64;
    for s in &roster {
        let is_present = present.contains(&s.reg_no);
        if is_present {
            present_count += 1;
        } else {
            absent_count += 1;
        }
        let row_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO attendance(id, reg_no, name, badge, lab, date, time, present)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &row_id,
                &s.reg_no,
                &s.name,
                &badge,
                &lab,
                &date,
                &time,
                is_present as i64,
            ),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
        })?;
    }

    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
    })?;

    Ok(json!({
        "date": date,
        "marked": roster.len(),
        "presentCount": present_count,
        "absentCount": absent_count
    }))
}

fn records_to_json(
    conn: &Connection,
    sql: &str,
    bind: Vec<String>,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    stmt.query_map(rusqlite::params_from_iter(bind), |row| {
        Ok(json!({
            "id": row.get::<_, String>(0)?,
            "regNo": row.get::<_, String>(1)?,
            "name": row.get::<_, String>(2)?,
            "badge": row.get::<_, String>(3)?,
            "lab": row.get::<_, String>(4)?,
            "date": row.get::<_, String>(5)?,
            "time": row.get::<_, String>(6)?,
            "present": row.get::<_, i64>(7)? != 0
        }))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

fn summary_stats(records: &[serde_json::Value]) -> serde_json::Value {
    let total = records.len() as i64;
    let present = records
        .iter()
        .filter(|r| r.get("present").and_then(|v| v.as_bool()).unwrap_or(false))
        .count() as i64;
    let absent = total - present;
    // Same rounding the portal's attendance page applied.
    let percentage = if total > 0 {
        ((100.0 * present as f64 / total as f64) + 0.5).floor() as i64
    } else {
        0
    };
    json!({
        "total": total,
        "present": present,
        "absent": absent,
        "percentage": percentage
    })
}

fn attendance_student_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let reg_no = get_required_str(params, "regNo")?;
    let records = records_to_json(
        conn,
        "SELECT id, reg_no, name, badge, lab, date, time, present
         FROM attendance
         WHERE reg_no = ?
         ORDER BY date DESC, time DESC",
        vec![reg_no],
    )?;
    let stats = summary_stats(&records);
    Ok(json!({ "records": records, "stats": stats }))
}

fn attendance_badge_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let badge = get_required_str(params, "badge")?;
    let lab = get_required_str(params, "lab")?;
    let records = records_to_json(
        conn,
        "SELECT id, reg_no, name, badge, lab, date, time, present
         FROM attendance
         WHERE badge = ? AND lab = ?
         ORDER BY date DESC, time DESC, reg_no",
        vec![badge, lab],
    )?;
    let stats = summary_stats(&records);
    Ok(json!({ "records": records, "stats": stats }))
}

fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl Fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(with_conn(state, req, attendance_mark)),
        "attendance.studentSummary" => Some(with_conn(state, req, attendance_student_summary)),
        "attendance.badgeSummary" => Some(with_conn(state, req, attendance_badge_summary)),
        _ => None,
    }
}
