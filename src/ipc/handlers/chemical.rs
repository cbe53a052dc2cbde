use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, MovementKind};
use chrono::Utc;
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

fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn record_movement(
    state: &mut AppState,
    req: &Request,
    kind: MovementKind,
    needs_badge: bool,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match required_str(&req.params, "chemicalName") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    // Chemical forms call the field "quantity"; normalize here, at the edge.
    let quantity = match req.params.get("quantity") {
        Some(raw) => match ledger::parse_count(raw) {
            Ok(v) => v,
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    e.message,
                    Some(json!({ "field": "quantity", "reason": e.code })),
                )
            }
        },
        None => return err(&req.id, "bad_params", "missing quantity", None),
    };
    let lab_name = match required_str(&req.params, "labName") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let unit = optional_str(&req.params, "unit").unwrap_or_else(|| "ml".to_string());
    let badge_number = if needs_badge {
        match required_str(&req.params, "badgeNumber") {
            Ok(v) => Some(v),
            Err(m) => return err(&req.id, "bad_params", m, None),
        }
    } else {
        optional_str(&req.params, "badgeNumber")
    };

    let movement_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO chemical_movements(
            id, kind, chemical_name, quantity, unit, lab_name, badge_number, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &movement_id,
            kind.as_str(),
            &name,
            quantity,
            &unit,
            &lab_name,
            &badge_number,
            &created_at,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "chemical_movements" })),
        );
    }

    ok(
        &req.id,
        json!({
            "movementId": movement_id,
            "kind": kind.as_str(),
            "chemicalName": name,
            "quantity": quantity,
            "unit": unit,
            "createdAt": created_at
        }),
    )
}

fn handle_movements_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "movements": [] }));
    };

    let kind_filter = match req.params.get("kind").and_then(|v| v.as_str()) {
        None => None,
        Some(s) => match MovementKind::parse(s) {
            Some(MovementKind::Damage) | None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown movement kind: {}", s),
                    None,
                )
            }
            Some(k) => Some(k),
        },
    };

    let (sql, bind): (&str, Vec<String>) = match kind_filter {
        Some(k) => (
            "SELECT id, kind, chemical_name, quantity, unit, lab_name, badge_number, created_at
             FROM chemical_movements
             WHERE kind = ?
             ORDER BY created_at DESC",
            vec![k.as_str().to_string()],
        ),
        None => (
            "SELECT id, kind, chemical_name, quantity, unit, lab_name, badge_number, created_at
             FROM chemical_movements
             ORDER BY created_at DESC",
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
                "kind": row.get::<_, String>(1)?,
                "chemicalName": row.get::<_, String>(2)?,
                "quantity": row.get::<_, f64>(3)?,
                "unit": row.get::<_, Option<String>>(4)?,
                "labName": row.get::<_, Option<String>>(5)?,
                "badgeNumber": row.get::<_, Option<String>>(6)?,
                "createdAt": row.get::<_, String>(7)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(movements) => ok(&req.id, json!({ "movements": movements })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "chemical.add" => Some(record_movement(state, req, MovementKind::Add, false)),
        "chemical.distribute" => Some(record_movement(state, req, MovementKind::Distribute, true)),
        "chemical.receive" => Some(record_movement(state, req, MovementKind::Receive, true)),
        "chemical.movements" => Some(handle_movements_list(state, req)),
        _ => None,
    }
}
