use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{
    self, Movement, MovementKind, CHEMICAL_LOW_STOCK_THRESHOLD, EQUIPMENT_LOW_STOCK_THRESHOLD,
};
use rusqlite::types::Value;
use rusqlite::Connection;
use serde_json::json;

const THRESHOLDS_KEY: &str = "stock.thresholds";

struct HandlerErr {
    code: &'static str,
    message: String,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, None)
    }
}

fn db_err(e: impl std::fmt::Display) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
    }
}

/// Read one movement table into the normalized `{kind, name, count}` shape.
/// Ingestion validates counts, but databases restored from old portal
/// backups can hold text or garbage in the count column; those rows are
/// excluded from the sums and reported, not silently zeroed.
fn read_movements(
    conn: &Connection,
    sql: &str,
) -> Result<(Vec<Movement>, i64), HandlerErr> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let raw_rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Value>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut movements = Vec::with_capacity(raw_rows.len());
    let mut skipped = 0_i64;
    for (kind_raw, name, count_raw) in raw_rows {
        let Some(kind) = MovementKind::parse(&kind_raw) else {
            skipped += 1;
            continue;
        };
        let count = match count_raw {
            Value::Real(v) => Some(v),
            Value::Integer(v) => Some(v as f64),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match count {
            Some(v) if v.is_finite() && v >= 0.0 => movements.push(Movement { kind, name, count: v }),
            _ => skipped += 1,
        }
    }
    Ok((movements, skipped))
}

fn saved_thresholds(conn: &Connection) -> (f64, f64) {
    let saved = db::settings_get_json(conn, THRESHOLDS_KEY)
        .ok()
        .flatten()
        .unwrap_or(serde_json::Value::Null);
    let equipment = saved
        .get("equipment")
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(EQUIPMENT_LOW_STOCK_THRESHOLD);
    let chemical = saved
        .get("chemical")
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(CHEMICAL_LOW_STOCK_THRESHOLD);
    (equipment, chemical)
}

fn threshold_override(params: &serde_json::Value) -> Result<Option<f64>, HandlerErr> {
    let Some(raw) = params.get("threshold") else {
        return Ok(None);
    };
    if raw.is_null() {
        return Ok(None);
    }
    let v = ledger::parse_count(raw).map_err(|e| HandlerErr {
        code: "bad_params",
        message: format!("threshold: {}", e.message),
    })?;
    if v <= 0.0 {
        return Err(HandlerErr {
            code: "bad_params",
            message: "threshold must be positive".to_string(),
        });
    }
    Ok(Some(v))
}

fn summarize(
    conn: &Connection,
    params: &serde_json::Value,
    sql: &str,
    default_threshold: f64,
) -> Result<serde_json::Value, HandlerErr> {
    let threshold = threshold_override(params)?.unwrap_or(default_threshold);
    let (movements, skipped) = read_movements(conn, sql)?;
    let totals = ledger::aggregate_movements(movements);
    let rows = ledger::classify_stock(totals, threshold);
    let low_stock_count = rows.iter().filter(|r| r.low_stock).count();
    let rows_json = serde_json::to_value(&rows).map_err(|e| HandlerErr {
        code: "serialize_failed",
        message: e.to_string(),
    })?;
    Ok(json!({
        "threshold": threshold,
        "rows": rows_json,
        "lowStockCount": low_stock_count,
        "skippedRecords": skipped
    }))
}

fn handle_equipment_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (equipment_threshold, _) = saved_thresholds(conn);
    match summarize(
        conn,
        &req.params,
        "SELECT kind, equipment_name, count FROM equipment_movements",
        equipment_threshold,
    ) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn handle_chemical_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (_, chemical_threshold) = saved_thresholds(conn);
    match summarize(
        conn,
        &req.params,
        "SELECT kind, chemical_name, quantity FROM chemical_movements",
        chemical_threshold,
    ) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn handle_thresholds_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (equipment, chemical) = saved_thresholds(conn);
    ok(
        &req.id,
        json!({ "equipment": equipment, "chemical": chemical }),
    )
}

fn handle_thresholds_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let (mut equipment, mut chemical) = saved_thresholds(conn);
    for (key, slot) in [("equipment", &mut equipment), ("chemical", &mut chemical)] {
        match req.params.get(key) {
            None => {}
            Some(raw) => {
                let Some(v) = raw.as_f64().filter(|v| v.is_finite() && *v > 0.0) else {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("{} threshold must be a positive number", key),
                        None,
                    );
                };
                *slot = v;
            }
        }
    }

    if let Err(e) = db::settings_set_json(
        conn,
        THRESHOLDS_KEY,
        &json!({ "equipment": equipment, "chemical": chemical }),
    ) {
        return err(&req.id, "db_update_failed", format!("{e:?}"), None);
    }
    ok(
        &req.id,
        json!({ "equipment": equipment, "chemical": chemical }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stock.equipmentSummary" => Some(handle_equipment_summary(state, req)),
        "stock.chemicalSummary" => Some(handle_chemical_summary(state, req)),
        "stock.thresholds" => Some(handle_thresholds_get(state, req)),
        "stock.setThresholds" => Some(handle_thresholds_set(state, req)),
        _ => None,
    }
}
