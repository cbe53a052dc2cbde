use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Default minimum-stock constants from the reference portal. A resource at
/// or below its threshold is flagged for reorder.
pub const EQUIPMENT_LOW_STOCK_THRESHOLD: f64 = 10.0;
pub const CHEMICAL_LOW_STOCK_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementKind {
    Add,
    Distribute,
    Receive,
    Damage,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Add => "add",
            MovementKind::Distribute => "distribute",
            MovementKind::Receive => "receive",
            MovementKind::Damage => "damage",
        }
    }

    pub fn parse(s: &str) -> Option<MovementKind> {
        match s {
            "add" => Some(MovementKind::Add),
            "distribute" => Some(MovementKind::Distribute),
            "receive" => Some(MovementKind::Receive),
            "damage" => Some(MovementKind::Damage),
            _ => None,
        }
    }
}

/// One stock movement, already normalized to the common shape. The storage
/// layer maps `equipmentName`/`count` and `chemicalName`/`quantity` to this
/// before the aggregator ever sees a record.
#[derive(Debug, Clone)]
pub struct Movement {
    pub kind: MovementKind,
    pub name: String,
    pub count: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementTotals {
    pub added: f64,
    pub distributed: f64,
    pub received: f64,
    pub damaged: f64,
}

impl MovementTotals {
    /// Net stock on hand. Chemicals never record damage, so `damaged` stays
    /// 0 and the same combination applies to both resource types. Can go
    /// negative when distributions outrun recorded additions; that value is
    /// preserved as a data-integrity signal, not clamped.
    pub fn available(&self) -> f64 {
        self.added - self.distributed - self.damaged + self.received
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerError {
    pub code: String,
    pub message: String,
}

impl LedgerError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Parse a count from request params. The reference forms submit counts as
/// strings, so numeric strings are accepted; anything non-finite or negative
/// is rejected rather than coerced to 0.
pub fn parse_count(raw: &serde_json::Value) -> Result<f64, LedgerError> {
    let parsed = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(v) = parsed else {
        return Err(LedgerError::new(
            "bad_count",
            "count must be a number or numeric string",
        ));
    };
    if !v.is_finite() {
        return Err(LedgerError::new("bad_count", "count must be finite"));
    }
    if v < 0.0 {
        return Err(LedgerError::new(
            "bad_count",
            "count must not be negative",
        ));
    }
    Ok(v)
}

/// Group movements by resource name and sum counts per kind. The result is a
/// mapping, not a sequence: display ordering is applied by the classifier.
/// Duplicate records accumulate; empty input yields an empty map.
pub fn aggregate_movements<I>(movements: I) -> HashMap<String, MovementTotals>
where
    I: IntoIterator<Item = Movement>,
{
    let mut totals: HashMap<String, MovementTotals> = HashMap::new();
    for m in movements {
        let entry = totals.entry(m.name).or_default();
        match m.kind {
            MovementKind::Add => entry.added += m.count,
            MovementKind::Distribute => entry.distributed += m.count,
            MovementKind::Receive => entry.received += m.count,
            MovementKind::Damage => entry.damaged += m.count,
        }
    }
    totals
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRow {
    pub name: String,
    pub available: f64,
    pub added: f64,
    pub distributed: f64,
    pub received: f64,
    pub damaged: f64,
    pub low_stock: bool,
    pub stock_percent: f64,
}

/// Proportion-bar value: full at three times the threshold, clamped to
/// [0, 100]. Display only, never stored.
pub fn stock_percent(available: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return if available > 0.0 { 100.0 } else { 0.0 };
    }
    (available / (threshold * 3.0)).clamp(0.0, 1.0) * 100.0
}

/// Label each ledger entry against the minimum-stock threshold (inclusive:
/// `available == threshold` is low stock) and order ascending by available
/// so the most urgent resources surface first. Ties break by name so the
/// output is deterministic.
pub fn classify_stock(
    totals: HashMap<String, MovementTotals>,
    threshold: f64,
) -> Vec<StockRow> {
    let mut rows: Vec<StockRow> = totals
        .into_iter()
        .map(|(name, t)| {
            let available = t.available();
            StockRow {
                name,
                available,
                added: t.added,
                distributed: t.distributed,
                received: t.received,
                damaged: t.damaged,
                low_stock: available <= threshold,
                stock_percent: stock_percent(available, threshold),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.available
            .partial_cmp(&b.available)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}
