use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "labbook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Movement tables are append-only: nothing in the daemon updates or
    // deletes a row once written.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS equipment_movements(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            equipment_name TEXT NOT NULL,
            count REAL NOT NULL,
            lab_name TEXT,
            badge_number TEXT,
            student_reg_number TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_equipment_movements_kind ON equipment_movements(kind)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_equipment_movements_name ON equipment_movements(equipment_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS chemical_movements(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            chemical_name TEXT NOT NULL,
            quantity REAL NOT NULL,
            unit TEXT,
            lab_name TEXT,
            badge_number TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before units were tracked lack the column.
    ensure_chemical_movements_unit(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_chemical_movements_kind ON chemical_movements(kind)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_chemical_movements_name ON chemical_movements(chemical_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            reg_no TEXT NOT NULL,
            name TEXT NOT NULL,
            badge TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_badge ON students(badge)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_reg_no ON students(reg_no)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            reg_no TEXT NOT NULL,
            name TEXT NOT NULL,
            badge TEXT NOT NULL,
            lab TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            present INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_reg_no ON attendance(reg_no)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_badge_lab ON attendance(badge, lab)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable_slots(
            id TEXT PRIMARY KEY,
            badge TEXT NOT NULL,
            lab TEXT NOT NULL,
            day TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_slots_lab ON timetable_slots(lab)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_slots_badge ON timetable_slots(badge)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS practicals(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            steps_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, &text),
    )?;
    Ok(())
}

fn ensure_chemical_movements_unit(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "chemical_movements", "unit")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE chemical_movements ADD COLUMN unit TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
