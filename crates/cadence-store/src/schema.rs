//! Database schema management.

use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS triggers (
    trigger_id INTEGER PRIMARY KEY AUTOINCREMENT,
    trigger_source TEXT NOT NULL,
    modify_time INTEGER NOT NULL,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_triggers_modify_time ON triggers(modify_time);
CREATE INDEX IF NOT EXISTS idx_triggers_source ON triggers(trigger_source);
"#;
