//! Database schema and migrations.

use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS test_configurations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            test_type TEXT NOT NULL,
            remote_test_id TEXT,
            payload_json TEXT NOT NULL,
            created_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS environments (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            ip_address TEXT NOT NULL,
            port INTEGER NOT NULL,
            username TEXT NOT NULL,
            password TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            attributes_json TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS devices (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            device_type TEXT NOT NULL,
            ip_address TEXT,
            credentials_json TEXT,
            attributes_json TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS test_runs (
            id INTEGER PRIMARY KEY,
            test_config_id INTEGER NOT NULL REFERENCES test_configurations(id),
            environment_id INTEGER NOT NULL REFERENCES environments(id),
            device_id INTEGER NOT NULL REFERENCES devices(id),
            remote_test_id TEXT NOT NULL,
            remote_run_id TEXT NOT NULL,
            status TEXT NOT NULL
                CHECK (status IN ('pending', 'running', 'completed', 'failed', 'stopped')),
            start_time TEXT,
            end_time TEXT,
            duration INTEGER,
            failure_reason TEXT,
            created_by TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS test_results (
            id INTEGER PRIMARY KEY,
            test_run_id INTEGER NOT NULL UNIQUE REFERENCES test_runs(id),
            result_json TEXT NOT NULL,
            summary_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reports (
            id INTEGER PRIMARY KEY,
            test_run_id INTEGER NOT NULL REFERENCES test_runs(id),
            name TEXT NOT NULL,
            description TEXT,
            report_type TEXT NOT NULL,
            file_format TEXT NOT NULL,
            file_path TEXT NOT NULL,
            created_by TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS media (
            id INTEGER PRIMARY KEY,
            test_run_id INTEGER NOT NULL REFERENCES test_runs(id),
            name TEXT NOT NULL,
            description TEXT,
            media_type TEXT NOT NULL,
            content_type TEXT NOT NULL,
            file_path TEXT NOT NULL,
            created_by TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_test_runs_status ON test_runs(status);
        CREATE INDEX IF NOT EXISTS idx_test_runs_config ON test_runs(test_config_id);
        CREATE INDEX IF NOT EXISTS idx_reports_run ON reports(test_run_id);
        CREATE INDEX IF NOT EXISTS idx_media_run ON media(test_run_id);",
    )?;

    // Migration: Add 'remote_target' to test_configurations if missing
    let has_target: i32 = conn
        .query_row(
            "SELECT count(*) FROM pragma_table_info('test_configurations') WHERE name='remote_target'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if has_target == 0 {
        conn.execute(
            "ALTER TABLE test_configurations ADD COLUMN remote_target TEXT",
            [],
        )?;
    }

    Ok(())
}
