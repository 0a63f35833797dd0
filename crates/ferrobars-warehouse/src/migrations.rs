use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

// The ohlcv column set is fixed to the stored EMA windows (8, 21, 50).
// Storing another window means adding a migration here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_ohlcv",
        sql: r#"
CREATE TABLE IF NOT EXISTS ohlcv (
    "timestamp" TIMESTAMP NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume BIGINT NOT NULL,
    symbol TEXT NOT NULL,
    ema8 DOUBLE,
    ema21 DOUBLE,
    ema50 DOUBLE
);
"#,
    },
    Migration {
        version: "0002_ingest_log",
        sql: r#"
CREATE TABLE IF NOT EXISTS ingest_log (
    run_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    status TEXT NOT NULL,
    rows BIGINT NOT NULL,
    detail TEXT,
    logged_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0003_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_ohlcv_symbol_ts ON ohlcv(symbol, "timestamp");
CREATE INDEX IF NOT EXISTS idx_ingest_log_run ON ingest_log(run_id);
"#,
    },
];

/// Apply every migration that is not yet recorded in `schema_migrations`.
pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            tracing::debug!(version = migration.version, "applying migration");
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}
