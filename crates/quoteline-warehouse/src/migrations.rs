use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_snapshot_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS daily_quotes (
    symbol TEXT NOT NULL,
    date DATE NOT NULL,
    market TEXT NOT NULL,
    price DOUBLE NOT NULL,
    change DOUBLE NOT NULL,
    change_percent DOUBLE NOT NULL,
    volume BIGINT,
    total_volume BIGINT,
    market_cap DOUBLE,
    high DOUBLE,
    low DOUBLE,
    open DOUBLE,
    previous_close DOUBLE,
    company_name TEXT,
    high_52_week DOUBLE,
    low_52_week DOUBLE,
    last_updated TEXT,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(symbol, date)
);

CREATE TABLE IF NOT EXISTS historical_prices (
    symbol TEXT NOT NULL,
    date DATE NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume BIGINT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(symbol, date)
);

CREATE SEQUENCE IF NOT EXISTS refresh_log_seq;

CREATE TABLE IF NOT EXISTS refresh_log (
    id BIGINT NOT NULL DEFAULT nextval('refresh_log_seq'),
    date DATE NOT NULL,
    status TEXT NOT NULL,
    symbols_updated BIGINT NOT NULL,
    error_message TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    logged_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_daily_quotes_date ON daily_quotes(date);
CREATE INDEX IF NOT EXISTS idx_refresh_log_date ON refresh_log(date);
"#,
    },
];

/// Apply every migration not yet recorded in `schema_migrations`.
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
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}

/// Versions recorded in `schema_migrations`, oldest first.
pub fn applied_versions(connection: &Connection) -> Result<Vec<String>, ::duckdb::Error> {
    let mut statement =
        connection.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}
