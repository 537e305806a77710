//! SQLite schema DDL and migration framework.
//!
//! Table layouts stay compatible with databases written by the earlier
//! Streamlit deployment: `CREATE … IF NOT EXISTS` leaves those tables alone
//! and the migrations add whatever columns they lack.

use rusqlite::Connection;

use crate::errors::SayariceResult;
use crate::features::schema::{column_type, target_columns};
use crate::models::Powertrain;

/// Current schema version. Migrations run from whatever the DB currently
/// reports up to this value.
pub const SCHEMA_VERSION: i32 = 3;

/// Static DDL: 2 raw submission tables, 2 prediction logs, 2 bookkeeping
/// tables. `car_id` in the prediction logs holds a feature-table `rowid`,
/// which cannot be declared as a foreign key parent. The engineered feature
/// tables are generated from their column lists by [`modeling_table_ddl`].
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS Non_Electric_Cars (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        make TEXT,
        model TEXT,
        trim TEXT,
        condition TEXT,
        year INTEGER,
        body_type TEXT,
        seats INTEGER,
        transmission TEXT,
        kilometers INTEGER,
        body_condition TEXT,
        paint TEXT,
        regional_specs TEXT,
        insurance TEXT,
        license TEXT,
        car_customs TEXT,
        city TEXT,
        neighborhood TEXT,
        interior_options TEXT,
        exterior_options TEXT,
        tech_options TEXT,
        fuel_type TEXT,
        engine_size REAL,
        cylinders INTEGER,
        submission_date TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS Electric_Cars (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        make TEXT,
        model TEXT,
        trim TEXT,
        condition TEXT,
        year INTEGER,
        body_type TEXT,
        seats INTEGER,
        transmission TEXT,
        kilometers INTEGER,
        body_condition TEXT,
        paint TEXT,
        regional_specs TEXT,
        insurance TEXT,
        license TEXT,
        car_customs TEXT,
        city TEXT,
        neighborhood TEXT,
        interior_options TEXT,
        exterior_options TEXT,
        tech_options TEXT,
        fuel_type TEXT,
        battery_range INTEGER,
        battery_capacity INTEGER,
        submission_date TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS predicted_non_electric (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        car_id INTEGER,
        predicted_price REAL,
        model_sha256 TEXT,
        prediction_date TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS predicted_electric (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        car_id INTEGER,
        predicted_price REAL,
        model_sha256 TEXT,
        prediction_date TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );",
];

/// Quote an identifier for SQLite. Feature columns contain spaces and slashes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// DDL for one engineered feature table. Rows are addressed by `rowid`;
/// `submission_id` links back to the raw submission that produced the row.
pub fn modeling_table_ddl(powertrain: Powertrain) -> String {
    let mut columns = vec!["submission_id INTEGER".to_string()];
    columns.extend(
        target_columns(powertrain)
            .iter()
            .map(|c| format!("{} {}", quote_ident(c), column_type(c))),
    );
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        powertrain.modeling_table(),
        columns.join(",\n    ")
    )
}

/// Create every table, then run pending migrations.
pub fn init_schema(conn: &Connection) -> SayariceResult<()> {
    for stmt in SCHEMA_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    for powertrain in [Powertrain::NonElectric, Powertrain::Electric] {
        conn.execute_batch(&modeling_table_ddl(powertrain))?;
    }
    migrate_schema(conn)
}

// ─── Migration framework ────────────────────────────────────────────────────

/// Run all pending migrations from the current stored version up to
/// [`SCHEMA_VERSION`].  Each step is wrapped in a SAVEPOINT so a failure
/// rolls back only that single step.
pub fn migrate_schema(conn: &Connection) -> SayariceResult<()> {
    let mut current_version = get_schema_version(conn);

    while current_version < SCHEMA_VERSION {
        let next_version = current_version + 1;
        conn.execute_batch("SAVEPOINT sayarice_migrate_step;")?;

        let step_result = (|| -> SayariceResult<()> {
            match next_version {
                1 => migrate_to_v1(conn)?,
                2 => migrate_to_v2(conn)?,
                3 => migrate_to_v3(conn)?,
                _ => {}
            }
            set_schema_version(conn, next_version)?;
            record_migration_step(conn, current_version, next_version, "success", None)?;
            conn.execute_batch("RELEASE SAVEPOINT sayarice_migrate_step;")?;
            Ok(())
        })();

        match step_result {
            Ok(()) => {
                current_version = next_version;
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT sayarice_migrate_step;");
                let _ = conn.execute_batch("RELEASE SAVEPOINT sayarice_migrate_step;");
                let _ = record_migration_step(
                    conn,
                    current_version,
                    next_version,
                    "failed",
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Read the current schema version from `store_meta`.
/// Returns 0 when the key is absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SayariceResult<()> {
    conn.execute(
        "INSERT INTO store_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

fn record_migration_step(
    conn: &Connection,
    from_v: i32,
    to_v: i32,
    status: &str,
    error_msg: Option<&str>,
) -> SayariceResult<()> {
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, status, error_message) \
         VALUES (?1, ?2, ?3, ?4);",
        rusqlite::params![from_v, to_v, status, error_msg],
    )?;
    Ok(())
}

/// Column names of `table` in declaration order (empty if it does not exist).
pub fn table_columns(conn: &Connection, table: &str) -> SayariceResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quote_ident(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
) -> SayariceResult<()> {
    if table_columns(conn, table)?.iter().any(|c| c == column) {
        return Ok(());
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN {} {};",
        quote_ident(table),
        quote_ident(column),
        decl
    ))?;
    Ok(())
}

// ─── Individual migration steps ─────────────────────────────────────────────

/// v0 -> v1: baseline, no-op.
fn migrate_to_v1(_conn: &Connection) -> SayariceResult<()> {
    Ok(())
}

/// v1 -> v2: feature rows link to their submission, predictions record the
/// model fingerprint. Tables written by the Streamlit app had neither.
fn migrate_to_v2(conn: &Connection) -> SayariceResult<()> {
    for powertrain in [Powertrain::NonElectric, Powertrain::Electric] {
        add_column_if_missing(conn, powertrain.modeling_table(), "submission_id", "INTEGER")?;
        add_column_if_missing(conn, powertrain.prediction_table(), "model_sha256", "TEXT")?;
    }
    Ok(())
}

/// v2 -> v3: lookup indexes for identifier threading.
fn migrate_to_v3(conn: &Connection) -> SayariceResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_non_electric_modeling_submission \
         ON non_electric_cars_modeling(submission_id);",
    )?;
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_electric_modeling_submission \
         ON electric_cars_modeling(submission_id);",
    )?;
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_predicted_non_electric_car \
         ON predicted_non_electric(car_id);",
    )?;
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_predicted_electric_car \
         ON predicted_electric(car_id);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::schema::{ELECTRIC_COLUMNS, NON_ELECTRIC_COLUMNS};

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn schema_statement_counts() {
        assert_eq!(SCHEMA_STATEMENTS.len(), 6);
    }

    #[test]
    fn migrate_fresh_database() {
        let conn = fresh();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_idempotent() {
        let conn = fresh();
        init_schema(&conn).unwrap();
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        let steps: i64 = conn
            .query_row("SELECT COUNT(*) FROM migration_history;", [], |r| r.get(0))
            .unwrap();
        assert_eq!(steps, SCHEMA_VERSION as i64);
    }

    #[test]
    fn modeling_tables_match_feature_schema() {
        let conn = fresh();
        let columns = table_columns(&conn, "non_electric_cars_modeling").unwrap();
        assert_eq!(columns[0], "submission_id");
        assert_eq!(&columns[1..], NON_ELECTRIC_COLUMNS);

        let columns = table_columns(&conn, "electric_cars_modeling").unwrap();
        assert_eq!(&columns[1..], ELECTRIC_COLUMNS);
    }

    #[test]
    fn migrate_legacy_tables() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE non_electric_cars_modeling (\"Condition\" TEXT, \"Car Make\" TEXT);
             CREATE TABLE predicted_non_electric (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 car_id INTEGER,
                 predicted_price REAL,
                 prediction_date TIMESTAMP DEFAULT CURRENT_TIMESTAMP
             );",
        )
        .unwrap();
        init_schema(&conn).unwrap();

        let modeling = table_columns(&conn, "non_electric_cars_modeling").unwrap();
        assert!(modeling.iter().any(|c| c == "submission_id"));
        let predictions = table_columns(&conn, "predicted_non_electric").unwrap();
        assert_eq!(predictions.last().map(String::as_str), Some("model_sha256"));
    }

    #[test]
    fn quote_ident_escapes() {
        assert_eq!(quote_ident("Engine Size (cc)"), "\"Engine Size (cc)\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
