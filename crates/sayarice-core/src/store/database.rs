//! SQLite storage layer for the pricing core.
//!
//! Each public method opens its own connection, so a `Database` is just a
//! resolved path and can be shared freely between the pipeline and the
//! predictor.

use std::path::{Path, PathBuf};

use rusqlite::types::{ToSql, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{SayariceError, SayariceResult};
use crate::models::{
    FeatureRow, FeatureValue, Powertrain, PowertrainSpec, PredictionRecord, RawSubmission,
    StoredFeatureRow,
};
use crate::store::schema::{self, quote_ident};

/// Columns shared by both raw submission tables, in insert order.
const SUBMISSION_COLUMNS: &[&str] = &[
    "make",
    "model",
    "trim",
    "condition",
    "year",
    "body_type",
    "seats",
    "transmission",
    "kilometers",
    "body_condition",
    "paint",
    "regional_specs",
    "insurance",
    "license",
    "car_customs",
    "city",
    "neighborhood",
    "interior_options",
    "exterior_options",
    "tech_options",
    "fuel_type",
];

/// Link column of the engineered feature tables. Never part of a [`FeatureRow`].
const SUBMISSION_ID_COLUMN: &str = "submission_id";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if path.len() > 2 {
                expanded.push(&path[2..]);
            }
            return expanded;
        }
    }
    PathBuf::from(path)
}

/// Read a column as text whatever its storage class. Listings scraped into
/// TEXT columns sometimes come back as numbers and vice versa.
fn text_column(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(column)? {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v.to_string()),
        ValueRef::Real(v) => Some(v.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    })
}

fn submission_from_row(row: &Row<'_>, powertrain: Powertrain) -> rusqlite::Result<RawSubmission> {
    let group = match powertrain {
        Powertrain::NonElectric => PowertrainSpec::NonElectric {
            engine_size: row.get("engine_size")?,
            cylinders: row.get("cylinders")?,
        },
        Powertrain::Electric => PowertrainSpec::Electric {
            battery_range: row.get("battery_range")?,
            battery_capacity: row.get("battery_capacity")?,
        },
    };
    Ok(RawSubmission {
        id: row.get("id")?,
        make: text_column(row, "make")?,
        model: text_column(row, "model")?,
        trim: text_column(row, "trim")?,
        condition: text_column(row, "condition")?,
        year: row.get("year")?,
        body_type: text_column(row, "body_type")?,
        seats: row.get("seats")?,
        transmission: text_column(row, "transmission")?,
        kilometers: row.get("kilometers")?,
        body_condition: text_column(row, "body_condition")?,
        paint: text_column(row, "paint")?,
        regional_specs: text_column(row, "regional_specs")?,
        insurance: text_column(row, "insurance")?,
        license: text_column(row, "license")?,
        car_customs: text_column(row, "car_customs")?,
        city: text_column(row, "city")?,
        neighborhood: text_column(row, "neighborhood")?,
        interior_options: text_column(row, "interior_options")?,
        exterior_options: text_column(row, "exterior_options")?,
        tech_options: text_column(row, "tech_options")?,
        fuel_type: text_column(row, "fuel_type")?,
        powertrain: group,
        submitted_at: text_column(row, "submission_date")?,
    })
}

/// Decode a `SELECT rowid, * …` row. `names` are the statement's column names.
fn feature_row_from_row(
    row: &Row<'_>,
    names: &[String],
    powertrain: Powertrain,
) -> rusqlite::Result<StoredFeatureRow> {
    let row_id: i64 = row.get(0)?;
    let mut submission_id = None;
    let mut features = FeatureRow::new(powertrain);
    for (idx, name) in names.iter().enumerate().skip(1) {
        if name == SUBMISSION_ID_COLUMN {
            submission_id = row.get::<_, Option<i64>>(idx)?;
        } else {
            features.insert(name.clone(), row.get::<_, FeatureValue>(idx)?);
        }
    }
    Ok(StoredFeatureRow {
        row_id,
        submission_id,
        row: features,
    })
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Row counts of one powertrain partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartitionCounts {
    pub submissions: i64,
    pub engineered: i64,
    pub predictions: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub schema_version: i32,
    pub non_electric: PartitionCounts,
    pub electric: PartitionCounts,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// SQLite store holding raw submissions, engineered feature rows, and the
/// prediction log for both powertrains.
#[derive(Debug, Clone)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Create a new `Database`. The path is expanded and made absolute, and
    /// parent directories are created if they do not already exist.
    pub fn new(db_path: impl AsRef<Path>) -> SayariceResult<Self> {
        let db_str = db_path.as_ref().to_string_lossy();
        let expanded = expand_tilde(&db_str);
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(&expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { db_path: resolved })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Foreign keys stay off: legacy feature tables have no key to point at.
    fn connect(&self) -> SayariceResult<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }

    /// Create all tables and run pending migrations.
    pub fn init_schema(&self) -> SayariceResult<()> {
        let conn = self.connect()?;
        schema::init_schema(&conn)?;
        info!(
            "Initialised store at {} (schema v{})",
            self.db_path.display(),
            schema::get_schema_version(&conn)
        );
        Ok(())
    }

    pub fn schema_version(&self) -> SayariceResult<i32> {
        let conn = self.connect()?;
        Ok(schema::get_schema_version(&conn))
    }

    // -----------------------------------------------------------------------
    // Raw submissions
    // -----------------------------------------------------------------------

    /// Append a submission to its powertrain's raw table and return its id.
    pub fn save_submission(&self, submission: &RawSubmission) -> SayariceResult<i64> {
        submission.validate()?;
        let powertrain = submission.powertrain();

        let mut columns: Vec<&str> = SUBMISSION_COLUMNS.to_vec();
        let mut values: Vec<&dyn ToSql> = params![
            submission.make,
            submission.model,
            submission.trim,
            submission.condition,
            submission.year,
            submission.body_type,
            submission.seats,
            submission.transmission,
            submission.kilometers,
            submission.body_condition,
            submission.paint,
            submission.regional_specs,
            submission.insurance,
            submission.license,
            submission.car_customs,
            submission.city,
            submission.neighborhood,
            submission.interior_options,
            submission.exterior_options,
            submission.tech_options,
            submission.fuel_type,
        ]
        .to_vec();
        match &submission.powertrain {
            PowertrainSpec::NonElectric {
                engine_size,
                cylinders,
            } => {
                columns.extend(["engine_size", "cylinders"]);
                values.push(engine_size);
                values.push(cylinders);
            }
            PowertrainSpec::Electric {
                battery_range,
                battery_capacity,
            } => {
                columns.extend(["battery_range", "battery_capacity"]);
                values.push(battery_range);
                values.push(battery_capacity);
            }
        }
        columns.push("submission_date");
        values.push(&submission.submitted_at);

        let placeholders: Vec<String> = (1..=values.len())
            .map(|i| {
                if i == values.len() {
                    format!("COALESCE(?{i}, CURRENT_TIMESTAMP)")
                } else {
                    format!("?{i}")
                }
            })
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            powertrain.raw_table(),
            columns.join(", "),
            placeholders.join(", ")
        );

        let conn = self.connect()?;
        conn.execute(&sql, values.as_slice())?;
        let id = conn.last_insert_rowid();
        debug!("Saved {} submission id={}", powertrain, id);
        Ok(id)
    }

    pub fn submission(&self, powertrain: Powertrain, id: i64) -> SayariceResult<Option<RawSubmission>> {
        let conn = self.connect()?;
        let sql = format!("SELECT * FROM {} WHERE id = ?1;", powertrain.raw_table());
        let found = conn
            .query_row(&sql, params![id], |row| submission_from_row(row, powertrain))
            .optional()?;
        Ok(found)
    }

    /// The most recently inserted submission of a powertrain.
    pub fn latest_submission(&self, powertrain: Powertrain) -> SayariceResult<Option<RawSubmission>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT * FROM {} ORDER BY id DESC LIMIT 1;",
            powertrain.raw_table()
        );
        let found = conn
            .query_row(&sql, [], |row| submission_from_row(row, powertrain))
            .optional()?;
        Ok(found)
    }

    // -----------------------------------------------------------------------
    // Engineered feature rows
    // -----------------------------------------------------------------------

    /// Append an engineered row to its powertrain's feature table and return
    /// the new `rowid`. Columns are written by name, so the row must already
    /// be projected onto the table schema.
    pub fn insert_features(&self, row: &FeatureRow, submission_id: Option<i64>) -> SayariceResult<i64> {
        if row.is_empty() {
            return Err(SayariceError::Validation(
                "refusing to store an empty feature row".to_string(),
            ));
        }
        let mut columns = vec![quote_ident(SUBMISSION_ID_COLUMN)];
        columns.extend(row.columns.keys().map(|c| quote_ident(c)));
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();

        let mut values: Vec<&dyn ToSql> = Vec::with_capacity(columns.len());
        values.push(&submission_id);
        values.extend(row.columns.values().map(|v| v as &dyn ToSql));

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            row.powertrain.modeling_table(),
            columns.join(", "),
            placeholders.join(", ")
        );

        let conn = self.connect()?;
        conn.execute(&sql, values.as_slice())?;
        let row_id = conn.last_insert_rowid();
        debug!(
            "Stored {} feature row rowid={} submission_id={:?}",
            row.powertrain, row_id, submission_id
        );
        Ok(row_id)
    }

    fn query_features(
        &self,
        powertrain: Powertrain,
        clause: &str,
        param: Option<i64>,
    ) -> SayariceResult<Option<StoredFeatureRow>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT rowid, * FROM {} {} LIMIT 1;",
            powertrain.modeling_table(),
            clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = match param {
            Some(p) => stmt.query(params![p])?,
            None => stmt.query([])?,
        };
        let found = match rows.next()? {
            Some(row) => Some(feature_row_from_row(row, &names, powertrain)?),
            None => None,
        };
        Ok(found)
    }

    pub fn features(&self, powertrain: Powertrain, row_id: i64) -> SayariceResult<Option<StoredFeatureRow>> {
        self.query_features(powertrain, "WHERE rowid = ?1", Some(row_id))
    }

    /// The most recently inserted engineered row of a powertrain.
    pub fn latest_features(&self, powertrain: Powertrain) -> SayariceResult<Option<StoredFeatureRow>> {
        self.query_features(powertrain, "ORDER BY rowid DESC", None)
    }

    /// The newest engineered row derived from `submission_id`.
    pub fn features_for_submission(
        &self,
        powertrain: Powertrain,
        submission_id: i64,
    ) -> SayariceResult<Option<StoredFeatureRow>> {
        self.query_features(
            powertrain,
            "WHERE submission_id = ?1 ORDER BY rowid DESC",
            Some(submission_id),
        )
    }

    // -----------------------------------------------------------------------
    // Prediction log
    // -----------------------------------------------------------------------

    pub fn log_prediction(
        &self,
        powertrain: Powertrain,
        car_id: i64,
        predicted_price: f64,
        model_sha256: Option<&str>,
    ) -> SayariceResult<i64> {
        let conn = self.connect()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (car_id, predicted_price, model_sha256) VALUES (?1, ?2, ?3);",
                powertrain.prediction_table()
            ),
            params![car_id, predicted_price, model_sha256],
        )?;
        let id = conn.last_insert_rowid();
        debug!(
            "Logged {} prediction id={} car_id={} price={:.2}",
            powertrain, id, car_id, predicted_price
        );
        Ok(id)
    }

    /// Newest first.
    pub fn predictions(&self, powertrain: Powertrain, limit: usize) -> SayariceResult<Vec<PredictionRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, car_id, predicted_price, model_sha256, prediction_date \
             FROM {} ORDER BY id DESC LIMIT ?1;",
            powertrain.prediction_table()
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![limit], |row| {
                Ok(PredictionRecord {
                    id: row.get(0)?,
                    powertrain,
                    car_id: row.get(1)?,
                    predicted_price: row.get(2)?,
                    model_sha256: row.get(3)?,
                    predicted_at: text_column(row, "prediction_date")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> SayariceResult<StoreStats> {
        let conn = self.connect()?;
        let count = |table: &str| -> SayariceResult<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |r| r.get(0))?)
        };
        let partition = |powertrain: Powertrain| -> SayariceResult<PartitionCounts> {
            Ok(PartitionCounts {
                submissions: count(powertrain.raw_table())?,
                engineered: count(powertrain.modeling_table())?,
                predictions: count(powertrain.prediction_table())?,
            })
        };
        Ok(StoreStats {
            schema_version: schema::get_schema_version(&conn),
            non_electric: partition(Powertrain::NonElectric)?,
            electric: partition(Powertrain::Electric)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::engineering::tests::{bmw_submission, ev_submission};
    use crate::models::RawValue;
    use tempfile::TempDir;

    fn open() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("nested").join("cars.db")).unwrap();
        db.init_schema().unwrap();
        (dir, db)
    }

    fn sample_row(powertrain: Powertrain, make: &str) -> FeatureRow {
        let mut row = FeatureRow::new(powertrain);
        row.insert("Car Make", FeatureValue::Text(make.into()));
        row.insert("Year", FeatureValue::Int(2020));
        row.insert("car_age_sqrt", FeatureValue::Null);
        row
    }

    #[test]
    fn test_new_creates_parent_dirs() {
        let (dir, db) = open();
        assert!(db.db_path().is_absolute());
        assert!(dir.path().join("nested").is_dir());
        assert!(db.db_path().exists());
    }

    #[test]
    fn test_submission_round_trip() {
        let (_dir, db) = open();
        let mut sub = bmw_submission();
        sub.id = None;
        sub.kilometers = Some(RawValue::Text("50,000 km".into()));
        let id = db.save_submission(&sub).unwrap();

        let back = db.submission(Powertrain::NonElectric, id).unwrap().unwrap();
        assert_eq!(back.id, Some(id));
        assert_eq!(back.make.as_deref(), Some("BMW"));
        assert_eq!(back.kilometers, Some(RawValue::Text("50,000 km".into())));
        assert_eq!(back.powertrain, sub.powertrain);
        assert_eq!(back.submitted_at, sub.submitted_at);
        assert!(db.submission(Powertrain::Electric, id).unwrap().is_none());
    }

    #[test]
    fn test_latest_submission_per_powertrain() {
        let (_dir, db) = open();
        assert!(db.latest_submission(Powertrain::Electric).unwrap().is_none());

        db.save_submission(&bmw_submission()).unwrap();
        let ev_id = db.save_submission(&ev_submission()).unwrap();
        let mut newer = bmw_submission();
        newer.make = Some("Kia".into());
        newer.submitted_at = None;
        db.save_submission(&newer).unwrap();

        let latest = db.latest_submission(Powertrain::NonElectric).unwrap().unwrap();
        assert_eq!(latest.make.as_deref(), Some("Kia"));
        assert!(latest.submitted_at.is_some());
        let latest_ev = db.latest_submission(Powertrain::Electric).unwrap().unwrap();
        assert_eq!(latest_ev.id, Some(ev_id));
    }

    #[test]
    fn test_save_rejects_mismatched_powertrain() {
        let (_dir, db) = open();
        let mut sub = bmw_submission();
        sub.fuel_type = Some("Electric".into());
        assert!(matches!(
            db.save_submission(&sub),
            Err(SayariceError::Validation(_))
        ));
        assert_eq!(db.stats().unwrap().electric.submissions, 0);
    }

    #[test]
    fn test_feature_rows_by_rowid_and_submission() {
        let (_dir, db) = open();
        let first = db
            .insert_features(&sample_row(Powertrain::NonElectric, "BMW"), Some(10))
            .unwrap();
        let second = db
            .insert_features(&sample_row(Powertrain::NonElectric, "Kia"), Some(11))
            .unwrap();
        assert!(second > first);

        let stored = db.features(Powertrain::NonElectric, first).unwrap().unwrap();
        assert_eq!(stored.submission_id, Some(10));
        assert_eq!(stored.row.get("Car Make"), Some(&FeatureValue::Text("BMW".into())));
        assert_eq!(stored.row.get("car_age_sqrt"), Some(&FeatureValue::Null));
        assert_eq!(stored.row.get("Paint"), Some(&FeatureValue::Null));
        assert!(!stored.row.contains(SUBMISSION_ID_COLUMN));

        let latest = db.latest_features(Powertrain::NonElectric).unwrap().unwrap();
        assert_eq!(latest.row_id, second);
        let by_sub = db
            .features_for_submission(Powertrain::NonElectric, 10)
            .unwrap()
            .unwrap();
        assert_eq!(by_sub.row_id, first);
        assert!(db.features_for_submission(Powertrain::NonElectric, 99).unwrap().is_none());
        assert!(db.latest_features(Powertrain::Electric).unwrap().is_none());
    }

    #[test]
    fn test_insert_unknown_column_fails() {
        let (_dir, db) = open();
        let mut row = sample_row(Powertrain::Electric, "Tesla");
        row.insert("Engine Size (cc)", FeatureValue::Real(2.0));
        assert!(matches!(
            db.insert_features(&row, None),
            Err(SayariceError::Sqlite(_))
        ));
        assert!(db.insert_features(&FeatureRow::new(Powertrain::Electric), None).is_err());
    }

    #[test]
    fn test_prediction_log() {
        let (_dir, db) = open();
        db.log_prediction(Powertrain::Electric, 3, 21000.0, Some("abc")).unwrap();
        let id = db.log_prediction(Powertrain::Electric, 4, 23000.5, None).unwrap();

        let records = db.predictions(Powertrain::Electric, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, Some(id));
        assert_eq!(records[0].car_id, 4);
        assert_eq!(records[0].model_sha256, None);
        assert_eq!(records[1].model_sha256.as_deref(), Some("abc"));
        assert!(records[0].predicted_at.is_some());
        assert!(db.predictions(Powertrain::NonElectric, 10).unwrap().is_empty());
    }

    #[test]
    fn test_stats_counts_partitions() {
        let (_dir, db) = open();
        db.save_submission(&ev_submission()).unwrap();
        db.insert_features(&sample_row(Powertrain::Electric, "Tesla"), Some(1))
            .unwrap();
        db.log_prediction(Powertrain::Electric, 1, 30000.0, None).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.schema_version, schema::SCHEMA_VERSION);
        assert_eq!(
            stats.electric,
            PartitionCounts {
                submissions: 1,
                engineered: 1,
                predictions: 1
            }
        );
        assert_eq!(stats.non_electric, PartitionCounts::default());
    }

    #[test]
    fn test_reads_legacy_feature_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE electric_cars_modeling (\"Car Make\" TEXT, \"Year\" INTEGER);
             INSERT INTO electric_cars_modeling VALUES ('Tesla', 2022);",
        )
        .unwrap();
        drop(conn);

        let db = Database::new(&path).unwrap();
        db.init_schema().unwrap();
        let stored = db.latest_features(Powertrain::Electric).unwrap().unwrap();
        assert_eq!(stored.row_id, 1);
        assert_eq!(stored.submission_id, None);
        assert_eq!(stored.row.column_names(), vec!["Car Make", "Year"]);
    }
}
