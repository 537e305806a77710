//! Shared typed models used across the feature pipeline, store, and predictor.

use std::fmt;

use indexmap::IndexMap;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};

use crate::errors::{SayariceError, SayariceResult};

/// The `fuel_type` value that routes a submission to the electric schema.
pub const ELECTRIC_FUEL: &str = "Electric";

/// Categorical text for a NULL feature cell.
pub const NULL_CATEGORY: &str = "None";

// ---------------------------------------------------------------------------
// Powertrain
// ---------------------------------------------------------------------------

/// Electric vs. combustion classification. Selects table, schema, and model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Powertrain {
    NonElectric,
    Electric,
}

impl Powertrain {
    pub fn from_is_electric(is_electric: bool) -> Self {
        if is_electric {
            Powertrain::Electric
        } else {
            Powertrain::NonElectric
        }
    }

    pub fn from_fuel_type(fuel_type: Option<&str>) -> Self {
        Self::from_is_electric(fuel_type == Some(ELECTRIC_FUEL))
    }

    pub fn label(self) -> &'static str {
        match self {
            Powertrain::NonElectric => "non_electric",
            Powertrain::Electric => "electric",
        }
    }

    /// Raw submission table.
    pub fn raw_table(self) -> &'static str {
        match self {
            Powertrain::NonElectric => "Non_Electric_Cars",
            Powertrain::Electric => "Electric_Cars",
        }
    }

    /// Engineered feature table.
    pub fn modeling_table(self) -> &'static str {
        match self {
            Powertrain::NonElectric => "non_electric_cars_modeling",
            Powertrain::Electric => "electric_cars_modeling",
        }
    }

    /// Prediction log table.
    pub fn prediction_table(self) -> &'static str {
        match self {
            Powertrain::NonElectric => "predicted_non_electric",
            Powertrain::Electric => "predicted_electric",
        }
    }
}

impl fmt::Display for Powertrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// RawValue: dynamically typed numeric input
// ---------------------------------------------------------------------------

/// A raw field value as the store (or a scraped listing) holds it. Numeric
/// columns in SQLite are only an affinity, so anything may come back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl RawValue {
    /// Coerce to a finite number. Unparsable text becomes `None`, never an error.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            RawValue::Integer(v) => *v as f64,
            RawValue::Real(v) => *v,
            RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl ToSql for RawValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            RawValue::Integer(v) => v.to_sql(),
            RawValue::Real(v) => v.to_sql(),
            RawValue::Text(s) => s.to_sql(),
        }
    }
}

impl FromSql for RawValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(v) => Ok(RawValue::Integer(v)),
            ValueRef::Real(v) => Ok(RawValue::Real(v)),
            ValueRef::Text(bytes) => Ok(RawValue::Text(String::from_utf8_lossy(bytes).into_owned())),
            ValueRef::Null | ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

// ---------------------------------------------------------------------------
// RawSubmission
// ---------------------------------------------------------------------------

/// Powertrain-specific raw fields. Exactly one group exists per submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "powertrain", rename_all = "snake_case")]
pub enum PowertrainSpec {
    NonElectric {
        engine_size: Option<RawValue>,
        cylinders: Option<RawValue>,
    },
    Electric {
        battery_range: Option<RawValue>,
        battery_capacity: Option<RawValue>,
    },
}

impl PowertrainSpec {
    pub fn powertrain(&self) -> Powertrain {
        match self {
            PowertrainSpec::NonElectric { .. } => Powertrain::NonElectric,
            PowertrainSpec::Electric { .. } => Powertrain::Electric,
        }
    }
}

/// One user-submitted listing, as stored in the raw submission tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSubmission {
    pub id: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub condition: Option<String>,
    pub year: Option<RawValue>,
    pub body_type: Option<String>,
    pub seats: Option<RawValue>,
    pub transmission: Option<String>,
    pub kilometers: Option<RawValue>,
    pub body_condition: Option<String>,
    pub paint: Option<String>,
    pub regional_specs: Option<String>,
    pub insurance: Option<String>,
    pub license: Option<String>,
    pub car_customs: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub interior_options: Option<String>,
    pub exterior_options: Option<String>,
    pub tech_options: Option<String>,
    pub fuel_type: Option<String>,
    pub powertrain: PowertrainSpec,
    pub submitted_at: Option<String>,
}

impl RawSubmission {
    pub fn powertrain(&self) -> Powertrain {
        self.powertrain.powertrain()
    }

    /// The powertrain group must agree with `fuel_type`.
    pub fn validate(&self) -> SayariceResult<()> {
        let by_fuel = Powertrain::from_fuel_type(self.fuel_type.as_deref());
        if by_fuel != self.powertrain() {
            return Err(SayariceError::Validation(format!(
                "fuel_type {:?} selects the {} schema but the submission carries {} fields",
                self.fuel_type,
                by_fuel,
                self.powertrain()
            )));
        }
        Ok(())
    }

    /// Build a submission from the flat form payload. The powertrain group is
    /// chosen by `fuel_type`; fields of the other group are discarded.
    pub fn from_form(form: SubmissionForm) -> Self {
        let powertrain = match Powertrain::from_fuel_type(form.fuel_type.as_deref()) {
            Powertrain::Electric => PowertrainSpec::Electric {
                battery_range: form.battery_range,
                battery_capacity: form.battery_capacity,
            },
            Powertrain::NonElectric => PowertrainSpec::NonElectric {
                engine_size: form.engine_size,
                cylinders: form.cylinders,
            },
        };
        Self {
            id: None,
            make: form.make,
            model: form.model,
            trim: form.trim,
            condition: form.condition,
            year: form.year,
            body_type: form.body_type,
            seats: form.seats,
            transmission: form.transmission,
            kilometers: form.kilometers,
            body_condition: form.body_condition,
            paint: form.paint,
            regional_specs: form.regional_specs,
            insurance: form.insurance,
            license: form.license,
            car_customs: form.car_customs,
            city: form.city,
            neighborhood: form.neighborhood,
            interior_options: form.interior_options,
            exterior_options: form.exterior_options,
            tech_options: form.tech_options,
            fuel_type: form.fuel_type,
            powertrain,
            submitted_at: None,
        }
    }
}

/// Flat submission payload as the presentation layer collects it. All four
/// powertrain keys may be present; only one group survives `from_form`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionForm {
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub condition: Option<String>,
    pub year: Option<RawValue>,
    pub body_type: Option<String>,
    pub seats: Option<RawValue>,
    pub transmission: Option<String>,
    pub kilometers: Option<RawValue>,
    pub body_condition: Option<String>,
    pub paint: Option<String>,
    pub regional_specs: Option<String>,
    pub insurance: Option<String>,
    pub license: Option<String>,
    pub car_customs: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub interior_options: Option<String>,
    pub exterior_options: Option<String>,
    pub tech_options: Option<String>,
    pub fuel_type: Option<String>,
    pub engine_size: Option<RawValue>,
    pub cylinders: Option<RawValue>,
    pub battery_range: Option<RawValue>,
    pub battery_capacity: Option<RawValue>,
}

// ---------------------------------------------------------------------------
// FeatureValue / FeatureRow
// ---------------------------------------------------------------------------

/// A single cell of an engineered feature row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Int(v) => Some(*v as f64),
            FeatureValue::Real(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    pub fn real(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => FeatureValue::Real(v),
            _ => FeatureValue::Null,
        }
    }

    pub fn text(value: Option<&str>) -> Self {
        value.map_or(FeatureValue::Null, |s| FeatureValue::Text(s.to_string()))
    }

    pub fn flag(value: bool) -> Self {
        FeatureValue::Int(value as i64)
    }

    /// Text form handed to the model for categorical features. A NULL cell
    /// is stringified before any null fill, so it reaches the model as
    /// `"None"`, the text the models saw at serving time.
    pub fn to_category(&self) -> String {
        match self {
            FeatureValue::Null => NULL_CATEGORY.to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Null => f.write_str("NULL"),
            FeatureValue::Int(v) => write!(f, "{v}"),
            FeatureValue::Real(v) => write!(f, "{v}"),
            FeatureValue::Text(s) => f.write_str(s),
        }
    }
}

impl ToSql for FeatureValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            FeatureValue::Null => Ok(ToSqlOutput::Owned(Value::Null)),
            FeatureValue::Int(v) => v.to_sql(),
            FeatureValue::Real(v) => v.to_sql(),
            FeatureValue::Text(s) => s.to_sql(),
        }
    }
}

impl FromSql for FeatureValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(FeatureValue::Null),
            ValueRef::Integer(v) => Ok(FeatureValue::Int(v)),
            ValueRef::Real(v) => Ok(FeatureValue::Real(v)),
            ValueRef::Text(bytes) => Ok(FeatureValue::Text(String::from_utf8_lossy(bytes).into_owned())),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

/// An ordered column → value mapping in one powertrain's schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub powertrain: Powertrain,
    pub columns: IndexMap<String, FeatureValue>,
}

impl FeatureRow {
    pub fn new(powertrain: Powertrain) -> Self {
        Self {
            powertrain,
            columns: IndexMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.columns.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: FeatureValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A feature row read back from the engineered feature store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFeatureRow {
    pub row_id: i64,
    pub submission_id: Option<i64>,
    pub row: FeatureRow,
}

// ---------------------------------------------------------------------------
// Predictions and stage outcomes
// ---------------------------------------------------------------------------

/// One entry of the append-only prediction log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub id: Option<i64>,
    pub powertrain: Powertrain,
    pub car_id: i64,
    pub predicted_price: f64,
    pub model_sha256: Option<String>,
    pub predicted_at: Option<String>,
}

/// A successful price estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub price: f64,
    pub log_price: f64,
    pub row_id: i64,
    pub prediction_id: i64,
}

/// Result of the feature engineering stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Processed { row_id: i64, submission_id: Option<i64> },
    NoInput,
    Failed(String),
}

impl ProcessOutcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, ProcessOutcome::Processed { .. })
    }
}

pub const NO_PROCESSED_DATA: &str = "No processed data found";

/// Result of the prediction stage.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutcome {
    Priced(Prediction),
    NoProcessedData,
    Failed(String),
}

impl PredictionOutcome {
    /// `(price, row_ref, failure)`: exactly one side is populated.
    pub fn into_parts(self) -> (Option<f64>, Option<i64>, Option<String>) {
        match self {
            PredictionOutcome::Priced(p) => (Some(p.price), Some(p.row_id), None),
            PredictionOutcome::NoProcessedData => (None, None, Some(NO_PROCESSED_DATA.to_string())),
            PredictionOutcome::Failed(reason) => (None, None, Some(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fuel: &str) -> SubmissionForm {
        SubmissionForm {
            make: Some("Kia".into()),
            fuel_type: Some(fuel.into()),
            engine_size: Some(RawValue::Real(1.6)),
            cylinders: Some(RawValue::Integer(4)),
            battery_range: Some(RawValue::Integer(400)),
            battery_capacity: Some(RawValue::Integer(64)),
            ..Default::default()
        }
    }

    #[test]
    fn test_raw_value_coercion() {
        assert_eq!(RawValue::Integer(2020).as_number(), Some(2020.0));
        assert_eq!(RawValue::Text(" 50000 ".into()).as_number(), Some(50000.0));
        assert_eq!(RawValue::Text("50,000 km".into()).as_number(), None);
        assert_eq!(RawValue::Text("".into()).as_number(), None);
        assert_eq!(RawValue::Text("NaN".into()).as_number(), None);
        assert_eq!(RawValue::Real(f64::INFINITY).as_number(), None);
    }

    #[test]
    fn test_raw_value_json_shapes() {
        let v: RawValue = serde_json::from_str("2020").unwrap();
        assert_eq!(v, RawValue::Integer(2020));
        let v: RawValue = serde_json::from_str("2.5").unwrap();
        assert_eq!(v, RawValue::Real(2.5));
        let v: RawValue = serde_json::from_str("\"2.0\"").unwrap();
        assert_eq!(v, RawValue::Text("2.0".into()));
    }

    #[test]
    fn test_from_form_keeps_only_selected_group() {
        let electric = RawSubmission::from_form(form("Electric"));
        assert_eq!(
            electric.powertrain,
            PowertrainSpec::Electric {
                battery_range: Some(RawValue::Integer(400)),
                battery_capacity: Some(RawValue::Integer(64)),
            }
        );
        electric.validate().unwrap();

        let petrol = RawSubmission::from_form(form("Gasoline"));
        assert_eq!(petrol.powertrain(), Powertrain::NonElectric);
        assert!(matches!(
            petrol.powertrain,
            PowertrainSpec::NonElectric { cylinders: Some(RawValue::Integer(4)), .. }
        ));
        petrol.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_mismatched_group() {
        let mut sub = RawSubmission::from_form(form("Hybrid"));
        sub.fuel_type = Some("Electric".into());
        assert!(matches!(sub.validate(), Err(SayariceError::Validation(_))));
    }

    #[test]
    fn test_outcome_parts() {
        let priced = PredictionOutcome::Priced(Prediction {
            price: 12000.0,
            log_price: 12000f64.ln(),
            row_id: 3,
            prediction_id: 1,
        });
        assert_eq!(priced.into_parts(), (Some(12000.0), Some(3), None));
        assert_eq!(
            PredictionOutcome::NoProcessedData.into_parts(),
            (None, None, Some(NO_PROCESSED_DATA.to_string()))
        );
    }

    #[test]
    fn test_category_text() {
        assert_eq!(FeatureValue::Null.to_category(), "None");
        assert_eq!(FeatureValue::Text("SUV".into()).to_category(), "SUV");
        assert_eq!(FeatureValue::Int(5).to_category(), "5");
    }
}
