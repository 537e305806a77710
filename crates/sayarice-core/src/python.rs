//! PyO3 bindings for the Streamlit presentation layer.
//!
//! Submissions cross the boundary as JSON form payloads; results come back as
//! the `(price, row_ref, error)` triple the pages already render.

use std::path::PathBuf;

use pyo3::prelude::*;

use crate::config::Settings;
use crate::errors::SayariceError;
use crate::models::{Powertrain, ProcessOutcome, RawSubmission, SubmissionForm};
use crate::pipeline::{self, FeaturePipeline};
use crate::predictor::PricePredictor;
use crate::store::database::Database;

fn settings_with(
    db_path: Option<PathBuf>,
    reference_year: Option<i32>,
) -> Result<Settings, SayariceError> {
    let mut settings = Settings::from_env()?;
    if let Some(path) = db_path {
        settings.db_path = path;
    }
    if let Some(year) = reference_year {
        settings.reference_year = year;
    }
    Ok(settings)
}

fn parse_form(payload: &str) -> Result<RawSubmission, SayariceError> {
    let form: SubmissionForm = serde_json::from_str(payload)?;
    Ok(RawSubmission::from_form(form))
}

fn outcome_tuple(outcome: ProcessOutcome) -> (bool, Option<i64>, Option<String>) {
    match outcome {
        ProcessOutcome::Processed { row_id, .. } => (true, Some(row_id), None),
        ProcessOutcome::NoInput => (false, None, Some("No car data found to process".to_string())),
        ProcessOutcome::Failed(reason) => (false, None, Some(reason)),
    }
}

#[pyclass(name = "FeaturePipeline")]
pub struct PyFeaturePipeline {
    inner: FeaturePipeline,
}

#[pymethods]
impl PyFeaturePipeline {
    #[new]
    #[pyo3(signature = (db_path=None, reference_year=None))]
    fn new(db_path: Option<PathBuf>, reference_year: Option<i32>) -> PyResult<Self> {
        let settings = settings_with(db_path, reference_year)?;
        Ok(Self {
            inner: FeaturePipeline::from_settings(&settings)?,
        })
    }

    #[getter]
    fn db_path(&self) -> String {
        self.inner.database().db_path().to_string_lossy().into_owned()
    }

    /// Store a JSON form payload; returns the submission id.
    fn save_submission(&self, payload: &str) -> PyResult<i64> {
        let submission = parse_form(payload)?;
        Ok(self.inner.database().save_submission(&submission)?)
    }

    fn process_latest(&self, is_electric: bool) -> (bool, Option<i64>, Option<String>) {
        outcome_tuple(self.inner.process_latest(is_electric))
    }

    fn process_submission(
        &self,
        is_electric: bool,
        submission_id: i64,
    ) -> (bool, Option<i64>, Option<String>) {
        outcome_tuple(
            self.inner
                .process_submission(Powertrain::from_is_electric(is_electric), submission_id),
        )
    }

    /// Row counts per table, as JSON.
    fn stats(&self) -> PyResult<String> {
        let stats = self.inner.database().stats()?;
        Ok(serde_json::to_string(&stats).map_err(SayariceError::from)?)
    }
}

#[pyclass(name = "PricePredictor")]
pub struct PyPricePredictor {
    inner: PricePredictor,
}

#[pymethods]
impl PyPricePredictor {
    #[new]
    #[pyo3(signature = (non_electric_model_path=None, electric_model_path=None, db_path=None, reference_year=None))]
    fn new(
        non_electric_model_path: Option<PathBuf>,
        electric_model_path: Option<PathBuf>,
        db_path: Option<PathBuf>,
        reference_year: Option<i32>,
    ) -> PyResult<Self> {
        let mut settings = settings_with(db_path, reference_year)?;
        if let Some(path) = non_electric_model_path {
            settings.non_electric_model_path = path;
        }
        if let Some(path) = electric_model_path {
            settings.electric_model_path = path;
        }
        Ok(Self {
            inner: PricePredictor::from_settings(&settings)?,
        })
    }

    fn predict_from_processed_data(&self, is_electric: bool) -> (Option<f64>, Option<i64>, Option<String>) {
        self.inner.predict(is_electric).into_parts()
    }

    fn predict_row(
        &self,
        is_electric: bool,
        row_id: i64,
    ) -> (Option<f64>, Option<i64>, Option<String>) {
        self.inner
            .predict_row(Powertrain::from_is_electric(is_electric), row_id)
            .into_parts()
    }
}

/// Engineer a JSON form payload without storing it; returns the projected
/// row as a JSON object in table column order.
#[pyfunction]
#[pyo3(signature = (payload, reference_year=None))]
pub fn engineer_features(payload: &str, reference_year: Option<i32>) -> PyResult<String> {
    let submission = parse_form(payload)?;
    let year = match reference_year {
        Some(year) => year,
        None => Settings::from_env()?.reference_year,
    };
    let row = pipeline::engineer_row(&submission, year);
    Ok(serde_json::to_string(&row.columns).map_err(SayariceError::from)?)
}

/// Save, engineer, and price a JSON form payload in one call. Returns the
/// pricing report as JSON.
#[pyfunction]
pub fn price_submission(
    stage: PyRef<'_, PyFeaturePipeline>,
    predictor: PyRef<'_, PyPricePredictor>,
    payload: &str,
) -> PyResult<String> {
    let submission = parse_form(payload)?;
    let report = pipeline::price_submission(&stage.inner, &predictor.inner, &submission);
    Ok(serde_json::to_string(&report).map_err(SayariceError::from)?)
}

/// Initialise (or migrate) a store and return its schema version.
#[pyfunction]
pub fn init_store(db_path: PathBuf) -> PyResult<i32> {
    let db = Database::new(db_path)?;
    db.init_schema()?;
    Ok(db.schema_version()?)
}
