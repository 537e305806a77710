//! Submission → engineered row → price orchestration, plus Rayon-based batch
//! engineering for exported listings.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::SayariceResult;
use crate::features::engineering::engineer;
use crate::features::schema::{project, target_columns};
use crate::models::{FeatureRow, Powertrain, PredictionOutcome, ProcessOutcome, RawSubmission};
use crate::predictor::PricePredictor;
use crate::store::database::Database;

/// Engineer one submission and project it onto its powertrain's table schema.
/// Pure and deterministic for a fixed reference year.
pub fn engineer_row(raw: &RawSubmission, reference_year: i32) -> FeatureRow {
    let powertrain = raw.powertrain();
    let features = engineer(raw, reference_year);
    project(powertrain, features.field_values(), target_columns(powertrain))
}

/// Engineer many submissions in parallel. Output order matches input order.
pub fn engineer_batch(
    submissions: &[RawSubmission],
    reference_year: i32,
    workers: usize,
) -> Vec<FeatureRow> {
    if submissions.is_empty() {
        return vec![];
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    match pool {
        Ok(pool) => pool.install(|| {
            submissions
                .par_iter()
                .map(|raw| engineer_row(raw, reference_year))
                .collect()
        }),
        Err(e) => {
            warn!("Could not build worker pool ({e}); engineering sequentially");
            submissions
                .iter()
                .map(|raw| engineer_row(raw, reference_year))
                .collect()
        }
    }
}

/// The feature engineering stage backed by the store.
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    db: Database,
    reference_year: i32,
}

impl FeaturePipeline {
    pub fn new(db: Database, reference_year: i32) -> Self {
        Self { db, reference_year }
    }

    /// Build from [`Settings`], making sure the store schema exists.
    pub fn from_settings(settings: &Settings) -> SayariceResult<Self> {
        let db = Database::new(&settings.db_path)?;
        db.init_schema()?;
        Ok(Self::new(db, settings.reference_year))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    /// Engineer and store one submission. `None` is the "no input" outcome.
    pub fn process(&self, raw: Option<&RawSubmission>) -> ProcessOutcome {
        match raw {
            None => ProcessOutcome::NoInput,
            Some(raw) => self.settle(self.store(raw)),
        }
    }

    /// Engineer the most recently saved submission of a powertrain.
    pub fn process_latest(&self, is_electric: bool) -> ProcessOutcome {
        let powertrain = Powertrain::from_is_electric(is_electric);
        self.settle(
            self.db
                .latest_submission(powertrain)
                .and_then(|raw| self.store_or_skip(raw, powertrain)),
        )
    }

    /// Engineer a specific saved submission.
    pub fn process_submission(&self, powertrain: Powertrain, submission_id: i64) -> ProcessOutcome {
        self.settle(
            self.db
                .submission(powertrain, submission_id)
                .and_then(|raw| self.store_or_skip(raw, powertrain)),
        )
    }

    fn store_or_skip(
        &self,
        raw: Option<RawSubmission>,
        powertrain: Powertrain,
    ) -> SayariceResult<ProcessOutcome> {
        match raw {
            Some(raw) => self.store(&raw),
            None => {
                debug!("No {} submission to process", powertrain);
                Ok(ProcessOutcome::NoInput)
            }
        }
    }

    fn store(&self, raw: &RawSubmission) -> SayariceResult<ProcessOutcome> {
        raw.validate()?;
        let row = engineer_row(raw, self.reference_year);
        let row_id = self.db.insert_features(&row, raw.id)?;
        info!(
            "Engineered {} submission {:?} into row {}",
            row.powertrain, raw.id, row_id
        );
        Ok(ProcessOutcome::Processed {
            row_id,
            submission_id: raw.id,
        })
    }

    fn settle(&self, result: SayariceResult<ProcessOutcome>) -> ProcessOutcome {
        result.unwrap_or_else(|e| {
            warn!("Feature engineering failed: {}", e);
            ProcessOutcome::Failed(format!("Processing failed: {e}"))
        })
    }
}

/// Every identifier and outcome of one end-to-end pricing run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingReport {
    pub submission_id: Option<i64>,
    pub row_id: Option<i64>,
    pub price: Option<f64>,
    pub error: Option<String>,
}

/// Save, engineer, and price one submission, threading ids between stages
/// instead of re-reading "the latest" row.
pub fn price_submission(
    pipeline: &FeaturePipeline,
    predictor: &PricePredictor,
    submission: &RawSubmission,
) -> PricingReport {
    let powertrain = submission.powertrain();
    let submission_id = match pipeline.database().save_submission(submission) {
        Ok(id) => id,
        Err(e) => {
            warn!("Could not save {} submission: {}", powertrain, e);
            return PricingReport {
                submission_id: None,
                row_id: None,
                price: None,
                error: Some(format!("Submission failed: {e}")),
            };
        }
    };

    let outcome = match pipeline.process_submission(powertrain, submission_id) {
        ProcessOutcome::Processed { row_id, .. } => predictor.predict_row(powertrain, row_id),
        ProcessOutcome::NoInput => PredictionOutcome::NoProcessedData,
        ProcessOutcome::Failed(reason) => PredictionOutcome::Failed(reason),
    };
    let (price, row_id, error) = outcome.into_parts();
    PricingReport {
        submission_id: Some(submission_id),
        row_id,
        price,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::engineering::tests::{bmw_submission, ev_submission};
    use crate::features::schema::{ELECTRIC_COLUMNS, NON_ELECTRIC_COLUMNS};
    use crate::models::FeatureValue;
    use crate::predictor::contract::{FeatureContract, ModelValue};
    use crate::predictor::price::tests::constant_predictor;
    use tempfile::TempDir;

    fn open() -> (TempDir, FeaturePipeline) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("cars.db")).unwrap();
        db.init_schema().unwrap();
        (dir, FeaturePipeline::new(db, 2025))
    }

    #[test]
    fn test_rows_match_table_schemas_exactly() {
        assert_eq!(engineer_row(&bmw_submission(), 2025).column_names(), NON_ELECTRIC_COLUMNS);
        assert_eq!(engineer_row(&ev_submission(), 2025).column_names(), ELECTRIC_COLUMNS);
    }

    #[test]
    fn test_engineer_row_is_deterministic() {
        assert_eq!(
            engineer_row(&bmw_submission(), 2025),
            engineer_row(&bmw_submission(), 2025)
        );
    }

    #[test]
    fn test_luxury_suv_scenario() {
        let row = engineer_row(&bmw_submission(), 2025);
        assert_eq!(row.get("is_luxury"), Some(&FeatureValue::Int(1)));
        assert_eq!(row.get("body_condition_encoded"), Some(&FeatureValue::Int(4)));
        assert_eq!(row.get("paint_condition_encoded"), Some(&FeatureValue::Int(3)));
        assert_eq!(row.get("maintenance_score"), Some(&FeatureValue::Int(7)));
        assert_eq!(row.get("size_class"), Some(&FeatureValue::Text("large".into())));
        assert!(!row.contains("excellent_maintenance"));

        let contract = FeatureContract::for_powertrain(Powertrain::NonElectric);
        let input = contract.prepare(&row, 2025);
        let idx = contract.index_of("excellent_maintenance").unwrap();
        assert_eq!(input.get(idx), Some(&ModelValue::Number(Some(1.0))));
    }

    #[test]
    fn test_empty_options_scenario() {
        let row = engineer_row(&ev_submission(), 2025);
        for column in [
            "Interior_Options_Count",
            "Exterior_Options_Count",
            "Technology_Options_Count",
            "Total_Options_Count",
            "interior_airbags",
            "technology_navigation_system_/_maps",
            "has_advanced_tech",
        ] {
            assert_eq!(row.get(column), Some(&FeatureValue::Int(0)), "{column}");
        }
        assert_eq!(row.get("Total_Options_Count_cuberoot"), Some(&FeatureValue::Real(0.0)));
        assert_eq!(row.get("Battery Capacity"), Some(&FeatureValue::Null));
    }

    #[test]
    fn test_no_input() {
        let (_dir, pipeline) = open();
        assert_eq!(pipeline.process(None), ProcessOutcome::NoInput);
        assert_eq!(pipeline.process_latest(true), ProcessOutcome::NoInput);
        assert_eq!(
            pipeline.process_submission(Powertrain::NonElectric, 5),
            ProcessOutcome::NoInput
        );
    }

    #[test]
    fn test_rows_land_in_one_table_only() {
        let (_dir, pipeline) = open();
        let db = pipeline.database();
        db.save_submission(&bmw_submission()).unwrap();
        db.save_submission(&ev_submission()).unwrap();

        assert!(pipeline.process_latest(false).is_processed());
        let stats = db.stats().unwrap();
        assert_eq!(stats.non_electric.engineered, 1);
        assert_eq!(stats.electric.engineered, 0);

        assert!(pipeline.process_latest(true).is_processed());
        let stats = db.stats().unwrap();
        assert_eq!(stats.non_electric.engineered, 1);
        assert_eq!(stats.electric.engineered, 1);
    }

    #[test]
    fn test_rederivation_is_idempotent() {
        let (_dir, pipeline) = open();
        let id = pipeline.database().save_submission(&bmw_submission()).unwrap();
        let first = pipeline.process_submission(Powertrain::NonElectric, id);
        let second = pipeline.process_submission(Powertrain::NonElectric, id);
        let (
            ProcessOutcome::Processed { row_id: a, submission_id: Some(sa) },
            ProcessOutcome::Processed { row_id: b, submission_id: Some(sb) },
        ) = (first, second)
        else {
            panic!("both runs should process");
        };
        assert_eq!((sa, sb), (id, id));

        let db = pipeline.database();
        let a = db.features(Powertrain::NonElectric, a).unwrap().unwrap();
        let b = db.features(Powertrain::NonElectric, b).unwrap().unwrap();
        assert_eq!(a.row, b.row);
    }

    #[test]
    fn test_processing_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("bare.db")).unwrap();
        let pipeline = FeaturePipeline::new(db, 2025);
        match pipeline.process(Some(&bmw_submission())) {
            ProcessOutcome::Failed(reason) => assert!(reason.starts_with("Processing failed")),
            other => panic!("unexpected outcome {other:?}"),
        }

        let mut mismatched = ev_submission();
        mismatched.fuel_type = Some("Diesel".into());
        assert!(matches!(
            pipeline.process(Some(&mismatched)),
            ProcessOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_batch_preserves_order() {
        let mut kia = bmw_submission();
        kia.make = Some("Kia".into());
        let batch = vec![bmw_submission(), ev_submission(), kia];
        let rows = engineer_batch(&batch, 2025, 4);
        assert_eq!(rows.len(), 3);
        for (raw, row) in batch.iter().zip(&rows) {
            assert_eq!(row, &engineer_row(raw, 2025));
        }
        assert!(engineer_batch(&[], 2025, 4).is_empty());
    }

    #[test]
    fn test_price_submission_threads_ids() {
        let (_dir, pipeline) = open();
        // An unrelated, newer-looking row must not be picked up.
        pipeline
            .database()
            .insert_features(&engineer_row(&bmw_submission(), 2025), None)
            .unwrap();
        let predictor = constant_predictor(pipeline.database().clone(), 10.0);

        let mut submission = bmw_submission();
        submission.id = None;
        let report = price_submission(&pipeline, &predictor, &submission);
        assert_eq!(report.error, None);
        let submission_id = report.submission_id.unwrap();
        let row_id = report.row_id.unwrap();
        assert!((report.price.unwrap() - 10f64.exp()).abs() < 1e-6);

        let db = pipeline.database();
        let stored = db
            .features_for_submission(Powertrain::NonElectric, submission_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.row_id, row_id);
        let log = db.predictions(Powertrain::NonElectric, 1).unwrap();
        assert_eq!(log[0].car_id, row_id);
    }

    #[test]
    fn test_price_submission_rejects_invalid() {
        let (_dir, pipeline) = open();
        let predictor = constant_predictor(pipeline.database().clone(), 10.0);
        let mut submission = bmw_submission();
        submission.fuel_type = Some("Electric".into());
        let report = price_submission(&pipeline, &predictor, &submission);
        assert_eq!(report.submission_id, None);
        assert!(report.error.unwrap().starts_with("Submission failed"));
    }
}
