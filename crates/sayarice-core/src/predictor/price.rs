//! Price prediction over stored engineered rows.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::{SayariceError, SayariceResult};
use crate::models::{FeatureRow, Powertrain, Prediction, PredictionOutcome, StoredFeatureRow};
use crate::predictor::contract::FeatureContract;
use crate::predictor::ensemble::{LogPriceModel, TreeEnsemble};
use crate::store::database::Database;

/// Both powertrain models, loaded once. There is no reload: a predictor that
/// exists is ready.
pub struct PricePredictor {
    db: Database,
    reference_year: i32,
    non_electric: Box<dyn LogPriceModel>,
    electric: Box<dyn LogPriceModel>,
}

impl std::fmt::Debug for PricePredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricePredictor")
            .field("db", &self.db)
            .field("reference_year", &self.reference_year)
            .field("non_electric", &self.non_electric.fingerprint())
            .field("electric", &self.electric.fingerprint())
            .finish()
    }
}

impl PricePredictor {
    /// Load both artifacts. Fails if either is missing, unreadable, or does
    /// not fit its powertrain's feature list.
    pub fn new(
        db: Database,
        non_electric_model: impl AsRef<Path>,
        electric_model: impl AsRef<Path>,
        reference_year: i32,
    ) -> SayariceResult<Self> {
        let paths = [
            (Powertrain::NonElectric, non_electric_model.as_ref()),
            (Powertrain::Electric, electric_model.as_ref()),
        ];
        for (powertrain, path) in paths {
            if !path.is_file() {
                return Err(SayariceError::Model(format!(
                    "{} model not found at {}",
                    powertrain,
                    path.display()
                )));
            }
        }

        let non_electric = TreeEnsemble::load(
            paths[0].1,
            &FeatureContract::for_powertrain(Powertrain::NonElectric),
        )?;
        let electric = TreeEnsemble::load(
            paths[1].1,
            &FeatureContract::for_powertrain(Powertrain::Electric),
        )?;
        Ok(Self::with_models(
            db,
            Box::new(non_electric),
            Box::new(electric),
            reference_year,
        ))
    }

    /// Build from [`Settings`], making sure the store schema exists.
    pub fn from_settings(settings: &Settings) -> SayariceResult<Self> {
        let db = Database::new(&settings.db_path)?;
        db.init_schema()?;
        Self::new(
            db,
            &settings.non_electric_model_path,
            &settings.electric_model_path,
            settings.reference_year,
        )
    }

    /// Use already constructed models.
    pub fn with_models(
        db: Database,
        non_electric: Box<dyn LogPriceModel>,
        electric: Box<dyn LogPriceModel>,
        reference_year: i32,
    ) -> Self {
        Self {
            db,
            reference_year,
            non_electric,
            electric,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    fn model(&self, powertrain: Powertrain) -> &dyn LogPriceModel {
        match powertrain {
            Powertrain::NonElectric => self.non_electric.as_ref(),
            Powertrain::Electric => self.electric.as_ref(),
        }
    }

    /// Price a feature row without touching the store: `(price, log_price)`.
    pub fn estimate(&self, row: &FeatureRow) -> SayariceResult<(f64, f64)> {
        let contract = FeatureContract::for_powertrain(row.powertrain);
        let input = contract.prepare(row, self.reference_year);
        let log_price = self.model(row.powertrain).predict_log_price(&input)?;
        let price = log_price.exp();
        if !price.is_finite() {
            return Err(SayariceError::Model(format!(
                "model output {log_price} does not map to a finite price"
            )));
        }
        Ok((price, log_price))
    }

    /// Price the most recently engineered row of the given powertrain.
    pub fn predict(&self, is_electric: bool) -> PredictionOutcome {
        self.predict_latest(Powertrain::from_is_electric(is_electric))
    }

    pub fn predict_latest(&self, powertrain: Powertrain) -> PredictionOutcome {
        self.outcome(powertrain, self.db.latest_features(powertrain))
    }

    /// Price an explicit engineered row.
    pub fn predict_row(&self, powertrain: Powertrain, row_id: i64) -> PredictionOutcome {
        self.outcome(powertrain, self.db.features(powertrain, row_id))
    }

    fn outcome(
        &self,
        powertrain: Powertrain,
        fetched: SayariceResult<Option<StoredFeatureRow>>,
    ) -> PredictionOutcome {
        match fetched.and_then(|stored| self.price_and_log(powertrain, stored)) {
            Ok(Some(prediction)) => PredictionOutcome::Priced(prediction),
            Ok(None) => {
                debug!("No engineered {} row to price", powertrain);
                PredictionOutcome::NoProcessedData
            }
            Err(e) => {
                warn!("{} prediction failed: {}", powertrain, e);
                PredictionOutcome::Failed(format!("Prediction failed: {e}"))
            }
        }
    }

    fn price_and_log(
        &self,
        powertrain: Powertrain,
        stored: Option<StoredFeatureRow>,
    ) -> SayariceResult<Option<Prediction>> {
        let Some(stored) = stored else {
            return Ok(None);
        };
        let (price, log_price) = self.estimate(&stored.row)?;
        let prediction_id = self.db.log_prediction(
            powertrain,
            stored.row_id,
            price,
            self.model(powertrain).fingerprint(),
        )?;
        info!(
            "Priced {} row {} at {:.2} (prediction id={})",
            powertrain, stored.row_id, price, prediction_id
        );
        Ok(Some(Prediction {
            price,
            log_price,
            row_id: stored.row_id,
            prediction_id,
        }))
    }
}
