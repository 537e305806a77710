//! Sayarice core library: feature engineering and price prediction for
//! used-car listings.
//!
//! A submitted listing is stored raw, engineered into the fixed feature row
//! its powertrain's model was trained on, and priced by that model. With the
//! `python` feature the crate builds as the `_sayarice_core` extension module
//! used by the Streamlit pages.

pub mod config;
pub mod errors;
pub mod features;
pub mod models;
pub mod pipeline;
pub mod predictor;
pub mod store;

#[cfg(feature = "python")]
mod python;

#[cfg(feature = "python")]
use pyo3::prelude::*;

// ---------------------------------------------------------------------------
// Top-level Python module: _sayarice_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymodule]
fn _sayarice_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // -- Stages -------------------------------------------------------------
    m.add_class::<python::PyFeaturePipeline>()?;
    m.add_class::<python::PyPricePredictor>()?;

    // -- Functions ----------------------------------------------------------
    m.add_function(wrap_pyfunction!(python::engineer_features, m)?)?;
    m.add_function(wrap_pyfunction!(python::price_submission, m)?)?;
    m.add_function(wrap_pyfunction!(python::init_store, m)?)?;

    // -- Constants ----------------------------------------------------------
    m.add("CATALOG_VERSION", features::catalog::CATALOG_VERSION)?;
    m.add("SCHEMA_VERSION", store::schema::SCHEMA_VERSION)?;
    m.add("DEFAULT_REFERENCE_YEAR", config::DEFAULT_REFERENCE_YEAR)?;
    m.add("NO_PROCESSED_DATA", models::NO_PROCESSED_DATA)?;

    Ok(())
}
