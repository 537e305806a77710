//! Error types for the Sayarice core library.

#[cfg(feature = "python")]
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;

/// Top-level error enum for the Sayarice core library.
#[derive(Debug, thiserror::Error)]
pub enum SayariceError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(feature = "python")]
impl From<SayariceError> for PyErr {
    fn from(err: SayariceError) -> PyErr {
        match &err {
            SayariceError::Sqlite(_) => {
                PyRuntimeError::new_err(err.to_string())
            }
            SayariceError::Model(_) => PyRuntimeError::new_err(err.to_string()),
            SayariceError::Validation(_) => PyValueError::new_err(err.to_string()),
            SayariceError::Config(_) => PyValueError::new_err(err.to_string()),
            SayariceError::Io(_) => PyIOError::new_err(err.to_string()),
            SayariceError::Json(_) => PyValueError::new_err(err.to_string()),
        }
    }
}

pub type SayariceResult<T> = Result<T, SayariceError>;
