//! Environment-driven settings for the pricing core.
//!
//! Every knob has a default so an unconfigured process still runs against
//! `Cars_DB.db` and the `models/` directory next to the working directory.

use std::path::PathBuf;

use crate::errors::{SayariceError, SayariceResult};

/// Year the training data was frozen at. `car_age` is measured against it.
pub const DEFAULT_REFERENCE_YEAR: i32 = 2025;

pub const DEFAULT_DB_PATH: &str = "Cars_DB.db";
pub const DEFAULT_MODEL_DIR: &str = "models";
pub const NON_ELECTRIC_MODEL_FILE: &str = "non_electric.json";
pub const ELECTRIC_MODEL_FILE: &str = "electric.json";

pub const ENV_DB_PATH: &str = "SAYARICE_DB_PATH";
pub const ENV_MODEL_DIR: &str = "SAYARICE_MODEL_DIR";
pub const ENV_NON_ELECTRIC_MODEL: &str = "SAYARICE_NON_ELECTRIC_MODEL";
pub const ENV_ELECTRIC_MODEL: &str = "SAYARICE_ELECTRIC_MODEL";
pub const ENV_REFERENCE_YEAR: &str = "SAYARICE_REFERENCE_YEAR";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub non_electric_model_path: PathBuf,
    pub electric_model_path: PathBuf,
    pub reference_year: i32,
}

impl Default for Settings {
    fn default() -> Self {
        let model_dir = PathBuf::from(DEFAULT_MODEL_DIR);
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            non_electric_model_path: model_dir.join(NON_ELECTRIC_MODEL_FILE),
            electric_model_path: model_dir.join(ELECTRIC_MODEL_FILE),
            reference_year: DEFAULT_REFERENCE_YEAR,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> SayariceResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> SayariceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let model_dir = PathBuf::from(get(ENV_MODEL_DIR).unwrap_or_else(|| DEFAULT_MODEL_DIR.into()));
        let non_electric_model_path = get(ENV_NON_ELECTRIC_MODEL)
            .map(PathBuf::from)
            .unwrap_or_else(|| model_dir.join(NON_ELECTRIC_MODEL_FILE));
        let electric_model_path = get(ENV_ELECTRIC_MODEL)
            .map(PathBuf::from)
            .unwrap_or_else(|| model_dir.join(ELECTRIC_MODEL_FILE));

        let reference_year = match get(ENV_REFERENCE_YEAR) {
            None => DEFAULT_REFERENCE_YEAR,
            Some(raw) => raw.parse::<i32>().map_err(|_| {
                SayariceError::Config(format!("{ENV_REFERENCE_YEAR} must be an integer year, got {raw:?}"))
            })?,
        };

        Ok(Self {
            db_path: PathBuf::from(get(ENV_DB_PATH).unwrap_or_else(|| DEFAULT_DB_PATH.into())),
            non_electric_model_path,
            electric_model_path,
            reference_year,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.reference_year, 2025);
        assert_eq!(settings.electric_model_path, PathBuf::from("models/electric.json"));
    }

    #[test]
    fn test_model_dir_and_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            (ENV_MODEL_DIR, "/srv/models"),
            (ENV_ELECTRIC_MODEL, "/tmp/ev.json"),
            (ENV_DB_PATH, "/var/lib/sayarice/cars.db"),
        ]))
        .unwrap();
        assert_eq!(
            settings.non_electric_model_path,
            PathBuf::from("/srv/models/non_electric.json")
        );
        assert_eq!(settings.electric_model_path, PathBuf::from("/tmp/ev.json"));
        assert_eq!(settings.db_path, PathBuf::from("/var/lib/sayarice/cars.db"));
    }

    #[test]
    fn test_reference_year_parsing() {
        let settings =
            Settings::from_lookup(lookup_from(&[(ENV_REFERENCE_YEAR, " 2024 ")])).unwrap();
        assert_eq!(settings.reference_year, 2024);

        let err = Settings::from_lookup(lookup_from(&[(ENV_REFERENCE_YEAR, "next year")]))
            .unwrap_err();
        assert!(matches!(err, SayariceError::Config(_)));
    }

    #[test]
    fn test_blank_values_fall_back() {
        let settings = Settings::from_lookup(lookup_from(&[(ENV_DB_PATH, "   ")])).unwrap();
        assert_eq!(settings.db_path, PathBuf::from(DEFAULT_DB_PATH));
    }
}
