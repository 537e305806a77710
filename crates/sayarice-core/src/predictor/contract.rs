//! The ordered feature lists each trained model expects, and the conversion
//! of a stored feature row into a model input.

use serde::Serialize;

use crate::features::catalog::EXCELLENT_MAINTENANCE_MIN;
use crate::models::{FeatureRow, FeatureValue, Powertrain};

pub const NON_ELECTRIC_FEATURES: &[&str] = &[
    "Condition",
    "Car Make",
    "is_luxury",
    "Model",
    "Trim",
    "Year",
    "car_age",
    "car_age_sqrt",
    "Kilometers Numerical",
    "age_km_interaction",
    "Body Type",
    "Number of Seats",
    "Fuel",
    "Transmission",
    "Engine Size (cc)",
    "Engine Size (cc)_cuberoot",
    "Regional Specs",
    "Car License",
    "Insurance",
    "Car Customs",
    "Body Condition",
    "body_condition_encoded",
    "Paint",
    "paint_condition_encoded",
    "interior_steering_wheel_controls",
    "interior_airbags",
    "technology_cruise_control",
    "exterior_rear_sensors",
    "exterior_keyless_entry",
    "technology_tyre_pressure_monitoring",
    "exterior_front_sensors",
    "interior_electric_seat_control",
    "technology_traction_control",
    "technology_voice_control",
    "technology_blind_spot_alert",
    "technology_forward_collision_alert",
    "technology_lane_departure_alert",
    "technology_navigation_system_/_maps",
    "Interior_Options_Count",
    "Interior_Options_Count_cuberoot",
    "Exterior_Options_Count",
    "Exterior_Options_Count_cuberoot",
    "Technology_Options_Count",
    "Technology_Options_Count_cuberoot",
    "has_advanced_tech",
    "Total_Options_Count",
    "Total_Options_Count_cuberoot",
    "weighted_options",
    "maintenance_score",
    "excellent_maintenance",
    "size_class",
];

pub const ELECTRIC_FEATURES: &[&str] = &[
    "Condition",
    "Car Make",
    "is_luxury",
    "Model",
    "Trim",
    "Year",
    "car_age",
    "car_age_sqrt",
    "Kilometers Numerical",
    "age_km_interaction",
    "Body Type",
    "Number of Seats",
    "Regional Specs",
    "Car License",
    "Insurance",
    "Car Customs",
    "Body Condition",
    "body_condition_encoded",
    "Paint",
    "paint_condition_encoded",
    "interior_steering_wheel_controls",
    "interior_airbags",
    "technology_cruise_control",
    "exterior_rear_sensors",
    "exterior_keyless_entry",
    "technology_tyre_pressure_monitoring",
    "exterior_front_sensors",
    "interior_electric_seat_control",
    "technology_traction_control",
    "technology_voice_control",
    "technology_blind_spot_alert",
    "technology_forward_collision_alert",
    "technology_lane_departure_alert",
    "technology_navigation_system_/_maps",
    "Interior_Options_Count",
    "Interior_Options_Count_cuberoot",
    "Exterior_Options_Count",
    "Exterior_Options_Count_cuberoot",
    "Technology_Options_Count",
    "Technology_Options_Count_cuberoot",
    "has_advanced_tech",
    "Total_Options_Count",
    "Total_Options_Count_cuberoot",
    "weighted_options",
    "Battery Capacity",
    "Battery Range",
    "maintenance_score",
    "excellent_maintenance",
    "size_class",
];

pub const NON_ELECTRIC_CATEGORICAL: &[&str] = &[
    "Condition",
    "Car Make",
    "Model",
    "Trim",
    "Body Type",
    "Fuel",
    "Transmission",
    "Regional Specs",
    "Car License",
    "Insurance",
    "Car Customs",
    "Body Condition",
    "Paint",
    "size_class",
];

pub const ELECTRIC_CATEGORICAL: &[&str] = &[
    "Condition",
    "Car Make",
    "Model",
    "Trim",
    "Body Type",
    "Regional Specs",
    "Car License",
    "Insurance",
    "Car Customs",
    "Body Condition",
    "Paint",
    "size_class",
];

const CUBEROOT_SUFFIX: &str = "_cuberoot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

/// One model input cell. Numeric features may be missing; categorical ones
/// are always text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModelValue {
    Number(Option<f64>),
    Category(String),
}

/// A feature vector in contract order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInput {
    pub values: Vec<ModelValue>,
}

impl ModelInput {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ModelValue> {
        self.values.get(index)
    }
}

/// Ordered feature list plus categorical subset for one powertrain's model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureContract {
    pub powertrain: Powertrain,
    features: &'static [&'static str],
    categorical: &'static [&'static str],
}

impl FeatureContract {
    pub fn for_powertrain(powertrain: Powertrain) -> Self {
        let (features, categorical) = match powertrain {
            Powertrain::NonElectric => (NON_ELECTRIC_FEATURES, NON_ELECTRIC_CATEGORICAL),
            Powertrain::Electric => (ELECTRIC_FEATURES, ELECTRIC_CATEGORICAL),
        };
        Self {
            powertrain,
            features,
            categorical,
        }
    }

    pub fn features(&self) -> &'static [&'static str] {
        self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn index_of(&self, feature: &str) -> Option<usize> {
        self.features.iter().position(|f| *f == feature)
    }

    pub fn kind(&self, feature: &str) -> FeatureKind {
        if self.categorical.contains(&feature) {
            FeatureKind::Categorical
        } else {
            FeatureKind::Numeric
        }
    }

    /// Fill in every contract feature the row lacks. Columns already present
    /// are never touched, so applying this twice changes nothing. Fallbacks
    /// read the row as fetched, never a column synthesized in this pass.
    pub fn synthesize(&self, row: &mut FeatureRow, reference_year: i32) {
        let fetched = row.clone();
        for feature in self.features {
            if fetched.contains(feature) {
                continue;
            }
            row.insert(*feature, fallback_value(&fetched, feature, reference_year));
        }
    }

    /// Synthesize, select in contract order, and coerce each cell to its kind.
    pub fn prepare(&self, row: &FeatureRow, reference_year: i32) -> ModelInput {
        let mut completed = row.clone();
        self.synthesize(&mut completed, reference_year);
        let values = self
            .features
            .iter()
            .map(|feature| {
                let cell = completed.get(feature).unwrap_or(&FeatureValue::Null);
                match self.kind(feature) {
                    FeatureKind::Categorical => ModelValue::Category(cell.to_category()),
                    FeatureKind::Numeric => ModelValue::Number(numeric(cell)),
                }
            })
            .collect();
        ModelInput { values }
    }
}

/// Numeric reading of a cell. Numbers stored as text are parsed; anything
/// else is missing.
fn numeric(cell: &FeatureValue) -> Option<f64> {
    match cell {
        FeatureValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        other => other.as_f64(),
    }
}

fn fallback_value(row: &FeatureRow, feature: &str, reference_year: i32) -> FeatureValue {
    match feature {
        "car_age" => FeatureValue::real(
            row.get("Year")
                .and_then(numeric)
                .map(|year| f64::from(reference_year) - year),
        ),
        "excellent_maintenance" => FeatureValue::flag(
            row.get("maintenance_score")
                .and_then(numeric)
                .is_some_and(|score| score >= EXCELLENT_MAINTENANCE_MIN),
        ),
        _ => match feature.strip_suffix(CUBEROOT_SUFFIX).and_then(|base| row.get(base)) {
            Some(base) => FeatureValue::real(numeric(base).map(f64::cbrt)),
            None => FeatureValue::Int(0),
        },
    }
}
