//! Raw submission → engineered features.
//!
//! Every function here is total: bad or missing raw values turn into `None`
//! (stored as NULL) rather than errors.

use serde::Serialize;

use crate::features::catalog::{
    self, OptionList, ADVANCED_TECH_THRESHOLD, LARGE_BODY_TYPES, LARGE_SEAT_THRESHOLD,
    MEDIUM_BODY_TYPES, OPTION_FLAGS, OPTION_WEIGHTS,
};
use crate::models::{FeatureValue, PowertrainSpec, RawSubmission, RawValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Large,
    Medium,
    Small,
}

impl SizeClass {
    pub fn as_str(self) -> &'static str {
        match self {
            SizeClass::Large => "large",
            SizeClass::Medium => "medium",
            SizeClass::Small => "small",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OptionCounts {
    pub interior: i64,
    pub exterior: i64,
    pub technology: i64,
}

impl OptionCounts {
    pub fn total(&self) -> i64 {
        self.interior + self.exterior + self.technology
    }
}

/// Powertrain-specific numeric fields after coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PowertrainFeatures {
    NonElectric {
        engine_size: Option<f64>,
    },
    Electric {
        battery_range: Option<f64>,
        battery_capacity: Option<f64>,
    },
}

/// Typed intermediate between a raw submission and a projected feature row.
/// Identifier, location, and administrative fields never make it in here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineeredFeatures {
    pub condition: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub body_type: Option<String>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub regional_specs: Option<String>,
    pub license: Option<String>,
    pub insurance: Option<String>,
    pub car_customs: Option<String>,
    pub body_condition: Option<String>,
    pub paint: Option<String>,

    pub year: Option<f64>,
    pub kilometers: Option<f64>,
    pub seats: Option<f64>,

    pub is_luxury: bool,
    pub car_age: Option<f64>,
    pub car_age_sqrt: Option<f64>,
    pub age_km_interaction: Option<f64>,
    pub counts: OptionCounts,
    /// One entry per [`OPTION_FLAGS`] row, same order.
    pub option_flags: Vec<(&'static str, bool)>,
    pub body_condition_encoded: i64,
    pub paint_condition_encoded: i64,
    pub maintenance_score: i64,
    pub has_advanced_tech: bool,
    pub weighted_options: f64,
    pub size_class: SizeClass,
    pub powertrain: PowertrainFeatures,
}

// ---------------------------------------------------------------------------
// Step helpers
// ---------------------------------------------------------------------------

pub fn coerce(value: Option<&RawValue>) -> Option<f64> {
    value.and_then(RawValue::as_number)
}

/// Split a comma-joined option list into trimmed, non-empty entries.
pub fn split_options(list: Option<&str>) -> Vec<&str> {
    list.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

pub fn count_options(list: Option<&str>) -> i64 {
    split_options(list).len() as i64
}

/// Substring test on the raw list text, so `"Side Airbags"` also sets the
/// `Airbags` flag.
pub fn has_option(list: Option<&str>, option: &str) -> bool {
    list.unwrap_or("").contains(option)
}

pub fn size_class(body_type: Option<&str>, seats: Option<f64>) -> SizeClass {
    let body_type = body_type.unwrap_or("");
    if LARGE_BODY_TYPES.contains(&body_type) {
        SizeClass::Large
    } else if seats.is_some_and(|s| s > LARGE_SEAT_THRESHOLD) {
        SizeClass::Large
    } else if MEDIUM_BODY_TYPES.contains(&body_type) {
        SizeClass::Medium
    } else {
        SizeClass::Small
    }
}

pub fn cube_root(value: i64) -> f64 {
    (value as f64).cbrt()
}

// ---------------------------------------------------------------------------
// Engineering
// ---------------------------------------------------------------------------

/// Derive the full feature set for one submission.
pub fn engineer(raw: &RawSubmission, reference_year: i32) -> EngineeredFeatures {
    let year = coerce(raw.year.as_ref());
    let kilometers = coerce(raw.kilometers.as_ref());
    let seats = coerce(raw.seats.as_ref());

    let powertrain = match &raw.powertrain {
        PowertrainSpec::NonElectric { engine_size, .. } => PowertrainFeatures::NonElectric {
            engine_size: coerce(engine_size.as_ref()),
        },
        PowertrainSpec::Electric {
            battery_range,
            battery_capacity,
        } => PowertrainFeatures::Electric {
            battery_range: coerce(battery_range.as_ref()),
            battery_capacity: coerce(battery_capacity.as_ref()),
        },
    };

    let list_text = |list: OptionList| match list {
        OptionList::Interior => raw.interior_options.as_deref(),
        OptionList::Exterior => raw.exterior_options.as_deref(),
        OptionList::Technology => raw.tech_options.as_deref(),
    };

    let counts = OptionCounts {
        interior: count_options(list_text(OptionList::Interior)),
        exterior: count_options(list_text(OptionList::Exterior)),
        technology: count_options(list_text(OptionList::Technology)),
    };

    let option_flags: Vec<(&'static str, bool)> = OPTION_FLAGS
        .iter()
        .map(|f| (f.column, has_option(list_text(f.list), f.option)))
        .collect();

    let tech_set = catalog::technology_flags()
        .filter(|f| has_option(list_text(f.list), f.option))
        .count();

    let car_age = year.map(|y| f64::from(reference_year) - y);
    let car_age_sqrt = car_age.filter(|a| *a >= 0.0).map(f64::sqrt);
    let age_km_interaction = car_age.zip(kilometers).map(|(a, km)| a * km);

    let body_condition_encoded = catalog::body_condition_level(raw.body_condition.as_deref());
    let paint_condition_encoded = catalog::paint_level(raw.paint.as_deref());

    let (w_tech, w_ext, w_int) = OPTION_WEIGHTS;
    let weighted_options = w_tech * counts.technology as f64
        + w_ext * counts.exterior as f64
        + w_int * counts.interior as f64;

    EngineeredFeatures {
        condition: raw.condition.clone(),
        make: raw.make.clone(),
        model: raw.model.clone(),
        trim: raw.trim.clone(),
        body_type: raw.body_type.clone(),
        fuel_type: raw.fuel_type.clone(),
        transmission: raw.transmission.clone(),
        regional_specs: raw.regional_specs.clone(),
        license: raw.license.clone(),
        insurance: raw.insurance.clone(),
        car_customs: raw.car_customs.clone(),
        body_condition: raw.body_condition.clone(),
        paint: raw.paint.clone(),
        year,
        kilometers,
        seats,
        is_luxury: raw.make.as_deref().is_some_and(catalog::is_premium_brand),
        car_age,
        car_age_sqrt,
        age_km_interaction,
        counts,
        option_flags,
        body_condition_encoded,
        paint_condition_encoded,
        maintenance_score: body_condition_encoded + paint_condition_encoded,
        has_advanced_tech: tech_set > ADVANCED_TECH_THRESHOLD,
        weighted_options,
        size_class: size_class(raw.body_type.as_deref(), seats),
        powertrain,
    }
}

impl EngineeredFeatures {
    /// Every produced value keyed by its engineered field name, including the
    /// transient ones the feature tables do not keep.
    pub fn field_values(&self) -> Vec<(&'static str, FeatureValue)> {
        let text = |v: &Option<String>| FeatureValue::text(v.as_deref());
        let mut out = vec![
            ("condition", text(&self.condition)),
            ("make", text(&self.make)),
            ("is_luxury", FeatureValue::flag(self.is_luxury)),
            ("model", text(&self.model)),
            ("trim", text(&self.trim)),
            ("year", FeatureValue::real(self.year)),
            ("car_age", FeatureValue::real(self.car_age)),
            ("car_age_sqrt", FeatureValue::real(self.car_age_sqrt)),
            ("kilometers", FeatureValue::real(self.kilometers)),
            ("age_km_interaction", FeatureValue::real(self.age_km_interaction)),
            ("body_type", text(&self.body_type)),
            ("seats", FeatureValue::real(self.seats)),
            ("fuel_type", text(&self.fuel_type)),
            ("transmission", text(&self.transmission)),
            ("regional_specs", text(&self.regional_specs)),
            ("license", text(&self.license)),
            ("insurance", text(&self.insurance)),
            ("car_customs", text(&self.car_customs)),
            ("body_condition", text(&self.body_condition)),
            ("body_condition_encoded", FeatureValue::Int(self.body_condition_encoded)),
            ("paint", text(&self.paint)),
            ("paint_condition_encoded", FeatureValue::Int(self.paint_condition_encoded)),
        ];

        out.extend(
            self.option_flags
                .iter()
                .map(|(column, set)| (*column, FeatureValue::flag(*set))),
        );

        let counts = [
            ("Interior_Options_Count", "Interior_Options_Count_cuberoot", self.counts.interior),
            ("Exterior_Options_Count", "Exterior_Options_Count_cuberoot", self.counts.exterior),
            ("Technology_Options_Count", "Technology_Options_Count_cuberoot", self.counts.technology),
            ("Total_Options_Count", "Total_Options_Count_cuberoot", self.counts.total()),
        ];
        for (column, cuberoot_column, count) in counts {
            out.push((column, FeatureValue::Int(count)));
            out.push((cuberoot_column, FeatureValue::Real(cube_root(count))));
        }

        out.push(("has_advanced_tech", FeatureValue::flag(self.has_advanced_tech)));
        out.push(("weighted_options", FeatureValue::Real(self.weighted_options)));

        match &self.powertrain {
            PowertrainFeatures::NonElectric { engine_size } => {
                out.push(("engine_size", FeatureValue::real(*engine_size)));
            }
            PowertrainFeatures::Electric {
                battery_range,
                battery_capacity,
            } => {
                out.push(("battery_capacity", FeatureValue::real(*battery_capacity)));
                out.push(("battery_range", FeatureValue::real(*battery_range)));
            }
        }

        out.push(("maintenance_score", FeatureValue::Int(self.maintenance_score)));
        out.push(("size_class", FeatureValue::Text(self.size_class.as_str().to_string())));
        out
    }
}
