//! Engineered feature table schemas and the projection onto them.
//!
//! Column names are matched verbatim, spaces and slashes included.

use indexmap::IndexMap;

use crate::models::{FeatureRow, FeatureValue, Powertrain};

/// Engineered field → stored column, for every field whose stored name
/// differs from the field name. Unlisted fields keep their name.
pub const COLUMN_MAPPING: &[(&str, &str)] = &[
    ("condition", "Condition"),
    ("make", "Car Make"),
    ("model", "Model"),
    ("trim", "Trim"),
    ("year", "Year"),
    ("kilometers", "Kilometers Numerical"),
    ("body_type", "Body Type"),
    ("seats", "Number of Seats"),
    ("fuel_type", "Fuel"),
    ("transmission", "Transmission"),
    ("engine_size", "Engine Size (cc)"),
    ("regional_specs", "Regional Specs"),
    ("license", "Car License"),
    ("insurance", "Insurance"),
    ("car_customs", "Car Customs"),
    ("body_condition", "Body Condition"),
    ("paint", "Paint"),
    ("battery_capacity", "Battery Capacity"),
    ("battery_range", "Battery Range"),
];

/// Columns of `non_electric_cars_modeling`, in table order.
pub const NON_ELECTRIC_COLUMNS: &[&str] = &[
    "Condition",
    "Car Make",
    "is_luxury",
    "Model",
    "Trim",
    "Year",
    "car_age_sqrt",
    "Kilometers Numerical",
    "age_km_interaction",
    "Body Type",
    "Number of Seats",
    "Fuel",
    "Transmission",
    "Engine Size (cc)",
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
    "size_class",
];

/// Columns of `electric_cars_modeling`, in table order.
pub const ELECTRIC_COLUMNS: &[&str] = &[
    "Condition",
    "Car Make",
    "is_luxury",
    "Model",
    "Trim",
    "Year",
    "car_age_sqrt",
    "Kilometers Numerical",
    "age_km_interaction",
    "Body Type",
    "Number of Seats",
    "Fuel",
    "Transmission",
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
    "size_class",
];

pub fn target_columns(powertrain: Powertrain) -> &'static [&'static str] {
    match powertrain {
        Powertrain::NonElectric => NON_ELECTRIC_COLUMNS,
        Powertrain::Electric => ELECTRIC_COLUMNS,
    }
}

/// SQLite column type for an engineered column.
pub fn column_type(column: &str) -> &'static str {
    match column {
        "Condition" | "Car Make" | "Model" | "Trim" | "Body Type" | "Fuel" | "Transmission"
        | "Regional Specs" | "Car License" | "Insurance" | "Car Customs" | "Body Condition"
        | "Paint" | "size_class" => "TEXT",
        "car_age_sqrt"
        | "age_km_interaction"
        | "Engine Size (cc)"
        | "weighted_options"
        | "maintenance_score" => "REAL",
        c if c.ends_with("_cuberoot") => "REAL",
        _ => "INTEGER",
    }
}

pub fn column_for_field(field: &str) -> &str {
    COLUMN_MAPPING
        .iter()
        .find(|(f, _)| *f == field)
        .map_or(field, |(_, column)| *column)
}

/// Rename produced fields to their stored names, then select and order them
/// to exactly `target`. Missing columns become NULL; extra ones are dropped.
pub fn project<'a, I>(powertrain: Powertrain, produced: I, target: &[&str]) -> FeatureRow
where
    I: IntoIterator<Item = (&'a str, FeatureValue)>,
{
    let mut by_column: IndexMap<String, FeatureValue> = produced
        .into_iter()
        .map(|(field, value)| (column_for_field(field).to_string(), value))
        .collect();

    let mut row = FeatureRow::new(powertrain);
    for column in target {
        let value = by_column.swap_remove(*column).unwrap_or(FeatureValue::Null);
        row.insert(*column, value);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_schemas_share_all_but_powertrain_columns() {
        let non_electric: HashSet<&str> = NON_ELECTRIC_COLUMNS.iter().copied().collect();
        let electric: HashSet<&str> = ELECTRIC_COLUMNS.iter().copied().collect();
        let only_non_electric: Vec<&str> = non_electric.difference(&electric).copied().collect();
        let mut only_electric: Vec<&str> = electric.difference(&non_electric).copied().collect();
        only_electric.sort();
        assert_eq!(only_non_electric, vec!["Engine Size (cc)"]);
        assert_eq!(only_electric, vec!["Battery Capacity", "Battery Range"]);
        assert_eq!(non_electric.len(), NON_ELECTRIC_COLUMNS.len());
        assert_eq!(electric.len(), ELECTRIC_COLUMNS.len());
    }

    #[test]
    fn test_project_pads_drops_and_orders() {
        let produced = vec![
            ("size_class", FeatureValue::Text("small".into())),
            ("make", FeatureValue::Text("Kia".into())),
            ("car_age", FeatureValue::Real(3.0)),
            ("city", FeatureValue::Text("Irbid".into())),
        ];
        let target = ["Car Make", "Year", "size_class"];
        let row = project(Powertrain::NonElectric, produced, &target);
        assert_eq!(row.column_names(), vec!["Car Make", "Year", "size_class"]);
        assert_eq!(row.get("Car Make"), Some(&FeatureValue::Text("Kia".into())));
        assert_eq!(row.get("Year"), Some(&FeatureValue::Null));
        assert!(!row.contains("car_age"));
        assert!(!row.contains("city"));
    }

    #[test]
    fn test_column_types() {
        assert_eq!(column_type("Car Make"), "TEXT");
        assert_eq!(column_type("Total_Options_Count_cuberoot"), "REAL");
        assert_eq!(column_type("technology_navigation_system_/_maps"), "INTEGER");
        assert_eq!(column_type("Battery Range"), "INTEGER");
    }

    #[test]
    fn test_mapping_targets_exist() {
        for (_, column) in COLUMN_MAPPING {
            assert!(
                NON_ELECTRIC_COLUMNS.contains(column) || ELECTRIC_COLUMNS.contains(column),
                "{column} is mapped but belongs to no table"
            );
        }
    }
}
