//! Lookup tables that make up the feature contract with the trained models.
//!
//! Bump [`CATALOG_VERSION`] whenever any table changes: rows engineered under
//! different catalogs are not comparable.

pub const CATALOG_VERSION: i64 = 1;

/// Makes flagged by `is_luxury`.
pub const PREMIUM_BRANDS: &[&str] = &[
    "Mercedes Benz",
    "BMW",
    "Lexus",
    "Audi",
    "Porsche",
    "Land Rover",
    "Cadillac",
];

/// Ordinal encoding of the "Body Condition" field. Unknown values encode to 0.
pub const BODY_CONDITION_LEVELS: &[(&str, i64)] = &[
    ("Excellent with no defects", 4),
    ("Good (body only has minor blemishes)", 3),
    ("Fair (body needs work)", 2),
    ("Poor (severe body damages)", 1),
    ("Other", 0),
];

/// Ordinal encoding of the "Paint" field. Unknown values encode to 0.
pub const PAINT_LEVELS: &[(&str, i64)] = &[
    ("Original Paint", 3),
    ("Partially repainted", 2),
    ("Total repaint", 1),
    ("Other", 0),
];

/// Which raw option list an option flag is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionList {
    Interior,
    Exterior,
    Technology,
}

/// A binary feature set when a named option appears in its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionFlag {
    pub column: &'static str,
    pub option: &'static str,
    pub list: OptionList,
}

const fn flag(column: &'static str, option: &'static str, list: OptionList) -> OptionFlag {
    OptionFlag {
        column,
        option,
        list,
    }
}

pub const OPTION_FLAGS: &[OptionFlag] = &[
    flag("interior_steering_wheel_controls", "Steering Wheel Controls", OptionList::Interior),
    flag("interior_airbags", "Airbags", OptionList::Interior),
    flag("interior_electric_seat_control", "Electric Seat Control", OptionList::Interior),
    flag("exterior_rear_sensors", "Rear Sensors", OptionList::Exterior),
    flag("exterior_keyless_entry", "Keyless Entry", OptionList::Exterior),
    flag("exterior_front_sensors", "Front Sensors", OptionList::Exterior),
    flag("technology_cruise_control", "Cruise Control", OptionList::Technology),
    flag("technology_tyre_pressure_monitoring", "Tyre Pressure Monitoring", OptionList::Technology),
    flag("technology_traction_control", "Traction Control", OptionList::Technology),
    flag("technology_voice_control", "Voice Control", OptionList::Technology),
    flag("technology_blind_spot_alert", "Blind Spot Alert", OptionList::Technology),
    flag("technology_forward_collision_alert", "Forward Collision Alert", OptionList::Technology),
    flag("technology_lane_departure_alert", "Lane Departure Alert", OptionList::Technology),
    flag("technology_navigation_system_/_maps", "Navigation system/maps", OptionList::Technology),
];

/// `has_advanced_tech` is set when more than this many technology flags are.
pub const ADVANCED_TECH_THRESHOLD: usize = 3;

/// Weights of (technology, exterior, interior) counts in `weighted_options`.
pub const OPTION_WEIGHTS: (f64, f64, f64) = (0.4, 0.3, 0.3);

/// Body types that are always `large`.
pub const LARGE_BODY_TYPES: &[&str] = &["SUV", "PickUp", "Bus_-_Van", "Bus/Van"];

/// Body types that are `medium` unless the seat count says otherwise.
pub const MEDIUM_BODY_TYPES: &[&str] = &["Sedan", "HatchBack"];

/// Seat counts above this make any body type `large`.
pub const LARGE_SEAT_THRESHOLD: f64 = 5.0;

/// `excellent_maintenance` threshold on `maintenance_score`.
pub const EXCELLENT_MAINTENANCE_MIN: f64 = 6.0;

pub fn is_premium_brand(make: &str) -> bool {
    PREMIUM_BRANDS.contains(&make)
}

pub fn body_condition_level(value: Option<&str>) -> i64 {
    lookup_level(BODY_CONDITION_LEVELS, value)
}

pub fn paint_level(value: Option<&str>) -> i64 {
    lookup_level(PAINT_LEVELS, value)
}

fn lookup_level(table: &[(&str, i64)], value: Option<&str>) -> i64 {
    value
        .and_then(|v| table.iter().find(|(label, _)| *label == v))
        .map_or(0, |(_, level)| *level)
}

pub fn technology_flags() -> impl Iterator<Item = &'static OptionFlag> {
    OPTION_FLAGS
        .iter()
        .filter(|f| f.list == OptionList::Technology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_flag_columns_unique() {
        let columns: HashSet<&str> = OPTION_FLAGS.iter().map(|f| f.column).collect();
        assert_eq!(columns.len(), OPTION_FLAGS.len());
    }

    #[test]
    fn test_eight_technology_flags() {
        assert_eq!(technology_flags().count(), 8);
    }

    #[test]
    fn test_levels() {
        assert_eq!(body_condition_level(Some("Excellent with no defects")), 4);
        assert_eq!(body_condition_level(Some("Poor (severe body damages)")), 1);
        assert_eq!(body_condition_level(Some("Mint")), 0);
        assert_eq!(body_condition_level(None), 0);
        assert_eq!(paint_level(Some("Original Paint")), 3);
        assert_eq!(paint_level(Some("Total repaint")), 1);
        assert_eq!(paint_level(Some("original paint")), 0);
    }

    #[test]
    fn test_premium_brand_exact_match() {
        assert!(is_premium_brand("BMW"));
        assert!(is_premium_brand("Land Rover"));
        assert!(!is_premium_brand("bmw"));
        assert!(!is_premium_brand("Kia"));
    }
}
