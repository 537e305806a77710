//! Feature engineering: lookup tables, derivations, and table schemas.

pub mod catalog;
pub mod engineering;
pub mod schema;
