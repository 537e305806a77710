pub mod contract;
pub mod ensemble;
pub mod price;

pub use price::PricePredictor;
