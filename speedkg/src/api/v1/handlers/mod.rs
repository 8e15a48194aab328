pub(crate) mod health;
pub mod query;

pub use health::health_check;
