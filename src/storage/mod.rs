pub mod models;
pub mod registry;

pub use models::{Card, LinkOutcome, RegistryStats, RemoveOutcome, TaxArrear};
pub use registry::CardRegistry;
