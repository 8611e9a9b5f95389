pub mod engine;
pub mod hook;
pub mod pass;
pub mod scheduler;

pub use engine::{CardOutcome, ClaimEngine, TaxOutcome};
pub use hook::PassHook;
pub use pass::{PassProcessor, PassSummary};
pub use scheduler::{ClaimWorker, TriggerOutcome, WorkerStatus};

#[cfg(test)]
pub use hook::MockPassHook;
