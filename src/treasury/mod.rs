pub mod reconciliation;

pub use reconciliation::{ReconcileReport, TaxReconciler};
