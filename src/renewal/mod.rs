//! The payment-to-renewal engine.

pub mod due_date;
pub mod duplicate;
pub mod event;
pub mod fanout;
pub mod ledger;
pub mod locks;
pub mod matcher;
pub mod orchestrator;
pub mod phone;
pub mod plan_inference;
pub mod provisioning;

pub use orchestrator::{ManualRenewal, Reconciliation, ReconciliationService, RenewalSummary};
