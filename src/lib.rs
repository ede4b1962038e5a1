//! Balance and settlement engine for groups that share expenses.
//!
//! Members of a group log expenses, [`split`] turns each one into exact
//! per-member shares, [`balance`] folds them into a pairwise obligation
//! matrix and [`exchange`] reduces that matrix to the fewest transfers that
//! settle everyone. [`service::LedgerService`] wires this to a
//! [`store::LedgerStore`] and [`routes`] exposes it over HTTP.
pub mod balance;
pub mod error;
pub mod exchange;
pub mod money;
pub mod routes;
pub mod schemas;
pub mod service;
pub mod settings;
pub mod split;
pub mod store;
pub mod summary;

pub use error::{LedgerError, ResultLedger};
pub use money::Amount;
