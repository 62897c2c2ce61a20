//! Customer ledger arithmetic (balance impact and credit-limit checks).
//!
//! Everything here is a pure, synchronous computation over in-memory
//! snapshots. The CREDIT/DEBIT sign inversion happens in exactly one place,
//! [`balance::apply_balance_change`]; nothing else in the workspace is
//! allowed to flip a sign based on balance type.

pub mod balance;
pub mod credit;

pub use balance::{apply_balance_change, balance_change, invoice_balance_impact};
pub use credit::{CreditCheck, would_exceed_credit_limit};
