//! Customers domain module (khata ledger parties, event-driven).
//!
//! This crate contains business rules for customer accounts (contact
//! details, balance-type convention, credit limits), implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).
//!
//! The running balance itself is never command-driven: it is mutated
//! exclusively through the reconciliation flow in `khata-ledger`.

pub mod customer;

pub use customer::{
    BalanceType, ChangeCreditLimit, ContactInfo, CreditLimitChanged, Customer, CustomerCommand,
    CustomerEvent, CustomerId, CustomerRegistered, CustomerUpdated, RegisterCustomer,
    UpdateDetails,
};
