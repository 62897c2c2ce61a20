//! Speculative credit-limit evaluation.

use serde::{Deserialize, Serialize};

use khata_core::Money;
use khata_customers::Customer;
use khata_invoicing::Invoice;

use crate::balance::balance_change;

/// Outcome of a credit-limit check. Read-only; nothing is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCheck {
    pub exceeds: bool,
    pub current_balance: Money,
    pub projected_balance: Money,
}

/// Would applying this invoice change push the customer past their limit?
///
/// Safe to call while an invoice is still being edited, before anything is
/// saved. The policy only applies to CREDIT customers with a positive
/// configured limit; everyone else short-circuits to "no".
///
/// Reuses [`balance_change`] instead of re-deriving the delta, so the check
/// and the eventually committed balance use identical arithmetic. The
/// projection adds the raw change without sign adjustment:
/// this path only runs for CREDIT customers, where raw and type-adjusted
/// changes coincide.
pub fn would_exceed_credit_limit(
    customer: &Customer,
    invoice: &Invoice,
    previous_invoice: Option<&Invoice>,
) -> CreditCheck {
    let current_balance = customer.current_balance();

    if !customer.credit_limit_enforced() {
        return CreditCheck {
            exceeds: false,
            current_balance,
            projected_balance: current_balance,
        };
    }

    let raw_change = balance_change(previous_invoice, invoice);
    let projected_balance = current_balance + raw_change;

    CreditCheck {
        exceeds: projected_balance > customer.credit_limit(),
        current_balance,
        projected_balance,
    }
}
