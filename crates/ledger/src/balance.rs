//! Signed balance deltas from invoice state.
//!
//! The quantity that drives a customer's running balance is an invoice's
//! unpaid amount, `total − paid`, never the total alone: a fully paid
//! invoice contributes nothing no matter how large it was.

use khata_core::Money;
use khata_customers::{BalanceType, Customer};
use khata_invoicing::Invoice;

/// How much this invoice currently contributes to what the customer owes.
///
/// Balance-type-agnostic; sign adjustment happens only in
/// [`apply_balance_change`]. A negative result (overpayment) passes through
/// unmodified, which stays arithmetically correct even though overpayment is
/// rejected
/// upstream by the invoice aggregate.
pub fn invoice_balance_impact(invoice: &Invoice) -> Money {
    invoice.unpaid_amount()
}

/// Raw balance delta between two states of an invoice.
///
/// `old == None` means a brand-new invoice with no prior contribution.
/// Deltas compose: `balance_change(a, c) == balance_change(a, b) +
/// balance_change(b, c)` for any intermediate state `b`, which is what makes
/// incremental reconciliation on repeated edits safe.
pub fn balance_change(old: Option<&Invoice>, new: &Invoice) -> Money {
    let old_impact = old.map(invoice_balance_impact).unwrap_or_else(Money::zero);
    invoice_balance_impact(new) - old_impact
}

/// Apply a raw delta to a customer's running balance.
///
/// The single place where the CREDIT/DEBIT convention is honored: CREDIT
/// customers accrue the raw change as-is, DEBIT customers accrue its
/// negation. Returns a new customer revision; the input is not mutated.
pub fn apply_balance_change(customer: &Customer, raw_change: Money) -> Customer {
    let final_change = match customer.balance_type() {
        BalanceType::Credit => raw_change,
        BalanceType::Debit => -raw_change,
    };
    customer.with_current_balance(customer.current_balance() + final_change)
}
