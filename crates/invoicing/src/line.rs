use serde::{Deserialize, Serialize};
use uuid::Uuid;

use khata_core::{DomainError, DomainResult, Entity, Money, TaxRate, ValueObject};

/// Line item identifier, unique within an invoice.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(Uuid);

impl LineItemId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LineItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for LineItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A named per-unit surcharge on a line item.
///
/// Jewelry sales carry these routinely: making charges, wastage,
/// hallmarking fees. The amount applies once per unit of quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraCharge {
    pub name: String,
    pub amount: Money,
}

impl ValueObject for ExtraCharge {}

/// One line of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: LineItemId,
    pub description: String,
    /// Price per unit.
    pub unit_price: Money,
    pub quantity: u32,
    pub tax_rate: TaxRate,
    pub extra_charges: Vec<ExtraCharge>,
}

impl LineItem {
    /// Whether two items price identically per unit.
    ///
    /// This is the merge identity used when adding an item to an invoice:
    /// same description, unit price, tax rate, and extra charges means the
    /// incoming item folds into the existing row as added quantity instead of
    /// appearing as a duplicate line.
    pub fn same_pricing_basis(&self, other: &LineItem) -> bool {
        self.description == other.description
            && self.unit_price == other.unit_price
            && self.tax_rate == other.tax_rate
            && self.extra_charges == other.extra_charges
    }

    /// Subtotal for this line: unit price times quantity, before tax and
    /// extra charges.
    pub fn subtotal(&self) -> DomainResult<Money> {
        self.unit_price
            .checked_mul_quantity(i64::from(self.quantity))
            .ok_or_else(|| DomainError::invariant("line subtotal overflow"))
    }

    /// Tax on this line, computed on the subtotal.
    pub fn tax_amount(&self) -> DomainResult<Money> {
        Ok(self.subtotal()?.tax(self.tax_rate))
    }

    /// Sum of extra charges for this line (each charge applies per unit).
    pub fn extra_charges_total(&self) -> DomainResult<Money> {
        let mut total = Money::zero();
        for charge in &self.extra_charges {
            let charge_total = charge
                .amount
                .checked_mul_quantity(i64::from(self.quantity))
                .ok_or_else(|| DomainError::invariant("extra charge overflow"))?;
            total = total
                .checked_add(charge_total)
                .ok_or_else(|| DomainError::invariant("extra charge overflow"))?;
        }
        Ok(total)
    }

    /// Full line total: subtotal + tax + extra charges.
    pub fn line_total(&self) -> DomainResult<Money> {
        let subtotal = self.subtotal()?;
        let with_tax = subtotal
            .checked_add(self.tax_amount()?)
            .ok_or_else(|| DomainError::invariant("line total overflow"))?;
        with_tax
            .checked_add(self.extra_charges_total()?)
            .ok_or_else(|| DomainError::invariant("line total overflow"))
    }

    pub(crate) fn validate(&self) -> DomainResult<()> {
        if self.description.trim().is_empty() {
            return Err(DomainError::validation(
                "line item description cannot be empty",
            ));
        }
        if self.quantity == 0 {
            return Err(DomainError::validation(
                "line item quantity must be positive",
            ));
        }
        if self.unit_price.is_negative() {
            return Err(DomainError::validation(
                "line item unit price cannot be negative",
            ));
        }
        for charge in &self.extra_charges {
            if charge.name.trim().is_empty() {
                return Err(DomainError::validation("extra charge name cannot be empty"));
            }
            if charge.amount.is_negative() {
                return Err(DomainError::validation(
                    "extra charge amount cannot be negative",
                ));
            }
        }
        Ok(())
    }
}

impl Entity for LineItem {
    type Id = LineItemId;

    fn id(&self) -> &Self::Id {
        &self.item_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold_ring(quantity: u32) -> LineItem {
        LineItem {
            item_id: LineItemId::new(),
            description: "22K Gold Ring".to_string(),
            unit_price: Money::from_paise(500_000),
            quantity,
            tax_rate: TaxRate::from_percent(3),
            extra_charges: vec![ExtraCharge {
                name: "Making charge".to_string(),
                amount: Money::from_paise(50_000),
            }],
        }
    }

    #[test]
    fn line_total_includes_tax_and_per_unit_extra_charges() {
        let item = gold_ring(2);

        // subtotal: 2 × ₹5000 = ₹10000
        assert_eq!(item.subtotal().unwrap(), Money::from_paise(1_000_000));
        // 3% GST on subtotal = ₹300
        assert_eq!(item.tax_amount().unwrap(), Money::from_paise(30_000));
        // making charge ₹500 per unit × 2
        assert_eq!(
            item.extra_charges_total().unwrap(),
            Money::from_paise(100_000)
        );
        assert_eq!(item.line_total().unwrap(), Money::from_paise(1_130_000));
    }

    #[test]
    fn same_pricing_basis_ignores_id_and_quantity() {
        let a = gold_ring(1);
        let mut b = gold_ring(5);
        assert!(a.same_pricing_basis(&b));

        b.unit_price = Money::from_paise(500_001);
        assert!(!a.same_pricing_basis(&b));
    }

    #[test]
    fn validate_rejects_zero_quantity_and_empty_description() {
        let mut item = gold_ring(0);
        assert!(item.validate().is_err());

        item.quantity = 1;
        item.description = "  ".to_string();
        assert!(item.validate().is_err());
    }
}
