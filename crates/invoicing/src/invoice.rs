use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use khata_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, Money, ShopId};
use khata_customers::CustomerId;
use khata_events::Event;

use crate::line::{LineItem, LineItemId};
use crate::payment::{Payment, PaymentId};

/// Invoice identifier (shop-scoped via `shop_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Invoice.
///
/// `total_amount` is always derived from the item list and `paid_amount`
/// always equals the sum of recorded payments; both are recomputed inside
/// command handlers and carried on events so `apply` never re-derives them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    shop_id: Option<ShopId>,
    invoice_number: String,
    customer_id: Option<CustomerId>,
    /// Denormalized for display when the customer record is later deleted.
    customer_name: String,
    customer_phone: Option<String>,
    items: Vec<LineItem>,
    payments: Vec<Payment>,
    total_amount: Money,
    paid_amount: Money,
    notes: Option<String>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            shop_id: None,
            invoice_number: String::new(),
            customer_id: None,
            customer_name: String::new(),
            customer_phone: None,
            items: Vec::new(),
            payments: Vec::new(),
            total_amount: Money::zero(),
            paid_amount: Money::zero(),
            notes: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn shop_id(&self) -> Option<ShopId> {
        self.shop_id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn customer_phone(&self) -> Option<&str> {
        self.customer_phone.as_deref()
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn paid_amount(&self) -> Money {
        self.paid_amount
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// The quantity that drives balance and credit-limit arithmetic.
    pub fn unpaid_amount(&self) -> Money {
        self.total_amount - self.paid_amount
    }

    pub fn is_fully_paid(&self) -> bool {
        self.paid_amount >= self.total_amount
    }

    /// Recompute the invoice total from an item list.
    ///
    /// subtotal + tax + per-unit extra charges, all checked arithmetic.
    pub fn compute_total(items: &[LineItem]) -> DomainResult<Money> {
        let mut total = Money::zero();
        for item in items {
            total = total
                .checked_add(item.line_total()?)
                .ok_or_else(|| DomainError::invariant("invoice total overflow"))?;
        }
        Ok(total)
    }

    fn sum_payments(payments: &[Payment]) -> DomainResult<Money> {
        let mut total = Money::zero();
        for payment in payments {
            total = total
                .checked_add(payment.amount)
                .ok_or_else(|| DomainError::invariant("paid amount overflow"))?;
        }
        Ok(total)
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub items: Vec<LineItem>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLineItem {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub item: LineItem,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLineItem. Replaces the item with the given id wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLineItem {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub item: LineItem,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLineItem {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub item_id: LineItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPayment {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub payment: Payment,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemovePayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePayment {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateNotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNotes {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateInvoice(CreateInvoice),
    AddLineItem(AddLineItem),
    UpdateLineItem(UpdateLineItem),
    RemoveLineItem(RemoveLineItem),
    AddPayment(AddPayment),
    RemovePayment(RemovePayment),
    UpdateNotes(UpdateNotes),
}

impl InvoiceCommand {
    /// The invoice this command addresses.
    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            InvoiceCommand::CreateInvoice(cmd) => cmd.invoice_id,
            InvoiceCommand::AddLineItem(cmd) => cmd.invoice_id,
            InvoiceCommand::UpdateLineItem(cmd) => cmd.invoice_id,
            InvoiceCommand::RemoveLineItem(cmd) => cmd.invoice_id,
            InvoiceCommand::AddPayment(cmd) => cmd.invoice_id,
            InvoiceCommand::RemovePayment(cmd) => cmd.invoice_id,
            InvoiceCommand::UpdateNotes(cmd) => cmd.invoice_id,
        }
    }
}

impl khata_events::Command for InvoiceCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.invoice_id().0
    }
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub items: Vec<LineItem>,
    pub notes: Option<String>,
    pub total_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemAdded {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub item: LineItem,
    /// When the incoming item matched an existing row's pricing basis, the
    /// id of that row; its quantity grew instead of a new row appearing.
    pub merged_into: Option<LineItemId>,
    pub new_total_amount: Money,
    pub new_paid_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemUpdated {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub item: LineItem,
    pub new_total_amount: Money,
    pub new_paid_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRemoved {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub item_id: LineItemId,
    pub new_total_amount: Money,
    pub new_paid_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAdded {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub payment: Payment,
    pub new_paid_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRemoved {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub payment_id: PaymentId,
    pub new_paid_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: NotesUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesUpdated {
    pub shop_id: ShopId,
    pub invoice_id: InvoiceId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    LineItemAdded(LineItemAdded),
    LineItemUpdated(LineItemUpdated),
    LineItemRemoved(LineItemRemoved),
    PaymentAdded(PaymentAdded),
    PaymentRemoved(PaymentRemoved),
    NotesUpdated(NotesUpdated),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "invoicing.invoice.created",
            InvoiceEvent::LineItemAdded(_) => "invoicing.invoice.line_item_added",
            InvoiceEvent::LineItemUpdated(_) => "invoicing.invoice.line_item_updated",
            InvoiceEvent::LineItemRemoved(_) => "invoicing.invoice.line_item_removed",
            InvoiceEvent::PaymentAdded(_) => "invoicing.invoice.payment_added",
            InvoiceEvent::PaymentRemoved(_) => "invoicing.invoice.payment_removed",
            InvoiceEvent::NotesUpdated(_) => "invoicing.invoice.notes_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
            InvoiceEvent::LineItemAdded(e) => e.occurred_at,
            InvoiceEvent::LineItemUpdated(e) => e.occurred_at,
            InvoiceEvent::LineItemRemoved(e) => e.occurred_at,
            InvoiceEvent::PaymentAdded(e) => e.occurred_at,
            InvoiceEvent::PaymentRemoved(e) => e.occurred_at,
            InvoiceEvent::NotesUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.shop_id = Some(e.shop_id);
                self.invoice_number = e.invoice_number.clone();
                self.customer_id = Some(e.customer_id);
                self.customer_name = e.customer_name.clone();
                self.customer_phone = e.customer_phone.clone();
                self.items = e.items.clone();
                self.notes = e.notes.clone();
                self.total_amount = e.total_amount;
                self.paid_amount = Money::zero();
                self.created = true;
            }
            InvoiceEvent::LineItemAdded(e) => {
                match e.merged_into {
                    Some(existing_id) => {
                        if let Some(row) = self.items.iter_mut().find(|i| i.item_id == existing_id)
                        {
                            // Handlers reject overflowing merges before emitting
                            // the event; apply stays infallible.
                            row.quantity = row.quantity.saturating_add(e.item.quantity);
                        }
                    }
                    None => self.items.push(e.item.clone()),
                }
                self.total_amount = e.new_total_amount;
                self.paid_amount = e.new_paid_amount;
            }
            InvoiceEvent::LineItemUpdated(e) => {
                if let Some(row) = self
                    .items
                    .iter_mut()
                    .find(|i| i.item_id == e.item.item_id)
                {
                    *row = e.item.clone();
                }
                self.total_amount = e.new_total_amount;
                self.paid_amount = e.new_paid_amount;
            }
            InvoiceEvent::LineItemRemoved(e) => {
                self.items.retain(|i| i.item_id != e.item_id);
                self.total_amount = e.new_total_amount;
                self.paid_amount = e.new_paid_amount;
            }
            InvoiceEvent::PaymentAdded(e) => {
                self.payments.push(e.payment.clone());
                self.paid_amount = e.new_paid_amount;
            }
            InvoiceEvent::PaymentRemoved(e) => {
                self.payments.retain(|p| p.payment_id != e.payment_id);
                self.paid_amount = e.new_paid_amount;
            }
            InvoiceEvent::NotesUpdated(e) => {
                self.notes = e.notes.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateInvoice(cmd) => self.handle_create(cmd),
            InvoiceCommand::AddLineItem(cmd) => self.handle_add_item(cmd),
            InvoiceCommand::UpdateLineItem(cmd) => self.handle_update_item(cmd),
            InvoiceCommand::RemoveLineItem(cmd) => self.handle_remove_item(cmd),
            InvoiceCommand::AddPayment(cmd) => self.handle_add_payment(cmd),
            InvoiceCommand::RemovePayment(cmd) => self.handle_remove_payment(cmd),
            InvoiceCommand::UpdateNotes(cmd) => self.handle_update_notes(cmd),
        }
    }
}

impl Invoice {
    fn ensure_shop(&self, shop_id: ShopId) -> DomainResult<()> {
        if !self.created {
            return Ok(());
        }
        if self.shop_id != Some(shop_id) {
            return Err(DomainError::invariant("shop mismatch"));
        }
        Ok(())
    }

    fn ensure_invoice_id(&self, invoice_id: InvoiceId) -> DomainResult<()> {
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }

        if cmd.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        if cmd.customer_name.trim().is_empty() {
            return Err(DomainError::validation("customer name cannot be empty"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation(
                "cannot create invoice without items",
            ));
        }

        // Normalize at creation with the same merge identity used on add:
        // duplicate pricing rows fold into one with summed quantity.
        let mut items: Vec<LineItem> = Vec::with_capacity(cmd.items.len());
        for item in &cmd.items {
            item.validate()?;
            match items.iter_mut().find(|i| i.same_pricing_basis(item)) {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .checked_add(item.quantity)
                        .ok_or_else(|| DomainError::invariant("merged line item quantity overflow"))?;
                }
                None => items.push(item.clone()),
            }
        }

        let total_amount = Invoice::compute_total(&items)?;

        Ok(vec![InvoiceEvent::InvoiceCreated(InvoiceCreated {
            shop_id: cmd.shop_id,
            invoice_id: cmd.invoice_id,
            invoice_number: cmd.invoice_number.clone(),
            customer_id: cmd.customer_id,
            customer_name: cmd.customer_name.clone(),
            customer_phone: cmd.customer_phone.clone(),
            items,
            notes: cmd.notes.clone(),
            total_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddLineItem) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_shop(cmd.shop_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;
        cmd.item.validate()?;

        let merged_into = self
            .items
            .iter()
            .find(|i| i.same_pricing_basis(&cmd.item))
            .map(|i| i.item_id);

        let mut items = self.items.clone();
        match merged_into {
            Some(existing_id) => {
                if let Some(row) = items.iter_mut().find(|i| i.item_id == existing_id) {
                    row.quantity = row
                        .quantity
                        .checked_add(cmd.item.quantity)
                        .ok_or_else(|| DomainError::invariant("merged line item quantity overflow"))?;
                }
            }
            None => items.push(cmd.item.clone()),
        }

        let new_total_amount = Invoice::compute_total(&items)?;
        let new_paid_amount = Money::min(self.paid_amount, new_total_amount);

        Ok(vec![InvoiceEvent::LineItemAdded(LineItemAdded {
            shop_id: cmd.shop_id,
            invoice_id: cmd.invoice_id,
            item: cmd.item.clone(),
            merged_into,
            new_total_amount,
            new_paid_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_item(&self, cmd: &UpdateLineItem) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_shop(cmd.shop_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;
        cmd.item.validate()?;

        if !self.items.iter().any(|i| i.item_id == cmd.item.item_id) {
            return Err(DomainError::not_found());
        }

        let mut items = self.items.clone();
        for row in items.iter_mut() {
            if row.item_id == cmd.item.item_id {
                *row = cmd.item.clone();
            }
        }

        let new_total_amount = Invoice::compute_total(&items)?;
        // An edit shrinking the total below what was already paid clamps
        // rather than rejecting the edit.
        let new_paid_amount = Money::min(self.paid_amount, new_total_amount);

        Ok(vec![InvoiceEvent::LineItemUpdated(LineItemUpdated {
            shop_id: cmd.shop_id,
            invoice_id: cmd.invoice_id,
            item: cmd.item.clone(),
            new_total_amount,
            new_paid_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveLineItem) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_shop(cmd.shop_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if !self.items.iter().any(|i| i.item_id == cmd.item_id) {
            return Err(DomainError::not_found());
        }

        // An invoice must always keep at least one item.
        if self.items.len() == 1 {
            return Err(DomainError::validation(
                "cannot remove the last line item from an invoice",
            ));
        }

        let items: Vec<LineItem> = self
            .items
            .iter()
            .filter(|i| i.item_id != cmd.item_id)
            .cloned()
            .collect();

        let new_total_amount = Invoice::compute_total(&items)?;
        let new_paid_amount = Money::min(self.paid_amount, new_total_amount);

        Ok(vec![InvoiceEvent::LineItemRemoved(LineItemRemoved {
            shop_id: cmd.shop_id,
            invoice_id: cmd.invoice_id,
            item_id: cmd.item_id,
            new_total_amount,
            new_paid_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_payment(&self, cmd: &AddPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_shop(cmd.shop_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if !cmd.payment.amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if self
            .payments
            .iter()
            .any(|p| p.payment_id == cmd.payment.payment_id)
        {
            return Err(DomainError::conflict("payment id already recorded"));
        }

        // Rejected before any state change, never clamped.
        if cmd.payment.amount > self.unpaid_amount() {
            return Err(DomainError::validation(
                "payment exceeds remaining unpaid balance",
            ));
        }

        let mut payments = self.payments.clone();
        payments.push(cmd.payment.clone());
        let new_paid_amount = Invoice::sum_payments(&payments)?;

        Ok(vec![InvoiceEvent::PaymentAdded(PaymentAdded {
            shop_id: cmd.shop_id,
            invoice_id: cmd.invoice_id,
            payment: cmd.payment.clone(),
            new_paid_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_payment(&self, cmd: &RemovePayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_shop(cmd.shop_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if !self.payments.iter().any(|p| p.payment_id == cmd.payment_id) {
            return Err(DomainError::not_found());
        }

        // Recompute from the survivors rather than subtracting the removed
        // amount, so paid_amount can never drift from Σ payments.
        let remaining: Vec<Payment> = self
            .payments
            .iter()
            .filter(|p| p.payment_id != cmd.payment_id)
            .cloned()
            .collect();
        let new_paid_amount = Invoice::sum_payments(&remaining)?;

        Ok(vec![InvoiceEvent::PaymentRemoved(PaymentRemoved {
            shop_id: cmd.shop_id,
            invoice_id: cmd.invoice_id,
            payment_id: cmd.payment_id,
            new_paid_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_notes(&self, cmd: &UpdateNotes) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_shop(cmd.shop_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if cmd.notes == self.notes {
            return Ok(vec![]);
        }

        Ok(vec![InvoiceEvent::NotesUpdated(NotesUpdated {
            shop_id: cmd.shop_id,
            invoice_id: cmd.invoice_id,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
