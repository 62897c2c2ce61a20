use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use khata_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, Money, ShopId, ValueObject,
};
use khata_events::Event;

/// Customer identifier (shop-scoped via `shop_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub AggregateId);

impl CustomerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Per-customer balance convention.
///
/// A closed enum rather than a string so a typo can never silently flip the
/// sign convention.
///
/// - `Credit`: `current_balance` grows when the customer owes the shop more.
/// - `Debit`: the raw arithmetic is inverted; the balance grows when the
///   shop owes the customer more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceType {
    Credit,
    Debit,
}

/// Contact information for a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl ValueObject for ContactInfo {}

/// Aggregate root: Customer.
///
/// `current_balance` is a signed running balance whose meaning depends on
/// `balance_type`. It is never mutated directly by command handlers; the
/// ledger reconciliation flow produces updated copies via
/// [`Customer::with_current_balance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    shop_id: Option<ShopId>,
    name: String,
    contact: ContactInfo,
    balance_type: BalanceType,
    current_balance: Money,
    credit_limit: Money,
    version: u64,
    created: bool,
}

impl Customer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            shop_id: None,
            name: String::new(),
            contact: ContactInfo::default(),
            balance_type: BalanceType::Credit,
            current_balance: Money::zero(),
            credit_limit: Money::zero(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn shop_id(&self) -> Option<ShopId> {
        self.shop_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn balance_type(&self) -> BalanceType {
        self.balance_type
    }

    pub fn current_balance(&self) -> Money {
        self.current_balance
    }

    pub fn credit_limit(&self) -> Money {
        self.credit_limit
    }

    /// Whether the credit ceiling applies to this customer.
    ///
    /// Only CREDIT-convention customers with a positive configured limit are
    /// checked; a zero or negative limit means "no limit enforced".
    pub fn credit_limit_enforced(&self) -> bool {
        self.balance_type == BalanceType::Credit && self.credit_limit.is_positive()
    }

    /// Copy of this customer with a replaced running balance.
    ///
    /// Reserved for the ledger reconciliation path; UI and command code
    /// must never call this directly. Bumps the version: the copy is a new
    /// state revision to persist.
    pub fn with_current_balance(&self, balance: Money) -> Customer {
        Customer {
            current_balance: balance,
            version: self.version + 1,
            ..self.clone()
        }
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub shop_id: ShopId,
    pub customer_id: CustomerId,
    pub name: String,
    pub contact: Option<ContactInfo>,
    pub balance_type: BalanceType,
    /// Opening balance carried over from a paper khata, if any.
    pub opening_balance: Money,
    pub credit_limit: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub shop_id: ShopId,
    pub customer_id: CustomerId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new contact info (if None, keep existing).
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeCreditLimit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCreditLimit {
    pub shop_id: ShopId,
    pub customer_id: CustomerId,
    pub credit_limit: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerCommand {
    RegisterCustomer(RegisterCustomer),
    UpdateDetails(UpdateDetails),
    ChangeCreditLimit(ChangeCreditLimit),
}

impl khata_events::Command for CustomerCommand {
    fn target_aggregate_id(&self) -> khata_core::AggregateId {
        match self {
            CustomerCommand::RegisterCustomer(cmd) => cmd.customer_id.0,
            CustomerCommand::UpdateDetails(cmd) => cmd.customer_id.0,
            CustomerCommand::ChangeCreditLimit(cmd) => cmd.customer_id.0,
        }
    }
}

/// Event: CustomerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub shop_id: ShopId,
    pub customer_id: CustomerId,
    pub name: String,
    pub contact: ContactInfo,
    pub balance_type: BalanceType,
    pub opening_balance: Money,
    pub credit_limit: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUpdated {
    pub shop_id: ShopId,
    pub customer_id: CustomerId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CreditLimitChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLimitChanged {
    pub shop_id: ShopId,
    pub customer_id: CustomerId,
    pub credit_limit: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegistered),
    CustomerUpdated(CustomerUpdated),
    CreditLimitChanged(CreditLimitChanged),
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "customers.customer.registered",
            CustomerEvent::CustomerUpdated(_) => "customers.customer.updated",
            CustomerEvent::CreditLimitChanged(_) => "customers.customer.credit_limit_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.occurred_at,
            CustomerEvent::CustomerUpdated(e) => e.occurred_at,
            CustomerEvent::CreditLimitChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(e) => {
                self.id = e.customer_id;
                self.shop_id = Some(e.shop_id);
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.balance_type = e.balance_type;
                self.current_balance = e.opening_balance;
                self.credit_limit = e.credit_limit;
                self.created = true;
            }
            CustomerEvent::CustomerUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
            }
            CustomerEvent::CreditLimitChanged(e) => {
                self.credit_limit = e.credit_limit;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::RegisterCustomer(cmd) => self.handle_register(cmd),
            CustomerCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            CustomerCommand::ChangeCreditLimit(cmd) => self.handle_change_credit_limit(cmd),
        }
    }
}

impl Customer {
    fn ensure_shop(&self, shop_id: ShopId) -> DomainResult<()> {
        if !self.created {
            return Ok(());
        }
        if self.shop_id != Some(shop_id) {
            return Err(DomainError::invariant("shop mismatch"));
        }
        Ok(())
    }

    fn ensure_customer_id(&self, customer_id: CustomerId) -> DomainResult<()> {
        if self.id != customer_id {
            return Err(DomainError::invariant("customer_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already exists"));
        }

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        if cmd.credit_limit.is_negative() {
            return Err(DomainError::validation("credit limit cannot be negative"));
        }

        let contact = cmd.contact.clone().unwrap_or_default();

        Ok(vec![CustomerEvent::CustomerRegistered(CustomerRegistered {
            shop_id: cmd.shop_id,
            customer_id: cmd.customer_id,
            name: cmd.name.clone(),
            contact,
            balance_type: cmd.balance_type,
            opening_balance: cmd.opening_balance,
            credit_limit: cmd.credit_limit,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_shop(cmd.shop_id)?;
        self.ensure_customer_id(cmd.customer_id)?;

        let new_name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if new_name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let new_contact = cmd.contact.clone().unwrap_or_else(|| self.contact.clone());

        Ok(vec![CustomerEvent::CustomerUpdated(CustomerUpdated {
            shop_id: cmd.shop_id,
            customer_id: cmd.customer_id,
            name: new_name,
            contact: new_contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_credit_limit(
        &self,
        cmd: &ChangeCreditLimit,
    ) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_shop(cmd.shop_id)?;
        self.ensure_customer_id(cmd.customer_id)?;

        if cmd.credit_limit.is_negative() {
            return Err(DomainError::validation("credit limit cannot be negative"));
        }

        if cmd.credit_limit == self.credit_limit {
            return Ok(vec![]);
        }

        Ok(vec![CustomerEvent::CreditLimitChanged(CreditLimitChanged {
            shop_id: cmd.shop_id,
            customer_id: cmd.customer_id,
            credit_limit: cmd.credit_limit,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use khata_core::AggregateId;

    fn test_shop_id() -> ShopId {
        ShopId::new()
    }

    fn test_customer_id() -> CustomerId {
        CustomerId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn register_cmd(shop_id: ShopId, customer_id: CustomerId) -> RegisterCustomer {
        RegisterCustomer {
            shop_id,
            customer_id,
            name: "Asha Jewellers Walk-in".to_string(),
            contact: None,
            balance_type: BalanceType::Credit,
            opening_balance: Money::zero(),
            credit_limit: Money::from_paise(100_000),
            occurred_at: test_time(),
        }
    }

    #[test]
    fn register_customer_emits_registered_event() {
        let customer = Customer::empty(test_customer_id());
        let shop_id = test_shop_id();
        let customer_id = test_customer_id();
        let contact = ContactInfo {
            phone: Some("+91 98765 43210".to_string()),
            email: None,
            address: Some("MG Road".to_string()),
        };

        let cmd = RegisterCustomer {
            contact: Some(contact.clone()),
            ..register_cmd(shop_id, customer_id)
        };

        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            CustomerEvent::CustomerRegistered(e) => {
                assert_eq!(e.shop_id, shop_id);
                assert_eq!(e.customer_id, customer_id);
                assert_eq!(e.contact, contact);
                assert_eq!(e.balance_type, BalanceType::Credit);
                assert_eq!(e.credit_limit, Money::from_paise(100_000));
            }
            _ => panic!("Expected CustomerRegistered event"),
        }
    }

    #[test]
    fn register_customer_rejects_empty_name() {
        let customer = Customer::empty(test_customer_id());
        let cmd = RegisterCustomer {
            name: "   ".to_string(),
            ..register_cmd(test_shop_id(), test_customer_id())
        };

        let err = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_customer_rejects_negative_credit_limit() {
        let customer = Customer::empty(test_customer_id());
        let cmd = RegisterCustomer {
            credit_limit: Money::from_paise(-1),
            ..register_cmd(test_shop_id(), test_customer_id())
        };

        let err = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_customer_rejects_duplicate_creation() {
        let mut customer = Customer::empty(test_customer_id());
        let cmd = register_cmd(test_shop_id(), test_customer_id());

        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd.clone()))
            .unwrap();
        customer.apply(&events[0]);

        let err = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn opening_balance_seeds_current_balance() {
        let mut customer = Customer::empty(test_customer_id());
        let cmd = RegisterCustomer {
            opening_balance: Money::from_paise(5_000),
            ..register_cmd(test_shop_id(), test_customer_id())
        };

        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap();
        customer.apply(&events[0]);

        assert_eq!(customer.current_balance(), Money::from_paise(5_000));
        assert_eq!(customer.version(), 1);
    }

    #[test]
    fn update_details_updates_name_and_contact() {
        let mut customer = Customer::empty(test_customer_id());
        let shop_id = test_shop_id();
        let customer_id = test_customer_id();

        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(register_cmd(
                shop_id,
                customer_id,
            )))
            .unwrap();
        customer.apply(&events[0]);

        let new_contact = ContactInfo {
            phone: Some("+91 90000 00000".to_string()),
            email: Some("ramesh@example.com".to_string()),
            address: None,
        };
        let update_cmd = UpdateDetails {
            shop_id,
            customer_id,
            name: Some("Ramesh Kumar".to_string()),
            contact: Some(new_contact.clone()),
            occurred_at: test_time(),
        };

        let events = customer
            .handle(&CustomerCommand::UpdateDetails(update_cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            CustomerEvent::CustomerUpdated(e) => {
                assert_eq!(e.name, "Ramesh Kumar");
                assert_eq!(e.contact, new_contact);
            }
            _ => panic!("Expected CustomerUpdated event"),
        }
    }

    #[test]
    fn update_rejects_non_existent_customer() {
        let customer = Customer::empty(test_customer_id());
        let cmd = UpdateDetails {
            shop_id: test_shop_id(),
            customer_id: test_customer_id(),
            name: Some("New Name".to_string()),
            contact: None,
            occurred_at: test_time(),
        };

        let err = customer
            .handle(&CustomerCommand::UpdateDetails(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn change_credit_limit_is_noop_when_unchanged() {
        let mut customer = Customer::empty(test_customer_id());
        let shop_id = test_shop_id();
        let customer_id = test_customer_id();

        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(register_cmd(
                shop_id,
                customer_id,
            )))
            .unwrap();
        customer.apply(&events[0]);

        let cmd = ChangeCreditLimit {
            shop_id,
            customer_id,
            credit_limit: customer.credit_limit(),
            occurred_at: test_time(),
        };
        assert!(customer
            .handle(&CustomerCommand::ChangeCreditLimit(cmd))
            .unwrap()
            .is_empty());

        let cmd = ChangeCreditLimit {
            shop_id,
            customer_id,
            credit_limit: Money::from_paise(250_000),
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::ChangeCreditLimit(cmd))
            .unwrap();
        customer.apply(&events[0]);
        assert_eq!(customer.credit_limit(), Money::from_paise(250_000));
    }

    #[test]
    fn credit_limit_enforced_only_for_credit_customers_with_positive_limit() {
        let mut credit = Customer::empty(test_customer_id());
        let events = credit
            .handle(&CustomerCommand::RegisterCustomer(register_cmd(
                test_shop_id(),
                test_customer_id(),
            )))
            .unwrap();
        credit.apply(&events[0]);
        assert!(credit.credit_limit_enforced());

        let mut debit = Customer::empty(test_customer_id());
        let cmd = RegisterCustomer {
            balance_type: BalanceType::Debit,
            ..register_cmd(test_shop_id(), test_customer_id())
        };
        let events = debit
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap();
        debit.apply(&events[0]);
        assert!(!debit.credit_limit_enforced());

        let mut unlimited = Customer::empty(test_customer_id());
        let cmd = RegisterCustomer {
            credit_limit: Money::zero(),
            ..register_cmd(test_shop_id(), test_customer_id())
        };
        let events = unlimited
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap();
        unlimited.apply(&events[0]);
        assert!(!unlimited.credit_limit_enforced());
    }

    #[test]
    fn with_current_balance_returns_new_revision_without_mutating() {
        let mut customer = Customer::empty(test_customer_id());
        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(register_cmd(
                test_shop_id(),
                test_customer_id(),
            )))
            .unwrap();
        customer.apply(&events[0]);

        let updated = customer.with_current_balance(Money::from_paise(75_000));
        assert_eq!(updated.current_balance(), Money::from_paise(75_000));
        assert_eq!(updated.version(), customer.version() + 1);

        // Input untouched.
        assert_eq!(customer.current_balance(), Money::zero());
    }
}
