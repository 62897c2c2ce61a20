//! Integration tests for the full reconciliation pipeline.
//!
//! Tests: Command → Reconciler → DocumentStore → EventBus → Projection → ReadModel
//!
//! Verifies:
//! - Invoice mutations persist snapshots and move the customer balance
//! - The credit-limit check agrees with the committed balance arithmetic
//! - Partial write failures surface without rolling back the invoice
//! - Published events feed the customer dues read model

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::Utc;

    use khata_core::{AggregateId, Money, ShopId, TaxRate};
    use khata_customers::{
        BalanceType, Customer, CustomerCommand, CustomerId, RegisterCustomer,
    };
    use khata_events::{
        EventBus, EventEnvelope, InMemoryEventBus, ProjectionRunner, Subscription, execute,
    };
    use khata_invoicing::{
        AddPayment, CreateInvoice, InvoiceCommand, InvoiceEvent, InvoiceId, LineItem, LineItemId,
        Payment, PaymentId, RemoveLineItem,
    };

    use crate::document_store::{DocumentStore, InMemoryDocumentStore};
    use crate::projections::{CustomerDues, CustomerDuesProjection};
    use crate::read_model::{InMemoryShopStore, ShopStore};
    use crate::reconciler::{InvoiceReconciler, ReconcileError};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<InvoiceEvent>>>;
    type Reconciler = InvoiceReconciler<Arc<InMemoryDocumentStore>, Bus>;

    struct Harness {
        store: Arc<InMemoryDocumentStore>,
        reconciler: Reconciler,
        subscription: Subscription<EventEnvelope<InvoiceEvent>>,
        dues: ProjectionRunner<CustomerDuesProjection<Arc<InMemoryShopStore<CustomerId, CustomerDues>>>>,
        dues_store: Arc<InMemoryShopStore<CustomerId, CustomerDues>>,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(InMemoryDocumentStore::new());
            let bus: Bus = Arc::new(InMemoryEventBus::new());
            let subscription = bus.subscribe();
            let reconciler = InvoiceReconciler::new(store.clone(), bus);
            let dues_store = Arc::new(InMemoryShopStore::new());
            let dues = ProjectionRunner::new(CustomerDuesProjection::new(dues_store.clone()));
            Self {
                store,
                reconciler,
                subscription,
                dues,
                dues_store,
            }
        }

        /// Drain everything published so far into the dues projection.
        fn drain_into_projection(&mut self) {
            while let Ok(envelope) = self.subscription.try_recv() {
                self.dues
                    .apply(&envelope)
                    .expect("projection replay in order");
            }
        }
    }

    fn register_customer(
        store: &InMemoryDocumentStore,
        shop_id: ShopId,
        balance_type: BalanceType,
        credit_limit: Money,
    ) -> Result<Customer> {
        let customer_id = CustomerId::new(AggregateId::new());
        let mut customer = Customer::empty(customer_id);
        let cmd = CustomerCommand::RegisterCustomer(RegisterCustomer {
            shop_id,
            customer_id,
            name: "Ramesh Kumar".to_string(),
            contact: None,
            balance_type,
            opening_balance: Money::zero(),
            credit_limit,
            occurred_at: Utc::now(),
        });
        execute(&mut customer, &cmd)?;
        store.save_customer(shop_id, &customer)?;
        Ok(customer)
    }

    fn plain_item(unit_price: Money) -> LineItem {
        LineItem {
            item_id: LineItemId::new(),
            description: "Gold Bangle".to_string(),
            unit_price,
            quantity: 1,
            tax_rate: TaxRate::zero(),
            extra_charges: vec![],
        }
    }

    fn create_cmd(
        shop_id: ShopId,
        invoice_id: InvoiceId,
        customer: &Customer,
        items: Vec<LineItem>,
    ) -> InvoiceCommand {
        InvoiceCommand::CreateInvoice(CreateInvoice {
            shop_id,
            invoice_id,
            invoice_number: format!("INV-{invoice_id}"),
            customer_id: customer.id_typed(),
            customer_name: customer.name().to_string(),
            customer_phone: None,
            items,
            notes: None,
            occurred_at: Utc::now(),
        })
    }

    fn payment_cmd(shop_id: ShopId, invoice_id: InvoiceId, amount: Money) -> InvoiceCommand {
        InvoiceCommand::AddPayment(AddPayment {
            shop_id,
            invoice_id,
            payment: Payment {
                payment_id: PaymentId::new(),
                amount,
                method: "cash".to_string(),
                date: Utc::now(),
                reference: None,
                notes: None,
            },
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn create_invoice_persists_snapshot_and_moves_balance() -> Result<()> {
        let harness = Harness::new();
        let shop_id = ShopId::new();
        let customer = register_customer(
            &harness.store,
            shop_id,
            BalanceType::Credit,
            Money::zero(),
        )?;
        let invoice_id = InvoiceId::new(AggregateId::new());

        let outcome = harness.reconciler.execute(
            shop_id,
            create_cmd(
                shop_id,
                invoice_id,
                &customer,
                vec![plain_item(Money::from_paise(250_000))],
            ),
        )?;

        assert_eq!(outcome.raw_balance_change, Money::from_paise(250_000));

        let stored_invoice = harness.store.get_invoice(shop_id, invoice_id)?.unwrap();
        assert_eq!(stored_invoice.total_amount(), Money::from_paise(250_000));

        let stored_customer = harness
            .store
            .get_customer(shop_id, customer.id_typed())?
            .unwrap();
        assert_eq!(stored_customer.current_balance(), Money::from_paise(250_000));
        assert_eq!(
            outcome.customer.map(|c| c.current_balance()),
            Some(Money::from_paise(250_000))
        );
        Ok(())
    }

    #[test]
    fn credit_sale_then_payment_walks_the_running_balance() -> Result<()> {
        // CREDIT customer, balance 0, limit ₹1000; a ₹1200 invoice then a
        // ₹700 payment.
        let mut harness = Harness::new();
        let shop_id = ShopId::new();
        let customer = register_customer(
            &harness.store,
            shop_id,
            BalanceType::Credit,
            Money::from_paise(100_000),
        )?;
        let invoice_id = InvoiceId::new(AggregateId::new());

        // Speculative check before anything is saved.
        let mut prospective = khata_invoicing::Invoice::empty(invoice_id);
        execute(
            &mut prospective,
            &create_cmd(
                shop_id,
                invoice_id,
                &customer,
                vec![plain_item(Money::from_paise(120_000))],
            ),
        )?;
        let check = harness
            .reconciler
            .check_credit(shop_id, customer.id_typed(), &prospective, None)?
            .unwrap();
        assert!(check.exceeds);
        assert_eq!(check.current_balance, Money::zero());
        assert_eq!(check.projected_balance, Money::from_paise(120_000));

        // The shop owner overrides and commits anyway.
        harness.reconciler.execute(
            shop_id,
            create_cmd(
                shop_id,
                invoice_id,
                &customer,
                vec![plain_item(Money::from_paise(120_000))],
            ),
        )?;
        let after_sale = harness
            .store
            .get_customer(shop_id, customer.id_typed())?
            .unwrap();
        assert_eq!(after_sale.current_balance(), Money::from_paise(120_000));

        // ₹700 payment brings the balance to ₹500.
        let outcome = harness
            .reconciler
            .execute(shop_id, payment_cmd(shop_id, invoice_id, Money::from_paise(70_000)))?;
        assert_eq!(outcome.raw_balance_change, Money::from_paise(-70_000));

        let after_payment = harness
            .store
            .get_customer(shop_id, customer.id_typed())?
            .unwrap();
        assert_eq!(after_payment.current_balance(), Money::from_paise(50_000));

        // And the dues read model agrees.
        harness.drain_into_projection();
        let dues = harness
            .dues_store
            .get(shop_id, &customer.id_typed())
            .unwrap();
        assert_eq!(dues.outstanding, Money::from_paise(50_000));
        assert_eq!(dues.total_paid, Money::from_paise(70_000));
        assert_eq!(dues.open_invoice_count, 1);
        Ok(())
    }

    #[test]
    fn dues_read_model_consumes_a_multi_invoice_history() -> Result<()> {
        // Each invoice numbers its own events from 1, so the second
        // invoice's creation must replay alongside the first's.
        let mut harness = Harness::new();
        let shop_id = ShopId::new();
        let customer = register_customer(
            &harness.store,
            shop_id,
            BalanceType::Credit,
            Money::zero(),
        )?;

        let first_id = InvoiceId::new(AggregateId::new());
        harness.reconciler.execute(
            shop_id,
            create_cmd(
                shop_id,
                first_id,
                &customer,
                vec![plain_item(Money::from_paise(60_000))],
            ),
        )?;

        let second_id = InvoiceId::new(AggregateId::new());
        harness.reconciler.execute(
            shop_id,
            create_cmd(
                shop_id,
                second_id,
                &customer,
                vec![plain_item(Money::from_paise(40_000))],
            ),
        )?;
        harness
            .reconciler
            .execute(shop_id, payment_cmd(shop_id, second_id, Money::from_paise(40_000)))?;

        harness.drain_into_projection();

        let dues = harness
            .dues_store
            .get(shop_id, &customer.id_typed())
            .unwrap();
        assert_eq!(dues.total_invoiced, Money::from_paise(100_000));
        assert_eq!(dues.total_paid, Money::from_paise(40_000));
        assert_eq!(dues.outstanding, Money::from_paise(60_000));
        // The fully paid second invoice is closed.
        assert_eq!(dues.open_invoice_count, 1);
        Ok(())
    }

    #[test]
    fn debit_customer_balance_moves_the_opposite_way() -> Result<()> {
        let harness = Harness::new();
        let shop_id = ShopId::new();
        let customer = register_customer(
            &harness.store,
            shop_id,
            BalanceType::Debit,
            Money::zero(),
        )?;
        let invoice_id = InvoiceId::new(AggregateId::new());

        harness.reconciler.execute(
            shop_id,
            create_cmd(
                shop_id,
                invoice_id,
                &customer,
                vec![plain_item(Money::from_paise(20_000))],
            ),
        )?;

        let stored = harness
            .store
            .get_customer(shop_id, customer.id_typed())?
            .unwrap();
        assert_eq!(stored.current_balance(), Money::from_paise(-20_000));
        Ok(())
    }

    #[test]
    fn item_removal_clamps_paid_and_credits_the_customer_back() -> Result<()> {
        let harness = Harness::new();
        let shop_id = ShopId::new();
        let customer = register_customer(
            &harness.store,
            shop_id,
            BalanceType::Credit,
            Money::zero(),
        )?;
        let invoice_id = InvoiceId::new(AggregateId::new());

        harness.reconciler.execute(
            shop_id,
            create_cmd(
                shop_id,
                invoice_id,
                &customer,
                vec![
                    plain_item(Money::from_paise(100_000)),
                    plain_item(Money::from_paise(40_000)),
                ],
            ),
        )?;
        harness
            .reconciler
            .execute(shop_id, payment_cmd(shop_id, invoice_id, Money::from_paise(120_000)))?;

        // Remove the ₹1000 item: total drops to ₹400, paid clamps to ₹400,
        // unpaid goes from ₹200 to ₹0, so the balance drops by ₹200.
        let stored = harness.store.get_invoice(shop_id, invoice_id)?.unwrap();
        let big_item_id = stored
            .items()
            .iter()
            .find(|i| i.unit_price == Money::from_paise(100_000))
            .unwrap()
            .item_id;
        let outcome = harness.reconciler.execute(
            shop_id,
            InvoiceCommand::RemoveLineItem(RemoveLineItem {
                shop_id,
                invoice_id,
                item_id: big_item_id,
                occurred_at: Utc::now(),
            }),
        )?;

        assert_eq!(outcome.invoice.total_amount(), Money::from_paise(40_000));
        assert_eq!(outcome.invoice.paid_amount(), Money::from_paise(40_000));
        assert_eq!(outcome.raw_balance_change, Money::from_paise(-20_000));

        let stored_customer = harness
            .store
            .get_customer(shop_id, customer.id_typed())?
            .unwrap();
        assert_eq!(stored_customer.current_balance(), Money::zero());
        Ok(())
    }

    #[test]
    fn rejected_command_leaves_store_untouched() -> Result<()> {
        let harness = Harness::new();
        let shop_id = ShopId::new();
        let customer = register_customer(
            &harness.store,
            shop_id,
            BalanceType::Credit,
            Money::zero(),
        )?;
        let invoice_id = InvoiceId::new(AggregateId::new());

        harness.reconciler.execute(
            shop_id,
            create_cmd(
                shop_id,
                invoice_id,
                &customer,
                vec![plain_item(Money::from_paise(30_000))],
            ),
        )?;
        let invoice_before = harness.store.get_invoice(shop_id, invoice_id)?.unwrap();
        let customer_before = harness
            .store
            .get_customer(shop_id, customer.id_typed())?
            .unwrap();

        // Overpayment is a validation failure before any write.
        let err = harness
            .reconciler
            .execute(shop_id, payment_cmd(shop_id, invoice_id, Money::from_paise(30_001)))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Domain(_)));

        assert_eq!(
            harness.store.get_invoice(shop_id, invoice_id)?.unwrap(),
            invoice_before
        );
        assert_eq!(
            harness
                .store
                .get_customer(shop_id, customer.id_typed())?
                .unwrap(),
            customer_before
        );
        Ok(())
    }

    #[test]
    fn balance_write_failure_keeps_the_committed_invoice() -> Result<()> {
        let harness = Harness::new();
        let shop_id = ShopId::new();
        let customer = register_customer(
            &harness.store,
            shop_id,
            BalanceType::Credit,
            Money::zero(),
        )?;
        let invoice_id = InvoiceId::new(AggregateId::new());

        harness.reconciler.execute(
            shop_id,
            create_cmd(
                shop_id,
                invoice_id,
                &customer,
                vec![plain_item(Money::from_paise(80_000))],
            ),
        )?;

        harness.store.fail_customer_writes_with("quota exceeded");
        let payment = payment_cmd(shop_id, invoice_id, Money::from_paise(50_000));
        let err = harness
            .reconciler
            .execute(shop_id, payment.clone())
            .unwrap_err();
        assert!(matches!(err, ReconcileError::BalanceWrite { .. }));

        // The invoice write stands; the customer balance is stale.
        let stored_invoice = harness.store.get_invoice(shop_id, invoice_id)?.unwrap();
        assert_eq!(stored_invoice.paid_amount(), Money::from_paise(50_000));
        let stored_customer = harness
            .store
            .get_customer(shop_id, customer.id_typed())?
            .unwrap();
        assert_eq!(stored_customer.current_balance(), Money::from_paise(80_000));

        // Replaying the same payment after healing is rejected: the payment
        // id is already recorded, so the gap cannot double-count.
        harness.store.heal_writes();
        let err = harness.reconciler.execute(shop_id, payment).unwrap_err();
        assert!(matches!(err, ReconcileError::Domain(_)));
        Ok(())
    }

    #[test]
    fn missing_customer_skips_balance_but_commits_invoice() -> Result<()> {
        let harness = Harness::new();
        let shop_id = ShopId::new();
        // Customer never saved to the store.
        let ghost = Customer::empty(CustomerId::new(AggregateId::new()));
        let mut ghost_named = ghost.clone();
        let cmd = CustomerCommand::RegisterCustomer(RegisterCustomer {
            shop_id,
            customer_id: ghost.id_typed(),
            name: "Deleted Customer".to_string(),
            contact: None,
            balance_type: BalanceType::Credit,
            opening_balance: Money::zero(),
            credit_limit: Money::zero(),
            occurred_at: Utc::now(),
        });
        execute(&mut ghost_named, &cmd)?;

        let invoice_id = InvoiceId::new(AggregateId::new());
        let outcome = harness.reconciler.execute(
            shop_id,
            create_cmd(
                shop_id,
                invoice_id,
                &ghost_named,
                vec![plain_item(Money::from_paise(15_000))],
            ),
        )?;

        assert!(outcome.customer.is_none());
        let stored = harness.store.get_invoice(shop_id, invoice_id)?.unwrap();
        // Displayable through the denormalized header even without the
        // customer record.
        assert_eq!(stored.customer_name(), "Deleted Customer");
        Ok(())
    }

    #[test]
    fn unknown_invoice_is_reported_as_not_found() {
        let harness = Harness::new();
        let shop_id = ShopId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());

        let err = harness
            .reconciler
            .execute(shop_id, payment_cmd(shop_id, invoice_id, Money::from_paise(10_000)))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvoiceNotFound(_)));
    }
}
