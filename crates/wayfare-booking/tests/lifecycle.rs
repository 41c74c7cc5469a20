use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;
use wayfare_booking::{BookingError, BookingManager, BookingPolicy, WalletRefund};
use wayfare_gateway::{
    ContractClient, CustomerRegistration, GatewayError, GatewayResult, IdentityRegistry,
    InMemoryLedger, LedgerGateway, LedgerIdentity, NewTicket, ProviderRegistration, Visibility,
};
use wayfare_mirror::{InMemoryMirror, MirrorStore, RepairTask};
use wayfare_types::{
    BookingId, BookingStatus, IdempotencyKey, PaymentReference, Principal, TicketId,
    TransportMode, UserId,
};
use wayfare_wallet::{SyncMode, WalletLedger};

struct Harness {
    manager: Arc<BookingManager>,
    ledger: Arc<InMemoryLedger>,
    mirror: Arc<InMemoryMirror>,
    _dir: TempDir,
}

fn uid(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn customer(id: &str) -> Principal {
    Principal::customer(uid(id))
}

fn admin() -> Principal {
    Principal::admin(uid("admin"))
}

fn seats(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

async fn add_ticket(contract: &ContractClient, id: &str, price: i64, seat_numbers: &[&str]) {
    let departure = Utc::now() + ChronoDuration::days(45);
    contract
        .create_ticket(
            &LedgerIdentity::new("prov-1"),
            &NewTicket {
                id: TicketId::new(id).unwrap(),
                origin: "Lisbon".into(),
                destination: "Porto".into(),
                departure_time: departure,
                arrival_time: departure + ChronoDuration::hours(3),
                price: Decimal::from(price),
                seat_numbers: seats(seat_numbers),
                provider: uid("prov-1"),
                transport_mode: TransportMode::Land,
            },
        )
        .await
        .unwrap();
}

/// Loses the first read that follows a committed cancellation.
struct ReadLostAfterCancel {
    inner: Arc<InMemoryLedger>,
    armed: AtomicBool,
}

#[async_trait]
impl LedgerGateway for ReadLostAfterCancel {
    async fn submit(
        &self,
        identity: &LedgerIdentity,
        transaction: &str,
        args: &[String],
    ) -> GatewayResult<Vec<u8>> {
        let result = self.inner.submit(identity, transaction, args).await?;
        if transaction == "CancelBooking" {
            self.armed.store(true, Ordering::SeqCst);
        }
        Ok(result)
    }

    async fn evaluate(
        &self,
        identity: &LedgerIdentity,
        query: &str,
        args: &[String],
    ) -> GatewayResult<Vec<u8>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::LedgerUnavailable("read timed out".into()));
        }
        self.inner.evaluate(identity, query, args).await
    }
}

async fn harness() -> Harness {
    harness_over(|ledger| ledger as Arc<dyn LedgerGateway>).await
}

async fn harness_over(
    gateway: impl FnOnce(Arc<InMemoryLedger>) -> Arc<dyn LedgerGateway>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(InMemoryLedger::default());
    let registry = Arc::new(IdentityRegistry::with_identities(
        ["admin", "prov-1", "cust-1", "cust-2"].map(LedgerIdentity::new),
    ));
    let contract = ContractClient::new(gateway(ledger.clone()), registry, Duration::from_secs(2));
    let admin_identity = LedgerIdentity::new("admin");

    contract
        .register_provider(
            &admin_identity,
            &ProviderRegistration {
                id: uid("prov-1"),
                name: "Rail Co".into(),
                email: "ops@rail.test".into(),
                phone: "555-0100".into(),
                transport_mode: TransportMode::Land,
            },
        )
        .await
        .unwrap();
    for id in ["cust-1", "cust-2"] {
        contract
            .register_customer(
                &admin_identity,
                &CustomerRegistration {
                    id: uid(id),
                    name: id.into(),
                    email: format!("{id}@test"),
                    phone: "555-0101".into(),
                    visibility: Visibility::Public,
                },
            )
            .await
            .unwrap();
    }
    add_ticket(&contract, "T", 50, &["12A", "12B", "12C"]).await;
    add_ticket(&contract, "LUX", 600, &["1", "2"]).await;

    let wallets = WalletLedger::open(
        &dir.path().join("wallets.journal"),
        Decimal::from(1000),
        SyncMode::EveryWrite,
    )
    .unwrap();
    let mirror = Arc::new(InMemoryMirror::new());
    let manager = BookingManager::new(
        contract,
        mirror.clone(),
        Arc::new(wallets),
        BookingPolicy::default(),
        admin_identity,
    );
    Harness {
        manager: Arc::new(manager),
        ledger,
        mirror,
        _dir: dir,
    }
}

fn ticket(id: &str) -> TicketId {
    TicketId::new(id).unwrap()
}

fn reference(r: &str) -> PaymentReference {
    PaymentReference::new(r).unwrap()
}

#[tokio::test]
async fn book_confirm_cancel_end_to_end() {
    let h = harness().await;
    let c = customer("cust-1");

    let created = h
        .manager
        .create_booking(&c, &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap();
    assert!(created.payment_required);
    assert_eq!(created.booking.status, BookingStatus::Pending);
    assert_eq!(created.booking.total_price, Decimal::from(50));
    assert!(created.booking.id.as_str().starts_with("booking_"));
    let id = created.booking.id.clone();
    assert_eq!(h.mirror.find_booking(&id).await.unwrap(), Some(created.booking));

    let confirmed = h
        .manager
        .confirm_payment(&c, &id, &reference("tx1"))
        .await
        .unwrap();
    assert_eq!(confirmed.booking.status, BookingStatus::Confirmed);
    assert!(confirmed.booking.is_payment_confirmed);
    assert!(!confirmed.replayed);
    let summary = confirmed.ticket.unwrap();
    assert_eq!(summary.origin, "Lisbon");
    assert!(summary.price.is_none());

    let cancelled = h.manager.cancel_booking(&c, &id).await.unwrap();
    assert_eq!(cancelled.refund_amount, Decimal::from(40));
    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
    assert!(matches!(cancelled.wallet_refund, WalletRefund::Credited { .. }));

    let mirrored = h.mirror.find_booking(&id).await.unwrap().unwrap();
    assert_eq!(mirrored.status, BookingStatus::Cancelled);
    let wallet = h.manager.wallets().get_balance(&uid("cust-1")).await.unwrap();
    assert_eq!(wallet.balance, Decimal::from(1040));
}

#[tokio::test]
async fn cancelling_a_total_of_100_refunds_80() {
    let h = harness().await;
    let c = customer("cust-1");
    let created = h
        .manager
        .create_booking(&c, &ticket("T"), &seats(&["12A", "12B"]))
        .await
        .unwrap();
    assert_eq!(created.booking.total_price, Decimal::from(100));

    let cancelled = h.manager.cancel_booking(&c, &created.booking.id).await.unwrap();
    assert_eq!(cancelled.refund_amount, Decimal::new(800, 1));
    assert_eq!(cancelled.wallet_refund, WalletRefund::NotApplicable);
    assert_eq!(cancelled.booking.total_price, Decimal::from(100));
}

#[tokio::test]
async fn empty_seat_list_makes_no_ledger_calls() {
    let h = harness().await;
    let submits = h.ledger.submit_count();
    let evaluates = h.ledger.evaluate_count();

    let err = h
        .manager
        .create_booking(&customer("cust-1"), &ticket("T"), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
    assert_eq!(h.ledger.submit_count(), submits);
    assert_eq!(h.ledger.evaluate_count(), evaluates);
}

#[tokio::test]
async fn repeated_confirmation_applies_once() {
    let h = harness().await;
    let c = customer("cust-1");
    let id = h
        .manager
        .create_booking(&c, &ticket("T"), &seats(&["12B"]))
        .await
        .unwrap()
        .booking
        .id;

    let first = h.manager.confirm_payment(&c, &id, &reference("tx1")).await.unwrap();
    let second = h.manager.confirm_payment(&c, &id, &reference("tx1")).await.unwrap();
    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.booking, second.booking);
    assert_eq!(h.ledger.submit_count_of("ConfirmPayment"), 1);

    let err = h
        .manager
        .confirm_payment(&c, &id, &reference("tx2"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Conflict(_)));
}

#[tokio::test]
async fn confirming_an_unknown_booking_is_not_found() {
    let h = harness().await;
    let err = h
        .manager
        .confirm_payment(
            &customer("cust-1"),
            &BookingId::new("booking_NOPE").unwrap(),
            &reference("tx1"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound(_)));
}

#[tokio::test]
async fn strangers_may_not_read_or_cancel() {
    let h = harness().await;
    let id = h
        .manager
        .create_booking(&customer("cust-1"), &ticket("T"), &seats(&["12C"]))
        .await
        .unwrap()
        .booking
        .id;

    let err = h
        .manager
        .get_booking(&customer("cust-2"), &id)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));
    let err = h
        .manager
        .cancel_booking(&customer("cust-2"), &id)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));

    let view = h.manager.get_booking(&admin(), &id).await.unwrap();
    assert_eq!(view.ticket.price, Some(Decimal::from(50)));
    assert_eq!(view.ticket.dynamic_price, Some(Decimal::from(50)));
}

#[tokio::test]
async fn admin_cancellation_is_submitted_as_the_owner() {
    let h = harness().await;
    let id = h
        .manager
        .create_booking(&customer("cust-1"), &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap()
        .booking
        .id;

    let cancelled = h.manager.cancel_booking(&admin(), &id).await.unwrap();
    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);

    let submitted = h.ledger.submitted();
    let cancel = submitted
        .iter()
        .rev()
        .find(|t| t.name == "CancelBooking")
        .unwrap();
    assert_eq!(cancel.identity.as_str(), "cust-1");

    let err = h.manager.cancel_booking(&admin(), &id).await.unwrap_err();
    assert!(matches!(err, BookingError::Conflict(_)));
}

#[tokio::test]
async fn mirror_outage_is_repaired_by_reconcile() {
    let h = harness().await;
    h.mirror.fail_writes(true);

    let created = h
        .manager
        .create_booking(&customer("cust-1"), &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap();
    let id = created.booking.id.clone();
    let task = RepairTask::MirrorUpsert {
        booking_id: id.clone(),
    };
    assert!(h.manager.repairs().contains(&task));
    assert!(h.mirror.find_booking(&id).await.unwrap().is_none());

    let report = h.manager.reconcile(&admin()).await.unwrap();
    assert!(report.repaired.is_empty());
    assert_eq!(report.still_pending[0].attempts, 2);

    h.mirror.fail_writes(false);
    let report = h.manager.reconcile(&admin()).await.unwrap();
    assert_eq!(report.repaired, vec![task]);
    assert!(report.still_pending.is_empty());
    assert_eq!(
        h.mirror.find_booking(&id).await.unwrap(),
        Some(created.booking)
    );

    let err = h
        .manager
        .reconcile(&customer("cust-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));
}

#[tokio::test]
async fn repair_entry_point_is_idempotent() {
    let h = harness().await;
    let id = h
        .manager
        .create_booking(&customer("cust-1"), &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap()
        .booking
        .id;
    let first = h.manager.repair_booking(&admin(), &id).await.unwrap();
    let second = h.manager.repair_booking(&admin(), &id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.mirror.len(), 1);
}

#[tokio::test]
async fn unavailable_ledger_changes_nothing() {
    let h = harness().await;
    h.ledger.set_available(false);
    let err = h
        .manager
        .create_booking(&customer("cust-1"), &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert!(h.mirror.is_empty());
    assert!(h.manager.repairs().is_empty());
}

#[tokio::test]
async fn unenrolled_customer_gets_identity_not_found() {
    let h = harness().await;
    let err = h
        .manager
        .create_booking(&customer("cust-9"), &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::IdentityNotFound(_)));

    let registered = h
        .manager
        .register_customer(
            &customer("cust-9"),
            CustomerRegistration {
                id: uid("cust-9"),
                name: "Nine".into(),
                email: "nine@test".into(),
                phone: "555-0199".into(),
                visibility: Visibility::Anonymous,
            },
        )
        .await
        .unwrap();
    assert!(registered.is_active);

    h.manager
        .create_booking(&customer("cust-9"), &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap();
}

#[tokio::test]
async fn wallet_payment_settles_and_replays() {
    let h = harness().await;
    let c = customer("cust-1");
    let id = h
        .manager
        .create_booking(&c, &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap()
        .booking
        .id;

    let settled = h.manager.pay_with_wallet(&c, &id).await.unwrap();
    assert_eq!(settled.receipt.balance, Decimal::from(950));
    assert_eq!(settled.booking.booking.status, BookingStatus::Confirmed);
    assert_eq!(
        settled.booking.booking.payment_reference.as_ref().unwrap().as_str(),
        settled.receipt.transaction.id
    );

    let again = h.manager.pay_with_wallet(&c, &id).await.unwrap();
    assert!(again.receipt.replayed);
    assert_eq!(again.receipt.transaction.id, settled.receipt.transaction.id);
    assert_eq!(
        h.manager.wallets().get_balance(&uid("cust-1")).await.unwrap().balance,
        Decimal::from(950)
    );
}

#[tokio::test]
async fn wallet_payment_without_funds_leaves_booking_pending() {
    let h = harness().await;
    let c = customer("cust-1");
    let id = h
        .manager
        .create_booking(&c, &ticket("LUX"), &seats(&["1", "2"]))
        .await
        .unwrap()
        .booking
        .id;

    let err = h.manager.pay_with_wallet(&c, &id).await.unwrap_err();
    assert!(matches!(err, BookingError::InsufficientFunds { .. }));
    assert_eq!(h.ledger.submit_count_of("ConfirmPayment"), 0);

    let view = h.manager.get_booking(&c, &id).await.unwrap();
    assert_eq!(view.booking.status, BookingStatus::Pending);
    assert_eq!(
        h.manager.wallets().get_balance(&uid("cust-1")).await.unwrap().balance,
        Decimal::from(1000)
    );
}

#[tokio::test]
async fn rejected_confirmation_reverses_the_debit() {
    let h = harness().await;
    let c = customer("cust-1");
    let id = h
        .manager
        .create_booking(&c, &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap()
        .booking
        .id;

    h.ledger
        .fail_next_submit(GatewayError::LedgerRejected("endorsement policy".into()));
    let err = h.manager.pay_with_wallet(&c, &id).await.unwrap_err();
    assert!(matches!(err, BookingError::LedgerRejected(_)));

    let wallet = h.manager.wallets().get_balance(&uid("cust-1")).await.unwrap();
    assert_eq!(wallet.balance, Decimal::from(1000));
    assert_eq!(wallet.transactions.len(), 2);
    assert!(wallet.is_consistent());
}

#[tokio::test]
async fn refused_refund_is_deferred_not_lost() {
    let h = harness().await;
    let c = customer("cust-1");
    let id = h
        .manager
        .create_booking(&c, &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap()
        .booking
        .id;
    h.manager.confirm_payment(&c, &id, &reference("tx1")).await.unwrap();

    // Occupy the refund key with a different amount so the wallet refuses.
    h.manager
        .wallets()
        .refund(
            &uid("cust-1"),
            &id,
            Decimal::ONE,
            &IdempotencyKey::booking_refund(&id),
        )
        .await
        .unwrap();

    let cancelled = h.manager.cancel_booking(&c, &id).await.unwrap();
    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.wallet_refund, WalletRefund::Deferred);

    let pending = h.manager.repairs().pending_for(&id);
    assert_eq!(pending.len(), 1);
    assert!(matches!(
        pending[0].task,
        RepairTask::Refund { amount, .. } if amount == Decimal::from(40)
    ));
}

#[tokio::test]
async fn racing_confirm_and_cancel_stay_consistent() {
    let h = harness().await;
    let c = customer("cust-1");
    let id = h
        .manager
        .create_booking(&c, &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap()
        .booking
        .id;

    let confirm = {
        let manager = Arc::clone(&h.manager);
        let (c, id) = (c.clone(), id.clone());
        tokio::spawn(async move { manager.confirm_payment(&c, &id, &reference("tx1")).await })
    };
    let cancel = {
        let manager = Arc::clone(&h.manager);
        let (c, id) = (c.clone(), id.clone());
        tokio::spawn(async move { manager.cancel_booking(&c, &id).await })
    };
    let confirm = confirm.await.unwrap();
    let cancel = cancel.await.unwrap();

    assert!(cancel.is_ok());
    if let Err(err) = &confirm {
        assert!(matches!(err, BookingError::Conflict(_)));
    }
    let canonical = h.manager.get_booking(&admin(), &id).await.unwrap().booking;
    let mirrored = h.mirror.find_booking(&id).await.unwrap().unwrap();
    assert_eq!(canonical.status, BookingStatus::Cancelled);
    assert_eq!(mirrored.status, canonical.status);
    assert!(h.ledger.submit_count_of("CancelBooking") == 1);
}

#[tokio::test]
async fn listing_is_scoped_to_the_caller() {
    let h = harness().await;
    h.manager
        .create_booking(&customer("cust-1"), &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap();
    h.manager
        .create_booking(&customer("cust-2"), &ticket("T"), &seats(&["12B"]))
        .await
        .unwrap();

    let mine = h
        .manager
        .list_bookings(&customer("cust-1"), None)
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].user_id.as_str(), "cust-1");

    let err = h
        .manager
        .list_bookings(&customer("cust-1"), Some(&uid("cust-2")))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));
    let theirs = h
        .manager
        .list_bookings(&admin(), Some(&uid("cust-2")))
        .await
        .unwrap();
    assert_eq!(theirs.len(), 1);
}

#[tokio::test]
async fn wallet_payment_retried_after_reversal_charges_again() {
    let h = harness().await;
    let c = customer("cust-1");
    let id = h
        .manager
        .create_booking(&c, &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap()
        .booking
        .id;

    h.ledger
        .fail_next_submit(GatewayError::LedgerUnavailable("blip".into()));
    let err = h.manager.pay_with_wallet(&c, &id).await.unwrap_err();
    assert!(matches!(err, BookingError::LedgerUnavailable(_)));

    let settled = h.manager.pay_with_wallet(&c, &id).await.unwrap();
    assert!(!settled.receipt.replayed);
    assert_eq!(settled.booking.booking.status, BookingStatus::Confirmed);
    assert_eq!(settled.receipt.balance, Decimal::from(950));

    let wallet = h.manager.wallets().get_balance(&uid("cust-1")).await.unwrap();
    assert_eq!(wallet.balance, Decimal::from(950));
    assert_eq!(wallet.transactions.len(), 3);
    assert!(wallet.is_consistent());

    // Cancelling refunds 80% of what was actually paid.
    h.manager.cancel_booking(&c, &id).await.unwrap();
    assert_eq!(
        h.manager.wallets().get_balance(&uid("cust-1")).await.unwrap().balance,
        Decimal::from(990)
    );
}

#[tokio::test]
async fn another_customers_debit_cannot_claim_a_refund_key() {
    let h = harness().await;
    let owner = customer("cust-2");
    let id = h
        .manager
        .create_booking(&owner, &ticket("T"), &seats(&["12B"]))
        .await
        .unwrap()
        .booking
        .id;

    h.manager
        .wallets()
        .debit(
            &uid("cust-1"),
            &id,
            Decimal::ONE,
            &IdempotencyKey::booking_refund(&id),
        )
        .await
        .unwrap();
    h.manager
        .wallets()
        .debit(
            &uid("cust-1"),
            &id,
            Decimal::ONE,
            &IdempotencyKey::booking_payment(&id, 0),
        )
        .await
        .unwrap();

    let settled = h.manager.pay_with_wallet(&owner, &id).await.unwrap();
    assert_eq!(settled.receipt.balance, Decimal::from(950));
    let cancelled = h.manager.cancel_booking(&owner, &id).await.unwrap();
    assert!(matches!(cancelled.wallet_refund, WalletRefund::Credited { .. }));
    assert_eq!(
        h.manager.wallets().get_balance(&uid("cust-2")).await.unwrap().balance,
        Decimal::from(990)
    );
    assert!(h.manager.repairs().is_empty());
}

#[tokio::test]
async fn cancellation_stands_when_the_read_back_is_lost() {
    let h = harness_over(|ledger| {
        Arc::new(ReadLostAfterCancel {
            inner: ledger,
            armed: AtomicBool::new(false),
        }) as Arc<dyn LedgerGateway>
    })
    .await;
    let c = customer("cust-1");
    let id = h
        .manager
        .create_booking(&c, &ticket("T"), &seats(&["12A"]))
        .await
        .unwrap()
        .booking
        .id;
    h.manager.confirm_payment(&c, &id, &reference("tx1")).await.unwrap();

    let cancelled = h.manager.cancel_booking(&c, &id).await.unwrap();
    assert_eq!(cancelled.refund_amount, Decimal::from(40));
    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
    assert!(matches!(cancelled.wallet_refund, WalletRefund::Credited { .. }));
    assert_eq!(
        h.manager.wallets().get_balance(&uid("cust-1")).await.unwrap().balance,
        Decimal::from(1040)
    );

    // The mirror still shows the last state it read from the ledger.
    let mirrored = h.mirror.find_booking(&id).await.unwrap().unwrap();
    assert_eq!(mirrored.status, BookingStatus::Confirmed);
    assert!(h.manager.repairs().contains(&RepairTask::MirrorUpsert {
        booking_id: id.clone()
    }));

    let report = h.manager.reconcile(&admin()).await.unwrap();
    assert_eq!(report.repaired.len(), 1);
    let mirrored = h.mirror.find_booking(&id).await.unwrap().unwrap();
    assert_eq!(mirrored.status, BookingStatus::Cancelled);
}
