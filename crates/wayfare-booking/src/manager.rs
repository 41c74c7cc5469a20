use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use wayfare_gateway::{ContractClient, Customer, CustomerRegistration, LedgerIdentity};
use wayfare_mirror::{MirrorStore, RepairLog, RepairTask};
use wayfare_types::{
    Booking, BookingId, BookingStatus, Capability, IdempotencyKey, KeyedGuard, KeyedLocks,
    PaymentReference, Principal, TicketId, TicketSummary, TransactionKind, UserId,
};
use wayfare_wallet::{WalletLedger, WalletReceipt};

use crate::error::{BookingError, BookingResult};
use crate::policy::BookingPolicy;
use crate::views::{
    BookingView, Cancellation, ConfirmedBooking, CreatedBooking, ReconcileReport, WalletRefund,
    WalletSettlement,
};

/// Drives bookings through `Pending -> Confirmed -> Cancelled` against the
/// ledger, keeping the mirror and wallets in step.
///
/// Every state change is committed on the ledger first, read back, and only
/// then written to the mirror, so the mirror never shows a state the ledger
/// has not committed. State transitions on one booking are serialized; the
/// booking lock is always taken before any wallet lock.
pub struct BookingManager {
    contract: ContractClient,
    mirror: Arc<dyn MirrorStore>,
    wallets: Arc<WalletLedger>,
    repairs: Arc<RepairLog>,
    policy: BookingPolicy,
    service_identity: LedgerIdentity,
    locks: KeyedLocks,
}

impl BookingManager {
    pub fn new(
        contract: ContractClient,
        mirror: Arc<dyn MirrorStore>,
        wallets: Arc<WalletLedger>,
        policy: BookingPolicy,
        service_identity: LedgerIdentity,
    ) -> Self {
        Self {
            contract,
            mirror,
            wallets,
            repairs: Arc::new(RepairLog::new()),
            policy,
            service_identity,
            locks: KeyedLocks::new(),
        }
    }

    pub fn wallets(&self) -> &Arc<WalletLedger> {
        &self.wallets
    }

    pub fn repairs(&self) -> &Arc<RepairLog> {
        &self.repairs
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn contract(&self) -> &ContractClient {
        &self.contract
    }

    /// Enroll the caller's ledger identity and register them as a customer.
    pub async fn register_customer(
        &self,
        principal: &Principal,
        registration: CustomerRegistration,
    ) -> BookingResult<Customer> {
        if !principal.may_act_on(&registration.id) {
            return Err(BookingError::Forbidden(format!(
                "{principal} may not register {}",
                registration.id
            )));
        }
        let identity = LedgerIdentity::from(&registration.id);
        let newly_enrolled = self.contract.identities().enroll(identity.clone());

        if let Err(err) = self.contract.register_customer(&identity, &registration).await {
            if newly_enrolled {
                self.contract.identities().revoke(&identity);
            }
            return Err(err.into());
        }
        let customer = self.contract.get_customer(&identity, &registration.id).await?;
        info!(user_id = %customer.id, "customer registered");
        Ok(customer)
    }

    /// Book `seat_numbers` on `ticket_id` for the caller.
    pub async fn create_booking(
        &self,
        principal: &Principal,
        ticket_id: &TicketId,
        seat_numbers: &[String],
    ) -> BookingResult<CreatedBooking> {
        let seats = validate_seats(seat_numbers)?;
        if !principal.can(Capability::BookTickets) {
            return Err(BookingError::Forbidden(format!(
                "{principal} may not book tickets"
            )));
        }

        let customer = &principal.user_id;
        let identity = LedgerIdentity::from(customer);
        let booking_id = BookingId::generate();
        self.contract
            .book_ticket(&identity, &booking_id, ticket_id, customer, &seats)
            .await?;
        info!(
            booking_id = %booking_id,
            ticket_id = %ticket_id,
            user_id = %customer,
            seats = seats.len(),
            "booking committed"
        );

        let booking = match self.contract.get_booking(&identity, &booking_id).await {
            Ok(booking) => booking,
            Err(err) => {
                self.repairs.record(
                    RepairTask::MirrorUpsert {
                        booking_id: booking_id.clone(),
                    },
                    &err,
                );
                return Err(BookingError::from(err));
            }
        };
        self.mirror_write(&booking).await;

        Ok(CreatedBooking {
            booking,
            payment_required: true,
        })
    }

    /// Confirm payment of a booking with an external payment reference.
    ///
    /// Calling again with the same reference reports the confirmed booking
    /// with `replayed` set and submits nothing.
    pub async fn confirm_payment(
        &self,
        principal: &Principal,
        booking_id: &BookingId,
        reference: &PaymentReference,
    ) -> BookingResult<ConfirmedBooking> {
        let _guard = self.lock_booking(booking_id).await;

        let owner = self
            .mirror
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?
            .user_id;
        if !principal.may_act_on(&owner) {
            return Err(BookingError::Forbidden(format!(
                "{principal} may not confirm booking {booking_id}"
            )));
        }
        let owner_identity = LedgerIdentity::from(&owner);

        let current = self.contract.get_booking(&owner_identity, booking_id).await?;
        match current.status {
            BookingStatus::Confirmed if current.payment_reference.as_ref() == Some(reference) => {
                debug!(booking_id = %booking_id, "payment already confirmed with this reference");
                self.mirror_write(&current).await;
                let ticket = self.ticket_summary(&current.ticket_id).await;
                return Ok(ConfirmedBooking {
                    booking: current,
                    ticket,
                    replayed: true,
                });
            }
            BookingStatus::Pending => {}
            status => {
                return Err(BookingError::Conflict(format!(
                    "booking {booking_id} is {status}"
                )));
            }
        }

        self.contract
            .confirm_payment(&owner_identity, booking_id, reference)
            .await?;
        info!(booking_id = %booking_id, reference = %reference, "payment confirmed");

        let booking = self
            .read_back(&owner_identity, booking_id, settled(current, reference))
            .await;
        let ticket = self.ticket_summary(&booking.ticket_id).await;
        Ok(ConfirmedBooking {
            booking,
            ticket,
            replayed: false,
        })
    }

    /// Pay for a pending booking from the owner's wallet and confirm it.
    ///
    /// The wallet transaction id becomes the payment reference. If the
    /// ledger refuses the confirmation, the debit is reversed, and a later
    /// attempt debits again under the next attempt key.
    pub async fn pay_with_wallet(
        &self,
        principal: &Principal,
        booking_id: &BookingId,
    ) -> BookingResult<WalletSettlement> {
        let _guard = self.lock_booking(booking_id).await;

        let current = self
            .contract
            .get_booking(&self.service_identity, booking_id)
            .await?;
        let owner = current.user_id.clone();
        if !principal.may_act_on(&owner) || !principal.can(Capability::UseWallet) {
            return Err(BookingError::Forbidden(format!(
                "{principal} may not pay for booking {booking_id}"
            )));
        }
        if current.status != BookingStatus::Pending {
            return self.replayed_settlement(current);
        }

        let (attempt, debit_key) = self.payment_attempt(&owner, booking_id)?;
        let receipt = self
            .wallets
            .debit(&owner, booking_id, current.total_price, &debit_key)
            .await?;
        let reference = PaymentReference::new(receipt.transaction.id.clone())?;
        let owner_identity = LedgerIdentity::from(&owner);

        if let Err(err) = self
            .contract
            .confirm_payment(&owner_identity, booking_id, &reference)
            .await
        {
            if !self.confirmed_with(&owner_identity, booking_id, &reference).await {
                self.reverse_debit(&owner, booking_id, attempt, current.total_price).await;
                return Err(err.into());
            }
            warn!(booking_id = %booking_id, error = %err, "confirmation reported failure but committed");
        }
        info!(
            booking_id = %booking_id,
            user_id = %owner,
            amount = %current.total_price,
            "booking paid from wallet"
        );

        let booking = self
            .read_back(&owner_identity, booking_id, settled(current, &reference))
            .await;
        let ticket = self.ticket_summary(&booking.ticket_id).await;
        Ok(WalletSettlement {
            booking: ConfirmedBooking {
                booking,
                ticket,
                replayed: false,
            },
            receipt,
        })
    }

    /// Cancel a booking as its owner and refund `total * (1 - fee)`.
    ///
    /// The owner and total come from the ledger, never from the mirror. An
    /// administrator may initiate the cancellation, but it is always
    /// submitted under the owner's identity. A paid booking is refunded to
    /// the owner's wallet; a refund the wallet refuses is deferred to the
    /// repair log rather than failing the cancellation. Once the ledger has
    /// cancelled, the call reports success.
    pub async fn cancel_booking(
        &self,
        principal: &Principal,
        booking_id: &BookingId,
    ) -> BookingResult<Cancellation> {
        let _guard = self.lock_booking(booking_id).await;

        let canonical = self
            .contract
            .get_booking(&self.service_identity, booking_id)
            .await?;
        let owner = canonical.user_id.clone();
        if !principal.may_act_on(&owner) {
            return Err(BookingError::Forbidden(format!(
                "{principal} may not cancel booking {booking_id}"
            )));
        }
        if canonical.status == BookingStatus::Cancelled {
            return Err(BookingError::Conflict(format!(
                "booking {booking_id} is already cancelled"
            )));
        }

        let owner_identity = LedgerIdentity::from(&owner);
        self.contract
            .cancel_booking(&owner_identity, booking_id)
            .await?;
        let refund_amount = self.policy.refund_for(canonical.total_price);
        info!(
            booking_id = %booking_id,
            user_id = %owner,
            acting = %principal,
            refund = %refund_amount,
            "booking cancelled"
        );

        let wallet_refund = if canonical.is_payment_confirmed && refund_amount > Decimal::ZERO {
            self.refund_to_wallet(&owner, booking_id, refund_amount).await
        } else {
            WalletRefund::NotApplicable
        };

        let mut cancelled = canonical;
        cancelled.status = BookingStatus::Cancelled;
        cancelled.updated_at = Utc::now();
        let booking = self.read_back(&owner_identity, booking_id, cancelled).await;
        Ok(Cancellation {
            refund_amount,
            booking,
            wallet_refund,
        })
    }

    /// Booking with its ticket, including base and dynamic price.
    pub async fn get_booking(
        &self,
        principal: &Principal,
        booking_id: &BookingId,
    ) -> BookingResult<BookingView> {
        let booking = self
            .contract
            .get_booking(&self.service_identity, booking_id)
            .await?;
        if !principal.may_act_on(&booking.user_id) {
            return Err(BookingError::Forbidden(format!(
                "{principal} may not read booking {booking_id}"
            )));
        }
        let ticket = self
            .contract
            .get_ticket(&self.service_identity, &booking.ticket_id)
            .await?;
        Ok(BookingView {
            ticket: ticket.summary(true),
            booking,
        })
    }

    /// Bookings of `user` (the caller when `None`) as the mirror has them.
    pub async fn list_bookings(
        &self,
        principal: &Principal,
        user: Option<&UserId>,
    ) -> BookingResult<Vec<Booking>> {
        let user = user.unwrap_or(&principal.user_id);
        if !principal.may_act_on(user) {
            return Err(BookingError::Forbidden(format!(
                "{principal} may not list bookings of {user}"
            )));
        }
        Ok(self.mirror.find_bookings_by_user(user).await?)
    }

    /// Copy the canonical booking into the mirror. Safe to repeat.
    pub async fn repair_booking(
        &self,
        principal: &Principal,
        booking_id: &BookingId,
    ) -> BookingResult<Booking> {
        self.require_reconcile(principal)?;
        let _guard = self.lock_booking(booking_id).await;
        self.resync(booking_id).await
    }

    /// Retry every pending repair once.
    pub async fn reconcile(&self, principal: &Principal) -> BookingResult<ReconcileReport> {
        self.require_reconcile(principal)?;
        let mut report = ReconcileReport::default();

        for pending in self.repairs.pending() {
            let task = pending.task;
            let _guard = self.lock_booking(task.booking_id()).await;
            let outcome = match &task {
                RepairTask::MirrorUpsert { booking_id } => {
                    self.resync(booking_id).await.map(|_| ())
                }
                RepairTask::Refund {
                    user_id,
                    booking_id,
                    amount,
                    idempotency_key,
                } => self
                    .wallets
                    .refund(user_id, booking_id, *amount, idempotency_key)
                    .await
                    .map(|_| ())
                    .map_err(BookingError::from),
            };
            match outcome {
                Ok(()) => {
                    self.repairs.resolve(&task);
                    report.repaired.push(task);
                }
                Err(err) => self.repairs.record(task, &err),
            }
        }

        report.still_pending = self.repairs.pending();
        info!(
            repaired = report.repaired.len(),
            pending = report.still_pending.len(),
            "reconciliation pass complete"
        );
        Ok(report)
    }

    async fn resync(&self, booking_id: &BookingId) -> BookingResult<Booking> {
        let booking = self
            .contract
            .get_booking(&self.service_identity, booking_id)
            .await?;
        self.mirror.upsert_booking(&booking).await?;
        let task = RepairTask::MirrorUpsert {
            booking_id: booking_id.clone(),
        };
        if self.repairs.resolve(&task) {
            info!(booking_id = %booking_id, "mirror repaired");
        }
        Ok(booking)
    }

    async fn lock_booking(&self, booking_id: &BookingId) -> KeyedGuard {
        self.locks.lock(booking_id.as_str()).await
    }

    fn require_reconcile(&self, principal: &Principal) -> BookingResult<()> {
        if principal.can(Capability::Reconcile) {
            Ok(())
        } else {
            Err(BookingError::Forbidden(format!(
                "{principal} may not reconcile"
            )))
        }
    }

    /// Canonical state after a commit, copied into the mirror.
    ///
    /// If the read fails the commit still stands: `committed`, the state the
    /// transaction produced, is reported and the mirror is left for
    /// reconciliation.
    async fn read_back(
        &self,
        identity: &LedgerIdentity,
        booking_id: &BookingId,
        committed: Booking,
    ) -> Booking {
        match self.contract.get_booking(identity, booking_id).await {
            Ok(booking) => {
                self.mirror_write(&booking).await;
                booking
            }
            Err(err) => {
                warn!(booking_id = %booking_id, error = %err, "read-back after commit failed");
                self.repairs.record(
                    RepairTask::MirrorUpsert {
                        booking_id: booking_id.clone(),
                    },
                    &err,
                );
                committed
            }
        }
    }

    /// Best-effort mirror write; a failure is logged and queued for repair.
    async fn mirror_write(&self, booking: &Booking) {
        if let Err(err) = self.mirror.upsert_booking(booking).await {
            warn!(booking_id = %booking.id, error = %err, "mirror write failed");
            self.repairs.record(
                RepairTask::MirrorUpsert {
                    booking_id: booking.id.clone(),
                },
                &err,
            );
        }
    }

    async fn ticket_summary(&self, ticket_id: &TicketId) -> Option<TicketSummary> {
        match self
            .contract
            .get_ticket(&self.service_identity, ticket_id)
            .await
        {
            Ok(ticket) => Some(ticket.summary(false)),
            Err(err) => {
                warn!(ticket_id = %ticket_id, error = %err, "ticket unavailable for booking view");
                None
            }
        }
    }

    async fn confirmed_with(
        &self,
        identity: &LedgerIdentity,
        booking_id: &BookingId,
        reference: &PaymentReference,
    ) -> bool {
        matches!(
            self.contract.get_booking(identity, booking_id).await,
            Ok(b) if b.status == BookingStatus::Confirmed
                && b.payment_reference.as_ref() == Some(reference)
        )
    }

    /// First payment attempt on the booking whose debit was not reversed.
    ///
    /// A debit still waiting on a deferred reversal is reused and the
    /// reversal dropped, so the booking is charged once either way.
    fn payment_attempt(
        &self,
        owner: &UserId,
        booking_id: &BookingId,
    ) -> BookingResult<(u32, IdempotencyKey)> {
        let mut attempt = 0;
        loop {
            let key = IdempotencyKey::booking_payment(booking_id, attempt);
            let Some(debit) = self.wallets.applied(owner, &key)? else {
                return Ok((attempt, key));
            };
            let reversal = IdempotencyKey::booking_payment_reversal(booking_id, attempt);
            if self.wallets.applied(owner, &reversal)?.is_none() {
                let deferred = RepairTask::Refund {
                    user_id: owner.clone(),
                    booking_id: booking_id.clone(),
                    amount: debit.amount.abs(),
                    idempotency_key: reversal,
                };
                if self.repairs.resolve(&deferred) {
                    info!(booking_id = %booking_id, attempt, "reusing debit instead of reversing it");
                }
                return Ok((attempt, key));
            }
            attempt += 1;
        }
    }

    async fn reverse_debit(
        &self,
        owner: &UserId,
        booking_id: &BookingId,
        attempt: u32,
        amount: Decimal,
    ) {
        let key = IdempotencyKey::booking_payment_reversal(booking_id, attempt);
        if let Err(err) = self.wallets.refund(owner, booking_id, amount, &key).await {
            self.repairs.record(
                RepairTask::Refund {
                    user_id: owner.clone(),
                    booking_id: booking_id.clone(),
                    amount,
                    idempotency_key: key,
                },
                &err,
            );
        } else {
            info!(booking_id = %booking_id, user_id = %owner, amount = %amount, "wallet debit reversed");
        }
    }

    async fn refund_to_wallet(
        &self,
        owner: &UserId,
        booking_id: &BookingId,
        amount: Decimal,
    ) -> WalletRefund {
        let key = IdempotencyKey::booking_refund(booking_id);
        match self.wallets.refund(owner, booking_id, amount, &key).await {
            Ok(receipt) => WalletRefund::Credited {
                transaction_id: receipt.transaction.id,
            },
            Err(err) => {
                self.repairs.record(
                    RepairTask::Refund {
                        user_id: owner.clone(),
                        booking_id: booking_id.clone(),
                        amount,
                        idempotency_key: key,
                    },
                    &err,
                );
                WalletRefund::Deferred
            }
        }
    }

    /// A wallet payment retried after it already confirmed the booking.
    fn replayed_settlement(&self, current: Booking) -> BookingResult<WalletSettlement> {
        let conflict = || {
            BookingError::Conflict(format!("booking {} is {}", current.id, current.status))
        };
        if current.status != BookingStatus::Confirmed {
            return Err(conflict());
        }
        let reference = current.payment_reference.clone().ok_or_else(conflict)?;
        let payment = self
            .wallets
            .history(&current.user_id)?
            .into_iter()
            .find(|t| t.kind == TransactionKind::Payment && t.id == reference.as_str())
            .ok_or_else(conflict)?;
        let balance = self
            .wallets
            .wallets()?
            .into_iter()
            .find(|w| w.user_id == current.user_id)
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO);
        Ok(WalletSettlement {
            receipt: WalletReceipt {
                transaction: payment,
                balance,
                replayed: true,
            },
            booking: ConfirmedBooking {
                booking: current,
                ticket: None,
                replayed: true,
            },
        })
    }
}

/// `booking` as a payment confirmation under `reference` leaves it.
fn settled(mut booking: Booking, reference: &PaymentReference) -> Booking {
    booking.status = BookingStatus::Confirmed;
    booking.is_payment_confirmed = true;
    booking.payment_reference = Some(reference.clone());
    booking.updated_at = Utc::now();
    booking
}

/// Non-empty, trimmed, unique seat numbers. Fails before any ledger call.
fn validate_seats(seat_numbers: &[String]) -> BookingResult<Vec<String>> {
    if seat_numbers.is_empty() {
        return Err(BookingError::Validation(
            "at least one seat number is required".into(),
        ));
    }
    let mut seen = HashSet::new();
    let mut seats = Vec::with_capacity(seat_numbers.len());
    for raw in seat_numbers {
        let seat = raw.trim();
        if seat.is_empty() {
            return Err(BookingError::Validation("seat number must not be blank".into()));
        }
        if !seen.insert(seat.to_string()) {
            return Err(BookingError::Validation(format!("seat {seat} listed twice")));
        }
        seats.push(seat.to_string());
    }
    Ok(seats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_validation() {
        assert!(validate_seats(&[]).is_err());
        assert!(validate_seats(&["12A".into(), " 12A ".into()]).is_err());
        assert!(validate_seats(&["  ".into()]).is_err());
        assert_eq!(
            validate_seats(&[" 3 ".into(), "4".into()]).unwrap(),
            vec!["3".to_string(), "4".to_string()]
        );
    }
}
