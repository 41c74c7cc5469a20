use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use wayfare_types::{
    Booking, BookingId, BookingStatus, PaymentReference, Seat, SeatStatus, Ticket, TicketId,
    TransportMode, UserId,
};

use crate::error::{GatewayError, GatewayResult};
use crate::identity::LedgerIdentity;
use crate::pricing::dynamic_price;
use crate::records::{Customer, Provider, Visibility};
use crate::traits::LedgerGateway;

const TICKET_AVAILABLE: &str = "Available";
const TICKET_BOOKED: &str = "Booked";

/// A transaction the simulator committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedTransaction {
    pub identity: LedgerIdentity,
    pub name: String,
    pub args: Vec<String>,
}

/// In-process travel contract for tests, local demos, and `--in-memory` mode.
///
/// World state is a key/value map of JSON documents, like the contract's own
/// state database. Each submit runs against a staged view and commits all of
/// its writes at once, or none. Faults can be injected to exercise the
/// partial-failure paths of callers.
pub struct InMemoryLedger {
    admin: LedgerIdentity,
    state: RwLock<BTreeMap<String, Vec<u8>>>,
    committed: Mutex<Vec<SubmittedTransaction>>,
    available: AtomicBool,
    next_submit_failure: Mutex<Option<GatewayError>>,
    next_evaluate_failure: Mutex<Option<GatewayError>>,
    latency: Mutex<Duration>,
    evaluations: AtomicUsize,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(LedgerIdentity::new("admin"))
    }
}

impl InMemoryLedger {
    pub fn new(admin: LedgerIdentity) -> Self {
        Self {
            admin,
            state: RwLock::new(BTreeMap::new()),
            committed: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            next_submit_failure: Mutex::new(None),
            next_evaluate_failure: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn admin(&self) -> &LedgerIdentity {
        &self.admin
    }

    /// Toggle reachability; while unavailable every call fails transiently.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// The next submit fails with `error` without touching world state.
    pub fn fail_next_submit(&self, error: GatewayError) {
        *self
            .next_submit_failure
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(error);
    }

    pub fn fail_next_evaluate(&self, error: GatewayError) {
        *self
            .next_evaluate_failure
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(error);
    }

    /// Delay applied before every call is processed.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
    }

    pub fn submitted(&self) -> Vec<SubmittedTransaction> {
        self.committed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn submit_count(&self) -> usize {
        self.committed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    pub fn submit_count_of(&self, name: &str) -> usize {
        self.committed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|t| t.name == name)
            .count()
    }

    pub fn evaluate_count(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    fn gate(&self, slot: &Mutex<Option<GatewayError>>) -> GatewayResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(GatewayError::LedgerUnavailable(
                "no peers reachable".into(),
            ));
        }
        match slot.lock().unwrap_or_else(|p| p.into_inner()).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap_or_else(|p| p.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn is_admin(&self, identity: &LedgerIdentity) -> bool {
        identity == &self.admin
    }

    fn require_self_or_admin(&self, identity: &LedgerIdentity, subject: &str) -> GatewayResult<()> {
        if identity.as_str() == subject || self.is_admin(identity) {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized(format!(
                "{identity} may not act for {subject}"
            )))
        }
    }

    fn execute(
        &self,
        tx: &mut WorldTx<'_>,
        identity: &LedgerIdentity,
        name: &str,
        args: &[String],
    ) -> GatewayResult<()> {
        match name {
            "RegisterCustomer" => {
                let [id, name, email, phone, visibility] = take_args::<5>(name, args)?;
                self.require_self_or_admin(identity, id)?;
                let visibility = Visibility::from_str(visibility)
                    .map_err(|e| GatewayError::InvalidArgument(e.to_string()))?;
                if tx.exists(id) {
                    return Err(GatewayError::LedgerRejected(format!(
                        "customer {id} already exists"
                    )));
                }
                let customer = Customer {
                    id: user_id(id)?,
                    name: name.to_string(),
                    email: email.to_string(),
                    phone: phone.to_string(),
                    visibility,
                    registered_date: tx.now,
                    is_active: true,
                    booking_history: Vec::new(),
                };
                tx.put(id, &customer)
            }
            "RegisterProvider" => {
                let [id, name, email, phone, mode] = take_args::<5>(name, args)?;
                self.require_self_or_admin(identity, id)?;
                let transport_mode = TransportMode::from_str(mode)
                    .map_err(|e| GatewayError::InvalidArgument(e.to_string()))?;
                if tx.exists(id) {
                    return Err(GatewayError::LedgerRejected(format!(
                        "provider {id} already exists"
                    )));
                }
                let provider = Provider {
                    id: user_id(id)?,
                    name: name.to_string(),
                    email: email.to_string(),
                    phone: phone.to_string(),
                    transport_mode,
                    rating: Decimal::ZERO,
                    total_ratings: 0,
                    registered_date: tx.now,
                    is_active: true,
                    transport_list: Vec::new(),
                };
                tx.put(id, &provider)
            }
            "UpdateCustomerVisibility" => {
                let [id, visibility] = take_args::<2>(name, args)?;
                self.require_self_or_admin(identity, id)?;
                let mut customer: Customer = tx.get(id)?;
                customer.visibility = Visibility::from_str(visibility)
                    .map_err(|e| GatewayError::InvalidArgument(e.to_string()))?;
                tx.put(id, &customer)
            }
            "UpdateProviderRating" => {
                let [id, rating] = take_args::<2>(name, args)?;
                let rating = decimal_arg("rating", rating)?;
                if rating < Decimal::ZERO || rating > Decimal::from(5) {
                    return Err(GatewayError::InvalidArgument(format!(
                        "rating {rating} must be between 0 and 5"
                    )));
                }
                let mut provider: Provider = tx.get(id)?;
                let previous = Decimal::from(provider.total_ratings);
                provider.total_ratings += 1;
                provider.rating =
                    (provider.rating * previous + rating) / Decimal::from(provider.total_ratings);
                tx.put(id, &provider)
            }
            "PutState" => {
                let [key, json] = take_args::<2>(name, args)?;
                if !self.is_admin(identity) {
                    return Err(GatewayError::Unauthorized(format!(
                        "{identity} may not overwrite state"
                    )));
                }
                let value: serde_json::Value = serde_json::from_str(json)
                    .map_err(|e| GatewayError::InvalidArgument(format!("state value: {e}")))?;
                tx.put(key, &value)
            }
            "CreateTicket" => self.create_ticket(tx, identity, args),
            "UpdateDynamicPrice" => {
                let [id] = take_args::<1>(name, args)?;
                let mut ticket: Ticket = tx.get(id)?;
                self.require_self_or_admin(identity, ticket.service_provider.as_str())?;
                ticket.dynamic_price = dynamic_price(
                    ticket.price,
                    ticket.total_seats,
                    ticket.available_seats,
                    ticket.departure_time,
                    tx.now,
                );
                ticket.updated_at = tx.now;
                tx.put(id, &ticket)
            }
            "BookTicket" => self.book_ticket(tx, identity, args),
            "ConfirmPayment" => {
                let [id, reference] = take_args::<2>(name, args)?;
                let reference = PaymentReference::new(reference)
                    .map_err(|e| GatewayError::InvalidArgument(e.to_string()))?;
                let mut booking: Booking = tx.get(id)?;
                self.require_self_or_admin(identity, booking.user_id.as_str())?;
                if booking.status != BookingStatus::Pending {
                    return Err(GatewayError::LedgerRejected(format!(
                        "booking {id} is not in pending state"
                    )));
                }
                booking
                    .transition(BookingStatus::Confirmed, tx.now)
                    .map_err(|e| GatewayError::LedgerRejected(e.to_string()))?;
                booking.is_payment_confirmed = true;
                booking.payment_reference = Some(reference);
                tx.put(id, &booking)
            }
            "CancelBooking" => self.cancel_booking(tx, identity, args),
            other => Err(GatewayError::InvalidArgument(format!(
                "unknown transaction {other}"
            ))),
        }
    }

    fn create_ticket(
        &self,
        tx: &mut WorldTx<'_>,
        identity: &LedgerIdentity,
        args: &[String],
    ) -> GatewayResult<()> {
        let [id, origin, destination, departure, arrival, price, seats, provider_id, mode] =
            take_args::<9>("CreateTicket", args)?;
        if [id, origin, destination, provider_id].iter().any(|s| s.trim().is_empty()) {
            return Err(GatewayError::InvalidArgument(
                "all fields are required for ticket creation".into(),
            ));
        }
        self.require_self_or_admin(identity, provider_id)?;
        if tx.exists(id) {
            return Err(GatewayError::LedgerRejected(format!(
                "ticket {id} already exists"
            )));
        }

        let mut provider: Provider = tx.get(provider_id)?;
        if !provider.is_active {
            return Err(GatewayError::LedgerRejected(format!(
                "provider {provider_id} is not active"
            )));
        }
        let transport_mode = TransportMode::from_str(mode)
            .map_err(|e| GatewayError::InvalidArgument(e.to_string()))?;
        let price = decimal_arg("price", price)?;
        if price <= Decimal::ZERO {
            return Err(GatewayError::InvalidArgument(
                "price must be greater than 0".into(),
            ));
        }
        let departure_time = time_arg("departure", departure)?;
        let arrival_time = time_arg("arrival", arrival)?;
        if departure_time > arrival_time {
            return Err(GatewayError::InvalidArgument(
                "departure time must be before arrival time".into(),
            ));
        }

        let numbers: Vec<String> = serde_json::from_str(seats)
            .map_err(|e| GatewayError::InvalidArgument(format!("seat numbers: {e}")))?;
        let unique: HashSet<&String> = numbers.iter().collect();
        if numbers.is_empty() || unique.len() != numbers.len() {
            return Err(GatewayError::InvalidArgument(
                "seat numbers must be non-empty and unique".into(),
            ));
        }

        let ticket_id = ticket_id(id)?;
        let seats: Vec<Seat> = numbers
            .iter()
            .map(|number| Seat {
                id: Ticket::seat_id(&ticket_id, number),
                number: number.clone(),
                status: SeatStatus::Vacant,
                booked_by: None,
            })
            .collect();
        let total = seats.len() as u32;
        let ticket = Ticket {
            id: ticket_id.clone(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_time,
            arrival_time,
            price,
            dynamic_price: price,
            available_seats: total,
            total_seats: total,
            seats,
            service_provider: provider.id.clone(),
            transport_mode,
            status: TICKET_AVAILABLE.to_string(),
            created_at: tx.now,
            updated_at: tx.now,
        };
        provider.transport_list.push(ticket_id);
        tx.put(id, &ticket)?;
        tx.put(provider_id, &provider)
    }

    fn book_ticket(
        &self,
        tx: &mut WorldTx<'_>,
        identity: &LedgerIdentity,
        args: &[String],
    ) -> GatewayResult<()> {
        let [booking_id, ticket_key, customer_id, seats] = take_args::<4>("BookTicket", args)?;
        self.require_self_or_admin(identity, customer_id)?;
        if tx.exists(booking_id) {
            return Err(GatewayError::LedgerRejected(format!(
                "booking {booking_id} already exists"
            )));
        }
        let numbers: Vec<String> = serde_json::from_str(seats)
            .map_err(|e| GatewayError::InvalidArgument(format!("seat numbers: {e}")))?;
        if numbers.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "at least one seat is required".into(),
            ));
        }

        let mut ticket: Ticket = tx.get(ticket_key)?;
        if ticket.status != TICKET_AVAILABLE {
            return Err(GatewayError::LedgerRejected(format!(
                "ticket {ticket_key} is not available for booking"
            )));
        }
        let mut customer: Customer = tx.get(customer_id)?;
        if !customer.is_active {
            return Err(GatewayError::LedgerRejected(format!(
                "customer {customer_id} is not active"
            )));
        }

        let mut seat_ids = Vec::with_capacity(numbers.len());
        for number in &numbers {
            let seat = ticket
                .seats
                .iter_mut()
                .find(|s| &s.number == number)
                .ok_or_else(|| GatewayError::LedgerRejected(format!("seat {number} not found")))?;
            if seat.status != SeatStatus::Vacant {
                return Err(GatewayError::LedgerRejected(format!(
                    "seat {number} is not available"
                )));
            }
            seat.status = SeatStatus::Booked;
            seat.booked_by = Some(customer.id.clone());
            seat_ids.push(seat.id.clone());
        }

        let count = numbers.len() as u32;
        ticket.available_seats = ticket.available_seats.saturating_sub(count);
        if ticket.available_seats == 0 {
            ticket.status = TICKET_BOOKED.to_string();
        }
        ticket.updated_at = tx.now;

        let id = BookingId::new(booking_id)
            .map_err(|e| GatewayError::InvalidArgument(e.to_string()))?;
        let booking = Booking {
            id: id.clone(),
            ticket_id: ticket.id.clone(),
            user_id: customer.id.clone(),
            seat_ids,
            number_of_seats: count,
            total_price: ticket.dynamic_price * Decimal::from(count),
            status: BookingStatus::Pending,
            is_payment_confirmed: false,
            payment_reference: None,
            created_at: tx.now,
            updated_at: tx.now,
        };
        customer.booking_history.push(id);

        tx.put(booking_id, &booking)?;
        tx.put(ticket_key, &ticket)?;
        tx.put(customer_id, &customer)
    }

    fn cancel_booking(
        &self,
        tx: &mut WorldTx<'_>,
        identity: &LedgerIdentity,
        args: &[String],
    ) -> GatewayResult<()> {
        let [booking_id] = take_args::<1>("CancelBooking", args)?;
        let mut booking: Booking = tx.get(booking_id)?;
        if !identity.is(&booking.user_id) {
            return Err(GatewayError::Unauthorized(format!(
                "{identity} does not own booking {booking_id}"
            )));
        }
        booking
            .transition(BookingStatus::Cancelled, tx.now)
            .map_err(|e| GatewayError::LedgerRejected(e.to_string()))?;

        let ticket_key = booking.ticket_id.to_string();
        let mut ticket: Ticket = tx.get(&ticket_key)?;
        for seat in ticket
            .seats
            .iter_mut()
            .filter(|s| booking.seat_ids.contains(&s.id))
        {
            if seat.status == SeatStatus::Booked {
                seat.status = SeatStatus::Vacant;
                seat.booked_by = None;
                ticket.available_seats += 1;
            }
        }
        if ticket.status == TICKET_BOOKED && ticket.available_seats > 0 {
            ticket.status = TICKET_AVAILABLE.to_string();
        }
        ticket.updated_at = tx.now;

        let owner_key = booking.user_id.to_string();
        if tx.exists(&owner_key) {
            let mut customer: Customer = tx.get(&owner_key)?;
            customer.booking_history.retain(|b| b != &booking.id);
            tx.put(&owner_key, &customer)?;
        }
        tx.put(&ticket_key, &ticket)?;
        tx.put(booking_id, &booking)
    }

    fn query(
        &self,
        state: &BTreeMap<String, Vec<u8>>,
        name: &str,
        args: &[String],
    ) -> GatewayResult<Vec<u8>> {
        let view = WorldTx::new(state, Utc::now());
        match name {
            "GetCustomer" => {
                let [id] = take_args::<1>(name, args)?;
                encode(&view.get::<Customer>(id)?)
            }
            "GetProvider" => {
                let [id] = take_args::<1>(name, args)?;
                encode(&view.get::<Provider>(id)?)
            }
            "GetTicket" => {
                let [id] = take_args::<1>(name, args)?;
                encode(&view.get::<Ticket>(id)?)
            }
            "GetBooking" => {
                let [id] = take_args::<1>(name, args)?;
                encode(&view.get::<Booking>(id)?)
            }
            "QueryTicketsByProvider" => {
                let [provider] = take_args::<1>(name, args)?;
                let tickets: Vec<Ticket> = view
                    .scan::<Ticket>()
                    .filter(|t| t.service_provider.as_str() == provider)
                    .collect();
                encode(&tickets)
            }
            "QueryAvailableSeats" => {
                let [id] = take_args::<1>(name, args)?;
                let ticket: Ticket = view.get(id)?;
                let seats: Vec<&Seat> = ticket.vacant_seats().collect();
                encode(&seats)
            }
            "QueryCustomerBookings" => {
                let [customer] = take_args::<1>(name, args)?;
                let bookings: Vec<Booking> = view
                    .scan::<Booking>()
                    .filter(|b| b.user_id.as_str() == customer)
                    .collect();
                encode(&bookings)
            }
            other => Err(GatewayError::InvalidArgument(format!(
                "unknown query {other}"
            ))),
        }
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn submit(
        &self,
        identity: &LedgerIdentity,
        transaction: &str,
        args: &[String],
    ) -> GatewayResult<Vec<u8>> {
        self.delay().await;
        self.gate(&self.next_submit_failure)?;

        let mut state = self
            .state
            .write()
            .map_err(|_| GatewayError::LedgerUnavailable("world state lock poisoned".into()))?;
        let writes = {
            let mut tx = WorldTx::new(&state, Utc::now());
            self.execute(&mut tx, identity, transaction, args)?;
            tx.writes
        };
        debug!(
            identity = %identity,
            transaction,
            keys = writes.len(),
            "committed transaction"
        );
        state.extend(writes);
        drop(state);

        self.committed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(SubmittedTransaction {
                identity: identity.clone(),
                name: transaction.to_string(),
                args: args.to_vec(),
            });
        Ok(Vec::new())
    }

    async fn evaluate(
        &self,
        _identity: &LedgerIdentity,
        query: &str,
        args: &[String],
    ) -> GatewayResult<Vec<u8>> {
        self.delay().await;
        self.gate(&self.next_evaluate_failure)?;
        self.evaluations.fetch_add(1, Ordering::SeqCst);

        let state = self
            .state
            .read()
            .map_err(|_| GatewayError::LedgerUnavailable("world state lock poisoned".into()))?;
        self.query(&state, query, args)
    }
}

/// Staged view over world state; writes shadow committed values.
struct WorldTx<'a> {
    committed: &'a BTreeMap<String, Vec<u8>>,
    writes: BTreeMap<String, Vec<u8>>,
    now: DateTime<Utc>,
}

impl<'a> WorldTx<'a> {
    fn new(committed: &'a BTreeMap<String, Vec<u8>>, now: DateTime<Utc>) -> Self {
        Self {
            committed,
            writes: BTreeMap::new(),
            now,
        }
    }

    fn raw(&self, key: &str) -> Option<&Vec<u8>> {
        self.writes.get(key).or_else(|| self.committed.get(key))
    }

    fn exists(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> GatewayResult<T> {
        let bytes = self
            .raw(key)
            .ok_or_else(|| GatewayError::AssetNotFound(key.to_string()))?;
        serde_json::from_slice(bytes).map_err(|e| GatewayError::Decode(format!("{key}: {e}")))
    }

    fn put<T: Serialize>(&mut self, key: &str, value: &T) -> GatewayResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| GatewayError::Decode(format!("{key}: {e}")))?;
        self.writes.insert(key.to_string(), bytes);
        Ok(())
    }

    /// Every committed document that decodes as `T`.
    fn scan<T: DeserializeOwned>(&self) -> impl Iterator<Item = T> + '_ {
        self.committed
            .values()
            .filter_map(|bytes| serde_json::from_slice(bytes).ok())
    }
}

fn take_args<'a, const N: usize>(name: &str, args: &'a [String]) -> GatewayResult<[&'a str; N]> {
    if args.len() != N {
        return Err(GatewayError::InvalidArgument(format!(
            "{name} expects {N} arguments, got {}",
            args.len()
        )));
    }
    Ok(std::array::from_fn(|i| args[i].as_str()))
}

fn decimal_arg(field: &str, raw: &str) -> GatewayResult<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| GatewayError::InvalidArgument(format!("{field}: {e}")))
}

fn time_arg(field: &str, raw: &str) -> GatewayResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GatewayError::InvalidArgument(format!("{field} time: {e}")))
}

fn user_id(raw: &str) -> GatewayResult<UserId> {
    UserId::new(raw).map_err(|e| GatewayError::InvalidArgument(e.to_string()))
}

fn ticket_id(raw: &str) -> GatewayResult<TicketId> {
    TicketId::new(raw).map_err(|e| GatewayError::InvalidArgument(e.to_string()))
}

fn encode<T: Serialize + ?Sized>(value: &T) -> GatewayResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| GatewayError::Decode(e.to_string()))
}
