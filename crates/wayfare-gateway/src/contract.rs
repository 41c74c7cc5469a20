use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::debug;
use wayfare_types::{Booking, BookingId, PaymentReference, Seat, Ticket, TicketId, UserId};

use crate::error::{GatewayError, GatewayResult};
use crate::identity::{IdentityRegistry, LedgerIdentity};
use crate::records::{
    Customer, CustomerRegistration, NewTicket, Provider, ProviderRegistration, Visibility,
};
use crate::traits::LedgerGateway;

#[derive(Clone, Copy, Debug)]
enum CallKind {
    Submit,
    Evaluate,
}

/// Typed client over the named travel contract operations.
///
/// Arguments are encoded the way the contract expects them: money as decimal
/// strings, timestamps as RFC 3339, seat lists as JSON arrays. Every call
/// checks that the identity is enrolled and runs under the configured
/// timeout. A timed-out call has no local side effects.
#[derive(Clone)]
pub struct ContractClient {
    gateway: Arc<dyn LedgerGateway>,
    identities: Arc<IdentityRegistry>,
    call_timeout: Duration,
}

impl ContractClient {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        identities: Arc<IdentityRegistry>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            identities,
            call_timeout,
        }
    }

    pub fn identities(&self) -> &Arc<IdentityRegistry> {
        &self.identities
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    // --- participants ---

    pub async fn register_customer(
        &self,
        identity: &LedgerIdentity,
        customer: &CustomerRegistration,
    ) -> GatewayResult<()> {
        let args = vec![
            customer.id.to_string(),
            customer.name.clone(),
            customer.email.clone(),
            customer.phone.clone(),
            customer.visibility.to_string(),
        ];
        self.submit(identity, "RegisterCustomer", args).await
    }

    pub async fn register_provider(
        &self,
        identity: &LedgerIdentity,
        provider: &ProviderRegistration,
    ) -> GatewayResult<()> {
        let args = vec![
            provider.id.to_string(),
            provider.name.clone(),
            provider.email.clone(),
            provider.phone.clone(),
            provider.transport_mode.to_string(),
        ];
        self.submit(identity, "RegisterProvider", args).await
    }

    pub async fn get_customer(
        &self,
        identity: &LedgerIdentity,
        id: &UserId,
    ) -> GatewayResult<Customer> {
        self.evaluate(identity, "GetCustomer", vec![id.to_string()]).await
    }

    pub async fn get_provider(
        &self,
        identity: &LedgerIdentity,
        id: &UserId,
    ) -> GatewayResult<Provider> {
        self.evaluate(identity, "GetProvider", vec![id.to_string()]).await
    }

    pub async fn update_customer_visibility(
        &self,
        identity: &LedgerIdentity,
        id: &UserId,
        visibility: Visibility,
    ) -> GatewayResult<()> {
        let args = vec![id.to_string(), visibility.to_string()];
        self.submit(identity, "UpdateCustomerVisibility", args).await
    }

    pub async fn update_provider_rating(
        &self,
        identity: &LedgerIdentity,
        id: &UserId,
        rating: Decimal,
    ) -> GatewayResult<()> {
        let args = vec![id.to_string(), rating.to_string()];
        self.submit(identity, "UpdateProviderRating", args).await
    }

    /// Overwrites the stored document under `key`. Admin only.
    pub async fn put_state<T: serde::Serialize>(
        &self,
        identity: &LedgerIdentity,
        key: &str,
        value: &T,
    ) -> GatewayResult<()> {
        let args = vec![key.to_string(), encode_json(value)?];
        self.submit(identity, "PutState", args).await
    }

    // --- tickets ---

    pub async fn create_ticket(
        &self,
        identity: &LedgerIdentity,
        ticket: &NewTicket,
    ) -> GatewayResult<()> {
        let seats = encode_json(&ticket.seat_numbers)?;
        let args = vec![
            ticket.id.to_string(),
            ticket.origin.clone(),
            ticket.destination.clone(),
            ticket.departure_time.to_rfc3339(),
            ticket.arrival_time.to_rfc3339(),
            ticket.price.to_string(),
            seats,
            ticket.provider.to_string(),
            ticket.transport_mode.to_string(),
        ];
        self.submit(identity, "CreateTicket", args).await
    }

    pub async fn get_ticket(
        &self,
        identity: &LedgerIdentity,
        id: &TicketId,
    ) -> GatewayResult<Ticket> {
        self.evaluate(identity, "GetTicket", vec![id.to_string()]).await
    }

    pub async fn update_dynamic_price(
        &self,
        identity: &LedgerIdentity,
        id: &TicketId,
    ) -> GatewayResult<()> {
        self.submit(identity, "UpdateDynamicPrice", vec![id.to_string()])
            .await
    }

    pub async fn query_tickets_by_provider(
        &self,
        identity: &LedgerIdentity,
        provider: &UserId,
    ) -> GatewayResult<Vec<Ticket>> {
        self.evaluate(identity, "QueryTicketsByProvider", vec![provider.to_string()])
            .await
    }

    pub async fn query_available_seats(
        &self,
        identity: &LedgerIdentity,
        ticket: &TicketId,
    ) -> GatewayResult<Vec<Seat>> {
        self.evaluate(identity, "QueryAvailableSeats", vec![ticket.to_string()])
            .await
    }

    // --- bookings ---

    pub async fn book_ticket(
        &self,
        identity: &LedgerIdentity,
        booking: &BookingId,
        ticket: &TicketId,
        customer: &UserId,
        seat_numbers: &[String],
    ) -> GatewayResult<()> {
        let args = vec![
            booking.to_string(),
            ticket.to_string(),
            customer.to_string(),
            encode_json(seat_numbers)?,
        ];
        self.submit(identity, "BookTicket", args).await
    }

    pub async fn get_booking(
        &self,
        identity: &LedgerIdentity,
        id: &BookingId,
    ) -> GatewayResult<Booking> {
        self.evaluate(identity, "GetBooking", vec![id.to_string()]).await
    }

    pub async fn confirm_payment(
        &self,
        identity: &LedgerIdentity,
        booking: &BookingId,
        reference: &PaymentReference,
    ) -> GatewayResult<()> {
        let args = vec![booking.to_string(), reference.to_string()];
        self.submit(identity, "ConfirmPayment", args).await
    }

    pub async fn cancel_booking(
        &self,
        identity: &LedgerIdentity,
        booking: &BookingId,
    ) -> GatewayResult<()> {
        self.submit(identity, "CancelBooking", vec![booking.to_string()])
            .await
    }

    pub async fn query_customer_bookings(
        &self,
        identity: &LedgerIdentity,
        customer: &UserId,
    ) -> GatewayResult<Vec<Booking>> {
        self.evaluate(identity, "QueryCustomerBookings", vec![customer.to_string()])
            .await
    }

    // --- plumbing ---

    async fn submit(
        &self,
        identity: &LedgerIdentity,
        transaction: &str,
        args: Vec<String>,
    ) -> GatewayResult<()> {
        self.call(CallKind::Submit, identity, transaction, args)
            .await
            .map(|_| ())
    }

    async fn evaluate<T: DeserializeOwned>(
        &self,
        identity: &LedgerIdentity,
        query: &str,
        args: Vec<String>,
    ) -> GatewayResult<T> {
        let bytes = self.call(CallKind::Evaluate, identity, query, args).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::Decode(format!("{query}: {e}")))
    }

    async fn call(
        &self,
        kind: CallKind,
        identity: &LedgerIdentity,
        name: &str,
        args: Vec<String>,
    ) -> GatewayResult<Vec<u8>> {
        if !self.identities.contains(identity) {
            return Err(GatewayError::IdentityNotFound(identity.to_string()));
        }
        debug!(identity = %identity, call = name, kind = ?kind, "ledger call");

        let fut = async {
            match kind {
                CallKind::Submit => self.gateway.submit(identity, name, &args).await,
                CallKind::Evaluate => self.gateway.evaluate(identity, name, &args).await,
            }
        };
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.call_timeout)),
        }
    }
}

fn encode_json<T: serde::Serialize + ?Sized>(value: &T) -> GatewayResult<String> {
    serde_json::to_string(value).map_err(|e| GatewayError::InvalidArgument(e.to_string()))
}
