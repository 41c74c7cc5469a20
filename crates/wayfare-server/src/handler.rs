use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;
use wayfare_booking::{
    BookingError, BookingManager, BookingView, Cancellation, ConfirmedBooking, CreatedBooking,
    ReconcileReport, WalletSettlement,
};
use wayfare_types::{
    Booking, BookingId, Capability, IdempotencyKey, Money, PaymentReference, Principal, TicketId,
    UserId, Wallet,
};
use wayfare_wallet::WalletReceipt;

use crate::auth::{AuthProvider, Authenticated};
use crate::error::{ServerError, ServerResult};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BookingManager>,
    pub auth: Arc<dyn AuthProvider>,
    pub channel: String,
    pub chaincode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub ticket_id: TicketId,
    pub seat_numbers: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub payment_reference: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBookingsQuery {
    pub user_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingAmountRequest {
    pub booking_id: BookingId,
    pub amount: Money,
    /// Refunds only: the wallet to credit, when not the caller's own.
    #[serde(default)]
    pub user_id: Option<UserId>,
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let policy = state.manager.policy();
    Json(json!({
        "name": "wayfare-server",
        "version": env!("CARGO_PKG_VERSION"),
        "channel": state.channel,
        "chaincode": state.chaincode,
        "cancellationFee": policy.cancellation_fee,
        "startingBalance": policy.starting_balance,
        "durableWallets": state.manager.wallets().is_durable(),
    }))
}

// --- bookings ---

pub async fn create_booking(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Json(req): Json<CreateBookingRequest>,
) -> ServerResult<(StatusCode, Json<CreatedBooking>)> {
    let created = state
        .manager
        .create_booking(&principal, &req.ticket_id, &req.seat_numbers)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(query): Query<ListBookingsQuery>,
) -> ServerResult<Json<Vec<Booking>>> {
    let bookings = state
        .manager
        .list_bookings(&principal, query.user_id.as_ref())
        .await?;
    Ok(Json(bookings))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ServerResult<Json<BookingView>> {
    let id = BookingId::new(id)?;
    Ok(Json(state.manager.get_booking(&principal, &id).await?))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> ServerResult<Json<ConfirmedBooking>> {
    let id = BookingId::new(id)?;
    let reference = PaymentReference::new(req.payment_reference)?;
    let confirmed = state
        .manager
        .confirm_payment(&principal, &id, &reference)
        .await?;
    Ok(Json(confirmed))
}

pub async fn pay_with_wallet(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ServerResult<Json<WalletSettlement>> {
    let id = BookingId::new(id)?;
    Ok(Json(state.manager.pay_with_wallet(&principal, &id).await?))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ServerResult<Json<Cancellation>> {
    let id = BookingId::new(id)?;
    Ok(Json(state.manager.cancel_booking(&principal, &id).await?))
}

pub async fn repair_booking(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ServerResult<Json<Booking>> {
    let id = BookingId::new(id)?;
    Ok(Json(state.manager.repair_booking(&principal, &id).await?))
}

pub async fn reconcile(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ServerResult<Json<ReconcileReport>> {
    Ok(Json(state.manager.reconcile(&principal).await?))
}

// --- wallet ---

pub async fn init_wallet(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ServerResult<(StatusCode, Json<Wallet>)> {
    require_wallet(&principal)?;
    let wallet = state.manager.wallets().initialize(&principal.user_id).await?;
    Ok((StatusCode::CREATED, Json(wallet)))
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ServerResult<Json<Wallet>> {
    require_wallet(&principal)?;
    Ok(Json(
        state.manager.wallets().get_balance(&principal.user_id).await?,
    ))
}

pub async fn deposit(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Json(req): Json<DepositRequest>,
) -> ServerResult<Json<WalletReceipt>> {
    require_wallet(&principal)?;
    let receipt = state
        .manager
        .wallets()
        .deposit(&principal.user_id, req.amount)
        .await?;
    Ok(Json(receipt))
}

pub async fn debit(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    headers: HeaderMap,
    Json(req): Json<BookingAmountRequest>,
) -> ServerResult<Json<WalletReceipt>> {
    require_wallet(&principal)?;
    let key = idempotency_key(&headers)?;
    let receipt = state
        .manager
        .wallets()
        .debit(&principal.user_id, &req.booking_id, req.amount, &key)
        .await?;
    Ok(Json(receipt))
}

/// Credit a wallet for a booking; the caller's own unless `userId` is given.
/// Refunds are issued by operators only.
pub async fn refund(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    headers: HeaderMap,
    Json(req): Json<BookingAmountRequest>,
) -> ServerResult<Json<WalletReceipt>> {
    let key = idempotency_key(&headers)?;
    if !principal.can(Capability::Reconcile) {
        return Err(BookingError::Forbidden(format!("{principal} may not issue refunds")).into());
    }
    let user = req.user_id.unwrap_or_else(|| principal.user_id.clone());
    let receipt = state
        .manager
        .wallets()
        .refund(&user, &req.booking_id, req.amount, &key)
        .await?;
    Ok(Json(receipt))
}

fn require_wallet(principal: &Principal) -> ServerResult<()> {
    if principal.can(Capability::UseWallet) {
        Ok(())
    } else {
        Err(BookingError::Forbidden(format!("{principal} has no wallet")).into())
    }
}

fn idempotency_key(headers: &HeaderMap) -> ServerResult<IdempotencyKey> {
    let raw = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::BadRequest("Idempotency-Key header is required".into()))?;
    Ok(IdempotencyKey::client(raw)?)
}
