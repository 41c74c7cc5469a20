use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all Wayfare endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route(
            "/v1/bookings",
            get(handler::list_bookings).post(handler::create_booking),
        )
        .route("/v1/bookings/:id", get(handler::get_booking))
        .route("/v1/bookings/:id/confirm", post(handler::confirm_payment))
        .route("/v1/bookings/:id/pay", post(handler::pay_with_wallet))
        .route("/v1/bookings/:id/cancel", post(handler::cancel_booking))
        .route("/v1/bookings/:id/repair", post(handler::repair_booking))
        .route("/v1/reconcile", post(handler::reconcile))
        .route("/v1/wallet", get(handler::get_wallet))
        .route("/v1/wallet/init", post(handler::init_wallet))
        .route("/v1/wallet/deposit", post(handler::deposit))
        .route("/v1/wallet/debit", post(handler::debit))
        .route("/v1/wallet/refund", post(handler::refund))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
