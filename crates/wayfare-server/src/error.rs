use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use wayfare_booking::BookingError;
use wayfare_types::TypeError;
use wayfare_wallet::WalletError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Booking(#[from] BookingError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Booking(err) => booking_status(err),
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::Validation(_) => StatusCode::BAD_REQUEST,
        BookingError::Forbidden(_) => StatusCode::FORBIDDEN,
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::Conflict(_) => StatusCode::CONFLICT,
        BookingError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        BookingError::LedgerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BookingError::LedgerRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::IdentityNotFound(_)
        | BookingError::Wallet(_)
        | BookingError::Mirror(_)
        | BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<WalletError> for ServerError {
    fn from(err: WalletError) -> Self {
        Self::Booking(err.into())
    }
}

impl From<TypeError> for ServerError {
    fn from(err: TypeError) -> Self {
        Self::Booking(err.into())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
