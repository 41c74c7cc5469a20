//! Results of booking operations, shaped for API responses.

use serde::{Deserialize, Serialize};
use wayfare_mirror::{PendingRepair, RepairTask};
use wayfare_types::{Booking, Money, TicketSummary};
use wayfare_wallet::WalletReceipt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBooking {
    #[serde(flatten)]
    pub booking: Booking,
    pub payment_required: bool,
}

/// Booking after payment confirmation, with the ticket it is for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedBooking {
    #[serde(flatten)]
    pub booking: Booking,
    /// Absent if the ticket could not be read after the confirmation
    /// committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketSummary>,
    /// The payment was already confirmed with this reference; nothing was
    /// submitted.
    pub replayed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum WalletRefund {
    /// The booking was never paid, so nothing is owed.
    NotApplicable,
    #[serde(rename_all = "camelCase")]
    Credited { transaction_id: String },
    /// The wallet did not accept the credit; it waits in the repair log.
    Deferred,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub refund_amount: Money,
    pub booking: Booking,
    pub wallet_refund: WalletRefund,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub ticket: TicketSummary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSettlement {
    pub booking: ConfirmedBooking,
    pub receipt: WalletReceipt,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub repaired: Vec<RepairTask>,
    pub still_pending: Vec<PendingRepair>,
}
