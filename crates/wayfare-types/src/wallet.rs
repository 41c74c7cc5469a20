use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{BookingId, UserId};
use crate::money::Money;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Payment,
    Refund,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => f.write_str("DEPOSIT"),
            Self::Payment => f.write_str("PAYMENT"),
            Self::Refund => f.write_str("REFUND"),
        }
    }
}

/// One immutable entry of a wallet's transaction log.
///
/// `amount` is signed: deposits and refunds are positive, payments negative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub booking_id: Option<BookingId>,
    pub description: String,
}

impl WalletTransaction {
    pub fn deposit(amount: Money) -> Self {
        Self {
            id: new_transaction_id(),
            kind: TransactionKind::Deposit,
            amount,
            timestamp: Utc::now(),
            booking_id: None,
            description: "Added funds to wallet".into(),
        }
    }

    pub fn payment(booking: &BookingId, amount: Money) -> Self {
        Self {
            id: new_transaction_id(),
            kind: TransactionKind::Payment,
            amount: -amount,
            timestamp: Utc::now(),
            booking_id: Some(booking.clone()),
            description: format!("Payment for booking {booking}"),
        }
    }

    pub fn refund(booking: &BookingId, amount: Money) -> Self {
        Self {
            id: new_transaction_id(),
            kind: TransactionKind::Refund,
            amount,
            timestamp: Utc::now(),
            booking_id: Some(booking.clone()),
            description: format!("Refund for booking {booking}"),
        }
    }
}

fn new_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::now_v7())
}

/// A user's virtual wallet: balance plus append-only log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: UserId,
    #[serde(with = "rust_decimal::serde::str")]
    pub starting_balance: Money,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Money,
    pub transactions: Vec<WalletTransaction>,
}

impl Wallet {
    pub fn open(user_id: UserId, starting_balance: Money) -> Self {
        Self {
            user_id,
            starting_balance,
            balance: starting_balance,
            transactions: Vec::new(),
        }
    }

    /// Append an entry and move the balance by its signed amount.
    pub fn apply(&mut self, entry: WalletTransaction) {
        self.balance += entry.amount;
        self.transactions.push(entry);
    }

    /// Balance recomputed from the log alone.
    pub fn replayed_balance(&self) -> Money {
        self.transactions
            .iter()
            .fold(self.starting_balance, |acc, t| acc + t.amount)
    }

    /// `balance == starting + deposits + refunds - payments`.
    pub fn is_consistent(&self) -> bool {
        self.balance == self.replayed_balance() && self.balance >= Decimal::ZERO
    }

    pub fn transactions_for_booking<'a>(
        &'a self,
        booking: &'a BookingId,
    ) -> impl Iterator<Item = &'a WalletTransaction> {
        self.transactions
            .iter()
            .filter(move |t| t.booking_id.as_ref() == Some(booking))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payments_are_negative_entries() {
        let booking = BookingId::new("b1").unwrap();
        let tx = WalletTransaction::payment(&booking, Decimal::from(40));
        assert_eq!(tx.amount, Decimal::from(-40));
        assert_eq!(tx.kind, TransactionKind::Payment);
        assert!(tx.id.starts_with("tx_"));
    }

    #[test]
    fn apply_keeps_balance_equal_to_replay() {
        let booking = BookingId::new("b1").unwrap();
        let mut w = Wallet::open(UserId::new("u").unwrap(), Decimal::from(1000));
        w.apply(WalletTransaction::deposit(Decimal::from(25)));
        w.apply(WalletTransaction::payment(&booking, Decimal::from(100)));
        w.apply(WalletTransaction::refund(&booking, Decimal::from(80)));
        assert_eq!(w.balance, Decimal::from(1005));
        assert!(w.is_consistent());
        assert_eq!(w.transactions_for_booking(&booking).count(), 2);
    }

    #[test]
    fn transaction_json_shape() {
        let tx = WalletTransaction::deposit(Decimal::new(1050, 2));
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "DEPOSIT");
        assert_eq!(json["amount"], "10.50");
    }
}
