use std::collections::HashMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wayfare_types::{
    ensure_positive, BookingId, IdempotencyKey, KeyedLocks, Money, TransactionKind, UserId,
    Wallet, WalletTransaction,
};

use crate::error::{WalletError, WalletResult};
use crate::journal::{CompactionStats, JournalEvent, JournalRecord, SyncMode, WalletJournal};

/// Outcome of a wallet mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletReceipt {
    pub transaction: WalletTransaction,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Money,
    /// `true` when an earlier call with the same idempotency key is being
    /// reported again and nothing was applied.
    pub replayed: bool,
}

/// One balance and transaction log per user.
///
/// Mutations on a user's wallet are serialized by a per-user lock; different
/// users proceed in parallel. With a journal attached, every mutation is
/// appended and flushed before it is applied in memory, so a reported
/// success is always durable and a crash never leaves a balance the journal
/// cannot reproduce. Idempotency keys are scoped to the wallet they were
/// used on.
pub struct WalletLedger {
    starting_balance: Money,
    wallets: RwLock<HashMap<UserId, Wallet>>,
    applied: RwLock<HashMap<(UserId, IdempotencyKey), WalletTransaction>>,
    locks: KeyedLocks,
    journal: Option<WalletJournal>,
}

impl WalletLedger {
    /// A wallet ledger without durability, for tests and demos.
    pub fn in_memory(starting_balance: Money) -> Self {
        Self {
            starting_balance,
            wallets: RwLock::new(HashMap::new()),
            applied: RwLock::new(HashMap::new()),
            locks: KeyedLocks::new(),
            journal: None,
        }
    }

    /// Open the journal at `path` and rebuild every wallet from it.
    pub fn open(path: &Path, starting_balance: Money, sync_mode: SyncMode) -> WalletResult<Self> {
        let journal = WalletJournal::open(path, sync_mode)?;
        let records = journal.recover()?;
        let mut ledger = Self::in_memory(starting_balance);
        ledger.replay(records)?;
        ledger.journal = Some(journal);
        info!(
            path = %path.display(),
            wallets = ledger.wallet_count(),
            "wallet journal replayed"
        );
        Ok(ledger)
    }

    fn replay(&mut self, records: Vec<JournalRecord>) -> WalletResult<()> {
        let wallets = self
            .wallets
            .get_mut()
            .map_err(|e| WalletError::Internal(format!("lock poisoned: {e}")))?;
        let applied = self
            .applied
            .get_mut()
            .map_err(|e| WalletError::Internal(format!("lock poisoned: {e}")))?;

        for record in records {
            match record.event {
                JournalEvent::Opened { starting_balance } => {
                    if wallets.contains_key(&record.user_id) {
                        warn!(seq = record.seq, user_id = %record.user_id, "duplicate open record");
                        continue;
                    }
                    wallets.insert(
                        record.user_id.clone(),
                        Wallet::open(record.user_id, starting_balance),
                    );
                }
                JournalEvent::Entry {
                    transaction,
                    idempotency_key,
                } => {
                    let wallet = wallets.entry(record.user_id.clone()).or_insert_with(|| {
                        warn!(
                            seq = record.seq,
                            user_id = %record.user_id,
                            "entry for wallet with no open record"
                        );
                        Wallet::open(record.user_id.clone(), self.starting_balance)
                    });
                    wallet.apply(transaction.clone());
                    if let Some(key) = idempotency_key {
                        applied.insert((record.user_id, key), transaction);
                    }
                }
            }
        }

        for wallet in wallets.values() {
            if !wallet.is_consistent() {
                warn!(user_id = %wallet.user_id, balance = %wallet.balance, "replayed wallet is inconsistent");
            }
        }
        Ok(())
    }

    pub fn starting_balance(&self) -> Money {
        self.starting_balance
    }

    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }

    /// Create the wallet. Fails with `AlreadyExists` if it is already open,
    /// leaving its balance untouched.
    pub async fn initialize(&self, user: &UserId) -> WalletResult<Wallet> {
        let _guard = self.locks.lock(user.as_str()).await;
        if self.read_wallets()?.contains_key(user) {
            return Err(WalletError::AlreadyExists(user.clone()));
        }
        self.open_wallet(user)
    }

    /// Current wallet, created with the starting balance on first access.
    pub async fn get_balance(&self, user: &UserId) -> WalletResult<Wallet> {
        if let Some(wallet) = self.read_wallets()?.get(user) {
            return Ok(wallet.clone());
        }
        let _guard = self.locks.lock(user.as_str()).await;
        self.existing_or_open(user)
    }

    /// Transaction log, oldest first. Empty for a wallet never opened.
    pub fn history(&self, user: &UserId) -> WalletResult<Vec<WalletTransaction>> {
        Ok(self
            .read_wallets()?
            .get(user)
            .map(|w| w.transactions.clone())
            .unwrap_or_default())
    }

    pub async fn deposit(&self, user: &UserId, amount: Money) -> WalletResult<WalletReceipt> {
        ensure_positive("amount", amount)?;
        let _guard = self.locks.lock(user.as_str()).await;
        self.existing_or_open(user)?;
        self.commit(user, WalletTransaction::deposit(amount), None)
    }

    /// Pay for a booking. Never partially debits: a balance below `amount`
    /// fails with `InsufficientFunds` and changes nothing.
    pub async fn debit(
        &self,
        user: &UserId,
        booking: &BookingId,
        amount: Money,
        key: &IdempotencyKey,
    ) -> WalletResult<WalletReceipt> {
        ensure_positive("amount", amount)?;
        let _guard = self.locks.lock(user.as_str()).await;
        if let Some(receipt) = self.replayed(user, key, TransactionKind::Payment, booking, -amount)? {
            return Ok(receipt);
        }
        let wallet = self.existing_or_open(user)?;
        if wallet.balance < amount {
            return Err(WalletError::InsufficientFunds {
                user: user.clone(),
                balance: wallet.balance,
                requested: amount,
            });
        }
        self.commit(user, WalletTransaction::payment(booking, amount), Some(key))
    }

    pub async fn refund(
        &self,
        user: &UserId,
        booking: &BookingId,
        amount: Money,
        key: &IdempotencyKey,
    ) -> WalletResult<WalletReceipt> {
        ensure_positive("amount", amount)?;
        let _guard = self.locks.lock(user.as_str()).await;
        if let Some(receipt) = self.replayed(user, key, TransactionKind::Refund, booking, amount)? {
            return Ok(receipt);
        }
        self.existing_or_open(user)?;
        self.commit(user, WalletTransaction::refund(booking, amount), Some(key))
    }

    /// The transaction an earlier mutation of `user`'s wallet recorded
    /// under `key`.
    pub fn applied(
        &self,
        user: &UserId,
        key: &IdempotencyKey,
    ) -> WalletResult<Option<WalletTransaction>> {
        Ok(self
            .applied
            .read()
            .map_err(|e| WalletError::Internal(format!("lock poisoned: {e}")))?
            .get(&(user.clone(), key.clone()))
            .cloned())
    }

    /// Snapshot of every wallet, ordered by user id.
    pub fn wallets(&self) -> WalletResult<Vec<Wallet>> {
        let mut all: Vec<Wallet> = self.read_wallets()?.values().cloned().collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(all)
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.read().map(|w| w.len()).unwrap_or(0)
    }

    /// Rewrite the journal without damaged records. `None` when in-memory.
    pub fn compact(&self) -> WalletResult<Option<CompactionStats>> {
        self.journal.as_ref().map(WalletJournal::compact).transpose()
    }

    /// Report an earlier mutation under `key`, if there was one.
    ///
    /// A key names exactly one mutation of one wallet. Reusing it on that
    /// wallet for another kind, booking or amount is a caller bug and is
    /// refused.
    fn replayed(
        &self,
        user: &UserId,
        key: &IdempotencyKey,
        kind: TransactionKind,
        booking: &BookingId,
        signed_amount: Money,
    ) -> WalletResult<Option<WalletReceipt>> {
        let Some(tx) = self.applied(user, key)? else {
            return Ok(None);
        };
        let same = tx.kind == kind
            && tx.booking_id.as_ref() == Some(booking)
            && tx.amount == signed_amount;
        if !same {
            return Err(WalletError::IdempotencyConflict { key: key.clone() });
        }
        let balance = self
            .read_wallets()?
            .get(user)
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO);
        debug!(user_id = %user, key = %key, "replaying wallet mutation");
        Ok(Some(WalletReceipt {
            transaction: tx,
            balance,
            replayed: true,
        }))
    }

    /// Caller must hold the user's lock.
    fn existing_or_open(&self, user: &UserId) -> WalletResult<Wallet> {
        if let Some(wallet) = self.read_wallets()?.get(user) {
            return Ok(wallet.clone());
        }
        self.open_wallet(user)
    }

    /// Caller must hold the user's lock.
    fn open_wallet(&self, user: &UserId) -> WalletResult<Wallet> {
        if let Some(journal) = &self.journal {
            journal.append(
                user,
                JournalEvent::Opened {
                    starting_balance: self.starting_balance,
                },
            )?;
        }
        let wallet = Wallet::open(user.clone(), self.starting_balance);
        self.write_wallets()?.insert(user.clone(), wallet.clone());
        info!(user_id = %user, balance = %self.starting_balance, "wallet opened");
        Ok(wallet)
    }

    /// Journal, then apply. Caller must hold the user's lock and have opened
    /// the wallet.
    fn commit(
        &self,
        user: &UserId,
        transaction: WalletTransaction,
        key: Option<&IdempotencyKey>,
    ) -> WalletResult<WalletReceipt> {
        if let Some(journal) = &self.journal {
            journal.append(
                user,
                JournalEvent::Entry {
                    transaction: transaction.clone(),
                    idempotency_key: key.cloned(),
                },
            )?;
        }

        let balance = {
            let mut wallets = self.write_wallets()?;
            let wallet = wallets
                .get_mut(user)
                .ok_or_else(|| WalletError::Internal(format!("wallet {user} vanished")))?;
            wallet.apply(transaction.clone());
            wallet.balance
        };
        if let Some(key) = key {
            self.applied
                .write()
                .map_err(|e| WalletError::Internal(format!("lock poisoned: {e}")))?
                .insert((user.clone(), key.clone()), transaction.clone());
        }

        info!(
            user_id = %user,
            kind = %transaction.kind,
            amount = %transaction.amount,
            balance = %balance,
            "wallet updated"
        );
        Ok(WalletReceipt {
            transaction,
            balance,
            replayed: false,
        })
    }

    fn read_wallets(&self) -> WalletResult<RwLockReadGuard<'_, HashMap<UserId, Wallet>>> {
        self.wallets
            .read()
            .map_err(|e| WalletError::Internal(format!("lock poisoned: {e}")))
    }

    fn write_wallets(&self) -> WalletResult<RwLockWriteGuard<'_, HashMap<UserId, Wallet>>> {
        self.wallets
            .write()
            .map_err(|e| WalletError::Internal(format!("lock poisoned: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn booking(id: &str) -> BookingId {
        BookingId::new(id).unwrap()
    }

    fn ledger() -> WalletLedger {
        WalletLedger::in_memory(Decimal::from(1000))
    }

    #[tokio::test]
    async fn get_balance_creates_lazily_and_never_resets() {
        let wallets = ledger();
        let u = user("u1");
        assert_eq!(wallets.get_balance(&u).await.unwrap().balance, Decimal::from(1000));

        wallets.deposit(&u, Decimal::from(25)).await.unwrap();
        let wallet = wallets.get_balance(&u).await.unwrap();
        assert_eq!(wallet.balance, Decimal::from(1025));
        assert_eq!(wallet.transactions.len(), 1);
    }

    #[tokio::test]
    async fn initialize_twice_reports_already_exists() {
        let wallets = ledger();
        let u = user("u1");
        wallets.initialize(&u).await.unwrap();
        wallets.deposit(&u, Decimal::from(5)).await.unwrap();

        let err = wallets.initialize(&u).await.unwrap_err();
        assert!(matches!(err, WalletError::AlreadyExists(_)));
        assert_eq!(wallets.get_balance(&u).await.unwrap().balance, Decimal::from(1005));
    }

    #[tokio::test]
    async fn overdraft_is_refused_without_partial_debit() {
        let wallets = ledger();
        let u = user("u1");
        let b = booking("booking_1");
        let err = wallets
            .debit(&u, &b, Decimal::from(1200), &IdempotencyKey::booking_payment(&b, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));

        let wallet = wallets.get_balance(&u).await.unwrap();
        assert_eq!(wallet.balance, Decimal::from(1000));
        assert!(wallet.transactions.is_empty());
    }

    #[tokio::test]
    async fn retried_debit_applies_once() {
        let wallets = ledger();
        let u = user("u1");
        let b = booking("booking_1");
        let key = IdempotencyKey::booking_payment(&b, 0);

        let first = wallets.debit(&u, &b, Decimal::from(50), &key).await.unwrap();
        let second = wallets.debit(&u, &b, Decimal::from(50), &key).await.unwrap();
        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.transaction.id, second.transaction.id);
        assert_eq!(wallets.get_balance(&u).await.unwrap().balance, Decimal::from(950));
    }

    #[tokio::test]
    async fn key_reuse_for_other_amount_conflicts() {
        let wallets = ledger();
        let u = user("u1");
        let b = booking("booking_1");
        let key = IdempotencyKey::new("k-1").unwrap();
        wallets.refund(&u, &b, Decimal::from(10), &key).await.unwrap();
        let err = wallets.refund(&u, &b, Decimal::from(11), &key).await.unwrap_err();
        assert!(matches!(err, WalletError::IdempotencyConflict { .. }));
    }

    #[tokio::test]
    async fn same_key_on_two_wallets_is_two_mutations() {
        let wallets = ledger();
        let b = booking("booking_1");
        let key = IdempotencyKey::booking_refund(&b);
        wallets.debit(&user("u1"), &b, Decimal::ONE, &key).await.unwrap();

        let receipt = wallets
            .refund(&user("u2"), &b, Decimal::from(40), &key)
            .await
            .unwrap();
        assert!(!receipt.replayed);
        assert_eq!(receipt.balance, Decimal::from(1040));
        assert_eq!(wallets.get_balance(&user("u1")).await.unwrap().balance, Decimal::from(999));
        assert!(wallets.applied(&user("u2"), &key).unwrap().is_some());
    }

    #[tokio::test]
    async fn non_positive_amounts_are_invalid() {
        let wallets = ledger();
        let err = wallets.deposit(&user("u1"), Decimal::ZERO).await.unwrap_err();
        assert!(matches!(err, WalletError::Invalid(_)));
        assert_eq!(wallets.wallet_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_never_overdraw() {
        let wallets = Arc::new(ledger());
        let u = user("u1");
        let mut handles = Vec::new();
        for i in 0..12 {
            let wallets = Arc::clone(&wallets);
            let u = u.clone();
            handles.push(tokio::spawn(async move {
                let b = booking(&format!("booking_{i}"));
                wallets
                    .debit(&u, &b, Decimal::from(100), &IdempotencyKey::booking_payment(&b, 0))
                    .await
            }));
        }
        let mut succeeded = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(WalletError::InsufficientFunds { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(succeeded, 10);
        let wallet = wallets.get_balance(&u).await.unwrap();
        assert_eq!(wallet.balance, Decimal::ZERO);
        assert!(wallet.is_consistent());
    }

    #[tokio::test]
    async fn journal_rebuilds_wallets_and_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallets.journal");
        let u = user("u1");
        let b = booking("booking_1");
        let key = IdempotencyKey::booking_payment(&b, 0);
        {
            let wallets = WalletLedger::open(&path, Decimal::from(1000), SyncMode::EveryWrite).unwrap();
            wallets.deposit(&u, Decimal::from(20)).await.unwrap();
            wallets.debit(&u, &b, Decimal::from(70), &key).await.unwrap();
        }

        let wallets = WalletLedger::open(&path, Decimal::from(1000), SyncMode::EveryWrite).unwrap();
        let wallet = wallets.get_balance(&u).await.unwrap();
        assert_eq!(wallet.balance, Decimal::from(950));
        assert_eq!(wallet.transactions.len(), 2);
        assert!(wallet.is_consistent());

        let again = wallets.debit(&u, &b, Decimal::from(70), &key).await.unwrap();
        assert!(again.replayed);
        assert_eq!(wallets.get_balance(&u).await.unwrap().balance, Decimal::from(950));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Deposit(u32),
        Debit(u32),
        Refund(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u32..500).prop_map(Op::Deposit),
            (1u32..800).prop_map(Op::Debit),
            (1u32..300).prop_map(Op::Refund),
        ]
    }

    proptest! {
        #[test]
        fn balance_always_matches_log(ops in proptest::collection::vec(op(), 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let wallets = ledger();
                let u = user("prop");
                for (i, op) in ops.into_iter().enumerate() {
                    let b = booking(&format!("booking_{i}"));
                    let key = IdempotencyKey::new(format!("op-{i}")).unwrap();
                    let _ = match op {
                        Op::Deposit(n) => wallets.deposit(&u, Decimal::from(n)).await,
                        Op::Debit(n) => wallets.debit(&u, &b, Decimal::from(n), &key).await,
                        Op::Refund(n) => wallets.refund(&u, &b, Decimal::from(n), &key).await,
                    };
                    let wallet = wallets.get_balance(&u).await.unwrap();
                    prop_assert!(wallet.balance >= Decimal::ZERO);
                    prop_assert_eq!(wallet.balance, wallet.replayed_balance());
                }
                Ok(())
            })?;
        }
    }
}
