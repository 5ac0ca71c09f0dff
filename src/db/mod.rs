//! Database layer (Firestore, with an in-memory stand-in).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{LinkedAccount, Transaction, TransactionPatch, UserRequisition};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Collection names as constants.
///
/// Layout: `users/{uid}/accounts/{account_id}/transactions/{transaction_id}`
/// and `users/{uid}/requisitions/{requisition_id}`.
pub mod collections {
    pub const USERS: &str = "users";
    pub const ACCOUNTS: &str = "accounts";
    pub const TRANSACTIONS: &str = "transactions";
    pub const REQUISITIONS: &str = "requisitions";
}

/// Inclusive booking-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Typed access to the per-user document hierarchy.
///
/// `add_transactions` must be all-or-nothing from the caller's point of view:
/// on error the reconciler assumes nothing from the batch is visible yet and
/// leaves the account watermark alone. It also never replaces a stored
/// transaction, so user edits survive overlapping sync passes.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ─── Accounts ────────────────────────────────────────────────

    async fn list_accounts(&self, user_id: &str) -> Result<Vec<LinkedAccount>, AppError>;

    async fn get_account(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<Option<LinkedAccount>, AppError>;

    async fn set_account(&self, user_id: &str, account: &LinkedAccount) -> Result<(), AppError>;

    /// Partial update of the account watermark only.
    async fn set_last_sync(
        &self,
        user_id: &str,
        account_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Delete an account and all of its transactions. Returns documents deleted.
    async fn delete_account(&self, user_id: &str, account_id: &str) -> Result<usize, AppError>;

    // ─── Transactions ────────────────────────────────────────────

    /// All stored transactions of an account, or only those booked in `range`.
    async fn list_transactions(
        &self,
        user_id: &str,
        account_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<Transaction>, AppError>;

    async fn get_transaction(
        &self,
        user_id: &str,
        account_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, AppError>;

    /// Atomic multi-write of new transactions. Ids already stored are left
    /// untouched. Returns how many records were written.
    async fn add_transactions(
        &self,
        user_id: &str,
        account_id: &str,
        transactions: &[Transaction],
    ) -> Result<usize, AppError>;

    /// Apply a user edit. `NotFound` when the transaction does not exist.
    async fn update_transaction(
        &self,
        user_id: &str,
        account_id: &str,
        transaction_id: &str,
        patch: &TransactionPatch,
    ) -> Result<Transaction, AppError>;

    // ─── Requisitions ────────────────────────────────────────────

    async fn list_requisitions(&self, user_id: &str) -> Result<Vec<UserRequisition>, AppError>;

    async fn add_requisition(
        &self,
        user_id: &str,
        requisition: &UserRequisition,
    ) -> Result<(), AppError>;
}

/// Document id for a transaction. Aggregator ids may contain `/`.
pub fn transaction_doc_id(transaction_id: &str) -> String {
    urlencoding::encode(transaction_id).into_owned()
}
