// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory ledger store.
//!
//! Used for local development without a GCP project and by the test suite.
//! Each user's ledger lives under one map entry, so a batch write holds that
//! entry's lock for its whole duration and is all-or-nothing.

use crate::db::{DateRange, LedgerStore};
use crate::error::AppError;
use crate::models::{LinkedAccount, Transaction, TransactionPatch, UserRequisition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct UserLedger {
    accounts: BTreeMap<String, LinkedAccount>,
    /// account id → transaction id → transaction
    transactions: HashMap<String, BTreeMap<String, Transaction>>,
    requisitions: BTreeMap<String, UserRequisition>,
}

/// Ledger store backed by process memory. Cloning shares the data.
#[derive(Clone, Default)]
pub struct MemoryDb {
    users: Arc<DashMap<String, UserLedger>>,
    fail_transaction_writes: Arc<AtomicBool>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `add_transactions` fail until reset, for exercising failure paths.
    pub fn set_fail_transaction_writes(&self, fail: bool) {
        self.fail_transaction_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for MemoryDb {
    async fn list_accounts(&self, user_id: &str) -> Result<Vec<LinkedAccount>, AppError> {
        Ok(self
            .users
            .get(user_id)
            .map(|ledger| ledger.accounts.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_account(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<Option<LinkedAccount>, AppError> {
        Ok(self
            .users
            .get(user_id)
            .and_then(|ledger| ledger.accounts.get(account_id).cloned()))
    }

    async fn set_account(&self, user_id: &str, account: &LinkedAccount) -> Result<(), AppError> {
        self.users
            .entry(user_id.to_string())
            .or_default()
            .accounts
            .insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn set_last_sync(
        &self,
        user_id: &str,
        account_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut ledger = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        let account = ledger
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| AppError::NotFound(format!("Account {}", account_id)))?;
        account.last_sync = Some(at);
        Ok(())
    }

    async fn delete_account(&self, user_id: &str, account_id: &str) -> Result<usize, AppError> {
        let Some(mut ledger) = self.users.get_mut(user_id) else {
            return Ok(0);
        };
        let transactions = ledger
            .transactions
            .remove(account_id)
            .map(|t| t.len())
            .unwrap_or(0);
        let account = usize::from(ledger.accounts.remove(account_id).is_some());
        Ok(transactions + account)
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        account_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<Transaction>, AppError> {
        let Some(ledger) = self.users.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(ledger
            .transactions
            .get(account_id)
            .map(|stored| {
                stored
                    .values()
                    .filter(|t| range.is_none_or(|r| r.contains(t.booking_date)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_transaction(
        &self,
        user_id: &str,
        account_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, AppError> {
        Ok(self.users.get(user_id).and_then(|ledger| {
            ledger
                .transactions
                .get(account_id)
                .and_then(|stored| stored.get(transaction_id).cloned())
        }))
    }

    async fn add_transactions(
        &self,
        user_id: &str,
        account_id: &str,
        transactions: &[Transaction],
    ) -> Result<usize, AppError> {
        if self.fail_transaction_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database(
                "Batch commit failed: write rejected".to_string(),
            ));
        }

        let mut ledger = self.users.entry(user_id.to_string()).or_default();
        let stored = ledger
            .transactions
            .entry(account_id.to_string())
            .or_default();
        let mut written = 0;
        for t in transactions {
            if let Entry::Vacant(slot) = stored.entry(t.transaction_id.clone()) {
                slot.insert(t.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    async fn update_transaction(
        &self,
        user_id: &str,
        account_id: &str,
        transaction_id: &str,
        patch: &TransactionPatch,
    ) -> Result<Transaction, AppError> {
        let mut ledger = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {}", transaction_id)))?;
        let stored = ledger
            .transactions
            .get_mut(account_id)
            .and_then(|stored| stored.get_mut(transaction_id))
            .ok_or_else(|| AppError::NotFound(format!("Transaction {}", transaction_id)))?;
        patch.apply_to(stored);
        Ok(stored.clone())
    }

    async fn list_requisitions(&self, user_id: &str) -> Result<Vec<UserRequisition>, AppError> {
        Ok(self
            .users
            .get(user_id)
            .map(|ledger| ledger.requisitions.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_requisition(
        &self,
        user_id: &str,
        requisition: &UserRequisition,
    ) -> Result<(), AppError> {
        self.users
            .entry(user_id.to_string())
            .or_default()
            .requisitions
            .insert(requisition.id.clone(), requisition.clone());
        Ok(())
    }
}
