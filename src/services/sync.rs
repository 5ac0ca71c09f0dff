// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync orchestration: multi-account passes and account discovery with a
//! bounded whole-pass retry.

use crate::db::LedgerStore;
use crate::error::AppError;
use crate::models::LinkedAccount;
use crate::services::nordigen::AggregatorClient;
use crate::services::reconcile::SyncReconciler;
use futures_util::future::{join_all, try_join_all};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Attempt ceiling and fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSyncResult {
    pub account_id: String,
    pub new_transactions: usize,
}

/// Outcome of a successful sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Attempt on which the pass succeeded (1-based)
    pub attempts: u32,
    pub accounts: Vec<AccountSyncResult>,
    pub total_new: usize,
}

/// Drives reconciliation and discovery for a user.
#[derive(Clone)]
pub struct SyncService {
    store: Arc<dyn LedgerStore>,
    client: AggregatorClient,
    reconciler: SyncReconciler,
    policy: RetryPolicy,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        client: AggregatorClient,
        reconciler: SyncReconciler,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            client,
            reconciler,
            policy,
        }
    }

    /// Reconcile every linked account of the user, retrying failed passes.
    pub async fn sync_user(&self, user_id: &str) -> Result<SyncReport, AppError> {
        let (accounts, attempts) = self
            .with_retry("sync", user_id, || self.sync_pass(user_id))
            .await?;

        let total_new = accounts.iter().map(|a| a.new_transactions).sum();
        tracing::info!(
            user_id,
            attempts,
            accounts = accounts.len(),
            total_new,
            "Sync pass complete"
        );

        Ok(SyncReport {
            attempts,
            accounts,
            total_new,
        })
    }

    /// Link accounts granted by the user's requisitions that are not saved yet.
    /// Returns how many accounts were added.
    pub async fn link_accounts(&self, user_id: &str) -> Result<usize, AppError> {
        let (linked, attempts) = self
            .with_retry("discovery", user_id, || self.discovery_pass(user_id))
            .await?;

        tracing::info!(user_id, attempts, linked, "Account discovery complete");
        Ok(linked)
    }

    /// One pass over all accounts. Every reconcile runs to completion before
    /// the pass result is decided; the first error fails the pass.
    async fn sync_pass(&self, user_id: &str) -> Result<Vec<AccountSyncResult>, AppError> {
        let accounts = self.store.list_accounts(user_id).await?;

        let outcomes = join_all(accounts.iter().map(|account| async move {
            let new_transactions = self.reconciler.reconcile(user_id, account).await?;
            Ok::<_, AppError>(AccountSyncResult {
                account_id: account.id.clone(),
                new_transactions,
            })
        }))
        .await;

        outcomes.into_iter().collect()
    }

    async fn discovery_pass(&self, user_id: &str) -> Result<usize, AppError> {
        let (requisitions, saved) = tokio::try_join!(
            self.store.list_requisitions(user_id),
            self.store.list_accounts(user_id),
        )?;

        let fetched = try_join_all(
            requisitions
                .iter()
                .map(|r| self.client.get_requisition(&r.id)),
        )
        .await?;

        let mut known: HashSet<String> = saved.into_iter().map(|a| a.id).collect();
        let missing: Vec<String> = fetched
            .into_iter()
            .flat_map(|r| r.accounts)
            .filter(|id| known.insert(id.clone()))
            .collect();

        let accounts: Vec<LinkedAccount> =
            try_join_all(missing.iter().map(|id| self.client.get_account(id))).await?;

        for account in &accounts {
            self.store.set_account(user_id, account).await?;
            tracing::debug!(user_id, account_id = %account.id, "Linked account");
        }

        Ok(accounts.len())
    }

    /// Run `pass` until it succeeds or the attempt ceiling is reached.
    /// Returns the value and the attempt it succeeded on.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        user_id: &str,
        mut pass: F,
    ) -> Result<(T, u32), AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match pass().await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        operation,
                        user_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Pass failed, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        operation,
                        user_id,
                        attempt,
                        error = %e,
                        "Pass failed, giving up"
                    );
                    return Err(e);
                }
            }
        }
    }
}
