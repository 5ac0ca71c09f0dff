// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Incremental transaction sync for one linked account.
//!
//! A pass fetches everything booked since the account watermark, keeps the
//! records whose id is not stored yet, writes those in one batch, and only
//! then moves the watermark. A failed pass leaves the watermark where it was,
//! so the next pass fetches the same window again and the id diff absorbs
//! the overlap.

use crate::config::FirstSyncWindow;
use crate::db::{DateRange, LedgerStore};
use crate::error::AppError;
use crate::models::{LinkedAccount, Transaction};
use crate::services::mappers::map_transactions;
use crate::services::nordigen::AggregatorClient;
use crate::time_utils::{first_sync_start, format_utc_rfc3339};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Notification emitted after an account was reconciled.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    AccountSynced {
        user_id: String,
        account_id: String,
        /// Stored transactions after the merge
        transactions: Vec<Transaction>,
    },
}

/// Merges upstream transactions into the ledger.
#[derive(Clone)]
pub struct SyncReconciler {
    store: Arc<dyn LedgerStore>,
    client: AggregatorClient,
    first_sync_window: FirstSyncWindow,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncReconciler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        client: AggregatorClient,
        first_sync_window: FirstSyncWindow,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            client,
            first_sync_window,
            events,
        }
    }

    /// Subscribe to per-account sync notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Fetch window for an account at `now`.
    pub fn window(&self, account: &LinkedAccount, now: DateTime<Utc>) -> DateRange {
        let to = now.date_naive();
        let from = account
            .last_sync
            .map(|at| at.date_naive())
            .unwrap_or_else(|| first_sync_start(self.first_sync_window, now));
        DateRange {
            from: from.min(to),
            to,
        }
    }

    /// Reconcile one account. Returns the number of newly stored transactions.
    pub async fn reconcile(&self, user_id: &str, account: &LinkedAccount) -> Result<usize, AppError> {
        let now = Utc::now();
        let window = self.window(account, now);

        let (persisted, upstream) = tokio::try_join!(
            self.store.list_transactions(user_id, &account.id, None),
            self.client.get_transactions(&account.id, window),
        )?;

        let mapped = map_transactions(&account.institution_id, &upstream);
        let new = new_transactions(&persisted, mapped.transactions);

        let written = if new.is_empty() {
            0
        } else {
            self.store
                .add_transactions(user_id, &account.id, &new)
                .await?
        };
        self.store.set_last_sync(user_id, &account.id, now).await?;

        tracing::info!(
            user_id,
            account_id = %account.id,
            from = %window.from,
            to = %window.to,
            fetched = upstream.len(),
            new = written,
            watermark = %format_utc_rfc3339(now),
            "Reconciled account"
        );

        let transactions = if written == new.len() {
            let mut merged = persisted;
            merged.extend(new);
            merged
        } else {
            // Another pass stored some of these first
            self.store.list_transactions(user_id, &account.id, None).await?
        };
        // No subscribers is fine
        let _ = self.events.send(SyncEvent::AccountSynced {
            user_id: user_id.to_string(),
            account_id: account.id.clone(),
            transactions,
        });

        Ok(written)
    }
}

/// Upstream records whose id is not stored yet, first occurrence wins.
pub fn new_transactions(persisted: &[Transaction], upstream: Vec<Transaction>) -> Vec<Transaction> {
    let mut seen: HashSet<String> = persisted
        .iter()
        .map(|t| t.transaction_id.clone())
        .collect();

    upstream
        .into_iter()
        .filter(|t| seen.insert(t.transaction_id.clone()))
        .collect()
}
