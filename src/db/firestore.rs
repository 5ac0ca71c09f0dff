// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Accounts (`users/{uid}/accounts`)
//! - Transactions (`users/{uid}/accounts/{account}/transactions`)
//! - Requisitions (`users/{uid}/requisitions`)

use crate::db::{collections, transaction_doc_id, DateRange, LedgerStore};
use crate::error::AppError;
use crate::models::{LinkedAccount, Transaction, TransactionPatch, UserRequisition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// Documents per batched read or deletion commit.
const BATCH_SIZE: usize = 400;

/// Field-mask payload for watermark updates.
#[derive(Serialize, Deserialize)]
struct LastSyncUpdate {
    last_sync: Option<DateTime<Utc>>,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a disconnected client (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// `users/{user_id}`
    fn user_path(&self, user_id: &str) -> Result<firestore::ParentPathBuilder, AppError> {
        self.get_client()?
            .parent_path(collections::USERS, user_id)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// `users/{user_id}/accounts/{account_id}`
    fn account_path(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<firestore::ParentPathBuilder, AppError> {
        self.user_path(user_id)?
            .at(collections::ACCOUNTS, account_id)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete documents of a sub-collection in transaction-sized chunks.
    async fn batch_delete(
        &self,
        parent: &firestore::ParentPathBuilder,
        collection: &str,
        doc_ids: &[String],
    ) -> Result<(), AppError> {
        let client = self.get_client()?;

        for chunk in doc_ids.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for doc_id in chunk {
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(doc_id)
                    .parent(parent)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for FirestoreDb {
    // ─── Account Operations ──────────────────────────────────────

    async fn list_accounts(&self, user_id: &str) -> Result<Vec<LinkedAccount>, AppError> {
        let parent = self.user_path(user_id)?;
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ACCOUNTS)
            .parent(&parent)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_account(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<Option<LinkedAccount>, AppError> {
        let parent = self.user_path(user_id)?;
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ACCOUNTS)
            .parent(&parent)
            .obj()
            .one(account_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_account(&self, user_id: &str, account: &LinkedAccount) -> Result<(), AppError> {
        let parent = self.user_path(user_id)?;
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ACCOUNTS)
            .document_id(&account.id)
            .parent(&parent)
            .object(account)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_last_sync(
        &self,
        user_id: &str,
        account_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let parent = self.user_path(user_id)?;
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(["last_sync"])
            .in_col(collections::ACCOUNTS)
            .document_id(account_id)
            .parent(&parent)
            .object(&LastSyncUpdate {
                last_sync: Some(at),
            })
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_account(&self, user_id: &str, account_id: &str) -> Result<usize, AppError> {
        let transactions = self.list_transactions(user_id, account_id, None).await?;
        let doc_ids: Vec<String> = transactions
            .iter()
            .map(|t| transaction_doc_id(&t.transaction_id))
            .collect();

        let account_path = self.account_path(user_id, account_id)?;
        self.batch_delete(&account_path, collections::TRANSACTIONS, &doc_ids)
            .await?;
        tracing::debug!(user_id, account_id, count = doc_ids.len(), "Deleted transactions");

        let parent = self.user_path(user_id)?;
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::ACCOUNTS)
            .document_id(account_id)
            .parent(&parent)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let deleted_count = doc_ids.len() + 1;
        tracing::debug!(user_id, account_id, deleted_count, "Deleted account documents");
        Ok(deleted_count)
    }

    // ─── Transaction Operations ──────────────────────────────────

    async fn list_transactions(
        &self,
        user_id: &str,
        account_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<Transaction>, AppError> {
        let parent = self.account_path(user_id, account_id)?;
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TRANSACTIONS)
            .parent(&parent);

        // Dates are stored as "yyyy-MM-dd" strings, so lexical order is date order.
        let query = if let Some(range) = range {
            let from = range.from.format("%Y-%m-%d").to_string();
            let to = range.to.format("%Y-%m-%d").to_string();
            query.filter(move |q| {
                q.for_all([
                    q.field("booking_date").greater_than_or_equal(from.clone()),
                    q.field("booking_date").less_than_or_equal(to.clone()),
                ])
            })
        } else {
            query
        };

        query
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_transaction(
        &self,
        user_id: &str,
        account_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, AppError> {
        let parent = self.account_path(user_id, account_id)?;
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TRANSACTIONS)
            .parent(&parent)
            .obj()
            .one(&transaction_doc_id(transaction_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Writes the whole batch in one Firestore transaction. Ids that already
    /// exist are read inside the transaction and skipped, and every write is
    /// create-only, so a stored transaction is never replaced.
    async fn add_transactions(
        &self,
        user_id: &str,
        account_id: &str,
        transactions: &[Transaction],
    ) -> Result<usize, AppError> {
        if transactions.is_empty() {
            return Ok(0);
        }

        let client = self.get_client()?;
        let parent = self.account_path(user_id, account_id)?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Reads through this handle register the documents with the transaction
        let reader = client.clone_with_consistency_selector(
            firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ),
        );

        let mut existing: HashSet<String> = HashSet::new();
        for chunk in transactions.chunks(BATCH_SIZE) {
            let doc_ids: Vec<String> = chunk
                .iter()
                .map(|t| transaction_doc_id(&t.transaction_id))
                .collect();
            let found: Vec<(String, Option<Transaction>)> = reader
                .fluent()
                .select()
                .by_id_in(collections::TRANSACTIONS)
                .parent(&parent)
                .obj()
                .batch(doc_ids)
                .await
                .map_err(|e| {
                    AppError::Database(format!("Failed to read batch in transaction: {}", e))
                })?
                .collect()
                .await;
            existing.extend(found.into_iter().filter_map(|(_, t)| t.map(|t| t.transaction_id)));
        }

        let mut written = 0;
        for record in transactions {
            if !existing.insert(record.transaction_id.clone()) {
                continue;
            }
            client
                .fluent()
                .update()
                .in_col(collections::TRANSACTIONS)
                .precondition(firestore::FirestoreWritePrecondition::Exists(false))
                .document_id(transaction_doc_id(&record.transaction_id))
                .parent(&parent)
                .object(record)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!(
                        "Failed to add transaction {} to batch: {}",
                        record.transaction_id, e
                    ))
                })?;
            written += 1;
        }

        if written == 0 {
            let _ = transaction.rollback().await;
        } else {
            transaction
                .commit()
                .await
                .map_err(|e| AppError::Database(format!("Batch commit failed: {}", e)))?;
        }

        tracing::debug!(
            user_id,
            account_id,
            written,
            skipped = transactions.len() - written,
            "Transactions written"
        );
        Ok(written)
    }

    async fn update_transaction(
        &self,
        user_id: &str,
        account_id: &str,
        transaction_id: &str,
        patch: &TransactionPatch,
    ) -> Result<Transaction, AppError> {
        let mut stored = self
            .get_transaction(user_id, account_id, transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {}", transaction_id)))?;

        patch.apply_to(&mut stored);
        if patch.is_empty() {
            return Ok(stored);
        }

        let parent = self.account_path(user_id, account_id)?;
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(patch.field_names())
            .in_col(collections::TRANSACTIONS)
            .document_id(transaction_doc_id(transaction_id))
            .parent(&parent)
            .object(&stored)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(stored)
    }

    // ─── Requisition Operations ──────────────────────────────────

    async fn list_requisitions(&self, user_id: &str) -> Result<Vec<UserRequisition>, AppError> {
        let parent = self.user_path(user_id)?;
        self.get_client()?
            .fluent()
            .select()
            .from(collections::REQUISITIONS)
            .parent(&parent)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn add_requisition(
        &self,
        user_id: &str,
        requisition: &UserRequisition,
    ) -> Result<(), AppError> {
        let parent = self.user_path(user_id)?;
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::REQUISITIONS)
            .document_id(&requisition.id)
            .parent(&parent)
            .object(requisition)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
