// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::db::DateRange;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{
    Balance, Institution, LinkedAccount, Transaction, TransactionPatch, UserRequisition,
};
use crate::services::SyncReport;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/institutions", get(list_institutions))
        .route("/api/requisitions", post(create_requisition))
        .route("/api/requisitions/complete", post(complete_requisitions))
        .route("/api/accounts", get(list_accounts))
        .route("/api/accounts/{id}", delete(unlink_account))
        .route("/api/accounts/{id}/balances", get(get_balances))
        .route("/api/accounts/{id}/transactions", get(list_transactions))
        .route(
            "/api/accounts/{id}/transactions/{tx_id}",
            patch(update_transaction),
        )
        .route("/api/sync", post(sync_now))
}

fn validation_error(err: validator::ValidationErrors) -> AppError {
    AppError::BadRequest(err.to_string())
}

/// Load an account of the calling user, or 404.
async fn owned_account(state: &AppState, user: &AuthUser, account_id: &str) -> Result<LinkedAccount> {
    state
        .store
        .get_account(&user.user_id, account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Account {}", account_id)))
}

// ─── Institutions ────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct InstitutionsQuery {
    /// ISO 3166 alpha-2 country code
    #[validate(length(equal = 2))]
    country: String,
}

async fn list_institutions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InstitutionsQuery>,
) -> Result<Json<Vec<Institution>>> {
    query.validate().map_err(validation_error)?;

    let institutions = state
        .aggregator
        .list_institutions(&query.country.to_uppercase())
        .await?;
    Ok(Json(institutions))
}

// ─── Requisitions ────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct CreateRequisitionRequest {
    #[validate(length(min = 1, max = 128))]
    institution_id: String,
}

/// Start linking a bank. The user must follow `link` to grant consent.
async fn create_requisition(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateRequisitionRequest>,
) -> Result<Json<UserRequisition>> {
    body.validate().map_err(validation_error)?;

    let reference = uuid::Uuid::new_v4().to_string();
    let redirect = format!("{}/accounts", state.config.frontend_url);

    let requisition = state
        .aggregator
        .create_requisition(&redirect, &body.institution_id, &reference)
        .await?;

    let link = requisition.link.ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "Requisition {} created without a link",
            requisition.id
        ))
    })?;

    let saved = UserRequisition {
        id: requisition.id,
        link,
    };
    state.store.add_requisition(&user.user_id, &saved).await?;

    tracing::info!(
        user_id = %user.user_id,
        requisition_id = %saved.id,
        institution_id = %body.institution_id,
        "Requisition created"
    );
    Ok(Json(saved))
}

#[derive(Serialize)]
struct LinkAccountsResponse {
    linked: usize,
}

/// Discover accounts granted by the user's requisitions and link new ones.
async fn complete_requisitions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<LinkAccountsResponse>> {
    let linked = state.sync.link_accounts(&user.user_id).await?;
    Ok(Json(LinkAccountsResponse { linked }))
}

// ─── Accounts ────────────────────────────────────────────────

async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<LinkedAccount>>> {
    Ok(Json(state.store.list_accounts(&user.user_id).await?))
}

#[derive(Serialize)]
struct UnlinkResponse {
    deleted: usize,
}

/// Unlink an account and drop its stored transactions.
async fn unlink_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(account_id): Path<String>,
) -> Result<Json<UnlinkResponse>> {
    owned_account(&state, &user, &account_id).await?;

    let deleted = state
        .store
        .delete_account(&user.user_id, &account_id)
        .await?;

    tracing::info!(
        user_id = %user.user_id,
        account_id = %account_id,
        deleted,
        "Account unlinked"
    );
    Ok(Json(UnlinkResponse { deleted }))
}

async fn get_balances(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<Balance>>> {
    let account = owned_account(&state, &user, &account_id).await?;
    Ok(Json(state.aggregator.get_balances(&account.id).await?))
}

// ─── Transactions ────────────────────────────────────────────

#[derive(Deserialize)]
struct TransactionsQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl TransactionsQuery {
    fn range(&self) -> Result<Option<DateRange>> {
        match (self.from, self.to) {
            (None, None) => Ok(None),
            (Some(from), Some(to)) if from <= to => Ok(Some(DateRange { from, to })),
            (Some(_), Some(_)) => Err(AppError::BadRequest(
                "`from` must not be after `to`".to_string(),
            )),
            _ => Err(AppError::BadRequest(
                "`from` and `to` must be given together".to_string(),
            )),
        }
    }
}

/// Stored transactions, newest booking date first.
async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(account_id): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<Transaction>>> {
    let range = query.range()?;
    owned_account(&state, &user, &account_id).await?;

    let mut transactions = state
        .store
        .list_transactions(&user.user_id, &account_id, range)
        .await?;
    transactions.sort_by(|a, b| {
        b.booking_date
            .cmp(&a.booking_date)
            .then_with(|| a.transaction_id.cmp(&b.transaction_id))
    });

    Ok(Json(transactions))
}

/// Edit the user-owned fields of a transaction.
async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((account_id, transaction_id)): Path<(String, String)>,
    Json(patch): Json<TransactionPatch>,
) -> Result<Json<Transaction>> {
    patch.validate().map_err(validation_error)?;
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }
    owned_account(&state, &user, &account_id).await?;

    let updated = state
        .store
        .update_transaction(&user.user_id, &account_id, &transaction_id, &patch)
        .await?;
    Ok(Json(updated))
}

// ─── Sync ────────────────────────────────────────────────────

/// Run a sync pass over all of the user's accounts.
async fn sync_now(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SyncReport>> {
    Ok(Json(state.sync.sync_user(&user.user_id).await?))
}
