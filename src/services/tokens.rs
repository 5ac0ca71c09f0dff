// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Aggregator token lifecycle.
//!
//! The stored credential is classified against the wall clock every time a
//! token is needed; there is no background refresh. After any successful
//! exchange the new credential is persisted before the access token is handed
//! out, so a crash between the two never loses a valid pair.

use crate::error::AppError;
use crate::models::{Credential, CredentialState};
use crate::services::credentials::CredentialStore;
use crate::services::nordigen::NordigenHttp;
use chrono::Utc;
use std::sync::Arc;

/// Obtains, refreshes and persists the aggregator credential.
///
/// Concurrent callers are not serialized: two calls racing on an expired
/// access token may both refresh, and the last write wins. Either pair is
/// valid.
pub struct TokenManager {
    http: NordigenHttp,
    store: Arc<dyn CredentialStore>,
    secret_id: String,
    secret_key: String,
}

impl TokenManager {
    pub fn new(
        http: NordigenHttp,
        store: Arc<dyn CredentialStore>,
        secret_id: String,
        secret_key: String,
    ) -> Self {
        Self {
            http,
            store,
            secret_id,
            secret_key,
        }
    }

    /// Get a usable access token, refreshing or re-authenticating as needed.
    pub async fn access_token(&self) -> Result<String, AppError> {
        let stored = self.store.load().await?;
        let state = CredentialState::of(stored.as_ref(), Utc::now());

        match (state, stored) {
            (CredentialState::AccessValid, Some(credential)) => Ok(credential.access),
            (CredentialState::AccessExpired, Some(credential)) => {
                tracing::debug!("Access token expired, refreshing");
                self.refresh(&credential).await
            }
            (state, _) => {
                tracing::debug!(?state, "No usable refresh token, authenticating");
                self.authenticate().await
            }
        }
    }

    /// Replace an access token the aggregator rejected.
    ///
    /// The stored access expiry is ignored here since the aggregator has
    /// already said the token is no good.
    pub async fn renew_after_rejection(&self) -> Result<String, AppError> {
        match self.store.load().await? {
            Some(credential) if credential.refresh_valid_at(Utc::now()) => {
                self.refresh(&credential).await
            }
            _ => self.authenticate().await,
        }
    }

    /// Full authentication with the application secrets.
    async fn authenticate(&self) -> Result<String, AppError> {
        let response = self
            .http
            .new_token(&self.secret_id, &self.secret_key)
            .await?;

        let credential = Credential::issued(
            response.access,
            response.access_expires,
            response.refresh,
            response.refresh_expires,
            Utc::now(),
        );
        self.store.store(&credential).await?;

        tracing::info!(
            access_expires = %credential.access_expires,
            refresh_expires = %credential.refresh_expires,
            "Obtained new aggregator credential"
        );
        Ok(credential.access)
    }

    /// Exchange the refresh token; the refresh half of the pair is kept.
    async fn refresh(&self, credential: &Credential) -> Result<String, AppError> {
        let response = self.http.refresh_token(&credential.refresh).await?;

        let updated = credential.with_access(response.access, response.access_expires, Utc::now());
        self.store.store(&updated).await?;

        tracing::info!(
            access_expires = %updated.access_expires,
            "Refreshed aggregator access token"
        );
        Ok(updated.access)
    }
}
