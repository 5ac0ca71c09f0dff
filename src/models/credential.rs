// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Aggregator credential pair and its expiry state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Access/refresh token pair issued by the aggregator.
///
/// Expiries are absolute UTC instants computed locally as
/// `now + lifetime` when the pair was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access: String,
    pub access_expires: DateTime<Utc>,
    pub refresh: String,
    pub refresh_expires: DateTime<Utc>,
}

/// What the token manager has to do before it can make a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Nothing stored yet: full authentication.
    Missing,
    /// Access token usable as-is.
    AccessValid,
    /// Access token expired, refresh token still valid: refresh.
    AccessExpired,
    /// Both expired: full re-authentication.
    BothExpired,
}

impl CredentialState {
    /// Classify an optional stored credential at `now`.
    pub fn of(credential: Option<&Credential>, now: DateTime<Utc>) -> Self {
        match credential {
            None => CredentialState::Missing,
            Some(c) if now < c.access_expires => CredentialState::AccessValid,
            Some(c) if now < c.refresh_expires => CredentialState::AccessExpired,
            Some(_) => CredentialState::BothExpired,
        }
    }
}

impl Credential {
    /// Build a fresh pair from a full authentication exchange.
    pub fn issued(
        access: String,
        access_ttl_secs: i64,
        refresh: String,
        refresh_ttl_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access,
            access_expires: now + Duration::seconds(access_ttl_secs),
            refresh,
            refresh_expires: now + Duration::seconds(refresh_ttl_secs),
        }
    }

    /// Replace the access half after a refresh; the refresh half is kept.
    pub fn with_access(&self, access: String, access_ttl_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            access,
            access_expires: now + Duration::seconds(access_ttl_secs),
            refresh: self.refresh.clone(),
            refresh_expires: self.refresh_expires,
        }
    }

    pub fn refresh_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.refresh_expires
    }
}
