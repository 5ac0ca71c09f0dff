// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Linked bank account model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Amount;

/// Bank account linked through a requisition.
///
/// Stored at: `users/{user_id}/accounts/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedAccount {
    /// Aggregator account id (also used as document ID)
    pub id: String,
    /// IBAN, or the institution's own identifier when no IBAN is exposed
    pub iban: String,
    /// Aggregator institution id, selects the transaction mapper
    pub institution_id: String,
    pub owner_name: String,
    /// How far this account's history has been synced.
    /// Only the reconciler writes this, after a successful merge.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

/// Balance entry as reported by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub balance_amount: Amount,
    /// e.g. "expected", "interimAvailable", "closingBooked"
    pub balance_type: String,
    #[serde(default)]
    pub reference_date: Option<String>,
}
