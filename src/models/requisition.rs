// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Institution and requisition (bank consent) models.

use serde::{Deserialize, Serialize};

/// Bank supported by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub bic: Option<String>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub logo: Option<String>,
    /// How many days of history the bank exposes (the aggregator sends a string)
    #[serde(default)]
    pub transaction_total_days: Option<String>,
}

/// Requisition as returned by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub agreement: Option<String>,
    /// Account ids granted by this consent (empty until the user finishes the bank flow)
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub reference: Option<String>,
    /// Bank authorization URL the user must visit
    #[serde(default)]
    pub link: Option<String>,
}

/// Requisition started by a user, persisted so account discovery can find it.
///
/// Stored at: `users/{user_id}/requisitions/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRequisition {
    pub id: String,
    pub link: String,
}
