// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Canonical transaction model for storage and API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Monetary amount as the aggregator reports it (decimal string + ISO currency).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub amount: String,
    pub currency: String,
}

impl Amount {
    pub fn value(&self) -> Option<f64> {
        self.amount.trim().parse().ok()
    }

    /// Money leaving the account. Unparseable amounts count as credits.
    pub fn is_debit(&self) -> bool {
        self.value().is_some_and(|v| v < 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Payment,
    Transfer,
    Unknown,
}

/// Spending category assigned by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Entertainment,
    Family,
    General,
    Grocery,
    Health,
    Insurance,
    Investment,
    Mortgage,
    Gifts,
    Restaurants,
    Salary,
    Services,
    Shopping,
    Trading,
    Transfer,
    Transport,
    Travel,
    Utility,
}

/// Transaction persisted for an account.
///
/// Stored at: `users/{user_id}/accounts/{account_id}/transactions/{transaction_id}`
///
/// Everything except `category`, `excluded` and `description` is immutable
/// once stored; sync only ever inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique within the owning account
    pub transaction_id: String,
    /// Booking date ("yyyy-MM-dd"), used for range queries
    pub booking_date: NaiveDate,
    #[serde(default)]
    pub value_date: Option<NaiveDate>,
    pub amount: Amount,
    pub kind: TransactionKind,
    /// Creditor for payments, debtor for transfers
    #[serde(default)]
    pub counterparty_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub excluded: bool,
}

/// User edit of a stored transaction. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct TransactionPatch {
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub excluded: Option<bool>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.excluded.is_none() && self.description.is_none()
    }

    /// Names of the stored fields this patch writes (for field-mask updates).
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.category.is_some() {
            fields.push("category");
        }
        if self.excluded.is_some() {
            fields.push("excluded");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        fields
    }

    pub fn apply_to(&self, transaction: &mut Transaction) {
        if let Some(category) = self.category {
            transaction.category = Some(category);
        }
        if let Some(excluded) = self.excluded {
            transaction.excluded = excluded;
        }
        if let Some(description) = &self.description {
            transaction.description = Some(description.clone());
        }
    }
}
