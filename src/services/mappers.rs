// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Normalization of raw PSD2 transactions into [`Transaction`].
//!
//! Banks fill the PSD2 record differently, so the mapping is chosen by the
//! account's institution id. Unknown institutions get the sign-of-amount
//! heuristic.

use crate::models::{Transaction, TransactionKind};
use crate::services::nordigen::{Psd2Transaction, PSD2_DATE_FORMAT};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Counterparty placeholder when the bank reports neither name nor description.
pub const UNKNOWN_COUNTERPARTY: &str = "Unknown";

/// Prefix of ids synthesized for records the bank sent without one.
pub const SYNTHETIC_ID_PREFIX: &str = "synth-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstitutionMapper {
    IngItaly,
    Revolut,
    Sandbox,
    Default,
}

impl InstitutionMapper {
    pub fn for_institution(institution_id: &str) -> Self {
        match institution_id {
            "ING_INGBITMM" => InstitutionMapper::IngItaly,
            "REVOLUT_REVOGB21" => InstitutionMapper::Revolut,
            "SANDBOXFINANCE_SFIN0000" => InstitutionMapper::Sandbox,
            _ => InstitutionMapper::Default,
        }
    }

    /// Map one record. `None` when it has no usable booking or value date.
    pub fn map(self, raw: &Psd2Transaction) -> Option<Transaction> {
        let booking_date = raw
            .booking_date
            .as_deref()
            .and_then(parse_psd2_date)
            .or_else(|| raw.value_date.as_deref().and_then(parse_psd2_date))?;
        let value_date = raw.value_date.as_deref().and_then(parse_psd2_date);

        let kind = self.kind(raw);
        let description = self.description(raw);

        let counterparty_name = match kind {
            TransactionKind::Payment => Some(
                raw.creditor_name
                    .clone()
                    .or_else(|| description.clone())
                    .unwrap_or_else(|| UNKNOWN_COUNTERPARTY.to_string()),
            ),
            TransactionKind::Transfer => {
                let debtor_iban = match self {
                    InstitutionMapper::Sandbox => raw
                        .debtor_account
                        .as_ref()
                        .and_then(|account| account.iban.clone()),
                    _ => None,
                };
                Some(
                    raw.debtor_name
                        .clone()
                        .or(debtor_iban)
                        .or_else(|| description.clone())
                        .unwrap_or_else(|| UNKNOWN_COUNTERPARTY.to_string()),
                )
            }
            TransactionKind::Unknown => None,
        };

        Some(Transaction {
            transaction_id: transaction_identity(raw, booking_date, description.as_deref()),
            booking_date,
            value_date,
            amount: raw.transaction_amount.clone(),
            kind,
            counterparty_name,
            description,
            category: None,
            excluded: false,
        })
    }

    fn kind(self, raw: &Psd2Transaction) -> TransactionKind {
        let code = raw.proprietary_bank_transaction_code.as_deref();
        match self {
            InstitutionMapper::IngItaly => match code {
                Some("PAGAMENTO CARTA") | Some("PAGAMENTO I24") => TransactionKind::Payment,
                Some("VS.DISPOSIZIONE") => TransactionKind::Transfer,
                _ => TransactionKind::Unknown,
            },
            InstitutionMapper::Revolut => match code {
                Some("CARD_PAYMENT") => TransactionKind::Payment,
                Some("TOPUP") => TransactionKind::Transfer,
                _ => TransactionKind::Unknown,
            },
            InstitutionMapper::Sandbox | InstitutionMapper::Default => {
                if raw.transaction_amount.is_debit() {
                    TransactionKind::Payment
                } else {
                    TransactionKind::Transfer
                }
            }
        }
    }

    fn description(self, raw: &Psd2Transaction) -> Option<String> {
        let first_line = || {
            raw.remittance_information_unstructured_array
                .as_ref()
                .and_then(|lines| lines.first().cloned())
        };

        let description = match self {
            InstitutionMapper::IngItaly => raw.remittance_information_unstructured.clone(),
            InstitutionMapper::Revolut => first_line(),
            InstitutionMapper::Sandbox | InstitutionMapper::Default => raw
                .remittance_information_unstructured
                .clone()
                .or_else(|| {
                    raw.remittance_information_unstructured_array
                        .as_ref()
                        .filter(|lines| !lines.is_empty())
                        .map(|lines| lines.join(" "))
                }),
        };

        description.filter(|d| !d.trim().is_empty())
    }
}

/// Result of mapping a batch of raw records.
#[derive(Debug, Default)]
pub struct MappedBatch {
    pub transactions: Vec<Transaction>,
    /// Records dropped for lack of a usable date
    pub skipped: usize,
}

/// Map a fetched batch for an account of `institution_id`.
pub fn map_transactions(institution_id: &str, raw: &[Psd2Transaction]) -> MappedBatch {
    let mapper = InstitutionMapper::for_institution(institution_id);
    let mut batch = MappedBatch::default();

    for record in raw {
        match mapper.map(record) {
            Some(transaction) => batch.transactions.push(transaction),
            None => batch.skipped += 1,
        }
    }

    if batch.skipped > 0 {
        tracing::warn!(
            institution_id,
            skipped = batch.skipped,
            "Skipped transactions without booking or value date"
        );
    }
    batch
}

/// Accepts plain dates and date-times (only the date part is used).
fn parse_psd2_date(raw: &str) -> Option<NaiveDate> {
    let date = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(date, PSD2_DATE_FORMAT).ok()
}

/// Bank id if present, otherwise a stable digest of the record's content.
fn transaction_identity(
    raw: &Psd2Transaction,
    booking_date: NaiveDate,
    description: Option<&str>,
) -> String {
    if let Some(id) = raw
        .transaction_id
        .as_deref()
        .or(raw.internal_transaction_id.as_deref())
        .filter(|id| !id.is_empty())
    {
        return id.to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(booking_date.format(PSD2_DATE_FORMAT).to_string());
    hasher.update(b"|");
    hasher.update(raw.transaction_amount.amount.trim());
    hasher.update(b"|");
    hasher.update(&raw.transaction_amount.currency);
    hasher.update(b"|");
    hasher.update(description.unwrap_or_default());
    format!("{}{}", SYNTHETIC_ID_PREFIX, hex::encode(hasher.finalize()))
}
