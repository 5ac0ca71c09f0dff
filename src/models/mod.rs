// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod account;
pub mod credential;
pub mod requisition;
pub mod transaction;

pub use account::{Balance, LinkedAccount};
pub use credential::{Credential, CredentialState};
pub use requisition::{Institution, Requisition, UserRequisition};
pub use transaction::{Amount, Category, Transaction, TransactionKind, TransactionPatch};
