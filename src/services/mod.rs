// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod credentials;
pub mod mappers;
pub mod nordigen;
pub mod reconcile;
pub mod sync;
pub mod tokens;

pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use nordigen::AggregatorClient;
pub use reconcile::{SyncEvent, SyncReconciler};
pub use sync::{RetryPolicy, SyncReport, SyncService};
pub use tokens::TokenManager;
