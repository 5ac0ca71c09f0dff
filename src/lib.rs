// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Bankfeed: bank account transactions imported through an open-banking
//! aggregator.
//!
//! This crate provides the backend API for linking bank accounts and keeping
//! their transaction history in sync.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::LedgerStore;
use services::{AggregatorClient, SyncService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn LedgerStore>,
    pub aggregator: AggregatorClient,
    pub sync: SyncService,
}
