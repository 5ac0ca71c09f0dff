// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bankfeed API Server
//!
//! Links bank accounts through the Nordigen / GoCardless aggregator and keeps
//! each account's transactions in sync.

use bankfeed::{
    config::Config,
    db::{FirestoreDb, LedgerStore, MemoryDb},
    services::{
        AggregatorClient, FileCredentialStore, RetryPolicy, SyncReconciler, SyncService,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Bankfeed API");

    // Ledger store: Firestore when a project is configured, memory otherwise
    let store: Arc<dyn LedgerStore> = match &config.gcp_project_id {
        Some(project_id) => {
            let db = FirestoreDb::new(project_id)
                .await
                .expect("Failed to connect to Firestore");
            tracing::info!(project = %project_id, "Using Firestore ledger store");
            Arc::new(db)
        }
        None => {
            tracing::warn!("GCP_PROJECT_ID not set, using in-memory ledger store");
            Arc::new(MemoryDb::new())
        }
    };

    let credentials = Arc::new(FileCredentialStore::new(&config.credential_dir));
    tracing::info!(
        path = %credentials.path().display(),
        "Aggregator credential store initialized"
    );

    let aggregator = AggregatorClient::new(
        &config.aggregator_url,
        config.secret_id.clone(),
        config.secret_key.clone(),
        credentials,
    );

    let reconciler =
        SyncReconciler::new(store.clone(), aggregator.clone(), config.first_sync_window);
    let sync = SyncService::new(
        store.clone(),
        aggregator.clone(),
        reconciler,
        RetryPolicy {
            max_attempts: config.sync_max_attempts,
            delay: config.sync_retry_delay,
        },
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        aggregator,
        sync,
    });

    // Build router
    let app = bankfeed::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bankfeed=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
