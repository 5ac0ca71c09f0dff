// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test helpers: an in-process mock aggregator and app builders.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use bankfeed::config::Config;
use bankfeed::db::{FirestoreDb, LedgerStore, MemoryDb};
use bankfeed::models::{Credential, LinkedAccount};
use bankfeed::routes::create_router;
use bankfeed::services::{
    AggregatorClient, CredentialStore, MemoryCredentialStore, RetryPolicy, SyncReconciler,
    SyncService,
};
use bankfeed::AppState;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Unique id for test isolation.
#[allow(dead_code)]
pub fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

// ═══════════════════════════════════════════════════════════════════════════
// MOCK AGGREGATOR
// ═══════════════════════════════════════════════════════════════════════════

/// One request seen by the mock aggregator.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct RecordedCall {
    pub method: Method,
    /// Path below the API root, e.g. `accounts/acc-1/transactions/`
    pub path: String,
    pub query: HashMap<String, String>,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct MockState {
    calls: Mutex<Vec<RecordedCall>>,
    valid_tokens: Mutex<HashSet<String>>,
    accounts: Mutex<HashMap<String, Value>>,
    requisitions: Mutex<HashMap<String, Vec<String>>>,
    transactions: Mutex<HashMap<String, Vec<Value>>>,
    issued: AtomicUsize,
    failing_transaction_fetches: AtomicUsize,
    reject_all_tokens: AtomicBool,
    reject_secrets: AtomicBool,
}

/// Aggregator stand-in served on an ephemeral local port.
///
/// Token exchanges mint `access-N` / `refresh-N`; resource calls are only
/// accepted with a minted (or explicitly accepted) access token.
#[derive(Clone)]
pub struct MockAggregator {
    pub state: Arc<MockState>,
    pub base_url: String,
}

const API_ROOT: &str = "/api/v2/";

#[allow(dead_code)]
impl MockAggregator {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock aggregator");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            base_url: format!("http://{}/api/v2", addr),
        }
    }

    pub fn accept_token(&self, token: &str) {
        self.state
            .valid_tokens
            .lock()
            .unwrap()
            .insert(token.to_string());
    }

    /// Answer every resource call with an invalid-token error.
    pub fn reject_all_tokens(&self) {
        self.state.reject_all_tokens.store(true, Ordering::SeqCst);
    }

    /// Answer `token/new/` with 401.
    pub fn reject_secrets(&self) {
        self.state.reject_secrets.store(true, Ordering::SeqCst);
    }

    /// The next `n` transaction fetches fail with a 500 error body.
    pub fn fail_next_transaction_fetches(&self, n: usize) {
        self.state
            .failing_transaction_fetches
            .store(n, Ordering::SeqCst);
    }

    pub fn add_account(&self, id: &str, institution_id: &str) {
        self.state.accounts.lock().unwrap().insert(
            id.to_string(),
            json!({
                "id": id,
                "created": "2024-01-01T00:00:00Z",
                "iban": format!("IBAN-{}", id),
                "institution_id": institution_id,
                "status": "READY",
                "owner_name": "Jane Doe",
            }),
        );
    }

    pub fn add_requisition(&self, id: &str, accounts: &[&str]) {
        self.state.requisitions.lock().unwrap().insert(
            id.to_string(),
            accounts.iter().map(|a| a.to_string()).collect(),
        );
    }

    pub fn set_transactions(&self, account_id: &str, booked: Vec<Value>) {
        self.state
            .transactions
            .lock()
            .unwrap()
            .insert(account_id.to_string(), booked);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.path == path).collect()
    }

    /// Calls other than token exchanges.
    pub fn resource_calls(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| !c.path.starts_with("token/"))
            .collect()
    }
}

/// Raw booked PSD2 record as the aggregator would send it.
#[allow(dead_code)]
pub fn booked(id: &str, date: &str, amount: &str) -> Value {
    json!({
        "transactionId": id,
        "bookingDate": date,
        "valueDate": date,
        "transactionAmount": { "amount": amount, "currency": "EUR" },
        "remittanceInformationUnstructured": format!("Payment {}", id),
    })
}

fn error_body(status: StatusCode, summary: &str, detail: &str) -> Response {
    (
        status,
        Json(json!({
            "summary": summary,
            "detail": detail,
            "status_code": status.as_u16(),
        })),
    )
        .into_response()
}

fn invalid_token() -> Response {
    error_body(
        StatusCode::UNAUTHORIZED,
        "Invalid token",
        "Token is invalid or expired",
    )
}

fn not_found() -> Response {
    error_body(StatusCode::NOT_FOUND, "Not found.", "Not found.")
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path()
        .strip_prefix(API_ROOT)
        .unwrap_or(uri.path())
        .to_string();
    let query: HashMap<String, String> = uri
        .query()
        .map(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);
    let body: Option<Value> = serde_json::from_slice(&body).ok();

    state.calls.lock().unwrap().push(RecordedCall {
        method: method.clone(),
        path: path.clone(),
        query: query.clone(),
        bearer: bearer.clone(),
        body: body.clone(),
    });

    // ─── Token exchanges ─────────────────────────────────────
    if method == Method::POST && path == "token/new/" {
        if state.reject_secrets.load(Ordering::SeqCst) {
            return error_body(
                StatusCode::UNAUTHORIZED,
                "Authentication failed",
                "No active account found with the given credentials",
            );
        }
        let n = state.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access = format!("access-{}", n);
        state.valid_tokens.lock().unwrap().insert(access.clone());
        return Json(json!({
            "access": access,
            "access_expires": 86400,
            "refresh": format!("refresh-{}", n),
            "refresh_expires": 2592000,
        }))
        .into_response();
    }
    if method == Method::POST && path == "token/refresh/" {
        let n = state.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access = format!("access-{}", n);
        state.valid_tokens.lock().unwrap().insert(access.clone());
        return Json(json!({ "access": access, "access_expires": 86400 })).into_response();
    }

    // ─── Resources ───────────────────────────────────────────
    let authorized = !state.reject_all_tokens.load(Ordering::SeqCst)
        && bearer
            .as_ref()
            .is_some_and(|t| state.valid_tokens.lock().unwrap().contains(t));
    if !authorized {
        return invalid_token();
    }

    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("GET", ["institutions"]) => Json(json!([{
            "id": "SANDBOXFINANCE_SFIN0000",
            "name": "Sandbox Finance",
            "bic": "SFIN0000",
            "transaction_total_days": "90",
            "countries": [query.get("country").cloned().unwrap_or_default()],
            "logo": "https://cdn.example/sandbox.png",
        }]))
        .into_response(),
        ("POST", ["requisitions"]) => {
            let institution_id = body
                .as_ref()
                .and_then(|b| b.get("institution_id"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if institution_id == "UNKNOWN" {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "institution_id": {
                            "summary": "Unknown Institution ID",
                            "detail": "Get Institution IDs from /institutions/"
                        },
                        "status_code": 400
                    })),
                )
                    .into_response();
            }
            let id = format!("req-{}", state.requisitions.lock().unwrap().len() + 1);
            state
                .requisitions
                .lock()
                .unwrap()
                .insert(id.clone(), Vec::new());
            Json(json!({
                "id": id,
                "status": "CR",
                "accounts": [],
                "reference": body.as_ref().and_then(|b| b.get("reference")).cloned(),
                "link": format!("https://ob.example/start/{}", id),
            }))
            .into_response()
        }
        ("GET", ["requisitions", id]) => {
            match state.requisitions.lock().unwrap().get(*id) {
                Some(accounts) => Json(json!({
                    "id": id,
                    "status": "LN",
                    "accounts": accounts,
                }))
                .into_response(),
                None => not_found(),
            }
        }
        ("GET", ["accounts", id]) => match state.accounts.lock().unwrap().get(*id) {
            Some(account) => Json(account.clone()).into_response(),
            None => not_found(),
        },
        ("GET", ["accounts", _, "balances"]) => Json(json!({
            "balances": [{
                "balanceAmount": { "amount": "1234.56", "currency": "EUR" },
                "balanceType": "expected",
                "referenceDate": "2024-06-01"
            }]
        }))
        .into_response(),
        ("GET", ["accounts", id, "transactions"]) => {
            let failing = state.failing_transaction_fetches.load(Ordering::SeqCst);
            if failing > 0 {
                state
                    .failing_transaction_fetches
                    .store(failing - 1, Ordering::SeqCst);
                return error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error",
                    "Upstream bank unavailable",
                );
            }
            let booked = state
                .transactions
                .lock()
                .unwrap()
                .get(*id)
                .cloned()
                .unwrap_or_default();
            Json(json!({ "transactions": { "booked": booked, "pending": [] } })).into_response()
        }
        _ => not_found(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// APP BUILDERS
// ═══════════════════════════════════════════════════════════════════════════

/// Everything a test needs to drive and inspect the app.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: MemoryDb,
    pub credentials: Arc<MemoryCredentialStore>,
    pub mock: MockAggregator,
}

/// Credential valid for another day, accepted by `mock`.
#[allow(dead_code)]
pub fn valid_credential(mock: &MockAggregator) -> Credential {
    mock.accept_token("A");
    let now = Utc::now();
    Credential {
        access: "A".to_string(),
        access_expires: now + Duration::days(1),
        refresh: "R".to_string(),
        refresh_expires: now + Duration::days(29),
    }
}

/// Aggregator client wired to `mock` with the given credential store.
#[allow(dead_code)]
pub fn test_client(
    mock: &MockAggregator,
    credentials: Arc<dyn CredentialStore>,
) -> AggregatorClient {
    AggregatorClient::new(
        &mock.base_url,
        "test_secret_id".to_string(),
        "test_secret_key".to_string(),
        credentials,
    )
}

/// Build the full app against a fresh mock aggregator and in-memory stores.
#[allow(dead_code)]
pub async fn create_test_app() -> TestApp {
    let mock = MockAggregator::start().await;
    let config = Config {
        aggregator_url: mock.base_url.clone(),
        ..Config::default()
    };

    let store = MemoryDb::new();
    let credentials = Arc::new(MemoryCredentialStore::new());
    let aggregator = test_client(&mock, credentials.clone());

    let ledger: Arc<dyn LedgerStore> = Arc::new(store.clone());
    let reconciler =
        SyncReconciler::new(ledger.clone(), aggregator.clone(), config.first_sync_window);
    let sync = SyncService::new(
        ledger.clone(),
        aggregator.clone(),
        reconciler,
        RetryPolicy {
            max_attempts: config.sync_max_attempts,
            delay: config.sync_retry_delay,
        },
    );

    let state = Arc::new(AppState {
        config,
        store: ledger,
        aggregator,
        sync,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        credentials,
        mock,
    }
}

/// Linked account that has never been synced.
#[allow(dead_code)]
pub fn linked_account(id: &str, institution_id: &str) -> LinkedAccount {
    LinkedAccount {
        id: id.to_string(),
        iban: format!("IBAN-{}", id),
        institution_id: institution_id.to_string(),
        owner_name: "Jane Doe".to_string(),
        last_sync: None,
    }
}

/// Create a test JWT token.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    bankfeed::middleware::auth::create_jwt(user_id, signing_key).unwrap()
}
