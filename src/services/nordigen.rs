// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Aggregator (Nordigen / GoCardless Bank Account Data) API client.
//!
//! Handles:
//! - Token issue and refresh exchanges
//! - Error body detection (`status_code > 301` in the JSON body)
//! - Bearer-authenticated calls with a single retry on token rejection
//! - Typed fetchers for institutions, requisitions, accounts and transactions

use crate::db::DateRange;
use crate::error::{AggregatorError, AppError};
use crate::models::{Amount, Balance, Institution, LinkedAccount, Requisition};
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// Date format the aggregator expects for `date_from` / `date_to`.
pub const PSD2_DATE_FORMAT: &str = "%Y-%m-%d";

/// One request against the aggregator API, replayable for the retry.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API root, e.g. `accounts/{id}/`
    pub resource: String,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(resource: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            resource: resource.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(resource: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            resource: resource.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }
}

/// Low-level aggregator HTTP client (no token management).
#[derive(Clone)]
pub struct NordigenHttp {
    http: reqwest::Client,
    base_url: String,
}

impl NordigenHttp {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Issue a request and decode the JSON response.
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<T, AppError> {
        let url = format!(
            "{}/{}",
            self.base_url,
            request.resource.trim_start_matches('/')
        );

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            AppError::Transport(format!("{} {}: {}", request.method, request.resource, e))
        })?;

        check_response_json(response).await
    }

    /// Full authentication with the application secrets.
    ///
    /// A rejection here means the secrets themselves are bad, which no retry
    /// can fix, so it surfaces as `AggregatorAuth`.
    pub async fn new_token(
        &self,
        secret_id: &str,
        secret_key: &str,
    ) -> Result<NewTokenResponse, AppError> {
        let request = ApiRequest::post(
            "token/new/",
            json!({ "secret_id": secret_id, "secret_key": secret_key }),
        );

        self.send(&request, None).await.map_err(|e| match e {
            AppError::Aggregator(err) if matches!(err.status_code, 401 | 403) => {
                AppError::AggregatorAuth(err.to_string())
            }
            other => other,
        })
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_token(&self, refresh: &str) -> Result<RefreshTokenResponse, AppError> {
        let request = ApiRequest::post("token/refresh/", json!({ "refresh": refresh }));
        self.send(&request, None).await
    }
}

/// Check the response for an aggregator error and parse the JSON body.
///
/// The aggregator signals failures in the body (`status_code > 301`), so the
/// body is inspected even when the HTTP status looks fine.
async fn check_response_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::Transport(format!("Failed to read response body: {}", e)))?;
    let body: Option<Value> = serde_json::from_slice(&bytes).ok();

    if let Some(err) = body.as_ref().and_then(error_from_body) {
        if err.status_code == 429 {
            tracing::warn!("Aggregator rate limit hit (429)");
        }
        return Err(AppError::Aggregator(err));
    }

    if !status.is_success() {
        let text = String::from_utf8_lossy(&bytes);
        return Err(AppError::Aggregator(AggregatorError {
            summary: status
                .canonical_reason()
                .unwrap_or("Unexpected HTTP status")
                .to_string(),
            detail: text.chars().take(500).collect(),
            status_code: status.as_u16(),
        }));
    }

    let body = body.ok_or_else(|| AppError::Transport("Response body is not JSON".to_string()))?;
    serde_json::from_value(body)
        .map_err(|e| AppError::Transport(format!("JSON parse error: {}", e)))
}

/// Extract an error from a response body, if it is one.
///
/// Validation failures nest `{summary, detail}` under the offending field
/// name instead of the top level; the first such entry is used.
fn error_from_body(body: &Value) -> Option<AggregatorError> {
    let status_code = body.get("status_code")?.as_u64()?;
    if status_code <= 301 {
        return None;
    }

    let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

    let (summary, detail) = match text(body, "summary") {
        Some(summary) => (summary, text(body, "detail").unwrap_or_default()),
        None => body
            .as_object()
            .and_then(|fields| {
                fields.iter().find_map(|(field, v)| {
                    let summary = text(v, "summary")?;
                    Some((format!("{}: {}", field, summary), text(v, "detail").unwrap_or_default()))
                })
            })
            .unwrap_or_else(|| ("Unknown aggregator error".to_string(), body.to_string())),
    };

    Some(AggregatorError {
        summary,
        detail,
        status_code: u16::try_from(status_code).unwrap_or(u16::MAX),
    })
}

/// Response of `token/new/`. Lifetimes are in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTokenResponse {
    pub access: String,
    pub access_expires: i64,
    pub refresh: String,
    pub refresh_expires: i64,
}

/// Response of `token/refresh/`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenResponse {
    pub access: String,
    pub access_expires: i64,
}

/// Account metadata from `accounts/{id}/`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountDetailsResponse {
    pub id: String,
    #[serde(default)]
    pub iban: Option<String>,
    pub institution_id: String,
    #[serde(default)]
    pub owner_name: Option<String>,
}

impl From<AccountDetailsResponse> for LinkedAccount {
    fn from(details: AccountDetailsResponse) -> Self {
        LinkedAccount {
            iban: details.iban.unwrap_or_else(|| details.id.clone()),
            id: details.id,
            institution_id: details.institution_id,
            owner_name: details.owner_name.unwrap_or_default(),
            last_sync: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct BalancesResponse {
    balances: Vec<Balance>,
}

#[derive(Debug, Clone, Deserialize)]
struct TransactionsResponse {
    transactions: TransactionLists,
}

#[derive(Debug, Clone, Deserialize)]
struct TransactionLists {
    #[serde(default)]
    booked: Vec<Psd2Transaction>,
}

/// Raw PSD2 transaction record. Which fields are filled is bank-specific.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Psd2Transaction {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub internal_transaction_id: Option<String>,
    #[serde(default)]
    pub booking_date: Option<String>,
    #[serde(default)]
    pub value_date: Option<String>,
    pub transaction_amount: Amount,
    #[serde(default)]
    pub creditor_name: Option<String>,
    #[serde(default)]
    pub debtor_name: Option<String>,
    #[serde(default)]
    pub debtor_account: Option<Psd2AccountRef>,
    #[serde(default)]
    pub proprietary_bank_transaction_code: Option<String>,
    #[serde(default)]
    pub remittance_information_unstructured: Option<String>,
    #[serde(default)]
    pub remittance_information_unstructured_array: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Psd2AccountRef {
    #[serde(default)]
    pub iban: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// AggregatorClient - authenticated calls and typed fetchers
// ─────────────────────────────────────────────────────────────────────────────

use crate::services::credentials::CredentialStore;
use crate::services::tokens::TokenManager;
use std::sync::Arc;

/// Authenticated aggregator client.
///
/// Every call obtains a usable access token from the [`TokenManager`] first.
/// If the aggregator still rejects the token as invalid, the token is renewed
/// and the request reissued exactly once; a second rejection is returned to
/// the caller.
#[derive(Clone)]
pub struct AggregatorClient {
    http: NordigenHttp,
    tokens: Arc<TokenManager>,
}

impl AggregatorClient {
    pub fn new(
        base_url: &str,
        secret_id: String,
        secret_key: String,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let http = NordigenHttp::new(base_url);
        let tokens = TokenManager::new(http.clone(), credentials, secret_id, secret_key);
        Self {
            http,
            tokens: Arc::new(tokens),
        }
    }

    /// Bearer-authenticated call with at most one renew-and-retry.
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, AppError> {
        let token = self.tokens.access_token().await?;

        match self.http.send(&request, Some(&token)).await {
            Err(e) if e.is_token_error() => {
                tracing::warn!(
                    method = %request.method,
                    resource = %request.resource,
                    error = %e,
                    "Aggregator rejected access token, renewing and retrying once"
                );
                let token = self.tokens.renew_after_rejection().await?;
                self.http.send(&request, Some(&token)).await
            }
            result => result,
        }
    }

    // ─── Institutions ────────────────────────────────────────────────────────

    /// List banks available in a country (ISO 3166 alpha-2).
    pub async fn list_institutions(&self, country: &str) -> Result<Vec<Institution>, AppError> {
        self.call(ApiRequest::get("institutions/").query("country", country))
            .await
    }

    pub async fn get_institution(&self, institution_id: &str) -> Result<Institution, AppError> {
        self.call(ApiRequest::get(format!(
            "institutions/{}/",
            urlencoding::encode(institution_id)
        )))
        .await
    }

    // ─── Requisitions ────────────────────────────────────────────────────────

    /// Start a bank consent. The returned requisition carries the bank `link`.
    pub async fn create_requisition(
        &self,
        redirect: &str,
        institution_id: &str,
        reference: &str,
    ) -> Result<Requisition, AppError> {
        self.call(ApiRequest::post(
            "requisitions/",
            json!({
                "redirect": redirect,
                "institution_id": institution_id,
                "reference": reference,
            }),
        ))
        .await
    }

    pub async fn get_requisition(&self, requisition_id: &str) -> Result<Requisition, AppError> {
        self.call(ApiRequest::get(format!(
            "requisitions/{}/",
            urlencoding::encode(requisition_id)
        )))
        .await
    }

    // ─── Accounts ────────────────────────────────────────────────────────────

    /// Account details, as a not-yet-synced linked account.
    pub async fn get_account(&self, account_id: &str) -> Result<LinkedAccount, AppError> {
        let details: AccountDetailsResponse = self
            .call(ApiRequest::get(format!(
                "accounts/{}/",
                urlencoding::encode(account_id)
            )))
            .await?;
        Ok(details.into())
    }

    pub async fn get_balances(&self, account_id: &str) -> Result<Vec<Balance>, AppError> {
        let response: BalancesResponse = self
            .call(ApiRequest::get(format!(
                "accounts/{}/balances/",
                urlencoding::encode(account_id)
            )))
            .await?;
        Ok(response.balances)
    }

    /// Booked transactions in `window` (inclusive). Pending ones are not returned.
    pub async fn get_transactions(
        &self,
        account_id: &str,
        window: DateRange,
    ) -> Result<Vec<Psd2Transaction>, AppError> {
        let request = ApiRequest::get(format!(
            "accounts/{}/transactions/",
            urlencoding::encode(account_id)
        ))
        .query("date_from", window.from.format(PSD2_DATE_FORMAT).to_string())
        .query("date_to", window.to.format(PSD2_DATE_FORMAT).to_string());

        let response: TransactionsResponse = self.call(request).await?;
        Ok(response.transactions.booked)
    }
}
