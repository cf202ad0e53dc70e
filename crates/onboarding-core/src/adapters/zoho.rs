// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Zoho Creator CRM client.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::ZohoConfig;
use crate::model::CrmRecord;

use super::{CrmClient, ProviderError};

const PROVIDER: &str = "zoho";

/// Zoho's application-level success code.
const CODE_SUCCESS: i64 = 3000;
/// "No Data Available".
const CODE_NO_DATA: i64 = 3100;

/// Tokens are refreshed this many seconds before they expire.
const DEFAULT_REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Access-token cache owned by one CRM client.
///
/// Concurrent refreshes are tolerated: the last writer wins and every
/// refreshed token is valid.
#[derive(Debug)]
pub struct TokenCache {
    slot: RwLock<Option<CachedToken>>,
    margin: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_margin(Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS))
    }

    pub fn with_margin(margin: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            margin,
        }
    }

    /// The cached token if it is not within the refresh margin of expiry.
    pub async fn get(&self) -> Option<String> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|t| Utc::now() < t.expires_at - self.margin)
            .map(|t| t.access_token.clone())
    }

    pub async fn store(&self, access_token: String, expires_in_secs: i64) {
        let expires_at = Utc::now() + Duration::seconds(expires_in_secs);
        *self.slot.write().await = Some(CachedToken {
            access_token,
            expires_at,
        });
    }

    pub async fn clear(&self) {
        *self.slot.write().await = None;
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportResponse {
    code: i64,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    data: Value,
}

impl ReportResponse {
    fn message(&self) -> String {
        match &self.message {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => format!("code {}", self.code),
        }
    }
}

/// Zoho Creator report client.
pub struct ZohoCrm {
    http: reqwest::Client,
    config: ZohoConfig,
    tokens: TokenCache,
}

impl ZohoCrm {
    pub fn new(http: reqwest::Client, config: ZohoConfig) -> Self {
        Self::with_token_cache(http, config, TokenCache::new())
    }

    pub fn with_token_cache(http: reqwest::Client, config: ZohoConfig, tokens: TokenCache) -> Self {
        Self {
            http,
            config,
            tokens,
        }
    }

    fn report_url(&self) -> String {
        format!(
            "{}/creator/v2.1/data/{}/{}/report/{}",
            self.config.creator_url,
            self.config.account_owner_name,
            self.config.application_name,
            self.config.report_name
        )
    }

    async fn refresh_access_token(&self) -> Result<String, ProviderError> {
        let url = format!("{}/oauth/v2/token", self.config.accounts_url);
        let params = [
            ("refresh_token", self.config.refresh_token.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let unauthenticated = |message: String| {
            error!(error = %message, "Failed to refresh Zoho access token");
            ProviderError::Unauthenticated {
                provider: PROVIDER,
                message,
            }
        };

        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| unauthenticated(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unauthenticated(format!("token endpoint returned {status}")));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| unauthenticated(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(unauthenticated(err));
        }
        let token = body
            .access_token
            .ok_or_else(|| unauthenticated("token response without access_token".to_string()))?;

        self.tokens
            .store(token.clone(), body.expires_in.unwrap_or(3600))
            .await;
        info!("Zoho access token refreshed");

        Ok(token)
    }

    /// Send an authorized request and unwrap the report envelope.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let token = self.access_token().await?;
        let response = request
            .header("Authorization", format!("Zoho-oauthtoken {token}"))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.clear().await;
            return Err(ProviderError::Unauthenticated {
                provider: PROVIDER,
                message: "access token rejected".to_string(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e))?;

        let envelope = serde_json::from_str::<ReportResponse>(&text);
        match envelope {
            Ok(body) if body.code == CODE_SUCCESS => Ok(body.data),
            Ok(body) if body.code == CODE_NO_DATA => Err(ProviderError::NotFound {
                provider: PROVIDER,
                message: body.message(),
            }),
            Ok(body) => {
                error!(code = body.code, message = %body.message(), "Zoho API error");
                Err(ProviderError::Rejected {
                    provider: PROVIDER,
                    message: body.message(),
                })
            }
            Err(_) if !status.is_success() => Err(ProviderError::Transport {
                provider: PROVIDER,
                message: format!("HTTP {status}"),
            }),
            Err(e) => Err(ProviderError::decode(PROVIDER, e)),
        }
    }
}

fn into_record(value: Value) -> Result<CrmRecord, ProviderError> {
    match value {
        Value::Object(map) => Ok(CrmRecord::new(map)),
        other => Err(ProviderError::decode(
            PROVIDER,
            format!("expected a record object, got {other}"),
        )),
    }
}

#[async_trait]
impl CrmClient for ZohoCrm {
    async fn access_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.tokens.get().await {
            return Ok(token);
        }
        self.refresh_access_token().await
    }

    async fn get_record_by_id(&self, record_id: &str) -> Result<CrmRecord, ProviderError> {
        debug!(record_id, "Fetching Zoho record");
        let url = format!("{}/{}", self.report_url(), record_id);
        let data = self.send(self.http.get(url)).await?;
        into_record(data)
    }

    async fn get_records(&self) -> Result<Vec<CrmRecord>, ProviderError> {
        debug!(report = %self.config.report_name, "Fetching Zoho records");
        let data = self.send(self.http.get(self.report_url())).await?;
        match data {
            Value::Array(items) => items.into_iter().map(into_record).collect(),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![into_record(other)?]),
        }
    }

    async fn update_record(
        &self,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), ProviderError> {
        let url = format!("{}/{}", self.report_url(), record_id);
        let columns: Vec<_> = fields.keys().cloned().collect();
        self.send(self.http.put(url).json(&json!({ "data": fields })))
            .await?;
        info!(record_id, ?columns, "Zoho record updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ZohoConfig {
        ZohoConfig {
            client_id: "cid".into(),
            client_secret: "csecret".into(),
            refresh_token: "rtoken".into(),
            creator_url: server.uri(),
            accounts_url: server.uri(),
            application_name: "client-onboarding".into(),
            report_name: "Onboardings_Report".into(),
            account_owner_name: "owner".into(),
        }
    }

    const RECORD_PATH: &str = "/creator/v2.1/data/owner/client-onboarding/report/Onboardings_Report/4411";

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok-1", "expires_in": 3600})),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_token_is_reused_until_margin() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(RECORD_PATH))
            .and(header("Authorization", "Zoho-oauthtoken tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 3000,
                "data": {"ID": "4411", "Stripe_Required": "Yes"}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let crm = ZohoCrm::new(reqwest::Client::new(), config(&server));
        let first = crm.get_record_by_id("4411").await.unwrap();
        let second = crm.get_record_by_id("4411").await.unwrap();

        assert_eq!(first.id().as_deref(), Some("4411"));
        assert!(second.is_yes("Stripe_Required"));
    }

    #[tokio::test]
    async fn test_token_within_margin_is_refreshed() {
        let cache = TokenCache::new();
        cache.store("old".into(), 120).await;
        assert!(cache.get().await.is_none());

        cache.store("fresh".into(), 3600).await;
        assert_eq!(cache.get().await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_token_error_is_unauthenticated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "invalid_code"})))
            .mount(&server)
            .await;

        let crm = ZohoCrm::new(reqwest::Client::new(), config(&server));
        let err = crm.get_record_by_id("4411").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unauthenticated { .. }));
    }

    #[tokio::test]
    async fn test_no_data_code_is_not_found() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(RECORD_PATH))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"code": 3100, "message": "No Data Available"})),
            )
            .mount(&server)
            .await;

        let crm = ZohoCrm::new(reqwest::Client::new(), config(&server));
        let err = crm.get_record_by_id("4411").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_application_error_is_rejected() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("PUT"))
            .and(path(RECORD_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"code": 3001, "message": "Invalid column value"})),
            )
            .mount(&server)
            .await;

        let crm = ZohoCrm::new(reqwest::Client::new(), config(&server));
        let mut fields = Map::new();
        fields.insert("Intake_Meeting_Completed".into(), json!("Yes"));
        let err = crm.update_record("4411", fields).await.unwrap_err();
        match err {
            ProviderError::Rejected { message, .. } => assert_eq!(message, "Invalid column value"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_wraps_fields_in_data() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("PUT"))
            .and(path(RECORD_PATH))
            .and(body_partial_json(json!({"data": {"Intake_Meeting_Completed": "Yes"}})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"code": 3000, "data": {"ID": "4411"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let crm = ZohoCrm::new(reqwest::Client::new(), config(&server));
        let mut fields = Map::new();
        fields.insert("Intake_Meeting_Completed".into(), json!("Yes"));
        crm.update_record("4411", fields).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_records_returns_list() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(
                "/creator/v2.1/data/owner/client-onboarding/report/Onboardings_Report",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 3000,
                "data": [{"ID": "1"}, {"ID": "2"}]
            })))
            .mount(&server)
            .await;

        let crm = ZohoCrm::new(reqwest::Client::new(), config(&server));
        let records = crm.get_records().await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(RECORD_PATH))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let crm = ZohoCrm::new(reqwest::Client::new(), config(&server));
        let err = crm.get_record_by_id("4411").await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport { .. }));
    }
}
