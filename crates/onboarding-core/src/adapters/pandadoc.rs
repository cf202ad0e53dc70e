// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PandaDoc signing client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::PandaDocConfig;

use super::{DocumentDetails, DocumentField, ProviderError, Recipient, SigningProvider};

const PROVIDER: &str = "pandadoc";

/// Embedded sessions stay valid for an hour.
const SESSION_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
struct RawDetails {
    id: String,
    status: String,
    #[serde(default)]
    recipients: Vec<RawRecipient>,
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawRecipient {
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    role: Option<String>,
    #[serde(default)]
    has_completed: bool,
    shared_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    field_id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    value: Value,
    assigned_to: Option<Assignee>,
}

#[derive(Debug, Deserialize)]
struct Assignee {
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: Option<String>,
    session_url: Option<String>,
}

impl From<RawDetails> for DocumentDetails {
    fn from(raw: RawDetails) -> Self {
        Self {
            id: raw.id,
            status: raw.status,
            recipients: raw
                .recipients
                .into_iter()
                .map(|r| Recipient {
                    email: r.email,
                    first_name: r.first_name,
                    last_name: r.last_name,
                    role: r.role,
                    has_completed: r.has_completed,
                    shared_link: r.shared_link,
                })
                .collect(),
            fields: raw
                .fields
                .into_iter()
                .map(|f| DocumentField {
                    field_id: f.field_id,
                    name: f.name,
                    value: match f.value {
                        Value::String(s) => Some(s),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    },
                    role: f.assigned_to.and_then(|a| a.role),
                })
                .collect(),
        }
    }
}

/// PandaDoc API client.
pub struct PandaDocClient {
    http: reqwest::Client,
    config: PandaDocConfig,
}

impl PandaDocClient {
    pub fn new(http: reqwest::Client, config: PandaDocConfig) -> Self {
        Self { http, config }
    }

    fn document_url(&self, document_id: &str, action: &str) -> String {
        format!("{}/documents/{}/{}", self.config.api_base, document_id, action)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = request
            .header("Authorization", format!("API-Key {}", self.config.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .get("detail")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}"));
        warn!(status = status.as_u16(), error = %message, "PandaDoc request failed");

        Err(match status.as_u16() {
            401 | 403 => ProviderError::Unauthenticated {
                provider: PROVIDER,
                message,
            },
            404 => ProviderError::NotFound {
                provider: PROVIDER,
                message,
            },
            400..=499 => ProviderError::Rejected {
                provider: PROVIDER,
                message,
            },
            _ => ProviderError::Transport {
                provider: PROVIDER,
                message,
            },
        })
    }
}

#[async_trait]
impl SigningProvider for PandaDocClient {
    async fn document_details(&self, document_id: &str) -> Result<DocumentDetails, ProviderError> {
        debug!(document_id, "Fetching PandaDoc document details");
        let response = self
            .execute(self.http.get(self.document_url(document_id, "details")))
            .await?;
        let raw: RawDetails = response
            .json()
            .await
            .map_err(|e| ProviderError::decode(PROVIDER, e))?;
        Ok(raw.into())
    }

    async fn send_document(&self, document_id: &str) -> Result<(), ProviderError> {
        self.execute(
            self.http
                .post(self.document_url(document_id, "send"))
                .json(&json!({ "silent": true })),
        )
        .await?;
        info!(document_id, "PandaDoc document sent");
        Ok(())
    }

    async fn create_session(
        &self,
        document_id: &str,
        recipient_email: &str,
    ) -> Result<String, ProviderError> {
        let response = self
            .execute(
                self.http
                    .post(self.document_url(document_id, "session"))
                    .json(&json!({
                        "recipient": recipient_email,
                        "lifetime": SESSION_LIFETIME_SECS,
                    })),
            )
            .await?;
        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::decode(PROVIDER, e))?;

        session
            .id
            .or(session.session_url)
            .ok_or_else(|| ProviderError::decode(PROVIDER, "session response without id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> PandaDocClient {
        PandaDocClient::new(
            reqwest::Client::new(),
            PandaDocConfig {
                api_key: "pd-key".into(),
                api_base: server.uri(),
            },
        )
    }

    async fn mount_details(server: &MockServer, has_completed: bool) {
        Mock::given(method("GET"))
            .and(path("/documents/doc-1/details"))
            .and(header("Authorization", "API-Key pd-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "doc-1",
                "status": "document.sent",
                "recipients": [{
                    "email": "jo@acme.test",
                    "first_name": "Jo",
                    "last_name": "Bloggs",
                    "role": "Client",
                    "has_completed": has_completed,
                    "shared_link": "https://app.pandadoc.com/document/v2?token=abc"
                }],
                "fields": [{
                    "field_id": "Title",
                    "value": "Founder",
                    "assigned_to": {"role": "Client"}
                }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_is_document_signed() {
        let server = MockServer::start().await;
        mount_details(&server, true).await;

        let signed = client(&server)
            .is_document_signed("doc-1")
            .await
            .unwrap()
            .expect("signed");
        assert_eq!(signed.signer_name.as_deref(), Some("Jo Bloggs"));
        assert_eq!(signed.signer_title.as_deref(), Some("Founder"));
        assert_eq!(
            signed.shared_link.as_deref(),
            Some("https://app.pandadoc.com/document/v2?token=abc")
        );
    }

    #[tokio::test]
    async fn test_unsigned_document() {
        let server = MockServer::start().await;
        mount_details(&server, false).await;

        let signed = client(&server).is_document_signed("doc-1").await.unwrap();
        assert!(signed.is_none());
    }

    #[tokio::test]
    async fn test_create_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents/doc-1/session"))
            .and(body_partial_json(json!({"recipient": "jo@acme.test"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"id": "sess-1", "expires_at": "2030-01-01T00:00:00Z"})),
            )
            .mount(&server)
            .await;

        let id = client(&server)
            .create_session("doc-1", "jo@acme.test")
            .await
            .unwrap();
        assert_eq!(id, "sess-1");
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/documents/missing/details"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"type": "not_found", "detail": "Not found."})),
            )
            .mount(&server)
            .await;

        let err = client(&server).document_details("missing").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
    }
}
