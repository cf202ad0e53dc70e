// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Slack incoming-webhook alert sink.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::error;

use super::{AlertSink, ErrorAlert, FrontendErrorReport};

const PORTAL_NAME: &str = "Onboarding Backend";
const STACK_LIMIT: usize = 500;
const FRONTEND_STACK_LIMIT: usize = 800;
const CONTEXT_LIMIT: usize = 500;

/// Posts alerts to a Slack incoming webhook.
pub struct SlackAlerts {
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl SlackAlerts {
    pub fn new(http: reqwest::Client, webhook_url: Option<String>) -> Self {
        Self { http, webhook_url }
    }

    async fn post(&self, payload: Value) {
        let Some(url) = self.webhook_url.as_deref() else {
            error!("SLACK_WEBHOOK_URL not set, alert skipped");
            return;
        };

        match self.http.post(url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                error!(status = response.status().as_u16(), "Slack rejected alert");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Failed to send alert to Slack"),
        }
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

fn severity_emoji(severity: &str) -> &'static str {
    match severity.to_ascii_lowercase().as_str() {
        "critical" => "🔥",
        "high" => "🚨",
        "low" => "ℹ️",
        _ => "⚠️",
    }
}

/// Cut `text` to at most `limit` characters, marking the cut.
fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn mrkdwn(text: String) -> Value {
    json!({ "type": "mrkdwn", "text": text })
}

/// Block payload for a backend error.
pub fn error_alert_blocks(alert: &ErrorAlert) -> Value {
    let mut fields = vec![
        mrkdwn(format!("*Portal:*\n{PORTAL_NAME}")),
        mrkdwn(format!(
            "*Status:*\n{} {}",
            alert.status_code,
            status_text(alert.status_code)
        )),
        mrkdwn(format!("*Endpoint:*\n{} {}", alert.method, alert.endpoint)),
        mrkdwn(format!("*Timestamp:*\n{}", alert.timestamp.to_rfc3339())),
    ];
    if let Some(record_id) = &alert.record_id {
        fields.push(mrkdwn(format!("*Record ID:*\n{record_id}")));
    }

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": "🚨 Error Alert", "emoji": true }
        }),
        json!({ "type": "section", "fields": fields }),
        json!({
            "type": "section",
            "text": mrkdwn(format!("*Error Message:*\n```{}```", alert.message))
        }),
    ];
    if let Some(stack) = &alert.stack {
        blocks.push(json!({
            "type": "section",
            "text": mrkdwn(format!("*Stack Trace:*\n```{}```", truncate(stack, STACK_LIMIT)))
        }));
    }
    blocks.push(json!({ "type": "divider" }));

    json!({ "blocks": blocks })
}

/// Block payload for an error reported by the browser.
pub fn frontend_alert_blocks(report: &FrontendErrorReport) -> Value {
    let severity = report.severity.as_deref().unwrap_or("medium");
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("{} Frontend Error Alert", severity_emoji(severity)),
                "emoji": true
            }
        }),
        json!({
            "type": "section",
            "fields": [
                mrkdwn("*Portal:*\nOnboarding Frontend".to_string()),
                mrkdwn(format!("*Severity:*\n{}", severity.to_uppercase())),
                mrkdwn(format!(
                    "*Error Type:*\n{}",
                    report.error_type.as_deref().unwrap_or("Unknown")
                )),
                mrkdwn(format!("*Timestamp:*\n{}", chrono::Utc::now().to_rfc3339())),
            ]
        }),
        json!({
            "type": "section",
            "text": mrkdwn(format!("*Error Message:*\n```{}```", report.error_message))
        }),
    ];

    let context: Vec<Value> = [
        ("Page", &report.page),
        ("Component", &report.component),
        ("User Action", &report.user_action),
        ("Browser", &report.browser_info),
    ]
    .into_iter()
    .filter_map(|(label, value)| {
        value
            .as_deref()
            .map(|v| mrkdwn(format!("*{label}:*\n{v}")))
    })
    .collect();
    if !context.is_empty() {
        blocks.push(json!({ "type": "section", "fields": context }));
    }

    if let Some(record_id) = &report.record_id {
        blocks.push(json!({
            "type": "section",
            "fields": [mrkdwn(format!("*Record ID:*\n{record_id}"))]
        }));
    }
    if let Some(stack) = &report.stack_trace {
        blocks.push(json!({
            "type": "section",
            "text": mrkdwn(format!(
                "*Stack Trace:*\n```{}```",
                truncate(stack, FRONTEND_STACK_LIMIT)
            ))
        }));
    }
    if let Some(extra) = report.additional_context.as_ref().filter(|m| !m.is_empty()) {
        let pretty = serde_json::to_string_pretty(extra).unwrap_or_default();
        blocks.push(json!({
            "type": "section",
            "text": mrkdwn(format!(
                "*Additional Context:*\n```{}```",
                truncate(&pretty, CONTEXT_LIMIT)
            ))
        }));
    }
    blocks.push(json!({ "type": "divider" }));

    json!({ "blocks": blocks })
}

#[async_trait]
impl AlertSink for SlackAlerts {
    async fn send_message(&self, text: &str) {
        self.post(json!({ "text": text })).await;
    }

    async fn send_error_alert(&self, alert: &ErrorAlert) {
        self.post(error_alert_blocks(alert)).await;
    }

    async fn send_frontend_alert(&self, report: &FrontendErrorReport) {
        self.post(frontend_alert_blocks(report)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert() -> ErrorAlert {
        ErrorAlert {
            message: "stripe request failed: timeout".into(),
            status_code: 500,
            method: "POST".into(),
            endpoint: "/api/onboarding/create-payment-intent".into(),
            timestamp: Utc::now(),
            record_id: Some("4411".into()),
            stack: Some("x".repeat(600)),
        }
    }

    #[test]
    fn test_error_alert_blocks_layout() {
        let payload = error_alert_blocks(&alert());
        let blocks = payload["blocks"].as_array().unwrap();

        assert_eq!(blocks[0]["text"]["text"], "🚨 Error Alert");
        let fields = blocks[1]["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[1]["text"], "*Status:*\n500 Internal Server Error");
        assert_eq!(fields[4]["text"], "*Record ID:*\n4411");
        let stack = blocks[3]["text"]["text"].as_str().unwrap();
        assert!(stack.contains(&format!("{}...", "x".repeat(500))));
        assert_eq!(blocks.last().unwrap()["type"], "divider");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_frontend_blocks_include_context() {
        let payload = frontend_alert_blocks(&FrontendErrorReport {
            error_message: "Payment form crashed".into(),
            page: Some("/4411".into()),
            severity: Some("critical".into()),
            ..Default::default()
        });
        let blocks = payload["blocks"].as_array().unwrap();
        assert_eq!(blocks[0]["text"]["text"], "🔥 Frontend Error Alert");
        assert_eq!(blocks[3]["fields"][0]["text"], "*Page:*\n/4411");
    }

    #[tokio::test]
    async fn test_send_message_posts_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({"text": "hello"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = SlackAlerts::new(reqwest::Client::new(), Some(format!("{}/hook", server.uri())));
        sink.send_message("hello").await;
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = SlackAlerts::new(reqwest::Client::new(), Some(server.uri()));
        sink.send_error_alert(&alert()).await;

        let unset = SlackAlerts::new(reqwest::Client::new(), None);
        unset.send_message("dropped").await;
    }
}
