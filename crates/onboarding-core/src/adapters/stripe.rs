// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stripe REST client (form-encoded API).

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::StripeConfig;
use crate::model::InvoiceLinks;

use super::{
    CheckoutRequest, InvoicePaymentIntent, PaymentIntentRequest, PaymentProvider, ProviderError,
};

const PROVIDER: &str = "stripe";

/// Payment method types offered on onboarding invoices.
const INVOICE_PAYMENT_METHODS: &[&str] = &["card", "us_bank_account"];

type Form = Vec<(String, String)>;

fn field(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Object {
    id: String,
}

#[derive(Debug, Deserialize)]
struct List<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FinalizedInvoice {
    id: String,
    confirmation_secret: Option<ConfirmationSecret>,
}

#[derive(Debug, Deserialize)]
struct ConfirmationSecret {
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct Invoice {
    id: String,
    hosted_invoice_url: Option<String>,
    invoice_pdf: Option<String>,
    status: Option<String>,
    amount_due: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethod {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Stripe API client.
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(http: reqwest::Client, config: StripeConfig) -> Self {
        Self { http, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &Form) -> Result<T, ProviderError> {
        let request = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.config.secret_key)
            .query(query);
        execute(request).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, form: &Form) -> Result<T, ProviderError> {
        let request = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.config.secret_key)
            .form(form);
        execute(request).await
    }
}

async fn execute<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::transport(PROVIDER, e))?;

    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::decode(PROVIDER, e));
    }

    let detail = response.json::<ErrorBody>().await.ok().map(|b| b.error);
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| format!("HTTP {status}"));
    warn!(
        status = status.as_u16(),
        error_type = ?detail.as_ref().and_then(|d| d.kind.clone()),
        error = %message,
        "Stripe request failed"
    );

    Err(match status.as_u16() {
        401 => ProviderError::Unauthenticated {
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

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<String, ProviderError> {
        let existing: List<Object> = self
            .get("customers", &vec![field("email", email), field("limit", 1)])
            .await?;
        if let Some(customer) = existing.data.into_iter().next() {
            debug!(customer_id = %customer.id, "Reusing Stripe customer");
            return Ok(customer.id);
        }

        let mut form = vec![field("email", email)];
        if let Some(name) = name {
            form.push(field("name", name));
        }
        let customer: Object = self.post("customers", &form).await?;
        info!(customer_id = %customer.id, "Stripe customer created");
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<String, ProviderError> {
        let return_url = format!("{}/{}", self.config.frontend_url, request.record_id);
        let form = vec![
            field("mode", "payment"),
            field("customer", &request.customer_id),
            field("payment_method_types[0]", "card"),
            field("line_items[0][quantity]", 1),
            field("line_items[0][price_data][currency]", &self.config.currency),
            field("line_items[0][price_data][unit_amount]", request.amount),
            field("line_items[0][price_data][product_data][name]", "Onboarding Payment"),
            field("invoice_creation[enabled]", "true"),
            field("metadata[recordId]", &request.record_id),
            field("success_url", &return_url),
            field("cancel_url", &return_url),
        ];

        let session: CheckoutSession = self.post("checkout/sessions", &form).await?;
        session
            .url
            .ok_or_else(|| ProviderError::decode(PROVIDER, "checkout session without url"))
    }

    async fn create_invoice_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<InvoicePaymentIntent, ProviderError> {
        let mut form = vec![
            field("customer", &request.customer_id),
            field("collection_method", "send_invoice"),
            field("days_until_due", 0),
            field("metadata[recordId]", &request.record_id),
        ];
        for (i, method) in INVOICE_PAYMENT_METHODS.iter().enumerate() {
            form.push(field(
                &format!("payment_settings[payment_method_types][{i}]"),
                method,
            ));
        }
        let invoice: Object = self.post("invoices", &form).await?;

        let item = vec![
            field("customer", &request.customer_id),
            field("amount", request.amount),
            field("currency", &self.config.currency),
            field("invoice", &invoice.id),
        ];
        let _: Object = self.post("invoiceitems", &item).await?;

        let finalized: FinalizedInvoice = self
            .post(
                &format!("invoices/{}/finalize", invoice.id),
                &vec![field("expand[0]", "confirmation_secret")],
            )
            .await?;

        let client_secret = finalized
            .confirmation_secret
            .map(|s| s.client_secret)
            .ok_or_else(|| {
                ProviderError::decode(PROVIDER, "finalized invoice without confirmation secret")
            })?;

        info!(invoice_id = %finalized.id, record_id = %request.record_id, "Invoice finalized");

        Ok(InvoicePaymentIntent {
            client_secret,
            invoice_id: finalized.id,
        })
    }

    async fn retrieve_invoice(&self, invoice_id: &str) -> Result<InvoiceLinks, ProviderError> {
        let invoice: Invoice = self.get(&format!("invoices/{invoice_id}"), &Vec::new()).await?;
        Ok(InvoiceLinks {
            invoice_id: invoice.id,
            hosted_invoice_url: invoice.hosted_invoice_url,
            invoice_pdf: invoice.invoice_pdf,
            status: invoice.status,
            amount_due: invoice.amount_due,
        })
    }

    async fn payment_method_type(
        &self,
        payment_method_id: &str,
    ) -> Result<Option<String>, ProviderError> {
        let method: PaymentMethod = self
            .get(&format!("payment_methods/{payment_method_id}"), &Vec::new())
            .await?;
        Ok(method.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> StripeClient {
        StripeClient::new(
            reqwest::Client::new(),
            StripeConfig {
                secret_key: "sk_test_123".into(),
                api_base: server.uri(),
                webhook_secret: None,
                currency: "usd".into(),
                frontend_url: "https://onboarding.example".into(),
            },
        )
    }

    fn intent_request() -> PaymentIntentRequest {
        PaymentIntentRequest {
            record_id: "4411".into(),
            customer_id: "cus_1".into(),
            amount: 150000,
        }
    }

    #[tokio::test]
    async fn test_create_invoice_payment_intent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/invoices"))
            .and(header("Authorization", "Bearer sk_test_123"))
            .and(body_string_contains("collection_method=send_invoice"))
            .and(body_string_contains("metadata%5BrecordId%5D=4411"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "in_1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/invoiceitems"))
            .and(body_string_contains("amount=150000"))
            .and(body_string_contains("invoice=in_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ii_1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/invoices/in_1/finalize"))
            .and(body_string_contains("confirmation_secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "in_1",
                "confirmation_secret": {"client_secret": "pi_1_secret_abc"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let intent = client(&server)
            .create_invoice_payment_intent(&intent_request())
            .await
            .unwrap();

        assert_eq!(intent.client_secret, "pi_1_secret_abc");
        assert_eq!(intent.invoice_id, "in_1");
    }

    #[tokio::test]
    async fn test_card_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/invoices"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"type": "invalid_request_error", "message": "No such customer: 'cus_1'"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_invoice_payment_intent(&intent_request())
            .await
            .unwrap_err();
        match err {
            ProviderError::Rejected { message, .. } => {
                assert_eq!(message, "No such customer: 'cus_1'")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retrieve_invoice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/invoices/in_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "in_1",
                "hosted_invoice_url": "https://invoice.stripe.com/i/in_1",
                "invoice_pdf": "https://pay.stripe.com/invoice/in_1/pdf",
                "status": "open",
                "amount_due": 150000
            })))
            .mount(&server)
            .await;

        let invoice = client(&server).retrieve_invoice("in_1").await.unwrap();
        assert_eq!(
            invoice.hosted_invoice_url.as_deref(),
            Some("https://invoice.stripe.com/i/in_1")
        );
        assert_eq!(invoice.amount_due, Some(150000));
    }

    #[tokio::test]
    async fn test_create_customer_reuses_existing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers"))
            .and(query_param("email", "jo@acme.test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "cus_existing"}]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "cus_new"})))
            .expect(0)
            .mount(&server)
            .await;

        let id = client(&server)
            .create_customer("jo@acme.test", Some("Jo"))
            .await
            .unwrap();
        assert_eq!(id, "cus_existing");
    }

    #[tokio::test]
    async fn test_checkout_session_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(body_string_contains("mode=payment"))
            .and(body_string_contains("success_url=https%3A%2F%2Fonboarding.example%2F4411"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_1",
                "url": "https://checkout.stripe.com/c/pay/cs_1"
            })))
            .mount(&server)
            .await;

        let url = client(&server)
            .create_checkout_session(&CheckoutRequest {
                record_id: "4411".into(),
                customer_id: "cus_1".into(),
                amount: 1000,
            })
            .await
            .unwrap();
        assert_eq!(url, "https://checkout.stripe.com/c/pay/cs_1");
    }

    #[tokio::test]
    async fn test_payment_method_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_methods/pm_1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "pm_1", "type": "us_bank_account"})),
            )
            .mount(&server)
            .await;

        let kind = client(&server).payment_method_type("pm_1").await.unwrap();
        assert_eq!(kind.as_deref(), Some("us_bank_account"));
    }
}
