// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain records shared by the store, the engines and the HTTP surface.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// CRM field names
// ============================================================================

/// Zoho Creator report column names.
pub mod fields {
    pub const ID: &str = "ID";
    pub const DEAL_ID: &str = "Deal_ID";
    pub const DEAL_NAME: &str = "Deal_Name";
    pub const CONTACT_ID: &str = "Contact_ID";
    pub const CONTACT_NAME: &str = "Contact_Name";
    pub const CONTACT_EMAIL: &str = "Contact_Email";
    pub const COMPANY_ID: &str = "Company_ID";
    pub const COMPANY_NAME: &str = "Company_Name";
    pub const PANDADOC_ID: &str = "PandaDoc_ID";
    pub const AGREEMENT_ID: &str = "Agreement_ID";
    pub const AGREEMENT_NAME: &str = "Agreement_Name";
    pub const AGREEMENT_REQUIRED: &str = "Agreement_Required";
    pub const STRIPE_REQUIRED: &str = "Stripe_Required";
    pub const INTAKE_MEETING_REQUIRED: &str = "Intake_Meeting_Required";
    pub const STRIPE_CUSTOMER_ID: &str = "Stripe_Customer_ID";
    pub const AMOUNT: &str = "Amount";
    pub const PAYMENT_LINK: &str = "Payment_Link";
    pub const CUSTOM_PANDADOC_URL: &str = "Custom_PandaDoc_URL";
    pub const PANDADOC_AGREEMENT_COMPLETED: &str = "PandaDoc_Agreement_Completed";
    pub const STRIPE_PAYMENT_COMPLETED: &str = "Stripe_Payment_Completed";
    pub const INTAKE_MEETING_COMPLETED: &str = "Intake_Meeting_Completed";

    pub const SENDER_PANDADOC_URL: &str = "Sender_PandaDoc_URL";
    pub const SIGNER_NAME: &str = "Signer_Name";
    pub const SIGNER_TITLE: &str = "Signer_Title";
    pub const STRIPE_PAYMENT_ID: &str = "Stripe_Payment_ID";
    pub const PAYMENT_SOURCE: &str = "Payment_Source";
    pub const PAYMENT_DATE: &str = "Payment_Date";
    pub const PAYMENT_STATUS: &str = "Payment_Status";
}

/// Value the CRM uses for a set tri-state or completion flag.
pub const YES: &str = "Yes";

/// A raw record as returned by the CRM report API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrmRecord(Map<String, Value>);

impl CrmRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The record's `ID` column.
    pub fn id(&self) -> Option<String> {
        self.text(fields::ID)
    }

    /// Read a column as text.
    ///
    /// Lookup and URL columns come back as objects; their `display_value`,
    /// `url` or `value` member is used. Empty strings read as absent.
    pub fn text(&self, name: &str) -> Option<String> {
        let value = match self.0.get(name)? {
            Value::Object(obj) => obj
                .get("display_value")
                .or_else(|| obj.get("url"))
                .or_else(|| obj.get("value"))?
                .clone(),
            other => other.clone(),
        };
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(if b { YES } else { "No" }.to_string()),
            _ => None,
        }
    }

    /// Whether a tri-state flag column is `"Yes"`.
    pub fn is_yes(&self, name: &str) -> bool {
        self.text(name).as_deref() == Some(YES)
    }

    /// The `Amount` column as a whole number of cents.
    ///
    /// Accepts integers and integer strings with thousands separators.
    /// Fractional values are rejected rather than rounded: the column never
    /// holds major currency units.
    pub fn amount(&self) -> Option<i64> {
        match self.0.get(fields::AMOUNT)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok())),
            Value::String(s) => s.trim().replace(',', "").parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Apply a partial update, replacing the named columns.
    pub fn merge(&mut self, update: &Map<String, Value>) {
        for (key, value) in update {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for CrmRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

// ============================================================================
// Client Record
// ============================================================================

/// Local cache of a CRM onboarding record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub zoho_record_id: String,
    pub deal_id: Option<String>,
    pub deal_name: Option<String>,
    pub contact_id: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    #[serde(rename = "pandaDocId")]
    pub pandadoc_id: Option<String>,
    pub agreement_id: Option<String>,
    pub agreement_name: Option<String>,
    pub agreement_required: Option<String>,
    pub stripe_required: Option<String>,
    pub intake_meeting_required: Option<String>,
    pub stripe_customer_id: Option<String>,
    /// Amount due in cents.
    pub amount: Option<i64>,
    pub payment_link: Option<String>,
    #[serde(rename = "customPandaDocUrl")]
    pub custom_pandadoc_url: Option<String>,
    #[serde(rename = "pandaDocAgreementCompleted")]
    pub pandadoc_agreement_completed: Option<String>,
    pub stripe_payment_completed: Option<String>,
    pub intake_meeting_completed: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClientRecord {
    /// Build a cache row from a CRM record. `record_id` is used when the
    /// record carries no `ID` column.
    pub fn from_crm(record_id: &str, crm: &CrmRecord) -> Self {
        let now = Utc::now();
        Self {
            zoho_record_id: crm.id().unwrap_or_else(|| record_id.to_string()),
            deal_id: crm.text(fields::DEAL_ID),
            deal_name: crm.text(fields::DEAL_NAME),
            contact_id: crm.text(fields::CONTACT_ID),
            contact_name: crm.text(fields::CONTACT_NAME),
            contact_email: crm.text(fields::CONTACT_EMAIL),
            company_id: crm.text(fields::COMPANY_ID),
            company_name: crm.text(fields::COMPANY_NAME),
            pandadoc_id: crm.text(fields::PANDADOC_ID),
            agreement_id: crm.text(fields::AGREEMENT_ID),
            agreement_name: crm.text(fields::AGREEMENT_NAME),
            agreement_required: crm.text(fields::AGREEMENT_REQUIRED),
            stripe_required: crm.text(fields::STRIPE_REQUIRED),
            intake_meeting_required: crm.text(fields::INTAKE_MEETING_REQUIRED),
            stripe_customer_id: crm.text(fields::STRIPE_CUSTOMER_ID),
            amount: crm.amount(),
            payment_link: crm.text(fields::PAYMENT_LINK),
            custom_pandadoc_url: crm.text(fields::CUSTOM_PANDADOC_URL),
            pandadoc_agreement_completed: crm.text(fields::PANDADOC_AGREEMENT_COMPLETED),
            stripe_payment_completed: crm.text(fields::STRIPE_PAYMENT_COMPLETED),
            intake_meeting_completed: crm.text(fields::INTAKE_MEETING_COMPLETED),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the CRM marks `kind` as required for this client.
    pub fn requires(&self, kind: StepKind) -> bool {
        let flag = match kind {
            StepKind::Agreement => &self.agreement_required,
            StepKind::Payment => &self.stripe_required,
            StepKind::Meeting => &self.intake_meeting_required,
        };
        flag.as_deref() == Some(YES)
    }

    /// Whether the CRM already records `kind` as completed.
    pub fn completed_in_crm(&self, kind: StepKind) -> bool {
        let flag = match kind {
            StepKind::Agreement => &self.pandadoc_agreement_completed,
            StepKind::Payment => &self.stripe_payment_completed,
            StepKind::Meeting => &self.intake_meeting_completed,
        };
        flag.as_deref() == Some(YES)
    }
}

// ============================================================================
// Steps
// ============================================================================

/// The three onboarding step types.
///
/// Resolved from a step definition's `name`, never from its numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Agreement,
    Payment,
    Meeting,
}

impl StepKind {
    pub const ALL: [StepKind; 3] = [StepKind::Agreement, StepKind::Payment, StepKind::Meeting];

    /// Step definition name in the catalogue.
    pub fn definition_name(self) -> &'static str {
        match self {
            StepKind::Agreement => "Agreement",
            StepKind::Payment => "Payment",
            StepKind::Meeting => "Intake Meeting",
        }
    }

    pub fn from_definition_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.definition_name() == name)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.definition_name())
    }
}

/// An entry of the static step catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub step_order: i32,
}

impl StepDefinition {
    pub fn kind(&self) -> Option<StepKind> {
        StepKind::from_definition_name(&self.name)
    }
}

/// A step required for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClientStep {
    pub id: i64,
    pub zoho_record_id: String,
    pub step_id: i64,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A client step joined with its definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub step_order: i32,
    pub is_completed: bool,
    #[sqlx(default)]
    pub is_required: bool,
}

/// Result of listing steps, with or without a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepListing {
    Catalogue(Vec<StepDefinition>),
    Client(Vec<StepView>),
}

// ============================================================================
// Payments
// ============================================================================

/// Payment status as reported by payment webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Processing,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Processing => "processing",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(PaymentStatus::Processing),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

/// The live payment attempt for a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub zoho_record_id: String,
    pub client_secret: String,
    pub customer_id: Option<String>,
    pub payment_id: Option<String>,
    pub payment_status: Option<String>,
    pub payment_source: Option<String>,
    pub amount: Option<i64>,
    pub invoice_id: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Parsed status; `None` before the first payment event.
    pub fn status(&self) -> Option<PaymentStatus> {
        self.payment_status.as_deref().and_then(|s| s.parse().ok())
    }
}

/// A freshly created payment intent to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub zoho_record_id: String,
    pub client_secret: String,
    pub customer_id: Option<String>,
    pub invoice_id: Option<String>,
    pub amount: Option<i64>,
}

/// Fields written by a payment webhook event. `None` keeps the stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdate {
    pub status: PaymentStatus,
    pub payment_id: Option<String>,
    pub payment_source: Option<String>,
    pub amount: Option<i64>,
    pub hosted_invoice_url: Option<String>,
    pub error_message: Option<String>,
}

/// Answer of a payment status poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub status: Option<String>,
    pub payment_source: Option<String>,
    pub error_message: Option<String>,
    pub amount: Option<i64>,
    pub payment_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PaymentRecord> for PaymentStatusView {
    fn from(record: &PaymentRecord) -> Self {
        Self {
            status: record.payment_status.clone(),
            payment_source: record.payment_source.clone(),
            error_message: record.error_message.clone(),
            amount: record.amount,
            payment_id: record.payment_id.clone(),
            updated_at: record.updated_at,
        }
    }
}

/// Hosted invoice links returned to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLinks {
    pub invoice_id: String,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
    pub status: Option<String>,
    pub amount_due: Option<i64>,
}

// ============================================================================
// Meetings
// ============================================================================

/// Latest scheduling payload received for a client.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MeetingBooking {
    pub zoho_record_id: String,
    pub payload: sqlx::types::Json<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Reconciliation output
// ============================================================================

/// A refreshed record together with the client's steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordWithSteps {
    pub record: ClientRecord,
    pub steps: Vec<StepView>,
    /// Embedded signing session, absent when not required or unavailable.
    pub signing_session_id: Option<String>,
}
