//! HTTP client for the QPay merchant API.
//!
//! Every call carries an explicit timeout so a stalled provider surfaces as
//! `AppError::ProviderTimeout` instead of hanging a request slot.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, Result};

use super::{
    sanitize_reference, CreateInvoiceRequest, CreatedInvoice, Deeplink, InvoiceOutcome,
    PaymentProvider, PaymentRow, TokenGrant,
};

#[derive(Debug, Clone)]
pub struct QpayClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    invoice_code: String,
    /// Public base URL of this service, embedded in callback URLs
    callback_base_url: String,
}

impl QpayClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.provider_base_url.trim_end_matches('/').to_string(),
            username: config.provider_username.clone(),
            password: config.provider_password.clone(),
            invoice_code: config.provider_invoice_code.clone(),
            callback_base_url: config.base_url.clone(),
        })
    }

    /// Callback URL the provider will POST to. The session ID and the
    /// per-session token let the provider call back without holding any
    /// internal service credentials.
    fn callback_url(&self, session_id: &str, callback_token: &str) -> String {
        format!(
            "{}/webhook?session_id={}&token={}",
            self.callback_base_url, session_id, callback_token
        )
    }
}

#[derive(Debug, Serialize)]
struct CreateInvoiceBody<'a> {
    invoice_code: &'a str,
    sender_invoice_no: String,
    invoice_receiver_code: &'a str,
    invoice_description: &'a str,
    amount: i64,
    callback_url: String,
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    invoice_id: String,
    qr_text: String,
    qr_image: String,
    #[serde(default)]
    qpay_shorturl: Option<String>,
    #[serde(default)]
    urls: Vec<UrlEntry>,
}

#[derive(Debug, Deserialize)]
struct UrlEntry {
    name: String,
    description: String,
    link: String,
}

#[derive(Debug, Serialize)]
struct PaymentCheckBody<'a> {
    object_type: &'static str,
    object_id: &'a str,
    offset: PaymentCheckOffset,
}

#[derive(Debug, Serialize)]
struct PaymentCheckOffset {
    page_number: u32,
    page_limit: u32,
}

#[derive(Debug, Deserialize)]
struct PaymentCheckResponse {
    #[serde(default)]
    rows: Vec<PaymentCheckRow>,
}

#[derive(Debug, Deserialize)]
struct PaymentCheckRow {
    payment_id: String,
    payment_status: String,
    /// The provider reports decimal amounts; we carry minor units internally.
    payment_amount: f64,
}

#[async_trait]
impl PaymentProvider for QpayClient {
    fn provider_name(&self) -> &'static str {
        "qpay"
    }

    async fn fetch_token(&self) -> Result<TokenGrant> {
        let response = self
            .client
            .post(format!("{}/auth/token", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Provider(format!(
                "Token endpoint returned {}",
                status
            )));
        }

        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse token response: {}", e)))?;
        Ok(grant)
    }

    async fn create_invoice(
        &self,
        token: &str,
        req: &CreateInvoiceRequest,
    ) -> Result<InvoiceOutcome> {
        let body = CreateInvoiceBody {
            invoice_code: &self.invoice_code,
            sender_invoice_no: sanitize_reference(&req.session_id),
            invoice_receiver_code: &req.user_id,
            invoice_description: &req.description,
            amount: req.amount,
            callback_url: self.callback_url(&req.session_id, &req.callback_token),
        };

        let response = self
            .client
            .post(format!("{}/invoice", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Provider rejection is a value, not an error: the caller keeps
            // the session alive with the failure recorded.
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(
                session_id = %req.session_id,
                status = status.as_u16(),
                "Invoice creation rejected by provider"
            );
            return Ok(InvoiceOutcome::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let invoice: InvoiceResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse invoice response: {}", e)))?;

        Ok(InvoiceOutcome::Created(CreatedInvoice {
            invoice_id: invoice.invoice_id,
            qr_text: invoice.qr_text,
            qr_image: invoice.qr_image,
            short_url: invoice.qpay_shorturl,
            deeplinks: invoice
                .urls
                .into_iter()
                .map(|u| Deeplink {
                    name: u.name,
                    description: u.description,
                    link: u.link,
                })
                .collect(),
        }))
    }

    async fn check_payment(&self, token: &str, invoice_id: &str) -> Result<Vec<PaymentRow>> {
        let body = PaymentCheckBody {
            object_type: "INVOICE",
            object_id: invoice_id,
            offset: PaymentCheckOffset {
                page_number: 1,
                page_limit: 100,
            },
        };

        let response = self
            .client
            .post(format!("{}/payment/check", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Provider(format!(
                "Payment check returned {}",
                status
            )));
        }

        let check: PaymentCheckResponse = response.json().await.map_err(|e| {
            AppError::Provider(format!("Failed to parse payment check response: {}", e))
        })?;

        Ok(check
            .rows
            .into_iter()
            .map(|r| PaymentRow {
                payment_id: r.payment_id,
                payment_status: r.payment_status,
                payment_amount: r.payment_amount.round() as i64,
            })
            .collect())
    }

    async fn register_receipt(&self, token: &str, payment_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/ebarimt/create", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({ "payment_id": payment_id }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Provider(format!(
                "Receipt registration returned {}",
                status
            )));
        }
        Ok(())
    }
}
