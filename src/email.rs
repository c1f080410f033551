//! Best-effort email notifications.
//!
//! Payment and withdrawal flows never wait on email: notifications are
//! spawned after the ledger commits and failures are only logged.
//!
//! Two delivery modes:
//! 1. Send via Resend API (when `RESEND_API_KEY` is set)
//! 2. Disabled (log only)

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::util::format_brl;

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Asker: payment for the accepted answer went through
    PaymentSent,
    /// Respondent: answer accepted and balance credited
    PaymentReceived,
    /// User: withdrawal is on its way
    WithdrawalRequested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl Notification {
    pub fn payment_sent(to: &str, gross_cents: i64) -> Self {
        Self {
            kind: NotificationKind::PaymentSent,
            to: to.to_string(),
            subject: "Pagamento confirmado".to_string(),
            text: format!(
                "Seu pagamento de {} foi confirmado e a resposta foi aceita.",
                format_brl(gross_cents)
            ),
        }
    }

    pub fn payment_received(to: &str, net_cents: i64, fee_percent: f64) -> Self {
        Self {
            kind: NotificationKind::PaymentReceived,
            to: to.to_string(),
            subject: "Sua resposta foi aceita".to_string(),
            text: format!(
                "Sua resposta foi aceita! {} foram creditados no seu saldo (taxa de {}%).",
                format_brl(net_cents),
                fee_percent
            ),
        }
    }

    pub fn withdrawal_requested(to: &str, net_cents: i64) -> Self {
        Self {
            kind: NotificationKind::WithdrawalRequested,
            to: to.to_string(),
            subject: "Saque solicitado".to_string(),
            text: format!(
                "Seu saque de {} foi solicitado e será enviado para sua chave PIX.",
                format_brl(net_cents)
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Run a send in a detached task. Errors and panics are logged, never returned.
pub fn spawn_notification(notifier: Arc<dyn Notifier>, notification: Notification) {
    let kind = notification.kind;
    tokio::spawn(
        AssertUnwindSafe(async move {
            if let Err(e) = notifier.send(&notification).await {
                tracing::warn!(kind = ?notification.kind, "Notification not delivered: {}", e);
            }
        })
        .catch_unwind()
        .map(move |result| {
            if let Err(panic) = result {
                let panic_msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(kind = ?kind, "Notification task panicked: {}", panic_msg);
            }
        }),
    );
}

/// Used when no email provider is configured.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::debug!(kind = ?notification.kind, to = %notification.to, "Email disabled, not sent");
        Ok(())
    }
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: Option<String>,
}

pub struct ResendNotifier {
    http_client: Client,
    api_key: String,
    from: String,
}

impl ResendNotifier {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_key,
            from,
        }
    }

    /// Send a single request to Resend API.
    ///
    /// Returns Ok(()) on success, or Err((AppError, is_transient)) on failure.
    async fn send_resend_request(
        &self,
        request: &ResendEmailRequest<'_>,
    ) -> std::result::Result<(), (AppError, bool)> {
        let response = self
            .http_client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                // Network errors are transient
                (AppError::Internal(format!("Email service error: {}", e)), true)
            })?;

        let status = response.status();
        if status.is_success() {
            let _result: ResendEmailResponse = response.json().await.map_err(|_| {
                (AppError::Internal("Email service response error".into()), false)
            })?;
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        // Rate limits and 5xx are worth retrying
        let is_transient = status.as_u16() == 429 || status.is_server_error();
        Err((
            AppError::Internal(format!("Email service error: {} - {}", status, body)),
            is_transient,
        ))
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let request = ResendEmailRequest {
            from: &self.from,
            to: [&notification.to],
            subject: &notification.subject,
            text: &notification.text,
        };

        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay_secs > 0 {
                tracing::warn!(attempt, delay_secs, "Retrying email send after transient failure");
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self.send_resend_request(&request).await {
                Ok(()) => {
                    tracing::info!(kind = ?notification.kind, to = %notification.to, "Email sent via Resend");
                    return Ok(());
                }
                Err((error, true)) => last_error = Some(error),
                Err((error, false)) => return Err(error),
            }
        }

        tracing::error!(
            to = %notification.to,
            attempts = RETRY_DELAYS.len() + 1,
            "Email send failed after all retries"
        );
        Err(last_error.unwrap_or_else(|| {
            AppError::Internal("Email service error: all retries exhausted".into())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delays_configuration() {
        assert_eq!(RETRY_DELAYS, &[1, 4, 16], "Exponential backoff: 1s, 4s, 16s");
    }

    #[test]
    fn test_payment_received_text() {
        let n = Notification::payment_received("r@example.com", 8500, 15.0);
        assert_eq!(n.kind, NotificationKind::PaymentReceived);
        assert!(n.text.contains("R$ 85,00"));
        assert!(n.text.contains("15%"));
    }

    struct PanickingNotifier;

    #[async_trait]
    impl Notifier for PanickingNotifier {
        async fn send(&self, _notification: &Notification) -> Result<()> {
            panic!("mail provider exploded");
        }
    }

    #[tokio::test]
    async fn test_spawned_panic_is_contained() {
        spawn_notification(
            Arc::new(PanickingNotifier),
            Notification::payment_sent("a@example.com", 100),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
