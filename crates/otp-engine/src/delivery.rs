//! Sending codes to phones.

use async_trait::async_trait;
use observability::mask_phone;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uberfix_config_and_utils::TwilioConfig;

/// Twilio REST API root.
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// A code addressed to a phone.
#[derive(Clone)]
pub struct OtpMessage {
    pub phone: String,
    pub code: String,
}

impl OtpMessage {
    pub fn new(phone: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            code: code.into(),
        }
    }

    /// SMS text, in Arabic like the rest of the app.
    pub fn body(&self) -> String {
        format!("رمز التحقق من UberFix: {}. صالح لمدة 10 دقائق.", self.code)
    }
}

impl std::fmt::Debug for OtpMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpMessage")
            .field("phone", &mask_phone(&self.phone))
            .field("code", &"[redacted]")
            .finish()
    }
}

/// What happened to the delivery of an issued code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent { provider_id: Option<String> },
    Failed { reason: String },
    TimedOut,
    /// No channel credentials; the code is only stored.
    NotConfigured,
}

impl DeliveryStatus {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(
        "Provider rejected message with status {status}{}",
        .code.map_or(String::new(), |c| format!(" (code {c})"))
    )]
    Rejected { status: u16, code: Option<i64> },
}

/// Outbound channel for codes. One attempt per call.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, message: &OtpMessage) -> Result<DeliveryStatus, DeliveryError>;
}

/// SMS through Twilio's Messages API.
pub struct TwilioSmsChannel {
    http_client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioSmsChannel {
    pub fn new(config: &TwilioConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), config)
    }

    pub fn with_http_client(http_client: reqwest::Client, config: &TwilioConfig) -> Self {
        Self {
            http_client,
            api_base: TWILIO_API_BASE.to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from: config.phone_number.clone(),
        }
    }

    /// Point at another API root, e.g. a test server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

#[async_trait]
impl DeliveryChannel for TwilioSmsChannel {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn deliver(&self, message: &OtpMessage) -> Result<DeliveryStatus, DeliveryError> {
        let body = message.body();
        let form = [
            ("To", message.phone.as_str()),
            ("From", self.from.as_str()),
            ("Body", body.as_str()),
        ];

        let response = self
            .http_client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        // Twilio answers JSON on success and failure alike.
        let reply: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let code = reply.get("code").and_then(Value::as_i64);
            tracing::error!(
                status = %status,
                twilio_code = ?code,
                phone = %mask_phone(&message.phone),
                "Twilio rejected OTP message"
            );
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                code,
            });
        }

        let provider_id = reply.get("sid").and_then(Value::as_str).map(str::to_string);
        tracing::info!(
            sid = ?provider_id,
            phone = %mask_phone(&message.phone),
            "OTP sent via Twilio"
        );
        Ok(DeliveryStatus::Sent { provider_id })
    }
}

/// Used when no provider is configured: the code stays in the store only.
#[derive(Debug, Default, Clone)]
pub struct LogOnlyChannel;

#[async_trait]
impl DeliveryChannel for LogOnlyChannel {
    fn name(&self) -> &str {
        "log-only"
    }

    async fn deliver(&self, message: &OtpMessage) -> Result<DeliveryStatus, DeliveryError> {
        tracing::warn!(
            phone = %mask_phone(&message.phone),
            "SMS provider not configured, OTP stored in database only"
        );
        Ok(DeliveryStatus::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn config() -> TwilioConfig {
        TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            phone_number: "+15005550006".to_string(),
        }
    }

    #[test]
    fn test_message_body_and_debug() {
        let message = OtpMessage::new("+201234567890", "482913");
        assert_eq!(message.body(), "رمز التحقق من UberFix: 482913. صالح لمدة 10 دقائق.");

        let debug = format!("{message:?}");
        assert!(!debug.contains("482913"));
        assert!(!debug.contains("4567890"));
    }

    #[tokio::test]
    async fn test_twilio_posts_form_with_basic_auth() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            // base64("AC123:secret")
            .match_header("authorization", "Basic QUMxMjM6c2VjcmV0")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("To".into(), "+201234567890".into()),
                Matcher::UrlEncoded("From".into(), "+15005550006".into()),
                Matcher::UrlEncoded(
                    "Body".into(),
                    "رمز التحقق من UberFix: 482913. صالح لمدة 10 دقائق.".into(),
                ),
            ]))
            .with_status(201)
            .with_body(r#"{"sid":"SM42","status":"queued"}"#)
            .create_async()
            .await;

        let channel = TwilioSmsChannel::new(&config()).with_api_base(server.url());
        let status = channel
            .deliver(&OtpMessage::new("+201234567890", "482913"))
            .await
            .unwrap();

        assert_eq!(
            status,
            DeliveryStatus::Sent {
                provider_id: Some("SM42".to_string())
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_twilio_rejection() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .with_status(400)
            .with_body(r#"{"code":21211,"message":"Invalid 'To' Phone Number"}"#)
            .create_async()
            .await;

        let channel = TwilioSmsChannel::new(&config()).with_api_base(server.url());
        let err = channel
            .deliver(&OtpMessage::new("+201234567890", "482913"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::Rejected {
                status: 400,
                code: Some(21211)
            }
        ));
        assert_eq!(
            err.to_string(),
            "Provider rejected message with status 400 (code 21211)"
        );
    }

    #[tokio::test]
    async fn test_log_only_channel() {
        let status = LogOnlyChannel
            .deliver(&OtpMessage::new("+201234567890", "482913"))
            .await
            .unwrap();
        assert_eq!(status, DeliveryStatus::NotConfigured);
    }
}
