//! JSON request and response shapes of the OTP endpoints.
//!
//! Handlers never fail: every outcome becomes a status code and a body.
//! User-facing messages are Arabic, matching the app.

use crate::delivery::DeliveryStatus;
use crate::error::{LimitScope, OtpError};
use crate::service::OtpService;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MSG_SENT: &str = "تم إرسال رمز التحقق";
const MSG_VERIFIED: &str = "تم التحقق بنجاح";
const MSG_INVALID_CODE: &str = "رمز التحقق غير صحيح أو منتهي الصلاحية";
const MSG_INVALID_PHONE: &str = "رقم الهاتف غير صحيح. يجب أن يكون رقم مصري صالح.";
const MSG_CLIENT_LIMIT: &str = "لقد تجاوزت الحد المسموح من الطلبات. يرجى المحاولة بعد ساعة.";
const MSG_PHONE_LIMIT: &str =
    "لقد تجاوزت الحد المسموح من طلبات OTP لهذا الرقم. يرجى المحاولة بعد 10 دقائق.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendOtpRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub otp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpResponse {
    pub success: bool,
    pub message: String,
    pub expires_in: u64,
    pub remaining: u32,
    pub delivery: DeliveryStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOtpResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
            retry_after: None,
        }
    }
}

/// HTTP-style status and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn json<T: Serialize>(status: u16, body: &T) -> Self {
        Self {
            status,
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn error_response(err: &OtpError) -> ApiResponse {
    match err {
        OtpError::MissingField("otp") => {
            ApiResponse::json(400, &ErrorResponse::new("Phone and OTP are required"))
        }
        OtpError::MissingField(_) => {
            ApiResponse::json(400, &ErrorResponse::new("Phone number is required"))
        }
        OtpError::InvalidPhone => ApiResponse::json(400, &ErrorResponse::new(MSG_INVALID_PHONE)),
        OtpError::RateLimited {
            scope: LimitScope::Verify,
            retry_after_secs,
        } => ApiResponse::json(
            429,
            &VerifyOtpResponse {
                success: false,
                message: None,
                error: Some(format!(
                    "محاولات كثيرة جداً. الرجاء الانتظار {} ثانية.",
                    retry_after_secs
                )),
            },
        ),
        OtpError::RateLimited {
            scope,
            retry_after_secs,
        } => {
            let (error, message) = match scope {
                LimitScope::Client => ("Too many requests", MSG_CLIENT_LIMIT),
                _ => ("Too many OTP requests", MSG_PHONE_LIMIT),
            };
            ApiResponse::json(
                429,
                &ErrorResponse {
                    error: error.to_string(),
                    message: Some(message.to_string()),
                    retry_after: Some(*retry_after_secs),
                },
            )
        }
        OtpError::Storage(_) | OtpError::Database(_) => {
            tracing::error!(error = %err, "OTP request failed");
            ApiResponse::json(500, &ErrorResponse::new("Internal server error"))
        }
    }
}

/// `send-otp`: 200 with the issuance outcome, 400 on bad input, 429 when
/// limited, 500 when the code could not be stored.
pub async fn send_otp(service: &OtpService, request: SendOtpRequest, client: &str) -> ApiResponse {
    let phone = request.phone.unwrap_or_default();
    match service.issue(&phone, request.action.as_deref(), client).await {
        Ok(outcome) => ApiResponse::json(
            200,
            &SendOtpResponse {
                success: true,
                message: MSG_SENT.to_string(),
                expires_in: outcome.expires_in_seconds,
                remaining: outcome.remaining,
                delivery: outcome.delivery,
            },
        ),
        Err(err) => error_response(&err),
    }
}

/// `verify-otp`: 200 on success, 400 for any code that does not redeem.
pub async fn verify_otp(service: &OtpService, request: VerifyOtpRequest) -> ApiResponse {
    let phone = request.phone.unwrap_or_default();
    let otp = request.otp.unwrap_or_default();
    match service.verify(&phone, &otp).await {
        Ok(outcome) if outcome.success => ApiResponse::json(
            200,
            &VerifyOtpResponse {
                success: true,
                message: Some(MSG_VERIFIED.to_string()),
                error: None,
            },
        ),
        Ok(_) => ApiResponse::json(
            400,
            &VerifyOtpResponse {
                success: false,
                message: None,
                error: Some(MSG_INVALID_CODE.to_string()),
            },
        ),
        Err(err) => error_response(&err),
    }
}
