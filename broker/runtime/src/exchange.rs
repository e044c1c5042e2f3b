//! Renders credential exchange results as HTTP replies in the container credentials format.

use crate::core::{ExchangeError, Exchanged};
use chrono::{DateTime, SecondsFormat, Utc};
use hyper::http::StatusCode;
use serde_json::{json, Value};

const NO_CACHE: &str = "no-cache";

#[derive(Debug, PartialEq)]
pub(crate) struct Reply {
    pub status: StatusCode,
    pub cache_control: String,
    pub body: Value,
}

// === impl Reply ===

impl Reply {
    pub(crate) fn new(res: Result<Exchanged, ExchangeError>, now: DateTime<Utc>) -> Self {
        match res {
            Ok(Exchanged {
                credentials,
                max_age,
            }) => Self {
                status: StatusCode::OK,
                cache_control: max_age
                    .map(|secs| format!("max-age={secs}"))
                    .unwrap_or_else(|| NO_CACHE.to_string()),
                body: json!({
                    "AccessKeyId": credentials.access_key_id,
                    "SecretAccessKey": credentials.secret_access_key,
                    "Token": credentials.session_token,
                    "Expiration": credentials
                        .expiration
                        .to_rfc3339_opts(SecondsFormat::Secs, true),
                }),
            },
            Err(ExchangeError::NotAuthorized) => {
                Self::output(StatusCode::UNAUTHORIZED, json!({"output": "Not Authorized"}))
            }
            Err(ExchangeError::NotFound) => {
                Self::output(StatusCode::NOT_FOUND, json!({"output": "Not Found"}))
            }
            Err(ExchangeError::Store(_) | ExchangeError::AssumeRole(_)) => Self::output(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "output": "Server Error",
                    "timestamp": now.to_rfc3339_opts(SecondsFormat::Secs, true),
                }),
            ),
        }
    }

    /// Answers requests the broker does not serve.
    pub(crate) fn unsupported() -> Self {
        Self::output(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"output": "Invalid invocation"}),
        )
    }

    fn output(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            cache_control: NO_CACHE.to_string(),
            body,
        }
    }

    /// The metric label for this reply.
    pub(crate) fn label(&self) -> &'static str {
        match self.status {
            StatusCode::OK => "ok",
            StatusCode::UNAUTHORIZED => "not_authorized",
            StatusCode::NOT_FOUND => "not_found",
            _ => "server_error",
        }
    }
}
