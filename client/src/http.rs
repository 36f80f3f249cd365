//! HTTP implementation of [`RemoteApi`].
//!
//! Routes:
//!
//! ```text
//! POST  {base}/bookings          create_booking
//! POST  {base}/trips             create_trip           {"trip", "bookingIds"}
//! PATCH {base}/bookings/{id}     update_booking        updates
//! PATCH {base}/bookings/{id}     update_booking_status {"status"}
//! PATCH {base}/trips/{id}        update_trip_status    {"status"}
//! ```

use crate::api::{ApiResult, RemoteApi};
use crate::config::{Config, ConfigError};
use crate::error::Result;
use async_trait::async_trait;
use ferry_engine::{RemoteError, RequestOptions};
use reqwest::{header, Method, StatusCode, Url};
use serde_json::{json, Value};
use std::time::Duration;

/// Header carrying the operation id.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
/// Header set after a keep-local resolution.
pub const FORCE_OVERWRITE_HEADER: &str = "X-Force-Overwrite";

/// reqwest-backed API client.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let invalid = || ConfigError::Invalid {
            var: "FERRY_API_URL",
            value: base_url.to_string(),
        };
        let base_url = Url::parse(base_url).map_err(|_| invalid())?;
        if base_url.cannot_be_a_base() {
            return Err(invalid().into());
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.api_url,
            config.api_token.clone(),
            config.request_timeout,
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        body: Value,
        options: &RequestOptions,
    ) -> ApiResult {
        let url = self.endpoint(segments);
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(IDEMPOTENCY_KEY_HEADER, &options.idempotency_key)
            .json(&body);

        if options.force_overwrite {
            request = request.header(FORCE_OVERWRITE_HEADER, "true");
        }
        if let Some(version) = options.expected_version {
            request = request.header(header::IF_MATCH, version.to_string());
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        tracing::debug!(
            method = %method,
            url = %url,
            op_id = %options.idempotency_key,
            force_overwrite = options.force_overwrite,
            "Sending request"
        );

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;
        let body: Option<Value> = serde_json::from_slice(&bytes).ok();

        if status.is_success() {
            return Ok(body.unwrap_or(Value::Null));
        }

        Err(status_error(status, body, &bytes))
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn create_booking(&self, booking: &Value, options: &RequestOptions) -> ApiResult {
        self.send(Method::POST, &["bookings"], booking.clone(), options)
            .await
    }

    async fn create_trip(
        &self,
        trip: &Value,
        booking_ids: &[String],
        options: &RequestOptions,
    ) -> ApiResult {
        let body = json!({"trip": trip, "bookingIds": booking_ids});
        self.send(Method::POST, &["trips"], body, options).await
    }

    async fn update_booking(
        &self,
        booking_id: &str,
        updates: &Value,
        options: &RequestOptions,
    ) -> ApiResult {
        self.send(
            Method::PATCH,
            &["bookings", booking_id],
            updates.clone(),
            options,
        )
        .await
    }

    async fn update_booking_status(
        &self,
        booking_id: &str,
        status: &str,
        options: &RequestOptions,
    ) -> ApiResult {
        let body = json!({"status": status});
        self.send(Method::PATCH, &["bookings", booking_id], body, options)
            .await
    }

    async fn update_trip_status(
        &self,
        trip_id: &str,
        status: &str,
        options: &RequestOptions,
    ) -> ApiResult {
        let body = json!({"status": status});
        self.send(Method::PATCH, &["trips", trip_id], body, options)
            .await
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() || err.is_body() {
        RemoteError::Transport(err.to_string())
    } else {
        RemoteError::Other(err.to_string())
    }
}

fn status_error(status: StatusCode, body: Option<Value>, raw: &[u8]) -> RemoteError {
    let message = body
        .as_ref()
        .and_then(|b| b.get("message").or_else(|| b.get("error")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            let text = String::from_utf8_lossy(raw).trim().to_string();
            (!text.is_empty() && body.is_none()).then_some(text)
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    let server_data = body
        .as_ref()
        .and_then(|b| b.get("serverData"))
        .filter(|d| !d.is_null())
        .cloned();

    if status == StatusCode::CONFLICT {
        let server_version = body
            .as_ref()
            .and_then(|b| b.get("version"))
            .and_then(Value::as_u64)
            .or_else(|| {
                server_data
                    .as_ref()
                    .and_then(|d| d.get("version"))
                    .and_then(Value::as_u64)
            });

        return RemoteError::Conflict {
            message,
            server_version,
            server_data,
        };
    }

    RemoteError::Http {
        status: status.as_u16(),
        message,
        server_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpApi {
        HttpApi::new(base, None, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn endpoints_escape_ids() {
        let nested = api("https://api.test/v1");
        assert_eq!(
            nested.endpoint(&["bookings", "B 1/2"]).as_str(),
            "https://api.test/v1/bookings/B%201%2F2"
        );

        let root = api("https://api.test/");
        assert_eq!(root.endpoint(&["trips"]).as_str(), "https://api.test/trips");
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(HttpApi::new("not a url", None, Duration::from_secs(1)).is_err());
        assert!(HttpApi::new("mailto:ops@test", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn conflict_reads_version_from_body() {
        let body = json!({"message": "version mismatch", "version": 3});
        let err = status_error(StatusCode::CONFLICT, Some(body), b"");

        assert_eq!(
            err,
            RemoteError::Conflict {
                message: "version mismatch".into(),
                server_version: Some(3),
                server_data: None,
            }
        );
    }

    #[test]
    fn conflict_falls_back_to_server_data_version() {
        let body = json!({"error": "stale", "serverData": {"id": "B1", "version": 7}});
        let err = status_error(StatusCode::CONFLICT, Some(body), b"");

        assert_eq!(err.server_version(), Some(7));
        assert_eq!(err.server_data().unwrap()["id"], "B1");
    }

    #[test]
    fn plain_text_errors_keep_their_text() {
        let err = status_error(StatusCode::BAD_GATEWAY, None, b"upstream down");
        assert_eq!(
            err,
            RemoteError::Http {
                status: 502,
                message: "upstream down".into(),
                server_data: None,
            }
        );
    }

    #[test]
    fn empty_error_body_uses_reason() {
        let err = status_error(StatusCode::UNPROCESSABLE_ENTITY, None, b"");
        assert_eq!(err.to_string(), "HTTP 422: Unprocessable Entity");
    }
}
