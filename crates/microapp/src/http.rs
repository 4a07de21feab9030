//! HTTP transport and response envelope decoding.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, RequestBuilder, header};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Platform API root.
pub const DEFAULT_BASE_URL: &str = "https://developer.toutiao.com/api";

/// Bound applied to every outbound request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub(crate) const DEFAULT_UA: &str = concat!("bytedance-microapp/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client used by the SDK.
pub fn default_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(DEFAULT_UA)
        .build()
        .map_err(Error::from)
}

/// Decoded platform response envelope.
///
/// Most endpoints answer `{"error": <code>, "message": <text>, ...}` where a
/// zero (or missing) code means success. Newer endpoints use
/// `err_no` / `err_tips` for the same purpose.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub error_code: i64,
    pub message: String,
    /// The full response document.
    pub payload: Value,
}

impl ApiResponse {
    pub fn from_value(payload: Value) -> Self {
        let error_code = payload
            .get("error")
            .filter(|code| !code.is_null())
            .or_else(|| payload.get("err_no"))
            .map_or(0, |code| code_of(code).unwrap_or(UNREADABLE_CODE));
        let message = payload
            .get("message")
            .or_else(|| payload.get("err_tips"))
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();

        Self {
            error_code,
            message,
            payload,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.error_code == 0
    }

    /// The payload, or [`Error::Upstream`] when the code is non-zero.
    pub fn into_result(self) -> Result<Value> {
        if self.is_success() {
            Ok(self.payload)
        } else {
            Err(Error::upstream(self.error_code, self.message))
        }
    }

    /// Check the code and deserialize the payload into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        let payload = self.into_result()?;
        Ok(serde_json::from_value(payload)?)
    }
}

/// Code reported for an error field that is present but not an integer.
pub const UNREADABLE_CODE: i64 = -1;

fn code_of(value: &Value) -> Option<i64> {
    match value {
        Value::Null => Some(0),
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) if s.trim().is_empty() => Some(0),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Body of a platform response.
#[derive(Debug, Clone)]
pub enum ApiBody {
    /// JSON envelope.
    Json(ApiResponse),
    /// Anything that is not JSON, e.g. a QR code image.
    Binary { content_type: String, data: Bytes },
}

impl ApiBody {
    /// Require a JSON envelope.
    pub fn into_json(self) -> Result<ApiResponse> {
        match self {
            Self::Json(response) => Ok(response),
            Self::Binary { content_type, .. } => Err(Error::Decode(format!(
                "expected a JSON response, got {content_type}"
            ))),
        }
    }
}

/// Thin request layer over the platform host.
///
/// Knows the base URL and how to decode responses; token handling lives in
/// [`MiniAppClient`](crate::MiniAppClient).
#[derive(Debug, Clone)]
pub struct ApiTransport {
    client: Client,
    base_url: String,
}

impl ApiTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}{prefix}{path}`, e.g. prefix `/apps`, path `/token`.
    pub fn url(&self, prefix: &str, path: &str) -> String {
        format!("{}{}{}", self.base_url, prefix, path)
    }

    /// GET with query parameters; the response must be JSON.
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<ApiResponse> {
        self.send(self.client.get(url).query(query)).await?.into_json()
    }

    /// POST a pre-serialized JSON body.
    ///
    /// The body is passed as a string so callers can sign the exact bytes
    /// that go on the wire.
    pub async fn post_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
        body: String,
    ) -> Result<ApiBody> {
        let mut builder = self
            .client
            .post(url)
            .query(query)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        self.send(builder.body(body)).await
    }

    async fn send(&self, builder: RequestBuilder) -> Result<ApiBody> {
        let response = builder.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let data = response.bytes().await?;

        debug!(%status, %content_type, len = data.len(), "Platform response");

        if let Ok(value) = serde_json::from_slice::<Value>(&data) {
            if value.is_object() {
                return Ok(ApiBody::Json(ApiResponse::from_value(value)));
            }
        }

        if content_type.contains("json") || !status.is_success() {
            return Err(Error::Decode(format!(
                "HTTP {status}: {}",
                String::from_utf8_lossy(&data[..data.len().min(256)])
            )));
        }

        Ok(ApiBody::Binary { content_type, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_success_without_code() {
        let response = ApiResponse::from_value(json!({"access_token": "abc", "expires_in": 7200}));
        assert!(response.is_success());
        assert_eq!(response.error_code, 0);
        assert_eq!(response.into_result().unwrap()["access_token"], "abc");
    }

    #[test]
    fn test_envelope_error_maps_to_upstream() {
        let response = ApiResponse::from_value(json!({"error": 40001, "message": "invalid appid"}));
        let err = response.into_result().unwrap_err();
        assert!(matches!(
            err,
            Error::Upstream { code: 40001, ref message } if message == "invalid appid"
        ));
    }

    #[test]
    fn test_envelope_reads_err_no_fields() {
        let response = ApiResponse::from_value(json!({"err_no": "28001", "err_tips": "bad token"}));
        assert_eq!(response.error_code, 28001);
        assert_eq!(response.message, "bad token");
    }

    #[test]
    fn test_envelope_float_code_is_an_error() {
        let response =
            ApiResponse::from_value(json!({"error": 40001.0, "message": "invalid appid"}));
        assert!(!response.is_success());
        assert_eq!(response.error_code, 40001);
        assert_eq!(response.into_result().unwrap_err().upstream_code(), Some(40001));
    }

    #[test]
    fn test_envelope_unreadable_code_is_an_error() {
        for code in [json!("oops"), json!(0.5), json!({"code": 1}), json!([40001])] {
            let response = ApiResponse::from_value(json!({"error": code, "message": "bad"}));
            assert!(!response.is_success(), "{:?}", response.payload);
            assert_eq!(response.error_code, UNREADABLE_CODE);
        }

        for code in [json!(null), json!(0), json!(0.0), json!(""), json!(false)] {
            let response = ApiResponse::from_value(json!({"error": code}));
            assert!(response.is_success(), "{:?}", response.payload);
        }
    }

    #[test]
    fn test_url_joins_prefix_and_path() {
        let transport = ApiTransport::new(Client::new(), "https://example.com/api/");
        assert_eq!(transport.url("/apps", "/token"), "https://example.com/api/apps/token");
        assert_eq!(
            transport.url("", "/v2/tags/text/antidirt"),
            "https://example.com/api/v2/tags/text/antidirt"
        );
    }

    #[test]
    fn test_binary_body_is_not_json() {
        let body = ApiBody::Binary {
            content_type: "image/png".to_string(),
            data: Bytes::from_static(b"\x89PNG"),
        };
        assert!(matches!(body.into_json(), Err(Error::Decode(_))));
    }
}
