//! HTTP plumbing shared by every TIR resource client.

use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::v1::config::ProviderConfig;

/// Maximum length of response body to log
const MAX_LOG_BODY_LENGTH: usize = 200;

const USER_AGENT: &str = concat!("tircloud/", env!("CARGO_PKG_VERSION"));

/// Truncates a response body and strips control characters before logging.
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = match body.char_indices().nth(MAX_LOG_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... [truncated, {} bytes total]", &body[..cut], body.len()),
        None => body.to_string(),
    };
    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Transport: {method} {path} failed: {source}")]
    Transport {
        method: Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("UnexpectedStatus: {method} {path} returned {status}, expected {expected}: {body}")]
    UnexpectedStatus {
        method: Method,
        path: String,
        status: StatusCode,
        expected: StatusCode,
        body: String,
    },
    #[error("NotFound: {method} {path}")]
    NotFound { method: Method, path: String },
    #[error("Encode: could not build request body for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Decode: unexpected response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            ApiError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The `{"data": ...}` envelope every TIR response is wrapped in.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// One API call: method, path under the base url, extra query parameters,
/// optional JSON body and the status code that counts as success.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub active_iam: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub expected: StatusCode,
}

impl Call {
    fn new(method: Method, path: impl Into<String>, active_iam: &str, expected: StatusCode) -> Self {
        Self {
            method,
            path: path.into(),
            active_iam: active_iam.to_string(),
            query: vec![],
            body: None,
            expected,
        }
    }
    pub fn get(path: impl Into<String>, active_iam: &str) -> Self {
        Self::new(Method::GET, path, active_iam, StatusCode::OK)
    }
    pub fn post(path: impl Into<String>, active_iam: &str) -> Self {
        Self::new(Method::POST, path, active_iam, StatusCode::CREATED)
    }
    pub fn put(path: impl Into<String>, active_iam: &str) -> Self {
        Self::new(Method::PUT, path, active_iam, StatusCode::OK)
    }
    pub fn delete(path: impl Into<String>, active_iam: &str) -> Self {
        Self::new(Method::DELETE, path, active_iam, StatusCode::OK)
    }
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
    pub fn expect(mut self, status: StatusCode) -> Self {
        self.expected = status;
        self
    }
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body).map_err(|source| ApiError::Encode {
            path: self.path.clone(),
            source,
        })?);
        Ok(self)
    }
}

/// Authenticated HTTP client bound to one API endpoint.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
    api_key: String,
    auth_token: String,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Transport {
    pub fn new(config: &ProviderConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: config.api_endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// Issues exactly one HTTP request and returns the parsed body.
    ///
    /// An empty body on success is returned as `Value::Null`.
    pub async fn request(&self, call: Call) -> Result<Value, ApiError> {
        let Call {
            method,
            path,
            active_iam,
            query,
            body,
            expected,
        } = call;
        tracing::debug!("{} {}", method, path);

        let mut request = self
            .client
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .query(&[("apikey", self.api_key.as_str())]);
        // Account level calls carry no IAM.
        if !active_iam.is_empty() {
            request = request.query(&[("active_iam", active_iam.as_str())]);
        }
        request = request
            .query(&query)
            .bearer_auth(&self.auth_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(body) = &body {
            request = request.json(body);
        }

        let transport_error = |source| ApiError::Transport {
            method: method.clone(),
            path: path.clone(),
            source,
        };
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if status == StatusCode::NOT_FOUND {
            tracing::warn!("{} {} returned 404", method, path);
            return Err(ApiError::NotFound { method, path });
        }
        if status != expected {
            tracing::error!(
                "API error: {} {} - {} - {}",
                method,
                path,
                status,
                sanitize_for_log(&text)
            );
            return Err(ApiError::UnexpectedStatus {
                method,
                path,
                status,
                expected,
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|source| ApiError::Decode { path, source })
    }

    /// Issues the call and decodes the `data` field of the response into `T`.
    pub async fn send<T: DeserializeOwned>(&self, call: Call) -> Result<T, ApiError> {
        let path = call.path.clone();
        let value = self.request(call).await?;
        serde_json::from_value::<Envelope<T>>(value)
            .map(|envelope| envelope.data)
            .map_err(|source| ApiError::Decode { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bodies_are_logged_verbatim() {
        assert_eq!(sanitize_for_log("{\"code\": 400}"), "{\"code\": 400}");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(500);
        let logged = sanitize_for_log(&body);
        assert!(logged.starts_with(&"x".repeat(200)));
        assert!(logged.contains("500 bytes total"));
    }

    #[test]
    fn control_characters_are_removed() {
        assert_eq!(sanitize_for_log("a\nb\tc"), "abc");
    }

    #[test]
    fn calls_carry_their_expected_status() {
        assert_eq!(Call::post("/x/", "1").expected, StatusCode::CREATED);
        assert_eq!(Call::get("/x/", "1").expected, StatusCode::OK);
        let call = Call::put("/x/", "1")
            .query("action", "stop")
            .expect(StatusCode::ACCEPTED);
        assert_eq!(call.query, vec![("action".to_string(), "stop".to_string())]);
        assert_eq!(call.expected, StatusCode::ACCEPTED);
    }
}
