use std::collections::BTreeMap;

use reqwest::Method;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use thiserror::Error;
use tracing::debug;
use tracing::warn;
use url::Url;

use crate::transport::Transport;
use crate::transport::TransportError;
use crate::transport::TransportRequest;

/// Result code used when no `error_code` could be read from a response, or
/// when the request never produced a response at all. Backend codes are
/// always non-negative.
pub const RESULT_CODE_ABSENT: i64 = -1;

pub const RESULT_CODE_FIELD: &str = "error_code";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("unsupported HTTP method `{0}`, expected GET or POST")]
    UnsupportedMethod(String),

    #[error("probe path is empty")]
    EmptyPath,

    #[error("invalid target URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("request failed: {0}")]
    Transport(#[from] TransportError),
}

/// Body sent with a POST probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Serialized as JSON.
    Structured(serde_json::Value),
    /// Sent verbatim, typically to exercise malformed-body handling.
    Raw(String),
}

impl Payload {
    fn to_body(&self) -> String {
        match self {
            Payload::Structured(value) => value.to_string(),
            Payload::Raw(text) => text.clone(),
        }
    }
}

/// Declarative description of a single HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSpec {
    pub path: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub payload: Option<Payload>,
    pub description: String,
}

pub fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())])
}

impl ProbeSpec {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            headers: default_headers(),
            payload: None,
            description: String::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(path, "GET")
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(path, "POST")
    }

    /// Replaces the whole header mapping, dropping the default content type.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.payload = Some(Payload::Structured(value));
        self
    }

    pub fn with_raw(mut self, text: impl Into<String>) -> Self {
        self.payload = Some(Payload::Raw(text.into()));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupportedMethod {
    Get,
    Post,
}

impl SupportedMethod {
    fn normalize(method: &str) -> Result<Self, ProbeError> {
        match method.trim().to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            _ => Err(ProbeError::UnsupportedMethod(method.to_string())),
        }
    }

    fn as_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub status: StatusCode,
    pub body: String,
    pub result_code: i64,
}

/// Result code of an execution, folding every failure into the sentinel.
pub fn result_code_of(outcome: &Result<ProbeResult, ProbeError>) -> i64 {
    match outcome {
        Ok(result) => result.result_code,
        Err(_) => RESULT_CODE_ABSENT,
    }
}

/// The verdict for one execution: its result code, sentinel included,
/// equals `expected`.
pub fn matches(outcome: &Result<ProbeResult, ProbeError>, expected: i64) -> bool {
    result_code_of(outcome) == expected
}

/// Reads the top-level `error_code` from a JSON body. Anything that is not a
/// JSON object carrying an integer there yields [`RESULT_CODE_ABSENT`].
pub fn extract_result_code(body: &str) -> i64 {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json.get(RESULT_CODE_FIELD).and_then(|v| v.as_i64()))
        .unwrap_or(RESULT_CODE_ABSENT)
}

/// Joins the server root and a relative probe path with exactly one `/`.
pub fn join_url(root: &Url, path: &str) -> Result<Url, ProbeError> {
    let root = root.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let url = format!("{root}/{path}");

    Url::parse(&url).map_err(|source| ProbeError::InvalidUrl { url, source })
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ProbeError> {
    let mut map = HeaderMap::new();

    for (name, value) in headers {
        let key = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ProbeError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| ProbeError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        map.insert(key, value);
    }

    Ok(map)
}

pub struct ApiProbe<T> {
    root: Url,
    transport: T,
}

impl<T: Transport> ApiProbe<T> {
    pub fn new(root: Url, transport: T) -> Self {
        Self { root, transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends the request described by `spec` once and extracts its result
    /// code. Every failure is returned, never panicked; an unsupported
    /// method or bad URL is reported before the transport is touched.
    pub async fn execute(&self, spec: &ProbeSpec) -> Result<ProbeResult, ProbeError> {
        let method = SupportedMethod::normalize(&spec.method)?;

        if spec.path.trim().is_empty() {
            return Err(ProbeError::EmptyPath);
        }

        let url = join_url(&self.root, &spec.path)?;
        let headers = header_map(&spec.headers)?;

        let body = match (method, &spec.payload) {
            (SupportedMethod::Post, Some(payload)) => Some(payload.to_body()),
            (SupportedMethod::Get, Some(_)) => {
                warn!(path = %spec.path, "payload ignored for GET probe");
                None
            }
            (_, None) => None,
        };

        debug!(method = ?method, %url, "sending probe");

        let response = self
            .transport
            .send(TransportRequest {
                method: method.as_method(),
                url,
                headers,
                body,
            })
            .await?;

        let result_code = extract_result_code(&response.body);
        debug!(status = %response.status, result_code, "probe answered");

        Ok(ProbeResult {
            status: response.status,
            body: response.body,
            result_code,
        })
    }

    /// Executes `spec` afresh and checks the extracted result code.
    pub async fn evaluate(&self, spec: &ProbeSpec, expected: i64) -> bool {
        matches(&self.execute(spec).await, expected)
    }
}
