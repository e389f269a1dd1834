//! Host request/response translation.
//!
//! Outbound: `(method, url, body, options)` becomes an [`OutgoingRequest`]
//! whose body streams on demand. Inbound: an [`IncomingResponse`] becomes a
//! [`HostResponse`], buffering the body only when asked to.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::body::{Body, ByteStream};
use crate::error::{HttpError, HttpResult};
use crate::header::HeaderMap;
use crate::types::{Method, Scheme};
use crate::wire::{IncomingResponse, OutgoingRequest};

// ── Request bodies ──────────────────────────────────────────────────

/// A host-supplied request body.
#[derive(Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Text(String),
    Bytes(Bytes),
    /// A JSON object, serialized on send.
    Json(serde_json::Value),
    Stream(ByteStream),
}

impl RequestBody {
    fn into_stream(self) -> HttpResult<ByteStream> {
        let bytes = match self {
            Self::Empty => Bytes::new(),
            Self::Text(text) => Bytes::from(text),
            Self::Bytes(bytes) => bytes,
            Self::Json(serde_json::Value::Null) => Bytes::new(),
            Self::Json(value @ serde_json::Value::Object(_)) => serde_json::to_vec(&value)
                .map(Bytes::from)
                .map_err(|e| HttpError::UnsupportedBody(e.to_string()))?,
            Self::Json(other) => {
                return Err(HttpError::UnsupportedBody(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )));
            }
            Self::Stream(stream) => return Ok(stream),
        };
        Ok(Box::pin(futures::stream::iter([Ok::<_, std::io::Error>(bytes)])))
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Json(_) => f.write_str("Json"),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

// ── Options ─────────────────────────────────────────────────────────

/// Basic credentials; the header is only sent when both parts are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// `Basic base64(username:password)`, if both parts are set.
    pub fn header_value(&self) -> Option<String> {
        let (user, pass) = (self.username.as_ref()?, self.password.as_ref()?);
        Some(format!(
            "Basic {}",
            STANDARD.encode(format!("{user}:{pass}"))
        ))
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
    /// Overrides the client timeout when set.
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
    pub auth: Option<BasicAuth>,
    /// Buffer the response body before returning.
    pub consume: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Builder method: set the per-call timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Builder method: set basic credentials.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(BasicAuth::new(username, password));
        self
    }

    /// Builder method: buffer the response body.
    pub fn with_consume(mut self, consume: bool) -> Self {
        self.consume = consume;
        self
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// Target of a request, split out of an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: Scheme,
    pub authority: String,
    pub path_with_query: String,
}

impl Target {
    pub fn parse(url: &str) -> HttpResult<Self> {
        let uri: http::Uri = url.parse().map_err(|e| HttpError::invalid_url(url, e))?;
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| HttpError::invalid_url(url, "missing scheme"))?;
        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| HttpError::invalid_url(url, "missing host"))?;
        let authority = match uri.port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self {
            scheme: Scheme::from(scheme),
            authority,
            path_with_query: path_with_query(&uri),
        })
    }
}

/// `path`, or `/` when empty, followed by `?query` when a query is present.
pub fn path_with_query(uri: &http::Uri) -> String {
    let path = match uri.path() {
        "" => "/",
        path => path,
    };
    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

/// Header list sent with a request: credentials first, then the option headers.
pub fn request_headers(options: &RequestOptions) -> HttpResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(value) = options.auth.as_ref().and_then(BasicAuth::header_value) {
        headers.insert("Authorization", value);
    }
    for (name, value) in &options.headers {
        http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HttpError::InvalidHeader(name.clone()))?;
        headers.insert(name.clone(), value.clone());
    }
    Ok(headers)
}

/// Build the wire request for a host call.
pub fn build_request(
    method: Method,
    url: &str,
    body: RequestBody,
    options: &RequestOptions,
) -> HttpResult<OutgoingRequest> {
    let target = Target::parse(url)?;
    let headers = request_headers(options)?;
    let (body, trailers) = Body::from_stream(body.into_stream()?, HeaderMap::new());
    trace!(%method, authority = %target.authority, path = %target.path_with_query, "built request");
    Ok(OutgoingRequest {
        headers,
        method,
        scheme: target.scheme,
        path_with_query: Some(target.path_with_query),
        authority: Some(target.authority),
        body,
        trailers,
    })
}

// ── Inbound ─────────────────────────────────────────────────────────

/// The response as handed back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostResponse {
    pub status: u16,
    /// Values by lowercase header name.
    pub headers: BTreeMap<String, Vec<String>>,
    /// Empty unless the body was consumed.
    #[serde(with = "body_bytes")]
    pub body: Bytes,
}

impl HostResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> HttpResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::Body(e.to_string()))
    }
}

mod body_bytes {
    use bytes::Bytes;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(body: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(body)
    }
}

/// Convert a decoded response, draining its body when `consume` is set and
/// closing it either way.
pub async fn into_host_response(response: IncomingResponse, consume: bool) -> HttpResult<HostResponse> {
    let IncomingResponse {
        headers,
        status,
        body,
        trailers: _,
    } = response;
    let bytes = if consume {
        let collected = body.collect().await;
        body.close().await;
        collected?
    } else {
        body.close().await;
        Bytes::new()
    };
    Ok(HostResponse {
        status,
        headers: headers.to_multimap(),
        body: bytes,
    })
}
