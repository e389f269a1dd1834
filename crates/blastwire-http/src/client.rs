//! Host-facing HTTP clients.
//!
//! [`HttpClient`] performs one `handle` call per request and classifies the
//! outcome into [`CallStats`]:
//!
//! | outcome                         | counter            | returned            |
//! |---------------------------------|--------------------|---------------------|
//! | transport/codec/timeout failure | `transport_errors` | `Err(HttpError)`    |
//! | handler `error-code`            | `rpc_errors`       | `Err(HttpError::Rpc)` |
//! | response, status accepted       | `valid`            | `Ok(HostResponse)`  |
//! | response, status rejected       | `invalid`          | `Ok(HostResponse)`  |

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use blastwire_core::config::HttpConfig;
use blastwire_core::stats::{CallStats, Outcome, StatsSnapshot};
use blastwire_core::{CallContext, Invoker, WireResult, call};

use crate::adapter::{HostResponse, RequestBody, RequestOptions, build_request, into_host_response};
use crate::error::{HttpError, HttpResult};
use crate::types::{ErrorCode, Method};
use crate::wire::{IncomingResponse, OutgoingRequest};

/// Decides whether a status counts as a valid response.
pub type ResponseCallback = Arc<dyn Fn(u16) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct HttpClient {
    invoker: Arc<dyn Invoker>,
    config: HttpConfig,
    accept: ResponseCallback,
    stats: Arc<CallStats>,
}

impl HttpClient {
    pub fn new(invoker: Arc<dyn Invoker>, config: HttpConfig) -> Self {
        let range = config.clone();
        Self {
            invoker,
            config,
            accept: Arc::new(move |status| range.accepts(status)),
            stats: Arc::new(CallStats::new()),
        }
    }

    /// Builder method: replace the acceptability check.
    pub fn with_response_callback(mut self, accept: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        self.accept = Arc::new(accept);
        self
    }

    /// Builder method: record into shared counters.
    pub fn with_stats(mut self, stats: Arc<CallStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn context(&self, options: &RequestOptions) -> CallContext {
        let timeout = options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.timeout());
        CallContext::with_timeout(timeout)
    }

    async fn invoke(
        &self,
        cx: &CallContext,
        request: OutgoingRequest,
    ) -> WireResult<Result<IncomingResponse, ErrorCode>> {
        let (instance, function) = (&self.config.instance, &self.config.function);
        debug!(%instance, %function, method = %request.method, "invoking http handler");
        call(cx, self.invoker.as_ref(), instance, function, request).await
    }

    /// Send a request and return the streaming response.
    ///
    /// The response body and trailers are read lazily by the caller; no
    /// statistics are recorded.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
        options: &RequestOptions,
    ) -> HttpResult<IncomingResponse> {
        let request = build_request(method, url, body, options)?;
        let cx = self.context(options);
        match self.invoke(&cx, request).await? {
            Ok(response) => Ok(response),
            Err(code) => Err(HttpError::Rpc(code)),
        }
    }

    /// Send a request and translate the response for the host.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
        options: &RequestOptions,
    ) -> HttpResult<HostResponse> {
        let started = Instant::now();
        let request = build_request(method, url, body, options)?;
        let cx = self.context(options);

        let answer = self.invoke(&cx, request).await;
        let response = match answer {
            Ok(Ok(response)) => response,
            Ok(Err(code)) => {
                debug!(?code, url, "handler returned an error code");
                // Stops any request body still being written.
                cx.cancel();
                self.stats.record(Outcome::RpcError, started.elapsed());
                return Err(HttpError::Rpc(code));
            }
            Err(e) => {
                debug!(error = %e, url, "http call failed");
                self.stats.record(Outcome::TransportError, started.elapsed());
                return Err(e.into());
            }
        };

        let consume = options.consume;
        let converted = cx
            .run(async move { Ok(into_host_response(response, consume).await) })
            .await
            .map_err(HttpError::from)
            .and_then(|host| host);
        let host = match converted {
            Ok(host) => host,
            Err(e) => {
                debug!(error = %e, url, "reading response failed");
                self.stats.record(Outcome::TransportError, started.elapsed());
                return Err(e);
            }
        };

        let outcome = if (self.accept)(host.status) {
            Outcome::Valid
        } else {
            warn!(status = host.status, url, "response status not accepted");
            Outcome::Invalid
        };
        self.stats.record(outcome, started.elapsed());
        Ok(host)
    }

    pub async fn get(&self, url: &str, options: &RequestOptions) -> HttpResult<HostResponse> {
        self.request(Method::Get, url, RequestBody::Empty, options).await
    }

    pub async fn head(&self, url: &str, options: &RequestOptions) -> HttpResult<HostResponse> {
        self.request(Method::Head, url, RequestBody::Empty, options).await
    }

    pub async fn options(&self, url: &str, options: &RequestOptions) -> HttpResult<HostResponse> {
        self.request(Method::Options, url, RequestBody::Empty, options).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: &RequestOptions,
    ) -> HttpResult<HostResponse> {
        self.request(Method::Post, url, body.into(), options).await
    }

    pub async fn put(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: &RequestOptions,
    ) -> HttpResult<HostResponse> {
        self.request(Method::Put, url, body.into(), options).await
    }

    pub async fn patch(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: &RequestOptions,
    ) -> HttpResult<HostResponse> {
        self.request(Method::Patch, url, body.into(), options).await
    }

    pub async fn del(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: &RequestOptions,
    ) -> HttpResult<HostResponse> {
        self.request(Method::Delete, url, body.into(), options).await
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

// ── Blocking ────────────────────────────────────────────────────────

/// [`HttpClient`] for synchronous hosts. Owns its runtime; must not be used
/// from inside another tokio runtime.
pub struct BlockingHttpClient {
    runtime: tokio::runtime::Runtime,
    inner: HttpClient,
}

impl BlockingHttpClient {
    pub fn new(invoker: Arc<dyn Invoker>, config: HttpConfig) -> HttpResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("blastwire-http")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            inner: HttpClient::new(invoker, config),
        })
    }

    /// Builder method: replace the acceptability check.
    pub fn with_response_callback(mut self, accept: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        self.inner = self.inner.with_response_callback(accept);
        self
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats()
    }

    pub fn request(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
        options: &RequestOptions,
    ) -> HttpResult<HostResponse> {
        self.runtime
            .block_on(self.inner.request(method, url, body, options))
    }

    pub fn get(&self, url: &str, options: &RequestOptions) -> HttpResult<HostResponse> {
        self.request(Method::Get, url, RequestBody::Empty, options)
    }

    pub fn head(&self, url: &str, options: &RequestOptions) -> HttpResult<HostResponse> {
        self.request(Method::Head, url, RequestBody::Empty, options)
    }

    pub fn options(&self, url: &str, options: &RequestOptions) -> HttpResult<HostResponse> {
        self.request(Method::Options, url, RequestBody::Empty, options)
    }

    pub fn post(&self, url: &str, body: impl Into<RequestBody>, options: &RequestOptions) -> HttpResult<HostResponse> {
        self.request(Method::Post, url, body.into(), options)
    }

    pub fn put(&self, url: &str, body: impl Into<RequestBody>, options: &RequestOptions) -> HttpResult<HostResponse> {
        self.request(Method::Put, url, body.into(), options)
    }

    pub fn patch(&self, url: &str, body: impl Into<RequestBody>, options: &RequestOptions) -> HttpResult<HostResponse> {
        self.request(Method::Patch, url, body.into(), options)
    }

    pub fn del(&self, url: &str, body: impl Into<RequestBody>, options: &RequestOptions) -> HttpResult<HostResponse> {
        self.request(Method::Delete, url, body.into(), options)
    }
}
