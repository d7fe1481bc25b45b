use std::time::Duration;

use http::Method;
use http::header::{HeaderName, HeaderValue};

use crate::error::Error;
use crate::metrics::{HttpClientMetrics, HttpClientMetricsSnapshot};
use crate::request::RequestBuilder;
use crate::retry::RetryPolicy;
use crate::stage::MethodChosen;
use crate::tls::{TlsBackend, default_tls_backend};
use crate::transport::{HyperTransport, HyperTransportOptions, Transport};
use crate::util::{parse_header_name, parse_header_value, validate_base_url};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;
const DEFAULT_CLIENT_NAME: &str = "reqchain";
const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;

pub struct HttpClientBuilder {
    base_url: Option<String>,
    client_name: String,
    default_headers: Vec<(HeaderName, HeaderValue)>,
    retry_policy: RetryPolicy,
    request_timeout: Duration,
    max_response_body_bytes: usize,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    http2_only: bool,
    tls_backend: TlsBackend,
}

impl HttpClientBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            default_headers: Vec::new(),
            retry_policy: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            http2_only: false,
            tls_backend: default_tls_backend(),
        }
    }

    /// Address relative request urls resolve against. Only used by the hyper transport.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    /// Added to every request before its own headers.
    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.push((name, value));
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> Result<Self, Error> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.default_header(name, value))
    }

    /// Retry policy every request starts from.
    pub fn retry(mut self, count: usize, delay: Duration) -> Self {
        self.retry_policy = RetryPolicy::new(count, delay);
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    pub fn http2_only(mut self, http2_only: bool) -> Self {
        self.http2_only = http2_only;
        self
    }

    pub fn tls_backend(mut self, tls_backend: TlsBackend) -> Self {
        self.tls_backend = tls_backend;
        self
    }

    pub fn try_build(self) -> Result<HttpClient, Error> {
        let base_url = self
            .base_url
            .as_deref()
            .map(validate_base_url)
            .transpose()?;
        let transport = HyperTransport::try_new(HyperTransportOptions {
            base_url,
            request_timeout: self.request_timeout,
            max_response_body_bytes: self.max_response_body_bytes,
            pool_idle_timeout: self.pool_idle_timeout,
            pool_max_idle_per_host: self.pool_max_idle_per_host,
            http2_only: self.http2_only,
            tls_backend: self.tls_backend,
        })?;
        Ok(self.build_with_transport(transport))
    }

    pub fn build(self) -> HttpClient {
        self.try_build().unwrap_or_else(|error| {
            panic!("failed to build reqchain http client: {error}; use try_build() to handle configuration errors")
        })
    }

    /// Builds over a caller-supplied transport, which owns its base url.
    pub fn build_with_transport<T: Transport>(self, transport: T) -> HttpClient<T> {
        HttpClient {
            transport,
            client_name: self.client_name,
            default_headers: self.default_headers,
            retry_policy: self.retry_policy,
            metrics: HttpClientMetrics::default(),
        }
    }
}

/// Entry point: creates one [`RequestBuilder`] per request.
#[derive(Clone)]
pub struct HttpClient<T = HyperTransport> {
    transport: T,
    client_name: String,
    default_headers: Vec<(HeaderName, HeaderValue)>,
    retry_policy: RetryPolicy,
    metrics: HttpClientMetrics,
}

impl<T> std::fmt::Debug for HttpClient<T> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpClient")
            .field("client_name", &self.client_name)
            .field("default_headers", &self.default_headers.len())
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }
}

impl<T: Transport> HttpClient<T> {
    pub fn with_transport(transport: T) -> Self {
        HttpClientBuilder::new().build_with_transport(transport)
    }

    pub fn request(
        &self,
        method: Method,
        url: impl Into<String>,
    ) -> RequestBuilder<'_, MethodChosen, T> {
        RequestBuilder::new(self, method, url)
    }

    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_, MethodChosen, T> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_, MethodChosen, T> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_, MethodChosen, T> {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_, MethodChosen, T> {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_, MethodChosen, T> {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_, MethodChosen, T> {
        self.request(Method::HEAD, url)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn metrics_snapshot(&self) -> HttpClientMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub(crate) fn default_headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.default_headers
    }

    pub(crate) fn default_retry(&self) -> RetryPolicy {
        self.retry_policy
    }

    pub(crate) fn metrics(&self) -> &HttpClientMetrics {
        &self.metrics
    }
}
