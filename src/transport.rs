use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;
use url::Url;

use crate::error::Error;
use crate::response::HttpResponse;
use crate::tls::TlsBackend;
use crate::util::classify_transport_error;

/// When the transport hands back a response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Completion {
    /// After the whole body has been buffered.
    #[default]
    ContentRead,
    /// As soon as the status line and headers arrive; the body streams.
    HeadersRead,
}

/// The capability the execution engine sends prepared requests through.
pub trait Transport: Send + Sync {
    /// Base address relative request urls are resolved against.
    fn base_url(&self) -> Option<&Url>;

    fn send(
        &self,
        request: Request<Bytes>,
        completion: Completion,
    ) -> impl Future<Output = Result<HttpResponse, Error>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn base_url(&self) -> Option<&Url> {
        (**self).base_url()
    }

    fn send(
        &self,
        request: Request<Bytes>,
        completion: Completion,
    ) -> impl Future<Output = Result<HttpResponse, Error>> + Send {
        (**self).send(request, completion)
    }
}

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;
type TransportClient = Client<HttpsConnector, Full<Bytes>>;

#[derive(Clone, Debug)]
pub(crate) struct HyperTransportOptions {
    pub(crate) base_url: Option<Url>,
    pub(crate) request_timeout: Duration,
    pub(crate) max_response_body_bytes: usize,
    pub(crate) pool_idle_timeout: Duration,
    pub(crate) pool_max_idle_per_host: usize,
    pub(crate) http2_only: bool,
    pub(crate) tls_backend: TlsBackend,
}

/// hyper client over rustls with a per-attempt timeout and a bounded buffered body.
#[derive(Clone)]
pub struct HyperTransport {
    client: TransportClient,
    base_url: Option<Url>,
    request_timeout: Duration,
    max_response_body_bytes: usize,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HyperTransport")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("request_timeout", &self.request_timeout)
            .field("max_response_body_bytes", &self.max_response_body_bytes)
            .finish()
    }
}

impl HyperTransport {
    pub(crate) fn try_new(options: HyperTransportOptions) -> Result<Self, Error> {
        let client = match options.tls_backend {
            TlsBackend::RustlsRing => build_rustls_ring_transport(
                options.pool_idle_timeout,
                options.pool_max_idle_per_host,
                options.http2_only,
            )?,
            TlsBackend::RustlsAwsLcRs => build_rustls_aws_lc_rs_transport(
                options.pool_idle_timeout,
                options.pool_max_idle_per_host,
                options.http2_only,
            )?,
        };
        Ok(Self {
            client,
            base_url: options.base_url,
            request_timeout: options.request_timeout,
            max_response_body_bytes: options.max_response_body_bytes,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn max_response_body_bytes(&self) -> usize {
        self.max_response_body_bytes
    }

    async fn send_transport_request(
        &self,
        request: Request<Full<Bytes>>,
        method: &Method,
        uri: &str,
    ) -> Result<Response<Incoming>, Error> {
        match timeout(self.request_timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) => Err(Error::Transport {
                kind: classify_transport_error(&source),
                method: method.clone(),
                uri: uri.to_owned(),
                source: Box::new(source),
            }),
            Err(_) => Err(self.timeout_error(method, uri)),
        }
    }

    fn timeout_error(&self, method: &Method, uri: &str) -> Error {
        Error::Timeout {
            timeout_ms: self.request_timeout.as_millis(),
            method: method.clone(),
            uri: uri.to_owned(),
        }
    }

    async fn execute(
        &self,
        request: Request<Bytes>,
        completion: Completion,
    ) -> Result<HttpResponse, Error> {
        let method = request.method().clone();
        let uri = request.uri().to_string();
        let request = request.map(Full::new);

        let response = self.send_transport_request(request, &method, &uri).await?;
        let (parts, body) = response.into_parts();
        match completion {
            Completion::HeadersRead => {
                let stream = body.into_data_stream().map(|chunk| {
                    chunk.map_err(|source| Error::ReadBody {
                        source: Box::new(source),
                    })
                });
                Ok(HttpResponse::streaming(
                    parts.status,
                    parts.headers,
                    Box::pin(stream),
                ))
            }
            Completion::ContentRead => {
                let body = match timeout(
                    self.request_timeout,
                    read_all_body_limited(body, self.max_response_body_bytes),
                )
                .await
                {
                    Ok(Ok(body)) => body,
                    Ok(Err(ReadBodyError::Read(source))) => {
                        return Err(Error::ReadBody {
                            source: Box::new(source),
                        });
                    }
                    Ok(Err(ReadBodyError::TooLarge { actual_bytes })) => {
                        return Err(Error::ResponseBodyTooLarge {
                            limit_bytes: self.max_response_body_bytes,
                            actual_bytes,
                            method,
                            uri,
                        });
                    }
                    Err(_) => return Err(self.timeout_error(&method, &uri)),
                };
                Ok(HttpResponse::new(parts.status, parts.headers, body))
            }
        }
    }
}

impl Transport for HyperTransport {
    fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    fn send(
        &self,
        request: Request<Bytes>,
        completion: Completion,
    ) -> impl Future<Output = Result<HttpResponse, Error>> + Send {
        self.execute(request, completion)
    }
}

pub(crate) enum ReadBodyError {
    Read(hyper::Error),
    TooLarge { actual_bytes: usize },
}

pub(crate) async fn read_all_body_limited(
    mut body: Incoming,
    max_bytes: usize,
) -> Result<Bytes, ReadBodyError> {
    let mut collected = Vec::new();
    let mut total_len = 0_usize;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(ReadBodyError::Read)?;
        if let Some(data) = frame.data_ref() {
            total_len = total_len.saturating_add(data.len());
            if total_len > max_bytes {
                return Err(ReadBodyError::TooLarge {
                    actual_bytes: total_len,
                });
            }
            collected.extend_from_slice(data);
        }
    }

    Ok(Bytes::from(collected))
}

fn http_connector() -> HttpConnector {
    let mut connector = HttpConnector::new();
    connector.enforce_http(false);
    connector
}

#[cfg(feature = "tls-rustls-ring")]
fn build_rustls_ring_transport(
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    http2_only: bool,
) -> Result<TransportClient, Error> {
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
        .map_err(|source| Error::TlsBackendInit {
            backend: TlsBackend::RustlsRing.as_str(),
            message: source.to_string(),
        })?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http_connector());
    Ok(Client::builder(TokioExecutor::new())
        .pool_idle_timeout(pool_idle_timeout)
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .http2_only(http2_only)
        .build(https))
}

#[cfg(not(feature = "tls-rustls-ring"))]
fn build_rustls_ring_transport(
    _pool_idle_timeout: Duration,
    _pool_max_idle_per_host: usize,
    _http2_only: bool,
) -> Result<TransportClient, Error> {
    Err(Error::TlsBackendUnavailable {
        backend: TlsBackend::RustlsRing.as_str(),
    })
}

#[cfg(feature = "tls-rustls-aws-lc-rs")]
fn build_rustls_aws_lc_rs_transport(
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    http2_only: bool,
) -> Result<TransportClient, Error> {
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::aws_lc_rs::default_provider())
        .map_err(|source| Error::TlsBackendInit {
            backend: TlsBackend::RustlsAwsLcRs.as_str(),
            message: source.to_string(),
        })?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http_connector());
    Ok(Client::builder(TokioExecutor::new())
        .pool_idle_timeout(pool_idle_timeout)
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .http2_only(http2_only)
        .build(https))
}

#[cfg(not(feature = "tls-rustls-aws-lc-rs"))]
fn build_rustls_aws_lc_rs_transport(
    _pool_idle_timeout: Duration,
    _pool_max_idle_per_host: usize,
    _http2_only: bool,
) -> Result<TransportClient, Error> {
    Err(Error::TlsBackendUnavailable {
        backend: TlsBackend::RustlsAwsLcRs.as_str(),
    })
}
