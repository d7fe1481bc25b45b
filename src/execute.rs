use std::future::Future;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::client::HttpClient;
use crate::config::{ConfigurationParts, RequestConfiguration};
use crate::error::Error;
use crate::request::RequestBuilder;
use crate::response::{HttpResponse, ResponseStream};
use crate::retry::RetryPolicy;
use crate::stage::Stage;
use crate::transport::{Completion, Transport};
use crate::util::{
    redact_uri_for_logs, replace_query, resolve_url, saturating_millis, to_http_uri,
};

/// What ended the attempt loop, with whatever the other kind of outcome last recorded.
enum Ending {
    Fault {
        fault: Error,
        last_response: Option<HttpResponse>,
    },
    Rejected {
        response: HttpResponse,
        last_fault: Option<Error>,
    },
}

/// How a request ended when no attempt was accepted.
///
/// Carries the last transport fault and the last response seen across all attempts, each
/// independently optional, plus which of the two ended the loop.
pub struct SendFailure {
    method: Method,
    uri: String,
    attempts: usize,
    ending: Ending,
}

impl std::fmt::Debug for SendFailure {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SendFailure")
            .field("method", &self.method)
            .field("uri", &redact_uri_for_logs(&self.uri))
            .field("attempts", &self.attempts)
            .field("ended_with_fault", &self.ended_with_fault())
            .field("fault", &self.fault())
            .field("status", &self.status())
            .finish()
    }
}

impl SendFailure {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// True when the final attempt failed without a response.
    pub fn ended_with_fault(&self) -> bool {
        matches!(self.ending, Ending::Fault { .. })
    }

    /// The most recent transport fault, if any attempt raised one.
    pub fn fault(&self) -> Option<&Error> {
        match &self.ending {
            Ending::Fault { fault, .. } => Some(fault),
            Ending::Rejected { last_fault, .. } => last_fault.as_ref(),
        }
    }

    /// The most recent response, if any attempt received one.
    pub fn response(&self) -> Option<&HttpResponse> {
        match &self.ending {
            Ending::Fault { last_response, .. } => last_response.as_ref(),
            Ending::Rejected { response, .. } => Some(response),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(HttpResponse::status)
    }

    pub fn into_response(self) -> Option<HttpResponse> {
        match self.ending {
            Ending::Fault { last_response, .. } => last_response,
            Ending::Rejected { response, .. } => Some(response),
        }
    }

    /// The error for whatever ended the loop: the final fault, or an unacceptable-status
    /// error built from the final response.
    pub fn into_error(self) -> Error {
        match self.ending {
            Ending::Fault { fault, .. } => fault,
            Ending::Rejected { response, .. } => Error::UnacceptableStatus {
                status: response.status().as_u16(),
                method: self.method,
                uri: self.uri,
            },
        }
    }
}

pub(crate) enum Outcome {
    Accepted(HttpResponse),
    Failed(SendFailure),
}

impl<S: Stage, T: Transport> RequestBuilder<'_, S, T> {
    /// Sends and returns the accepted response; anything else becomes an error.
    pub async fn send(self) -> Result<HttpResponse, Error> {
        self.send_with(|response| async move { Ok(response) }).await
    }

    /// Sends and maps the accepted response with `on_success`.
    pub async fn send_with<R, F, Fut>(self, on_success: F) -> Result<R, Error>
    where
        F: FnOnce(HttpResponse) -> Fut,
        Fut: Future<Output = Result<R, Error>>,
    {
        self.send_with_fallback(on_success, |failure| async move { Err(failure.into_error()) })
            .await
    }

    /// Sends, mapping the accepted response with `on_success` or the final failure with
    /// `on_error`. Each continuation runs at most once and never both.
    ///
    /// Errors raised while preparing the request are returned without calling either.
    pub async fn send_with_fallback<R, F, Fut, E, EFut>(
        self,
        on_success: F,
        on_error: E,
    ) -> Result<R, Error>
    where
        F: FnOnce(HttpResponse) -> Fut,
        Fut: Future<Output = Result<R, Error>>,
        E: FnOnce(SendFailure) -> EFut,
        EFut: Future<Output = Result<R, Error>>,
    {
        let (client, config) = self.into_parts();
        match execute(client, config).await? {
            Outcome::Accepted(response) => on_success(response).await,
            Outcome::Failed(failure) => on_error(failure).await,
        }
    }

    pub async fn send_json<R: DeserializeOwned>(self) -> Result<R, Error> {
        self.send_with(HttpResponse::json::<R>).await
    }

    pub async fn send_json_or_else<R, E, EFut>(self, on_error: E) -> Result<R, Error>
    where
        R: DeserializeOwned,
        E: FnOnce(SendFailure) -> EFut,
        EFut: Future<Output = Result<R, Error>>,
    {
        self.send_with_fallback(HttpResponse::json::<R>, on_error).await
    }

    pub async fn send_text(self) -> Result<String, Error> {
        self.send_with(HttpResponse::text).await
    }

    pub async fn send_text_or_else<E, EFut>(self, on_error: E) -> Result<String, Error>
    where
        E: FnOnce(SendFailure) -> EFut,
        EFut: Future<Output = Result<String, Error>>,
    {
        self.send_with_fallback(HttpResponse::text, on_error).await
    }

    pub async fn send_bytes(self) -> Result<Bytes, Error> {
        self.send_with(HttpResponse::bytes).await
    }

    pub async fn send_bytes_or_else<E, EFut>(self, on_error: E) -> Result<Bytes, Error>
    where
        E: FnOnce(SendFailure) -> EFut,
        EFut: Future<Output = Result<Bytes, Error>>,
    {
        self.send_with_fallback(HttpResponse::bytes, on_error).await
    }

    /// Returns once headers arrive; the body is read from the stream.
    pub async fn send_stream(self) -> Result<ResponseStream, Error> {
        self.completion(Completion::HeadersRead)
            .send_with(|response| async move { Ok(response.into_stream()) })
            .await
    }

    pub async fn send_stream_or_else<E, EFut>(self, on_error: E) -> Result<ResponseStream, Error>
    where
        E: FnOnce(SendFailure) -> EFut,
        EFut: Future<Output = Result<ResponseStream, Error>>,
    {
        self.completion(Completion::HeadersRead)
            .send_with_fallback(|response| async move { Ok(response.into_stream()) }, on_error)
            .await
    }
}

/// Applies hooks, headers and content to a fresh request for the resolved url.
fn prepare_request(
    transport: &impl Transport,
    parts: &mut ConfigurationParts,
) -> Result<Request<Bytes>, Error> {
    let mut url = resolve_url(transport.base_url(), &parts.url)?;
    if let Some(query) = &parts.query {
        replace_query(&mut url, query);
    }
    let uri = to_http_uri(&url)?;

    let mut request = Request::builder()
        .method(parts.method.clone())
        .uri(uri)
        .body(Bytes::new())
        .map_err(|source| Error::RequestBuild { source })?;

    for hook in parts.on_configuring.drain(..) {
        hook(&mut request);
    }

    for (name, value) in parts.headers.drain(..) {
        request.headers_mut().append(name, value);
    }
    if let Some(content) = parts.content.take() {
        let (body, content_type) = content.into_parts();
        *request.body_mut() = body;
        if let Some(content_type) = content_type {
            request.headers_mut().insert(CONTENT_TYPE, content_type);
        }
    }

    for hook in parts.on_configured.drain(..) {
        hook(&mut request);
    }
    Ok(request)
}

fn clone_request(request: &Request<Bytes>) -> Request<Bytes> {
    let mut cloned = Request::new(request.body().clone());
    *cloned.method_mut() = request.method().clone();
    *cloned.uri_mut() = request.uri().clone();
    *cloned.version_mut() = request.version();
    *cloned.headers_mut() = request.headers().clone();
    *cloned.extensions_mut() = request.extensions().clone();
    cloned
}

async fn send_attempt<T: Transport>(
    transport: &T,
    request: Request<Bytes>,
    completion: Completion,
    cancellation: Option<&CancellationToken>,
) -> Result<HttpResponse, Error> {
    let method = request.method().clone();
    let uri = request.uri().to_string();
    let Some(token) = cancellation else {
        return transport.send(request, completion).await;
    };
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled { method, uri }),
        result = transport.send(request, completion) => result,
    }
}

/// Sleeps between attempts; cancellation cuts the wait short and ends the request.
async fn wait_retry_delay(
    delay: Duration,
    cancellation: Option<&CancellationToken>,
    method: &Method,
    uri: &str,
) -> Result<(), Error> {
    let cancelled = || Error::Cancelled {
        method: method.clone(),
        uri: uri.to_owned(),
    };
    match cancellation {
        Some(token) if token.is_cancelled() => Err(cancelled()),
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(cancelled()),
            _ = tokio::time::sleep(delay) => Ok(()),
        },
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

pub(crate) async fn execute<T: Transport>(
    client: &HttpClient<T>,
    config: RequestConfiguration,
) -> Result<Outcome, Error> {
    let transport = client.transport();
    let metrics = client.metrics();
    let mut parts = config.into_parts();
    let prepared = prepare_request(transport, &mut parts)?;
    let ConfigurationParts {
        method,
        retry,
        mut accept,
        completion,
        cancellation,
        ..
    } = parts;
    accept.apply_default();

    let uri = prepared.uri().to_string();
    let redacted_uri = redact_uri_for_logs(&uri);
    let max_attempts = retry.max_attempts();

    metrics.record_request_started();
    let _in_flight = metrics.enter_in_flight();
    let started_at = Instant::now();

    let mut attempt = 1_usize;
    let mut last_fault = None;
    let mut last_response = None;
    let delay_ms = saturating_millis(retry.retry_delay());
    let ending = loop {
        metrics.record_attempt();
        let span = info_span!(
            "reqchain.request",
            client = %client.client_name(),
            method = %method,
            uri = %redacted_uri,
            attempt,
            max_attempts,
        );
        let result = async {
            debug!("sending request");
            let result = send_attempt(
                transport,
                clone_request(&prepared),
                completion,
                cancellation.as_ref(),
            )
            .await;
            match &result {
                Ok(response) => debug!(status = %response.status(), "received response"),
                Err(error) => debug!(error = %error, "attempt failed"),
            }
            result
        }
        .instrument(span)
        .await;

        match result {
            Ok(response) => {
                let status = response.status();
                let acceptable = accept.is_acceptable(status);
                metrics.record_status(status, acceptable);
                if acceptable {
                    metrics.record_request_completed(true, started_at.elapsed());
                    return Ok(Outcome::Accepted(response));
                }
                if !RetryPolicy::is_retry_worthy_status(status) || attempt >= max_attempts {
                    break Ending::Rejected {
                        response,
                        last_fault,
                    };
                }
                warn!(
                    method = %method,
                    uri = %redacted_uri,
                    attempt,
                    max_attempts,
                    status = %status,
                    delay_ms,
                    "retrying after retry-worthy status"
                );
                last_response = Some(response);
            }
            Err(error) => {
                metrics.record_fault(&error);
                if error.is_cancelled() || attempt >= max_attempts {
                    break Ending::Fault {
                        fault: error,
                        last_response,
                    };
                }
                warn!(
                    method = %method,
                    uri = %redacted_uri,
                    attempt,
                    max_attempts,
                    error = %error,
                    delay_ms,
                    "retrying after transport fault"
                );
                last_fault = Some(error);
            }
        }

        if let Err(cancelled) =
            wait_retry_delay(retry.retry_delay(), cancellation.as_ref(), &method, &uri).await
        {
            metrics.record_fault(&cancelled);
            break Ending::Fault {
                fault: cancelled,
                last_response,
            };
        }
        metrics.record_retry();
        attempt += 1;
    };

    metrics.record_request_completed(false, started_at.elapsed());
    Ok(Outcome::Failed(SendFailure {
        method,
        uri,
        attempts: attempt,
        ending,
    }))
}
