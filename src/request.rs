use std::marker::PhantomData;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, Request};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::client::HttpClient;
use crate::config::{AcceptPolicy, AcceptToken, RequestConfiguration};
use crate::content::Content;
use crate::error::{Error, invalid_configuration};
use crate::fields::{Fields, flatten};
use crate::retry::RetryPolicy;
use crate::stage::{AcceptsContent, AcceptsQuery, MethodChosen, Stage};
use crate::transport::{Completion, Transport};
use crate::util::{parse_header_name, parse_header_value};

/// Fluent builder for one request; `S` tracks which parts are still attachable.
pub struct RequestBuilder<'a, S: Stage, T> {
    client: &'a HttpClient<T>,
    config: RequestConfiguration,
    stage: PhantomData<fn() -> S>,
}

impl<S: Stage, T> std::fmt::Debug for RequestBuilder<'_, S, T> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestBuilder")
            .field("stage", &std::any::type_name::<S>())
            .field("config", &self.config)
            .finish()
    }
}

impl<'a, T: Transport> RequestBuilder<'a, MethodChosen, T> {
    pub(crate) fn new(client: &'a HttpClient<T>, method: Method, url: impl Into<String>) -> Self {
        let mut config = RequestConfiguration::new(method, url);
        for (name, value) in client.default_headers() {
            config.push_header(name.clone(), value.clone());
        }
        config.set_retry(client.default_retry());
        Self {
            client,
            config,
            stage: PhantomData,
        }
    }
}

impl<'a, S: AcceptsQuery, T> RequestBuilder<'a, S, T> {
    /// Flattens `params` into the query string, replacing any query already in the url.
    pub fn query<Q: Fields + ?Sized>(
        self,
        params: &Q,
    ) -> Result<RequestBuilder<'a, S::Next, T>, Error> {
        let pairs = flatten(params)?;
        Ok(self.query_pairs(pairs))
    }

    pub fn query_pairs<K, V, I>(mut self, pairs: I) -> RequestBuilder<'a, S::Next, T>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.config.set_query(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        );
        self.advance()
    }
}

impl<'a, S: AcceptsContent, T> RequestBuilder<'a, S, T> {
    pub fn content(mut self, content: Content) -> RequestBuilder<'a, S::Next, T> {
        self.config.set_content(content);
        self.advance()
    }

    /// Multipart when any field carries file content, url-encoded otherwise.
    pub fn form<F: Fields + ?Sized>(
        self,
        form: &F,
    ) -> Result<RequestBuilder<'a, S::Next, T>, Error> {
        Ok(self.content(Content::form(form)?))
    }

    pub fn url_encoded_form<F: Fields + ?Sized>(
        self,
        form: &F,
    ) -> Result<RequestBuilder<'a, S::Next, T>, Error> {
        Ok(self.content(Content::url_encoded_form(form)?))
    }

    pub fn multipart_form<F: Fields + ?Sized>(
        self,
        form: &F,
    ) -> Result<RequestBuilder<'a, S::Next, T>, Error> {
        Ok(self.content(Content::multipart_form(form)?))
    }

    pub fn json<P: Serialize + ?Sized>(
        self,
        payload: &P,
    ) -> Result<RequestBuilder<'a, S::Next, T>, Error> {
        Ok(self.content(Content::json(payload)?))
    }

    pub fn body(self, body: impl Into<Bytes>) -> RequestBuilder<'a, S::Next, T> {
        self.content(Content::raw(body))
    }
}

impl<'a, S: Stage, T> RequestBuilder<'a, S, T> {
    fn advance<N: Stage>(self) -> RequestBuilder<'a, N, T> {
        RequestBuilder {
            client: self.client,
            config: self.config,
            stage: PhantomData,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.push_header(name, value);
        self
    }

    /// Appends a header; repeated names are kept as separate values.
    pub fn include_header(self, name: &str, value: &str) -> Result<Self, Error> {
        if name.trim().is_empty() {
            return Err(invalid_configuration("header name cannot be blank"));
        }
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    /// Like [`include_header`](Self::include_header), sending `None` as an empty value.
    pub fn include_optional_header(self, name: &str, value: Option<&str>) -> Result<Self, Error> {
        self.include_header(name, value.unwrap_or_default())
    }

    /// Flattens `headers` and appends every pair as a header.
    pub fn include_headers<H: Fields + ?Sized>(mut self, headers: &H) -> Result<Self, Error> {
        let pairs = flatten(headers)?;
        let mut parsed = Vec::with_capacity(pairs.len());
        for (name, value) in &pairs {
            if name.trim().is_empty() {
                return Err(invalid_configuration("header name cannot be blank"));
            }
            let name = parse_header_name(name)?;
            let value = parse_header_value(name.as_str(), value)?;
            parsed.push((name, value));
        }
        for (name, value) in parsed {
            self.config.push_header(name, value);
        }
        Ok(self)
    }

    /// Runs before configured headers and content are applied.
    pub fn on_configuring<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut Request<Bytes>) + Send + 'static,
    {
        self.config.push_configuring(Box::new(hook));
        self
    }

    /// Runs after headers and content, right before the first attempt.
    pub fn on_configured<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut Request<Bytes>) + Send + 'static,
    {
        self.config.push_configured(Box::new(hook));
        self
    }

    pub fn retry(mut self, count: usize, delay: Duration) -> Self {
        self.config.set_retry(RetryPolicy::new(count, delay));
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.set_retry(policy);
        self
    }

    /// Replaces both the accepted codes and the accepted series; nothing is merged.
    ///
    /// ```
    /// # use reqchain::prelude::*;
    /// # fn demo(client: &HttpClient) -> Result<(), Error> {
    /// let request = client
    ///     .get("items/7")
    ///     .accept_status_codes([AcceptToken::from("2xx"), AcceptToken::from(404)])?;
    /// # let _ = request;
    /// # Ok(())
    /// # }
    /// ```
    pub fn accept_status_codes<I>(mut self, tokens: I) -> Result<Self, Error>
    where
        I: IntoIterator,
        I::Item: Into<AcceptToken>,
    {
        let policy = AcceptPolicy::from_tokens(tokens)?;
        self.config.set_accept(policy);
        Ok(self)
    }

    pub fn completion(mut self, completion: Completion) -> Self {
        self.config.set_completion(completion);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.config.set_cancellation(token);
        self
    }

    pub fn configuration(&self) -> &RequestConfiguration {
        &self.config
    }

    pub(crate) fn into_parts(self) -> (&'a HttpClient<T>, RequestConfiguration) {
        (self.client, self.config)
    }
}
