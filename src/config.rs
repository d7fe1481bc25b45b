use std::collections::BTreeSet;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, Request, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::content::Content;
use crate::error::{Error, invalid_configuration};
use crate::retry::RetryPolicy;
use crate::transport::Completion;

/// Callback run against the outgoing request while it is being prepared.
pub type RequestHook = Box<dyn FnOnce(&mut Request<Bytes>) + Send>;

/// One entry of an accept policy: an exact status or a whole series such as `2xx`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusMatcher {
    Exact(u16),
    Series(u8),
}

impl StatusMatcher {
    pub fn matches(self, status: StatusCode) -> bool {
        match self {
            Self::Exact(code) => status.as_u16() == code,
            Self::Series(digit) => status.as_u16() / 100 == u16::from(digit),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum TokenRepr {
    Code(i64),
    Text(String),
}

/// Raw argument to [`accept_status_codes`](crate::RequestBuilder::accept_status_codes),
/// validated when the policy is replaced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptToken(TokenRepr);

impl AcceptToken {
    pub fn parse(&self) -> Result<StatusMatcher, Error> {
        match &self.0 {
            TokenRepr::Code(code) => match u16::try_from(*code) {
                Ok(code) if (100..=599).contains(&code) => Ok(StatusMatcher::Exact(code)),
                _ => Err(invalid_configuration(format!(
                    "status code {code} is outside 100..=599"
                ))),
            },
            TokenRepr::Text(text) => parse_text_token(text),
        }
    }
}

fn parse_text_token(text: &str) -> Result<StatusMatcher, Error> {
    let trimmed = text.trim();
    if let Ok(code) = trimmed.parse::<i64>() {
        return AcceptToken(TokenRepr::Code(code)).parse();
    }

    let bytes = trimmed.as_bytes();
    if let [digit @ b'1'..=b'5', first, second] = bytes
        && first.eq_ignore_ascii_case(&b'x')
        && second.eq_ignore_ascii_case(&b'x')
    {
        return Ok(StatusMatcher::Series(digit - b'0'));
    }

    Err(invalid_configuration(format!(
        "accepted status {text:?} must be a code in 100..=599 or a series like \"2xx\""
    )))
}

impl From<u16> for AcceptToken {
    fn from(code: u16) -> Self {
        Self(TokenRepr::Code(i64::from(code)))
    }
}

impl From<i32> for AcceptToken {
    fn from(code: i32) -> Self {
        Self(TokenRepr::Code(i64::from(code)))
    }
}

impl From<StatusCode> for AcceptToken {
    fn from(status: StatusCode) -> Self {
        Self::from(status.as_u16())
    }
}

impl From<&str> for AcceptToken {
    fn from(text: &str) -> Self {
        Self(TokenRepr::Text(text.to_owned()))
    }
}

impl From<String> for AcceptToken {
    fn from(text: String) -> Self {
        Self(TokenRepr::Text(text))
    }
}

/// Exact codes and series treated as success.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcceptPolicy {
    codes: BTreeSet<u16>,
    series: BTreeSet<u8>,
}

impl AcceptPolicy {
    pub fn from_tokens<I>(tokens: I) -> Result<Self, Error>
    where
        I: IntoIterator,
        I::Item: Into<AcceptToken>,
    {
        let mut policy = Self::default();
        for token in tokens {
            match token.into().parse()? {
                StatusMatcher::Exact(code) => {
                    policy.codes.insert(code);
                }
                StatusMatcher::Series(digit) => {
                    policy.series.insert(digit);
                }
            }
        }
        Ok(policy)
    }

    pub fn success() -> Self {
        Self {
            codes: BTreeSet::new(),
            series: BTreeSet::from([2]),
        }
    }

    pub fn codes(&self) -> &BTreeSet<u16> {
        &self.codes
    }

    pub fn series(&self) -> &BTreeSet<u8> {
        &self.series
    }

    pub fn is_unset(&self) -> bool {
        self.codes.is_empty() && self.series.is_empty()
    }

    /// Falls back to `2xx` when nothing was configured; kept for the rest of the request.
    pub(crate) fn apply_default(&mut self) {
        if self.is_unset() {
            self.series.insert(2);
        }
    }

    pub fn is_acceptable(&self, status: StatusCode) -> bool {
        let code = status.as_u16();
        self.codes.contains(&code) || self.series.iter().any(|digit| u16::from(*digit) == code / 100)
    }
}

/// Everything accumulated for one request by the builder chain.
pub struct RequestConfiguration {
    method: Method,
    url: String,
    content: Option<Content>,
    headers: Vec<(HeaderName, HeaderValue)>,
    query: Option<Vec<(String, String)>>,
    retry: RetryPolicy,
    accept: AcceptPolicy,
    on_configuring: Vec<RequestHook>,
    on_configured: Vec<RequestHook>,
    completion: Completion,
    cancellation: Option<CancellationToken>,
}

impl std::fmt::Debug for RequestConfiguration {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestConfiguration")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("content", &self.content)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("retry", &self.retry)
            .field("accept", &self.accept)
            .field("on_configuring", &self.on_configuring.len())
            .field("on_configured", &self.on_configured.len())
            .field("completion", &self.completion)
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl RequestConfiguration {
    pub(crate) fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            content: None,
            headers: Vec::new(),
            query: None,
            retry: RetryPolicy::default(),
            accept: AcceptPolicy::default(),
            on_configuring: Vec::new(),
            on_configured: Vec::new(),
            completion: Completion::default(),
            cancellation: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    pub fn query(&self) -> Option<&[(String, String)]> {
        self.query.as_deref()
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn accept(&self) -> &AcceptPolicy {
        &self.accept
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub fn configuring_hooks(&self) -> usize {
        self.on_configuring.len()
    }

    pub fn configured_hooks(&self) -> usize {
        self.on_configured.len()
    }

    pub(crate) fn set_content(&mut self, content: Content) {
        self.content = Some(content);
    }

    pub(crate) fn set_query(&mut self, pairs: Vec<(String, String)>) {
        self.query = Some(pairs);
    }

    pub(crate) fn push_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.push((name, value));
    }

    pub(crate) fn set_retry(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    pub(crate) fn set_accept(&mut self, accept: AcceptPolicy) {
        self.accept = accept;
    }

    pub(crate) fn push_configuring(&mut self, hook: RequestHook) {
        self.on_configuring.push(hook);
    }

    pub(crate) fn push_configured(&mut self, hook: RequestHook) {
        self.on_configured.push(hook);
    }

    pub(crate) fn set_completion(&mut self, completion: Completion) {
        self.completion = completion;
    }

    pub(crate) fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancellation = Some(token);
    }

    pub(crate) fn into_parts(self) -> ConfigurationParts {
        ConfigurationParts {
            method: self.method,
            url: self.url,
            content: self.content,
            headers: self.headers,
            query: self.query,
            retry: self.retry,
            accept: self.accept,
            on_configuring: self.on_configuring,
            on_configured: self.on_configured,
            completion: self.completion,
            cancellation: self.cancellation,
        }
    }
}

/// Owned view consumed by the execution engine.
pub(crate) struct ConfigurationParts {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) content: Option<Content>,
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) query: Option<Vec<(String, String)>>,
    pub(crate) retry: RetryPolicy,
    pub(crate) accept: AcceptPolicy,
    pub(crate) on_configuring: Vec<RequestHook>,
    pub(crate) on_configured: Vec<RequestHook>,
    pub(crate) completion: Completion,
    pub(crate) cancellation: Option<CancellationToken>,
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::{AcceptPolicy, AcceptToken, StatusMatcher};
    use crate::error::Error;

    #[test]
    fn tokens_parse_codes_and_series() {
        assert_eq!(AcceptToken::from(204_u16).parse().ok(), Some(StatusMatcher::Exact(204)));
        assert_eq!(AcceptToken::from("2xx").parse().ok(), Some(StatusMatcher::Series(2)));
        assert_eq!(AcceptToken::from("4XX").parse().ok(), Some(StatusMatcher::Series(4)));
        assert_eq!(AcceptToken::from("404").parse().ok(), Some(StatusMatcher::Exact(404)));
        assert_eq!(
            AcceptToken::from(StatusCode::CONFLICT).parse().ok(),
            Some(StatusMatcher::Exact(409))
        );
    }

    #[test]
    fn malformed_tokens_are_configuration_errors() {
        for token in [
            AcceptToken::from(99),
            AcceptToken::from(600),
            AcceptToken::from(-1),
            AcceptToken::from("6xx"),
            AcceptToken::from("0xx"),
            AcceptToken::from("2x"),
            AcceptToken::from("2xxx"),
            AcceptToken::from("two"),
            AcceptToken::from(""),
        ] {
            let error = token.parse().expect_err("token should be rejected");
            assert!(matches!(error, Error::InvalidConfiguration { .. }), "{token:?}");
        }
    }

    #[test]
    fn policy_matches_codes_or_series() {
        let policy = AcceptPolicy::from_tokens([AcceptToken::from(404), AcceptToken::from("2xx")])
            .expect("policy should parse");
        assert!(policy.is_acceptable(StatusCode::OK));
        assert!(policy.is_acceptable(StatusCode::NO_CONTENT));
        assert!(policy.is_acceptable(StatusCode::NOT_FOUND));
        assert!(!policy.is_acceptable(StatusCode::BAD_REQUEST));
        assert!(!policy.is_acceptable(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn default_is_applied_only_when_unset() {
        let mut unset = AcceptPolicy::default();
        assert!(!unset.is_acceptable(StatusCode::OK));
        unset.apply_default();
        assert_eq!(unset, AcceptPolicy::success());
        assert!(unset.is_acceptable(StatusCode::OK));
        assert!(!unset.is_acceptable(StatusCode::NOT_FOUND));

        let mut explicit = AcceptPolicy::from_tokens([404]).expect("policy should parse");
        explicit.apply_default();
        assert!(!explicit.is_acceptable(StatusCode::OK));
    }

    #[test]
    fn matcher_series_covers_whole_hundred() {
        assert!(StatusMatcher::Series(3).matches(StatusCode::NOT_MODIFIED));
        assert!(!StatusMatcher::Series(3).matches(StatusCode::OK));
        assert!(StatusMatcher::Exact(201).matches(StatusCode::CREATED));
    }
}
