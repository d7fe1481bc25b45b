//! `reqchain` builds HTTP requests through staged, chained calls and executes them with
//! fixed-delay retry and a configurable set of acceptable status codes.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use reqchain::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Item {
//!     id: u64,
//! }
//!
//! struct ItemQuery {
//!     page: u32,
//!     tags: Vec<String>,
//! }
//!
//! impl Fields for ItemQuery {
//!     fn fields(&self) -> Vec<Field<'_>> {
//!         vec![Field::scalar("page", self.page), Field::sequence("tag", &self.tags)]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::builder()
//!         .base_url("https://api.example.com/v1/")
//!         .client_name("my-sdk")
//!         .request_timeout(Duration::from_secs(3))
//!         .try_build()?;
//!
//!     let query = ItemQuery { page: 2, tags: vec!["new".to_owned()] };
//!     let items: Vec<Item> = client
//!         .get("items")
//!         .query(&query)?
//!         .include_header("x-request-source", "docs")?
//!         .retry(2, Duration::from_millis(250))
//!         .accept_status_codes(["2xx"])?
//!         .send_json()
//!         .await?;
//!
//!     println!("fetched {} items", items.len());
//!     Ok(())
//! }
//! ```
//!
//! # Behavior
//!
//! - Only `500` and `503` are retried when a status is rejected; other rejected statuses end
//!   the request after one attempt.
//! - Transport faults are retried until attempts run out. Cancellation is never retried.
//! - Without [`RequestBuilder::accept_status_codes`], any `2xx` is accepted.

#[cfg(all(not(feature = "tls-rustls-ring"), not(feature = "tls-rustls-aws-lc-rs")))]
compile_error!(
    "reqchain requires one TLS backend feature: enable `tls-rustls-ring` or `tls-rustls-aws-lc-rs`"
);

mod client;
mod config;
mod content;
mod error;
mod execute;
mod fields;
mod file;
mod metrics;
mod request;
mod response;
mod retry;
pub mod stage;
mod tls;
mod transport;
mod util;

pub use crate::client::{HttpClient, HttpClientBuilder};
pub use crate::config::{
    AcceptPolicy, AcceptToken, RequestConfiguration, RequestHook, StatusMatcher,
};
pub use crate::content::{APPLICATION_JSON, Content, FORM_URLENCODED};
pub use crate::error::{Error, ErrorCode, FileContentProblem, TransportErrorKind};
pub use crate::execute::SendFailure;
pub use crate::fields::{Field, FieldValue, Fields, Shape, flatten};
pub use crate::file::{DEFAULT_FILE_CONTENT_TYPE, FileContent, FileData};
pub use crate::metrics::HttpClientMetricsSnapshot;
pub use crate::request::RequestBuilder;
pub use crate::response::{HttpResponse, ResponseStream};
pub use crate::retry::{DEFAULT_RETRY_DELAY, RETRY_WORTHY_STATUSES, RetryPolicy};
pub use crate::tls::TlsBackend;
pub use crate::transport::{Completion, HyperTransport, Transport};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::stage::{ContentAttached, Finalizable, MethodChosen, QueryAttached};
    pub use crate::{
        AcceptToken, Completion, Content, Error, ErrorCode, Field, Fields, FileContent, FileData,
        HttpClient, HttpClientMetricsSnapshot, HttpResponse, RequestBuilder, ResponseStream,
        RetryPolicy, SendFailure, TlsBackend, Transport,
    };
}
