use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::util::truncate_body;

/// Response body chunks read on demand.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

enum ResponseBody {
    Buffered(Bytes),
    Streaming(ResponseStream),
}

pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = formatter.debug_struct("HttpResponse");
        debug
            .field("status", &self.status)
            .field("headers", &self.headers);
        match &self.body {
            ResponseBody::Buffered(body) => debug.field("body_len", &body.len()),
            ResponseBody::Streaming(_) => debug.field("body", &"<stream>"),
        };
        debug.finish()
    }
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Buffered(body.into()),
        }
    }

    pub fn streaming(status: StatusCode, headers: HeaderMap, body: ResponseStream) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Streaming(body),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The buffered body, or `None` while the body is still a stream.
    pub fn body(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffered(body) => Some(body),
            ResponseBody::Streaming(_) => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Streaming(_))
    }

    pub async fn bytes(self) -> Result<Bytes, Error> {
        match self.body {
            ResponseBody::Buffered(body) => Ok(body),
            ResponseBody::Streaming(mut stream) => {
                let mut collected = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    collected.extend_from_slice(&chunk?);
                }
                Ok(collected.freeze())
            }
        }
    }

    pub async fn text(self) -> Result<String, Error> {
        let body = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    pub async fn json<T>(self) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let body = self.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| Error::Deserialize {
            source,
            body: truncate_body(&body),
        })
    }

    pub fn into_stream(self) -> ResponseStream {
        match self.body {
            ResponseBody::Buffered(body) => {
                Box::pin(futures_util::stream::once(async move { Ok(body) }))
            }
            ResponseBody::Streaming(stream) => stream,
        }
    }
}
