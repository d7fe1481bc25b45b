//! Request bodies assembled from field-bearing objects.

use bytes::{BufMut, Bytes, BytesMut};
use http::HeaderValue;
use rand::RngExt;
use serde::Serialize;

use crate::error::Error;
use crate::fields::{FieldValue, Fields, flatten, flatten_field, record_fields};
use crate::file::{ValidatedFile, validate_file_content};
use crate::util::parse_header_value;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const APPLICATION_JSON: &str = "application/json; charset=utf-8";

const BOUNDARY_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const BOUNDARY_LEN: usize = 32;

/// An encoded body plus the `Content-Type` the request is sent with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Content {
    body: Bytes,
    content_type: Option<HeaderValue>,
}

impl Content {
    /// Routes to [`Content::multipart_form`] when any field of `object` holds file content.
    pub fn form<T: Fields + ?Sized>(object: &T) -> Result<Self, Error> {
        let has_file = record_fields(object)?.iter().any(|field| field.is_file());
        if has_file {
            Self::multipart_form(object)
        } else {
            Self::url_encoded_form(object)
        }
    }

    pub fn url_encoded_form<T: Fields + ?Sized>(object: &T) -> Result<Self, Error> {
        let pairs = flatten(object)?;
        Ok(Self::url_encoded_pairs(&pairs))
    }

    pub fn url_encoded_pairs(pairs: &[(String, String)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        Self {
            body: Bytes::from(encoded),
            content_type: Some(HeaderValue::from_static(FORM_URLENCODED)),
        }
    }

    pub fn multipart_form<T: Fields + ?Sized>(object: &T) -> Result<Self, Error> {
        Self::multipart_form_with_boundary(object, &random_boundary())
    }

    pub fn multipart_form_with_boundary<T: Fields + ?Sized>(
        object: &T,
        boundary: &str,
    ) -> Result<Self, Error> {
        let mut multipart = MultipartWriter::new(boundary);
        for field in record_fields(object)? {
            if field.is_ignored() {
                continue;
            }
            let name = field.name();
            if let FieldValue::File(file) = field.value() {
                let file = validate_file_content(name, *file)?;
                multipart.file_part(name, &file);
                continue;
            }

            let mut pairs = Vec::new();
            flatten_field(field, &mut pairs)?;
            for (key, value) in pairs {
                multipart.text_part(&key, &value);
            }
        }
        multipart.finish()
    }

    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(value).map_err(|source| Error::SerializeJson { source })?;
        Ok(Self {
            body: Bytes::from(body),
            content_type: Some(HeaderValue::from_static(APPLICATION_JSON)),
        })
    }

    /// A body sent without a `Content-Type` header.
    pub fn raw(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            content_type: None,
        }
    }

    pub fn raw_with_type(body: impl Into<Bytes>, content_type: &str) -> Result<Self, Error> {
        Ok(Self {
            body: body.into(),
            content_type: Some(parse_header_value("content-type", content_type)?),
        })
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: Bytes::from(body.into()),
            content_type: Some(HeaderValue::from_static("text/plain; charset=utf-8")),
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Bytes, Option<HeaderValue>) {
        (self.body, self.content_type)
    }
}

fn random_boundary() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..BOUNDARY_LEN)
        .map(|_| char::from(BOUNDARY_ALPHABET[rng.random_range(0..BOUNDARY_ALPHABET.len())]))
        .collect();
    format!("reqchain-{suffix}")
}

struct MultipartWriter<'b> {
    boundary: &'b str,
    buffer: BytesMut,
}

impl<'b> MultipartWriter<'b> {
    fn new(boundary: &'b str) -> Self {
        Self {
            boundary,
            buffer: BytesMut::new(),
        }
    }

    fn text_part(&mut self, name: &str, value: &str) {
        self.open_part(name, None);
        self.buffer.put_slice(b"\r\n");
        self.buffer.put_slice(value.as_bytes());
        self.buffer.put_slice(b"\r\n");
    }

    fn file_part(&mut self, name: &str, file: &ValidatedFile) {
        self.open_part(name, file.file_name.as_deref());
        self.buffer.put_slice(b"Content-Type: ");
        self.buffer.put_slice(file.content_type.as_bytes());
        self.buffer.put_slice(b"\r\n");
        for (header, value) in &file.additional_headers {
            self.buffer.put_slice(header.as_bytes());
            self.buffer.put_slice(b": ");
            self.buffer.put_slice(value.as_bytes());
            self.buffer.put_slice(b"\r\n");
        }
        self.buffer.put_slice(b"\r\n");
        self.buffer.put_slice(&file.content);
        self.buffer.put_slice(b"\r\n");
    }

    fn open_part(&mut self, name: &str, file_name: Option<&str>) {
        self.buffer.put_slice(b"--");
        self.buffer.put_slice(self.boundary.as_bytes());
        self.buffer.put_slice(b"\r\nContent-Disposition: form-data; name=\"");
        self.buffer.put_slice(escape_quoted(name).as_bytes());
        self.buffer.put_u8(b'"');
        if let Some(file_name) = file_name {
            self.buffer.put_slice(b"; filename=\"");
            self.buffer.put_slice(escape_quoted(file_name).as_bytes());
            self.buffer.put_u8(b'"');
        }
        self.buffer.put_slice(b"\r\n");
    }

    fn finish(mut self) -> Result<Content, Error> {
        self.buffer.put_slice(b"--");
        self.buffer.put_slice(self.boundary.as_bytes());
        self.buffer.put_slice(b"--\r\n");
        let content_type = parse_header_value(
            "content-type",
            &format!("multipart/form-data; boundary={}", self.boundary),
        )?;
        Ok(Content {
            body: self.buffer.freeze(),
            content_type: Some(content_type),
        })
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
