use bytes::Bytes;
use http::HeaderValue;

use crate::error::{Error, FileContentProblem};
use crate::util::parse_header_name;

pub const DEFAULT_FILE_CONTENT_TYPE: &str = "multipart/form-data";

const RESERVED_PART_HEADERS: [&str; 2] = ["Content-Disposition", "Content-Type"];

/// Raw bytes plus the metadata needed to send them as one multipart file part.
///
/// `Content-Type` and `Content-Disposition` are produced by the assembler; returning
/// either from [`FileContent::additional_headers`] fails validation.
pub trait FileContent: Send + Sync {
    fn content(&self) -> Option<&[u8]>;

    fn content_type(&self) -> Option<&str>;

    fn file_name(&self) -> Option<&str> {
        None
    }

    fn additional_headers(&self) -> &[(String, String)] {
        &[]
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileData {
    content: Option<Bytes>,
    file_name: Option<String>,
    content_type: Option<String>,
    additional_headers: Vec<(String, String)>,
}

impl FileData {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::empty()
        }
    }

    /// A file part with no bytes attached yet.
    pub fn empty() -> Self {
        Self {
            content: None,
            file_name: None,
            content_type: Some(DEFAULT_FILE_CONTENT_TYPE.to_owned()),
            additional_headers: Vec::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<Bytes>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn without_content_type(mut self) -> Self {
        self.content_type = None;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.push((name.into(), value.into()));
        self
    }
}

impl Default for FileData {
    fn default() -> Self {
        Self::empty()
    }
}

impl FileContent for FileData {
    fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    fn additional_headers(&self) -> &[(String, String)] {
        &self.additional_headers
    }
}

/// A file part that passed validation, ready for encoding.
#[derive(Debug)]
pub(crate) struct ValidatedFile {
    pub(crate) content: Bytes,
    pub(crate) content_type: HeaderValue,
    pub(crate) file_name: Option<String>,
    pub(crate) additional_headers: Vec<(String, String)>,
}

pub(crate) fn validate_file_content(
    field: &str,
    file: Option<&dyn FileContent>,
) -> Result<ValidatedFile, Error> {
    let invalid = |problem| Error::FileContentInvalid {
        field: field.to_owned(),
        problem,
    };

    let file = file.ok_or_else(|| invalid(FileContentProblem::Missing))?;
    let content = file
        .content()
        .ok_or_else(|| invalid(FileContentProblem::MissingBytes))?;
    let content_type = file
        .content_type()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| invalid(FileContentProblem::MissingContentType))?;
    let content_type = HeaderValue::from_str(content_type)
        .map_err(|_| invalid(FileContentProblem::InvalidContentType(content_type.to_owned())))?;

    let mut additional_headers = Vec::with_capacity(file.additional_headers().len());
    for (name, value) in file.additional_headers() {
        if let Some(&reserved) = RESERVED_PART_HEADERS
            .iter()
            .find(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
        {
            return Err(invalid(FileContentProblem::ReservedHeader(reserved)));
        }
        let header_name = parse_header_name(name)?;
        crate::util::parse_header_value(header_name.as_str(), value)?;
        additional_headers.push((header_name.as_str().to_owned(), value.clone()));
    }

    let file_name = file
        .file_name()
        .filter(|name| !name.trim().is_empty())
        .map(ToOwned::to_owned);

    Ok(ValidatedFile {
        content: Bytes::copy_from_slice(content),
        content_type,
        file_name,
        additional_headers,
    })
}
