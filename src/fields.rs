//! Flattening of field-bearing objects into ordered string pairs.
//!
//! Types opt in by implementing [`Fields`], listing their fields in declaration order.
//! The same pairs back query strings, header objects and url-encoded forms.
//!
//! ```
//! use reqchain::{Field, Fields, flatten};
//!
//! struct Search {
//!     term: String,
//!     tags: Vec<String>,
//!     page: Option<u32>,
//! }
//!
//! impl Fields for Search {
//!     fn fields(&self) -> Vec<Field<'_>> {
//!         vec![
//!             Field::scalar("term", &self.term).rename("q"),
//!             Field::sequence("tags", &self.tags),
//!             Field::optional("page", self.page),
//!         ]
//!     }
//! }
//!
//! let search = Search {
//!     term: "rust".to_owned(),
//!     tags: vec!["http".to_owned(), "retry".to_owned()],
//!     page: None,
//! };
//! let pairs = flatten(&search).unwrap();
//! assert_eq!(pairs[0], ("q".to_owned(), "rust".to_owned()));
//! assert_eq!(pairs[1], ("tags[]".to_owned(), "http".to_owned()));
//! assert_eq!(pairs[3], ("page".to_owned(), String::new()));
//! ```

use crate::error::{Error, invalid_configuration};
use crate::file::FileContent;

/// What kind of value a flattening source is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    Record,
    Collection,
    Absent,
}

pub trait Fields {
    fn fields(&self) -> Vec<Field<'_>>;

    fn shape(&self) -> Shape {
        Shape::Record
    }
}

impl<T: Fields + ?Sized> Fields for &T {
    fn fields(&self) -> Vec<Field<'_>> {
        (**self).fields()
    }

    fn shape(&self) -> Shape {
        (**self).shape()
    }
}

impl<T: Fields + ?Sized> Fields for Box<T> {
    fn fields(&self) -> Vec<Field<'_>> {
        (**self).fields()
    }

    fn shape(&self) -> Shape {
        (**self).shape()
    }
}

impl<T: Fields> Fields for Option<T> {
    fn fields(&self) -> Vec<Field<'_>> {
        match self {
            Some(inner) => inner.fields(),
            None => Vec::new(),
        }
    }

    fn shape(&self) -> Shape {
        match self {
            Some(inner) => inner.shape(),
            None => Shape::Absent,
        }
    }
}

impl<T> Fields for [T] {
    fn fields(&self) -> Vec<Field<'_>> {
        Vec::new()
    }

    fn shape(&self) -> Shape {
        Shape::Collection
    }
}

impl<T> Fields for Vec<T> {
    fn fields(&self) -> Vec<Field<'_>> {
        Vec::new()
    }

    fn shape(&self) -> Shape {
        Shape::Collection
    }
}

pub enum FieldValue<'a> {
    Scalar(Option<String>),
    Sequence(Vec<Option<String>>),
    Mapping(Vec<(String, Option<String>)>),
    File(Option<&'a dyn FileContent>),
}

impl std::fmt::Debug for FieldValue<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(value) => formatter.debug_tuple("Scalar").field(value).finish(),
            Self::Sequence(items) => formatter.debug_tuple("Sequence").field(items).finish(),
            Self::Mapping(entries) => formatter.debug_tuple("Mapping").field(entries).finish(),
            Self::File(file) => formatter
                .debug_tuple("File")
                .field(&file.map(|file| file.file_name()))
                .finish(),
        }
    }
}

#[derive(Debug)]
pub struct Field<'a> {
    name: &'a str,
    rename: Option<&'a str>,
    ignored: bool,
    value: FieldValue<'a>,
}

impl<'a> Field<'a> {
    pub fn new(name: &'a str, value: FieldValue<'a>) -> Self {
        Self {
            name,
            rename: None,
            ignored: false,
            value,
        }
    }

    pub fn scalar(name: &'a str, value: impl ToString) -> Self {
        Self::new(name, FieldValue::Scalar(Some(value.to_string())))
    }

    pub fn optional<V: ToString>(name: &'a str, value: Option<V>) -> Self {
        Self::new(
            name,
            FieldValue::Scalar(value.map(|value| value.to_string())),
        )
    }

    pub fn sequence<I>(name: &'a str, items: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        Self::new(
            name,
            FieldValue::Sequence(
                items
                    .into_iter()
                    .map(|item| Some(item.to_string()))
                    .collect(),
            ),
        )
    }

    /// A sequence whose missing elements flatten to empty strings.
    pub fn sparse_sequence<I, V>(name: &'a str, items: I) -> Self
    where
        I: IntoIterator<Item = Option<V>>,
        V: ToString,
    {
        Self::new(
            name,
            FieldValue::Sequence(
                items
                    .into_iter()
                    .map(|item| item.map(|item| item.to_string()))
                    .collect(),
            ),
        )
    }

    pub fn mapping<I, K, V>(name: &'a str, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        Self::new(
            name,
            FieldValue::Mapping(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), Some(value.to_string())))
                    .collect(),
            ),
        )
    }

    pub fn file(name: &'a str, file: &'a dyn FileContent) -> Self {
        Self::new(name, FieldValue::File(Some(file)))
    }

    pub fn optional_file(name: &'a str, file: Option<&'a dyn FileContent>) -> Self {
        Self::new(name, FieldValue::File(file))
    }

    /// Overrides the name the field is emitted under.
    pub fn rename(mut self, name: &'a str) -> Self {
        self.rename = Some(name);
        self
    }

    pub fn ignore(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn name(&self) -> &'a str {
        self.rename.unwrap_or(self.name)
    }

    pub fn declared_name(&self) -> &'a str {
        self.name
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn is_file(&self) -> bool {
        matches!(self.value, FieldValue::File(_))
    }

    pub fn value(&self) -> &FieldValue<'a> {
        &self.value
    }

    pub(crate) fn into_value(self) -> FieldValue<'a> {
        self.value
    }
}

/// Returns the record's fields, rejecting absent values, collections and field-less types.
pub(crate) fn record_fields<T: Fields + ?Sized>(object: &T) -> Result<Vec<Field<'_>>, Error> {
    match object.shape() {
        Shape::Absent => return Err(invalid_configuration("object must not be absent")),
        Shape::Collection => {
            return Err(invalid_configuration(
                "collections are not valid here; pass a field-bearing record",
            ));
        }
        Shape::Record => {}
    }

    let fields = object.fields();
    if fields.is_empty() {
        return Err(invalid_configuration("object has no fields to flatten"));
    }
    Ok(fields)
}

pub fn flatten<T: Fields + ?Sized>(object: &T) -> Result<Vec<(String, String)>, Error> {
    let mut pairs = Vec::new();
    for field in record_fields(object)? {
        if field.is_ignored() {
            continue;
        }
        flatten_field(field, &mut pairs)?;
    }
    Ok(pairs)
}

pub(crate) fn flatten_field(
    field: Field<'_>,
    pairs: &mut Vec<(String, String)>,
) -> Result<(), Error> {
    let name = field.name();
    match field.into_value() {
        FieldValue::Scalar(value) => pairs.push((name.to_owned(), value.unwrap_or_default())),
        FieldValue::Sequence(items) => {
            let key = format!("{name}[]");
            pairs.extend(
                items
                    .into_iter()
                    .map(|item| (key.clone(), item.unwrap_or_default())),
            );
        }
        FieldValue::Mapping(entries) => pairs.extend(
            entries
                .into_iter()
                .map(|(entry, value)| (format!("{name}[{entry}]"), value.unwrap_or_default())),
        ),
        FieldValue::File(_) => {
            return Err(invalid_configuration(format!(
                "field {name} holds file content, which only a multipart form can carry"
            )));
        }
    }
    Ok(())
}
