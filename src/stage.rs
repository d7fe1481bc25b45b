//! Type-level stages of [`RequestBuilder`](crate::RequestBuilder).
//!
//! Query parameters and content can each be attached once, in either order:
//!
//! ```text
//! MethodChosen --query-->   QueryAttached   --content--> Finalizable
//! MethodChosen --content--> ContentAttached --query-->   Finalizable
//! ```
//!
//! Headers, hooks, retry and accept policy are available in every stage.

mod sealed {
    pub trait Sealed {}
}

pub trait Stage: sealed::Sealed + Send + 'static {}

/// Method and url chosen; nothing attached yet.
#[derive(Debug)]
pub enum MethodChosen {}

#[derive(Debug)]
pub enum QueryAttached {}

#[derive(Debug)]
pub enum ContentAttached {}

/// Query and content are both settled.
#[derive(Debug)]
pub enum Finalizable {}

impl sealed::Sealed for MethodChosen {}
impl sealed::Sealed for QueryAttached {}
impl sealed::Sealed for ContentAttached {}
impl sealed::Sealed for Finalizable {}

impl Stage for MethodChosen {}
impl Stage for QueryAttached {}
impl Stage for ContentAttached {}
impl Stage for Finalizable {}

/// Stages that still take query parameters.
pub trait AcceptsQuery: Stage {
    type Next: Stage;
}

/// Stages that still take a body.
pub trait AcceptsContent: Stage {
    type Next: Stage;
}

impl AcceptsQuery for MethodChosen {
    type Next = QueryAttached;
}

impl AcceptsQuery for ContentAttached {
    type Next = Finalizable;
}

impl AcceptsContent for MethodChosen {
    type Next = ContentAttached;
}

impl AcceptsContent for QueryAttached {
    type Next = Finalizable;
}
