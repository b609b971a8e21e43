//! Request and response views.
//!
//! The routing core observes HTTP traffic through these two narrow views
//! rather than through a transport's own types. A transport adapts its
//! request into a [`Request`] (see [`Request::from_http`]), hands it to the
//! router, and converts the returned [`Response`] back with
//! [`Response::into_http`]. Both views live exactly the span of one call.
mod request;
mod response;

pub use request::{CancelToken, Request, Scratch};
pub use response::Response;
