//! Ergonomic synchronous HTTP client.
//!
//! # Overview
//! Requests are described declaratively with `Options` (query, headers,
//! cookies, form/JSON/XML/multipart bodies, proxy, TLS, timeout) instead of
//! being assembled by hand. The transport itself is `ureq`.
//!
//! # Design
//! - `Client` holds only default `Options`; each call merges the defaults with
//!   per-call overrides, so calls share no state.
//! - Building a `Request` (`request::build`) is separate from executing it
//!   (`transport::execute`), so everything up to the round-trip is
//!   deterministic and testable without a server.
//! - `Response` buffers the body, except for `text/event-stream` responses,
//!   which are decoded by a worker thread into an `EventStream`.

pub mod client;
pub mod encode;
pub mod error;
pub mod http;
pub mod multipart;
pub mod options;
pub mod request;
pub mod response;
pub mod sse;
pub mod transport;

pub use client::Client;
pub use error::Error;
pub use http::{Method, Request};
pub use multipart::FormData;
pub use options::{
    ClientCertificate, Cookie, Cookies, Headers, Options, ParamValue, Params, Query, XmlPayload,
};
pub use response::{Body, Response};
pub use sse::{EventStream, SseEvent};
