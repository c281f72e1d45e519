//! Error types for the HTTP client façade.
//!
//! # Design
//! Construction errors (`InvalidMethod`, `InvalidUri`, `Malformed`, `Encode`,
//! `MultipartFile`, `Certificate`) are raised before any network I/O and are
//! fixed by correcting the inputs. `Transport` wraps whatever the underlying
//! client reported. `Decode` comes from the event-stream worker, where it
//! ends the stream, or from decoding a JSON body.

use std::path::PathBuf;

/// Errors returned by the client, the request builder and event streams.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The method is not one of GET, POST, PUT, PATCH, DELETE, OPTIONS.
    #[error("invalid request method: {0}")]
    InvalidMethod(String),

    /// The resolved URI could not be parsed or has no usable host.
    #[error("invalid request uri `{uri}`: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The request could not be assembled (bad header name or value).
    #[error("malformed request: {0}")]
    Malformed(String),

    /// A body payload could not be serialized.
    #[error("failed to encode request body: {0}")]
    Encode(String),

    /// A file-backed multipart part could not be read.
    #[error("failed to read multipart file {path:?}: {source}")]
    MultipartFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A client certificate or key could not be parsed.
    #[error("invalid client certificate: {0}")]
    Certificate(String),

    /// The underlying HTTP client failed (DNS, connect, TLS, timeout, ...).
    #[error("transport error: {0}")]
    Transport(#[from] ureq::Error),

    /// The event stream contained malformed framing or could not be read.
    #[error("failed to decode event stream: {0}")]
    Decode(String),

    /// The server answered a download with a non-success status.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors raised while building the request, before any I/O.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Error::InvalidMethod(_)
                | Error::InvalidUri { .. }
                | Error::Malformed(_)
                | Error::Encode(_)
                | Error::MultipartFile { .. }
                | Error::Certificate(_)
        )
    }

    /// True only for network-level failures flagged as a timeout, whether
    /// reported by the client or by a body read.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Transport(ureq::Error::Timeout(_)) => true,
            Error::Transport(ureq::Error::Io(e)) | Error::Io(e) => {
                e.kind() == std::io::ErrorKind::TimedOut
            }
            _ => false,
        }
    }
}
