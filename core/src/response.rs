//! Response facade over a finished (or streaming) HTTP exchange.
//!
//! # Design
//! A response is either buffered, with the whole body read and the
//! connection released before the caller sees it, or streaming, when the
//! server answers with `text/event-stream`. In the streaming case the live
//! body reader is handed to an `EventStream` worker and `body()` is empty.

use ureq::http::{HeaderMap, StatusCode};

use crate::error::Error;
use crate::http::Request;
use crate::sse::EventStream;
use crate::transport::DEBUG_TARGET;

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug)]
pub enum Body {
    Buffered(Vec<u8>),
    Stream(EventStream),
}

#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    request: Request,
}

impl Response {
    /// Consume a transport response. Non-streaming bodies are read in full.
    pub(crate) fn from_http(
        request: Request,
        response: ureq::http::Response<ureq::Body>,
        debug: bool,
    ) -> Result<Self, Error> {
        let (parts, body) = response.into_parts();
        let streaming = parts
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| media_type(ct) == EVENT_STREAM);

        if debug {
            tracing::debug!(
                target: DEBUG_TARGET,
                status = parts.status.as_u16(),
                headers = ?parts.headers,
                streaming,
                "received response"
            );
        }

        let body = if streaming {
            Body::Stream(EventStream::spawn(body.into_reader()))
        } else {
            Body::Buffered(body.into_with_config().limit(u64::MAX).read_to_vec()?)
        };

        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body,
            request,
        })
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// `"200 OK"` style status line.
    pub fn status_line(&self) -> String {
        match self.status.canonical_reason() {
            Some(reason) => format!("{} {reason}", self.status.as_u16()),
            None => self.status.as_u16().to_string(),
        }
    }

    /// Text after the first space of the status line; empty when unknown.
    ///
    /// The phrase is the canonical one for the status code. The transport
    /// does not expose the raw status line, so a custom phrase sent by the
    /// server is not reported and non-standard codes yield `""`.
    pub fn reason_phrase(&self) -> String {
        let line = self.status_line();
        match line.split_once(' ') {
            Some((_, reason)) => reason.to_string(),
            None => String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// All values of `name`, case-insensitive. Values that are not valid
    /// UTF-8 are skipped.
    pub fn header(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// First value of `name`, or `""`.
    pub fn header_line(&self, name: &str) -> &str {
        self.header(name).into_iter().next().unwrap_or("")
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header_line("content-length").trim().parse().ok()
    }

    /// Raw body bytes. Empty for streaming responses.
    pub fn body(&self) -> &[u8] {
        match &self.body {
            Body::Buffered(bytes) => bytes,
            Body::Stream(_) => &[],
        }
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Body decoded as text. GB-family charsets are transcoded to UTF-8;
    /// everything else is read as UTF-8, replacing invalid sequences.
    pub fn contents(&self) -> String {
        decode_text(self.body(), self.header_line("content-type"))
    }

    /// Deserialize the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(self.body()).map_err(|e| Error::Decode(e.to_string()))
    }

    pub fn stream(&self) -> Option<&EventStream> {
        match &self.body {
            Body::Stream(stream) => Some(stream),
            Body::Buffered(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<EventStream> {
        match self.body {
            Body::Stream(stream) => Some(stream),
            Body::Buffered(_) => None,
        }
    }

    /// True when the event stream ended on a read timeout.
    pub fn is_timeout(&self) -> bool {
        self.stream().is_some_and(EventStream::is_timeout)
    }

    /// The request that produced this response.
    pub fn request(&self) -> &Request {
        &self.request
    }
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
    })
}

fn decode_text(bytes: &[u8], content_type: &str) -> String {
    match charset(content_type) {
        Some(cs) if cs.starts_with("gb") => {
            let encoding =
                encoding_rs::Encoding::for_label(cs.as_bytes()).unwrap_or(encoding_rs::GB18030);
            let (text, _, _) = encoding.decode(bytes);
            text.into_owned()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}
