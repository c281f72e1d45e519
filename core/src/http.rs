//! Transport-level request types.
//!
//! # Design
//! A `Request` is plain data: method, resolved URL, an ordered header
//! multimap and the encoded body. The builder produces it without touching the
//! network and the transport executor consumes it, so everything up to the
//! actual round-trip is deterministic and testable. The same value is kept on
//! the `Response` for introspection.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::Error;

/// HTTP method accepted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }

    /// GET and DELETE never carry a body; the rest run the body encoder.
    pub fn carries_body(&self) -> bool {
        !matches!(self, Method::Get | Method::Delete)
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request described as plain data.
///
/// Header names keep the caller's spelling; lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// All values for `name`, in insertion order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// First value for `name`, if any.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Replace every existing value of `name` with `value`.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.remove_header(name);
        self.headers.push((name.to_string(), value.into()));
    }

    /// Append another line for `name`, keeping existing ones.
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::new(Method::Get, Url::parse("http://localhost:8091/get").unwrap())
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
        assert_eq!("OPTIONS".parse::<Method>().unwrap(), Method::Options);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = "TRACE".parse::<Method>().unwrap_err();
        assert!(matches!(err, Error::InvalidMethod(m) if m == "TRACE"));
    }

    #[test]
    fn only_get_and_delete_skip_the_body() {
        assert!(!Method::Get.carries_body());
        assert!(!Method::Delete.carries_body());
        assert!(Method::Options.carries_body());
        assert!(Method::Patch.carries_body());
    }

    #[test]
    fn set_header_replaces_all_spellings() {
        let mut req = request();
        req.add_header("x-foo", "a");
        req.add_header("X-Foo", "b");
        req.set_header("X-FOO", "c");
        assert_eq!(req.header_values("x-foo"), vec!["c"]);
    }

    #[test]
    fn add_header_keeps_order() {
        let mut req = request();
        req.add_header("X-Foo", "Bar");
        req.add_header("X-Foo", "Baz");
        assert_eq!(req.header_values("x-foo"), vec!["Bar", "Baz"]);
        assert_eq!(req.header("X-FOO"), Some("Bar"));
    }
}
