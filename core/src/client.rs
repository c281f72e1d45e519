//! Client surface: one call per HTTP verb plus a generic `request`.
//!
//! # Design
//! `Client` holds only its default `Options` and carries no mutable state
//! between calls. Every call merges the defaults with the per-call overrides,
//! fills in the default browser-like headers, builds a `Request`, executes it
//! on a fresh agent and wraps the result in a `Response`. `prepare` stops
//! after the build step so requests can be inspected without network I/O.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::http::{Method, Request};
use crate::options::{self, Options};
use crate::request;
use crate::response::Response;
use crate::transport;

/// File name used by `download` when the URL path has no last segment.
const DEFAULT_DOWNLOAD_NAME: &str = "index.html";

#[derive(Debug, Clone, Default)]
pub struct Client {
    defaults: Options,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose every call starts from `defaults`.
    pub fn with_options(defaults: Options) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &Options {
        &self.defaults
    }

    pub fn get(&self, uri: &str, opts: impl Into<Option<Options>>) -> Result<Response, Error> {
        self.call(Method::Get, uri, opts.into())
    }

    pub fn post(&self, uri: &str, opts: impl Into<Option<Options>>) -> Result<Response, Error> {
        self.call(Method::Post, uri, opts.into())
    }

    pub fn put(&self, uri: &str, opts: impl Into<Option<Options>>) -> Result<Response, Error> {
        self.call(Method::Put, uri, opts.into())
    }

    pub fn patch(&self, uri: &str, opts: impl Into<Option<Options>>) -> Result<Response, Error> {
        self.call(Method::Patch, uri, opts.into())
    }

    pub fn delete(&self, uri: &str, opts: impl Into<Option<Options>>) -> Result<Response, Error> {
        self.call(Method::Delete, uri, opts.into())
    }

    pub fn options(&self, uri: &str, opts: impl Into<Option<Options>>) -> Result<Response, Error> {
        self.call(Method::Options, uri, opts.into())
    }

    /// Issue `method` (case-insensitive) against `uri`. `overrides` are
    /// merged over the client defaults in order; later ones win.
    pub fn request(&self, method: &str, uri: &str, overrides: &[Options]) -> Result<Response, Error> {
        let opts = self.merged(overrides);
        let request = request::build(method, uri, &opts)?;
        let response = transport::execute(&request, &opts)?;
        Response::from_http(request, response, opts.debug)
    }

    /// Build the request `request` would send, without sending it.
    pub fn prepare(&self, method: &str, uri: &str, overrides: &[Options]) -> Result<Request, Error> {
        request::build(method, uri, &self.merged(overrides))
    }

    /// GET `uri` and write the body to `dir/<last path segment>`.
    ///
    /// Non-2xx responses are reported as `Error::HttpStatus` and nothing is
    /// written.
    pub fn download(
        &self,
        uri: &str,
        dir: impl AsRef<Path>,
        opts: impl Into<Option<Options>>,
    ) -> Result<PathBuf, Error> {
        let response = self.get(uri, opts)?;
        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(Error::HttpStatus(status));
        }

        let path = dir.as_ref().join(download_name(response.request()));
        fs::write(&path, response.body())?;
        tracing::debug!(path = %path.display(), bytes = response.body().len(), "download written");
        Ok(path)
    }

    fn call(&self, method: Method, uri: &str, opts: Option<Options>) -> Result<Response, Error> {
        match opts {
            Some(o) => self.request(method.as_str(), uri, std::slice::from_ref(&o)),
            None => self.request(method.as_str(), uri, &[]),
        }
    }

    fn merged(&self, overrides: &[Options]) -> Options {
        let mut opts = options::merge(&self.defaults, overrides);
        opts.headers = options::with_default_headers(&opts.headers);
        opts
    }
}

fn download_name(request: &Request) -> String {
    request
        .url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string())
}
