//! Declarative per-call request options and their merge rules.
//!
//! # Design
//! Every optional facet of a request lives on `Options`. Fields that accept
//! several shapes are modelled as enums (`Query`, `Cookies`, `ParamValue`,
//! `XmlPayload`) so the builder dispatches with an exhaustive `match`.
//!
//! Merging is shallow: a field that is set on an override (`Some`, non-empty,
//! or `true`) replaces the accumulated value wholesale. Maps such as `headers`
//! are never merged key by key; an override that wants to keep one header and
//! add another must carry both.
//!
//! All types derive serde so a client's default options can be loaded from a
//! JSON document.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::multipart::FormData;

/// Timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser-like headers filled in for keys the caller did not supply.
/// `Accept-Encoding` is left to the transport.
pub const DEFAULT_HEADERS: [(&str, &str); 5] = [
    (
        "User-Agent",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Connection", "keep-alive"),
    ("Cache-Control", "max-age=0"),
];

/// A parameter or header value: one string, or a list sent as repeated keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, from = "ParamRepr")]
pub enum ParamValue {
    Single(String),
    Multi(Vec<String>),
}

impl ParamValue {
    /// Values in send order.
    pub fn values(&self) -> &[String] {
        match self {
            ParamValue::Single(v) => std::slice::from_ref(v),
            ParamValue::Multi(vs) => vs,
        }
    }
}

/// Accepts strings, numbers and booleans (and lists of them) when
/// deserializing, stringifying the scalars.
#[derive(Deserialize)]
#[serde(untagged)]
enum ParamRepr {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Num(serde_json::Number),
    Bool(bool),
}

impl From<Scalar> for String {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Str(s) => s,
            Scalar::Num(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

impl From<ParamRepr> for ParamValue {
    fn from(repr: ParamRepr) -> Self {
        match repr {
            ParamRepr::Scalar(s) => ParamValue::Single(s.into()),
            ParamRepr::List(list) => ParamValue::Multi(list.into_iter().map(String::from).collect()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Single(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Single(v)
    }
}

impl From<&String> for ParamValue {
    fn from(v: &String) -> Self {
        ParamValue::Single(v.clone())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        ParamValue::Multi(v)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(v: Vec<&str>) -> Self {
        ParamValue::Multi(v.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ParamValue {
    fn from(v: [&str; N]) -> Self {
        ParamValue::Multi(v.iter().map(|s| s.to_string()).collect())
    }
}

macro_rules! param_value_from_display {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(v: $t) -> Self {
                    ParamValue::Single(v.to_string())
                }
            }
        )*
    };
}

param_value_from_display!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64, bool, char);

/// Key to value-or-list map, iterated in key order.
pub type Params = BTreeMap<String, ParamValue>;

/// Header name to value-or-list map.
pub type Headers = BTreeMap<String, ParamValue>;

/// Query string option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    /// Replaces the URL's raw query verbatim. The caller does the encoding.
    Raw(String),
    /// Scalar values overwrite existing keys; list elements are appended.
    Params(Params),
}

impl From<&str> for Query {
    fn from(v: &str) -> Self {
        Query::Raw(v.to_string())
    }
}

impl From<String> for Query {
    fn from(v: String) -> Self {
        Query::Raw(v)
    }
}

impl From<Params> for Query {
    fn from(v: Params) -> Self {
        Query::Params(v)
    }
}

/// A structured cookie. Only `name` and `value` go on the wire; the remaining
/// attributes are carried for callers that build cookies from a jar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }
}

/// Cookie option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cookies {
    /// Sent as one literal `Cookie` header line.
    Raw(String),
    Pairs(BTreeMap<String, String>),
    List(Vec<Cookie>),
}

impl From<&str> for Cookies {
    fn from(v: &str) -> Self {
        Cookies::Raw(v.to_string())
    }
}

impl From<BTreeMap<String, String>> for Cookies {
    fn from(v: BTreeMap<String, String>) -> Self {
        Cookies::Pairs(v)
    }
}

impl From<Vec<Cookie>> for Cookies {
    fn from(v: Vec<Cookie>) -> Self {
        Cookies::List(v)
    }
}

/// XML body option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XmlPayload {
    /// Converted element by element; see `encode::map_to_xml`.
    Map(serde_json::Map<String, serde_json::Value>),
    /// An already-serialized document, sent as is.
    Document(String),
}

impl XmlPayload {
    /// Serialize any `Serialize` value structurally; the type name becomes the
    /// root element.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, Error> {
        quick_xml::se::to_string(value)
            .map(XmlPayload::Document)
            .map_err(|e| Error::Encode(e.to_string()))
    }
}

/// PEM-encoded client identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCertificate {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl ClientCertificate {
    pub fn from_pem(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }

    pub fn from_files(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Result<Self, Error> {
        Ok(Self {
            cert_pem: std::fs::read(cert.into())?,
            key_pem: std::fs::read(key.into())?,
        })
    }
}

/// Declarative request configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Emit `tracing` dumps of the request and response.
    pub debug: bool,
    /// Prefix for URIs that do not start with an HTTP scheme.
    pub base_uri: Option<String>,
    /// Whole-call timeout in seconds.
    pub timeout: Option<f64>,
    /// Limit on establishing the connection, in seconds. Unset means only
    /// the whole-call timeout applies.
    pub connect_timeout: Option<f64>,
    /// Limit on waiting for the response head once the request is sent.
    pub response_timeout: Option<f64>,
    pub query: Option<Query>,
    pub headers: Headers,
    pub cookies: Option<Cookies>,
    pub form_params: Params,
    pub json: Option<serde_json::Value>,
    pub xml: Option<XmlPayload>,
    pub multipart: Vec<FormData>,
    pub proxy: Option<String>,
    pub certificates: Vec<ClientCertificate>,
    /// Accept any server certificate. Off unless explicitly enabled.
    pub insecure_skip_verify: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn connect_timeout(mut self, seconds: f64) -> Self {
        self.connect_timeout = Some(seconds);
        self
    }

    pub fn response_timeout(mut self, seconds: f64) -> Self {
        self.response_timeout = Some(seconds);
        self
    }

    pub fn query(mut self, query: impl Into<Query>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set one header, replacing any entry with the same name in any case.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        let name = name.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn cookies(mut self, cookies: impl Into<Cookies>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }

    pub fn form_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.form_params.insert(name.into(), value.into());
        self
    }

    pub fn form_params(mut self, params: Params) -> Self {
        self.form_params = params;
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.json = Some(value);
        self
    }

    /// Serialize `value` into the JSON payload.
    pub fn try_json<T: Serialize>(mut self, value: &T) -> Result<Self, Error> {
        let value = serde_json::to_value(value).map_err(|e| Error::Encode(e.to_string()))?;
        self.json = Some(value);
        Ok(self)
    }

    pub fn xml(mut self, payload: XmlPayload) -> Self {
        self.xml = Some(payload);
        self
    }

    pub fn multipart(mut self, parts: Vec<FormData>) -> Self {
        self.multipart = parts;
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn certificate(mut self, certificate: ClientCertificate) -> Self {
        self.certificates.push(certificate);
        self
    }

    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    /// Configured timeout as a duration, `DEFAULT_TIMEOUT` when unset or not
    /// a positive number that fits in a `Duration`.
    pub fn resolved_timeout(&self) -> Duration {
        self.timeout.and_then(positive_duration).unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Connect limit, if one is configured and valid.
    pub fn resolved_connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.and_then(positive_duration)
    }

    /// Response-head limit, if one is configured and valid.
    pub fn resolved_response_timeout(&self) -> Option<Duration> {
        self.response_timeout.and_then(positive_duration)
    }

    /// Overwrite every field that is set on `other`.
    pub fn merge_from(&mut self, other: &Options) {
        if other.debug {
            self.debug = true;
        }
        if other.base_uri.is_some() {
            self.base_uri.clone_from(&other.base_uri);
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.connect_timeout.is_some() {
            self.connect_timeout = other.connect_timeout;
        }
        if other.response_timeout.is_some() {
            self.response_timeout = other.response_timeout;
        }
        if other.query.is_some() {
            self.query.clone_from(&other.query);
        }
        if !other.headers.is_empty() {
            self.headers.clone_from(&other.headers);
        }
        if other.cookies.is_some() {
            self.cookies.clone_from(&other.cookies);
        }
        if !other.form_params.is_empty() {
            self.form_params.clone_from(&other.form_params);
        }
        if other.json.is_some() {
            self.json.clone_from(&other.json);
        }
        if other.xml.is_some() {
            self.xml.clone_from(&other.xml);
        }
        if !other.multipart.is_empty() {
            self.multipart.clone_from(&other.multipart);
        }
        if other.proxy.is_some() {
            self.proxy.clone_from(&other.proxy);
        }
        if !other.certificates.is_empty() {
            self.certificates.clone_from(&other.certificates);
        }
        if other.insecure_skip_verify {
            self.insecure_skip_verify = true;
        }
    }
}

/// Seconds as a duration; `None` for zero, negative, NaN or out-of-range values.
fn positive_duration(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Fold `overrides` over `base`, left to right.
pub fn merge(base: &Options, overrides: &[Options]) -> Options {
    let mut merged = base.clone();
    for o in overrides {
        merged.merge_from(o);
    }
    merged
}

/// `headers` plus every `DEFAULT_HEADERS` entry whose name is missing.
pub fn with_default_headers(headers: &Headers) -> Headers {
    let mut merged = headers.clone();
    for (name, value) in DEFAULT_HEADERS {
        if !merged.keys().any(|k| k.eq_ignore_ascii_case(name)) {
            merged.insert(name.to_string(), ParamValue::from(value));
        }
    }
    merged
}
