//! Request builder: turns a method, a URI and merged `Options` into a
//! transport-level `Request`.
//!
//! # Design
//! Building never touches the network. The steps run in a fixed order:
//! validate the method, resolve the URI against `base_uri`, encode the body
//! (for methods that carry one), then apply query, headers, the body content
//! type, cookies and `Host`. Every failure here is a construction error.

use std::collections::BTreeMap;

use url::{form_urlencoded, Url};

use crate::encode::{self, ContentType};
use crate::error::Error;
use crate::http::{Method, Request};
use crate::options::{Cookie, Cookies, Headers, Options, ParamValue, Params, Query};

/// Build a request for `method` and `uri` from already-merged `opts`.
pub fn build(method: &str, uri: &str, opts: &Options) -> Result<Request, Error> {
    let method: Method = method.parse()?;
    let resolved = resolve_uri(uri, opts.base_uri.as_deref());
    let url = Url::parse(&resolved).map_err(|e| Error::InvalidUri {
        uri: resolved.clone(),
        reason: e.to_string(),
    })?;
    if url.host_str().is_none() {
        return Err(Error::InvalidUri {
            uri: resolved,
            reason: "missing host".to_string(),
        });
    }

    let mut request = Request::new(method, url);

    let body = if method.carries_body() {
        encode::encode(opts)?
    } else {
        None
    };

    if let Some(query) = &opts.query {
        apply_query(&mut request.url, query);
    }
    apply_headers(&mut request, &opts.headers);

    if let Some(body) = body {
        match body.content_type {
            ContentType::Default(ct) => {
                if !request.has_header("Content-Type") {
                    request.set_header("Content-Type", ct);
                }
            }
            ContentType::Override(ct) => request.set_header("Content-Type", ct),
        }
        request.body = Some(body.bytes);
    }

    if let Some(cookies) = &opts.cookies {
        apply_cookies(&mut request, cookies);
    }

    if !request.has_header("Host") {
        if let Some(host) = host_header(&request.url) {
            request.add_header("Host", host);
        }
    }

    Ok(request)
}

/// Prefix `uri` with `base_uri` when `uri` has no HTTP scheme and the base does.
pub fn resolve_uri(uri: &str, base_uri: Option<&str>) -> String {
    match base_uri {
        Some(base) if !has_http_scheme(uri) && has_http_scheme(base) => format!("{base}{uri}"),
        _ => uri.to_string(),
    }
}

fn has_http_scheme(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Apply the query option to `url`.
///
/// `Raw` replaces the query verbatim. `Params` starts from the URL's existing
/// pairs, sets scalar keys, appends list elements, and re-encodes with keys in
/// sorted order.
pub fn apply_query(url: &mut Url, query: &Query) {
    match query {
        Query::Raw(raw) if raw.is_empty() => url.set_query(None),
        Query::Raw(raw) => url.set_query(Some(raw)),
        Query::Params(params) => {
            let merged = merge_query_pairs(url.query(), params);
            if merged.is_empty() {
                url.set_query(None);
                return;
            }
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, values) in &merged {
                for v in values {
                    serializer.append_pair(key, v);
                }
            }
            url.set_query(Some(&serializer.finish()));
        }
    }
}

fn merge_query_pairs(existing: Option<&str>, params: &Params) -> BTreeMap<String, Vec<String>> {
    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(existing) = existing {
        for (k, v) in form_urlencoded::parse(existing.as_bytes()) {
            merged.entry(k.into_owned()).or_default().push(v.into_owned());
        }
    }
    for (key, value) in params {
        match value {
            ParamValue::Single(v) => {
                merged.insert(key.clone(), vec![v.clone()]);
            }
            ParamValue::Multi(vs) => {
                merged.entry(key.clone()).or_default().extend(vs.iter().cloned());
            }
        }
    }
    merged
}

/// Scalar values replace existing lines; list values append one line each.
pub fn apply_headers(request: &mut Request, headers: &Headers) {
    for (name, value) in headers {
        match value {
            ParamValue::Single(v) => request.set_header(name, v.clone()),
            ParamValue::Multi(vs) => {
                for v in vs {
                    request.add_header(name, v.clone());
                }
            }
        }
    }
}

/// `Raw` is appended as its own `Cookie` line; pairs and structured cookies
/// are serialized as `name=value` and joined into the first `Cookie` line.
pub fn apply_cookies(request: &mut Request, cookies: &Cookies) {
    let pairs: Vec<String> = match cookies {
        Cookies::Raw(raw) => {
            request.add_header("Cookie", raw.clone());
            return;
        }
        Cookies::Pairs(map) => map
            .iter()
            .filter_map(|(name, value)| cookie_pair(name, value))
            .collect(),
        Cookies::List(list) => list
            .iter()
            .filter_map(|Cookie { name, value, .. }| cookie_pair(name, value))
            .collect(),
    };
    if pairs.is_empty() {
        return;
    }

    let joined = pairs.join("; ");
    match request
        .headers
        .iter()
        .position(|(k, _)| k.eq_ignore_ascii_case("Cookie"))
    {
        Some(i) => {
            let line = &mut request.headers[i].1;
            if !line.is_empty() {
                line.push_str("; ");
            }
            line.push_str(&joined);
        }
        None => request.add_header("Cookie", joined),
    }
}

fn cookie_pair(name: &str, value: &str) -> Option<String> {
    let name = sanitize_cookie_name(name);
    if name.is_empty() {
        return None;
    }
    Some(format!("{name}={}", sanitize_cookie_value(value)))
}

fn sanitize_cookie_name(name: &str) -> String {
    name.replace(['\n', '\r'], "-")
}

/// Drop bytes not allowed in a cookie value and quote values containing a
/// space or a comma.
fn sanitize_cookie_value(value: &str) -> String {
    let kept: String = value
        .chars()
        .filter(|&c| (' '..='~').contains(&c) && !matches!(c, '"' | ';' | '\\'))
        .collect();
    if kept.contains(' ') || kept.contains(',') {
        format!("\"{kept}\"")
    } else {
        kept
    }
}

pub(crate) fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
