//! Transport executor backed by `ureq`.
//!
//! # Design
//! A fresh `ureq::Agent` is configured for every call from the merged
//! options: whole-call, connect and response-head timeouts, TLS verification
//! and client identity, proxy.
//! Nothing is shared between calls. Non-2xx statuses are returned as data so
//! the response facade can expose them.

use ureq::tls::{Certificate, ClientCert, PrivateKey, TlsConfig};
use ureq::{Agent, Proxy};

use crate::error::Error;
use crate::http::Request;
use crate::options::{ClientCertificate, Options};

pub(crate) const DEBUG_TARGET: &str = "ferry_core::debug";

/// Build the agent for one call.
pub fn agent(opts: &Options) -> Result<Agent, Error> {
    let mut tls = TlsConfig::builder().disable_verification(opts.insecure_skip_verify);
    if let Some(cert) = opts.certificates.first() {
        tls = tls.client_cert(Some(client_cert(cert)?));
    }

    let mut config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(opts.resolved_timeout()))
        .timeout_connect(opts.resolved_connect_timeout())
        .timeout_recv_response(opts.resolved_response_timeout())
        .tls_config(tls.build());

    // an unparseable proxy is ignored, like an absent one
    if let Some(proxy) = opts.proxy.as_deref().and_then(|p| Proxy::new(p).ok()) {
        config = config.proxy(Some(proxy));
    }

    Ok(config.build().new_agent())
}

fn client_cert(cert: &ClientCertificate) -> Result<ClientCert, Error> {
    let certificate =
        Certificate::from_pem(&cert.cert_pem).map_err(|e| Error::Certificate(e.to_string()))?;
    let key = PrivateKey::from_pem(&cert.key_pem).map_err(|e| Error::Certificate(e.to_string()))?;
    Ok(ClientCert::new_with_certs(&[certificate], key))
}

/// Send `request` and return the raw response with its body unread.
pub fn execute(
    request: &Request,
    opts: &Options,
) -> Result<ureq::http::Response<ureq::Body>, Error> {
    let agent = agent(opts)?;

    // ureq derives Host from the URI itself; only a caller override is passed on.
    let derived_host = crate::request::host_header(&request.url);
    let mut builder = ureq::http::Request::builder()
        .method(request.method.as_str())
        .uri(request.url.as_str());
    for (name, value) in &request.headers {
        if name.eq_ignore_ascii_case("host") && derived_host.as_deref() == Some(value.as_str()) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }

    if opts.debug {
        tracing::debug!(
            target: DEBUG_TARGET,
            method = %request.method,
            url = %request.url,
            headers = ?request.headers,
            body_len = request.body.as_ref().map_or(0, Vec::len),
            "sending request"
        );
    }

    // a body-carrying method without a body source still sends `Content-Length: 0`
    let empty_body = request.body.is_none() && request.method.carries_body();
    if empty_body && !request.has_header("content-length") {
        builder = builder.header("content-length", "0");
    }

    let response = match (&request.body, empty_body) {
        (Some(body), _) => agent.run(builder.body(body.as_slice()).map_err(malformed)?),
        (None, true) => agent.run(builder.body(&[] as &[u8]).map_err(malformed)?),
        (None, false) => agent.run(builder.body(()).map_err(malformed)?),
    };

    match response {
        Ok(response) => Ok(response),
        Err(e) => {
            if opts.debug {
                tracing::debug!(target: DEBUG_TARGET, error = %e, "request failed");
            }
            Err(Error::Transport(e))
        }
    }
}

fn malformed(e: ureq::http::Error) -> Error {
    Error::Malformed(e.to_string())
}
