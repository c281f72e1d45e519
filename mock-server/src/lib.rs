use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, RawQuery},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Body of every `/post-with-stream-response` reply. Nothing after `[DONE]`
/// should ever reach a client.
pub const STREAM_BODY: &str = "data: one\n\ndata: two\n\ndata: three\n\ndata: [DONE]\n\ndata: never\n\n";

/// Text served GBK-encoded by `/get-gbk`.
pub const GBK_TEXT: &str = "你好，世界";

/// How long `/get-timeout` waits before answering.
pub const TIMEOUT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoCookie {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
}

pub fn app() -> Router {
    Router::new()
        .route("/get", any(get_plain))
        .route("/get-response-json", get(get_response_json))
        .route("/get-timeout", get(get_timeout))
        .route("/get-with-query", get(get_with_query))
        .route("/get-gbk", get(get_gbk))
        .route("/status/{code}", any(status))
        .route("/files/{name}", get(file))
        .route("/post", any(post_plain))
        .route("/post-with-headers", any(post_with_headers))
        .route("/post-with-cookies", any(post_with_cookies))
        .route("/post-with-form-params", any(post_with_form_params))
        .route("/post-with-json", any(post_with_json))
        .route("/post-with-xml", any(post_with_xml))
        .route("/post-with-multipart", post(post_with_multipart))
        .route("/post-with-stream-response", any(post_with_stream_response))
        .route("/put", any(put))
        .route("/patch", any(patch))
        .route("/delete", any(delete))
        .route("/options", any(options))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// `Err("need post")` style reply when the route was hit with the wrong verb.
fn require(method: &Method, expected: Method) -> Result<(), String> {
    if *method == expected {
        Ok(())
    } else {
        Err(format!("need {}", expected.as_str().to_ascii_lowercase()))
    }
}

fn reply(method: &Method, expected: Method, body: impl FnOnce() -> String) -> String {
    match require(method, expected) {
        Ok(()) => body(),
        Err(need) => need,
    }
}

async fn get_plain() -> &'static str {
    "http get"
}

async fn get_response_json() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "code": 10001, "message": "参数错误" }))
}

async fn get_timeout() -> &'static str {
    tokio::time::sleep(TIMEOUT_DELAY).await;
    "http get timeout"
}

async fn get_with_query(RawQuery(query): RawQuery) -> String {
    format!("query:{}", query.unwrap_or_default())
}

async fn get_gbk() -> impl IntoResponse {
    let (bytes, _, _) = encoding_rs::GBK.encode(GBK_TEXT);
    (
        [(header::CONTENT_TYPE, "text/plain; charset=gbk")],
        bytes.into_owned(),
    )
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, format!("status {}", status.as_u16())).into_response()
}

async fn file(Path(name): Path<String>) -> String {
    format!("file:{name}")
}

async fn post_plain(method: Method) -> String {
    reply(&method, Method::POST, || "http post".to_string())
}

/// Echo request headers as a JSON map of lower-case name to values.
async fn post_with_headers(method: Method, headers: HeaderMap) -> String {
    reply(&method, Method::POST, || {
        let mut echoed: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in &headers {
            echoed
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        format!("headers:{}", serde_json::to_string(&echoed).unwrap_or_default())
    })
}

async fn post_with_cookies(method: Method, headers: HeaderMap) -> String {
    reply(&method, Method::POST, || {
        let cookies = parse_cookies(&headers);
        format!("cookies:{}", serde_json::to_string(&cookies).unwrap_or_default())
    })
}

/// Every `name=value` pair from every `Cookie` line, in order.
pub fn parse_cookies(headers: &HeaderMap) -> Vec<EchoCookie> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|line| line.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some(EchoCookie {
                name: name.to_string(),
                value: value.trim_matches('"').to_string(),
            })
        })
        .collect()
}

async fn post_with_form_params(method: Method, body: Bytes) -> String {
    reply(&method, Method::POST, || {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in url::form_urlencoded::parse(&body) {
            params.entry(k.into_owned()).or_default().push(v.into_owned());
        }
        format!("form params:{}", serde_json::to_string(&params).unwrap_or_default())
    })
}

async fn post_with_json(method: Method, body: Bytes) -> String {
    reply(&method, Method::POST, || {
        format!("json:{}", String::from_utf8_lossy(&body))
    })
}

async fn post_with_xml(method: Method, body: Bytes) -> String {
    reply(&method, Method::POST, || {
        format!("xml:{}", String::from_utf8_lossy(&body))
    })
}

/// Describe every part received as a JSON array of `EchoPart`.
async fn post_with_multipart(mut multipart: Multipart) -> Response {
    let mut parts = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return (StatusCode::BAD_REQUEST, e.body_text()).into_response(),
        };
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let size = match field.bytes().await {
            Ok(bytes) => bytes.len(),
            Err(e) => return (StatusCode::BAD_REQUEST, e.body_text()).into_response(),
        };
        parts.push(EchoPart {
            name,
            filename,
            content_type,
            size,
        });
    }
    format!("multipart:{}", serde_json::to_string(&parts).unwrap_or_default()).into_response()
}

async fn post_with_stream_response(method: Method) -> Response {
    if let Err(need) = require(&method, Method::POST) {
        return need.into_response();
    }
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        STREAM_BODY,
    )
        .into_response()
}

async fn put(method: Method) -> String {
    reply(&method, Method::PUT, || "http put".to_string())
}

async fn patch(method: Method) -> String {
    reply(&method, Method::PATCH, || "http patch".to_string())
}

async fn delete(method: Method) -> String {
    reply(&method, Method::DELETE, || "http delete".to_string())
}

async fn options(method: Method) -> String {
    reply(&method, Method::OPTIONS, || "http options".to_string())
}
