//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server once on a random port, then drives every client
//! operation over real HTTP. Each test builds its own `Client` pointed at
//! that server through `base_uri`.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use ferry_core::{Client, Cookie, Error, FormData, Options, ParamValue, Params, XmlPayload};
use mock_server::{EchoCookie, EchoPart};
use serde_json::json;

fn server() -> SocketAddr {
    static ADDR: OnceLock<SocketAddr> = OnceLock::new();
    *ADDR.get_or_init(|| {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run(listener).await
            })
            .unwrap();
        });
        addr
    })
}

fn client() -> Client {
    Client::with_options(Options::new().base_uri(format!("http://{}", server())))
}

/// Strip the `prefix:` the mock server puts in front of every echo.
fn echoed<'a>(text: &'a str, prefix: &str) -> &'a str {
    text.strip_prefix(prefix)
        .unwrap_or_else(|| panic!("expected `{prefix}` prefix in {text:?}"))
}

// --- plain verbs ---

#[test]
fn get_reports_status_and_body() {
    let resp = client().get("/get", None).unwrap();
    assert_eq!(resp.status_code(), 200);
    assert_eq!(resp.reason_phrase(), "OK");
    assert_eq!(resp.status_line(), "200 OK");
    assert!(resp.is_ok());
    assert!(!resp.is_timeout());
    assert_eq!(resp.contents(), "http get");
    assert_eq!(resp.content_length(), Some(8));
    assert!(resp.header_line("content-type").starts_with("text/plain"));
}

#[test]
fn every_verb_reaches_its_route() {
    let c = client();
    assert_eq!(c.post("/post", None).unwrap().contents(), "http post");
    assert_eq!(c.put("/put", None).unwrap().contents(), "http put");
    assert_eq!(c.patch("/patch", None).unwrap().contents(), "http patch");
    assert_eq!(c.delete("/delete", None).unwrap().contents(), "http delete");
    assert_eq!(c.options("/options", None).unwrap().contents(), "http options");
    assert_eq!(c.request("put", "/put", &[]).unwrap().contents(), "http put");
}

#[test]
fn absolute_uri_ignores_base() {
    let resp = Client::new()
        .get(format!("http://{}/get", server()).as_str(), None)
        .unwrap();
    assert_eq!(resp.contents(), "http get");
}

#[test]
fn non_success_status_is_data() {
    let resp = client().get("/status/404", None).unwrap();
    assert_eq!(resp.status_code(), 404);
    assert_eq!(resp.reason_phrase(), "Not Found");
    assert!(!resp.is_ok());
}

#[test]
fn response_keeps_the_request() {
    let resp = client()
        .get("/get", Options::new().header("X-Trace", "abc"))
        .unwrap();
    let req = resp.request();
    assert_eq!(req.url.path(), "/get");
    assert_eq!(req.header("X-Trace"), Some("abc"));
}

#[test]
fn json_response_is_decoded() {
    let resp = client().get("/get-response-json", None).unwrap();
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["code"], 10001);
    assert_eq!(body["message"], "参数错误");
}

#[test]
fn gbk_contents_are_transcoded() {
    let resp = client().get("/get-gbk", None).unwrap();
    assert_eq!(resp.contents(), mock_server::GBK_TEXT);
    assert_ne!(resp.body(), mock_server::GBK_TEXT.as_bytes());
}

// --- query ---

#[test]
fn query_params_are_sorted_and_lists_repeat() {
    let mut params = Params::new();
    params.insert("key3".into(), "abc456".into());
    params.insert("key1".into(), 123.into());
    params.insert("key2".into(), ["value21", "value22"].into());

    let resp = client()
        .get("/get-with-query", Options::new().query(params))
        .unwrap();
    assert_eq!(
        resp.contents(),
        "query:key1=123&key2=value21&key2=value22&key3=abc456"
    );
}

#[test]
fn raw_query_replaces_the_uri_query() {
    let resp = client()
        .get(
            "/get-with-query?key0=0",
            Options::new().query("key1=abc&key2=123"),
        )
        .unwrap();
    assert_eq!(resp.contents(), "query:key1=abc&key2=123");
}

#[test]
fn params_query_keeps_uri_pairs() {
    let mut params = Params::new();
    params.insert("key2".into(), "two".into());
    let resp = client()
        .get("/get-with-query?key1=one", Options::new().query(params))
        .unwrap();
    assert_eq!(resp.contents(), "query:key1=one&key2=two");
}

// --- headers & cookies ---

#[test]
fn scalar_headers_replace_and_lists_append() {
    let resp = client()
        .post(
            "/post-with-headers",
            Options::new()
                .header("User-Agent", "ferry-test")
                .header("X-List", ["a", "b"]),
        )
        .unwrap();
    let text = resp.contents();
    let headers: BTreeMap<String, Vec<String>> =
        serde_json::from_str(echoed(&text, "headers:")).unwrap();
    assert_eq!(headers["user-agent"], vec!["ferry-test"]);
    assert_eq!(headers["x-list"], vec!["a", "b"]);
    // defaults fill what the caller left out
    assert!(headers.contains_key("accept-language"));
}

#[test]
fn raw_cookie_string_is_sent_as_is() {
    let resp = client()
        .post(
            "/post-with-cookies",
            Options::new().cookies("cookie1=value1;cookie2=value2"),
        )
        .unwrap();
    let text = resp.contents();
    let cookies: Vec<EchoCookie> = serde_json::from_str(echoed(&text, "cookies:")).unwrap();
    let pairs: Vec<_> = cookies.iter().map(|c| (c.name.as_str(), c.value.as_str())).collect();
    assert_eq!(pairs, vec![("cookie1", "value1"), ("cookie2", "value2")]);
}

#[test]
fn cookie_pairs_and_structs_are_joined() {
    let mut pairs = BTreeMap::new();
    pairs.insert("b".to_string(), "2".to_string());
    pairs.insert("a".to_string(), "1".to_string());
    let resp = client()
        .post("/post-with-cookies", Options::new().cookies(pairs))
        .unwrap();
    assert_eq!(
        resp.contents(),
        r#"cookies:[{"name":"a","value":"1"},{"name":"b","value":"2"}]"#
    );

    let list = vec![Cookie {
        domain: Some("example.com".into()),
        secure: true,
        ..Cookie::new("session", "xyz")
    }];
    let resp = client()
        .post("/post-with-cookies", Options::new().cookies(list))
        .unwrap();
    assert_eq!(resp.contents(), r#"cookies:[{"name":"session","value":"xyz"}]"#);
}

// --- bodies ---

#[test]
fn form_params_round_trip() {
    let resp = client()
        .post(
            "/post-with-form-params",
            Options::new()
                .form_param("key1", "value1")
                .form_param("key2", ["value21", "value22"])
                .form_param("key3", "abcd张"),
        )
        .unwrap();
    assert_eq!(
        resp.contents(),
        r#"form params:{"key1":["value1"],"key2":["value21","value22"],"key3":["abcd张"]}"#
    );
}

#[test]
fn json_body_is_sent_with_its_content_type() {
    #[derive(serde::Serialize)]
    struct Payload {
        key1: String,
        key2: Vec<String>,
        key3: u32,
    }
    let opts = Options::new()
        .try_json(&Payload {
            key1: "value1".into(),
            key2: vec!["value21".into(), "value22".into()],
            key3: 333,
        })
        .unwrap();
    let resp = client().post("/post-with-json", opts).unwrap();
    assert_eq!(
        resp.contents(),
        r#"json:{"key1":"value1","key2":["value21","value22"],"key3":333}"#
    );
    assert_eq!(resp.request().header("Content-Type"), Some("application/json"));
}

#[test]
fn xml_map_body_is_converted() {
    let map = match json!({"user": {"name": "mike", "age": 30}}) {
        serde_json::Value::Object(m) => m,
        _ => unreachable!(),
    };
    let resp = client()
        .post("/post-with-xml", Options::new().xml(XmlPayload::Map(map)))
        .unwrap();
    assert_eq!(
        resp.contents(),
        "xml:<user><name>mike</name><age>30</age></user>"
    );
}

#[test]
fn xml_document_is_sent_verbatim() {
    let doc = "<?xml version=\"1.0\"?><note><to>mike</to></note>";
    let resp = client()
        .post(
            "/post-with-xml",
            Options::new().xml(XmlPayload::Document(doc.into())),
        )
        .unwrap();
    assert_eq!(resp.contents(), format!("xml:{doc}"));
}

#[test]
fn get_never_carries_a_body() {
    let resp = client()
        .get("/get", Options::new().json(json!({"ignored": true})))
        .unwrap();
    assert!(resp.request().body.is_none());
    assert!(!resp.request().has_header("Content-Type"));
}

#[test]
fn bodiless_post_sends_zero_content_length() {
    let resp = client().post("/post-with-headers", None).unwrap();
    let text = resp.contents();
    let headers: BTreeMap<String, Vec<String>> =
        serde_json::from_str(echoed(&text, "headers:")).unwrap();
    assert_eq!(headers["content-length"], vec!["0"]);
    assert!(!headers.contains_key("transfer-encoding"));
}

#[test]
fn multipart_fields_and_files_are_uploaded() {
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("avatar.png");
    let mut f = std::fs::File::create(&png).unwrap();
    f.write_all(b"\x89PNG\r\n\x1a\n0000").unwrap();
    drop(f);

    let resp = client()
        .post(
            "/post-with-multipart",
            Options::new()
                .header("Content-Type", "text/plain")
                .multipart(vec![
                    FormData::field("field1", "abc"),
                    FormData::file("avatar", &png),
                ]),
        )
        .unwrap();
    assert_eq!(resp.status_code(), 200);
    let text = resp.contents();
    let parts: Vec<EchoPart> = serde_json::from_str(echoed(&text, "multipart:")).unwrap();
    assert_eq!(
        parts,
        vec![
            EchoPart {
                name: "field1".into(),
                filename: None,
                content_type: None,
                size: 3,
            },
            EchoPart {
                name: "avatar".into(),
                filename: Some("avatar.png".into()),
                content_type: Some("image/png".into()),
                size: 12,
            },
        ]
    );
    assert!(resp
        .request()
        .header("Content-Type")
        .unwrap()
        .starts_with("multipart/form-data; boundary="));
}

#[test]
fn missing_multipart_file_fails_before_sending() {
    let err = client()
        .post(
            "/post-with-multipart",
            Options::new().multipart(vec![FormData::file("f", "/no/such/file.bin")]),
        )
        .unwrap_err();
    assert!(err.is_construction());
    assert!(matches!(err, Error::MultipartFile { .. }));
}

// --- streaming ---

#[test]
fn event_stream_yields_frames_until_done() {
    let resp = client().post("/post-with-stream-response", None).unwrap();
    assert!(resp.body().is_empty());
    let stream = resp.into_stream().expect("event-stream response");
    let frames: Vec<String> = stream.iter().collect();
    assert_eq!(frames, vec!["one", "two", "three"]);
    assert!(stream.close().is_ok());
}

#[test]
fn event_stream_can_be_abandoned() {
    let resp = client().post("/post-with-stream-response", None).unwrap();
    let stream = resp.into_stream().unwrap();
    assert_eq!(
        stream.recv_timeout(Duration::from_secs(5)).as_deref(),
        Ok("one")
    );
    drop(stream);
}

#[test]
fn buffered_response_has_no_stream() {
    let resp = client().get("/get", None).unwrap();
    assert!(resp.stream().is_none());
}

// --- failures ---

#[test]
fn slow_server_times_out() {
    let err = client()
        .get("/get-timeout", Options::new().timeout(0.3))
        .unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    assert!(!err.is_construction());
}

#[test]
fn generous_timeout_lets_slow_server_answer() {
    let resp = client()
        .get("/get-timeout", Options::new().timeout(5.0))
        .unwrap();
    assert_eq!(resp.contents(), "http get timeout");
}

#[test]
fn response_head_timeout_fires_before_whole_call_timeout() {
    let started = Instant::now();
    let err = client()
        .get(
            "/get-timeout",
            Options::new().timeout(10.0).response_timeout(0.3),
        )
        .unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    assert!(started.elapsed() < mock_server::TIMEOUT_DELAY);
}

#[test]
fn connect_timeout_bounds_an_unreachable_host() {
    // non-routable; depending on the network this times out or fails fast
    let started = Instant::now();
    let err = Client::new()
        .get(
            "http://10.255.255.1:81/get",
            Options::new().timeout(10.0).connect_timeout(0.3),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn refused_connection_is_not_a_timeout() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = Client::new()
        .get(format!("http://{addr}/get").as_str(), None)
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert!(!err.is_timeout());
}

#[test]
fn invalid_method_is_rejected() {
    let err = client().request("CONNECT", "/get", &[]).unwrap_err();
    assert!(matches!(err, Error::InvalidMethod(_)));
}

// --- download ---

#[test]
fn download_writes_the_last_segment() {
    let dir = tempfile::tempdir().unwrap();
    let path = client().download("/files/report.txt", dir.path(), None).unwrap();
    assert_eq!(path, dir.path().join("report.txt"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "file:report.txt");
}

#[test]
fn download_of_error_status_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let err = client().download("/status/500", dir.path(), None).unwrap_err();
    assert!(matches!(err, Error::HttpStatus(500)));
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

// --- client defaults ---

#[test]
fn per_call_options_override_client_defaults() {
    let c = Client::with_options(
        Options::new()
            .base_uri(format!("http://{}", server()))
            .header("X-Env", "default"),
    );
    let resp = c
        .post("/post-with-headers", Options::new().header("X-Other", "1"))
        .unwrap();
    let text = resp.contents();
    let headers: BTreeMap<String, Vec<String>> =
        serde_json::from_str(echoed(&text, "headers:")).unwrap();
    // a set header map replaces the defaults' map wholesale
    assert!(!headers.contains_key("x-env"));
    assert_eq!(headers["x-other"], vec!["1"]);

    let resp = c.post("/post-with-headers", None).unwrap();
    let text = resp.contents();
    let headers: BTreeMap<String, Vec<String>> =
        serde_json::from_str(echoed(&text, "headers:")).unwrap();
    assert_eq!(headers["x-env"], vec!["default"]);
}

#[test]
fn param_value_lists_are_accepted_from_owned_strings() {
    let values = ParamValue::from(vec!["x".to_string(), "y".to_string()]);
    let resp = client()
        .post("/post-with-headers", Options::new().header("X-Owned", values))
        .unwrap();
    let text = resp.contents();
    assert!(text.contains(r#""x-owned":["x","y"]"#));
}

// --- proxy ---

/// Read a request head and return its first line.
fn read_head(reader: &mut impl BufRead) -> String {
    let mut first = String::new();
    reader.read_line(&mut first).unwrap();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
            break;
        }
    }
    first
}

#[test]
fn requests_go_through_the_configured_proxy() {
    let proxy = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let proxy_addr = proxy.local_addr().unwrap();
    let seen = std::thread::spawn(move || {
        let (stream, _) = proxy.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let first = read_head(&mut reader);
        if first.starts_with("CONNECT ") {
            reader
                .get_mut()
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .unwrap();
            read_head(&mut reader);
        }
        reader
            .get_mut()
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\nConnection: close\r\n\r\nproxied")
            .unwrap();
        first
    });

    // the .invalid host only resolves if the proxy does the work
    let resp = Client::new()
        .get(
            "http://ferry.invalid/get",
            Options::new()
                .proxy(format!("http://{proxy_addr}"))
                .timeout(5.0),
        )
        .unwrap();
    assert_eq!(resp.contents(), "proxied");
    let first = seen.join().unwrap();
    assert!(first.contains("ferry.invalid"), "proxy saw {first:?}");
}

// --- debug logging ---

#[derive(Clone, Default)]
struct Captured(Arc<parking_lot::Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Run one GET under a capturing subscriber and return what it logged.
fn logged_get(opts: Options) -> String {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        client().get("/get", opts).unwrap();
    });
    let bytes = captured.0.lock().clone();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn debug_option_dumps_request_and_response() {
    let out = logged_get(Options::new().debug(true));
    assert!(out.contains("ferry_core::debug"), "{out}");
    assert!(out.contains("sending request"), "{out}");
    assert!(out.contains("received response"), "{out}");
    assert!(out.contains("status=200"), "{out}");
}

#[test]
fn no_dumps_without_debug_option() {
    let out = logged_get(Options::new());
    assert!(!out.contains("ferry_core::debug"), "{out}");
}
