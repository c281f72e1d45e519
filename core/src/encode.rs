//! Request body encoder.
//!
//! # Design
//! The body sources are tried in a fixed order: form parameters, JSON, XML,
//! multipart. The first one that is present wins and the rest are ignored.
//! `BodySource::ORDER` documents that order and `active_source` walks it.
//!
//! Each source yields the bytes plus a default content type. The default is
//! applied only when the caller's headers lack one, except for multipart,
//! whose boundary-carrying type always replaces the caller's value.

use serde_json::Value;
use url::form_urlencoded;

use crate::error::Error;
use crate::multipart;
use crate::options::{Options, Params, XmlPayload};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const XML_CONTENT_TYPE: &str = "application/xml";

/// Root element used when a map has no single nested-map entry.
const XML_DEFAULT_ROOT: &str = "doc";

/// Kinds of body payload, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySource {
    Form,
    Json,
    Xml,
    Multipart,
}

impl BodySource {
    pub const ORDER: [BodySource; 4] = [
        BodySource::Form,
        BodySource::Json,
        BodySource::Xml,
        BodySource::Multipart,
    ];

    fn is_present(self, opts: &Options) -> bool {
        match self {
            BodySource::Form => !opts.form_params.is_empty(),
            BodySource::Json => opts.json.is_some(),
            BodySource::Xml => opts.xml.is_some(),
            BodySource::Multipart => !opts.multipart.is_empty(),
        }
    }
}

/// How the encoded body's content type combines with caller headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    /// Used only if the caller did not set `Content-Type`.
    Default(&'static str),
    /// Replaces whatever the caller set.
    Override(String),
}

#[derive(Debug, Clone)]
pub struct EncodedBody {
    pub source: BodySource,
    pub bytes: Vec<u8>,
    pub content_type: ContentType,
}

/// First body source present on `opts`, if any.
pub fn active_source(opts: &Options) -> Option<BodySource> {
    BodySource::ORDER.into_iter().find(|s| s.is_present(opts))
}

/// Encode the active body source. `Ok(None)` means the request has no body.
pub fn encode(opts: &Options) -> Result<Option<EncodedBody>, Error> {
    let Some(source) = active_source(opts) else {
        return Ok(None);
    };

    let (bytes, content_type) = match source {
        BodySource::Form => (
            encode_form(&opts.form_params).into_bytes(),
            ContentType::Default(FORM_CONTENT_TYPE),
        ),
        BodySource::Json => {
            let bytes = serde_json::to_vec(opts.json.as_ref().unwrap_or(&Value::Null))
                .map_err(|e| Error::Encode(e.to_string()))?;
            (bytes, ContentType::Default(JSON_CONTENT_TYPE))
        }
        BodySource::Xml => {
            let xml = match &opts.xml {
                Some(XmlPayload::Map(map)) => map_to_xml(map)?,
                Some(XmlPayload::Document(doc)) => doc.clone(),
                None => String::new(),
            };
            (xml.into_bytes(), ContentType::Default(XML_CONTENT_TYPE))
        }
        BodySource::Multipart => {
            let body = multipart::write(&opts.multipart)?;
            (body.bytes, ContentType::Override(body.content_type))
        }
    };

    Ok(Some(EncodedBody {
        source,
        bytes,
        content_type,
    }))
}

/// `application/x-www-form-urlencoded` in key order; list values repeat the key.
pub fn encode_form(params: &Params) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        for v in value.values() {
            serializer.append_pair(key, v);
        }
    }
    serializer.finish()
}

/// Convert a string-keyed map into an XML document.
///
/// A map holding exactly one entry whose value is itself a map uses that key
/// as the root element; anything else is wrapped in `<doc>`. Arrays become
/// repeated elements, `null` an empty element.
pub fn map_to_xml(map: &serde_json::Map<String, Value>) -> Result<String, Error> {
    let mut writer = quick_xml::Writer::new(Vec::new());
    match map.iter().next() {
        Some((root, Value::Object(inner))) if map.len() == 1 => {
            write_element(&mut writer, root, &Value::Object(inner.clone()))?;
        }
        _ => write_element(&mut writer, XML_DEFAULT_ROOT, &Value::Object(map.clone()))?,
    }
    String::from_utf8(writer.into_inner()).map_err(|e| Error::Encode(e.to_string()))
}

fn write_element(
    writer: &mut quick_xml::Writer<Vec<u8>>,
    name: &str,
    value: &Value,
) -> Result<(), Error> {
    use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

    if !is_xml_name(name) {
        return Err(Error::Encode(format!("`{name}` is not a valid XML element name")));
    }
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
        }
        Value::Null => {
            writer
                .write_event(Event::Empty(BytesStart::new(name)))
                .map_err(xml_err)?;
        }
        Value::Object(children) => {
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(xml_err)?;
            for (child, v) in children {
                write_element(writer, child, v)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_err)?;
        }
        scalar => {
            let text = match scalar {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_err)?;
        }
    }
    Ok(())
}

fn xml_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Encode(e.to_string())
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}
