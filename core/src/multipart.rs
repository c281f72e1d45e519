//! Multipart/form-data parts and the body writer.
//!
//! # Design
//! A `FormData` part is either in-memory contents or a filesystem path whose
//! bytes are loaded when the body is written. File handles live only for the
//! duration of `std::fs::read`, so they are closed whether or not the read
//! succeeds.
//!
//! File-backed parts without an explicit `Content-Type` get one sniffed from
//! their bytes: a handful of magic signatures first, then a non-text guess
//! from the filename extension through `mime_guess`, then UTF-8 text.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// One named field or file of a multipart upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormData {
    pub name: String,
    pub contents: Option<Vec<u8>>,
    pub path: Option<PathBuf>,
    /// Defaults to the base name of `path`.
    pub filename: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl FormData {
    /// An in-memory field.
    pub fn field(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: Some(contents.into()),
            ..Default::default()
        }
    }

    /// A file part read from `path` when the body is built.
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn resolved_filename(&self) -> Option<String> {
        self.filename.clone().or_else(|| {
            self.path
                .as_deref()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
        })
    }

    fn explicit_content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.as_str())
    }
}

/// An encoded multipart body and the content type carrying its boundary.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Write `parts` as a multipart/form-data body with a random boundary.
pub fn write(parts: &[FormData]) -> Result<MultipartBody, Error> {
    write_with_boundary(parts, &Uuid::new_v4().simple().to_string())
}

pub fn write_with_boundary(parts: &[FormData], boundary: &str) -> Result<MultipartBody, Error> {
    let mut bytes = Vec::new();
    for part in parts {
        check_header_text(&part.name)?;
        if let Some(filename) = &part.filename {
            check_header_text(filename)?;
        }
        for (name, value) in &part.headers {
            check_header_text(name)?;
            check_header_text(value)?;
            if name.contains(':') {
                return Err(Error::Malformed(format!(
                    "multipart header name `{name}` contains ':'"
                )));
            }
        }
    }

    for (i, part) in parts.iter().enumerate() {
        let loaded;
        let contents: &[u8] = match (&part.contents, &part.path) {
            (Some(c), _) => c,
            (None, Some(path)) => {
                loaded = std::fs::read(path).map_err(|source| Error::MultipartFile {
                    path: path.clone(),
                    source,
                })?;
                &loaded
            }
            (None, None) => &[],
        };

        if i > 0 {
            bytes.extend_from_slice(b"\r\n");
        }
        bytes.extend_from_slice(format!("--{boundary}\r\n").as_bytes());

        let mut disposition = format!("form-data; name=\"{}\"", escape_quotes(&part.name));
        if let Some(filename) = part.resolved_filename() {
            disposition.push_str(&format!("; filename=\"{}\"", escape_quotes(&filename)));
        }
        bytes.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());

        if part.explicit_content_type().is_none() && part.path.is_some() {
            let sniffed = sniff_content_type(contents, part.resolved_filename().as_deref());
            bytes.extend_from_slice(format!("Content-Type: {sniffed}\r\n").as_bytes());
        }
        for (name, value) in &part.headers {
            bytes.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(contents);
    }
    if !parts.is_empty() {
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Ok(MultipartBody {
        content_type: format!("multipart/form-data; boundary={boundary}"),
        bytes,
    })
}

/// Part names, filenames and headers end up inside the body's header block.
fn check_header_text(s: &str) -> Result<(), Error> {
    if s.contains(['\r', '\n']) {
        return Err(Error::Malformed(format!(
            "line break in multipart header text {s:?}"
        )));
    }
    Ok(())
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"BM", "image/bmp"),
];

/// Best-effort content type for `contents`.
pub fn sniff_content_type(contents: &[u8], filename: Option<&str>) -> String {
    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| contents.starts_with(sig)) {
        return mime.to_string();
    }
    if let Some(guess) = filename.and_then(|f| mime_guess::from_path(f).first()) {
        if guess.type_() != mime_guess::mime::TEXT {
            return guess.essence_str().to_string();
        }
    }
    if looks_like_text(contents) {
        return "text/plain; charset=utf-8".to_string();
    }
    "application/octet-stream".to_string()
}

fn looks_like_text(contents: &[u8]) -> bool {
    let head = &contents[..contents.len().min(512)];
    let text = match std::str::from_utf8(head) {
        Ok(t) => t,
        // a multi-byte char cut at the sniff window is still text
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return false,
    };
    !text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r' | '\x0c'))
}
