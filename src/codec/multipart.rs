//! Multipart Encoding
//!
//! Builds a `multipart/form-data` body with an optional JSON part followed by
//! one binary part per attachment. The whole body is materialized so it can be
//! re-sent verbatim on retry.

use crate::api::FileAttachment;
use crate::codec::json::{write_json, NullArrayPatch, CONTENT_TYPE_JSON};
use crate::error::{RestError, Result};
use bytes::{BufMut, BytesMut};
use serde::Serialize;
use std::collections::hash_map::RandomState;
use std::fmt::Write as _;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

pub const PAYLOAD_FIELD: &str = "payload_json";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Headroom reserved for part headers and the JSON part
const FRAMING_RESERVE: usize = 1024;

/// Writer for one multipart body with a fixed boundary
#[derive(Debug)]
pub struct MultipartWriter {
    boundary: String,
    parts: usize,
}

impl MultipartWriter {
    pub fn new() -> Self {
        Self::with_boundary(random_boundary())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Number of parts started so far
    pub fn parts(&self) -> usize {
        self.parts
    }

    /// Write the delimiter and headers of a new part; its content follows directly
    pub fn begin_part(&mut self, buf: &mut BytesMut, disposition: &str, content_type: &str) {
        if self.parts > 0 {
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"--");
        buf.put_slice(self.boundary.as_bytes());
        buf.put_slice(b"\r\nContent-Disposition: ");
        buf.put_slice(disposition.as_bytes());
        buf.put_slice(b"\r\nContent-Type: ");
        buf.put_slice(content_type.as_bytes());
        buf.put_slice(b"\r\n\r\n");
        self.parts += 1;
    }

    /// Write the closing delimiter
    pub fn finish(self, buf: &mut BytesMut) {
        if self.parts > 0 {
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"--");
        buf.put_slice(self.boundary.as_bytes());
        buf.put_slice(b"--\r\n");
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `payload` and `files` into `buf`, returning the content type
pub async fn encode<T>(
    buf: &mut BytesMut,
    mut writer: MultipartWriter,
    payload: Option<&T>,
    patch: &NullArrayPatch,
    files: &mut [FileAttachment<'_>],
) -> Result<String>
where
    T: Serialize + ?Sized,
{
    let mut total = FRAMING_RESERVE;
    for (index, file) in files.iter().enumerate() {
        let size = file.size().await.map_err(|source| RestError::Attachment {
            index,
            name: file.name().to_string(),
            source,
        })?;
        total = total.saturating_add(usize::try_from(size).unwrap_or(usize::MAX));
    }
    buf.reserve(total);

    if let Some(payload) = payload {
        writer.begin_part(
            buf,
            &format!(r#"form-data; name="{}""#, PAYLOAD_FIELD),
            CONTENT_TYPE_JSON,
        );
        write_json(buf, payload, patch)?;
    }

    for (index, file) in files.iter_mut().enumerate() {
        let disposition = format!(
            r#"form-data; name="files[{}]"; filename="{}""#,
            index,
            escape_filename(file.name())
        );
        writer.begin_part(buf, &disposition, CONTENT_TYPE_OCTET_STREAM);

        let copied = file.read_into(buf).await.map_err(|e| {
            RestError::Encoding(format!(
                "failed to encode \"{}\" file data into multipart payload: {}",
                file.name(),
                e
            ))
        })?;
        tracing::trace!(index, name = file.name(), bytes = copied, "attachment encoded");
    }

    let content_type = writer.content_type();
    writer.finish(buf);
    Ok(content_type)
}

/// Quote-escape a filename and percent-encode line breaks so it cannot end the header
fn escape_filename(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            c => out.push(c),
        }
    }
    out
}

fn random_boundary() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut boundary = String::with_capacity(32);
    for salt in 0..2u64 {
        let mut hasher = RandomState::new().build_hasher();
        hasher.write_u64(seq);
        hasher.write_u64(salt);
        let _ = write!(boundary, "{:016x}", hasher.finish());
    }
    boundary
}
