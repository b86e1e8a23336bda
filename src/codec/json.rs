//! JSON Encoding
//!
//! Compact serialization plus the null-array byte patch.

use crate::error::Result;
use bytes::{BufMut, BytesMut};
use serde::Serialize;

pub const CONTENT_TYPE_JSON: &str = "application/json";

const NULL: &[u8] = b"null";
const EMPTY_ARRAY: &[u8] = b"[]";

/// Rewrites `"<field>":null` to `"<field>":[]` for a fixed set of array-typed fields
///
/// Works on the serialized bytes since the payload types cannot tell "unset"
/// from "explicitly null" before serialization. Only unescaped object keys are
/// matched; string contents are never touched.
#[derive(Debug, Clone, Default)]
pub struct NullArrayPatch {
    /// Each entry is the full `"field":null` needle
    needles: Vec<Vec<u8>>,
}

impl NullArrayPatch {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let needles = fields
            .into_iter()
            .filter(|f| !f.as_ref().is_empty())
            .map(|field| {
                let mut needle = serde_json::to_vec(field.as_ref()).unwrap_or_default();
                needle.push(b':');
                needle.extend_from_slice(NULL);
                needle
            })
            .collect();

        Self { needles }
    }

    pub fn is_empty(&self) -> bool {
        self.needles.is_empty()
    }

    /// Patch `buf` in place and return its new length
    ///
    /// The replacement is shorter than the needle, so the output is compacted
    /// towards the front and never overtakes unread input.
    pub fn apply(&self, buf: &mut [u8]) -> usize {
        if self.needles.is_empty() {
            return buf.len();
        }

        let len = buf.len();
        let (mut read, mut write) = (0usize, 0usize);
        let mut in_string = false;
        let mut escaped = false;

        'scan: while read < len {
            let byte = buf[read];

            if in_string {
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
            } else if byte == b'"' {
                for needle in &self.needles {
                    if buf[read..].starts_with(needle) {
                        let key_len = needle.len() - NULL.len();
                        buf.copy_within(read..read + key_len, write);
                        write += key_len;
                        buf[write..write + EMPTY_ARRAY.len()].copy_from_slice(EMPTY_ARRAY);
                        write += EMPTY_ARRAY.len();
                        read += needle.len();
                        continue 'scan;
                    }
                }
                in_string = true;
            }

            buf[write] = byte;
            write += 1;
            read += 1;
        }

        write
    }
}

/// Serialize `payload` onto the end of `buf` and patch the freshly written region
pub fn write_json<T>(buf: &mut BytesMut, payload: &T, patch: &NullArrayPatch) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let start = buf.len();
    serde_json::to_writer((&mut *buf).writer(), payload)?;

    let patched = patch.apply(&mut buf[start..]);
    buf.truncate(start + patched);
    Ok(())
}
