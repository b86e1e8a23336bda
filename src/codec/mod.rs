//! Payload Codec
//!
//! Turns an optional payload and optional attachments into a request body.

pub mod json;
pub mod multipart;
pub mod pool;

pub use json::{NullArrayPatch, CONTENT_TYPE_JSON};
pub use multipart::MultipartWriter;
pub use pool::BufferPool;

use crate::api::FileAttachment;
use crate::error::Result;
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use std::sync::Arc;

/// A fully materialized request body
#[derive(Debug, Clone, Default)]
pub struct EncodedBody {
    pub bytes: Bytes,
    /// `None` for an empty body
    pub content_type: Option<String>,
}

impl EncodedBody {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Body encoder shared by every request of a client
#[derive(Debug, Clone)]
pub struct PayloadCodec {
    null_arrays: NullArrayPatch,
    pool: Option<Arc<BufferPool>>,
}

impl PayloadCodec {
    pub fn new(null_arrays: NullArrayPatch, pool: Option<Arc<BufferPool>>) -> Self {
        Self { null_arrays, pool }
    }

    pub fn pool(&self) -> Option<&Arc<BufferPool>> {
        self.pool.as_ref()
    }

    /// Encode as JSON, or as multipart when at least one file is attached
    pub async fn encode<T>(
        &self,
        payload: Option<&T>,
        files: &mut [FileAttachment<'_>],
    ) -> Result<EncodedBody>
    where
        T: Serialize + ?Sized,
    {
        if files.is_empty() {
            return self.encode_json(payload);
        }

        let mut buf = self.buffer();
        let content_type = multipart::encode(
            &mut buf,
            MultipartWriter::new(),
            payload,
            &self.null_arrays,
            files,
        )
        .await?;

        Ok(EncodedBody {
            bytes: buf.freeze(),
            content_type: Some(content_type),
        })
    }

    /// Encode `payload` as plain JSON; no payload gives an empty body
    pub fn encode_json<T>(&self, payload: Option<&T>) -> Result<EncodedBody>
    where
        T: Serialize + ?Sized,
    {
        let Some(payload) = payload else {
            return Ok(EncodedBody::empty());
        };

        let mut buf = self.buffer();
        json::write_json(&mut buf, payload, &self.null_arrays)?;

        Ok(EncodedBody {
            bytes: buf.freeze(),
            content_type: Some(CONTENT_TYPE_JSON.to_string()),
        })
    }

    /// Hand a finished body's storage back to the pool
    pub fn reclaim(&self, body: EncodedBody) {
        if let Some(pool) = &self.pool {
            pool.reclaim(body.bytes);
        }
    }

    fn buffer(&self) -> BytesMut {
        match &self.pool {
            Some(pool) => pool.acquire(0),
            None => BytesMut::new(),
        }
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new(NullArrayPatch::default(), None)
    }
}
