//! Request Types
//!
//! A logical request (method, route, optional payload, optional attachments)
//! as handed to the pipeline by higher-level wrappers.

use bytes::{Bytes, BytesMut};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

pub use reqwest::Method;

/// A single logical API request
///
/// The payload is borrowed and only serialized once, before the first attempt.
/// Consumed by value when sent, so it cannot change while in flight.
pub struct Request<'a, T: ?Sized = serde_json::Value> {
    method: Method,
    route: String,
    payload: Option<&'a T>,
    files: Vec<FileAttachment<'a>>,
}

impl<'a> Request<'a> {
    /// Create a request without payload or attachments
    pub fn new(method: Method, route: impl Into<String>) -> Self {
        Self {
            method,
            route: route.into(),
            payload: None,
            files: Vec::new(),
        }
    }

    pub fn get(route: impl Into<String>) -> Self {
        Self::new(Method::GET, route)
    }

    pub fn post(route: impl Into<String>) -> Self {
        Self::new(Method::POST, route)
    }

    pub fn put(route: impl Into<String>) -> Self {
        Self::new(Method::PUT, route)
    }

    pub fn patch(route: impl Into<String>) -> Self {
        Self::new(Method::PATCH, route)
    }

    pub fn delete(route: impl Into<String>) -> Self {
        Self::new(Method::DELETE, route)
    }
}

impl<'a, T: ?Sized> Request<'a, T> {
    /// Attach a structured payload, serialized as JSON (or as the JSON part of a multipart body)
    pub fn with_payload<U: ?Sized>(self, payload: &'a U) -> Request<'a, U> {
        Request {
            method: self.method,
            route: self.route,
            payload: Some(payload),
            files: self.files,
        }
    }

    /// Append one attachment; attachments keep the order they were added in
    pub fn with_file(mut self, file: FileAttachment<'a>) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = FileAttachment<'a>>) -> Self {
        self.files.extend(files);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn payload(&self) -> Option<&'a T> {
        self.payload
    }

    pub fn files(&self) -> &[FileAttachment<'a>] {
        &self.files
    }

    pub(crate) fn into_parts(self) -> (Method, String, Option<&'a T>, Vec<FileAttachment<'a>>) {
        (self.method, self.route, self.payload, self.files)
    }
}

impl<T: ?Sized> fmt::Debug for Request<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("route", &self.route)
            .field("has_payload", &self.payload.is_some())
            .field("files", &self.files)
            .finish()
    }
}

/// A file to upload alongside the payload
///
/// The caller opens the underlying resource and keeps ownership of it; the
/// pipeline reads it once, sequentially, while building the body, and holds no
/// handle after the call returns.
pub struct FileAttachment<'a> {
    name: String,
    source: AttachmentSource<'a>,
}

enum AttachmentSource<'a> {
    File(&'a mut tokio::fs::File),
    Reader {
        reader: &'a mut (dyn AsyncRead + Send + Sync + Unpin + 'a),
        size_hint: u64,
    },
    Memory(Bytes),
}

impl<'a> FileAttachment<'a> {
    /// Borrow an open file; its size is taken from the file metadata
    pub fn from_file(name: impl Into<String>, file: &'a mut tokio::fs::File) -> Self {
        Self {
            name: name.into(),
            source: AttachmentSource::File(file),
        }
    }

    /// Borrow any async reader; `size_hint` is only used to pre-size the body buffer
    pub fn from_reader<R>(name: impl Into<String>, reader: &'a mut R, size_hint: u64) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'a,
    {
        Self {
            name: name.into(),
            source: AttachmentSource::Reader { reader, size_hint },
        }
    }

    /// In-memory content
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            source: AttachmentSource::Memory(data.into()),
        }
    }

    /// Display name sent as the part's filename
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expected content length in bytes
    pub(crate) async fn size(&self) -> std::io::Result<u64> {
        match &self.source {
            AttachmentSource::File(file) => {
                let metadata = file.metadata().await?;
                if metadata.is_dir() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "attachment is a directory",
                    ));
                }
                Ok(metadata.len())
            }
            AttachmentSource::Reader { size_hint, .. } => Ok(*size_hint),
            AttachmentSource::Memory(data) => Ok(data.len() as u64),
        }
    }

    /// Stream the remaining content onto the end of `buf`, returning bytes copied
    pub(crate) async fn read_into(&mut self, buf: &mut BytesMut) -> std::io::Result<u64> {
        match &mut self.source {
            AttachmentSource::File(file) => read_all(&mut **file, buf).await,
            AttachmentSource::Reader { reader, .. } => read_all(&mut **reader, buf).await,
            AttachmentSource::Memory(data) => {
                let copied = data.len() as u64;
                buf.extend_from_slice(&data[..]);
                *data = Bytes::new();
                Ok(copied)
            }
        }
    }
}

async fn read_all<R>(reader: &mut R, buf: &mut BytesMut) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut copied = 0u64;
    loop {
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return Ok(copied);
        }
        copied += n as u64;
    }
}

impl fmt::Debug for FileAttachment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            AttachmentSource::File(_) => "file",
            AttachmentSource::Reader { .. } => "reader",
            AttachmentSource::Memory(_) => "memory",
        };
        f.debug_struct("FileAttachment")
            .field("name", &self.name)
            .field("source", &kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_request_builder_keeps_file_order() {
        let payload = serde_json::json!({"content": "hi"});
        let request = Request::post("/channels/1/messages")
            .with_payload(&payload)
            .with_file(FileAttachment::from_bytes("a.txt", "a"))
            .with_file(FileAttachment::from_bytes("b.txt", "b"));

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.route(), "/channels/1/messages");
        assert!(request.payload().is_some());

        let names: Vec<_> = request.files().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_file_attachment_reads_whole_file_once() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello attachment").unwrap();

        let mut file = tokio::fs::File::open(tmp.path()).await.unwrap();
        let mut attachment = FileAttachment::from_file("greeting.txt", &mut file);

        assert_eq!(attachment.size().await.unwrap(), 16);

        let mut buf = BytesMut::new();
        let copied = attachment.read_into(&mut buf).await.unwrap();
        assert_eq!(copied, 16);
        assert_eq!(&buf[..], b"hello attachment");
    }

    #[tokio::test]
    async fn test_reader_attachment_uses_size_hint() {
        let mut reader: &[u8] = b"abc";
        let mut attachment = FileAttachment::from_reader("r.bin", &mut reader, 3);

        assert_eq!(attachment.size().await.unwrap(), 3);

        let mut buf = BytesMut::from(&b"prefix:"[..]);
        attachment.read_into(&mut buf).await.unwrap();
        assert_eq!(&buf[..], b"prefix:abc");
    }
}
