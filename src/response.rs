use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue};
use http::StatusCode;

lazy_static::lazy_static! {
    /// Interned `Content-Type` values for the common response helpers, so
    /// writing one of these types never allocates a header value.
    pub(crate) static ref TEXT_PLAIN_UTF8: HeaderValue =
        HeaderValue::from_static("text/plain; charset=UTF-8");
    pub(crate) static ref TEXT_HTML_UTF8: HeaderValue =
        HeaderValue::from_static("text/html; charset=UTF-8");
    pub(crate) static ref APPLICATION_JSON_UTF8: HeaderValue =
        HeaderValue::from_static("application/json; charset=UTF-8");
    pub(crate) static ref APPLICATION_JAVASCRIPT_UTF8: HeaderValue =
        HeaderValue::from_static("application/javascript; charset=UTF-8");
    pub(crate) static ref APPLICATION_XML_UTF8: HeaderValue =
        HeaderValue::from_static("application/xml; charset=UTF-8");
    pub(crate) static ref APPLICATION_OCTET_STREAM: HeaderValue =
        HeaderValue::from_static("application/octet-stream");
}

#[derive(Debug)]
/// The response under construction for one request.
///
/// This stands between handlers and the raw connection: it remembers the
/// first status code written, counts body bytes, and records whether the
/// header has been sent.  Writing to the body before any status was set
/// sends an implicit `200 OK`, mirroring what a raw HTTP connection would
/// do.
///
/// The writer is owned by its [`crate::Context`] and reset together with it
/// when the context returns to the pool; its body buffer keeps its capacity
/// across requests.
///
/// # Examples
/// ```rust
/// # use vessel::ResponseWriter;
/// let mut w = ResponseWriter::new();
/// w.write(b"hello");
/// assert_eq!(w.status(), http::StatusCode::OK);
/// assert_eq!(w.bytes_written(), 5);
/// assert!(w.wrote());
/// ```
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    buffer: Vec<u8>,
    stream: Option<hyper::Body>,
    header_sent: bool,
    wrote: bool,
    written: u64,
}

impl ResponseWriter {
    /// Creates an empty writer with status `200 OK`.
    pub fn new() -> Self {
        ResponseWriter {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            buffer: Vec::new(),
            stream: None,
            header_sent: false,
            wrote: false,
            written: 0,
        }
    }

    /// Sets the response status.  Only the first call takes effect; later
    /// calls are logged and dropped, as the header is already committed.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.header_sent {
            log::warn!("response status written twice, keeping {}", self.status);
            return;
        }
        self.status = status;
        self.header_sent = true;
        self.wrote = true;
    }

    /// Appends bytes to the response body, sending the implicit `200 OK`
    /// first if no status was written.  Returns the number of bytes
    /// accepted, which is always `data.len()`.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if !self.header_sent {
            self.write_header(self.status);
        }
        self.buffer.extend_from_slice(data);
        self.written += data.len() as u64;
        data.len()
    }

    /// Appends a string to the response body.  See [`ResponseWriter::write`].
    pub fn write_str(&mut self, data: &str) -> usize {
        self.write(data.as_bytes())
    }

    /// Replaces the response body with a streaming body.  Used by the file
    /// and stream helpers; the byte count is not tracked for streams.
    pub fn set_stream(&mut self, body: hyper::Body) {
        if !self.header_sent {
            self.write_header(self.status);
        }
        self.stream = Some(body);
    }

    /// The status that will be (or was) sent.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether anything was written: a status, body bytes, or a stream.
    pub fn wrote(&self) -> bool {
        self.wrote
    }

    /// Whether the status line is committed.
    pub fn header_sent(&self) -> bool {
        self.header_sent
    }

    /// The number of body bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The response headers, mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Sets the `Content-Type` unless one is already present.
    pub(crate) fn content_type(&mut self, value: &HeaderValue) {
        self.headers
            .entry(http::header::CONTENT_TYPE)
            .or_insert_with(|| value.clone());
    }

    /// Drains the accumulated state into a real response.  The writer stays
    /// reusable; its buffer keeps its capacity.
    pub(crate) fn take_response(&mut self) -> http::Response<hyper::Body> {
        let body = match self.stream.take() {
            Some(stream) => stream,
            None => hyper::Body::from(Bytes::copy_from_slice(&self.buffer)),
        };
        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        response
    }

    /// Restores the writer for reuse: status back to 200, flags cleared,
    /// buffer emptied in place.
    pub(crate) fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.buffer.clear();
        self.stream = None;
        self.header_sent = false;
        self.wrote = false;
        self.written = 0;
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        ResponseWriter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_status_wins() {
        let mut w = ResponseWriter::new();
        w.write_header(StatusCode::NOT_FOUND);
        w.write_header(StatusCode::OK);
        assert_eq!(w.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn body_write_commits_200() {
        let mut w = ResponseWriter::new();
        assert!(!w.wrote());
        w.write(b"body");
        assert!(w.header_sent());
        assert_eq!(w.status(), StatusCode::OK);
        // The status can no longer change.
        w.write_header(StatusCode::NOT_FOUND);
        assert_eq!(w.status(), StatusCode::OK);
    }

    #[test]
    fn counts_bytes_across_writes() {
        let mut w = ResponseWriter::new();
        w.write(b"ab");
        w.write_str("cde");
        assert_eq!(w.bytes_written(), 5);
    }

    #[test]
    fn take_response_carries_state() {
        let mut w = ResponseWriter::new();
        w.write_header(StatusCode::CREATED);
        w.headers_mut()
            .insert("x-test", HeaderValue::from_static("1"));
        w.write(b"payload");
        let response = w.take_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-test"], "1");
    }

    #[test]
    fn reset_restores_defaults() {
        let mut w = ResponseWriter::new();
        w.write_header(StatusCode::NOT_FOUND);
        w.write(b"gone");
        w.reset();
        assert_eq!(w.status(), StatusCode::OK);
        assert!(!w.wrote());
        assert!(!w.header_sent());
        assert_eq!(w.bytes_written(), 0);
        assert!(w.headers().is_empty());
    }

    #[test]
    fn content_type_does_not_override() {
        let mut w = ResponseWriter::new();
        w.headers_mut().insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/csv"),
        );
        w.content_type(&APPLICATION_JSON_UTF8);
        assert_eq!(w.headers()[http::header::CONTENT_TYPE], "text/csv");
    }
}
