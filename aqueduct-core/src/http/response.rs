use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

/// The router's view of one in-flight response.
///
/// A handler that writes the body directly through [`Response::set_body`]
/// commits the response and the serializer step is skipped for it; the
/// serialization chain writes through [`Response::fill_body`], which leaves
/// the committed flag alone.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    serializer: Option<String>,
    committed: bool,
}

impl Default for Response {
    fn default() -> Self {
        Response {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            serializer: None,
            committed: false,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: StatusCode) -> Self {
        Response {
            status,
            ..Self::default()
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Writes the body on behalf of a handler and commits the response.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        self.committed = true;
    }

    /// Writes the body on behalf of the serialization chain without
    /// committing.
    pub fn fill_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Whether a handler already wrote the body itself.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Serializer selected for this response, stamped when an endpoint is
    /// chosen. The outermost router consults it during serialization.
    pub fn serializer(&self) -> Option<&str> {
        self.serializer.as_deref()
    }

    pub fn set_serializer(&mut self, name: impl Into<String>) {
        self.serializer = Some(name.into());
    }

    pub fn into_http(self) -> http::Response<Bytes> {
        let mut res = http::Response::new(self.body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_tracking() {
        let mut res = Response::new();
        assert!(!res.is_committed());
        res.fill_body(Bytes::from_static(b"serialized"));
        assert!(!res.is_committed());
        res.set_body(Bytes::from_static(b"raw"));
        assert!(res.is_committed());
    }

    #[test]
    fn test_into_http() {
        let mut res = Response::with_status(StatusCode::CREATED);
        res.insert_header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain"),
        );
        res.set_body(Bytes::from_static(b"done"));
        let http_res = res.into_http();
        assert_eq!(http_res.status(), StatusCode::CREATED);
        assert_eq!(
            http_res.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        assert_eq!(&http_res.body()[..], b"done");
    }
}
