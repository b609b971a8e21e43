use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use http::{header, HeaderMap, Method};
use serde_json::Value;

/// Free-form per-request mapping used to carry state between filters, hooks,
/// and endpoints. Filters and hooks read and write it; endpoints read it
/// through argument binding.
pub type Scratch = BTreeMap<String, Value>;

/// Cancellation signal a transport may raise while a request is in flight.
///
/// Cancellation observed before the endpoint runs skips the endpoint;
/// raised later it is advisory only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The router's view of one in-flight request.
///
/// The path is mutable because mount dispatch rewrites it to the unconsumed
/// suffix before delegating to a child router. Everything else parsed at
/// construction (query pairs, cookies) stays read-only.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query_raw: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
    body: Bytes,
    body_args: Option<BTreeMap<String, Value>>,
    peer_addr: Option<SocketAddr>,
    cancel: CancelToken,
    scratch: Scratch,
}

impl Request {
    /// Builds a request view from a method and a request target such as
    /// `/users/42?verbose=1`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query_raw) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (target.to_string(), String::new()),
        };
        let query = parse_query(&query_raw);
        Request {
            method,
            path,
            query_raw,
            query,
            headers: HeaderMap::new(),
            cookies: BTreeMap::new(),
            body: Bytes::new(),
            body_args: None,
            peer_addr: None,
            cancel: CancelToken::new(),
            scratch: Scratch::new(),
        }
    }

    /// Adapts a transport-level request.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let mut request = Request::new(parts.method, target);
        request.cookies = parse_cookies(&parts.headers);
        request.headers = parts.headers;
        request.body = body;
        request
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.append(name, value);
        }
        self.cookies = parse_cookies(&self.headers);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rewrites the path, used by mount dispatch to strip a prefix.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// The raw query string without the leading `?`, exactly as received.
    pub fn query_raw(&self) -> &str {
        &self.query_raw
    }

    /// Decoded query pairs in order of appearance.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Read-only cookie view parsed from the `Cookie` header(s).
    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parsed body arguments, populated by the argument binder on first use.
    pub fn body_args(&self) -> Option<&BTreeMap<String, Value>> {
        self.body_args.as_ref()
    }

    pub fn set_body_args(&mut self, args: BTreeMap<String, Value>) {
        self.body_args = Some(args);
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn set_peer_addr(&mut self, addr: SocketAddr) {
        self.peer_addr = Some(addr);
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    pub fn scratch_mut(&mut self) -> &mut Scratch {
        &mut self.scratch
    }
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}

fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();
    for header in headers.get_all(header::COOKIE) {
        let Ok(raw) = header.to_str() else {
            continue;
        };
        for cookie in cookie::Cookie::split_parse(raw.to_string()) {
            match cookie {
                Ok(cookie) => {
                    cookies
                        .entry(cookie.name().to_string())
                        .or_insert_with(|| cookie.value().to_string());
                }
                Err(err) => tracing::debug!("skipping malformed cookie: {err}"),
            }
        }
    }
    cookies
}
