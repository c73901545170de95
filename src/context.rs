use crate::collab::Collaborators;
use crate::error::HttpError;
use crate::response::{self, ResponseWriter};
use crate::router::{Find, RouteInfo, Router};
use http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use http::StatusCode;
use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The peer address of the connection a request arrived on.  The serving
/// loop inserts this into the request extensions; [`Context::real_ip`]
/// falls back to it when no forwarding header is present.
pub struct PeerAddress(pub SocketAddr);

/// The per-request context handed to handlers and middleware.
///
/// A context carries the request, the response under construction, the
/// parameters extracted by the route match, a scratch map for values
/// crossing middleware boundaries, and handles to the matched router and
/// the app's collaborators.  Contexts are pooled: each one is exclusively
/// owned by the task serving one request, reset on the way out, and
/// reused.  Handlers must not stash a context (or anything borrowed from
/// it) past their return.
///
/// # Examples
/// ```rust
/// # use vessel::*;
/// # #[tokio::main] async fn main() -> Result<(), anyhow::Error> {
/// let mut app = vessel::app();
/// app.at("/users/:id").get(sync_handler(|ctx| {
///     let id = ctx.param("id").unwrap_or("").to_owned();
///     ctx.string(http::StatusCode::OK, id)
/// }))?;
///
/// let response = app.handle(http::Request::get("/users/13").body(hyper::Body::empty())?).await;
/// assert_eq!(response.status(), http::StatusCode::OK);
/// # Ok(())
/// # }
/// ```
pub struct Context {
    request: http::Request<hyper::Body>,
    response: ResponseWriter,
    router: Option<Arc<Router>>,
    collab: Option<Arc<Collaborators>>,
    route: Option<Arc<RouteInfo>>,
    matched_host: String,
    pnames: Vec<String>,
    pvalues: Vec<String>,
    plen: usize,
    data: HashMap<String, Box<dyn Any + Send + Sync>>,
    /// First ad-hoc register slot; cheaper than the data map when only a
    /// couple of values must cross middleware boundaries.
    pub reg1: Option<Box<dyn Any + Send + Sync>>,
    /// Second ad-hoc register slot.
    pub reg2: Option<Box<dyn Any + Send + Sync>>,
    /// Third ad-hoc register slot.
    pub reg3: Option<Box<dyn Any + Send + Sync>>,
    query_cache: Option<HashMap<String, String>>,
    max_body: u64,
}

impl Context {
    /// Creates a detached context holding an empty `GET /` request.  The
    /// dispatcher binds pooled contexts to real requests; this constructor
    /// mostly serves tests of handlers and middleware.
    pub fn new() -> Self {
        Context::with_data_capacity(0)
    }

    pub(crate) fn with_data_capacity(capacity: usize) -> Self {
        Context {
            request: http::Request::new(hyper::Body::empty()),
            response: ResponseWriter::new(),
            router: None,
            collab: None,
            route: None,
            matched_host: String::new(),
            pnames: Vec::new(),
            pvalues: Vec::new(),
            plen: 0,
            data: HashMap::with_capacity(capacity),
            reg1: None,
            reg2: None,
            reg3: None,
            query_cache: None,
            max_body: 0,
        }
    }

    /// Binds the context to one request.  Parameter buffers grow to the
    /// app-wide cap once and are reused in place afterwards.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn bind_request(
        &mut self,
        request: http::Request<hyper::Body>,
        router: Arc<Router>,
        collab: Arc<Collaborators>,
        matched_host: String,
        max_body: u64,
        param_cap: usize,
    ) {
        self.request = request;
        self.router = Some(router);
        self.collab = Some(collab);
        self.matched_host = matched_host;
        self.max_body = max_body;
        if self.pnames.len() < param_cap {
            self.pnames.resize_with(param_cap, String::new);
            self.pvalues.resize_with(param_cap, String::new);
        }
    }

    /// Resolves the bound request against the bound router, recording the
    /// extracted parameters and the matched route on success.
    pub(crate) fn find_route(&mut self, strip_trailing_slash: bool) -> Find {
        let router = match self.router.clone() {
            Some(router) => router,
            None => return Find::NotFound,
        };
        let mut path = self.request.uri().path();
        if strip_trailing_slash && path.len() > 1 && path.ends_with('/') {
            path = &path[..path.len() - 1];
        }
        let result = router.find(
            path,
            self.request.method(),
            &mut self.pnames,
            &mut self.pvalues,
        );
        if let Find::Found { route, count, .. } = &result {
            self.plen = *count;
            self.route = Some(route.clone());
        }
        result
    }

    /// Restores the context for reuse: every reference slot is cleared, the
    /// scratch map is emptied in place, the response writer returns to its
    /// defaults, and the populated prefix of the parameter buffers is
    /// zeroed.
    pub(crate) fn reset(&mut self) {
        self.request = http::Request::new(hyper::Body::empty());
        self.response.reset();
        self.router = None;
        self.collab = None;
        self.route = None;
        self.matched_host.clear();
        for i in 0..self.plen {
            self.pnames[i].clear();
            self.pvalues[i].clear();
        }
        self.plen = 0;
        self.data.clear();
        self.reg1 = None;
        self.reg2 = None;
        self.reg3 = None;
        self.query_cache = None;
        self.max_body = 0;
    }

    pub(crate) fn take_response(&mut self) -> http::Response<hyper::Body> {
        self.response.take_response()
    }

    // ------------------------------------------------------------------
    // Request accessors.
    // ------------------------------------------------------------------

    /// The bound request.
    pub fn request(&self) -> &http::Request<hyper::Body> {
        &self.request
    }

    /// The bound request, mutably.
    pub fn request_mut(&mut self) -> &mut http::Request<hyper::Body> {
        &mut self.request
    }

    /// The request method.
    pub fn method(&self) -> &http::Method {
        self.request.method()
    }

    /// The request path.
    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// The request host: the `Host` header, or the URI authority for
    /// HTTP/2-style requests.  Empty if neither is present.
    pub fn host(&self) -> &str {
        self.header(http::header::HOST)
            .or_else(|| self.request.uri().authority().map(|a| a.as_str()))
            .unwrap_or("")
    }

    /// The host pattern that selected this request's router; empty when the
    /// default router served it.
    pub fn matched_host(&self) -> &str {
        &self.matched_host
    }

    /// A request header as a string, `None` if absent or not UTF-8.
    pub fn header<K: http::header::AsHeaderName>(&self, name: K) -> Option<&str> {
        self.request.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// The request scheme.  Detects termination by a fronting proxy through
    /// `X-Forwarded-Proto`, `X-Forwarded-Protocol`, `X-Url-Scheme` and
    /// `X-Forwarded-Ssl`, falling back to `http`.
    pub fn scheme(&self) -> &str {
        if self.request.uri().scheme() == Some(&http::uri::Scheme::HTTPS) {
            return "https";
        }
        for name in ["x-forwarded-proto", "x-forwarded-protocol", "x-url-scheme"] {
            if let Some(value) = self.header(name) {
                if !value.is_empty() {
                    return value;
                }
            }
        }
        if let Some(value) = self.header("x-forwarded-ssl") {
            if value.eq_ignore_ascii_case("on") {
                return "https";
            }
        }
        "http"
    }

    /// Whether the request arrived over TLS.
    pub fn is_tls(&self) -> bool {
        self.scheme() == "https"
    }

    /// The client address: the first `X-Forwarded-For` entry, then
    /// `X-Real-Ip`, then the peer address of the connection.
    pub fn real_ip(&self) -> String {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_owned();
                }
            }
        }
        if let Some(ip) = self.header("x-real-ip") {
            return ip.to_owned();
        }
        self.request
            .extensions()
            .get::<PeerAddress>()
            .map(|peer| peer.0.ip().to_string())
            .unwrap_or_default()
    }

    /// Whether the request is a WebSocket upgrade.
    pub fn is_websocket(&self) -> bool {
        let connection = self.header(http::header::CONNECTION).unwrap_or("");
        let upgrade = self.header(http::header::UPGRADE).unwrap_or("");
        connection.to_ascii_lowercase().contains("upgrade")
            && upgrade.eq_ignore_ascii_case("websocket")
    }

    /// The media types of the `Accept` header, sorted by descending `q`
    /// factor (stable for equal factors).  `*/*` maps to the empty string
    /// and `type/*` to `type/`, so a prefix check against a concrete type
    /// works uniformly.
    ///
    /// # Examples
    /// ```rust
    /// # use vessel::Context;
    /// let mut ctx = Context::new();
    /// ctx.request_mut().headers_mut().insert(
    ///     http::header::ACCEPT,
    ///     "text/html;q=0.4, application/json, */*;q=0.1".parse().unwrap(),
    /// );
    /// assert_eq!(ctx.accept(), ["application/json", "text/html", ""]);
    /// ```
    pub fn accept(&self) -> Vec<String> {
        let header = self.header(http::header::ACCEPT).unwrap_or("");
        let mut entries: Vec<(f32, usize, String)> = Vec::new();
        for (i, part) in header.split(',').enumerate() {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let mut quality = 1.0f32;
            let mut media = part;
            if let Some(semi) = part.find(';') {
                media = part[..semi].trim();
                for param in part[semi + 1..].split(';') {
                    if let Some(q) = param.trim().strip_prefix("q=") {
                        quality = q.parse().unwrap_or(0.0);
                    }
                }
            }
            let mapped = if media == "*/*" {
                String::new()
            } else if let Some(kind) = media.strip_suffix("/*") {
                format!("{}/", kind)
            } else {
                media.to_owned()
            };
            entries.push((quality, i, mapped));
        }
        entries.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        entries.into_iter().map(|(_, _, media)| media).collect()
    }

    // ------------------------------------------------------------------
    // Route parameters.
    // ------------------------------------------------------------------

    /// The value of a path parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.pnames[..self.plen]
            .iter()
            .position(|n| n == name)
            .map(|i| self.pvalues[i].as_str())
    }

    /// Every extracted parameter as a map.
    pub fn params(&self) -> HashMap<&str, &str> {
        self.pnames[..self.plen]
            .iter()
            .zip(&self.pvalues[..self.plen])
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect()
    }

    /// The extracted parameter names, in path order.
    pub fn param_names(&self) -> &[String] {
        &self.pnames[..self.plen]
    }

    /// The extracted parameter values, index-aligned with the names.
    pub fn param_values(&self) -> &[String] {
        &self.pvalues[..self.plen]
    }

    /// The matched route, if routing has happened.
    pub fn route(&self) -> Option<&RouteInfo> {
        self.route.as_deref()
    }

    /// The router serving this request's host.
    pub fn router(&self) -> Option<&Arc<Router>> {
        self.router.as_ref()
    }

    /// Generates the URL of a named route on this request's router.  See
    /// [`Router::url_for`].
    pub fn url_for(&self, name: &str, args: &[&dyn std::fmt::Display]) -> Option<String> {
        self.router.as_ref().and_then(|r| r.url_for(name, args))
    }

    // ------------------------------------------------------------------
    // Scratch storage.
    // ------------------------------------------------------------------

    /// A value from the scratch map, downcast to its concrete type.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref())
    }

    /// Stores a value in the scratch map.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Removes a value from the scratch map.
    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Any + Send + Sync>> {
        self.data.remove(key)
    }

    // ------------------------------------------------------------------
    // Query and body binding.
    // ------------------------------------------------------------------

    /// A single query parameter, parsed lazily and cached for the request.
    pub fn query_param(&mut self, name: &str) -> Option<&str> {
        if self.query_cache.is_none() {
            let query = self.request.uri().query().unwrap_or("");
            let parsed: HashMap<String, String> =
                serde_urlencoded::from_str(query).unwrap_or_default();
            self.query_cache = Some(parsed);
        }
        self.query_cache
            .as_ref()
            .and_then(|m| m.get(name))
            .map(String::as_str)
    }

    /// Binds the query string to a value.
    ///
    /// # Errors
    /// Fails when deserialization fails.
    pub fn query<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        let query = self.request.uri().query().unwrap_or("");
        Ok(serde_urlencoded::from_str(query)?)
    }

    /// Reads the whole request body, honoring the configured body size
    /// limit.
    ///
    /// # Errors
    /// Fails with a 413 [`HttpError`] when the body exceeds the limit, or
    /// when reading from the connection fails.
    pub async fn body_bytes(&mut self) -> crate::Result<Vec<u8>> {
        use futures::TryStreamExt;
        use tokio::io::AsyncReadExt;

        let body = std::mem::take(self.request.body_mut());
        let limit = if self.max_body == 0 {
            u64::MAX - 1
        } else {
            self.max_body
        };
        let mut reader = tokio_util::io::StreamReader::new(
            body.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        )
        .take(limit.saturating_add(1));
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        if buffer.len() as u64 > limit {
            return Err(HttpError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body too large",
            )
            .into());
        }
        Ok(buffer)
    }

    /// Reads the whole request body as UTF-8 text.
    pub async fn body_text(&mut self) -> crate::Result<String> {
        let bytes = self.body_bytes().await?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Binds the request body to a value, sniffing the `Content-Type`:
    /// JSON and `x-www-form-urlencoded` bodies are supported.  The
    /// configured [`crate::Defaulter`] and [`crate::Validator`] run on the
    /// bound value, in that order.
    ///
    /// # Errors
    /// Fails with a 415 [`HttpError`] for other content types, and with
    /// the underlying error when deserialization, defaulting or validation
    /// fails.
    pub async fn bind<T>(&mut self) -> crate::Result<T>
    where
        T: serde::de::DeserializeOwned + Send + Sync + 'static,
    {
        let mime: Option<mime::Mime> = self
            .header(CONTENT_TYPE)
            .and_then(|v| v.parse().ok());
        let bytes = self.body_bytes().await?;
        let mut value: T = match mime {
            Some(m) if m.type_() == mime::APPLICATION && m.subtype() == mime::JSON => {
                serde_json::from_slice(&bytes)?
            }
            Some(m) if m.type_() == mime::APPLICATION && m.subtype() == mime::WWW_FORM_URLENCODED => {
                serde_urlencoded::from_bytes(&bytes)?
            }
            _ => {
                return Err(HttpError::new(
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    "cannot bind this content type",
                )
                .into())
            }
        };
        let collab = self.collab.clone();
        if let Some(collab) = &collab {
            if let Some(defaulter) = &collab.defaulter {
                defaulter.apply(&mut value)?;
            }
            if let Some(validator) = &collab.validator {
                validator.validate(&value)?;
            }
        }
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Response helpers.
    // ------------------------------------------------------------------

    /// The response under construction.
    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }

    /// The response under construction, mutably.
    pub fn response_mut(&mut self) -> &mut ResponseWriter {
        &mut self.response
    }

    /// Sends a bodyless response with the given status.
    pub fn no_content(&mut self, status: StatusCode) -> crate::Result<()> {
        self.response.write_header(status);
        Ok(())
    }

    /// Sends raw bytes with the given content type.
    pub fn blob(
        &mut self,
        status: StatusCode,
        content_type: &str,
        body: &[u8],
    ) -> crate::Result<()> {
        self.response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
        self.response.write_header(status);
        self.response.write(body);
        Ok(())
    }

    /// Sends a plain-text body.
    pub fn string(&mut self, status: StatusCode, body: impl AsRef<str>) -> crate::Result<()> {
        self.response.content_type(&response::TEXT_PLAIN_UTF8);
        self.response.write_header(status);
        self.response.write_str(body.as_ref());
        Ok(())
    }

    /// Sends an HTML body.
    pub fn html(&mut self, status: StatusCode, body: impl AsRef<str>) -> crate::Result<()> {
        self.response.content_type(&response::TEXT_HTML_UTF8);
        self.response.write_header(status);
        self.response.write_str(body.as_ref());
        Ok(())
    }

    /// Sends a compact JSON body.
    pub fn json<T: serde::Serialize>(&mut self, status: StatusCode, value: &T) -> crate::Result<()> {
        let body = serde_json::to_vec(value)?;
        self.response.content_type(&response::APPLICATION_JSON_UTF8);
        self.response.write_header(status);
        self.response.write(&body);
        Ok(())
    }

    /// Sends a pretty-printed JSON body.
    pub fn json_pretty<T: serde::Serialize>(
        &mut self,
        status: StatusCode,
        value: &T,
    ) -> crate::Result<()> {
        let body = serde_json::to_vec_pretty(value)?;
        self.response.content_type(&response::APPLICATION_JSON_UTF8);
        self.response.write_header(status);
        self.response.write(&body);
        Ok(())
    }

    /// Sends a JSONP body: the JSON value wrapped in a call to `callback`.
    pub fn jsonp<T: serde::Serialize>(
        &mut self,
        status: StatusCode,
        callback: &str,
        value: &T,
    ) -> crate::Result<()> {
        let body = serde_json::to_vec(value)?;
        self.write_jsonp(status, callback, &body)
    }

    /// Sends a pretty-printed JSONP body.
    pub fn jsonp_pretty<T: serde::Serialize>(
        &mut self,
        status: StatusCode,
        callback: &str,
        value: &T,
    ) -> crate::Result<()> {
        let body = serde_json::to_vec_pretty(value)?;
        self.write_jsonp(status, callback, &body)
    }

    fn write_jsonp(&mut self, status: StatusCode, callback: &str, json: &[u8]) -> crate::Result<()> {
        self.response
            .content_type(&response::APPLICATION_JAVASCRIPT_UTF8);
        self.response.write_header(status);
        self.response.write_str(callback);
        self.response.write(b"(");
        self.response.write(json);
        self.response.write(b");");
        Ok(())
    }

    /// Sends an XML body, prepending the standard prolog when the body does
    /// not carry one.  Serialization is the caller's concern; the core does
    /// not bundle an XML codec.
    pub fn xml(&mut self, status: StatusCode, body: impl AsRef<str>) -> crate::Result<()> {
        let body = body.as_ref();
        self.response.content_type(&response::APPLICATION_XML_UTF8);
        self.response.write_header(status);
        if !body.starts_with("<?xml") {
            self.response
                .write_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        }
        self.response.write_str(body);
        Ok(())
    }

    /// Streams a reader as the response body.
    pub fn stream<R>(
        &mut self,
        status: StatusCode,
        content_type: &str,
        reader: R,
    ) -> crate::Result<()>
    where
        R: tokio::io::AsyncRead + Send + 'static,
    {
        self.response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
        self.response.write_header(status);
        self.response
            .set_stream(hyper::Body::wrap_stream(ReaderStream::new(reader)));
        Ok(())
    }

    /// Serves a file.  Directories are served through their `index.html`;
    /// a missing file produces a plain 404.
    pub async fn file<P: AsRef<Path>>(&mut self, path: P) -> crate::Result<()> {
        self.send_file(path.as_ref()).await
    }

    /// Serves a file as a download with the given file name.
    pub async fn attachment<P: AsRef<Path>>(&mut self, path: P, name: &str) -> crate::Result<()> {
        let disposition = format!("attachment; filename=\"{}\"", name);
        self.response
            .headers_mut()
            .insert(CONTENT_DISPOSITION, HeaderValue::from_str(&disposition)?);
        self.send_file(path.as_ref()).await
    }

    /// Serves a file for inline display with the given file name.
    pub async fn inline<P: AsRef<Path>>(&mut self, path: P, name: &str) -> crate::Result<()> {
        let disposition = format!("inline; filename=\"{}\"", name);
        self.response
            .headers_mut()
            .insert(CONTENT_DISPOSITION, HeaderValue::from_str(&disposition)?);
        self.send_file(path.as_ref()).await
    }

    async fn send_file(&mut self, path: &Path) -> crate::Result<()> {
        let mut path = path.to_path_buf();
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.response.write_header(StatusCode::NOT_FOUND);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            path.push("index.html");
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                self.response.write_header(StatusCode::NOT_FOUND);
                return Ok(());
            }
        }

        let file = tokio::fs::File::open(&path).await?;
        match mime_guess::MimeGuess::from_path(&path).first() {
            Some(mime_type) => {
                self.response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_str(mime_type.as_ref())?);
            }
            None => {
                self.response
                    .headers_mut()
                    .insert(CONTENT_TYPE, response::APPLICATION_OCTET_STREAM.clone());
            }
        }
        self.response.write_header(StatusCode::OK);
        self.response
            .set_stream(hyper::Body::wrap_stream(ReaderStream::new(file)));
        Ok(())
    }

    /// Redirects to `location`.  Only status codes within `300..=308` are
    /// accepted.
    ///
    /// # Errors
    /// Fails with a structured error for a status outside the redirect
    /// range, or when the location is not a valid header value.
    pub fn redirect(&mut self, status: StatusCode, location: &str) -> crate::Result<()> {
        if status.as_u16() < 300 || status.as_u16() > 308 {
            return Err(HttpError::internal_server_error(format!(
                "{} is not a redirect status",
                status
            ))
            .into());
        }
        self.response
            .headers_mut()
            .insert(http::header::LOCATION, HeaderValue::from_str(location)?);
        self.response.write_header(status);
        Ok(())
    }

    /// Renders a template through the configured [`crate::Renderer`].
    ///
    /// # Errors
    /// Fails when no renderer is configured, or when rendering fails.
    pub fn render(
        &mut self,
        name: &str,
        status: StatusCode,
        data: &serde_json::Value,
    ) -> crate::Result<()> {
        let collab = self
            .collab
            .clone()
            .ok_or_else(|| anyhow::anyhow!("context is not bound to an app"))?;
        let renderer = collab
            .renderer
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no renderer is configured"))?;
        renderer.render(&mut self.response, name, status, data)
    }

    // ------------------------------------------------------------------
    // Session passthroughs.
    // ------------------------------------------------------------------

    /// Loads a session from the configured [`crate::SessionStore`].
    ///
    /// # Errors
    /// Fails when no store is configured or the id is empty.
    pub fn session(&self, id: &str) -> crate::Result<Option<serde_json::Value>> {
        self.session_store(id)?.get(id)
    }

    /// Stores a session in the configured [`crate::SessionStore`].
    pub fn set_session(&self, id: &str, value: serde_json::Value) -> crate::Result<()> {
        self.session_store(id)?.set(id, value)
    }

    /// Deletes a session from the configured [`crate::SessionStore`].
    pub fn delete_session(&self, id: &str) -> crate::Result<()> {
        self.session_store(id)?.delete(id)
    }

    fn session_store(&self, id: &str) -> crate::Result<&dyn crate::SessionStore> {
        if id.is_empty() {
            return Err(anyhow::anyhow!("the empty session id is reserved"));
        }
        self.collab
            .as_ref()
            .and_then(|c| c.session.as_deref())
            .ok_or_else(|| anyhow::anyhow!("no session store is configured"))
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("matched_host", &self.matched_host)
            .field("route", &self.route)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_request(request: http::request::Builder) -> Context {
        let mut ctx = Context::new();
        ctx.request = request.body(hyper::Body::empty()).unwrap();
        ctx
    }

    #[test]
    fn scheme_detection() {
        let ctx = with_request(http::Request::get("/"));
        assert_eq!(ctx.scheme(), "http");
        assert!(!ctx.is_tls());

        let ctx = with_request(http::Request::get("/").header("x-forwarded-proto", "https"));
        assert_eq!(ctx.scheme(), "https");
        assert!(ctx.is_tls());

        let ctx = with_request(http::Request::get("/").header("x-forwarded-ssl", "on"));
        assert_eq!(ctx.scheme(), "https");

        let ctx = with_request(http::Request::get("https://example.com/"));
        assert_eq!(ctx.scheme(), "https");
    }

    #[test]
    fn real_ip_prefers_forwarded_for() {
        let ctx = with_request(
            http::Request::get("/")
                .header("x-forwarded-for", "10.1.2.3, 10.9.9.9")
                .header("x-real-ip", "10.4.5.6"),
        );
        assert_eq!(ctx.real_ip(), "10.1.2.3");

        let ctx = with_request(http::Request::get("/").header("x-real-ip", "10.4.5.6"));
        assert_eq!(ctx.real_ip(), "10.4.5.6");

        let mut ctx = with_request(http::Request::get("/"));
        ctx.request_mut()
            .extensions_mut()
            .insert(PeerAddress("10.0.0.7:9999".parse().unwrap()));
        assert_eq!(ctx.real_ip(), "10.0.0.7");
    }

    #[test]
    fn websocket_detection() {
        let ctx = with_request(
            http::Request::get("/")
                .header(http::header::CONNECTION, "keep-alive, Upgrade")
                .header(http::header::UPGRADE, "websocket"),
        );
        assert!(ctx.is_websocket());

        let ctx = with_request(http::Request::get("/").header(http::header::UPGRADE, "websocket"));
        assert!(!ctx.is_websocket());
    }

    #[test]
    fn accept_sorts_by_quality() {
        let ctx = with_request(http::Request::get("/").header(
            http::header::ACCEPT,
            "text/*;q=0.5, application/json, */*;q=0.1, text/html;q=0.5",
        ));
        assert_eq!(ctx.accept(), ["application/json", "text/", "text/html", ""]);
    }

    #[test]
    fn host_comes_from_header() {
        let ctx = with_request(http::Request::get("/").header(http::header::HOST, "example.com"));
        assert_eq!(ctx.host(), "example.com");
        let ctx = with_request(http::Request::get("/"));
        assert_eq!(ctx.host(), "");
    }

    #[test]
    fn scratch_map_and_registers() {
        let mut ctx = Context::new();
        ctx.set("number", 7u32);
        assert_eq!(ctx.get::<u32>("number"), Some(&7));
        assert_eq!(ctx.get::<String>("number"), None);
        assert!(ctx.remove("number").is_some());
        assert_eq!(ctx.get::<u32>("number"), None);

        ctx.reg1 = Some(Box::new("tag"));
        assert!(ctx.reg1.is_some());
    }

    #[test]
    fn query_binding() {
        #[derive(serde::Deserialize)]
        struct Page {
            page: u32,
            size: u32,
        }

        let mut ctx = with_request(http::Request::get("/list?page=3&size=20"));
        let page: Page = ctx.query().unwrap();
        assert_eq!(page.page, 3);
        assert_eq!(page.size, 20);
        assert_eq!(ctx.query_param("page"), Some("3"));
        assert_eq!(ctx.query_param("missing"), None);
    }

    #[tokio::test]
    async fn bind_json_body() {
        #[derive(serde::Deserialize)]
        struct Login {
            user: String,
        }

        let mut ctx = Context::new();
        ctx.request = http::Request::post("/login")
            .header(CONTENT_TYPE, "application/json")
            .body(hyper::Body::from(r#"{"user":"ferris"}"#))
            .unwrap();
        let login: Login = ctx.bind().await.unwrap();
        assert_eq!(login.user, "ferris");
    }

    #[tokio::test]
    async fn bind_form_body() {
        #[derive(serde::Deserialize)]
        struct Login {
            user: String,
        }

        let mut ctx = Context::new();
        ctx.request = http::Request::post("/login")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(hyper::Body::from("user=ferris"))
            .unwrap();
        let login: Login = ctx.bind().await.unwrap();
        assert_eq!(login.user, "ferris");
    }

    #[tokio::test]
    async fn bind_rejects_unknown_content_type() {
        let mut ctx = Context::new();
        ctx.request = http::Request::post("/login")
            .header(CONTENT_TYPE, "text/csv")
            .body(hyper::Body::from("a,b"))
            .unwrap();
        let err = ctx.bind::<serde_json::Value>().await.unwrap_err();
        let http = err.downcast_ref::<HttpError>().unwrap();
        assert_eq!(http.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn body_limit_is_enforced() {
        let mut ctx = Context::new();
        ctx.max_body = 4;
        ctx.request = http::Request::post("/")
            .body(hyper::Body::from("0123456789"))
            .unwrap();
        let err = ctx.body_bytes().await.unwrap_err();
        let http = err.downcast_ref::<HttpError>().unwrap();
        assert_eq!(http.status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn string_sets_content_type_and_counts() {
        let mut ctx = Context::new();
        ctx.string(StatusCode::OK, "hello").unwrap();
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(ctx.response().bytes_written(), 5);
        assert_eq!(
            ctx.response().headers()[CONTENT_TYPE],
            "text/plain; charset=UTF-8"
        );
    }

    #[test]
    fn json_and_jsonp() {
        let mut ctx = Context::new();
        ctx.json(StatusCode::OK, &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(
            ctx.response().headers()[CONTENT_TYPE],
            "application/json; charset=UTF-8"
        );

        let mut ctx = Context::new();
        ctx.jsonp(StatusCode::OK, "cb", &serde_json::json!(1)).unwrap();
        let response = ctx.take_response();
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "application/javascript; charset=UTF-8"
        );
    }

    #[test]
    fn xml_prepends_prolog_once() {
        let mut ctx = Context::new();
        ctx.xml(StatusCode::OK, "<a/>").unwrap();
        assert_eq!(
            ctx.response().bytes_written(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a/>".len() as u64
        );

        let mut ctx = Context::new();
        ctx.xml(StatusCode::OK, "<?xml version=\"1.0\"?><a/>").unwrap();
        assert_eq!(
            ctx.response().bytes_written(),
            "<?xml version=\"1.0\"?><a/>".len() as u64
        );
    }

    #[test]
    fn redirect_range_is_enforced() {
        let mut ctx = Context::new();
        ctx.redirect(StatusCode::SEE_OTHER, "/elsewhere").unwrap();
        assert_eq!(ctx.response().status(), StatusCode::SEE_OTHER);
        assert_eq!(ctx.response().headers()[http::header::LOCATION], "/elsewhere");

        let mut ctx = Context::new();
        assert!(ctx.redirect(StatusCode::OK, "/nope").is_err());
        assert!(ctx.redirect(StatusCode::NOT_FOUND, "/nope").is_err());
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let mut ctx = Context::new();
        ctx.file("/definitely/not/here.txt").await.unwrap();
        assert_eq!(ctx.response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn extensionless_file_falls_back_to_octet_stream() {
        let path = std::env::temp_dir().join("vessel-extensionless-body");
        tokio::fs::write(&path, b"raw bytes").await.unwrap();

        let mut ctx = Context::new();
        ctx.file(&path).await.unwrap();
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(
            ctx.response().headers()[CONTENT_TYPE],
            "application/octet-stream"
        );
    }

    #[test]
    fn session_requires_store_and_id() {
        let ctx = Context::new();
        assert!(ctx.session("sid").is_err());
        assert!(ctx.session("").is_err());
    }

    #[test]
    fn reset_clears_everything() {
        let mut ctx = Context::new();
        ctx.request = http::Request::post("/x?q=1")
            .body(hyper::Body::empty())
            .unwrap();
        ctx.pnames = vec!["id".to_owned(), String::new()];
        ctx.pvalues = vec!["42".to_owned(), String::new()];
        ctx.plen = 1;
        ctx.set("k", 1u8);
        ctx.reg2 = Some(Box::new(2u8));
        ctx.string(StatusCode::CREATED, "x").unwrap();
        ctx.query_param("q");

        ctx.reset();
        assert_eq!(ctx.method(), http::Method::GET);
        assert_eq!(ctx.param("id"), None);
        assert!(ctx.params().is_empty());
        assert!(ctx.get::<u8>("k").is_none());
        assert!(ctx.reg2.is_none());
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert!(!ctx.response().wrote());
        assert!(ctx.query_cache.is_none());
        // The buffers survive, zeroed where they were populated.
        assert_eq!(ctx.pnames.len(), 2);
        assert_eq!(ctx.pnames[0], "");
        assert_eq!(ctx.pvalues[0], "");
    }
}
