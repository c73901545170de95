use crate::collab::{Collaborators, Defaulter, Renderer, SessionStore, Validator};
use crate::context::{Context, PeerAddress};
use crate::error::{HttpError, RouteError, ServeError};
use crate::handler::{fold, sync_handler, ArcHandler, Handler, Middleware};
use crate::host::HostManager;
use crate::pool::Pool;
use crate::router::{Find, RouteDescriptor, Router};
use http::header::HeaderValue;
use http::{Method, StatusCode};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

/// The mutable route description passed through the registration hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    /// The host pattern; empty for the default router.
    pub host: String,
    /// The route name; empty for unnamed routes.
    pub name: String,
    /// The method; `None` registers for all methods.
    pub method: Option<Method>,
    /// The path pattern.
    pub path: String,
}

type RouteFilter = Box<dyn Fn(&RouteSpec) -> bool + Send + Sync>;
type RouteModifier = Box<dyn Fn(RouteSpec) -> RouteSpec + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&mut Context, anyhow::Error) + Send + Sync>;

/// An HTTP application: per-host routers behind a host matcher, a pooled
/// request context, and a two-band middleware pipeline, served over hyper.
///
/// Configuration and registration take `&mut self`; serving takes `&self`
/// (or an `Arc<App>` through [`App::listen`]).  The routing tables are
/// immutable once serving starts.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main] async fn main() -> Result<(), anyhow::Error> {
/// let mut app = vessel::app();
/// app.at("/hello/:name").get(vessel::sync_handler(|ctx| {
///     let name = ctx.param("name").unwrap_or("world").to_owned();
///     ctx.string(http::StatusCode::OK, format!("hello, {}", name))
/// }))?;
/// app.listen("0.0.0.0:8080").await?;
/// # Ok(())
/// # }
/// ```
pub struct App {
    prefix: String,
    max_body_size: u64,
    max_url_param_num: usize,
    middleware_max_num: usize,
    ctx_data_size: usize,
    keep_trailing_slash_path: bool,

    default_router: Arc<Router>,
    hosts: HostManager<Arc<Router>>,

    pre_band: Vec<Arc<dyn Middleware>>,
    use_band: Vec<Arc<dyn Middleware>>,
    pre_chain: ArcHandler,

    not_found: ArcHandler,
    method_not_allowed: ArcHandler,
    options: ArcHandler,
    error_handler: ErrorHandler,

    route_filter: Option<RouteFilter>,
    route_modifier: Option<RouteModifier>,

    collab: Arc<Collaborators>,
    ctx_pool: Pool<Context>,
    max_params_seen: usize,
    terminate: Option<watch::Receiver<bool>>,
}

impl App {
    /// Creates an app with the default configuration: no prefix, unlimited
    /// body size, at most 4 path parameters per route, middleware chains
    /// capped at 256, and trailing slashes stripped.
    pub fn new() -> Self {
        let max_url_param_num = 4;
        let mut app = App {
            prefix: String::new(),
            max_body_size: 0,
            max_url_param_num,
            middleware_max_num: 256,
            ctx_data_size: 0,
            keep_trailing_slash_path: false,
            default_router: Arc::new(Router::new(max_url_param_num)),
            hosts: HostManager::new(),
            pre_band: Vec::new(),
            use_band: Vec::new(),
            pre_chain: Arc::new(sync_handler(|_| Ok(()))),
            not_found: default_not_found(),
            method_not_allowed: default_method_not_allowed(),
            options: default_options(),
            error_handler: Arc::new(default_error_handler),
            route_filter: None,
            route_modifier: None,
            collab: Arc::new(Collaborators::default()),
            ctx_pool: Pool::new(),
            max_params_seen: 0,
            terminate: None,
        };
        app.rebuild_pre();
        app
    }

    // ------------------------------------------------------------------
    // Configuration.
    // ------------------------------------------------------------------

    /// Prepends `prefix` to every path registered through [`App::at`].
    pub fn with_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.prefix = prefix.into();
        self
    }

    /// Rejects requests whose `Content-Length` exceeds `bytes` with a 413.
    /// Zero (the default) means unlimited.
    pub fn with_max_body_size(&mut self, bytes: u64) -> &mut Self {
        self.max_body_size = bytes;
        self
    }

    /// Caps the number of path parameters a single route may declare.
    pub fn with_max_url_param_num(&mut self, max: usize) -> &mut Self {
        self.max_url_param_num = max;
        if let Some(router) = Arc::get_mut(&mut self.default_router) {
            router.set_max_params(max);
        }
        for router in self.hosts.values_mut() {
            if let Some(router) = Arc::get_mut(router) {
                router.set_max_params(max);
            }
        }
        self
    }

    /// Caps the length of any middleware chain.
    pub fn with_middleware_max_num(&mut self, max: usize) -> &mut Self {
        self.middleware_max_num = max;
        self
    }

    /// Pre-allocates the context scratch map for `size` entries.
    pub fn with_ctx_data_size(&mut self, size: usize) -> &mut Self {
        self.ctx_data_size = size;
        self
    }

    /// Keeps trailing slashes significant.  By default a trailing `/` is
    /// stripped on registration, deletion and matching, so `/foo/` and
    /// `/foo` refer to the same route.
    pub fn keep_trailing_slash(&mut self, keep: bool) -> &mut Self {
        self.keep_trailing_slash_path = keep;
        self.rebuild_pre();
        self
    }

    /// Replaces the not-found sink.
    pub fn with_not_found_handler<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.not_found = Arc::new(handler);
        self.rebuild_pre();
        self
    }

    /// Replaces the method-not-allowed sink.  The dispatcher sets the
    /// `Allow` header before invoking it.
    pub fn with_method_not_allowed_handler<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.method_not_allowed = Arc::new(handler);
        self.rebuild_pre();
        self
    }

    /// Replaces the synthesized-OPTIONS sink.  The dispatcher sets the
    /// `Allow` header before invoking it.
    pub fn with_options_handler<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.options = Arc::new(handler);
        self.rebuild_pre();
        self
    }

    /// Replaces the error sink.  The skip sentinel never reaches it.
    pub fn with_error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut Context, anyhow::Error) + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Installs a registration filter: returning `true` drops the route
    /// silently.
    pub fn with_route_filter<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(&RouteSpec) -> bool + Send + Sync + 'static,
    {
        self.route_filter = Some(Box::new(filter));
        self
    }

    /// Installs a registration rewriter, applied before validation.
    pub fn with_route_modifier<F>(&mut self, modifier: F) -> &mut Self
    where
        F: Fn(RouteSpec) -> RouteSpec + Send + Sync + 'static,
    {
        self.route_modifier = Some(Box::new(modifier));
        self
    }

    /// Configures the template renderer reachable through
    /// [`Context::render`].
    pub fn with_renderer<R: Renderer>(&mut self, renderer: R) -> &mut Self {
        self.collab_mut().renderer = Some(Box::new(renderer));
        self
    }

    /// Configures the session store reachable through the context's session
    /// passthroughs.
    pub fn with_session_store<S: SessionStore>(&mut self, store: S) -> &mut Self {
        self.collab_mut().session = Some(Box::new(store));
        self
    }

    /// Configures the validator run by [`Context::bind`].
    pub fn with_validator<V: Validator>(&mut self, validator: V) -> &mut Self {
        self.collab_mut().validator = Some(Box::new(validator));
        self
    }

    /// Configures the defaulter run by [`Context::bind`].
    pub fn with_defaulter<D: Defaulter>(&mut self, defaulter: D) -> &mut Self {
        self.collab_mut().defaulter = Some(Box::new(defaulter));
        self
    }

    fn collab_mut(&mut self) -> &mut Collaborators {
        // Contexts drop their clone on reset, and `&mut self` rules out
        // in-flight requests, so the Arc is never shared here.
        Arc::get_mut(&mut self.collab).expect("collaborators shared during configuration")
    }

    // ------------------------------------------------------------------
    // Middleware bands.
    // ------------------------------------------------------------------

    /// Appends a middleware to the pre-routing band.  The band is folded
    /// into a single handler on every append; its innermost step performs
    /// the routing.
    pub fn pre_use<M: Middleware>(&mut self, middleware: M) -> Result<&mut Self, RouteError> {
        if self.pre_band.len() >= self.middleware_max_num {
            return Err(RouteError::TooManyMiddlewares {
                count: self.pre_band.len(),
                max: self.middleware_max_num,
            });
        }
        self.pre_band.push(Arc::new(middleware));
        self.rebuild_pre();
        Ok(self)
    }

    /// Appends a middleware to the normal band.  The band wraps the route
    /// handler of every route added afterwards; the fold happens at
    /// route-add time, so dispatch pays no composition cost.
    pub fn with<M: Middleware>(&mut self, middleware: M) -> Result<&mut Self, RouteError> {
        if self.use_band.len() >= self.middleware_max_num {
            return Err(RouteError::TooManyMiddlewares {
                count: self.use_band.len(),
                max: self.middleware_max_num,
            });
        }
        self.use_band.push(Arc::new(middleware));
        Ok(self)
    }

    fn rebuild_pre(&mut self) {
        let step: ArcHandler = Arc::new(RouteStep {
            strip_slash: !self.keep_trailing_slash_path,
            not_found: self.not_found.clone(),
            method_not_allowed: self.method_not_allowed.clone(),
            options: self.options.clone(),
        });
        self.pre_chain = fold(&self.pre_band, step);
    }

    // ------------------------------------------------------------------
    // Registration.
    // ------------------------------------------------------------------

    /// Starts a route registration at `path` (with the configured prefix
    /// prepended).
    ///
    /// # Examples
    /// ```rust
    /// let mut app = vessel::app();
    /// app.at("/users/:id")
    ///     .name("user")
    ///     .get(vessel::sync_handler(|ctx| {
    ///         let id = ctx.param("id").unwrap_or("").to_owned();
    ///         ctx.string(http::StatusCode::OK, id)
    ///     }))
    ///     .unwrap();
    /// ```
    pub fn at<P: AsRef<str>>(&mut self, path: P) -> RouteBuilder<'_> {
        let path = prefixed(&self.prefix, path.as_ref());
        RouteBuilder {
            app: self,
            host: String::new(),
            name: String::new(),
            path,
            middleware: Vec::new(),
        }
    }

    /// Registers one route: the core behind [`App::at`].
    ///
    /// The method is upper-cased, the configured route modifier and filter
    /// run (a filtered route is dropped silently), the path is validated,
    /// the host router is created lazily, and the handler is wrapped in the
    /// normal middleware band before the trie stores it.
    pub fn add_route(&mut self, spec: RouteSpec, handler: ArcHandler) -> Result<(), RouteError> {
        let mut spec = spec;
        spec.method = spec.method.map(normalize_method);
        if let Some(modifier) = &self.route_modifier {
            spec = modifier(spec);
        }
        if let Some(filter) = &self.route_filter {
            if filter(&spec) {
                log::debug!("route {} {:?} dropped by filter", method_label(&spec.method), spec.path);
                return Ok(());
            }
        }

        let path = self.normalize_path(&spec.path);
        let handler = if self.use_band.is_empty() {
            handler
        } else {
            fold(&self.use_band, handler)
        };

        let router = self.router_mut(&spec.host)?;
        let count = router.add(&spec.name, spec.method, &path, handler)?;
        if count > self.max_params_seen {
            self.max_params_seen = count;
        }
        Ok(())
    }

    /// Deletes `(path, method)` from the router of `host`; `method == None`
    /// drops every method at the path.  Returns whether anything was
    /// removed.
    pub fn delete_route(
        &mut self,
        host: &str,
        path: &str,
        method: Option<&Method>,
    ) -> Result<bool, RouteError> {
        let path = self.normalize_path(path);
        let router = if host.is_empty() {
            Some(&mut self.default_router)
        } else {
            self.hosts.pattern_mut(host)
        };
        match router {
            Some(router) => {
                let router = Arc::get_mut(router).ok_or(RouteError::Frozen)?;
                Ok(router.delete(&path, method))
            }
            None => Ok(false),
        }
    }

    /// Every registered route across every host.  The order across hosts is
    /// unspecified; within a host it is stable for a fixed configuration.
    pub fn routes(&self) -> Vec<RouteDescriptor> {
        let mut out = self.default_router.descriptors("");
        for (pattern, router) in self.hosts.iter() {
            out.extend(router.descriptors(pattern));
        }
        out
    }

    /// Generates the URL of a route named on the default router.  See
    /// [`Router::url_for`].
    pub fn url_for(&self, name: &str, args: &[&dyn std::fmt::Display]) -> Option<String> {
        self.default_router.url_for(name, args)
    }

    fn normalize_path(&self, path: &str) -> String {
        let mut path = path.to_owned();
        if !self.keep_trailing_slash_path && path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        path
    }

    fn router_mut(&mut self, host: &str) -> Result<&mut Router, RouteError> {
        let max_params = self.max_url_param_num;
        let arc = if host.is_empty() {
            &mut self.default_router
        } else {
            self.hosts
                .entry(host, || Arc::new(Router::new(max_params)))?
        };
        Arc::get_mut(arc).ok_or(RouteError::Frozen)
    }

    // ------------------------------------------------------------------
    // Dispatch.
    // ------------------------------------------------------------------

    /// Serves one request through the full pipeline.  This is what the
    /// listener calls per request, and the direct entry point for tests.
    pub async fn handle(&self, request: http::Request<hyper::Body>) -> http::Response<hyper::Body> {
        if self.max_body_size > 0 {
            let length = request
                .headers()
                .get(http::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            if let Some(length) = length {
                if length > self.max_body_size {
                    let mut response = http::Response::new(hyper::Body::empty());
                    *response.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
                    return response;
                }
            }
        }

        let host = request
            .headers()
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| request.uri().authority().map(|a| a.as_str()))
            .unwrap_or("");
        let (matched, router) = if !host.is_empty() && !self.hosts.is_empty() {
            match self.hosts.find_entry(host) {
                Some((pattern, router)) => (pattern.to_owned(), router.clone()),
                None => (String::new(), self.default_router.clone()),
            }
        } else {
            (String::new(), self.default_router.clone())
        };

        let mut ctx = self
            .ctx_pool
            .get(|| Context::with_data_capacity(self.ctx_data_size));
        ctx.bind_request(
            request,
            router,
            self.collab.clone(),
            matched,
            self.max_body_size,
            self.max_params_seen,
        );

        if let Err(error) = self.pre_chain.call(&mut ctx).await {
            if !crate::is_skip(&error) {
                (self.error_handler)(&mut ctx, error);
            }
        }

        let response = ctx.take_response();
        ctx.reset();
        self.ctx_pool.put(ctx);
        response
    }

    // ------------------------------------------------------------------
    // Serving.
    // ------------------------------------------------------------------

    /// A channel to signal termination.  By default the listener never
    /// stops; sending `true` through the returned sender shuts it down
    /// gracefully, letting in-flight requests finish.
    pub fn termination_signal(&mut self) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        self.terminate = Some(rx);
        tx
    }

    /// Binds `address` and serves until terminated.
    ///
    /// # Errors
    /// This can fail if the address is invalid, or if the socket is already
    /// in use.
    pub async fn listen(mut self, address: &str) -> Result<(), ServeError> {
        let address: SocketAddr = address
            .parse()
            .map_err(|_| ServeError::InvalidAddress(address.to_owned()))?;

        log::info!("listen({})", address);

        if log::log_enabled!(log::Level::Trace) {
            for route in self.routes() {
                log::trace!(
                    "route: {} {} (host {:?}, name {:?})",
                    route.method.as_ref().map_or("(all)", Method::as_str),
                    route.path,
                    route.host,
                    route.name
                );
            }
        }

        let termination = self.terminate.take();
        let termination = async {
            match termination {
                Some(mut rx) => loop {
                    if *rx.borrow() {
                        break;
                    }
                    match rx.changed().await {
                        Ok(_) => continue,
                        Err(_) => futures::future::pending().await,
                    }
                },
                None => futures::future::pending().await,
            }
        };

        let this = Arc::new(self);

        hyper::server::Server::bind(&address)
            .serve(hyper::service::make_service_fn(
                |conn: &hyper::server::conn::AddrStream| {
                    let app = this.clone();
                    let service = AppService(app, conn.remote_addr());
                    async move { Ok::<_, std::convert::Infallible>(service) }
                },
            ))
            .with_graceful_shutdown(termination)
            .await
            .map_err(ServeError::Hyper)?;

        Ok(())
    }
}

impl Default for App {
    fn default() -> Self {
        App::new()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("prefix", &self.prefix)
            .field("default_router", &self.default_router)
            .field("hosts", &self.hosts)
            .field("pre_band", &self.pre_band.len())
            .field("use_band", &self.use_band.len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct AppService(Arc<App>, SocketAddr);

type ServiceFuture<R, E> = Pin<Box<dyn Future<Output = Result<R, E>> + Send + 'static>>;

impl tower::Service<hyper::Request<hyper::Body>> for AppService {
    type Response = hyper::Response<hyper::Body>;
    type Error = std::convert::Infallible;
    type Future = ServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: hyper::Request<hyper::Body>) -> Self::Future {
        let app = self.0.clone();
        request.extensions_mut().insert(PeerAddress(self.1));
        Box::pin(async move { Ok(app.handle(request).await) })
    }
}

/// The innermost step of the pre-routing band: resolves the route and
/// synthesizes OPTIONS and 405 responses.
struct RouteStep {
    strip_slash: bool,
    not_found: ArcHandler,
    method_not_allowed: ArcHandler,
    options: ArcHandler,
}

#[async_trait]
impl Handler for RouteStep {
    async fn call(&self, ctx: &mut Context) -> crate::Result<()> {
        // `OPTIONS *` asks about the server as a whole: answer with every
        // method registered anywhere on this host's router.
        if ctx.method() == Method::OPTIONS && ctx.path() == "*" {
            let methods = ctx
                .router()
                .map(|r| r.all_methods())
                .unwrap_or_default();
            set_allow(ctx, &methods, true);
            return self.options.call(ctx).await;
        }

        match ctx.find_route(self.strip_slash) {
            Find::Found { handler, .. } => handler.call(ctx).await,
            Find::MethodNotAllowed { allowed } => {
                if ctx.method() == Method::OPTIONS {
                    set_allow(ctx, &allowed, true);
                    self.options.call(ctx).await
                } else {
                    set_allow(ctx, &allowed, false);
                    self.method_not_allowed.call(ctx).await
                }
            }
            Find::NotFound => self.not_found.call(ctx).await,
        }
    }
}

fn set_allow(ctx: &mut Context, methods: &[Method], include_options: bool) {
    let mut names: Vec<&str> = methods.iter().map(Method::as_str).collect();
    if include_options && !names.contains(&"OPTIONS") {
        names.push("OPTIONS");
    }
    if let Ok(value) = HeaderValue::from_str(&names.join(", ")) {
        ctx.response_mut()
            .headers_mut()
            .insert(http::header::ALLOW, value);
    }
}

fn default_not_found() -> ArcHandler {
    Arc::new(sync_handler(|_| Err(HttpError::not_found().into())))
}

fn default_method_not_allowed() -> ArcHandler {
    Arc::new(sync_handler(|ctx| {
        ctx.no_content(StatusCode::METHOD_NOT_ALLOWED)
    }))
}

fn default_options() -> ArcHandler {
    Arc::new(sync_handler(|ctx| ctx.no_content(StatusCode::OK)))
}

fn default_error_handler(ctx: &mut Context, error: anyhow::Error) {
    if ctx.response().wrote() {
        log::error!("request error after response started: {}", error);
        log::trace!("request.error.debug: {:?}", error);
        return;
    }
    match error.downcast_ref::<HttpError>() {
        Some(http_error) => {
            let content_type = http_error
                .content_type
                .unwrap_or("text/plain; charset=UTF-8");
            let message = http_error.message.clone();
            if ctx
                .blob(http_error.status, content_type, message.as_bytes())
                .is_err()
            {
                let _ = ctx.no_content(http_error.status);
            }
        }
        None => {
            log::error!("request.error: {}", error);
            log::trace!("request.error.debug: {:?}", error);
            let _ = ctx.no_content(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}

fn normalize_method(method: Method) -> Method {
    let name = method.as_str();
    if name.bytes().any(|b| b.is_ascii_lowercase()) {
        let upper = name.to_ascii_uppercase();
        Method::from_bytes(upper.as_bytes()).unwrap_or(method)
    } else {
        method
    }
}

fn method_label(method: &Option<Method>) -> &str {
    method.as_ref().map_or("*", Method::as_str)
}

/// Joins the configured prefix with a registered path, normalizing the seam
/// to exactly one `/`.  With no prefix the result stays rooted at `/`.
fn prefixed(prefix: &str, path: &str) -> String {
    let head = prefix.strip_suffix('/').unwrap_or(prefix);
    let tail = path.strip_prefix('/').unwrap_or(path);
    format!("{}/{}", head, tail)
}

/// A route registration in progress, created by [`App::at`].
///
/// The builder carries the path, an optional host and name, and any
/// per-route middleware, and registers one route per method call:
///
/// ```rust
/// # use vessel::*;
/// # fn endpoint() -> impl vessel::Handler {
/// #     sync_handler(|ctx| ctx.no_content(http::StatusCode::NO_CONTENT))
/// # }
/// let mut app = vessel::app();
/// app.at("/users/:id")
///     .get(endpoint())
///     .unwrap()
///     .post(endpoint())
///     .unwrap();
/// app.at("/admin")
///     .host("admin.example.com")
///     .get(endpoint())
///     .unwrap();
/// ```
pub struct RouteBuilder<'a> {
    app: &'a mut App,
    host: String,
    name: String,
    path: String,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for RouteBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteBuilder")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

macro_rules! method {
    ($($(#[$m:meta])* $v:vis fn $n:ident = $meth:expr;)+) => {
        $(
            $(#[$m])* $v fn $n<H: Handler>(&mut self, handler: H) -> Result<&mut Self, RouteError> {
                self.method($meth, handler)
            }
        )+
    };
}

impl<'a> RouteBuilder<'a> {
    /// Registers the route under this host pattern instead of the default
    /// router.
    pub fn host<H: Into<String>>(mut self, host: H) -> Self {
        self.host = host.into();
        self
    }

    /// Names the route for reverse URL generation.  A non-empty name must
    /// be unique per host.
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Appends a middleware that wraps only the routes registered through
    /// this builder.
    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Registers an endpoint answering every method at this path.
    pub fn all<H: Handler>(&mut self, handler: H) -> Result<&mut Self, RouteError> {
        self.register(None, Arc::new(handler))
    }

    /// Registers an endpoint for the given method at this path.
    pub fn method<H: Handler>(
        &mut self,
        method: Method,
        handler: H,
    ) -> Result<&mut Self, RouteError> {
        self.register(Some(method), Arc::new(handler))
    }

    method![
        /// Registers a GET endpoint at this path.
        pub fn get = Method::GET;
        /// Registers a POST endpoint at this path.
        pub fn post = Method::POST;
        /// Registers a PUT endpoint at this path.
        pub fn put = Method::PUT;
        /// Registers a DELETE endpoint at this path.
        pub fn delete = Method::DELETE;
        /// Registers a HEAD endpoint at this path.
        pub fn head = Method::HEAD;
        /// Registers an OPTIONS endpoint at this path.
        pub fn options = Method::OPTIONS;
        /// Registers a TRACE endpoint at this path.
        pub fn trace = Method::TRACE;
        /// Registers a CONNECT endpoint at this path.
        pub fn connect = Method::CONNECT;
        /// Registers a PATCH endpoint at this path.
        pub fn patch = Method::PATCH;
    ];

    fn register(&mut self, method: Option<Method>, handler: ArcHandler) -> Result<&mut Self, RouteError> {
        if self.middleware.len() > self.app.middleware_max_num {
            return Err(RouteError::TooManyMiddlewares {
                count: self.middleware.len(),
                max: self.app.middleware_max_num,
            });
        }
        let handler = if self.middleware.is_empty() {
            handler
        } else {
            fold(&self.middleware, handler)
        };
        self.app.add_route(
            RouteSpec {
                host: self.host.clone(),
                name: self.name.clone(),
                method,
                path: self.path.clone(),
            },
            handler,
        )?;
        Ok(self)
    }
}
