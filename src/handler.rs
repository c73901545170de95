use crate::context::Context;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A reference-shared handler, as stored in the routing tables.
pub type ArcHandler = Arc<dyn Handler>;

#[async_trait]
/// An HTTP request handler.
///
/// A handler is a fallible function of the request [`Context`]: it reads the
/// bound request, writes the response through the context's helpers, and
/// returns `Err` to hand the request to the error sink.  This is
/// automatically implemented for functions of the shape
/// `for<'a> Fn(&'a mut Context) -> BoxFuture<'a, vessel::Result<()>>`, which
/// is what a plain `fn(&mut Context) -> BoxFuture<'_, vessel::Result<()>>`
/// item satisfies; synchronous closures go through [`sync_handler`].
pub trait Handler: Send + Sync + 'static {
    #[must_use]
    /// Handles the request bound to the given context.  Failures bubble up
    /// the middleware chain and, unrecovered, reach the error sink.
    async fn call(&self, ctx: &mut Context) -> crate::Result<()>;

    #[doc(hidden)]
    fn describe(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", std::any::type_name::<Self>())
    }
}

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.describe(f)
    }
}

#[async_trait]
impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, crate::Result<()>> + Send + Sync + 'static,
{
    async fn call(&self, ctx: &mut Context) -> crate::Result<()> {
        (self)(ctx).await
    }
}

/// A [`Handler`] wrapping a synchronous function.  See [`sync_handler`].
pub struct SyncHandler<F>(F);

impl<F> std::fmt::Debug for SyncHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SyncHandler")
    }
}

/// Wraps a synchronous function as a [`Handler`].
///
/// Most handlers that only inspect the request and write a buffered response
/// never need to await anything; this saves them the ceremony of returning a
/// boxed future.
///
/// # Examples
/// ```rust
/// use vessel::sync_handler;
///
/// let mut app = vessel::app();
/// app.at("/ping")
///     .get(sync_handler(|ctx| ctx.string(http::StatusCode::OK, "pong")))
///     .unwrap();
/// ```
pub fn sync_handler<F>(f: F) -> SyncHandler<F>
where
    F: Fn(&mut Context) -> crate::Result<()> + Send + Sync + 'static,
{
    SyncHandler(f)
}

#[async_trait]
impl<F> Handler for SyncHandler<F>
where
    F: Fn(&mut Context) -> crate::Result<()> + Send + Sync + 'static,
{
    async fn call(&self, ctx: &mut Context) -> crate::Result<()> {
        (self.0)(ctx)
    }
}

/// An HTTP request/response modifier.
///
/// A middleware maps a handler to a handler: it receives the next step of
/// the chain and returns a wrapped handler that may act before and after
/// delegating to it (or not delegate at all; returning [`crate::skip`]
/// stops the chain without reporting failure).  Chains are folded at
/// registration time, so dispatch pays no composition cost per request.
///
/// This is automatically implemented for
/// `Fn(ArcHandler) -> ArcHandler` closures.
pub trait Middleware: Send + Sync + 'static {
    /// Wraps the next step of the chain.
    fn apply(&self, next: ArcHandler) -> ArcHandler;
}

impl<F> Middleware for F
where
    F: Fn(ArcHandler) -> ArcHandler + Send + Sync + 'static,
{
    fn apply(&self, next: ArcHandler) -> ArcHandler {
        (self)(next)
    }
}

/// Folds a middleware band around an innermost handler.  The first-registered
/// middleware ends up outermost: for `[m1, m2, m3]` and handler `h`, the
/// effective call order is `m1 -> m2 -> m3 -> h` with strict LIFO return.
pub(crate) fn fold(middleware: &[Arc<dyn Middleware>], inner: ArcHandler) -> ArcHandler {
    middleware
        .iter()
        .rev()
        .fold(inner, |next, m| m.apply(next))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// Middleware that logs every request at info level: a `-->` line on entry
/// and a `<--` line with the response status and elapsed time on exit.
pub struct Logger;

impl Logger {
    /// Creates the logger middleware.
    pub const fn new() -> Self {
        Logger
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger
    }
}

impl Middleware for Logger {
    fn apply(&self, next: ArcHandler) -> ArcHandler {
        Arc::new(Logged { next })
    }
}

struct Logged {
    next: ArcHandler,
}

#[async_trait]
impl Handler for Logged {
    async fn call(&self, ctx: &mut Context) -> crate::Result<()> {
        let method = ctx.method().clone();
        let path = ctx.path().to_owned();
        log::info!("--> {} {}", method, path);
        let start = std::time::Instant::now();

        let result = self.next.call(ctx).await;
        let elapse = start.elapsed();

        match &result {
            Ok(_) => log::info!(
                "<-- {} {}: {} (in {}ms)",
                method,
                path,
                ctx.response().status(),
                elapse.as_millis()
            ),
            Err(_) => log::info!("<-- {} {}: (error) (in {}ms)", method, path, elapse.as_millis()),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording(tag: &'static str, order: Arc<Mutex<Vec<String>>>) -> impl Middleware {
        move |next: ArcHandler| -> ArcHandler {
            Arc::new(Recorder {
                tag,
                order: order.clone(),
                next,
            })
        }
    }

    struct Recorder {
        tag: &'static str,
        order: Arc<Mutex<Vec<String>>>,
        next: ArcHandler,
    }

    #[async_trait]
    impl Handler for Recorder {
        async fn call(&self, ctx: &mut Context) -> crate::Result<()> {
            self.order.lock().unwrap().push(format!("{}:in", self.tag));
            let result = self.next.call(ctx).await;
            self.order.lock().unwrap().push(format!("{}:out", self.tag));
            result
        }
    }

    #[tokio::test]
    async fn folds_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let band: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(recording("m1", order.clone())),
            Arc::new(recording("m2", order.clone())),
            Arc::new(recording("m3", order.clone())),
        ];
        let inner_order = order.clone();
        let inner: ArcHandler = Arc::new(sync_handler(move |_| {
            inner_order.lock().unwrap().push("h".to_owned());
            Ok(())
        }));

        let chain = fold(&band, inner);
        let mut ctx = Context::new();
        chain.call(&mut ctx).await.unwrap();

        let seen = order.lock().unwrap().clone();
        assert_eq!(
            seen,
            ["m1:in", "m2:in", "m3:in", "h", "m3:out", "m2:out", "m1:out"]
        );
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let stopper: Arc<dyn Middleware> = Arc::new(|_next: ArcHandler| -> ArcHandler {
            Arc::new(sync_handler(|_| Err(crate::skip())))
        });
        let inner: ArcHandler = Arc::new(sync_handler(|_| panic!("must not run")));
        let chain = stopper.apply(inner);

        let mut ctx = Context::new();
        let err = chain.call(&mut ctx).await.unwrap_err();
        assert!(crate::is_skip(&err));
    }

    #[tokio::test]
    async fn fn_items_are_handlers() {
        fn plain(ctx: &mut Context) -> futures::future::BoxFuture<'_, crate::Result<()>> {
            Box::pin(async move { ctx.string(http::StatusCode::OK, "ok") })
        }

        let handler: ArcHandler = Arc::new(plain);
        let mut ctx = Context::new();
        handler.call(&mut ctx).await.unwrap();
        assert_eq!(ctx.response().status(), http::StatusCode::OK);
    }
}
