//! Vessel is a virtual-host aware HTTP routing framework built on hyper and
//! Tokio.  Requests are dispatched by host pattern to a per-host radix-trie
//! router, threaded through a pooled request [`Context`] and an ordered
//! middleware pipeline, and answered through buffered response helpers.
//!
//! # Getting Started
//! To get started, just add vessel and tokio to your `Cargo.toml`:
//!
//! ```toml
//! vessel = "0.1.0"
//! tokio = { version = "1.26.0", features = ["full"] } # or whatever the latest version is
//! ```
//!
//! # Examples
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> Result<(), anyhow::Error> {
//!     let mut app = vessel::app();
//!     app.at("/hello/:name").get(vessel::sync_handler(|ctx| {
//!         let name = ctx.param("name").unwrap_or("world").to_owned();
//!         ctx.string(http::StatusCode::OK, format!("hello, {}!", name))
//!     }))?;
//!     app.listen("0.0.0.0:8080").await?;
//!     Ok(())
//! }
//! ```
//!
//! Hosts other than the default are registered through the builder:
//!
//! ```rust
//! # fn main() -> Result<(), vessel::RouteError> {
//! let mut app = vessel::app();
//! app.at("/")
//!     .host("*.example.com")
//!     .get(vessel::sync_handler(|ctx| {
//!         ctx.string(http::StatusCode::OK, "subdomain")
//!     }))?;
//! # Ok(())
//! # }
//! ```
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]
#![deny(clippy::correctness, unused_must_use)]

#[macro_use]
extern crate async_trait;

mod app;
mod collab;
mod context;
mod error;
mod handler;
mod host;
mod pool;
mod response;
mod router;

pub use self::app::{App, RouteBuilder, RouteSpec};
pub use self::collab::{Defaulter, Renderer, SessionStore, Validator};
pub use self::context::{Context, PeerAddress};
pub use self::error::{is_skip, skip, HttpError, RouteError, ServeError, Skip};
pub use self::handler::{sync_handler, ArcHandler, Handler, Logger, Middleware, SyncHandler};
pub use self::host::{HostManager, SyncHostManager};
pub use self::response::ResponseWriter;
pub use self::router::{RouteDescriptor, RouteInfo, Router};

pub use ::http;
pub use hyper::Body;

/// A type alias for [`std::result::Result`].
///
/// The most common use-case for this type is for handlers, which report
/// only success or failure for a request; the response itself is written
/// through the [`Context`].
///
/// # Examples
/// ```rust
/// fn handle(ctx: &mut vessel::Context) -> vessel::Result {
///     ctx.string(http::StatusCode::OK, "hello, world!")
/// }
/// # let mut ctx = vessel::Context::new();
/// # handle(&mut ctx).unwrap();
/// ```
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;

#[must_use]
#[inline]
/// This creates a new HTTP application.  This is a shortcut for
/// [`App::new`].
pub fn app() -> App {
    App::new()
}
