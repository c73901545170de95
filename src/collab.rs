use crate::response::ResponseWriter;
use http::StatusCode;
use std::any::Any;

/// Renders a named template into the response.
///
/// The core does not ship a template engine; an app that renders HTML
/// configures one through [`crate::App::with_renderer`], and handlers reach
/// it with [`crate::Context::render`].
pub trait Renderer: Send + Sync + 'static {
    /// Renders the template `name` with `data`, writing status, headers and
    /// body into the given writer.
    fn render(
        &self,
        writer: &mut ResponseWriter,
        name: &str,
        status: StatusCode,
        data: &serde_json::Value,
    ) -> crate::Result<()>;
}

/// A session store keyed by session id.  The empty id is reserved for "no
/// session"; implementations never see it, as the context rejects it first.
pub trait SessionStore: Send + Sync + 'static {
    /// Loads the value of a session, `None` if absent.
    fn get(&self, id: &str) -> crate::Result<Option<serde_json::Value>>;
    /// Stores the value of a session.
    fn set(&self, id: &str, value: serde_json::Value) -> crate::Result<()>;
    /// Deletes a session.
    fn delete(&self, id: &str) -> crate::Result<()>;
}

/// Validates a value bound from a request body; run by
/// [`crate::Context::bind`] after deserialization.
pub trait Validator: Send + Sync + 'static {
    /// Checks the bound value, failing the bind on error.
    fn validate(&self, value: &dyn Any) -> crate::Result<()>;
}

/// Fills unset fields of a bound value; run by [`crate::Context::bind`]
/// between deserialization and validation.
pub trait Defaulter: Send + Sync + 'static {
    /// Applies defaults to the bound value.
    fn apply(&self, value: &mut dyn Any) -> crate::Result<()>;
}

/// The configured collaborators of an app, shared with every context.
#[derive(Default)]
pub(crate) struct Collaborators {
    pub(crate) renderer: Option<Box<dyn Renderer>>,
    pub(crate) session: Option<Box<dyn SessionStore>>,
    pub(crate) validator: Option<Box<dyn Validator>>,
    pub(crate) defaulter: Option<Box<dyn Defaulter>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("renderer", &self.renderer.is_some())
            .field("session", &self.session.is_some())
            .field("validator", &self.validator.is_some())
            .field("defaulter", &self.defaulter.is_some())
            .finish()
    }
}
