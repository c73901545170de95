use std::fmt;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
/// Errors generated while registering routes, hosts, or middleware.  All of
/// these are returned synchronously from the registration API and prevent the
/// offending route from ever being served.
pub enum RouteError {
    /// Generated when a route path fails validation: it is empty, does not
    /// begin with `/`, contains `//`, has an unnamed parameter segment, or
    /// repeats a parameter name within one path.
    #[error("invalid route path {path:?}: {reason}")]
    InvalidPath {
        /// The path as given at registration.
        path: String,
        /// Why the path was rejected.
        reason: &'static str,
    },
    /// Generated when the same (method, path) pair is registered twice.
    #[error("route {method} {path:?} is already registered")]
    DuplicateRoute {
        /// The method label; `*` stands for all methods.
        method: String,
        /// The pristine path of the conflicting registration.
        path: String,
    },
    /// Generated when a route name is reused for a different path.
    #[error("route name {name:?} is already bound to {existing:?}, cannot bind {path:?}")]
    DuplicateName {
        /// The conflicting name.
        name: String,
        /// The path the name is already bound to.
        existing: String,
        /// The path of the rejected registration.
        path: String,
    },
    /// Generated when two paths declare differently-named parameters at the
    /// same position, e.g. `/users/:id` after `/users/:name`.
    #[error("parameter :{found} in {path:?} conflicts with existing parameter :{expected}")]
    ParamNameConflict {
        /// The path of the rejected registration.
        path: String,
        /// The parameter name already present in the tree.
        expected: String,
        /// The parameter name of the rejected registration.
        found: String,
    },
    /// Generated when a wildcard tail is registered at a node that already
    /// has literal children.
    #[error("wildcard in {path:?} conflicts with existing literal routes")]
    WildcardConflict {
        /// The path of the rejected registration.
        path: String,
    },
    /// Generated when a second catch-all is registered at the same node
    /// under a different name.
    #[error("catch-all *{found} in {path:?} conflicts with existing catch-all *{expected}")]
    DuplicateWildcard {
        /// The path of the rejected registration.
        path: String,
        /// The wildcard name already present in the tree.
        expected: String,
        /// The wildcard name of the rejected registration.
        found: String,
    },
    /// Generated when a path declares more parameters than the configured
    /// cap allows.  The partial insertion is rolled back before this is
    /// returned.
    #[error("route path {path:?} declares {count} parameters, more than the maximum {max}")]
    TooManyParams {
        /// The path of the rejected registration.
        path: String,
        /// How many parameters the path declares.
        count: usize,
        /// The configured cap.
        max: usize,
    },
    /// Generated when a host pattern is not a domain pattern and also fails
    /// to compile as a regular expression.
    #[error("invalid host pattern {pattern:?}")]
    InvalidHostPattern {
        /// The pattern as given at registration.
        pattern: String,
        /// The regex compilation failure.
        #[source]
        source: regex::Error,
    },
    /// Generated when appending a middleware would push a chain past the
    /// configured cap.
    #[error("middleware chain is full ({count} of {max})")]
    TooManyMiddlewares {
        /// The current chain length.
        count: usize,
        /// The configured cap.
        max: usize,
    },
    /// Generated when registration is attempted while the routing tables are
    /// shared with in-flight requests.  Routing tables are immutable once
    /// served; reconfigure through [`crate::SyncHostManager`] instead.
    #[error("routing tables are frozen while requests are in flight")]
    Frozen,
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
/// Errors generated while binding and serving the listener.
pub enum ServeError {
    /// Generated when the listen address fails to parse.
    #[error("could not parse the given string ({:?}) as an address", .0)]
    InvalidAddress(String),
    /// Generated when hyper fails to bind or serve.
    #[error("could not serve server")]
    Hyper(#[source] hyper::Error),
}

#[derive(Debug)]
/// An error carrying a specific HTTP response.
///
/// Handlers and middleware return this (wrapped in [`anyhow::Error`]) to
/// produce a response with a particular status code and body.  If the error
/// reaches the error sink unrecovered and the response has not been written
/// yet, the sink sends `status` with `message` as the body.
///
/// # Examples
/// ```rust
/// use vessel::HttpError;
///
/// let err = HttpError::new(http::StatusCode::FORBIDDEN, "no such luck");
/// assert_eq!(err.status, http::StatusCode::FORBIDDEN);
/// assert_eq!(err.to_string(), "403 Forbidden: no such luck");
/// ```
pub struct HttpError {
    /// The status code of the response this error produces.
    pub status: http::StatusCode,
    /// The response body.
    pub message: String,
    /// An optional `Content-Type` for the body; plain text when absent.
    pub content_type: Option<&'static str>,
    /// The underlying cause, if any.
    pub cause: Option<anyhow::Error>,
}

impl HttpError {
    /// Creates an error with the given status and message.
    pub fn new<M: Into<String>>(status: http::StatusCode, message: M) -> Self {
        HttpError {
            status,
            message: message.into(),
            content_type: None,
            cause: None,
        }
    }

    /// Creates an error with the given status and the status' canonical
    /// reason phrase as the message.
    ///
    /// # Examples
    /// ```rust
    /// # use vessel::HttpError;
    /// let err = HttpError::from_status(http::StatusCode::NOT_FOUND);
    /// assert_eq!(err.message, "Not Found");
    /// ```
    pub fn from_status(status: http::StatusCode) -> Self {
        HttpError::new(status, status.canonical_reason().unwrap_or(""))
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_cause<E: Into<anyhow::Error>>(mut self, cause: E) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Sets the `Content-Type` of the produced body.
    #[must_use]
    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// A 400 error with the given message.
    pub fn bad_request<M: Into<String>>(message: M) -> Self {
        HttpError::new(http::StatusCode::BAD_REQUEST, message)
    }

    /// A 404 error with the canonical message.
    pub fn not_found() -> Self {
        HttpError::from_status(http::StatusCode::NOT_FOUND)
    }

    /// A 500 error with the given message.
    pub fn internal_server_error<M: Into<String>>(message: M) -> Self {
        HttpError::new(http::StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The skip sentinel.
///
/// A middleware that has fully handled a request (say, served it from a
/// cache) returns this to stop the chain without reporting a failure.  The
/// error sink treats it as success: it is never passed to the configured
/// error handler.
///
/// # Examples
/// ```rust
/// let err = vessel::skip();
/// assert!(vessel::is_skip(&err));
/// assert!(!vessel::is_skip(&anyhow::anyhow!("boom")));
/// ```
pub struct Skip;

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("skipped")
    }
}

impl std::error::Error for Skip {}

/// Creates the skip sentinel as an [`anyhow::Error`], ready to be returned
/// from a handler or middleware.
pub fn skip() -> anyhow::Error {
    anyhow::Error::new(Skip)
}

/// Reports whether the given error is the skip sentinel.
pub fn is_skip(error: &anyhow::Error) -> bool {
    error.is::<Skip>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_roundtrip() {
        let err = skip();
        assert!(is_skip(&err));
        assert!(err.downcast_ref::<Skip>().is_some());
    }

    #[test]
    fn skip_is_distinguished() {
        let err: anyhow::Error = HttpError::not_found().into();
        assert!(!is_skip(&err));
    }

    #[test]
    fn http_error_downcast() {
        let err: anyhow::Error = HttpError::new(http::StatusCode::IM_A_TEAPOT, "short").into();
        let http = err.downcast_ref::<HttpError>().unwrap();
        assert_eq!(http.status, http::StatusCode::IM_A_TEAPOT);
        assert_eq!(http.message, "short");
    }

    #[test]
    fn http_error_source_chain() {
        let err = HttpError::internal_server_error("wrapped")
            .with_cause(std::io::Error::new(std::io::ErrorKind::Other, "inner"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "inner");
    }

    #[test]
    fn route_error_display_names_the_route() {
        let err = RouteError::DuplicateRoute {
            method: "GET".to_owned(),
            path: "/users/:id".to_owned(),
        };
        assert!(err.to_string().contains("/users/:id"));
        assert!(err.to_string().contains("GET"));
    }
}
