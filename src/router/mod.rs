mod trie;

pub use self::trie::RouteInfo;
pub(crate) use self::trie::{Find, Trie};
use crate::error::RouteError;
use crate::handler::ArcHandler;
use http::Method;
use std::collections::HashMap;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One registered route, as surfaced by enumeration.
pub struct RouteDescriptor {
    /// The host pattern the route was registered under; empty for the
    /// default router.
    pub host: String,
    /// The route's method; `None` stands for all methods.
    pub method: Option<Method>,
    /// The pristine path.
    pub path: String,
    /// The route name; empty if unnamed.
    pub name: String,
}

/// The router of a single (virtual) host: a path trie plus the name index
/// used for reverse URL generation.
pub struct Router {
    trie: Trie,
    names: HashMap<String, String>,
    max_params: usize,
}

impl Router {
    pub(crate) fn new(max_params: usize) -> Self {
        Router {
            trie: Trie::new(),
            names: HashMap::new(),
            max_params,
        }
    }

    pub(crate) fn set_max_params(&mut self, max_params: usize) {
        self.max_params = max_params;
    }

    /// Validates and inserts a route, returning its parameter count.
    ///
    /// A non-empty `name` must be unique: re-binding it to a different path
    /// fails.  An insertion whose parameter count exceeds the configured cap
    /// is rolled back before the error is returned.
    pub(crate) fn add(
        &mut self,
        name: &str,
        method: Option<Method>,
        path: &str,
        handler: ArcHandler,
    ) -> Result<usize, RouteError> {
        validate_path(path)?;
        if !name.is_empty() {
            if let Some(existing) = self.names.get(name) {
                if existing != path {
                    return Err(RouteError::DuplicateName {
                        name: name.to_owned(),
                        existing: existing.clone(),
                        path: path.to_owned(),
                    });
                }
            }
        }

        let count = self.trie.add(method.clone(), path, name, handler)?;
        if count > self.max_params {
            self.trie.delete(path, method.as_ref());
            return Err(RouteError::TooManyParams {
                path: path.to_owned(),
                count,
                max: self.max_params,
            });
        }
        if !name.is_empty() {
            self.names.insert(name.to_owned(), path.to_owned());
        }
        Ok(count)
    }

    /// Removes `(path, method)`; `method == None` drops every method at the
    /// path.  Names that no longer resolve to a live route are dropped with
    /// it.
    pub(crate) fn delete(&mut self, path: &str, method: Option<&Method>) -> bool {
        let removed = self.trie.delete(path, method);
        if removed {
            let still_live = self.trie.entries().iter().any(|(p, _, _)| p == path);
            if !still_live {
                self.names.retain(|_, p| p != path);
            }
        }
        removed
    }

    pub(crate) fn find(
        &self,
        path: &str,
        method: &Method,
        pnames: &mut [String],
        pvalues: &mut [String],
    ) -> Find {
        self.trie.find(path, method, pnames, pvalues)
    }

    pub(crate) fn all_methods(&self) -> Vec<Method> {
        self.trie.all_methods()
    }

    pub(crate) fn descriptors(&self, host: &str) -> Vec<RouteDescriptor> {
        self.trie
            .entries()
            .into_iter()
            .map(|(path, method, name)| RouteDescriptor {
                host: host.to_owned(),
                method,
                path,
                name,
            })
            .collect()
    }

    /// Generates the URL of the named route, substituting `args` for the
    /// path's parameter segments in order.  Returns `None` for unknown
    /// names.
    ///
    /// Each argument is formatted with its [`std::fmt::Display`]
    /// implementation.  Parameter segments beyond the supplied arguments,
    /// and wildcard tails when no argument remains for them, pass through
    /// untouched.
    ///
    /// # Examples
    /// ```rust
    /// let mut app = vessel::app();
    /// app.at("/users/:id/books/:book")
    ///     .name("user-book")
    ///     .get(vessel::sync_handler(|_| Ok(())))
    ///     .unwrap();
    /// let url = app.url_for("user-book", &[&17, &"dune"]).unwrap();
    /// assert_eq!(url, "/users/17/books/dune");
    /// ```
    pub fn url_for(&self, name: &str, args: &[&dyn std::fmt::Display]) -> Option<String> {
        self.names.get(name).map(|path| reverse(path, args))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("trie", &self.trie)
            .field("names", &self.names)
            .finish()
    }
}

/// Substitutes `args` into the parameter segments of a pristine path.
fn reverse(pristine: &str, args: &[&dyn std::fmt::Display]) -> String {
    let mut out = String::with_capacity(pristine.len());
    let mut args = args.iter();
    let mut rest = pristine;
    loop {
        match rest.find(&[':', '*'][..]) {
            None => {
                out.push_str(rest);
                break;
            }
            Some(i) => {
                out.push_str(&rest[..i]);
                let after = &rest[i + 1..];
                if rest.as_bytes()[i] == b':' {
                    let end = after.find('/').unwrap_or(after.len());
                    match args.next() {
                        Some(arg) => write!(out, "{}", arg).unwrap(),
                        None => {
                            out.push(':');
                            out.push_str(&after[..end]);
                        }
                    }
                    rest = &after[end..];
                } else {
                    match args.next() {
                        Some(arg) => write!(out, "{}", arg).unwrap(),
                        None => {
                            out.push('*');
                            out.push_str(after);
                        }
                    }
                    break;
                }
            }
        }
    }
    out
}

/// Checks a path against the pattern grammar: non-empty, beginning with
/// `/`, no `//`, named and unique parameters, wildcard only as the final
/// segment.
pub(crate) fn validate_path(path: &str) -> Result<(), RouteError> {
    let invalid = |reason: &'static str| RouteError::InvalidPath {
        path: path.to_owned(),
        reason,
    };

    if path.is_empty() {
        return Err(invalid("path is empty"));
    }
    if !path.starts_with('/') {
        return Err(invalid("path must begin with '/'"));
    }
    if path.contains("//") {
        return Err(invalid("path contains an empty segment"));
    }

    let mut seen: Vec<&str> = Vec::new();
    let mut wildcard = false;
    for segment in path.split('/').skip(1) {
        if wildcard {
            return Err(invalid("wildcard must be the final segment"));
        }
        if let Some(name) = segment.strip_prefix(':') {
            if name.is_empty() {
                return Err(invalid("parameter segment has no name"));
            }
            if name.contains(':') || name.contains('*') {
                return Err(invalid("parameter name contains a reserved byte"));
            }
            if seen.contains(&name) {
                return Err(invalid("duplicate parameter name"));
            }
            seen.push(name);
        } else if let Some(name) = segment.strip_prefix('*') {
            if name.contains(':') || name.contains('*') {
                return Err(invalid("wildcard name contains a reserved byte"));
            }
            let name = if name.is_empty() { "*" } else { name };
            if seen.contains(&name) {
                return Err(invalid("duplicate parameter name"));
            }
            wildcard = true;
        } else if segment.contains(':') || segment.contains('*') {
            return Err(invalid("':' and '*' must lead a segment"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::sync_handler;
    use std::sync::Arc;

    fn noop() -> ArcHandler {
        Arc::new(sync_handler(|_| Ok(())))
    }

    fn router() -> Router {
        Router::new(4)
    }

    #[test]
    fn validate_rejects_malformed_paths() {
        assert!(validate_path("/ok/:id/*rest").is_ok());
        assert!(validate_path("/").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("no-slash").is_err());
        assert!(validate_path("/a//b").is_err());
        assert!(validate_path("/a/:").is_err());
        assert!(validate_path("/a/:id/:id").is_err());
        assert!(validate_path("/a/*rest/b").is_err());
        assert!(validate_path("/a/b:id").is_err());
        assert!(validate_path("/a/*re*st").is_err());
    }

    #[test]
    fn add_then_delete_leaves_one_fewer() {
        let mut r = router();
        r.add("", Some(Method::GET), "/a", noop()).unwrap();
        r.add("", Some(Method::GET), "/b", noop()).unwrap();
        assert_eq!(r.descriptors("").len(), 2);

        assert!(r.delete("/a", Some(&Method::GET)));
        let left = r.descriptors("");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].path, "/b");

        let mut names = vec![String::new(); 4];
        let mut values = vec![String::new(); 4];
        assert!(matches!(
            r.find("/a", &Method::GET, &mut names, &mut values),
            Find::NotFound
        ));
    }

    #[test]
    fn duplicate_name_different_path_rejected() {
        let mut r = router();
        r.add("user", Some(Method::GET), "/users/:id", noop()).unwrap();
        let err = r
            .add("user", Some(Method::GET), "/people/:id", noop())
            .unwrap_err();
        assert!(matches!(err, RouteError::DuplicateName { .. }));
    }

    #[test]
    fn same_name_same_path_allowed_for_new_method() {
        let mut r = router();
        r.add("user", Some(Method::GET), "/users/:id", noop()).unwrap();
        r.add("user", Some(Method::POST), "/users/:id", noop())
            .unwrap();
        assert_eq!(r.descriptors("").len(), 2);
    }

    #[test]
    fn too_many_params_rolls_back() {
        let mut r = Router::new(2);
        let err = r
            .add("", Some(Method::GET), "/a/:b/:c/:d", noop())
            .unwrap_err();
        assert!(matches!(err, RouteError::TooManyParams { count: 3, max: 2, .. }));
        assert!(r.descriptors("").is_empty());

        let mut names = vec![String::new(); 4];
        let mut values = vec![String::new(); 4];
        assert!(matches!(
            r.find("/a/x/y/z", &Method::GET, &mut names, &mut values),
            Find::NotFound
        ));
    }

    #[test]
    fn delete_drops_dead_names() {
        let mut r = router();
        r.add("home", Some(Method::GET), "/home", noop()).unwrap();
        assert!(r.url_for("home", &[]).is_some());

        r.delete("/home", None);
        assert!(r.url_for("home", &[]).is_none());
    }

    #[test]
    fn url_for_substitutes_in_order() {
        let mut r = router();
        r.add("book", Some(Method::GET), "/users/:id/books/:book", noop())
            .unwrap();
        let url = r.url_for("book", &[&13, &"dune"]).unwrap();
        assert_eq!(url, "/users/13/books/dune");
    }

    #[test]
    fn url_for_leaves_wildcard_untouched() {
        let mut r = router();
        r.add("files", Some(Method::GET), "/static/*filepath", noop())
            .unwrap();
        assert_eq!(r.url_for("files", &[]).unwrap(), "/static/*filepath");
        assert_eq!(
            r.url_for("files", &[&"a/b.txt"]).unwrap(),
            "/static/a/b.txt"
        );
    }

    #[test]
    fn url_for_missing_args_pass_through() {
        let mut r = router();
        r.add("pair", Some(Method::GET), "/a/:x/:y", noop()).unwrap();
        assert_eq!(r.url_for("pair", &[&1]).unwrap(), "/a/1/:y");
    }

    #[test]
    fn url_for_unknown_name() {
        let r = router();
        assert!(r.url_for("ghost", &[]).is_none());
    }
}
