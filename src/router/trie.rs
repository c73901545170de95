use crate::error::RouteError;
use crate::handler::ArcHandler;
use http::Method;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Static,
    Param,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The immutable description of a registered path: the pristine (unmodified)
/// path string and the ordered parameter names extracted from it.  Shared
/// between the trie node and the request context of every match.
pub struct RouteInfo {
    /// The path exactly as registered.
    pub path: String,
    /// Parameter names in path order; wildcard tails contribute their name
    /// (`*` when unnamed) as the last entry.
    pub pnames: Vec<String>,
}

/// The per-method handler table of one node.  Sparse: most nodes carry one
/// or two methods.  The `all` slot holds a handler registered for every
/// method.
#[derive(Debug, Default)]
pub(crate) struct Handlers {
    entries: Vec<(Method, ArcHandler, String)>,
    all: Option<(ArcHandler, String)>,
}

impl Handlers {
    fn get(&self, method: &Method) -> Option<&ArcHandler> {
        self.entries
            .iter()
            .find(|(m, _, _)| m == method)
            .map(|(_, h, _)| h)
            .or_else(|| self.all.as_ref().map(|(h, _)| h))
    }

    fn occupied(&self, method: &Option<Method>) -> bool {
        match method {
            Some(m) => self.entries.iter().any(|(e, _, _)| e == m),
            None => self.all.is_some(),
        }
    }

    fn set(&mut self, method: Option<Method>, handler: ArcHandler, name: String) {
        match method {
            Some(m) => self.entries.push((m, handler, name)),
            None => self.all = Some((handler, name)),
        }
    }

    fn remove(&mut self, method: &Method) -> bool {
        match self.entries.iter().position(|(m, _, _)| m == method) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.all = None;
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.all.is_none()
    }

    /// The explicitly registered methods, in registration order.
    fn methods(&self) -> Vec<Method> {
        self.entries.iter().map(|(m, _, _)| m.clone()).collect()
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    prefix: String,
    kind: Kind,
    /// First byte of each static child, parallel to `children`.
    indices: Vec<u8>,
    children: Vec<Node>,
    param_child: Option<Box<Node>>,
    any_child: Option<Box<Node>>,
    /// For param nodes, the declared parameter name; for any nodes, the
    /// wildcard name.  Reuse under a different name is a conflict.
    pname: String,
    handlers: Handlers,
    route: Option<Arc<RouteInfo>>,
}

impl Node {
    fn new(kind: Kind, prefix: &str, pname: &str) -> Self {
        Node {
            prefix: prefix.to_owned(),
            kind,
            indices: Vec::new(),
            children: Vec::new(),
            param_child: None,
            any_child: None,
            pname: pname.to_owned(),
            handlers: Handlers::default(),
            route: None,
        }
    }

    fn label(&self) -> u8 {
        self.prefix.as_bytes().first().copied().unwrap_or(0)
    }

    fn static_child(&self, label: u8) -> Option<&Node> {
        self.indices
            .iter()
            .position(|&b| b == label)
            .map(|i| &self.children[i])
    }

    fn static_child_mut(&mut self, label: u8) -> Option<&mut Node> {
        self.indices
            .iter()
            .position(|&b| b == label)
            .map(move |i| &mut self.children[i])
    }

    fn attach_static(&mut self, child: Node) {
        self.indices.push(child.label());
        self.children.push(child);
    }

    fn is_empty(&self) -> bool {
        self.handlers.is_empty()
            && self.children.is_empty()
            && self.param_child.is_none()
            && self.any_child.is_none()
    }

    /// Splits this node at `at`: the prefix tail, along with everything the
    /// node holds, moves into a new single child, leaving a bare static
    /// intermediate behind.
    fn split(&mut self, at: usize) {
        let tail = self.prefix.split_off(at);
        let child = Node {
            prefix: tail,
            kind: self.kind,
            indices: std::mem::take(&mut self.indices),
            children: std::mem::take(&mut self.children),
            param_child: self.param_child.take(),
            any_child: self.any_child.take(),
            pname: std::mem::take(&mut self.pname),
            handlers: std::mem::take(&mut self.handlers),
            route: self.route.take(),
        };
        self.kind = Kind::Static;
        self.indices = vec![child.label()];
        self.children = vec![child];
    }

    /// Merges a handlerless static intermediate with its only static child:
    /// prefixes concatenate, the child's contents move up.
    fn try_merge(&mut self) {
        let mergeable = self.kind == Kind::Static
            && self.handlers.is_empty()
            && self.children.len() == 1
            && self.param_child.is_none()
            && self.any_child.is_none();
        if !mergeable {
            return;
        }
        let child = self.children.pop().expect("single child");
        self.prefix.push_str(&child.prefix);
        self.indices = child.indices;
        self.children = child.children;
        self.param_child = child.param_child;
        self.any_child = child.any_child;
        self.pname = child.pname;
        self.handlers = child.handlers;
        self.route = child.route;
    }
}

/// Everything attached to the node at the end of a successfully inserted
/// path.
struct Terminal {
    method: Option<Method>,
    name: String,
    handler: ArcHandler,
    route: Arc<RouteInfo>,
}

/// The result of a lookup.
#[derive(Debug)]
pub(crate) enum Find {
    /// A handler matched; `count` parameter values were written to the
    /// output buffers.
    Found {
        handler: ArcHandler,
        route: Arc<RouteInfo>,
        count: usize,
    },
    /// The path exists but carries no handler for the requested method.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// Which child kind to try when resuming from the saved checkpoint.
#[derive(Clone, Copy)]
enum Resume {
    Param,
    Any,
}

/// A compressed radix tree over URL paths.
///
/// Static segments are stored as multi-byte prefixes split at the longest
/// common prefix; `:name` parameter segments become one-byte `:` marker
/// nodes and `*name` wildcard tails one-byte `*` marker nodes, so sibling
/// lookups stay first-byte indexed.  Matching prefers static over param
/// over any at every step, with a single backtrack checkpoint saved at the
/// last `/`-terminated ancestor that had a non-static alternative.
pub(crate) struct Trie {
    root: Node,
}

impl Trie {
    pub(crate) fn new() -> Self {
        Trie {
            root: Node::new(Kind::Static, "", ""),
        }
    }

    /// Inserts `path`, attaching `(method -> handler)` to its terminal node,
    /// and returns the number of parameters the path declares.  The path
    /// must already be validated (see `validate_path`).
    pub(crate) fn add(
        &mut self,
        method: Option<Method>,
        path: &str,
        name: &str,
        handler: ArcHandler,
    ) -> Result<usize, RouteError> {
        let pnames = collect_pnames(path);
        let count = pnames.len();
        let route = Arc::new(RouteInfo {
            path: path.to_owned(),
            pnames,
        });
        let mut terminal = Some(Terminal {
            method,
            name: name.to_owned(),
            handler,
            route: route.clone(),
        });

        // Insert piecewise: the static run up to each marker, then the
        // marker node itself, carrying the terminal payload on the last
        // piece only.
        let mut internal = String::with_capacity(path.len());
        let mut rest = path;
        let mut pidx = 0;
        loop {
            match rest.find(&[':', '*'][..]) {
                None => {
                    internal.push_str(rest);
                    insert_at(&mut self.root, &internal, Kind::Static, "", path, &mut terminal)?;
                    break;
                }
                Some(i) => {
                    internal.push_str(&rest[..i]);
                    insert_at(&mut self.root, &internal, Kind::Static, "", path, &mut None)?;
                    if rest.as_bytes()[i] == b':' {
                        let after = &rest[i + 1..];
                        let end = after.find('/').unwrap_or(after.len());
                        let pname = route.pnames[pidx].clone();
                        pidx += 1;
                        internal.push(':');
                        rest = &after[end..];
                        if rest.is_empty() {
                            insert_at(
                                &mut self.root,
                                &internal,
                                Kind::Param,
                                &pname,
                                path,
                                &mut terminal,
                            )?;
                            break;
                        }
                        insert_at(&mut self.root, &internal, Kind::Param, &pname, path, &mut None)?;
                    } else {
                        let pname = route.pnames.last().expect("wildcard name").clone();
                        internal.push('*');
                        insert_at(
                            &mut self.root,
                            &internal,
                            Kind::Any,
                            &pname,
                            path,
                            &mut terminal,
                        )?;
                        break;
                    }
                }
            }
        }
        Ok(count)
    }

    /// Removes the handler for `(path, method)`; `method == None` drops
    /// every method at the path.  Returns whether anything was removed.
    /// Empty nodes collapse into their parents on the way back up.
    pub(crate) fn delete(&mut self, path: &str, method: Option<&Method>) -> bool {
        let internal = internal_form(path);
        let removed = remove_at(&mut self.root, &internal, method);
        if removed && self.root.is_empty() {
            self.root.prefix.clear();
        }
        removed
    }

    /// Descends the tree against a request path.  Parameter values are
    /// written in place into `pvalues`; on a successful match the matched
    /// route's parameter names are copied into `pnames`, index-aligned with
    /// the values.
    pub(crate) fn find(
        &self,
        path: &str,
        method: &Method,
        pnames: &mut [String],
        pvalues: &mut [String],
    ) -> Find {
        let mut cn = &self.root;
        let mut search = path;
        let mut n = 0usize;
        let mut saved: Option<(&Node, &str, Resume, usize)> = None;
        let mut resume: Option<Resume> = None;

        'walk: loop {
            if resume.is_none() {
                if cn.kind == Kind::Static {
                    let l = lcp(search, &cn.prefix);
                    if l == cn.prefix.len() {
                        search = &search[l..];
                    } else {
                        match saved.take() {
                            Some((node, at, again, count)) => {
                                cn = node;
                                search = at;
                                n = count;
                                resume = Some(again);
                                continue 'walk;
                            }
                            None => return Find::NotFound,
                        }
                    }
                }
                if search.is_empty() {
                    break 'walk;
                }
            }
            let from = resume.take();

            if from.is_none() {
                if let Some(child) = cn.static_child(search.as_bytes()[0]) {
                    if cn.prefix.ends_with('/') {
                        saved = Some((cn, search, Resume::Param, n));
                    }
                    cn = child;
                    continue 'walk;
                }
            }

            if !matches!(from, Some(Resume::Any)) {
                if let Some(param) = cn.param_child.as_deref() {
                    if cn.prefix.ends_with('/') {
                        saved = Some((cn, search, Resume::Any, n));
                    }
                    let end = search.find('/').unwrap_or(search.len());
                    if n < pvalues.len() {
                        pvalues[n].clear();
                        pvalues[n].push_str(&search[..end]);
                    }
                    n += 1;
                    search = &search[end..];
                    cn = param;
                    continue 'walk;
                }
            }

            if let Some(any) = cn.any_child.as_deref() {
                if n < pvalues.len() {
                    pvalues[n].clear();
                    pvalues[n].push_str(search);
                }
                n += 1;
                cn = any;
                break 'walk;
            }

            match saved.take() {
                Some((node, at, again, count)) => {
                    cn = node;
                    search = at;
                    n = count;
                    resume = Some(again);
                }
                None => return Find::NotFound,
            }
        }

        resolve(cn, method, pnames, pvalues, n)
    }

    /// Every explicitly registered method anywhere in the tree, first
    /// occurrence order, deduplicated.  Feeds the `OPTIONS *` synthesis.
    pub(crate) fn all_methods(&self) -> Vec<Method> {
        let mut out = Vec::new();
        fn walk(node: &Node, out: &mut Vec<Method>) {
            for method in node.handlers.methods() {
                if !out.contains(&method) {
                    out.push(method);
                }
            }
            for child in &node.children {
                walk(child, out);
            }
            if let Some(p) = node.param_child.as_deref() {
                walk(p, out);
            }
            if let Some(a) = node.any_child.as_deref() {
                walk(a, out);
            }
        }
        walk(&self.root, &mut out);
        out
    }

    /// Every (path, method, name) registered in the tree.  Stable for a
    /// fixed configuration.
    pub(crate) fn entries(&self) -> Vec<(String, Option<Method>, String)> {
        let mut out = Vec::new();
        fn walk(node: &Node, out: &mut Vec<(String, Option<Method>, String)>) {
            if let Some(route) = &node.route {
                for (method, _, name) in &node.handlers.entries {
                    out.push((route.path.clone(), Some(method.clone()), name.clone()));
                }
                if let Some((_, name)) = &node.handlers.all {
                    out.push((route.path.clone(), None, name.clone()));
                }
            }
            for child in &node.children {
                walk(child, out);
            }
            if let Some(p) = node.param_child.as_deref() {
                walk(p, out);
            }
            if let Some(a) = node.any_child.as_deref() {
                walk(a, out);
            }
        }
        walk(&self.root, &mut out);
        out
    }

    #[cfg(test)]
    pub(crate) fn is_unused(&self) -> bool {
        self.root.is_empty()
    }

    #[cfg(test)]
    fn root(&self) -> &Node {
        &self.root
    }
}

impl std::fmt::Debug for Trie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trie").field("root", &self.root).finish()
    }
}

fn resolve(
    cn: &Node,
    method: &Method,
    pnames: &mut [String],
    pvalues: &mut [String],
    mut n: usize,
) -> Find {
    if let Some(handler) = cn.handlers.get(method) {
        let route = cn.route.clone().expect("handler node carries route info");
        copy_names(&route, pnames);
        return Find::Found {
            handler: handler.clone(),
            route,
            count: n.min(pnames.len()),
        };
    }

    // A wildcard child serving the directory itself: /static/ resolves to
    // the handler of /static/* with an empty tail.  A deeper match is
    // preferred over reporting 405 here.
    if let Some(any) = cn.any_child.as_deref() {
        if let Some(handler) = any.handlers.get(method) {
            let route = any.route.clone().expect("handler node carries route info");
            if n < pvalues.len() {
                pvalues[n].clear();
            }
            n += 1;
            copy_names(&route, pnames);
            return Find::Found {
                handler: handler.clone(),
                route,
                count: n.min(pnames.len()),
            };
        }
    }

    let mut allowed = cn.handlers.methods();
    if allowed.is_empty() {
        if let Some(any) = cn.any_child.as_deref() {
            allowed = any.handlers.methods();
        }
    }
    if !allowed.is_empty() {
        return Find::MethodNotAllowed { allowed };
    }
    Find::NotFound
}

fn copy_names(route: &RouteInfo, pnames: &mut [String]) {
    for (i, name) in route.pnames.iter().enumerate() {
        if i >= pnames.len() {
            break;
        }
        pnames[i].clear();
        pnames[i].push_str(name);
    }
}

fn insert_at(
    node: &mut Node,
    search: &str,
    kind: Kind,
    pname: &str,
    ppath: &str,
    terminal: &mut Option<Terminal>,
) -> Result<(), RouteError> {
    if node.prefix.is_empty() && node.is_empty() {
        // Fresh root: take the whole piece.
        node.prefix = search.to_owned();
        node.kind = kind;
        node.pname = pname.to_owned();
        return apply_terminal(node, terminal);
    }

    let l = lcp(search, &node.prefix);
    if l < node.prefix.len() {
        node.split(l);
        if l == search.len() {
            return apply_terminal(node, terminal);
        }
        let mut child = Node::new(kind, &search[l..], pname);
        apply_terminal(&mut child, terminal)?;
        node.attach_static(child);
        return Ok(());
    }

    let rest = &search[l..];
    if rest.is_empty() {
        match node.kind {
            Kind::Param if node.pname != pname => {
                return Err(RouteError::ParamNameConflict {
                    path: ppath.to_owned(),
                    expected: node.pname.clone(),
                    found: pname.to_owned(),
                });
            }
            Kind::Any if node.pname != pname => {
                return Err(RouteError::DuplicateWildcard {
                    path: ppath.to_owned(),
                    expected: node.pname.clone(),
                    found: pname.to_owned(),
                });
            }
            _ => {}
        }
        return apply_terminal(node, terminal);
    }

    match rest.as_bytes()[0] {
        b':' => {
            if node.param_child.is_some() {
                let child = node.param_child.as_deref_mut().expect("param child");
                insert_at(child, rest, kind, pname, ppath, terminal)
            } else {
                let mut child = Node::new(Kind::Param, rest, pname);
                apply_terminal(&mut child, terminal)?;
                node.param_child = Some(Box::new(child));
                Ok(())
            }
        }
        b'*' => {
            if node.any_child.is_some() {
                let child = node.any_child.as_deref_mut().expect("any child");
                insert_at(child, rest, kind, pname, ppath, terminal)
            } else {
                if !node.children.is_empty() {
                    return Err(RouteError::WildcardConflict {
                        path: ppath.to_owned(),
                    });
                }
                let mut child = Node::new(Kind::Any, rest, pname);
                apply_terminal(&mut child, terminal)?;
                node.any_child = Some(Box::new(child));
                Ok(())
            }
        }
        label => {
            if node.static_child(label).is_some() {
                let child = node.static_child_mut(label).expect("static child");
                insert_at(child, rest, kind, pname, ppath, terminal)
            } else {
                let mut child = Node::new(kind, rest, pname);
                apply_terminal(&mut child, terminal)?;
                node.attach_static(child);
                Ok(())
            }
        }
    }
}

fn apply_terminal(node: &mut Node, terminal: &mut Option<Terminal>) -> Result<(), RouteError> {
    let Some(t) = terminal.take() else {
        return Ok(());
    };
    if node.handlers.occupied(&t.method) {
        return Err(RouteError::DuplicateRoute {
            method: method_label(&t.method),
            path: t.route.path.clone(),
        });
    }
    if node.route.is_none() {
        node.route = Some(t.route);
    }
    node.handlers.set(t.method, t.handler, t.name);
    Ok(())
}

fn remove_at(node: &mut Node, search: &str, method: Option<&Method>) -> bool {
    if !search.starts_with(node.prefix.as_str()) {
        return false;
    }
    let rest = &search[node.prefix.len()..];
    if rest.is_empty() {
        if node.handlers.is_empty() {
            return false;
        }
        match method {
            None => node.handlers.clear(),
            Some(m) => {
                if !node.handlers.remove(m) {
                    return false;
                }
            }
        }
        if node.handlers.is_empty() {
            node.route = None;
        }
        return true;
    }

    let label = rest.as_bytes()[0];
    let removed = match label {
        b':' => node
            .param_child
            .as_deref_mut()
            .map_or(false, |child| remove_at(child, rest, method)),
        b'*' => node
            .any_child
            .as_deref_mut()
            .map_or(false, |child| remove_at(child, rest, method)),
        _ => node
            .static_child_mut(label)
            .map_or(false, |child| remove_at(child, rest, method)),
    };
    if removed {
        tidy(node, label);
    }
    removed
}

/// Drops a now-empty child, or merges a handlerless single-child static
/// intermediate left behind by the removal.
fn tidy(node: &mut Node, label: u8) {
    match label {
        b':' => {
            if node.param_child.as_deref().map_or(false, Node::is_empty) {
                node.param_child = None;
            }
        }
        b'*' => {
            if node.any_child.as_deref().map_or(false, Node::is_empty) {
                node.any_child = None;
            }
        }
        _ => {
            if let Some(i) = node.indices.iter().position(|&b| b == label) {
                if node.children[i].is_empty() {
                    node.children.remove(i);
                    node.indices.remove(i);
                } else {
                    node.children[i].try_merge();
                    node.indices[i] = node.children[i].label();
                }
            }
        }
    }
}

fn lcp(a: &str, b: &str) -> usize {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let max = a.len().min(b.len());
    let mut i = 0;
    while i < max && a[i] == b[i] {
        i += 1;
    }
    i
}

fn method_label(method: &Option<Method>) -> String {
    method
        .as_ref()
        .map(Method::to_string)
        .unwrap_or_else(|| "*".to_owned())
}

/// Parameter names declared by a path, in order; the wildcard tail
/// contributes `*` when unnamed.
fn collect_pnames(path: &str) -> Vec<String> {
    let mut pnames = Vec::new();
    let mut rest = path;
    while let Some(i) = rest.find(&[':', '*'][..]) {
        if rest.as_bytes()[i] == b':' {
            let after = &rest[i + 1..];
            let end = after.find('/').unwrap_or(after.len());
            pnames.push(after[..end].to_owned());
            rest = &after[end..];
        } else {
            let name = &rest[i + 1..];
            pnames.push(if name.is_empty() {
                "*".to_owned()
            } else {
                name.to_owned()
            });
            break;
        }
    }
    pnames
}

/// Rewrites a pattern path into its in-tree form: parameter segments become
/// bare `:` markers and the wildcard tail a bare `*`.
fn internal_form(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    loop {
        match rest.find(&[':', '*'][..]) {
            None => {
                out.push_str(rest);
                break;
            }
            Some(i) => {
                out.push_str(&rest[..i]);
                if rest.as_bytes()[i] == b':' {
                    out.push(':');
                    let after = &rest[i + 1..];
                    let end = after.find('/').unwrap_or(after.len());
                    rest = &after[end..];
                } else {
                    out.push('*');
                    break;
                }
            }
        }
    }
    out
}
