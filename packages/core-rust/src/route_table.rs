//! Path/method routing trie.
//!
//! [`RouteTable`] maps request paths onto handlers through three segment
//! kinds: literals (`/items`), single-segment parameters (`/:id`), and a
//! trailing wildcard (`/*`) that captures the rest of the path. Each matched
//! node owns a [`MethodBox`] holding one handler per HTTP method plus an
//! optional ALL fallback slot.
//!
//! # Matching priority
//!
//! At every node a literal child is tried first, then the parameter child,
//! then the wildcard, with full backtracking between the alternatives. A
//! parameter matches exactly one non-empty segment. A wildcard matches one or
//! more remaining segments and captures them joined with `/` under the name
//! `*`. Empty segments are dropped on both registration and lookup, so
//! `/a/b`, `/a/b/` and `//a//b` address the same route.
//!
//! Captured values are percent-decoded per segment after the path has been
//! split, so an encoded slash (`%2F`) stays inside one capture instead of
//! splitting the path. Literal segments match the request text as sent.
//!
//! # Overwrite semantics
//!
//! Registration is last-write-wins: re-registering a path+method pair
//! replaces the previous handler, and re-registering a parameter position
//! under a new name renames the capture. Both replacements are logged at
//! debug level rather than rejected.

use std::collections::HashMap;
use std::fmt::Write as _;

use http::Method;
use percent_encoding::percent_decode_str;

/// How a handler is keyed within a route's [`MethodBox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    /// The fallback slot, consulted when no method-specific handler exists.
    All,
    /// A concrete HTTP method.
    Method(Method),
}

impl From<Method> for RouteMethod {
    fn from(method: Method) -> Self {
        Self::Method(method)
    }
}

/// Per-route handler slots: one per HTTP method, plus an ALL fallback.
///
/// Resolution order is exact method first, then the ALL slot. A miss on both
/// means the route exists but the method is not served (the caller decides
/// whether that is a 405).
#[derive(Debug)]
pub struct MethodBox<H> {
    methods: HashMap<Method, H>,
    all: Option<H>,
}

impl<H> MethodBox<H> {
    /// Creates an empty `MethodBox`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
            all: None,
        }
    }

    /// Stores a handler in the slot for `method`, returning the handler it
    /// replaced, if any.
    pub fn insert(&mut self, method: RouteMethod, handler: H) -> Option<H> {
        match method {
            RouteMethod::All => self.all.replace(handler),
            RouteMethod::Method(method) => self.methods.insert(method, handler),
        }
    }

    /// Resolves the handler for `method`: exact slot first, ALL fallback
    /// second, `None` when neither is registered.
    #[must_use]
    pub fn resolve(&self, method: &Method) -> Option<&H> {
        self.methods.get(method).or(self.all.as_ref())
    }

    /// Sorted method names for display, with `ALL` listed last when present.
    fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().map(Method::to_string).collect();
        names.sort();
        if self.all.is_some() {
            names.push("ALL".to_string());
        }
        names
    }
}

impl<H> Default for MethodBox<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// A single trie node. Children are keyed by literal segment; at most one
/// parameter child and one wildcard child exist per node.
#[derive(Debug)]
struct RouteNode<H> {
    literals: HashMap<String, RouteNode<H>>,
    param: Option<(String, Box<RouteNode<H>>)>,
    wildcard: Option<Box<RouteNode<H>>>,
    methods: Option<MethodBox<H>>,
}

impl<H> RouteNode<H> {
    fn new() -> Self {
        Self {
            literals: HashMap::new(),
            param: None,
            wildcard: None,
            methods: None,
        }
    }

    /// Recursive lookup with backtracking. Captured parameters are pushed on
    /// descent and popped again when an alternative dead-ends, so `params`
    /// holds exactly the captures of the returned node's match.
    fn find(&self, segments: &[&str], params: &mut Vec<(String, String)>) -> Option<&Self> {
        let Some((head, rest)) = segments.split_first() else {
            // A node only terminates a match if something was registered on it.
            return self.methods.is_some().then_some(self);
        };

        if let Some(child) = self.literals.get(*head) {
            if let Some(found) = child.find(rest, params) {
                return Some(found);
            }
        }

        if let Some((name, child)) = &self.param {
            params.push((name.clone(), decode_capture(head)));
            if let Some(found) = child.find(rest, params) {
                return Some(found);
            }
            params.pop();
        }

        if let Some(child) = &self.wildcard {
            if child.methods.is_some() {
                let mut captured = decode_capture(head);
                for segment in rest {
                    captured.push('/');
                    captured.push_str(&decode_capture(segment));
                }
                params.push(("*".to_string(), captured));
                return Some(child);
            }
        }

        None
    }

    fn pretty_print(&self, label: &str, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        match self.methods.as_ref() {
            Some(methods) => {
                let _ = writeln!(out, "{indent}{label} [{}]", methods.method_names().join(", "));
            }
            None => {
                let _ = writeln!(out, "{indent}{label}");
            }
        }
        let mut names: Vec<&String> = self.literals.keys().collect();
        names.sort();
        for name in names {
            self.literals[name].pretty_print(name, depth + 1, out);
        }
        if let Some((name, child)) = &self.param {
            child.pretty_print(&format!(":{name}"), depth + 1, out);
        }
        if let Some(child) = &self.wildcard {
            child.pretty_print("*", depth + 1, out);
        }
    }
}

/// The result of a successful path match: the route's method slots plus the
/// parameter values captured along the way.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    /// Method slots of the matched route.
    pub methods: &'a MethodBox<H>,
    /// Captured parameters by name, percent-decoded; a wildcard capture is
    /// stored under `*`.
    pub params: HashMap<String, String>,
}

/// A trie of registered routes, generic over the handler type.
///
/// Tables are built once during startup and read-only afterwards; they are
/// not designed for concurrent mutation.
///
/// # Examples
///
/// ```
/// use http::Method;
/// use switchyard_core::route_table::RouteTable;
///
/// let mut table: RouteTable<&str> = RouteTable::new();
/// table.register("/items/:id", Method::GET, "get-item");
///
/// let found = table.find("/items/42").expect("route matches");
/// assert_eq!(found.methods.resolve(&Method::GET), Some(&"get-item"));
/// assert_eq!(found.params.get("id").map(String::as_str), Some("42"));
/// ```
#[derive(Debug)]
pub struct RouteTable<H> {
    root: RouteNode<H>,
}

impl<H> RouteTable<H> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: RouteNode::new(),
        }
    }

    /// Registers `handler` for `path` under `method`.
    ///
    /// Segments starting with `:` declare parameters; a `*` segment declares
    /// a wildcard and must come last (anything after it is ignored). A bare
    /// `:` with no name is treated as a literal. Re-registering the same
    /// path+method replaces the previous handler silently.
    pub fn register(&mut self, path: &str, method: impl Into<RouteMethod>, handler: H) {
        let mut node = &mut self.root;
        for segment in split_path(path) {
            if segment == "*" {
                node = node
                    .wildcard
                    .get_or_insert_with(|| Box::new(RouteNode::new()));
                break;
            }
            match segment.strip_prefix(':') {
                Some(name) if !name.is_empty() => {
                    let param = node
                        .param
                        .get_or_insert_with(|| (name.to_string(), Box::new(RouteNode::new())));
                    if param.0 != name {
                        tracing::debug!(
                            from = %param.0,
                            to = name,
                            "route parameter renamed by later registration"
                        );
                        param.0 = name.to_string();
                    }
                    node = &mut param.1;
                }
                _ => {
                    node = node
                        .literals
                        .entry(segment.to_string())
                        .or_insert_with(RouteNode::new);
                }
            }
        }
        let replaced = node
            .methods
            .get_or_insert_with(MethodBox::new)
            .insert(method.into(), handler);
        if replaced.is_some() {
            tracing::debug!(path, "replaced existing handler registration");
        }
    }

    /// Looks up the route matching `path`.
    ///
    /// Returns `None` when no registered pattern matches. Captured parameter
    /// values are percent-decoded. Method resolution happens afterwards
    /// through [`MethodBox::resolve`] on the returned match, so callers can
    /// tell an unknown path from an unserved method.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<RouteMatch<'_, H>> {
        let segments = split_path(path);
        let mut params = Vec::new();
        let node = self.root.find(&segments, &mut params)?;
        let methods = node.methods.as_ref()?;
        Some(RouteMatch {
            methods,
            params: params.into_iter().collect(),
        })
    }

    /// Starts a [`RouteBuilder`] rooted at `path`.
    #[must_use]
    pub fn route(&mut self, path: &str) -> RouteBuilder<'_, H> {
        RouteBuilder {
            table: self,
            path: path.to_string(),
        }
    }

    /// Renders the registered tree as an indented multi-line string, one node
    /// per line with its methods in brackets. Children are sorted so the
    /// output is deterministic.
    #[must_use]
    pub fn pretty_print(&self) -> String {
        let mut out = String::new();
        self.root.pretty_print("/", 0, &mut out);
        out
    }
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Declaration-style registration: methods register on the builder's path,
/// and [`RouteBuilder::route`] nests a sub-path under it.
pub struct RouteBuilder<'t, H> {
    table: &'t mut RouteTable<H>,
    path: String,
}

impl<H> RouteBuilder<'_, H> {
    /// Returns a builder for `subpath` joined under this builder's path.
    #[must_use]
    pub fn route(self, subpath: &str) -> Self {
        Self {
            table: self.table,
            path: format!("{}/{}", self.path, subpath),
        }
    }

    /// Registers `handler` for an explicit method slot.
    pub fn method(self, method: impl Into<RouteMethod>, handler: H) -> Self {
        self.table.register(&self.path, method, handler);
        self
    }

    /// Registers a GET handler.
    pub fn get(self, handler: H) -> Self {
        self.method(Method::GET, handler)
    }

    /// Registers a POST handler.
    pub fn post(self, handler: H) -> Self {
        self.method(Method::POST, handler)
    }

    /// Registers a PUT handler.
    pub fn put(self, handler: H) -> Self {
        self.method(Method::PUT, handler)
    }

    /// Registers a DELETE handler.
    pub fn delete(self, handler: H) -> Self {
        self.method(Method::DELETE, handler)
    }

    /// Registers the ALL fallback handler.
    pub fn all(self, handler: H) -> Self {
        self.method(RouteMethod::All, handler)
    }
}

/// Splits a path into non-empty segments, normalizing leading, trailing, and
/// doubled slashes away.
fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Percent-decodes one captured segment, keeping the raw text when the bytes
/// do not decode to valid UTF-8.
fn decode_capture(segment: &str) -> String {
    percent_decode_str(segment)
        .decode_utf8()
        .map_or_else(|_| segment.to_string(), |decoded| decoded.into_owned())
}
