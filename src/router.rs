//! Method + path request router.
//!
//! Routes are kept per method slot, each slot ordered by precedence, so a
//! lookup walks one short list and stops at the first pattern that fits.
//! The table is built once at startup and only read afterwards; share it
//! behind an `Arc` and no locking is needed.
//!
//! # Precedence
//!
//! When several patterns fit the same path, segments are compared from the
//! left: at the first position where two patterns differ, a literal beats a
//! parameter and a parameter beats a wildcard. Patterns that are still tied
//! resolve to the one registered first. `/users/me` therefore always wins
//! over `/users/:id`, whatever the registration order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;

// ── Pattern syntax ────────────────────────────────────────────────────────────

/// How route patterns are spelled and compared.
///
/// The default is `/users/:id` for parameters, `/files/*rest` for a trailing
/// wildcard, and case-sensitive literals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternSyntax {
    pub param: char,
    pub wildcard: char,
    pub case_sensitive: bool,
}

impl Default for PatternSyntax {
    fn default() -> Self {
        Self { param: ':', wildcard: '*', case_sensitive: true }
    }
}

/// Which requests a route answers: one method, or all of them.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MethodFilter {
    One(Method),
    Any,
}

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self { Self::One(method) }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(method) => method.fmt(f),
            Self::Any => f.write_str("*"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

impl Segment {
    /// Lower ranks win ties.
    fn rank(&self) -> u8 {
        match self {
            Self::Literal(_) => 0,
            Self::Param(_) => 1,
            Self::Wildcard(_) => 2,
        }
    }

    /// Same position, same kind, same literal. Parameter names don't matter.
    fn same_shape(&self, other: &Segment, case_sensitive: bool) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) if case_sensitive => a == b,
            (Self::Literal(a), Self::Literal(b)) => a.eq_ignore_ascii_case(b),
            (Self::Param(_), Self::Param(_)) | (Self::Wildcard(_), Self::Wildcard(_)) => true,
            _ => false,
        }
    }
}

struct Route {
    pattern: String,
    segments: Vec<Segment>,
    rank: Vec<u8>,
    seq: usize,
    handler: BoxedHandler,
}

// ── Match ─────────────────────────────────────────────────────────────────────

/// A successful lookup: the handler to run and the parameters it sees.
pub struct Match {
    pub(crate) handler: BoxedHandler,
    params: HashMap<String, String>,
    pattern: String,
}

impl Match {
    /// Raw parameter values keyed by name. No decoding or coercion.
    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// The pattern that matched, as registered (including any nest prefix).
    pub fn pattern(&self) -> &str { &self.pattern }

    pub(crate) fn into_parts(self) -> (BoxedHandler, HashMap<String, String>) {
        (self.handler, self.params)
    }
}

impl fmt::Debug for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application router.
///
/// Build it once at startup and hand it to [`App::new`](crate::App::new).
/// The chaining methods return `self` and panic on an invalid or conflicting
/// route, so a bad table stops the process before it serves traffic. Use
/// [`Router::try_on`] to handle those errors yourself.
///
/// ```rust
/// # use sprig::{Request, Response, Router};
/// # async fn me(_: Request) -> Response { Response::text("") }
/// # async fn get_user(_: Request) -> Response { Response::text("") }
/// # async fn create_user(_: Request) -> Response { Response::text("") }
/// # async fn files(_: Request) -> Response { Response::text("") }
/// let router = Router::new()
///     .get("/users/me",  me)
///     .get("/users/:id", get_user)
///     .post("/users",    create_user)
///     .get("/files/*rest", files);
///
/// let hit = router.lookup(sprig::Method::Get, "/users/42").unwrap();
/// assert_eq!(hit.params()["id"], "42");
/// ```
pub struct Router {
    syntax: PatternSyntax,
    routes: HashMap<MethodFilter, Vec<Route>>,
    next_seq: usize,
}

impl Router {
    pub fn new() -> Self {
        Self::with_syntax(PatternSyntax::default())
    }

    pub fn with_syntax(syntax: PatternSyntax) -> Self {
        Self { syntax, routes: HashMap::new(), next_seq: 0 }
    }

    /// Register a handler for a method + pattern pair. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics with the [`Error::RouteConflict`] or [`Error::InvalidPattern`]
    /// message when registration fails.
    pub fn on(mut self, method: impl Into<MethodFilter>, pattern: &str, handler: impl Handler) -> Self {
        if let Err(e) = self.try_on(method, pattern, handler) {
            panic!("{e}");
        }
        self
    }

    /// Fallible registration.
    pub fn try_on(
        &mut self,
        method: impl Into<MethodFilter>,
        pattern: &str,
        handler: impl Handler,
    ) -> Result<(), Error> {
        let segments = self.parse(pattern)?;
        self.insert(method.into(), pattern.to_owned(), segments, handler.into_boxed_handler())
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, pattern, handler)
    }

    pub fn patch(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Patch, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, pattern, handler)
    }

    pub fn head(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Head, pattern, handler)
    }

    pub fn options(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Options, pattern, handler)
    }

    /// Register a handler for every method.
    pub fn any(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(MethodFilter::Any, pattern, handler)
    }

    /// Mounts every route of `other` under `prefix`, keeping its registration order.
    ///
    /// # Panics
    ///
    /// Panics when the prefix is invalid or a mounted route conflicts.
    pub fn nest(mut self, prefix: &str, other: Router) -> Self {
        if let Err(e) = self.try_nest(prefix, other) {
            panic!("{e}");
        }
        self
    }

    pub fn try_nest(&mut self, prefix: &str, other: Router) -> Result<(), Error> {
        let prefix_segments = self.parse(prefix)?;
        if prefix_segments.iter().any(|s| matches!(s, Segment::Wildcard(_))) {
            return Err(Error::InvalidPattern {
                pattern: prefix.to_owned(),
                reason: "a nest prefix cannot contain a wildcard",
            });
        }
        let prefix = prefix.trim_end_matches('/');

        let mut mounted: Vec<(MethodFilter, Route)> = other
            .routes
            .into_iter()
            .flat_map(|(filter, routes)| routes.into_iter().map(move |r| (filter, r)))
            .collect();
        mounted.sort_by_key(|(_, route)| route.seq);

        for (filter, route) in mounted {
            let pattern = match route.pattern.as_str() {
                "/" if !prefix.is_empty() => prefix.to_owned(),
                p => format!("{prefix}{p}"),
            };
            let mut segments = prefix_segments.clone();
            segments.extend(route.segments);
            validate_names(&pattern, &segments)?;
            self.insert(filter, pattern, segments, route.handler)?;
        }
        Ok(())
    }

    /// Number of registered routes across all methods.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds the best route for a request.
    ///
    /// Candidates are the routes registered for `method` plus the wildcard
    /// slot. A `HEAD` request with no candidate falls back to `GET` routes.
    pub fn lookup(&self, method: Method, path: &str) -> Option<Match> {
        let path = split_path(path);

        let best = [MethodFilter::One(method), MethodFilter::Any]
            .into_iter()
            .filter_map(|slot| self.first_match(slot, &path))
            .min_by(|(a, _), (b, _)| (&a.rank, a.seq).cmp(&(&b.rank, b.seq)));

        let (route, params) = match best {
            Some(found) => found,
            None if method == Method::Head => self.first_match(Method::Get.into(), &path)?,
            None => return None,
        };

        Some(Match {
            handler: Arc::clone(&route.handler),
            params,
            pattern: route.pattern.clone(),
        })
    }

    /// [`Router::lookup`] reporting a miss as [`Error::NotFound`].
    pub fn resolve(&self, method: Method, path: &str) -> Result<Match, Error> {
        self.lookup(method, path)
            .ok_or_else(|| Error::NotFound { method, path: path.to_owned() })
    }

    fn first_match(
        &self,
        slot: MethodFilter,
        path: &[&str],
    ) -> Option<(&Route, HashMap<String, String>)> {
        self.routes
            .get(&slot)?
            .iter()
            .find_map(|route| self.match_route(route, path).map(|params| (route, params)))
    }

    fn match_route(&self, route: &Route, path: &[&str]) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        for (i, segment) in route.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard(name) => {
                    params.insert(name.clone(), path.get(i..)?.join("/"));
                    return Some(params);
                }
                Segment::Literal(literal) => {
                    let actual = path.get(i)?;
                    let equal = if self.syntax.case_sensitive {
                        literal == actual
                    } else {
                        literal.eq_ignore_ascii_case(actual)
                    };
                    if !equal {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let actual = path.get(i)?;
                    if actual.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), (*actual).to_owned());
                }
            }
        }
        (route.segments.len() == path.len()).then_some(params)
    }

    fn parse(&self, pattern: &str) -> Result<Vec<Segment>, Error> {
        let invalid = |reason| Error::InvalidPattern { pattern: pattern.to_owned(), reason };
        if !pattern.starts_with('/') {
            return Err(invalid("a pattern must start with `/`"));
        }

        let raw = split_path(pattern);
        let mut segments = Vec::with_capacity(raw.len());
        for (i, part) in raw.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(self.syntax.param) {
                if name.is_empty() {
                    return Err(invalid("a parameter needs a name"));
                }
                Segment::Param(name.to_owned())
            } else if let Some(name) = part.strip_prefix(self.syntax.wildcard) {
                if name.is_empty() {
                    return Err(invalid("a wildcard needs a name"));
                }
                if i + 1 != raw.len() {
                    return Err(invalid("a wildcard must be the last segment"));
                }
                Segment::Wildcard(name.to_owned())
            } else {
                Segment::Literal((*part).to_owned())
            };
            segments.push(segment);
        }

        validate_names(pattern, &segments)?;
        Ok(segments)
    }

    fn insert(
        &mut self,
        filter: MethodFilter,
        pattern: String,
        segments: Vec<Segment>,
        handler: BoxedHandler,
    ) -> Result<(), Error> {
        let case_sensitive = self.syntax.case_sensitive;
        let routes = self.routes.entry(filter).or_default();

        let conflict = routes.iter().any(|r| {
            r.segments.len() == segments.len()
                && r.segments.iter().zip(&segments).all(|(a, b)| a.same_shape(b, case_sensitive))
        });
        if conflict {
            return Err(Error::RouteConflict { method: filter.to_string(), pattern });
        }

        let rank: Vec<u8> = segments.iter().map(Segment::rank).collect();
        // Sequence numbers only grow, so the new route goes after every equal rank.
        let at = routes.partition_point(|r| r.rank <= rank);
        routes.insert(at, Route { pattern, segments, rank, seq: self.next_seq, handler });
        self.next_seq += 1;
        Ok(())
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn validate_names(pattern: &str, segments: &[Segment]) -> Result<(), Error> {
    let mut seen = Vec::new();
    for segment in segments {
        if let Segment::Param(name) | Segment::Wildcard(name) = segment {
            if seen.contains(&name) {
                return Err(Error::InvalidPattern {
                    pattern: pattern.to_owned(),
                    reason: "parameter names must be unique",
                });
            }
            seen.push(name);
        }
    }
    Ok(())
}

/// `/users/42/` → `["users", "42"]`. A single trailing slash is ignored; `/` has no segments.
fn split_path(path: &str) -> Vec<&str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    async fn ok(_req: Request) -> &'static str {
        "ok"
    }

    fn pattern_for(router: &Router, method: Method, path: &str) -> Option<String> {
        router.lookup(method, path).map(|m| m.pattern().to_owned())
    }

    #[test]
    fn literal_beats_param_in_either_order() {
        let first = Router::new().get("/users/me", ok).get("/users/:id", ok);
        let second = Router::new().get("/users/:id", ok).get("/users/me", ok);

        for router in [first, second] {
            assert_eq!(pattern_for(&router, Method::Get, "/users/me").as_deref(), Some("/users/me"));

            let hit = router.lookup(Method::Get, "/users/42").unwrap();
            assert_eq!(hit.pattern(), "/users/:id");
            assert_eq!(hit.params().get("id").map(String::as_str), Some("42"));
        }
    }

    #[test]
    fn leftmost_literal_decides() {
        let router = Router::new().get("/:a/b", ok).get("/a/:b", ok);
        assert_eq!(pattern_for(&router, Method::Get, "/a/b").as_deref(), Some("/a/:b"));
        assert_eq!(pattern_for(&router, Method::Get, "/x/b").as_deref(), Some("/:a/b"));
    }

    #[test]
    fn wildcard_captures_the_rest() {
        let router = Router::new().get("/files/*rest", ok);

        let hit = router.lookup(Method::Get, "/files/a/b/c").unwrap();
        assert_eq!(hit.params()["rest"], "a/b/c");

        let hit = router.lookup(Method::Get, "/files").unwrap();
        assert_eq!(hit.params()["rest"], "");

        assert!(router.lookup(Method::Get, "/").is_none());
    }

    #[test]
    fn param_and_literal_beat_wildcard() {
        let router = Router::new()
            .get("/files/*rest", ok)
            .get("/files/:name", ok)
            .get("/files/readme", ok);

        assert_eq!(pattern_for(&router, Method::Get, "/files/readme").as_deref(), Some("/files/readme"));
        assert_eq!(pattern_for(&router, Method::Get, "/files/a.txt").as_deref(), Some("/files/:name"));
        assert_eq!(pattern_for(&router, Method::Get, "/files/a/b").as_deref(), Some("/files/*rest"));
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let router = Router::new().get("/users", ok).get("/", ok);
        assert_eq!(pattern_for(&router, Method::Get, "/users/").as_deref(), Some("/users"));
        assert_eq!(pattern_for(&router, Method::Get, "/").as_deref(), Some("/"));
        assert!(router.lookup(Method::Get, "/users//").is_none());
    }

    #[test]
    fn params_do_not_bind_empty_segments() {
        let router = Router::new().get("/a/:id/b", ok);
        assert!(router.lookup(Method::Get, "/a//b").is_none());
    }

    #[test]
    fn method_must_match_unless_any() {
        let router = Router::new().post("/users", ok).any("/health", ok);

        assert!(router.lookup(Method::Get, "/users").is_none());
        assert!(router.lookup(Method::Post, "/users").is_some());
        for method in Method::ALL {
            assert!(router.lookup(method, "/health").is_some());
        }
    }

    #[test]
    fn specific_route_and_any_resolve_by_precedence() {
        let router = Router::new().any("/items/special", ok).get("/items/:id", ok);
        assert_eq!(pattern_for(&router, Method::Get, "/items/special").as_deref(), Some("/items/special"));

        // Same shape in two slots: earliest registration wins.
        let router = Router::new().any("/x/:a", ok).get("/x/:b", ok);
        assert_eq!(pattern_for(&router, Method::Get, "/x/1").as_deref(), Some("/x/:a"));
    }

    #[test]
    fn head_falls_back_to_get() {
        let router = Router::new().get("/page", ok).head("/only-head", ok);
        assert_eq!(pattern_for(&router, Method::Head, "/page").as_deref(), Some("/page"));
        assert!(router.lookup(Method::Get, "/only-head").is_none());
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let mut router = Router::new();
        router.try_on(Method::Get, "/users/:id", ok).unwrap();

        let err = router.try_on(Method::Get, "/users/:id", ok).unwrap_err();
        assert!(matches!(err, Error::RouteConflict { .. }));

        let err = router.try_on(Method::Get, "/users/:name/", ok).unwrap_err();
        assert!(matches!(err, Error::RouteConflict { .. }));

        router.try_on(Method::Post, "/users/:id", ok).unwrap();
        router.try_on(MethodFilter::Any, "/users/:id", ok).unwrap();
        assert_eq!(router.len(), 3);
    }

    #[test]
    #[should_panic(expected = "route conflict: GET `/a` is already registered")]
    fn chaining_panics_on_conflict() {
        let _ = Router::new().get("/a", ok).get("/a", ok);
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        let mut router = Router::new();
        for pattern in ["users", "/files/*rest/more", "/a/:", "/a/*", "/:id/:id"] {
            let err = router.try_on(Method::Get, pattern, ok).unwrap_err();
            assert!(matches!(err, Error::InvalidPattern { .. }), "{pattern} should be invalid");
        }
        assert!(router.is_empty());
    }

    #[test]
    fn literals_are_case_sensitive_by_default() {
        let router = Router::new().get("/About", ok);
        assert!(router.lookup(Method::Get, "/about").is_none());

        let syntax = PatternSyntax { case_sensitive: false, ..PatternSyntax::default() };
        let router = Router::with_syntax(syntax).get("/About", ok);
        assert!(router.lookup(Method::Get, "/about").is_some());
    }

    #[test]
    fn case_insensitive_literals_conflict_across_case() {
        let syntax = PatternSyntax { case_sensitive: false, ..PatternSyntax::default() };
        let mut router = Router::with_syntax(syntax);
        router.try_on(Method::Get, "/About", ok).unwrap();

        let err = router.try_on(Method::Get, "/about", ok).unwrap_err();
        assert!(matches!(err, Error::RouteConflict { .. }));

        let mut strict = Router::new();
        strict.try_on(Method::Get, "/About", ok).unwrap();
        strict.try_on(Method::Get, "/about", ok).unwrap();
        assert_eq!(strict.len(), 2);
    }

    #[test]
    fn custom_markers() {
        let syntax = PatternSyntax { param: '$', wildcard: '+', case_sensitive: true };
        let router = Router::with_syntax(syntax).get("/u/$id/+tail", ok);

        let hit = router.lookup(Method::Get, "/u/7/x/y").unwrap();
        assert_eq!(hit.params()["id"], "7");
        assert_eq!(hit.params()["tail"], "x/y");
    }

    #[test]
    fn nest_prepends_prefix() {
        let api = Router::new().get("/", ok).get("/users/:id", ok).any("/*rest", ok);
        let router = Router::new().get("/", ok).nest("/api/:version/", api);

        let hit = router.lookup(Method::Get, "/api/v1/users/9").unwrap();
        assert_eq!(hit.pattern(), "/api/:version/users/:id");
        assert_eq!(hit.params()["version"], "v1");
        assert_eq!(hit.params()["id"], "9");

        assert_eq!(pattern_for(&router, Method::Get, "/api/v1").as_deref(), Some("/api/:version"));
        assert_eq!(pattern_for(&router, Method::Post, "/api/v1/x/y").as_deref(), Some("/api/:version/*rest"));
        assert_eq!(pattern_for(&router, Method::Get, "/").as_deref(), Some("/"));
    }

    #[test]
    fn nest_rejects_clashing_names() {
        let mut router = Router::new();
        let err = router.try_nest("/:id", Router::new().get("/:id", ok)).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn resolve_reports_not_found() {
        let router = Router::new();
        let err = router.resolve(Method::Delete, "/gone").unwrap_err();
        assert!(matches!(err, Error::NotFound { method: Method::Delete, ref path } if path == "/gone"));
    }

    #[test]
    fn lookup_is_deterministic() {
        let router = Router::new().get("/a/:x", ok).any("/a/:y", ok).get("/a/*z", ok);
        let first = router.lookup(Method::Get, "/a/1").unwrap();
        for _ in 0..10 {
            let again = router.lookup(Method::Get, "/a/1").unwrap();
            assert_eq!(again.pattern(), first.pattern());
            assert_eq!(again.params(), first.params());
        }
    }
}
