//! Path-template routing.
//!
//! Routes are kept in registration order and the first match wins, so a
//! generic template registered early shadows a more specific one added later.
//!
//! ```
//! use crud_http::{PathParams, Request, Response, Router, StatusCode};
//!
//! let router = Router::new()
//!     .route("GET", "/users/{id}", |_: &Request, params: &PathParams, resp: &mut Response| {
//!         resp.status(StatusCode::Ok).body(format!("user {}", &params["id"]));
//!     });
//!
//! let found = router.find("GET", "/users/42").unwrap();
//! assert_eq!(found.params.get("id"), Some("42"));
//! assert!(router.find("GET", "/users").is_none());
//! ```

use crate::{
    http::{request::Request, response::Response, types::StatusCode},
    server::server_impl::Handler,
};
use std::{fmt, ops::Index};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `{name}`: any single non-empty segment.
    Param(String),
}

/// A route pattern such as `/api/data/{collection}/{id}`, split into
/// segments once at registration.
///
/// A template matches a path only when both have the same number of
/// `/`-separated segments, every literal segment is equal and every
/// `{name}` segment is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compiles a template. Only whole segments written as `{name}` are
    /// parameters; braces anywhere else are matched literally.
    pub fn parse(template: &str) -> Self {
        let segments = template
            .split('/')
            .map(|part| match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) if !name.is_empty() => Segment::Param(name.to_owned()),
                _ => Segment::Literal(part.to_owned()),
            })
            .collect();

        PathTemplate {
            raw: template.to_owned(),
            segments,
        }
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches the whole `path`, returning the captured parameters.
    ///
    /// ```
    /// use crud_http::PathTemplate;
    ///
    /// let template = PathTemplate::parse("/api/data/{collection}/{id}");
    ///
    /// let params = template.matches("/api/data/users/42").unwrap();
    /// assert_eq!(params.get("collection"), Some("users"));
    /// assert_eq!(params.get("id"), Some("42"));
    ///
    /// assert!(template.matches("/api/data/users").is_none());
    /// assert!(template.matches("/api/data/users/42/extra").is_none());
    /// ```
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::default();
        let mut parts = path.split('/');

        for segment in &self.segments {
            let part = parts.next()?;

            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Param(name) if !part.is_empty() => {
                    params.0.push((name.clone(), part.to_owned()));
                }
                _ => return None,
            }
        }

        match parts.next() {
            Some(_) => None,
            None => Some(params),
        }
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Values captured by `{name}` segments, in template order.
///
/// Values are the raw path text, not percent-decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Index<&str> for PathParams {
    type Output = str;

    /// # Panics
    /// If there is no parameter called `name`.
    #[track_caller]
    fn index(&self, name: &str) -> &str {
        match self.get(name) {
            Some(value) => value,
            None => panic!("no path parameter named `{name}`"),
        }
    }
}

/// A synchronous route handler.
///
/// Implemented for every `Fn(&Request, &PathParams, &mut Response)` closure.
pub trait RouteHandler: Send + Sync + 'static {
    fn handle(&self, request: &Request, params: &PathParams, response: &mut Response);
}

impl<F> RouteHandler for F
where
    F: Fn(&Request, &PathParams, &mut Response) + Send + Sync + 'static,
{
    #[inline]
    fn handle(&self, request: &Request, params: &PathParams, response: &mut Response) {
        self(request, params, response)
    }
}

/// One entry of the route table.
pub struct Route {
    method: String,
    template: PathTemplate,
    handler: Box<dyn RouteHandler>,
}

impl Route {
    #[inline(always)]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[inline(always)]
    pub const fn template(&self) -> &PathTemplate {
        &self.template
    }

    #[inline]
    pub fn call(&self, request: &Request, params: &PathParams, response: &mut Response) {
        self.handler.handle(request, params, response)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("template", &self.template.raw)
            .finish_non_exhaustive()
    }
}

/// The route that accepted a request, with its captures.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: PathParams,
}

/// Ordered route table.
///
/// Built before the server starts and shared read-only by every connection
/// afterwards; there is no way to add routes through a shared reference.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    #[inline]
    pub fn new() -> Self {
        Router::default()
    }

    /// Appends a route. The method is compared exactly, case included.
    pub fn route<H: RouteHandler>(mut self, method: &str, template: &str, handler: H) -> Self {
        self.add_route(method, template, handler);
        self
    }

    /// Same as [`route`](Router::route), for a router held by `&mut`.
    pub fn add_route<H: RouteHandler>(&mut self, method: &str, template: &str, handler: H) {
        self.routes.push(Route {
            method: method.to_owned(),
            template: PathTemplate::parse(template),
            handler: Box::new(handler),
        });
    }

    #[inline(always)]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// First route in registration order whose method and template match.
    pub fn find(&self, method: &str, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                let params = route.template.matches(path)?;
                Some(RouteMatch { route, params })
            })
    }

    /// Runs the matching route, or answers `404 {"error":"Not Found"}`.
    pub fn dispatch(&self, request: &Request, response: &mut Response) {
        match self.find(request.method(), request.path()) {
            Some(RouteMatch { route, params }) => route.call(request, &params, response),
            None => {
                response.error(StatusCode::NotFound, "Not Found");
            }
        }

        debug!(
            method = request.method(),
            path = request.path(),
            status = response.status_code(),
            "request handled"
        );
    }
}

impl Handler for Router {
    async fn handle(&self, request: &Request, response: &mut Response) {
        self.dispatch(request, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &'static str) -> impl Fn(&Request, &PathParams, &mut Response) {
        move |_, _, resp| {
            resp.body(name);
        }
    }

    fn run(router: &Router, raw: &str) -> Response {
        let mut resp = Response::new();
        router.dispatch(&Request::parse(raw.as_bytes()), &mut resp);
        resp
    }

    #[test]
    fn template_matching() {
        #[rustfmt::skip]
        let cases = [
            ("/api/data/{collection}/{id}", "/api/data/users/42",        Some(vec![("collection", "users"), ("id", "42")])),
            ("/api/data/{collection}/{id}", "/api/data/users",           None),
            ("/api/data/{collection}/{id}", "/api/data/users/42/extra",  None),
            ("/api/data/{collection}/{id}", "/api/data/users/",          None),
            ("/api/data/{collection}/{id}", "/api/data//42",             None),
            ("/api/data/{collection}",      "/api/data/users",           Some(vec![("collection", "users")])),
            ("/api/data/{collection}",      "/api/data/users/",          None),
            ("/api/files",                  "/api/files",                Some(vec![])),
            ("/api/files",                  "/api/files/",               None),
            ("/api/files",                  "/API/files",                None),
            ("/",                           "/",                         Some(vec![])),
            ("/",                           "",                          None),
            ("/",                           "/x",                        None),
            ("/files/{name}",               "/files/a.png",              Some(vec![("name", "a.png")])),
            ("/files/{name}",               "/files/a%20b.txt",          Some(vec![("name", "a%20b.txt")])),
            ("/v.{n}",                      "/v.1",                      None),
            ("/v.{n}",                      "/v.{n}",                    Some(vec![])),
            ("/{}",                         "/{}",                       Some(vec![])),
        ];

        for (template, path, expected) in cases {
            let template = PathTemplate::parse(template);
            let params = template.matches(path);

            match expected {
                Some(expected) => {
                    let params = params.unwrap_or_else(|| panic!("{template} vs {path}"));
                    assert_eq!(params.iter().collect::<Vec<_>>(), expected);
                }
                None => assert!(params.is_none(), "{template} vs {path}"),
            }
        }
    }

    #[test]
    fn registration_order_wins() {
        let router = Router::new()
            .route("GET", "/items/{id}", tag("generic"))
            .route("GET", "/items/special", tag("specific"));

        let found = router.find("GET", "/items/special").unwrap();
        assert_eq!(found.route.template().as_str(), "/items/{id}");
        assert_eq!(found.params.get("id"), Some("special"));

        let resp = run(&router, "GET /items/special HTTP/1.1\r\n\r\n");
        assert_eq!(resp.body_ref(), &crate::Body::Text("generic".into()));
    }

    #[test]
    fn method_is_exact() {
        let router = Router::new()
            .route("GET", "/x", tag("get"))
            .route("POST", "/x", tag("post"));

        #[rustfmt::skip]
        let cases = [
            ("GET",    Some("get")),
            ("POST",   Some("post")),
            ("get",    None),
            ("DELETE", None),
        ];

        for (method, expected) in cases {
            let found = router.find(method, "/x");
            assert_eq!(found.map(|m| m.route.method().to_ascii_lowercase()), expected.map(String::from));
        }
    }

    #[test]
    fn params_reach_handler() {
        let router = Router::new().route(
            "GET",
            "/api/data/{collection}/{id}",
            |_: &Request, params: &PathParams, resp: &mut Response| {
                resp.body(format!("{}:{}", &params["collection"], &params["id"]));
            },
        );

        let resp = run(&router, "GET /api/data/users/42?x=1 HTTP/1.1\r\n\r\n");
        assert_eq!(resp.body_ref(), &crate::Body::Text("users:42".into()));
    }

    #[test]
    fn unknown_route_is_404_json() {
        let router = Router::new().route("GET", "/", tag("root"));

        for raw in ["GET /nope HTTP/1.1\r\n\r\n", "PATCH / HTTP/1.1\r\n\r\n", ""] {
            let resp = run(&router, raw);

            assert_eq!(resp.status_code(), 404);
            let crate::Body::Text(body) = resp.body_ref() else {
                panic!("404 body must be text");
            };
            let json: serde_json::Value = serde_json::from_str(body).unwrap();
            assert_eq!(json["error"], "Not Found");
        }
    }

    #[test]
    fn add_route_by_ref() {
        let mut router = Router::new();
        router.add_route("DELETE", "/a/{b}", tag("x"));

        assert_eq!(router.routes().len(), 1);
        assert!(router.find("DELETE", "/a/1").is_some());
    }

    #[test]
    #[should_panic(expected = "no path parameter named `missing`")]
    fn index_missing_param() {
        let params = PathTemplate::parse("/{a}").matches("/1").unwrap();
        let _ = &params["missing"];
    }
}
