//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Exact routes are
//! registered with [`Router::on`]; whole subtrees (the proxied prefixes) with
//! [`Router::mount`].

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::cors::CorsPolicy;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    cors: Option<CorsPolicy>,
}

pub(crate) enum Lookup {
    Found(BoxedHandler),
    MethodNotAllowed,
    NotFound,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), cors: None }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// ```rust,no_run
    /// # use kontakt_bff::{Method, Request, Response, Router};
    /// # async fn alerts(_: Request) -> Response { Response::text("") }
    /// # async fn clear(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::Get,  "/alerts",      alerts)
    ///     .on(Method::Post, "/clear-cache", clear);
    /// ```
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler.into_boxed_handler())
    }

    /// Register one handler for `prefix` and everything below it, for every
    /// method. The handler sees the original, unstripped path.
    pub fn mount(mut self, prefix: &str, handler: impl Handler) -> Self {
        let prefix = prefix.trim_end_matches('/');
        let boxed = handler.into_boxed_handler();
        let subtree = format!("{prefix}/{{*rest}}");
        for method in Method::ALL {
            self = self
                .add(method, prefix, Arc::clone(&boxed))
                .add(method, &subtree, Arc::clone(&boxed));
        }
        self
    }

    /// Attach the origin gate. Applied to every response, matched or not.
    pub fn cors(mut self, policy: CorsPolicy) -> Self {
        self.cors = Some(policy);
        self
    }

    fn add(mut self, method: Method, path: &str, handler: BoxedHandler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub(crate) fn lookup(&self, method: &http::Method, path: &str) -> Lookup {
        let matched = Method::try_from(method)
            .ok()
            .and_then(|m| self.routes.get(&m))
            .and_then(|tree| tree.at(path).ok());

        if let Some(matched) = matched {
            return Lookup::Found(Arc::clone(matched.value));
        }

        if self.routes.values().any(|tree| tree.at(path).is_ok()) {
            Lookup::MethodNotAllowed
        } else {
            Lookup::NotFound
        }
    }

    /// Routes one request and produces one response, origin gate included.
    pub(crate) async fn handle(&self, req: Request) -> Response {
        let origin = req.header("origin").map(str::to_owned);

        let mut response = match self.lookup(req.method(), req.path()) {
            Lookup::Found(handler) => handler.call(req).await,
            Lookup::MethodNotAllowed => Response::status(Status::MethodNotAllowed),
            Lookup::NotFound => Response::status(Status::NotFound),
        };

        if let Some(cors) = &self.cors {
            cors.apply(origin.as_deref(), response.headers_mut());
        }
        response
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
