//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store registered routes
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Copy-on-write table: lookups load a snapshot without locking
//! - O(1) exact lookup via HashMap keyed by `METHOD:path`
//! - O(n) pattern scan in registration order (acceptable for typical route counts)
//! - Explicit RouteNotFound rather than silent default

use arc_swap::ArcSwap;
use axum::http::Method;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};
use crate::routing::route::{route_key, Route};

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    /// Values captured by `{name}` segments.
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
struct RouteTable {
    /// Registration order.
    routes: Vec<Arc<Route>>,
    /// `METHOD:pattern` → index into `routes`.
    index: HashMap<String, usize>,
}

impl RouteTable {
    fn upsert(&mut self, route: Arc<Route>) -> bool {
        let key = route.key();
        match self.index.get(&key) {
            Some(&pos) => {
                self.routes[pos] = route;
                true
            }
            None => {
                self.index.insert(key, self.routes.len());
                self.routes.push(route);
                false
            }
        }
    }
}

/// The route registry.
#[derive(Debug, Default)]
pub struct Router {
    table: ArcSwap<RouteTable>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a route, overwriting one with the same key in its original position.
    pub fn register(&self, route: Route) {
        let route = Arc::new(route);
        let mut replaced = false;
        self.table.rcu(|table| {
            let mut next = RouteTable::clone(table);
            replaced = next.upsert(route.clone());
            next
        });

        tracing::info!(
            method = %route.method,
            path = %route.pattern.as_str(),
            service = %route.service_name,
            replaced,
            "Route registered"
        );
    }

    /// Resolve a request to a route.
    ///
    /// Exact patterns win; otherwise routes of the same method are tried in
    /// registration order and the first match wins.
    pub fn match_route(&self, method: &Method, path: &str) -> GatewayResult<RouteMatch> {
        let table = self.table.load();

        if let Some(&pos) = table.index.get(&route_key(method, path)) {
            let route = &table.routes[pos];
            if route.pattern.is_exact() {
                return Ok(RouteMatch {
                    route: route.clone(),
                    params: HashMap::new(),
                });
            }
        }

        table
            .routes
            .iter()
            .filter(|r| r.method == *method && !r.pattern.is_exact())
            .find_map(|r| {
                r.pattern.captures(path).map(|params| RouteMatch {
                    route: r.clone(),
                    params,
                })
            })
            .ok_or_else(|| GatewayError::RouteNotFound {
                method: method.to_string(),
                path: path.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.table.load().routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered routes in registration order.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.table.load().routes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(method: Method, path: &str, service: &str) -> Route {
        Route::new(method, path, service).unwrap()
    }

    #[test]
    fn exact_match_beats_earlier_pattern() {
        let router = Router::new();
        router.register(route(Method::GET, "/users/{id}", "by-id"));
        router.register(route(Method::GET, "/users/me", "me"));

        let m = router.match_route(&Method::GET, "/users/me").unwrap();
        assert_eq!(m.route.service_name, "me");

        let m = router.match_route(&Method::GET, "/users/7").unwrap();
        assert_eq!(m.route.service_name, "by-id");
        assert_eq!(m.params["id"], "7");
    }

    #[test]
    fn first_registered_pattern_wins() {
        let router = Router::new();
        router.register(route(Method::GET, "/files/*", "wild"));
        router.register(route(Method::GET, "/files/{name}", "named"));

        let m = router.match_route(&Method::GET, "/files/a.txt").unwrap();
        assert_eq!(m.route.service_name, "wild");
    }

    #[test]
    fn method_must_match() {
        let router = Router::new();
        router.register(route(Method::POST, "/orders", "orders"));
        router.register(route(Method::POST, "/orders/{id}", "orders"));

        let err = router.match_route(&Method::GET, "/orders").unwrap_err();
        assert_eq!(
            err,
            GatewayError::RouteNotFound {
                method: "GET".into(),
                path: "/orders".into()
            }
        );
        assert!(router.match_route(&Method::GET, "/orders/1").is_err());
    }

    #[test]
    fn overwrite_keeps_registration_position() {
        let router = Router::new();
        router.register(route(Method::GET, "/a/*", "first"));
        router.register(route(Method::GET, "/a/{x}", "second"));
        router.register(route(Method::GET, "/a/*", "first-v2"));

        assert_eq!(router.len(), 2);
        let m = router.match_route(&Method::GET, "/a/b").unwrap();
        assert_eq!(m.route.service_name, "first-v2");
        assert_eq!(router.routes()[0].service_name, "first-v2");
    }

    #[test]
    fn unregistered_pair_is_not_found() {
        let router = Router::new();
        assert!(router.is_empty());
        assert!(matches!(
            router.match_route(&Method::DELETE, "/nothing"),
            Err(GatewayError::RouteNotFound { .. })
        ));
    }
}
