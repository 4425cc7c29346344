//! Request routing for greetwatch
//!
//! [`RouteTable`] collects route definitions at startup and rejects duplicates
//! before anything is served. [`RouteTable::build`] turns the table into a
//! [`Dispatcher`] backed by an axum router, with the per-template request
//! counter installed on every route.

pub mod handler;
pub mod template;

pub use handler::{BoxedHandler, Handler, HandlerResult, RouteRequest};
pub use template::PathTemplate;

use crate::error::{AppError, AppResult};
use crate::metrics::MetricRegistry;
use crate::middleware::{REQUEST_COUNTER, TemplateCounters, count_by_template};
use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

/// Body of the 404 response for unmatched requests
pub const NOT_FOUND_BODY: &str = "404 page not found";

/// A registered route
pub struct RouteDefinition {
    template: PathTemplate,
    methods: Vec<Method>,
    handler: BoxedHandler,
}

impl RouteDefinition {
    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }
}

impl std::fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("template", &self.template.as_str())
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

/// Startup-time collection of routes
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<RouteDefinition>,
    // shape -> template as first registered
    shapes: HashMap<String, String>,
    registered: HashSet<(String, Method)>,
    counter_name: Option<String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different metric name for the per-template request counter
    pub fn with_counter_name(mut self, name: impl Into<String>) -> Self {
        self.counter_name = Some(name.into());
        self
    }

    /// Register `handler` for `template` under every method in `methods`
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidRouteTemplate`] if the template is malformed or no
    ///   method is given
    /// - [`AppError::DuplicateRoute`] if any (template, method) pair already exists
    /// - [`AppError::ConflictingRoute`] if a template with the same shape but
    ///   different placeholder names is registered
    /// - [`AppError::UnsupportedMethod`] for methods axum cannot filter on
    pub fn register<H: Handler>(
        &mut self,
        template: &str,
        methods: &[Method],
        handler: H,
    ) -> AppResult<&mut Self> {
        let template = PathTemplate::parse(template)?;

        if methods.is_empty() {
            return Err(AppError::InvalidRouteTemplate {
                template: template.to_string(),
                reason: "no HTTP method given".to_string(),
            });
        }

        if let Some(existing) = self.shapes.get(&template.shape()) {
            if existing != template.as_str() {
                return Err(AppError::ConflictingRoute {
                    template: template.to_string(),
                    existing: existing.clone(),
                });
            }
        }

        let mut methods_seen = HashSet::new();
        for method in methods {
            MethodFilter::try_from(method.clone())
                .map_err(|_| AppError::UnsupportedMethod(method.clone()))?;
            if !methods_seen.insert(method.clone())
                || self
                    .registered
                    .contains(&(template.to_string(), method.clone()))
            {
                return Err(AppError::DuplicateRoute {
                    template: template.to_string(),
                    method: method.clone(),
                });
            }
        }

        for method in methods {
            self.registered
                .insert((template.to_string(), method.clone()));
        }
        self.shapes
            .insert(template.shape(), template.to_string());

        tracing::debug!(template = %template, methods = ?methods, "Registered route");

        self.routes.push(RouteDefinition {
            template,
            methods: methods.to_vec(),
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    /// Shorthand for registering a GET route
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn get<H: Handler>(&mut self, template: &str, handler: H) -> AppResult<&mut Self> {
        self.register(template, &[Method::GET], handler)
    }

    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    /// Distinct templates in registration order
    pub fn templates(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.routes
            .iter()
            .map(|r| r.template.as_str())
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Finalize the table into a dispatcher
    ///
    /// Registers one request counter per template in `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request counters cannot be registered.
    pub fn build(self, registry: &MetricRegistry) -> AppResult<Dispatcher> {
        let counter_name = self.counter_name.as_deref().unwrap_or(REQUEST_COUNTER);
        let counters = TemplateCounters::register(registry, counter_name, self.templates())?;

        let mut grouped: BTreeMap<String, MethodRouter> = BTreeMap::new();
        for route in self.routes {
            let label: Arc<str> = Arc::from(route.template.as_str());
            let template = Arc::new(route.template);
            for method in &route.methods {
                let filter = MethodFilter::try_from(method.clone())
                    .map_err(|_| AppError::UnsupportedMethod(method.clone()))?;
                let method_router = grouped
                    .remove(label.as_ref())
                    .unwrap_or_else(MethodRouter::new);
                let method_router = bind_endpoint(
                    method_router,
                    filter,
                    Endpoint {
                        template: Arc::clone(&template),
                        label: Arc::clone(&label),
                        handler: Arc::clone(&route.handler),
                    },
                );
                grouped.insert(label.to_string(), method_router);
            }
        }

        let mut router = axum::Router::new();
        for (template, method_router) in grouped {
            router = router.route(&template, method_router);
        }

        let router = router
            .route_layer(CatchPanicLayer::custom(panic_response))
            .route_layer(middleware::from_fn_with_state(
                counters.clone(),
                count_by_template,
            ))
            .fallback(not_found)
            .layer(TraceLayer::new_for_http());

        Ok(Dispatcher { router, counters })
    }
}

#[derive(Clone)]
struct Endpoint {
    template: Arc<PathTemplate>,
    label: Arc<str>,
    handler: BoxedHandler,
}

// Placeholders are bound from the raw path, not axum's `Path` extractor, so a
// matched request always reaches the handler even when a value is not UTF-8.
fn bind_endpoint(
    method_router: MethodRouter,
    filter: MethodFilter,
    endpoint: Endpoint,
) -> MethodRouter {
    method_router.on(filter, move |request: Request| {
        invoke(endpoint.clone(), request)
    })
}

async fn invoke(endpoint: Endpoint, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    let params = if endpoint.template.is_templated() {
        endpoint.template.bind(parts.uri.path())
    } else {
        HashMap::new()
    };
    let route_request = RouteRequest::new(Arc::clone(&endpoint.label), parts, params);

    match endpoint.handler.call(route_request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(template = %endpoint.label, error = %e, "Handler failed");
            e.into_response()
        }
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Internal error: handler panicked: {}", detail),
    )
        .into_response()
}

/// Finalized, read-only routing table
#[derive(Clone)]
pub struct Dispatcher {
    router: axum::Router,
    counters: TemplateCounters,
}

impl Dispatcher {
    /// Route one request and return its response
    pub async fn dispatch(&self, request: Request) -> Response {
        match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    /// Per-template request counters installed by [`RouteTable::build`]
    pub fn counters(&self) -> &TemplateCounters {
        &self.counters
    }

    /// The underlying axum router, for `axum::serve`
    pub fn into_router(self) -> axum::Router {
        self.router
    }
}
