//! Route table.
//!
//! Each binding's route template is compiled into an anchored regex where
//! `{name}` captures one path segment. Candidates are tried most specific
//! first: fewer parameters, then longer templates.

use std::cmp::Ordering;
use std::sync::Arc;

use http::Method;
use indexmap::IndexMap;
use ptolemy_compiler::CompiledBinding;
use regex::Regex;

use crate::error::{ServerError, ServerResult};

struct Route {
    binding: Arc<CompiledBinding>,
    pattern: Regex,
    params: Vec<String>,
    shape: String,
}

/// Outcome of matching a request against the table.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// A binding accepts this method and path.
    Matched {
        /// The binding.
        binding: &'a Arc<CompiledBinding>,
        /// Captured path segments by parameter name.
        params: IndexMap<String, String>,
    },
    /// The path exists, but not for this method.
    MethodNotAllowed {
        /// Methods the path accepts.
        allowed: Vec<Method>,
    },
    /// No route has this path.
    NotFound,
}

/// All routes served by a dispatcher.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding.
    ///
    /// Fails if another binding has the same method and route shape;
    /// `/a/{id}` and `/a/{key}` have the same shape.
    pub fn insert(&mut self, binding: CompiledBinding) -> ServerResult<()> {
        let shape = shape_of(&binding.route);
        if self
            .routes
            .iter()
            .any(|r| r.binding.method == binding.method && r.shape == shape)
        {
            return Err(ServerError::RouteConflict {
                method: binding.method.to_string(),
                route: binding.route,
            });
        }

        let (pattern, params) = compile_route(&binding.route)?;
        self.routes.push(Route {
            binding: Arc::new(binding),
            pattern,
            params,
            shape,
        });
        self.routes
            .sort_by(|a, b| route_specificity(&a.binding.route, &b.binding.route));
        Ok(())
    }

    /// Matches a method and path.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_> {
        let mut allowed = Vec::new();
        for route in &self.routes {
            let Some(captures) = route.pattern.captures(path) else {
                continue;
            };
            if route.binding.method != *method {
                if !allowed.contains(&route.binding.method) {
                    allowed.push(route.binding.method.clone());
                }
                continue;
            }
            let params = route
                .params
                .iter()
                .zip(captures.iter().skip(1))
                .filter_map(|(name, m)| m.map(|m| (name.clone(), m.as_str().to_string())))
                .collect();
            return Resolution::Matched {
                binding: &route.binding,
                params,
            };
        }

        if allowed.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::MethodNotAllowed { allowed }
        }
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if the table has no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Bindings, most specific first.
    pub fn bindings(&self) -> impl Iterator<Item = &Arc<CompiledBinding>> {
        self.routes.iter().map(|r| &r.binding)
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.routes
                    .iter()
                    .map(|r| format!("{} {}", r.binding.method, r.binding.route)),
            )
            .finish()
    }
}

fn compile_route(template: &str) -> ServerResult<(Regex, Vec<String>)> {
    let mut pattern = String::from("^");
    let mut params = Vec::new();

    for segment in template.split('/').filter(|s| !s.is_empty()) {
        pattern.push('/');
        if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            params.push(name.to_string());
            pattern.push_str("([^/]+)");
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }

    if params.is_empty() && pattern == "^" {
        pattern.push_str("/$");
    } else {
        pattern.push_str("/?$");
    }

    let regex = Regex::new(&pattern).map_err(|e| ServerError::InvalidRoute {
        route: template.to_string(),
        details: e.to_string(),
    })?;
    Ok((regex, params))
}

fn shape_of(template: &str) -> String {
    template
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| if s.starts_with('{') { "{}" } else { s })
        .collect::<Vec<_>>()
        .join("/")
}

fn route_specificity(a: &str, b: &str) -> Ordering {
    let a_params = a.matches('{').count();
    let b_params = b.matches('{').count();
    a_params.cmp(&b_params).then_with(|| b.len().cmp(&a.len()))
}
