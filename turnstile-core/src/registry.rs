//! Per-route idempotency configuration.
//!
//! Routes are registered at startup with a method and a path template
//! (`/usuarios/:id` or `/usuarios/{id}`); lookups match a concrete request
//! path against the templates. This replaces annotation-driven per-route
//! markers with an explicit registry.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Idempotency settings for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteIdempotencyConfig {
    /// Whether writes through this route are deduplicated.
    pub enabled: bool,
    /// How long a completed result stays replayable.
    pub expire_after: Duration,
}

impl RouteIdempotencyConfig {
    pub fn enabled(expire_after: Duration) -> Self {
        Self {
            enabled: true,
            expire_after,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

#[derive(Debug, Clone)]
struct RegisteredRoute {
    method: String,
    segments: Vec<Segment>,
    config: RouteIdempotencyConfig,
}

/// Startup-populated mapping from `(method, path template)` to config.
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    routes: Vec<RegisteredRoute>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: &str, template: &str, config: RouteIdempotencyConfig) {
        self.routes.push(RegisteredRoute {
            method: method.to_ascii_uppercase(),
            segments: parse_template(template),
            config,
        });
    }

    /// Find the configuration for a concrete request, if any route matches.
    pub fn lookup(&self, method: &str, path: &str) -> Option<RouteIdempotencyConfig> {
        let segments: Vec<&str> = split_path(path);
        self.routes
            .iter()
            .find(|route| {
                route.method.eq_ignore_ascii_case(method) && matches(&route.segments, &segments)
            })
            .map(|route| route.config.clone())
    }

    pub fn is_idempotent(&self, method: &str, path: &str) -> bool {
        self.lookup(method, path).map_or(false, |c| c.enabled)
    }

    pub fn expire_after(&self, method: &str, path: &str) -> Option<Duration> {
        self.lookup(method, path)
            .filter(|c| c.enabled)
            .map(|c| c.expire_after)
    }
}

fn parse_template(template: &str) -> Vec<Segment> {
    split_path(template)
        .into_iter()
        .map(|segment| {
            let is_param = segment.starts_with(':')
                || (segment.starts_with('{') && segment.ends_with('}'));
            if is_param {
                Segment::Param
            } else {
                Segment::Literal(segment.to_string())
            }
        })
        .collect()
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn matches(template: &[Segment], path: &[&str]) -> bool {
    template.len() == path.len()
        && template.iter().zip(path).all(|(segment, actual)| match segment {
            Segment::Literal(expected) => expected == actual,
            Segment::Param => true,
        })
}
