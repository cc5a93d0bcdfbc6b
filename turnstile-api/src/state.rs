//! Shared application state for Axum routers.

use std::sync::Arc;

use crate::repo::UserRepo;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<UserRepo>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(repo: Arc<UserRepo>) -> Self {
        Self {
            repo,
            start_time: std::time::Instant::now(),
        }
    }
}
