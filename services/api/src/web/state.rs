//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::rate_limit::UploadLimiter;
use crate::web::registry::SessionRegistry;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// One HTTP client shared by every adapter instance.
    pub http: reqwest::Client,
    pub registry: Arc<SessionRegistry>,
    /// The process-wide upload limiter shared by all sync jobs.
    pub limiter: Arc<UploadLimiter>,
}
