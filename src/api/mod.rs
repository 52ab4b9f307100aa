//! HTTP API server for docket gateway

pub mod health;
pub mod rate_limit;
pub mod webhooks;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::db::DbPool;
use crate::dispatch::Dispatcher;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub dispatcher: Dispatcher,
    pub rate_limiter: Option<rate_limit::SharedLimiter>,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    db: DbPool,
    dispatcher: Dispatcher,
    port: u16,
    documents_dir: Option<PathBuf>,
    webhook_rpm: Option<u32>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub const fn new(db: DbPool, dispatcher: Dispatcher, port: u16) -> Self {
        Self {
            db,
            dispatcher,
            port,
            documents_dir: None,
            webhook_rpm: None,
        }
    }

    /// Serve locally stored blobs from this directory under `/documents`
    #[must_use]
    pub fn documents_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.documents_dir = dir;
        self
    }

    /// Limit webhook deliveries per minute
    #[must_use]
    pub const fn webhook_rpm(mut self, rpm: Option<u32>) -> Self {
        self.webhook_rpm = rpm;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let rate_limiter = self.webhook_rpm.map(rate_limit::create_limiter);

        let state = Arc::new(ApiState {
            db: self.db,
            dispatcher: self.dispatcher,
            rate_limiter,
        });

        ApiServer {
            state,
            port: self.port,
            documents_dir: self.documents_dir,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    documents_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(webhooks::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()));

        if let Some(dir) = &self.documents_dir {
            router = router.nest_service("/documents", ServeDir::new(dir));
            tracing::info!(path = %dir.display(), "serving stored documents");
        }

        router
            .fallback(not_found)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if self.state.rate_limiter.is_some() {
            tracing::info!("webhook rate limiting active");
        }

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Page not found")
}
