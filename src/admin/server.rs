use crate::application::WorkflowCoordinator;
use crate::config::AdminConfig;
use crate::error::{ApplybotError, Result};
use crate::health::HealthReporter;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::handlers::{
    get_application_handler, health_handler, list_applications_handler, stats_handler,
    update_status_handler,
};

/// Shared state for the admin HTTP server
#[derive(Clone)]
pub struct AdminState {
    pub(crate) coordinator: Arc<WorkflowCoordinator>,
    pub(crate) reporter: HealthReporter,
}

/// Health endpoint plus the administrator review API
pub struct AdminServer {
    pub(crate) config: AdminConfig,
    state: AdminState,
}

impl AdminServer {
    pub fn new(
        config: AdminConfig,
        coordinator: Arc<WorkflowCoordinator>,
        reporter: HealthReporter,
    ) -> Self {
        Self {
            config,
            state: AdminState {
                coordinator,
                reporter,
            },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/applications", get(list_applications_handler))
            .route("/api/applications/:id", get(get_application_handler))
            .route("/api/applications/:id/status", post(update_status_handler))
            .route("/api/stats", get(stats_handler))
            .with_state(self.state.clone())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    /// Bind the listening socket. Fails if the address is unavailable.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.address();
        info!("Starting admin server on {}", addr);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            ApplybotError::component("admin_server".to_string(), format!("Failed to bind {}: {}", addr, e))
        })?;

        info!("Admin server listening on {}", addr);
        Ok(listener)
    }

    /// Serve on a bound listener until `shutdown` is cancelled
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| {
                ApplybotError::component("admin_server".to_string(), format!("Server error: {}", e))
            })?;

        info!("Admin server stopped");
        Ok(())
    }
}
