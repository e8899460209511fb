//! API and streaming servers
//!
//! Two listeners share one [`SessionController`]: the JSON API that manages
//! swarms and the range server that media players talk to.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use swarmcast_core::config::{ConfigError, SwarmcastConfig};
use swarmcast_core::{SessionController, SwarmEngine};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::api::{
    add_swarm, health, remove_missing_id, remove_swarm, swarm_status, update_position,
};
use crate::handlers::stream::stream_file;

/// Errors raised while starting or running the servers.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
}

impl AppState {
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self { controller }
    }
}

/// Routes of the JSON API server.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/add", post(add_swarm))
        .route("/status", get(swarm_status))
        .route("/position", post(update_position))
        .route("/remove/{id}", delete(remove_swarm))
        .route("/remove/", delete(remove_missing_id))
        .route("/remove", delete(remove_missing_id))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes of the range streaming server, rooted at the configured stream base.
pub fn stream_router(state: AppState) -> Router {
    let base = state
        .controller
        .config()
        .session
        .stream_base
        .trim_matches('/')
        .to_string();

    Router::new()
        .route(&format!("/{base}/{{id}}/{{file_index}}"), get(stream_file))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bound API and streaming servers, ready to run.
pub struct SwarmcastServer {
    controller: Arc<SessionController>,
    api_listener: TcpListener,
    stream_listener: TcpListener,
    api_addr: SocketAddr,
    stream_addr: SocketAddr,
}

impl SwarmcastServer {
    /// Binds both listeners and builds the session controller.
    ///
    /// Port 0 picks an ephemeral port; the bound port is written back into the
    /// configuration so published stream URLs point at the real listener.
    ///
    /// # Errors
    /// - `ServerError::Config` - Configuration failed validation
    /// - `ServerError::Bind` - A listener could not be bound
    pub async fn bind(
        mut config: SwarmcastConfig,
        engine: Arc<dyn SwarmEngine>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let api_listener = bind_listener(SocketAddr::new(
            config.server.bind_addr,
            config.server.api_port,
        ))
        .await?;
        let stream_listener = bind_listener(SocketAddr::new(
            config.server.bind_addr,
            config.server.stream_port,
        ))
        .await?;

        let api_addr = api_listener.local_addr()?;
        let stream_addr = stream_listener.local_addr()?;
        config.server.api_port = api_addr.port();
        config.server.stream_port = stream_addr.port();

        let controller = Arc::new(SessionController::new(engine, config));

        Ok(Self {
            controller,
            api_listener,
            stream_listener,
            api_addr,
            stream_addr,
        })
    }

    pub fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    pub fn stream_addr(&self) -> SocketAddr {
        self.stream_addr
    }

    pub fn controller(&self) -> Arc<SessionController> {
        self.controller.clone()
    }

    /// Serves both listeners until `shutdown` resolves, releasing every swarm before draining.
    ///
    /// # Errors
    /// - `ServerError::Serve` - Either server stopped with an I/O error
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = AppState::new(self.controller.clone());
        let (stop_tx, stop_rx) = watch::channel(false);

        tracing::info!(
            "API server listening on http://{}, streaming on http://{}",
            self.api_addr,
            self.stream_addr
        );

        let api = axum::serve(self.api_listener, api_router(state.clone()))
            .with_graceful_shutdown(wait_for_stop(stop_rx.clone()));
        let stream = axum::serve(self.stream_listener, stream_router(state))
            .with_graceful_shutdown(wait_for_stop(stop_rx));

        // Releasing first fails any read still waiting on a piece, which
        // closes its response so the graceful drain can finish.
        let controller = self.controller.clone();
        tokio::spawn(async move {
            shutdown.await;
            let released = controller.shutdown();
            tracing::info!("Shutdown requested, released {} swarms", released);
            let _ = stop_tx.send(true);
        });

        let result = tokio::try_join!(api.into_future(), stream.into_future());

        // Sessions added while the servers drained
        let released = self.controller.shutdown();
        tracing::info!("Servers stopped, released {} late swarms", released);

        result.map(|_| ()).map_err(ServerError::from)
    }
}

/// Binds and runs both servers until Ctrl-C.
///
/// # Errors
/// - `ServerError` - Binding or serving failed
pub async fn run_servers(
    config: SwarmcastConfig,
    engine: Arc<dyn SwarmEngine>,
) -> Result<(), ServerError> {
    let server = SwarmcastServer::bind(config, engine).await?;
    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

async fn wait_for_stop(mut stop: watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use swarmcast_core::engine::mock::MockSwarmEngine;

    use super::*;

    fn ephemeral_config() -> SwarmcastConfig {
        let mut config = SwarmcastConfig::for_testing();
        config.server.api_port = 0;
        config.server.stream_port = 0;
        config
    }

    #[tokio::test]
    async fn test_bind_publishes_actual_stream_port() {
        let server = SwarmcastServer::bind(ephemeral_config(), Arc::new(MockSwarmEngine::new()))
            .await
            .unwrap();

        assert_ne!(server.stream_addr().port(), 0);
        assert_ne!(server.api_addr(), server.stream_addr());
        assert_eq!(
            server.controller().config().server.stream_port,
            server.stream_addr().port()
        );
    }

    #[tokio::test]
    async fn test_bind_rejects_port_conflict() {
        let mut config = SwarmcastConfig::for_testing();
        config.server.api_port = 18080;
        config.server.stream_port = 18080;

        let result = SwarmcastServer::bind(config, Arc::new(MockSwarmEngine::new())).await;

        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let server = SwarmcastServer::bind(ephemeral_config(), Arc::new(MockSwarmEngine::new()))
            .await
            .unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(server.run(async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
