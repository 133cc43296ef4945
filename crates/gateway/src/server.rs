//! Server lifecycle: bind, serve, graceful shutdown.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::router::{build_router, AppState};

/// A bound, not yet running, gateway server.
pub struct GatewayServer {
    listener: TcpListener,
    router: Router,
}

impl GatewayServer {
    /// Bind the listener and build the router from configuration.
    pub async fn bind(config: &Config) -> Result<Self> {
        let addr = config.bind_addr()?;
        let state = AppState::from_config(config)?;
        Self::bind_with(addr, state).await
    }

    /// Bind `addr` and serve the given state.
    pub async fn bind_with(addr: SocketAddr, state: AppState) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        Ok(Self {
            listener,
            router: build_router(state),
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Serve until `shutdown` is cancelled, then drain in-flight requests.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Workspace gateway listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("Server terminated with an error")?;

        info!("Workspace gateway stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenAuthority;
    use crate::workspace::{AgentId, DirectoryLocator};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let state = AppState::new(
            Arc::new(StaticTokenAuthority::new("s3cret", None)),
            Arc::new(DirectoryLocator::new(temp_dir.path())),
            AgentId::parse("main").unwrap(),
            1024,
        );
        let server = GatewayServer::bind_with("127.0.0.1:0".parse().unwrap(), state)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#"{"status":"ok"}"#));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let mut config = Config::default();
        config.server.bind_addr = "not an address".to_string();

        assert!(GatewayServer::bind(&config).await.is_err());
    }
}
