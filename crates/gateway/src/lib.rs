//! # wsgate Gateway Library
//!
//! HTTP gateway that gives authenticated callers file access to a per-agent
//! workspace directory, and nothing outside it.
//!
//! ## Overview
//!
//! - **Path Confinement**: lexical normalisation plus symlink checks keep
//!   every operation inside the workspace root
//! - **File Operations**: listing, streaming download, text read/write,
//!   recursive delete, streaming multipart upload
//! - **Pluggable Collaborators**: authorization and workspace location sit
//!   behind traits
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Router (axum)                      │
//! ├──────────────────┬──────────────────┬───────────────────┤
//! │  AuthAuthority   │ WorkspaceLocator │   PathResolver    │
//! ├──────────────────┴──────────────────┴───────────────────┤
//! │        Lister  │  Transfer  │  Multipart Ingest         │
//! ├─────────────────────────────────────────────────────────┤
//! │                      tokio::fs                          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gateway::{Config, GatewayServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let server = GatewayServer::bind(&config).await?;
//!     server.run(CancellationToken::new()).await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`auth`]: Credential extraction and authorization
//! - [`workspace`]: Path resolution and file operations
//! - [`router`]: HTTP routes and handlers
//! - [`server`]: Listener lifecycle
//! - [`logging`]: Tracing subscriber setup
//! - [`error`]: Error taxonomy and HTTP mapping

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod router;
pub mod server;
pub mod workspace;

// Re-export protocol for convenience
pub use protocol;

pub use auth::{AuthAuthority, AuthError, Credentials, Principal, StaticTokenAuthority};
pub use config::{Config, ConfigError};
pub use error::{GatewayError, Result};
pub use router::{build_router, AppState};
pub use server::GatewayServer;
pub use workspace::{AgentId, DirectoryLocator, PathResolver, Workspace, WorkspaceLocator};
