//! Console server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use super::router::{AppState, create_router};
use crate::config::{Config, CredentialProvider};
use crate::random::{SecureRandom, SystemRandom};
use crate::session::SessionStore;
use crate::{Error, Result};

/// VPN console server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Randomness for session tokens
    rng: Arc<dyn SecureRandom>,
    /// Extra routes guarded by the session middleware
    protected: Router<Arc<AppState>>,
}

impl Gateway {
    /// Create a new server
    pub fn new(config: Config) -> Self {
        Self {
            config,
            rng: Arc::new(SystemRandom),
            protected: Router::new(),
        }
    }

    /// Mount additional routes that require an admin session
    #[must_use]
    pub fn with_protected_routes(mut self, routes: Router<Arc<AppState>>) -> Self {
        self.protected = self.protected.merge(routes);
        self
    }

    /// Run until Ctrl-C or SIGTERM, then stop background session work
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let auth = &self.config.auth;
        let sessions = Arc::new(SessionStore::new(auth.session_ttl, Arc::clone(&self.rng)));
        sessions.spawn_cleanup(auth.cleanup_interval);

        let credentials: Arc<dyn CredentialProvider> = Arc::new(auth.clone());
        let configured = credentials.admin_credentials().is_some();
        let state = Arc::new(AppState::new(Arc::clone(&sessions), credentials));

        let app = create_router(state, self.protected);

        // Bind listener
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("VPN CONSOLE v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(
            session_ttl = ?auth.session_ttl,
            cleanup_interval = ?auth.cleanup_interval,
            secure_cookies = auth.https_enabled,
            "Sessions"
        );
        if configured {
            info!(username = %auth.username, "Admin login enabled");
        } else {
            warn!("Admin credentials not configured - every login will fail");
        }
        info!("============================================================");

        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()));

        info!("Stopping session maintenance...");
        sessions.shutdown().await;

        served
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
