//! Fixture server implementation

use crate::dynamic::dynamic_page_middleware;
use crate::livereload::{self, ReloadHub};
use crate::static_files::static_handler;
use anyhow::Context;
use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use visreg_common::WebserverConfig;

/// Path of the health endpoint
pub const HEALTH_PATH: &str = "/__health";

/// Fixture web server
#[derive(Clone)]
pub struct WebServer {
    state: Arc<WebServerState>,
}

pub(crate) struct WebServerState {
    pub(crate) config: WebserverConfig,

    /// Set when live reload is enabled
    pub(crate) reload: Option<ReloadHub>,

    /// Cancelled when the server shuts down; ends long-lived streams
    pub(crate) shutdown: CancellationToken,
}

impl WebServer {
    pub fn new(config: WebserverConfig) -> Self {
        let reload = config.livereload.then(ReloadHub::new);
        Self::with_parts(config, reload, CancellationToken::new())
    }

    fn with_parts(
        config: WebserverConfig,
        reload: Option<ReloadHub>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state: Arc::new(WebServerState {
                config,
                reload,
                shutdown,
            }),
        }
    }

    pub fn config(&self) -> &WebserverConfig {
        &self.state.config
    }

    /// Live reload hub, if enabled
    pub fn reload_hub(&self) -> Option<&ReloadHub> {
        self.state.reload.as_ref()
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let mut router = Router::new().route(HEALTH_PATH, get(health_handler));

        if self.state.reload.is_some() {
            router = router.route(livereload::EVENTS_PATH, get(livereload::events_handler));
        }

        router
            .fallback(static_handler)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                dynamic_page_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Handle to a running fixture server
///
/// The listener is bound before [`ServerHandle::start`] returns. Dropping the
/// handle stops the server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl ServerHandle {
    /// Bind and start serving `config.root`
    pub async fn start(config: WebserverConfig) -> anyhow::Result<Self> {
        let shutdown = CancellationToken::new();
        let reload = config.livereload.then(ReloadHub::new);
        let watcher = match &reload {
            Some(hub) => Some(
                livereload::watch(&config.root, hub.clone())
                    .with_context(|| format!("watching {}", config.root.display()))?,
            ),
            None => None,
        };

        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
            .await
            .with_context(|| format!("binding {}:{}", config.host, config.port))?;
        let addr = listener.local_addr()?;

        let open_on_start = config.open;
        let router = WebServer::with_parts(config, reload, shutdown.clone()).router();

        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("Fixture server error: {}", e);
            }
        });

        let handle = Self {
            addr,
            shutdown,
            task: Some(task),
            _watcher: watcher,
        };
        info!("Fixture server listening on {}", handle.base_url());

        if open_on_start {
            if let Err(e) = open::that(handle.base_url()) {
                warn!("Could not open browser: {}", e);
            }
        }

        Ok(handle)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request shutdown. Calling this more than once is a no-op.
    pub fn stop(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Stopping fixture server on {}", self.addr);
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait until the server task has exited
    pub async fn stopped(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
