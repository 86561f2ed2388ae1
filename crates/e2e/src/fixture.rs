//! Fixture server seam between the orchestrator and `visreg-web`

use crate::error::{RunError, RunResult};
use async_trait::async_trait;
use visreg_common::WebserverConfig;
use visreg_web::ServerHandle;

/// A running fixture server
pub trait FixtureServer: Send {
    fn base_url(&self) -> String;

    /// Stop serving. Repeated calls are no-ops.
    fn stop(&self);
}

/// Starts fixture servers
#[async_trait]
pub trait FixtureHost: Send + Sync {
    type Server: FixtureServer;

    /// Start serving; the server is accepting connections on return
    async fn start(&self) -> RunResult<Self::Server>;
}

/// Hosts fixtures with the `visreg-web` server
#[derive(Debug, Clone)]
pub struct WebFixtureHost {
    config: WebserverConfig,
}

impl WebFixtureHost {
    pub fn new(config: WebserverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FixtureHost for WebFixtureHost {
    type Server = ServerHandle;

    async fn start(&self) -> RunResult<ServerHandle> {
        ServerHandle::start(self.config.clone())
            .await
            .map_err(RunError::Server)
    }
}

impl FixtureServer for ServerHandle {
    fn base_url(&self) -> String {
        ServerHandle::base_url(self)
    }

    fn stop(&self) {
        ServerHandle::stop(self)
    }
}
