//! `visreg serve`: development fixture server

use clap::Args;
use std::path::PathBuf;
use tracing::info;
use visreg_common::WebserverConfig;
use visreg_web::ServerHandle;

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Bind host (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port, 0 for any free port (overrides config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory to serve (overrides config)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Do not reload pages when files change
    #[arg(long)]
    pub no_livereload: bool,

    /// Do not list directories without an index.html
    #[arg(long)]
    pub no_listing: bool,

    /// Do not open the browser
    #[arg(long)]
    pub no_open: bool,
}

/// Server settings for interactive use: live reload, listings and
/// open-on-start are on unless switched off
pub fn dev_config(args: &ServeArgs, mut config: WebserverConfig) -> WebserverConfig {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    config.livereload = !args.no_livereload;
    config.directory_listing = !args.no_listing;
    config.open = !args.no_open;
    config
}

pub async fn execute(args: ServeArgs, config: WebserverConfig) -> anyhow::Result<()> {
    let config = dev_config(&args, config);
    let mut server = ServerHandle::start(config).await?;

    info!("Serving on {}, press Ctrl-C to stop", server.base_url());
    tokio::signal::ctrl_c().await?;

    server.stop();
    server.stopped().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_defaults_on() {
        let config = dev_config(&ServeArgs::default(), WebserverConfig::default());
        assert!(config.livereload);
        assert!(config.directory_listing);
        assert!(config.open);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_overrides() {
        let args = ServeArgs {
            port: Some(0),
            root: Some(PathBuf::from("dist")),
            no_open: true,
            no_livereload: true,
            ..Default::default()
        };
        let config = dev_config(&args, WebserverConfig::default());
        assert_eq!(config.port, 0);
        assert_eq!(config.root, PathBuf::from("dist"));
        assert!(!config.open);
        assert!(!config.livereload);
        assert!(config.directory_listing);
    }
}
