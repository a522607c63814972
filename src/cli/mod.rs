use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::clipboard::{create_provider, ClipboardProvider};
use crate::config::Config;
use crate::shutdown::{install_signal_handlers, Shutdown};
use crate::sync::{PeerSession, Relay};
use crate::transport::reconnect::Backoff;
use crate::transport::{ReconnectionConfig, WsListener};

#[derive(Parser)]
#[command(name = "clipbridge")]
#[command(about = "Clipboard synchronization bridge between a relay and its peers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the relay that peers connect to")]
    Relay {
        #[arg(long, help = "Address to listen on")]
        host: Option<String>,

        #[arg(short, long, help = "Port to listen on")]
        port: Option<u16>,
    },

    #[command(about = "Connect to a relay and sync this machine's clipboard")]
    Peer {
        #[arg(long, help = "Relay host")]
        host: Option<String>,

        #[arg(short, long, help = "Relay port")]
        port: Option<u16>,

        #[arg(long, help = "Reconnect with backoff when the relay goes away")]
        reconnect: bool,
    },

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Generate example configuration")]
    Init {
        #[arg(long)]
        force: bool,
    },

    #[command(about = "Validate configuration")]
    Validate,
}

pub struct CliHandler {
    config_path: Option<PathBuf>,
    config: Option<Arc<Config>>,
}

impl CliHandler {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self {
            config_path,
            config: None,
        }
    }

    /// Lazily load the configuration when needed
    fn ensure_config(&mut self) -> Result<Arc<Config>> {
        if let Some(config) = &self.config {
            return Ok(config.clone());
        }
        let config = Arc::new(
            Config::load_config(self.config_path.as_deref())
                .context("Failed to load configuration")?,
        );
        self.config = Some(config.clone());
        Ok(config)
    }

    /// Log level from the configuration, `info` if it cannot be loaded yet
    pub fn configured_log_level(&mut self) -> String {
        self.ensure_config()
            .map(|config| config.log_level.clone())
            .unwrap_or_else(|_| "info".to_string())
    }

    pub async fn handle_command(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Relay { host, port } => self.run_relay(host, port).await,
            Commands::Peer {
                host,
                port,
                reconnect,
            } => self.run_peer(host, port, reconnect).await,
            Commands::Config { action } => self.handle_config_action(action),
        }
    }

    fn clipboard(config: &Config) -> Arc<dyn ClipboardProvider> {
        let provider: Arc<dyn ClipboardProvider> = Arc::from(create_provider(config.clipboard.backend));
        info!("Using {} clipboard", provider.name());
        provider
    }

    async fn run_relay(&mut self, host: Option<String>, port: Option<u16>) -> Result<()> {
        let mut config = (*self.ensure_config()?).clone();
        if let Some(host) = host {
            config.relay.host = host;
        }
        if let Some(port) = port {
            config.relay.port = port;
        }
        config.validate_config()?;

        let shutdown = Shutdown::new();
        install_signal_handlers(shutdown.clone());

        let addr = config.relay_bind_addr();
        let listener = WsListener::bind(&addr, config.relay_websocket())
            .await
            .with_context(|| format!("Failed to bind relay to {}", addr))?;

        let relay = Arc::new(Relay::new(Self::clipboard(&config), config.timing()));
        info!("Starting ClipBridge relay");
        relay.serve(listener, shutdown).await?;

        info!("Relay stopped");
        Ok(())
    }

    async fn run_peer(&mut self, host: Option<String>, port: Option<u16>, reconnect: bool) -> Result<()> {
        let mut config = (*self.ensure_config()?).clone();
        if let Some(host) = host {
            config.peer.server_host = host;
        }
        if let Some(port) = port {
            config.peer.server_port = port;
        }
        config.validate_config()?;
        let reconnect = reconnect || config.peer.reconnect;

        let shutdown = Shutdown::new();
        install_signal_handlers(shutdown.clone());

        let session = Arc::new(PeerSession::new(
            Self::clipboard(&config),
            config.timing(),
            config.sync.pending_capacity,
        ));
        let url = config.peer_url();
        let ws_config = config.peer_websocket();
        let mut backoff = Backoff::new(ReconnectionConfig::default());

        info!("Starting ClipBridge peer");
        loop {
            let result = session.run(&url, &ws_config, &shutdown).await;
            if shutdown.is_triggered() {
                break;
            }

            match result {
                Ok(()) if !reconnect => break,
                Ok(()) => backoff.reset(),
                Err(e) if !reconnect => {
                    return Err(e).with_context(|| format!("Connection to {} failed", url));
                }
                Err(e) => warn!("Connection to {} failed: {}", url, e),
            }

            let Some(delay) = backoff.next_delay() else {
                bail!("Giving up after {} reconnection attempts", backoff.attempts());
            };
            info!(
                pending = session.pending().len(),
                "Reconnecting in {:?} (attempt {})",
                delay,
                backoff.attempts()
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait() => break,
            }
        }

        info!("Peer stopped");
        Ok(())
    }

    fn handle_config_action(&mut self, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                let config = self.ensure_config()?;
                println!("Current Configuration:");
                println!("{}", toml::to_string_pretty(&*config)?);
            }
            ConfigAction::Init { force } => {
                let path = match &self.config_path {
                    Some(path) => path.clone(),
                    None => Config::default_path()
                        .ok_or_else(|| anyhow!("Could not find config directory"))?,
                };
                Config::write_example(&path, force)?;
                println!("Example configuration written to {}", path.display());
            }
            ConfigAction::Validate => {
                let path = self.config_path.clone().or_else(Config::find_config_path);
                match path {
                    Some(path) => {
                        Config::validate(&path)
                            .with_context(|| format!("{} is not valid", path.display()))?;
                        println!("Configuration is valid: {}", path.display());
                    }
                    None => println!("No configuration file found, defaults are in use"),
                }
            }
        }
        Ok(())
    }
}
