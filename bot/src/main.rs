//! propolis-bot CLI entry point.
//!
//! Provides `start` to run the relay daemon and `check-config` to validate
//! a configuration file.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use propolis::analyzer::ReleaseAnalyzer;
use propolis_bot::config::{default_config_path, default_logs_dir, load_bot_config, BotConfig};
use propolis_bot::dedup::DedupStore;
use propolis_bot::ingest::{self, IngestState};
use propolis_bot::relay::{Relay, RelaySettings, Role};
use propolis_bot::snatch::VarroaSnatcher;
use propolis_bot::transport::irc::{IrcSettings, IrcTransport};
use propolis_bot::transport::{ChannelSender, TransportEvent};
use propolis_bot::uploads::{http_client, HttpPasteService, ImageHost, PtpImgHost};

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// propolis-bot: relays propolis reports to IRC.
#[derive(Parser)]
#[command(name = "propolis-bot", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the relay daemon.
    Start {
        /// Configuration file (default: ./propolis-bot.toml).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate the configuration and print it with secrets masked.
    CheckConfig {
        /// Configuration file (default: ./propolis-bot.toml).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // Secrets may also come from a .env file in the working directory.
    let _ = dotenvy::dotenv();

    match cli.command {
        Command::Start { config } => handle_start(config).await,
        Command::CheckConfig { config } => handle_check_config(config),
    }
}

fn load(config: Option<PathBuf>) -> anyhow::Result<(PathBuf, BotConfig)> {
    let path = config.unwrap_or_else(default_config_path);
    let loaded = load_bot_config(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok((path, loaded))
}

fn handle_check_config(config: Option<PathBuf>) -> anyhow::Result<()> {
    propolis::logging::init_cli();
    let (path, config) = load(config)?;
    println!("{}: OK", path.display());
    println!("{}", config.redacted());
    Ok(())
}

/// Run the relay daemon until Ctrl-C.
async fn handle_start(config: Option<PathBuf>) -> anyhow::Result<()> {
    let (config_path, config) = load(config)?;

    let logs_dir = config.general.logs_dir.clone().unwrap_or_else(default_logs_dir);
    let _logging_guard = propolis::logging::init_production(&logs_dir, "propolis-bot.log")?;

    let role = config.irc.role;
    let (transport, handle) = IrcTransport::new(IrcSettings {
        server: config.irc.server.clone(),
        port: config.irc.port,
        use_tls: config.irc.tls,
        nickname: config.irc.nickname.clone(),
        username: config.irc.username().to_owned(),
        realname: config.irc.realname.clone(),
    });
    let sender: Arc<dyn ChannelSender> = Arc::new(handle);

    let settings = RelaySettings {
        channel: config.irc.channel.clone(),
        central_bot: config.irc.central_bot.clone(),
        nickserv_password: config.irc.nickserv_password.clone(),
        gatekeeper: config.irc.gatekeeper.clone(),
        key: config.irc.key.clone(),
        settle_delay: config.irc.settle_delay(),
        trusted_origin: config.general.paste_url.clone(),
        ttl: config.store.ttl(),
    };

    let store = match role {
        Role::Central => Some(Arc::new(
            DedupStore::open(&config.store.path)
                .await
                .with_context(|| format!("failed to open {}", config.store.path.display()))?,
        )),
        Role::Node => None,
    };
    let client = http_client(config.http.timeout()).context("failed to build HTTP client")?;
    let mut relay = match &store {
        Some(store) => Relay::central(settings, Arc::clone(&sender), Arc::clone(store)),
        None => Relay::node(settings, Arc::clone(&sender)),
    }
    .context("failed to build relay")?;
    if let Some(varroa) = &config.varroa {
        info!(site = %varroa.site, "!propolis enabled");
        relay = relay.with_snatcher(Arc::new(VarroaSnatcher::new(client.clone(), varroa.clone())));
    }
    let relay = Arc::new(relay);

    // Ingestion server.
    let paste = Arc::new(HttpPasteService::new(client.clone(), config.general.paste_url.clone()));
    let mut state = IngestState::new(
        Arc::clone(&relay),
        Arc::new(ReleaseAnalyzer::new()),
        paste,
        config.tracker.permalink_base.clone(),
    );
    match &config.general.image_host_key {
        Some(key) => {
            let host: Arc<dyn ImageHost> = Arc::new(PtpImgHost::new(
                client,
                config.general.image_host_url.clone(),
                key.clone(),
            ));
            state = state.with_image_host(host);
        }
        None => warn!("no image host key configured, overviews will not be uploaded"),
    }

    let bind = format!("{}:{}", config.ingest.bind, config.ingest.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind ingestion server on {bind}"))?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(ingest::serve(listener, Arc::new(state), async move {
        let _ = shutdown_rx.wait_for(|stop| *stop).await;
    }));

    // IRC transport.
    let (events_tx, mut events_rx) = mpsc::channel::<TransportEvent>(256);
    let transport_task = tokio::spawn(transport.run(events_tx));

    info!(
        config = %config_path.display(),
        role = %role,
        nick = %config.irc.nickname,
        channel = %config.irc.channel,
        "propolis-bot started"
    );

    let mut purge = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else {
                    warn!("transport stopped");
                    break;
                };
                match event {
                    TransportEvent::Connected => {
                        let _startup = relay.on_connected();
                    }
                    TransportEvent::Message(message) => {
                        let outcome = relay.handle_message(&message).await;
                        debug!(sender = %message.sender, outcome = ?outcome, "message handled");
                    }
                    TransportEvent::Disconnected => {
                        warn!("disconnected from IRC");
                    }
                }
            }
            _ = purge.tick() => {
                if let Some(store) = &store {
                    match store.purge_expired().await {
                        Ok(0) => {}
                        Ok(n) => debug!(removed = n, "purged expired dedup entries"),
                        Err(e) => warn!(error = %e, "dedup purge failed"),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    transport_task.abort();
    let _ = shutdown_tx.send(true);
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "ingestion server error"),
        Err(e) => warn!(error = %e, "ingestion server task failed"),
    }
    if let Some(store) = store {
        store.close().await;
    }
    info!("propolis-bot stopped");
    Ok(())
}
