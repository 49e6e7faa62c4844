use clap::Parser;
use mute_border::config::ConfigManager;
use mute_border::obs::{self, ObsOptions};
use mute_border::wave_link::{self, WaveLinkOptions};
use mute_border::{ClientEvent, ClientHandle, MainLoop, Presenter, SourceKey, SourceState};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mute_border")]
struct Args {
    /// Config file to use instead of ~/.mute-border/config.json.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    print_config_path: bool,
}

/// Reports mute changes to the log; stands in for the on-screen border.
struct LogPresenter;

impl Presenter for LogPresenter {
    fn set_muted(&mut self, muted: bool) {
        if muted {
            info!("microphone MUTED");
        } else {
            info!("microphone live");
        }
    }

    fn source_changed(&mut self, source: SourceKey, state: &SourceState, event: &ClientEvent) {
        if let ClientEvent::Disconnected = event {
            warn!(%source, "source disconnected");
        }
        if let SourceState::Connected { name, muted } = state {
            info!(%source, name = name.as_deref().unwrap_or("-"), muted, "source state");
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let manager = match args.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    if args.print_config_path {
        println!("{}", manager.config_path().display());
        return Ok(());
    }

    let config = manager.load();
    info!(path = %manager.config_path().display(), "config loaded");

    let (tx, rx) = mpsc::unbounded_channel();
    let mut clients: Vec<ClientHandle> = Vec::new();
    if config.wave_link.enabled {
        clients.push(wave_link::spawn(WaveLinkOptions::default(), tx.clone()));
    }
    if config.obs.enabled {
        clients.push(obs::spawn(ObsOptions::from_config(&config.obs), tx.clone()));
    }
    drop(tx);
    if clients.is_empty() {
        warn!("no sources enabled, nothing to watch");
    }
    for client in &clients {
        client.connect();
    }

    let mut main_loop = MainLoop::new(rx, &config, LogPresenter);
    main_loop.run_until(tokio::signal::ctrl_c()).await?;
    info!("shutting down");

    for client in &clients {
        client.destroy();
    }
    Ok(())
}
