use anyhow::{Context, Result};
use clap::Parser;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use gitgym::SessionManager;
use gitgym::api::handle_request;
use gitgym::domains::settings::{Settings, SettingsLoader};

#[derive(Parser, Debug)]
#[command(name = "gitgym", version, about = "Multi-tenant git sandbox server")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Address to listen on, overrides the configuration
    #[arg(long)]
    bind: Option<String>,
    /// Directory holding shared remotes, overrides the configuration
    #[arg(long)]
    data_root: Option<PathBuf>,
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = SettingsLoader::new(cli.config.clone()).load()?;
    if let Some(bind) = &cli.bind {
        settings.server.bind = bind.clone();
    }
    if let Some(root) = &cli.data_root {
        settings.storage.data_root = root.clone();
    }
    Ok(settings)
}

fn spawn_idle_sweeper(manager: Arc<SessionManager>, shutdown: CancellationToken) {
    let sessions = manager.settings().sessions.clone();
    let Some(max_idle) = sessions.idle_timeout() else {
        info!("Idle session eviction disabled");
        return;
    };
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sessions.sweep_interval());
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    manager.evict_idle(max_idle).await;
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let bind = settings.server.bind.clone();

    let manager = Arc::new(
        SessionManager::from_settings(settings).context("Failed to build command registry")?,
    );
    let adopted = manager
        .adopt_existing_remotes()
        .await
        .context("Failed to load existing shared remotes")?;
    info!("Adopted {adopted} shared remote(s)");

    let shutdown = manager.shutdown_token();
    spawn_idle_sweeper(Arc::clone(&manager), shutdown.clone());

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!("GitGym listening on http://{bind}");

    loop {
        let (stream, peer) = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, cancelling in-flight commands");
                manager.shutdown();
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {e}");
                    continue;
                }
            },
        };

        let manager = Arc::clone(&manager);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, Arc::clone(&manager)));
            let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(connection);
            tokio::select! {
                result = connection.as_mut() => {
                    if let Err(e) = result {
                        warn!("Connection from {peer} ended with error: {e}");
                    }
                }
                _ = shutdown.cancelled() => {
                    connection.as_mut().graceful_shutdown();
                    if let Err(e) = connection.await {
                        warn!("Connection from {peer} failed during shutdown: {e}");
                    }
                }
            }
        });
    }

    Ok(())
}
