//serveur principal axum (contrôleur Aid)
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use aid_controller::config::{Config, STORE_CONNECT_BUDGET, STORE_POOL_MAX};
use aid_controller::encoders::EncoderRegistry;
use aid_controller::healer::VideoHealer;
use aid_controller::monitor::TimeoutMonitor;
use aid_controller::server;
use aid_controller::state::AppState;
use aid_controller::store::JobStore;

//ligne de commande: une seule action, start
#[derive(Debug, Parser)]
#[command(name = "aid-controller", version, about = "Aid Fallback Dispatch Controller")]
struct Cli {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    ///démarre le contrôleur
    Start(StartArgs),
}

#[derive(Debug, clap::Args)]
struct StartArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "PORT", default_value_t = 4000)]
    port: u16,
    #[arg(long, env = "STORE_URL", default_value = "sqlite://aid.db?mode=rwc")]
    store_url: String,
    #[arg(long, env = "ENCODER_REGISTRY_PATH", default_value = "encoders.json")]
    registry_path: std::path::PathBuf,
    #[arg(long, env = "ALERT_WEBHOOK_URL")]
    webhook_url: Option<String>,
    #[arg(long, env = "NODE_DIRECTORY_URL")]
    node_directory_url: Option<String>,
}

//point d'entrée asynchrone
#[tokio::main]
async fn main() -> Result<()> {
    //initialisation du logging (tracing)
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter_layer).init();

    let cli = Cli::parse();
    let Action::Start(args) = cli.action;
    let config = Config {
        host: args.host,
        port: args.port,
        store_url: args.store_url,
        registry_path: args.registry_path,
        webhook_url: args.webhook_url,
        node_directory_url: args.node_directory_url,
    };

    //le registre local doit charger, le magasin peut attendre
    let registry = EncoderRegistry::load(&config.registry_path)?;
    let state = AppState::new(config.clone(), registry);
    let app = server::build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let shutdown = CancellationToken::new();

    //connexion d'arrière-plan au magasin, puis démarrage des boucles de fond
    {
        let state = state.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let connect = JobStore::connect(&state.config.store_url, STORE_POOL_MAX);
            match tokio::time::timeout(STORE_CONNECT_BUDGET, connect).await {
                Ok(Ok(store)) => {
                    state.store.set(store).await;
                    tracing::info!("job store connected");
                    let monitor =
                        TimeoutMonitor::new(state.store.clone(), state.alerts.clone());
                    tokio::spawn(monitor.run(shutdown.clone()));
                    let healer = VideoHealer::new(state.store.clone(), state.alerts.clone());
                    tokio::spawn(healer.run(shutdown));
                }
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "job store connection failed, dispatch degraded");
                }
                Err(_) => {
                    tracing::error!("job store connection exceeded its budget, dispatch degraded");
                }
            }
        });
    }

    //arrêt propre sur SIGTERM/SIGINT
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
                return;
            };
            let Ok(mut sigint) = signal(SignalKind::interrupt()) else {
                return;
            };
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
            shutdown.cancel();
        });
    }

    //démarrage du serveur, le transport sert avant que le magasin soit joignable
    tracing::info!(%addr, "aid controller listening");
    let graceful = shutdown.clone();
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move { graceful.cancelled().await })
        .await?;

    //le transport est drainé, on coupe les boucles puis le magasin
    shutdown.cancel();
    if let Some(store) = state.store.get().await {
        store.close().await;
    }
    tracing::info!("aid controller stopped");
    Ok(())
}
