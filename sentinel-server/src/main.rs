use futures::{SinkExt, StreamExt};
use sentinel_advisor::{
    config::{Settings, SettingsStore},
    cycle::{AnalysisCycle, CycleOutcome},
    engine::build_engine,
    notify::{Notify, WebhookNotifier},
    scheduler::{Scheduler, SchedulerCommand},
};
use sentinel_data::{
    assembler::SnapshotAssembler,
    relay::{RelayConfig, ReqwestTransport},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

mod dashboard;

use dashboard::{ClientCommand, DEFAULT_LOG_CAPACITY, Dashboard, LogLevel};

const DEFAULT_WS_ADDR: &str = "0.0.0.0:9002";
const DEFAULT_WS_BUFFER: usize = 256;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    // Initialize logging
    init_logging();

    if let Err(error) = run().await {
        error!(%error, "sentinel-server terminated");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BoxError> {
    info!("Starting sentinel WebSocket server");

    let store = Arc::new(SettingsStore::from_env()?);
    let settings = store.current();
    info!(
        path = %store.path().display(),
        symbol = %settings.symbol,
        engine = ?settings.engine,
        model = settings.model(),
        refresh_minutes = settings.refresh_minutes,
        auto_run = settings.auto_run,
        webhook = settings.webhook_url.is_some(),
        "settings loaded"
    );

    // Configurable via SENTINEL_WS_BUFFER env var
    let buffer_size = std::env::var("SENTINEL_WS_BUFFER")
        .ok()
        .and_then(|size| size.parse().ok())
        .unwrap_or(DEFAULT_WS_BUFFER);
    let dashboard = Arc::new(Dashboard::new(
        buffer_size,
        DEFAULT_LOG_CAPACITY,
        settings.auto_run,
        settings.refresh_minutes,
    ));

    let assembler = SnapshotAssembler::bybit(ReqwestTransport::new()?, RelayConfig::default())?;
    let notifier = WebhookNotifier::from_settings(&settings)
        .map(|notifier| Box::new(notifier) as Box<dyn Notify>);
    let analysis = Arc::new(AnalysisCycle::new(
        assembler,
        build_engine(&settings)?,
        notifier,
    ));

    let scheduler = Scheduler::spawn(
        cycle_fn(analysis, Arc::clone(&dashboard), settings.clone()),
        settings.refresh_interval(),
        settings.auto_run,
    );
    tokio::spawn(forward_outcomes(scheduler.subscribe(), Arc::clone(&dashboard)));

    // Configurable via SENTINEL_WS_ADDR env var
    let server_addr = std::env::var("SENTINEL_WS_ADDR")
        .unwrap_or_else(|_| DEFAULT_WS_ADDR.to_string())
        .parse::<SocketAddr>()?;
    let listener = TcpListener::bind(&server_addr).await?;
    info!("WebSocket server listening on ws://{}", server_addr);
    tokio::spawn(accept_clients(
        listener,
        Arc::clone(&dashboard),
        Arc::clone(&store),
        scheduler.commands(),
    ));

    if settings.auto_run {
        scheduler.run_now()?;
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    scheduler.shutdown().await?;

    Ok(())
}

/// Build the per-run cycle future factory, forwarding progress to the dashboard.
fn cycle_fn<T>(
    analysis: Arc<AnalysisCycle<T>>,
    dashboard: Arc<Dashboard>,
    settings: Settings,
) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = CycleOutcome> + Send>> + Send + Sync + 'static
where
    T: sentinel_data::relay::Transport + 'static,
{
    move || {
        let analysis = Arc::clone(&analysis);
        let dashboard = Arc::clone(&dashboard);
        let config = settings.acquisition_config();

        Box::pin(async move {
            dashboard.log(
                LogLevel::Info,
                format!("cycle started for {} ({} mode)", config.symbol, config.mode),
            );

            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let progress_task = {
                let dashboard = Arc::clone(&dashboard);
                tokio::spawn(async move {
                    while let Some(progress) = progress_rx.recv().await {
                        dashboard.progress(progress);
                    }
                })
            };

            let outcome = analysis.run(&config, Some(&progress_tx)).await;

            drop(progress_tx);
            let _ = progress_task.await;

            outcome
        })
    }
}

/// Fold scheduler outcomes into the dashboard state.
async fn forward_outcomes(
    mut outcomes: broadcast::Receiver<CycleOutcome>,
    dashboard: Arc<Dashboard>,
) {
    loop {
        match outcomes.recv().await {
            Ok(outcome) => dashboard.apply_outcome(&outcome),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Outcome consumer lagged, skipped {} cycles", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Accept dashboard connections until the listener fails.
async fn accept_clients(
    listener: TcpListener,
    dashboard: Arc<Dashboard>,
    store: Arc<SettingsStore>,
    commands: mpsc::UnboundedSender<SchedulerCommand>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!("New WebSocket connection from {}", peer_addr);
                tokio::spawn(handle_client(
                    stream,
                    peer_addr,
                    Arc::clone(&dashboard),
                    Arc::clone(&store),
                    commands.clone(),
                ));
            }
            Err(error) => {
                error!(%error, "failed to accept connection");
            }
        }
    }
}

/// Handle individual WebSocket client connection
async fn handle_client(
    stream: TcpStream,
    peer_addr: SocketAddr,
    dashboard: Arc<Dashboard>,
    store: Arc<SettingsStore>,
    commands: mpsc::UnboundedSender<SchedulerCommand>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", peer_addr, e);
            return;
        }
    };

    info!("WebSocket handshake completed for {}", peer_addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut rx = dashboard.subscribe();

    // Send welcome message with retained report and log backlog
    if let Ok(msg) = serde_json::to_string(&dashboard.welcome()) {
        let _ = ws_sender.send(Message::Text(msg.into())).await;
    }

    // Spawn task to send dashboard updates to this client
    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    if let Ok(json) = serde_json::to_string(&message) {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Client fell behind, skip rather than disconnect
                    warn!("Client {} lagged, skipped {} messages", peer_addr, skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Broadcast channel closed for {}", peer_addr);
                    break;
                }
            }
        }
    });

    // Handle commands from the client
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_)) => {
                    debug!("Received ping from {}", peer_addr);
                }
                Ok(Message::Text(text)) => {
                    handle_command(text.as_str(), peer_addr, &dashboard, &store, &commands);
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", peer_addr, e);
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            info!("Send task completed for {}", peer_addr);
            recv_task.abort();
        }
        _ = &mut recv_task => {
            info!("Receive task completed for {}", peer_addr);
            send_task.abort();
        }
    }

    info!("WebSocket connection closed for {}", peer_addr);
}

fn handle_command(
    text: &str,
    peer_addr: SocketAddr,
    dashboard: &Dashboard,
    store: &SettingsStore,
    commands: &mpsc::UnboundedSender<SchedulerCommand>,
) {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(error) => {
            debug!("Ignoring message from {}: {}", peer_addr, error);
            return;
        }
    };

    info!(?command, "Command from {}", peer_addr);

    let scheduler_command = match command {
        ClientCommand::RunNow => {
            dashboard.log(LogLevel::Info, "manual run requested");
            SchedulerCommand::RunNow
        }
        ClientCommand::AutoRun { enabled } => {
            // Runtime toggle applies even if persisting fails
            if let Err(error) = store.update(|settings| settings.auto_run = enabled) {
                dashboard.log(LogLevel::Error, format!("auto-run not saved: {error}"));
            }
            dashboard.set_auto_run(enabled);
            SchedulerCommand::SetAutoRun(enabled)
        }
        ClientCommand::SetRefresh { minutes } => {
            match store.update(|settings| settings.refresh_minutes = minutes) {
                Ok(settings) => {
                    dashboard.set_refresh_minutes(settings.refresh_minutes);
                    SchedulerCommand::SetInterval(settings.refresh_interval())
                }
                Err(error) => {
                    dashboard.log(LogLevel::Error, format!("refresh not changed: {error}"));
                    return;
                }
            }
        }
    };

    if commands.send(scheduler_command).is_err() {
        dashboard.log(LogLevel::Error, "scheduler is not running");
    }
}

/// Initialize logging
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("SENTINEL_LOG_JSON")
        .map(|value| matches!(value.as_str(), "1" | "true"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
