use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use planexec::cluster::http::HttpClusterClient;
use planexec::cluster::memory::MemoryCluster;
use planexec::cluster::ClusterClient;
use planexec::config::{operators_dir, Config};
use planexec::controller::Controller;
use planexec::log::{init_logger, LogStorage, LoggingService};
use planexec::nats::NatsClient;
use planexec::operator::load_operators;
use planexec::routes::{router, AppState};
use planexec::state::tracker::{load_state_file, save_state_file, PersistedInstance};

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_logger(&config.log_level);

    let redis_client = match &config.redis_url {
        Some(redis_url) => {
            log::info!("Connecting to Redis at {}", redis_url);
            match planexec::state::redis::connect(redis_url).await {
                Ok(client) => Some(client),
                Err(e) => {
                    log::error!("Failed to connect to Redis: {}", e);
                    None
                }
            }
        }
        None => {
            log::info!("No REDIS_URL configured - running in stateless mode");
            None
        }
    };

    let nats_client = match &config.nats_url {
        Some(nats_url) => {
            log::info!("Connecting to NATS at {}", nats_url);
            match NatsClient::connect(nats_url).await {
                Ok(client) => Some(client),
                Err(e) => {
                    log::error!("Failed to connect to NATS: {}", e);
                    None
                }
            }
        }
        None => {
            log::info!("No NATS_URL configured - state events are not published");
            None
        }
    };

    let cluster: Arc<dyn ClusterClient> = match &config.cluster_api_url {
        Some(url) => match HttpClusterClient::new(url, config.cluster_token.clone()) {
            Ok(client) => {
                log::info!("Using cluster API at {}", client.base_url());
                Arc::new(client)
            }
            Err(e) => {
                log::error!("Invalid cluster API configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            log::info!("No CLUSTER_API_URL configured - simulating an in-memory cluster");
            Arc::new(MemoryCluster::new())
        }
    };

    let tenant_key = config.tenant_key();
    let mut controller = Controller::new(cluster);
    if let Some(redis) = &redis_client {
        controller = controller.with_redis(redis.clone(), &tenant_key);
    }
    if let Some(nats) = &nats_client {
        controller = controller.with_nats(nats.clone());
    }
    for operator in load_operators(&operators_dir()) {
        controller.add_operator(operator).await;
    }
    let controller = Arc::new(controller);

    if let Some(saved) = load_state_file::<Vec<PersistedInstance>>() {
        let restored = controller.restore(saved).await;
        log::info!("Restored {} instances from state file", restored);
    }

    let logging_service = LoggingService::new(
        redis_client
            .clone()
            .map(|client| LogStorage::new(client, tenant_key.clone())),
    );
    let mut app_state = AppState::new(controller.clone(), logging_service);
    app_state.redis_connected = redis_client.is_some();
    app_state.nats_connected = nats_client.is_some();
    let app = router(app_state, &config.prefix);

    let shutdown = Arc::new(Notify::new());
    let reconcile = tokio::spawn(
        controller
            .clone()
            .run(config.reconcile_interval, shutdown.clone()),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    log::info!("Listening on {}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(wait_for_signal(controller.clone()));
    if let Err(e) = server.await {
        log::error!("Server error: {}", e);
    }

    shutdown.notify_waiters();
    if let Err(e) = reconcile.await {
        log::error!("Reconcile loop panicked: {}", e);
    }
    match save_state_file(&controller.snapshot().await) {
        Ok(()) => log::info!("State saved"),
        Err(e) => log::error!("Failed to save state file: {}", e),
    }
}

/// Resolves on SIGTERM or SIGINT. SIGHUP reloads the state file.
async fn wait_for_signal(controller: Arc<Controller>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut sigterm), Ok(mut sigint), Ok(mut sighup)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::hangup()),
    ) else {
        log::warn!("Unix signal handlers unavailable, waiting for Ctrl-C");
        let _ = tokio::signal::ctrl_c().await;
        return;
    };

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, saving state and shutting down...");
                return;
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, saving state and shutting down...");
                return;
            }
            _ = sighup.recv() => {
                log::info!("Received SIGHUP, reloading state from file...");
                if let Some(saved) = load_state_file::<Vec<PersistedInstance>>() {
                    let restored = controller.restore(saved).await;
                    log::info!("Reloaded {} instances", restored);
                }
            }
        }
    }
}
