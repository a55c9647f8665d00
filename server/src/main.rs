use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use booking_server::config::Config;
use booking_server::routes::create_routes;
use booking_server::services::{Clock, ExpirySweeper, SystemClock};
use booking_server::state::AppState;
use booking_server::store::{BookingStore, PgBookingStore};

const SWEEPER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booking_server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let store = PgBookingStore::connect(&config.database_url, config.db_max_connections)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    store.migrate().await.expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let store: Arc<dyn BookingStore> = Arc::new(store);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sweeper = ExpirySweeper::new(Arc::clone(&store), Arc::clone(&clock), config.order_life_time);
    let cancel = CancellationToken::new();
    let sweeper_task = {
        let cancel = cancel.clone();
        let period = config.sweep_interval;
        tokio::spawn(async move { sweeper.run(period, cancel).await })
    };

    let app = create_routes(AppState::new(store, clock, &config), &config.cors_allowed_origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");

    cancel.cancel();
    if tokio::time::timeout(SWEEPER_SHUTDOWN_GRACE, sweeper_task).await.is_err() {
        tracing::warn!("Expiry sweeper did not stop in time");
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
