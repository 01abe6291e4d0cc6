//! Support ticket HTTP server.
//!
//! Loads configuration from the environment, rebuilds ticket state from the
//! event journal and serves `/api/v1/tickets`.

use std::net::SocketAddr;
use std::sync::Arc;
use supportdesk_core::environment::{Clock, RandomIds, SystemClock};
use supportdesk_core::journal::EventJournal;
use supportdesk_postgres::PostgresJournal;
use supportdesk_runtime::{InMemoryJournal, RetryPolicy, Store, StoreConfig};
use supportdesk_tickets::{
    build_router,
    storage::{AttachmentStore, LocalAttachmentStore},
    AppState, Config, TicketEnvironment, TicketReducer, TicketService, TicketState,
};
use supportdesk_web::JwtVerifier;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting support ticket server");

    if config.server.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.server.metrics_port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()?;
        info!(address = %metrics_addr, "Prometheus exporter listening");
    }

    if config.uses_dev_secret() {
        warn!("AUTH_JWT_SECRET is not set; using the development secret");
    }

    // Event journal
    let journal: Arc<dyn EventJournal> = if let Some(url) = &config.database.url {
        let journal = PostgresJournal::connect(url, config.database.max_connections).await?;
        journal.migrate().await?;
        Arc::new(journal)
    } else {
        warn!("DATABASE_URL is not set; tickets are kept in memory only");
        Arc::new(InMemoryJournal::new())
    };

    let records = journal.load_all().await?;
    let state = TicketState::replay(&records)?;
    info!(
        records = records.len(),
        tickets = state.tickets.len(),
        "Ticket state rebuilt from journal"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let environment = TicketEnvironment::new(
        Arc::clone(&clock),
        Arc::new(RandomIds),
        journal,
        config.workflow.clone(),
    );
    let store_config = StoreConfig::default()
        .with_dlq_max_size(config.store.dlq_max_size)
        .with_broadcast_capacity(config.store.broadcast_capacity)
        .with_retry_policy(RetryPolicy::new().with_max_attempts(config.store.journal_max_retries));
    let store = Store::with_config(state, TicketReducer, environment, store_config);
    let tickets = TicketService::new(store, config.server.request_timeout());

    let attachments: Arc<dyn AttachmentStore> =
        Arc::new(LocalAttachmentStore::new(config.attachments.dir.clone()));
    let verifier = Arc::new(JwtVerifier::new(
        config.auth.jwt_secret.as_bytes(),
        config.auth.jwt_leeway,
    ));

    let app = build_router(AppState::new(
        tickets.clone(),
        attachments,
        verifier,
        clock,
        config.attachments.max_bytes,
    ));

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(error) = tickets.shutdown(config.server.shutdown_timeout()).await {
        warn!(error = %error, "Pending journal writes did not finish before shutdown");
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(error = %error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(error) => {
                warn!(error = %error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
