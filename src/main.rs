mod config;
mod constants;
mod domain;
mod routes;
mod services;
mod store;

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::{Config, StorageBackend};
use services::insights::Insights;
use services::meta::MetaClient;
use services::platform::{OAuthProvider, PublishingClient};
use services::promotion::AutoPromotion;
use services::publisher::{PublishSettings, Publisher};
use services::scheduler::Scheduler;
use services::tokens::TokenManager;
use services::transitions::TransitionService;
use store::{DataStore, InMemoryStore, PgStore};

pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub transitions: TransitionService,
    pub promotion: AutoPromotion,
    pub tokens: Arc<TokenManager>,
    pub publisher: Arc<Publisher>,
    pub insights: Insights,
    pub jwt_secret: Vec<u8>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DataStore>,
        oauth: Arc<dyn OAuthProvider>,
        platform: Arc<dyn PublishingClient>,
        publish: PublishSettings,
        jwt_secret: Vec<u8>,
    ) -> Self {
        let tokens = Arc::new(TokenManager::new(store.clone(), oauth));
        let publisher = Arc::new(Publisher::new(
            store.clone(),
            platform.clone(),
            tokens.clone(),
            publish,
        ));

        Self {
            transitions: TransitionService::new(store.clone()),
            promotion: AutoPromotion::new(store.clone()),
            insights: Insights::new(store.clone(), platform, tokens.clone()),
            store,
            tokens,
            publisher,
            jwt_secret,
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env()?;

    let store: Arc<dyn DataStore> = match config.storage {
        StorageBackend::Postgres => Arc::new(
            PgStore::connect(&config.database_url, config.database_max_connections).await?,
        ),
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; data is lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let meta = Arc::new(MetaClient::new(
        &config.meta_app_id,
        &config.meta_app_secret,
        &config.meta_redirect_uri,
        &config.meta_graph_version,
    ));

    let state = Arc::new(AppState::new(
        store.clone(),
        meta.clone(),
        meta,
        config.publish,
        config.jwt_secret.into_bytes(),
    ));

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(
        store,
        state.publisher.clone(),
        state.tokens.clone(),
        config.scheduler_interval,
    );
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

    let app: Router = routes::build_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown.cancel();
    if let Err(e) = scheduler_task.await {
        tracing::error!(error = %e, "scheduler task failed");
    }

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
