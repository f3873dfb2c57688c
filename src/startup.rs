//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::application::events::EventPublisher;
use crate::application::payments::PaymentProvider;
use crate::config::Settings;
use crate::infrastructure::pubsub::{self, RedisEventPublisher};
use crate::infrastructure::{cache, database, jobs, metrics, payments};
use crate::presentation::http::{handlers, routes};
use crate::presentation::middleware::cors;
use crate::presentation::websocket::Hub;
use crate::shared::snowflake::SnowflakeGenerator;

const POOL_STATS_INTERVAL: Duration = Duration::from_secs(15);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// `None` when Redis is not configured
    pub redis: Option<ConnectionManager>,
    pub snowflake: Arc<SnowflakeGenerator>,
    pub hub: Arc<Hub>,
    /// Redis fan-out when available, otherwise the local hub
    pub publisher: Arc<dyn EventPublisher>,
    pub payments: Arc<dyn PaymentProvider>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        db: PgPool,
        redis: Option<ConnectionManager>,
        payments: Arc<dyn PaymentProvider>,
    ) -> Self {
        let snowflake = Arc::new(SnowflakeGenerator::with_epoch(
            settings.snowflake.epoch,
            settings.snowflake.machine_id as u64,
            0,
        ));
        let hub = Arc::new(Hub::new(settings.websocket.heartbeat_interval_ms));
        let publisher: Arc<dyn EventPublisher> = match &redis {
            Some(conn) => Arc::new(RedisEventPublisher::new(
                conn.clone(),
                settings.redis.events_channel.clone(),
            )),
            None => hub.clone(),
        };

        Self {
            db,
            redis,
            snowflake,
            hub,
            publisher,
            payments,
            settings: Arc::new(settings),
        }
    }
}

/// Router with the cross-cutting layers applied.
pub fn build_router(state: AppState) -> Router {
    let cors = cors::create_cors_layer(&state.settings.cors);
    routes::create_router(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        handlers::health::init_server_start();

        let db = database::create_pool(&settings.database).await?;
        tracing::info!("Database connection pool created");

        if settings.database.run_migrations {
            database::run_migrations(&db).await?;
            tracing::info!("Database migrations applied");
        }

        let redis = cache::create_redis_client(&settings.redis).await?;
        let payments = payments::create_payment_provider(&settings.payments)?;

        let state = AppState::new(settings, db, redis, payments);

        if let Some(url) = state.settings.redis.url() {
            pubsub::spawn_subscriber(
                redis::Client::open(url)?,
                state.settings.redis.events_channel.clone(),
                state.hub.clone(),
            );
        }

        jobs::spawn_auto_complete_sweeper(
            Arc::new(state.order_service()),
            Duration::from_secs(state.settings.platform.sweep_interval_secs),
            state.settings.platform.auto_complete_days,
        );
        jobs::spawn_refund_reconciler(
            Arc::new(state.escrow_service()),
            Duration::from_secs(state.settings.platform.sweep_interval_secs),
        );
        spawn_pool_stats(state.db.clone());

        let addr = state.settings.server_addr();
        let router = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until Ctrl-C
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

fn spawn_pool_stats(pool: PgPool) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(POOL_STATS_INTERVAL);
        loop {
            ticker.tick().await;
            let size = pool.size();
            let idle = pool.num_idle() as u32;
            metrics::update_db_pool_stats(idle, size.saturating_sub(idle), pool.options().get_max_connections());
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
