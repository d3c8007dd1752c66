use std::future::IntoFuture;
use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use pickup_sync::auth::{AuthContext, StaticSessionProvider};
use pickup_sync::config::Config;
use pickup_sync::handlers::AppState;
use pickup_sync::routes::create_routes;
use pickup_sync::store::{Backend, MemoryEventStore, PgEventStore};
use pickup_sync::sync::{MapSession, SessionExit};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let backend = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Successfully connected to database");

            sqlx::migrate!()
                .run(&pool)
                .await
                .expect("Failed to run migrations");
            tracing::info!("Migrations run successfully");

            Backend::Postgres(PgEventStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, events are kept in memory");
            Backend::Memory(MemoryEventStore::new())
        }
    };

    let auth = AuthContext::init(StaticSessionProvider::new(config.session_token.clone())).await;

    let session = MapSession::mount(Arc::new(backend), config.session.clone()).await;
    let (session, mut session_task) = session.spawn();

    let app = create_routes(AppState {
        session: session.clone(),
        auth,
    });

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");
    tracing::info!("Server running at http://{}", config.bind_addr);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    tokio::select! {
        result = server => {
            result.expect("Server failed");
            if let Err(e) = session.unmount().await {
                tracing::warn!(error = %e, "Map session already stopped");
            }
            SessionExit::from_join(session_task.await);
            tracing::info!("Shutdown complete");
        }
        // Every session route would answer 503 from here on, so stop serving.
        result = &mut session_task => {
            let exit = SessionExit::from_join(result);
            tracing::error!(?exit, "Map session stopped while serving, shutting down");
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
