//! HTTP server for the tenant CRUD service.
//!
//! Configure with `DATABASE_URL`, `BIND_ADDR`, `DB_MAX_CONNECTIONS`, `BODY_LIMIT_BYTES`
//! and `AUTO_MIGRATE` (a `.env` file works too).

use tenant_crud::{app, apply_migrations, register_all, AppState, PgAdapter, SchemaRegistry, Settings};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tenant_crud=info,tower_http=info")),
        )
        .init();

    let registry = SchemaRegistry::global();
    register_all(registry)?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;
    let adapter = PgAdapter::new(pool);
    if settings.auto_migrate {
        apply_migrations(&adapter, registry).await?;
    }

    let state = AppState::new(adapter, registry);
    let router = app(state, settings.body_limit);
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("tenant-crud listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
