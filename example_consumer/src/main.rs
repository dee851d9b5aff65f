//! Example consumer: resolves the tenants named on the command line and prints their connection
//! state.
//!
//! Run from repo root: `cargo run -p example-consumer -- bluehighschool.edu greenvalley.org`
//! Set `DATABASE_URL` (or put it in `.env`) to the base URI tenant databases live under.
//! Set `CATALOG_PATH` to load entity definitions from a JSON file instead of the built-in school
//! catalog.

use tenant_connections::{
    load_catalog_from_path, school_catalog, Settings, TenantConnectionManager, TenantIdentity,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tenant_connections=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let catalog = match std::env::var("CATALOG_PATH") {
        Ok(path) => load_catalog_from_path(path).await?,
        Err(_) => school_catalog(),
    };
    let manager = TenantConnectionManager::postgres(&settings, catalog);

    for domain in std::env::args().skip(1) {
        let tenant = TenantIdentity::new(domain.clone()).with_domain(domain.clone());
        match manager.resolve_tenant_connection(&tenant).await {
            Ok(resolved) => {
                if resolved.models.is_empty() {
                    tracing::warn!(
                        tenant = %domain,
                        "connected, but no models could be registered"
                    );
                }
                tracing::info!(
                    tenant = %domain,
                    connection = %resolved.connection_id,
                    models = ?resolved.models.names(),
                    "tenant ready"
                );
            }
            Err(e) => tracing::error!(tenant = %domain, error = %e, "tenant unavailable"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&manager.list_active())?);
    let closed = manager.close_all().await;
    tracing::info!(closed, "shutdown complete");
    Ok(())
}
