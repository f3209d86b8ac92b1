use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storeledger::{api, config::Config, db::init_db, HttpLogisticsProvider, Ledger, LogisticsProvider, Repository};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    // Retries stop a little before the caller-side timeout fires.
    let retry_budget = Duration::from_millis(config.logistics_timeout_ms * 4 / 5);
    let logistics: Arc<dyn LogisticsProvider> = Arc::new(HttpLogisticsProvider::new(
        config.logistics_api_url.clone(),
        config.logistics_api_key.clone(),
        retry_budget,
    ));
    let ledger = Arc::new(Ledger::new(repo, logistics, config));

    let app = api::create_router(api::AppState::new(ledger));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
