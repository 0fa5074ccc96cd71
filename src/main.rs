use residual_recon::datasource::{HttpPartnerDirectory, PartnerDirectory, UnconfiguredDirectory};
use residual_recon::{api, config::Config, db::init_db, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
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

    let repo = Arc::new(Repository::with_schema(pool, config.schema));
    let directory: Arc<dyn PartnerDirectory> = match &config.partner_directory_url {
        Some(url) => Arc::new(HttpPartnerDirectory::new(
            url.clone(),
            config.partner_directory_token.clone(),
        )),
        None => {
            tracing::warn!("PARTNER_DIRECTORY_URL not set, partner backfill disabled");
            Arc::new(UnconfiguredDirectory)
        }
    };

    let app = api::create_router(api::AppState::new(repo, config, directory));

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
