use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("PETSHOP_HTTP_PORT").unwrap_or_else(|_| "8080".to_string());
    let db_folder = std::env::var("PETSHOP_DB_FOLDER").unwrap_or_else(|_| "data".to_string());
    info!(
        target: "petshop",
        "Petshop starting: RUST_LOG='{}', http_port={}, db_root='{}'",
        rust_log, http_port, db_folder
    );

    petshop::server::run().await
}
