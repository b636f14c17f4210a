use std::net::SocketAddr;

use anyhow::Context;
use crew_planner::config::Settings;
use crew_planner::{create_app, db, docs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let settings = Settings::from_env()?;
    let pool = db::init(&settings.database_url).await?;

    tokio::fs::create_dir_all(&settings.upload_dir)
        .await
        .with_context(|| format!("failed to create upload dir {}", settings.upload_dir.display()))?;

    let openapi = docs::build_openapi(&settings.public_base_url)?;
    let app = create_app(pool, &settings)
        .await?
        .merge(docs::swagger_routes(openapi)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

    match &settings.tls {
        Some(tls) => {
            let config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .context("failed to load TLS certificate or key")?;

            tracing::info!("listening on https://{}", addr);
            axum_server::bind_rustls(addr, config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            tracing::info!("listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app.into_make_service()).await?;
        }
    }

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
