use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use report_portal::auth::{AuthProvider, GoTrueAuth};
use report_portal::backend::{AnalysisBackend, HttpBackend};
use report_portal::config::{Settings, StoreKind};
use report_portal::store::{MemoryStore, RestStore, Store};
use report_portal::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("report_portal=debug,tower_http=info")),
        )
        .init();

    let settings = Settings::parse();
    info!(
        "Starting report-portal v{} (store: {:?})",
        env!("CARGO_PKG_VERSION"),
        settings.store
    );

    let (supabase_url, anon_key) = settings.supabase()?;
    let http = reqwest::Client::new();

    let auth: Arc<dyn AuthProvider> = Arc::new(GoTrueAuth::new(http.clone(), supabase_url, anon_key));
    let store: Arc<dyn Store> = match settings.store {
        StoreKind::Rest => Arc::new(RestStore::new(http, supabase_url, anon_key)),
        StoreKind::Memory => {
            warn!("Using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };
    let backend: Arc<dyn AnalysisBackend> =
        Arc::new(HttpBackend::new(&settings.backend_url, settings.backend_timeout())?);
    info!("Analysis backend at {}", settings.backend_url);

    let state = AppState {
        store,
        auth,
        backend,
        pipeline: settings.pipeline(),
        poll: settings.poll_policy(),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    info!("report-portal listening on http://{}", settings.bind);

    axum::serve(listener, app).await?;
    Ok(())
}
