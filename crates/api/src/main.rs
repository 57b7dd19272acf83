use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lookbook_api::config::ServerConfig;
use lookbook_api::router::build_app_router;
use lookbook_api::state::AppState;
use lookbook_core::normalize::UrlPolicy;
use lookbook_gallery::{GalleryBus, JsonFileStore};
use lookbook_pipeline::{Services, StageOrchestrator};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lookbook_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(ServerConfig::from_env());
    tracing::info!(
        api_base = %config.api_base_url,
        gallery = %config.gallery_path,
        "configuration loaded"
    );

    // One client for everything; upstream jobs are long-polled, so no
    // blanket request timeout here (the server-level TimeoutLayer is
    // the backstop).
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to build HTTP client");

    let services = Services::http(http.clone(), &config.api_base_url, &config.upload_base_url);
    let orchestrator = Arc::new(StageOrchestrator::new(
        services,
        UrlPolicy::new(config.api_base_url.clone()),
    ));

    let gallery = Arc::new(JsonFileStore::new(&config.gallery_path));
    let gallery_bus = Arc::new(GalleryBus::default());

    // Log saves as they happen; other subscribers (e.g. SSE feeds) can
    // attach the same way.
    let mut saves = gallery_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(item) = saves.recv().await {
            tracing::info!(item_id = %item.id, kind = ?item.kind, "gallery item saved");
        }
    });

    let state = AppState {
        orchestrator,
        gallery,
        gallery_bus,
        http,
        config: config.clone(),
    };

    let app = build_app_router(state, &config);

    let addr = SocketAddr::new(config.host.parse().expect("Invalid HOST"), config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
