use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::handlers::AppointmentCellState;
use appointment_cell::services::hooks::{
    AuditHook, CrmStageHook, InMemoryJourney, JourneyHook, PostCommitHooks, StoreLeadFunnel,
    TracingAuditLog,
};
use appointment_cell::services::store::{InMemoryStore, JsonFileStore, SchedulingStore};
use appointment_cell::services::AppointmentBookingService;
use shared_config::AppConfig;

/// Funnel stages known to the embedded CRM collaborator.
const LEAD_STAGES: [&str; 5] = ["novo", "contato", "agendado", "compareceu", "perdido"];

fn build_booking_service(config: &AppConfig) -> anyhow::Result<AppointmentBookingService> {
    let store: Arc<dyn SchedulingStore> = match &config.scheduling.data_file {
        Some(path) => {
            let store = JsonFileStore::open(path)
                .with_context(|| format!("failed to open scheduling data at {}", path.display()))?;
            Arc::new(store)
        }
        None => {
            warn!("SCHEDULING_DATA_FILE not set, bookings are kept in memory only");
            Arc::new(InMemoryStore::new())
        }
    };

    let hooks = PostCommitHooks::new()
        .with(Arc::new(AuditHook::new(Arc::new(TracingAuditLog::new()))))
        .with(Arc::new(CrmStageHook::new(
            Arc::new(StoreLeadFunnel::new(store.clone(), LEAD_STAGES)),
            config.scheduling.crm_target_stage.clone(),
        )))
        .with(Arc::new(JourneyHook::new(Arc::new(InMemoryJourney::new()))));

    Ok(AppointmentBookingService::new(&config.scheduling, store).with_hooks(hooks))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic scheduling API server");

    // Load configuration
    let config = AppConfig::from_env();
    if !config.is_configured() {
        warn!("AUTH_JWT_SECRET is empty; every authenticated request will be rejected");
    }

    let booking = build_booking_service(&config)?;

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create shared state
    let port = config.port;
    let state = Arc::new(AppointmentCellState::new(Arc::new(config), booking));

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
