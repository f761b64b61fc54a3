// Flight Planner API v0.1
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod errors;
mod routes;
mod services;

use config::AppConfig;
use routes::weather::WeatherState;
use services::calculator::Calculator;
use services::gfs::{GfsClient, FETCH_TIMEOUT};
use services::places::PlaceStore;
use services::scheduler::{AutoDownload, SharedRefreshStatus};
use services::weather_cache::WeatherCache;

/// Flight Planner API OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Flight Planner API",
        version = "0.1.0",
        description = "Flight route planning service. Keeps a rolling cache of GFS \
            upper-air wind forecasts and runs the external route engine on request, \
            returning the computed path with fuel and timing per waypoint.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Calculator", description = "Route calculations"),
        (name = "Weather", description = "Wind forecast cache"),
        (name = "Places", description = "Saved locations"),
    ),
    paths(
        routes::health::health_check,
        routes::calculator::run_test_calculation,
        routes::calculator::run_calculation,
        routes::weather::get_wind,
        routes::weather::get_refresh_status,
        routes::places::list_saved_places,
        routes::places::save_place,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::weather::WindSnapshot,
            services::options::Location,
            services::options::CalculationOptions,
            services::calculator::Waypoint,
            services::calculator::CalculationReport,
            services::scheduler::RefreshStatus,
            services::places::Place,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env().expect("Invalid configuration");

    // Initialize tracing
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "flight_planner_api=debug,tower_http=debug".into()),
    );
    if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Wind cache
    let gfs_client =
        GfsClient::new(&config.forecast_base_url, FETCH_TIMEOUT).expect("Failed to build HTTP client");
    let cache = Arc::new(WeatherCache::new(
        &config.weather_dir(),
        gfs_client,
        config.publication_lag(),
    ));
    tracing::info!("Wind cache at {}", cache.wind_dir().display());

    // Ensure near-term coverage without delaying startup
    tokio::spawn(services::scheduler::run_startup(
        cache.clone(),
        config.startup_window(),
        config.refresh_schedule().window,
    ));

    let refresh_status = SharedRefreshStatus::default();
    let auto_download = if config.weather_auto_download {
        Some(AutoDownload::start(
            cache.clone(),
            config.refresh_schedule(),
            refresh_status.clone(),
        ))
    } else {
        tracing::info!("Wind auto-download disabled");
        None
    };

    // Route engine
    let calculator = Arc::new(Calculator::new(config.engine()));
    if !config.engine().program.exists() {
        tracing::warn!(
            "Route engine not found at {}",
            config.engine().program.display()
        );
    }

    let places = Arc::new(
        PlaceStore::open(&config.data_dir)
            .await
            .expect("Failed to open place store"),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    // Build router
    let health_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(calculator.clone());

    let calculator_routes = Router::new()
        .route(
            "/api/v1/calculator/test",
            get(routes::calculator::run_test_calculation),
        )
        .route(
            "/api/v1/calculator/run",
            post(routes::calculator::run_calculation),
        )
        .with_state(calculator);

    let weather_routes = Router::new()
        .route("/api/v1/weather/wind", get(routes::weather::get_wind))
        .route(
            "/api/v1/weather/status",
            get(routes::weather::get_refresh_status),
        )
        .with_state(WeatherState {
            cache,
            status: refresh_status,
        });

    let place_routes = Router::new()
        .route(
            "/api/v1/places/saved",
            get(routes::places::list_saved_places).post(routes::places::save_place),
        )
        .with_state(places);

    let app = Router::new()
        .merge(health_routes)
        .merge(calculator_routes)
        .merge(weather_routes)
        .merge(place_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server terminated unexpectedly");

    if let Some(auto_download) = auto_download {
        auto_download.shutdown().await;
    }
}
