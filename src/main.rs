use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use http::{HeaderValue, StatusCode};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use config::Config;
use db::{FixtureStore, SubscriptionStore};
use services::{feed_cache::FeedCache, init, sync::SyncEngine};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub fixtures: Arc<dyn FixtureStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub feeds: Arc<FeedCache>,
    pub sync: Arc<SyncEngine>,
}

/// Rate-limit rejections use the same JSON error shape as `AppError`.
fn governor_error_response(error: GovernorError) -> http::Response<Body> {
    let (status, body, headers) = match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let body = serde_json::json!({
                "error": {
                    "code": "RATE_LIMITED",
                    "message": "Rate limit exceeded",
                    "details": { "retry_after_seconds": wait_time }
                }
            });
            let mut headers = headers.unwrap_or_default();
            headers.insert(http::header::RETRY_AFTER, HeaderValue::from(wait_time));
            (StatusCode::TOO_MANY_REQUESTS, body, Some(headers))
        }
        GovernorError::UnableToExtractKey => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "error": {
                    "code": "INVALID_REQUEST",
                    "message": "Unable to determine client IP for rate limiting"
                }
            }),
            None,
        ),
        GovernorError::Other { code, msg, headers } => (
            StatusCode::from_u16(code.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            serde_json::json!({
                "error": {
                    "code": "RATE_LIMIT_ERROR",
                    "message": msg.unwrap_or_else(|| "Rate limiting error".to_string())
                }
            }),
            headers,
        ),
    };

    let mut resp = http::Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Some(hmap) = headers {
        for (name, value) in hmap.iter() {
            resp.headers_mut().append(name.clone(), value.clone());
        }
    }
    resp
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchday_calendar=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting {} calendar service", config.server.app_name);

    let pool = init::init_db(&config).await?;
    let services = init::build_services(&config, &pool)?;

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        fixtures: services.fixtures,
        subscriptions: services.subscriptions,
        feeds: services.feeds,
        sync: services.sync,
    });

    let thread_shutdown = Arc::new(AtomicBool::new(false));

    // Calendar clients poll the public feed unauthenticated; limit per IP.
    let mut feed_builder = GovernorConfigBuilder::default();
    feed_builder.per_second(config.rate_limit.feed_per_second.into());
    feed_builder.burst_size(config.rate_limit.feed_burst);
    feed_builder.key_extractor(SmartIpKeyExtractor);
    feed_builder.error_handler(governor_error_response);

    let feed_gov_conf = Arc::new(
        feed_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build feed governor config"))?,
    );

    let feed_cleaner = {
        let limiter = feed_gov_conf.limiter().clone();
        let interval = Duration::from_secs(60);
        let flag = thread_shutdown.clone();
        std::thread::spawn(move || {
            let tick = Duration::from_secs(1);
            loop {
                for _ in 0..interval.as_secs() {
                    if flag.load(Ordering::SeqCst) {
                        tracing::info!("Feed rate limiter cleanup thread exiting");
                        return;
                    }
                    std::thread::sleep(tick);
                }
                tracing::debug!("feed rate limiter size: {}", limiter.len());
                limiter.retain_recent();
            }
        })
    };

    let feed_rate_layer = GovernorLayer {
        config: feed_gov_conf.clone(),
    };

    let frontend_origin = config
        .server
        .frontend_url
        .parse::<HeaderValue>()
        .map_err(|e| anyhow::anyhow!("Invalid FRONTEND_URL for CORS: {}", e))?;

    let app = Router::new()
        .merge(routes::api_router())
        .nest("/sync", routes::feed::router().layer(feed_rate_layer))
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(frontend_origin)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                ])
                .allow_headers([
                    http::header::CONTENT_TYPE,
                    http::header::AUTHORIZATION,
                    http::header::ACCEPT,
                ])
                .allow_credentials(true),
        );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let thread_shutdown_clone = thread_shutdown.clone();
    let signal_fut = async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = ctrl_c => {},
                        _ = term.recv() => {},
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to bind SIGTERM: {}", e);
                    let _ = ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        tracing::info!("Shutdown signal received");
        thread_shutdown_clone.store(true, Ordering::SeqCst);
    };

    tokio::select! {
        res = server_fut => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = signal_fut => {
            tracing::info!("Server future dropped; no longer accepting connections");
        }
    }

    thread_shutdown.store(true, Ordering::SeqCst);
    if let Err(e) = feed_cleaner.join() {
        tracing::warn!("Feed limiter cleanup thread join failed: {:?}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
