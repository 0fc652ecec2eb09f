use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use time;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, LettreNotifier, MemberService, NoopNotifier, Notifier, SeaOrmAuthService,
    SeaOrmMemberService,
};

mod admin;
pub mod auth;
mod error;
mod members;
mod observability;
pub mod onboarding;
pub mod rate_limit;
mod system;
mod types;

pub use error::ApiError;
pub use rate_limit::{FixedWindowLimiter, RateDecision};
pub use types::*;

use tokio::sync::RwLock;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub auth_service: Arc<dyn AuthService>,

    pub member_service: Arc<dyn MemberService>,

    pub limiter: Arc<FixedWindowLimiter>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

pub async fn create_app_state(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let notifier: Arc<dyn Notifier> = if config.mail.enabled {
        Arc::new(LettreNotifier::from_config(&config.mail)?)
    } else {
        Arc::new(NoopNotifier)
    };

    let auth_service = Arc::new(SeaOrmAuthService::new(store.clone(), &config.security)?);
    let member_service = Arc::new(SeaOrmMemberService::new(
        store.clone(),
        notifier,
        config.security.clone(),
        config.onboarding.clone(),
    ));

    let limiter = Arc::new(FixedWindowLimiter::new(
        config.rate_limit.quota,
        Duration::from_secs(config.rate_limit.window_seconds),
    ));

    Ok(Arc::new(AppState {
        config: Arc::new(RwLock::new(config)),
        store,
        auth_service,
        member_service,
        limiter,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

pub async fn router(state: Arc<AppState>) -> Router {
    let (media_path, cors_origins, secure_cookies, session_minutes) = {
        let config = state.config.read().await;
        (
            config.general.media_path.clone(),
            config.server.cors_allowed_origins.clone(),
            config.server.secure_cookies,
            config.server.session_minutes,
        )
    };

    let protected_routes = create_protected_router(state.clone());

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            session_minutes,
        )));

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/register", post(members::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .layer(axum::extract::DefaultBodyLimit::max(
            crate::constants::limits::MAX_PICTURE_BYTES,
        ))
        .layer(session_layer)
        .with_state(state.clone());

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .nest_service("/media", tower_http::services::ServeDir::new(media_path))
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(middleware::from_fn_with_state(
            state,
            rate_limit::rate_limit_middleware,
        ))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(members::me))
        .route("/me/picture", post(members::upload_picture))
        .route("/admin/members", get(admin::list_members))
        .route("/admin/members/{id}/approve", post(admin::approve_member))
        .route("/admin/members/{id}/reject", post(admin::reject_member))
        .route("/admin/members/approve", post(admin::approve_members))
        .route("/admin/members/reject", post(admin::reject_members))
        .route(
            "/admin/members/picture-reminders",
            post(admin::send_picture_reminders),
        )
        .route("/admin/audit", get(admin::recent_audit))
        .route("/system/status", get(system::get_status))
        .route("/metrics", get(observability::get_metrics))
        // route_layer stacks run outermost-last: the session check added
        // below runs before the gate, which needs the account it attaches.
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            onboarding::onboarding_gate,
        ))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_session,
        ))
}
