/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use moodsync_api::{app::AppState, config::Config};
/// use moodsync_shared::billing::{PgBillingStore, StripeClient, SubscriptionService};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let billing = SubscriptionService::new(
///     Arc::new(PgBillingStore::new(pool.clone())),
///     Arc::new(StripeClient::new(&config.stripe)?),
///     &config.stripe,
/// );
/// let state = AppState::new(pool, config, billing, None);
/// let app = moodsync_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError, middleware::security::SecurityHeadersLayer};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    routing::{delete, get, post, put},
    Extension, Router,
};
use moodsync_shared::auth::middleware::{authenticate, AuthContext};
use moodsync_shared::billing::SubscriptionService;
use moodsync_shared::redis::RateLimiter;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Stripe subscription reconciliation
    pub billing: Arc<SubscriptionService>,

    /// None when Redis is not configured
    pub rate_limiter: Option<RateLimiter>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        config: Config,
        billing: SubscriptionService,
        rate_limiter: Option<RateLimiter>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            billing: Arc::new(billing),
            rate_limiter,
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health                        # Health check (public)
/// ├── POST /webhook                       # Stripe webhook (signature checked)
/// └── /v1/
///     ├── /auth/                          # register, login, refresh (public)
///     ├── /profile                        # GET, PUT, PUT /preferences
///     ├── /billing/                       # customer, checkout, cancel, status
///     ├── /admin/subscriptions/:id/cancel # admin only
///     ├── /family/                        # invitations and permissions
///     ├── /referrals/                     # invites and stats
///     ├── /stories/                       # stories, moments, comments, reactions
///     └── /mood-tags/                     # custom mood tags
/// ```
///
/// # Middleware Stack
///
/// Everything under `/v1` except `/auth` passes JWT authentication, then
/// rate limiting. Admin routes add an `is_admin` check. The whole router is
/// wrapped in tracing, CORS and security headers.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let public_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/webhook", post(routes::webhook::stripe_webhook));

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    let profile_routes = Router::new()
        .route(
            "/",
            get(routes::profile::get_profile).put(routes::profile::update_profile),
        )
        .route("/preferences", put(routes::profile::update_preferences));

    let billing_routes = Router::new()
        .route("/customer", post(routes::billing::create_customer))
        .route("/checkout", post(routes::billing::create_checkout))
        .route("/cancel", post(routes::billing::cancel_subscription))
        .route("/status", get(routes::billing::subscription_status));

    let admin_routes = Router::new()
        .route(
            "/subscriptions/:subscription_id/cancel",
            post(routes::admin::cancel_subscription),
        )
        .layer(from_fn(admin_layer));

    let family_routes = Router::new()
        .route("/", get(routes::family::list_family))
        .route("/invite", post(routes::family::invite))
        .route("/:id/respond", post(routes::family::respond))
        .route("/:id/permissions", put(routes::family::update_permissions))
        .route("/:id", delete(routes::family::remove));

    let referral_routes = Router::new()
        .route(
            "/",
            get(routes::referrals::list_referrals).post(routes::referrals::invite),
        )
        .route("/stats", get(routes::referrals::stats));

    let story_routes = Router::new()
        .route(
            "/",
            get(routes::stories::list_own).post(routes::stories::create_story),
        )
        .route("/public", get(routes::stories::list_public))
        .route(
            "/:id",
            get(routes::stories::get_story)
                .put(routes::stories::update_story)
                .delete(routes::stories::delete_story),
        )
        .route("/:id/moments", post(routes::stories::add_moment))
        .route(
            "/:id/moments/:moment_id",
            put(routes::stories::update_moment).delete(routes::stories::delete_moment),
        )
        .route(
            "/:id/comments",
            get(routes::stories::list_comments).post(routes::stories::add_comment),
        )
        .route(
            "/:id/comments/:comment_id",
            delete(routes::stories::delete_comment),
        )
        .route(
            "/:id/reactions",
            get(routes::stories::reactions).post(routes::stories::add_reaction),
        )
        .route(
            "/:id/reactions/:reaction_type",
            delete(routes::stories::remove_reaction),
        );

    let mood_tag_routes = Router::new()
        .route(
            "/",
            get(routes::mood_tags::list_tags).post(routes::mood_tags::create_tag),
        )
        .route(
            "/:id",
            put(routes::mood_tags::update_tag).delete(routes::mood_tags::delete_tag),
        );

    // Authenticated, then rate limited (the last layer added runs first)
    let protected_routes = Router::new()
        .nest("/profile", profile_routes)
        .nest("/billing", billing_routes)
        .nest("/admin", admin_routes)
        .nest("/family", family_routes)
        .nest("/referrals", referral_routes)
        .nest("/stories", story_routes)
        .nest("/mood-tags", mood_tag_routes)
        .layer(from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit::rate_limit_layer,
        ))
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .merge(protected_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(public_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Validates the bearer access token, loads the user and injects
/// `AuthContext` into request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = authenticate(&state.db, state.jwt_secret(), req.headers()).await?;
    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

/// Rejects callers without the admin flag
async fn admin_layer(
    Extension(auth): Extension<AuthContext>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !auth.is_admin {
        tracing::warn!(user_id = %auth.user_id, path = %req.uri().path(), "Non-admin hit admin route");
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }
    Ok(next.run(req).await)
}
