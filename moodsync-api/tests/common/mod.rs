//! Common test utilities for integration tests
//!
//! Tests need a Postgres database reachable through `DATABASE_URL`. Stripe is
//! replaced by [`MockGateway`]; Redis is not used.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use chrono::Duration;
use moodsync_api::app::{build_router, AppState};
use moodsync_api::config::{ApiConfig, Config, JwtConfig};
use moodsync_shared::auth::jwt::issue_token_pair;
use moodsync_shared::billing::mock::MockGateway;
use moodsync_shared::billing::signature::sign_payload;
use moodsync_shared::billing::{PgBillingStore, PriceConfig, StripeConfig, SubscriptionService};
use moodsync_shared::db::migrations::run_migrations;
use moodsync_shared::db::pool::DatabaseConfig;
use moodsync_shared::models::user::{CreateUser, User};
use serde_json::Value;
use sqlx::PgPool;
use tower::Service as _;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_integration_test";
pub const JWT_SECRET: &str = "integration-test-secret-at-least-32-bytes";

/// Test context containing all necessary resources
pub struct TestContext {
    pub db: PgPool,
    pub app: axum::Router,
    pub gateway: Arc<MockGateway>,
    pub user: User,
    pub jwt_token: String,
    created: Vec<Uuid>,
}

pub fn test_config() -> anyhow::Result<Config> {
    Ok(Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            production: false,
        },
        database: DatabaseConfig::from_env()?,
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            access_ttl_secs: 3600,
            refresh_ttl_secs: 86400,
        },
        stripe: StripeConfig {
            secret_key: "sk_test_integration".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            prices: PriceConfig {
                monthly: Some("price_monthly".to_string()),
                yearly: Some("price_yearly".to_string()),
                family: Some("price_family".to_string()),
                family_lifetime: Some("price_family_lifetime".to_string()),
            },
            api_base: "http://127.0.0.1:1/v1".to_string(),
            webhook_tolerance_secs: 300,
        },
        redis: None,
    })
}

impl TestContext {
    /// Connects, migrates, creates a user and builds the app
    pub async fn new() -> anyhow::Result<Self> {
        let config = test_config()?;

        let db = PgPool::connect(&config.database.url).await?;
        run_migrations(&db).await?;

        let gateway = Arc::new(MockGateway::new());
        let billing = SubscriptionService::new(
            Arc::new(PgBillingStore::new(db.clone())),
            gateway.clone(),
            &config.stripe,
        );

        let (user, jwt_token) = insert_user(&db, "owner").await?;

        Ok(TestContext {
            app: build_router(AppState::new(db.clone(), config, billing, None)),
            created: vec![user.id],
            user,
            jwt_token,
            gateway,
            db,
        })
    }

    /// Creates another user and returns it with an access token
    pub async fn create_user(&mut self, prefix: &str) -> anyhow::Result<(User, String)> {
        let (user, token) = insert_user(&self.db, prefix).await?;
        self.created.push(user.id);
        Ok((user, token))
    }

    /// Tracks a user created through the API so cleanup removes it
    pub fn track(&mut self, user_id: Uuid) {
        self.created.push(user_id);
    }

    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.jwt_token)
    }

    /// Sends a JSON request, optionally authenticated
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.app.clone().call(builder.body(body).unwrap()).await.unwrap();
        read_json(response).await
    }

    /// Delivers a webhook payload signed with the test secret
    pub async fn deliver_webhook(&self, payload: &[u8]) -> (StatusCode, Value) {
        let header = sign_payload(payload, WEBHOOK_SECRET, chrono::Utc::now().timestamp()).unwrap();
        self.deliver_raw_webhook(payload, Some(&header)).await
    }

    pub async fn deliver_raw_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri("/webhook");
        if let Some(signature) = signature {
            builder = builder.header("Stripe-Signature", signature);
        }
        let request = builder.body(Body::from(payload.to_vec())).unwrap();
        let response = self.app.clone().call(request).await.unwrap();
        read_json(response).await
    }

    /// Deletes every user this context created (cascades to their data)
    pub async fn cleanup(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(&self.created)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

async fn read_json(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn insert_user(db: &PgPool, prefix: &str) -> anyhow::Result<(User, String)> {
    let tag = Uuid::new_v4().simple().to_string();
    let user = User::create(
        db,
        CreateUser {
            email: format!("{}-{}@example.com", prefix, tag),
            password_hash: "unused".to_string(),
            username: format!("{}_{}", prefix, &tag[..12]),
            display_name: None,
        },
    )
    .await?;

    let tokens = issue_token_pair(user.id, JWT_SECRET, Duration::hours(1), Duration::days(1))?;
    Ok((user, tokens.access_token))
}
