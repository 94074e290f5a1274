use axum::{
    extract::{DefaultBodyLimit, Request, State as AxumState},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use governor::middleware::NoOpMiddleware;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::CooldownRejection;
use crate::Quest;

mod http;

pub struct Api {
    quest: Arc<Quest>,
}

#[derive(Clone)]
struct OriginConfig {
    allowed_origins: Arc<HashSet<String>>,
    allow_any_origin: bool,
    allow_no_origin: bool,
}

type IpGovernorConfig =
    tower_governor::governor::GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>;

fn default_governor_config() -> Option<IpGovernorConfig> {
    GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .finish()
}

/// Per-IP limiter allowing `requests` per `window`, or `None` when disabled.
fn governor_config(
    label: &str,
    requests: Option<u64>,
    burst: Option<u32>,
    window: Duration,
) -> Option<Arc<IpGovernorConfig>> {
    let (requests, burst_size) = match (requests, burst) {
        (Some(requests), Some(burst)) if requests > 0 && burst > 0 => (requests, burst),
        _ => {
            tracing::info!(limiter = label, "rate limiting disabled");
            return None;
        }
    };
    let nanos_per_request = (window.as_nanos() as u64 / requests).max(1);
    let period = Duration::from_nanos(nanos_per_request);
    tracing::info!(
        limiter = label,
        requests,
        burst_size,
        period_ms = period.as_millis() as u64,
        "rate limit configured"
    );
    GovernorConfigBuilder::default()
        .period(period)
        .burst_size(burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .or_else(|| {
            tracing::warn!(limiter = label, "invalid rate-limit config; falling back to defaults");
            default_governor_config()
        })
        .map(Arc::new)
}

impl Api {
    pub fn new(quest: Arc<Quest>) -> Self {
        Self { quest }
    }

    pub fn router(&self) -> Router {
        let config = &self.quest.config;
        let allowed_origins: HashSet<String> = config.allowed_origins.iter().cloned().collect();
        let allow_any_origin = allowed_origins.contains("*");
        if allowed_origins.is_empty() {
            tracing::warn!("no allowed origins configured; all browser origins will be rejected");
        }
        let cors_origins = allowed_origins
            .iter()
            .filter(|origin| *origin != "*")
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Invalid allowed origin: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();
        let origin_config = OriginConfig {
            allowed_origins: Arc::new(allowed_origins),
            allow_any_origin,
            allow_no_origin: config.allow_no_origin,
        };

        let cors = if allow_any_origin {
            CorsLayer::new().allow_origin(AllowOrigin::any())
        } else {
            CorsLayer::new().allow_origin(AllowOrigin::list(cors_origins))
        }
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([
            header::HeaderName::from_static("x-request-id"),
            header::RETRY_AFTER,
        ]);

        let governor_conf = governor_config(
            "http",
            config.http_rate_limit_per_second,
            config.http_rate_limit_burst,
            Duration::from_secs(1),
        );
        let write_governor_conf = governor_config(
            "write",
            config.write_rate_limit_per_minute,
            config.write_rate_limit_burst,
            Duration::from_secs(60),
        );

        // Writes get their own, stricter limiter on top of the global one.
        let (users, referrals) = match write_governor_conf {
            Some(config) => (
                get(http::get_users).merge(
                    post(http::post_users).layer(GovernorLayer {
                        config: config.clone(),
                    }),
                ),
                get(http::get_referrals)
                    .merge(post(http::post_referrals).layer(GovernorLayer { config })),
            ),
            None => (
                get(http::get_users).post(http::post_users),
                get(http::get_referrals).post(http::post_referrals),
            ),
        };

        let router = Router::new()
            .route("/healthz", get(http::healthz))
            .route("/users", users)
            .route("/referrals", referrals)
            .route("/metrics/http", get(http::http_metrics));

        let router = match governor_conf {
            Some(config) => router.layer(GovernorLayer { config }),
            None => router,
        };

        let router = router.layer(cors);
        let router = router.layer(middleware::from_fn(move |req, next| {
            let origin_config = origin_config.clone();
            async move { enforce_origin(origin_config, req, next).await }
        }));
        let router = match config.http_body_limit_bytes {
            Some(limit) if limit > 0 => router.layer(DefaultBodyLimit::max(limit)),
            _ => router,
        };
        let router = router.layer(middleware::from_fn_with_state(
            self.quest.clone(),
            request_id_middleware,
        ));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.quest.clone())
    }
}

async fn enforce_origin(config: OriginConfig, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if let Some(origin) = origin {
        if !config.allow_any_origin && !config.allowed_origins.contains(origin) {
            return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
        }
    } else if !config.allow_no_origin {
        return (StatusCode::FORBIDDEN, "Origin required").into_response();
    }
    next.run(req).await
}

async fn request_id_middleware(
    AxumState(quest): AxumState<Arc<Quest>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static("x-request-id"))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    match response.status() {
        StatusCode::FORBIDDEN => quest.http_metrics().inc_reject_origin(),
        StatusCode::PAYLOAD_TOO_LARGE => quest.http_metrics().inc_reject_body_limit(),
        StatusCode::TOO_MANY_REQUESTS
            if response.extensions().get::<CooldownRejection>().is_none() =>
        {
            quest.http_metrics().inc_reject_rate_limit()
        }
        _ => {}
    }
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static("x-request-id"),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}
