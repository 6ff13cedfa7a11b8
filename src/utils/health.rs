//! Health-check and metrics HTTP server: a `TierHealthServer`-style server
//! trimmed down to the pool's own surface: `/health`, `/ready`,
//! `/live`, and a bearer-token-gated `/metrics`.

use std::env;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use warp::{http::StatusCode, Filter, Rejection, Reply};

use crate::utils::metrics::PoolMetrics;

#[derive(Debug)]
struct Unauthorized;

impl warp::reject::Reject for Unauthorized {}

/// Serves pool health/readiness/liveness and Prometheus metrics over HTTP.
pub struct PoolHealthServer {
    metrics: Arc<PoolMetrics>,
    port: u16,
}

impl PoolHealthServer {
    pub fn new(metrics: Arc<PoolMetrics>, port: u16) -> Self {
        Self { metrics, port }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting pool health server on port {}", self.port);

        let auth_token = env::var("TG_POOL_METRICS_TOKEN").ok();
        if auth_token.is_none() {
            warn!("TG_POOL_METRICS_TOKEN not set; /metrics will not require authentication");
        }

        let auth = warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
            let token = auth_token.clone();
            async move {
                match token {
                    None => Ok::<(), Rejection>(()),
                    Some(expected) => match header {
                        Some(h) if h == format!("Bearer {expected}") => Ok(()),
                        _ => {
                            warn!("Unauthorized metrics access attempt");
                            Err(warp::reject::custom(Unauthorized))
                        }
                    },
                }
            }
        });

        let health = warp::path("health")
            .and(warp::get())
            .map(|| warp::reply::json(&json!({ "status": "ok" })).into_response());

        let live = warp::path("live")
            .and(warp::get())
            .map(|| warp::reply::json(&json!({ "status": "live" })).into_response());

        let ready = warp::path("ready")
            .and(warp::get())
            .map(|| warp::reply::json(&json!({ "status": "ready" })).into_response());

        let metrics = {
            let pool_metrics = self.metrics.clone();
            warp::path("metrics").and(warp::get()).and(auth).and_then(move |_auth| {
                let pool_metrics = pool_metrics.clone();
                async move { handle_metrics(pool_metrics).await }
            })
        };

        let routes = health.or(live).or(ready).or(metrics).recover(handle_rejection);

        warp::serve(routes).run(([0, 0, 0, 0], self.port)).await;
        Ok(())
    }
}

async fn handle_metrics(metrics: Arc<PoolMetrics>) -> Result<impl Reply, Rejection> {
    match metrics.render() {
        Ok(body) => Ok(warp::reply::with_status(body, StatusCode::OK)),
        Err(e) => {
            warn!("Failed to render metrics: {}", e);
            Ok(warp::reply::with_status(String::new(), StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    if err.find::<Unauthorized>().is_some() {
        Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": "unauthorized" })),
            StatusCode::UNAUTHORIZED,
        ))
    } else {
        Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": "not found" })),
            StatusCode::NOT_FOUND,
        ))
    }
}
