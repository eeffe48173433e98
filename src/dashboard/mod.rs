//! Dashboard — Axum web server for read-only monitoring.
//!
//! Serves a small JSON API over the shared pool and statistics.
//! Strictly a consumer: no endpoint mutates engine state.
//! CORS enabled for local development.

pub mod routes;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

pub use routes::{AppState, DashboardState};

/// Start the dashboard web server.
///
/// This spawns a background task — it doesn't block.
pub fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "Dashboard server starting on http://localhost:{port}");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind dashboard port");

        axum::serve(listener, app)
            .await
            .expect("Dashboard server error");
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/candidates", get(routes::get_candidates))
        .route("/api/opportunities", get(routes::get_opportunities))
        .route("/api/log", get(routes::get_log))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::LogTail;
    use crate::pool::CandidatePool;
    use crate::types::{Candidate, Category, ScanStatistics};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let pool = CandidatePool::shared(10, 600);
        {
            let mut guard = pool.lock().unwrap();
            let c = Candidate {
                instrument_id: "600519".to_string(),
                display_name: "Kweichow Moutai".to_string(),
                last_price: 1720.0,
                change_pct: 4.2,
                volume: 3.2e6,
                turnover_amount: 5.4e9,
                volume_ratio: 2.8,
            };
            guard.upsert(&c, 62.5, Utc::now());
            guard.apply_assessment("600519", Category::Opportunity, 0.2, vec![]);
        }
        Arc::new(DashboardState {
            pool,
            stats: Arc::new(Mutex::new(ScanStatistics::default())),
            log_tail: LogTail::shared(20),
        })
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["pool_size"].as_u64().unwrap(), 1);
        assert_eq!(json["status"].as_str().unwrap(), "starting");
    }

    #[tokio::test]
    async fn test_candidates_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/api/candidates").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let json: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.len(), 1);
        assert_eq!(json[0]["instrument_id"].as_str().unwrap(), "600519");
    }

    #[tokio::test]
    async fn test_opportunities_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/api/opportunities").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let json: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.len(), 1);
        assert!((json[0]["risk_score"].as_f64().unwrap() - 0.2).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_log_endpoint() {
        let state = test_state();
        state.log_tail.lock().unwrap().push("cycle 1: ok".to_string());
        let app = build_router(state);
        let resp = app
            .oneshot(Request::builder().uri("/api/log").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, vec!["cycle 1: ok".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_route_404() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
