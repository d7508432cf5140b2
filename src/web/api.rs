//! A thin HTTP control surface over the driver task: status, starting a
//! plot from a job file already on disk, cancel, and the two manual pen
//! operations. No authentication layer — this system has a single
//! operator, unlike the host this crate grew out of.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc::Sender, oneshot};

use crate::action::Job;
use crate::driver::Command;

pub struct AppStateInner {
    pub driver_tx: Sender<Command>,
}
pub type AppState = Arc<AppStateInner>;

fn json_error(message: &str, status: StatusCode) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

pub fn create_router(driver_tx: Sender<Command>) -> Router {
    let state = Arc::new(AppStateInner { driver_tx });
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/plot", post(plot_handler))
        .route("/api/v1/cancel", post(cancel_handler))
        .route("/api/v1/manual/pen_up", post(pen_up_handler))
        .route("/api/v1/manual/pen_down", post(pen_down_handler))
        .with_state(state)
}

async fn get_status(State(state): State<AppState>) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .driver_tx
        .send(Command::GetStatus { respond_to: resp_tx })
        .await
        .is_err()
    {
        return json_error("driver unavailable", StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(_) => json_error("driver unavailable", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[derive(Debug, Deserialize)]
pub struct PlotRequest {
    pub path: String,
}

async fn plot_handler(
    State(state): State<AppState>,
    Json(payload): Json<PlotRequest>,
) -> axum::response::Response {
    let job = match Job::load(&payload.path) {
        Ok(job) => job,
        Err(e) => return json_error(&e.to_string(), StatusCode::BAD_REQUEST),
    };

    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .driver_tx
        .send(Command::Start {
            job,
            respond_to: resp_tx,
        })
        .await
        .is_err()
    {
        return json_error("driver unavailable", StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(Ok(())) => (StatusCode::OK, Json(serde_json::json!({ "result": "started" }))).into_response(),
        Ok(Err(e)) => json_error(&e.to_string(), StatusCode::CONFLICT),
        Err(_) => json_error("driver unavailable", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn cancel_handler(State(state): State<AppState>) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .driver_tx
        .send(Command::Cancel { respond_to: resp_tx })
        .await
        .is_err()
    {
        return json_error("driver unavailable", StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(Ok(())) => (StatusCode::OK, Json(serde_json::json!({ "result": "cancelling" }))).into_response(),
        Ok(Err(e)) => json_error(&e.to_string(), StatusCode::CONFLICT),
        Err(_) => json_error("driver unavailable", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn manual_pen(state: AppState, up: bool) -> axum::response::Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state
        .driver_tx
        .send(Command::ManualPen {
            up,
            respond_to: resp_tx,
        })
        .await
        .is_err()
    {
        return json_error("driver unavailable", StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(Ok(())) => (StatusCode::OK, Json(serde_json::json!({ "result": "ok" }))).into_response(),
        Ok(Err(e)) => json_error(&e.to_string(), StatusCode::CONFLICT),
        Err(_) => json_error("driver unavailable", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn pen_up_handler(State(state): State<AppState>) -> axum::response::Response {
    manual_pen(state, true).await
}

async fn pen_down_handler(State(state): State<AppState>) -> axum::response::Response {
    manual_pen(state, false).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn status_endpoint_returns_idle_phase() {
        let config = crate::config::Config::default();
        let (driver_tx, _events) =
            crate::driver::spawn(Box::new(crate::driver::MockDevice::default()), config);
        let app = create_router(driver_tx);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["phase"], "Idle");
    }
}
