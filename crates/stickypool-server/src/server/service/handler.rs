//! Route handlers for the job server.
//!
//! - `POST /task` stamps the configured task name onto the submitted job,
//!   hands it to the [`WorkerPool`] and answers with the job's [`Envelope`].
//!   Every accepted job gets exactly one envelope back; jobs that fail on a
//!   worker still answer `200` with an `ERROR` envelope.
//! - `GET /health` reports [`PoolStats`], and turns `503` once the pool has
//!   started draining.

use crate::server::telemetry::{
    decrement_jobs_inflight, increment_jobs_failed, increment_jobs_inflight,
    increment_jobs_rejected, increment_jobs_submitted, record_job_duration,
};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use stickypool::{
    Envelope, Error, ErrorKind, JobDescription, NAME_FIELD, PoolStats, ResultRecord, WorkerPool,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// State shared by every request.
#[derive(Clone, Debug)]
pub struct AppState {
    pool: Arc<WorkerPool>,
    task_name: Arc<str>,
}

impl AppState {
    pub fn new(pool: Arc<WorkerPool>, task_name: &str) -> Self {
        Self {
            pool,
            task_name: Arc::from(task_name),
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/task", post(submit_task))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn submit_task(
    State(state): State<AppState>,
    Json(mut job): Json<JobDescription>,
) -> (StatusCode, Json<Envelope>) {
    job.insert(NAME_FIELD, &*state.task_name);

    let handle = match state.pool.submit(job.clone()) {
        Ok(handle) => handle,
        Err(e) => return refuse(&job, &e),
    };

    increment_jobs_submitted();
    let outcome = {
        let _inflight = InflightGuard::new();
        handle.await
    };

    match outcome {
        Ok(record) => {
            record_job_duration(record.duration);
            if let Some(kind) = record.error_kind() {
                increment_jobs_failed(kind.as_str());
            }
            (StatusCode::OK, Json(record.into()))
        }
        Err(e) => {
            tracing::error!("Lost job result: {e}");
            refuse(&job, &e)
        }
    }
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<PoolStats>) {
    let status = if state.pool.is_accepting() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(state.pool.stats()))
}

/// Answers for a job that never produced a record of its own.
fn refuse(job: &JobDescription, err: &Error) -> (StatusCode, Json<Envelope>) {
    let status = if err.kind() == ErrorKind::Rejected {
        increment_jobs_rejected();
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ResultRecord::rejected(job, err).into()))
}

/// Tracks a job in the in-flight gauge until the request finishes or is
/// dropped by a disconnecting client.
struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        increment_jobs_inflight();
        Self
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        decrement_jobs_inflight();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::engine::{SIMULATED_OUTPUT, SimulatedEngine};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header::CONTENT_TYPE};
    use core::time::Duration;
    use serde_json::{Value, json};
    use stickypool::{PoolConfig, unix_now};
    use tower::ServiceExt;

    fn pool(size: usize) -> Arc<WorkerPool> {
        Arc::new(
            WorkerPool::start(PoolConfig::new(size), |slot| {
                SimulatedEngine::load(
                    SimulatedEngine::device_for("cpu", slot),
                    Duration::ZERO,
                    Duration::from_millis(5),
                )
            })
            .unwrap(),
        )
    }

    fn post_task(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/task")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn task_answers_with_ok_envelope() {
        let pool = pool(2);
        let app = router(AppState::new(Arc::clone(&pool), "Hotzenplot-task"));
        let body = json!({
            "important_id": 42,
            "start_time": unix_now(),
            "text": "Guten Morgen",
            "target_lang": "en",
        });

        let (status, envelope) = call(app, post_task(&body.to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope["status"], "OK");
        let result = &envelope["result"];
        assert_eq!(result["name"], "Hotzenplot-task");
        assert_eq!(result["your_important_id"], 42);
        assert_eq!(result["payload"], json!({"text": "Guten Morgen", "target_lang": "en"}));
        assert_eq!(result["result"], SIMULATED_OUTPUT);
        assert!(result["duration"].as_f64().unwrap() >= 0.0);

        pool.drain().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_errors_still_answer_ok_with_error_envelope() {
        let pool = pool(1);
        let app = router(AppState::new(Arc::clone(&pool), "task"));

        let (status, envelope) = call(app, post_task(r#"{"important_id": "abc"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope["status"], "ERROR");
        assert_eq!(envelope["result"]["status"], "error");
        assert_eq!(envelope["result"]["error"]["kind"], "missing_field");
        assert_eq!(envelope["result"]["your_important_id"], "abc");

        pool.drain().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn draining_pool_refuses_with_503() {
        let pool = pool(1);
        pool.drain().await.unwrap();
        let state = AppState::new(Arc::clone(&pool), "task");

        let (status, envelope) = call(
            router(state.clone()),
            post_task(r#"{"important_id": 1, "start_time": 0.0}"#),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(envelope["status"], "ERROR");
        assert_eq!(envelope["result"]["error"]["kind"], "rejected");
        assert!(envelope["result"].get("worker").is_none());

        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, _) = call(router(state), request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn health_reports_pool_stats() {
        let pool = pool(3);
        let app = router(AppState::new(Arc::clone(&pool), "task"));

        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, stats) = call(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["size"], 3);
        assert_eq!(stats["queued"], 0);

        pool.drain().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_body_is_rejected_by_the_extractor() {
        let pool = pool(1);
        let app = router(AppState::new(Arc::clone(&pool), "task"));

        let response = app.oneshot(post_task("not json")).await.unwrap();
        assert!(response.status().is_client_error());

        pool.drain().await.unwrap();
    }
}
