pub mod health;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use tracing::warn;

use crate::description::handlers::handle_generate_job_description;
use crate::errors::AppError;
use crate::ranking::handlers::handle_find_best_cv;
use crate::state::AppState;

/// DELETE /api/v1/index
///
/// Drops and recreates the whole vector index. Affects in-flight rankings.
async fn handle_reset_index(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    warn!("Resetting vector index ({})", state.index.backend());
    state
        .index
        .delete_all()
        .await
        .map_err(|e| AppError::from_search("Index reset failed", e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health::health_handler))
        // Ranking
        .route("/find-best-cv", post(handle_find_best_cv))
        // Description generation
        .route(
            "/generate_job_description",
            post(handle_generate_job_description),
        )
        // Admin
        .route("/api/v1/index", delete(handle_reset_index))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::search::{MemoryVectorIndex, VectorIndex};
    use crate::testing::{test_state, StubChat, ALICE_CV, BOB_CV, CAROL_CV};

    const BOUNDARY: &str = "cvmatchboundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str),
    }

    fn multipart_body(parts: &[Part]) -> String {
        let mut body = String::new();
        for part in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match part {
                Part::Text(name, value) => {
                    body.push_str(&format!(
                        "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                    ));
                }
                Part::File(file_name, contents) => {
                    body.push_str(&format!(
                        "Content-Disposition: form-data; name=\"cv_pdfs\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/pdf\r\n\r\n{contents}\r\n"
                    ));
                }
            }
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn multipart_request(parts: &[Part]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/find-best-cv")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn json_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn router() -> (Router, Arc<MemoryVectorIndex>) {
        let index = Arc::new(MemoryVectorIndex::new(3));
        let state = test_state(Arc::new(StubChat::default()), index.clone());
        (build_router(state), index)
    }

    #[tokio::test]
    async fn test_health_reports_backend() {
        let (app, _) = router();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["search_backend"], "memory");
    }

    #[tokio::test]
    async fn test_find_best_cv_ranks_uploads() {
        let (app, index) = router();
        let request = multipart_request(&[
            Part::Text("job_description", "Senior Python Developer, 5 years experience"),
            Part::File("carol.pdf", CAROL_CV),
            Part::File("alice.pdf", ALICE_CV),
            Part::File("bob.pdf", BOB_CV),
            Part::File("notes.txt", "not a resume"),
        ]);

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let names: Vec<&str> = body["cv_list"]
            .as_array()
            .unwrap()
            .iter()
            .map(|cv| cv["cv_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alice.pdf", "bob.pdf", "carol.pdf"]);
        assert_eq!(body["cv_list"][0]["contact_info"], "Alice Smith alice@example.com");
        assert_eq!(body["skipped"][0]["cv_name"], "notes.txt");
        assert_eq!(index.len().await, Some(0));
    }

    #[tokio::test]
    async fn test_find_best_cv_honors_top_k() {
        let (app, _) = router();
        let request = multipart_request(&[
            Part::Text("job_description", "Senior Python Developer"),
            Part::Text("top_k", "1"),
            Part::File("alice.pdf", ALICE_CV),
            Part::File("bob.pdf", BOB_CV),
        ]);

        let body = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(body["cv_list"].as_array().unwrap().len(), 1);
        assert_eq!(body["cv_list"][0]["cv_name"], "alice.pdf");
    }

    #[tokio::test]
    async fn test_find_best_cv_without_files_returns_message() {
        let (app, index) = router();
        let request = multipart_request(&[Part::Text(
            "job_description",
            "Senior Python Developer",
        )]);

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "No suitable CVs found.");
        assert!(body.get("cv_list").is_none());
        assert_eq!(index.len().await, None);
    }

    #[tokio::test]
    async fn test_find_best_cv_requires_job_description() {
        let (app, _) = router();
        let request = multipart_request(&[Part::File("alice.pdf", ALICE_CV)]);

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_find_best_cv_rejects_bad_top_k() {
        let (app, _) = router();
        let request = multipart_request(&[
            Part::Text("job_description", "Senior Python Developer"),
            Part::Text("top_k", "lots"),
            Part::File("alice.pdf", ALICE_CV),
        ]);

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_job_description_ok() {
        let (app, _) = router();
        let request = json_request(
            "/generate_job_description",
            r#"{"qualifications":"Python, 5 years","role_definition":"Build APIs"}"#,
        );

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["job_description"]
            .as_str()
            .unwrap()
            .contains("Qualifications: Python, 5 years"));
    }

    #[tokio::test]
    async fn test_generate_job_description_empty_input_is_bad_request() {
        let (app, _) = router();
        let request = json_request(
            "/generate_job_description",
            r#"{"qualifications":" , ","role_definition":""}"#,
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_job_description_upstream_failure_is_structured() {
        let index = Arc::new(MemoryVectorIndex::new(3));
        let app = build_router(test_state(Arc::new(StubChat::failing(500)), index));
        let request = json_request(
            "/generate_job_description",
            r#"{"qualifications":"Python","role_definition":"APIs"}"#,
        );

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UPSTREAM_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_reset_index_recreates_empty_index() {
        let (app, index) = router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/index")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(index.len().await, Some(0));
        assert!(index.ensure_exists().await.is_ok());
    }
}
