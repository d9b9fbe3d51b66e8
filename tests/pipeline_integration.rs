use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use httpmock::{
    Method::{GET, POST, PUT},
    Mock, MockServer,
};
use pdfchat::{api, config, logging, processing::PipelineService};
use regex::Regex;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tower::ServiceExt;

static INIT: OnceCell<()> = OnceCell::const_new();
static MOCK_SERVER: OnceCell<&'static MockServer> = OnceCell::const_new();
static MOCK_HANDLES: OnceCell<Vec<Mock<'static>>> = OnceCell::const_new();

fn set_env(key: &str, value: &str) {
    // SAFETY: Tests run in a single process and establish deterministic configuration upfront.
    unsafe { std::env::set_var(key, value) }
}

/// Start one mock server that plays every collaborator (object store, parse
/// service, embedding/chat provider, Qdrant) and point the environment at it.
async fn init_harness() {
    INIT.get_or_init(|| async {
        let mock_server_owned = MockServer::start_async().await;
        let mock_server = Box::leak(Box::new(mock_server_owned));
        let base_url = mock_server.base_url();

        set_env("AWS_ACCESS_KEY_ID", "AKIATEST");
        set_env("AWS_SECRET_ACCESS_KEY", "test-secret");
        set_env("AWS_REGION", "us-east-1");
        set_env("S3_BUCKET_NAME", "docs");
        set_env("S3_ENDPOINT_URL", &base_url);
        set_env("QDRANT_URL", &base_url);
        set_env("PARSE_API_KEY", "parse-key");
        set_env("PARSE_BASE_URL", &base_url);
        set_env("OPENAI_API_KEY", "openai-key");
        set_env("OPENAI_BASE_URL", &base_url);
        set_env("EMBEDDING_MODEL", "text-embedding-3-small");
        set_env("EMBEDDING_DIMENSION", "3");
        set_env("CHAT_MODEL", "gpt-4o-mini");
        set_env("REQUEST_TIMEOUT_SECS", "5");

        MOCK_SERVER.set(mock_server).ok();
        let server = MOCK_SERVER.get().expect("mock server initialized");

        // Uploads get a random six-digit suffix, so object and collection
        // paths are matched by shape rather than literal value.
        let object_path = Regex::new(r"^/report_\d{6}\.pdf$").unwrap();
        let collection_path = Regex::new(r"^/collections/report_\d{6}$").unwrap();
        let points_path = Regex::new(r"^/collections/report_\d{6}/points$").unwrap();
        let query_path = Regex::new(r"^/collections/report_\d{6}/points/query$").unwrap();

        let mocks: Vec<Mock<'static>> = vec![
            // Object store: signed PUT then GET of the raw bytes.
            server
                .mock_async({
                    let object_path = object_path.clone();
                    move |when, then| {
                        when.method(PUT)
                            .path_matches(object_path.clone())
                            .header_exists("authorization")
                            .header_exists("x-amz-date");
                        then.status(200);
                    }
                })
                .await,
            server
                .mock_async({
                    let object_path = object_path.clone();
                    move |when, then| {
                        when.method(GET).path_matches(object_path.clone());
                        then.status(200).body("%PDF-1.7 test document");
                    }
                })
                .await,
            // Parse service: upload, one successful poll, single-page result.
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/api/v1/parsing/upload");
                    then.status(200)
                        .json_body(json!({ "id": "job-1", "status": "PENDING" }));
                })
                .await,
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/api/v1/parsing/job/job-1");
                    then.status(200)
                        .json_body(json!({ "id": "job-1", "status": "SUCCESS" }));
                })
                .await,
            server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path("/api/v1/parsing/job/job-1/result/json");
                    then.status(200).json_body(json!({
                        "pages": [
                            {
                                "page": 1,
                                "text": "Revenue grew twelve percent year over year.",
                                "images": []
                            }
                        ]
                    }));
                })
                .await,
            // Embedding provider: every request carries a single input.
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/v1/embeddings");
                    then.status(200).json_body(json!({
                        "data": [ { "index": 0, "embedding": [0.1, 0.2, 0.3] } ]
                    }));
                })
                .await,
            // Qdrant: collection is absent, gets created, points land, queries hit.
            server
                .mock_async({
                    let collection_path = collection_path.clone();
                    move |when, then| {
                        when.method(GET).path_matches(collection_path.clone());
                        then.status(404).json_body(json!({
                            "status": { "error": "Collection doesn't exist" }
                        }));
                    }
                })
                .await,
            server
                .mock_async({
                    let collection_path = collection_path.clone();
                    move |when, then| {
                        when.method(PUT).path_matches(collection_path.clone());
                        then.status(200)
                            .json_body(json!({ "status": "ok", "result": true }));
                    }
                })
                .await,
            server
                .mock_async({
                    let points_path = points_path.clone();
                    move |when, then| {
                        when.method(PUT)
                            .path_matches(points_path.clone())
                            .query_param("wait", "true");
                        then.status(200).json_body(json!({
                            "status": "ok",
                            "result": { "operation_id": 1, "status": "completed" }
                        }));
                    }
                })
                .await,
            server
                .mock_async({
                    let query_path = query_path.clone();
                    move |when, then| {
                        when.method(POST).path_matches(query_path.clone());
                        then.status(200).json_body(json!({
                            "status": "ok",
                            "time": 0.0,
                            "result": [
                                {
                                    "id": "chunk-1",
                                    "score": 0.91,
                                    "payload": {
                                        "text": "Revenue grew twelve percent year over year.",
                                        "page": 1
                                    }
                                }
                            ]
                        }));
                    }
                })
                .await,
            // Missing collection addressed explicitly by a question.
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/collections/ghost/points/query");
                    then.status(404).json_body(json!({
                        "status": { "error": "Collection `ghost` doesn't exist" }
                    }));
                })
                .await,
            // Chat provider.
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/v1/chat/completions");
                    then.status(200).json_body(json!({
                        "choices": [
                            {
                                "message": {
                                    "role": "assistant",
                                    "content": "Revenue grew twelve percent."
                                }
                            }
                        ]
                    }));
                })
                .await,
        ];
        MOCK_HANDLES.set(mocks).ok();

        config::init_config();
        logging::init_tracing();
    })
    .await;
}

async fn test_router() -> axum::Router {
    init_harness().await;
    let service = PipelineService::new().expect("pipeline service");
    api::create_router(Arc::new(service))
}

fn pdf_upload_request() -> Request<Body> {
    let boundary = "pdfchat-integration-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"report.pdf\"\r\n\
         Content-Type: application/pdf\r\n\r\n\
         %PDF-1.7 test document\r\n\
         --{boundary}--\r\n"
    );
    Request::builder()
        .method(Method::POST)
        .uri("/upload_pdf")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .expect("request")
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/get_response")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn upload_then_ask_round_trips_through_all_collaborators() {
    let router = test_router().await;

    let response = router
        .clone()
        .oneshot(pdf_upload_request())
        .await
        .expect("upload response");
    assert_eq!(response.status(), StatusCode::OK);
    let upload = body_json(response).await;

    let collection = upload["collection"].as_str().expect("collection name");
    let collection_shape = Regex::new(r"^report_\d{6}$").unwrap();
    assert!(collection_shape.is_match(collection), "got {collection}");
    let url = upload["s3_url"].as_str().expect("s3 url");
    assert!(url.contains(&format!("{collection}.pdf")));

    let response = router
        .clone()
        .oneshot(chat_request(
            json!({ "user_message": "How did revenue change?" }),
        ))
        .await
        .expect("chat response");
    assert_eq!(response.status(), StatusCode::OK);
    let chat = body_json(response).await;
    assert_eq!(chat["bot_reply"], "Revenue grew twelve percent.");

    let response = router
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("metrics response");
    let metrics = body_json(response).await;
    assert_eq!(metrics["documents_ingested"], 1);
    assert!(metrics["chunks_indexed"].as_u64().expect("chunk count") >= 1);
}

#[tokio::test]
async fn question_before_any_upload_returns_fixed_reply() {
    let router = test_router().await;

    let response = router
        .oneshot(chat_request(json!({ "user_message": "Anything yet?" })))
        .await
        .expect("chat response");
    assert_eq!(response.status(), StatusCode::OK);
    let chat = body_json(response).await;
    assert_eq!(chat["bot_reply"], "Error: No PDF has been processed yet.");
}

#[tokio::test]
async fn question_against_missing_collection_is_an_error_reply() {
    let router = test_router().await;

    let response = router
        .oneshot(chat_request(json!({
            "user_message": "Anything?",
            "collection": "ghost"
        })))
        .await
        .expect("chat response");
    assert_eq!(response.status(), StatusCode::OK);
    let chat = body_json(response).await;
    let reply = chat["bot_reply"].as_str().expect("reply");
    assert!(reply.starts_with("Error:"), "got {reply}");
    assert!(reply.contains("ghost"));
}

#[tokio::test]
async fn healthcheck_is_always_available() {
    let router = test_router().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/healthcheck")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("healthcheck response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}
