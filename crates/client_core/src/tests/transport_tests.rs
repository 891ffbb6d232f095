use std::sync::Arc;

use super::*;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use shared::domain::{DataType, LabelType};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct Captured {
    queries: Arc<Mutex<Vec<BTreeMap<String, String>>>>,
    bodies: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn healthy_routes(captured: Captured) -> Router {
    Router::new()
        .route(
            "/task",
            get(|| async {
                Json(json!({
                    "classes": ["pos", "neg"],
                    "data_type": "text",
                    "label_type": "binary",
                    "min_train": 20,
                }))
            }),
        )
        .route(
            "/history",
            get(|| async {
                Json(json!({
                    "unlabelled": 80,
                    "labelled": {"total": 20, "train": 14, "test": 6, "model_labelled": 2},
                    "history": [{"test": {"accuracy": 0.8}}],
                }))
            }),
        )
        .route(
            "/batch",
            get(
                |State(captured): State<Captured>,
                 Query(query): Query<BTreeMap<String, String>>| async move {
                    captured.queries.lock().await.push(query);
                    Json(json!([
                        {"path": "t/1.txt", "text": "great"},
                        {"path": "t/2.txt", "text": "awful"},
                    ]))
                },
            ),
        )
        .route(
            "/judgements",
            post(
                |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    captured
                        .bodies
                        .lock()
                        .await
                        .push(("/judgements".to_string(), body));
                    Json(json!({}))
                },
            ),
        )
        .route(
            "/judgements/batch",
            post(
                |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    captured
                        .bodies
                        .lock()
                        .await
                        .push(("/judgements/batch".to_string(), body));
                    Json(json!({}))
                },
            ),
        )
        .route(
            "/batch_items_batch",
            get(|| async { Json(json!({"done": true})) }),
        )
        .route(
            "/predict",
            post(
                |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    captured
                        .bodies
                        .lock()
                        .await
                        .push(("/predict".to_string(), body));
                    Json(json!({"predictions": [[0.9, 0.1]]}))
                },
            ),
        )
        .with_state(captured)
}

#[tokio::test]
async fn fetches_task_stats_and_items_from_their_routes() {
    let captured = Captured::default();
    let server_url = spawn_server(healthy_routes(captured.clone())).await;
    let client = HttpAnnotationClient::new(&format!("{server_url}/")).expect("client");
    assert_eq!(client.server_url(), server_url);

    let task = client.fetch_task().await.expect("task");
    assert_eq!(task.data_type, DataType::Text);
    assert_eq!(task.label_type, LabelType::Binary);
    assert_eq!(task.min_train, 20);

    let stats = client.fetch_stats().await.expect("stats");
    assert_eq!(stats.labelled.model_labelled, 2);
    assert_eq!(stats.latest_test_accuracy(), Some(0.8));

    let query = BatchQuery::new()
        .force_stage(Stage::Test)
        .sample_size(2)
        .prediction(false);
    let items = client.fetch_items(&query).await.expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "t/1.txt");
    assert_eq!(items[1].text.as_deref(), Some("awful"));

    let queries = captured.queries.lock().await.clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].get("force_stage").map(String::as_str), Some("TEST"));
    assert_eq!(queries[0].get("sample_size").map(String::as_str), Some("2"));
    assert_eq!(queries[0].get("prediction").map(String::as_str), Some("false"));
}

#[tokio::test]
async fn posts_judgements_and_predictions_in_wire_shape() {
    let captured = Captured::default();
    let server_url = spawn_server(healthy_routes(captured.clone())).await;
    let client = HttpAnnotationClient::new(&server_url).expect("client");

    client
        .submit_judgement(&Judgement::new("t/1.txt", "pos"))
        .await
        .expect("single");
    client
        .submit_judgements(&[Judgement::new("t/1.txt", "pos"), Judgement::new("t/2.txt", "neg")])
        .await
        .expect("batch");
    let prediction = client
        .predict(&PredictRequest::Text {
            texts: vec!["so-so".to_string()],
        })
        .await
        .expect("predict");
    assert_eq!(prediction, json!({"predictions": [[0.9, 0.1]]}));

    let bodies = captured.bodies.lock().await.clone();
    assert_eq!(
        bodies,
        vec![
            (
                "/judgements".to_string(),
                json!({"id": "t/1.txt", "label": "pos"})
            ),
            (
                "/judgements/batch".to_string(),
                json!({"labels": [
                    {"id": "t/1.txt", "label": "pos"},
                    {"id": "t/2.txt", "label": "neg"},
                ]})
            ),
            (
                "/predict".to_string(),
                json!({"type": "text", "texts": ["so-so"]})
            ),
        ]
    );
}

#[tokio::test]
async fn done_marker_maps_to_batch_page_done() {
    let server_url = spawn_server(healthy_routes(Captured::default())).await;
    let client = HttpAnnotationClient::new(&server_url).expect("client");

    assert_eq!(
        client.fetch_batch_items().await.expect("batch page"),
        BatchPage::Done
    );
}

#[tokio::test]
async fn batch_items_list_maps_to_items_page() {
    let app = Router::new().route(
        "/batch_items_batch",
        get(|| async { Json(json!([{"path": "img/1.png"}, {"path": "img/2.png"}])) }),
    );
    let server_url = spawn_server(app).await;
    let client = HttpAnnotationClient::new(&server_url).expect("client");

    assert_eq!(
        client.fetch_batch_items().await.expect("batch page"),
        BatchPage::Items(vec![Item::new("img/1.png"), Item::new("img/2.png")])
    );
}

#[tokio::test]
async fn non_success_status_becomes_transport_error_with_status_text() {
    let app = Router::new()
        .route(
            "/task",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        )
        .route(
            "/judgements",
            post(|| async { (StatusCode::NOT_FOUND, Json(json!({"error": "gone"}))) }),
        );
    let server_url = spawn_server(app).await;
    let client = HttpAnnotationClient::new(&server_url).expect("client");

    let err = client.fetch_task().await.expect_err("transport failure");
    assert_eq!(
        err,
        ServiceError::Transport {
            status: 503,
            message: "Service Unavailable".to_string(),
        }
    );
    assert_eq!(err.message(), "Service Unavailable");
    assert!(!err.is_domain());

    let err = client
        .submit_judgement(&Judgement::new("a", "b"))
        .await
        .expect_err("transport failure wins over body");
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.message(), "Not Found");
}

#[tokio::test]
async fn error_field_in_successful_response_becomes_domain_error() {
    let app = Router::new()
        .route(
            "/judgements",
            post(|| async { Json(json!({"error": "item already labelled"})) }),
        )
        .route(
            "/predict",
            post(|| async { Json(json!({"error": "model not trained"})) }),
        )
        .route("/history", get(|| async { Json(json!({"error": "no history"})) }));
    let server_url = spawn_server(app).await;
    let client = HttpAnnotationClient::new(&server_url).expect("client");

    let err = client
        .submit_judgement(&Judgement::new("a", "cat"))
        .await
        .expect_err("domain failure");
    assert_eq!(err, ServiceError::Domain("item already labelled".to_string()));
    assert!(err.is_domain());
    assert_eq!(err.message(), "item already labelled");

    let err = client
        .predict(&PredictRequest::Images { urls: Vec::new() })
        .await
        .expect_err("domain failure");
    assert_eq!(err.message(), "model not trained");

    let err = client.fetch_stats().await.expect_err("domain failure");
    assert_eq!(err.message(), "no history");
}

#[tokio::test]
async fn empty_success_body_counts_as_empty_object() {
    let app = Router::new().route("/judgements", post(|| async { StatusCode::OK }));
    let server_url = spawn_server(app).await;
    let client = HttpAnnotationClient::new(&server_url).expect("client");

    client
        .submit_judgement(&Judgement::new("a", "cat"))
        .await
        .expect("empty body is success");
}

#[tokio::test]
async fn malformed_payload_is_a_decode_error() {
    let app = Router::new().route("/task", get(|| async { Json(json!({"classes": 3})) }));
    let server_url = spawn_server(app).await;
    let client = HttpAnnotationClient::new(&server_url).expect("client");

    let err = client.fetch_task().await.expect_err("decode failure");
    assert!(matches!(err, ServiceError::Decode(_)));
}

#[tokio::test]
async fn unreachable_server_is_reported_without_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let client = HttpAnnotationClient::new(&format!("http://{addr}")).expect("client");

    let err = client.fetch_task().await.expect_err("connection failure");
    assert!(matches!(err, ServiceError::Unreachable(_)));
    assert_eq!(err.status(), None);
}

#[test]
fn rejects_non_http_server_urls() {
    assert!(HttpAnnotationClient::new("ftp://example.com").is_err());
    assert!(HttpAnnotationClient::new("not a url").is_err());
}

#[test]
fn batch_query_keeps_last_value_per_key() {
    let query = BatchQuery::new()
        .sample_size(10)
        .param("sample_size", "5")
        .force_stage(Stage::ModelLabelled);
    assert_eq!(
        query.pairs(),
        vec![("force_stage", "MODEL_LABELLED"), ("sample_size", "5")]
    );
    assert!(BatchQuery::new().is_empty());
}
