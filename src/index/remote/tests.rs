use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> RemoteIndexConfig {
    RemoteIndexConfig {
        control_url: server.uri(),
        host: Some(format!("{}/", server.uri())),
        index_name: "test-index".to_string(),
        namespace: "docs".to_string(),
        dimension: 3,
        batch_size: 2,
        ..RemoteIndexConfig::default()
    }
}

fn store_for(server: &MockServer) -> RemoteIndexStore {
    RemoteIndexStore::new(&config_for(server), "test-key".to_string())
        .expect("store should be created")
}

async fn run_blocking<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task should not panic")
}

async fn mount_describe(server: &MockServer, dimension: usize, ready: bool) {
    Mock::given(method("GET"))
        .and(path("/indexes/test-index"))
        .and(header("Api-Key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "test-index",
            "dimension": dimension,
            "metric": "cosine",
            "status": { "ready": ready, "state": "Ready" }
        })))
        .mount(server)
        .await;
}

fn chunk(text: &str, index: usize) -> Chunk {
    Chunk {
        text: text.to_string(),
        source: "capitals.txt".to_string(),
        index,
        start: index * 100,
    }
}

fn metadata(text: &str, inserted_at: i64, position: usize) -> serde_json::Value {
    json!({
        "text": text,
        "source": "capitals.txt",
        "chunk_index": position,
        "start": 0,
        "inserted_at": inserted_at,
        "position": position
    })
}

#[test]
fn requires_a_host() {
    let config = RemoteIndexConfig {
        host: None,
        ..RemoteIndexConfig::default()
    };

    assert!(matches!(
        RemoteIndexStore::new(&config, "key".to_string()),
        Err(RagError::IndexConfiguration(_))
    ));
}

#[test]
fn endpoint_joins_without_double_slash() {
    let base = Url::parse("https://idx.svc.example.io/").expect("valid url");
    let url = RemoteIndexStore::endpoint(&base, "vectors/upsert").expect("valid endpoint");

    assert_eq!(url.as_str(), "https://idx.svc.example.io/vectors/upsert");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_index_does_not_exist() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/test-index"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let store = store_for(&server);

    let (exists, outcome, count) = run_blocking(move || {
        (
            store.exists().expect("exists should succeed"),
            store.query(&[1.0, 0.0, 0.0], 3).expect("query should succeed"),
            store.count().expect("count should succeed"),
        )
    })
    .await;

    assert!(!exists);
    assert_eq!(outcome, QueryOutcome::NotReady);
    assert_eq!(count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn dimension_mismatch_is_a_configuration_error() {
    let server = MockServer::start().await;
    mount_describe(&server, 768, true).await;
    let store = store_for(&server);

    let result = run_blocking(move || store.exists()).await;

    assert!(matches!(result, Err(RagError::IndexConfiguration(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/test-index"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let store = store_for(&server);

    let result = run_blocking(move || store.exists()).await;

    assert!(matches!(result, Err(RagError::IndexUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_sends_batches_with_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(header("Api-Key", "test-key"))
        .and(body_partial_json(json!({ "namespace": "docs" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 2 })))
        .expect(2)
        .mount(&server)
        .await;
    let store = store_for(&server);

    let chunks = vec![chunk("a", 0), chunk("b", 1), chunk("c", 2)];
    let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
    run_blocking(move || store.upsert(&chunks, &vectors))
        .await
        .expect("upsert should succeed");

    let requests = server
        .received_requests()
        .await
        .expect("request recording is enabled");
    let first: serde_json::Value =
        serde_json::from_slice(&requests[0].body).expect("body should be JSON");
    let second: serde_json::Value =
        serde_json::from_slice(&requests[1].body).expect("body should be JSON");

    assert_eq!(first["vectors"].as_array().map(Vec::len), Some(2));
    assert_eq!(second["vectors"].as_array().map(Vec::len), Some(1));
    assert_eq!(first["vectors"][1]["metadata"]["text"], "b");
    assert_eq!(first["vectors"][1]["metadata"]["position"], 1);
    assert_eq!(second["vectors"][0]["metadata"]["position"], 2);
    assert_eq!(second["vectors"][0]["metadata"]["start"], 200);
    assert_eq!(
        first["vectors"][0]["metadata"]["inserted_at"],
        second["vectors"][0]["metadata"]["inserted_at"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_upsert_is_a_configuration_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    let store = store_for(&server);

    let result = run_blocking(move || store.upsert(&[chunk("a", 0)], &[vec![1.0, 0.0, 0.0]])).await;

    assert!(matches!(result, Err(RagError::IndexConfiguration(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn query_orders_ties_by_insertion() {
    let server = MockServer::start().await;
    mount_describe(&server, 3, true).await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({
            "topK": 13,
            "namespace": "docs",
            "includeMetadata": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "3", "score": 0.5, "metadata": metadata("low", 100, 0) },
                { "id": "2", "score": 0.9, "metadata": metadata("newer", 200, 0) },
                { "id": "1", "score": 0.9, "metadata": metadata("older second", 100, 1) },
                { "id": "0", "score": 0.9, "metadata": metadata("older first", 100, 0) }
            ]
        })))
        .mount(&server)
        .await;
    let store = store_for(&server);

    let outcome = run_blocking(move || store.query(&[1.0, 0.0, 0.0], 3))
        .await
        .expect("query should succeed");

    let QueryOutcome::Matches(hits) = outcome else {
        panic!("index should be ready");
    };
    let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["older first", "older second", "newer"]);
    assert_eq!(hits[0].chunk.source, "capitals.txt");
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_query_result_is_not_ready() {
    let server = MockServer::start().await;
    mount_describe(&server, 3, true).await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] })))
        .mount(&server)
        .await;
    let store = store_for(&server);

    let outcome = run_blocking(move || store.query(&[1.0, 0.0, 0.0], 3))
        .await
        .expect("query should succeed");

    assert_eq!(outcome, QueryOutcome::NotReady);
}

#[tokio::test(flavor = "multi_thread")]
async fn initializing_index_is_not_ready() {
    let server = MockServer::start().await;
    mount_describe(&server, 3, false).await;
    let store = store_for(&server);

    let outcome = run_blocking(move || store.query(&[1.0, 0.0, 0.0], 3))
        .await
        .expect("query should succeed");

    assert_eq!(outcome, QueryOutcome::NotReady);
}

#[tokio::test(flavor = "multi_thread")]
async fn count_reads_namespace_stats() {
    let server = MockServer::start().await;
    mount_describe(&server, 3, true).await;
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "namespaces": { "docs": { "vectorCount": 7 }, "other": { "vectorCount": 2 } },
            "dimension": 3,
            "totalVectorCount": 9
        })))
        .mount(&server)
        .await;
    let store = store_for(&server);

    let count = run_blocking(move || store.count())
        .await
        .expect("count should succeed");

    assert_eq!(count, 7);
}

#[tokio::test(flavor = "multi_thread")]
async fn ties_at_the_cut_off_follow_insertion_order() {
    let server = MockServer::start().await;
    mount_describe(&server, 3, true).await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({ "topK": 12 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "a", "score": 0.9, "metadata": metadata("best", 300, 0) },
                { "id": "b", "score": 0.5, "metadata": metadata("tied newer", 200, 0) },
                { "id": "c", "score": 0.5, "metadata": metadata("tied older", 100, 0) }
            ]
        })))
        .mount(&server)
        .await;
    let store = store_for(&server);

    let outcome = run_blocking(move || store.query(&[1.0, 0.0, 0.0], 2))
        .await
        .expect("query should succeed");

    let QueryOutcome::Matches(hits) = outcome else {
        panic!("index should be ready");
    };
    let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["best", "tied older"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn garbled_description_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/test-index"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    let store = store_for(&server);

    let result = run_blocking(move || store.exists()).await;

    assert!(matches!(result, Err(RagError::IndexUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn garbled_query_response_is_unavailable() {
    let server = MockServer::start().await;
    mount_describe(&server, 3, true).await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;
    let store = store_for(&server);

    let result = run_blocking(move || store.query(&[1.0, 0.0, 0.0], 3)).await;

    assert!(matches!(result, Err(RagError::IndexUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn garbled_upsert_and_stats_responses_are_unavailable() {
    let server = MockServer::start().await;
    mount_describe(&server, 3, true).await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"upserted\""))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_string("oops"))
        .mount(&server)
        .await;
    let store = store_for(&server);

    let (upsert, count) = run_blocking(move || {
        (
            store.upsert(&[chunk("a", 0)], &[vec![1.0, 0.0, 0.0]]),
            store.count(),
        )
    })
    .await;

    assert!(matches!(upsert, Err(RagError::IndexUnavailable(_))));
    assert!(matches!(count, Err(RagError::IndexUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn short_acknowledgement_still_completes_upsert() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 1 })))
        .expect(1)
        .mount(&server)
        .await;
    let store = store_for(&server);

    let chunks = vec![chunk("a", 0), chunk("b", 1)];
    let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]];
    run_blocking(move || store.upsert(&chunks, &vectors))
        .await
        .expect("a short acknowledgement is logged, not fatal");
}
