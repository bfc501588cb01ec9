//! End-to-end ingestion against a mock HTTP server.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tributary_core::{SourceDescriptor, TransformRegistry};
use tributary_engine::{Ingestor, ReqwestClient};
use tributary_store::{MemoryStore, Store};

fn descriptor(name: &str, value: serde_json::Value) -> SourceDescriptor {
    let mut descriptor: SourceDescriptor = serde_json::from_value(value).unwrap();
    descriptor.name = name.to_string();
    descriptor
}

async fn run(
    store: Arc<MemoryStore>,
    sources: Vec<SourceDescriptor>,
) -> Vec<tributary_engine::IngestReport> {
    let client = Arc::new(ReqwestClient::new().unwrap());
    let ingestor = Ingestor::new(client, store);
    let registry = TransformRegistry::builtin();
    ingestor.run(&sources, &registry).await.unwrap()
}

#[tokio::test]
async fn auth_chain_builds_bearer_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"credentials": {"token": "abc123"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/licenses"))
        .and(header("authorization", "Bearer abc123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"number": "L-1", "holder": "Acme"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let sources = vec![descriptor(
        "licenses",
        json!({
            "endpoint": format!("{}/licenses", server.uri()),
            "headers": {
                "authorization": [
                    "Bearer ",
                    {"endpoint": format!("{}/token", server.uri()), "token_key": "credentials.token"}
                ]
            },
            "column_map": {"license_number": "number", "name": "holder"},
            "unique_keys": ["license_number"]
        }),
    )];

    let reports = run(store.clone(), sources).await;
    assert!(reports[0].failed.is_none());
    assert_eq!(reports[0].records_upserted, 1);
    assert_eq!(store.count_rows().await.unwrap(), 1);
}

#[tokio::test]
async fn offset_pagination_pulls_every_page() {
    let server = MockServer::start().await;

    let page = |ids: Vec<&str>| {
        json!({
            "meta": {"total": 5},
            "items": ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>()
        })
    };
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec!["1", "2"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec!["3", "4"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("offset", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec!["5"])))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let sources = vec![descriptor(
        "items",
        json!({
            "endpoint": format!("{}/items", server.uri()),
            "records_path": "items",
            "column_map": {"id": "id"},
            "pagination": {
                "skip_records_param": "offset",
                "batch_size": 2,
                "total_records_key": "meta.total"
            },
            "unique_keys": ["id"]
        }),
    )];

    let reports = run(store.clone(), sources).await;
    assert!(reports[0].failed.is_none());
    assert_eq!(reports[0].records_read, 5);
    assert_eq!(store.count_rows().await.unwrap(), 5);
}

#[tokio::test]
async fn cursor_pagination_follows_next_links() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "1"}],
            "links": {"next": format!("{}/items-page-2", server.uri())}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items-page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "2"}],
            "links": {}
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let sources = vec![descriptor(
        "items",
        json!({
            "endpoint": format!("{}/items", server.uri()),
            "records_path": "items",
            "column_map": {"id": "id"},
            "pagination": {"next_page_url": "links.next"},
            "unique_keys": ["id"]
        }),
    )];

    let reports = run(store.clone(), sources).await;
    assert!(reports[0].failed.is_none());
    assert_eq!(store.count_rows().await.unwrap(), 2);
}

#[tokio::test]
async fn transform_applies_during_ingest() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/licenses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"number": "L-1", "issued": "03/15/2024", "fee_cents": 2500}
        ])))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let sources = vec![descriptor(
        "licenses",
        json!({
            "endpoint": format!("{}/licenses", server.uri()),
            "column_map": {
                "license_number": "number",
                "issued": {"key": "issued", "transform": {
                    "type": "date_format", "from": "MM/DD/YYYY", "to": "YYYY-MM-DD"
                }},
                "fee_dollars": {"key": "fee_cents", "transform": {
                    "type": "multiply", "factor": 0.01
                }}
            },
            "unique_keys": ["license_number"]
        }),
    )];

    let reports = run(store.clone(), sources).await;
    assert!(reports[0].failed.is_none());

    let (_, row) = store
        .find_by_values(&[("license_number".to_string(), "L-1".to_string())])
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.get("issued"), Some("2024-03-15"));
    assert_eq!(row.get("fee_dollars"), Some("25"));
}

#[tokio::test]
async fn import_source_downloads_and_parses_csv() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/export.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("license_number,name\nL-1,Acme\nL-2,Globex\n"),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let mut source = descriptor(
        "bulk",
        json!({
            "endpoint": format!("{}/export.csv", server.uri()),
            "has_header": true,
            "column_map": {"license_number": "license_number", "name": "name"},
            "unique_keys": ["license_number"]
        }),
    );
    source.source_type = tributary_core::SourceType::Import;

    let reports = run(store.clone(), vec![source]).await;
    assert!(reports[0].failed.is_none());
    assert_eq!(reports[0].records_upserted, 2);
    assert_eq!(store.count_rows().await.unwrap(), 2);
}

#[tokio::test]
async fn dataset_and_api_sources_reconcile_together() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/licenses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"number": "L-1", "phone": "555-0100"}
        ])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("data.csv"),
        "license_number,address\nL-1,123 Main\n",
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let mut dataset = descriptor(
        "local",
        json!({
            "has_header": true,
            "column_map": {"license_number": "license_number", "address": "address"},
            "unique_keys": ["license_number"]
        }),
    );
    dataset.source_type = tributary_core::SourceType::Dataset;
    dataset.folder = Some(dir.path().to_path_buf());

    let api = descriptor(
        "live",
        json!({
            "endpoint": format!("{}/licenses", server.uri()),
            "column_map": {"license_number": "number", "phone": "phone"},
            "unique_keys": ["license_number"]
        }),
    );

    let reports = run(store.clone(), vec![dataset, api]).await;
    assert!(reports.iter().all(|r| r.failed.is_none()));
    assert_eq!(store.count_rows().await.unwrap(), 1);

    let (data_id, row) = store
        .find_by_values(&[("license_number".to_string(), "L-1".to_string())])
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.get("address"), Some("123 Main"));
    assert_eq!(row.get("phone"), Some("555-0100"));
    assert_eq!(store.citations_for(data_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn server_error_fails_only_that_source() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "1"}])))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let sources = vec![
        descriptor(
            "bad",
            json!({
                "endpoint": format!("{}/bad", server.uri()),
                "column_map": {"id": "id"}
            }),
        ),
        descriptor(
            "good",
            json!({
                "endpoint": format!("{}/good", server.uri()),
                "column_map": {"id": "id"}
            }),
        ),
    ];

    let reports = run(store.clone(), sources).await;
    let bad = reports.iter().find(|r| r.source == "bad").unwrap();
    let good = reports.iter().find(|r| r.source == "good").unwrap();
    assert!(bad.failed.as_deref().unwrap().contains("404"));
    assert!(good.failed.is_none());
    assert_eq!(store.count_rows().await.unwrap(), 1);
}
