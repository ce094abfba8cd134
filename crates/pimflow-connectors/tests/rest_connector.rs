//! REST connector against a wiremock server.

use pimflow_connectors::{Connector, RestConnector};
use pimflow_core::{ConnectorError, FieldMapping, FieldType, Record};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Helpers
// =============================================================================

async fn connected(server: &MockServer, config: Value) -> RestConnector {
    let mut connector = RestConnector::new("r-1", "Shop API");
    let mut config = config;
    config["baseUrl"] = json!(server.uri());
    connector.connect(&config).await.unwrap();
    connector
}

fn items(range: std::ops::Range<u32>) -> Vec<Value> {
    range.map(|i| json!({ "id": i, "sku": format!("SKU-{}", i) })).collect()
}

// =============================================================================
// Single page
// =============================================================================

#[tokio::test]
async fn test_data_path_preview() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "items": [{ "id": 1 }] } })),
        )
        .mount(&server)
        .await;

    let connector = connected(
        &server,
        json!({
            "endpoints": { "list": "/products" },
            "responseMapping": { "dataPath": "data.items" }
        }),
    )
    .await;

    let preview = connector.preview(10).await.unwrap();
    assert_eq!(preview.len(), 1);
    assert_eq!(Value::Object(preview[0].clone()), json!({ "id": 1 }));
}

#[tokio::test]
async fn test_schema_from_first_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "sku": "A", "price": "9.90", "active": true, "tags": ["x"] },
            { "sku": "B", "extra": 1 }
        ])))
        .mount(&server)
        .await;

    let connector = connected(&server, json!({ "endpoints": { "list": "products" } })).await;
    let schema = connector.get_schema().await.unwrap();

    assert_eq!(schema.field_names(), vec!["sku", "price", "active", "tags"]);
    assert_eq!(schema.field("price").unwrap().field_type, FieldType::Number);
    assert_eq!(schema.field("active").unwrap().field_type, FieldType::Boolean);
    assert_eq!(schema.field("tags").unwrap().field_type, FieldType::Array);
}

#[tokio::test]
async fn test_http_error_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let mut connector = RestConnector::new("r-1", "Shop API");
    let err = connector
        .connect(&json!({ "baseUrl": server.uri(), "endpoints": { "list": "/products" } }))
        .await
        .unwrap_err();

    match err {
        ConnectorError::Http { status, text } => {
            assert_eq!(status, 503);
            assert_eq!(text, "Service Unavailable");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!connector.is_connected());
    assert!(!connector.test_connection().await);
}

#[tokio::test]
async fn test_unreachable_server() {
    let mut connector = RestConnector::new("r-1", "Shop API");
    let err = connector
        .connect(&json!({
            "baseUrl": "http://127.0.0.1:9",
            "endpoints": { "list": "/products" },
            "timeoutMs": 2000
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Connection(_)));
}

// =============================================================================
// Authentication and headers
// =============================================================================

#[tokio::test]
async fn test_api_key_and_custom_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(header("X-API-Key", "k-123"))
        .and(header("X-Tenant", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .mount(&server)
        .await;

    let connector = connected(
        &server,
        json!({
            "endpoints": { "list": "/products" },
            "auth": { "type": "api-key", "apiKey": "k-123" },
            "headers": { "X-Tenant": "acme" }
        }),
    )
    .await;
    assert_eq!(connector.record_count(), 1);
    assert!(connector.test_connection().await);
}

#[tokio::test]
async fn test_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .mount(&server)
        .await;

    let connector = connected(
        &server,
        json!({ "endpoints": { "list": "/p" }, "auth": { "type": "bearer", "token": "tok" } }),
    )
    .await;
    assert_eq!(connector.record_count(), 1);
}

#[tokio::test]
async fn test_basic_auth() {
    let server = MockServer::start().await;
    // "user:pass"
    Mock::given(method("GET"))
        .and(header("Authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .mount(&server)
        .await;

    let connector = connected(
        &server,
        json!({
            "endpoints": { "list": "/p" },
            "auth": { "type": "basic", "username": "user", "password": "pass" }
        }),
    )
    .await;
    assert_eq!(connector.record_count(), 1);
}

#[tokio::test]
async fn test_oauth2_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let mut connector = RestConnector::new("r-1", "Shop API");
    let err = connector
        .connect(&json!({
            "baseUrl": server.uri(),
            "endpoints": { "list": "/p" },
            "auth": {
                "type": "oauth2",
                "clientId": "c",
                "clientSecret": "s",
                "tokenUrl": "https://auth"
            }
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Unsupported(_)));
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn test_page_pagination_stops_on_short_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("page", "1"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": items(0..2) })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": items(2..3) })))
        .expect(1)
        .mount(&server)
        .await;

    let connector = connected(
        &server,
        json!({
            "endpoints": { "list": "/products" },
            "pagination": { "type": "page", "pageSize": 2 },
            "responseMapping": { "dataPath": "items" }
        }),
    )
    .await;
    assert_eq!(connector.record_count(), 3);
}

#[tokio::test]
async fn test_offset_pagination_stops_at_total() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("offset", "0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "total": 4, "rows": items(0..2) })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("offset", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "total": 4, "rows": items(2..4) })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("offset", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "total": 4, "rows": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let connector = connected(
        &server,
        json!({
            "endpoints": { "list": "/rows" },
            "pagination": { "type": "offset", "pageSize": 2, "totalPath": "total" },
            "responseMapping": { "dataPath": "rows" }
        }),
    )
    .await;

    let mut out: Vec<Record> = Vec::new();
    let result = connector
        .sync_into(&[FieldMapping::new("sku", "sku")], &mut out)
        .await
        .unwrap();
    assert_eq!(result.records_processed, 4);
    assert_eq!(out[3]["sku"], "SKU-3");
}

#[tokio::test]
async fn test_cursor_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("cursor", "c2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": items(2..3), "next": null })),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": items(0..2), "next": "c2" })),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    let connector = connected(
        &server,
        json!({
            "endpoints": { "list": "/feed" },
            "pagination": { "type": "cursor", "pageSize": 2, "cursorPath": "next" },
            "responseMapping": { "dataPath": "data" }
        }),
    )
    .await;
    let ids: Vec<Value> = connector
        .preview(10)
        .await
        .unwrap()
        .iter()
        .map(|r| r["id"].clone())
        .collect();
    assert_eq!(ids, vec![json!(0), json!(1), json!(2)]);
}

#[tokio::test]
async fn test_max_pages_caps_the_walk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(items(0..2))))
        .expect(3)
        .mount(&server)
        .await;

    let connector = connected(
        &server,
        json!({
            "endpoints": { "list": "/endless" },
            "pagination": { "type": "page", "pageSize": 2, "maxPages": 3 }
        }),
    )
    .await;
    assert_eq!(connector.record_count(), 6);
}

// =============================================================================
// Detail endpoint
// =============================================================================

#[tokio::test]
async fn test_fetch_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products/42"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": 42, "name": "Drill" })),
        )
        .mount(&server)
        .await;

    let connector = connected(
        &server,
        json!({ "endpoints": { "list": "/products", "detail": "/products/{id}" } }),
    )
    .await;
    let record = connector.fetch_one("42").await.unwrap();
    assert_eq!(record["name"], "Drill");

    let no_detail = connected(&server, json!({ "endpoints": { "list": "/products" } })).await;
    assert!(no_detail.fetch_one("42").await.is_err());
}

#[tokio::test]
async fn test_fetch_one_escapes_id_as_one_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products/SKU%2F7%3Fx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sku": "SKU/7?x" })))
        .mount(&server)
        .await;

    let connector = connected(
        &server,
        json!({ "endpoints": { "list": "/products", "detail": "/products/{id}" } }),
    )
    .await;
    let record = connector.fetch_one("SKU/7?x").await.unwrap();
    assert_eq!(record["sku"], "SKU/7?x");
}
