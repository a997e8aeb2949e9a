/// Integration tests with mocked external APIs
/// Drives the HTTP router end to end without hitting real registries or LLMs
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use company_valuation_api::config::Config;
use company_valuation_api::enrichment::EnrichmentOrchestrator;
use company_valuation_api::enrichment_cache::MemoryEnrichmentCache;
use company_valuation_api::errors::RATE_LIMIT_MESSAGE;
use company_valuation_api::handlers::{router, AppState};
use company_valuation_api::llm_client::{OpenAiChatClient, TextGenerator};
use company_valuation_api::rate_limit::RateLimiters;
use company_valuation_api::sources::default_adapters;
use company_valuation_api::valuation_service::ValuationService;
use company_valuation_api::valuation_store::MemoryValuationStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create test config pointing every source at the mock server
fn create_test_config(base_url: &str) -> Config {
    Config {
        brreg_base_url: base_url.to_string(),
        secondary_registry_url: format!("{}/directory", base_url),
        professional_network_url: base_url.to_string(),
        reviews_base_url: base_url.to_string(),
        source_timeout_secs: 5,
        ..Config::default()
    }
}

fn build_app(
    config: &Config,
    generator: Option<Arc<dyn TextGenerator>>,
    valuation_per_minute: u32,
) -> (Router, Arc<MemoryValuationStore>) {
    let adapters = default_adapters(config, generator.clone()).unwrap();
    let enrichment = Arc::new(EnrichmentOrchestrator::new(
        adapters,
        Arc::new(MemoryEnrichmentCache::default()),
        Duration::from_secs(config.source_timeout_secs),
    ));
    let store = Arc::new(MemoryValuationStore::new());
    let valuation = Arc::new(ValuationService::new(
        generator,
        store.clone(),
        Some(enrichment.clone()),
        config.bands,
    ));
    let state = Arc::new(AppState {
        config: config.clone(),
        enrichment,
        valuation,
        rate_limiters: Arc::new(RateLimiters::new(100, valuation_per_minute)),
    });
    (router(state), store)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn valuation_body() -> Value {
    json!({
        "companyName": "Nordlys Software AS",
        "email": "eier@nordlys.no",
        "exactRevenue": "45 000 000",
        "operatingCosts": 38_800_000,
        "industry": "tech",
        "employees": "25+",
        "revenue3Years": "strong_growth"
    })
}

fn chat_reply(content: &str) -> Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

async fn mount_registry(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/enhetsregisteret/api/enheter/923609016"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organisasjonsnummer": "923609016",
            "navn": "NORDLYS SOFTWARE AS",
            "organisasjonsform": { "kode": "AS" },
            "registreringsdatoEnhetsregisteret": "2012-05-10",
            "naeringskode1": { "kode": "62.010", "beskrivelse": "Programmeringstjenester" },
            "antallAnsatte": 31
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/regnskapsregisteret/regnskap/923609016"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "regnskapsperiode": { "fraDato": "2023-01-01", "tilDato": "2023-12-31" },
                "resultatregnskapResultat": {
                    "driftsresultat": {
                        "driftsinntekter": { "sumDriftsinntekter": 38000000.0 },
                        "driftsresultat": 4000000.0
                    }
                }
            },
            {
                "regnskapsperiode": { "fraDato": "2024-01-01", "tilDato": "2024-12-31" },
                "resultatregnskapResultat": {
                    "driftsresultat": {
                        "driftsinntekter": { "sumDriftsinntekter": 45000000.0 },
                        "driftsresultat": 6200000.0
                    }
                }
            }
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;
    let (app, _) = build_app(&create_test_config(&server.uri()), None, 10);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_enrichment_from_registry_and_filings() {
    let server = MockServer::start().await;
    mount_registry(&server).await;
    let (app, _) = build_app(&create_test_config(&server.uri()), None, 10);

    let (status, body) = post_json(&app, "/api/v1/enrichment", json!({ "orgNumber": "923 609 016" })).await;

    assert_eq!(status, StatusCode::OK);
    let auto_fill = &body["autoFill"];
    assert_eq!(auto_fill["companyName"], "NORDLYS SOFTWARE AS");
    assert_eq!(auto_fill["industry"], "tech");
    assert_eq!(auto_fill["employeeBucket"], "25+");
    assert_eq!(auto_fill["latestRevenue"], 45000000.0);
    assert_eq!(auto_fill["revenueTrend"], "strong_growth");
    assert!(body["rawData"]["registry"].is_object());
    assert!(body["rawData"]["secondary_registry"].is_null());
}

#[tokio::test]
async fn test_enrichment_requires_org_number_or_website() {
    let server = MockServer::start().await;
    let (app, _) = build_app(&create_test_config(&server.uri()), None, 10);

    let (status, body) = post_json(&app, "/api/v1/enrichment", json!({ "companyName": "Acme AS" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("orgNumber"));
}

#[tokio::test]
async fn test_generator_transport_error_still_returns_valuation() {
    let server = MockServer::start().await;
    // Nothing listens on port 1, so every call fails at the transport level
    let generator = OpenAiChatClient::new(
        "http://127.0.0.1:1".to_string(),
        "test-key".to_string(),
        "test-model".to_string(),
        Duration::from_secs(2),
    )
    .unwrap();
    let (app, store) = build_app(
        &create_test_config(&server.uri()),
        Some(Arc::new(generator)),
        10,
    );

    let (status, body) = post_json(&app, "/api/v1/valuation", valuation_body()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["method"], "deterministic_multi_method");
    assert!(body["recordId"].is_string());
    assert_eq!(store.all().await.len(), 1);
}

#[tokio::test]
async fn test_ai_valuation_is_repaired_and_returned() {
    let server = MockServer::start().await;
    let reply = r#"```json
{"valuationRange": {"min": 28, "mostLikely": 36, "max": 50}, "unit": "MNOK",
 "methodology": "EV/EBITDA 8.0x adjusted +15% for strong growth",
 "recommendations": ["Reduce key-person dependency"]}
```"#;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(reply)))
        .expect(1)
        .mount(&server)
        .await;

    let generator = OpenAiChatClient::new(
        server.uri(),
        "test-key".to_string(),
        "test-model".to_string(),
        Duration::from_secs(5),
    )
    .unwrap();
    let (app, _) = build_app(
        &create_test_config(&server.uri()),
        Some(Arc::new(generator)),
        10,
    );

    let (status, body) = post_json(&app, "/api/v1/valuation", valuation_body()).await;

    assert_eq!(status, StatusCode::OK);
    let result = &body["result"];
    assert_eq!(result["method"], "ai_assisted");
    assert_eq!(result["valuationRange"]["mostLikely"], 36_000_000.0);
    assert_eq!(result["recommendations"][0], "Reduce key-person dependency");
    assert!(result["analysis"]["strengths"].is_array());
}

#[tokio::test]
async fn test_invalid_valuation_body_is_rejected() {
    let server = MockServer::start().await;
    let (app, store) = build_app(&create_test_config(&server.uri()), None, 10);

    let (status, body) = post_json(
        &app,
        "/api/v1/valuation",
        json!({ "companyName": "", "industry": "spaceships", "email": "nope" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert!(fields.contains(&"companyName"));
    assert!(fields.contains(&"industry"));
    assert!(fields.contains(&"email"));
    assert!(store.all().await.is_empty());
}

#[tokio::test]
async fn test_malformed_json_gets_the_standard_error_shape() {
    let server = MockServer::start().await;
    let (app, store) = build_app(&create_test_config(&server.uri()), None, 10);

    for uri in ["/api/v1/enrichment", "/api/v1/valuation", "/api/v1/valuation/draft"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from("{\"companyName\": \"Acme AS\""))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(
            body["error"].as_str().unwrap().starts_with("Invalid JSON body"),
            "{}: {}",
            uri,
            body
        );
    }
    assert!(store.all().await.is_empty());
}

#[tokio::test]
async fn test_valuation_rate_limit() {
    let server = MockServer::start().await;
    let (app, _) = build_app(&create_test_config(&server.uri()), None, 1);

    let (first, _) = post_json(&app, "/api/v1/valuation", valuation_body()).await;
    let (second, body) = post_json(&app, "/api/v1/valuation", valuation_body()).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], RATE_LIMIT_MESSAGE);
}

#[tokio::test]
async fn test_draft_is_upgraded_by_valuation() {
    let server = MockServer::start().await;
    let (app, store) = build_app(&create_test_config(&server.uri()), None, 10);

    let (status, draft) = post_json(
        &app,
        "/api/v1/valuation/draft",
        json!({ "email": "EIER@nordlys.no", "companyName": "Nordlys Software AS" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = post_json(&app, "/api/v1/valuation", valuation_body()).await;

    assert_eq!(body["recordId"], draft["recordId"]);
    let records = store.all().await;
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_draft());
}

#[tokio::test]
async fn test_cached_filings_feed_the_valuation() {
    let server = MockServer::start().await;
    mount_registry(&server).await;
    let (app, _) = build_app(&create_test_config(&server.uri()), None, 10);

    let (status, _) = post_json(&app, "/api/v1/enrichment", json!({ "orgNumber": "923609016" })).await;
    assert_eq!(status, StatusCode::OK);

    let mut body = valuation_body();
    body["orgNumber"] = json!("923609016");
    let (_, valuation) = post_json(&app, "/api/v1/valuation", body).await;

    let trends = &valuation["result"]["historicalTrends"];
    assert_eq!(trends["years"], json!([2023, 2024]));
    assert_eq!(trends["recentTrend"], "improving");
}
