mod common;

use axum::Router;
use axum_test::TestServer;
use common::MemoryLinkRepository;
use shortlink_engine::AppState;
use shortlink_engine::api::routes::api_routes;
use shortlink_engine::domain::click_event::ClickEvent;
use std::sync::Arc;

fn api_server(state: AppState) -> TestServer {
    let app = Router::new().nest("/api", api_routes()).with_state(state);
    TestServer::new(app).unwrap()
}

fn seeded_repo() -> Arc<MemoryLinkRepository> {
    let repo = Arc::new(MemoryLinkRepository::new());
    repo.insert("low001", "https://example.com/low", None);
    repo.insert("top001", "https://example.com/top", None);
    repo.insert("mid001", "https://example.com/mid", None);
    repo.insert_expired("old001", "https://example.com/old");
    repo.set_clicks("low001", 1);
    repo.set_clicks("top001", 50);
    repo.set_clicks("mid001", 20);
    repo.set_clicks("old001", 500);
    repo
}

#[tokio::test]
async fn test_link_includes_pending_clicks() {
    let repo = seeded_repo();
    let state = common::create_test_state(repo, common::memory_cache());
    for _ in 0..2 {
        state
            .clicks
            .process_click(&ClickEvent::new("mid001", None))
            .await
            .unwrap();
    }
    let server = api_server(state);

    let response = server.get("/api/links/mid001").await;

    response.assert_status_ok();
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["code"], "mid001");
    assert_eq!(json["destination"], "https://example.com/mid");
    assert_eq!(json["clicks"], 22);
    assert_eq!(json["pending_clicks"], 2);
}

#[tokio::test]
async fn test_link_not_found_and_expired() {
    let server = api_server(common::create_test_state(
        seeded_repo(),
        common::memory_cache(),
    ));

    server.get("/api/links/nothere").await.assert_status_not_found();
    server.get("/api/links/old001").await.assert_status_not_found();
}

#[tokio::test]
async fn test_popular_orders_live_links_by_clicks() {
    let server = api_server(common::create_test_state(
        seeded_repo(),
        common::memory_cache(),
    ));

    let response = server.get("/api/popular").await;

    response.assert_status_ok();
    let json = response.json::<serde_json::Value>();
    let codes: Vec<&str> = json["items"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|item| item["code"].as_str())
        .collect();
    assert_eq!(codes, vec!["top001", "mid001", "low001"]);
}

#[tokio::test]
async fn test_popular_limit_and_cache() {
    let repo = seeded_repo();
    let server = api_server(common::create_test_state(
        repo.clone(),
        common::memory_cache(),
    ));

    let response = server.get("/api/popular").add_query_param("limit", 1).await;
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["items"].as_array().unwrap().len(), 1);

    // Served from the cached list until its TTL runs out.
    repo.set_clicks("low001", 1_000);
    let response = server.get("/api/popular").add_query_param("limit", 1).await;
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["items"][0]["code"], "top001");
}

#[tokio::test]
async fn test_recent_excludes_expired() {
    let server = api_server(common::create_test_state(
        seeded_repo(),
        common::memory_cache(),
    ));

    let response = server.get("/api/recent").await;

    response.assert_status_ok();
    let json = response.json::<serde_json::Value>();
    let items = json["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|item| item["code"] != "old001"));
}

#[tokio::test]
async fn test_stats_totals() {
    let repo = seeded_repo();
    let state = common::create_test_state(repo, common::memory_cache());
    state.slugs.refill(20).await.unwrap();
    let server = api_server(state);

    let response = server.get("/api/stats").await;

    response.assert_status_ok();
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["total_links"], 4);
    assert_eq!(json["active_links"], 3);
    assert_eq!(json["expired_links"], 1);
    assert_eq!(json["total_clicks"], 571);
    assert!(json["slug_pool_size"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_stats_without_cache_reports_no_pool_size() {
    let server = api_server(common::create_test_state(
        seeded_repo(),
        common::failing_cache(),
    ));

    let response = server.get("/api/stats").await;

    response.assert_status_ok();
    let json = response.json::<serde_json::Value>();
    assert!(json["slug_pool_size"].is_null());
}
