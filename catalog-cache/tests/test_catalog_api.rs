use std::sync::Arc;

use anyhow::Result;
use assert_json_diff::{assert_json_eq, assert_json_include};
use reqwest::StatusCode;
use serde_json::{json, Value};

use catalog_cache::models::{NewReview, NewToolTranslation};
use catalog_cache::test_utils::{catalog_with, new_tool};
use common_redis::{CustomRedisError, MockRedisClient};

pub mod common;
use common::{seeded_store, ServerHandle};

#[tokio::test]
async fn it_serves_the_banner_and_liveness() -> Result<()> {
    let catalog = Arc::new(catalog_with(seeded_store(), None));
    let server = ServerHandle::for_catalog(catalog).await;

    let res = server.get("/", None).await;
    assert_eq!(StatusCode::OK, res.status());
    assert_json_eq!(
        res.json::<Value>().await?,
        json!({"message": "Catalog API is running"})
    );

    let res = server.get("/_liveness", None).await;
    assert_eq!(StatusCode::OK, res.status());
    assert_eq!(res.text().await?, "ok");

    Ok(())
}

#[tokio::test]
async fn it_lists_tools_and_caches_the_page() -> Result<()> {
    let store = seeded_store();
    let redis = MockRedisClient::new();
    let catalog = Arc::new(catalog_with(store.clone(), Some(redis.clone())));
    let server = ServerHandle::for_catalog(catalog).await;

    let res = server.get("/api/tools", Some("en")).await;
    assert_eq!(StatusCode::OK, res.status());
    let first = res.json::<Value>().await?;
    assert_json_include!(
        actual: first.clone(),
        expected: json!({
            "total": 2,
            "items": [
                {"slug": "midjourney", "name": "Миджорни", "category": {"id": 2, "name": "Картинки"}},
                {"slug": "chatgpt", "name": "ChatGPT", "category": {"id": 1, "name": "Chat"}, "platforms": ["web"]},
            ]
        })
    );
    assert!(redis.keys().contains(&"tools:en:all:0:12".to_string()));

    let second = server.get("/api/tools", Some("en")).await.json::<Value>().await?;
    assert_json_eq!(first, second);
    assert_eq!(store.calls("fetch_tools"), 1);

    Ok(())
}

#[tokio::test]
async fn it_paginates_and_filters() -> Result<()> {
    let store = seeded_store();
    let redis = MockRedisClient::new();
    let catalog = Arc::new(catalog_with(store.clone(), Some(redis.clone())));
    let server = ServerHandle::for_catalog(catalog).await;

    let page = server
        .get("/api/tools?page=2&limit=1", None)
        .await
        .json::<Value>()
        .await?;
    assert_json_include!(
        actual: page,
        expected: json!({"total": 2, "items": [{"slug": "chatgpt"}]})
    );
    assert!(redis.keys().contains(&"tools:ru:all:1:1".to_string()));

    let keys_before = redis.keys();
    let search = server
        .get("/api/tools?q=gpt", Some("en"))
        .await
        .json::<Value>()
        .await?;
    assert_json_include!(
        actual: search,
        expected: json!({"total": 1, "items": [{"slug": "chatgpt"}]})
    );
    assert_eq!(redis.keys(), keys_before);

    let res = server.get("/api/tools?page=0", None).await;
    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({"code": "bad_request"})
    );

    Ok(())
}

#[tokio::test]
async fn it_localizes_a_single_tool() -> Result<()> {
    let catalog = Arc::new(catalog_with(seeded_store(), Some(MockRedisClient::new())));
    let server = ServerHandle::for_catalog(catalog).await;

    let english = server
        .get("/api/tools/chatgpt", Some("en-US,en;q=0.9"))
        .await
        .json::<Value>()
        .await?;
    assert_json_include!(
        actual: english,
        expected: json!({"slug": "chatgpt", "name": "ChatGPT", "pricing_model": "free"})
    );

    let ukrainian = server
        .get("/api/tools/chatgpt", Some("uk"))
        .await
        .json::<Value>()
        .await?;
    assert_json_include!(
        actual: ukrainian,
        expected: json!({"name": "ЧатГПТ", "category": {"name": "Чат"}})
    );

    let res = server.get("/api/tools/nope", None).await;
    assert_eq!(StatusCode::NOT_FOUND, res.status());
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({"code": "tool_not_found"})
    );

    Ok(())
}

#[tokio::test]
async fn it_serves_highlights_and_categories() -> Result<()> {
    let catalog = Arc::new(catalog_with(seeded_store(), None));
    let server = ServerHandle::for_catalog(catalog).await;

    let featured = server
        .get("/api/tools/featured", None)
        .await
        .json::<Value>()
        .await?;
    assert_json_include!(
        actual: featured,
        expected: json!({"total": 1, "items": [{"slug": "midjourney"}]})
    );

    let latest = server
        .get("/api/tools/latest", None)
        .await
        .json::<Value>()
        .await?;
    assert_json_include!(
        actual: latest,
        expected: json!({"total": 2, "items": [{"slug": "midjourney"}, {"slug": "chatgpt"}]})
    );

    let categories = server
        .get("/api/categories", Some("en"))
        .await
        .json::<Value>()
        .await?;
    assert_json_eq!(
        categories,
        json!([{"id": 1, "name": "Chat"}, {"id": 2, "name": "Картинки"}])
    );

    Ok(())
}

#[tokio::test]
async fn it_reflects_writes_on_the_next_read() -> Result<()> {
    let store = seeded_store();
    let redis = MockRedisClient::new();
    let catalog = Arc::new(catalog_with(store.clone(), Some(redis.clone())));
    let server = ServerHandle::for_catalog(catalog.clone()).await;

    let before = server.get("/api/tools", None).await.json::<Value>().await?;
    assert_json_include!(actual: before, expected: json!({"total": 2}));
    server.get("/api/categories", None).await;

    catalog
        .create_tool(&new_tool(1, &[("ru", "Новый")]), 5)
        .await?;

    let after = server.get("/api/tools", None).await.json::<Value>().await?;
    assert_json_include!(
        actual: after,
        expected: json!({"total": 3, "items": [{"slug": "novyi", "name": "Новый"}]})
    );

    catalog
        .create_review(
            "novyi",
            &NewReview {
                rating: 4,
                text: Some("Отлично".to_string()),
            },
            9,
        )
        .await?;
    catalog
        .update_tool_translation(
            "novyi",
            &NewToolTranslation {
                language_code: "en".to_string(),
                name: "Brand new".to_string(),
                description: None,
                short_description: None,
            },
        )
        .await?;

    let tool = server
        .get("/api/tools/novyi", Some("en"))
        .await
        .json::<Value>()
        .await?;
    assert_json_include!(
        actual: tool,
        expected: json!({
            "name": "Brand new",
            "average_rating": 4.0,
            "review_count": 1,
            "reviews": [{"rating": 4, "text": "Отлично", "author": {"id": 9}}]
        })
    );

    let reviews = server
        .get("/api/tools/novyi/reviews", None)
        .await
        .json::<Value>()
        .await?;
    assert_json_include!(actual: reviews, expected: json!([{"rating": 4}]));

    Ok(())
}

#[tokio::test]
async fn it_keeps_serving_when_the_cache_is_down() -> Result<()> {
    let store = seeded_store();
    let redis = MockRedisClient::new().fail_with(CustomRedisError::Timeout);
    let catalog = Arc::new(catalog_with(store.clone(), Some(redis.clone())));
    let server = ServerHandle::for_catalog(catalog).await;

    for _ in 0..2 {
        let res = server.get("/api/tools", None).await;
        assert_eq!(StatusCode::OK, res.status());
        assert_json_include!(
            actual: res.json::<Value>().await?,
            expected: json!({"total": 2})
        );
    }
    assert_eq!(store.calls("fetch_tools"), 2);

    Ok(())
}

#[tokio::test]
async fn it_reports_an_unavailable_store() -> Result<()> {
    let store = seeded_store();
    let catalog = Arc::new(catalog_with(store.clone(), Some(MockRedisClient::new())));
    let server = ServerHandle::for_catalog(catalog).await;
    store.fail(true);

    let res = server.get("/api/tools", None).await;
    assert_eq!(StatusCode::SERVICE_UNAVAILABLE, res.status());
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({"code": "database_unavailable"})
    );

    Ok(())
}

#[tokio::test]
async fn it_clamps_oversized_pages_to_one_cache_key() -> Result<()> {
    let redis = MockRedisClient::new();
    let catalog = Arc::new(catalog_with(seeded_store(), Some(redis.clone())));
    let server = ServerHandle::for_catalog(catalog).await;

    for limit in [500, 1_000_000_000] {
        let res = server.get(&format!("/api/tools?limit={limit}"), None).await;
        assert_eq!(StatusCode::OK, res.status());
    }

    assert_eq!(redis.keys(), vec!["tool_count:all", "tools:ru:all:0:100"]);

    Ok(())
}
