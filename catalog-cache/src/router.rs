use std::convert::Infallible;
use std::future::ready;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header::ACCEPT_LANGUAGE, request::Parts},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::catalog::read_through::{DEFAULT_PAGE_SIZE, HIGHLIGHT_LIMIT};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::errors::CatalogError;
use crate::metrics_utils::{setup_metrics_recorder, track_metrics};
use crate::models::{
    Category, Language, PricingModel, Review, Tool, ToolFilter, ToolPage, ToolQuery, ToolSort,
};

/// Largest page a client may ask for; bigger limits are clamped.
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
}

/// Response language, taken from the `Accept-Language` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lang(pub Language);

#[async_trait]
impl<S> FromRequestParts<S> for Lang
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok());
        Ok(Lang(Language::from_accept_language(header)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListToolsParams {
    pub category_id: Option<i64>,
    pub q: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub pricing_model: Option<PricingModel>,
    pub platform: Option<String>,
    pub sort_by: Option<String>,
}

impl ListToolsParams {
    pub fn into_query(self, lang: Language) -> Result<ToolQuery, CatalogError> {
        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(CatalogError::BadRequest("page starts at 1".to_string()));
        }
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 {
            return Err(CatalogError::BadRequest("limit must be positive".to_string()));
        }
        let limit = limit.min(MAX_PAGE_SIZE);
        let skip = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| CatalogError::BadRequest("page out of range".to_string()))?;

        let filter = ToolFilter {
            category_id: self.category_id,
            search: self.q.filter(|q| !q.trim().is_empty()),
            featured: None,
            pricing_model: self.pricing_model,
            platform: self.platform.filter(|p| !p.trim().is_empty()),
            sort: self.sort_by.as_deref().and_then(ToolSort::parse),
        };

        Ok(ToolQuery::page(lang, skip, limit).with_filter(filter))
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewParams {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_review_limit")]
    pub limit: u64,
}

fn default_review_limit() -> u64 {
    MAX_PAGE_SIZE
}

#[derive(Serialize)]
struct Banner {
    message: &'static str,
}

pub fn router(catalog: Arc<Catalog>, config: &Config) -> Router {
    let state = AppState { catalog };

    let status_router = Router::new()
        .route("/", get(index))
        .route("/_liveness", get(|| ready("ok")));

    let api_router = Router::new()
        .route("/api/tools", get(list_tools))
        .route("/api/tools/featured", get(featured_tools))
        .route("/api/tools/latest", get(latest_tools))
        .route("/api/tools/:slug", get(get_tool))
        .route("/api/tools/:slug/reviews", get(tool_reviews))
        .route("/api/categories", get(list_categories))
        .layer(ConcurrencyLimitLayer::new(config.max_concurrency));

    let router = Router::new()
        .merge(status_router)
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // The recorder is process-global, so tests leave it off
    if !*config.enable_metrics {
        return router;
    }
    match setup_metrics_recorder() {
        Ok(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to install metrics recorder");
            router
        }
    }
}

async fn index() -> Json<Banner> {
    Json(Banner {
        message: "Catalog API is running",
    })
}

async fn list_tools(
    State(state): State<AppState>,
    Lang(lang): Lang,
    Query(params): Query<ListToolsParams>,
) -> Result<Json<ToolPage>, CatalogError> {
    let query = params.into_query(lang)?;
    Ok(Json(state.catalog.list_tools(&query).await?))
}

async fn featured_tools(
    State(state): State<AppState>,
    Lang(lang): Lang,
) -> Result<Json<ToolPage>, CatalogError> {
    Ok(Json(state.catalog.featured_tools(lang, HIGHLIGHT_LIMIT).await?))
}

async fn latest_tools(
    State(state): State<AppState>,
    Lang(lang): Lang,
) -> Result<Json<ToolPage>, CatalogError> {
    Ok(Json(state.catalog.latest_tools(lang, HIGHLIGHT_LIMIT).await?))
}

async fn get_tool(
    State(state): State<AppState>,
    Lang(lang): Lang,
    Path(slug): Path<String>,
) -> Result<Json<Tool>, CatalogError> {
    state
        .catalog
        .get_tool(&slug, lang)
        .await?
        .map(Json)
        .ok_or(CatalogError::ToolNotFound(slug))
}

async fn tool_reviews(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<ReviewParams>,
) -> Result<Json<Vec<Review>>, CatalogError> {
    let reviews = state
        .catalog
        .reviews_for_tool(&slug, params.skip, params.limit.min(MAX_PAGE_SIZE))
        .await?;
    Ok(Json(reviews))
}

async fn list_categories(
    State(state): State<AppState>,
    Lang(lang): Lang,
) -> Result<Json<Vec<Category>>, CatalogError> {
    Ok(Json(state.catalog.list_categories(lang).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_and_limit_become_skip() {
        let params = ListToolsParams {
            page: Some(3),
            limit: Some(10),
            ..Default::default()
        };
        let query = params.into_query(Language::En).unwrap();

        assert_eq!(query.skip, 20);
        assert_eq!(query.limit, 10);
        assert_eq!(query.lang, Language::En);
        assert!(query.is_cacheable());
    }

    #[test]
    fn test_defaults_match_the_first_page() {
        let query = ListToolsParams::default()
            .into_query(Language::Ru)
            .unwrap();
        assert_eq!(query, ToolQuery::page(Language::Ru, 0, DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn test_oversized_limit_is_clamped() {
        let params = ListToolsParams {
            page: Some(2),
            limit: Some(1_000_000_000),
            ..Default::default()
        };
        let query = params.into_query(Language::Ru).unwrap();

        assert_eq!(query.limit, MAX_PAGE_SIZE);
        assert_eq!(query.skip, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_page_zero_is_rejected() {
        let params = ListToolsParams {
            page: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            params.into_query(Language::Ru),
            Err(CatalogError::BadRequest(_))
        ));
    }

    #[test]
    fn test_blank_search_and_unknown_sort_are_ignored() {
        let params = ListToolsParams {
            q: Some("   ".to_string()),
            sort_by: Some("popularity".to_string()),
            ..Default::default()
        };
        let query = params.into_query(Language::Ru).unwrap();
        assert!(query.is_cacheable());

        let params = ListToolsParams {
            q: Some("gpt".to_string()),
            sort_by: Some("rating".to_string()),
            ..Default::default()
        };
        let query = params.into_query(Language::Ru).unwrap();
        assert_eq!(query.filter.search.as_deref(), Some("gpt"));
        assert_eq!(query.filter.sort, Some(ToolSort::Rating));
    }
}
