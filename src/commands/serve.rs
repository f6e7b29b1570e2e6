use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{info, warn};

use crate::cli::ServeArgs;
use crate::model::{CollectionStats, Record, RecordFilter, RecordSummary};
use crate::store::Store;
use crate::util::block_on;

pub fn run(args: ServeArgs) -> Result<()> {
    let store = Arc::new(Store::open_existing(&args.paths.db_path())?);
    let ui_dist = args
        .ui_dist
        .clone()
        .unwrap_or_else(|| args.paths.collection_root.join("ui").join("dist"));
    let app = router(store, &args.paths.collection_root, Some(&ui_dist));

    block_on(async move {
        let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
        info!(address = %format!("http://{}:{}", args.host, args.port), "serving collection");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("http server failed")
    })?
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
    }
    info!("shutting down");
}

#[derive(Clone)]
struct ApiState {
    store: Arc<Store>,
}

/// API routes, the collection's `images/` tree at `/image/images/...`, and the built UI (when
/// `ui_dist` holds an `index.html`) for every other path. Nothing else under the collection
/// root is served.
pub fn router(store: Arc<Store>, collection_root: &Path, ui_dist: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/pokemon", get(list_pokemon))
        .route("/api/pokemon/:id", get(get_pokemon))
        .route("/api/stats", get(get_stats))
        .nest_service("/image/images", ServeDir::new(collection_root.join("images")))
        .with_state(ApiState { store });

    let app = match ui_dist.filter(|dist| dist.join("index.html").is_file()) {
        Some(dist) => app.fallback_service(
            ServeDir::new(dist).fallback(ServeFile::new(dist.join("index.html"))),
        ),
        None => app,
    };

    app.layer(cors)
}

enum ApiError {
    NotFound,
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found" }))).into_response()
            }
            Self::Internal(err) => {
                warn!(error = %err, "api request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": err.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

/// Runs a store query off the async workers.
async fn query<T, F>(state: &ApiState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Store) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|err| ApiError::Internal(anyhow!(err)))?
        .map_err(ApiError::Internal)
}

fn image_url(path: Option<&str>) -> Option<String> {
    path.map(|path| format!("/image/{path}"))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    q: Option<String>,
    shiny: Option<bool>,
    ot: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Serialize)]
struct ListedRecord {
    #[serde(flatten)]
    summary: RecordSummary,
    image_url: Option<String>,
}

#[derive(Serialize)]
struct ListResponse {
    total: i64,
    items: Vec<ListedRecord>,
}

async fn list_pokemon(
    State(state): State<ApiState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let filter = RecordFilter {
        text: params.q,
        shiny: params.shiny,
        trainer: params.ot,
        limit: params.limit.unwrap_or(0),
        offset: params.offset.unwrap_or(0),
    };
    let page = query(&state, move |store| store.list_records(&filter)).await?;

    let items = page
        .items
        .into_iter()
        .map(|summary| ListedRecord {
            image_url: image_url(summary.detail_screenshot_path.as_deref()),
            summary,
        })
        .collect();
    Ok(Json(ListResponse {
        total: page.total,
        items,
    }))
}

#[derive(Serialize)]
struct RecordDetail {
    #[serde(flatten)]
    record: Record,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
}

async fn get_pokemon(
    State(state): State<ApiState>,
    UrlPath(id): UrlPath<i64>,
) -> Result<Json<RecordDetail>, ApiError> {
    let record = query(&state, move |store| store.record_by_id(id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(RecordDetail {
        image_url: image_url(record.detail_screenshot_path.as_deref()),
        record,
    }))
}

async fn get_stats(State(state): State<ApiState>) -> Result<Json<CollectionStats>, ApiError> {
    let stats = query(&state, |store| store.collection_stats()).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value as JsonValue;
    use tower::ServiceExt;

    use super::*;
    use crate::model::RecordKey;
    use crate::store::RecordUpdate;

    fn seed(store: &Store, key: RecordKey, species: &str, trainer: &str, shiny: bool) {
        let mut update = RecordUpdate::new(key);
        update
            .set_text("species_name", species)
            .expect("species")
            .set_text("original_trainer", trainer)
            .expect("trainer")
            .set("is_shiny", shiny)
            .expect("shiny")
            .set_text(
                "detail_screenshot_path",
                format!("images/detail/box_{:03}_slot_{:02}.png", key.box_number, key.box_slot),
            )
            .expect("path")
            .set_text("parsed_at", "2026-01-01T00:00:00Z")
            .expect("parsed_at");
        store.upsert_record(&update).expect("seed");
    }

    fn app(root: &Path) -> Router {
        let store = Store::open_in_memory().expect("store");
        seed(&store, RecordKey::new(0, 0), "Pikachu", "Ash", false);
        seed(&store, RecordKey::new(0, 1), "Charizard", "Ash", true);
        seed(&store, RecordKey::new(1, 0), "Pichu", "Misty", false);

        let mut unparsed = RecordUpdate::new(RecordKey::new(2, 0));
        unparsed
            .set_text("detail_screenshot_path", "images/detail/box_002_slot_00.png")
            .expect("path");
        store.upsert_record(&unparsed).expect("seed");

        router(Arc::new(store), root, None)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, JsonValue) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    #[tokio::test]
    async fn list_filters_parsed_records_and_adds_image_urls() {
        let dir = tempfile::tempdir().expect("tempdir");

        let (status, body) = get_json(app(dir.path()), "/api/pokemon?q=pi").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["items"][0]["species_name"], "Pikachu");
        assert_eq!(
            body["items"][0]["image_url"],
            "/image/images/detail/box_000_slot_00.png"
        );

        let (_, shiny) = get_json(app(dir.path()), "/api/pokemon?shiny=true").await;
        assert_eq!(shiny["total"], 1);
        assert_eq!(shiny["items"][0]["species_name"], "Charizard");

        let (_, paged) = get_json(app(dir.path()), "/api/pokemon?ot=ash&limit=1&offset=1").await;
        assert_eq!(paged["total"], 2);
        assert_eq!(paged["items"].as_array().expect("items").len(), 1);
        assert_eq!(paged["items"][0]["species_name"], "Charizard");
    }

    #[tokio::test]
    async fn detail_returns_record_or_404() {
        let dir = tempfile::tempdir().expect("tempdir");

        let (status, body) = get_json(app(dir.path()), "/api/pokemon/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["species_name"], "Pikachu");
        assert_eq!(body["box_number"], 0);
        assert!(body["image_url"].is_string());

        let (status, body) = get_json(app(dir.path()), "/api/pokemon/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Not found");
    }

    #[tokio::test]
    async fn stats_count_parsed_records_and_trainers() {
        let dir = tempfile::tempdir().expect("tempdir");

        let (status, body) = get_json(app(dir.path()), "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["shiny"], 1);
        assert_eq!(body["top_trainers"][0]["original_trainer"], "Ash");
        assert_eq!(body["top_trainers"][0]["n"], 2);
    }

    #[tokio::test]
    async fn only_the_images_tree_is_served() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("images/detail")).expect("mkdir");
        std::fs::write(dir.path().join("images/detail/a.png"), b"png bytes").expect("write");

        let response = app(dir.path())
            .oneshot(
                Request::builder()
                    .uri("/image/images/detail/a.png")
                    .header("origin", "http://localhost:5173")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|value| value.to_str().ok()),
            Some("*")
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&body[..], b"png bytes");

        let missing = app(dir.path())
            .oneshot(
                Request::builder()
                    .uri("/image/images/detail/missing.png")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        std::fs::write(dir.path().join("pokemon_home.db"), b"sqlite").expect("write db");
        let database = app(dir.path())
            .oneshot(
                Request::builder()
                    .uri("/image/pokemon_home.db")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(database.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn built_ui_is_the_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dist = dir.path().join("ui/dist");
        std::fs::create_dir_all(&dist).expect("mkdir");
        std::fs::write(dist.join("index.html"), "<html>collection</html>").expect("write");

        let store = Store::open_in_memory().expect("store");
        let app = router(Arc::new(store), dir.path(), Some(&dist));
        let response = app
            .oneshot(Request::builder().uri("/boxes/3").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&body[..], b"<html>collection</html>");
    }
}
