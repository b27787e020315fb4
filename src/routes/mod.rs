use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod documents;
pub mod health;
pub mod summarize;

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());
    let body_limit = state.upload_limits().request_body_limit();

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let documents_routes = Router::new()
        .route(
            "/",
            get(documents::list_documents).post(documents::upload_documents),
        )
        .route(
            "/:id",
            get(documents::get_document)
                .delete(documents::delete_document)
                .patch(documents::update_document),
        )
        .route("/:id/download", get(documents::download_document))
        .route("/:id/content", get(documents::get_document_content))
        .route("/:id/summary", get(documents::get_document_summary))
        .route(
            "/:id/summary/export",
            get(documents::export_document_summary),
        )
        .route("/:id/summarize", post(documents::request_summary))
        .route("/:id/quick-summary", post(documents::quick_summary));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/documents", documents_routes)
        .route(
            "/api/summarize",
            get(summarize::status).post(summarize::summarize_file),
        )
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}
