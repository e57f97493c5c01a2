pub mod health;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Round sessions
        .route("/api/v1/sessions", post(handlers::handle_open_session))
        .route("/api/v1/sessions/:id", delete(handlers::handle_close_session))
        .route("/api/v1/sessions/:id/round", post(handlers::handle_select_round))
        .route("/api/v1/sessions/:id/load", post(handlers::handle_load))
        .route(
            "/api/v1/sessions/:id/load-more",
            post(handlers::handle_load_more),
        )
        .route("/api/v1/sessions/:id/view", get(handlers::handle_view))
        // Per-candidate operations
        .route(
            "/api/v1/sessions/:id/candidates/:cid/status",
            patch(handlers::handle_set_status),
        )
        .route(
            "/api/v1/sessions/:id/candidates/:cid/re-evaluate",
            post(handlers::handle_re_evaluate),
        )
        .route(
            "/api/v1/sessions/:id/candidates/:cid/re-evaluate/options",
            post(handlers::handle_show_re_evaluate_options)
                .delete(handlers::handle_hide_re_evaluate_options),
        )
        .route(
            "/api/v1/sessions/:id/candidates/:cid/transcript",
            post(handlers::handle_transcript_re_evaluate),
        )
        // Batch evaluation and stage advancement
        .route("/api/v1/sessions/:id/evaluate", post(handlers::handle_evaluate))
        .route("/api/v1/sessions/:id/advance", post(handlers::handle_advance))
        .with_state(state)
}
