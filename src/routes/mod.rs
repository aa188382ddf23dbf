use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::state::AppState;

pub mod auth;
pub mod forms;
pub mod health;
pub mod notes;
pub mod public;
pub mod settings;
pub mod users;

/// Two attachments of up to 10MB each plus the form fields.
const MAX_REQUEST_BYTES: usize = 25 * 1024 * 1024;

fn cors_layer(state: &AppState) -> CorsLayer {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS origin");
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
    let cors = cors_layer(&state);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let notes_routes = Router::new()
        .route("/", get(notes::list_notes).post(notes::create_note))
        .route("/summary", get(notes::summarize_notes))
        .route("/duplicates", get(notes::find_duplicates))
        .route("/extract", post(notes::extract_fields))
        .route(
            "/:id",
            get(notes::get_note)
                .patch(notes::update_note)
                .delete(notes::trash_note),
        )
        .route("/:id/history", get(notes::note_history))
        .route("/:id/files/:kind", get(notes::download_note_file))
        .route("/:id/attestation-link", post(notes::mint_attestation_link))
        .route("/:id/attest", post(notes::attest_note))
        .route("/:id/revert", post(notes::revert_note))
        .route("/:id/restore", post(notes::restore_note))
        .route("/:id/permanent", delete(notes::purge_note));

    let users_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id/role", patch(users::update_role));

    let settings_routes = Router::new()
        .route(
            "/",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/templates", get(settings::list_templates))
        .route(
            "/templates/:kind",
            get(settings::get_template).put(settings::save_template),
        );

    let public_routes = Router::new()
        .route("/:token", get(public::show_attestation))
        .route("/:token/file", get(public::original_file))
        .route("/:token/attest", post(public::attest))
        .route("/:token/reject", post(public::reject));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/notes", notes_routes)
        .nest("/api/users", users_routes)
        .nest("/api/settings", settings_routes)
        .nest("/public/attestation", public_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
