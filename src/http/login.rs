//! `GET /login` serves a minimal placeholder page; the actual
//! authentication happens against `POST /login` with the operator's DNS
//! provider credential, which doubles as a session cookie value and a
//! signed-token seed.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::auth::session;
use crate::error::ServerError;
use crate::kv::KvStore;
use crate::vault;

use super::AppState;

const LOGIN_PAGE: &str = "<!DOCTYPE html><html><head><title>Xanthus</title></head>\
<body><h1>Xanthus</h1><p>POST your provider credential to /login.</p></body></html>";

pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub credential: String,
}

/// Resolves the credential, creates the shared key material on first login
/// if absent, sets the session cookie, and redirects to the app shell.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ServerError> {
    let info = state.accounts.resolve(&state.dns, &payload.credential).await?;

    let kv = KvStore::new(state.dns.clone(), payload.credential.clone(), info.namespace_id.clone());
    vault::ensure_shared_key(&kv, &payload.credential).await?;

    let cookie = session::create_session_cookie(&payload.credential, &state.cookies);
    Ok((
        StatusCode::FOUND,
        [(header::SET_COOKIE, cookie), (header::LOCATION, "/main".to_string())],
    )
        .into_response())
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = session::clear_session_cookie(&state.cookies);
    (axum::http::StatusCode::OK, [(header::SET_COOKIE, cookie)])
}
