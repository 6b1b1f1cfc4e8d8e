//! `GET /ws/terminal/:uuid`: the web-socket upgrade a browser opens after
//! `POST /vps/:id/terminal` hands it a uuid and an access token. Sits in the
//! public router since its auth is a query-string token, not a header the
//! generic cookie/bearer middleware inspects.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::token::TokenKind;
use crate::terminal;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct TerminalAuthParams {
    pub token: String,
}

pub async fn upgrade(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<TerminalAuthParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match state.tokens.verify(&params.token) {
        Ok(c) => c,
        Err(_) => return (StatusCode::UNAUTHORIZED, "invalid or expired token").into_response(),
    };
    if claims.kind != TokenKind::Access {
        return (StatusCode::UNAUTHORIZED, "refresh tokens cannot open terminals").into_response();
    }

    let Some(pending) = state.terminal.take(id) else {
        return (StatusCode::NOT_FOUND, "terminal session not found or already consumed").into_response();
    };

    ws.on_upgrade(move |socket| async move {
        terminal::handle_socket(socket, &state.ssh, pending).await;
    })
}
