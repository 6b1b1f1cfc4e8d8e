//! Picks between the cookie-session and signed-token schemes per request
//! and injects the resolved `Identity` into the request's extensions.
//! Precedence: cookie first, then bearer token.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::AppState;

use super::session;
use super::token::TokenKind;
use super::{Identity, TokenError};

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(str::to_string)
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let identity = if let Some(credential) = session::extract_session_cookie(&headers) {
        let info = state
            .accounts
            .resolve(&state.dns, &credential)
            .await
            .map_err(|_| (StatusCode::UNAUTHORIZED, "invalid session".to_string()))?;
        Identity {
            credential,
            account_id: info.account_id,
            namespace_id: info.namespace_id,
        }
    } else if let Some(token) = extract_bearer_token(&headers) {
        let claims = state.tokens.verify(&token).map_err(|e| match e {
            TokenError::Expired => (StatusCode::UNAUTHORIZED, "token has expired".to_string()),
            TokenError::Invalid => (StatusCode::UNAUTHORIZED, "invalid token".to_string()),
        })?;
        if claims.kind != TokenKind::Access {
            return Err((
                StatusCode::UNAUTHORIZED,
                "refresh tokens cannot authenticate requests".to_string(),
            ));
        }
        Identity {
            credential: claims.cf_token,
            account_id: claims.account_id,
            namespace_id: claims.namespace_id,
        }
    } else {
        return Err((
            StatusCode::UNAUTHORIZED,
            "missing session cookie or bearer token".to_string(),
        ));
    };

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
