//! Session & auth (C8): two parallel schemes share this module — a
//! cookie-session for the browser backed by an account-info cache, and a
//! signed access/refresh token pair for API and web-socket clients. The
//! HTTP-layer middleware that picks between them lives in `http`, which
//! decides which scheme a route needs.

pub mod middleware;
pub mod session;
pub mod token;

pub use session::{AccountCache, AccountInfo, CookieSettings};
pub use token::{Claims, TokenError, TokenPair, TokenSigner};

/// The resolved operator identity behind a request, regardless of which
/// scheme authenticated it.
#[derive(Debug, Clone)]
pub struct Identity {
    pub credential: String,
    pub account_id: String,
    pub namespace_id: String,
}
