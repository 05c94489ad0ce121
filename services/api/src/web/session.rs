//! services/api/src/web/session.rs
//!
//! Signed session cookies and the middleware protecting session-bound routes.
//!
//! A session is identified by `session=<uuid>.<signature>` where the
//! signature is HMAC-SHA256 over the UUID bytes. The server keeps no cookie
//! state; a valid signature is the only proof of authenticity.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

use crate::web::state::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "session";

/// Produces the signed cookie value for a session id.
pub fn sign(secret: &[u8], session_id: &Uuid) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(session_id.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{session_id}.{signature}")
}

/// Verifies a signed cookie value, returning the session id it carries.
pub fn verify(secret: &[u8], value: &str) -> Option<Uuid> {
    let (id_part, signature_part) = value.split_once('.')?;
    let session_id = Uuid::parse_str(id_part).ok()?;
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(session_id.as_bytes());
    let signature = URL_SAFE_NO_PAD.decode(signature_part).ok()?;
    mac.verify_slice(&signature).ok()?;
    Some(session_id)
}

/// Middleware that validates the session cookie and extracts the session id.
///
/// If valid, inserts the session id into request extensions for handlers to
/// use. If invalid or missing, returns 401 Unauthorized.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let raw_cookie = cookie_header
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let session_id = verify(state.config.cookie_secret.as_bytes(), raw_cookie)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(session_id);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_cookie_round_trips() {
        let session_id = Uuid::new_v4();
        let value = sign(b"secret", &session_id);
        assert_eq!(verify(b"secret", &value), Some(session_id));
    }

    #[test]
    fn tampered_cookie_is_rejected() {
        let session_id = Uuid::new_v4();
        let value = sign(b"secret", &session_id);

        let other_id = Uuid::new_v4();
        let (_, signature) = value.split_once('.').unwrap();
        let forged = format!("{other_id}.{signature}");
        assert_eq!(verify(b"secret", &forged), None);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let session_id = Uuid::new_v4();
        let value = sign(b"secret", &session_id);
        assert_eq!(verify(b"other-secret", &value), None);
    }

    #[test]
    fn garbage_cookie_is_rejected() {
        assert_eq!(verify(b"secret", "not-a-cookie"), None);
        assert_eq!(verify(b"secret", "deadbeef.sig"), None);
    }
}
