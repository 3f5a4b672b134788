use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

fn extract_bearer_token(raw: &str) -> Option<&str> {
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .map(str::trim)
}

/// SHA-256 fingerprint of a presented token, safe to log.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

/// Authorize a scheduler trigger. With no secret configured the
/// triggers are open (dev mode) and a warning is emitted; otherwise the
/// request must carry the shared secret as a bearer token.
pub fn ensure_cron_authorized(
    headers: &HeaderMap,
    expected: Option<&str>,
) -> std::result::Result<(), (StatusCode, String)> {
    let Some(expected) = expected.filter(|s| !s.trim().is_empty()) else {
        warn!("cron trigger accepted without a configured shared secret");
        return Ok(());
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token);

    match provided {
        Some(token) if token == expected => Ok(()),
        Some(token) => {
            debug!(
                fingerprint = %token_fingerprint(token),
                "cron auth failed (invalid token)"
            );
            Err((
                StatusCode::UNAUTHORIZED,
                "cron auth failed (invalid token)".to_string(),
            ))
        }
        None => Err((
            StatusCode::UNAUTHORIZED,
            "cron auth failed (missing bearer token)".to_string(),
        )),
    }
}
