use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::storage::sqlite;
use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use deadpool_sqlite::Pool;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const SESSION_COOKIE: &str = "blogpulse_session";

/// Injected into request extensions after successful session validation.
#[derive(Clone, Debug)]
pub struct SessionUser {
    pub user_id: String,
    pub is_admin: bool,
}

/// Administrative endpoints answer 401 to signed-in users without the admin flag too.
pub fn require_admin(user: &SessionUser) -> AppResult<()> {
    if user.is_admin {
        Ok(())
    } else {
        tracing::warn!(user_id = %user.user_id, "non-admin session rejected");
        Err(AppError::Unauthorized("admin access required".to_string()))
    }
}

/// Session tokens are stored as SHA-256 hex digests.
pub fn hash_token(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the session cookie value from the Cookie header.
fn extract_session_cookie(req: &Request<Body>) -> Option<String> {
    let cookie_header = req.headers().get(header::COOKIE)?.to_str().ok()?;
    let prefix = format!("{SESSION_COOKIE}=");
    for part in cookie_header.split(';') {
        let trimmed = part.trim();
        if let Some(value) = trimmed.strip_prefix(prefix.as_str()) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Validate a session token against the database. Returns SessionUser if valid.
async fn validate_session(pool: &Pool, clock: &dyn Clock, token: &str) -> Option<SessionUser> {
    let conn = pool.get().await.ok()?;
    let token = hash_token(token);
    let now = clock.now().timestamp();

    conn.interact(move |conn| {
        conn.query_row(
            "SELECT s.user_id, u.is_admin FROM sessions s JOIN users u ON s.user_id = u.id
             WHERE s.token = ?1 AND s.expires_at > ?2",
            params![token, now],
            |row| {
                Ok(SessionUser {
                    user_id: row.get(0)?,
                    is_admin: row.get::<_, i64>(1)? != 0,
                })
            },
        )
        .ok()
    })
    .await
    .ok()?
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({ "success": false, "error": message })),
    )
        .into_response()
}

/// Session middleware for API routes: 401 JSON on failure.
///
/// Expects `Extension<Arc<Pool>>` and `Extension<Arc<dyn Clock>>` on the router.
pub async fn require_session_api(request: Request<Body>, next: Next) -> Result<Response, Response> {
    let pool = request
        .extensions()
        .get::<Arc<Pool>>()
        .cloned()
        .ok_or_else(|| {
            tracing::error!("session pool not configured");
            AppError::Internal("session pool not configured".to_string()).into_response()
        })?;
    let clock = request
        .extensions()
        .get::<Arc<dyn Clock>>()
        .cloned()
        .ok_or_else(|| {
            tracing::error!("session clock not configured");
            AppError::Internal("session clock not configured".to_string()).into_response()
        })?;

    let token =
        extract_session_cookie(&request).ok_or_else(|| unauthorized("authentication required"))?;

    let session_user = validate_session(&pool, clock.as_ref(), &token)
        .await
        .ok_or_else(|| unauthorized("invalid or expired session"))?;

    let mut request = request;
    request.extensions_mut().insert(session_user);
    Ok(next.run(request).await)
}

/// Insert a user, or update the admin flag of an existing one. Returns the user id.
pub async fn upsert_user(
    pool: &Pool,
    clock: &dyn Clock,
    email: &str,
    is_admin: bool,
) -> AppResult<String> {
    let email = email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("a valid email is required".to_string()));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = clock.now().timestamp();

    sqlite::interact(pool, move |conn| {
        conn.execute(
            "INSERT INTO users (id, email, is_admin, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (email) DO UPDATE SET is_admin = excluded.is_admin",
            params![id, email, is_admin as i64, now],
        )?;
        conn.query_row(
            "SELECT id FROM users WHERE email = ?1",
            params![email],
            |row| row.get::<_, String>(0),
        )
    })
    .await
}

/// Create a session in the database and return the plaintext token.
pub async fn create_session(
    pool: &Pool,
    clock: &dyn Clock,
    user_id: &str,
    ttl_secs: u64,
) -> AppResult<String> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);

    let now = clock.now().timestamp();
    let expires_at = now.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX));

    let token_hash = hash_token(&token);
    let uid = user_id.to_string();
    let inserted = sqlite::interact(pool, move |conn| {
        let exists = conn
            .query_row("SELECT 1 FROM users WHERE id = ?1", params![uid], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, uid, now, expires_at],
        )?;
        Ok(true)
    })
    .await?;

    if !inserted {
        return Err(AppError::NotFound(format!("user {user_id}")));
    }
    Ok(token)
}

/// Periodically clean up expired sessions until `shutdown` fires.
pub async fn session_cleanup_loop(
    pool: Pool,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        let now = clock.now().timestamp();
        let Ok(conn) = pool.get().await else {
            continue;
        };
        match conn
            .interact(move |conn| {
                conn.execute("DELETE FROM sessions WHERE expires_at < ?1", params![now])
            })
            .await
        {
            Ok(Ok(deleted)) if deleted > 0 => {
                tracing::info!(deleted, "pruned expired sessions");
            }
            Ok(Err(e)) => tracing::error!(error = %e, "session cleanup failed"),
            Err(e) => tracing::error!(error = %e, "session cleanup interact failed"),
            _ => {}
        }
    }
}
