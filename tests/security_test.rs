use blogpulse::auth::session;
use blogpulse::clock::SystemClock;
use blogpulse::config::DatabaseConfig;
use blogpulse::error::AppError;
use blogpulse::storage::sqlite;

/// Helper to create a temp DB pool with all migrations applied.
async fn setup_pool() -> (deadpool_sqlite::Pool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = sqlite::create_pool(&DatabaseConfig {
        path: dir.path().join("security.db"),
        pool_size: 2,
    })
    .unwrap();
    sqlite::init_pool(&pool).await.unwrap();
    (pool, dir)
}

async fn count_sessions_with_token(pool: &deadpool_sqlite::Pool, token: String) -> i64 {
    let conn = pool.get().await.unwrap();
    conn.interact(move |conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE token = ?1",
            rusqlite::params![token],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
    })
    .await
    .unwrap()
}

// ═══════════════════════════════════════════════════════════════
// Session tokens
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_session_token_is_hashed_in_db() {
    let (pool, _dir) = setup_pool().await;
    let user_id = session::upsert_user(&pool, &SystemClock, "admin@example.com", true)
        .await
        .unwrap();

    let token = session::create_session(&pool, &SystemClock, &user_id, 3600)
        .await
        .expect("create_session should succeed");

    assert_eq!(
        count_sessions_with_token(&pool, token.clone()).await,
        0,
        "plaintext token should NOT be in DB"
    );
    assert_eq!(
        count_sessions_with_token(&pool, session::hash_token(&token)).await,
        1,
        "hashed token SHOULD be in DB"
    );
}

#[tokio::test]
async fn test_session_tokens_are_unique() {
    let (pool, _dir) = setup_pool().await;
    let user_id = session::upsert_user(&pool, &SystemClock, "admin@example.com", true)
        .await
        .unwrap();

    let a = session::create_session(&pool, &SystemClock, &user_id, 3600)
        .await
        .unwrap();
    let b = session::create_session(&pool, &SystemClock, &user_id, 3600)
        .await
        .unwrap();
    assert_ne!(a, b);
    assert!(a.len() >= 43, "32 random bytes, base64url encoded");
}

#[tokio::test]
async fn test_create_session_for_unknown_user_is_not_found() {
    let (pool, _dir) = setup_pool().await;
    let result = session::create_session(&pool, &SystemClock, "no-such-user", 3600).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// ═══════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_upsert_user_normalizes_email_and_keeps_id() {
    let (pool, _dir) = setup_pool().await;
    let first = session::upsert_user(&pool, &SystemClock, "  Editor@Example.COM ", false)
        .await
        .unwrap();
    let promoted = session::upsert_user(&pool, &SystemClock, "editor@example.com", true)
        .await
        .unwrap();
    assert_eq!(first, promoted);

    let conn = pool.get().await.unwrap();
    let (email, is_admin) = conn
        .interact(move |conn| {
            conn.query_row(
                "SELECT email, is_admin FROM users WHERE id = ?1",
                rusqlite::params![first],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .unwrap()
        })
        .await
        .unwrap();
    assert_eq!(email, "editor@example.com");
    assert_eq!(is_admin, 1);
}

#[tokio::test]
async fn test_upsert_user_rejects_invalid_email() {
    let (pool, _dir) = setup_pool().await;
    for email in ["", "   ", "not-an-email"] {
        let result = session::upsert_user(&pool, &SystemClock, email, true).await;
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "{email:?} should be rejected"
        );
    }
}

// ═══════════════════════════════════════════════════════════════
// Error envelope
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_internal_errors_do_not_leak_details() {
    use axum::response::IntoResponse;

    let resp = AppError::Internal("disk path /var/lib/secret".to_string()).into_response();
    assert_eq!(resp.status(), 500);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "internal server error");
}
