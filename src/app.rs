use std::net::SocketAddr;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request::Parts,
        HeaderValue, Method,
    },
    middleware,
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::{self, extractors::require_session},
    config::CorsConfig,
    lists, search,
    state::AppState,
    users,
};

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(auth::protected_router())
        .merge(users::protected_router())
        .merge(lists::protected_router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    let cors = cors_layer(&state.config.cors);

    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .merge(lists::router())
                .merge(search::router())
                .merge(protected)
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

/// Credentialed CORS for the configured origins plus one wildcard host pattern.
pub fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let cfg = cfg.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _req: &Parts| {
                origin
                    .to_str()
                    .map(|o| origin_allowed(o, &cfg))
                    .unwrap_or(false)
            },
        ))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

pub fn origin_allowed(origin: &str, cfg: &CorsConfig) -> bool {
    let origin = origin.trim_end_matches('/');
    if cfg.allowed_origins.iter().any(|o| o == origin) {
        return true;
    }
    cfg.origin_pattern
        .as_deref()
        .is_some_and(|p| matches_pattern(origin, p))
}

/// `*` matches exactly one non-empty run of characters without `/`.
fn matches_pattern(origin: &str, pattern: &str) -> bool {
    let Some((prefix, suffix)) = pattern.split_once('*') else {
        return origin == pattern;
    };
    if origin.len() <= prefix.len() + suffix.len()
        || !origin.starts_with(prefix)
        || !origin.ends_with(suffix)
    {
        return false;
    }
    let middle = &origin[prefix.len()..origin.len() - suffix.len()];
    !middle.contains('/') && !middle.contains(':')
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::JwtKeys,
        state::testing::{test_config, FakeStorage},
    };
    use axum::{
        body::Body,
        extract::FromRef,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn cors() -> CorsConfig {
        test_config().cors
    }

    #[test]
    fn allow_list_and_pattern() {
        let cfg = cors();
        assert!(origin_allowed("http://localhost:3000", &cfg));
        assert!(origin_allowed("https://reel-git-main.vercel.app", &cfg));
        assert!(!origin_allowed("https://vercel.app", &cfg));
        assert!(!origin_allowed("https://evil.com/x.vercel.app", &cfg));
        assert!(!origin_allowed("https://evil.com", &cfg));
        assert!(!origin_allowed("http://localhost:3001", &cfg));
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn profile_update_without_token_is_unauthorized() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(
                Request::post("/api/user/profile")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"displayName":"Neo"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(res).await;
        assert_eq!(body["message"], "Authentication required");
    }

    #[tokio::test]
    async fn protected_routes_reject_bad_tokens() {
        let app = build_app(AppState::fake());
        for (method, uri) in [
            ("GET", "/api/user"),
            ("GET", "/api/user/profile"),
            ("DELETE", "/api/user/delete"),
            ("GET", "/api/lists"),
            ("DELETE", "/api/lists/1"),
            ("GET", "/api/favorites"),
        ] {
            let res = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .header("authorization", "Bearer not-a-token")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn short_search_returns_empty_results() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(
                Request::get("/api/search?q=a&language=pt-BR")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, serde_json::json!({ "results": [] }));
    }

    #[tokio::test]
    async fn logout_clears_cookie() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::post("/api/logout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res
            .headers()
            .get("set-cookie")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn oversized_avatar_is_rejected_before_storage() {
        let storage = Arc::new(FakeStorage::default());
        let state = AppState::fake_with_storage(storage.clone());
        let token = JwtKeys::from_ref(&state).sign(1, "neo").unwrap();
        let app = build_app(state);

        let boundary = "XBOUNDARYX";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"big.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend(std::iter::repeat(0u8).take(6 * 1024 * 1024));
        body.extend(format!("\r\n--{boundary}--\r\n").into_bytes());

        let res = app
            .oneshot(
                Request::post("/api/user/avatar")
                    .header("authorization", format!("Bearer {token}"))
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(storage.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn avatar_with_wrong_type_is_rejected() {
        let storage = Arc::new(FakeStorage::default());
        let state = AppState::fake_with_storage(storage.clone());
        let token = JwtKeys::from_ref(&state).sign(1, "neo").unwrap();
        let app = build_app(state);

        let boundary = "B";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n--{boundary}--\r\n"
        );
        let res = app
            .oneshot(
                Request::post("/api/user/avatar")
                    .header("cookie", format!("token={token}"))
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(storage.puts.lock().unwrap().is_empty());
    }

    fn bearer(state: &AppState) -> String {
        format!("Bearer {}", JwtKeys::from_ref(state).sign(1, "neo").unwrap())
    }

    async fn assert_json_message(res: axum::response::Response, status: StatusCode) -> String {
        assert_eq!(res.status(), status);
        let content_type = res
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("application/json"), "{content_type}");
        let body = body_json(res).await;
        body["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn expired_token_is_rejected_on_protected_routes() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let now = time::OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = crate::auth::claims::Claims {
            sub: 1,
            username: "neo".into(),
            iat: now - 330,
            exp: now - 30,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
        };
        let token =
            jsonwebtoken::encode(&jsonwebtoken::Header::default(), &claims, &keys.encoding).unwrap();
        let app = build_app(state);

        let res = app
            .oneshot(
                Request::get("/api/user/profile")
                    .header("cookie", format!("token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let message = assert_json_message(res, StatusCode::UNAUTHORIZED).await;
        assert_eq!(message, "Invalid or expired token");
    }

    #[tokio::test]
    async fn malformed_json_body_gets_json_error() {
        let state = AppState::fake();
        let auth = bearer(&state);
        let app = build_app(state);

        let res = app
            .oneshot(
                Request::put("/api/user/profile")
                    .header("authorization", auth)
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        let message = assert_json_message(res, StatusCode::BAD_REQUEST).await;
        assert!(!message.is_empty());
    }

    #[tokio::test]
    async fn unknown_media_type_gets_json_error() {
        let state = AppState::fake();
        let auth = bearer(&state);
        let app = build_app(state);

        let res = app
            .oneshot(
                Request::post("/api/favorites")
                    .header("authorization", auth)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"mediaId":603,"mediaType":"book"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        let message = assert_json_message(res, StatusCode::BAD_REQUEST).await;
        assert!(message.contains("book"), "{message}");
    }

    #[tokio::test]
    async fn non_numeric_list_id_gets_json_error() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::get("/api/lists/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_json_message(res, StatusCode::BAD_REQUEST).await;
    }

    fn list_form(boundary: &str) -> Vec<u8> {
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nFavoritos\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"cover.png\"\r\nContent-Type: image/png\r\n\r\npng-bytes\r\n\
             --{boundary}--\r\n"
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn list_cover_is_removed_when_insert_fails() {
        let storage = Arc::new(FakeStorage::default());
        let state = AppState::fake_with_storage(storage.clone());
        let auth = bearer(&state);
        let app = build_app(state);

        // the lazy pool has no database behind it, so the insert fails
        let res = app
            .oneshot(
                Request::post("/api/lists")
                    .header("authorization", auth)
                    .header("content-type", "multipart/form-data; boundary=LB")
                    .body(Body::from(list_form("LB")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let puts = storage.puts.lock().unwrap().clone();
        let deletes = storage.deletes.lock().unwrap().clone();
        assert_eq!(puts.len(), 1);
        assert!(puts[0].starts_with("lists/1/"));
        assert_eq!(deletes, puts);
    }

    #[tokio::test]
    async fn avatar_is_not_stored_when_user_lookup_fails() {
        let storage = Arc::new(FakeStorage::default());
        let state = AppState::fake_with_storage(storage.clone());
        let auth = bearer(&state);
        let app = build_app(state);

        let body = "--B\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\npng-bytes\r\n--B--\r\n";
        let res = app
            .oneshot(
                Request::post("/api/user/avatar")
                    .header("authorization", auth)
                    .header("content-type", "multipart/form-data; boundary=B")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(storage.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL pointing at a MySQL instance"]
    async fn profile_update_round_trips_through_database() {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let db = sqlx::mysql::MySqlPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&db).await.unwrap();
        let state = AppState::from_parts(
            db,
            Arc::new(test_config()),
            Arc::new(FakeStorage::default()),
            Arc::new(crate::state::testing::FakeCatalog),
        );
        let app = build_app(state.clone());

        let username = format!("rt_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let res = app
            .clone()
            .oneshot(
                Request::post("/api/register")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "username": username,
                            "email": format!("{username}@example.com"),
                            "password": "correct horse",
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let token = body_json(res).await["token"].as_str().unwrap().to_string();

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/user/profile")
                    .header("authorization", format!("Bearer {token}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"displayName":"Trinity"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(
                Request::get("/api/user/profile")
                    .header("cookie", format!("token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["displayName"], "Trinity");
        assert_eq!(body["username"], username.as_str());

        let res = app
            .oneshot(
                Request::delete("/api/user/delete")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
