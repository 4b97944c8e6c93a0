use std::net::SocketAddr;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{admin, auth, gallery, profile, state::AppState};

pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::router(state.config.recovery))
        .merge(profile::router())
        .merge(admin::router())
        .merge(gallery::router());

    let mut router = Router::new()
        .nest("/api", api)
        .route("/health", get(|| async { "ok" }));

    if let Some(dir) = &state.config.public_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(from_fn_with_state(state.clone(), auth::gate::auth_gate))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
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
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::{config::RecoveryMode, state::testing::TestApp};

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_app(TestApp::new().state);
        let res = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn member_area_is_gated() {
        let app = build_app(TestApp::new().state);
        let res = app.oneshot(get("/area-membros/perfil")).await.unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            res.headers().get(header::LOCATION).unwrap(),
            "/login?next=%2Farea-membros%2Fperfil"
        );
    }

    #[tokio::test]
    async fn anonymous_me_is_null() {
        let app = build_app(TestApp::new().state);
        let res = app.oneshot(get("/api/auth/me")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["user"].is_null());
    }

    #[tokio::test]
    async fn only_configured_recovery_variant_is_mounted() {
        let test = TestApp::new();
        let code_app = build_app(test.state.clone());
        let res = code_app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/forgot-password")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email":"a@b.co"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let mut config = (*test.state.config).clone();
        config.recovery = RecoveryMode::Link;
        let link_state = AppState { config: std::sync::Arc::new(config), ..test.state.clone() };
        let res = build_app(link_state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/forgot-password/reset")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
