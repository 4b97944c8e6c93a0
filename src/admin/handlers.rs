use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{MemberListParams, MemberListResponse};
use crate::{
    auth::extractors::AdminUser,
    error::{AppError, ResultExt},
    profile::{
        dto::MemberUpdate,
        services::{admin_changes, apply_changes},
    },
    state::AppState,
    users::MemberView,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/members", get(list_members))
        .route("/admin/members/:id", patch(update_member))
}

#[instrument(skip(state, admin, params))]
pub async fn list_members(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Query(params): Query<MemberListParams>,
) -> Result<Json<MemberListResponse>, AppError> {
    let query = params.into_query();
    let page = state
        .users
        .list_members(&query)
        .await
        .or_internal("Could not list members.")?;
    tracing::debug!(
        admin_id = %admin.id,
        q = %query.q,
        returned = page.members.len(),
        "members listed"
    );

    Ok(Json(MemberListResponse {
        members: page.members,
        total: page.total,
        page: query.page,
        limit: query.limit,
    }))
}

#[instrument(skip(state, admin, id, payload))]
pub async fn update_member(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<MemberUpdate>, JsonRejection>,
) -> Result<Json<MemberView>, AppError> {
    let Path(id) = id.map_err(|_| AppError::not_found("Member not found."))?;
    let Json(payload) = payload?;
    let (changes, roles) = admin_changes(payload)?;

    let view = apply_changes(&state, id, &changes, roles.as_deref()).await?;
    info!(admin_id = %admin.id, member_id = %id, "member updated by admin");
    Ok(Json(view))
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
    use crate::{
        auth::{extractors::require_admin, session::COOKIE_NAME},
        state::testing::TestApp,
        users::{Role, User, UserStatus},
    };

    fn cookie_for(app: &TestApp, user: &User) -> String {
        let token = app.session_jar(user).get(COOKIE_NAME).unwrap().value().to_string();
        format!("{COOKIE_NAME}={token}")
    }

    async fn as_admin(app: &TestApp, admin: &User) -> AdminUser {
        AdminUser(require_admin(&app.state, &app.session_jar(admin)).await.unwrap())
    }

    #[tokio::test]
    async fn search_matches_name_or_email_ordered_by_name() {
        let app = TestApp::new();
        let admin = app.seed_user("Zeca", "admin@ivida.test", "Str0ng!pass", &[Role::Admin]);
        app.seed_user("Maria Souza", "ms@example.com", "Str0ng!pass", &[Role::Member]);
        app.seed_user("Ana", "ANA.MARIA@example.com", "Str0ng!pass", &[Role::Member]);
        app.seed_user("João", "joao@example.com", "Str0ng!pass", &[Role::Member]);

        let Json(res) = list_members(
            State(app.state.clone()),
            as_admin(&app, &admin).await,
            Query(MemberListParams {
                q: Some(" maria ".into()),
                count: Some("1".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        let names: Vec<&str> = res.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Maria Souza"]);
        assert_eq!(res.total, Some(2));
        assert_eq!((res.page, res.limit), (1, 20));
    }

    async fn listed_names(app: &TestApp, admin: &User, query: &str) -> Vec<String> {
        let req = Request::builder()
            .uri(format!("/admin/members?{query}"))
            .header(header::COOKIE, cookie_for(app, admin))
            .body(Body::empty())
            .unwrap();
        let res = admin_routes()
            .with_state(app.state.clone())
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        body["members"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn second_page_skips_earlier_rows() {
        let app = TestApp::new();
        let admin = app.seed_user("Ana", "admin@ivida.test", "Str0ng!pass", &[Role::Admin]);
        app.seed_user("Bia", "bia@example.com", "Str0ng!pass", &[Role::Member]);
        app.seed_user("Caio", "caio@example.com", "Str0ng!pass", &[Role::Member]);

        assert_eq!(listed_names(&app, &admin, "page=1&limit=1").await, vec!["Ana"]);
        assert_eq!(listed_names(&app, &admin, "page=2&limit=1").await, vec!["Bia"]);
        assert_eq!(listed_names(&app, &admin, "page=3&limit=1").await, vec!["Caio"]);
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let app = TestApp::new();
        let admin = app.seed_user("Ana", "admin@ivida.test", "Str0ng!pass", &[Role::Admin]);

        let far = format!("page={}&limit=50", i64::MAX);
        assert!(listed_names(&app, &admin, &far).await.is_empty());
    }

    #[tokio::test]
    async fn total_only_when_requested() {
        let app = TestApp::new();
        let admin = app.seed_user("Zeca", "admin@ivida.test", "Str0ng!pass", &[Role::Admin]);
        let Json(res) = list_members(
            State(app.state.clone()),
            as_admin(&app, &admin).await,
            Query(MemberListParams::default()),
        )
        .await
        .unwrap();
        assert_eq!(res.total, None);
        assert_eq!(res.members.len(), 1);
    }

    #[tokio::test]
    async fn non_admin_patch_is_forbidden_and_changes_nothing() {
        let app = TestApp::new();
        let member = app.seed_user("Ana", "ana@example.com", "Str0ng!pass", &[Role::Member]);
        let target = app.seed_user("Bia", "bia@example.com", "Str0ng!pass", &[Role::Member]);
        let router = admin_routes().with_state(app.state.clone());

        let req = Request::builder()
            .method("PATCH")
            .uri(format!("/admin/members/{}", target.id))
            .header(header::COOKIE, cookie_for(&app, &member))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"roles":["Admin"],"status":"INACTIVE"}"#))
            .unwrap();
        let res = router.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let after = app.users.get(target.id).unwrap();
        assert_eq!(after.roles, vec![Role::Member]);
        assert_eq!(after.status, UserStatus::Active);
    }

    #[tokio::test]
    async fn anonymous_list_is_forbidden() {
        let app = TestApp::new();
        let router = admin_routes().with_state(app.state.clone());
        let req = Request::builder().uri("/admin/members").body(Body::empty()).unwrap();
        let res = router.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_patch_replaces_roles_and_status() {
        let app = TestApp::new();
        let admin = app.seed_user("Zeca", "admin@ivida.test", "Str0ng!pass", &[Role::Admin]);
        let roles = [Role::Member, Role::Pastor];
        let target = app.seed_user("Bia", "bia@example.com", "Str0ng!pass", &roles);

        let Json(view) = update_member(
            State(app.state.clone()),
            as_admin(&app, &admin).await,
            Ok(Path(target.id)),
            Ok(Json(MemberUpdate {
                roles: Some(vec!["Seminarian".into()]),
                status: Some("INACTIVE".into()),
                ..Default::default()
            })),
        )
        .await
        .unwrap();

        assert_eq!(view.roles, vec![Role::Seminarian]);
        assert_eq!(view.status, UserStatus::Inactive);
        assert_eq!(app.users.get(target.id).unwrap().roles, vec![Role::Seminarian]);
    }

    #[tokio::test]
    async fn admin_patch_unknown_member_is_not_found() {
        let app = TestApp::new();
        let admin = app.seed_user("Zeca", "admin@ivida.test", "Str0ng!pass", &[Role::Admin]);

        let err = update_member(
            State(app.state.clone()),
            as_admin(&app, &admin).await,
            Ok(Path(Uuid::new_v4())),
            Ok(Json(MemberUpdate {
                name: Some(Some("Ghost".into())),
                ..Default::default()
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_member_id_is_not_found() {
        let app = TestApp::new();
        let admin = app.seed_user("Zeca", "admin@ivida.test", "Str0ng!pass", &[Role::Admin]);

        let req = Request::builder()
            .method("PATCH")
            .uri("/admin/members/not-a-uuid")
            .header(header::COOKIE, cookie_for(&app, &admin))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"Ghost"}"#))
            .unwrap();
        let res = admin_routes()
            .with_state(app.state.clone())
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_patch_with_invalid_role_changes_nothing() {
        let app = TestApp::new();
        let admin = app.seed_user("Zeca", "admin@ivida.test", "Str0ng!pass", &[Role::Admin]);
        let target = app.seed_user("Bia", "bia@example.com", "Str0ng!pass", &[Role::Member]);

        let err = update_member(
            State(app.state.clone()),
            as_admin(&app, &admin).await,
            Ok(Path(target.id)),
            Ok(Json(MemberUpdate {
                name: Some(Some("Bia Lima".into())),
                roles: Some(vec!["Pastor".into(), "Overlord".into()]),
                ..Default::default()
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let after = app.users.get(target.id).unwrap();
        assert_eq!(after.name, "Bia");
        assert_eq!(after.roles, vec![Role::Member]);
    }
}
