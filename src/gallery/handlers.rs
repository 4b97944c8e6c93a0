use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::services::{home_images, iforte_images, leader_images};
use crate::state::AppState;

const PUBLIC_CACHE: &str = "public, s-maxage=60, stale-while-revalidate=120";

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageList {
    pub images: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderImages {
    pub leader_images: BTreeMap<String, String>,
}

pub fn gallery_routes() -> Router<AppState> {
    Router::new()
        .route("/imagens-home", get(list_home_images))
        .route("/ministry-leaders", get(list_leader_images))
        .route("/imagens-iforte", get(list_iforte_images))
}

fn cached<T: Serialize>(body: T) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static(PUBLIC_CACHE))],
        Json(body),
    )
}

#[instrument(skip(state))]
pub async fn list_home_images(State(state): State<AppState>) -> impl IntoResponse {
    let images = home_images(state.storage.as_deref()).await;
    cached(ImageList { images })
}

#[instrument(skip(state))]
pub async fn list_leader_images(State(state): State<AppState>) -> impl IntoResponse {
    let leader_images =
        leader_images(state.storage.as_deref(), state.config.public_dir.as_deref()).await;
    cached(LeaderImages { leader_images })
}

#[instrument(skip(state))]
pub async fn list_iforte_images(State(state): State<AppState>) -> Json<ImageList> {
    Json(ImageList {
        images: iforte_images(state.config.public_dir.as_deref()).await,
    })
}
