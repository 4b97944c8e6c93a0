use crate::{config::RecoveryMode, state::AppState};
use axum::Router;

mod claims;
pub mod dto;
pub mod extractors;
pub mod gate;
pub mod handlers;
pub mod password;
pub mod recovery;
pub mod services;
pub mod session;

pub fn router(recovery: RecoveryMode) -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::recovery_routes(recovery))
}
