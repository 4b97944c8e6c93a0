use serde::{Deserialize, Serialize};

use crate::users::{repo_types::MemberQuery, MemberView};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 50;
pub const MAX_QUERY_CHARS: usize = 200;

/// Raw query string of `GET /admin/members`. Unparseable numbers fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct MemberListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub q: Option<String>,
    pub count: Option<String>,
}

impl MemberListParams {
    pub fn into_query(self) -> MemberQuery {
        let page = self
            .page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(1)
            .max(1);
        let limit = self
            .limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);
        let q = self
            .q
            .map(|q| q.trim().chars().take(MAX_QUERY_CHARS).collect())
            .unwrap_or_default();
        let with_count = matches!(self.count.as_deref(), Some("true" | "1"));

        MemberQuery { q, page, limit, with_count }
    }
}

#[derive(Debug, Serialize)]
pub struct MemberListResponse {
    pub members: Vec<MemberView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    pub page: i64,
    pub limit: i64,
}
