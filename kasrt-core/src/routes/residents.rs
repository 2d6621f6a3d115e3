use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::error::AppError;
use crate::models::Resident;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResidentQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub block: Option<String>,
    pub search: Option<String>,
}

/// `GET /api/residents` — paged listing with block and name filters.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ResidentQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let search = query.search.map(|s| s.to_lowercase());

    let filtered: Vec<Resident> = state
        .store
        .list_residents()
        .await?
        .into_iter()
        .filter(|r| query.block.as_deref().map(|b| r.block == b).unwrap_or(true))
        .filter(|r| {
            search
                .as_deref()
                .map(|s| r.full_name.to_lowercase().contains(s))
                .unwrap_or(true)
        })
        .collect();

    let total = filtered.len();
    let data: Vec<Resident> = filtered
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();

    Ok(Json(serde_json::json!({
        "data": data,
        "page": page,
        "limit": limit,
        "total": total
    })))
}

/// `GET /api/blocks` — distinct block names, sorted.
pub async fn blocks(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let blocks: BTreeSet<String> = state
        .store
        .list_residents()
        .await?
        .into_iter()
        .map(|r| r.block)
        .collect();
    Ok(Json(blocks.into_iter().collect()))
}

#[derive(Debug, Deserialize)]
pub struct BlockHousesQuery {
    pub block: String,
}

/// `GET /api/block-houses?block=` — house numbers within one block.
pub async fn block_houses(
    State(state): State<AppState>,
    Query(query): Query<BlockHousesQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let houses: BTreeSet<String> = state
        .store
        .list_residents()
        .await?
        .into_iter()
        .filter(|r| r.block == query.block)
        .map(|r| r.house_number)
        .collect();
    Ok(Json(houses.into_iter().collect()))
}
