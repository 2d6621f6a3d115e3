use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered resident, identified by block + house number.
///
/// Ascending `id` order defines the row order of the period breakdown
/// view.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Resident {
    pub id: i64,
    pub block: String,
    pub house_number: String,
    pub full_name: String,
}
