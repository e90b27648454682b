use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::user::bson_datetime_as_chrono;

/// One day's puzzle, stored in the "daily_puzzles" collection.
///
/// Rows are immutable after insertion; "today's puzzle" is always the most
/// recently created one. The prompt and its embedding never leave the
/// server, only the rendered image does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPuzzle {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub image_prompt: String,
    pub prompt_embedding: Vec<f32>,
    /// Object-store key of the rendered image.
    pub image_key: String,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl DailyPuzzle {
    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }
}

/// Client-facing view of a puzzle. The image URL is a short-lived presigned
/// link (60 s) and must be consumed promptly.
#[derive(Debug, Serialize)]
pub struct PuzzleView {
    pub id: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

/// Result of one daily generation run, returned to the scheduled trigger.
#[derive(Debug, Serialize)]
pub struct GeneratedPuzzle {
    pub prompt: String,
    pub prompt_embedding: Vec<f32>,
}
