use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::user::{bson_datetime_as_chrono, UserProfile};

/// Guess text stored when the player reveals the prompt instead of guessing.
pub const REVEAL_SENTINEL: &str = "Prompt revealed";

/// A player's cumulative progress on one puzzle, stored in "user_answers".
///
/// Unique per (user, puzzle). `answer_valuation` is the best closeness so
/// far and never decreases; `tries` never decreases and is capped by a
/// caller-side precondition, except for the reveal path which pins it to
/// the cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAnswer {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: String,
    pub puzzle_id: ObjectId,
    /// Latest guess text, or [`REVEAL_SENTINEL`].
    pub answer_text: String,
    /// Best closeness in [-100, 100]. Negative values are preserved.
    pub answer_valuation: i32,
    pub tries: u32,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitGuessRequest {
    pub guess: String,
}

/// Client view of an answer row.
#[derive(Debug, Serialize)]
pub struct AnswerView {
    pub id: String,
    pub puzzle_id: String,
    pub answer_text: String,
    pub answer_valuation: i32,
    pub tries: u32,
}

impl From<UserAnswer> for AnswerView {
    fn from(answer: UserAnswer) -> Self {
        AnswerView {
            id: answer.id.map(|id| id.to_hex()).unwrap_or_default(),
            puzzle_id: answer.puzzle_id.to_hex(),
            answer_text: answer.answer_text,
            answer_valuation: answer.answer_valuation,
            tries: answer.tries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GuessResponse {
    /// Closeness of this guess, not necessarily the best so far.
    pub closeness: i32,
    pub answer: AnswerView,
    pub max_tries: u32,
}

#[derive(Debug, Serialize)]
pub struct RevealResponse {
    /// The hidden prompt, disclosed at the cost of all remaining tries.
    pub prompt: String,
    pub answer: AnswerView,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub user: UserProfile,
    pub answer_valuation: i32,
    pub tries: u32,
}
