use std::cmp::Ordering;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    options::FindOptions,
    Collection, Database,
};

use crate::metrics::GUESSES_SUBMITTED_TOTAL;
use crate::models::answer::{LeaderboardEntry, UserAnswer, REVEAL_SENTINEL};
use crate::models::puzzle::DailyPuzzle;
use crate::models::user::User;
use crate::services::openai::OpenAiClient;
use crate::services::AppState;
use crate::utils::similarity::{closeness, cosine_similarity};
use crate::utils::time::chrono_to_bson;

/// Result of scoring one guess.
pub struct GuessOutcome {
    /// Closeness of this particular guess.
    pub closeness: i32,
    /// The answer row after bookkeeping (best score, tries).
    pub answer: UserAnswer,
}

pub struct GuessService {
    mongo: Database,
    openai: OpenAiClient,
}

impl GuessService {
    pub fn new(state: &AppState) -> Self {
        Self {
            mongo: state.mongo.clone(),
            openai: OpenAiClient::new(state.http.clone(), state.config.openai.clone()),
        }
    }

    /// Score a guess against the puzzle's stored embedding and record the
    /// outcome: embed -> cosine similarity -> integer closeness -> upsert.
    ///
    /// The attempt cap is a caller precondition, checked by the handler
    /// before this is invoked.
    pub async fn submit_guess(
        &self,
        puzzle: &DailyPuzzle,
        user_id: &str,
        guess: &str,
    ) -> Result<GuessOutcome> {
        let puzzle_id = puzzle
            .id
            .ok_or_else(|| anyhow!("Puzzle row has no identifier"))?;

        if puzzle.prompt_embedding.is_empty() {
            bail!("Puzzle {} has no stored embedding", puzzle_id.to_hex());
        }

        let guess_embedding = self.openai.embed(guess).await?;

        let similarity = cosine_similarity(&guess_embedding, &puzzle.prompt_embedding);
        let closeness = closeness(similarity);
        tracing::info!(
            "Guess scored: user={}, puzzle={}, similarity={}, closeness={}",
            user_id,
            puzzle_id.to_hex(),
            similarity,
            closeness
        );

        GUESSES_SUBMITTED_TOTAL.inc();

        let answer = self
            .upsert_answer(&puzzle_id, user_id, guess, closeness, None)
            .await?;

        Ok(GuessOutcome { closeness, answer })
    }

    /// Disclose the prompt: tries are pinned to the cap, the best score
    /// already achieved is preserved, and the sentinel text marks the
    /// reveal.
    pub async fn reveal_prompt(
        &self,
        puzzle: &DailyPuzzle,
        user_id: &str,
        max_tries: u32,
    ) -> Result<UserAnswer> {
        let puzzle_id = puzzle
            .id
            .ok_or_else(|| anyhow!("Puzzle row has no identifier"))?;

        let existing = self.get_answer(&puzzle_id, user_id).await?;
        let preserved = existing.map(|answer| answer.answer_valuation).unwrap_or(0);

        self.upsert_answer(
            &puzzle_id,
            user_id,
            REVEAL_SENTINEL,
            preserved,
            Some(max_tries),
        )
        .await
    }

    /// The player's answer row for a puzzle. Absence is a distinguished
    /// non-error outcome, not a failure.
    pub async fn get_answer(
        &self,
        puzzle_id: &ObjectId,
        user_id: &str,
    ) -> Result<Option<UserAnswer>> {
        self.collection()
            .find_one(doc! { "user_id": user_id, "puzzle_id": puzzle_id })
            .await
            .context("Failed to fetch user answer")
    }

    /// Create-or-update by (user, puzzle), as a plain read-then-write:
    /// two concurrent guesses by the same user can race. Known property
    /// of the workflow, not guarded against.
    async fn upsert_answer(
        &self,
        puzzle_id: &ObjectId,
        user_id: &str,
        answer_text: &str,
        closeness: i32,
        override_tries: Option<u32>,
    ) -> Result<UserAnswer> {
        let existing = self.get_answer(puzzle_id, user_id).await?;
        let (valuation, tries) = merge_progress(
            existing
                .as_ref()
                .map(|answer| (answer.answer_valuation, answer.tries)),
            closeness,
            override_tries,
        );
        let now = Utc::now();

        match existing {
            Some(mut answer) => {
                let answer_id = answer
                    .id
                    .ok_or_else(|| anyhow!("Answer row has no identifier"))?;
                self.collection()
                    .update_one(
                        doc! { "_id": answer_id },
                        doc! { "$set": {
                            "answer_text": answer_text,
                            "answer_valuation": valuation,
                            "tries": tries as i64,
                            "updatedAt": chrono_to_bson(now),
                        }},
                    )
                    .await
                    .context("Failed to update user answer")?;

                answer.answer_text = answer_text.to_string();
                answer.answer_valuation = valuation;
                answer.tries = tries;
                answer.updated_at = now;
                Ok(answer)
            }
            None => {
                let mut answer = UserAnswer {
                    id: None,
                    user_id: user_id.to_string(),
                    puzzle_id: *puzzle_id,
                    answer_text: answer_text.to_string(),
                    answer_valuation: valuation,
                    tries,
                    updated_at: now,
                };
                let result = self
                    .collection()
                    .insert_one(&answer)
                    .await
                    .context("Failed to insert user answer")?;
                answer.id = result.inserted_id.as_object_id();
                Ok(answer)
            }
        }
    }

    /// Leaderboard for one puzzle: best score descending, tries ascending,
    /// each row joined to its user. Rows whose user lookup fails are
    /// dropped rather than failing the whole ranking.
    pub async fn daily_ranking(&self, puzzle_id: &ObjectId) -> Result<Vec<LeaderboardEntry>> {
        let options = FindOptions::builder()
            .sort(doc! { "answer_valuation": -1, "tries": 1 })
            .build();
        let answers: Vec<UserAnswer> = self
            .collection()
            .find(doc! { "puzzle_id": puzzle_id })
            .with_options(options)
            .await
            .context("Failed to query answers for ranking")?
            .try_collect()
            .await
            .context("Failed to iterate answers for ranking")?;

        let users: Collection<User> = self.mongo.collection("users");
        let mut entries = Vec::with_capacity(answers.len());
        for answer in answers {
            match users.find_one(doc! { "_id": &answer.user_id }).await {
                Ok(Some(user)) => entries.push(LeaderboardEntry {
                    user: user.into(),
                    answer_valuation: answer.answer_valuation,
                    tries: answer.tries,
                }),
                Ok(None) => {
                    tracing::warn!("No user record for answer by {}, dropping row", answer.user_id)
                }
                Err(e) => tracing::warn!(
                    "Failed to fetch user {} for ranking, dropping row: {}",
                    answer.user_id,
                    e
                ),
            }
        }

        // The store already orders rows, but dropped joins make that worth
        // re-asserting before display.
        entries.sort_by(ranking_order);
        Ok(entries)
    }

    fn collection(&self) -> Collection<UserAnswer> {
        self.mongo.collection("user_answers")
    }
}

/// Best-score / attempt-count bookkeeping for a single scoring event.
///
/// The best score never decreases; tries increment by one unless an
/// override (the reveal path) pins them.
fn merge_progress(
    existing: Option<(i32, u32)>,
    closeness: i32,
    override_tries: Option<u32>,
) -> (i32, u32) {
    match existing {
        Some((best, tries)) => (
            best.max(closeness),
            override_tries.unwrap_or(tries + 1),
        ),
        None => (closeness, override_tries.unwrap_or(1)),
    }
}

/// Leaderboard ordering: best score descending, then tries ascending
/// (fewer attempts ranks higher at equal score).
pub fn ranking_order(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.answer_valuation
        .cmp(&a.answer_valuation)
        .then(a.tries.cmp(&b.tries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_guess_creates_progress() {
        assert_eq!(merge_progress(None, 40, None), (40, 1));
    }

    #[test]
    fn best_score_rises_and_holds() {
        // first guess 40, then 70, then a worse 55
        let after_first = merge_progress(None, 40, None);
        assert_eq!(after_first, (40, 1));
        let after_second = merge_progress(Some(after_first), 70, None);
        assert_eq!(after_second, (70, 2));
        let after_third = merge_progress(Some(after_second), 55, None);
        assert_eq!(after_third, (70, 3));
    }

    #[test]
    fn negative_closeness_is_kept() {
        assert_eq!(merge_progress(None, -12, None), (-12, 1));
        assert_eq!(merge_progress(Some((-12, 1)), -30, None), (-12, 2));
    }

    #[test]
    fn reveal_pins_tries_and_preserves_best() {
        // reveal at 9 tries with best 60: closeness passed is the preserved
        // best, so the score cannot move in either direction
        assert_eq!(merge_progress(Some((60, 9)), 60, Some(10)), (60, 10));
    }

    #[test]
    fn reveal_without_prior_answer_starts_at_cap() {
        assert_eq!(merge_progress(None, 0, Some(10)), (0, 10));
    }

    #[test]
    fn attempts_equal_number_of_scoring_calls() {
        let observed = [13, -4, 99, 25, 99];
        let mut state: Option<(i32, u32)> = None;
        for c in observed {
            state = Some(merge_progress(state, c, None));
        }
        assert_eq!(state, Some((99, 5)));
    }
}
