use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId},
    options::FindOneOptions,
    Collection, Database,
};

use crate::models::puzzle::{DailyPuzzle, GeneratedPuzzle, PuzzleView};
use crate::services::object_storage::ObjectStorageClient;
use crate::services::openai::OpenAiClient;
use crate::services::replicate::ReplicateClient;
use crate::services::AppState;
use crate::utils::time::chrono_to_bson;

/// Presigned image URLs are meant for immediate display only.
const IMAGE_URL_TTL: Duration = Duration::from_secs(60);

/// Deterministic, repeating theme rotation: the theme is a pure function of
/// the calendar date, so any number of generation calls on the same day pick
/// the same theme.
#[derive(Debug, Clone)]
pub struct ThemeRotation {
    themes: Vec<String>,
    epoch: NaiveDate,
}

impl ThemeRotation {
    pub fn new(themes: Vec<String>, epoch: NaiveDate) -> Self {
        Self { themes, epoch }
    }

    /// Theme for a calendar date, or None when no themes are configured.
    /// Dates before the epoch stay in range (euclidean remainder).
    pub fn theme_for(&self, date: NaiveDate) -> Option<&str> {
        if self.themes.is_empty() {
            return None;
        }
        let days_since_epoch = (date - self.epoch).num_days();
        let index = days_since_epoch.rem_euclid(self.themes.len() as i64) as usize;
        self.themes.get(index).map(String::as_str)
    }
}

pub struct PuzzleService {
    mongo: Database,
    storage: ObjectStorageClient,
    openai: OpenAiClient,
    replicate: ReplicateClient,
    rotation: ThemeRotation,
}

impl PuzzleService {
    pub fn new(state: &AppState) -> Self {
        Self {
            mongo: state.mongo.clone(),
            storage: state.storage.clone(),
            openai: OpenAiClient::new(state.http.clone(), state.config.openai.clone()),
            replicate: ReplicateClient::new(state.http.clone(), state.config.replicate.clone()),
            rotation: ThemeRotation::new(
                state.config.game.themes.clone(),
                state.config.game.epoch,
            ),
        }
    }

    /// Generate and persist today's puzzle: theme -> prompt -> embedding ->
    /// rendered image -> object store -> puzzle row.
    ///
    /// Every step is all-or-nothing with no retries. A failure after the
    /// image upload leaves an orphaned blob behind; that is accepted and not
    /// rolled back.
    pub async fn generate_daily(&self) -> Result<GeneratedPuzzle> {
        let today = Utc::now().date_naive();
        let theme = self
            .rotation
            .theme_for(today)
            .ok_or_else(|| anyhow!("No themes configured"))?;
        tracing::info!("Generating daily puzzle for theme: {}", theme);

        let prompt = self.openai.generate_image_prompt(theme).await?;
        tracing::info!("Daily prompt generated: {}", prompt);

        let embedding = self.openai.embed(&prompt).await?;
        tracing::info!("Prompt embedded ({} dimensions)", embedding.len());

        let image_url = self.replicate.render(&prompt).await?;
        let image_bytes = self.replicate.fetch_image(&image_url).await?;
        tracing::info!("Image rendered ({} bytes)", image_bytes.len());

        let image_key = self.storage.build_image_key();
        self.storage
            .upload_bytes(&image_key, image_bytes, "image/webp")
            .await?;

        let puzzle = DailyPuzzle {
            id: None,
            image_prompt: prompt.clone(),
            prompt_embedding: embedding.clone(),
            image_key,
            created_at: Utc::now(),
        };
        self.collection()
            .insert_one(&puzzle)
            .await
            .context("Failed to save the daily puzzle")?;

        tracing::info!("Daily puzzle saved: {}", prompt);

        Ok(GeneratedPuzzle {
            prompt,
            prompt_embedding: embedding,
        })
    }

    /// The current puzzle is the most recently created row.
    pub async fn current_puzzle(&self) -> Result<Option<DailyPuzzle>> {
        self.collection()
            .find_one(doc! {})
            .with_options(latest_first())
            .await
            .context("Failed to fetch the current puzzle")
    }

    pub async fn puzzle_by_id(&self, id: &ObjectId) -> Result<Option<DailyPuzzle>> {
        self.collection()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to fetch puzzle")
    }

    /// Most recent puzzle created strictly before the cutoff (used for the
    /// previous day's leaderboard).
    pub async fn puzzle_before(&self, cutoff: DateTime<Utc>) -> Result<Option<DailyPuzzle>> {
        self.collection()
            .find_one(doc! { "createdAt": { "$lt": chrono_to_bson(cutoff) } })
            .with_options(latest_first())
            .await
            .context("Failed to fetch previous puzzle")
    }

    /// Client view with a freshly presigned image URL.
    pub fn presigned_view(&self, puzzle: &DailyPuzzle) -> Result<PuzzleView> {
        let image_url = self
            .storage
            .generate_presigned_download_url(&puzzle.image_key, IMAGE_URL_TTL)?;
        Ok(PuzzleView {
            id: puzzle.id_hex(),
            image_url,
            created_at: puzzle.created_at,
        })
    }

    fn collection(&self) -> Collection<DailyPuzzle> {
        self.mongo.collection("daily_puzzles")
    }
}

fn latest_first() -> FindOneOptions {
    FindOneOptions::builder()
        .sort(doc! { "createdAt": -1 })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotation(count: usize) -> ThemeRotation {
        let themes = (0..count).map(|i| format!("theme-{}", i)).collect();
        ThemeRotation::new(themes, NaiveDate::from_ymd_opt(2024, 9, 2).unwrap())
    }

    #[test]
    fn same_day_selects_same_theme() {
        let rotation = rotation(20);
        let day = NaiveDate::from_ymd_opt(2025, 3, 17).unwrap();
        assert_eq!(rotation.theme_for(day), rotation.theme_for(day));
    }

    #[test]
    fn rotation_advances_daily_and_wraps() {
        let rotation = rotation(3);
        let epoch = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        assert_eq!(rotation.theme_for(epoch), Some("theme-0"));
        assert_eq!(
            rotation.theme_for(epoch + chrono::Days::new(1)),
            Some("theme-1")
        );
        assert_eq!(
            rotation.theme_for(epoch + chrono::Days::new(2)),
            Some("theme-2")
        );
        assert_eq!(
            rotation.theme_for(epoch + chrono::Days::new(3)),
            Some("theme-0")
        );
    }

    #[test]
    fn dates_before_epoch_stay_in_range() {
        let rotation = rotation(7);
        let day = NaiveDate::from_ymd_opt(2024, 8, 30).unwrap(); // 3 days before epoch
        assert_eq!(rotation.theme_for(day), Some("theme-4"));
    }

    #[test]
    fn empty_theme_list_yields_none() {
        let rotation = ThemeRotation::new(vec![], NaiveDate::from_ymd_opt(2024, 9, 2).unwrap());
        assert_eq!(
            rotation.theme_for(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
            None
        );
    }
}
