use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{Duration, Utc};
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;

use crate::{
    extractors::AppJson,
    models::answer::{
        AnswerView, GuessResponse, LeaderboardEntry, RevealResponse, SubmitGuessRequest,
    },
    models::puzzle::{DailyPuzzle, PuzzleView},
    services::{guess_service::GuessService, puzzle_service::PuzzleService, AppState},
};

use super::require_identity;

pub async fn today_puzzle(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PuzzleView>, (StatusCode, String)> {
    let service = PuzzleService::new(&state);

    let puzzle = match service.current_puzzle().await {
        Ok(Some(puzzle)) => puzzle,
        Ok(None) => {
            return Err((
                StatusCode::NOT_FOUND,
                "No daily puzzle available yet".to_string(),
            ))
        }
        Err(e) => {
            tracing::error!("Failed to fetch the daily puzzle: {:#}", e);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch the daily puzzle".to_string(),
            ));
        }
    };

    match service.presigned_view(&puzzle) {
        Ok(view) => Ok(Json(view)),
        Err(e) => {
            tracing::error!("Failed to presign image URL: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate image URL".to_string(),
            ))
        }
    }
}

/// The caller's answer row for a puzzle. A missing row is a `null` body,
/// not an error: the player simply hasn't guessed yet.
pub async fn get_existing_answer(
    State(state): State<Arc<AppState>>,
    Path(puzzle_id): Path<String>,
    jar: CookieJar,
) -> Result<Json<Option<AnswerView>>, (StatusCode, String)> {
    let user_id = require_identity(&jar)?;
    let puzzle_id = parse_puzzle_id(&puzzle_id)?;

    let service = GuessService::new(&state);
    match service.get_answer(&puzzle_id, &user_id).await {
        Ok(answer) => Ok(Json(answer.map(Into::into))),
        Err(e) => {
            tracing::error!("Failed to fetch answer for {}: {:#}", user_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch answer".to_string(),
            ))
        }
    }
}

pub async fn submit_guess(
    State(state): State<Arc<AppState>>,
    Path(puzzle_id): Path<String>,
    jar: CookieJar,
    AppJson(req): AppJson<SubmitGuessRequest>,
) -> Result<Json<GuessResponse>, (StatusCode, String)> {
    let user_id = require_identity(&jar)?;
    let puzzle_id = parse_puzzle_id(&puzzle_id)?;
    tracing::info!("Submitting guess: user={}, puzzle={}", user_id, puzzle_id);

    let service = GuessService::new(&state);
    let puzzle = check_guess_preconditions(&state, &service, &puzzle_id, &user_id).await?;

    match service.submit_guess(&puzzle, &user_id, &req.guess).await {
        Ok(outcome) => Ok(Json(GuessResponse {
            closeness: outcome.closeness,
            answer: outcome.answer.into(),
            max_tries: state.config.game.max_tries,
        })),
        Err(e) => {
            tracing::error!("Failed to score guess for {}: {:#}", user_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to score guess".to_string(),
            ))
        }
    }
}

/// Disclose the prompt, spending all remaining tries.
pub async fn reveal_prompt(
    State(state): State<Arc<AppState>>,
    Path(puzzle_id): Path<String>,
    jar: CookieJar,
) -> Result<Json<RevealResponse>, (StatusCode, String)> {
    let user_id = require_identity(&jar)?;
    let puzzle_id = parse_puzzle_id(&puzzle_id)?;
    tracing::info!("Revealing prompt: user={}, puzzle={}", user_id, puzzle_id);

    let service = GuessService::new(&state);
    let puzzle = check_guess_preconditions(&state, &service, &puzzle_id, &user_id).await?;

    match service
        .reveal_prompt(&puzzle, &user_id, state.config.game.max_tries)
        .await
    {
        Ok(answer) => Ok(Json(RevealResponse {
            prompt: puzzle.image_prompt,
            answer: answer.into(),
        })),
        Err(e) => {
            tracing::error!("Failed to reveal prompt for {}: {:#}", user_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to reveal prompt".to_string(),
            ))
        }
    }
}

pub async fn daily_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(puzzle_id): Path<String>,
) -> Result<Json<Vec<LeaderboardEntry>>, (StatusCode, String)> {
    let puzzle_id = parse_puzzle_id(&puzzle_id)?;

    let service = GuessService::new(&state);
    match service.daily_ranking(&puzzle_id).await {
        Ok(entries) => Ok(Json(entries)),
        Err(e) => {
            tracing::error!("Failed to build leaderboard: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build leaderboard".to_string(),
            ))
        }
    }
}

/// Leaderboard of the previous day's puzzle: the most recent puzzle created
/// before 24 hours ago. Empty when there is no such puzzle.
pub async fn yesterday_leaderboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LeaderboardEntry>>, (StatusCode, String)> {
    let puzzle_service = PuzzleService::new(&state);
    let cutoff = Utc::now() - Duration::days(1);

    let puzzle = match puzzle_service.puzzle_before(cutoff).await {
        Ok(Some(puzzle)) => puzzle,
        Ok(None) => return Ok(Json(Vec::new())),
        Err(e) => {
            tracing::error!("Failed to fetch yesterday's puzzle: {:#}", e);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch yesterday's puzzle".to_string(),
            ));
        }
    };

    let Some(puzzle_id) = puzzle.id else {
        return Ok(Json(Vec::new()));
    };

    let service = GuessService::new(&state);
    match service.daily_ranking(&puzzle_id).await {
        Ok(entries) => Ok(Json(entries)),
        Err(e) => {
            tracing::error!("Failed to build yesterday's leaderboard: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build leaderboard".to_string(),
            ))
        }
    }
}

/// Shared preconditions for scoring operations: the user must exist, the
/// puzzle must exist, and the attempt cap must not be spent yet. The cap is
/// checked here, before scoring, never inside the upsert itself.
async fn check_guess_preconditions(
    state: &Arc<AppState>,
    service: &GuessService,
    puzzle_id: &ObjectId,
    user_id: &str,
) -> Result<DailyPuzzle, (StatusCode, String)> {
    let identity = crate::services::identity_service::IdentityService::new(state);
    match identity.find_user(user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err((StatusCode::UNAUTHORIZED, "Unknown user".to_string())),
        Err(e) => {
            tracing::error!("Failed to fetch user {}: {:#}", user_id, e);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch user".to_string(),
            ));
        }
    }

    let max_tries = state.config.game.max_tries;
    match service.get_answer(puzzle_id, user_id).await {
        Ok(Some(answer)) if answer.tries >= max_tries => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Maximum guesses limit reached ({})", max_tries),
            ));
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("Failed to fetch answer for {}: {:#}", user_id, e);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch answer".to_string(),
            ));
        }
    }

    let puzzle_service = PuzzleService::new(state);
    match puzzle_service.puzzle_by_id(puzzle_id).await {
        Ok(Some(puzzle)) => Ok(puzzle),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Puzzle not found".to_string())),
        Err(e) => {
            tracing::error!("Failed to fetch puzzle {}: {:#}", puzzle_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch puzzle".to_string(),
            ))
        }
    }
}

fn parse_puzzle_id(raw: &str) -> Result<ObjectId, (StatusCode, String)> {
    ObjectId::parse_str(raw)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid puzzle id".to_string()))
}
