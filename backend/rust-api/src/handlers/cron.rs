use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::{
    metrics::PUZZLES_GENERATED_TOTAL,
    models::puzzle::GeneratedPuzzle,
    services::{debug_log, puzzle_service::PuzzleService, AppState},
};

/// Daily scheduled trigger. Each invocation creates a new puzzle row and
/// "today's puzzle" always resolves to the newest one, so running this more
/// than once per day is the scheduler's responsibility to avoid.
pub async fn run_daily_generation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GeneratedPuzzle>, (StatusCode, String)> {
    tracing::info!("Cron trigger received: generating daily puzzle");
    debug_log::record_note(&state.mongo, "Cron job executed: generating daily puzzle").await;

    let service = PuzzleService::new(&state);
    match service.generate_daily().await {
        Ok(generated) => {
            PUZZLES_GENERATED_TOTAL.inc();
            debug_log::record_note(&state.mongo, "Daily puzzle generated successfully").await;
            Ok(Json(generated))
        }
        Err(e) => {
            tracing::error!("Daily puzzle generation failed: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Daily puzzle generation failed".to_string(),
            ))
        }
    }
}
