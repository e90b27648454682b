use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    extractors::AppJson,
    models::user::{ChangeNameRequest, UserProfile},
    services::{identity_service::IdentityService, AppState},
};

use super::{require_identity, USER_COOKIE};

/// Resolve the anonymous identity for this browser, creating both the
/// cookie and the user row on first visit.
pub async fn get_or_create_identity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<UserProfile>), (StatusCode, String)> {
    let existing_cookie = jar.get(USER_COOKIE).map(|cookie| cookie.value().to_string());
    let (uuid, jar) = match existing_cookie {
        Some(uuid) => (uuid, jar),
        None => {
            let uuid = Uuid::new_v4().to_string();
            let cookie = Cookie::build((USER_COOKIE, uuid.clone()))
                .path("/")
                .secure(true)
                .same_site(SameSite::Strict)
                .expires(time::OffsetDateTime::now_utc() + time::Duration::days(365))
                .build();
            tracing::info!("Issuing new identity cookie: {}", uuid);
            (uuid, jar.add(cookie))
        }
    };

    let service = IdentityService::new(&state);

    match service.find_user(&uuid).await {
        Ok(Some(user)) => Ok((jar, Json(user.into()))),
        Ok(None) => {
            // First visit (or a cookie that outlived its row): create the
            // user with a best-effort nationality from the request origin.
            let nationality = service.resolve_country(&headers).await;
            match service.create_user(&uuid, nationality).await {
                Ok(user) => Ok((jar, Json(user.into()))),
                Err(e) => {
                    tracing::error!("Failed to create user {}: {:#}", uuid, e);
                    Err((
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to create user".to_string(),
                    ))
                }
            }
        }
        Err(e) => {
            tracing::error!("Failed to fetch user {}: {:#}", uuid, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch user".to_string(),
            ))
        }
    }
}

pub async fn change_display_name(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<ChangeNameRequest>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    let uuid = require_identity(&jar)?;

    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    let service = IdentityService::new(&state);
    match service.change_name(&uuid, req.name.trim()).await {
        Ok(Some(user)) => Ok(Json(user.into())),
        Ok(None) => Err((StatusCode::NOT_FOUND, "User not found".to_string())),
        Err(e) => {
            tracing::error!("Failed to change name for {}: {:#}", uuid, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to change name".to_string(),
            ))
        }
    }
}
