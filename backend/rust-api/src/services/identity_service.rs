use anyhow::{Context, Result};
use axum::http::HeaderMap;
use chrono::Utc;
use mongodb::{bson::doc, Collection, Database};
use rand::Rng;
use reqwest::Client;

use crate::models::user::User;
use crate::services::AppState;

pub struct IdentityService {
    mongo: Database,
    http: Client,
    geo_api_url: String,
}

impl IdentityService {
    pub fn new(state: &AppState) -> Self {
        Self {
            mongo: state.mongo.clone(),
            http: state.http.clone(),
            geo_api_url: state.config.geo_api_url.clone(),
        }
    }

    pub async fn find_user(&self, id: &str) -> Result<Option<User>> {
        self.collection()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to fetch user")
    }

    /// Create the user row for a fresh identity. The nationality is fixed
    /// at creation; the generated name stays until the player edits it.
    pub async fn create_user(&self, id: &str, nationality: String) -> Result<User> {
        let user = User {
            id: id.to_string(),
            name: generated_name(),
            nationality,
            created_at: Utc::now(),
        };

        self.collection()
            .insert_one(&user)
            .await
            .context("Failed to save user")?;

        tracing::info!("Created user {} ({})", user.name, user.id);
        Ok(user)
    }

    /// Direct name update by user id. Display names may collide; there is
    /// no uniqueness constraint.
    pub async fn change_name(&self, id: &str, name: &str) -> Result<Option<User>> {
        let result = self
            .collection()
            .update_one(doc! { "_id": id }, doc! { "$set": { "name": name } })
            .await
            .context("Failed to change user name")?;

        if result.matched_count == 0 {
            return Ok(None);
        }
        self.find_user(id).await
    }

    /// Best-effort country resolution from the proxy headers. Any failure,
    /// including a loopback or absent client address, falls back to "US".
    pub async fn resolve_country(&self, headers: &HeaderMap) -> String {
        let Some(ip) = client_ip(headers) else {
            return "US".to_string();
        };

        match self.lookup_country(&ip).await {
            Ok(country) if !country.is_empty() => country,
            Ok(_) => "US".to_string(),
            Err(e) => {
                tracing::warn!("Country lookup failed for {}: {}", ip, e);
                "US".to_string()
            }
        }
    }

    async fn lookup_country(&self, ip: &str) -> Result<String> {
        let url = format!("{}/v1/ip/country/{}", self.geo_api_url, ip);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to call country lookup API")?
            .error_for_status()
            .context("Country lookup returned error status")?;

        let country = response
            .text()
            .await
            .context("Failed to read country lookup response")?;
        Ok(country.trim().to_string())
    }

    fn collection(&self) -> Collection<User> {
        self.mongo.collection("users")
    }
}

fn generated_name() -> String {
    let mut rng = rand::rng();
    format!("User{:04}", rng.random_range(0..10000))
}

/// Originating client address from proxy headers. `x-real-ip` wins over the
/// first `x-forwarded-for` hop; loopback addresses mean there is no usable
/// origin.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() && !is_loopback(real_ip) {
            return Some(real_ip.to_string());
        }
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())?;
    let first_hop = forwarded.split(',').next()?.trim();
    if first_hop.is_empty() || is_loopback(first_hop) {
        None
    } else {
        Some(first_hop.to_string())
    }
}

fn is_loopback(ip: &str) -> bool {
    matches!(ip, "::1" | "127.0.0.1" | "localhost")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn generated_names_follow_the_scheme() {
        for _ in 0..20 {
            let name = generated_name();
            let digits = name.strip_prefix("User").unwrap();
            assert_eq!(digits.len(), 4);
            assert!(digits.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn real_ip_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.9"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.1, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), Some("203.0.113.9".to_string()));
    }

    #[test]
    fn forwarded_for_uses_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.1, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), Some("198.51.100.1".to_string()));
    }

    #[test]
    fn loopback_addresses_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("::1"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("127.0.0.1"));
        assert_eq!(client_ip(&headers), None);

        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
