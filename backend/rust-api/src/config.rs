use chrono::NaiveDate;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub openai: OpenAiSettings,
    pub replicate: ReplicateSettings,
    pub object_storage: ObjectStorageSettings,
    pub geo_api_url: String,
    pub game: GameSettings,
}

/// Chat + embedding provider (OpenAI-compatible HTTP API).
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
}

/// Image generation provider (Replicate-compatible HTTP API).
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicateSettings {
    pub api_token: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStorageSettings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub images_prefix: String,
}

/// Game rules injected as configuration: the ordered theme list, the
/// rotation epoch and the per-puzzle guess cap.
#[derive(Debug, Clone, Deserialize)]
pub struct GameSettings {
    pub themes: Vec<String>,
    pub epoch: NaiveDate,
    pub max_tries: u32,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            // Fallback to current directory .env for backward compatibility
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", app_env)).required(false), // Allow missing config file, fallback to ENV
            )
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/promptle".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "promptle".to_string());

        let openai = OpenAiSettings {
            api_key: settings
                .get_string("openai.api_key")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .unwrap_or_else(|_| {
                    if app_env == "prod" {
                        panic!("FATAL: OPENAI_API_KEY must be set in production!");
                    }
                    eprintln!("WARNING: OPENAI_API_KEY not set, provider calls will fail");
                    String::new()
                }),
            base_url: settings
                .get_string("openai.base_url")
                .or_else(|_| env::var("OPENAI_BASE_URL"))
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            chat_model: settings
                .get_string("openai.chat_model")
                .unwrap_or_else(|_| "gpt-4o".to_string()),
            embedding_model: settings
                .get_string("openai.embedding_model")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
        };

        let replicate = ReplicateSettings {
            api_token: settings
                .get_string("replicate.api_token")
                .or_else(|_| env::var("REPLICATE_API_TOKEN"))
                .unwrap_or_else(|_| {
                    if app_env == "prod" {
                        panic!("FATAL: REPLICATE_API_TOKEN must be set in production!");
                    }
                    eprintln!("WARNING: REPLICATE_API_TOKEN not set, image renders will fail");
                    String::new()
                }),
            base_url: settings
                .get_string("replicate.base_url")
                .or_else(|_| env::var("REPLICATE_BASE_URL"))
                .unwrap_or_else(|_| "https://api.replicate.com/v1".to_string()),
            model: settings
                .get_string("replicate.model")
                .unwrap_or_else(|_| "black-forest-labs/flux-dev".to_string()),
        };

        let object_storage = ObjectStorageSettings {
            bucket: settings
                .get_string("storage.bucket")
                .or_else(|_| env::var("OBJECT_STORAGE_BUCKET"))
                .unwrap_or_else(|_| "promptle-images".to_string()),
            region: settings
                .get_string("storage.region")
                .or_else(|_| env::var("OBJECT_STORAGE_REGION"))
                .unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint: settings
                .get_string("storage.endpoint")
                .or_else(|_| env::var("OBJECT_STORAGE_ENDPOINT"))
                .ok(),
            access_key: settings
                .get_string("storage.access_key")
                .or_else(|_| env::var("OBJECT_STORAGE_ACCESS_KEY"))
                .unwrap_or_else(|_| {
                    eprintln!("WARNING: OBJECT_STORAGE_ACCESS_KEY not set");
                    String::new()
                }),
            secret_key: settings
                .get_string("storage.secret_key")
                .or_else(|_| env::var("OBJECT_STORAGE_SECRET_KEY"))
                .unwrap_or_else(|_| {
                    eprintln!("WARNING: OBJECT_STORAGE_SECRET_KEY not set");
                    String::new()
                }),
            images_prefix: settings
                .get_string("storage.images_prefix")
                .unwrap_or_else(|_| "generated-images".to_string()),
        };

        let geo_api_url = settings
            .get_string("geo.url")
            .or_else(|_| env::var("GEO_API_URL"))
            .unwrap_or_else(|_| "https://get.geojs.io".to_string());

        let themes = settings
            .get::<Vec<String>>("game.themes")
            .unwrap_or_else(|_| default_themes());

        let epoch = settings
            .get_string("game.epoch")
            .or_else(|_| env::var("GAME_EPOCH"))
            .unwrap_or_else(|_| "2024-09-02".to_string());
        let epoch = epoch.parse::<NaiveDate>().map_err(|e| {
            config::ConfigError::Message(format!("Invalid game.epoch date: {}", e))
        })?;

        let max_tries = settings.get_int("game.max_tries").unwrap_or(10).max(1) as u32;

        Ok(Config {
            mongo_uri,
            mongo_database,
            openai,
            replicate,
            object_storage,
            geo_api_url,
            game: GameSettings {
                themes,
                epoch,
                max_tries,
            },
        })
    }
}

fn default_themes() -> Vec<String> {
    [
        "Cars",
        "Ice cream",
        "Sport",
        "Food",
        "Party",
        "Hot day",
        "A brawl after a match",
        "A skiing day in the '90s",
        "Shopping day",
        "Car not working",
        "Someone being selected in the draft",
        "Super intense coding session",
        "Pleasant walk on a spring day",
        "Columbus discovering India, not America",
        "Testing Italian cuisine",
        "Riding a Vespa in SF",
        "A ruined wedding day",
        "Losing connection during a call",
        "A sleepy cat",
        "A dog running a company",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_theme_list_is_nonempty_and_ordered() {
        let themes = default_themes();
        assert_eq!(themes.len(), 20);
        assert_eq!(themes[0], "Cars");
        assert_eq!(themes[19], "A dog running a company");
    }
}
