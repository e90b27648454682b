use crate::config::Config;
use mongodb::{bson::doc, Client as MongoClient, Database};

use self::object_storage::ObjectStorageClient;

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub http: reqwest::Client,
    pub storage: ObjectStorageClient,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Testing MongoDB connection with ping...");
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            mongo.run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|_| anyhow::anyhow!("MongoDB ping timeout after 5s"))??;
        tracing::info!("MongoDB connection established successfully");

        // One shared client for all outbound calls (providers, geo lookup,
        // image downloads). No client-side timeout: each workflow is a single
        // blocking round-trip bounded only by the request lifecycle.
        let http = reqwest::Client::new();

        let storage = ObjectStorageClient::new(config.object_storage.clone())?;

        Ok(Self {
            config,
            mongo,
            http,
            storage,
        })
    }
}

pub mod debug_log;
pub mod guess_service;
pub mod identity_service;
pub mod object_storage;
pub mod openai;
pub mod puzzle_service;
pub mod replicate;
