use mongodb::{bson::doc, Database};

/// Best-effort progress note for the scheduled workflow, written to the
/// "debug_log" collection. A failed insert is logged and swallowed; it must
/// never affect the primary workflow outcome.
pub async fn record_note(mongo: &Database, text: &str) {
    let collection = mongo.collection::<mongodb::bson::Document>("debug_log");
    let note = doc! {
        "text": text,
        "createdAt": mongodb::bson::DateTime::now(),
    };

    if let Err(e) = collection.insert_one(note).await {
        tracing::warn!("Failed to write debug note '{}': {}", text, e);
    }
}
