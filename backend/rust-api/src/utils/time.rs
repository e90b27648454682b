use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

/// chrono -> bson conversion for use inside query documents (range filters
/// on `createdAt` and friends).
pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}
