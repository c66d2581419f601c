/// Job identifiers are random v4 UUIDs.
pub type JobId = uuid::Uuid;

/// Observer (WebSocket connection) identifiers.
pub type ObserverId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
