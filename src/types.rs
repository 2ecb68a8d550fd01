//! Core types shared across the storage layer.

/// NodeId: `/`-joined logical path of a node, without file extension
pub type NodeId = String;

/// Timestamp: milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Current wall-clock time as a [`Timestamp`].
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}
