use serde::{Deserialize, Serialize};

/// Kind of change carried by a notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Heartbeat,
    Created,
    Updated,
    Deleted,
}

/// One decoded change notification.
///
/// Decoding is all-or-nothing: a line missing `content` or `timestamp`, or
/// carrying an unrecognized kind, fails to decode and yields no value at all.
/// Optional location fields are `None` when the source object omits the key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataNotification {
    /// Kind of change (wire key `content`).
    #[serde(rename = "content")]
    pub kind: NotificationKind,
    /// Server-side event time in epoch milliseconds.
    pub timestamp: i64,
    /// Affected database, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Affected table, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Affected dataset, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    /// Affected datatype, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl DataNotification {
    /// Decodes one line of server output.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Encodes the notification as a single JSON line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
