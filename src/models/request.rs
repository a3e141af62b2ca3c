use serde::Serialize;
use serde_json::Value;

use super::{string_field, timestamp_field};

/// A "find me a house" request stored under `propertyRequests/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct PropertyRequest {
    pub id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub contacted: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub raw_data: Value,
}

impl PropertyRequest {
    /// `fallback_id` is the record key, used when the record has no `id` field
    pub fn from_record(fallback_id: &str, record: &Value) -> Self {
        Self {
            id: string_field(record, "id").unwrap_or_else(|| fallback_id.to_string()),
            name: string_field(record, "name"),
            phone: string_field(record, "phone"),
            email: string_field(record, "email"),
            location: string_field(record, "location").or_else(|| string_field(record, "town")),
            contacted: record.get("contacted") == Some(&Value::Bool(true)),
            created_at: timestamp_field(record, &["createdAt", "timestamp"]),
            raw_data: record.clone(),
        }
    }
}
