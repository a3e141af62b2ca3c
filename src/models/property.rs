use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{images::decode_images, normalize_rent, str_field, string_field, timestamp_field, UNKNOWN};

/// Contact for the agent managing a listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// A rental listing stored under `property/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub name: Option<String>,
    /// Normalized rent, 0 when missing or unparsable
    pub rent: f64,
    pub town: Option<String>,
    pub city: Option<String>,
    pub status: Option<String>,
    /// True only when the record's `available` field is literally `true`
    pub available: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub images: Vec<String>,
    pub amenities: Vec<String>,
    pub property_type: Option<String>,
    pub bedroom: Option<String>,
    pub owner_id: Option<String>,
    pub created_by: Option<String>,
    pub description: Option<String>,
    pub agent: Agent,
    pub raw_data: Value,
}

impl Property {
    /// Builds a listing view from a raw record; never fails
    pub fn from_record(id: &str, record: &Value) -> Self {
        let amenities = record
            .get("amenities")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let agent = record
            .get("agent")
            .map(|agent| Agent {
                name: string_field(agent, "names").or_else(|| string_field(agent, "name")),
                phone: string_field(agent, "phone"),
            })
            .unwrap_or_else(|| Agent {
                name: string_field(record, "agentName"),
                phone: string_field(record, "agentPhone"),
            });

        let bedroom = match record.get("bedroom") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Self {
            id: id.to_string(),
            name: string_field(record, "name").or_else(|| string_field(record, "title")),
            rent: normalize_rent(record.get("rent")),
            town: string_field(record, "town"),
            city: string_field(record, "city"),
            status: string_field(record, "status"),
            available: record.get("available") == Some(&Value::Bool(true)),
            created_at: timestamp_field(record, &["createdAt"]),
            images: decode_images(record),
            amenities,
            property_type: string_field(record, "type")
                .or_else(|| string_field(record, "propertyType")),
            bedroom,
            owner_id: string_field(record, "UserID"),
            created_by: string_field(record, "createdBy"),
            description: string_field(record, "description"),
            agent,
            raw_data: record.clone(),
        }
    }

    /// Town, falling back to city, falling back to "Unknown"
    pub fn location_label(&self) -> &str {
        self.town
            .as_deref()
            .or(self.city.as_deref())
            .unwrap_or(UNKNOWN)
    }

    /// Counts towards listing XP: flagged available, or status "available"
    pub fn is_active(&self) -> bool {
        self.available || self.status.as_deref() == Some("available")
    }

    /// Availability as shown on the detail page, read from `status`
    pub fn status_says_available(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("available"))
            .unwrap_or(false)
    }

    /// Ownership is the `UserID` field; `createdBy` only records who published it
    pub fn owned_by(&self, uid: &str) -> bool {
        self.owner_id.as_deref() == Some(uid)
    }

    pub fn type_label(&self) -> &str {
        self.property_type.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn raw_str(&self, key: &str) -> Option<&str> {
        str_field(&self.raw_data, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_from_listing_form_record() {
        let record = json!({
            "id": "-Nabc",
            "name": "Sunrise Apartments",
            "rent": 8500,
            "town": "Kahawa Wendani",
            "city": "Nairobi",
            "amenities": ["Wifi", " ", "Parking"],
            "agent": {"names": "Jane", "phone": "0700000000"},
            "available": true,
            "createdAt": "2024-05-01T08:00:00.000Z",
            "createdBy": "admin-uid"
        });
        let property = Property::from_record("-Nabc", &record);

        assert_eq!(property.name.as_deref(), Some("Sunrise Apartments"));
        assert_eq!(property.rent, 8_500.0);
        assert_eq!(property.location_label(), "Kahawa Wendani");
        assert_eq!(property.amenities, vec!["Wifi", "Parking"]);
        assert_eq!(property.agent.name.as_deref(), Some("Jane"));
        assert!(property.available);
        assert!(property.is_active());
        assert!(property.created_at.is_some());
        assert_eq!(property.created_by.as_deref(), Some("admin-uid"));
        assert!(!property.owned_by("admin-uid"));
    }

    #[test]
    fn location_falls_back_to_city_then_unknown() {
        let city_only = Property::from_record("a", &json!({"city": "Thika", "town": ""}));
        assert_eq!(city_only.location_label(), "Thika");

        let neither = Property::from_record("b", &json!({"location": "Westlands"}));
        assert_eq!(neither.location_label(), "Unknown");
    }

    #[test]
    fn available_must_be_literal_true() {
        let stringy = Property::from_record("a", &json!({"available": "true"}));
        assert!(!stringy.available);

        let by_status = Property::from_record("b", &json!({"status": "available"}));
        assert!(!by_status.available);
        assert!(by_status.is_active());
        assert!(by_status.status_says_available());

        let shouty = Property::from_record("c", &json!({"status": "Available"}));
        assert!(!shouty.is_active());
        assert!(shouty.status_says_available());
    }
}
