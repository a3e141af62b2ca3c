//! Listing, request and per-user bookkeeping operations.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::{
    error::{AuthError, StoreError},
    models::{Agent, NewTransaction, Property, PropertyRequest, UserProfile, UNKNOWN},
    store::{fetch_collection, Collection, RecordStore},
};

/// Default upper bound of the search price slider
pub const DEFAULT_MAX_RENT: f64 = 30_000.0;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Admin "list a property" form, as entered
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingForm {
    pub property_name: String,
    pub property_category: String,
    pub unit_type: String,
    pub rent_amount: String,
    pub deposit_amount: String,
    pub furnished_status: String,
    /// Comma separated
    pub amenities_csv: String,
    pub county: String,
    pub sub_county: String,
    pub city: String,
    pub town: String,
    pub address: String,
    pub latitude: String,
    pub longitude: String,
    pub description: String,
    pub directions: String,
    pub agent_name: String,
    pub agent_phone: String,
}

impl ListingForm {
    fn missing_required(&self) -> bool {
        [
            &self.property_name,
            &self.rent_amount,
            &self.agent_name,
            &self.agent_phone,
        ]
        .iter()
        .any(|field| field.trim().is_empty())
    }

    fn amenities(&self) -> Vec<String> {
        self.amenities_csv
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Record pushed under `property`; its `id` is stamped once the key is known
    fn to_record(&self, created_by: &str) -> Value {
        json!({
            "name": self.property_name.trim(),
            "propertyCategory": self.property_category,
            "unitType": self.unit_type,
            "rent": parse_number(&self.rent_amount).unwrap_or(0.0),
            "deposit": parse_number(&self.deposit_amount).unwrap_or(0.0),
            "furnishedStatus": self.furnished_status,
            "amenities": self.amenities(),
            "location": self.address,
            "county": self.county,
            "subCounty": self.sub_county,
            "city": self.city,
            "town": self.town,
            "coordinates": {
                "lat": parse_number(&self.latitude).filter(|n| *n != 0.0),
                "lng": parse_number(&self.longitude).filter(|n| *n != 0.0),
            },
            "description": self.description,
            "direction": self.directions,
            "agent": {
                "names": self.agent_name.trim(),
                "phone": self.agent_phone.trim(),
            },
            "available": true,
            "createdAt": Utc::now().to_rfc3339(),
            "createdBy": created_by,
        })
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Listing as shown on its detail page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDetail {
    pub id: String,
    pub title: String,
    /// `"{city}, {town}"`, with blanks for missing parts
    pub location: String,
    pub price: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub images: Vec<String>,
    pub amenities: Vec<String>,
    pub available: bool,
    pub description: String,
    pub features: Vec<String>,
    pub agent: Agent,
    pub coordinates: (f64, f64),
}

impl PropertyDetail {
    pub fn from_property(property: &Property) -> Self {
        let raw = &property.raw_data;
        let feature = |label: &str, key: &str| {
            let value = match raw.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "undefined".to_string(),
                Some(other) => other.to_string(),
            };
            format!("{label}: {value}")
        };
        let coordinate = |key: &str| {
            raw.get(key)
                .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(parse_number)))
                .unwrap_or(0.0)
        };

        let agent = Agent {
            name: property
                .agent
                .name
                .clone()
                .or_else(|| property.raw_str("names").map(str::to_string)),
            phone: property
                .agent
                .phone
                .clone()
                .or_else(|| property.raw_str("phone").map(str::to_string)),
        };

        Self {
            id: property.id.clone(),
            title: property
                .name
                .clone()
                .unwrap_or_else(|| "Untitled House".to_string()),
            location: format!(
                "{}, {}",
                property.city.as_deref().unwrap_or(""),
                property.town.as_deref().unwrap_or("")
            ),
            price: property.rent.trunc() as i64,
            kind: property.property_type.clone().unwrap_or_default(),
            images: property.images.clone(),
            amenities: property.amenities.clone(),
            available: property.status_says_available(),
            description: property.description.clone().unwrap_or_default(),
            features: vec![
                feature("Bedrooms", "bedroom"),
                feature("Balconies", "balcony"),
                feature("Furnished", "furnished"),
                feature("Vacancies", "vacancies"),
                feature("Direction", "direction"),
            ],
            agent,
            coordinates: (coordinate("lat"), coordinate("lng")),
        }
    }
}

/// Home page search. Every filter is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    /// Case-insensitive substring of the town
    pub location: Option<String>,
    pub min_rent: f64,
    pub max_rent: f64,
    /// Case-insensitive substring of the bedroom description
    pub room_type: Option<String>,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            location: None,
            min_rent: 0.0,
            max_rent: DEFAULT_MAX_RENT,
            room_type: None,
        }
    }
}

impl SearchFilters {
    pub fn matches(&self, property: &Property) -> bool {
        let contains = |haystack: &str, needle: &Option<String>| match needle.as_deref() {
            Some(needle) if !needle.trim().is_empty() => haystack
                .to_lowercase()
                .contains(&needle.trim().to_lowercase()),
            _ => true,
        };

        contains(property.town.as_deref().unwrap_or(UNKNOWN), &self.location)
            && property.rent >= self.min_rent
            && property.rent <= self.max_rent
            && contains(property.bedroom.as_deref().unwrap_or(UNKNOWN), &self.room_type)
    }
}

/// Store-backed listing operations
#[derive(Clone)]
pub struct Listings {
    store: Arc<dyn RecordStore>,
}

impl Listings {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn all_properties(&self) -> Result<Vec<Property>, StoreError> {
        Ok(fetch_collection(self.store.as_ref(), Collection::Property.path())
            .await?
            .iter()
            .map(|(id, record)| Property::from_record(id, record))
            .collect())
    }

    /// Publishes a listing. Only admins may list; returns the new key.
    pub async fn create_listing(
        &self,
        profile: Option<&UserProfile>,
        form: &ListingForm,
    ) -> Result<String, AuthError> {
        let profile = profile
            .filter(|p| p.is_admin)
            .ok_or(AuthError::AccessDenied)?;

        if form.missing_required() {
            return Err(AuthError::MissingFields);
        }

        let id = self
            .store
            .push(Collection::Property.path(), form.to_record(&profile.uid))
            .await?;
        let mut stamp = Map::new();
        stamp.insert("id".to_string(), Value::from(id.clone()));
        self.store
            .update(&Collection::Property.child(&id), stamp)
            .await?;

        info!("Listed property {} ({id})", form.property_name.trim());
        Ok(id)
    }

    /// `None` when no listing exists under `id`
    pub async fn property_detail(&self, id: &str) -> Result<Option<PropertyDetail>, StoreError> {
        let record = self.store.get(&Collection::Property.child(id)).await?;
        Ok(record.map(|record| PropertyDetail::from_property(&Property::from_record(id, &record))))
    }

    pub async fn search(&self, filters: &SearchFilters) -> Result<Vec<Property>, StoreError> {
        let mut matches = self.all_properties().await?;
        matches.retain(|p| filters.matches(p));
        debug!("Search matched {} listings", matches.len());
        Ok(matches)
    }

    /// Listings whose `UserID` is `user_id`
    pub async fn user_properties(&self, user_id: &str) -> Result<Vec<Property>, StoreError> {
        let mut owned = self.all_properties().await?;
        owned.retain(|p| p.owned_by(user_id));
        Ok(owned)
    }

    pub async fn property_requests(&self) -> Result<Vec<PropertyRequest>, StoreError> {
        Ok(
            fetch_collection(self.store.as_ref(), Collection::PropertyRequests.path())
                .await?
                .iter()
                .map(|(key, record)| PropertyRequest::from_record(key, record))
                .collect(),
        )
    }

    /// Flags a request as contacted. Matches on the request id or its key.
    ///
    /// Returns false when no such request exists.
    pub async fn mark_request_contacted(&self, request_id: &str) -> Result<bool, StoreError> {
        let entries =
            fetch_collection(self.store.as_ref(), Collection::PropertyRequests.path()).await?;
        let key = entries.iter().find_map(|(key, record)| {
            let request = PropertyRequest::from_record(key, record);
            (key == request_id || request.id == request_id).then(|| key.clone())
        });

        let Some(key) = key else {
            return Ok(false);
        };

        let mut changes = Map::new();
        changes.insert("contacted".to_string(), Value::Bool(true));
        self.store
            .update(&Collection::PropertyRequests.child(&key), changes)
            .await?;
        Ok(true)
    }

    /// Points balance, 0 when unset
    pub async fn user_points(&self, user_id: &str) -> Result<i64, StoreError> {
        let points = self
            .store
            .get(&format!("{}/points", Collection::Users.child(user_id)))
            .await?;

        Ok(match points {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0).trunc() as i64,
            Some(Value::String(s)) => parse_number(&s).unwrap_or(0.0).trunc() as i64,
            _ => 0,
        })
    }

    pub async fn set_user_points(&self, user_id: &str, points: i64) -> Result<(), StoreError> {
        self.store
            .set(
                &format!("{}/points", Collection::Users.child(user_id)),
                Value::from(points),
            )
            .await
    }

    /// Stamps `lastActive` with the current time
    pub async fn update_user_activity(&self, user_id: &str) -> Result<(), StoreError> {
        let mut changes = Map::new();
        changes.insert(
            "lastActive".to_string(),
            Value::from(Utc::now().timestamp_millis()),
        );
        self.store
            .update(&Collection::Users.child(user_id), changes)
            .await
    }

    /// Records a payment and returns its id
    pub async fn save_transaction(&self, transaction: &NewTransaction) -> Result<String, StoreError> {
        let now = Utc::now();
        let id = transaction_id(now.timestamp_millis());
        let path = Collection::Transactions.child(&id);

        let mut record = match serde_json::to_value(transaction) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(source) => return Err(StoreError::Decode { path, source }),
        };
        record.insert("timestamp".to_string(), Value::from(now.timestamp_millis()));
        record.insert("date".to_string(), Value::from(now.to_rfc3339()));
        record.insert("id".to_string(), Value::from(id.clone()));

        self.store.set(&path, Value::Object(record)).await?;
        info!(
            "Recorded {} transaction {id} for {}",
            transaction.kind, transaction.user_id
        );
        Ok(id)
    }

    /// Number of listings owned by `user_id`
    pub async fn user_property_count(&self, user_id: &str) -> Result<usize, StoreError> {
        Ok(self.user_properties(user_id).await?.len())
    }
}

/// `transaction_<millis>_<9 random base36 chars>`
pub fn transaction_id(millis: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("transaction_{millis}_{suffix}")
}
