use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{map_len, number_field, str_field, string_field, timestamp_field};

/// Mirror of an authenticated account, written to `users/{uid}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub uid: String,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub email_verified: bool,
}

/// Classification shown on the admin dashboard. First match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserKind {
    Agent,
    PropertyOwner,
    Tenant,
    Inactive,
}

impl UserKind {
    pub const ALL: [UserKind; 4] = [
        UserKind::PropertyOwner,
        UserKind::Tenant,
        UserKind::Agent,
        UserKind::Inactive,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            UserKind::Agent => "agent",
            UserKind::PropertyOwner => "Property Owner",
            UserKind::Tenant => "Tenant",
            UserKind::Inactive => "Inactive",
        }
    }

    /// Bucket name used in the user type distribution
    pub fn group_label(&self) -> &'static str {
        match self {
            UserKind::Agent => "Agents",
            UserKind::PropertyOwner => "Property Owners",
            UserKind::Tenant => "Tenants",
            UserKind::Inactive => "Inactive",
        }
    }
}

/// Lenient view of a `users/{uid}` record
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub uid: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub points: i64,
    pub created_at: Option<DateTime<Utc>>,
    /// `createdAt`/`joinedAt` as written, for display
    pub joined: Option<String>,
    pub last_active: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub role: Option<String>,
    pub user_type: Option<String>,
    pub owned_properties: usize,
    pub saved_count: usize,
}

impl User {
    pub fn from_record(uid: &str, record: &Value) -> Self {
        let joined = ["createdAt", "joinedAt"].iter().find_map(|key| match record.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });

        Self {
            uid: uid.to_string(),
            name: string_field(record, "name"),
            email: string_field(record, "email"),
            points: number_field(record, "points").trunc() as i64,
            created_at: timestamp_field(record, &["createdAt", "joinedAt"]),
            joined,
            last_active: timestamp_field(record, &["lastActive"]),
            last_login: timestamp_field(record, &["lastLoginAt"]),
            is_admin: record.get("isAdmin") == Some(&Value::Bool(true)),
            role: string_field(record, "role"),
            user_type: string_field(record, "userType"),
            owned_properties: map_len(record, "properties"),
            saved_count: map_len(record, "saved"),
        }
    }

    pub fn kind(&self) -> UserKind {
        let is_agent = [self.role.as_deref(), self.user_type.as_deref()]
            .iter()
            .any(|field| *field == Some("agent"));

        if is_agent {
            UserKind::Agent
        } else if self.owned_properties > 0 {
            UserKind::PropertyOwner
        } else if self.saved_count > 0 {
            UserKind::Tenant
        } else {
            UserKind::Inactive
        }
    }

    /// Name, then email, then a placeholder
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("Unknown User")
    }

    pub fn email_or_blank(&self) -> &str {
        self.email.as_deref().unwrap_or("")
    }
}

/// Reads a profile out of a raw record, tolerating missing fields
pub fn profile_from_record(uid: &str, record: &Value) -> UserProfile {
    UserProfile {
        name: str_field(record, "name").unwrap_or("User").to_string(),
        email: str_field(record, "email").unwrap_or("").to_string(),
        uid: uid.to_string(),
        points: number_field(record, "points").trunc() as i64,
        created_at: str_field(record, "createdAt").unwrap_or("").to_string(),
        is_admin: record.get("isAdmin") == Some(&Value::Bool(true)),
        email_verified: record.get("emailVerified") == Some(&Value::Bool(true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classification_first_match_wins() {
        let agent = User::from_record(
            "a",
            &json!({"userType": "agent", "properties": {"p1": true}, "saved": {"p2": true}}),
        );
        assert_eq!(agent.kind(), UserKind::Agent);

        let owner = User::from_record("b", &json!({"properties": {"p1": true}, "saved": {"p2": true}}));
        assert_eq!(owner.kind(), UserKind::PropertyOwner);

        let tenant = User::from_record("c", &json!({"role": "tenant", "saved": {"p2": true}}));
        assert_eq!(tenant.kind(), UserKind::Tenant);

        let inactive = User::from_record("d", &json!({"saved": {}, "properties": {}}));
        assert_eq!(inactive.kind(), UserKind::Inactive);
    }

    #[test]
    fn role_field_also_marks_agents() {
        let agent = User::from_record("a", &json!({"role": "agent"}));
        assert_eq!(agent.kind(), UserKind::Agent);
        assert_eq!(agent.kind().label(), "agent");
    }

    #[test]
    fn display_name_fallbacks() {
        assert_eq!(User::from_record("a", &json!({"name": "Mary"})).display_name(), "Mary");
        assert_eq!(
            User::from_record("b", &json!({"email": "m@x.io"})).display_name(),
            "m@x.io"
        );
        assert_eq!(User::from_record("c", &json!({})).display_name(), "Unknown User");
    }

    #[test]
    fn profile_round_trips_camel_case() {
        let profile = UserProfile {
            name: "Peter".into(),
            email: "peter@email.com".into(),
            uid: "u1".into(),
            points: 100,
            created_at: "2024-01-08T09:15:00Z".into(),
            is_admin: false,
            email_verified: true,
        };
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["isAdmin"], json!(false));
        assert_eq!(value["emailVerified"], json!(true));
        assert_eq!(profile_from_record("u1", &value), profile);
    }
}
