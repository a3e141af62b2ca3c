use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{number_field, string_field, timestamp_field, UNKNOWN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// A payment record stored under `transactions/{id}`. Never modified once written.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: Option<String>,
    pub amount: f64,
    pub kind: Option<String>,
    pub status: Option<String>,
    /// `timestamp` millis, else the ISO `date` field
    pub timestamp: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn from_record(id: &str, record: &Value) -> Self {
        Self {
            id: id.to_string(),
            user_id: string_field(record, "userId"),
            amount: number_field(record, "amount"),
            kind: string_field(record, "type").or_else(|| string_field(record, "paymentType")),
            status: string_field(record, "status"),
            timestamp: timestamp_field(record, &["timestamp", "date"]),
        }
    }

    pub fn type_label(&self) -> &str {
        self.kind.as_deref().unwrap_or(UNKNOWN)
    }
}

/// Payload for recording a new transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub user_id: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamp_prefers_millis_then_date() {
        let t = Transaction::from_record(
            "t1",
            &json!({"amount": 5000, "timestamp": 1_700_000_000_000i64, "date": "2020-01-01T00:00:00Z"}),
        );
        assert_eq!(t.timestamp.unwrap().timestamp_millis(), 1_700_000_000_000);

        let t = Transaction::from_record("t2", &json!({"amount": "250", "date": "2024-02-01T00:00:00Z"}));
        assert_eq!(t.amount, 250.0);
        assert!(t.timestamp.is_some());

        let t = Transaction::from_record("t3", &json!({"paymentType": "mpesa"}));
        assert!(t.timestamp.is_none());
        assert_eq!(t.amount, 0.0);
        assert_eq!(t.type_label(), "mpesa");
    }

    #[test]
    fn new_transaction_uses_store_field_names() {
        let tx = NewTransaction {
            user_id: "u1".into(),
            amount: 10.0,
            kind: "listing_fee".into(),
            description: "Listing fee".into(),
            status: TransactionStatus::Completed,
            payment_method: Some("M-Pesa".into()),
            reference: None,
        };
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["userId"], json!("u1"));
        assert_eq!(value["type"], json!("listing_fee"));
        assert_eq!(value["status"], json!("completed"));
        assert_eq!(value["paymentMethod"], json!("M-Pesa"));
        assert!(value.get("reference").is_none());
    }
}
