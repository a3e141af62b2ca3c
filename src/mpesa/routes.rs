use axum::{
    body::Bytes,
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::PaymentError;

/// STK push request, shaped like the Safaricom sandbox API
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StkPushRequest {
    pub phone_number: Option<Value>,
    pub amount: Option<Value>,
    pub transaction_desc: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub response_code: String,
    pub response_description: String,
    pub customer_message: String,
}

impl StkPushResponse {
    fn accepted(millis: i64) -> Self {
        Self {
            merchant_request_id: format!("mock_merchant_{millis}"),
            checkout_request_id: format!("ws_CO_{millis}"),
            response_code: "0".to_string(),
            response_description: "Success. Request accepted for processing".to_string(),
            customer_message: "STK Push request has been initiated".to_string(),
        }
    }
}

/// Empty strings, zero, false and null count as missing
fn is_present(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Some(_) => true,
    }
}

pub async fn index_handler() -> Html<&'static str> {
    Html("<h1>HouseLook M-Pesa Mock API Server</h1><p>This is a mock server for testing purposes</p>")
}

pub async fn stk_push_handler(body: Bytes) -> Result<Json<StkPushResponse>, PaymentError> {
    let request: StkPushRequest = serde_json::from_slice(&body).unwrap_or_default();
    info!(
        "Simulating STK push: phone={:?} amount={:?} desc={:?}",
        request.phone_number, request.amount, request.transaction_desc
    );

    if !is_present(&request.phone_number) || !is_present(&request.amount) {
        return Err(PaymentError::MissingFields);
    }

    let response = StkPushResponse::accepted(Utc::now().timestamp_millis());
    info!("Responding with mock checkout {}", response.checkout_request_id);
    Ok(Json(response))
}

pub async fn callback_handler(body: Bytes) -> impl IntoResponse {
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    info!("Mock M-Pesa callback received: {payload}");
    (StatusCode::OK, Json(json!({ "status": "OK" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_follows_truthiness() {
        assert!(is_present(&Some(json!("254700000000"))));
        assert!(is_present(&Some(json!(10))));
        assert!(!is_present(&Some(json!(0))));
        assert!(!is_present(&Some(json!(""))));
        assert!(!is_present(&Some(Value::Null)));
        assert!(!is_present(&None));
    }

    #[test]
    fn accepted_ids_share_timestamp() {
        let response = StkPushResponse::accepted(1_700_000_000_000);
        assert_eq!(response.merchant_request_id, "mock_merchant_1700000000000");
        assert_eq!(response.checkout_request_id, "ws_CO_1700000000000");
        assert_eq!(response.response_code, "0");
    }
}
