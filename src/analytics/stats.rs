use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Property, Transaction, User};

/// Window for "active users" on the dashboard
pub const ACTIVE_USER_DAYS: i64 = 30;
/// Window for live sessions, read from `lastActive`
pub const ACTIVE_SESSION_MINUTES: i64 = 30;

/// Headline counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatistics {
    pub total_users: u64,
    pub total_properties: u64,
    pub total_revenue: f64,
    #[serde(default)]
    pub active_users: u64,
    #[serde(default)]
    pub average_price: f64,
}

/// Revenue is the sum of transaction amounts; without a transactions
/// collection the precomputed `revenue` scalar is used instead.
pub fn total_revenue(transactions: Option<&[Transaction]>, revenue_node: Option<f64>) -> f64 {
    match transactions {
        Some(transactions) if !transactions.is_empty() => {
            transactions.iter().map(|t| t.amount).sum()
        }
        _ => revenue_node.unwrap_or(0.0),
    }
}

pub fn admin_statistics(
    users: &[User],
    properties: &[Property],
    transactions: Option<&[Transaction]>,
    revenue_node: Option<f64>,
    now: DateTime<Utc>,
) -> AdminStatistics {
    AdminStatistics {
        total_users: users.len() as u64,
        total_properties: properties.len() as u64,
        total_revenue: total_revenue(transactions, revenue_node),
        active_users: active_users(users, now),
        average_price: average_rent(properties),
    }
}

/// Users who logged in within the window, or who joined within it when
/// no login time is recorded
pub fn active_users(users: &[User], now: DateTime<Utc>) -> u64 {
    let since = now - Duration::days(ACTIVE_USER_DAYS);
    users
        .iter()
        .filter(|user| match user.last_login.or(user.created_at) {
            Some(at) => at > since,
            None => false,
        })
        .count() as u64
}

/// Users whose `lastActive` falls inside the session window
pub fn active_sessions(users: &[User], now: DateTime<Utc>) -> u64 {
    let since = now - Duration::minutes(ACTIVE_SESSION_MINUTES);
    users
        .iter()
        .filter(|user| user.last_active.map(|at| at >= since).unwrap_or(false))
        .count() as u64
}

pub fn average_rent(properties: &[Property]) -> f64 {
    if properties.is_empty() {
        return 0.0;
    }
    properties.iter().map(|p| p.rent).sum::<f64>() / properties.len() as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeStats {
    pub active_sessions: u64,
    pub current_time: DateTime<Utc>,
}
