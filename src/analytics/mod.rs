//! Dashboard metrics derived in memory from whole-collection snapshots.
//!
//! Every function here is a pure projection: inputs are never mutated and
//! nothing is cached between calls.

pub mod histogram;
pub mod ranking;
pub mod series;
pub mod stats;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Property, Transaction, User};

pub use histogram::{availability, location_distribution, price_ranges, Availability};
pub use ranking::{
    achievements, month_over_month, revenue_levels, top_users, user_types, xp, Achievement,
    RevenueLevel, TopUser, XpStats,
};
pub use series::{MonthSeries, TRAILING_MONTHS};
pub use stats::{active_sessions, admin_statistics, AdminStatistics, RealTimeStats};

/// A labelled count, the shape every chart consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub value: u64,
}

impl NamedCount {
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAnalytics {
    pub user_types: Vec<NamedCount>,
    pub registration_trends: Vec<series::MonthBucket>,
    pub top_users: Vec<TopUser>,
    /// Month-over-month change in registrations, percent
    pub growth: f64,
}

pub fn user_analytics(users: &[User], properties: &[Property], now: DateTime<Utc>) -> UserAnalytics {
    let registrations =
        MonthSeries::count_dates(now, TRAILING_MONTHS, users.iter().map(|u| u.created_at));

    UserAnalytics {
        user_types: user_types(users),
        growth: month_over_month(&registrations.counts()),
        registration_trends: registrations.buckets,
        top_users: top_users(users, properties),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAnalytics {
    pub property_types: Vec<NamedCount>,
    pub location_distribution: Vec<NamedCount>,
    pub price_ranges: Vec<NamedCount>,
    pub availability: Availability,
    /// New listings per month, by `createdAt`
    pub growth: Vec<series::MonthBucket>,
    pub xp: XpStats,
    pub average_price: f64,
}

pub fn property_analytics(properties: &[Property], now: DateTime<Utc>) -> PropertyAnalytics {
    PropertyAnalytics {
        property_types: histogram::group_counts(properties.iter().map(Property::type_label)),
        location_distribution: location_distribution(properties),
        price_ranges: price_ranges(properties),
        availability: availability(properties),
        growth: MonthSeries::count_dates(
            now,
            TRAILING_MONTHS,
            properties.iter().map(|p| p.created_at),
        )
        .buckets,
        xp: xp(properties),
        average_price: stats::average_rent(properties),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueAnalytics {
    pub monthly_revenue: Vec<series::MonthBucket>,
    pub revenue_levels: Vec<RevenueLevel>,
    pub transaction_types: Vec<NamedCount>,
}

pub fn revenue_analytics(transactions: &[Transaction], now: DateTime<Utc>) -> RevenueAnalytics {
    // Two years so the yearly tier has a previous window to compare with
    let mut revenue = MonthSeries::trailing(now, TRAILING_MONTHS * 2);
    for transaction in transactions {
        if let Some(at) = transaction.timestamp {
            revenue.record(at, transaction.amount);
        }
    }

    RevenueAnalytics {
        monthly_revenue: revenue.tail(TRAILING_MONTHS).buckets,
        revenue_levels: revenue_levels(&revenue),
        transaction_types: histogram::group_counts(
            transactions.iter().map(Transaction::type_label),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    #[test]
    fn user_growth_from_registrations() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        let mut users = Vec::new();
        for i in 0..2 {
            users.push(User::from_record(&format!("may{i}"), &json!({"createdAt": "2024-05-03T00:00:00Z"})));
        }
        for i in 0..3 {
            users.push(User::from_record(&format!("jun{i}"), &json!({"createdAt": "2024-06-01T00:00:00Z"})));
        }
        users.push(User::from_record("undated", &json!({"createdAt": "soon"})));

        let analytics = user_analytics(&users, &[], now);
        assert_eq!(analytics.registration_trends.len(), 12);
        assert_eq!(analytics.registration_trends[11].count, 3);
        assert_eq!(analytics.registration_trends[10].count, 2);
        assert_eq!(analytics.growth, 50.0);
        assert_eq!(analytics.top_users.len(), 6);
    }

    #[test]
    fn property_panels() {
        let now = Utc::now();
        let listings: Vec<Property> = [
            json!({"type": "Apartment", "town": "Kiwanja", "rent": 6000, "available": true, "createdAt": now.to_rfc3339()}),
            json!({"propertyType": "Studio", "city": "Thika", "rent": "4500"}),
            json!({"town": "Kiwanja", "rent": 25000, "createdAt": (now - Duration::days(800)).to_rfc3339()}),
        ]
        .iter()
        .enumerate()
        .map(|(i, r)| Property::from_record(&format!("p{i}"), r))
        .collect();

        let analytics = property_analytics(&listings, now);
        assert_eq!(
            analytics.property_types,
            vec![
                NamedCount::new("Apartment", 1),
                NamedCount::new("Studio", 1),
                NamedCount::new("Unknown", 1)
            ]
        );
        assert_eq!(analytics.location_distribution[0], NamedCount::new("Kiwanja", 2));
        assert_eq!(analytics.availability.available, 1);
        assert_eq!(analytics.growth.iter().map(|b| b.count).sum::<u64>(), 1);
        assert_eq!(analytics.xp.total_xp, 35 + 10);
    }

    #[test]
    fn revenue_by_month_and_type() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        let at = |y, m| Utc.with_ymd_and_hms(y, m, 2, 0, 0, 0).unwrap().timestamp_millis();
        let transactions: Vec<Transaction> = [
            json!({"amount": 5000, "type": "listing_fee", "timestamp": at(2024, 6)}),
            json!({"amount": 1000, "type": "premium", "timestamp": at(2024, 5)}),
            json!({"amount": 700, "type": "premium", "timestamp": at(2023, 6)}),
            json!({"amount": 900}),
        ]
        .iter()
        .enumerate()
        .map(|(i, r)| Transaction::from_record(&format!("t{i}"), r))
        .collect();

        let analytics = revenue_analytics(&transactions, now);
        assert_eq!(analytics.monthly_revenue.len(), 12);
        assert_eq!(analytics.monthly_revenue[11].total, 5000.0);
        assert_eq!(analytics.monthly_revenue[11].count, 1);
        assert_eq!(analytics.monthly_revenue[10].total, 1000.0);
        assert_eq!(analytics.revenue_levels[3].amount, 6000.0);
        assert_eq!(
            analytics.transaction_types,
            vec![
                NamedCount::new("listing_fee", 1),
                NamedCount::new("premium", 2),
                NamedCount::new("Unknown", 1)
            ]
        );
    }
}
