use serde::Serialize;

use super::{series::MonthSeries, NamedCount};
use crate::models::{Property, User, UserKind};

/// Rows in the top-users table
pub const TOP_USERS: usize = 10;
/// Points above which a user is shown as Premium
pub const PREMIUM_POINTS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub points: i64,
    pub properties: usize,
    pub joined: String,
    pub status: &'static str,
}

/// Users with the most points, highest first.
///
/// The sort is stable, so users with equal points keep store order.
pub fn top_users(users: &[User], properties: &[Property]) -> Vec<TopUser> {
    let mut ranked: Vec<&User> = users.iter().collect();
    ranked.sort_by(|a, b| b.points.cmp(&a.points));

    ranked
        .into_iter()
        .take(TOP_USERS)
        .map(|user| TopUser {
            id: user.uid.clone(),
            name: user.display_name().to_string(),
            email: user.email_or_blank().to_string(),
            points: user.points,
            properties: properties.iter().filter(|p| p.owned_by(&user.uid)).count(),
            joined: user.joined.clone().unwrap_or_else(|| "Unknown".to_string()),
            status: if user.points > PREMIUM_POINTS {
                "Premium"
            } else {
                "Active"
            },
        })
        .collect()
}

/// Users per classification, always listing every kind
pub fn user_types(users: &[User]) -> Vec<NamedCount> {
    UserKind::ALL
        .iter()
        .map(|kind| {
            let count = users.iter().filter(|u| u.kind() == *kind).count();
            NamedCount::new(kind.group_label(), count as u64)
        })
        .collect()
}

/// Gamified score: 1 XP per 1,000 of rent plus 10 XP per active listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpStats {
    pub total_rent: f64,
    pub active_listings: u64,
    pub revenue_xp: i64,
    pub listing_xp: i64,
    pub total_xp: i64,
}

impl XpStats {
    pub fn from_totals(total_rent: f64, active_listings: u64) -> Self {
        let revenue_xp = (total_rent / 1_000.0).floor() as i64;
        let listing_xp = 10 * active_listings as i64;
        Self {
            total_rent,
            active_listings,
            revenue_xp,
            listing_xp,
            total_xp: revenue_xp + listing_xp,
        }
    }
}

/// XP over every listing's rent and the count of active listings
pub fn xp(properties: &[Property]) -> XpStats {
    let total_rent = properties.iter().map(|p| p.rent).sum();
    let active = properties.iter().filter(|p| p.is_active()).count() as u64;
    XpStats::from_totals(total_rent, active)
}

/// Percentage change from `prev` to `last`.
///
/// 100 when growing from exactly zero, 0 when both are zero.
pub fn growth_between(prev: f64, last: f64) -> f64 {
    if prev > 0.0 {
        (last - prev) / prev * 100.0
    } else if prev == 0.0 && last > 0.0 {
        100.0
    } else {
        0.0
    }
}

/// Month-over-month growth of the last two points; 0 with fewer than two
pub fn month_over_month(series: &[u64]) -> f64 {
    match series {
        [.., prev, last] => growth_between(*prev as f64, *last as f64),
        _ => 0.0,
    }
}

/// Revenue tier for a trailing window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueLevel {
    pub period: &'static str,
    pub level: &'static str,
    pub amount: f64,
    pub growth: f64,
    /// Consecutive months with revenue, newest first, within the window
    pub streak: u32,
}

const LEVELS: [(&str, &str, usize); 4] = [
    ("Last 30 Days", "Bronze", 1),
    ("Last 3 Months", "Silver", 3),
    ("Last 6 Months", "Gold", 6),
    ("Last Year", "Diamond", 12),
];

/// Bronze/Silver/Gold/Diamond windows over a monthly revenue series.
///
/// Growth compares each window to the window before it, which needs a
/// series twice as long as the window; shorter history reports 0.
pub fn revenue_levels(revenue: &MonthSeries) -> Vec<RevenueLevel> {
    let totals = revenue.totals();

    LEVELS
        .iter()
        .map(|&(period, level, months)| {
            let amount = revenue.recent_total(months);
            let growth = revenue
                .previous_total(months)
                .map(|prev| growth_between(prev, amount))
                .unwrap_or(0.0);
            let streak = totals
                .iter()
                .rev()
                .take(months)
                .take_while(|total| **total > 0.0)
                .count() as u32;

            RevenueLevel {
                period,
                level,
                amount,
                growth,
                streak,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Achievement {
    pub title: &'static str,
    pub description: String,
}

/// Dashboard badges unlocked by the current numbers
pub fn achievements(
    xp: &XpStats,
    active_users: usize,
    available_listings: u64,
    average_price: f64,
) -> Vec<Achievement> {
    let mut unlocked = Vec::new();

    if xp.total_xp >= 1_000 {
        unlocked.push(Achievement {
            title: "XP Master",
            description: format!("Earned {} total XP", xp.total_xp),
        });
    }
    if active_users >= 100 {
        unlocked.push(Achievement {
            title: "Active Community",
            description: format!("{active_users}+ active users (30 days)"),
        });
    }
    if available_listings >= 50 {
        unlocked.push(Achievement {
            title: "Property Empire",
            description: format!("{available_listings}+ active listings"),
        });
    }
    if average_price >= 15_000.0 {
        unlocked.push(Achievement {
            title: "Premium Market",
            description: format!("KES {} average price", average_price.round()),
        });
    }

    unlocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn xp_scenario() {
        let stats = XpStats::from_totals(125_000.0, 8);
        assert_eq!(stats.revenue_xp, 125);
        assert_eq!(stats.listing_xp, 80);
        assert_eq!(stats.total_xp, 205);
    }

    #[test]
    fn xp_from_listings() {
        let listings: Vec<Property> = [
            json!({"rent": 15_500, "available": true}),
            json!({"rent": "9,999", "status": "available"}),
            json!({"rent": 600, "available": false}),
        ]
        .iter()
        .map(|r| Property::from_record("p", r))
        .collect();

        let stats = xp(&listings);
        assert_eq!(stats.total_rent, 26_099.0);
        assert_eq!(stats.revenue_xp, 26);
        assert_eq!(stats.active_listings, 2);
        assert_eq!(stats.total_xp, 46);
    }

    #[test]
    fn growth_rules() {
        assert_eq!(month_over_month(&[10, 50, 75]), 50.0);
        assert_eq!(month_over_month(&[0, 5]), 100.0);
        assert_eq!(month_over_month(&[0, 0]), 0.0);
        assert_eq!(month_over_month(&[40, 20]), -50.0);
        assert_eq!(month_over_month(&[7]), 0.0);
        assert_eq!(month_over_month(&[]), 0.0);
    }

    #[test]
    fn top_users_sorted_and_capped() {
        let users: Vec<User> = (0..12)
            .map(|i| User::from_record(&format!("u{i}"), &json!({"name": format!("User {i}"), "points": i * 50})))
            .collect();
        let listings = vec![
            Property::from_record("p1", &json!({"UserID": "u11"})),
            // Published by u11 on behalf of someone else
            Property::from_record("p2", &json!({"UserID": "u3", "createdBy": "u11"})),
        ];

        let top = top_users(&users, &listings);
        assert_eq!(top.len(), TOP_USERS);
        assert_eq!(top[0].id, "u11");
        assert_eq!(top[0].points, 550);
        assert_eq!(top[0].status, "Premium");
        assert_eq!(top[0].properties, 1);
        assert_eq!(top[9].id, "u2");
        assert_eq!(top[9].status, "Active");
        assert_eq!(top[9].joined, "Unknown");
    }

    #[test]
    fn ties_keep_store_order() {
        let users: Vec<User> = ["a", "b", "c"]
            .iter()
            .map(|id| User::from_record(id, &json!({"points": 100})))
            .collect();
        let ids: Vec<String> = top_users(&users, &[]).into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn user_type_distribution_lists_every_kind() {
        let users = vec![
            User::from_record("a", &json!({"role": "agent"})),
            User::from_record("b", &json!({"saved": {"p": true}})),
            User::from_record("c", &json!({})),
        ];
        let types = user_types(&users);
        assert_eq!(
            types,
            vec![
                NamedCount::new("Property Owners", 0),
                NamedCount::new("Tenants", 1),
                NamedCount::new("Agents", 1),
                NamedCount::new("Inactive", 1),
            ]
        );
    }

    #[test]
    fn revenue_levels_over_two_years() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        let mut series = MonthSeries::trailing(now, 24);
        series.record(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(), 300.0);
        series.record(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(), 200.0);
        series.record(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(), 100.0);

        let levels = revenue_levels(&series);
        assert_eq!(levels[0].level, "Bronze");
        assert_eq!(levels[0].amount, 300.0);
        assert_eq!(levels[0].growth, 50.0);
        assert_eq!(levels[0].streak, 1);
        assert_eq!(levels[1].amount, 500.0);
        assert_eq!(levels[1].streak, 2);
        assert_eq!(levels[3].amount, 600.0);
        // Nothing in the year before
        assert_eq!(levels[3].growth, 100.0);
    }

    #[test]
    fn achievements_unlock_on_thresholds() {
        let none = achievements(&XpStats::from_totals(0.0, 0), 0, 0, 0.0);
        assert!(none.is_empty());

        let all = achievements(&XpStats::from_totals(1_000_000.0, 50), 100, 50, 15_000.0);
        let titles: Vec<_> = all.iter().map(|a| a.title).collect();
        assert_eq!(
            titles,
            vec!["XP Master", "Active Community", "Property Empire", "Premium Market"]
        );
    }
}
