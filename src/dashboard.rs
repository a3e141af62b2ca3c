//! Admin dashboard loading.
//!
//! The initial load fans out one task per panel and waits for all of them.
//! A failed panel falls back to its zero value and is reported in `errors`
//! so the rest of the dashboard still renders. Refreshes run on a timer with
//! no backpressure: overlapping refreshes are allowed and the last one to
//! finish wins.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{
    analytics::{
        self, achievements, AdminStatistics, PropertyAnalytics, RealTimeStats, RevenueAnalytics,
        UserAnalytics,
    },
    error::StoreError,
    models::{Property, PropertyRequest, Transaction, User},
    store::{
        fetch_collection, ChangeCallback, Collection, RecordStore, Subscription, REVENUE_PATH,
        STATISTICS_PATH,
    },
};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub statistics: AdminStatistics,
    pub user_analytics: UserAnalytics,
    pub property_analytics: PropertyAnalytics,
    pub revenue_analytics: RevenueAnalytics,
    pub real_time: Option<RealTimeStats>,
    pub property_requests: Vec<PropertyRequest>,
    pub achievements: Vec<analytics::Achievement>,
    pub generated_at: Option<DateTime<Utc>>,
    /// Panels that could not be loaded, for the error banner
    pub errors: Vec<String>,
}

impl DashboardSnapshot {
    fn recompute_achievements(&mut self) {
        self.achievements = achievements(
            &self.property_analytics.xp,
            self.statistics.active_users as usize,
            self.property_analytics.availability.available,
            self.property_analytics.average_price,
        );
    }
}

/// Loads and keeps a dashboard snapshot current
#[derive(Clone)]
pub struct Dashboard {
    store: Arc<dyn RecordStore>,
    state: Arc<RwLock<DashboardSnapshot>>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            state: Arc::new(RwLock::new(DashboardSnapshot::default())),
        }
    }

    /// Copy of the latest snapshot
    pub fn snapshot(&self) -> DashboardSnapshot {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_state(&self, apply: impl FnOnce(&mut DashboardSnapshot)) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state);
        state.recompute_achievements();
        state.generated_at = Some(Utc::now());
    }

    async fn users(&self) -> Result<Vec<User>, StoreError> {
        Ok(fetch_collection(self.store.as_ref(), Collection::Users.path())
            .await?
            .iter()
            .map(|(id, record)| User::from_record(id, record))
            .collect())
    }

    async fn properties(&self) -> Result<Vec<Property>, StoreError> {
        Ok(fetch_collection(self.store.as_ref(), Collection::Property.path())
            .await?
            .iter()
            .map(|(id, record)| Property::from_record(id, record))
            .collect())
    }

    async fn transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(fetch_collection(self.store.as_ref(), Collection::Transactions.path())
            .await?
            .iter()
            .map(|(id, record)| Transaction::from_record(id, record))
            .collect())
    }

    pub async fn load_statistics(&self) -> Result<AdminStatistics, StoreError> {
        let (users, properties, transactions, revenue) = tokio::try_join!(
            self.users(),
            self.properties(),
            self.transactions(),
            self.store.get(REVENUE_PATH),
        )?;

        let revenue_node = revenue.as_ref().and_then(Value::as_f64).or_else(|| {
            revenue
                .as_ref()
                .and_then(Value::as_str)
                .and_then(|s| s.trim().parse().ok())
        });
        let transactions = (!transactions.is_empty()).then_some(transactions.as_slice());

        Ok(analytics::admin_statistics(
            &users,
            &properties,
            transactions,
            revenue_node,
            Utc::now(),
        ))
    }

    pub async fn load_user_analytics(&self) -> Result<UserAnalytics, StoreError> {
        let (users, properties) = tokio::try_join!(self.users(), self.properties())?;
        Ok(analytics::user_analytics(&users, &properties, Utc::now()))
    }

    pub async fn load_property_analytics(&self) -> Result<PropertyAnalytics, StoreError> {
        let properties = self.properties().await?;
        Ok(analytics::property_analytics(&properties, Utc::now()))
    }

    pub async fn load_revenue_analytics(&self) -> Result<RevenueAnalytics, StoreError> {
        let transactions = self.transactions().await?;
        Ok(analytics::revenue_analytics(&transactions, Utc::now()))
    }

    pub async fn load_real_time(&self) -> Result<RealTimeStats, StoreError> {
        let users = self.users().await?;
        let now = Utc::now();
        Ok(RealTimeStats {
            active_sessions: analytics::active_sessions(&users, now),
            current_time: now,
        })
    }

    pub async fn load_property_requests(&self) -> Result<Vec<PropertyRequest>, StoreError> {
        Ok(
            fetch_collection(self.store.as_ref(), Collection::PropertyRequests.path())
                .await?
                .iter()
                .map(|(id, record)| PropertyRequest::from_record(id, record))
                .collect(),
        )
    }

    /// Full load of every panel, concurrently
    pub async fn load_all(&self) -> DashboardSnapshot {
        info!("Loading dashboard from {} store", self.store.backend_name());

        let (statistics, users, properties, revenue, real_time, requests) = tokio::join!(
            self.load_statistics(),
            self.load_user_analytics(),
            self.load_property_analytics(),
            self.load_revenue_analytics(),
            self.load_real_time(),
            self.load_property_requests(),
        );

        let mut errors = Vec::new();
        let snapshot = DashboardSnapshot {
            statistics: or_default("statistics", statistics, &mut errors),
            user_analytics: or_default("user analytics", users, &mut errors),
            property_analytics: or_default("property analytics", properties, &mut errors),
            revenue_analytics: or_default("revenue analytics", revenue, &mut errors),
            real_time: real_time
                .map_err(|e| degrade("real-time stats", &e, &mut errors))
                .ok(),
            property_requests: or_default("property requests", requests, &mut errors),
            ..DashboardSnapshot::default()
        };

        self.with_state(|state| {
            *state = snapshot;
            state.errors = errors;
        });
        self.snapshot()
    }

    /// Re-runs the analytics panels; headline statistics come from the subscription
    pub async fn refresh(&self) {
        let (users, properties, revenue) = tokio::join!(
            self.load_user_analytics(),
            self.load_property_analytics(),
            self.load_revenue_analytics(),
        );

        match (users, properties, revenue) {
            (Ok(users), Ok(properties), Ok(revenue)) => {
                self.with_state(|state| {
                    state.user_analytics = users;
                    state.property_analytics = properties;
                    state.revenue_analytics = revenue;
                });
                debug!("Dashboard analytics refreshed");
            }
            (users, properties, revenue) => {
                // Keep the previous panels rather than blanking them
                for e in [users.err(), properties.err(), revenue.err()].into_iter().flatten() {
                    error!("Error refreshing analytics data: {e}");
                }
            }
        }
    }

    /// Tracks the precomputed `statistics` node; when it is absent or
    /// unreadable, statistics are computed from the collections instead.
    pub async fn subscribe_statistics(&self) -> Result<Subscription, StoreError> {
        let dashboard = self.clone();
        let on_change: ChangeCallback = Arc::new(move |value| {
            let parsed = value.and_then(|v| serde_json::from_value::<AdminStatistics>(v).ok());
            match parsed {
                Some(statistics) => dashboard.with_state(|state| state.statistics = statistics),
                None => {
                    let dashboard = dashboard.clone();
                    tokio::spawn(async move {
                        match dashboard.load_statistics().await {
                            Ok(statistics) => {
                                dashboard.with_state(|state| state.statistics = statistics)
                            }
                            Err(e) => warn!("Could not compute statistics: {e}"),
                        }
                    });
                }
            }
        });

        self.store.subscribe(STATISTICS_PATH, on_change).await
    }

    /// Recounts live sessions whenever the users collection changes
    pub async fn subscribe_sessions(&self) -> Result<Subscription, StoreError> {
        let dashboard = self.clone();
        let on_change: ChangeCallback = Arc::new(move |value| {
            let now = Utc::now();
            let users: Vec<User> = crate::store::collection_entries(value)
                .iter()
                .map(|(id, record)| User::from_record(id, record))
                .collect();
            let stats = RealTimeStats {
                active_sessions: analytics::active_sessions(&users, now),
                current_time: now,
            };
            dashboard.with_state(|state| state.real_time = Some(stats));
        });

        self.store.subscribe(Collection::Users.path(), on_change).await
    }

    /// Loads, subscribes, and refreshes every `every` until Ctrl+C
    pub async fn watch(&self, every: Duration) -> anyhow::Result<()> {
        let snapshot = self.load_all().await;
        log_summary(&snapshot);

        let _statistics = self
            .subscribe_statistics()
            .await
            .map_err(|e| warn!("Failed to connect to real-time statistics: {e}"))
            .ok();
        let _sessions = self
            .subscribe_sessions()
            .await
            .map_err(|e| warn!("Failed to connect to real-time sessions: {e}"))
            .ok();

        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let dashboard = self.clone();
                    tokio::spawn(async move {
                        dashboard.refresh().await;
                        log_summary(&dashboard.snapshot());
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, stopping dashboard");
                    break;
                }
            }
        }

        Ok(())
    }
}

fn degrade(panel: &str, e: &StoreError, errors: &mut Vec<String>) {
    warn!("Error loading {panel}: {e}");
    errors.push(format!("Failed to load {panel}"));
}

fn or_default<T: Default>(
    panel: &str,
    result: Result<T, StoreError>,
    errors: &mut Vec<String>,
) -> T {
    result.unwrap_or_else(|e| {
        degrade(panel, &e, errors);
        T::default()
    })
}

pub fn log_summary(snapshot: &DashboardSnapshot) {
    let stats = &snapshot.statistics;
    info!(
        "users={} properties={} revenue={:.2} active_users={} avg_price={:.0}",
        stats.total_users,
        stats.total_properties,
        stats.total_revenue,
        stats.active_users,
        stats.average_price
    );
    info!(
        "xp={} (revenue {}, listings {}) user_growth={:.1}%",
        snapshot.property_analytics.xp.total_xp,
        snapshot.property_analytics.xp.revenue_xp,
        snapshot.property_analytics.xp.listing_xp,
        snapshot.user_analytics.growth
    );
    for message in &snapshot.errors {
        warn!("{message}");
    }
}
