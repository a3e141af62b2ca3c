use std::collections::HashMap;

use serde::Serialize;

use super::NamedCount;
use crate::models::Property;

/// Locations shown on the distribution chart
pub const TOP_LOCATIONS: usize = 10;

/// Fixed rent bands, in the local currency's display unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceRange {
    Under5K,
    From5KTo10K,
    From10KTo20K,
    Over20K,
}

impl PriceRange {
    pub const ALL: [PriceRange; 4] = [
        PriceRange::Under5K,
        PriceRange::From5KTo10K,
        PriceRange::From10KTo20K,
        PriceRange::Over20K,
    ];

    /// Exactly one band for every input. NaN counts as 0.
    pub fn classify(rent: f64) -> Self {
        let rent = if rent.is_nan() { 0.0 } else { rent };
        if rent < 5_000.0 {
            PriceRange::Under5K
        } else if rent < 10_000.0 {
            PriceRange::From5KTo10K
        } else if rent <= 20_000.0 {
            PriceRange::From10KTo20K
        } else {
            PriceRange::Over20K
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PriceRange::Under5K => "Under 5K",
            PriceRange::From5KTo10K => "5K - 10K",
            PriceRange::From10KTo20K => "10K - 20K",
            PriceRange::Over20K => "Over 20K",
        }
    }
}

/// Rent histogram over the four fixed bands, in band order
pub fn price_ranges<'a>(properties: impl IntoIterator<Item = &'a Property>) -> Vec<NamedCount> {
    let mut counts = [0u64; 4];
    for property in properties {
        let band = PriceRange::classify(property.rent);
        if let Some(slot) = PriceRange::ALL.iter().position(|b| *b == band) {
            counts[slot] += 1;
        }
    }

    PriceRange::ALL
        .iter()
        .zip(counts)
        .map(|(band, value)| NamedCount::new(band.label(), value))
        .collect()
}

/// Counts per label, in first-seen order
pub fn group_counts<I, S>(labels: I) -> Vec<NamedCount>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<NamedCount> = Vec::new();

    for label in labels {
        let label = label.as_ref();
        match index.get(label) {
            Some(&i) => groups[i].value += 1,
            None => {
                index.insert(label.to_string(), groups.len());
                groups.push(NamedCount::new(label, 1));
            }
        }
    }

    groups
}

/// Top locations by listing count, most common first.
///
/// Ties keep the order in which locations were first seen.
pub fn location_distribution<'a>(
    properties: impl IntoIterator<Item = &'a Property>,
) -> Vec<NamedCount> {
    let mut groups = group_counts(properties.into_iter().map(Property::location_label));
    groups.sort_by(|a, b| b.value.cmp(&a.value));
    groups.truncate(TOP_LOCATIONS);
    groups
}

/// Listings flagged available versus the rest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub available: u64,
    pub full: u64,
    pub total: u64,
}

pub fn availability<'a>(properties: impl IntoIterator<Item = &'a Property>) -> Availability {
    let (available, total) = properties
        .into_iter()
        .fold((0u64, 0u64), |(available, total), p| {
            (available + u64::from(p.available), total + 1)
        });

    Availability {
        available,
        full: total - available,
        total,
    }
}
