//! Aggregate statistics over a fetched result set, rendered as plain text.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::record::Record;

/// Date format used by the register for `BN_REG_DT` / `BN_CANCEL_DT`.
pub const REGISTER_DATE_FORMAT: &str = "%d/%m/%Y";

/// First year shown in the registration-by-year chart.
pub const FIRST_CHART_YEAR: i32 = 2000;

const DAYS_PER_YEAR: f64 = 365.25;
const RULE: &str = "--------------------------------";

/// Parse a register date such as `14/05/2012`.
pub fn parse_register_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), REGISTER_DATE_FORMAT).ok()
}

/// Mean age in years of records with a parsable registration date.
///
/// Returns `None` when no record has one.
pub fn average_age(records: &[Record], now: DateTime<Utc>) -> Option<f64> {
    let ages: Vec<f64> = records
        .iter()
        .filter_map(|r| r.registration_date.as_deref())
        .filter_map(parse_register_date)
        .filter_map(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| {
            let elapsed = now - midnight.and_utc();
            elapsed.num_seconds() as f64 / 86_400.0 / DAYS_PER_YEAR
        })
        .collect();

    if ages.is_empty() {
        return None;
    }
    Some(ages.iter().sum::<f64>() / ages.len() as f64)
}

/// Count of records per registration status.
pub fn status_distribution(records: &[Record]) -> BTreeMap<String, usize> {
    count_by(records.iter().filter_map(|r| r.status.clone()))
}

/// Count of records per state of registration.
pub fn state_distribution(records: &[Record]) -> BTreeMap<String, usize> {
    count_by(records.iter().filter_map(|r| r.state.clone()))
}

/// Registrations per year from [`FIRST_CHART_YEAR`] through `current_year`.
pub fn registrations_by_year(records: &[Record], current_year: i32) -> BTreeMap<i32, usize> {
    count_by(
        records
            .iter()
            .filter_map(|r| r.registration_date.as_deref())
            .filter_map(parse_register_date)
            .map(|date| date.year())
            .filter(|year| (FIRST_CHART_YEAR..=current_year).contains(year)),
    )
}

fn count_by<K: Ord>(keys: impl Iterator<Item = K>) -> BTreeMap<K, usize> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Render a titled count listing, one `label: count` line per key.
pub fn render_counts<K: std::fmt::Display>(title: &str, counts: &BTreeMap<K, usize>) -> String {
    let mut out = format!("\n{title}:\n{RULE}\n");
    for (label, count) in counts {
        out.push_str(&format!("{label}: {count}\n"));
    }
    out
}

pub fn status_chart(records: &[Record]) -> String {
    render_counts("Registration Status Distribution", &status_distribution(records))
}

pub fn state_chart(records: &[Record]) -> String {
    render_counts("Registration Distribution by State", &state_distribution(records))
}

pub fn year_chart(records: &[Record], now: DateTime<Utc>) -> String {
    render_counts(
        "Registration Distribution by Year",
        &registrations_by_year(records, now.year()),
    )
}
